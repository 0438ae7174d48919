//! 格式化
//!
//! 在设备上写出一个空文件系统：superblock、空 journal 和空闲位图。
//! 直接写设备，不经过块缓存（缓存依赖这些元数据才能工作）。

use crate::{
    block::BlockDevice,
    consts::*,
    error::{Error, ErrorKind, Result},
    journal::JournalSuperblock,
    superblock::FsSuperblock,
};
use alloc::vec;

/// 格式化得到的布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// 文件系统块数
    pub nblocks: u32,
    /// 位图起始块
    pub bitmap_start: u32,
    /// 位图块数
    pub bitmap_blocks: u32,
    /// 第一个数据块
    pub first_data_block: u32,
}

/// 把设备前 `nblocks` 块格式化为空文件系统
pub fn format<D: BlockDevice>(dev: &mut D, nblocks: u32) -> Result<Layout> {
    if dev.block_size() as usize != BLOCK_SIZE || dev.sector_size() as usize != SECTOR_SIZE {
        return Err(Error::new(ErrorKind::InvalidInput, "device geometry does not match the on-disk layout"));
    }
    if nblocks as u64 > dev.total_blocks() {
        return Err(Error::new(ErrorKind::NoSpace, "file system larger than device"));
    }

    let sb = FsSuperblock { magic: FS_MAGIC, nblocks };
    let layout = Layout {
        nblocks,
        bitmap_start: sb.bitmap_start(),
        bitmap_blocks: sb.bitmap_blocks(),
        first_data_block: sb.first_data_block(),
    };
    if layout.first_data_block >= nblocks {
        return Err(Error::new(ErrorKind::NoSpace, "file system too small for its metadata"));
    }

    let mut block = vec![0u8; BLOCK_SIZE];

    sb.encode(&mut block);
    write_block(dev, FS_SUPERBLOCK_BLOCK, &block)?;

    JournalSuperblock::empty().encode(&mut block);
    write_block(dev, JOURNAL_BLOCK, &block)?;

    for i in 0..layout.bitmap_blocks {
        block.fill(0);
        let base = i * BITS_PER_BLOCK;
        let lo = layout.first_data_block.saturating_sub(base).min(BITS_PER_BLOCK);
        let hi = nblocks.saturating_sub(base).min(BITS_PER_BLOCK);
        if lo < hi {
            crate::bitmap::set_bits(&mut block, lo, hi - lo)?;
        }
        write_block(dev, layout.bitmap_start + i, &block)?;
    }

    dev.flush()?;
    log::info!(
        "[MKFS] {} blocks, bitmap {}+{}, data from {}",
        nblocks,
        layout.bitmap_start,
        layout.bitmap_blocks,
        layout.first_data_block
    );
    Ok(layout)
}

fn write_block<D: BlockDevice>(dev: &mut D, bno: u32, data: &[u8]) -> Result<()> {
    let lba = bno as u64 * SECTORS_PER_BLOCK as u64;
    dev.write_blocks(lba, SECTORS_PER_BLOCK as u32, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap;
    use crate::block::MemDevice;

    #[test]
    fn test_format_layout() {
        let mut dev = MemDevice::new(64);
        let layout = format(&mut dev, 64).unwrap();
        assert_eq!(layout.bitmap_start, 3);
        assert_eq!(layout.bitmap_blocks, 1);
        assert_eq!(layout.first_data_block, 4);

        let sb = FsSuperblock::decode(dev.block(FS_SUPERBLOCK_BLOCK));
        assert_eq!(sb, FsSuperblock { magic: FS_MAGIC, nblocks: 64 });

        let jsb = JournalSuperblock::decode(dev.block(JOURNAL_BLOCK));
        assert!(jsb.check().is_ok());
        assert_eq!(jsb.active_count, 0);
        assert!(jsb.table.iter().all(|t| t.is_empty()));
    }

    #[test]
    fn test_bitmap_marks_data_blocks_free() {
        let mut dev = MemDevice::new(64);
        format(&mut dev, 40).unwrap();
        let map = dev.block(3);
        for bno in 0..4 {
            assert!(!bitmap::test_bit(map, bno));
        }
        for bno in 4..40 {
            assert!(bitmap::test_bit(map, bno));
        }
        assert!(!bitmap::test_bit(map, 40));
        assert_eq!(bitmap::count_ones(map, 0, BITS_PER_BLOCK), 36);
    }

    #[test]
    fn test_format_rejects_bad_sizes() {
        let mut dev = MemDevice::new(8);
        assert_eq!(format(&mut dev, 9).unwrap_err().kind(), ErrorKind::NoSpace);
        assert_eq!(format(&mut dev, 4).unwrap_err().kind(), ErrorKind::NoSpace);
        assert!(format(&mut dev, 5).is_ok());
    }
}
