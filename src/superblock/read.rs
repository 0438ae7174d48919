//! Superblock 读取和验证

use super::FsSuperblock;
use crate::{
    block::BlockDevice,
    cache::BlockCache,
    consts::{FS_MAGIC, FS_SUPERBLOCK_BLOCK},
    error::{Error, ErrorKind, Result},
};
use byteorder::{ByteOrder, LittleEndian};

impl FsSuperblock {
    /// 从块数据解析 superblock
    pub fn decode(data: &[u8]) -> Self {
        Self {
            magic: LittleEndian::read_u32(&data[0..4]),
            nblocks: LittleEndian::read_u32(&data[4..8]),
        }
    }

    /// 验证魔数与块数
    pub fn validate(&self, device_blocks: u64) -> Result<()> {
        if self.magic != FS_MAGIC {
            return Err(Error::fatal(ErrorKind::Corrupted, "bad file system magic number"));
        }
        if self.nblocks as u64 > device_blocks {
            return Err(Error::fatal(ErrorKind::Corrupted, "file system is too large for the device"));
        }
        if self.first_data_block() >= self.nblocks {
            return Err(Error::fatal(ErrorKind::Corrupted, "file system has no data blocks"));
        }
        Ok(())
    }
}

/// 通过块缓存读取并验证文件系统 superblock
pub fn read_superblock<D: BlockDevice>(cache: &mut BlockCache<D>) -> Result<FsSuperblock> {
    let device_blocks = cache.device().total_blocks();
    let sb = FsSuperblock::decode(cache.block(FS_SUPERBLOCK_BLOCK)?);
    sb.validate(device_blocks)?;
    log::info!("[SUPER] superblock is good, {} blocks", sb.nblocks);
    Ok(sb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemDevice;
    use crate::mkfs;

    #[test]
    fn test_read_formatted_superblock() {
        let mut dev = MemDevice::new(128);
        mkfs::format(&mut dev, 100).unwrap();
        let mut cache = BlockCache::new(dev, 8).unwrap();

        let sb = read_superblock(&mut cache).unwrap();
        assert_eq!(sb.magic, FS_MAGIC);
        assert_eq!(sb.nblocks, 100);
        assert_eq!(sb.bitmap_blocks(), 1);
        assert_eq!(sb.first_data_block(), 4);
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let mut cache = BlockCache::new(MemDevice::new(16), 8).unwrap();
        let err = read_superblock(&mut cache).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.kind(), ErrorKind::Corrupted);
    }

    #[test]
    fn test_oversized_file_system_rejected() {
        let sb = FsSuperblock { magic: FS_MAGIC, nblocks: 64 };
        assert!(sb.validate(32).is_err());
        assert!(sb.validate(64).is_ok());
    }
}
