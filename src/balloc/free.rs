//! 块释放功能

use super::BitmapAllocator;
use crate::{
    bitmap,
    block::BlockDevice,
    cache::BlockCache,
    consts::BITS_PER_BLOCK,
    error::{Error, ErrorKind, Result},
};

impl BitmapAllocator {
    /// 释放单个块
    ///
    /// 位图立即写回磁盘；块的缓存内容被丢弃，下次分配时重新读入。
    pub(super) fn free_one<D: BlockDevice>(&mut self, cache: &mut BlockCache<D>, bno: u32) -> Result<()> {
        if bno == 0 {
            return Err(Error::fatal(ErrorKind::InvalidInput, "attempt to free zero block"));
        }
        if bno >= self.nblocks {
            return Err(Error::fatal(ErrorKind::InvalidInput, "attempt to free block beyond file system"));
        }

        let bitmap_bno = self.map.start + bno / BITS_PER_BLOCK;
        let bit = bno % BITS_PER_BLOCK;
        let byte = (bit / 8) as usize;

        let mut value = [cache.block(bitmap_bno)?[byte]];
        if bitmap::test_bit(&value, bit % 8) {
            log::error!("[BALLOC] block {:#x} is already free", bno);
            return Err(Error::fatal(ErrorKind::Corrupted, "freeing free block"));
        }
        bitmap::set_bit(&mut value, bit % 8)?;
        cache.write_bytes(bitmap_bno, byte, &value)?;
        cache.flush(bitmap_bno)?;

        cache.evict(bno);
        log::debug!("[BALLOC] freed block {:#x}", bno);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::balloc::{BitmapAllocator, BlockAllocator};
    use crate::block::MemDevice;
    use crate::cache::{BlockCache, FreeMap};
    use crate::error::ErrorKind;
    use crate::mkfs;
    use alloc::vec::Vec;

    fn setup(nblocks: u32) -> (BlockCache<MemDevice>, BitmapAllocator) {
        let mut dev = MemDevice::new(nblocks as u64);
        let layout = mkfs::format(&mut dev, nblocks).unwrap();
        let mut cache = BlockCache::new(dev, 32).unwrap();
        let map = FreeMap {
            start: layout.bitmap_start,
            blocks: layout.bitmap_blocks,
        };
        cache.set_free_map(map);
        (cache, BitmapAllocator::new(map, nblocks))
    }

    #[test]
    fn test_alloc_skips_metadata_blocks() {
        let (mut cache, mut alloc) = setup(64);
        // 0 引导块，1 superblock，2 journal，3 位图
        let bno = alloc.alloc_block(&mut cache, 1).unwrap();
        assert_eq!(bno, 4);
        assert!(!alloc.is_block_free(&mut cache, bno).unwrap());
        assert!(alloc.is_block_free(&mut cache, 5).unwrap());
    }

    #[test]
    fn test_alloc_persists_bitmap() {
        let (mut cache, mut alloc) = setup(64);
        let bno = alloc.alloc_block(&mut cache, 10).unwrap();
        assert_eq!(bno, 10);
        assert!(!cache.is_dirty(3));
        // 磁盘上的位图也已更新
        assert_eq!(cache.device().block(3)[1] & (1 << 2), 0);
    }

    #[test]
    fn test_alloc_wraps_around_hint() {
        let (mut cache, mut alloc) = setup(16);
        let mut got = Vec::new();
        for _ in 0..12 {
            got.push(alloc.alloc_block(&mut cache, 14).unwrap());
        }
        assert_eq!(&got[..2], &[14, 15]);
        assert_eq!(got[2], 4);
        let err = alloc.alloc_block(&mut cache, 14).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSpace);
    }

    #[test]
    fn test_free_returns_block() {
        let (mut cache, mut alloc) = setup(64);
        let before = alloc.free_count(&mut cache).unwrap();
        let bno = alloc.alloc_block(&mut cache, 1).unwrap();
        cache.block_mut(bno).unwrap().fill(0xee);
        assert_eq!(alloc.free_count(&mut cache).unwrap(), before - 1);

        alloc.free_block(&mut cache, bno).unwrap();
        assert!(alloc.is_block_free(&mut cache, bno).unwrap());
        assert!(!cache.is_mapped(bno));
        assert_eq!(alloc.free_count(&mut cache).unwrap(), before);
    }

    #[test]
    fn test_double_free_is_fatal() {
        let (mut cache, mut alloc) = setup(64);
        let err = alloc.free_block(&mut cache, 30).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.kind(), ErrorKind::Corrupted);

        let err = alloc.free_block(&mut cache, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
