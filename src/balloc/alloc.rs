//! 块分配功能

use super::BlockAllocator;
use crate::{
    bitmap,
    block::BlockDevice,
    cache::{BlockCache, FreeMap},
    consts::BITS_PER_BLOCK,
    error::{Error, ErrorKind, Result},
};

/// 位图块分配器
///
/// 记住上次分配的位置，下次从那里继续查找。
#[derive(Debug, Clone)]
pub struct BitmapAllocator {
    pub(super) map: FreeMap,
    pub(super) nblocks: u32,
    last_alloc: u32,
}

impl BitmapAllocator {
    /// 创建分配器
    ///
    /// # 参数
    ///
    /// * `map` - 位图所在区域
    /// * `nblocks` - 文件系统块数
    pub fn new(map: FreeMap, nblocks: u32) -> Self {
        Self {
            map,
            nblocks,
            last_alloc: 0,
        }
    }

    /// 位图区域
    pub fn free_map(&self) -> FreeMap {
        self.map
    }

    /// 统计空闲块数
    pub fn free_count<D: BlockDevice>(&self, cache: &mut BlockCache<D>) -> Result<u32> {
        let mut free = 0;
        for index in 0..self.map.blocks {
            let first = index * BITS_PER_BLOCK;
            let end = (self.nblocks - first).min(BITS_PER_BLOCK);
            let data = cache.block(self.map.start + index)?;
            free += bitmap::count_ones(data, 0, end);
        }
        Ok(free)
    }

    /// 在 `[from, to)` 中查找并占用一个空闲块
    fn try_alloc_range<D: BlockDevice>(
        &mut self,
        cache: &mut BlockCache<D>,
        from: u32,
        to: u32,
    ) -> Result<Option<u32>> {
        let mut bno = from;
        while bno < to {
            let index = bno / BITS_PER_BLOCK;
            let group_first = index * BITS_PER_BLOCK;
            let group_end = (to - group_first).min(BITS_PER_BLOCK);
            let bitmap_bno = self.map.start + index;

            let found = {
                let data = cache.block(bitmap_bno)?;
                bitmap::find_first_one(data, bno - group_first, group_end)
            };

            if let Some(bit) = found {
                let allocated = group_first + bit;
                let byte = (bit / 8) as usize;
                let mut value = [cache.block(bitmap_bno)?[byte]];
                bitmap::clear_bit(&mut value, bit % 8)?;
                cache.write_bytes(bitmap_bno, byte, &value)?;
                cache.flush(bitmap_bno)?;
                return Ok(Some(allocated));
            }

            bno = group_first + BITS_PER_BLOCK;
        }
        Ok(None)
    }
}

impl BlockAllocator for BitmapAllocator {
    fn alloc_block<D: BlockDevice>(&mut self, cache: &mut BlockCache<D>, hint: u32) -> Result<u32> {
        let goal = if hint == 0 || hint >= self.nblocks {
            self.last_alloc.max(1)
        } else {
            hint
        };

        let found = match self.try_alloc_range(cache, goal, self.nblocks)? {
            Some(bno) => Some(bno),
            None => self.try_alloc_range(cache, 1, goal)?,
        };

        match found {
            Some(bno) => {
                self.last_alloc = bno;
                log::debug!("[BALLOC] allocated block {:#x} (hint {:#x})", bno, hint);
                Ok(bno)
            }
            None => {
                log::warn!("[BALLOC] no free blocks among {}", self.nblocks);
                Err(Error::new(ErrorKind::NoSpace, "No free blocks available"))
            }
        }
    }

    fn free_block<D: BlockDevice>(&mut self, cache: &mut BlockCache<D>, bno: u32) -> Result<()> {
        self.free_one(cache, bno)
    }

    fn is_block_free<D: BlockDevice>(&self, cache: &mut BlockCache<D>, bno: u32) -> Result<bool> {
        if bno >= self.nblocks {
            return Err(Error::fatal(ErrorKind::InvalidInput, "block number beyond bitmap"));
        }
        let data = cache.block(self.map.start + bno / BITS_PER_BLOCK)?;
        Ok(bitmap::test_bit(data, bno % BITS_PER_BLOCK))
    }
}
