//! 缓存块结构

use crate::consts::SECTOR_SIZE;
use alloc::vec::Vec;
use bitflags::bitflags;

bitflags! {
    /// 缓存块标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CacheFlags: u8 {
        /// 数据已从磁盘读入（有效）
        const UPTODATE = 0x01;
        /// 至少一个扇区被修改（脏）
        const DIRTY    = 0x02;
    }
}

/// 缓存块
///
/// 脏状态按扇区记录：`dirty_sectors` 的第 i 位表示第 i 个扇区有未落盘的写入。
/// 整块 flush 清除所有位，单扇区 flush 只清除对应位。
/// `DIRTY` 标志与 `dirty_sectors != 0` 始终一致。
pub struct CacheBuffer {
    /// 块号
    pub bno: u32,

    /// 块数据
    pub data: Vec<u8>,

    /// 块状态标志
    pub flags: CacheFlags,

    dirty_sectors: u64,
}

impl core::fmt::Debug for CacheBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CacheBuffer")
            .field("bno", &self.bno)
            .field("data_len", &self.data.len())
            .field("flags", &self.flags)
            .field("dirty_sectors", &format_args!("{:#x}", self.dirty_sectors))
            .finish()
    }
}

impl CacheBuffer {
    /// 创建新的缓存块
    ///
    /// # 参数
    ///
    /// * `bno` - 块号
    /// * `block_size` - 块大小（字节），不超过 64 个扇区
    pub fn new(bno: u32, block_size: usize) -> Self {
        debug_assert!(block_size / SECTOR_SIZE <= 64);
        Self {
            bno,
            data: alloc::vec![0u8; block_size],
            flags: CacheFlags::empty(),
            dirty_sectors: 0,
        }
    }

    fn sector_count(&self) -> usize {
        self.data.len() / SECTOR_SIZE
    }

    /// 标记整块为脏
    pub fn mark_dirty(&mut self) {
        let n = self.sector_count();
        self.dirty_sectors = if n >= 64 { u64::MAX } else { (1u64 << n) - 1 };
        self.flags.insert(CacheFlags::DIRTY);
    }

    /// 标记字节范围 `[offset, offset + len)` 覆盖的扇区为脏
    pub fn mark_dirty_range(&mut self, offset: usize, len: usize) {
        if len == 0 {
            return;
        }
        let first = offset / SECTOR_SIZE;
        let last = (offset + len - 1) / SECTOR_SIZE;
        for sector in first..=last {
            self.dirty_sectors |= 1 << sector;
        }
        self.flags.insert(CacheFlags::DIRTY);
    }

    /// 标记整块为干净（已写入磁盘）
    pub fn mark_clean(&mut self) {
        self.dirty_sectors = 0;
        self.flags.remove(CacheFlags::DIRTY);
    }

    /// 标记单个扇区为干净
    pub fn mark_sector_clean(&mut self, sector: usize) {
        self.dirty_sectors &= !(1u64 << sector);
        if self.dirty_sectors == 0 {
            self.flags.remove(CacheFlags::DIRTY);
        }
    }

    /// 检查是否是脏块
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(CacheFlags::DIRTY)
    }

    /// 检查某个扇区是否为脏
    pub fn is_sector_dirty(&self, sector: usize) -> bool {
        self.dirty_sectors & (1u64 << sector) != 0
    }

    /// 标记数据有效
    pub fn mark_uptodate(&mut self) {
        self.flags.insert(CacheFlags::UPTODATE);
    }

    /// 检查数据是否有效
    pub fn is_uptodate(&self) -> bool {
        self.flags.contains(CacheFlags::UPTODATE)
    }

    /// 某个扇区的数据
    pub fn sector(&self, sector: usize) -> &[u8] {
        &self.data[sector * SECTOR_SIZE..(sector + 1) * SECTOR_SIZE]
    }
}
