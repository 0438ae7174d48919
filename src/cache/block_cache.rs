//! 按需调页的块缓存
//!
//! 块号即缓存键：同一块号在缓存生命周期内始终映射到同一个缓冲区。
//! 第一次访问一个块时才从磁盘读入（缺页），读入之后再校验块号
//! 和空闲位图，这样诊断信息可以给出具体是哪一个块出错。
//!
//! # 脏块跟踪
//!
//! - [`BlockCache::block_mut`] 把整块标记为脏
//! - [`BlockCache::write_bytes`] 只标记覆盖到的扇区
//! - [`BlockCache::flush`] 写回整块并清除所有脏位
//! - [`BlockCache::flush_sector`] 写回一个扇区并清除该扇区的脏位
//!
//! # 驱逐
//!
//! 缓存满时按 LRU 顺序驱逐**干净**块，被驱逐的块下次访问时重新缺页读入。
//! 绝不驱逐脏块；所有块都脏时返回 `NoSpace`。

use crate::{
    bitmap,
    block::BlockDevice,
    consts::{BITS_PER_BLOCK, BLOCK_SIZE, FS_SUPERBLOCK_BLOCK, SECTORS_PER_BLOCK, SECTOR_SIZE},
    error::{Error, ErrorKind, Result},
};

use super::buffer::CacheBuffer;
use alloc::vec::Vec;
use core::num::NonZeroUsize;
use lru::LruCache;

/// 默认缓存块数量
pub const DEFAULT_CACHE_SIZE: usize = 256;

/// 最小缓存块数量（缺页校验时会嵌套读入位图块）
const MIN_CACHE_SIZE: usize = 4;

/// 缓存统计信息
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// 总访问次数
    pub total_accesses: u64,
    /// 缓存命中次数
    pub hits: u64,
    /// 缺页次数
    pub misses: u64,
    /// 整块写回次数
    pub writebacks: u64,
    /// 单扇区写回次数
    pub sector_writebacks: u64,
    /// 驱逐次数
    pub evictions: u64,
    /// 当前脏块数量
    pub dirty_blocks: usize,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_accesses == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_accesses as f64
        }
    }
}

/// 空闲位图所在区域，用于缺页时校验块已分配
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeMap {
    /// 位图起始块
    pub start: u32,
    /// 位图块数
    pub blocks: u32,
}

/// 块缓存
pub struct BlockCache<D> {
    device: D,

    /// LRU缓存核心：块号 -> 缓冲区
    cache: LruCache<u32, CacheBuffer>,

    /// 文件系统块数，块号必须小于它
    nblocks: u32,

    /// 空闲位图（挂载读到 superblock 之后才设置）
    free_map: Option<FreeMap>,

    stats: CacheStats,
}

impl<D: BlockDevice> BlockCache<D> {
    /// 创建新的块缓存
    ///
    /// # 参数
    ///
    /// * `device` - 底层设备，块大小和扇区大小必须符合磁盘布局
    /// * `capacity` - 缓存容量（块数量）
    pub fn new(device: D, capacity: usize) -> Result<Self> {
        if device.block_size() as usize != BLOCK_SIZE || device.sector_size() as usize != SECTOR_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "device geometry does not match the on-disk layout",
            ));
        }
        let nblocks = u32::try_from(device.total_blocks()).unwrap_or(u32::MAX);
        let capacity = NonZeroUsize::new(capacity.max(MIN_CACHE_SIZE))
            .ok_or(Error::new(ErrorKind::InvalidInput, "cache capacity must be non-zero"))?;
        Ok(Self {
            device,
            cache: LruCache::new(capacity),
            nblocks,
            free_map: None,
            stats: CacheStats::default(),
        })
    }

    /// 底层设备
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 底层设备的可变引用
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// 取回底层设备（丢弃所有未刷新的数据）
    pub fn into_device(self) -> D {
        self.device
    }

    /// 文件系统块数
    pub fn nblocks(&self) -> u32 {
        self.nblocks
    }

    /// 设置文件系统块数（来自 superblock）
    pub fn set_nblocks(&mut self, nblocks: u32) -> Result<()> {
        if nblocks as u64 > self.device.total_blocks() {
            return Err(Error::fatal(
                ErrorKind::Corrupted,
                "superblock block count exceeds device size",
            ));
        }
        self.nblocks = nblocks;
        Ok(())
    }

    /// 设置空闲位图区域，之后每次缺页都会检查块是否已分配
    pub fn set_free_map(&mut self, free_map: FreeMap) {
        self.free_map = Some(free_map);
    }

    /// 校验块号
    ///
    /// 块 0 与超出文件系统范围的块号都是致命错误。
    pub fn check_bno(&self, bno: u32) -> Result<()> {
        if bno == 0 || bno >= self.nblocks {
            log::error!("[CACHE] bad block number {:08x}", bno);
            return Err(Error::fatal(ErrorKind::InvalidInput, "bad block number"));
        }
        Ok(())
    }

    /// 块是否驻留在缓存中
    pub fn is_mapped(&self, bno: u32) -> bool {
        self.cache.contains(&bno)
    }

    /// 块是否有未落盘的修改
    pub fn is_dirty(&self, bno: u32) -> bool {
        self.cache.peek(&bno).map(|buf| buf.is_dirty()).unwrap_or(false)
    }

    /// 只读访问块数据，必要时缺页读入
    pub fn block(&mut self, bno: u32) -> Result<&[u8]> {
        self.check_bno(bno)?;
        self.fault_in(bno)?;
        let buf = self.resident_mut(bno)?;
        Ok(&buf.data)
    }

    /// 可写访问块数据，整块标记为脏
    pub fn block_mut(&mut self, bno: u32) -> Result<&mut [u8]> {
        self.check_bno(bno)?;
        self.fault_in(bno)?;
        let buf = self.resident_mut(bno)?;
        buf.mark_dirty();
        Ok(&mut buf.data)
    }

    /// 写入块内字节范围，只标记覆盖到的扇区为脏
    pub fn write_bytes(&mut self, bno: u32, offset: usize, data: &[u8]) -> Result<()> {
        if offset + data.len() > BLOCK_SIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "write crosses block boundary"));
        }
        self.check_bno(bno)?;
        self.fault_in(bno)?;
        let buf = self.resident_mut(bno)?;
        buf.data[offset..offset + data.len()].copy_from_slice(data);
        buf.mark_dirty_range(offset, data.len());
        Ok(())
    }

    /// 把块刷新到磁盘
    ///
    /// 块不在缓存中或不脏时什么都不做。
    pub fn flush(&mut self, bno: u32) -> Result<()> {
        self.check_bno(bno)?;
        let Some(buf) = self.cache.peek_mut(&bno) else {
            return Ok(());
        };
        if !buf.is_dirty() {
            return Ok(());
        }
        log::debug!("[CACHE] flush block {:#x}", bno);
        let lba = bno as u64 * SECTORS_PER_BLOCK as u64;
        if self.device.write_blocks(lba, SECTORS_PER_BLOCK as u32, &buf.data).is_err() {
            log::error!("[CACHE] write of block {:08x} failed", bno);
            return Err(Error::fatal(ErrorKind::Io, "flush_block: disk write failed"));
        }
        buf.mark_clean();
        self.stats.writebacks += 1;
        Ok(())
    }

    /// 把块中的单个扇区刷新到磁盘
    ///
    /// 单扇区写入被视为原子写入，transaction 表的更新依赖它。
    pub fn flush_sector(&mut self, bno: u32, sector: usize) -> Result<()> {
        self.check_bno(bno)?;
        if sector >= SECTORS_PER_BLOCK {
            return Err(Error::fatal(ErrorKind::InvalidInput, "sector index out of block"));
        }
        let Some(buf) = self.cache.peek_mut(&bno) else {
            return Ok(());
        };
        if !buf.is_sector_dirty(sector) {
            return Ok(());
        }
        log::trace!("[CACHE] flush block {:#x} sector {}", bno, sector);
        let lba = bno as u64 * SECTORS_PER_BLOCK as u64 + sector as u64;
        if self.device.write_blocks(lba, 1, buf.sector(sector)).is_err() {
            log::error!("[CACHE] write of block {:08x} sector {} failed", bno, sector);
            return Err(Error::fatal(ErrorKind::Io, "flush_sector: disk write failed"));
        }
        buf.mark_sector_clean(sector);
        self.stats.sector_writebacks += 1;
        Ok(())
    }

    /// 按块号升序刷新所有脏块
    pub fn flush_all(&mut self) -> Result<usize> {
        let mut dirty: Vec<u32> = self
            .cache
            .iter()
            .filter(|(_, buf)| buf.is_dirty())
            .map(|(bno, _)| *bno)
            .collect();
        dirty.sort_unstable();
        log::debug!("[CACHE] Flushing {} dirty blocks", dirty.len());
        for &bno in &dirty {
            self.flush(bno)?;
        }
        self.device
            .flush()
            .map_err(|_| Error::fatal(ErrorKind::Io, "device flush failed"))?;
        Ok(dirty.len())
    }

    /// 从缓存中丢弃块（不写回）
    ///
    /// 返回块之前是否驻留。
    pub fn evict(&mut self, bno: u32) -> bool {
        self.cache.pop(&bno).is_some()
    }

    /// 块缓存自检
    ///
    /// 改写文件系统 superblock 块并刷新、驱逐、重新读入，验证内容一致后恢复原样。
    pub fn check(&mut self) -> Result<()> {
        const SMASH: &[u8] = b"OOPS!\n\0";
        let bno = FS_SUPERBLOCK_BLOCK;

        let backup = self.block(bno)?.to_vec();

        self.block_mut(bno)?[..SMASH.len()].copy_from_slice(SMASH);
        self.flush(bno)?;
        if !self.is_mapped(bno) || self.is_dirty(bno) {
            return Err(Error::fatal(ErrorKind::Corrupted, "block cache self-test: flush left block dirty"));
        }

        self.evict(bno);
        if self.is_mapped(bno) {
            return Err(Error::fatal(ErrorKind::Corrupted, "block cache self-test: eviction failed"));
        }

        if &self.block(bno)?[..SMASH.len()] != SMASH {
            return Err(Error::fatal(ErrorKind::Corrupted, "block cache self-test: content lost"));
        }

        self.block_mut(bno)?.copy_from_slice(&backup);
        self.flush(bno)?;

        log::info!("[CACHE] block cache is good");
        Ok(())
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.dirty_blocks = self.dirty_count();
        stats
    }

    /// 获取缓存容量
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    /// 获取当前缓存块数量
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// 检查缓存是否为空
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// 获取脏块数量
    pub fn dirty_count(&self) -> usize {
        self.cache.iter().filter(|(_, buf)| buf.is_dirty()).count()
    }

    // 内部辅助方法

    fn resident_mut(&mut self, bno: u32) -> Result<&mut CacheBuffer> {
        let buf = self
            .cache
            .get_mut(&bno)
            .ok_or(Error::fatal(ErrorKind::InvalidState, "faulted block not resident"))?;
        if !buf.is_uptodate() {
            return Err(Error::fatal(ErrorKind::InvalidState, "resident block was never read"));
        }
        Ok(buf)
    }

    /// 缺页处理：块不在缓存中时从磁盘读入
    ///
    /// 校验通过之后才驱逐并插入，所以校验时嵌套读入位图块不会驱逐正在读入的块。
    fn fault_in(&mut self, bno: u32) -> Result<()> {
        self.stats.total_accesses += 1;
        if self.cache.contains(&bno) {
            self.stats.hits += 1;
            return Ok(());
        }

        self.stats.misses += 1;
        let mut buf = CacheBuffer::new(bno, BLOCK_SIZE);
        let lba = bno as u64 * SECTORS_PER_BLOCK as u64;
        if self.device.read_blocks(lba, SECTORS_PER_BLOCK as u32, &mut buf.data).is_err() {
            log::error!("[CACHE] read of block {:08x} failed", bno);
            return Err(Error::fatal(ErrorKind::Io, "block cache fault: disk read failed"));
        }
        buf.mark_uptodate();

        // 读入之后再校验块号
        if bno >= self.nblocks {
            log::error!("[CACHE] reading non-existent block {:08x}", bno);
            return Err(Error::fatal(ErrorKind::Corrupted, "reading non-existent block"));
        }

        if self.bno_is_free(bno, &buf.data)? {
            log::error!("[CACHE] reading free block {:08x}", bno);
            return Err(Error::fatal(ErrorKind::Corrupted, "reading free block"));
        }

        if self.cache.len() >= self.cache.cap().get() {
            self.evict_for_new_block()?;
        }
        self.cache.put(bno, buf);
        log::trace!("[CACHE] fault block {:#x}, cache={}/{}", bno, self.cache.len(), self.cache.cap().get());
        Ok(())
    }

    /// 查询位图中块是否空闲（位为 1 表示空闲）
    ///
    /// `data` 是刚读入、尚未插入缓存的块内容；块本身就是位图块时直接查它。
    fn bno_is_free(&mut self, bno: u32, data: &[u8]) -> Result<bool> {
        let Some(map) = self.free_map else {
            return Ok(false);
        };
        let index = bno / BITS_PER_BLOCK;
        if index >= map.blocks {
            return Err(Error::fatal(ErrorKind::Corrupted, "block not covered by free bitmap"));
        }
        let bitmap_bno = map.start + index;
        let bit = bno % BITS_PER_BLOCK;
        if bitmap_bno == bno {
            return Ok(bitmap::test_bit(data, bit));
        }
        // 位图块自身的校验最多再嵌套一层
        self.fault_in(bitmap_bno)?;
        let map_data = &self.resident_mut(bitmap_bno)?.data;
        Ok(bitmap::test_bit(map_data, bit))
    }

    /// 按 LRU 顺序驱逐一个干净块
    fn evict_for_new_block(&mut self) -> Result<()> {
        // rev() 从最久未使用的一端开始
        let victim = self
            .cache
            .iter()
            .rev()
            .find(|(_, buf)| !buf.is_dirty())
            .map(|(bno, _)| *bno);

        match victim {
            Some(bno) => {
                self.cache.pop(&bno);
                self.stats.evictions += 1;
                log::debug!("[CACHE] Evicted clean block {:#x}", bno);
                Ok(())
            }
            None => {
                log::error!("[CACHE] Cannot evict: all {} blocks are dirty! Need flush before fault.", self.cache.len());
                Err(Error::new(
                    ErrorKind::NoSpace,
                    "All cache blocks are dirty, cannot evict",
                ))
            }
        }
    }
}

impl<D> core::fmt::Debug for BlockCache<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockCache")
            .field("capacity", &self.cache.cap())
            .field("len", &self.cache.len())
            .field("nblocks", &self.nblocks)
            .field("free_map", &self.free_map)
            .field("stats", &self.stats)
            .finish()
    }
}
