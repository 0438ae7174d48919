//! Journal 管理器
//!
//! 持有块缓存、块分配器和内存中的 transaction 表，负责 transaction 的
//! 生命周期：start → append → commit → end。
//!
//! transaction 表在内存中是权威副本；槽的磁盘内容只通过 `persist_slot`
//! 更新（写入缓存后立即刷写所在扇区），所以一个槽未提交的中间状态不会
//! 随同扇区其他槽的刷写落盘。

use super::{
    recovery::apply_handle,
    types::{Handle, HandleOp, JournalSuperblock, Transaction},
    JournalError,
};
use crate::{
    balloc::{BitmapAllocator, BlockAllocator},
    block::BlockDevice,
    cache::{BlockCache, FreeMap},
    consts::*,
    error::{Error, ErrorKind, Result},
    fs::FileSystem,
    superblock::read_superblock,
    types::{JournalConfig, ProcessId},
};
use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

/// Journal 工作模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JournalMode {
    /// 正常记录
    #[default]
    Normal,
    /// 重放中：start / append / commit / end 都不做任何事
    Replay,
}

/// Journal 管理器
pub struct Journal<D, A = BitmapAllocator> {
    pub(super) cache: BlockCache<D>,
    pub(super) allocator: A,
    pub(super) sb: JournalSuperblock,
    /// 进程 -> transaction 槽
    bindings: BTreeMap<ProcessId, usize>,
    pub(super) mode: JournalMode,
    /// 每个槽最近一次提交时的 handle 数；下标更小的 handle 已经落盘，不能再修改
    committed: Vec<u32>,
    next_tid: u32,
    pub(super) config: JournalConfig,
}

impl<D: BlockDevice> Journal<D, BitmapAllocator> {
    /// 挂载
    ///
    /// 读取文件系统 superblock 确定块数和位图位置，按配置运行块缓存自检，
    /// 然后读取并校验 journal superblock。挂载后应先调用
    /// [`recover`](Journal::recover)。
    pub fn mount(device: D, config: JournalConfig) -> Result<Self> {
        let mut cache = BlockCache::new(device, config.cache_blocks)?;
        let fs_sb = read_superblock(&mut cache)?;
        cache.set_nblocks(fs_sb.nblocks)?;

        let map = FreeMap {
            start: fs_sb.bitmap_start(),
            blocks: fs_sb.bitmap_blocks(),
        };
        cache.set_free_map(map);

        if config.self_test {
            cache.check()?;
        }

        let allocator = BitmapAllocator::new(map, fs_sb.nblocks);
        Self::open(cache, allocator, config)
    }

    /// 空闲块数
    pub fn free_blocks(&mut self) -> Result<u32> {
        self.allocator.free_count(&mut self.cache)
    }
}

impl<D: BlockDevice, A: BlockAllocator> Journal<D, A> {
    /// 在已经配置好的缓存和分配器上打开 journal
    pub fn open(mut cache: BlockCache<D>, allocator: A, config: JournalConfig) -> Result<Self> {
        let sb = JournalSuperblock::decode(cache.block(JOURNAL_BLOCK)?);
        if let Err(e) = sb.check() {
            log::error!("[JBD] {}", e);
            return Err(e.into());
        }
        log::info!("[JBD] journal superblock is good");

        let next_tid = sb
            .table
            .iter()
            .map(|t| t.tid)
            .max()
            .unwrap_or(0)
            .wrapping_add(1)
            .max(1);

        Ok(Self {
            cache,
            allocator,
            sb,
            bindings: BTreeMap::new(),
            mode: JournalMode::Normal,
            committed: vec![0; MAX_TRANSACTIONS],
            next_tid,
            config,
        })
    }

    // ===== 访问器 =====

    /// 块缓存
    pub fn cache(&self) -> &BlockCache<D> {
        &self.cache
    }

    /// 块缓存的可变引用
    pub fn cache_mut(&mut self) -> &mut BlockCache<D> {
        &mut self.cache
    }

    /// 取回块缓存（未刷新的数据留在缓存中）
    pub fn into_cache(self) -> BlockCache<D> {
        self.cache
    }

    /// 块分配器
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// 内存中的 journal superblock
    pub fn superblock(&self) -> &JournalSuperblock {
        &self.sb
    }

    /// 某个槽的 transaction
    pub fn transaction(&self, slot: usize) -> Option<&Transaction> {
        self.sb.table.get(slot)
    }

    /// 进程绑定的槽
    pub fn slot_of(&self, pid: ProcessId) -> Option<usize> {
        self.bindings.get(&pid).copied()
    }

    /// 工作模式
    pub fn mode(&self) -> JournalMode {
        self.mode
    }

    /// 配置
    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    // ===== transaction 生命周期 =====

    /// 为进程开始一个 transaction
    ///
    /// 进程已经绑定时什么也不做。新槽取最后一个已绑定槽之后的位置，
    /// 中间的空洞不复用。
    pub fn start(&mut self, pid: ProcessId) -> Result<()> {
        if self.mode == JournalMode::Replay || self.bindings.contains_key(&pid) {
            return Ok(());
        }

        let slot = match self.sb.table.iter().rposition(|t| t.is_bound()) {
            Some(last) => last + 1,
            None => 0,
        };
        if slot >= MAX_TRANSACTIONS {
            log::error!("[JBD] start: no transaction slot left for process {}", pid);
            return Err(JournalError::NoFreeSlot.into());
        }

        let tid = self.next_tid;
        let t = &mut self.sb.table[slot];
        if t.handle_count != 0 || t.indirect != 0 {
            log::error!("[JBD] start: slot {} still holds {} handles", slot, t.handle_count);
            return Err(Error::fatal(ErrorKind::Corrupted, "unbound transaction slot still holds handles"));
        }
        *t = Transaction {
            active: false,
            owner: pid.raw(),
            tid,
            handle_count: 0,
            indirect: 0,
            ref_count: 1,
        };
        self.next_tid = tid.wrapping_add(1).max(1);
        self.bindings.insert(pid, slot);

        self.persist_slot(slot)?;
        self.update_hints()?;
        log::debug!("[JBD] process {} -> slot {} (tid {})", pid, slot, tid);
        Ok(())
    }

    /// 向进程的 transaction 追加一个 handle
    ///
    /// 超过内联容量的写操作被拆成多个 handle。写操作能与前一个 handle
    /// 合并时直接修改前一个 handle。
    pub fn append(&mut self, pid: ProcessId, handle: Handle) -> Result<()> {
        if self.mode == JournalMode::Replay {
            return Ok(());
        }
        let slot = self.bound_slot(pid)?;
        Handle::check_path(&handle.path)?;

        if let HandleOp::Write { offset, data } = &handle.op {
            if data.len() > WRITE_PAYLOAD_CAPACITY {
                for (i, chunk) in data.chunks(WRITE_PAYLOAD_CAPACITY).enumerate() {
                    let off = offset
                        .checked_add((i * WRITE_PAYLOAD_CAPACITY) as u32)
                        .ok_or(Error::new(ErrorKind::InvalidInput, "write offset overflows"))?;
                    self.append_one(slot, Handle::write(&handle.path, off, chunk))?;
                }
                return Ok(());
            }
        }
        self.append_one(slot, handle)
    }

    fn append_one(&mut self, slot: usize, mut handle: Handle) -> Result<()> {
        if let HandleOp::Write { offset, data } = &handle.op {
            if self.try_coalesce(slot, &handle.path, *offset, data)? {
                return Ok(());
            }
        }

        self.relieve_cache_pressure()?;

        let index = self.sb.table[slot].handle_count;
        let hbno = match self.get_handle(slot, index, true) {
            Ok(bno) => bno,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::error!("[JBD] append: get_handle failed: {}", e);
                return Err(Error::fatal(e.kind(), e.message()));
            }
        };

        let t = &mut self.sb.table[slot];
        t.handle_count += 1;
        handle.tid = t.tid;
        handle.encode(self.cache.block_mut(hbno)?)?;

        log::trace!(
            "[JBD] slot {}: handle {} = {} {} (block {:#x})",
            slot,
            index,
            handle.op.name(),
            handle.path,
            hbno
        );
        Ok(())
    }

    /// 尝试把写操作合并进最后一个 handle
    ///
    /// 已提交的 handle 不参与合并：就地修改会让下一次提交之前的崩溃重放出未提交的数据。
    fn try_coalesce(&mut self, slot: usize, path: &str, offset: u32, data: &[u8]) -> Result<bool> {
        let count = self.sb.table[slot].handle_count;
        if count == 0 || count <= self.committed[slot] {
            return Ok(false);
        }

        let hbno = match self.get_handle(slot, count - 1, false) {
            Ok(bno) => bno,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::warn!("[JBD] coalesce: get_handle failed: {}", e);
                return Ok(false);
            }
        };

        let mut last = Handle::decode(self.cache.block(hbno)?)?;
        if !last.merge_write(path, offset, data) {
            return Ok(false);
        }
        last.encode(self.cache.block_mut(hbno)?)?;
        log::trace!("[JBD] slot {}: merged write into handle {}", slot, count - 1);
        Ok(true)
    }

    /// 脏块即将占满缓存时提前刷写
    ///
    /// 未提交 transaction 的 handle 块和间接块提前落盘是安全的：
    /// 提交点只在 `active` 标志。
    fn relieve_cache_pressure(&mut self) -> Result<()> {
        if self.cache.dirty_count() + 2 >= self.cache.capacity() {
            let n = self.cache.flush_all()?;
            log::debug!("[JBD] cache pressure, flushed {} blocks early", n);
        }
        Ok(())
    }

    /// 提交进程的 transaction
    ///
    /// 先刷写所有 handle 块，再刷写间接块，最后置 `active` 并刷写槽所在扇区。
    /// `create_if_absent` 为真且进程没有 transaction 时先开始一个。
    pub fn commit(&mut self, pid: ProcessId, create_if_absent: bool) -> Result<()> {
        if self.mode == JournalMode::Replay {
            return Ok(());
        }
        if create_if_absent && !self.bindings.contains_key(&pid) {
            self.start(pid)?;
        }
        let slot = self.bound_slot(pid)?;

        let t = self.sb.table[slot];
        if t.handle_count == 0 {
            if t.indirect != 0 {
                return Err(Error::fatal(ErrorKind::Corrupted, "empty transaction owns a handle indirect block"));
            }
            return Ok(());
        }

        // 1. handle 块
        for index in 0..t.handle_count {
            match self.get_handle(slot, index, false) {
                Ok(hbno) => self.cache.flush(hbno)?,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("[JBD] commit: get_handle({}) failed: {}", index, e);
                    return Ok(());
                }
            }
        }

        // 2. 间接块
        self.cache.flush(t.indirect)?;

        // 3. 提交点
        self.sb.table[slot].active = true;
        self.persist_slot(slot)?;
        self.committed[slot] = t.handle_count;

        if !t.active {
            self.sb.active_count += 1;
            self.persist_header()?;
        }
        log::debug!("[JBD] committed tid {} ({} handles) in slot {}", t.tid, t.handle_count, slot);
        Ok(())
    }

    /// 清理一个槽
    ///
    /// 先持久化 `active = 0, owner = 0`，再回收 handle 块和间接块，
    /// 最后持久化清零后的槽。已经为空的槽不做任何事。
    pub fn clear(&mut self, slot: usize) -> Result<()> {
        let t = *self.slot(slot)?;
        if t.is_empty() {
            return Ok(());
        }

        // 1. 撤销提交
        {
            let e = &mut self.sb.table[slot];
            e.active = false;
            e.owner = 0;
        }
        self.persist_slot(slot)?;
        if t.active {
            self.sb.active_count = self.sb.active_count.saturating_sub(1);
            self.persist_header()?;
        }

        // 2. handle 块与间接块
        if t.indirect != 0 {
            if self.allocator.is_block_free(&mut self.cache, t.indirect)? {
                log::warn!("[JBD] clear: slot {} indirect block {:#x} already free", slot, t.indirect);
            } else {
                let count = t.handle_count.min(MAX_HANDLES_PER_TRANSACTION as u32);
                for index in 0..count {
                    if let Err(e) = self.free_handle(slot, index) {
                        if e.is_fatal() {
                            return Err(e);
                        }
                        log::warn!("[JBD] clear: free_handle({}) failed: {}", index, e);
                    }
                }
                self.allocator.free_block(&mut self.cache, t.indirect)?;
            }
        }

        // 3. 清零
        {
            let e = &mut self.sb.table[slot];
            e.indirect = 0;
            e.handle_count = 0;
            e.ref_count = 0;
        }
        self.persist_slot(slot)?;
        self.committed[slot] = 0;

        self.bindings.retain(|_, s| *s != slot);
        log::trace!("[JBD] cleared slot {} (tid {})", slot, t.tid);
        Ok(())
    }

    /// 结束进程的 transaction：清理并解除绑定
    pub fn end(&mut self, pid: ProcessId) -> Result<()> {
        if self.mode == JournalMode::Replay {
            return Ok(());
        }
        let slot = self.bound_slot(pid)?;
        self.clear(slot)?;
        self.bindings.remove(&pid);
        self.update_hints()
    }

    /// 以一个 transaction 执行一组操作
    ///
    /// start、逐个 append、commit，然后对文件系统逐个执行，最后 end。
    /// 执行失败时 transaction 保持已提交状态，下次挂载时会被重放。
    pub fn execute<F: FileSystem>(&mut self, pid: ProcessId, fs: &mut F, handles: &[Handle]) -> Result<()> {
        self.start(pid)?;
        for handle in handles {
            self.append(pid, handle.clone())?;
        }
        self.commit(pid, false)?;

        for (index, handle) in handles.iter().enumerate() {
            if let Err(e) = apply_handle(fs, handle) {
                log::warn!("[JBD] execute: op {} ({} {}) failed: {}", index, handle.op.name(), handle.path, e);
                return Err(e);
            }
        }
        self.end(pid)
    }

    // ===== 内部 =====

    pub(super) fn slot(&self, slot: usize) -> Result<&Transaction> {
        self.sb
            .table
            .get(slot)
            .ok_or(Error::new(ErrorKind::InvalidInput, "transaction slot out of range"))
    }

    fn bound_slot(&self, pid: ProcessId) -> Result<usize> {
        match self.bindings.get(&pid) {
            Some(&slot) => Ok(slot),
            None => {
                log::error!("[JBD] process {} has no transaction", pid);
                Err(JournalError::NotBound.into())
            }
        }
    }

    /// 把一个槽写入缓存并刷写所在扇区
    pub(super) fn persist_slot(&mut self, slot: usize) -> Result<()> {
        let raw = self.slot(slot)?.encode();
        self.cache
            .write_bytes(JOURNAL_BLOCK, Transaction::offset_of(slot), &raw)?;
        self.cache.flush_sector(JOURNAL_BLOCK, Transaction::sector_of(slot))
    }

    /// 重新计算校验和，把头部写入缓存并刷写扇区 0
    pub(super) fn persist_header(&mut self) -> Result<()> {
        self.sb.update_checksum();
        let raw = self.sb.encode_header();
        self.cache.write_bytes(JOURNAL_BLOCK, 0, &raw)?;
        self.cache.flush_sector(JOURNAL_BLOCK, 0)
    }

    /// 更新 first / last 提示
    fn update_hints(&mut self) -> Result<()> {
        let first = self.sb.table.iter().position(|t| t.is_bound());
        let last = self.sb.table.iter().rposition(|t| t.is_bound());
        let (first, last) = match (first, last) {
            (Some(f), Some(l)) => (f as u32, l as u32 + 1),
            _ => (0, 0),
        };
        if (first, last) != (self.sb.first, self.sb.last) {
            self.sb.first = first;
            self.sb.last = last;
            self.persist_header()?;
        }
        Ok(())
    }
}

impl<D, A> core::fmt::Debug for Journal<D, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Journal")
            .field("active_count", &self.sb.active_count)
            .field("bindings", &self.bindings)
            .field("mode", &self.mode)
            .field("next_tid", &self.next_tid)
            .finish()
    }
}
