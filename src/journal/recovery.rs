//! 崩溃恢复
//!
//! 挂载后扫描 transaction 表：已提交（active）的 transaction 按 handle
//! 顺序重新执行，然后无条件清理每个槽。重放期间 journal 处于
//! [`JournalMode::Replay`]，文件系统操作不会再次记录。
//!
//! 重放是幂等的：创建已存在的文件、删除不存在的文件都视为已经执行过，
//! 所以重放中途崩溃后再次重放得到相同结果。

use super::{
    jbd_journal::{Journal, JournalMode},
    types::{Handle, HandleOp},
};
use crate::{
    balloc::BlockAllocator,
    block::BlockDevice,
    consts::MAX_TRANSACTIONS,
    error::{ErrorKind, Result},
    fs::FileSystem,
};

/// 单个 transaction 的重放结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// 全部 handle 执行成功
    Replayed(u32),
    /// 没有间接块，跳过
    Skipped,
    /// 中途失败，已执行的 handle 保留
    Aborted {
        /// 失败前执行成功的 handle 数
        applied: u32,
    },
}

/// 恢复统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// 完整重放的 transaction 数
    pub replayed: usize,
    /// 跳过的 transaction 数
    pub skipped: usize,
    /// 中途失败的 transaction 数
    pub aborted: usize,
    /// 执行成功的 handle 总数
    pub handles_applied: usize,
    /// 清理的非空槽数
    pub cleared: usize,
}

impl<D: BlockDevice, A: BlockAllocator> Journal<D, A> {
    /// 恢复：重放所有已提交的 transaction 并清空 transaction 表
    ///
    /// 槽按下标顺序逐个重放、逐个清理，所以排在后面、清理到一半的槽
    /// 要等前面的槽重放完才被清理。上次清理已经释放的 handle 块可能
    /// 还留在它的间接块里；如果文件系统在重放时重新分配到这些块，
    /// 稍后的清理会把它们当作旧 handle 再次释放。[`MemFileSystem`](crate::fs::MemFileSystem)
    /// 不分配块，不受影响；会分配块的文件系统实现需要注意这个窗口。
    pub fn recover<F: FileSystem>(&mut self, fs: &mut F) -> Result<RecoveryReport> {
        let prev = core::mem::replace(&mut self.mode, JournalMode::Replay);
        let result = self.replay_all(fs);
        self.mode = prev;

        let report = result?;
        log::info!(
            "[REPLAY] {} replayed, {} skipped, {} aborted, {} handles, {} slots cleared",
            report.replayed,
            report.skipped,
            report.aborted,
            report.handles_applied,
            report.cleared
        );
        Ok(report)
    }

    fn replay_all<F: FileSystem>(&mut self, fs: &mut F) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for slot in 0..MAX_TRANSACTIONS {
            let t = *self.slot(slot)?;
            if t.active {
                match self.replay_transaction(slot, fs)? {
                    ReplayOutcome::Replayed(n) => {
                        report.replayed += 1;
                        report.handles_applied += n as usize;
                    }
                    ReplayOutcome::Skipped => report.skipped += 1,
                    ReplayOutcome::Aborted { applied } => {
                        report.aborted += 1;
                        report.handles_applied += applied as usize;
                    }
                }
            }
            if !t.is_empty() {
                report.cleared += 1;
            }
            self.clear(slot)?;
        }

        if self.sb.active_count != 0 {
            log::warn!("[REPLAY] active_count {} after recovery, resetting", self.sb.active_count);
            self.sb.active_count = 0;
        }
        self.sb.first = 0;
        self.sb.last = 0;
        self.persist_header()?;
        Ok(report)
    }

    /// 重放一个槽中的 transaction
    ///
    /// 读取失败或某个 handle 执行失败时记录日志并停止，已执行的 handle 不回滚。
    pub fn replay_transaction<F: FileSystem>(&mut self, slot: usize, fs: &mut F) -> Result<ReplayOutcome> {
        let t = *self.slot(slot)?;
        if t.indirect == 0 {
            log::warn!("[REPLAY] slot {} (tid {}): invalid handle indirect block!", slot, t.tid);
            return Ok(ReplayOutcome::Skipped);
        }
        log::info!("[REPLAY] slot {} tid {}: {} handles", slot, t.tid, t.handle_count);

        let mut applied = 0;
        for index in 0..t.handle_count {
            let handle = match self.read_handle(slot, index) {
                Ok(h) => h,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("[REPLAY] read_handle({}) failed: {}", index, e);
                    return Ok(ReplayOutcome::Aborted { applied });
                }
            };

            log::info!(
                "[REPLAY] h_tid = {}, hno = {}, op = {} {}",
                handle.tid,
                index,
                handle.op.name(),
                handle.path
            );
            if let Err(e) = apply_handle(fs, &handle) {
                if e.is_fatal() {
                    return Err(e);
                }
                log::warn!("[REPLAY] {} {} failed: {}", handle.op.name(), handle.path, e);
                return Ok(ReplayOutcome::Aborted { applied });
            }
            applied += 1;
        }
        Ok(ReplayOutcome::Replayed(applied))
    }
}

/// 对文件系统执行一个 handle
pub(crate) fn apply_handle<F: FileSystem>(fs: &mut F, handle: &Handle) -> Result<()> {
    let path = handle.path.as_str();
    match &handle.op {
        HandleOp::Create { file_type } => {
            let mut file = match fs.create_file(path, *file_type) {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    log::debug!("[REPLAY] {} already exists", path);
                    fs.open_file(path)?
                }
                Err(e) => return Err(e),
            };
            fs.flush_file(&mut file)
        }
        // 删除是唯一不需要打开文件的操作
        HandleOp::Delete => match fs.remove_file(path) {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("[REPLAY] {} already removed", path);
                Ok(())
            }
            other => other,
        },
        HandleOp::Write { offset, data } => {
            let mut file = fs.open_file(path)?;
            fs.write_file(&mut file, data, *offset)?;
            fs.flush_file(&mut file)
        }
        HandleOp::Truncate { size } => {
            let mut file = fs.open_file(path)?;
            fs.set_file_size(&mut file, *size)?;
            fs.flush_file(&mut file)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{MemDevice, WriteRecord};
    use crate::consts::*;
    use crate::fs::MemFileSystem;
    use crate::journal::JournalSuperblock;
    use crate::mkfs;
    use crate::types::{FileType, JournalConfig, ProcessId};
    use alloc::vec::Vec;

    fn pid(raw: u32) -> ProcessId {
        ProcessId::new(raw).unwrap()
    }

    fn formatted(nblocks: u32) -> MemDevice {
        let mut dev = MemDevice::new(nblocks as u64);
        mkfs::format(&mut dev, nblocks).unwrap();
        dev
    }

    fn mount(dev: MemDevice) -> Journal<MemDevice> {
        Journal::mount(dev, JournalConfig::default()).unwrap()
    }

    fn scenario() -> [Handle; 3] {
        [
            Handle::create("/a", FileType::Regular),
            Handle::write("/a", 0, b"hi"),
            Handle::write("/a", 2, b"!"),
        ]
    }

    /// 提交但不执行，返回崩溃后的磁盘
    fn committed_image() -> MemDevice {
        let mut j = mount(formatted(64));
        j.start(pid(1)).unwrap();
        for h in scenario() {
            j.append(pid(1), h).unwrap();
        }
        j.commit(pid(1), false).unwrap();
        j.into_cache().into_device()
    }

    #[test]
    fn test_committed_transaction_is_replayed() {
        let dev = committed_image();
        let mut j = mount(dev);
        let mut fs = MemFileSystem::new();
        let free_before = j.free_blocks().unwrap();

        let report = j.recover(&mut fs).unwrap();
        assert_eq!(report.replayed, 1);
        assert_eq!(report.handles_applied, 2);
        assert_eq!(fs.contents("/a").unwrap(), b"hi!");

        // 槽被清空，handle 块被回收
        assert!(j.superblock().table.iter().all(|t| t.is_empty()));
        assert_eq!(j.superblock().active_count, 0);
        assert_eq!(j.free_blocks().unwrap(), free_before + 3);
        assert_eq!(j.mode(), JournalMode::Normal);
    }

    #[test]
    fn test_uncommitted_transaction_is_discarded() {
        let mut j = mount(formatted(64));
        j.start(pid(1)).unwrap();
        j.append(pid(1), Handle::create("/a", FileType::Regular)).unwrap();
        j.cache_mut().flush_all().unwrap();
        let dev = j.into_cache().into_device();

        let mut j = mount(dev);
        let mut fs = MemFileSystem::new();
        let report = j.recover(&mut fs).unwrap();
        assert_eq!(report.replayed, 0);
        assert_eq!(report.cleared, 1);
        assert!(fs.is_empty());
    }

    #[test]
    fn test_replay_is_idempotent() {
        let dev = committed_image();
        let mut fs = MemFileSystem::new();

        // 第一次恢复在清理之前“崩溃”：重放已执行，磁盘保持原样
        {
            let mut j = mount(dev.clone());
            let outcome = j.replay_transaction(0, &mut fs).unwrap();
            assert_eq!(outcome, ReplayOutcome::Replayed(2));
        }
        let once = fs.clone();

        let mut j = mount(dev);
        let report = j.recover(&mut fs).unwrap();
        assert_eq!(report.replayed, 1);
        assert_eq!(report.aborted, 0);
        assert_eq!(fs.contents("/a"), once.contents("/a"));
    }

    #[test]
    fn test_delete_replays_idempotently() {
        let mut fs = MemFileSystem::new();
        apply_handle(&mut fs, &Handle::create("/a", FileType::Regular)).unwrap();
        apply_handle(&mut fs, &Handle::delete("/a")).unwrap();
        apply_handle(&mut fs, &Handle::delete("/a")).unwrap();
        assert!(!fs.exists("/a"));
    }

    #[test]
    fn test_failed_step_aborts_transaction() {
        let mut j = mount(formatted(64));
        j.start(pid(1)).unwrap();
        j.append(pid(1), Handle::create("/a", FileType::Regular)).unwrap();
        j.append(pid(1), Handle::truncate("/missing", 4)).unwrap();
        j.append(pid(1), Handle::create("/b", FileType::Regular)).unwrap();
        j.commit(pid(1), false).unwrap();

        let mut j = mount(j.into_cache().into_device());
        let mut fs = MemFileSystem::new();
        let report = j.recover(&mut fs).unwrap();
        assert_eq!(report.aborted, 1);
        assert_eq!(report.handles_applied, 1);
        assert!(fs.exists("/a"));
        assert!(!fs.exists("/b"));
        assert!(j.superblock().table.iter().all(|t| t.is_empty()));
    }

    #[test]
    fn test_missing_indirect_is_skipped() {
        let mut dev = formatted(64);
        let mut sb = JournalSuperblock::decode(dev.block(JOURNAL_BLOCK));
        sb.table[3].active = true;
        sb.table[3].handle_count = 2;
        sb.active_count = 1;
        sb.update_checksum();
        let mut block = alloc::vec![0u8; BLOCK_SIZE];
        sb.encode(&mut block);
        dev.write_blocks(JOURNAL_BLOCK as u64 * SECTORS_PER_BLOCK as u64, SECTORS_PER_BLOCK as u32, &block)
            .unwrap();

        let mut j = mount(dev);
        let mut fs = MemFileSystem::new();
        let report = j.recover(&mut fs).unwrap();
        assert_eq!(report.skipped, 1);
        assert!(j.transaction(3).unwrap().is_empty());
    }

    #[test]
    fn test_transactions_replay_in_slot_order() {
        let mut j = mount(formatted(64));
        j.start(pid(1)).unwrap();
        j.start(pid(2)).unwrap();
        j.append(pid(1), Handle::create("/a", FileType::Regular)).unwrap();
        j.append(pid(1), Handle::write("/a", 0, b"first")).unwrap();
        j.append(pid(2), Handle::write("/a", 0, b"SECOND")).unwrap();
        j.commit(pid(2), false).unwrap();
        j.commit(pid(1), false).unwrap();

        let mut j = mount(j.into_cache().into_device());
        let mut fs = MemFileSystem::new();
        let report = j.recover(&mut fs).unwrap();
        assert_eq!(report.replayed, 2);
        assert_eq!(fs.contents("/a").unwrap(), b"SECOND");
    }

    /// 在提交过程的每一个写入之后“断电”，重启后要么什么都没发生，要么完整重放
    #[test]
    fn test_commit_is_atomic_under_crash() {
        let mut j = mount(formatted(64));
        j.start(pid(1)).unwrap();
        for h in scenario() {
            j.append(pid(1), h).unwrap();
        }
        let base = j.cache().device().image().to_vec();
        j.cache_mut().device_mut().start_recording();
        j.commit(pid(1), false).unwrap();
        let log: Vec<WriteRecord> = j.cache_mut().device_mut().take_recording();
        assert!(log.len() >= 3);

        for cut in 0..=log.len() {
            let mut dev = MemDevice::from_image(base.clone());
            for record in &log[..cut] {
                dev.apply(record);
            }
            let mut j = mount(dev);
            let mut fs = MemFileSystem::new();
            j.recover(&mut fs).unwrap();

            let committed = log[..cut]
                .iter()
                .any(|r| r.lba == JOURNAL_BLOCK as u64 * SECTORS_PER_BLOCK as u64 + 1);
            if committed {
                assert_eq!(fs.contents("/a").unwrap(), b"hi!", "cut at {}", cut);
            } else {
                assert!(fs.is_empty(), "cut at {}", cut);
            }
            assert!(j.superblock().table.iter().all(|t| t.is_empty()));
        }
    }

    /// 同一个 transaction 第二次提交时断电：第二批操作要么完整重放，要么完全不可见
    #[test]
    fn test_second_commit_is_atomic_under_crash() {
        let mut j = mount(formatted(64));
        j.start(pid(1)).unwrap();
        j.append(pid(1), Handle::create("/a", FileType::Regular)).unwrap();
        j.append(pid(1), Handle::write("/a", 0, b"hi")).unwrap();
        j.commit(pid(1), false).unwrap();

        j.append(pid(1), Handle::write("/a", 2, b"XX")).unwrap();
        j.append(pid(1), Handle::truncate("/a", 3)).unwrap();
        let base = j.cache().device().image().to_vec();
        j.cache_mut().device_mut().start_recording();
        j.commit(pid(1), false).unwrap();
        let log = j.cache_mut().device_mut().take_recording();
        assert!(log.len() >= 3);

        let slot_sector = JOURNAL_BLOCK as u64 * SECTORS_PER_BLOCK as u64 + 1;
        for cut in 0..=log.len() {
            let mut dev = MemDevice::from_image(base.clone());
            for record in &log[..cut] {
                dev.apply(record);
            }
            let mut j = mount(dev);
            let mut fs = MemFileSystem::new();
            j.recover(&mut fs).unwrap();

            if log[..cut].iter().any(|r| r.lba == slot_sector) {
                assert_eq!(fs.contents("/a").unwrap(), b"hiX", "cut at {}", cut);
            } else {
                assert_eq!(fs.contents("/a").unwrap(), b"hi", "cut at {}", cut);
            }
        }
    }

    /// 清理过程中断电，重启后恢复仍能完成并且不重复释放
    #[test]
    fn test_clear_survives_crash() {
        let mut j = mount(formatted(64));
        let free = j.free_blocks().unwrap();
        j.start(pid(1)).unwrap();
        for i in 0..4u32 {
            j.append(pid(1), Handle::truncate("/a", i)).unwrap();
        }
        j.commit(pid(1), false).unwrap();
        let base = j.cache().device().image().to_vec();

        j.cache_mut().device_mut().start_recording();
        j.end(pid(1)).unwrap();
        let log = j.cache_mut().device_mut().take_recording();

        for cut in 0..=log.len() {
            let mut dev = MemDevice::from_image(base.clone());
            for record in &log[..cut] {
                dev.apply(record);
            }
            let mut j = mount(dev);
            let mut fs = MemFileSystem::new();
            j.recover(&mut fs).unwrap();
            assert_eq!(j.free_blocks().unwrap(), free, "cut at {}", cut);
            assert!(j.superblock().table.iter().all(|t| t.is_empty()));
        }
    }
}
