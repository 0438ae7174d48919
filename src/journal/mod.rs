//! 元数据 journal
//!
//! 以“逻辑操作”为单位的 journal：每个 handle 记录一次文件操作（创建、写、
//! 截断、删除）的全部参数，崩溃后按顺序重新执行即可恢复。
//!
//! # 架构概述
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 文件服务（每个请求一个进程）                │
//! └───────────────────────┬──────────────────────────────────┘
//!                         │ start / append / commit / end
//!                         ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                      Journal                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐    │
//! │  │ Transaction  │  │ Handle store │  │   Replay     │    │
//! │  │    table     │  │  (indirect)  │  │   engine     │    │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘    │
//! └─────────┼─────────────────┼─────────────────┼────────────┘
//!           ▼                 ▼                 ▼
//! ┌──────────────────────┐ ┌──────────────┐ ┌──────────────┐
//! │ BlockCache (sector)  │ │BlockAllocator│ │  FileSystem  │
//! └──────────────────────┘ └──────────────┘ └──────────────┘
//! ```
//!
//! # 提交顺序
//!
//! 1. 刷写每个 handle 块
//! 2. 刷写 handle 间接块
//! 3. 置 `active = 1`，刷写 transaction 所在的扇区
//!
//! 单扇区写入是原子的，所以第 3 步是提交点：之前崩溃，重启后 transaction
//! 不可见；之后崩溃，重启后整个 transaction 被重放。
//!
//! 清理顺序相反：先持久化 `active = 0`，再回收 handle 块。
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use jbdfs_core::{Journal, JournalConfig, Handle, ProcessId, FileType};
//!
//! let mut journal = Journal::mount(device, JournalConfig::default())?;
//! journal.recover(&mut fs)?;
//!
//! let pid = ProcessId::new(0x1001)?;
//! journal.start(pid)?;
//! journal.append(pid, Handle::create("/a", FileType::Regular))?;
//! journal.append(pid, Handle::write("/a", 0, b"hi"))?;
//! journal.commit(pid, false)?;
//! // ... 执行真正的文件操作 ...
//! journal.end(pid)?;
//! ```

pub mod types;

mod checksum;
mod handle_store;
mod jbd_journal;
mod recovery;

pub use checksum::header_csum;
pub use jbd_journal::{Journal, JournalMode};
pub use recovery::{RecoveryReport, ReplayOutcome};
pub use types::{Handle, HandleOp, JournalSuperblock, Transaction};

/// Journal 错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalError {
    /// 魔数不对
    BadMagic,
    /// 头部校验和不匹配
    BadChecksum,
    /// active transaction 数超过表容量
    TooManyActive(u32),
    /// 没有可用的 transaction 槽
    NoFreeSlot,
    /// 进程没有绑定 transaction
    NotBound,
    /// handle 序号超出范围
    HandleOutOfRange,
    /// handle 块尚未分配
    HandleNotFound,
    /// 路径过长
    PathTooLong,
    /// 无效的操作码
    BadOperation(u32),
}

impl core::fmt::Display for JournalError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            JournalError::BadMagic => write!(f, "bad journal magic number"),
            JournalError::BadChecksum => write!(f, "journal superblock checksum mismatch"),
            JournalError::TooManyActive(n) => {
                write!(f, "inconsistent journal, active_count = {}", n)
            }
            JournalError::NoFreeSlot => write!(f, "failed to allocate journal transaction slot"),
            JournalError::NotBound => write!(f, "process has no bound transaction"),
            JournalError::HandleOutOfRange => write!(f, "handle index out of range"),
            JournalError::HandleNotFound => write!(f, "handle block not allocated"),
            JournalError::PathTooLong => write!(f, "handle path too long"),
            JournalError::BadOperation(op) => write!(f, "invalid journal handle operation {}", op),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};
    use alloc::string::ToString;

    #[test]
    fn test_error_conversion_fatality() {
        let fatal: Error = JournalError::BadMagic.into();
        assert!(fatal.is_fatal());
        assert_eq!(fatal.kind(), ErrorKind::Corrupted);

        let soft: Error = JournalError::HandleNotFound.into();
        assert!(!soft.is_fatal());
        assert_eq!(soft.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            JournalError::TooManyActive(200).to_string(),
            "inconsistent journal, active_count = 200"
        );
    }
}
