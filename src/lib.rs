//! jbdfs_core: 带元数据 journal 的块缓存
//!
//! 这是一个 `no_std` 库，为一个简单的文件系统服务提供：
//! - **块缓存**：按需读入磁盘块，按扇区跟踪脏数据，LRU 驱逐干净块
//! - **逻辑 journal**：以文件操作为单位记录 transaction，提交点是单个扇区写入
//! - **崩溃恢复**：挂载时重放已提交的 transaction 并回收全部 journal 存储
//!
//! # 示例
//!
//! ```rust,ignore
//! use jbdfs_core::{mkfs, FileType, Handle, Journal, JournalConfig, MemDevice, MemFileSystem, ProcessId};
//!
//! fn main() -> jbdfs_core::Result<()> {
//!     let mut device = MemDevice::new(1024);
//!     mkfs::format(&mut device, 1024)?;
//!
//!     let mut fs = MemFileSystem::new();
//!     let mut journal = Journal::mount(device, JournalConfig::default())?;
//!     journal.recover(&mut fs)?;
//!
//!     let pid = ProcessId::new(0x1001)?;
//!     journal.execute(pid, &mut fs, &[
//!         Handle::create("/a", FileType::Regular),
//!         Handle::write("/a", 0, b"hi"),
//!     ])?;
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`block`] - 块设备抽象
//! - [`consts`] - 磁盘布局常量
//! - [`types`] - 进程标识、文件类型、配置
//! - [`superblock`] - 文件系统 superblock
//! - [`cache`] - 块缓存
//! - [`bitmap`] / [`balloc`] - 空闲位图与块分配
//! - [`fs`] - 重放使用的文件系统接口
//! - [`journal`] - transaction 与恢复
//! - [`mkfs`] - 格式化

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 块设备抽象
pub mod block;

/// 常量定义
pub mod consts;

/// 公共类型
pub mod types;

/// 文件系统 Superblock
pub mod superblock;

/// 块缓存
pub mod cache;

/// 位图操作
pub mod bitmap;

/// 块分配
pub mod balloc;

/// 文件系统接口
pub mod fs;

/// Journal
pub mod journal;

/// 格式化
pub mod mkfs;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 块设备
pub use block::{BlockDevice, MemDevice, WriteRecord};

// 类型
pub use types::{FileType, JournalConfig, ProcessId};

// Superblock
pub use superblock::{read_superblock, FsSuperblock};

// Cache
pub use cache::{BlockCache, CacheBuffer, CacheFlags, CacheStats, FreeMap, DEFAULT_CACHE_SIZE};

// 块分配
pub use balloc::{BitmapAllocator, BlockAllocator};

// 文件系统
pub use fs::{FileSystem, MemFile, MemFileSystem};

// Journal
pub use journal::{
    Handle, HandleOp, Journal, JournalError, JournalMode, JournalSuperblock, RecoveryReport,
    ReplayOutcome, Transaction,
};
