//! 块缓存模块
//!
//! 按块号把磁盘块按需读入内存，并跟踪哪些扇区被修改过。
//!
//! # 主要组件
//!
//! - [`CacheBuffer`] - 单个缓存块，包含数据、标志和扇区脏位
//! - [`BlockCache`] - 块缓存管理器，使用 lru crate 限制驻留块数
//! - [`CacheFlags`] - 缓存块状态标志
//! - [`CacheStats`] - 缓存统计信息
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use jbdfs_core::cache::{BlockCache, DEFAULT_CACHE_SIZE};
//!
//! let mut cache = BlockCache::new(device, DEFAULT_CACHE_SIZE)?;
//!
//! // 第一次访问时从磁盘读入
//! let magic = &cache.block(1)?[..4];
//!
//! // 修改数据（整块变脏）
//! cache.block_mut(100)?[0] = 42;
//! assert!(cache.is_dirty(100));
//!
//! // 写回并清除脏位
//! cache.flush(100)?;
//! assert!(!cache.is_dirty(100));
//! ```

mod buffer;
mod block_cache;

pub use buffer::{CacheBuffer, CacheFlags};
pub use block_cache::{BlockCache, CacheStats, FreeMap, DEFAULT_CACHE_SIZE};
