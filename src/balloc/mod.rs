//! 块分配模块
//!
//! journal 通过 [`BlockAllocator`] trait 使用空闲块分配服务：handle 块和
//! 间接块都是普通的已分配块，只由 transaction 状态引用。
//!
//! [`BitmapAllocator`] 是基于空闲位图（位为 1 表示空闲）的实现，
//! 位图本身存放在块缓存中。

mod alloc;
mod free;

pub use self::alloc::BitmapAllocator;

use crate::{block::BlockDevice, cache::BlockCache, error::Result};

/// 空闲块分配服务
pub trait BlockAllocator {
    /// 分配一个块，从 `hint` 开始查找
    fn alloc_block<D: BlockDevice>(&mut self, cache: &mut BlockCache<D>, hint: u32) -> Result<u32>;

    /// 释放一个块
    fn free_block<D: BlockDevice>(&mut self, cache: &mut BlockCache<D>, bno: u32) -> Result<()>;

    /// 块是否空闲
    fn is_block_free<D: BlockDevice>(&self, cache: &mut BlockCache<D>, bno: u32) -> Result<bool>;
}
