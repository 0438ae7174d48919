//! 文件系统 Superblock 操作模块
//!
//! 块 1 存放文件系统 superblock。journal 只关心其中的魔数与块数：
//! 块数决定块缓存可访问的范围和空闲位图的大小。

mod read;
mod write;

pub use read::*;
pub use write::*;

use crate::consts::{BITMAP_START_BLOCK, BITS_PER_BLOCK};

/// 文件系统 superblock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsSuperblock {
    /// 魔数
    pub magic: u32,
    /// 文件系统总块数
    pub nblocks: u32,
}

impl FsSuperblock {
    /// 位图起始块
    pub fn bitmap_start(&self) -> u32 {
        BITMAP_START_BLOCK
    }

    /// 位图块数
    pub fn bitmap_blocks(&self) -> u32 {
        self.nblocks.div_ceil(BITS_PER_BLOCK)
    }

    /// 第一个可分配的数据块
    pub fn first_data_block(&self) -> u32 {
        self.bitmap_start() + self.bitmap_blocks()
    }
}
