//! 文件系统接口
//!
//! journal 重放 handle 时通过 [`FileSystem`] 调用真正的文件操作。
//! 所有路径都是绝对路径，按字节比较。
//!
//! [`MemFileSystem`] 是一个扁平的内存实现，用于测试和演示。

mod mem;

pub use mem::{MemFile, MemFileSystem};

use crate::{error::Result, types::FileType};

/// 重放所需的文件操作
pub trait FileSystem {
    /// 打开的文件
    type File;

    /// 创建文件，已存在时返回 `AlreadyExists`
    fn create_file(&mut self, path: &str, file_type: FileType) -> Result<Self::File>;

    /// 打开文件，不存在时返回 `NotFound`
    fn open_file(&mut self, path: &str) -> Result<Self::File>;

    /// 在 `offset` 处写入，返回写入的字节数
    fn write_file(&mut self, file: &mut Self::File, buf: &[u8], offset: u32) -> Result<usize>;

    /// 设置文件大小（截断或用 0 扩展）
    fn set_file_size(&mut self, file: &mut Self::File, size: u32) -> Result<()>;

    /// 按路径删除文件，不存在时返回 `NotFound`
    fn remove_file(&mut self, path: &str) -> Result<()>;

    /// 把文件数据刷到磁盘
    fn flush_file(&mut self, file: &mut Self::File) -> Result<()>;
}
