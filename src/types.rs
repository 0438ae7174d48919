//! 公共类型定义
//!
//! 进程标识、文件类型以及 journal 配置。

use crate::error::{Error, ErrorKind, Result};
use core::fmt;

/// 进程标识
///
/// 0 保留为“未绑定”，磁盘上的 transaction 槽用它表示空闲。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(u32);

impl ProcessId {
    /// 创建进程标识，0 无效
    pub fn new(raw: u32) -> Result<Self> {
        if raw == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "process id 0 is reserved"));
        }
        Ok(Self(raw))
    }

    /// 原始值
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// 文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum FileType {
    /// 普通文件
    #[default]
    Regular = 0,
    /// 目录
    Directory = 1,
}

impl FileType {
    /// 从磁盘编码解析
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(FileType::Regular),
            1 => Some(FileType::Directory),
            _ => None,
        }
    }

    /// 磁盘编码
    pub fn to_raw(self) -> u32 {
        self as u32
    }
}

/// Journal 配置
#[derive(Debug, Clone, Copy)]
pub struct JournalConfig {
    /// 块缓存大小（块数）
    pub cache_blocks: usize,
    /// 挂载时运行块缓存自检
    pub self_test: bool,
    /// handle / 间接块分配的起始提示
    pub alloc_hint: u32,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            cache_blocks: crate::cache::DEFAULT_CACHE_SIZE,
            self_test: true,
            alloc_hint: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_id_rejects_zero() {
        assert_eq!(ProcessId::new(0).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(ProcessId::new(0x1001).unwrap().raw(), 0x1001);
    }

    #[test]
    fn test_file_type_encoding() {
        assert_eq!(FileType::from_raw(0), Some(FileType::Regular));
        assert_eq!(FileType::from_raw(1), Some(FileType::Directory));
        assert_eq!(FileType::from_raw(7), None);
        assert_eq!(FileType::Directory.to_raw(), 1);
    }
}
