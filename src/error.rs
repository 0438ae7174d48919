//! 错误类型定义
//!
//! 提供块缓存与 journal 操作的错误类型。
//!
//! 致命错误（磁盘 I/O 失败、superblock 损坏、不变量被破坏）通过
//! [`Error::fatal`] 构造，会记录产生错误的源码位置，调用者应当停机，
//! 不做重试。

use core::fmt;
use core::panic::Location;

/// 块缓存 / journal 操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
    location: Option<&'static Location<'static>>,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// I/O 错误
    Io,
    /// 无效参数
    InvalidInput,
    /// 文件系统损坏
    Corrupted,
    /// 文件不存在
    NotFound,
    /// 已存在
    AlreadyExists,
    /// 空间不足
    NoSpace,
    /// 不支持的操作
    Unsupported,
    /// 无效状态
    InvalidState,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self {
            kind,
            message,
            location: None,
        }
    }

    /// 创建致命错误，记录调用位置
    #[track_caller]
    pub fn fatal(kind: ErrorKind, message: &'static str) -> Self {
        Self {
            kind,
            message,
            location: Some(Location::caller()),
        }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// 产生错误的源码位置（仅致命错误）
    pub fn location(&self) -> Option<&'static Location<'static>> {
        self.location
    }

    /// 是否为致命错误
    ///
    /// 致命错误意味着调用者必须停机；其余错误是可预期的返回值。
    pub fn is_fatal(&self) -> bool {
        self.location.is_some()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{}:{}: {:?}: {}",
                loc.file(),
                loc.line(),
                self.kind,
                self.message
            ),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

// Journal error conversion
impl From<crate::journal::JournalError> for Error {
    #[track_caller]
    fn from(err: crate::journal::JournalError) -> Self {
        use crate::journal::JournalError;
        match err {
            JournalError::BadMagic => Error::fatal(ErrorKind::Corrupted, "bad journal magic number"),
            JournalError::BadChecksum => {
                Error::fatal(ErrorKind::Corrupted, "journal superblock checksum mismatch")
            }
            JournalError::TooManyActive(_) => {
                Error::fatal(ErrorKind::Corrupted, "inconsistent journal, too many active transactions")
            }
            JournalError::NoFreeSlot => {
                Error::fatal(ErrorKind::NoSpace, "failed to allocate journal transaction slot")
            }
            JournalError::NotBound => {
                Error::fatal(ErrorKind::InvalidState, "process has no bound transaction")
            }
            JournalError::HandleOutOfRange => {
                Error::new(ErrorKind::InvalidInput, "handle index out of range")
            }
            JournalError::HandleNotFound => Error::new(ErrorKind::NotFound, "handle block not allocated"),
            JournalError::PathTooLong => Error::new(ErrorKind::InvalidInput, "handle path too long"),
            JournalError::BadOperation(_) => {
                Error::new(ErrorKind::Corrupted, "invalid journal handle operation")
            }
        }
    }
}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_plain_error_is_not_fatal() {
        let err = Error::new(ErrorKind::NotFound, "missing");
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "NotFound: missing");
    }

    #[test]
    fn test_fatal_error_carries_location() {
        let err = Error::fatal(ErrorKind::Io, "disk gone");
        assert!(err.is_fatal());
        let loc = err.location().unwrap();
        assert!(loc.file().ends_with("error.rs"));
        let text = err.to_string();
        assert!(text.contains("error.rs:"));
        assert!(text.ends_with("Io: disk gone"));
    }
}
