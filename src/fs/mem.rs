//! 内存文件系统

use super::FileSystem;
use crate::{
    error::{Error, ErrorKind, Result},
    types::FileType,
};
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Node {
    file_type: FileType,
    data: Vec<u8>,
}

/// 打开的内存文件（只记录路径）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemFile {
    path: String,
}

impl MemFile {
    /// 文件路径
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// 扁平的内存文件系统
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemFileSystem {
    nodes: BTreeMap<String, Node>,
    flushes: usize,
}

impl MemFileSystem {
    /// 空文件系统
    pub fn new() -> Self {
        Self::default()
    }

    /// 文件内容
    pub fn contents(&self, path: &str) -> Option<&[u8]> {
        self.nodes.get(path).map(|n| n.data.as_slice())
    }

    /// 文件类型
    pub fn file_type(&self, path: &str) -> Option<FileType> {
        self.nodes.get(path).map(|n| n.file_type)
    }

    /// 文件是否存在
    pub fn exists(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    /// 文件数
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 是否没有文件
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 累计 flush 次数
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    fn node_mut(&mut self, path: &str) -> Result<&mut Node> {
        self.nodes
            .get_mut(path)
            .ok_or(Error::new(ErrorKind::NotFound, "no such file"))
    }
}

impl FileSystem for MemFileSystem {
    type File = MemFile;

    fn create_file(&mut self, path: &str, file_type: FileType) -> Result<MemFile> {
        if self.nodes.contains_key(path) {
            return Err(Error::new(ErrorKind::AlreadyExists, "file exists"));
        }
        self.nodes.insert(
            path.to_string(),
            Node {
                file_type,
                data: Vec::new(),
            },
        );
        Ok(MemFile { path: path.to_string() })
    }

    fn open_file(&mut self, path: &str) -> Result<MemFile> {
        if !self.nodes.contains_key(path) {
            return Err(Error::new(ErrorKind::NotFound, "no such file"));
        }
        Ok(MemFile { path: path.to_string() })
    }

    fn write_file(&mut self, file: &mut MemFile, buf: &[u8], offset: u32) -> Result<usize> {
        let node = self.node_mut(&file.path)?;
        if node.file_type == FileType::Directory {
            return Err(Error::new(ErrorKind::InvalidInput, "is a directory"));
        }
        let start = offset as usize;
        let end = start + buf.len();
        if end > node.data.len() {
            node.data.resize(end, 0);
        }
        node.data[start..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn set_file_size(&mut self, file: &mut MemFile, size: u32) -> Result<()> {
        let node = self.node_mut(&file.path)?;
        if node.file_type == FileType::Directory {
            return Err(Error::new(ErrorKind::InvalidInput, "is a directory"));
        }
        node.data.resize(size as usize, 0);
        Ok(())
    }

    fn remove_file(&mut self, path: &str) -> Result<()> {
        self.nodes
            .remove(path)
            .map(|_| ())
            .ok_or(Error::new(ErrorKind::NotFound, "no such file"))
    }

    fn flush_file(&mut self, file: &mut MemFile) -> Result<()> {
        self.node_mut(&file.path)?;
        self.flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_write_truncate() {
        let mut fs = MemFileSystem::new();
        let mut f = fs.create_file("/a", FileType::Regular).unwrap();
        assert_eq!(fs.write_file(&mut f, b"hello", 2).unwrap(), 5);
        assert_eq!(fs.contents("/a").unwrap(), b"\0\0hello");

        fs.set_file_size(&mut f, 3).unwrap();
        assert_eq!(fs.contents("/a").unwrap(), b"\0\0h");
        fs.flush_file(&mut f).unwrap();
        assert_eq!(fs.flushes(), 1);
    }

    #[test]
    fn test_create_existing_and_remove_missing() {
        let mut fs = MemFileSystem::new();
        fs.create_file("/a", FileType::Regular).unwrap();
        let err = fs.create_file("/a", FileType::Regular).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        fs.remove_file("/a").unwrap();
        assert_eq!(fs.remove_file("/a").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(fs.open_file("/a").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_directories_reject_data() {
        let mut fs = MemFileSystem::new();
        let mut d = fs.create_file("/d", FileType::Directory).unwrap();
        assert!(fs.write_file(&mut d, b"x", 0).is_err());
        assert_eq!(fs.file_type("/d"), Some(FileType::Directory));
    }
}
