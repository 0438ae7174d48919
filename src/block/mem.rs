//! 内存块设备
//!
//! 以 `Vec<u8>` 作为磁盘介质。可以记录每一次扇区写入（[`WriteRecord`]），
//! 把记录的任意前缀重放到旧镜像上，就得到“在第 N 次写入之后断电”时的磁盘内容。

use super::BlockDevice;
use crate::consts::{BLOCK_SIZE, SECTOR_SIZE};
use crate::error::{Error, ErrorKind, Result};
use alloc::vec;
use alloc::vec::Vec;

/// 一次扇区写入
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// 起始扇区号
    pub lba: u64,
    /// 写入的数据（扇区大小的整数倍）
    pub data: Vec<u8>,
}

/// 内存块设备
#[derive(Debug, Clone)]
pub struct MemDevice {
    storage: Vec<u8>,
    total_blocks: u64,
    recording: Option<Vec<WriteRecord>>,
    faulty: bool,
    sector_writes: u64,
}

impl MemDevice {
    /// 创建全零设备
    pub fn new(total_blocks: u64) -> Self {
        Self::from_image(vec![0u8; total_blocks as usize * BLOCK_SIZE])
    }

    /// 从磁盘镜像创建设备（长度向下取整到整块）
    pub fn from_image(mut image: Vec<u8>) -> Self {
        let total_blocks = (image.len() / BLOCK_SIZE) as u64;
        image.truncate(total_blocks as usize * BLOCK_SIZE);
        Self {
            storage: image,
            total_blocks,
            recording: None,
            faulty: false,
            sector_writes: 0,
        }
    }

    /// 当前磁盘内容
    pub fn image(&self) -> &[u8] {
        &self.storage
    }

    /// 读取一个块的磁盘内容（不经过缓存）
    pub fn block(&self, bno: u32) -> &[u8] {
        let start = bno as usize * BLOCK_SIZE;
        &self.storage[start..start + BLOCK_SIZE]
    }

    /// 开始记录写入（丢弃之前的记录）
    pub fn start_recording(&mut self) {
        self.recording = Some(Vec::new());
    }

    /// 取出写入记录并停止记录
    pub fn take_recording(&mut self) -> Vec<WriteRecord> {
        self.recording.take().unwrap_or_default()
    }

    /// 把一条写入记录应用到磁盘内容
    pub fn apply(&mut self, record: &WriteRecord) {
        let start = record.lba as usize * SECTOR_SIZE;
        self.storage[start..start + record.data.len()].copy_from_slice(&record.data);
    }

    /// 模拟硬件故障：之后的读写全部失败
    pub fn set_faulty(&mut self, faulty: bool) {
        self.faulty = faulty;
    }

    /// 累计写入的扇区数
    pub fn sector_writes(&self) -> u64 {
        self.sector_writes
    }

    fn range(&self, lba: u64, count: u32) -> Result<core::ops::Range<usize>> {
        let start = lba as usize * SECTOR_SIZE;
        let end = start + count as usize * SECTOR_SIZE;
        if end > self.storage.len() {
            return Err(Error::fatal(ErrorKind::Io, "sector range beyond end of device"));
        }
        Ok(start..end)
    }
}

impl BlockDevice for MemDevice {
    fn block_size(&self) -> u32 {
        BLOCK_SIZE as u32
    }

    fn sector_size(&self) -> u32 {
        SECTOR_SIZE as u32
    }

    fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    fn read_blocks(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
        if self.faulty {
            return Err(Error::fatal(ErrorKind::Io, "device read failed"));
        }
        let range = self.range(lba, count)?;
        let len = range.len();
        buf[..len].copy_from_slice(&self.storage[range]);
        Ok(len)
    }

    fn write_blocks(&mut self, lba: u64, count: u32, buf: &[u8]) -> Result<usize> {
        if self.faulty {
            return Err(Error::fatal(ErrorKind::Io, "device write failed"));
        }
        let range = self.range(lba, count)?;
        let len = range.len();
        self.storage[range].copy_from_slice(&buf[..len]);
        self.sector_writes += count as u64;
        if let Some(log) = &mut self.recording {
            log.push(WriteRecord {
                lba,
                data: buf[..len].to_vec(),
            });
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_sectors() {
        let mut dev = MemDevice::new(4);
        let data = [0x5au8; SECTOR_SIZE];
        dev.write_blocks(9, 1, &data).unwrap();

        let mut buf = [0u8; SECTOR_SIZE];
        dev.read_blocks(9, 1, &mut buf).unwrap();
        assert_eq!(buf, data);
        assert_eq!(dev.sector_writes(), 1);
        assert_eq!(dev.block(1)[SECTOR_SIZE], 0x5a);
    }

    #[test]
    fn test_out_of_range_is_fatal() {
        let mut dev = MemDevice::new(1);
        let mut buf = [0u8; SECTOR_SIZE];
        let err = dev.read_blocks(8, 1, &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_recording_prefix_rebuilds_image() {
        let mut dev = MemDevice::new(2);
        let base = dev.image().to_vec();

        dev.start_recording();
        dev.write_blocks(0, 1, &[1u8; SECTOR_SIZE]).unwrap();
        dev.write_blocks(1, 1, &[2u8; SECTOR_SIZE]).unwrap();
        let log = dev.take_recording();
        assert_eq!(log.len(), 2);

        let mut crashed = MemDevice::from_image(base);
        crashed.apply(&log[0]);
        assert_eq!(crashed.image()[0], 1);
        assert_eq!(crashed.image()[SECTOR_SIZE], 0);
    }

    #[test]
    fn test_faulty_device() {
        let mut dev = MemDevice::new(1);
        dev.set_faulty(true);
        let mut buf = [0u8; SECTOR_SIZE];
        assert!(dev.read_blocks(0, 1, &mut buf).is_err());
        assert!(dev.write_blocks(0, 1, &buf).is_err());
    }
}
