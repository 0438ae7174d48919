//! 扇区设备接口

use crate::error::Result;

/// 块设备
///
/// 块缓存只通过这个 trait 访问磁盘。寻址单位是扇区（LBA），
/// 一个块占 `block_size / sector_size` 个连续扇区，块 `n` 从扇区
/// `n * 8` 开始。
///
/// ```rust,ignore
/// struct Ide;
///
/// impl BlockDevice for Ide {
///     fn block_size(&self) -> u32 { 4096 }
///     fn sector_size(&self) -> u32 { 512 }
///     fn total_blocks(&self) -> u64 { ide_capacity() / 8 }
///
///     fn read_blocks(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
///         ide_read(lba, buf, count)?;
///         Ok(count as usize * 512)
///     }
///
///     fn write_blocks(&mut self, lba: u64, count: u32, buf: &[u8]) -> Result<usize> {
///         ide_write(lba, buf, count)?;
///         Ok(count as usize * 512)
///     }
/// }
/// ```
pub trait BlockDevice {
    /// 块大小，必须是 4096
    fn block_size(&self) -> u32;

    /// 扇区大小，必须是 512
    fn sector_size(&self) -> u32;

    /// 设备容量（块）
    fn total_blocks(&self) -> u64;

    /// 从 `lba` 开始读 `count` 个扇区到 `buf`，返回读取的字节数
    fn read_blocks(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize>;

    /// 把 `buf` 写到从 `lba` 开始的 `count` 个扇区，返回写入的字节数
    ///
    /// 单个扇区的写入必须是原子的：断电时要么完整落盘，要么完全没有。
    /// transaction 的提交点依赖这一点。
    fn write_blocks(&mut self, lba: u64, count: u32, buf: &[u8]) -> Result<usize>;

    /// 等待设备写缓存落盘
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
