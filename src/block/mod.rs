//! 块设备抽象
//!
//! block/device.rs 定义按扇区寻址的设备接口。
//! block/mem.rs 提供内存设备，记录每一次扇区写入，测试用它重建任意写入前缀时刻的磁盘镜像（模拟崩溃）。

mod device;
mod mem;

pub use device::BlockDevice;
pub use mem::{MemDevice, WriteRecord};
