//! 空闲块位图
//!
//! 位图中位为 1 表示块**空闲**，为 0 表示已分配。按字节寻址，
//! 第 n 位位于第 `n / 8` 字节的第 `n % 8` 位（与按小端 u32 字寻址等价）。

mod ops;

pub use ops::*;
