//! 常量定义
//!
//! 磁盘布局由这些常量固定，修改任何一个都会改变磁盘格式。

// ===== 块与扇区 =====

/// 逻辑块大小（字节）
pub const BLOCK_SIZE: usize = 4096;

/// 物理扇区大小（字节）
pub const SECTOR_SIZE: usize = 512;

/// 每块扇区数
pub const SECTORS_PER_BLOCK: usize = BLOCK_SIZE / SECTOR_SIZE;

/// 每个位图块覆盖的块数
pub const BITS_PER_BLOCK: u32 = (BLOCK_SIZE * 8) as u32;

// ===== 磁盘布局 =====

/// 文件系统 superblock 所在块
pub const FS_SUPERBLOCK_BLOCK: u32 = 1;

/// Journal superblock 所在块（紧跟文件系统 superblock）
pub const JOURNAL_BLOCK: u32 = 2;

/// 空闲块位图起始块
pub const BITMAP_START_BLOCK: u32 = 3;

/// 文件系统 superblock 魔数
pub const FS_MAGIC: u32 = 0x4A05_30AE;

/// Journal superblock 魔数（'JBD!'）
pub const JBD_MAGIC: u32 = 0x4A42_4421;

// ===== 路径 =====

/// 路径最大长度（含结尾的 NUL）
pub const MAX_PATH_LEN: usize = 1024;

// ===== Transaction 表 =====

/// 单个 transaction 槽大小，必须是 2 的幂
pub const TRANSACTION_SIZE: usize = 32;

/// Journal superblock 头部大小（占满第一个扇区）
pub const JOURNAL_HEADER_SIZE: usize = SECTOR_SIZE;

/// Transaction 表容量
pub const MAX_TRANSACTIONS: usize = (BLOCK_SIZE - JOURNAL_HEADER_SIZE) / TRANSACTION_SIZE;

/// 每个扇区的 transaction 槽数
pub const TRANSACTIONS_PER_SECTOR: usize = SECTOR_SIZE / TRANSACTION_SIZE;

// ===== Handle =====

/// 每个 transaction 最多的 handle 数（间接块中的指针数）
pub const MAX_HANDLES_PER_TRANSACTION: usize = BLOCK_SIZE / 4;

/// Handle 头部大小：tid + op + path
pub const HANDLE_HEADER_SIZE: usize = 4 + 4 + MAX_PATH_LEN;

/// write handle 内联数据容量（块大小 - 头部 - offset/size 两个字段）
pub const WRITE_PAYLOAD_CAPACITY: usize = BLOCK_SIZE - HANDLE_HEADER_SIZE - 8;

const _: () = assert!(TRANSACTION_SIZE.is_power_of_two());
const _: () = assert!(SECTOR_SIZE % TRANSACTION_SIZE == 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_arithmetic() {
        assert_eq!(SECTORS_PER_BLOCK, 8);
        assert_eq!(MAX_TRANSACTIONS, 112);
        assert_eq!(TRANSACTIONS_PER_SECTOR, 16);
        assert_eq!(MAX_HANDLES_PER_TRANSACTION, 1024);
        assert_eq!(HANDLE_HEADER_SIZE, 1032);
        assert_eq!(WRITE_PAYLOAD_CAPACITY, 3056);
    }
}
