//! Journal 磁盘格式定义
//!
//! # 布局
//!
//! ```text
//! JOURNAL_BLOCK（4096 字节）
//! ┌──────────────────────────── 扇区 0 ────────────────────────────┐
//! │ magic │ active_count │ first │ last │ checksum │ padding ...    │
//! ├──────────────────────────── 扇区 1..8 ─────────────────────────┤
//! │ Transaction[0] │ Transaction[1] │ ... │ Transaction[111]        │
//! └────────────────────────────────────────────────────────────────┘
//!
//! Handle 块（4096 字节）
//! ┌─────┬────┬──────────────┬──────────────────────────────────────┐
//! │ tid │ op │ path[1024]   │ params（按 op 解释）                  │
//! └─────┴────┴──────────────┴──────────────────────────────────────┘
//! ```
//!
//! 所有字段都是小端序。每个 transaction 槽 32 字节，16 个槽恰好占满一个扇区，
//! 所以更新一个槽只需要写一个扇区。

use super::JournalError;
use crate::{
    consts::*,
    error::{Error, ErrorKind, Result},
    types::FileType,
};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use byteorder::{ByteOrder, LittleEndian};

// =============================================================================
// Handle operation codes
// =============================================================================

/// 创建文件
pub const JBD_CREATE: u32 = 1;
/// 写文件
pub const JBD_WRITE: u32 = 2;
/// 设置文件大小
pub const JBD_TRUNCATE: u32 = 3;
/// 删除文件
pub const JBD_DELETE: u32 = 4;

// =============================================================================
// Transaction
// =============================================================================

/// Transaction 表中的一个槽
///
/// | 偏移 | 字段 |
/// |------|------|
/// | 0  | active |
/// | 4  | owner（进程号，0 表示未绑定）|
/// | 8  | tid |
/// | 12 | handle_count |
/// | 16 | indirect（handle 间接块号）|
/// | 20 | ref_count |
/// | 24 | padding |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transaction {
    /// 已提交，可以被重放
    pub active: bool,
    /// 绑定的进程
    pub owner: u32,
    /// Transaction ID
    pub tid: u32,
    /// handle 数量
    pub handle_count: u32,
    /// handle 间接块（0 表示尚未分配）
    pub indirect: u32,
    /// 引用计数
    pub ref_count: u32,
}

impl Transaction {
    /// 从 32 字节槽解析
    pub fn decode(raw: &[u8]) -> Self {
        Self {
            active: LittleEndian::read_u32(&raw[0..4]) != 0,
            owner: LittleEndian::read_u32(&raw[4..8]),
            tid: LittleEndian::read_u32(&raw[8..12]),
            handle_count: LittleEndian::read_u32(&raw[12..16]),
            indirect: LittleEndian::read_u32(&raw[16..20]),
            ref_count: LittleEndian::read_u32(&raw[20..24]),
        }
    }

    /// 编码为 32 字节槽
    pub fn encode(&self) -> [u8; TRANSACTION_SIZE] {
        let mut raw = [0u8; TRANSACTION_SIZE];
        LittleEndian::write_u32(&mut raw[0..4], self.active as u32);
        LittleEndian::write_u32(&mut raw[4..8], self.owner);
        LittleEndian::write_u32(&mut raw[8..12], self.tid);
        LittleEndian::write_u32(&mut raw[12..16], self.handle_count);
        LittleEndian::write_u32(&mut raw[16..20], self.indirect);
        LittleEndian::write_u32(&mut raw[20..24], self.ref_count);
        raw
    }

    /// 是否绑定到某个进程
    pub fn is_bound(&self) -> bool {
        self.owner != 0
    }

    /// 槽是否完全空闲（无需清理）
    pub fn is_empty(&self) -> bool {
        !self.active && self.owner == 0 && self.handle_count == 0 && self.indirect == 0
    }

    /// 槽在 journal 块中的字节偏移
    pub fn offset_of(slot: usize) -> usize {
        JOURNAL_HEADER_SIZE + slot * TRANSACTION_SIZE
    }

    /// 槽所在的扇区
    pub fn sector_of(slot: usize) -> usize {
        let sector = Self::offset_of(slot) / SECTOR_SIZE;
        debug_assert_eq!(sector, 1 + slot / TRANSACTIONS_PER_SECTOR);
        sector
    }
}

// =============================================================================
// Journal superblock
// =============================================================================

/// Journal superblock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalSuperblock {
    /// 魔数（JBD_MAGIC）
    pub magic: u32,
    /// 已提交（active）的 transaction 数
    pub active_count: u32,
    /// 第一个已绑定槽
    pub first: u32,
    /// 最后一个已绑定槽之后的位置（没有绑定时为 0）
    pub last: u32,
    /// 头部校验和（0 表示未启用）
    pub checksum: u32,
    /// Transaction 表
    pub table: Vec<Transaction>,
}

impl JournalSuperblock {
    /// 空 journal
    pub fn empty() -> Self {
        let mut sb = Self {
            magic: JBD_MAGIC,
            active_count: 0,
            first: 0,
            last: 0,
            checksum: 0,
            table: alloc::vec![Transaction::default(); MAX_TRANSACTIONS],
        };
        sb.checksum = sb.header_checksum();
        sb
    }

    /// 从 journal 块解析
    pub fn decode(block: &[u8]) -> Self {
        let table = (0..MAX_TRANSACTIONS)
            .map(|slot| {
                let offset = Transaction::offset_of(slot);
                Transaction::decode(&block[offset..offset + TRANSACTION_SIZE])
            })
            .collect();
        Self {
            magic: LittleEndian::read_u32(&block[0..4]),
            active_count: LittleEndian::read_u32(&block[4..8]),
            first: LittleEndian::read_u32(&block[8..12]),
            last: LittleEndian::read_u32(&block[12..16]),
            checksum: LittleEndian::read_u32(&block[16..20]),
            table,
        }
    }

    /// 编码头部（前 20 字节）
    pub fn encode_header(&self) -> [u8; 20] {
        let mut raw = [0u8; 20];
        LittleEndian::write_u32(&mut raw[0..4], self.magic);
        LittleEndian::write_u32(&mut raw[4..8], self.active_count);
        LittleEndian::write_u32(&mut raw[8..12], self.first);
        LittleEndian::write_u32(&mut raw[12..16], self.last);
        LittleEndian::write_u32(&mut raw[16..20], self.checksum);
        raw
    }

    /// 编码整个 journal 块
    pub fn encode(&self, block: &mut [u8]) {
        block[..BLOCK_SIZE].fill(0);
        block[..20].copy_from_slice(&self.encode_header());
        for (slot, t) in self.table.iter().enumerate() {
            let offset = Transaction::offset_of(slot);
            block[offset..offset + TRANSACTION_SIZE].copy_from_slice(&t.encode());
        }
    }

    /// 计算头部校验和
    pub fn header_checksum(&self) -> u32 {
        super::checksum::header_csum(&self.encode_header())
    }

    /// 刷新头部校验和
    pub fn update_checksum(&mut self) {
        self.checksum = self.header_checksum();
    }

    /// 启动时的一致性检查
    pub fn check(&self) -> core::result::Result<(), JournalError> {
        if self.magic != JBD_MAGIC {
            return Err(JournalError::BadMagic);
        }
        if self.active_count as usize > MAX_TRANSACTIONS {
            return Err(JournalError::TooManyActive(self.active_count));
        }
        if !super::checksum::verify_header(&self.encode_header(), self.checksum) {
            return Err(JournalError::BadChecksum);
        }
        Ok(())
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Handle 记录的文件操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOp {
    /// 创建文件
    Create {
        /// 文件类型
        file_type: FileType,
    },
    /// 在 `offset` 处写入 `data`
    Write {
        /// 字节偏移
        offset: u32,
        /// 内联数据（不超过 `WRITE_PAYLOAD_CAPACITY`）
        data: Vec<u8>,
    },
    /// 设置文件大小
    Truncate {
        /// 新大小
        size: u32,
    },
    /// 删除文件
    Delete,
}

impl HandleOp {
    /// 磁盘上的操作码
    pub fn code(&self) -> u32 {
        match self {
            HandleOp::Create { .. } => JBD_CREATE,
            HandleOp::Write { .. } => JBD_WRITE,
            HandleOp::Truncate { .. } => JBD_TRUNCATE,
            HandleOp::Delete => JBD_DELETE,
        }
    }

    /// 操作名（日志用）
    pub fn name(&self) -> &'static str {
        match self {
            HandleOp::Create { .. } => "JBD_CREATE",
            HandleOp::Write { .. } => "JBD_WRITE",
            HandleOp::Truncate { .. } => "JBD_TRUNCATE",
            HandleOp::Delete => "JBD_DELETE",
        }
    }
}

/// 一条可重放的文件操作记录，恰好占用一个块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    /// 所属 transaction 的 ID（追加时由 journal 填写）
    pub tid: u32,
    /// 目标路径
    pub path: String,
    /// 操作
    pub op: HandleOp,
}

impl Handle {
    /// 创建文件
    pub fn create(path: &str, file_type: FileType) -> Self {
        Self::new(path, HandleOp::Create { file_type })
    }

    /// 写文件
    pub fn write(path: &str, offset: u32, data: &[u8]) -> Self {
        Self::new(
            path,
            HandleOp::Write {
                offset,
                data: data.to_vec(),
            },
        )
    }

    /// 设置文件大小
    pub fn truncate(path: &str, size: u32) -> Self {
        Self::new(path, HandleOp::Truncate { size })
    }

    /// 删除文件
    pub fn delete(path: &str) -> Self {
        Self::new(path, HandleOp::Delete)
    }

    fn new(path: &str, op: HandleOp) -> Self {
        Self {
            tid: 0,
            path: path.to_string(),
            op,
        }
    }

    /// 检查路径长度
    pub fn check_path(path: &str) -> core::result::Result<(), JournalError> {
        if path.len() >= MAX_PATH_LEN || path.as_bytes().contains(&0) {
            return Err(JournalError::PathTooLong);
        }
        Ok(())
    }

    /// 编码到 handle 块（整块覆盖）
    pub fn encode(&self, block: &mut [u8]) -> Result<()> {
        Self::check_path(&self.path)?;
        block[..BLOCK_SIZE].fill(0);

        LittleEndian::write_u32(&mut block[0..4], self.tid);
        LittleEndian::write_u32(&mut block[4..8], self.op.code());
        block[8..8 + self.path.len()].copy_from_slice(self.path.as_bytes());

        let params = &mut block[HANDLE_HEADER_SIZE..BLOCK_SIZE];
        match &self.op {
            HandleOp::Create { file_type } => {
                LittleEndian::write_u32(&mut params[0..4], file_type.to_raw());
            }
            HandleOp::Write { offset, data } => {
                if data.len() > WRITE_PAYLOAD_CAPACITY {
                    return Err(Error::new(ErrorKind::InvalidInput, "write payload exceeds handle capacity"));
                }
                LittleEndian::write_u32(&mut params[0..4], *offset);
                LittleEndian::write_u32(&mut params[4..8], data.len() as u32);
                params[8..8 + data.len()].copy_from_slice(data);
            }
            HandleOp::Truncate { size } => {
                LittleEndian::write_u32(&mut params[0..4], *size);
            }
            HandleOp::Delete => {}
        }
        Ok(())
    }

    /// 从 handle 块解析
    pub fn decode(block: &[u8]) -> Result<Self> {
        let tid = LittleEndian::read_u32(&block[0..4]);
        let code = LittleEndian::read_u32(&block[4..8]);

        let raw_path = &block[8..HANDLE_HEADER_SIZE];
        let len = raw_path.iter().position(|&b| b == 0).unwrap_or(raw_path.len());
        let path = core::str::from_utf8(&raw_path[..len])
            .map_err(|_| Error::new(ErrorKind::Corrupted, "handle path is not valid UTF-8"))?
            .to_string();

        let params = &block[HANDLE_HEADER_SIZE..BLOCK_SIZE];
        let op = match code {
            JBD_CREATE => {
                let file_type = FileType::from_raw(LittleEndian::read_u32(&params[0..4]))
                    .ok_or(Error::new(ErrorKind::Corrupted, "invalid file type in create handle"))?;
                HandleOp::Create { file_type }
            }
            JBD_WRITE => {
                let offset = LittleEndian::read_u32(&params[0..4]);
                let size = LittleEndian::read_u32(&params[4..8]) as usize;
                if size > WRITE_PAYLOAD_CAPACITY {
                    return Err(Error::new(ErrorKind::Corrupted, "write handle size exceeds capacity"));
                }
                HandleOp::Write {
                    offset,
                    data: params[8..8 + size].to_vec(),
                }
            }
            JBD_TRUNCATE => HandleOp::Truncate {
                size: LittleEndian::read_u32(&params[0..4]),
            },
            JBD_DELETE => HandleOp::Delete,
            other => return Err(JournalError::BadOperation(other).into()),
        };

        Ok(Self { tid, path, op })
    }

    /// 尝试把一次写入合并进本 handle
    ///
    /// 要求同一路径、本 handle 也是写操作、新范围与已有范围相接或重叠、
    /// 合并后的数据不超过内联容量。成功时偏移不变，数据按需增长。
    pub fn merge_write(&mut self, path: &str, offset: u32, data: &[u8]) -> bool {
        if self.path != path {
            return false;
        }
        let HandleOp::Write { offset: base, data: existing } = &mut self.op else {
            return false;
        };
        if offset < *base || (offset - *base) as usize > existing.len() {
            return false;
        }
        let rel = (offset - *base) as usize;
        let end = rel + data.len();
        if end > WRITE_PAYLOAD_CAPACITY {
            return false;
        }
        if end > existing.len() {
            existing.resize(end, 0);
        }
        existing[rel..end].copy_from_slice(data);
        true
    }
}
