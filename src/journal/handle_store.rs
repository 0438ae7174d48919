//! Handle 存储
//!
//! 每个 transaction 用一个间接块记录它的 handle 块号：第 i 个 u32 指向
//! 第 i 个 handle 块，0 表示尚未分配。间接块和 handle 块都是按需分配的，
//! 新分配的块先清零。

use super::{jbd_journal::Journal, types::Handle, JournalError};
use crate::{
    balloc::BlockAllocator,
    block::BlockDevice,
    consts::MAX_HANDLES_PER_TRANSACTION,
    error::{Error, ErrorKind, Result},
};
use byteorder::{ByteOrder, LittleEndian};

impl<D: BlockDevice, A: BlockAllocator> Journal<D, A> {
    /// 找到（必要时分配）`slot` 的间接块，返回间接块号
    fn handle_walk(&mut self, slot: usize, index: u32, allocate: bool) -> Result<u32> {
        if index as usize >= MAX_HANDLES_PER_TRANSACTION {
            return Err(JournalError::HandleOutOfRange.into());
        }

        let indirect = self.slot(slot)?.indirect;
        if indirect != 0 {
            if self.allocator.is_block_free(&mut self.cache, indirect)? {
                log::error!("[JBD] slot {}: handle indirect block {:#x} is free", slot, indirect);
                return Err(Error::fatal(ErrorKind::Corrupted, "handle indirect block is free"));
            }
            return Ok(indirect);
        }

        if !allocate {
            return Err(JournalError::HandleNotFound.into());
        }
        let bno = self.allocator.alloc_block(&mut self.cache, self.config.alloc_hint)?;
        self.cache.block_mut(bno)?.fill(0);
        self.sb.table[slot].indirect = bno;
        log::trace!("[JBD] slot {}: handle indirect block {:#x}", slot, bno);
        Ok(bno)
    }

    /// 第 `index` 个 handle 的块号
    ///
    /// `allocate` 为真时按需分配间接块和 handle 块；否则缺失时返回
    /// `NotFound`。磁盘满时返回 `NoSpace`，序号越界返回 `InvalidInput`。
    pub fn get_handle(&mut self, slot: usize, index: u32, allocate: bool) -> Result<u32> {
        let indirect = self.handle_walk(slot, index, allocate)?;
        let entry = index as usize * 4;
        let hbno = LittleEndian::read_u32(&self.cache.block(indirect)?[entry..entry + 4]);

        if hbno != 0 {
            if self.allocator.is_block_free(&mut self.cache, hbno)? {
                log::error!("[JBD] slot {}: handle {} block {:#x} is free", slot, index, hbno);
                return Err(Error::fatal(ErrorKind::Corrupted, "handle block is free"));
            }
            return Ok(hbno);
        }

        if !allocate {
            return Err(JournalError::HandleNotFound.into());
        }
        let hbno = self.allocator.alloc_block(&mut self.cache, self.config.alloc_hint)?;
        self.cache.block_mut(hbno)?.fill(0);
        let mut raw = [0u8; 4];
        LittleEndian::write_u32(&mut raw, hbno);
        self.cache.write_bytes(indirect, entry, &raw)?;
        Ok(hbno)
    }

    /// 释放第 `index` 个 handle 块并清零间接块中的指针
    ///
    /// 块已经空闲（上次清理中途崩溃）时只清零指针。
    pub fn free_handle(&mut self, slot: usize, index: u32) -> Result<()> {
        let indirect = self.handle_walk(slot, index, false)?;
        let entry = index as usize * 4;
        let hbno = LittleEndian::read_u32(&self.cache.block(indirect)?[entry..entry + 4]);
        if hbno == 0 {
            return Ok(());
        }

        if self.allocator.is_block_free(&mut self.cache, hbno)? {
            log::warn!("[JBD] slot {}: handle {} block {:#x} already free", slot, index, hbno);
        } else {
            self.allocator.free_block(&mut self.cache, hbno)?;
        }
        self.cache.write_bytes(indirect, entry, &[0u8; 4])
    }

    /// 读取并解析第 `index` 个 handle
    pub fn read_handle(&mut self, slot: usize, index: u32) -> Result<Handle> {
        let hbno = self.get_handle(slot, index, false)?;
        Handle::decode(self.cache.block(hbno)?)
    }
}
