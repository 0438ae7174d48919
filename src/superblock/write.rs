//! Superblock 写入

use super::FsSuperblock;
use byteorder::{ByteOrder, LittleEndian};

impl FsSuperblock {
    /// 把 superblock 编码到块数据开头
    pub fn encode(&self, data: &mut [u8]) {
        LittleEndian::write_u32(&mut data[0..4], self.magic);
        LittleEndian::write_u32(&mut data[4..8], self.nblocks);
    }
}
