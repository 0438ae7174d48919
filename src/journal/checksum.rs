//! Journal superblock 校验和
//!
//! 头部前 16 字节（magic、active_count、first、last）的 CRC32，
//! 存放在偏移 16 处。存储值为 0 表示没有校验和（兼容未写校验和的旧镜像）。

use crc32fast::Hasher;

/// 参与校验的头部字节数
pub const CSUM_COVERED: usize = 16;

/// 计算头部校验和
///
/// `header` 至少包含前 16 字节，多余部分忽略。
#[inline]
pub fn header_csum(header: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&header[..CSUM_COVERED]);
    hasher.finalize()
}

/// 校验存储的头部校验和
pub fn verify_header(header: &[u8], stored: u32) -> bool {
    stored == 0 || stored == header_csum(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csum_ignores_trailing_bytes() {
        let mut a = [0u8; 20];
        a[0] = 0x21;
        let mut b = a;
        b[18] = 0xff;
        assert_eq!(header_csum(&a), header_csum(&b));

        b[3] = 1;
        assert_ne!(header_csum(&a), header_csum(&b));
    }

    #[test]
    fn test_zero_means_absent() {
        let header = [7u8; 16];
        assert!(verify_header(&header, 0));
        assert!(verify_header(&header, header_csum(&header)));
        assert!(!verify_header(&header, header_csum(&header) ^ 1));
    }
}
