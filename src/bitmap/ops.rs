//! 位图操作实现

use crate::error::{Error, ErrorKind, Result};
use byteorder::{ByteOrder, LittleEndian};

#[inline]
fn locate(index: u32) -> (usize, u8) {
    ((index / 8) as usize, 1u8 << (index % 8))
}

fn out_of_range() -> Error {
    Error::new(ErrorKind::InvalidInput, "bitmap index out of range")
}

/// 位是否为 1（块空闲）
///
/// 超出位图范围时返回 false，即视为已分配。
pub fn test_bit(bitmap: &[u8], index: u32) -> bool {
    let (byte, mask) = locate(index);
    bitmap.get(byte).is_some_and(|b| b & mask != 0)
}

/// 置 1（标记空闲）
pub fn set_bit(bitmap: &mut [u8], index: u32) -> Result<()> {
    let (byte, mask) = locate(index);
    let b = bitmap.get_mut(byte).ok_or_else(out_of_range)?;
    *b |= mask;
    Ok(())
}

/// 清 0（标记已分配）
pub fn clear_bit(bitmap: &mut [u8], index: u32) -> Result<()> {
    let (byte, mask) = locate(index);
    let b = bitmap.get_mut(byte).ok_or_else(out_of_range)?;
    *b &= !mask;
    Ok(())
}

/// 在 `[start, end)` 中查找第一个为 1 的位（第一个空闲块）
///
/// 按小端 u32 字扫描，整字为 0 时一次跳过 32 位。
pub fn find_first_one(bitmap: &[u8], start: u32, end: u32) -> Option<u32> {
    let end = end.min((bitmap.len() * 8) as u32);
    let mut i = start;
    while i < end {
        let word_start = i & !31;
        let offset = word_start as usize / 8;
        let word = if offset + 4 <= bitmap.len() {
            LittleEndian::read_u32(&bitmap[offset..offset + 4])
        } else {
            let mut tail = [0u8; 4];
            let n = bitmap.len() - offset;
            tail[..n].copy_from_slice(&bitmap[offset..]);
            LittleEndian::read_u32(&tail)
        };

        let masked = word & (u32::MAX << (i - word_start));
        if masked != 0 {
            let found = word_start + masked.trailing_zeros();
            return (found < end).then_some(found);
        }
        i = word_start + 32;
    }
    None
}

/// 统计 `[start, end)` 中为 1 的位数
pub fn count_ones(bitmap: &[u8], start: u32, end: u32) -> u32 {
    let end = end.min((bitmap.len() * 8) as u32);
    if start >= end {
        return 0;
    }
    let (first, last) = ((start / 8) as usize, ((end - 1) / 8) as usize);
    bitmap[first..=last]
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            let base = ((first + i) * 8) as u32;
            let lo = start.saturating_sub(base).min(8);
            let hi = (end - base).min(8);
            let mask = ((1u16 << hi) - (1u16 << lo)) as u8;
            (b & mask).count_ones()
        })
        .sum()
}

/// 把 `[start, start + count)` 全部置 1
pub fn set_bits(bitmap: &mut [u8], start: u32, count: u32) -> Result<()> {
    let end = start.checked_add(count).ok_or_else(out_of_range)?;
    if end as usize > bitmap.len() * 8 {
        return Err(out_of_range());
    }
    (start..end).try_for_each(|i| set_bit(bitmap, i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_bits() {
        let mut map = [0u8; 8];
        assert!(!test_bit(&map, 9));
        set_bit(&mut map, 9).unwrap();
        assert!(test_bit(&map, 9));
        assert_eq!(map[1], 0x02);

        clear_bit(&mut map, 9).unwrap();
        assert_eq!(map, [0u8; 8]);
    }

    #[test]
    fn test_find_first_free_across_words() {
        let mut map = [0u8; 12];
        assert_eq!(find_first_one(&map, 0, 96), None);

        set_bit(&mut map, 70).unwrap();
        assert_eq!(find_first_one(&map, 0, 96), Some(70));
        assert_eq!(find_first_one(&map, 70, 96), Some(70));
        assert_eq!(find_first_one(&map, 71, 96), None);
        // end 之外的空闲位不算
        assert_eq!(find_first_one(&map, 0, 70), None);

        set_bit(&mut map, 33).unwrap();
        assert_eq!(find_first_one(&map, 3, 96), Some(33));
    }

    #[test]
    fn test_find_in_short_tail() {
        let mut map = [0u8; 6];
        set_bit(&mut map, 44).unwrap();
        assert_eq!(find_first_one(&map, 40, 200), Some(44));
    }

    #[test]
    fn test_count_and_range_fill() {
        let mut map = [0u8; 4];
        set_bits(&mut map, 5, 12).unwrap();
        assert_eq!(count_ones(&map, 0, 32), 12);
        assert_eq!(count_ones(&map, 0, 7), 2);
        assert_eq!(count_ones(&map, 6, 16), 10);
        assert_eq!(count_ones(&map, 20, 20), 0);
        assert!(!test_bit(&map, 4));
        assert!(!test_bit(&map, 17));
    }

    #[test]
    fn test_out_of_range() {
        let mut map = [0u8; 4];
        assert!(set_bit(&mut map, 32).is_err());
        assert!(clear_bit(&mut map, 32).is_err());
        assert!(set_bits(&mut map, 30, 3).is_err());
        assert!(!test_bit(&map, 100));
        assert_eq!(find_first_one(&[0xffu8; 4], 32, 100), None);
    }
}
