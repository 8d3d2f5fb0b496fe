//! 比特流读取器.
//!
//! 提供从字节缓冲区中按位读取数据的能力, 是 H.264/H.265 语法解析的基础设施.
//!
//! 按大端位序读取 (MSB first), 并提供两个编解码族共用的 Exp-Golomb
//! 读取函数 (`read_ue` / `read_se`).

use crate::{NaliuError, NaliuResult};

/// 比特流读取器
///
/// 从字节缓冲区中按位读取数据, 使用大端位序 (MSB first).
///
/// # 示例
/// ```
/// use naliu_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
/// ```
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        if self.byte_pos >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_pos) * 8 - self.bit_pos as usize
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> NaliuResult<u32> {
        if self.byte_pos >= self.data.len() {
            return Err(NaliuError::Eof);
        }

        let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos >= 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(u32::from(bit))
    }

    /// 读取布尔标志位 (1 个位)
    pub fn read_flag(&mut self) -> NaliuResult<bool> {
        Ok(self.read_bit()? == 1)
    }

    /// 读取 N 个位 (最多 32 位)
    ///
    /// 按大端位序读取, 返回值的低 N 位有效.
    pub fn read_bits(&mut self, n: u32) -> NaliuResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(NaliuError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n,
            )));
        }
        if (n as usize) > self.bits_left() {
            return Err(NaliuError::Eof);
        }

        let mut result: u32 = 0;
        let mut remaining = n;

        while remaining > 0 {
            let available = 8 - self.bit_pos as u32;
            let to_read = remaining.min(available);

            // 从当前字节中提取位
            let shift = available - to_read;
            let mask = ((1u32 << to_read) - 1) as u8;
            let bits = (self.data[self.byte_pos] >> shift) & mask;

            result = (result << to_read) | u32::from(bits);

            self.bit_pos += to_read as u8;
            if self.bit_pos >= 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= to_read;
        }

        Ok(result)
    }

    /// 读取 N 个位 (最多 64 位)
    pub fn read_bits_u64(&mut self, n: u32) -> NaliuResult<u64> {
        if n <= 32 {
            return self.read_bits(n).map(u64::from);
        }
        if n > 64 {
            return Err(NaliuError::InvalidArgument(format!(
                "read_bits_u64: n={} 超过 64 位",
                n,
            )));
        }

        let high_bits = n - 32;
        let high = self.read_bits(high_bits)? as u64;
        let low = self.read_bits(32)? as u64;
        Ok((high << 32) | low)
    }

    /// 窥视 N 个位 (不移动位置)
    pub fn peek_bits(&mut self, n: u32) -> NaliuResult<u32> {
        let saved_byte = self.byte_pos;
        let saved_bit = self.bit_pos;
        let result = self.read_bits(n);
        self.byte_pos = saved_byte;
        self.bit_pos = saved_bit;
        result
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: u32) -> NaliuResult<()> {
        if (n as usize) > self.bits_left() {
            return Err(NaliuError::Eof);
        }

        let total_bits = self.bit_pos as u32 + n;
        self.byte_pos += (total_bits / 8) as usize;
        self.bit_pos = (total_bits % 8) as u8;

        Ok(())
    }

    /// 对齐到下一个字节边界
    ///
    /// 如果当前已在字节边界, 则不做任何事.
    pub fn align_to_byte(&mut self) {
        if self.bit_pos > 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// 获取当前字节位置
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }
}

/// 读取无符号 Exp-Golomb 编码值 `ue(v)`
///
/// H.264 与 H.265 语法均大量使用该编码. 前导零超过 31 位视为损坏数据.
pub fn read_ue(br: &mut BitReader) -> NaliuResult<u32> {
    let mut leading_zeros = 0u32;
    loop {
        let bit = br.read_bit()?;
        if bit == 1 {
            break;
        }
        leading_zeros += 1;
        if leading_zeros > 31 {
            return Err(NaliuError::InvalidData(
                "Exp-Golomb: 前导零超过 31 位".into(),
            ));
        }
    }

    if leading_zeros == 0 {
        return Ok(0);
    }
    let suffix = br.read_bits(leading_zeros)?;
    Ok((1u32 << leading_zeros) - 1 + suffix)
}

/// 读取有符号 Exp-Golomb 编码值 `se(v)`
pub fn read_se(br: &mut BitReader) -> NaliuResult<i32> {
    let code = read_ue(br)?;
    // 映射: 0 → 0, 1 → 1, 2 → -1, 3 → 2, 4 → -2 ...
    let value = code.div_ceil(2) as i32;
    if code & 1 == 1 { Ok(value) } else { Ok(-value) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bits_basic() {
        let data = [0b10110001, 0b01010101];
        let mut br = BitReader::new(&data);

        assert_eq!(br.read_bits(1).unwrap(), 1);
        assert_eq!(br.read_bits(1).unwrap(), 0);
        assert_eq!(br.read_bits(2).unwrap(), 0b11);
        assert_eq!(br.read_bits(4).unwrap(), 0b0001);
        assert_eq!(br.read_bits(8).unwrap(), 0b01010101);

        assert!(br.is_eof());
    }

    #[test]
    fn test_read_bits_32_bit() {
        let data = [0xFF, 0x00, 0xFF, 0x00];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(32).unwrap(), 0xFF00FF00);
    }

    #[test]
    fn test_read_bits_u64() {
        let data = [0xFF, 0x00, 0xFF, 0x00, 0xAA, 0xBB, 0xCC, 0xDD];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits_u64(64).unwrap(), 0xFF00FF00AABBCCDD);
    }

    #[test]
    fn test_peek_bits() {
        let data = [0b10110001];
        let mut br = BitReader::new(&data);

        assert_eq!(br.peek_bits(4).unwrap(), 0b1011);
        assert_eq!(br.peek_bits(4).unwrap(), 0b1011); // 不移动
        assert_eq!(br.read_bits(4).unwrap(), 0b1011); // 现在移动了
        assert_eq!(br.peek_bits(4).unwrap(), 0b0001);
    }

    #[test]
    fn test_skip_bits() {
        let data = [0b10110001, 0b01010101];
        let mut br = BitReader::new(&data);

        br.skip_bits(4).unwrap();
        assert_eq!(br.read_bits(4).unwrap(), 0b0001);
        br.skip_bits(4).unwrap();
        assert_eq!(br.read_bits(4).unwrap(), 0b0101);
    }

    #[test]
    fn test_align_to_byte() {
        let data = [0b10110001, 0b01010101];
        let mut br = BitReader::new(&data);

        br.read_bits(3).unwrap();
        br.align_to_byte();
        assert_eq!(br.byte_position(), 1);
        assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
    }

    #[test]
    fn test_bits_left() {
        let data = [0x00, 0x00];
        let mut br = BitReader::new(&data);

        assert_eq!(br.bits_left(), 16);
        br.read_bits(5).unwrap();
        assert_eq!(br.bits_left(), 11);
        br.read_bits(11).unwrap();
        assert_eq!(br.bits_left(), 0);
        assert!(br.is_eof());
    }

    #[test]
    fn test_eof_error() {
        let data = [0x00];
        let mut br = BitReader::new(&data);

        br.read_bits(8).unwrap();
        assert!(br.read_bits(1).is_err());
    }

    #[test]
    fn test_read_ue_small_values() {
        // ue: 0 → "1", 1 → "010", 2 → "011", 3 → "00100"
        let data = [0b1_010_011_0, 0b0100_0000];
        let mut br = BitReader::new(&data);
        assert_eq!(read_ue(&mut br).unwrap(), 0);
        assert_eq!(read_ue(&mut br).unwrap(), 1);
        assert_eq!(read_ue(&mut br).unwrap(), 2);
        assert_eq!(read_ue(&mut br).unwrap(), 3);
    }

    #[test]
    fn test_read_se_mapping() {
        // se 映射: code 1 → 1, code 2 → -1, code 3 → 2, code 4 → -2
        // "010" (code 1), "011" (code 2), "00100" (code 3), "00101" (code 4)
        let data = [0b010_011_00, 0b100_00101];
        let mut br = BitReader::new(&data);
        assert_eq!(read_se(&mut br).unwrap(), 1);
        assert_eq!(read_se(&mut br).unwrap(), -1);
        assert_eq!(read_se(&mut br).unwrap(), 2);
        assert_eq!(read_se(&mut br).unwrap(), -2);
    }

    #[test]
    fn test_read_ue_reject_runaway_leading_zeros() {
        // 全零数据: 前导零永不终止, 应报 InvalidData 而非死循环
        let data = [0x00; 8];
        let mut br = BitReader::new(&data);
        assert!(read_ue(&mut br).is_err());
    }
}
