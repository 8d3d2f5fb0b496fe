//! Annex B 起始码扫描器.
//!
//! 在字节流中定位 3 字节 (`00 00 01`) 与 4 字节 (`00 00 00 01`) 起始码,
//! 产出 NAL 单元的字节区间序列. 扫描是惰性且有限的, 只能通过重新
//! 构造扫描器从头重启.
//!
//! 两种载荷边界策略:
//! - 剥离尾部零字节 (默认): 下一个起始码之前的零填充不计入载荷;
//! - 原样保留 (bit-exact passthrough): 载荷一直延伸到下一个起始码.

use log::warn;
use naliu_core::{NaliuError, NaliuResult};
use std::ops::Range;

/// 一个 NAL 单元的字节区间
///
/// 仅在单次扫描迭代内有效的轻量视图, 不持有数据.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalRange {
    /// 载荷区间 (不含起始码, 已按策略剥离尾部零字节)
    pub payload: Range<usize>,
    /// 含尾部字节在内的结束位置 (下一个起始码或流末尾)
    pub full_end: usize,
}

/// Annex B 起始码扫描器
pub struct AnnexBScanner<'a> {
    data: &'a [u8],
    /// 下一个 NAL 载荷的起始位置
    pos: usize,
    strip_trailing: bool,
    done: bool,
}

impl<'a> AnnexBScanner<'a> {
    /// 创建扫描器
    ///
    /// 码流必须以起始码开头, 否则返回 `MalformedBitstream`.
    ///
    /// # 参数
    /// - `strip_trailing`: 是否剥离载荷尾部的零填充字节
    pub fn new(data: &'a [u8], strip_trailing: bool) -> NaliuResult<Self> {
        let Some(first) = start_code_len(data, 0) else {
            return Err(NaliuError::MalformedBitstream(
                "码流开头未找到 Annex B 起始码".into(),
            ));
        };
        Ok(Self {
            data,
            pos: first,
            strip_trailing,
            done: false,
        })
    }

    /// 源数据总字节数 (用于进度上报)
    pub fn total_size(&self) -> usize {
        self.data.len()
    }
}

impl Iterator for AnnexBScanner<'_> {
    type Item = NalRange;

    fn next(&mut self) -> Option<NalRange> {
        if self.done || self.pos >= self.data.len() {
            return None;
        }

        let start = self.pos;
        let (full_end, next_pos) = match next_start_code(self.data, start) {
            Some(sc) => (sc, sc + start_code_len(self.data, sc).unwrap_or(3)),
            None => {
                // 后续再无起始码: 剩余字节全部归入最后一个 NAL
                self.done = true;
                (self.data.len(), self.data.len())
            }
        };

        let mut payload_end = full_end;
        if self.strip_trailing {
            while payload_end > start && self.data[payload_end - 1] == 0x00 {
                payload_end -= 1;
            }
        }
        self.pos = next_pos;

        if payload_end == start {
            // 起始码之间全是零填充, 该区间不构成 NAL
            warn!("Annex B: 偏移 {} 处的起始码后无有效载荷, 跳过", start);
            return self.next();
        }

        Some(NalRange {
            payload: start..payload_end,
            full_end,
        })
    }
}

/// 判断 `pos` 处是否为起始码, 返回起始码长度 (3 或 4)
fn start_code_len(data: &[u8], pos: usize) -> Option<usize> {
    if pos + 3 < data.len()
        && data[pos] == 0x00
        && data[pos + 1] == 0x00
        && data[pos + 2] == 0x00
        && data[pos + 3] == 0x01
    {
        return Some(4);
    }
    if pos + 2 < data.len() && data[pos] == 0x00 && data[pos + 1] == 0x00 && data[pos + 2] == 0x01 {
        return Some(3);
    }
    None
}

/// 查找 `from` 之后第一个起始码的位置
fn next_start_code(data: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 2 < data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 {
            if data[i + 2] == 0x01 {
                return Some(i);
            }
            if i + 3 < data.len() && data[i + 2] == 0x00 && data[i + 3] == 0x01 {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}
