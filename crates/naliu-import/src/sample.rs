//! 样本组装器与长度前缀编码.
//!
//! 每个访问单元组装为一个样本: NAL 依次以 `[长度前缀][载荷]` 追加
//! 到可增长缓冲区. 前缀宽度为轨道级标量 (8/16/32 位, 24 位不允许),
//! 在一次运行内单调不减; 加宽时已提交到容器的所有样本都要回读、
//! 按新宽度重编码并就地写回, 保证成品轨道内宽度一致.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::{BufMut, BytesMut};
use log::info;
use naliu_core::{NaliuError, NaliuResult};

use crate::sink::{TrackId, TrackSink};

/// NAL 长度前缀宽度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LengthPrefix {
    /// 8 位
    U8,
    /// 16 位
    U16,
    /// 32 位
    U32,
}

impl LengthPrefix {
    /// 前缀字节数
    pub fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// 前缀位数
    pub fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    /// 该宽度能表达的最大载荷长度
    pub fn max_len(self) -> usize {
        match self {
            Self::U8 => u8::MAX as usize,
            Self::U16 => u16::MAX as usize,
            Self::U32 => u32::MAX as usize,
        }
    }

    /// 载荷长度是否可表达
    pub fn fits(self, len: usize) -> bool {
        len <= self.max_len()
    }

    /// 增长到能容纳 `len` 的下一个标准宽度 (8→16→32, 跳过 24)
    pub fn grown_to(self, len: usize) -> NaliuResult<Self> {
        let mut width = self;
        while !width.fits(len) {
            width = match width {
                Self::U8 => Self::U16,
                Self::U16 => Self::U32,
                Self::U32 => {
                    return Err(NaliuError::InvalidData(format!(
                        "NAL 载荷超过 32 位长度前缀上限, len={}",
                        len
                    )));
                }
            };
        }
        Ok(width)
    }

    /// 向缓冲区写入一个长度前缀 (大端)
    fn put(self, buf: &mut BytesMut, len: usize) {
        match self {
            Self::U8 => buf.put_u8(len as u8),
            Self::U16 => buf.put_u16(len as u16),
            Self::U32 => buf.put_u32(len as u32),
        }
    }

    fn read(self, cursor: &mut &[u8]) -> NaliuResult<usize> {
        let len = match self {
            Self::U8 => usize::from(cursor.read_u8()?),
            Self::U16 => usize::from(cursor.read_u16::<BigEndian>()?),
            Self::U32 => cursor.read_u32::<BigEndian>()? as usize,
        };
        Ok(len)
    }

    fn write(self, out: &mut Vec<u8>, len: usize) -> NaliuResult<()> {
        match self {
            Self::U8 => out.write_u8(len as u8)?,
            Self::U16 => out.write_u16::<BigEndian>(len as u16)?,
            Self::U32 => out.write_u32::<BigEndian>(len as u32)?,
        }
        Ok(())
    }
}

/// 样本级随机访问属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RapType {
    /// 非随机访问点
    #[default]
    None,
    /// 真同步点 (IDR / SAP 1-2)
    Sync,
    /// open-GOP 随机访问点 (CRA / BLA_W, SAP 3)
    OpenGop,
}

/// 正在组装的一个访问单元
///
/// 同一时刻恰有一个活动实例; 在扫描器发现新访问单元或流结束时
/// 封存 (take) 并重置.
#[derive(Debug, Default)]
pub struct SampleBuilder {
    data: BytesMut,
    /// 样本的随机访问属性
    pub rap: RapType,
    /// 是否含 I slice
    pub has_i_slice: bool,
    /// 是否含任何 slice
    pub has_slice: bool,
    /// 样本级 recovery point (来自 SEI)
    pub recovery_frame_count: Option<i32>,
    /// 末尾悬挂的 SVC 前缀 NAL 字节数 (含长度前缀), 封存时移交下一样本
    trailing_prefix_len: usize,
}

impl SampleBuilder {
    /// 创建空组装器
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前缓冲字节数
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 是否无任何数据
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 追加一个 NAL
    pub fn push_nal(&mut self, prefix: LengthPrefix, payload: &[u8]) {
        debug_assert!(prefix.fits(payload.len()));
        self.data.reserve(prefix.bytes() + payload.len());
        prefix.put(&mut self.data, payload.len());
        self.data.extend_from_slice(payload);
        self.trailing_prefix_len = 0;
    }

    /// 追加一个 SVC 前缀 NAL (若样本在其后立即封存, 该 NAL 随下一样本)
    ///
    /// 连续多个前缀 NAL 累积移交.
    pub fn push_prefix_nal(&mut self, prefix: LengthPrefix, payload: &[u8]) {
        let pending = self.trailing_prefix_len;
        let before = self.data.len();
        self.push_nal(prefix, payload);
        self.trailing_prefix_len = pending + (self.data.len() - before);
    }

    /// 在样本头部插入一组 NAL (带内参数集补全用)
    pub fn prepend_nals(&mut self, prefix: LengthPrefix, nals: &[Vec<u8>]) {
        if nals.is_empty() {
            return;
        }
        let mut head = BytesMut::new();
        for payload in nals {
            prefix.put(&mut head, payload.len());
            head.extend_from_slice(payload);
        }
        head.extend_from_slice(&self.data);
        self.data = head;
    }

    /// 按新宽度重编码缓冲区 (加宽时调用, 在追加超宽载荷之前)
    pub fn reencode(&mut self, old: LengthPrefix, new: LengthPrefix) -> NaliuResult<()> {
        self.data = BytesMut::from(&reencode_prefixes(&self.data, old, new)?[..]);
        Ok(())
    }

    /// 封存样本: 取出缓冲数据并重置全部状态
    ///
    /// 末尾悬挂的 SVC 前缀 NAL 被截下, 留作新样本的开头.
    pub fn take(&mut self) -> Vec<u8> {
        let carry = self.trailing_prefix_len.min(self.data.len());
        let cut = self.data.len() - carry;
        let carried = self.data.split_off(cut);
        let sealed = std::mem::replace(&mut self.data, carried);

        self.rap = RapType::None;
        self.has_i_slice = false;
        self.has_slice = false;
        self.recovery_frame_count = None;
        self.trailing_prefix_len = 0;

        sealed.to_vec()
    }
}

/// 将一段长度前缀序列按新宽度重编码
fn reencode_prefixes(data: &[u8], old: LengthPrefix, new: LengthPrefix) -> NaliuResult<Vec<u8>> {
    let mut cursor = data;
    let mut out = Vec::with_capacity(data.len() + data.len() / 16);
    while !cursor.is_empty() {
        let len = old.read(&mut cursor)?;
        if len > cursor.len() {
            return Err(NaliuError::InvalidData(format!(
                "样本内 NAL 长度越界, len={}, remain={}",
                len,
                cursor.len()
            )));
        }
        new.write(&mut out, len)?;
        out.extend_from_slice(&cursor[..len]);
        cursor = &cursor[len..];
    }
    Ok(out)
}

/// 就地重写轨道内全部已提交样本的长度前缀宽度
///
/// 对每个样本: 回读 → 按 `old` 解出各 NAL 长度 → 按 `new` 重编码 →
/// 写回原索引. 解码顺序与 DTS 不受影响.
pub fn rewrite_track_prefixes<S: TrackSink>(
    sink: &mut S,
    track: TrackId,
    old: LengthPrefix,
    new: LengthPrefix,
) -> NaliuResult<()> {
    let count = sink.sample_count(track);
    info!(
        "长度前缀加宽: {} 位 → {} 位, 重写 {} 个样本",
        old.bits(),
        new.bits(),
        count,
    );
    for index in 0..count {
        let data = sink.sample_data(track, index)?;
        let rewritten = reencode_prefixes(&data, old, new)?;
        sink.replace_sample_data(track, index, rewritten)?;
    }
    Ok(())
}
