//! H.264 NAL 单元头解析.
//!
//! NAL 头部 (1 字节):
//! ```text
//! ┌─────────────────────────────────────┐
//! │ forbidden(1) | ref_idc(2) | type(5) │
//! └─────────────────────────────────────┘
//! ```

use naliu_core::{NaliuError, NaliuResult};

/// NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum NalUnitType {
    /// 非 IDR 图像切片 (P/B slice)
    Slice,
    /// 数据分区 A (DPA)
    SliceDpa,
    /// 数据分区 B (DPB)
    SliceDpb,
    /// 数据分区 C (DPC)
    SliceDpc,
    /// IDR 图像切片 (关键帧)
    SliceIdr,
    /// 增补增强信息 (SEI)
    Sei,
    /// 序列参数集 (SPS)
    Sps,
    /// 图像参数集 (PPS)
    Pps,
    /// 访问单元分隔符 (AUD)
    Aud,
    /// 序列结束
    EndOfSequence,
    /// 流结束
    EndOfStream,
    /// 填充数据
    FillerData,
    /// SPS 扩展
    SpsExtension,
    /// SVC 前缀 NAL (prefix NAL unit)
    PrefixNalu,
    /// SVC subset SPS
    SubsetSps,
    /// 辅助图像切片 (auxiliary coded picture)
    SliceAux,
    /// SVC 增强层切片 (coded slice extension)
    SvcSlice,
    /// 未知类型
    Unknown(u8),
}

impl NalUnitType {
    /// 从 NAL 类型编号创建
    pub fn from_type_id(type_id: u8) -> Self {
        match type_id {
            1 => Self::Slice,
            2 => Self::SliceDpa,
            3 => Self::SliceDpb,
            4 => Self::SliceDpc,
            5 => Self::SliceIdr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::FillerData,
            13 => Self::SpsExtension,
            14 => Self::PrefixNalu,
            15 => Self::SubsetSps,
            19 => Self::SliceAux,
            20 => Self::SvcSlice,
            _ => Self::Unknown(type_id),
        }
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::SliceDpa => 2,
            Self::SliceDpb => 3,
            Self::SliceDpc => 4,
            Self::SliceIdr => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Aud => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::FillerData => 12,
            Self::SpsExtension => 13,
            Self::PrefixNalu => 14,
            Self::SubsetSps => 15,
            Self::SliceAux => 19,
            Self::SvcSlice => 20,
            Self::Unknown(id) => *id,
        }
    }

    /// 是否为基础层 VCL (Video Coding Layer) NAL
    pub fn is_vcl(&self) -> bool {
        matches!(
            self,
            Self::Slice | Self::SliceDpa | Self::SliceDpb | Self::SliceDpc | Self::SliceIdr,
        )
    }

    /// 是否为切片类 NAL (含 SVC 增强层与辅助图像)
    pub fn is_any_slice(&self) -> bool {
        self.is_vcl() || matches!(self, Self::SvcSlice | Self::SliceAux)
    }

    /// 是否为 IDR 切片
    pub fn is_idr(&self) -> bool {
        matches!(self, Self::SliceIdr)
    }

    /// 是否为 SVC 扩展相关类型
    pub fn is_svc(&self) -> bool {
        matches!(self, Self::PrefixNalu | Self::SubsetSps | Self::SvcSlice)
    }
}

/// 解析后的 NAL 头
#[derive(Debug, Clone, Copy)]
pub struct NalHeader {
    /// NAL 单元类型
    pub nal_type: NalUnitType,
    /// nal_ref_idc (参考重要性, 0-3)
    pub ref_idc: u8,
}

/// 解析 NAL 头部字节
pub fn parse_header(data: &[u8]) -> NaliuResult<NalHeader> {
    let Some(&header) = data.first() else {
        return Err(NaliuError::InvalidData("H264: NAL 单元数据为空".into()));
    };

    if header & 0x80 != 0 {
        return Err(NaliuError::InvalidData(
            "H264: forbidden_zero_bit 非法".into(),
        ));
    }

    Ok(NalHeader {
        nal_type: NalUnitType::from_type_id(header & 0x1F),
        ref_idc: (header >> 5) & 0x03,
    })
}
