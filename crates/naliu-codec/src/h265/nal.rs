//! H.265/HEVC NAL 单元头解析.
//!
//! HEVC NAL 头部为 2 字节 (比 H.264 多一字节):
//! - forbidden_zero_bit (1 bit)
//! - nal_unit_type (6 bits)
//! - nuh_layer_id (6 bits)
//! - nuh_temporal_id_plus1 (3 bits)

use naliu_core::{NaliuError, NaliuResult};

/// HEVC NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum HevcNalUnitType {
    /// TRAIL_N (非参考尾随图像)
    TrailN,
    /// TRAIL_R (参考尾随图像)
    TrailR,
    /// TSA_N
    TsaN,
    /// TSA_R
    TsaR,
    /// STSA_N
    StsaN,
    /// STSA_R
    StsaR,
    /// RADL_N
    RadlN,
    /// RADL_R
    RadlR,
    /// RASL_N
    RaslN,
    /// RASL_R
    RaslR,
    /// BLA_W_LP (Broken Link Access)
    BlaWLp,
    /// BLA_W_RADL
    BlaWRadl,
    /// BLA_N_LP
    BlaNLp,
    /// IDR_W_RADL (Instantaneous Decoding Refresh)
    IdrWRadl,
    /// IDR_N_LP
    IdrNLp,
    /// CRA_NUT (Clean Random Access)
    Cra,
    /// VPS (Video Parameter Set)
    Vps,
    /// SPS (Sequence Parameter Set)
    Sps,
    /// PPS (Picture Parameter Set)
    Pps,
    /// AUD (Access Unit Delimiter)
    Aud,
    /// EOS (End of Sequence)
    Eos,
    /// EOB (End of Bitstream)
    Eob,
    /// FD (Filler Data)
    FillerData,
    /// PREFIX_SEI
    PrefixSei,
    /// SUFFIX_SEI
    SuffixSei,
    /// 未知类型
    Unknown(u8),
}

impl HevcNalUnitType {
    /// 从类型编号创建
    pub fn from_type_id(id: u8) -> Self {
        match id {
            0 => Self::TrailN,
            1 => Self::TrailR,
            2 => Self::TsaN,
            3 => Self::TsaR,
            4 => Self::StsaN,
            5 => Self::StsaR,
            6 => Self::RadlN,
            7 => Self::RadlR,
            8 => Self::RaslN,
            9 => Self::RaslR,
            16 => Self::BlaWLp,
            17 => Self::BlaWRadl,
            18 => Self::BlaNLp,
            19 => Self::IdrWRadl,
            20 => Self::IdrNLp,
            21 => Self::Cra,
            32 => Self::Vps,
            33 => Self::Sps,
            34 => Self::Pps,
            35 => Self::Aud,
            36 => Self::Eos,
            37 => Self::Eob,
            38 => Self::FillerData,
            39 => Self::PrefixSei,
            40 => Self::SuffixSei,
            _ => Self::Unknown(id),
        }
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::TrailN => 0,
            Self::TrailR => 1,
            Self::TsaN => 2,
            Self::TsaR => 3,
            Self::StsaN => 4,
            Self::StsaR => 5,
            Self::RadlN => 6,
            Self::RadlR => 7,
            Self::RaslN => 8,
            Self::RaslR => 9,
            Self::BlaWLp => 16,
            Self::BlaWRadl => 17,
            Self::BlaNLp => 18,
            Self::IdrWRadl => 19,
            Self::IdrNLp => 20,
            Self::Cra => 21,
            Self::Vps => 32,
            Self::Sps => 33,
            Self::Pps => 34,
            Self::Aud => 35,
            Self::Eos => 36,
            Self::Eob => 37,
            Self::FillerData => 38,
            Self::PrefixSei => 39,
            Self::SuffixSei => 40,
            Self::Unknown(id) => *id,
        }
    }

    /// 是否为 VCL (Video Coding Layer) NAL
    pub fn is_vcl(&self) -> bool {
        self.type_id() < 32
    }

    /// 是否为已知的 slice segment 类型
    pub fn is_slice(&self) -> bool {
        matches!(self.type_id(), 0..=9 | 16..=21)
    }

    /// 是否为 IRAP (Intra Random Access Point) NAL
    pub fn is_irap(&self) -> bool {
        matches!(self.type_id(), 16..=21)
    }

    /// 是否为 IDR NAL
    pub fn is_idr(&self) -> bool {
        matches!(self, Self::IdrWRadl | Self::IdrNLp)
    }

    /// 是否为 BLA NAL
    pub fn is_bla(&self) -> bool {
        matches!(self, Self::BlaWLp | Self::BlaWRadl | Self::BlaNLp)
    }
}

/// 解析后的 HEVC NAL 头
#[derive(Debug, Clone, Copy)]
pub struct HevcNalHeader {
    /// NAL 类型
    pub nal_type: HevcNalUnitType,
    /// nuh_layer_id (0 为基础层)
    pub layer_id: u8,
    /// nuh_temporal_id (= nuh_temporal_id_plus1 - 1)
    pub temporal_id: u8,
}

/// 解析 2 字节 NAL 头
pub fn parse_header(data: &[u8]) -> NaliuResult<HevcNalHeader> {
    if data.len() < 2 {
        return Err(NaliuError::InvalidData("HEVC: NAL 数据太短".into()));
    }
    if data[0] & 0x80 != 0 {
        return Err(NaliuError::InvalidData(
            "HEVC: forbidden_zero_bit 非法".into(),
        ));
    }

    let temporal_id_plus1 = data[1] & 0x07;
    if temporal_id_plus1 == 0 {
        return Err(NaliuError::InvalidData(
            "HEVC: nuh_temporal_id_plus1 不能为 0".into(),
        ));
    }

    Ok(HevcNalHeader {
        nal_type: HevcNalUnitType::from_type_id((data[0] >> 1) & 0x3F),
        layer_id: ((data[0] & 1) << 5) | (data[1] >> 3),
        temporal_id: temporal_id_plus1 - 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nal_type_roundtrip() {
        for id in [0, 1, 9, 16, 19, 21, 32, 33, 34, 39, 40, 47] {
            assert_eq!(HevcNalUnitType::from_type_id(id).type_id(), id);
        }
    }

    #[test]
    fn test_nal_type_classification() {
        assert!(HevcNalUnitType::IdrWRadl.is_idr());
        assert!(HevcNalUnitType::IdrWRadl.is_irap());
        assert!(HevcNalUnitType::Cra.is_irap());
        assert!(!HevcNalUnitType::Cra.is_idr());
        assert!(HevcNalUnitType::BlaWLp.is_bla());
        assert!(HevcNalUnitType::TrailR.is_slice());
        assert!(!HevcNalUnitType::Vps.is_vcl());
    }

    #[test]
    fn test_parse_header() {
        // nal_type=32 (VPS), layer_id=0, temporal_id_plus1=1 → 0x40 0x01
        let hdr = parse_header(&[0x40, 0x01]).unwrap();
        assert_eq!(hdr.nal_type, HevcNalUnitType::Vps);
        assert_eq!(hdr.layer_id, 0);
        assert_eq!(hdr.temporal_id, 0);

        // nal_type=1 (TRAIL_R), layer_id=2, temporal_id_plus1=3
        // byte0 = 0b0_000001_0 = 0x02, byte1 = 0b00010_011 = 0x13
        let hdr = parse_header(&[0x02, 0x13]).unwrap();
        assert_eq!(hdr.nal_type, HevcNalUnitType::TrailR);
        assert_eq!(hdr.layer_id, 2);
        assert_eq!(hdr.temporal_id, 2);
    }

    #[test]
    fn test_parse_header_rejects() {
        assert!(parse_header(&[0x40]).is_err(), "不足 2 字节应失败");
        assert!(parse_header(&[0x80, 0x01]).is_err(), "forbidden bit 应失败");
        assert!(
            parse_header(&[0x40, 0x00]).is_err(),
            "temporal_id_plus1=0 应失败",
        );
    }
}
