//! H.265 slice segment header 解析与 POC 推导.
//!
//! 解析到 `slice_pic_order_cnt_lsb` 为止. 依赖 slice segment
//! (dependent_slice_segment_flag=1) 不携带 slice_type 与 POC,
//! 解析结果中以 `dependent` 标记, 由导入流程按图像延续处理.

use std::collections::HashMap;

use naliu_core::BitReader;
use naliu_core::bitreader::read_ue;
use naliu_core::{NaliuError, NaliuResult};

use super::nal::{HevcNalHeader, HevcNalUnitType};
use super::pps::HevcPps;
use super::sps::HevcSps;
use crate::h264::SliceType;

/// slice segment header 解析结果
#[derive(Debug, Clone)]
pub struct HevcSliceHeader {
    /// first_slice_segment_in_pic_flag
    pub first_slice_in_pic: bool,
    /// dependent_slice_segment_flag (为真时无 slice_type/POC)
    pub dependent: bool,
    /// 引用的 pps_id
    pub pps_id: u32,
    /// slice 类型 (依赖 slice 段沿用所属图像的类型, 此处为 None)
    pub slice_type: Option<SliceType>,
    /// slice_pic_order_cnt_lsb (IDR slice 无此字段, 视为 0)
    pub poc_lsb: u32,
}

/// 解析 slice segment header 前缀
pub fn parse_hevc_slice_header(
    rbsp: &[u8],
    header: HevcNalHeader,
    sps_map: &HashMap<u32, HevcSps>,
    pps_map: &HashMap<u32, HevcPps>,
) -> NaliuResult<HevcSliceHeader> {
    let mut br = BitReader::new(rbsp);

    let first_slice_in_pic = br.read_flag()?;
    if header.nal_type.is_irap() {
        br.skip_bits(1)?; // no_output_of_prior_pics_flag
    }

    let pps_id = read_ue(&mut br)?;
    let pps = pps_map
        .get(&pps_id)
        .ok_or_else(|| NaliuError::InvalidData(format!("HEVC: 未找到 PPS id={}", pps_id)))?;
    let sps = sps_map
        .get(&pps.sps_id)
        .ok_or_else(|| NaliuError::InvalidData(format!("HEVC: 未找到 SPS id={}", pps.sps_id)))?;

    let mut dependent = false;
    if !first_slice_in_pic {
        if pps.dependent_slice_segments_enabled {
            dependent = br.read_flag()?;
        }
        // slice_segment_address: ceil(log2(PicSizeInCtbsY)) 位
        let pic_size = sps.pic_size_in_ctbs().max(2);
        let addr_bits = 32 - (pic_size - 1).leading_zeros();
        br.skip_bits(addr_bits)?;
    }

    if dependent {
        return Ok(HevcSliceHeader {
            first_slice_in_pic,
            dependent,
            pps_id,
            slice_type: None,
            poc_lsb: 0,
        });
    }

    br.skip_bits(pps.num_extra_slice_header_bits)?;

    let slice_type_raw = read_ue(&mut br)?;
    // HEVC: 0=B, 1=P, 2=I
    let slice_type = match slice_type_raw {
        0 => SliceType::B,
        1 => SliceType::P,
        2 => SliceType::I,
        _ => {
            return Err(NaliuError::InvalidData(format!(
                "HEVC: slice_type 非法, value={}",
                slice_type_raw
            )));
        }
    };

    if pps.output_flag_present {
        br.skip_bits(1)?; // pic_output_flag
    }
    if sps.separate_colour_plane {
        br.skip_bits(2)?; // colour_plane_id
    }

    let mut poc_lsb = 0u32;
    if !header.nal_type.is_idr() {
        poc_lsb = br.read_bits(sps.log2_max_poc_lsb)?;
    }

    Ok(HevcSliceHeader {
        first_slice_in_pic,
        dependent,
        pps_id,
        slice_type: Some(slice_type),
        poc_lsb,
    })
}

/// HEVC POC 推导状态
///
/// IDR 将 MSB/LSB 基准清零; BLA 清零 MSB; 其余按 LSB 回绕推导.
/// 随导入会话整体重建.
#[derive(Debug, Default)]
pub struct HevcPocState {
    prev_poc_lsb: i32,
    prev_poc_msb: i32,
}

impl HevcPocState {
    /// 创建初始状态
    pub fn new() -> Self {
        Self::default()
    }

    /// 计算当前图像的 POC
    pub fn compute(
        &mut self,
        sps: &HevcSps,
        nal_type: HevcNalUnitType,
        temporal_id: u8,
        poc_lsb: u32,
    ) -> i32 {
        let max_poc_lsb = 1i32 << sps.log2_max_poc_lsb.min(30);

        if nal_type.is_idr() {
            self.prev_poc_lsb = 0;
            self.prev_poc_msb = 0;
        }

        let poc_lsb = poc_lsb as i32;
        let mut poc_msb = self.prev_poc_msb;
        if poc_lsb < self.prev_poc_lsb && (self.prev_poc_lsb - poc_lsb) >= (max_poc_lsb / 2) {
            poc_msb += max_poc_lsb;
        } else if poc_lsb > self.prev_poc_lsb && (poc_lsb - self.prev_poc_lsb) > (max_poc_lsb / 2) {
            poc_msb -= max_poc_lsb;
        }

        if nal_type.is_bla() {
            poc_msb = 0;
        }

        let poc = poc_msb + poc_lsb;

        // 参考基准只在 TemporalId==0 且非 RASL/RADL/次层非参考图像时前移
        let is_sublayer_only = matches!(
            nal_type,
            HevcNalUnitType::RadlN
                | HevcNalUnitType::RadlR
                | HevcNalUnitType::RaslN
                | HevcNalUnitType::RaslR,
        );
        if temporal_id == 0 && !is_sublayer_only {
            self.prev_poc_lsb = poc_lsb;
            self.prev_poc_msb = poc_msb;
        }

        poc
    }
}
