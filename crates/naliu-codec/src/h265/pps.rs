//! H.265 PPS (Picture Parameter Set) 解析器.
//!
//! 解析到 `entropy_coding_sync_enabled_flag` 为止: slice header 解析
//! 需要前部的依赖/额外位字段, 并行类型推导需要 tiles 与 WPP 标志.

use naliu_core::BitReader;
use naliu_core::bitreader::{read_se, read_ue};
use naliu_core::{NaliuError, NaliuResult};

/// PPS 解析结果
#[derive(Debug, Clone, Copy)]
pub struct HevcPps {
    /// pps_pic_parameter_set_id
    pub pps_id: u32,
    /// 引用的 sps_seq_parameter_set_id
    pub sps_id: u32,
    /// dependent_slice_segments_enabled_flag
    pub dependent_slice_segments_enabled: bool,
    /// output_flag_present_flag
    pub output_flag_present: bool,
    /// num_extra_slice_header_bits
    pub num_extra_slice_header_bits: u32,
    /// tiles_enabled_flag
    pub tiles_enabled: bool,
    /// entropy_coding_sync_enabled_flag (WPP)
    pub entropy_coding_sync_enabled: bool,
}

/// 解析 PPS RBSP (不含 2 字节 NAL 头)
pub fn parse_hevc_pps(rbsp: &[u8]) -> NaliuResult<HevcPps> {
    if rbsp.is_empty() {
        return Err(NaliuError::InvalidData("HEVC: PPS RBSP 为空".into()));
    }

    let mut br = BitReader::new(rbsp);

    let pps_id = read_ue(&mut br)?;
    if pps_id > 63 {
        return Err(NaliuError::InvalidData(format!(
            "HEVC: pps_id 超出范围, pps_id={}",
            pps_id
        )));
    }
    let sps_id = read_ue(&mut br)?;
    if sps_id > 15 {
        return Err(NaliuError::InvalidData(format!(
            "HEVC: sps_id 超出范围, sps_id={}",
            sps_id
        )));
    }

    let dependent_slice_segments_enabled = br.read_flag()?;
    let output_flag_present = br.read_flag()?;
    let num_extra_slice_header_bits = br.read_bits(3)?;
    br.skip_bits(1)?; // sign_data_hiding_enabled_flag
    br.skip_bits(1)?; // cabac_init_present_flag
    let _ = read_ue(&mut br)?; // num_ref_idx_l0_default_active_minus1
    let _ = read_ue(&mut br)?; // num_ref_idx_l1_default_active_minus1
    let _ = read_se(&mut br)?; // init_qp_minus26
    br.skip_bits(1)?; // constrained_intra_pred_flag
    br.skip_bits(1)?; // transform_skip_enabled_flag
    if br.read_flag()? {
        // cu_qp_delta_enabled_flag
        let _ = read_ue(&mut br)?; // diff_cu_qp_delta_depth
    }
    let _ = read_se(&mut br)?; // pps_cb_qp_offset
    let _ = read_se(&mut br)?; // pps_cr_qp_offset
    br.skip_bits(1)?; // pps_slice_chroma_qp_offsets_present_flag
    br.skip_bits(1)?; // weighted_pred_flag
    br.skip_bits(1)?; // weighted_bipred_flag
    br.skip_bits(1)?; // transquant_bypass_enabled_flag
    let tiles_enabled = br.read_flag()?;
    let entropy_coding_sync_enabled = br.read_flag()?;

    Ok(HevcPps {
        pps_id,
        sps_id,
        dependent_slice_segments_enabled,
        output_flag_present,
        num_extra_slice_header_bits,
        tiles_enabled,
        entropy_coding_sync_enabled,
    })
}
