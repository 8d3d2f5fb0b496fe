//! H.265 SPS (Sequence Parameter Set) 解析器.
//!
//! 提取导入所需的参数: PTL (写入 hvcC)、图像尺寸 (含 conformance
//! window 裁剪)、位深、`log2_max_pic_order_cnt_lsb` (POC 推导)、
//! CTB 尺寸 (slice_segment_address 位宽) 与 VUI timing_info
//! (时基自动检测).

use naliu_core::BitReader;
use naliu_core::bitreader::{read_se, read_ue};
use naliu_core::{NaliuError, NaliuResult};

use super::ptl::{ProfileTierLevel, parse_ptl};

/// SPS 中的时基信息
#[derive(Debug, Clone, Copy)]
pub struct HevcTiming {
    /// num_units_in_tick
    pub num_units_in_tick: u32,
    /// time_scale
    pub time_scale: u32,
}

/// SPS 解析结果
#[derive(Debug, Clone)]
pub struct HevcSps {
    /// 引用的 VPS id
    pub vps_id: u32,
    /// sps_seq_parameter_set_id
    pub sps_id: u32,
    /// 最大子层数
    pub max_sub_layers: u8,
    /// sps_temporal_id_nesting_flag
    pub temporal_id_nesting: bool,
    /// profile_tier_level
    pub ptl: ProfileTierLevel,
    /// 色度格式 (0=单色, 1=4:2:0, 2=4:2:2, 3=4:4:4)
    pub chroma_format_idc: u32,
    /// separate_colour_plane_flag
    pub separate_colour_plane: bool,
    /// 图像宽度 (像素, 已应用 conformance window)
    pub width: u32,
    /// 图像高度 (像素, 已应用 conformance window)
    pub height: u32,
    /// 亮度位深
    pub bit_depth_luma: u32,
    /// 色度位深
    pub bit_depth_chroma: u32,
    /// log2(max_pic_order_cnt_lsb)
    pub log2_max_poc_lsb: u32,
    /// log2(CTB 尺寸), slice_segment_address 位宽推导用
    pub log2_ctb_size: u32,
    /// VUI timing_info (如存在)
    pub timing: Option<HevcTiming>,
}

impl HevcSps {
    /// 图像内 CTB 总数 (slice_segment_address 的取值上界)
    pub fn pic_size_in_ctbs(&self) -> u32 {
        let ctb = 1u32 << self.log2_ctb_size;
        self.width.div_ceil(ctb) * self.height.div_ceil(ctb)
    }
}

/// 解析 SPS RBSP (不含 2 字节 NAL 头)
pub fn parse_hevc_sps(rbsp: &[u8]) -> NaliuResult<HevcSps> {
    if rbsp.len() < 3 {
        return Err(NaliuError::InvalidData("HEVC: SPS RBSP 太短".into()));
    }

    let mut br = BitReader::new(rbsp);

    let vps_id = br.read_bits(4)?;
    let max_sub_layers = br.read_bits(3)? as u8 + 1;
    let temporal_id_nesting = br.read_flag()?;

    let ptl = parse_ptl(&mut br, max_sub_layers)?;

    let sps_id = read_ue(&mut br)?;
    if sps_id > 15 {
        return Err(NaliuError::InvalidData(format!(
            "HEVC: sps_id 超出范围, sps_id={}",
            sps_id
        )));
    }
    let chroma_format_idc = read_ue(&mut br)?;
    if chroma_format_idc > 3 {
        return Err(NaliuError::InvalidData(format!(
            "HEVC: chroma_format_idc 非法, value={}",
            chroma_format_idc
        )));
    }
    let mut separate_colour_plane = false;
    if chroma_format_idc == 3 {
        separate_colour_plane = br.read_flag()?;
    }

    let pic_width = read_ue(&mut br)?;
    let pic_height = read_ue(&mut br)?;
    if pic_width == 0 || pic_height == 0 {
        return Err(NaliuError::InvalidData(format!(
            "HEVC: 图像尺寸非法, width={}, height={}",
            pic_width, pic_height
        )));
    }

    let mut conf_win = [0u32; 4];
    if br.read_flag()? {
        for c in conf_win.iter_mut() {
            *c = read_ue(&mut br)?;
        }
    }

    let bit_depth_luma = read_ue(&mut br)? + 8;
    let bit_depth_chroma = read_ue(&mut br)? + 8;
    if bit_depth_luma > 16 || bit_depth_chroma > 16 {
        return Err(NaliuError::InvalidData(format!(
            "HEVC: 位深非法, luma={}, chroma={}",
            bit_depth_luma, bit_depth_chroma
        )));
    }

    let log2_max_poc_lsb_minus4 = read_ue(&mut br)?;
    if log2_max_poc_lsb_minus4 > 12 {
        return Err(NaliuError::InvalidData(format!(
            "HEVC: log2_max_pic_order_cnt_lsb_minus4 超出范围, value={}",
            log2_max_poc_lsb_minus4
        )));
    }
    let log2_max_poc_lsb = log2_max_poc_lsb_minus4 + 4;

    let sub_layer_ordering = br.read_flag()?;
    let start = if sub_layer_ordering {
        0
    } else {
        u32::from(max_sub_layers) - 1
    };
    for _ in start..u32::from(max_sub_layers) {
        let _ = read_ue(&mut br)?; // sps_max_dec_pic_buffering_minus1
        let _ = read_ue(&mut br)?; // sps_max_num_reorder_pics
        let _ = read_ue(&mut br)?; // sps_max_latency_increase_plus1
    }

    let log2_min_cb = read_ue(&mut br)? + 3;
    let log2_diff_max_min_cb = read_ue(&mut br)?;
    let log2_ctb_size = log2_min_cb + log2_diff_max_min_cb;
    if !(4..=6).contains(&log2_ctb_size) {
        return Err(NaliuError::InvalidData(format!(
            "HEVC: CTB 尺寸非法, log2_ctb_size={}",
            log2_ctb_size
        )));
    }
    let _ = read_ue(&mut br)?; // log2_min_luma_transform_block_size_minus2
    let _ = read_ue(&mut br)?; // log2_diff_max_min_luma_transform_block_size
    let _ = read_ue(&mut br)?; // max_transform_hierarchy_depth_inter
    let _ = read_ue(&mut br)?; // max_transform_hierarchy_depth_intra

    if br.read_flag()? {
        // scaling_list_enabled_flag
        if br.read_flag()? {
            skip_scaling_list_data(&mut br)?;
        }
    }

    br.skip_bits(1)?; // amp_enabled_flag
    br.skip_bits(1)?; // sample_adaptive_offset_enabled_flag

    if br.read_flag()? {
        // pcm_enabled_flag
        br.skip_bits(8)?; // pcm 位深 (4+4)
        let _ = read_ue(&mut br)?; // log2_min_pcm_luma_coding_block_size_minus3
        let _ = read_ue(&mut br)?; // log2_diff_max_min_pcm_luma_coding_block_size
        br.skip_bits(1)?; // pcm_loop_filter_disabled_flag
    }

    let num_short_term_rps = read_ue(&mut br)?;
    if num_short_term_rps > 64 {
        return Err(NaliuError::InvalidData(format!(
            "HEVC: num_short_term_ref_pic_sets 超出范围, value={}",
            num_short_term_rps
        )));
    }
    let mut prev_rps_pics = 0u32;
    for i in 0..num_short_term_rps {
        prev_rps_pics = skip_short_term_rps(&mut br, i, prev_rps_pics)?;
    }

    if br.read_flag()? {
        // long_term_ref_pics_present_flag
        let num_long_term = read_ue(&mut br)?;
        if num_long_term > 32 {
            return Err(NaliuError::InvalidData(format!(
                "HEVC: num_long_term_ref_pics_sps 超出范围, value={}",
                num_long_term
            )));
        }
        for _ in 0..num_long_term {
            br.skip_bits(log2_max_poc_lsb)?; // lt_ref_pic_poc_lsb_sps
            br.skip_bits(1)?; // used_by_curr_pic_lt_sps_flag
        }
    }

    br.skip_bits(1)?; // sps_temporal_mvp_enabled_flag
    br.skip_bits(1)?; // strong_intra_smoothing_enabled_flag

    let mut timing = None;
    if br.read_flag()? {
        // vui_parameters_present_flag
        timing = parse_vui_timing(&mut br)?;
    }

    // 计算裁剪后分辨率
    let sub_width_c: u32 = if chroma_format_idc == 1 || chroma_format_idc == 2 {
        2
    } else {
        1
    };
    let sub_height_c: u32 = if chroma_format_idc == 1 { 2 } else { 1 };
    let crop_x = sub_width_c * (conf_win[0] + conf_win[1]);
    let crop_y = sub_height_c * (conf_win[2] + conf_win[3]);
    if crop_x >= pic_width || crop_y >= pic_height {
        return Err(NaliuError::InvalidData(format!(
            "HEVC: conformance window 非法, raw={}x{}, crop_x={}, crop_y={}",
            pic_width, pic_height, crop_x, crop_y
        )));
    }

    Ok(HevcSps {
        vps_id,
        sps_id,
        max_sub_layers,
        temporal_id_nesting,
        ptl,
        chroma_format_idc,
        separate_colour_plane,
        width: pic_width - crop_x,
        height: pic_height - crop_y,
        bit_depth_luma,
        bit_depth_chroma,
        log2_max_poc_lsb,
        log2_ctb_size,
        timing,
    })
}

/// 跳过 scaling_list_data
fn skip_scaling_list_data(br: &mut BitReader) -> NaliuResult<()> {
    for size_id in 0..4u32 {
        let count = if size_id == 3 { 2 } else { 6 };
        for _ in 0..count {
            if !br.read_flag()? {
                // scaling_list_pred_mode_flag == 0
                let _ = read_ue(br)?; // scaling_list_pred_matrix_id_delta
            } else {
                let coef_num = 1u32 << (4 + (size_id << 1)).min(6);
                if size_id > 1 {
                    let _ = read_se(br)?; // scaling_list_dc_coef_minus8
                }
                for _ in 0..coef_num {
                    let _ = read_se(br)?; // scaling_list_delta_coef
                }
            }
        }
    }
    Ok(())
}

/// 跳过 short_term_ref_pic_set, 返回该集合的图像数 (供下一集合的
/// 帧间预测模式使用)
fn skip_short_term_rps(br: &mut BitReader, idx: u32, prev_pics: u32) -> NaliuResult<u32> {
    let inter_prediction = if idx > 0 { br.read_flag()? } else { false };

    if inter_prediction {
        br.skip_bits(1)?; // delta_rps_sign
        let _ = read_ue(br)?; // abs_delta_rps_minus1
        let mut pics = 0u32;
        for _ in 0..=prev_pics {
            let used = br.read_flag()?; // used_by_curr_pic_flag
            if used {
                pics += 1;
            } else if br.read_flag()? {
                // use_delta_flag
                pics += 1;
            }
        }
        Ok(pics)
    } else {
        let num_negative = read_ue(br)?;
        let num_positive = read_ue(br)?;
        if num_negative > 16 || num_positive > 16 {
            return Err(NaliuError::InvalidData(format!(
                "HEVC: short_term_ref_pic_set 图像数非法, neg={}, pos={}",
                num_negative, num_positive
            )));
        }
        for _ in 0..num_negative + num_positive {
            let _ = read_ue(br)?; // delta_poc_sX_minus1
            br.skip_bits(1)?; // used_by_curr_pic_sX_flag
        }
        Ok(num_negative + num_positive)
    }
}

/// 解析 VUI 直至 timing_info, 返回 timing (如存在)
fn parse_vui_timing(br: &mut BitReader) -> NaliuResult<Option<HevcTiming>> {
    // aspect_ratio_info_present_flag
    if br.read_flag()? {
        let ar_idc = br.read_bits(8)?;
        if ar_idc == 255 {
            br.skip_bits(32)?; // sar_width + sar_height
        }
    }
    // overscan_info_present_flag
    if br.read_flag()? {
        br.skip_bits(1)?;
    }
    // video_signal_type_present_flag
    if br.read_flag()? {
        br.skip_bits(4)?;
        if br.read_flag()? {
            br.skip_bits(24)?;
        }
    }
    // chroma_loc_info_present_flag
    if br.read_flag()? {
        let _ = read_ue(br)?;
        let _ = read_ue(br)?;
    }

    br.skip_bits(3)?; // neutral_chroma + field_seq + frame_field_info

    // default_display_window_flag
    if br.read_flag()? {
        for _ in 0..4 {
            let _ = read_ue(br)?;
        }
    }

    if !br.read_flag()? {
        // vui_timing_info_present_flag == 0
        return Ok(None);
    }
    let num_units_in_tick = br.read_bits(32)?;
    let time_scale = br.read_bits(32)?;
    if num_units_in_tick == 0 || time_scale == 0 {
        return Err(NaliuError::InvalidData(format!(
            "HEVC: VUI timing_info 非法, num_units_in_tick={}, time_scale={}",
            num_units_in_tick, time_scale
        )));
    }
    Ok(Some(HevcTiming {
        num_units_in_tick,
        time_scale,
    }))
}
