//! H.264 SPS (Sequence Parameter Set) 解析器.
//!
//! 提取导入所需的全局参数:
//! - Profile / Level (写入解码器配置记录)
//! - 图像宽度和高度 (以宏块为单位, 需要 cropping 调整)
//! - 色度格式与位深
//! - POC 类型及其字段 (时间重建需要)
//! - VUI timing_info (时基自动检测需要)
//!
//! scaling list 语法只跳过不保留: 导入不触碰量化矩阵.

use naliu_core::BitReader;
use naliu_core::bitreader::{read_se, read_ue};
use naliu_core::{NaliuError, NaliuResult};

/// VUI 中的时基信息
#[derive(Debug, Clone, Copy)]
pub struct VuiTiming {
    /// num_units_in_tick
    pub num_units_in_tick: u32,
    /// time_scale
    pub time_scale: u32,
    /// fixed_frame_rate_flag (为假时帧率可能可变)
    pub fixed_frame_rate_flag: bool,
    /// pic_struct_present_flag (影响场/帧时基换算)
    pub pic_struct_present_flag: bool,
}

/// SPS 解析结果
#[derive(Debug, Clone)]
pub struct Sps {
    /// profile_idc (66=Baseline, 77=Main, 100=High...)
    pub profile_idc: u8,
    /// constraint_set 标志位
    pub constraint_set_flags: u8,
    /// level_idc (30=3.0, 41=4.1...)
    pub level_idc: u8,
    /// seq_parameter_set_id
    pub sps_id: u32,
    /// 色度格式 (0=单色, 1=4:2:0, 2=4:2:2, 3=4:4:4)
    pub chroma_format_idc: u32,
    /// 亮度位深
    pub bit_depth_luma: u32,
    /// 色度位深
    pub bit_depth_chroma: u32,
    /// log2(max_frame_num)
    pub log2_max_frame_num: u32,
    /// 图像顺序计数类型 (0, 1, 2)
    pub poc_type: u32,
    /// log2(max_pic_order_cnt_lsb) (仅 poc_type==0)
    pub log2_max_poc_lsb: u32,
    /// `poc_type==1` 时的 delta_pic_order_always_zero_flag
    pub delta_pic_order_always_zero_flag: bool,
    /// `poc_type==1` 时的 offset_for_non_ref_pic
    pub offset_for_non_ref_pic: i32,
    /// `poc_type==1` 时的 offset_for_top_to_bottom_field
    pub offset_for_top_to_bottom_field: i32,
    /// `poc_type==1` 时的 offset_for_ref_frame 列表
    pub offset_for_ref_frame: Vec<i32>,
    /// 最大参考帧数
    pub max_num_ref_frames: u32,
    /// 是否为帧编码 (非场编码)
    pub frame_mbs_only: bool,
    /// 图像宽度 (像素, 已应用 cropping)
    pub width: u32,
    /// 图像高度 (像素, 已应用 cropping)
    pub height: u32,
    /// VUI timing_info (如存在)
    pub timing: Option<VuiTiming>,
}

/// 解析 SPS RBSP (不含 NAL 头字节)
pub fn parse_sps(rbsp: &[u8]) -> NaliuResult<Sps> {
    if rbsp.is_empty() {
        return Err(NaliuError::InvalidData("H264: SPS RBSP 为空".into()));
    }

    let mut br = BitReader::new(rbsp);

    let profile_idc = br.read_bits(8)? as u8;
    let constraint_set_flags = br.read_bits(8)? as u8;
    let level_idc = br.read_bits(8)? as u8;

    let sps_id = read_ue(&mut br)?;
    if sps_id > 31 {
        return Err(NaliuError::InvalidData(format!(
            "H264: sps_id 超出范围, sps_id={}",
            sps_id
        )));
    }

    let mut chroma_format_idc = 1; // 默认 4:2:0
    let mut separate_colour_plane_flag = false;
    let mut bit_depth_luma = 8;
    let mut bit_depth_chroma = 8;

    // High profile 及以上有额外字段
    if is_high_profile(profile_idc) {
        chroma_format_idc = read_ue(&mut br)?;
        if chroma_format_idc > 3 {
            return Err(NaliuError::InvalidData(format!(
                "H264: chroma_format_idc 非法, value={}",
                chroma_format_idc
            )));
        }
        if chroma_format_idc == 3 {
            separate_colour_plane_flag = br.read_flag()?;
        }
        bit_depth_luma = read_ue(&mut br)? + 8;
        bit_depth_chroma = read_ue(&mut br)? + 8;
        if !(8..=14).contains(&bit_depth_luma) || !(8..=14).contains(&bit_depth_chroma) {
            return Err(NaliuError::InvalidData(format!(
                "H264: 位深非法, luma={}, chroma={}",
                bit_depth_luma, bit_depth_chroma
            )));
        }
        br.skip_bits(1)?; // qpprime_y_zero_transform_bypass_flag

        if br.read_flag()? {
            // seq_scaling_matrix_present_flag
            let list_count = if chroma_format_idc != 3 { 8 } else { 12 };
            for list_idx in 0..list_count {
                if br.read_flag()? {
                    skip_scaling_list(&mut br, if list_idx < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    let log2_max_frame_num_minus4 = read_ue(&mut br)?;
    if log2_max_frame_num_minus4 > 12 {
        return Err(NaliuError::InvalidData(format!(
            "H264: log2_max_frame_num_minus4 超出范围, value={}",
            log2_max_frame_num_minus4
        )));
    }
    let log2_max_frame_num = log2_max_frame_num_minus4 + 4;

    let poc_type = read_ue(&mut br)?;
    if poc_type > 2 {
        return Err(NaliuError::InvalidData(format!(
            "H264: pic_order_cnt_type 非法, value={}",
            poc_type
        )));
    }
    let mut log2_max_poc_lsb = 0u32;
    let mut delta_pic_order_always_zero_flag = false;
    let mut offset_for_non_ref_pic = 0i32;
    let mut offset_for_top_to_bottom_field = 0i32;
    let mut offset_for_ref_frame = Vec::new();
    match poc_type {
        0 => {
            let log2_max_poc_lsb_minus4 = read_ue(&mut br)?;
            if log2_max_poc_lsb_minus4 > 12 {
                return Err(NaliuError::InvalidData(format!(
                    "H264: log2_max_pic_order_cnt_lsb_minus4 超出范围, value={}",
                    log2_max_poc_lsb_minus4
                )));
            }
            log2_max_poc_lsb = log2_max_poc_lsb_minus4 + 4;
        }
        1 => {
            delta_pic_order_always_zero_flag = br.read_flag()?;
            offset_for_non_ref_pic = read_se(&mut br)?;
            offset_for_top_to_bottom_field = read_se(&mut br)?;
            let num_ref_in_poc = read_ue(&mut br)?;
            if num_ref_in_poc > 255 {
                return Err(NaliuError::InvalidData(format!(
                    "H264: num_ref_frames_in_pic_order_cnt_cycle 超出范围, value={}",
                    num_ref_in_poc
                )));
            }
            for _ in 0..num_ref_in_poc {
                offset_for_ref_frame.push(read_se(&mut br)?);
            }
        }
        _ => {} // poc_type == 2: 无额外字段
    }

    let max_num_ref_frames = read_ue(&mut br)?;
    if max_num_ref_frames > 16 {
        return Err(NaliuError::InvalidData(format!(
            "H264: max_num_ref_frames 超出范围, value={}",
            max_num_ref_frames
        )));
    }
    br.skip_bits(1)?; // gaps_in_frame_num_value_allowed_flag

    // 图像尺寸 (宏块单位)
    let pic_width_in_mbs = read_ue(&mut br)? + 1;
    let pic_height_in_map_units = read_ue(&mut br)? + 1;

    let frame_mbs_only = br.read_flag()?;
    if !frame_mbs_only {
        br.skip_bits(1)?; // mb_adaptive_frame_field_flag
    }
    br.skip_bits(1)?; // direct_8x8_inference_flag

    let mut crop = [0u32; 4];
    if br.read_flag()? {
        for c in crop.iter_mut() {
            *c = read_ue(&mut br)?;
        }
    }

    // 计算像素尺寸
    let chroma_array_type = if separate_colour_plane_flag {
        0
    } else {
        chroma_format_idc
    };
    let (crop_unit_x, crop_unit_y) = cropping_unit(chroma_array_type, frame_mbs_only);
    let raw_width = pic_width_in_mbs
        .checked_mul(16)
        .ok_or_else(|| NaliuError::InvalidData("H264: 计算宽度时发生溢出".into()))?;
    let raw_height = pic_height_in_map_units
        .checked_mul(if frame_mbs_only { 16 } else { 32 })
        .ok_or_else(|| NaliuError::InvalidData("H264: 计算高度时发生溢出".into()))?;
    let crop_x = (crop[0] + crop[1])
        .checked_mul(crop_unit_x)
        .ok_or_else(|| NaliuError::InvalidData("H264: 计算水平裁剪时发生溢出".into()))?;
    let crop_y = (crop[2] + crop[3])
        .checked_mul(crop_unit_y)
        .ok_or_else(|| NaliuError::InvalidData("H264: 计算垂直裁剪时发生溢出".into()))?;
    if crop_x >= raw_width || crop_y >= raw_height {
        return Err(NaliuError::InvalidData(format!(
            "H264: 裁剪参数非法, raw={}x{}, crop_x={}, crop_y={}",
            raw_width, raw_height, crop_x, crop_y
        )));
    }
    let width = raw_width - crop_x;
    let height = raw_height - crop_y;

    // VUI 参数 (只走到 pic_struct_present_flag)
    let mut timing = None;
    if br.read_flag()? {
        timing = parse_vui_timing(&mut br)?;
    }

    Ok(Sps {
        profile_idc,
        constraint_set_flags,
        level_idc,
        sps_id,
        chroma_format_idc,
        bit_depth_luma,
        bit_depth_chroma,
        log2_max_frame_num,
        poc_type,
        log2_max_poc_lsb,
        delta_pic_order_always_zero_flag,
        offset_for_non_ref_pic,
        offset_for_top_to_bottom_field,
        offset_for_ref_frame,
        max_num_ref_frames,
        frame_mbs_only,
        width,
        height,
        timing,
    })
}

/// 是否为 High Profile 或更高
fn is_high_profile(profile_idc: u8) -> bool {
    matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134
    )
}

/// 获取 cropping 单位
fn cropping_unit(chroma_array_type: u32, frame_mbs_only: bool) -> (u32, u32) {
    let sub_width = match chroma_array_type {
        0 | 3 => 1,
        _ => 2,
    };
    let sub_height = match chroma_array_type {
        0 | 2 | 3 => 1,
        _ => 2,
    };
    let height_mult = if frame_mbs_only { 1 } else { 2 };
    (sub_width, sub_height * height_mult)
}

/// 跳过一组 scaling_list 语法 (不保留内容)
fn skip_scaling_list(br: &mut BitReader, size: u32) -> NaliuResult<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = read_se(br)?;
            next_scale = (i64::from(last_scale) + i64::from(delta_scale) + 256).rem_euclid(256)
                as i32;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

/// 解析 VUI 直至 pic_struct_present_flag, 返回 timing 信息 (如存在)
fn parse_vui_timing(br: &mut BitReader) -> NaliuResult<Option<VuiTiming>> {
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
        br.skip_bits(4)?; // video_format + video_full_range_flag
        if br.read_flag()? {
            br.skip_bits(24)?; // colour_primaries/transfer/matrix
        }
    }
    // chroma_loc_info_present_flag
    if br.read_flag()? {
        let _ = read_ue(br)?;
        let _ = read_ue(br)?;
    }

    let mut num_units_in_tick = 0u32;
    let mut time_scale = 0u32;
    let mut fixed_frame_rate_flag = false;
    let timing_present = br.read_flag()?;
    if timing_present {
        num_units_in_tick = br.read_bits(32)?;
        time_scale = br.read_bits(32)?;
        fixed_frame_rate_flag = br.read_flag()?;
        if num_units_in_tick == 0 || time_scale == 0 {
            return Err(NaliuError::InvalidData(format!(
                "H264: VUI timing_info 非法, num_units_in_tick={}, time_scale={}",
                num_units_in_tick, time_scale
            )));
        }
    }

    // HRD 参数 (跳过, 只为抵达 pic_struct_present_flag)
    let nal_hrd = br.read_flag()?;
    if nal_hrd {
        skip_hrd_parameters(br)?;
    }
    let vcl_hrd = br.read_flag()?;
    if vcl_hrd {
        skip_hrd_parameters(br)?;
    }
    if nal_hrd || vcl_hrd {
        br.skip_bits(1)?; // low_delay_hrd_flag
    }
    let pic_struct_present_flag = br.read_flag()?;

    if !timing_present {
        return Ok(None);
    }
    Ok(Some(VuiTiming {
        num_units_in_tick,
        time_scale,
        fixed_frame_rate_flag,
        pic_struct_present_flag,
    }))
}

/// 跳过 hrd_parameters 语法
fn skip_hrd_parameters(br: &mut BitReader) -> NaliuResult<()> {
    let cpb_cnt_minus1 = read_ue(br)?;
    if cpb_cnt_minus1 > 31 {
        return Err(NaliuError::InvalidData(format!(
            "H264: cpb_cnt_minus1 超出范围, value={}",
            cpb_cnt_minus1
        )));
    }
    br.skip_bits(8)?; // bit_rate_scale + cpb_size_scale
    for _ in 0..=cpb_cnt_minus1 {
        let _ = read_ue(br)?; // bit_rate_value_minus1
        let _ = read_ue(br)?; // cpb_size_value_minus1
        br.skip_bits(1)?; // cbr_flag
    }
    br.skip_bits(20)?; // 4 个 5 位长度字段
    Ok(())
}
