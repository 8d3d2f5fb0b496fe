//! H.265 VPS (Video Parameter Set) 解析器.
//!
//! 基础语法完整解析; 可伸缩扩展 (Annex F) 解析到层维度与层间依赖
//! 为止 — 操作点描述所需的 PTL 与图像尺寸界限由导入流程从各层
//! SPS 汇总, 不依赖扩展后部的 rep_format 语法.

use naliu_core::BitReader;
use naliu_core::bitreader::read_ue;
use naliu_core::{NaliuError, NaliuResult};

use super::ptl::{ProfileTierLevel, parse_ptl};
use super::sps::HevcTiming;

/// VPS 可伸缩扩展解析结果 (子集)
#[derive(Debug, Clone)]
pub struct VpsExtension {
    /// splitting_flag
    pub splitting_flag: bool,
    /// scalability_mask_flag (16 位)
    pub scalability_mask: u16,
    /// 各层的 nuh_layer_id (索引 0 为基础层)
    pub layer_id_in_nuh: Vec<u8>,
    /// 各层在各可伸缩维度上的 dimension_id
    pub dimension_id: Vec<Vec<u8>>,
    /// 层间直接依赖: `direct_dependency[i]` 含 j 表示第 i 层依赖第 j 层
    pub direct_dependency: Vec<Vec<u8>>,
}

/// VPS 解析结果
#[derive(Debug, Clone)]
pub struct HevcVps {
    /// vps_video_parameter_set_id
    pub vps_id: u32,
    /// vps_base_layer_internal_flag
    pub base_layer_internal: bool,
    /// 层数 (vps_max_layers_minus1 + 1)
    pub max_layers: u32,
    /// 最大子层数
    pub max_sub_layers: u8,
    /// vps_temporal_id_nesting_flag
    pub temporal_id_nesting: bool,
    /// profile_tier_level
    pub ptl: ProfileTierLevel,
    /// vps_max_layer_id
    pub max_layer_id: u32,
    /// 层集合数 (vps_num_layer_sets_minus1 + 1)
    pub num_layer_sets: u32,
    /// `layer_id_included[set]` 含 id 表示该层集合包含 nuh_layer_id=id
    pub layer_id_included: Vec<Vec<u8>>,
    /// VPS 级 timing_info (如存在)
    pub timing: Option<HevcTiming>,
    /// 可伸缩扩展 (如存在且可解析)
    pub extension: Option<VpsExtension>,
}

/// 解析 VPS RBSP (不含 2 字节 NAL 头)
pub fn parse_hevc_vps(rbsp: &[u8]) -> NaliuResult<HevcVps> {
    if rbsp.len() < 4 {
        return Err(NaliuError::InvalidData("HEVC: VPS RBSP 太短".into()));
    }

    let mut br = BitReader::new(rbsp);

    let vps_id = br.read_bits(4)?;
    let base_layer_internal = br.read_flag()?;
    br.skip_bits(1)?; // vps_base_layer_available_flag
    let max_layers = br.read_bits(6)? + 1;
    let max_sub_layers = br.read_bits(3)? as u8 + 1;
    let temporal_id_nesting = br.read_flag()?;
    br.skip_bits(16)?; // vps_reserved_0xffff_16bits

    let ptl = parse_ptl(&mut br, max_sub_layers)?;

    let sub_layer_ordering = br.read_flag()?;
    let start = if sub_layer_ordering {
        0
    } else {
        u32::from(max_sub_layers) - 1
    };
    for _ in start..u32::from(max_sub_layers) {
        let _ = read_ue(&mut br)?; // vps_max_dec_pic_buffering_minus1
        let _ = read_ue(&mut br)?; // vps_max_num_reorder_pics
        let _ = read_ue(&mut br)?; // vps_max_latency_increase_plus1
    }

    let max_layer_id = br.read_bits(6)?;
    let num_layer_sets = read_ue(&mut br)? + 1;
    if num_layer_sets > 1024 {
        return Err(NaliuError::InvalidData(format!(
            "HEVC: vps_num_layer_sets 超出范围, value={}",
            num_layer_sets
        )));
    }
    let mut layer_id_included: Vec<Vec<u8>> = Vec::with_capacity(num_layer_sets as usize);
    layer_id_included.push(vec![0]); // 第 0 个层集合只含基础层
    for _ in 1..num_layer_sets {
        let mut set = Vec::new();
        for id in 0..=max_layer_id {
            if br.read_flag()? {
                set.push(id as u8);
            }
        }
        layer_id_included.push(set);
    }

    let mut timing = None;
    let mut hrd_present = false;
    if br.read_flag()? {
        // vps_timing_info_present_flag
        let num_units_in_tick = br.read_bits(32)?;
        let time_scale = br.read_bits(32)?;
        if num_units_in_tick == 0 || time_scale == 0 {
            return Err(NaliuError::InvalidData(format!(
                "HEVC: VPS timing_info 非法, num_units_in_tick={}, time_scale={}",
                num_units_in_tick, time_scale
            )));
        }
        timing = Some(HevcTiming {
            num_units_in_tick,
            time_scale,
        });
        if br.read_flag()? {
            // vps_poc_proportional_to_timing_flag
            let _ = read_ue(&mut br)?; // vps_num_ticks_poc_diff_one_minus1
        }
        let num_hrd = read_ue(&mut br)?;
        // HRD 语法未覆盖: 含 HRD 的 VPS 到此为止 (扩展不再解析)
        hrd_present = num_hrd > 0;
    }

    let mut extension = None;
    if !hrd_present && br.read_flag()? {
        // vps_extension_flag
        br.align_to_byte();
        extension = parse_vps_extension(&mut br, max_layers, max_sub_layers, base_layer_internal)
            .ok()
            .flatten();
    }

    Ok(HevcVps {
        vps_id,
        base_layer_internal,
        max_layers,
        max_sub_layers,
        temporal_id_nesting,
        ptl,
        max_layer_id,
        num_layer_sets,
        layer_id_included,
        timing,
        extension,
    })
}

/// 解析 vps_extension 前部 (层维度与层间依赖)
///
/// 返回 Ok(None) 表示语法超出覆盖面 (扩展按缺席处理).
fn parse_vps_extension(
    br: &mut BitReader,
    max_layers: u32,
    max_sub_layers: u8,
    base_layer_internal: bool,
) -> NaliuResult<Option<VpsExtension>> {
    if max_layers > 1 && base_layer_internal {
        // profile_tier_level(profilePresentFlag=0): 仅 level 与子层部分
        skip_ptl_without_profile(br, max_sub_layers)?;
    }

    let splitting_flag = br.read_flag()?;
    let mut scalability_mask = 0u16;
    let mut num_scalability_types = 0u32;
    for bit in 0..16 {
        if br.read_flag()? {
            scalability_mask |= 1 << bit;
            num_scalability_types += 1;
        }
    }

    let dim_count = num_scalability_types - u32::from(splitting_flag);
    let mut dimension_id_len = Vec::with_capacity(dim_count as usize);
    for _ in 0..dim_count {
        dimension_id_len.push(br.read_bits(3)? + 1);
    }

    let nuh_layer_id_present = br.read_flag()?;
    let mut layer_id_in_nuh: Vec<u8> = vec![0];
    let mut dimension_id: Vec<Vec<u8>> = vec![vec![0; num_scalability_types as usize]];
    for i in 1..max_layers {
        let id = if nuh_layer_id_present {
            br.read_bits(6)? as u8
        } else {
            i as u8
        };
        layer_id_in_nuh.push(id);
        let mut dims = vec![0u8; num_scalability_types as usize];
        if !splitting_flag {
            for (j, dim) in dims.iter_mut().enumerate().take(dim_count as usize) {
                *dim = br.read_bits(dimension_id_len[j])? as u8;
            }
        }
        dimension_id.push(dims);
    }

    // view_id 部分: NumViews = 各层 ViewOrderIdx 的不同取值数
    // (multiview 维度为 scalability mask 第 1 位)
    let view_id_len = br.read_bits(4)?;
    if view_id_len > 0 {
        let view_dim = view_dimension_index(scalability_mask);
        let mut views: Vec<u8> = Vec::new();
        for dims in &dimension_id {
            let v = view_dim.map(|d| dims[d]).unwrap_or(0);
            if !views.contains(&v) {
                views.push(v);
            }
        }
        for _ in 0..views.len() {
            br.skip_bits(view_id_len)?; // view_id_val
        }
    }

    let mut direct_dependency: Vec<Vec<u8>> = vec![Vec::new()];
    for i in 1..max_layers {
        let mut deps = Vec::new();
        for j in 0..i {
            if br.read_flag()? {
                deps.push(j as u8);
            }
        }
        direct_dependency.push(deps);
    }

    Ok(Some(VpsExtension {
        splitting_flag,
        scalability_mask,
        layer_id_in_nuh,
        dimension_id,
        direct_dependency,
    }))
}

/// multiview 维度 (mask 第 1 位) 在 dimension_id 数组中的下标
fn view_dimension_index(mask: u16) -> Option<usize> {
    if mask & (1 << 1) == 0 {
        return None;
    }
    // 下标 = 比它低的置位数
    Some((mask & 0b1).count_ones() as usize)
}

/// 跳过 profilePresentFlag=0 的 profile_tier_level
fn skip_ptl_without_profile(br: &mut BitReader, max_sub_layers: u8) -> NaliuResult<()> {
    br.skip_bits(8)?; // general_level_idc
    if max_sub_layers > 1 {
        let mut profile_present = Vec::new();
        let mut level_present = Vec::new();
        for _ in 0..max_sub_layers - 1 {
            profile_present.push(br.read_flag()?);
            level_present.push(br.read_flag()?);
        }
        if max_sub_layers < 9 {
            for _ in max_sub_layers - 1..8 {
                br.skip_bits(2)?;
            }
        }
        for i in 0..max_sub_layers as usize - 1 {
            if profile_present[i] {
                br.skip_bits(32)?;
                br.skip_bits(32)?;
                br.skip_bits(24)?;
            }
            if level_present[i] {
                br.skip_bits(8)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h265::ptl::write_minimal_ptl;
    use naliu_core::BitWriter;

    /// 构建最小单层 VPS RBSP
    pub(crate) fn build_minimal_vps(vps_id: u32) -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_bits(vps_id, 4);
        bw.write_bit(1); // vps_base_layer_internal_flag
        bw.write_bit(1); // vps_base_layer_available_flag
        bw.write_bits(0, 6); // vps_max_layers_minus1
        bw.write_bits(0, 3); // vps_max_sub_layers_minus1
        bw.write_bit(1); // vps_temporal_id_nesting_flag
        bw.write_bits(0xFFFF, 16); // reserved
        write_minimal_ptl(&mut bw, 1, 93);
        bw.write_bit(0); // vps_sub_layer_ordering_info_present_flag
        bw.write_ue(3); // vps_max_dec_pic_buffering_minus1
        bw.write_ue(2); // vps_max_num_reorder_pics
        bw.write_ue(0); // vps_max_latency_increase_plus1
        bw.write_bits(0, 6); // vps_max_layer_id
        bw.write_ue(0); // vps_num_layer_sets_minus1
        bw.write_bit(0); // vps_timing_info_present_flag
        bw.write_bit(0); // vps_extension_flag
        bw.write_bit(1); // rbsp_stop_bit
        bw.finish()
    }

    #[test]
    fn test_parse_minimal_vps() {
        let rbsp = build_minimal_vps(0);
        let vps = parse_hevc_vps(&rbsp).expect("VPS 解析失败");
        assert_eq!(vps.vps_id, 0);
        assert_eq!(vps.max_layers, 1);
        assert_eq!(vps.max_sub_layers, 1);
        assert!(vps.temporal_id_nesting);
        assert_eq!(vps.ptl.profile_idc, 1);
        assert_eq!(vps.ptl.level_idc, 93);
        assert_eq!(vps.num_layer_sets, 1);
        assert!(vps.extension.is_none());
    }

    #[test]
    fn test_parse_vps_with_timing() {
        let mut bw = BitWriter::new();
        bw.write_bits(0, 4);
        bw.write_bit(1);
        bw.write_bit(1);
        bw.write_bits(0, 6);
        bw.write_bits(0, 3);
        bw.write_bit(1);
        bw.write_bits(0xFFFF, 16);
        write_minimal_ptl(&mut bw, 1, 93);
        bw.write_bit(0);
        bw.write_ue(3);
        bw.write_ue(2);
        bw.write_ue(0);
        bw.write_bits(0, 6);
        bw.write_ue(0);
        bw.write_bit(1); // vps_timing_info_present_flag
        bw.write_bits(1001, 32);
        bw.write_bits(30000, 32);
        bw.write_bit(0); // vps_poc_proportional_to_timing_flag
        bw.write_ue(0); // vps_num_hrd_parameters
        bw.write_bit(0); // vps_extension_flag
        bw.write_bit(1);
        let vps = parse_hevc_vps(&bw.finish()).expect("带 timing 的 VPS 解析失败");
        let timing = vps.timing.expect("应存在 timing_info");
        assert_eq!(timing.num_units_in_tick, 1001);
        assert_eq!(timing.time_scale, 30000);
    }

    #[test]
    fn test_parse_vps_reject_too_short() {
        assert!(parse_hevc_vps(&[0x00, 0x01]).is_err());
    }
}
