//! 轨道元数据导出.
//!
//! - 样本分组: roll-recovery (GDR, recovery_frame_count > 0) 与
//!   open-GOP RAP 分组 (recovery_frame_count == 0 或 SAP 3);
//! - 分层 (SVC / L-HEVC) 流: 每层 temporal id 范围的层信息 blob
//!   (linf) 与基于 VPS 可伸缩扩展的操作点描述 blob (oinf).

use log::warn;
use naliu_core::{BitWriter, NaliuResult};
use naliu_codec::h265::{HevcVps, ProfileTierLevel};

use crate::sample::RapType;
use crate::sink::{TrackId, TrackSink};

/// open-GOP / GDR 逃生门的使用状态
///
/// 0 = 未用; 1 = 出现过 roll-recovery; 2 = 标记过强制同步 /
/// open-GOP RAP (文件不再保证 ISO 基线一致性).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenGopState(pub u32);

/// 封存样本的分组属性
#[derive(Debug, Clone, Copy)]
pub struct FlushedSampleMeta {
    /// 样本随机访问属性
    pub rap: RapType,
    /// 最终写入容器的同步标记 (可能因强制同步高于 rap)
    pub is_sync: bool,
    /// 是否含 I slice
    pub has_i_slice: bool,
    /// 样本级 recovery point
    pub recovery_frame_count: Option<i32>,
}

/// 为一个已封存样本写入 roll / RAP 分组
///
/// 真同步样本不参与分组; 非同步样本按 recovery 距离分流:
/// 距离 > 0 进 roll 组, 距离 == 0 且含 I slice (或 SAP 3) 进 RAP 组.
pub fn mark_sample_groups<S: TrackSink>(
    sink: &mut S,
    track: TrackId,
    index: u32,
    meta: &FlushedSampleMeta,
    state: &mut OpenGopState,
) -> NaliuResult<()> {
    if meta.is_sync {
        return Ok(());
    }
    let has_recovery = meta.recovery_frame_count.is_some();
    let is_open_gop = meta.rap == RapType::OpenGop;
    if !has_recovery && !meta.has_i_slice && !is_open_gop {
        return Ok(());
    }

    match meta.recovery_frame_count {
        Some(count) if count > 0 => {
            if state.0 == 0 {
                state.0 = 1;
            }
            sink.set_sample_roll_group(track, index, count.min(i32::from(i16::MAX)) as i16)?;
        }
        Some(0) if meta.has_i_slice => {
            if state.0 == 0 {
                state.0 = 2;
            }
            sink.set_sample_rap_group(track, index)?;
        }
        _ if is_open_gop => {
            if state.0 == 0 {
                state.0 = 2;
            }
            sink.set_sample_rap_group(track, index)?;
        }
        _ => {}
    }
    Ok(())
}

// ============================================================
// 分层流元数据
// ============================================================

/// 单层的 temporal id 观测范围
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerInfo {
    /// layer_id + 1 (0 表示该层未出现)
    pub layer_id_plus_one: u32,
    /// 观测到的最小 temporal id
    pub min_temporal_id: u8,
    /// 观测到的最大 temporal id
    pub max_temporal_id: u8,
}

/// 观测一个进入样本的 NAL 的层归属
pub fn note_layer_nal(layers: &mut [LayerInfo; 64], layer_id: u8, temporal_id: u8) {
    let entry = &mut layers[layer_id as usize];
    if entry.layer_id_plus_one == 0 {
        entry.layer_id_plus_one = u32::from(layer_id) + 1;
        entry.min_temporal_id = temporal_id;
        entry.max_temporal_id = temporal_id;
        return;
    }
    if temporal_id < entry.min_temporal_id {
        entry.min_temporal_id = temporal_id;
    }
    if temporal_id > entry.max_temporal_id {
        entry.max_temporal_id = temporal_id;
    }
}

/// 序列化层信息 blob (linf 样本分组载荷)
pub fn build_layer_information(layers: &[LayerInfo; 64]) -> Vec<u8> {
    let nb_layers = layers.iter().filter(|l| l.layer_id_plus_one != 0).count() as u32;
    let mut bw = BitWriter::new();
    bw.write_bits(0, 2); // reserved
    bw.write_bits(nb_layers, 6);
    for layer in layers.iter().filter(|l| l.layer_id_plus_one != 0) {
        bw.write_bits(0, 4); // reserved
        bw.write_bits(layer.layer_id_plus_one - 1, 6);
        bw.write_bits(u32::from(layer.min_temporal_id), 3);
        bw.write_bits(u32::from(layer.max_temporal_id), 3);
        bw.write_bits(0, 1); // reserved
        bw.write_bits(0x7F, 7); // sub_layer_presence_flags
    }
    bw.finish()
}

/// 每层观测到的最大图像尺寸 (操作点描述的尺寸界限来源)
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerDimensions {
    /// 宽
    pub width: u32,
    /// 高
    pub height: u32,
    /// 色度格式
    pub chroma_format: u32,
    /// 位深
    pub bit_depth: u32,
}

/// 序列化操作点描述 blob (oinf 样本分组载荷)
///
/// VPS 无可伸缩扩展时返回 None. 每层的 PTL 取基础 PTL (扩展后部的
/// 逐 OLS PTL 列表不在解析覆盖面内), 图像尺寸界限由各层 SPS 观测值
/// 汇总.
pub fn build_operating_points(
    vps: &HevcVps,
    layer_dims: &[LayerDimensions; 64],
    max_temporal_id: &[u8; 64],
) -> Option<Vec<u8>> {
    let ext = vps.extension.as_ref()?;

    let mut bw = BitWriter::new();
    bw.write_bits(u32::from(ext.scalability_mask), 16);

    // PTL 列表: 仅基础 PTL
    let ptls: Vec<&ProfileTierLevel> = vec![&vps.ptl];
    bw.write_bits(0, 2); // reserved
    bw.write_bits(ptls.len() as u32, 6);
    for ptl in &ptls {
        bw.write_bits(u32::from(ptl.profile_space), 2);
        bw.write_bits(u32::from(ptl.tier_flag), 1);
        bw.write_bits(u32::from(ptl.profile_idc), 5);
        bw.write_bits(ptl.profile_compatibility_flags, 32);
        bw.write_bits_u64(ptl.constraint_indicator_48bits(), 48);
        bw.write_bits(u32::from(ptl.level_idc), 8);
    }

    // 操作点: 每个层集合一个
    let ols_count = vps.layer_id_included.len().min(u16::MAX as usize);
    if ols_count < vps.layer_id_included.len() {
        warn!("操作点数量超出 16 位表达范围, 截断到 {}", ols_count);
    }
    bw.write_bits(ols_count as u32, 16);
    for (ols_idx, included) in vps.layer_id_included.iter().take(ols_count).enumerate() {
        bw.write_bits(ols_idx as u32, 16); // output_layer_set_idx
        let op_max_tid = included
            .iter()
            .map(|&id| max_temporal_id[id as usize])
            .max()
            .unwrap_or(0);
        bw.write_bits(u32::from(op_max_tid), 8);
        bw.write_bits(included.len() as u32, 8); // layer_count
        for (pos, &layer_id) in included.iter().enumerate() {
            bw.write_bits(0, 8); // ptl_idx: 基础 PTL
            bw.write_bits(u32::from(layer_id), 6);
            // 输出层: 集合中最高层
            bw.write_bits(u32::from(pos == included.len() - 1), 1);
            bw.write_bits(0, 1); // is_alternate_outputlayer
        }

        let dims: Vec<LayerDimensions> = included
            .iter()
            .map(|&id| layer_dims[id as usize])
            .filter(|d| d.width > 0)
            .collect();
        let min_w = dims.iter().map(|d| d.width).min().unwrap_or(0);
        let min_h = dims.iter().map(|d| d.height).min().unwrap_or(0);
        let max_w = dims.iter().map(|d| d.width).max().unwrap_or(0);
        let max_h = dims.iter().map(|d| d.height).max().unwrap_or(0);
        let max_chroma = dims.iter().map(|d| d.chroma_format).max().unwrap_or(0);
        let max_depth = dims.iter().map(|d| d.bit_depth).max().unwrap_or(8);
        bw.write_bits(min_w.min(u16::MAX as u32), 16);
        bw.write_bits(min_h.min(u16::MAX as u32), 16);
        bw.write_bits(max_w.min(u16::MAX as u32), 16);
        bw.write_bits(max_h.min(u16::MAX as u32), 16);
        bw.write_bits(max_chroma, 2);
        bw.write_bits(max_depth.saturating_sub(8).min(7), 3);
        bw.write_bits(0, 1); // reserved
        bw.write_bits(0, 1); // frame_rate_info_flag
        bw.write_bits(0, 1); // bit_rate_info_flag
    }

    // 依赖层描述
    let layer_count = ext.layer_id_in_nuh.len().min(64);
    bw.write_bits(layer_count as u32, 8);
    for i in 0..layer_count {
        bw.write_bits(u32::from(ext.layer_id_in_nuh[i]), 8);
        let deps = &ext.direct_dependency[i];
        bw.write_bits(deps.len() as u32, 8);
        for &dep in deps {
            bw.write_bits(u32::from(dep), 8);
        }
        // 按 scalability mask 展开各维度 id
        let mut dim_pos = 0usize;
        for bit in 0..16 {
            if ext.scalability_mask & (1 << bit) != 0 {
                let value = ext
                    .dimension_id
                    .get(i)
                    .and_then(|dims| dims.get(dim_pos))
                    .copied()
                    .unwrap_or(0);
                bw.write_bits(u32::from(value), 8);
                dim_pos += 1;
            }
        }
    }

    Some(bw.finish())
}
