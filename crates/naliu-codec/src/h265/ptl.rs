//! HEVC profile_tier_level 语法解析.
//!
//! VPS 与 SPS 共用该语法结构; 解码器配置记录 (hvcC) 与操作点描述
//! 都需要其中的全部标量字段.

use naliu_core::{BitReader, NaliuResult};

/// profile_tier_level 解析结果
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileTierLevel {
    /// general_profile_space
    pub profile_space: u8,
    /// general_tier_flag
    pub tier_flag: bool,
    /// general_profile_idc (1=Main, 2=Main 10...)
    pub profile_idc: u8,
    /// general_profile_compatibility_flags (32 位)
    pub profile_compatibility_flags: u32,
    /// general_progressive_source_flag
    pub progressive_source_flag: bool,
    /// general_interlaced_source_flag
    pub interlaced_source_flag: bool,
    /// general_non_packed_constraint_flag
    pub non_packed_constraint_flag: bool,
    /// general_frame_only_constraint_flag
    pub frame_only_constraint_flag: bool,
    /// 剩余 44 位约束标志
    pub constraint_indicator_flags: u64,
    /// general_level_idc (93=3.1, 120=4.0...)
    pub level_idc: u8,
}

impl ProfileTierLevel {
    /// hvcC 所需的 48 位约束标志 (4 个独立标志 + 44 位保留)
    pub fn constraint_indicator_48bits(&self) -> u64 {
        let mut flags = self.constraint_indicator_flags & ((1u64 << 44) - 1);
        if self.progressive_source_flag {
            flags |= 1u64 << 47;
        }
        if self.interlaced_source_flag {
            flags |= 1u64 << 46;
        }
        if self.non_packed_constraint_flag {
            flags |= 1u64 << 45;
        }
        if self.frame_only_constraint_flag {
            flags |= 1u64 << 44;
        }
        flags
    }
}

/// 解析 profile_tier_level
///
/// `max_sub_layers` 为 sps_max_sub_layers_minus1 + 1; 子层的
/// profile/level 只跳过不保留.
pub fn parse_ptl(br: &mut BitReader, max_sub_layers: u8) -> NaliuResult<ProfileTierLevel> {
    let profile_space = br.read_bits(2)? as u8;
    let tier_flag = br.read_flag()?;
    let profile_idc = br.read_bits(5)? as u8;
    let profile_compatibility_flags = br.read_bits(32)?;
    let progressive_source_flag = br.read_flag()?;
    let interlaced_source_flag = br.read_flag()?;
    let non_packed_constraint_flag = br.read_flag()?;
    let frame_only_constraint_flag = br.read_flag()?;
    let constraint_indicator_flags = br.read_bits_u64(44)?;
    let level_idc = br.read_bits(8)? as u8;

    // 子层 profile/level 标志与数据
    if max_sub_layers > 1 {
        let mut profile_present = Vec::new();
        let mut level_present = Vec::new();
        for _ in 0..max_sub_layers - 1 {
            profile_present.push(br.read_flag()?);
            level_present.push(br.read_flag()?);
        }
        if max_sub_layers < 9 {
            // reserved_zero_2bits 对齐
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

    Ok(ProfileTierLevel {
        profile_space,
        tier_flag,
        profile_idc,
        profile_compatibility_flags,
        progressive_source_flag,
        interlaced_source_flag,
        non_packed_constraint_flag,
        frame_only_constraint_flag,
        constraint_indicator_flags,
        level_idc,
    })
}

/// 向位流写入一组最小 PTL (测试与语法向量构造使用)
pub fn write_minimal_ptl(bw: &mut naliu_core::BitWriter, profile_idc: u8, level_idc: u8) {
    bw.write_bits(0, 2); // profile_space
    bw.write_bit(0); // tier_flag
    bw.write_bits(u32::from(profile_idc), 5);
    bw.write_bits(1 << (31 - profile_idc), 32); // compatibility
    bw.write_bit(1); // progressive_source
    bw.write_bit(0); // interlaced_source
    bw.write_bit(0); // non_packed
    bw.write_bit(1); // frame_only
    bw.write_bits_u64(0, 44);
    bw.write_bits(u32::from(level_idc), 8);
}
