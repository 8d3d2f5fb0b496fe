//! 解码器配置记录.
//!
//! 扫描期间由参数集注册流程填充, 流结束时序列化为 avcC / hvcC
//! 交给容器落地. 每个导入运行拥有两份记录: 基础层与增强层
//! (SVC / L-HEVC), 最终按层构成决定输出哪份.

use naliu_core::{NaliuError, NaliuResult};
use naliu_codec::h264::Sps;
use naliu_codec::h265::{HevcSps, HevcVps, parse_hevc_pps};

// ============================================================
// H.264 / AVC
// ============================================================

/// AVCDecoderConfigurationRecord 的构建状态
#[derive(Debug, Clone, Default)]
pub struct AvcConfigRecord {
    /// AVCProfileIndication
    pub profile_idc: u8,
    /// profile_compatibility
    pub profile_compatibility: u8,
    /// AVCLevelIndication
    pub level_idc: u8,
    /// 色度格式
    pub chroma_format: u32,
    /// 亮度位深
    pub luma_bit_depth: u32,
    /// 色度位深
    pub chroma_bit_depth: u32,
    /// NAL 长度前缀字节数 (1/2/4)
    pub nal_unit_size: u8,
    /// 已声明的 SPS 原始字节
    pub sps: Vec<Vec<u8>>,
    /// 已声明的 PPS 原始字节
    pub pps: Vec<Vec<u8>>,
    /// 已声明的 SPS 扩展原始字节
    pub sps_ext: Vec<Vec<u8>>,
    /// SPS 数组是否仍保证完整 (出现分歧重定义后置假)
    pub sps_complete: bool,
    /// PPS 数组是否仍保证完整
    pub pps_complete: bool,
}

impl AvcConfigRecord {
    /// 创建空记录
    pub fn new() -> Self {
        Self {
            sps_complete: true,
            pps_complete: true,
            ..Self::default()
        }
    }

    /// 从首个声明的 SPS 填充标量字段
    pub fn apply_sps(&mut self, sps: &Sps) {
        self.profile_idc = sps.profile_idc;
        self.profile_compatibility = sps.constraint_set_flags;
        self.level_idc = sps.level_idc;
        self.chroma_format = sps.chroma_format_idc;
        self.luma_bit_depth = sps.bit_depth_luma;
        self.chroma_bit_depth = sps.bit_depth_chroma;
        self.patch_profile();
    }

    /// 非 RExt profile 却携带高色度/高位深时修补 profile 指示
    ///
    /// 与裸流声明保持一致否则部分解码器拒绝初始化:
    /// 位深 >8 → High 10 (110); 4:4:4 → 244; 其余高色度 → 122.
    fn patch_profile(&mut self) {
        let is_rext = matches!(self.profile_idc, 100 | 110 | 122 | 244 | 44);
        if !is_rext
            && (self.chroma_format > 1 || self.luma_bit_depth > 8 || self.chroma_bit_depth > 8)
        {
            if self.luma_bit_depth > 8 || self.chroma_bit_depth > 8 {
                self.profile_idc = 110;
            } else {
                self.profile_idc = if self.chroma_format == 3 { 244 } else { 122 };
            }
        }
    }

    /// 是否已有任何 SPS
    pub fn has_sps(&self) -> bool {
        !self.sps.is_empty()
    }

    /// 序列化为 AVCDecoderConfigurationRecord
    pub fn build(&self) -> NaliuResult<Vec<u8>> {
        if self.sps.is_empty() {
            return Err(NaliuError::ParameterSet(
                "构建 avcC 需要至少一个 SPS".into(),
            ));
        }
        if self.sps.len() > 31 || self.pps.len() > 255 {
            return Err(NaliuError::ParameterSet(format!(
                "avcC 参数集数量超限, sps={}, pps={}",
                self.sps.len(),
                self.pps.len()
            )));
        }

        let mut out = vec![
            1, // configurationVersion
            self.profile_idc,
            self.profile_compatibility,
            self.level_idc,
            0xFC | (self.nal_unit_size - 1), // lengthSizeMinusOne
            0xE0 | (self.sps.len() as u8),   // numOfSequenceParameterSets
        ];
        for sps in &self.sps {
            write_u16_prefixed(&mut out, sps)?;
        }
        out.push(self.pps.len() as u8);
        for pps in &self.pps {
            write_u16_prefixed(&mut out, pps)?;
        }

        // High profile 族携带扩展字段
        if matches!(self.profile_idc, 100 | 110 | 122 | 244) {
            out.push(0xFC | (self.chroma_format as u8 & 0x03));
            out.push(0xF8 | ((self.luma_bit_depth as u8).saturating_sub(8) & 0x07));
            out.push(0xF8 | ((self.chroma_bit_depth as u8).saturating_sub(8) & 0x07));
            out.push(self.sps_ext.len() as u8);
            for ext in &self.sps_ext {
                write_u16_prefixed(&mut out, ext)?;
            }
        }

        Ok(out)
    }
}

fn write_u16_prefixed(out: &mut Vec<u8>, data: &[u8]) -> NaliuResult<()> {
    let len = u16::try_from(data.len())
        .map_err(|_| NaliuError::ParameterSet(format!("参数集过大, len={}", data.len())))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(data);
    Ok(())
}

// ============================================================
// H.265 / HEVC
// ============================================================

/// hvcC 中的一个参数集数组
#[derive(Debug, Clone)]
pub struct ParamArray {
    /// NAL 类型编号 (32=VPS, 33=SPS, 34=PPS)
    pub nal_type_id: u8,
    /// array_completeness
    pub complete: bool,
    /// 已声明的原始字节
    pub nalus: Vec<Vec<u8>>,
}

/// HEVCDecoderConfigurationRecord 的构建状态
#[derive(Debug, Clone, Default)]
pub struct HevcConfigRecord {
    /// general_profile_space
    pub profile_space: u8,
    /// general_tier_flag
    pub tier_flag: bool,
    /// general_profile_idc
    pub profile_idc: u8,
    /// general_profile_compatibility_flags
    pub profile_compatibility_flags: u32,
    /// 48 位约束标志
    pub constraint_indicator_flags: u64,
    /// general_level_idc
    pub level_idc: u8,
    /// 色度格式
    pub chroma_format: u32,
    /// 亮度位深
    pub luma_bit_depth: u32,
    /// 色度位深
    pub chroma_bit_depth: u32,
    /// 时间子层数
    pub num_temporal_layers: u8,
    /// temporal_id_nesting
    pub temporal_id_nested: bool,
    /// 并行解码类型 (0=混合, 1=无, 2=tiles, 3=WPP)
    pub parallelism_type: u8,
    /// NAL 长度前缀字节数 (1/2/4)
    pub nal_unit_size: u8,
    /// 是否为 L-HEVC 记录 (lhvC)
    pub is_lhvc: bool,
    /// 参数集数组 (VPS/SPS/PPS 按出现顺序)
    pub arrays: Vec<ParamArray>,
}

impl HevcConfigRecord {
    /// 创建空记录
    pub fn new(is_lhvc: bool) -> Self {
        Self {
            is_lhvc,
            ..Self::default()
        }
    }

    /// 从首个声明的 SPS 填充标量字段
    pub fn apply_sps(&mut self, sps: &HevcSps) {
        self.profile_space = sps.ptl.profile_space;
        self.tier_flag = sps.ptl.tier_flag;
        self.profile_idc = sps.ptl.profile_idc;
        self.profile_compatibility_flags = sps.ptl.profile_compatibility_flags;
        self.constraint_indicator_flags = sps.ptl.constraint_indicator_48bits();
        self.level_idc = sps.ptl.level_idc;
        self.chroma_format = sps.chroma_format_idc;
        self.luma_bit_depth = sps.bit_depth_luma;
        self.chroma_bit_depth = sps.bit_depth_chroma;
    }

    /// 从首个声明的 VPS 填充时间分层字段
    pub fn apply_vps(&mut self, vps: &HevcVps) {
        self.num_temporal_layers = vps.max_sub_layers;
        self.temporal_id_nested = vps.temporal_id_nesting;
    }

    /// 取指定类型的参数集数组, 不存在则创建
    pub fn array_mut(&mut self, nal_type_id: u8) -> &mut ParamArray {
        let pos = match self.arrays.iter().position(|a| a.nal_type_id == nal_type_id) {
            Some(pos) => pos,
            None => {
                self.arrays.push(ParamArray {
                    nal_type_id,
                    complete: true,
                    nalus: Vec::new(),
                });
                self.arrays.len() - 1
            }
        };
        &mut self.arrays[pos]
    }

    /// 取指定类型的参数集数组
    pub fn array(&self, nal_type_id: u8) -> Option<&ParamArray> {
        self.arrays.iter().find(|a| a.nal_type_id == nal_type_id)
    }

    /// 是否已有任何参数集
    pub fn has_param_sets(&self) -> bool {
        self.arrays.iter().any(|a| !a.nalus.is_empty())
    }

    /// 从已声明的 PPS 集推导并行解码类型
    ///
    /// 全部 tiles → 2, 全部 WPP → 3, 均不使用 → 1, 混合 → 0.
    pub fn derive_parallelism(&mut self) {
        let Some(ar) = self.array(34) else {
            return;
        };
        let mut use_tiles = 0usize;
        let mut use_wpp = 0usize;
        let mut nb_pps = 0usize;
        for raw in &ar.nalus {
            // 存储的是含 2 字节 NAL 头的原始字节
            if raw.len() < 2 {
                continue;
            }
            let rbsp = naliu_codec::rbsp::to_rbsp(&raw[2..]);
            let Ok(pps) = parse_hevc_pps(&rbsp) else {
                continue;
            };
            nb_pps += 1;
            if !pps.entropy_coding_sync_enabled && pps.tiles_enabled {
                use_tiles += 1;
            } else if pps.entropy_coding_sync_enabled && !pps.tiles_enabled {
                use_wpp += 1;
            }
        }
        self.parallelism_type = if use_tiles == 0 && use_wpp == 0 {
            1
        } else if use_wpp == 0 && use_tiles == nb_pps {
            2
        } else if use_tiles == 0 && use_wpp == nb_pps {
            3
        } else {
            0
        };
    }

    /// 序列化为 HEVCDecoderConfigurationRecord
    pub fn build(&self) -> NaliuResult<Vec<u8>> {
        if !self.has_param_sets() {
            return Err(NaliuError::ParameterSet(
                "构建 hvcC 需要至少一个参数集".into(),
            ));
        }

        let mut out = Vec::with_capacity(64);
        out.push(1); // configurationVersion
        out.push(
            (self.profile_space << 6) | (u8::from(self.tier_flag) << 5) | (self.profile_idc & 0x1F),
        );
        out.extend_from_slice(&self.profile_compatibility_flags.to_be_bytes());
        out.extend_from_slice(&self.constraint_indicator_flags.to_be_bytes()[2..8]);
        out.push(self.level_idc);
        out.extend_from_slice(&(0xF000u16).to_be_bytes()); // min_spatial_segmentation_idc
        out.push(0xFC | (self.parallelism_type & 0x03));
        out.push(0xFC | (self.chroma_format as u8 & 0x03));
        out.push(0xF8 | ((self.luma_bit_depth as u8).saturating_sub(8) & 0x07));
        out.push(0xF8 | ((self.chroma_bit_depth as u8).saturating_sub(8) & 0x07));
        out.extend_from_slice(&0u16.to_be_bytes()); // avgFrameRate
        out.push(
            (self.num_temporal_layers.min(7) << 3)
                | (u8::from(self.temporal_id_nested) << 2)
                | ((self.nal_unit_size - 1) & 0x03),
        );
        out.push(self.arrays.len() as u8);
        for ar in &self.arrays {
            out.push((u8::from(ar.complete) << 7) | (ar.nal_type_id & 0x3F));
            let count = u16::try_from(ar.nalus.len()).map_err(|_| {
                NaliuError::ParameterSet(format!("hvcC 参数集数量超限, count={}", ar.nalus.len()))
            })?;
            out.extend_from_slice(&count.to_be_bytes());
            for nalu in &ar.nalus {
                write_u16_prefixed(&mut out, nalu)?;
            }
        }

        Ok(out)
    }
}
