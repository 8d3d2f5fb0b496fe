//! 编解码族适配器.
//!
//! AVC 与 HEVC 的导入状态机平行而不相同; 通用主循环 (session) 只
//! 依赖 [`CodecAdapter`] 的小能力集: NAL 分类、参数集声明、时基
//! 提示、尺寸汇总与配置定稿. 两族各自持有解析器状态 (参数集映射、
//! POC 历史、待决 SEI recovery point).

use std::collections::HashMap;
use std::fmt;

use log::warn;
use naliu_core::{NaliuError, NaliuResult};
use naliu_codec::h264::{self, NalUnitType, PocState, SliceType, SVC_SSPS_ID_SHIFT};
use naliu_codec::h265::{self, HevcNalUnitType, HevcPocState};
use naliu_codec::rbsp::to_rbsp;
use naliu_core::BitReader;
use naliu_core::bitreader::read_ue;

use crate::config::{AvcConfigRecord, HevcConfigRecord};
use crate::metadata::LayerDimensions;
use crate::registry::{Observation, ParamSetKind};
use crate::sample::RapType;
use crate::session::ImportWarning;
use crate::sink::DecoderConfig;

/// 编解码族
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    /// H.264 / AVC (含 SVC)
    Avc,
    /// H.265 / HEVC (含 L-HEVC)
    Hevc,
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avc => write!(f, "AVC-H264"),
            Self::Hevc => write!(f, "HEVC"),
        }
    }
}

/// 分类后的 slice 信息
#[derive(Debug, Clone, Copy)]
pub struct SliceInfo {
    /// slice 类型
    pub slice_type: SliceType,
    /// 图像的 POC
    pub poc: i32,
    /// 是否为真 IDR 等价点
    pub is_idr: bool,
    /// 样本级随机访问属性 (由该图像的 NAL 类型决定)
    pub rap: RapType,
    /// 是否为图像的第一个 slice
    pub first_in_pic: bool,
    /// 是否为增强层 slice (SVC / layer_id > 0)
    pub is_enhancement: bool,
}

/// 分类结果中的处理动作
#[derive(Debug, Clone, Copy)]
pub enum NalAction {
    /// 参数集: 交给注册表与配置记录
    ParameterSet {
        /// 参数集类别
        kind: ParamSetKind,
        /// codec 定义的 id (subset SPS 已加偏移)
        id: u32,
    },
    /// slice: 复制进样本并驱动时间重建
    Slice(SliceInfo),
    /// SVC 前缀 NAL: 复制且在封存时移交下一样本
    SvcPrefix,
    /// SEI: 按策略复制
    Sei {
        /// 是否为后缀 SEI (归属当前样本)
        suffix: bool,
    },
    /// 原样复制, 不另作处理 (数据分区 B/C 等)
    CopyVerbatim,
    /// 丢弃 (AUD / filler / 序列结束)
    Discard,
    /// 未支持类型: 警告后原样复制
    Unsupported(u8),
    /// 本 NAL 解析失败, 跳过 (不中止码流)
    Skip,
}

/// 一个 NAL 的分类结果
#[derive(Debug, Clone, Copy)]
pub struct NalInfo {
    /// 是否开启新的访问单元 (样本边界信号)
    pub starts_new_au: bool,
    /// 层 id (AVC 基础语法恒为 0)
    pub layer_id: u8,
    /// temporal id
    pub temporal_id: u8,
    /// 处理动作
    pub action: NalAction,
}

impl NalInfo {
    fn plain(action: NalAction) -> Self {
        Self {
            starts_new_au: false,
            layer_id: 0,
            temporal_id: 0,
            action,
        }
    }
}

/// 参数集声明结果
#[derive(Debug, Clone, Copy)]
pub struct DeclareOutcome {
    /// 注册表判定
    pub observation: Observation,
    /// 该 NAL 是否需复制进带内样本
    pub copy_inline: bool,
}

/// 码流携带的时基提示 (仅由首个可信 SPS 产生一次)
#[derive(Debug, Clone, Copy)]
pub struct TimingHint {
    /// 轨道时钟频率
    pub timescale: u32,
    /// 样本 DTS 步进
    pub dts_inc: u32,
    /// fixed_frame_rate_flag (为假时给出可变帧率警告)
    pub fixed_frame_rate: bool,
}

/// 编解码族适配器能力集
pub trait CodecAdapter {
    /// 编解码族
    fn codec(&self) -> CodecKind;

    /// 分类一个 NAL (含其载荷解析)
    ///
    /// 局部解析失败返回 `Skip` 动作; 只有不可恢复条件 (首个参数集
    /// 即损坏) 返回 Err.
    fn classify(&mut self, payload: &[u8], warnings: &mut Vec<ImportWarning>)
    -> NaliuResult<NalInfo>;

    /// 声明一个参数集 (注册表判定已由调用方完成)
    fn declare_parameter_set(
        &mut self,
        kind: ParamSetKind,
        id: u32,
        payload: &[u8],
        layer_id: u8,
        observation: Observation,
        inband: bool,
    ) -> DeclareOutcome;

    /// 取走一次性的时基提示 (如有)
    fn take_timing_hint(&mut self) -> Option<TimingHint>;

    /// 取走待决的 recovery point (归属下一个图像)
    fn take_recovery(&mut self) -> Option<i32>;

    /// 是否已有任何可用参数集
    fn has_parameter_sets(&self) -> bool;

    /// 是否观测到场编码 (PAFF, 影响第二趟 CTS 换算)
    fn is_paff(&self) -> bool {
        false
    }

    /// 汇总视觉尺寸 (分层流以 `min_layer_id` 决定基准层)
    fn dimensions(&self, min_layer_id: u8) -> (u32, u32);

    /// RAP 样本带内补全所需的参数集 (仅 HEVC 带内模式)
    fn rap_inline_headers(&self, has_vps: bool, has_sps: bool) -> Vec<Vec<u8>>;

    /// 流结束时定稿解码器配置
    fn finish_config(
        &mut self,
        nal_unit_size: u8,
        inband: bool,
        min_layer_id: u8,
    ) -> NaliuResult<DecoderConfig>;

    /// 分层流的操作点描述 blob (仅 HEVC, VPS 含可伸缩扩展时)
    fn operating_points(&self, max_temporal_id: &[u8; 64]) -> Option<Vec<u8>>;
}

// ============================================================
// H.264 / AVC
// ============================================================

/// AVC 适配器
pub struct AvcAdapter {
    sps_map: HashMap<u32, h264::Sps>,
    pps_map: HashMap<u32, h264::Pps>,
    poc: PocState,
    avc_cfg: AvcConfigRecord,
    svc_cfg: AvcConfigRecord,
    /// 与 avc_cfg.pps / svc_cfg.pps 平行的 id 表 (SVC PPS 迁移用)
    avc_pps_ids: Vec<u32>,
    pending_recovery: Option<i32>,
    timing_hint: Option<TimingHint>,
    timing_hint_armed: bool,
    max_w: u32,
    max_h: u32,
    /// 检测到过场编码 slice
    pub seen_field_coding: bool,
}

impl AvcAdapter {
    /// 创建适配器
    ///
    /// `detect_fps` 为真时首个可信 SPS 产出时基提示.
    pub fn new(detect_fps: bool) -> Self {
        Self {
            sps_map: HashMap::new(),
            pps_map: HashMap::new(),
            poc: PocState::new(),
            avc_cfg: AvcConfigRecord::new(),
            svc_cfg: AvcConfigRecord::new(),
            avc_pps_ids: Vec::new(),
            pending_recovery: None,
            timing_hint: None,
            timing_hint_armed: detect_fps,
            max_w: 0,
            max_h: 0,
            seen_field_coding: false,
        }
    }

    fn classify_slice(
        &mut self,
        header: h264::NalHeader,
        rbsp: &[u8],
        warnings: &mut Vec<ImportWarning>,
    ) -> NalInfo {
        let sh = match h264::parse_slice_header(rbsp, header, &self.sps_map, &self.pps_map) {
            Ok(sh) => sh,
            Err(err) => {
                warn!("AVC slice 解析失败: {}", err);
                warnings.push(ImportWarning::NalParseError {
                    detail: err.to_string(),
                });
                return NalInfo::plain(NalAction::Skip);
            }
        };
        if sh.field_pic {
            self.seen_field_coding = true;
        }

        let sps = &self.sps_map[&self.pps_map[&sh.pps_id].sps_id];
        let poc = self.poc.compute(sps, &sh);

        NalInfo {
            starts_new_au: sh.first_mb == 0,
            layer_id: 0,
            temporal_id: 0,
            action: NalAction::Slice(SliceInfo {
                slice_type: sh.slice_type,
                poc,
                is_idr: sh.is_idr,
                rap: if sh.is_idr { RapType::Sync } else { RapType::None },
                first_in_pic: sh.first_mb == 0,
                is_enhancement: false,
            }),
        }
    }

    /// SVC 增强层 slice: 只取前缀字段 (first_mb, slice_type, pps_id)
    fn classify_svc_slice(&mut self, payload: &[u8]) -> NalInfo {
        // NAL 头后还有 3 字节 SVC 扩展头
        if payload.len() < 5 {
            return NalInfo::plain(NalAction::Skip);
        }
        let rbsp = to_rbsp(&payload[4..]);
        let mut br = BitReader::new(&rbsp);
        let Ok(first_mb) = read_ue(&mut br) else {
            return NalInfo::plain(NalAction::Skip);
        };
        let Ok(slice_type_raw) = read_ue(&mut br) else {
            return NalInfo::plain(NalAction::Skip);
        };
        let Ok(slice_type) = SliceType::from_raw(slice_type_raw) else {
            return NalInfo::plain(NalAction::Skip);
        };
        let pps_id = read_ue(&mut br).unwrap_or(0);

        // 该 PPS 被增强层引用: 从基础层配置迁移到 SVC 配置
        if let Some(pos) = self.avc_pps_ids.iter().position(|&id| id == pps_id) {
            let raw = self.avc_cfg.pps.remove(pos);
            self.avc_pps_ids.remove(pos);
            self.svc_cfg.pps.push(raw);
        }

        NalInfo {
            starts_new_au: false,
            layer_id: 1,
            temporal_id: 0,
            action: NalAction::Slice(SliceInfo {
                slice_type,
                poc: 0,
                is_idr: false,
                rap: RapType::None,
                first_in_pic: first_mb == 0,
                is_enhancement: true,
            }),
        }
    }

    fn arm_timing_hint(&mut self, sps: &h264::Sps) {
        if !self.timing_hint_armed {
            return;
        }
        let Some(timing) = sps.timing else {
            return;
        };
        // 检出帧率过高视为错误的 timing 信息, 不采用
        if u64::from(timing.time_scale) > 1000 * u64::from(timing.num_units_in_tick) {
            return;
        }
        // 帧时基 = 2 × num_units_in_tick × 场/帧换算因子
        let divisor = 2u64;
        let timescale = 2 * u64::from(timing.time_scale);
        let dts_inc = 2 * u64::from(timing.num_units_in_tick) * divisor;
        let (Ok(timescale), Ok(dts_inc)) = (u32::try_from(timescale), u32::try_from(dts_inc))
        else {
            return;
        };
        self.timing_hint = Some(TimingHint {
            timescale,
            dts_inc,
            fixed_frame_rate: timing.fixed_frame_rate_flag,
        });
        self.timing_hint_armed = false;
    }
}

impl CodecAdapter for AvcAdapter {
    fn codec(&self) -> CodecKind {
        CodecKind::Avc
    }

    fn classify(
        &mut self,
        payload: &[u8],
        warnings: &mut Vec<ImportWarning>,
    ) -> NaliuResult<NalInfo> {
        let header = match h264::nal::parse_header(payload) {
            Ok(h) => h,
            Err(err) => {
                warn!("AVC NAL 头解析失败: {}", err);
                warnings.push(ImportWarning::NalParseError {
                    detail: err.to_string(),
                });
                return Ok(NalInfo::plain(NalAction::Skip));
            }
        };

        let info = match header.nal_type {
            NalUnitType::Sps | NalUnitType::SubsetSps => {
                let is_subset = header.nal_type == NalUnitType::SubsetSps;
                let rbsp = to_rbsp(&payload[1..]);
                match h264::parse_sps(&rbsp) {
                    Ok(sps) => {
                        let id = if is_subset {
                            sps.sps_id + SVC_SSPS_ID_SHIFT
                        } else {
                            sps.sps_id
                        };
                        if !is_subset {
                            self.arm_timing_hint(&sps);
                        }
                        self.sps_map.insert(id, sps);
                        NalInfo {
                            starts_new_au: true,
                            layer_id: u8::from(is_subset),
                            temporal_id: 0,
                            action: NalAction::ParameterSet {
                                kind: if is_subset {
                                    ParamSetKind::AvcSubsetSps
                                } else {
                                    ParamSetKind::AvcSps
                                },
                                id,
                            },
                        }
                    }
                    Err(err) => {
                        // 首个 SPS 即损坏视为不可恢复
                        if self.sps_map.is_empty() {
                            return Err(NaliuError::ParameterSet(format!(
                                "SPS 解析失败: {}",
                                err
                            )));
                        }
                        warn!("AVC SPS 解析失败 (已有可用 SPS): {}", err);
                        warnings.push(ImportWarning::NalParseError {
                            detail: err.to_string(),
                        });
                        NalInfo::plain(NalAction::Skip)
                    }
                }
            }
            NalUnitType::Pps => {
                let rbsp = to_rbsp(&payload[1..]);
                match h264::parse_pps(&rbsp) {
                    Ok(pps) => {
                        let id = pps.pps_id;
                        self.pps_map.insert(id, pps);
                        NalInfo {
                            starts_new_au: true,
                            layer_id: 0,
                            temporal_id: 0,
                            action: NalAction::ParameterSet {
                                kind: ParamSetKind::AvcPps,
                                id,
                            },
                        }
                    }
                    Err(err) => {
                        return Err(NaliuError::ParameterSet(format!(
                            "PPS 解析失败: {}",
                            err
                        )));
                    }
                }
            }
            NalUnitType::SpsExtension => {
                let rbsp = to_rbsp(&payload[1..]);
                let mut br = BitReader::new(&rbsp);
                let id = read_ue(&mut br).unwrap_or(0);
                NalInfo {
                    starts_new_au: false,
                    layer_id: 0,
                    temporal_id: 0,
                    action: NalAction::ParameterSet {
                        kind: ParamSetKind::AvcSpsExt,
                        id,
                    },
                }
            }
            NalUnitType::Sei => {
                if self.sps_map.is_empty() {
                    NalInfo::plain(NalAction::Discard)
                } else {
                    let rbsp = to_rbsp(&payload[1..]);
                    if let Ok(messages) = h264::parse_sei(&rbsp) {
                        for message in messages {
                            if let h264::SeiMessage::RecoveryPoint(rp) = message {
                                self.pending_recovery = Some(rp.recovery_frame_cnt as i32);
                            }
                        }
                    }
                    NalInfo {
                        starts_new_au: true,
                        layer_id: 0,
                        temporal_id: 0,
                        action: NalAction::Sei { suffix: false },
                    }
                }
            }
            NalUnitType::Slice | NalUnitType::SliceIdr | NalUnitType::SliceDpa => {
                let rbsp = to_rbsp(&payload[1..]);
                self.classify_slice(header, &rbsp, warnings)
            }
            NalUnitType::SliceDpb | NalUnitType::SliceDpc => {
                NalInfo::plain(NalAction::CopyVerbatim)
            }
            NalUnitType::SvcSlice => self.classify_svc_slice(payload),
            NalUnitType::PrefixNalu => NalInfo::plain(NalAction::SvcPrefix),
            NalUnitType::Aud => NalInfo {
                starts_new_au: true,
                layer_id: 0,
                temporal_id: 0,
                action: NalAction::Discard,
            },
            NalUnitType::FillerData | NalUnitType::EndOfSequence | NalUnitType::EndOfStream => {
                NalInfo::plain(NalAction::Discard)
            }
            other => NalInfo::plain(NalAction::Unsupported(other.type_id())),
        };
        Ok(info)
    }

    fn declare_parameter_set(
        &mut self,
        kind: ParamSetKind,
        id: u32,
        payload: &[u8],
        _layer_id: u8,
        observation: Observation,
        inband: bool,
    ) -> DeclareOutcome {
        let copy_inline = match observation {
            Observation::Added => {
                match kind {
                    ParamSetKind::AvcSps => {
                        if let Some(sps) = self.sps_map.get(&id) {
                            // 标量字段取首个声明的 SPS
                            if !self.avc_cfg.has_sps() {
                                self.avc_cfg.apply_sps(sps);
                            }
                            if self.max_w <= sps.width && self.max_h <= sps.height {
                                self.max_w = sps.width;
                                self.max_h = sps.height;
                            }
                        }
                        self.avc_cfg.sps.push(payload.to_vec());
                        inband
                    }
                    ParamSetKind::AvcSubsetSps => {
                        if let Some(sps) = self.sps_map.get(&id) {
                            if !self.svc_cfg.has_sps() {
                                self.svc_cfg.apply_sps(sps);
                            }
                        }
                        self.svc_cfg.sps.push(payload.to_vec());
                        // subset SPS 不随样本携带
                        false
                    }
                    ParamSetKind::AvcPps => {
                        self.avc_cfg.pps.push(payload.to_vec());
                        // id 表与 pps 数组平行维护
                        let rbsp = to_rbsp(&payload[1..]);
                        let mut br = BitReader::new(&rbsp);
                        self.avc_pps_ids.push(read_ue(&mut br).unwrap_or(0));
                        inband
                    }
                    ParamSetKind::AvcSpsExt => {
                        self.avc_cfg.sps_ext.push(payload.to_vec());
                        inband
                    }
                    _ => inband,
                }
            }
            Observation::DuplicateIdentical => inband,
            Observation::DuplicateDivergent => {
                // 同 id 异内容: 不进配置记录, 转带内, 数组标记不完整
                match kind {
                    ParamSetKind::AvcSps | ParamSetKind::AvcSubsetSps => {
                        self.avc_cfg.sps_complete = false;
                    }
                    ParamSetKind::AvcPps => self.avc_cfg.pps_complete = false,
                    _ => {}
                }
                true
            }
        };
        DeclareOutcome {
            observation,
            copy_inline,
        }
    }

    fn take_timing_hint(&mut self) -> Option<TimingHint> {
        self.timing_hint.take()
    }

    fn take_recovery(&mut self) -> Option<i32> {
        self.pending_recovery.take()
    }

    fn has_parameter_sets(&self) -> bool {
        self.avc_cfg.has_sps() || self.svc_cfg.has_sps()
    }

    fn is_paff(&self) -> bool {
        self.seen_field_coding
    }

    fn dimensions(&self, _min_layer_id: u8) -> (u32, u32) {
        (self.max_w, self.max_h)
    }

    fn rap_inline_headers(&self, _has_vps: bool, _has_sps: bool) -> Vec<Vec<u8>> {
        Vec::new()
    }

    fn finish_config(
        &mut self,
        nal_unit_size: u8,
        inband: bool,
        _min_layer_id: u8,
    ) -> NaliuResult<DecoderConfig> {
        self.avc_cfg.nal_unit_size = nal_unit_size;
        self.svc_cfg.nal_unit_size = nal_unit_size;

        if inband {
            return Ok(DecoderConfig {
                primary: Some(self.avc_cfg.build()?),
                enhancement: None,
                inband: true,
            });
        }
        if self.avc_cfg.has_sps() {
            let enhancement = if self.svc_cfg.has_sps() {
                Some(self.svc_cfg.build()?)
            } else {
                None
            };
            Ok(DecoderConfig {
                primary: Some(self.avc_cfg.build()?),
                enhancement,
                inband: false,
            })
        } else {
            // 纯 SVC 流: 只有增强层配置
            Ok(DecoderConfig {
                primary: None,
                enhancement: Some(self.svc_cfg.build()?),
                inband: false,
            })
        }
    }

    fn operating_points(&self, _max_temporal_id: &[u8; 64]) -> Option<Vec<u8>> {
        None
    }
}

// ============================================================
// H.265 / HEVC
// ============================================================

/// HEVC 适配器
pub struct HevcAdapter {
    sps_map: HashMap<u32, h265::HevcSps>,
    pps_map: HashMap<u32, h265::HevcPps>,
    vps_map: HashMap<u32, h265::HevcVps>,
    poc: HevcPocState,
    hevc_cfg: HevcConfigRecord,
    lhvc_cfg: HevcConfigRecord,
    /// 当前激活的 VPS id (操作点描述来源)
    cur_vps_id: Option<u32>,
    /// 各层 SPS 观测到的图像属性 (oinf 尺寸界限)
    layer_dims: [LayerDimensions; 64],
    pending_recovery: Option<i32>,
    timing_hint: Option<TimingHint>,
    timing_hint_armed: bool,
    max_w: u32,
    max_h: u32,
    max_w_base: u32,
    max_h_base: u32,
    has_hevc_layer: bool,
    has_lhvc_layer: bool,
}

impl HevcAdapter {
    /// 创建适配器
    pub fn new(detect_fps: bool) -> Self {
        Self {
            sps_map: HashMap::new(),
            pps_map: HashMap::new(),
            vps_map: HashMap::new(),
            poc: HevcPocState::new(),
            hevc_cfg: HevcConfigRecord::new(false),
            lhvc_cfg: HevcConfigRecord::new(true),
            cur_vps_id: None,
            layer_dims: [LayerDimensions::default(); 64],
            pending_recovery: None,
            timing_hint: None,
            timing_hint_armed: detect_fps,
            max_w: 0,
            max_h: 0,
            max_w_base: 0,
            max_h_base: 0,
            has_hevc_layer: false,
            has_lhvc_layer: false,
        }
    }

    fn cfg_for_layer(&mut self, layer_id: u8) -> &mut HevcConfigRecord {
        if layer_id == 0 {
            self.has_hevc_layer = true;
            &mut self.hevc_cfg
        } else {
            self.has_lhvc_layer = true;
            &mut self.lhvc_cfg
        }
    }

    fn arm_timing_hint(&mut self, sps: &h265::HevcSps) {
        if !self.timing_hint_armed {
            return;
        }
        let Some(timing) = sps.timing else {
            return;
        };
        if u64::from(timing.time_scale) > 1000 * u64::from(timing.num_units_in_tick) {
            return;
        }
        self.timing_hint = Some(TimingHint {
            timescale: timing.time_scale,
            dts_inc: timing.num_units_in_tick,
            fixed_frame_rate: true,
        });
        self.timing_hint_armed = false;
    }

    fn classify_slice(
        &mut self,
        header: h265::HevcNalHeader,
        rbsp: &[u8],
        warnings: &mut Vec<ImportWarning>,
    ) -> NalInfo {
        let sh = match h265::parse_hevc_slice_header(rbsp, header, &self.sps_map, &self.pps_map) {
            Ok(sh) => sh,
            Err(err) => {
                warn!("HEVC slice 解析失败: {}", err);
                warnings.push(ImportWarning::NalParseError {
                    detail: err.to_string(),
                });
                return NalInfo {
                    starts_new_au: false,
                    layer_id: header.layer_id,
                    temporal_id: header.temporal_id,
                    action: NalAction::Skip,
                };
            }
        };

        if sh.dependent {
            // 依赖 slice 段: 图像延续, 无独立类型与 POC
            return NalInfo {
                starts_new_au: false,
                layer_id: header.layer_id,
                temporal_id: header.temporal_id,
                action: NalAction::CopyVerbatim,
            };
        }

        let sps_id = self.pps_map[&sh.pps_id].sps_id;
        let sps = &self.sps_map[&sps_id];
        let poc = self
            .poc
            .compute(sps, header.nal_type, header.temporal_id, sh.poc_lsb);

        let rap = match header.nal_type {
            t if t.is_idr() => RapType::Sync,
            HevcNalUnitType::BlaNLp => RapType::Sync,
            HevcNalUnitType::BlaWLp | HevcNalUnitType::BlaWRadl | HevcNalUnitType::Cra => {
                RapType::OpenGop
            }
            _ => RapType::None,
        };

        NalInfo {
            starts_new_au: sh.first_slice_in_pic,
            layer_id: header.layer_id,
            temporal_id: header.temporal_id,
            action: NalAction::Slice(SliceInfo {
                slice_type: sh.slice_type.unwrap_or(SliceType::P),
                poc,
                is_idr: header.nal_type.is_idr() || header.nal_type == HevcNalUnitType::BlaNLp,
                rap,
                first_in_pic: sh.first_slice_in_pic,
                is_enhancement: header.layer_id != 0,
            }),
        }
    }
}

impl CodecAdapter for HevcAdapter {
    fn codec(&self) -> CodecKind {
        CodecKind::Hevc
    }

    fn classify(
        &mut self,
        payload: &[u8],
        warnings: &mut Vec<ImportWarning>,
    ) -> NaliuResult<NalInfo> {
        let header = match h265::nal::parse_header(payload) {
            Ok(h) => h,
            Err(err) => {
                warn!("HEVC NAL 头解析失败: {}", err);
                warnings.push(ImportWarning::NalParseError {
                    detail: err.to_string(),
                });
                return Ok(NalInfo::plain(NalAction::Skip));
            }
        };
        let layered = NalInfo {
            starts_new_au: false,
            layer_id: header.layer_id,
            temporal_id: header.temporal_id,
            action: NalAction::Discard,
        };

        let info = match header.nal_type {
            HevcNalUnitType::Vps => {
                let rbsp = to_rbsp(&payload[2..]);
                match h265::parse_hevc_vps(&rbsp) {
                    Ok(vps) => {
                        let id = vps.vps_id;
                        self.cur_vps_id = Some(id);
                        self.vps_map.insert(id, vps);
                        NalInfo {
                            starts_new_au: true,
                            action: NalAction::ParameterSet {
                                kind: ParamSetKind::HevcVps,
                                id,
                            },
                            ..layered
                        }
                    }
                    Err(err) => {
                        return Err(NaliuError::ParameterSet(format!(
                            "VPS 解析失败: {}",
                            err
                        )));
                    }
                }
            }
            HevcNalUnitType::Sps => {
                let rbsp = to_rbsp(&payload[2..]);
                match h265::parse_hevc_sps(&rbsp) {
                    Ok(sps) => {
                        let id = sps.sps_id;
                        if header.layer_id == 0 {
                            self.arm_timing_hint(&sps);
                        }
                        self.layer_dims[header.layer_id as usize] = LayerDimensions {
                            width: sps.width,
                            height: sps.height,
                            chroma_format: sps.chroma_format_idc,
                            bit_depth: sps.bit_depth_luma.max(sps.bit_depth_chroma),
                        };
                        self.sps_map.insert(id, sps);
                        NalInfo {
                            starts_new_au: true,
                            action: NalAction::ParameterSet {
                                kind: ParamSetKind::HevcSps,
                                id,
                            },
                            ..layered
                        }
                    }
                    Err(err) => {
                        if self.sps_map.is_empty() {
                            return Err(NaliuError::ParameterSet(format!(
                                "SPS 解析失败: {}",
                                err
                            )));
                        }
                        warn!("HEVC SPS 解析失败 (已有可用 SPS): {}", err);
                        warnings.push(ImportWarning::NalParseError {
                            detail: err.to_string(),
                        });
                        NalInfo {
                            action: NalAction::Skip,
                            ..layered
                        }
                    }
                }
            }
            HevcNalUnitType::Pps => {
                let rbsp = to_rbsp(&payload[2..]);
                match h265::parse_hevc_pps(&rbsp) {
                    Ok(pps) => {
                        let id = pps.pps_id;
                        self.pps_map.insert(id, pps);
                        NalInfo {
                            starts_new_au: true,
                            action: NalAction::ParameterSet {
                                kind: ParamSetKind::HevcPps,
                                id,
                            },
                            ..layered
                        }
                    }
                    Err(err) => {
                        return Err(NaliuError::ParameterSet(format!(
                            "PPS 解析失败: {}",
                            err
                        )));
                    }
                }
            }
            HevcNalUnitType::PrefixSei => {
                if self.sps_map.is_empty() {
                    layered
                } else {
                    let rbsp = to_rbsp(&payload[2..]);
                    if let Ok(messages) = h265::parse_hevc_sei(&rbsp) {
                        for message in messages {
                            if let h265::HevcSeiMessage::RecoveryPoint(rp) = message {
                                self.pending_recovery = Some(rp.recovery_poc_cnt);
                            }
                        }
                    }
                    NalInfo {
                        starts_new_au: header.layer_id == 0,
                        action: NalAction::Sei { suffix: false },
                        ..layered
                    }
                }
            }
            HevcNalUnitType::SuffixSei => {
                if self.sps_map.is_empty() {
                    layered
                } else {
                    NalInfo {
                        action: NalAction::Sei { suffix: true },
                        ..layered
                    }
                }
            }
            t if t.is_slice() => {
                let rbsp = to_rbsp(&payload[2..]);
                self.classify_slice(header, &rbsp, warnings)
            }
            HevcNalUnitType::Aud => NalInfo {
                starts_new_au: true,
                ..layered
            },
            HevcNalUnitType::Eos | HevcNalUnitType::Eob | HevcNalUnitType::FillerData => layered,
            other => NalInfo {
                action: NalAction::Unsupported(other.type_id()),
                ..layered
            },
        };
        Ok(info)
    }

    fn declare_parameter_set(
        &mut self,
        kind: ParamSetKind,
        id: u32,
        payload: &[u8],
        layer_id: u8,
        observation: Observation,
        inband: bool,
    ) -> DeclareOutcome {
        let nal_type_id = match kind {
            ParamSetKind::HevcVps => 32,
            ParamSetKind::HevcSps => 33,
            _ => 34,
        };

        let copy_inline = match observation {
            Observation::Added => {
                match kind {
                    ParamSetKind::HevcVps => {
                        let vps = self.vps_map.get(&id).cloned();
                        let cfg = self.cfg_for_layer(layer_id);
                        if let Some(vps) = vps.as_ref().filter(|_| cfg.num_temporal_layers == 0) {
                            cfg.apply_vps(vps);
                        }
                    }
                    ParamSetKind::HevcSps => {
                        if let Some(sps) = self.sps_map.get(&id).cloned() {
                            if self.max_w <= sps.width && self.max_h <= sps.height {
                                self.max_w = sps.width;
                                self.max_h = sps.height;
                            }
                            if layer_id == 0
                                && self.max_w_base <= sps.width
                                && self.max_h_base <= sps.height
                            {
                                self.max_w_base = sps.width;
                                self.max_h_base = sps.height;
                            }
                            let cfg = self.cfg_for_layer(layer_id);
                            if cfg.profile_idc == 0 {
                                cfg.apply_sps(&sps);
                            }
                        }
                    }
                    _ => {}
                }
                let cfg = self.cfg_for_layer(layer_id);
                let array = cfg.array_mut(nal_type_id);
                array.nalus.push(payload.to_vec());
                if inband {
                    array.complete = false;
                }
                inband
            }
            Observation::DuplicateIdentical => inband,
            Observation::DuplicateDivergent => {
                let cfg = self.cfg_for_layer(layer_id);
                cfg.array_mut(nal_type_id).complete = false;
                true
            }
        };
        DeclareOutcome {
            observation,
            copy_inline,
        }
    }

    fn take_timing_hint(&mut self) -> Option<TimingHint> {
        self.timing_hint.take()
    }

    fn take_recovery(&mut self) -> Option<i32> {
        self.pending_recovery.take()
    }

    fn has_parameter_sets(&self) -> bool {
        self.hevc_cfg.has_param_sets() || self.lhvc_cfg.has_param_sets()
    }

    fn dimensions(&self, min_layer_id: u8) -> (u32, u32) {
        if min_layer_id != 0 {
            (self.max_w, self.max_h)
        } else {
            (self.max_w_base, self.max_h_base)
        }
    }

    fn rap_inline_headers(&self, has_vps: bool, has_sps: bool) -> Vec<Vec<u8>> {
        let mut headers = Vec::new();
        if !has_vps {
            if let Some(ar) = self.hevc_cfg.array(32) {
                headers.extend(ar.nalus.iter().cloned());
            }
        }
        if !has_sps {
            if let Some(ar) = self.hevc_cfg.array(33) {
                headers.extend(ar.nalus.iter().cloned());
            }
        }
        headers
    }

    fn finish_config(
        &mut self,
        nal_unit_size: u8,
        inband: bool,
        min_layer_id: u8,
    ) -> NaliuResult<DecoderConfig> {
        self.hevc_cfg.nal_unit_size = nal_unit_size;
        self.lhvc_cfg.nal_unit_size = nal_unit_size;

        if min_layer_id != 0 {
            // 基础层在外部轨道: 只输出 L-HEVC 配置, 基础层 VPS 克隆过去
            if let Some(vps_array) = self.hevc_cfg.array(32).cloned() {
                let dst = self.lhvc_cfg.array_mut(32);
                for nalu in vps_array.nalus {
                    // 仅克隆 layer_id == 0 的 VPS
                    let layer = nalu
                        .first()
                        .zip(nalu.get(1))
                        .map(|(b0, b1)| ((b0 & 1) << 5) | (b1 >> 3))
                        .unwrap_or(0);
                    if layer == 0 {
                        dst.nalus.push(nalu);
                    }
                }
                dst.complete = vps_array.complete;
            }
            self.lhvc_cfg.derive_parallelism();
            return Ok(DecoderConfig {
                primary: None,
                enhancement: Some(self.lhvc_cfg.build()?),
                inband,
            });
        }

        self.hevc_cfg.derive_parallelism();
        let enhancement = if self.has_lhvc_layer {
            self.lhvc_cfg.derive_parallelism();
            // 时间分层字段沿基础层
            self.lhvc_cfg.num_temporal_layers = self.hevc_cfg.num_temporal_layers;
            self.lhvc_cfg.temporal_id_nested = self.hevc_cfg.temporal_id_nested;
            Some(self.lhvc_cfg.build()?)
        } else {
            None
        };
        Ok(DecoderConfig {
            primary: Some(self.hevc_cfg.build()?),
            enhancement,
            inband,
        })
    }

    fn operating_points(&self, max_temporal_id: &[u8; 64]) -> Option<Vec<u8>> {
        let vps = self.cur_vps_id.and_then(|id| self.vps_map.get(&id))?;
        crate::metadata::build_operating_points(vps, &self.layer_dims, max_temporal_id)
    }
}
