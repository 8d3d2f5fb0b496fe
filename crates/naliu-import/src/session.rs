//! 导入会话: 通用主循环.
//!
//! 单线程、单趟扫描加回看: 扫描器产出 NAL → 适配器分类 → 参数集
//! 进注册表/配置记录, slice 进样本组装器并驱动时间第一趟 → 流结束
//! 后执行时间第二趟、配置定稿与元数据导出.
//!
//! 时基重检测: 帧率策略为自动且首个 SPS 携带可信 VUI timing 时,
//! 整个运行以修正后的时基从字节 0 重来一次. 会话值整体重建,
//! 不在原地复用 — 避免遗留状态.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;
use log::{info, warn};
use naliu_core::timing::{DEFAULT_FPS, video_timing};
use naliu_core::{NaliuError, NaliuResult, Rational};
use naliu_codec::AnnexBScanner;
use naliu_codec::h264::SliceType;

use crate::adapter::{AvcAdapter, CodecAdapter, HevcAdapter, NalAction, NalInfo, SliceInfo};
use crate::metadata::{
    FlushedSampleMeta, LayerInfo, OpenGopState, build_layer_information, mark_sample_groups,
    note_layer_nal,
};
use crate::registry::{Observation, ParamSetKind, ParamSetRegistry};
use crate::sample::{LengthPrefix, RapType, SampleBuilder, rewrite_track_prefixes};
use crate::sink::{SinkSample, TrackId, TrackSink};
use crate::timing::{SliceTiming, TimingState};

bitflags! {
    /// 导入策略开关
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ImportFlags: u32 {
        /// 从 8 位长度前缀起步并按需加宽 (默认直接 32 位)
        const FORCE_PACKED = 1 << 0;
        /// 参数集以带内方式随样本携带
        const FORCE_XPS_INBAND = 1 << 1;
        /// open-GOP 的 I 帧强制标记为同步样本 (产物不再保证 ISO 一致)
        const FORCE_SYNC = 1 << 2;
        /// 保留 NAL 尾部零填充字节 (bit-exact passthrough)
        const KEEP_TRAILING = 1 << 3;
        /// 丢弃全部 SEI
        const NO_SEI = 1 << 4;
        /// 不产出 edit list
        const NO_EDIT_LIST = 1 << 5;
        /// 丢弃增强层 (SVC / L-HEVC)
        const LAYERED_NONE = 1 << 6;
    }
}

/// 帧率策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FpsPolicy {
    /// 码流 VUI timing 可信时自动采用, 否则用默认帧率
    #[default]
    Auto,
    /// 调用方强制指定
    Forced(Rational),
}

/// 进度回调: (已消费字节, 总字节), 不提供背压
pub type ProgressFn = Box<dyn FnMut(u64, u64)>;

/// 导入选项
#[derive(Default)]
pub struct ImportOptions {
    /// 帧率策略
    pub fps: FpsPolicy,
    /// 策略开关
    pub flags: ImportFlags,
    /// 导入时长上限 (毫秒, 0 为不限)
    pub duration_ms: u64,
    /// 外部中止请求 (在 NAL 边界生效)
    pub abort: Option<Arc<AtomicBool>>,
    /// 进度回调
    pub progress: Option<ProgressFn>,
}

/// 结构化警告 (非致命解析异常与策略性降级)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportWarning {
    /// 单个 NAL 解析失败, 已跳过
    NalParseError {
        /// 失败原因
        detail: String,
    },
    /// open-GOP 的 I 帧被强制标记为同步样本
    ForcedSync,
    /// 同 id 参数集内容分歧, 已转带内
    DivergentParameterSet {
        /// 参数集类别
        kind: ParamSetKind,
        /// id
        id: u32,
    },
    /// 长度前缀已加宽
    PrefixGrown {
        /// 新宽度 (位)
        bits: u32,
    },
    /// VUI 声明帧率非固定
    VariableFrameRate,
    /// 依码流 timing 重检测了时基 (运行已重启)
    TimingRedetected {
        /// 修正后的时钟频率
        timescale: u32,
        /// 修正后的 DTS 步进
        dts_inc: u32,
    },
    /// 未支持的 NAL 类型, 已原样复制
    UnsupportedNalCopied {
        /// NAL 类型编号
        type_id: u8,
    },
}

impl std::fmt::Display for ImportWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NalParseError { detail } => write!(f, "NAL 解析失败: {}", detail),
            Self::ForcedSync => write!(f, "open-GOP I 帧被强制标记为同步样本, 产物不保证 ISO 一致"),
            Self::DivergentParameterSet { kind, id } => {
                write!(f, "参数集 {:?} id={} 内容分歧, 已转带内", kind, id)
            }
            Self::PrefixGrown { bits } => write!(f, "长度前缀已加宽到 {} 位", bits),
            Self::VariableFrameRate => write!(f, "VUI fixed_frame_rate_flag 缺席, 可能为可变帧率"),
            Self::TimingRedetected { timescale, dts_inc } => {
                write!(f, "时基已按码流重检测: {}/{}", timescale, dts_inc)
            }
            Self::UnsupportedNalCopied { type_id } => {
                write!(f, "未处理的 NAL 类型 {}, 已原样复制", type_id)
            }
        }
    }
}

/// slice 类型直方图
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceHistogram {
    /// I slice 数
    pub i: u32,
    /// P slice 数
    pub p: u32,
    /// B slice 数
    pub b: u32,
    /// SP slice 数
    pub sp: u32,
    /// SI slice 数
    pub si: u32,
}

impl SliceHistogram {
    fn count(&mut self, slice_type: SliceType) {
        match slice_type {
            SliceType::I => self.i += 1,
            SliceType::P => self.p += 1,
            SliceType::B => self.b += 1,
            SliceType::Sp => self.sp += 1,
            SliceType::Si => self.si += 1,
        }
    }
}

/// 导入结果
#[derive(Debug)]
pub struct ImportReport {
    /// 目标轨道
    pub track: TrackId,
    /// 样本数
    pub samples: u32,
    /// NAL 单元数
    pub nal_units: u32,
    /// 基础层 slice 直方图
    pub slices: SliceHistogram,
    /// 增强层 slice 直方图
    pub enhancement_slices: SliceHistogram,
    /// SEI 数
    pub nb_sei: u32,
    /// IDR slice 数
    pub nb_idr: u32,
    /// 检测到的重排深度 (帧)
    pub reorder_depth: u32,
    /// 图像宽
    pub width: u32,
    /// 图像高
    pub height: u32,
    /// 最终时钟频率
    pub timescale: u32,
    /// 最终 DTS 步进
    pub dts_inc: u32,
    /// 警告集合
    pub warnings: Vec<ImportWarning>,
}

/// 导入一条 H.264/AVC Annex B 裸流
pub fn import_avc<S: TrackSink>(
    data: &[u8],
    sink: &mut S,
    options: ImportOptions,
) -> NaliuResult<ImportReport> {
    run_import(data, sink, options, |detect| AvcAdapter::new(detect))
}

/// 导入一条 H.265/HEVC Annex B 裸流
pub fn import_hevc<S: TrackSink>(
    data: &[u8],
    sink: &mut S,
    options: ImportOptions,
) -> NaliuResult<ImportReport> {
    run_import(data, sink, options, |detect| HevcAdapter::new(detect))
}

/// 外层驱动: 处理时基重检测重启 (至多一次)
fn run_import<S, A, F>(
    data: &[u8],
    sink: &mut S,
    mut options: ImportOptions,
    make_adapter: F,
) -> NaliuResult<ImportReport>
where
    S: TrackSink,
    A: CodecAdapter,
    F: Fn(bool) -> A,
{
    let (mut timescale, mut dts_inc) = match options.fps {
        FpsPolicy::Auto => video_timing(DEFAULT_FPS),
        FpsPolicy::Forced(fps) => video_timing(fps),
    };
    let mut detect_fps = matches!(options.fps, FpsPolicy::Auto);
    let mut carried_warnings = Vec::new();

    loop {
        let session = ImportSession::new(
            make_adapter(detect_fps),
            options.flags,
            detect_fps,
            timescale,
            dts_inc,
            std::mem::take(&mut carried_warnings),
        );
        match session.run(data, sink, &mut options)? {
            RunOutcome::Done(report) => return Ok(report),
            RunOutcome::Restart {
                timescale: t,
                dts_inc: d,
                warnings,
            } => {
                info!("按码流 timing 重检测时基: {}/{}, 从头重新导入", t, d);
                timescale = t;
                dts_inc = d;
                detect_fps = false;
                carried_warnings = warnings;
            }
        }
    }
}

/// 一次扫描运行的出口
enum RunOutcome {
    /// 导入完成
    Done(ImportReport),
    /// 需以修正时基重启 (轨道已从容器移除)
    Restart {
        timescale: u32,
        dts_inc: u32,
        warnings: Vec<ImportWarning>,
    },
}

/// 一次扫描运行的全部状态
///
/// 重启路径上整值丢弃重建, 不在原地复位.
struct ImportSession<A> {
    adapter: A,
    flags: ImportFlags,
    timescale: u32,
    dts_inc: u32,
    prefix: LengthPrefix,
    detect_fps_active: bool,

    builder: SampleBuilder,
    timing: TimingState,
    registry: ParamSetRegistry,
    warnings: Vec<ImportWarning>,
    open_gop: OpenGopState,
    forced_sync_warned: bool,

    cur_samp: u32,
    nb_nalus: u32,
    nb_sei: u32,
    nb_idr: u32,
    slices: SliceHistogram,
    enhancement_slices: SliceHistogram,

    /// 当前样本尚未出现首个 slice
    first_nal_of_sample: bool,
    /// 下一个非后缀 NAL 前先封存 (后缀 SEI 语义)
    flush_next_sample: bool,
    /// 当前样本是否已带内携带 VPS / SPS (HEVC 带内模式)
    sample_has_vps: bool,
    sample_has_sps: bool,

    /// 观测到的最小 slice 层 id (u8::MAX 表示尚无 slice)
    min_layer_id: u8,
    /// 各层 temporal id 观测 (进入样本的 NAL)
    layers: [LayerInfo; 64],
    /// 各层最大 temporal id (全部 NAL)
    max_temporal_id: [u8; 64],
}

impl<A: CodecAdapter> ImportSession<A> {
    fn new(
        adapter: A,
        flags: ImportFlags,
        detect_fps: bool,
        timescale: u32,
        dts_inc: u32,
        carried_warnings: Vec<ImportWarning>,
    ) -> Self {
        let prefix = if flags.contains(ImportFlags::FORCE_PACKED) {
            LengthPrefix::U8
        } else {
            LengthPrefix::U32
        };
        Self {
            adapter,
            flags,
            timescale,
            dts_inc,
            prefix,
            detect_fps_active: detect_fps,
            builder: SampleBuilder::new(),
            timing: TimingState::new(),
            registry: ParamSetRegistry::new(),
            warnings: carried_warnings,
            open_gop: OpenGopState::default(),
            forced_sync_warned: false,
            cur_samp: 0,
            nb_nalus: 0,
            nb_sei: 0,
            nb_idr: 0,
            slices: SliceHistogram::default(),
            enhancement_slices: SliceHistogram::default(),
            first_nal_of_sample: true,
            flush_next_sample: false,
            sample_has_vps: false,
            sample_has_sps: false,
            min_layer_id: u8::MAX,
            layers: [LayerInfo::default(); 64],
            max_temporal_id: [0; 64],
        }
    }

    fn run<S: TrackSink>(
        mut self,
        data: &[u8],
        sink: &mut S,
        options: &mut ImportOptions,
    ) -> NaliuResult<RunOutcome> {
        let scanner = AnnexBScanner::new(data, !self.flags.contains(ImportFlags::KEEP_TRAILING))?;
        let total_size = scanner.total_size() as u64;
        let inband = self.flags.contains(ImportFlags::FORCE_XPS_INBAND);
        let duration_cap = options.duration_ms * u64::from(self.timescale) / 1000;

        let track = sink.new_track(self.adapter.codec(), self.timescale)?;
        let mut aborted = false;

        for range in scanner {
            let payload = &data[range.payload.clone()];
            let info = self.adapter.classify(payload, &mut self.warnings)?;

            self.note_temporal_id(info.layer_id, info.temporal_id);
            if self.flags.contains(ImportFlags::LAYERED_NONE) && self.is_enhancement_nal(&info) {
                continue;
            }
            self.nb_nalus += 1;

            // 样本边界: 新访问单元开始, 或后缀 SEI 语义要求的延迟封存.
            // 增强层 slice 的 first_slice 标志不构成边界 (与基础层同 AU).
            let boundary = info.starts_new_au
                && match info.action {
                    NalAction::Slice(_) => info.layer_id <= self.min_layer_id,
                    _ => true,
                };
            let deferred_flush = self.flush_next_sample
                && info.layer_id == self.min_layer_id
                && !matches!(info.action, NalAction::Sei { suffix: true });
            if (boundary || deferred_flush) && self.builder.has_slice {
                self.flush_next_sample = false;
                self.flush_sample(sink, track)?;
            }

            match info.action {
                NalAction::ParameterSet { kind, id } => {
                    let observation = self.registry.observe(kind, id, payload);
                    if observation == Observation::DuplicateDivergent {
                        warn!("参数集 {:?} id={} 内容分歧, 转入带内样本", kind, id);
                        self.warnings
                            .push(ImportWarning::DivergentParameterSet { kind, id });
                    }
                    let outcome = self.adapter.declare_parameter_set(
                        kind,
                        id,
                        payload,
                        info.layer_id,
                        observation,
                        inband,
                    );

                    // 时基重检测: 首个可信 VUI timing 触发整体重启
                    if self.detect_fps_active {
                        if let Some(hint) = self.adapter.take_timing_hint() {
                            sink.remove_track(track)?;
                            let mut warnings = std::mem::take(&mut self.warnings);
                            warnings.push(ImportWarning::TimingRedetected {
                                timescale: hint.timescale,
                                dts_inc: hint.dts_inc,
                            });
                            if !hint.fixed_frame_rate {
                                warnings.push(ImportWarning::VariableFrameRate);
                            }
                            return Ok(RunOutcome::Restart {
                                timescale: hint.timescale,
                                dts_inc: hint.dts_inc,
                                warnings,
                            });
                        }
                    }

                    if outcome.copy_inline {
                        if matches!(kind, ParamSetKind::HevcVps) {
                            self.sample_has_vps = true;
                        }
                        if matches!(kind, ParamSetKind::HevcSps) {
                            self.sample_has_sps = true;
                        }
                        self.copy_nal(sink, track, info.layer_id, info.temporal_id, payload)?;
                    }
                }

                NalAction::Slice(slice) => {
                    self.copy_nal(sink, track, info.layer_id, info.temporal_id, payload)?;
                    self.builder.has_slice = true;
                    self.process_slice(sink, track, &info, &slice)?;
                }

                NalAction::SvcPrefix => {
                    self.copy_prefix_nal(sink, track, info.layer_id, info.temporal_id, payload)?;
                }

                NalAction::Sei { suffix } => {
                    if !self.flags.contains(ImportFlags::NO_SEI) {
                        self.copy_nal(sink, track, info.layer_id, info.temporal_id, payload)?;
                        self.nb_sei += 1;
                        if suffix && info.layer_id == 0 && self.builder.has_slice {
                            self.flush_next_sample = true;
                        }
                    }
                }

                NalAction::CopyVerbatim => {
                    self.copy_nal(sink, track, info.layer_id, info.temporal_id, payload)?;
                }

                NalAction::Unsupported(type_id) => {
                    warn!("未处理的 NAL 类型 {}, 原样复制", type_id);
                    self.warnings
                        .push(ImportWarning::UnsupportedNalCopied { type_id });
                    self.copy_nal(sink, track, info.layer_id, info.temporal_id, payload)?;
                }

                NalAction::Discard | NalAction::Skip => {}
            }

            if let Some(progress) = options.progress.as_mut() {
                progress(range.full_end as u64, total_size);
            }
            if duration_cap > 0 && u64::from(self.dts_inc) * u64::from(self.cur_samp) > duration_cap
            {
                break;
            }
            if let Some(abort) = options.abort.as_ref() {
                if abort.load(Ordering::Relaxed) {
                    // 中止只在 NAL 边界生效: 进行中的样本丢弃, 不部分落地
                    aborted = true;
                    let _ = self.builder.take();
                    break;
                }
            }
        }

        // 真流尾: 缓冲中的样本照常落地
        if !aborted && !self.builder.is_empty() {
            self.flush_sample(sink, track)?;
        }

        if !self.adapter.has_parameter_sets() {
            return Err(NaliuError::ParameterSet(
                "码流中未找到任何 SPS/PPS, 未导入任何内容".into(),
            ));
        }

        self.finalize(sink, track).map(RunOutcome::Done)
    }

    /// 该 NAL 是否属于被丢弃的增强层
    fn is_enhancement_nal(&self, info: &NalInfo) -> bool {
        if info.layer_id > 0 {
            return true;
        }
        matches!(
            info.action,
            NalAction::SvcPrefix
                | NalAction::Slice(SliceInfo { is_enhancement: true, .. })
                | NalAction::ParameterSet {
                    kind: ParamSetKind::AvcSubsetSps,
                    ..
                },
        )
    }

    fn note_temporal_id(&mut self, layer_id: u8, temporal_id: u8) {
        let entry = &mut self.max_temporal_id[layer_id as usize];
        if *entry < temporal_id {
            *entry = temporal_id;
        }
    }

    /// slice 级处理: 样本标志、直方图与时间第一趟
    fn process_slice<S: TrackSink>(
        &mut self,
        sink: &mut S,
        track: TrackId,
        info: &NalInfo,
        slice: &SliceInfo,
    ) -> NaliuResult<()> {
        if slice.is_enhancement {
            self.enhancement_slices.count(slice.slice_type);
        } else {
            self.slices.count(slice.slice_type);
        }
        if self.min_layer_id > info.layer_id {
            self.min_layer_id = info.layer_id;
        }
        // 时间重建只由最低层驱动 (分层流增强层与基础层同 AU 同 POC)
        if info.layer_id != self.min_layer_id {
            return Ok(());
        }
        if slice.slice_type.is_intra() {
            self.builder.has_i_slice = true;
        }

        // 真 IDR 等价点才作为同步样本; SEI recovery 走 roll/RAP 分组
        let mut slice_force_ref = false;
        if self.first_nal_of_sample {
            self.first_nal_of_sample = false;
            let recovery = self.adapter.take_recovery();
            if recovery.is_some() || self.flags.contains(ImportFlags::FORCE_SYNC) {
                let intra = slice.slice_type.is_intra();
                let effective = match recovery {
                    Some(count) => Some(count),
                    // 需要时缺少有效 recovery point: 以 0 强制
                    None if intra => Some(0),
                    None => None,
                };
                self.builder.recovery_frame_count = effective;
                if intra
                    && self.flags.contains(ImportFlags::FORCE_SYNC)
                    && effective == Some(0)
                {
                    slice_force_ref = true;
                }
            }
            self.builder.rap = slice.rap;
        }

        if slice.is_idr {
            self.nb_idr += 1;
        }
        let timing = SliceTiming {
            poc: slice.poc,
            is_ref: slice.is_idr,
            force_ref: slice_force_ref,
            is_b: slice.slice_type == SliceType::B,
        };
        self.timing.observe_slice(sink, track, self.cur_samp, &timing)
    }

    /// 长度前缀加宽检查后把 NAL 追加进当前样本
    fn copy_nal<S: TrackSink>(
        &mut self,
        sink: &mut S,
        track: TrackId,
        layer_id: u8,
        temporal_id: u8,
        payload: &[u8],
    ) -> NaliuResult<()> {
        self.grow_prefix_if_needed(sink, track, payload.len())?;
        self.builder.push_nal(self.prefix, payload);
        note_layer_nal(&mut self.layers, layer_id, temporal_id);
        Ok(())
    }

    fn copy_prefix_nal<S: TrackSink>(
        &mut self,
        sink: &mut S,
        track: TrackId,
        layer_id: u8,
        temporal_id: u8,
        payload: &[u8],
    ) -> NaliuResult<()> {
        self.grow_prefix_if_needed(sink, track, payload.len())?;
        self.builder.push_prefix_nal(self.prefix, payload);
        note_layer_nal(&mut self.layers, layer_id, temporal_id);
        Ok(())
    }

    fn grow_prefix_if_needed<S: TrackSink>(
        &mut self,
        sink: &mut S,
        track: TrackId,
        len: usize,
    ) -> NaliuResult<()> {
        if self.prefix.fits(len) {
            return Ok(());
        }
        let grown = self.prefix.grown_to(len)?;
        self.warnings.push(ImportWarning::PrefixGrown {
            bits: grown.bits(),
        });
        rewrite_track_prefixes(sink, track, self.prefix, grown)?;
        self.builder.reencode(self.prefix, grown)?;
        self.prefix = grown;
        Ok(())
    }

    /// 封存当前样本并落地
    fn flush_sample<S: TrackSink>(&mut self, sink: &mut S, track: TrackId) -> NaliuResult<()> {
        let rap = self.builder.rap;
        let has_i_slice = self.builder.has_i_slice;
        let recovery = self.builder.recovery_frame_count;

        let mut is_sync = rap == RapType::Sync;
        if !is_sync
            && self.flags.contains(ImportFlags::FORCE_SYNC)
            && has_i_slice
            && recovery == Some(0)
        {
            is_sync = true;
            if !self.forced_sync_warned {
                self.forced_sync_warned = true;
                warn!("非 IDR 的 I 帧被强制标记为同步样本, 产物不保证 ISO 一致");
                self.warnings.push(ImportWarning::ForcedSync);
            }
        }

        // 带内模式下 RAP 样本缺参数集时从配置记录补全
        if self.flags.contains(ImportFlags::FORCE_XPS_INBAND) && rap != RapType::None {
            let headers = self
                .adapter
                .rap_inline_headers(self.sample_has_vps, self.sample_has_sps);
            self.builder.prepend_nals(self.prefix, &headers);
        }

        let data = self.builder.take();
        let index = sink.add_sample(
            track,
            SinkSample {
                dts: u64::from(self.dts_inc) * u64::from(self.cur_samp),
                cts_offset: self.timing.cts_placeholder(),
                is_sync,
                data,
            },
        )?;
        self.cur_samp += 1;

        mark_sample_groups(
            sink,
            track,
            index,
            &FlushedSampleMeta {
                rap,
                is_sync,
                has_i_slice,
                recovery_frame_count: recovery,
            },
            &mut self.open_gop,
        )?;

        self.timing.note_flushed();
        self.first_nal_of_sample = true;
        self.sample_has_vps = false;
        self.sample_has_sps = false;
        Ok(())
    }

    /// 流结束: 时间第二趟、配置定稿、元数据与报告
    fn finalize<S: TrackSink>(
        mut self,
        sink: &mut S,
        track: TrackId,
    ) -> NaliuResult<ImportReport> {
        let min_layer = if self.min_layer_id == u8::MAX {
            0
        } else {
            self.min_layer_id
        };

        if self.timing.has_cts_offset() {
            let is_paff = self.adapter.is_paff();
            self.timing.finalize(
                sink,
                track,
                self.dts_inc,
                is_paff,
                self.flags.contains(ImportFlags::NO_EDIT_LIST),
            )?;
        } else {
            // 解码顺序即显示顺序
            sink.clear_cts_offsets(track)?;
        }

        let (width, height) = self.adapter.dimensions(min_layer);
        if width > 0 && height > 0 {
            sink.set_visual_dimensions(track, width, height)?;
        }

        let inband = self.flags.contains(ImportFlags::FORCE_XPS_INBAND);
        let config = self
            .adapter
            .finish_config(self.prefix.bytes() as u8, inband, min_layer)?;
        sink.set_decoder_config(track, config)?;

        // 分层流元数据
        let layer_count = self
            .layers
            .iter()
            .filter(|l| l.layer_id_plus_one != 0)
            .count();
        if layer_count > 1 {
            sink.set_layer_information(track, build_layer_information(&self.layers))?;
            if let Some(oinf) = self.adapter.operating_points(&self.max_temporal_id) {
                sink.set_operating_points(track, oinf)?;
            }
        }

        info!(
            "{} 导入完成: {} 个样本 ({} 个 NAL) - slice: {} I {} P {} B - {} SEI - {} IDR",
            self.adapter.codec(),
            self.cur_samp,
            self.nb_nalus,
            self.slices.i,
            self.slices.p,
            self.slices.b,
            self.nb_sei,
            self.nb_idr,
        );
        if self.timing.reorder_depth() > 1 {
            info!(
                "码流使用前向预测 - CTS 重排深度: {} 帧",
                self.timing.reorder_depth(),
            );
        }

        Ok(ImportReport {
            track,
            samples: self.cur_samp,
            nal_units: self.nb_nalus,
            slices: self.slices,
            enhancement_slices: self.enhancement_slices,
            nb_sei: self.nb_sei,
            nb_idr: self.nb_idr,
            reorder_depth: self.timing.reorder_depth(),
            width,
            height,
            timescale: self.timescale,
            dts_inc: self.dts_inc,
            warnings: self.warnings,
        })
    }
}
