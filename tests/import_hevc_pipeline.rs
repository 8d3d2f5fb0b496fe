//! HEVC 导入集成测试.
//!
//! 覆盖 HEVC 特有路径: VPS/SPS/PPS 三级参数集、IRAP 分类
//! (IDR / CRA open-GOP)、后缀 SEI 归属、并行类型推导与分层元数据.

use naliu::core::{BitWriter, Rational};
use naliu::codec::h265::ptl::write_minimal_ptl;
use naliu::import::sample::LengthPrefix;
use naliu::import::session::{
    FpsPolicy, ImportFlags, ImportOptions, ImportWarning, import_hevc,
};
use naliu::import::sink::MemoryTrackSink;

// ========================
// 码流构造辅助
// ========================

/// RBSP → EBSP: 插入防竞争字节
fn to_ebsp(rbsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rbsp.len());
    let mut zeros = 0;
    for &byte in rbsp {
        if zeros >= 2 && byte <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        out.push(byte);
        zeros = if byte == 0 { zeros + 1 } else { 0 };
    }
    out
}

fn annexb(units: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in units {
        out.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        out.extend_from_slice(unit);
    }
    out
}

/// 2 字节 HEVC NAL 头
fn nal_header(nal_type: u8, layer_id: u8, temporal_id: u8) -> [u8; 2] {
    [
        (nal_type << 1) | (layer_id >> 5),
        (layer_id << 3) | (temporal_id + 1),
    ]
}

/// 最小单层 VPS (vps_id=0)
fn vps_nal() -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(0, 4); // vps_video_parameter_set_id
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
    let mut nal = nal_header(32, 0, 0).to_vec();
    nal.extend(to_ebsp(&bw.finish()));
    nal
}

/// 最小 SPS (sps_id=0, 1280x720), 可选 VUI timing
fn sps_nal(timing: Option<(u32, u32)>) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(0, 4); // sps_video_parameter_set_id
    bw.write_bits(0, 3); // sps_max_sub_layers_minus1
    bw.write_bit(1); // sps_temporal_id_nesting_flag
    write_minimal_ptl(&mut bw, 1, 93);
    bw.write_ue(0); // sps_seq_parameter_set_id
    bw.write_ue(1); // chroma_format_idc
    bw.write_ue(1280);
    bw.write_ue(720);
    bw.write_bit(0); // conformance_window_flag
    bw.write_ue(0); // bit_depth_luma_minus8
    bw.write_ue(0); // bit_depth_chroma_minus8
    bw.write_ue(4); // log2_max_pic_order_cnt_lsb_minus4 → 8
    bw.write_bit(0); // sps_sub_layer_ordering_info_present_flag
    bw.write_ue(3);
    bw.write_ue(2);
    bw.write_ue(0);
    bw.write_ue(3); // log2_min_luma_coding_block_size_minus3 → 64 CTB
    bw.write_ue(0); // log2_diff_max_min_luma_coding_block_size
    bw.write_ue(0); // log2_min_luma_transform_block_size_minus2
    bw.write_ue(3); // log2_diff_max_min_luma_transform_block_size
    bw.write_ue(0); // max_transform_hierarchy_depth_inter
    bw.write_ue(0); // max_transform_hierarchy_depth_intra
    bw.write_bit(0); // scaling_list_enabled_flag
    bw.write_bit(0); // amp_enabled_flag
    bw.write_bit(0); // sample_adaptive_offset_enabled_flag
    bw.write_bit(0); // pcm_enabled_flag
    bw.write_ue(0); // num_short_term_ref_pic_sets
    bw.write_bit(0); // long_term_ref_pics_present_flag
    bw.write_bit(0); // sps_temporal_mvp_enabled_flag
    bw.write_bit(0); // strong_intra_smoothing_enabled_flag
    match timing {
        None => bw.write_bit(0),
        Some((num_units, time_scale)) => {
            bw.write_bit(1); // vui_parameters_present_flag
            bw.write_bit(0); // aspect_ratio_info_present_flag
            bw.write_bit(0); // overscan_info_present_flag
            bw.write_bit(0); // video_signal_type_present_flag
            bw.write_bit(0); // chroma_loc_info_present_flag
            bw.write_bits(0, 3); // neutral_chroma/field_seq/frame_field
            bw.write_bit(0); // default_display_window_flag
            bw.write_bit(1); // vui_timing_info_present_flag
            bw.write_bits(num_units, 32);
            bw.write_bits(time_scale, 32);
            bw.write_bit(0); // vui_poc_proportional_to_timing_flag
            bw.write_bit(0); // vui_hrd_parameters_present_flag
        }
    }
    bw.write_bit(1); // rbsp_stop_bit
    let mut nal = nal_header(33, 0, 0).to_vec();
    nal.extend(to_ebsp(&bw.finish()));
    nal
}

/// 最小 PPS (pps_id=0 → sps_id=0), tiles/WPP 可配
fn pps_nal(tiles: bool, wpp: bool) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_ue(0); // pps_pic_parameter_set_id
    bw.write_ue(0); // pps_seq_parameter_set_id
    bw.write_bit(0); // dependent_slice_segments_enabled_flag
    bw.write_bit(0); // output_flag_present_flag
    bw.write_bits(0, 3); // num_extra_slice_header_bits
    bw.write_bit(0); // sign_data_hiding_enabled_flag
    bw.write_bit(0); // cabac_init_present_flag
    bw.write_ue(0); // num_ref_idx_l0_default_active_minus1
    bw.write_ue(0); // num_ref_idx_l1_default_active_minus1
    bw.write_se(0); // init_qp_minus26
    bw.write_bit(0); // constrained_intra_pred_flag
    bw.write_bit(0); // transform_skip_enabled_flag
    bw.write_bit(0); // cu_qp_delta_enabled_flag
    bw.write_se(0); // pps_cb_qp_offset
    bw.write_se(0); // pps_cr_qp_offset
    bw.write_bit(0); // pps_slice_chroma_qp_offsets_present_flag
    bw.write_bit(0); // weighted_pred_flag
    bw.write_bit(0); // weighted_bipred_flag
    bw.write_bit(0); // transquant_bypass_enabled_flag
    bw.write_bit(u32::from(tiles)); // tiles_enabled_flag
    bw.write_bit(u32::from(wpp)); // entropy_coding_sync_enabled_flag
    bw.write_bit(1); // rbsp_stop_bit
    let mut nal = nal_header(34, 0, 0).to_vec();
    nal.extend(to_ebsp(&bw.finish()));
    nal
}

/// slice segment NAL (独立段, first_slice=1)
///
/// slice_type: 0=B, 1=P, 2=I
fn slice_nal(nal_type: u8, layer_id: u8, slice_type: u32, poc_lsb: u32, padding: usize) -> Vec<u8> {
    let idr = matches!(nal_type, 19 | 20);
    let irap = (16..=21).contains(&nal_type);
    let mut bw = BitWriter::new();
    bw.write_bit(1); // first_slice_segment_in_pic_flag
    if irap {
        bw.write_bit(0); // no_output_of_prior_pics_flag
    }
    bw.write_ue(0); // slice_pic_parameter_set_id
    bw.write_ue(slice_type);
    if !idr {
        bw.write_bits(poc_lsb, 8);
    }
    bw.write_bit(1); // 近似的 slice 数据起点
    let mut nal = nal_header(nal_type, layer_id, 0).to_vec();
    nal.extend(to_ebsp(&bw.finish()));
    nal.extend(std::iter::repeat_n(0xA5, padding));
    nal
}

/// 后缀 SEI (未知类型 200, 载荷可辨识)
fn suffix_sei_nal() -> Vec<u8> {
    let mut nal = nal_header(40, 0, 0).to_vec();
    nal.extend_from_slice(&[200, 4, 0xDE, 0xAD, 0xBE, 0xEF, 0x80]);
    nal
}

fn forced_25fps() -> ImportOptions {
    ImportOptions {
        fps: FpsPolicy::Forced(Rational::new(25, 1)),
        ..ImportOptions::default()
    }
}

fn split_sample(data: &[u8], prefix: LengthPrefix) -> Vec<Vec<u8>> {
    let mut nals = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let mut len = 0usize;
        for _ in 0..prefix.bytes() {
            len = (len << 8) | usize::from(data[pos]);
            pos += 1;
        }
        nals.push(data[pos..pos + len].to_vec());
        pos += len;
    }
    nals
}

// ========================
// 测试
// ========================

#[test]
fn test_basic_hevc_import() {
    let _ = env_logger::builder().is_test(true).try_init();

    // VPS, SPS, PPS, IDR, TRAIL_R(POC 2), TRAIL_R(POC 4)
    let stream = annexb(&[
        vps_nal(),
        sps_nal(None),
        pps_nal(false, false),
        slice_nal(19, 0, 2, 0, 8),
        slice_nal(1, 0, 1, 2, 8),
        slice_nal(1, 0, 1, 4, 8),
    ]);

    let mut sink = MemoryTrackSink::new();
    let report = import_hevc(&stream, &mut sink, forced_25fps()).expect("导入失败");

    assert_eq!(report.samples, 3);
    assert_eq!(report.nal_units, 6);
    assert_eq!(report.slices.i, 1);
    assert_eq!(report.slices.p, 2);
    assert_eq!(report.nb_idr, 1);
    assert_eq!((report.width, report.height), (1280, 720));

    let track = sink.track(report.track).unwrap();
    assert!(track.samples[0].is_sync);
    for (i, sample) in track.samples.iter().enumerate() {
        assert_eq!(sample.dts, i as u64 * 1000);
    }
    assert!(!track.cts_enabled, "单调 POC 不应保留 CTS 信息");
    assert!(track.edit_list.is_none());

    // hvcC: 版本、profile、VPS/SPS/PPS 三个数组、并行类型 1
    let config = track.config.as_ref().unwrap();
    let hvcc = config.primary.as_ref().expect("应有 hvcC");
    assert_eq!(hvcc[0], 1);
    assert_eq!(hvcc[1] & 0x1F, 1, "Main profile");
    assert_eq!(hvcc[12], 93, "level 3.1");
    assert_eq!(hvcc[15] & 0x03, 1, "无 tiles/WPP 时并行类型为 1");
    assert_eq!(hvcc[22], 3, "VPS/SPS/PPS 三个参数集数组");
    assert!(config.enhancement.is_none());
}

#[test]
fn test_hevc_b_frame_reordering() {
    // 解码顺序 IDR(0), TRAIL_R(4), TRAIL_N-B(2)
    let stream = annexb(&[
        vps_nal(),
        sps_nal(None),
        pps_nal(false, false),
        slice_nal(19, 0, 2, 0, 8),
        slice_nal(1, 0, 1, 4, 8),
        slice_nal(0, 0, 0, 2, 8), // TRAIL_N, B slice
    ]);

    let mut sink = MemoryTrackSink::new();
    let report = import_hevc(&stream, &mut sink, forced_25fps()).unwrap();
    assert_eq!(report.slices.b, 1);
    assert!(report.reorder_depth >= 1);

    let track = sink.track(report.track).unwrap();
    assert!(track.cts_enabled);
    let cts: Vec<i64> = track
        .samples
        .iter()
        .map(|s| s.dts as i64 + s.cts_offset)
        .collect();
    assert!(
        cts[0] < cts[2] && cts[2] < cts[1],
        "B 帧应显示在 P 帧之前, cts={:?}",
        cts,
    );
    assert!(track.edit_list.is_some());
}

#[test]
fn test_cra_is_open_gop_not_sync() {
    // CRA 开头的 open-GOP 流
    let stream = annexb(&[
        vps_nal(),
        sps_nal(None),
        pps_nal(false, false),
        slice_nal(21, 0, 2, 0, 8), // CRA
        slice_nal(1, 0, 1, 2, 8),
    ]);

    let mut sink = MemoryTrackSink::new();
    let report = import_hevc(&stream, &mut sink, forced_25fps()).unwrap();
    assert_eq!(report.nb_idr, 0, "CRA 不计入 IDR");

    let track = sink.track(report.track).unwrap();
    assert!(
        !track.samples[0].is_sync,
        "未强制同步时 CRA 不标记为同步样本",
    );
    assert!(
        track.samples[0].rap_group,
        "CRA 样本应进 open-GOP RAP 分组",
    );
}

#[test]
fn test_force_sync_on_cra() {
    let stream = annexb(&[
        vps_nal(),
        sps_nal(None),
        pps_nal(false, false),
        slice_nal(21, 0, 2, 0, 8), // CRA
        slice_nal(1, 0, 1, 2, 8),
    ]);

    let mut sink = MemoryTrackSink::new();
    let options = ImportOptions {
        fps: FpsPolicy::Forced(Rational::new(25, 1)),
        flags: ImportFlags::FORCE_SYNC,
        ..ImportOptions::default()
    };
    let report = import_hevc(&stream, &mut sink, options).unwrap();

    assert!(report.warnings.contains(&ImportWarning::ForcedSync));
    let track = sink.track(report.track).unwrap();
    assert!(track.samples[0].is_sync, "强制同步下 CRA 应为同步样本");
}

#[test]
fn test_suffix_sei_stays_with_current_sample() {
    // 后缀 SEI 属于它跟随的访问单元
    let stream = annexb(&[
        vps_nal(),
        sps_nal(None),
        pps_nal(false, false),
        slice_nal(19, 0, 2, 0, 8),
        suffix_sei_nal(),
        slice_nal(1, 0, 1, 2, 8),
    ]);

    let mut sink = MemoryTrackSink::new();
    let report = import_hevc(&stream, &mut sink, forced_25fps()).unwrap();
    assert_eq!(report.samples, 2);
    assert_eq!(report.nb_sei, 1);

    let track = sink.track(report.track).unwrap();
    let nals0 = split_sample(&track.samples[0].data, LengthPrefix::U32);
    assert_eq!(nals0.len(), 2, "后缀 SEI 应与 IDR 同样本");
    assert_eq!(nals0[1], suffix_sei_nal());
    let nals1 = split_sample(&track.samples[1].data, LengthPrefix::U32);
    assert_eq!(nals1.len(), 1);
}

#[test]
fn test_parallelism_type_from_pps() {
    // 全部 PPS 启用 WPP → 并行类型 3
    let stream = annexb(&[
        vps_nal(),
        sps_nal(None),
        pps_nal(false, true),
        slice_nal(19, 0, 2, 0, 8),
    ]);

    let mut sink = MemoryTrackSink::new();
    let report = import_hevc(&stream, &mut sink, forced_25fps()).unwrap();
    let track = sink.track(report.track).unwrap();
    let hvcc = track.config.as_ref().unwrap().primary.as_ref().unwrap();
    assert_eq!(hvcc[15] & 0x03, 3, "全 WPP 码流并行类型应为 3");
}

#[test]
fn test_hevc_timing_redetection() {
    // SPS VUI: num_units=1000, time_scale=30000 → 30fps
    let stream = annexb(&[
        vps_nal(),
        sps_nal(Some((1000, 30000))),
        pps_nal(false, false),
        slice_nal(19, 0, 2, 0, 8),
        slice_nal(1, 0, 1, 2, 8),
    ]);

    let mut sink = MemoryTrackSink::new();
    let report = import_hevc(&stream, &mut sink, ImportOptions::default()).unwrap();

    assert_eq!(report.timescale, 30000);
    assert_eq!(report.dts_inc, 1000);
    assert!(
        report
            .warnings
            .iter()
            .any(|w| matches!(w, ImportWarning::TimingRedetected { .. })),
    );
    assert_eq!(sink.live_track_count(), 1);
    assert_eq!(sink.track(report.track).unwrap().samples.len(), 2);
}

#[test]
fn test_layered_stream_emits_layer_information() {
    // 基础层 + 增强层 (layer_id=1) 同一访问单元
    let stream = annexb(&[
        vps_nal(),
        sps_nal(None),
        pps_nal(false, false),
        slice_nal(19, 0, 2, 0, 8),  // 基础层 IDR
        slice_nal(19, 1, 2, 0, 8),  // 增强层 IDR (同 AU)
        slice_nal(1, 0, 1, 2, 8),   // 基础层 P
        slice_nal(1, 1, 1, 2, 8),   // 增强层 P
    ]);

    let mut sink = MemoryTrackSink::new();
    let report = import_hevc(&stream, &mut sink, forced_25fps()).unwrap();

    assert_eq!(report.samples, 2, "增强层与基础层应合并进同一样本");
    assert_eq!(report.slices.i, 1);
    assert_eq!(report.enhancement_slices.i, 1);
    assert_eq!(report.enhancement_slices.p, 1);

    let track = sink.track(report.track).unwrap();
    let nals0 = split_sample(&track.samples[0].data, LengthPrefix::U32);
    assert_eq!(nals0.len(), 2, "样本 0 应含两层的 slice");

    let linf = track
        .layer_information
        .as_ref()
        .expect("分层流应产出层信息");
    assert_eq!(linf[0] & 0x3F, 2, "层信息应覆盖 2 个层");
}

#[test]
fn test_layered_none_drops_enhancement_layer() {
    let stream = annexb(&[
        vps_nal(),
        sps_nal(None),
        pps_nal(false, false),
        slice_nal(19, 0, 2, 0, 8),
        slice_nal(19, 1, 2, 0, 8),
        slice_nal(1, 0, 1, 2, 8),
    ]);

    let mut sink = MemoryTrackSink::new();
    let options = ImportOptions {
        fps: FpsPolicy::Forced(Rational::new(25, 1)),
        flags: ImportFlags::LAYERED_NONE,
        ..ImportOptions::default()
    };
    let report = import_hevc(&stream, &mut sink, options).unwrap();

    assert_eq!(report.samples, 2);
    assert_eq!(report.enhancement_slices.i, 0, "增强层 slice 应被丢弃");
    let track = sink.track(report.track).unwrap();
    for sample in &track.samples {
        assert_eq!(
            split_sample(&sample.data, LengthPrefix::U32).len(),
            1,
            "每个样本只应有基础层 slice",
        );
    }
}

#[test]
fn test_xps_inband_carries_parameter_sets() {
    let stream = annexb(&[
        vps_nal(),
        sps_nal(None),
        pps_nal(false, false),
        slice_nal(19, 0, 2, 0, 8),
        slice_nal(1, 0, 1, 2, 8),
    ]);

    let mut sink = MemoryTrackSink::new();
    let options = ImportOptions {
        fps: FpsPolicy::Forced(Rational::new(25, 1)),
        flags: ImportFlags::FORCE_XPS_INBAND,
        ..ImportOptions::default()
    };
    let report = import_hevc(&stream, &mut sink, options).unwrap();

    let track = sink.track(report.track).unwrap();
    let config = track.config.as_ref().unwrap();
    assert!(config.inband, "配置应标记为带内");

    // RAP 样本内应携带 VPS/SPS/PPS
    let nals0 = split_sample(&track.samples[0].data, LengthPrefix::U32);
    assert!(
        nals0.contains(&vps_nal()) && nals0.contains(&sps_nal(None)),
        "带内模式下 RAP 样本应携带参数集",
    );
    assert_eq!(report.samples, 2);
}
