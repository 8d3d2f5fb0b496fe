//! 长度前缀加宽与全轨道重写集成测试.
//!
//! 验证一致性不变量: 加宽后成品轨道内所有样本 (含多 NAL 样本)
//! 使用同一前缀宽度, 且重新解包恢复原始载荷长度; 解码顺序与 DTS
//! 不受重写影响.

use naliu::core::{BitWriter, Rational};
use naliu::import::sample::LengthPrefix;
use naliu::import::session::{FpsPolicy, ImportFlags, ImportOptions, ImportWarning, import_avc};
use naliu::import::sink::MemoryTrackSink;

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

fn sps_nal() -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(66, 8);
    bw.write_bits(0xC0, 8);
    bw.write_bits(30, 8);
    bw.write_ue(0);
    bw.write_ue(4);
    bw.write_ue(0);
    bw.write_ue(4);
    bw.write_ue(2);
    bw.write_bit(0);
    bw.write_ue(39);
    bw.write_ue(29);
    bw.write_bit(1);
    bw.write_bit(1);
    bw.write_bit(0);
    bw.write_bit(0);
    bw.write_bit(1);
    let mut nal = vec![0x67];
    nal.extend(to_ebsp(&bw.finish()));
    nal
}

fn pps_nal() -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_ue(0);
    bw.write_ue(0);
    bw.write_bit(0);
    bw.write_bit(0);
    bw.write_ue(0);
    bw.write_ue(0);
    bw.write_ue(0);
    bw.write_bit(0);
    bw.write_bits(0, 2);
    bw.write_se(0);
    bw.write_se(0);
    bw.write_se(0);
    bw.write_bit(0);
    bw.write_bit(0);
    bw.write_bit(0);
    bw.write_bit(1);
    let mut nal = vec![0x68];
    nal.extend(to_ebsp(&bw.finish()));
    nal
}

fn slice_nal(idr: bool, slice_type: u32, frame_num: u32, poc_lsb: u32, padding: usize) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_ue(0);
    bw.write_ue(slice_type);
    bw.write_ue(0);
    bw.write_bits(frame_num, 8);
    if idr {
        bw.write_ue(0);
    }
    bw.write_bits(poc_lsb, 8);
    bw.write_bit(1);
    let mut nal = vec![if idr { 0x65 } else { 0x41 }];
    nal.extend(to_ebsp(&bw.finish()));
    nal.extend(std::iter::repeat_n(0xA5, padding));
    nal
}

/// SEI (未知类型, 指定载荷大小)
fn sei_nal(payload_len: usize) -> Vec<u8> {
    assert!(payload_len < 255);
    let mut nal = vec![0x06, 0x05, payload_len as u8];
    nal.extend(std::iter::repeat_n(0x11, payload_len));
    nal.push(0x80);
    nal
}

fn nal_lengths(data: &[u8], prefix: LengthPrefix) -> Vec<usize> {
    let mut lengths = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let mut len = 0usize;
        for _ in 0..prefix.bytes() {
            len = (len << 8) | usize::from(data[pos]);
            pos += 1;
        }
        lengths.push(len);
        pos += len;
    }
    lengths
}

#[test]
fn test_growth_rewrites_multi_nal_samples() {
    // 样本 0 含 SEI + IDR 两个 NAL; 样本 2 的大 slice 触发 8→16 加宽
    let sei = sei_nal(20);
    let idr = slice_nal(true, 7, 0, 0, 30);
    let p1 = slice_nal(false, 5, 1, 2, 40);
    let p2 = slice_nal(false, 5, 2, 4, 700);
    let stream = annexb(&[sps_nal(), pps_nal(), sei.clone(), idr.clone(), p1.clone(), p2.clone()]);

    let mut sink = MemoryTrackSink::new();
    let options = ImportOptions {
        fps: FpsPolicy::Forced(Rational::new(25, 1)),
        flags: ImportFlags::FORCE_PACKED,
        ..ImportOptions::default()
    };
    let report = import_avc(&stream, &mut sink, options).unwrap();
    assert_eq!(report.samples, 3);

    let track = sink.track(report.track).unwrap();
    let expected: [&[&Vec<u8>]; 3] = [&[&sei, &idr], &[&p1], &[&p2]];
    for (i, sample) in track.samples.iter().enumerate() {
        let lengths = nal_lengths(&sample.data, LengthPrefix::U16);
        let expect_lengths: Vec<usize> = expected[i].iter().map(|n| n.len()).collect();
        assert_eq!(
            lengths, expect_lengths,
            "样本 {} 重写后各 NAL 长度应不变",
            i,
        );
        assert_eq!(sample.dts, i as u64 * 1000);
    }
}

#[test]
fn test_double_growth_to_32_bits() {
    // 第一次加宽 8→16 (300 字节), 第二次 16→32 (70000 字节)
    let small = slice_nal(true, 7, 0, 0, 30);
    let medium = slice_nal(false, 5, 1, 2, 300);
    let huge = slice_nal(false, 5, 2, 4, 70_000);
    let stream = annexb(&[sps_nal(), pps_nal(), small.clone(), medium.clone(), huge.clone()]);

    let mut sink = MemoryTrackSink::new();
    let options = ImportOptions {
        fps: FpsPolicy::Forced(Rational::new(25, 1)),
        flags: ImportFlags::FORCE_PACKED,
        ..ImportOptions::default()
    };
    let report = import_avc(&stream, &mut sink, options).unwrap();

    // 两次加宽各报告一次
    let grown: Vec<u32> = report
        .warnings
        .iter()
        .filter_map(|w| match w {
            ImportWarning::PrefixGrown { bits } => Some(*bits),
            _ => None,
        })
        .collect();
    assert_eq!(grown, vec![16, 32], "应依次加宽到 16 与 32 位");

    // 全轨道统一 32 位前缀
    let track = sink.track(report.track).unwrap();
    for (i, (sample, original)) in track.samples.iter().zip([&small, &medium, &huge]).enumerate() {
        let lengths = nal_lengths(&sample.data, LengthPrefix::U32);
        assert_eq!(lengths, vec![original.len()], "样本 {} 长度不匹配", i);
    }
}

#[test]
fn test_forced_32_bit_prefix_never_rewrites() {
    // 默认 (非 FORCE_PACKED) 直接 32 位, 大 NAL 不触发任何加宽
    let huge = slice_nal(true, 7, 0, 0, 70_000);
    let stream = annexb(&[sps_nal(), pps_nal(), huge]);

    let mut sink = MemoryTrackSink::new();
    let report = import_avc(
        &stream,
        &mut sink,
        ImportOptions {
            fps: FpsPolicy::Forced(Rational::new(25, 1)),
            ..ImportOptions::default()
        },
    )
    .unwrap();

    assert!(
        report
            .warnings
            .iter()
            .all(|w| !matches!(w, ImportWarning::PrefixGrown { .. })),
        "固定 32 位前缀不应发生加宽",
    );
}
