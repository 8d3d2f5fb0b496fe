//! # naliu-import
//!
//! Naliu 裸流导入器主流程: 将 Annex B 形式的 H.264/AVC 或 H.265/HEVC
//! 裸流转换为基于轨道的容器样本.
//!
//! 数据流自上而下:
//! 扫描器 → 分类/解析 → {参数集注册表, 样本组装器} → (全流扫描后)
//! 时间重建引擎 → 元数据导出.
//!
//! 容器由外部 [`sink::TrackSink`] 实现提供; 组装器增量调用
//! `add_sample`, 时间引擎在第二趟中回写 CTS 偏移与 edit list.
//!
//! # 使用示例
//!
//! ```no_run
//! use naliu_import::session::{ImportOptions, import_avc};
//! use naliu_import::sink::MemoryTrackSink;
//!
//! let data = std::fs::read("stream.h264").unwrap();
//! let mut sink = MemoryTrackSink::new();
//! let report = import_avc(&data, &mut sink, ImportOptions::default()).unwrap();
//! println!("导入 {} 个样本, 重排深度 {}", report.samples, report.reorder_depth);
//! ```

pub mod adapter;
pub mod config;
pub mod metadata;
pub mod registry;
pub mod sample;
pub mod session;
pub mod sink;
pub mod timing;

pub use adapter::CodecKind;
pub use sample::LengthPrefix;
pub use session::{ImportFlags, ImportOptions, ImportReport, ImportWarning, import_avc, import_hevc};
pub use sink::{MemoryTrackSink, TrackSink};
