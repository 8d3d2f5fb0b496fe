//! # Naliu (纳流)
//!
//! 纯 Rust 实现的 H.264/AVC 与 H.265/HEVC 裸流导入器 (含 SVC /
//! L-HEVC 分层扩展), 将 Annex B 码流转换为可随机访问、正确打戳、
//! 长度前缀封装的容器样本.
//!
//! 核心能力:
//! - **流式扫描**: 起始码定位与尾部零填充剥离
//! - **参数集注册**: VPS/SPS/PPS 按 id + CRC 去重, 分歧重定义转带内
//! - **样本组装**: 按访问单元成样, 长度前缀按需 8→16→32 位加宽并
//!   就地重写历史样本
//! - **时间重建**: 两趟算法从 POC 恢复显示顺序 (CTS), 含参考复位、
//!   B 帧重排深度与病态流修复
//! - **轨道元数据**: 同步样本/roll-recovery 分组、open-GOP 标记与
//!   分层流操作点描述
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use naliu::import::session::{ImportOptions, import_avc};
//! use naliu::import::sink::MemoryTrackSink;
//!
//! let data = std::fs::read("stream.h264").unwrap();
//! let mut sink = MemoryTrackSink::new();
//! let report = import_avc(&data, &mut sink, ImportOptions::default()).unwrap();
//! println!("导入 {} 个样本, {} 个 NAL", report.samples, report.nal_units);
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `naliu-core` | 错误类型、位读写、CRC 与时基工具 |
//! | `naliu-codec` | Annex B 扫描与 H.264/H.265 语法解析 |
//! | `naliu-import` | 导入主流程: 注册表、组装器、时间引擎、元数据 |

/// 核心类型与工具
pub use naliu_core as core;

/// 码流语法解析
pub use naliu_codec as codec;

/// 导入主流程
pub use naliu_import as import;

/// 获取 Naliu 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
