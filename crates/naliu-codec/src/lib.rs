//! # naliu-codec
//!
//! Naliu 裸流导入器语法解析库: Annex B 起始码扫描, H.264/AVC 与
//! H.265/HEVC 的 NAL 头、参数集、slice header 与 SEI 解析.
//!
//! 解析是尽力而为的: 导入只需要提取 id、profile/level、图像尺寸、
//! 时基提示、slice 类型与 POC, 不触碰宏块级数据. 不妨碍提取这些
//! 字段的语法违例由调用方降级为警告.

pub mod h264;
pub mod h265;
pub mod rbsp;
pub mod scan;

pub use scan::{AnnexBScanner, NalRange};
