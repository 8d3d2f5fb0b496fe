//! H.264/AVC 码流语法解析.
//!
//! 覆盖导入所需的语法面: NAL 头、SPS/PPS (含 SVC subset SPS)、
//! slice header 前缀 (到 POC 字段为止) 与 SEI recovery point.

pub mod nal;
pub mod pps;
pub mod sei;
pub mod slice;
pub mod sps;

pub use nal::{NalHeader, NalUnitType};
pub use pps::{Pps, parse_pps};
pub use sei::{RecoveryPoint, SeiMessage, parse_sei};
pub use slice::{PocState, SliceHeader, SliceType, parse_slice_header};
pub use sps::{Sps, parse_sps};

/// SVC subset SPS 的 id 偏移
///
/// subset SPS 与基础 SPS 共用 0-31 的 id 空间, 注册表以偏移 16 区分
/// 两者, 避免同 id 冲突.
pub const SVC_SSPS_ID_SHIFT: u32 = 16;
