//! H.265/HEVC 码流语法解析.
//!
//! 覆盖导入所需的语法面: 2 字节 NAL 头 (含 layer id / temporal id)、
//! VPS (含可伸缩扩展子集)、SPS、PPS、slice segment header 前缀与
//! SEI recovery point.

pub mod nal;
pub mod pps;
pub mod ptl;
pub mod sei;
pub mod slice;
pub mod sps;
pub mod vps;

pub use nal::{HevcNalHeader, HevcNalUnitType};
pub use pps::{HevcPps, parse_hevc_pps};
pub use ptl::ProfileTierLevel;
pub use sei::{HevcRecoveryPoint, HevcSeiMessage, parse_hevc_sei};
pub use slice::{HevcPocState, HevcSliceHeader, parse_hevc_slice_header};
pub use sps::{HevcSps, parse_hevc_sps};
pub use vps::{HevcVps, VpsExtension, parse_hevc_vps};
