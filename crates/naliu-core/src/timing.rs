//! 视频时基推导.
//!
//! 将帧率换算为 (timescale, dts_inc) 二元组: 每个样本的 DTS 以
//! `dts_inc` 为步进, 轨道时钟频率为 `timescale`.

use crate::Rational;

/// 默认帧率 (帧率策略未指定且码流无 VUI timing 时使用)
pub const DEFAULT_FPS: Rational = Rational::new(25, 1);

/// 帧率 → (timescale, dts_inc)
///
/// drop-frame 帧率 (29.97 / 23.976 / 59.94) 映射为标准 1001 分母时基,
/// 其余帧率以毫帧精度表达 (fps×1000 / 1000).
pub fn video_timing(fps: Rational) -> (u32, u32) {
    let fps_1000 = (fps.to_f64() * 1000.0 + 0.5) as u32;
    match fps_1000 {
        29970 => (30000, 1001),
        23976 => (24000, 1001),
        59940 => (60000, 1001),
        _ => (fps_1000, 1000),
    }
}
