//! 时间重建引擎.
//!
//! B 帧参考依赖使 POC 在解码顺序下非单调, CTS 无法在扫描时定稿,
//! 因此分两趟:
//!
//! - **第一趟** (扫描期间): 逐 slice 维护 POC 累积量 — 最小非零
//!   POC 增量 (显示 tick)、POC 平移基准、最大解码-显示重排深度;
//!   每个样本先携带 `last_poc - poc_shift` 作为 CTS 占位值.
//! - **第二趟** (扫描结束后, 仅当观测到 POC 回退): 按解码顺序将
//!   占位值换算为真实 CTS, 叠加重排缓冲偏移, 对病态流的负偏移做
//!   钳零加冲突推进, 最后以 edit list 抵消起始偏移.

use log::{debug, warn};
use naliu_core::NaliuResult;

use crate::sink::{TrackId, TrackSink};

/// 一个 slice 进入第一趟时的时间属性
#[derive(Debug, Clone, Copy)]
pub struct SliceTiming {
    /// 该图像的 POC
    pub poc: i32,
    /// 是否为真参考点 (IDR / SAP 1-2 等价)
    pub is_ref: bool,
    /// 是否为强制参考点 (open-GOP 强制同步)
    pub force_ref: bool,
    /// 是否为 B slice
    pub is_b: bool,
}

/// 轨道时间状态 (扫描顺序累积量)
///
/// 第二趟只读取这些量, 改写的是容器内样本的 CTS 偏移.
#[derive(Debug, Default)]
pub struct TimingState {
    /// 最近参考帧的样本序号 + 1 (0 表示尚无参考帧)
    ref_frame: u32,
    /// 最近一个 slice 的 POC
    last_poc: i32,
    /// 前向参考观测到的最大 POC
    max_last_poc: i32,
    /// 后向参考 (B) 观测到的最大 POC
    max_last_b_poc: i32,
    /// POC 平移基准 (处理未经 IDR 的 POC 重启)
    poc_shift: i32,
    /// 最小非零 |ΔPOC| (显示顺序 tick)
    poc_diff: i32,
    /// 封存样本观测到的最小 POC
    min_poc: i32,
    /// 最大解码-显示重排深度 (样本数)
    max_total_delay: u32,
    /// 是否观测到 POC 回退 (需要第二趟)
    has_cts_offset: bool,
}

impl TimingState {
    /// 创建初始状态
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否需要第二趟
    pub fn has_cts_offset(&self) -> bool {
        self.has_cts_offset
    }

    /// 检测到的重排深度 (帧)
    pub fn reorder_depth(&self) -> u32 {
        self.max_total_delay
    }

    /// 当前样本的 CTS 占位值 (POC 相对量)
    pub fn cts_placeholder(&self) -> i64 {
        i64::from(self.last_poc - self.poc_shift)
    }

    /// 样本封存后更新最小 POC
    pub fn note_flushed(&mut self) {
        if self.min_poc > self.last_poc {
            self.min_poc = self.last_poc;
        }
    }

    /// 第一趟: 观测一个 slice
    ///
    /// `cur_samp` 为正在组装的样本序号 (已封存数). POC 低于平移基准
    /// 时回溯修正自最近参考帧以来所有已提交样本的占位值 — 处理
    /// 编码器在 GOP 中途不经 IDR 重启 POC 的情形.
    pub fn observe_slice<S: TrackSink>(
        &mut self,
        sink: &mut S,
        track: TrackId,
        cur_samp: u32,
        slice: &SliceTiming,
    ) -> NaliuResult<()> {
        if slice.poc < self.poc_shift {
            if self.ref_frame > 0 {
                for index in (self.ref_frame - 1)..cur_samp.min(sink.sample_count(track)) {
                    let (_, placeholder, _) = sink.sample_timing(track, index)?;
                    let adjusted = placeholder + i64::from(self.poc_shift) - i64::from(slice.poc);
                    sink.set_cts_offset(track, index, adjusted)?;
                }
            }
            debug!(
                "POC 回退至平移基准之下: {} < {}, 回溯修正占位值",
                slice.poc, self.poc_shift,
            );
            self.poc_shift = slice.poc;
        }

        // 维护最小非零 POC 增量 (显示 tick)
        if slice.poc != self.last_poc {
            let diff = (slice.poc - self.last_poc).abs();
            if self.poc_diff == 0 || self.poc_diff > diff {
                self.poc_diff = diff;
            }
            self.last_poc = slice.poc;
        }

        if slice.is_ref {
            // 真参考点: POC 空间整体复位
            self.ref_frame = cur_samp + 1;
            self.max_last_poc = 0;
            self.last_poc = 0;
            self.max_last_b_poc = 0;
            self.poc_shift = 0;
        } else if slice.force_ref {
            // 强制参考点将被标记为同步, POC 基准对齐到该图像
            self.ref_frame = cur_samp + 1;
            self.poc_shift = slice.poc;
        } else if self.max_last_poc < self.last_poc {
            // 新的前向参考 (P 类)
            self.max_last_b_poc = 0;
            self.max_last_poc = self.last_poc;
        } else if self.max_last_poc > self.last_poc {
            // 后向参考: 该图像显示在已见的更大 POC 之前
            self.has_cts_offset = true;
            if slice.is_b && self.last_poc > self.max_last_b_poc {
                self.max_last_b_poc = self.last_poc;
            }
        }

        // 最大重排深度: 解码序号超前显示位置的最大样本数
        if self.ref_frame > 0 && self.poc_diff > 0 {
            let delay = i64::from(cur_samp) - i64::from(self.ref_frame - 1)
                - i64::from(self.last_poc / self.poc_diff);
            if delay > i64::from(self.max_total_delay) {
                self.max_total_delay = delay as u32;
            }
        }

        Ok(())
    }

    /// 第二趟: 将占位值换算为真实 CTS 偏移
    ///
    /// 仅在 `has_cts_offset` 为真时调用. `is_paff` 时两个 POC 对应
    /// 一个聚合帧样本, CTS 换算减半.
    pub fn finalize<S: TrackSink>(
        &mut self,
        sink: &mut S,
        track: TrackId,
        dts_inc: u32,
        is_paff: bool,
        no_edit_list: bool,
    ) -> NaliuResult<()> {
        if self.poc_diff == 0 {
            self.poc_diff = 1;
        }
        // 无后向参考深度: 不需要负 POC 处理
        if self.max_total_delay == 0 {
            self.min_poc = 0;
            self.max_total_delay = 1;
        }

        let count = sink.sample_count(track);
        let min_poc = i64::from(-self.min_poc);
        let tick = i64::from(dts_inc);
        let poc_diff = i64::from(self.poc_diff);

        let mut last_dts = 0i64;
        let mut max_cts = 0u64;
        let mut min_cts = u64::MAX;
        let mut min_cts_offset = i64::MAX;
        // 此前持有最大 CTS 的样本 (冲突推进的扫描起点)
        let mut last_cts_samp = 0u32;

        for index in 0..count {
            let (dts, placeholder, is_sync) = sink.sample_timing(track, index)?;
            // 参考点处 POC 复位, DTS 基准随之前移
            if is_sync {
                last_dts = dts as i64 * (1 + i64::from(is_paff));
            }

            // 占位值是相对最近参考点的 POC
            let mut cts = (min_poc + placeholder) * tick / poc_diff + last_dts;

            // PAFF: 两个 POC 对应一个样本, 折半并向上对齐到 tick
            if is_paff {
                cts /= 2;
                if cts % tick != 0 {
                    cts = (cts / tick + 1) * tick;
                }
            }

            // 重排缓冲整体偏移
            cts += i64::from(self.max_total_delay) * tick;

            let mut offset = cts - dts as i64;
            if offset < min_cts_offset {
                min_cts_offset = offset;
            }

            if offset < 0 {
                // 病态 POC 跳变 (如 Sorenson 流尾部): 钳零后把后续
                // 相撞样本按解码顺序逐个推进一个 tick, 保证 CTS
                // 非负且单射. 推进顺序只由解码顺序决定, 可重现.
                warn!("样本 {} 的 CTS 偏移为负, 钳零并推进冲突样本", index);
                offset = 0;
                sink.set_cts_offset(track, index, 0)?;
                for j in last_cts_samp..index {
                    let (dts_j, off_j, _) = sink.sample_timing(track, j)?;
                    for k in (j + 1)..=index {
                        let (dts_k, off_k, _) = sink.sample_timing(track, k)?;
                        if dts_j as i64 + off_j == dts_k as i64 + off_k {
                            max_cts += u64::from(dts_inc);
                            let pushed = max_cts as i64 - dts_k as i64;
                            sink.set_cts_offset(track, k, pushed)?;
                        }
                    }
                }
                max_cts = dts;
                min_cts = min_cts.min(dts);
            } else {
                sink.set_cts_offset(track, index, offset)?;
                let cts = dts + offset as u64;
                if max_cts < cts {
                    max_cts = cts;
                    last_cts_samp = index;
                }
                if min_cts > cts {
                    min_cts = cts;
                }
            }
        }

        if count == 0 {
            return Ok(());
        }

        // 归一化: 全轨道最小 CTS 偏移压到 0
        if min_cts_offset > 0 {
            sink.shift_cts_offsets(track, min_cts_offset)?;
            max_cts -= min_cts_offset as u64;
            min_cts -= min_cts_offset as u64;
        }

        // 剩余的起始显示偏移用 edit list 抵消, 显示从 0 开始
        if !no_edit_list && min_cts > 0 && min_cts != u64::MAX {
            let duration = max_cts - min_cts + u64::from(dts_inc);
            sink.set_edit_list(track, min_cts, duration)?;
        }

        Ok(())
    }
}
