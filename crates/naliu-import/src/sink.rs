//! 容器落地接口 (外部协作方).
//!
//! [`TrackSink`] 抽象了导入器对容器的全部调用面: 建轨、追加样本、
//! 按索引回读/改写样本 (长度前缀重写与 CTS 修正两趟都依赖该能力)、
//! 设置解码器配置与轨道元数据.
//!
//! 样本按调用顺序保留且可按索引随机读写; 组装器只持有索引,
//! 从不长期持有样本数据的引用.

use naliu_core::{NaliuError, NaliuResult};

use crate::adapter::CodecKind;

/// 轨道句柄
pub type TrackId = u32;

/// 追加到容器的一个样本
#[derive(Debug, Clone)]
pub struct SinkSample {
    /// 解码时间戳 (固定步进 × 样本序号)
    pub dts: u64,
    /// CTS 偏移 (扫描期间为 POC 相对占位值, 第二趟改写为真实偏移)
    pub cts_offset: i64,
    /// 是否为同步样本
    pub is_sync: bool,
    /// 长度前缀封装后的样本数据
    pub data: Vec<u8>,
}

/// 解码器配置 (主配置 + 可选增强层配置)
#[derive(Debug, Clone, Default)]
pub struct DecoderConfig {
    /// 主配置记录 (avcC / hvcC 序列化字节)
    pub primary: Option<Vec<u8>>,
    /// 增强层配置记录 (svcC / lhvC)
    pub enhancement: Option<Vec<u8>>,
    /// 参数集是否以带内方式随样本携带
    pub inband: bool,
}

/// 容器落地接口
pub trait TrackSink {
    /// 新建轨道
    fn new_track(&mut self, codec: CodecKind, timescale: u32) -> NaliuResult<TrackId>;

    /// 移除轨道 (仅时基重检测重启路径使用)
    fn remove_track(&mut self, track: TrackId) -> NaliuResult<()>;

    /// 设置解码器配置
    fn set_decoder_config(&mut self, track: TrackId, config: DecoderConfig) -> NaliuResult<()>;

    /// 追加样本, 返回样本索引 (从 0 起)
    fn add_sample(&mut self, track: TrackId, sample: SinkSample) -> NaliuResult<u32>;

    /// 轨道内样本数
    fn sample_count(&self, track: TrackId) -> u32;

    /// 回读样本数据 (长度前缀重写用)
    fn sample_data(&self, track: TrackId, index: u32) -> NaliuResult<Vec<u8>>;

    /// 就地替换样本数据
    fn replace_sample_data(&mut self, track: TrackId, index: u32, data: Vec<u8>)
    -> NaliuResult<()>;

    /// 读取样本时间信息: (DTS, CTS 偏移, 是否同步)
    fn sample_timing(&self, track: TrackId, index: u32) -> NaliuResult<(u64, i64, bool)>;

    /// 改写样本的 CTS 偏移
    fn set_cts_offset(&mut self, track: TrackId, index: u32, offset: i64) -> NaliuResult<()>;

    /// 整体平移所有样本的 CTS 偏移 (减去 delta)
    fn shift_cts_offsets(&mut self, track: TrackId, delta: i64) -> NaliuResult<()>;

    /// 清除 CTS 信息 (解码顺序即显示顺序的轨道)
    fn clear_cts_offsets(&mut self, track: TrackId) -> NaliuResult<()>;

    /// 设置 edit list: 显示从媒体时间 `media_offset` 起, 持续 `duration`
    fn set_edit_list(&mut self, track: TrackId, media_offset: u64, duration: u64)
    -> NaliuResult<()>;

    /// 设置视觉尺寸
    fn set_visual_dimensions(&mut self, track: TrackId, width: u32, height: u32)
    -> NaliuResult<()>;

    /// 标记样本的 roll-recovery 分组 (GDR)
    fn set_sample_roll_group(
        &mut self,
        track: TrackId,
        index: u32,
        roll_distance: i16,
    ) -> NaliuResult<()>;

    /// 标记样本的 RAP 分组 (open-GOP 随机访问点)
    fn set_sample_rap_group(&mut self, track: TrackId, index: u32) -> NaliuResult<()>;

    /// 设置分层流的层信息 (linf)
    fn set_layer_information(&mut self, track: TrackId, data: Vec<u8>) -> NaliuResult<()>;

    /// 设置分层流的操作点描述 (oinf)
    fn set_operating_points(&mut self, track: TrackId, data: Vec<u8>) -> NaliuResult<()>;
}

// ============================================================
// 内存实现
// ============================================================

/// 存储在内存轨道中的样本
#[derive(Debug, Clone)]
pub struct StoredSample {
    /// DTS
    pub dts: u64,
    /// CTS 偏移
    pub cts_offset: i64,
    /// 是否同步样本
    pub is_sync: bool,
    /// 样本数据
    pub data: Vec<u8>,
    /// roll-recovery 距离 (如有)
    pub roll_distance: Option<i16>,
    /// 是否属于 RAP 分组
    pub rap_group: bool,
}

/// 内存轨道
#[derive(Debug, Default)]
pub struct MemoryTrack {
    /// 编解码族
    pub codec: Option<CodecKind>,
    /// 时钟频率
    pub timescale: u32,
    /// 样本数组 (索引即样本序号)
    pub samples: Vec<StoredSample>,
    /// 解码器配置
    pub config: Option<DecoderConfig>,
    /// edit list: (媒体偏移, 时长)
    pub edit_list: Option<(u64, u64)>,
    /// 视觉尺寸
    pub dimensions: Option<(u32, u32)>,
    /// 是否保留 CTS 信息
    pub cts_enabled: bool,
    /// 层信息 blob
    pub layer_information: Option<Vec<u8>>,
    /// 操作点 blob
    pub operating_points: Option<Vec<u8>>,
}

/// 索引数组式内存落地实现
///
/// 测试与参考实现用; 被移除的轨道留下墓碑以保持句柄稳定.
#[derive(Debug, Default)]
pub struct MemoryTrackSink {
    tracks: Vec<Option<MemoryTrack>>,
}

impl MemoryTrackSink {
    /// 创建空实现
    pub fn new() -> Self {
        Self::default()
    }

    /// 访问轨道 (测试断言用)
    pub fn track(&self, track: TrackId) -> Option<&MemoryTrack> {
        self.tracks.get(track as usize).and_then(|t| t.as_ref())
    }

    /// 活动轨道数
    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_some()).count()
    }

    fn track_mut(&mut self, track: TrackId) -> NaliuResult<&mut MemoryTrack> {
        self.tracks
            .get_mut(track as usize)
            .and_then(|t| t.as_mut())
            .ok_or_else(|| NaliuError::Sink(format!("未知轨道 {}", track)))
    }

    fn track_ref(&self, track: TrackId) -> NaliuResult<&MemoryTrack> {
        self.tracks
            .get(track as usize)
            .and_then(|t| t.as_ref())
            .ok_or_else(|| NaliuError::Sink(format!("未知轨道 {}", track)))
    }

    fn sample_mut(&mut self, track: TrackId, index: u32) -> NaliuResult<&mut StoredSample> {
        self.track_mut(track)?
            .samples
            .get_mut(index as usize)
            .ok_or_else(|| NaliuError::Sink(format!("样本索引越界, index={}", index)))
    }
}

impl TrackSink for MemoryTrackSink {
    fn new_track(&mut self, codec: CodecKind, timescale: u32) -> NaliuResult<TrackId> {
        if timescale == 0 {
            return Err(NaliuError::Sink("timescale 不能为 0".into()));
        }
        let id = self.tracks.len() as TrackId;
        self.tracks.push(Some(MemoryTrack {
            codec: Some(codec),
            timescale,
            cts_enabled: true,
            ..MemoryTrack::default()
        }));
        Ok(id)
    }

    fn remove_track(&mut self, track: TrackId) -> NaliuResult<()> {
        let slot = self
            .tracks
            .get_mut(track as usize)
            .ok_or_else(|| NaliuError::Sink(format!("未知轨道 {}", track)))?;
        *slot = None;
        Ok(())
    }

    fn set_decoder_config(&mut self, track: TrackId, config: DecoderConfig) -> NaliuResult<()> {
        self.track_mut(track)?.config = Some(config);
        Ok(())
    }

    fn add_sample(&mut self, track: TrackId, sample: SinkSample) -> NaliuResult<u32> {
        let t = self.track_mut(track)?;
        let index = t.samples.len() as u32;
        t.samples.push(StoredSample {
            dts: sample.dts,
            cts_offset: sample.cts_offset,
            is_sync: sample.is_sync,
            data: sample.data,
            roll_distance: None,
            rap_group: false,
        });
        Ok(index)
    }

    fn sample_count(&self, track: TrackId) -> u32 {
        self.track_ref(track)
            .map(|t| t.samples.len() as u32)
            .unwrap_or(0)
    }

    fn sample_data(&self, track: TrackId, index: u32) -> NaliuResult<Vec<u8>> {
        self.track_ref(track)?
            .samples
            .get(index as usize)
            .map(|s| s.data.clone())
            .ok_or_else(|| NaliuError::Sink(format!("样本索引越界, index={}", index)))
    }

    fn replace_sample_data(
        &mut self,
        track: TrackId,
        index: u32,
        data: Vec<u8>,
    ) -> NaliuResult<()> {
        self.sample_mut(track, index)?.data = data;
        Ok(())
    }

    fn sample_timing(&self, track: TrackId, index: u32) -> NaliuResult<(u64, i64, bool)> {
        self.track_ref(track)?
            .samples
            .get(index as usize)
            .map(|s| (s.dts, s.cts_offset, s.is_sync))
            .ok_or_else(|| NaliuError::Sink(format!("样本索引越界, index={}", index)))
    }

    fn set_cts_offset(&mut self, track: TrackId, index: u32, offset: i64) -> NaliuResult<()> {
        self.sample_mut(track, index)?.cts_offset = offset;
        Ok(())
    }

    fn shift_cts_offsets(&mut self, track: TrackId, delta: i64) -> NaliuResult<()> {
        for sample in &mut self.track_mut(track)?.samples {
            sample.cts_offset -= delta;
        }
        Ok(())
    }

    fn clear_cts_offsets(&mut self, track: TrackId) -> NaliuResult<()> {
        let t = self.track_mut(track)?;
        t.cts_enabled = false;
        for sample in &mut t.samples {
            sample.cts_offset = 0;
        }
        Ok(())
    }

    fn set_edit_list(
        &mut self,
        track: TrackId,
        media_offset: u64,
        duration: u64,
    ) -> NaliuResult<()> {
        self.track_mut(track)?.edit_list = Some((media_offset, duration));
        Ok(())
    }

    fn set_visual_dimensions(
        &mut self,
        track: TrackId,
        width: u32,
        height: u32,
    ) -> NaliuResult<()> {
        self.track_mut(track)?.dimensions = Some((width, height));
        Ok(())
    }

    fn set_sample_roll_group(
        &mut self,
        track: TrackId,
        index: u32,
        roll_distance: i16,
    ) -> NaliuResult<()> {
        self.sample_mut(track, index)?.roll_distance = Some(roll_distance);
        Ok(())
    }

    fn set_sample_rap_group(&mut self, track: TrackId, index: u32) -> NaliuResult<()> {
        self.sample_mut(track, index)?.rap_group = true;
        Ok(())
    }

    fn set_layer_information(&mut self, track: TrackId, data: Vec<u8>) -> NaliuResult<()> {
        self.track_mut(track)?.layer_information = Some(data);
        Ok(())
    }

    fn set_operating_points(&mut self, track: TrackId, data: Vec<u8>) -> NaliuResult<()> {
        self.track_mut(track)?.operating_points = Some(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(dts: u64, data: &[u8]) -> SinkSample {
        SinkSample {
            dts,
            cts_offset: 0,
            is_sync: false,
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_samples_retained_in_call_order() {
        let mut sink = MemoryTrackSink::new();
        let track = sink.new_track(CodecKind::Avc, 25000).unwrap();

        for i in 0..4u64 {
            let idx = sink.add_sample(track, sample(i * 1000, &[i as u8])).unwrap();
            assert_eq!(idx, i as u32);
        }
        assert_eq!(sink.sample_count(track), 4);
        assert_eq!(sink.sample_data(track, 2).unwrap(), vec![2u8]);
    }

    #[test]
    fn test_replace_sample_data_in_place() {
        let mut sink = MemoryTrackSink::new();
        let track = sink.new_track(CodecKind::Avc, 25000).unwrap();
        sink.add_sample(track, sample(0, &[1, 2, 3])).unwrap();

        sink.replace_sample_data(track, 0, vec![9, 9]).unwrap();
        assert_eq!(sink.sample_data(track, 0).unwrap(), vec![9, 9]);
        assert!(sink.replace_sample_data(track, 5, vec![]).is_err());
    }

    #[test]
    fn test_remove_track_leaves_tombstone() {
        let mut sink = MemoryTrackSink::new();
        let t0 = sink.new_track(CodecKind::Avc, 25000).unwrap();
        sink.remove_track(t0).unwrap();
        assert_eq!(sink.live_track_count(), 0);

        // 句柄保持稳定: 新轨道拿到新 id
        let t1 = sink.new_track(CodecKind::Avc, 30000).unwrap();
        assert_ne!(t0, t1);
        assert!(sink.sample_data(t0, 0).is_err());
    }

    #[test]
    fn test_shift_and_clear_cts() {
        let mut sink = MemoryTrackSink::new();
        let track = sink.new_track(CodecKind::Hevc, 90000).unwrap();
        for i in 0..3u64 {
            let mut s = sample(i * 3000, &[0]);
            s.cts_offset = 6000;
            sink.add_sample(track, s).unwrap();
        }
        sink.shift_cts_offsets(track, 3000).unwrap();
        assert_eq!(sink.sample_timing(track, 1).unwrap().1, 3000);

        sink.clear_cts_offsets(track).unwrap();
        assert!(!sink.track(track).unwrap().cts_enabled);
        assert_eq!(sink.sample_timing(track, 1).unwrap().1, 0);
    }

    #[test]
    fn test_new_track_rejects_zero_timescale() {
        let mut sink = MemoryTrackSink::new();
        assert!(sink.new_track(CodecKind::Avc, 0).is_err());
    }
}
