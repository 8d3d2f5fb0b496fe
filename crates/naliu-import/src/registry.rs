//! 参数集注册表.
//!
//! 以 (类别, id) 为键对 VPS/SPS/PPS (及 SVC/L-HEVC 变体) 去重:
//! 首次出现的 id 晋升为 Declared 并进入解码器配置记录; 同 id 但
//! 内容分歧 (CRC 不同) 的后续 NAL 不替换已声明者, 而是转入带内
//! 样本数据, 同时所属参数集数组标记为不完整.
//!
//! 条目在一次导入运行内从不删除; 时基重检测重启时随会话整体重建.

use std::collections::HashMap;

use naliu_core::crc::crc32;

/// 参数集类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSetKind {
    /// H.264 SPS
    AvcSps,
    /// H.264 PPS
    AvcPps,
    /// H.264 SPS 扩展
    AvcSpsExt,
    /// H.264 SVC subset SPS
    AvcSubsetSps,
    /// HEVC VPS
    HevcVps,
    /// HEVC SPS
    HevcSps,
    /// HEVC PPS
    HevcPps,
}

/// observe 的判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// 首次出现, 已晋升为 Declared
    Added,
    /// 与已声明条目逐字节一致, 忽略
    DuplicateIdentical,
    /// 同 id 但内容分歧, 需转入带内样本
    DuplicateDivergent,
}

/// 一个已登记的参数集
#[derive(Debug)]
struct ParamSetEntry {
    crc: u32,
    declared: bool,
}

/// 参数集注册表
#[derive(Debug, Default)]
pub struct ParamSetRegistry {
    entries: HashMap<(ParamSetKind, u32), ParamSetEntry>,
}

impl ParamSetRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个参数集 NAL
    pub fn observe(&mut self, kind: ParamSetKind, id: u32, raw: &[u8]) -> Observation {
        let crc = crc32(raw);
        match self.entries.get(&(kind, id)) {
            None => {
                self.entries.insert(
                    (kind, id),
                    ParamSetEntry {
                        crc,
                        declared: true,
                    },
                );
                Observation::Added
            }
            Some(entry) if entry.crc == crc => Observation::DuplicateIdentical,
            Some(_) => Observation::DuplicateDivergent,
        }
    }

    /// 指定类别是否已有任何已声明条目
    pub fn has_declared(&self, kind: ParamSetKind) -> bool {
        self.entries
            .iter()
            .any(|((k, _), e)| *k == kind && e.declared)
    }

    /// 已声明条目总数
    pub fn declared_count(&self) -> usize {
        self.entries.values().filter(|e| e.declared).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_is_added() {
        let mut reg = ParamSetRegistry::new();
        let obs = reg.observe(ParamSetKind::AvcSps, 0, &[0x67, 0x42, 0x00, 0x1E]);
        assert_eq!(obs, Observation::Added);
        assert!(reg.has_declared(ParamSetKind::AvcSps));
        assert!(!reg.has_declared(ParamSetKind::AvcPps));
    }

    #[test]
    fn test_identical_duplicate_ignored() {
        let mut reg = ParamSetRegistry::new();
        let raw = [0x67, 0x42, 0x00, 0x1E];
        reg.observe(ParamSetKind::AvcSps, 0, &raw);
        assert_eq!(
            reg.observe(ParamSetKind::AvcSps, 0, &raw),
            Observation::DuplicateIdentical,
        );
        assert_eq!(reg.declared_count(), 1);
    }

    #[test]
    fn test_divergent_duplicate_detected() {
        let mut reg = ParamSetRegistry::new();
        reg.observe(ParamSetKind::AvcSps, 0, &[0x67, 0x42, 0x00, 0x1E]);
        assert_eq!(
            reg.observe(ParamSetKind::AvcSps, 0, &[0x67, 0x42, 0x00, 0x28]),
            Observation::DuplicateDivergent,
        );
        // 分歧不替换已声明条目: 再次出现仍判分歧
        assert_eq!(
            reg.observe(ParamSetKind::AvcSps, 0, &[0x67, 0x42, 0x00, 0x28]),
            Observation::DuplicateDivergent,
        );
        assert_eq!(reg.declared_count(), 1);
    }

    #[test]
    fn test_same_id_different_kind_is_independent() {
        let mut reg = ParamSetRegistry::new();
        assert_eq!(
            reg.observe(ParamSetKind::HevcSps, 0, &[0x01]),
            Observation::Added,
        );
        assert_eq!(
            reg.observe(ParamSetKind::HevcPps, 0, &[0x02]),
            Observation::Added,
        );
        assert_eq!(
            reg.observe(ParamSetKind::AvcSubsetSps, 0, &[0x03]),
            Observation::Added,
        );
    }
}
