//! H.265 SEI 解析.
//!
//! 与 H.264 的差异: recovery point 的 recovery_poc_cnt 为 se(v)
//! (可为负), 且 SEI 分前缀/后缀两种 NAL 类型 (由 NAL 头区分,
//! 本模块只处理载荷).

use naliu_core::BitReader;
use naliu_core::bitreader::read_se;
use naliu_core::{NaliuError, NaliuResult};

const SEI_RECOVERY_POINT: u32 = 6;

/// HEVC recovery point SEI 载荷
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HevcRecoveryPoint {
    /// recovery_poc_cnt (以 POC 计的恢复距离, 可为负)
    pub recovery_poc_cnt: i32,
    /// exact_match_flag
    pub exact_match_flag: bool,
    /// broken_link_flag
    pub broken_link_flag: bool,
}

/// 单条 SEI 消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HevcSeiMessage {
    /// recovery point (payload type 6)
    RecoveryPoint(HevcRecoveryPoint),
    /// 其他类型 (原样保留, 不解析)
    Other {
        /// payload type
        payload_type: u32,
    },
}

/// 遍历 SEI RBSP 中的全部消息
pub fn parse_hevc_sei(rbsp: &[u8]) -> NaliuResult<Vec<HevcSeiMessage>> {
    let mut messages = Vec::new();
    let mut offset = 0usize;

    while offset < rbsp.len() {
        if is_rbsp_trailing_bits(&rbsp[offset..]) {
            break;
        }

        let payload_type = read_ff_coded_value(rbsp, &mut offset, "payload_type")?;
        let payload_size = read_ff_coded_value(rbsp, &mut offset, "payload_size")? as usize;
        let payload_end = offset.checked_add(payload_size).ok_or_else(|| {
            NaliuError::InvalidData(format!("HEVC: SEI payload_size 溢出, value={payload_size}"))
        })?;
        if payload_end > rbsp.len() {
            return Err(NaliuError::InvalidData(format!(
                "HEVC: SEI payload 截断, type={payload_type}, size={payload_size}, remain={}",
                rbsp.len().saturating_sub(offset)
            )));
        }
        let payload = &rbsp[offset..payload_end];
        offset = payload_end;

        let message = match payload_type {
            SEI_RECOVERY_POINT => HevcSeiMessage::RecoveryPoint(parse_recovery_point(payload)?),
            _ => HevcSeiMessage::Other { payload_type },
        };
        messages.push(message);
    }

    Ok(messages)
}

fn is_rbsp_trailing_bits(rest: &[u8]) -> bool {
    if rest.is_empty() {
        return true;
    }
    rest[0] == 0x80 && rest[1..].iter().all(|v| *v == 0)
}

fn read_ff_coded_value(data: &[u8], offset: &mut usize, name: &str) -> NaliuResult<u32> {
    let mut value = 0u32;
    loop {
        let byte = *data
            .get(*offset)
            .ok_or_else(|| NaliuError::InvalidData(format!("HEVC: SEI {name} 截断")))?;
        *offset += 1;
        value = value
            .checked_add(u32::from(byte))
            .ok_or_else(|| NaliuError::InvalidData(format!("HEVC: SEI {name} 溢出")))?;
        if byte != 0xFF {
            break;
        }
    }
    Ok(value)
}

fn parse_recovery_point(payload: &[u8]) -> NaliuResult<HevcRecoveryPoint> {
    let mut br = BitReader::new(payload);
    let recovery_poc_cnt = read_se(&mut br)?;
    let exact_match_flag = br.read_flag()?;
    let broken_link_flag = br.read_flag()?;
    Ok(HevcRecoveryPoint {
        recovery_poc_cnt,
        exact_match_flag,
        broken_link_flag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use naliu_core::BitWriter;

    fn build_recovery_point_payload(poc_cnt: i32) -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_se(poc_cnt);
        bw.write_bit(1); // exact_match_flag
        bw.write_bit(0); // broken_link_flag
        bw.finish()
    }

    #[test]
    fn test_parse_recovery_point() {
        let payload = build_recovery_point_payload(2);
        let mut rbsp = vec![0x06, payload.len() as u8];
        rbsp.extend_from_slice(&payload);
        rbsp.push(0x80);

        let messages = parse_hevc_sei(&rbsp).expect("SEI 解析失败");
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            HevcSeiMessage::RecoveryPoint(rp) => {
                assert_eq!(rp.recovery_poc_cnt, 2);
                assert!(rp.exact_match_flag);
            }
            other => panic!("应为 RecoveryPoint, actual={:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_message() {
        let rbsp = [0x01, 0x02, 0xAA, 0xBB, 0x80];
        let messages = parse_hevc_sei(&rbsp).unwrap();
        assert_eq!(messages[0], HevcSeiMessage::Other { payload_type: 1 });
    }

    #[test]
    fn test_parse_sei_reject_truncated() {
        let rbsp = [0x06, 0x08, 0xAA];
        assert!(parse_hevc_sei(&rbsp).is_err());
    }
}
