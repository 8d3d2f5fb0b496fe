//! H.264 SEI (Supplemental Enhancement Information) 解析.
//!
//! 导入只消费 recovery point (payload type 6), 用于 open-GOP 与
//! roll-recovery 元数据; 其余消息类型记录为 `Other` 原样复制.

use naliu_core::BitReader;
use naliu_core::bitreader::read_ue;
use naliu_core::{NaliuError, NaliuResult};

const SEI_RECOVERY_POINT: u32 = 6;

/// recovery point SEI 载荷
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPoint {
    /// recovery_frame_cnt: 从该图像起多少帧后可正确显示
    pub recovery_frame_cnt: u32,
    /// exact_match_flag
    pub exact_match_flag: bool,
    /// broken_link_flag
    pub broken_link_flag: bool,
}

/// 单条 SEI 消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeiMessage {
    /// recovery point (payload type 6)
    RecoveryPoint(RecoveryPoint),
    /// 其他类型 (原样保留, 不解析)
    Other {
        /// payload type
        payload_type: u32,
    },
}

/// 遍历 SEI RBSP 中的全部消息
pub fn parse_sei(rbsp: &[u8]) -> NaliuResult<Vec<SeiMessage>> {
    let mut messages = Vec::new();
    let mut offset = 0usize;

    while offset < rbsp.len() {
        if is_rbsp_trailing_bits(&rbsp[offset..]) {
            break;
        }

        let payload_type = read_ff_coded_value(rbsp, &mut offset, "payload_type")?;
        let payload_size_raw = read_ff_coded_value(rbsp, &mut offset, "payload_size")?;
        let payload_size = payload_size_raw as usize;
        let payload_end = offset.checked_add(payload_size).ok_or_else(|| {
            NaliuError::InvalidData(format!("H264: SEI payload_size 溢出, value={payload_size}"))
        })?;
        if payload_end > rbsp.len() {
            return Err(NaliuError::InvalidData(format!(
                "H264: SEI payload 截断, type={payload_type}, size={payload_size}, remain={}",
                rbsp.len().saturating_sub(offset)
            )));
        }
        let payload = &rbsp[offset..payload_end];
        offset = payload_end;

        let message = match payload_type {
            SEI_RECOVERY_POINT => SeiMessage::RecoveryPoint(parse_recovery_point(payload)?),
            _ => SeiMessage::Other { payload_type },
        };
        messages.push(message);
    }

    Ok(messages)
}

/// 判断剩余字节是否只是 rbsp_trailing_bits
fn is_rbsp_trailing_bits(rest: &[u8]) -> bool {
    if rest.is_empty() {
        return true;
    }
    rest[0] == 0x80 && rest[1..].iter().all(|v| *v == 0)
}

/// 读取 0xFF 级联编码值 (SEI payload type/size)
fn read_ff_coded_value(data: &[u8], offset: &mut usize, name: &str) -> NaliuResult<u32> {
    let mut value = 0u32;
    loop {
        let byte = *data
            .get(*offset)
            .ok_or_else(|| NaliuError::InvalidData(format!("H264: SEI {name} 截断")))?;
        *offset += 1;
        value = value
            .checked_add(u32::from(byte))
            .ok_or_else(|| NaliuError::InvalidData(format!("H264: SEI {name} 溢出")))?;
        if byte != 0xFF {
            break;
        }
    }
    Ok(value)
}

fn parse_recovery_point(payload: &[u8]) -> NaliuResult<RecoveryPoint> {
    let mut br = BitReader::new(payload);
    let recovery_frame_cnt = read_ue(&mut br)?;
    let exact_match_flag = br.read_flag()?;
    let broken_link_flag = br.read_flag()?;
    let _changing_slice_group_idc = br.read_bits(2)?;
    Ok(RecoveryPoint {
        recovery_frame_cnt,
        exact_match_flag,
        broken_link_flag,
    })
}
