//! H.264 PPS (Picture Parameter Set) 解析器.
//!
//! 导入只需要 PPS 的前几个语法元素: id 映射与
//! `bottom_field_pic_order_in_frame_present_flag` (影响 slice header 中
//! POC 增量字段的存在性). 其余语法不解析.

use naliu_core::BitReader;
use naliu_core::bitreader::read_ue;
use naliu_core::{NaliuError, NaliuResult};

/// PPS 解析结果
#[derive(Debug, Clone, Copy)]
pub struct Pps {
    /// pic_parameter_set_id
    pub pps_id: u32,
    /// 引用的 seq_parameter_set_id
    pub sps_id: u32,
    /// entropy_coding_mode_flag (0=CAVLC, 1=CABAC)
    pub entropy_coding_mode: bool,
    /// bottom_field_pic_order_in_frame_present_flag
    pub pic_order_present: bool,
}

/// 解析 PPS RBSP (不含 NAL 头字节)
pub fn parse_pps(rbsp: &[u8]) -> NaliuResult<Pps> {
    if rbsp.is_empty() {
        return Err(NaliuError::InvalidData("H264: PPS RBSP 为空".into()));
    }

    let mut br = BitReader::new(rbsp);

    let pps_id = read_ue(&mut br)?;
    if pps_id > 255 {
        return Err(NaliuError::InvalidData(format!(
            "H264: pps_id 超出范围, pps_id={}",
            pps_id
        )));
    }
    let sps_id = read_ue(&mut br)?;
    if sps_id > 31 {
        return Err(NaliuError::InvalidData(format!(
            "H264: sps_id 超出范围, sps_id={}",
            sps_id
        )));
    }

    let entropy_coding_mode = br.read_flag()?;
    let pic_order_present = br.read_flag()?;

    Ok(Pps {
        pps_id,
        sps_id,
        entropy_coding_mode,
        pic_order_present,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use naliu_core::BitWriter;

    fn build_pps_rbsp(pps_id: u32, sps_id: u32, pic_order_present: bool) -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_ue(pps_id);
        bw.write_ue(sps_id);
        bw.write_bit(1); // entropy_coding_mode_flag
        bw.write_bit(u32::from(pic_order_present));
        // 后续语法导入不关心, 补足 stop bit 即可
        bw.write_ue(0); // num_slice_groups_minus1
        bw.write_bit(1);
        bw.finish()
    }

    #[test]
    fn test_parse_pps_basic() {
        let pps = parse_pps(&build_pps_rbsp(3, 1, false)).expect("PPS 解析失败");
        assert_eq!(pps.pps_id, 3);
        assert_eq!(pps.sps_id, 1);
        assert!(pps.entropy_coding_mode);
        assert!(!pps.pic_order_present);
    }

    #[test]
    fn test_parse_pps_pic_order_present() {
        let pps = parse_pps(&build_pps_rbsp(0, 0, true)).unwrap();
        assert!(pps.pic_order_present);
    }

    #[test]
    fn test_parse_pps_reject_bad_id() {
        let mut bw = BitWriter::new();
        bw.write_ue(256); // pps_id 超出范围
        bw.write_ue(0);
        bw.write_bit(1);
        bw.write_bit(0);
        bw.write_bit(1);
        let err = parse_pps(&bw.finish()).expect_err("pps_id=256 应失败");
        assert!(format!("{err}").contains("pps_id"));
    }

    #[test]
    fn test_parse_pps_reject_empty() {
        assert!(parse_pps(&[]).is_err());
    }
}
