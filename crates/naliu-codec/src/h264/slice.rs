//! H.264 slice header 解析与 POC 推导.
//!
//! 只解析到 POC 语法字段为止 — 导入不需要参考列表、权重表等
//! 后续语法. POC 推导覆盖全部三种 pic_order_cnt_type.

use std::collections::HashMap;

use naliu_core::BitReader;
use naliu_core::bitreader::{read_se, read_ue};
use naliu_core::{NaliuError, NaliuResult};

use super::nal::{NalHeader, NalUnitType};
use super::pps::Pps;
use super::sps::Sps;

/// slice 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    /// 前向预测
    P,
    /// 双向预测
    B,
    /// 帧内
    I,
    /// 切换 P (SP)
    Sp,
    /// 切换 I (SI)
    Si,
}

impl SliceType {
    /// 从 slice_type 语法值创建 (5-9 与 0-4 同义)
    pub fn from_raw(raw: u32) -> NaliuResult<Self> {
        match raw % 5 {
            0 => Ok(Self::P),
            1 => Ok(Self::B),
            2 => Ok(Self::I),
            3 => Ok(Self::Sp),
            4 => Ok(Self::Si),
            _ => Err(NaliuError::InvalidData(format!(
                "H264: slice_type 非法, value={}",
                raw
            ))),
        }
    }

    /// 是否为帧内类型 (I / SI)
    pub fn is_intra(&self) -> bool {
        matches!(self, Self::I | Self::Si)
    }
}

/// slice header 解析结果 (到 POC 字段为止)
#[derive(Debug, Clone)]
pub struct SliceHeader {
    /// first_mb_in_slice (0 表示图像第一个 slice)
    pub first_mb: u32,
    /// slice 类型
    pub slice_type: SliceType,
    /// 引用的 pic_parameter_set_id
    pub pps_id: u32,
    /// frame_num
    pub frame_num: u32,
    /// field_pic_flag
    pub field_pic: bool,
    /// bottom_field_flag
    pub bottom_field: bool,
    /// 是否为 IDR slice
    pub is_idr: bool,
    /// nal_ref_idc
    pub nal_ref_idc: u8,
    /// pic_order_cnt_lsb (仅 poc_type==0)
    pub pic_order_cnt_lsb: Option<u32>,
    /// delta_pic_order_cnt_bottom (仅 poc_type==0 且 pic_order_present)
    pub delta_poc_bottom: i32,
    /// delta_pic_order_cnt[0] (仅 poc_type==1)
    pub delta_poc_0: i32,
    /// delta_pic_order_cnt[1] (仅 poc_type==1 且 pic_order_present)
    pub delta_poc_1: i32,
}

/// 解析 slice header 前缀
///
/// `sps_map`/`pps_map` 为已解析参数集的 id 索引. PPS 或其引用的
/// SPS 缺失时返回错误 (该 NAL 由调用方跳过).
pub fn parse_slice_header(
    rbsp: &[u8],
    header: NalHeader,
    sps_map: &HashMap<u32, Sps>,
    pps_map: &HashMap<u32, Pps>,
) -> NaliuResult<SliceHeader> {
    let mut br = BitReader::new(rbsp);

    let first_mb = read_ue(&mut br)?;
    let slice_type_raw = read_ue(&mut br)?;
    if slice_type_raw > 9 {
        return Err(NaliuError::InvalidData(format!(
            "H264: slice_type 非法, value={}",
            slice_type_raw
        )));
    }
    let slice_type = SliceType::from_raw(slice_type_raw)?;

    let pps_id = read_ue(&mut br)?;
    let pps = pps_map
        .get(&pps_id)
        .ok_or_else(|| NaliuError::InvalidData(format!("H264: 未找到 PPS id={}", pps_id)))?;
    let sps = sps_map
        .get(&pps.sps_id)
        .ok_or_else(|| NaliuError::InvalidData(format!("H264: 未找到 SPS id={}", pps.sps_id)))?;

    let frame_num = br.read_bits(sps.log2_max_frame_num)?;

    let mut field_pic = false;
    let mut bottom_field = false;
    if !sps.frame_mbs_only {
        field_pic = br.read_flag()?;
        if field_pic {
            bottom_field = br.read_flag()?;
        }
    }

    let is_idr = header.nal_type == NalUnitType::SliceIdr;
    if is_idr {
        let _idr_pic_id = read_ue(&mut br)?;
    }

    let mut pic_order_cnt_lsb = None;
    let mut delta_poc_bottom = 0i32;
    let mut delta_poc_0 = 0i32;
    let mut delta_poc_1 = 0i32;
    if sps.poc_type == 0 {
        pic_order_cnt_lsb = Some(br.read_bits(sps.log2_max_poc_lsb)?);
        if pps.pic_order_present && !field_pic {
            delta_poc_bottom = read_se(&mut br)?;
        }
    } else if sps.poc_type == 1 && !sps.delta_pic_order_always_zero_flag {
        delta_poc_0 = read_se(&mut br)?;
        if pps.pic_order_present && !field_pic {
            delta_poc_1 = read_se(&mut br)?;
        }
    }

    Ok(SliceHeader {
        first_mb,
        slice_type,
        pps_id,
        frame_num,
        field_pic,
        bottom_field,
        is_idr,
        nal_ref_idc: header.ref_idc,
        pic_order_cnt_lsb,
        delta_poc_bottom,
        delta_poc_0,
        delta_poc_1,
    })
}

/// POC 推导状态
///
/// 跨 slice 持续累积, 随导入会话整体重建 (时基重检测重启时不保留).
#[derive(Debug, Default)]
pub struct PocState {
    prev_ref_poc_msb: i32,
    prev_ref_poc_lsb: i32,
    prev_frame_num: u32,
    prev_frame_num_offset_type1: i32,
    prev_frame_num_offset_type2: i32,
}

impl PocState {
    /// 创建初始状态
    pub fn new() -> Self {
        Self::default()
    }

    /// 计算当前 slice 的 POC
    pub fn compute(&mut self, sps: &Sps, header: &SliceHeader) -> i32 {
        if header.is_idr {
            self.prev_ref_poc_msb = 0;
            self.prev_ref_poc_lsb = 0;
            self.prev_frame_num_offset_type1 = 0;
            self.prev_frame_num_offset_type2 = 0;
        }

        let poc = match sps.poc_type {
            0 => self.compute_type0(sps, header),
            1 => self.compute_type1(sps, header),
            2 => self.compute_type2(sps, header),
            _ => header.frame_num as i32,
        };
        self.prev_frame_num = header.frame_num;
        poc
    }

    fn compute_type0(&mut self, sps: &Sps, header: &SliceHeader) -> i32 {
        let Some(poc_lsb_u32) = header.pic_order_cnt_lsb else {
            return header.frame_num as i32;
        };
        let max_poc_lsb = 1i32 << sps.log2_max_poc_lsb.min(30);
        let poc_lsb = poc_lsb_u32 as i32;

        let mut poc_msb = self.prev_ref_poc_msb;
        if !header.is_idr {
            if poc_lsb < self.prev_ref_poc_lsb
                && (self.prev_ref_poc_lsb - poc_lsb) >= (max_poc_lsb / 2)
            {
                poc_msb += max_poc_lsb;
            } else if poc_lsb > self.prev_ref_poc_lsb
                && (poc_lsb - self.prev_ref_poc_lsb) > (max_poc_lsb / 2)
            {
                poc_msb -= max_poc_lsb;
            }
        }

        let poc = poc_msb + poc_lsb + header.delta_poc_bottom;
        if header.nal_ref_idc != 0 {
            self.prev_ref_poc_msb = poc_msb;
            self.prev_ref_poc_lsb = poc_lsb;
        }
        poc
    }

    fn compute_type1(&mut self, sps: &Sps, header: &SliceHeader) -> i32 {
        let max_frame_num = 1i32 << sps.log2_max_frame_num.min(16);
        let frame_num = header.frame_num as i32;
        let prev_num = self.prev_frame_num as i32;
        let mut frame_num_offset = if header.is_idr {
            0
        } else {
            self.prev_frame_num_offset_type1
        };
        if !header.is_idr && prev_num > frame_num {
            frame_num_offset += max_frame_num;
        }

        let mut abs_frame_num = if sps.max_num_ref_frames == 0 {
            0
        } else {
            frame_num_offset + frame_num
        };
        if header.nal_ref_idc == 0 && abs_frame_num > 0 {
            abs_frame_num -= 1;
        }

        let mut expected_poc = 0i32;
        if abs_frame_num > 0 && !sps.offset_for_ref_frame.is_empty() {
            let cycle_len = sps.offset_for_ref_frame.len() as i32;
            let expected_delta_per_cycle: i32 = sps.offset_for_ref_frame.iter().sum();
            let cycle_cnt = (abs_frame_num - 1) / cycle_len;
            let frame_num_in_cycle = (abs_frame_num - 1) % cycle_len;
            expected_poc = cycle_cnt * expected_delta_per_cycle;
            for i in 0..=frame_num_in_cycle {
                expected_poc += sps.offset_for_ref_frame[i as usize];
            }
        }
        if header.nal_ref_idc == 0 {
            expected_poc += sps.offset_for_non_ref_pic;
        }

        let top = expected_poc + header.delta_poc_0;
        let bottom = top + sps.offset_for_top_to_bottom_field + header.delta_poc_1;
        if header.nal_ref_idc != 0 {
            self.prev_frame_num_offset_type1 = frame_num_offset;
        }
        top.min(bottom)
    }

    fn compute_type2(&mut self, sps: &Sps, header: &SliceHeader) -> i32 {
        let max_frame_num = 1i32 << sps.log2_max_frame_num.min(16);
        let frame_num = header.frame_num as i32;
        let prev_num = self.prev_frame_num as i32;
        let mut frame_num_offset = if header.is_idr {
            0
        } else {
            self.prev_frame_num_offset_type2
        };
        if !header.is_idr && prev_num > frame_num {
            frame_num_offset += max_frame_num;
        }

        let mut poc = 2 * (frame_num_offset + frame_num);
        if header.nal_ref_idc == 0 {
            poc -= 1;
        }
        if header.nal_ref_idc != 0 {
            self.prev_frame_num_offset_type2 = frame_num_offset;
        }
        poc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h264::nal::parse_header;
    use naliu_core::BitWriter;

    fn minimal_sps(poc_type: u32) -> Sps {
        Sps {
            profile_idc: 66,
            constraint_set_flags: 0,
            level_idc: 30,
            sps_id: 0,
            chroma_format_idc: 1,
            bit_depth_luma: 8,
            bit_depth_chroma: 8,
            log2_max_frame_num: 8,
            poc_type,
            log2_max_poc_lsb: 8,
            delta_pic_order_always_zero_flag: false,
            offset_for_non_ref_pic: 0,
            offset_for_top_to_bottom_field: 0,
            offset_for_ref_frame: Vec::new(),
            max_num_ref_frames: 2,
            frame_mbs_only: true,
            width: 640,
            height: 480,
            timing: None,
        }
    }

    fn minimal_pps() -> Pps {
        Pps {
            pps_id: 0,
            sps_id: 0,
            entropy_coding_mode: false,
            pic_order_present: false,
        }
    }

    fn build_slice_rbsp(first_mb: u32, slice_type: u32, frame_num: u32, poc_lsb: u32) -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_ue(first_mb);
        bw.write_ue(slice_type);
        bw.write_ue(0); // pps_id
        bw.write_bits(frame_num, 8);
        bw.write_bits(poc_lsb, 8); // pic_order_cnt_lsb (poc_type 0)
        bw.write_bit(1); // 填充
        bw.finish()
    }

    fn build_idr_slice_rbsp(poc_lsb: u32) -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_ue(0); // first_mb
        bw.write_ue(7); // slice_type = 7 (I, 全图一致)
        bw.write_ue(0); // pps_id
        bw.write_bits(0, 8); // frame_num
        bw.write_ue(0); // idr_pic_id
        bw.write_bits(poc_lsb, 8);
        bw.write_bit(1);
        bw.finish()
    }

    fn maps() -> (HashMap<u32, Sps>, HashMap<u32, Pps>) {
        let mut sps_map = HashMap::new();
        sps_map.insert(0, minimal_sps(0));
        let mut pps_map = HashMap::new();
        pps_map.insert(0, minimal_pps());
        (sps_map, pps_map)
    }

    #[test]
    fn test_slice_type_aliases() {
        assert_eq!(SliceType::from_raw(0).unwrap(), SliceType::P);
        assert_eq!(SliceType::from_raw(5).unwrap(), SliceType::P);
        assert_eq!(SliceType::from_raw(1).unwrap(), SliceType::B);
        assert_eq!(SliceType::from_raw(2).unwrap(), SliceType::I);
        assert_eq!(SliceType::from_raw(7).unwrap(), SliceType::I);
        assert!(SliceType::from_raw(7).unwrap().is_intra());
        assert!(!SliceType::from_raw(6).unwrap().is_intra());
    }

    #[test]
    fn test_parse_p_slice_header() {
        let (sps_map, pps_map) = maps();
        let header = parse_header(&[0x41]).unwrap(); // ref_idc=2, type=1
        let rbsp = build_slice_rbsp(0, 5, 1, 2);
        let sh = parse_slice_header(&rbsp, header, &sps_map, &pps_map).expect("slice 解析失败");
        assert_eq!(sh.first_mb, 0);
        assert_eq!(sh.slice_type, SliceType::P);
        assert_eq!(sh.frame_num, 1);
        assert_eq!(sh.pic_order_cnt_lsb, Some(2));
        assert!(!sh.is_idr);
    }

    #[test]
    fn test_parse_idr_slice_header() {
        let (sps_map, pps_map) = maps();
        let header = parse_header(&[0x65]).unwrap(); // ref_idc=3, type=5
        let rbsp = build_idr_slice_rbsp(0);
        let sh = parse_slice_header(&rbsp, header, &sps_map, &pps_map).unwrap();
        assert!(sh.is_idr);
        assert_eq!(sh.slice_type, SliceType::I);
    }

    #[test]
    fn test_parse_slice_missing_pps() {
        let (sps_map, _) = maps();
        let header = parse_header(&[0x41]).unwrap();
        let rbsp = build_slice_rbsp(0, 5, 1, 2);
        let err = parse_slice_header(&rbsp, header, &sps_map, &HashMap::new())
            .expect_err("缺少 PPS 应失败");
        assert!(format!("{err}").contains("PPS"));
    }

    #[test]
    fn test_poc_type0_sequence() {
        let sps = minimal_sps(0);
        let mut poc = PocState::new();

        // IDR: poc_lsb=0 → POC 0
        let idr = SliceHeader {
            first_mb: 0,
            slice_type: SliceType::I,
            pps_id: 0,
            frame_num: 0,
            field_pic: false,
            bottom_field: false,
            is_idr: true,
            nal_ref_idc: 3,
            pic_order_cnt_lsb: Some(0),
            delta_poc_bottom: 0,
            delta_poc_0: 0,
            delta_poc_1: 0,
        };
        assert_eq!(poc.compute(&sps, &idr), 0);

        // P: poc_lsb=4 → POC 4
        let p = SliceHeader {
            is_idr: false,
            frame_num: 1,
            pic_order_cnt_lsb: Some(4),
            ..idr.clone()
        };
        assert_eq!(poc.compute(&sps, &p), 4);

        // B (非参考): poc_lsb=2 → POC 2
        let b = SliceHeader {
            is_idr: false,
            frame_num: 2,
            nal_ref_idc: 0,
            pic_order_cnt_lsb: Some(2),
            ..idr.clone()
        };
        assert_eq!(poc.compute(&sps, &b), 2);
    }

    #[test]
    fn test_poc_type0_msb_wraparound() {
        let sps = minimal_sps(0); // log2_max_poc_lsb = 8 → max 256
        let mut poc = PocState::new();

        let mut header = SliceHeader {
            first_mb: 0,
            slice_type: SliceType::P,
            pps_id: 0,
            frame_num: 0,
            field_pic: false,
            bottom_field: false,
            is_idr: true,
            nal_ref_idc: 3,
            pic_order_cnt_lsb: Some(0),
            delta_poc_bottom: 0,
            delta_poc_0: 0,
            delta_poc_1: 0,
        };
        assert_eq!(poc.compute(&sps, &header), 0);

        header.is_idr = false;
        header.pic_order_cnt_lsb = Some(250);
        assert_eq!(poc.compute(&sps, &header), 250);

        // lsb 回绕: 250 → 6, 差值超过 max/2, MSB 应进位
        header.pic_order_cnt_lsb = Some(6);
        assert_eq!(poc.compute(&sps, &header), 262);
    }

    #[test]
    fn test_poc_type2_decode_order() {
        let sps = minimal_sps(2);
        let mut poc = PocState::new();
        let mut header = SliceHeader {
            first_mb: 0,
            slice_type: SliceType::P,
            pps_id: 0,
            frame_num: 0,
            field_pic: false,
            bottom_field: false,
            is_idr: true,
            nal_ref_idc: 3,
            pic_order_cnt_lsb: None,
            delta_poc_bottom: 0,
            delta_poc_0: 0,
            delta_poc_1: 0,
        };
        assert_eq!(poc.compute(&sps, &header), 0);

        header.is_idr = false;
        for n in 1..5u32 {
            header.frame_num = n;
            assert_eq!(poc.compute(&sps, &header), 2 * n as i32, "poc_type=2 应为 2×frame_num");
        }
    }
}
