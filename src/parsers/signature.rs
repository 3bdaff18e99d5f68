//! # 二进制签名识别
//!
//! 根据文件头部固定偏移处的魔数识别二进制镜像格式。
//!
//! | 格式 | 偏移 | 魔数 |
//! |------|------|------|
//! | CHD | 0x0000 | `MComprHD` |
//! | Wii | 0x0018 | `5D 1C 9E A3` |
//! | GameCube | 0x001C | `C2 33 9F 3D` |
//! | ISO 9660 | 0x8001 | `CD001` |
//! | N64 (z64/v64/n64) | 0x0000 | `80 37 12 40` 的三种字节序 |
//! | NDS | 0x015C | logo CRC `56 CF`，且 0x015E 处的头部 CRC 与 0x000..0x15D 相符 |
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs` 使用

use crate::models::FormatKind;

/// 需要读取的文件头长度，覆盖所有签名偏移
pub const PROBE_LEN: usize = 0x8800;

const CHD_MAGIC: &[u8] = b"MComprHD";
const WII_MAGIC: [u8; 4] = [0x5D, 0x1C, 0x9E, 0xA3];
const GAMECUBE_MAGIC: [u8; 4] = [0xC2, 0x33, 0x9F, 0x3D];
const ISO9660_OFFSET: usize = 0x8001;
const ISO9660_MAGIC: &[u8] = b"CD001";
const NDS_LOGO_CRC: [u8; 2] = [0x56, 0xCF];
const NDS_HEADER_CRC_OFFSET: usize = 0x15E;

/// N64 ROM 字节序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum N64ByteOrder {
    /// .z64 原生大端
    BigEndian,
    /// .v64 16 位交换
    ByteSwapped,
    /// .n64 小端
    LittleEndian,
}

fn at(buf: &[u8], offset: usize, magic: &[u8]) -> bool {
    buf.get(offset..offset + magic.len()) == Some(magic)
}

pub fn is_chd(buf: &[u8]) -> bool {
    at(buf, 0, CHD_MAGIC)
}

pub fn is_nintendo_disc(buf: &[u8]) -> bool {
    at(buf, 0x18, &WII_MAGIC) || at(buf, 0x1C, &GAMECUBE_MAGIC)
}

pub fn is_iso9660(buf: &[u8]) -> bool {
    at(buf, ISO9660_OFFSET, ISO9660_MAGIC)
}

pub fn n64_byte_order(buf: &[u8]) -> Option<N64ByteOrder> {
    match buf.get(0..4)? {
        [0x80, 0x37, 0x12, 0x40] => Some(N64ByteOrder::BigEndian),
        [0x37, 0x80, 0x40, 0x12] => Some(N64ByteOrder::ByteSwapped),
        [0x40, 0x12, 0x37, 0x80] => Some(N64ByteOrder::LittleEndian),
        _ => None,
    }
}

/// CRC-16/MODBUS（反射多项式 0xA001，初值 0xFFFF），NDS 头部校验使用的算法
pub fn crc16_modbus(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFF, |crc, &byte| {
        (0..8).fold(crc ^ u16::from(byte), |crc, _| {
            if crc & 1 != 0 {
                (crc >> 1) ^ 0xA001
            } else {
                crc >> 1
            }
        })
    })
}

/// logo CRC 只有两个字节，必须再核对头部 CRC 才算 NDS
pub fn is_nds(buf: &[u8]) -> bool {
    if !at(buf, 0x15C, &NDS_LOGO_CRC) {
        return false;
    }
    let Some(stored) = buf.get(NDS_HEADER_CRC_OFFSET..NDS_HEADER_CRC_OFFSET + 2) else {
        return false;
    };
    let stored = u16::from_le_bytes([stored[0], stored[1]]);
    crc16_modbus(&buf[..NDS_HEADER_CRC_OFFSET]) == stored
}

/// 按固定优先级检查全部二进制签名
///
/// 返回所有命中的格式，调用方决定如何处理多重命中。
pub fn match_binary(buf: &[u8]) -> Vec<FormatKind> {
    let checks: [(FormatKind, bool); 5] = [
        (FormatKind::Chd, is_chd(buf)),
        (FormatKind::WiiIso, is_nintendo_disc(buf)),
        (FormatKind::RawIso, is_iso9660(buf)),
        (FormatKind::N64Rom, n64_byte_order(buf).is_some()),
        (FormatKind::NdsRom, is_nds(buf)),
    ];

    checks
        .into_iter()
        .filter(|(_, hit)| *hit)
        .map(|(kind, _)| kind)
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_signatures() {
        assert_eq!(match_binary(&fixtures::iso_image()), vec![FormatKind::RawIso]);
        assert_eq!(match_binary(&fixtures::wii_image()), vec![FormatKind::WiiIso]);
        assert_eq!(match_binary(&fixtures::nds_rom()), vec![FormatKind::NdsRom]);

        let mut chd = b"MComprHD".to_vec();
        chd.resize(124, 0);
        assert_eq!(match_binary(&chd), vec![FormatKind::Chd]);
    }

    #[test]
    fn test_n64_byte_orders() {
        let z64 = fixtures::n64_rom([0x80, 0x37, 0x12, 0x40]);
        let v64 = fixtures::n64_rom([0x37, 0x80, 0x40, 0x12]);
        let n64 = fixtures::n64_rom([0x40, 0x12, 0x37, 0x80]);
        assert_eq!(n64_byte_order(&z64), Some(N64ByteOrder::BigEndian));
        assert_eq!(n64_byte_order(&v64), Some(N64ByteOrder::ByteSwapped));
        assert_eq!(n64_byte_order(&n64), Some(N64ByteOrder::LittleEndian));
        assert_eq!(match_binary(&v64), vec![FormatKind::N64Rom]);
    }

    #[test]
    fn test_crc16_modbus_check_value() {
        assert_eq!(crc16_modbus(b"123456789"), 0x4B37);
        assert_eq!(crc16_modbus(&[]), 0xFFFF);
    }

    #[test]
    fn test_nds_logo_without_header_crc() {
        // 任意数据在 0x15C 恰好是 56 CF
        let mut blob: Vec<u8> = (0..0x1000u32).map(|i| (i * 7 + 3) as u8).collect();
        blob[0x15C] = 0x56;
        blob[0x15D] = 0xCF;
        assert!(!is_nds(&blob));
        assert!(match_binary(&blob).is_empty());

        // 头部被改动后 CRC 不再匹配
        let mut rom = fixtures::nds_rom();
        assert!(is_nds(&rom));
        rom[0x20] ^= 0xFF;
        assert!(!is_nds(&rom));

        // 截断在 CRC 字段之前
        assert!(!is_nds(&fixtures::nds_rom()[..0x15E]));
    }

    #[test]
    fn test_short_buffer() {
        assert!(match_binary(&[]).is_empty());
        assert!(match_binary(b"MComp").is_empty());
        assert!(!is_iso9660(&[0u8; 0x8003]));
    }

    #[test]
    fn test_overlapping_signatures_reported() {
        // ISO 9660 卷描述符 + N64 头：两个都命中
        let mut buf = fixtures::iso_image();
        buf[0..4].copy_from_slice(&[0x80, 0x37, 0x12, 0x40]);
        assert_eq!(
            match_binary(&buf),
            vec![FormatKind::RawIso, FormatKind::N64Rom]
        );
    }
}
