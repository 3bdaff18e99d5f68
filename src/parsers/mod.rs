//! # 解析器模块
//!
//! 格式嗅探：只读取文件头部有限字节，按内容判断 `FormatKind`，
//! 不依赖扩展名。
//!
//! ## 识别优先级
//! CHD 头 > Wii/GameCube 魔数 > ISO 9660 > N64 头 > NDS 头 > cue 语法。
//! 恰好命中一种才返回该格式，零个或多个命中都视为 `Unknown`。
//!
//! ## 依赖关系
//! - 被 `batch/planner.rs` 和 `pipeline/resolver.rs` 使用
//! - 子模块: cue, signature

pub mod cue;
pub mod signature;

use crate::error::UnitError;
use crate::models::FormatKind;
use cue::CueSheet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// cue sheet 的最大长度，超过则不可能是 cue
pub const MAX_CUE_LEN: u64 = 256 * 1024;

/// 读取文件开头最多 `limit` 字节
fn read_prefix(path: &Path, limit: u64) -> Result<Vec<u8>, UnitError> {
    let unreadable = |source| UnitError::UnreadableInput {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(unreadable)?;
    let mut buf = Vec::new();
    file.take(limit).read_to_end(&mut buf).map_err(unreadable)?;
    Ok(buf)
}

/// 文本内容（无 NUL 字节）才尝试按 cue 解析
fn parse_cue_bytes(bytes: &[u8]) -> Option<CueSheet> {
    if bytes.contains(&0) {
        return None;
    }
    cue::parse_cue_content(&String::from_utf8_lossy(bytes))
}

/// 读取并解析 cue sheet，内容不是 cue 时返回 `None`
pub fn read_cue_sheet(path: &Path) -> Result<Option<CueSheet>, UnitError> {
    let bytes = read_prefix(path, MAX_CUE_LEN + 1)?;
    if bytes.len() as u64 > MAX_CUE_LEN {
        return Ok(None);
    }
    Ok(parse_cue_bytes(&bytes))
}

/// N64 ROM 的字节序，文件头不是 N64 时为 `None`
pub fn n64_byte_order_of(path: &Path) -> Result<Option<signature::N64ByteOrder>, UnitError> {
    let header = read_prefix(path, 4)?;
    Ok(signature::n64_byte_order(&header))
}

/// 从文件内容判断格式
pub fn sniff_file(path: &Path) -> Result<FormatKind, UnitError> {
    let prefix_len = signature::PROBE_LEN.max(MAX_CUE_LEN as usize + 1) as u64;
    let buf = read_prefix(path, prefix_len)?;

    let mut matches = signature::match_binary(&buf);
    if buf.len() as u64 <= MAX_CUE_LEN && parse_cue_bytes(&buf).is_some() {
        matches.push(FormatKind::CueBin);
    }

    let kind = match matches.as_slice() {
        [kind] => *kind,
        [] => FormatKind::Unknown,
        many => {
            tracing::debug!(
                "ambiguous signatures {:?} in {}, treating as unknown",
                many,
                path.display()
            );
            FormatKind::Unknown
        }
    };

    Ok(kind)
}
