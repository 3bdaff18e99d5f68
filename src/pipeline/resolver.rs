//! # 转换单元解析
//!
//! 把描述文件及其依赖文件组合成一个 `ConversionUnit`。
//!
//! ## 功能
//! - cue sheet: 解析每个 `FILE` 子句，相对 cue 所在目录定位轨道文件
//! - 保持 cue 中的轨道顺序
//! - 精确大小写找不到时，退回到目录内唯一的大小写不敏感匹配
//! - 任一轨道缺失即返回 `MissingTrack`，单元不会被部分处理
//! - N64: 大端（.z64）ROM 标记为规范布局，不再交给字节序转换工具
//!
//! ## 依赖关系
//! - 被 `batch/planner.rs` 使用
//! - 使用 `parsers/`

use crate::error::UnitError;
use crate::models::{ConversionUnit, FormatKind};
use crate::parsers::{self, cue::CueSheet, signature::N64ByteOrder};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// cue 中引用的一个文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRef {
    /// cue 中写的名字
    pub name: String,
    /// 实际找到的路径
    pub path: Option<PathBuf>,
}

/// cue 内的文件名统一成本地路径分隔符
fn normalize_name(name: &str) -> PathBuf {
    if std::path::MAIN_SEPARATOR == '/' {
        PathBuf::from(name.replace('\\', "/"))
    } else {
        PathBuf::from(name)
    }
}

/// 在目录中查找唯一的大小写不敏感匹配
fn find_case_insensitive(candidate: &Path) -> Option<PathBuf> {
    let dir = candidate.parent()?;
    let wanted = candidate.file_name()?.to_string_lossy().to_lowercase();

    let mut found = fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().to_lowercase() == wanted)
        .map(|e| e.path())
        .filter(|p| p.is_file());

    let first = found.next()?;
    if found.next().is_some() {
        return None;
    }
    Some(first)
}

/// 定位 cue 引用的所有文件，顺序与 cue 中一致
pub fn resolve_tracks(cue_path: &Path, sheet: &CueSheet) -> Vec<TrackRef> {
    let base = cue_path.parent().unwrap_or(Path::new("."));

    sheet
        .file_names()
        .into_iter()
        .map(|name| {
            let candidate = base.join(normalize_name(name));
            let path = if candidate.is_file() {
                Some(candidate)
            } else {
                find_case_insensitive(&candidate)
            };
            TrackRef {
                name: name.to_string(),
                path,
            }
        })
        .collect()
}

/// 为描述文件构建转换单元
pub fn resolve_unit(descriptor: &Path, kind: FormatKind) -> Result<ConversionUnit, UnitError> {
    match kind {
        FormatKind::CueBin => {}
        FormatKind::N64Rom => {
            let order = parsers::n64_byte_order_of(descriptor)?;
            tracing::debug!("{}: byte order {:?}", descriptor.display(), order);
            let canonical = order == Some(N64ByteOrder::BigEndian);
            return Ok(ConversionUnit::single(descriptor, kind).canonical(canonical));
        }
        _ => return Ok(ConversionUnit::single(descriptor, kind)),
    }

    let sheet = parsers::read_cue_sheet(descriptor)?.ok_or_else(|| {
        UnitError::UnreadableInput {
            path: descriptor.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, "not a valid cue sheet"),
        }
    })?;

    let mut dependents = Vec::new();
    for track in resolve_tracks(descriptor, &sheet) {
        let path = track.path.ok_or_else(|| UnitError::MissingTrack {
            cue: descriptor.to_path_buf(),
            track: track.name.clone(),
        })?;

        // 存在但不可读同样拒绝
        fs::File::open(&path).map_err(|source| UnitError::UnreadableInput {
            path: path.clone(),
            source,
        })?;

        dependents.push(path);
    }

    tracing::debug!(
        "{}: {} files, {} tracks",
        descriptor.display(),
        dependents.len(),
        sheet.track_count()
    );
    Ok(ConversionUnit::with_dependents(descriptor, dependents, kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;
    use tempfile::tempdir;

    fn write_cue(dir: &Path, name: &str, tracks: &[&str]) -> PathBuf {
        let mut content = String::new();
        for (i, track) in tracks.iter().enumerate() {
            content.push_str(&format!(
                "FILE \"{}\" BINARY\n  TRACK {:02} MODE2/2352\n    INDEX 01 00:00:00\n",
                track,
                i + 1
            ));
        }
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_resolve_tracks_in_cue_order() {
        let dir = tempdir().unwrap();
        let names = ["Game (Track 3).bin", "Game (Track 1).bin", "Game (Track 2).bin"];
        for name in names {
            fs::write(dir.path().join(name), b"data").unwrap();
        }
        let cue = write_cue(dir.path(), "Game.cue", &names);

        let unit = resolve_unit(&cue, FormatKind::CueBin).unwrap();
        assert_eq!(unit.descriptor(), cue.as_path());
        assert_eq!(unit.dependents().len(), 3);
        let resolved: Vec<_> = unit
            .dependents()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(resolved, names);
    }

    #[test]
    fn test_missing_track_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("present.bin"), b"data").unwrap();
        let cue = write_cue(dir.path(), "broken.cue", &["present.bin", "missing.bin"]);

        let err = resolve_unit(&cue, FormatKind::CueBin).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingTrack);
        assert!(err.to_string().contains("missing.bin"));
    }

    #[test]
    fn test_case_insensitive_fallback() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("GAME.BIN"), b"data").unwrap();
        let cue = write_cue(dir.path(), "game.cue", &["game.bin"]);

        let unit = resolve_unit(&cue, FormatKind::CueBin).unwrap();
        assert_eq!(unit.dependents()[0], dir.path().join("GAME.BIN"));
    }

    #[test]
    fn test_subdirectory_track_with_backslash() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("tracks")).unwrap();
        fs::write(dir.path().join("tracks").join("t1.bin"), b"data").unwrap();
        let cue = write_cue(dir.path(), "game.cue", &["tracks\\t1.bin"]);

        let unit = resolve_unit(&cue, FormatKind::CueBin).unwrap();
        assert!(unit.dependents()[0].ends_with("t1.bin"));
    }

    #[test]
    fn test_n64_byte_order_marks_canonical() {
        use crate::parsers::signature::fixtures::n64_rom;

        let dir = tempdir().unwrap();
        let z64 = dir.path().join("game.z64");
        let v64 = dir.path().join("game.v64");
        fs::write(&z64, n64_rom([0x80, 0x37, 0x12, 0x40])).unwrap();
        fs::write(&v64, n64_rom([0x37, 0x80, 0x40, 0x12])).unwrap();

        assert!(resolve_unit(&z64, FormatKind::N64Rom).unwrap().is_canonical());
        assert!(!resolve_unit(&v64, FormatKind::N64Rom).unwrap().is_canonical());
    }

    #[test]
    fn test_single_file_unit() {
        let unit = resolve_unit(Path::new("/roms/game.iso"), FormatKind::RawIso).unwrap();
        assert!(unit.dependents().is_empty());
        assert_eq!(unit.kind(), FormatKind::RawIso);
    }
}
