//! # zip 打包
//!
//! N64 / NDS 后端输出的是未压缩 ROM，这里把它压进单文件 zip。
//! 已是 .z64 布局的 N64 ROM 不经过后端，原文件直接打包。
//!
//! ## 依赖关系
//! - 被 `pipeline/mod.rs` 使用
//! - 使用 `zip` crate（deflate）

use crate::error::UnitError;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// 把 `source` 作为唯一条目写入 `archive`，条目名为源文件名
pub fn zip_single(source: &Path, archive: &Path) -> Result<(), UnitError> {
    let fail = |reason: String| UnitError::FinalizeFailed {
        path: archive.to_path_buf(),
        reason,
    };

    let entry = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| fail(format!("{} has no file name", source.display())))?;

    let input = File::open(source).map_err(|e| UnitError::VerificationFailed {
        path: source.to_path_buf(),
        reason: format!("backend output missing: {}", e),
    })?;
    let size = input.metadata().map(|m| m.len()).unwrap_or(0);

    let output = File::create(archive).map_err(|e| fail(e.to_string()))?;
    let mut zip = ZipWriter::new(BufWriter::new(output));

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(size >= u32::MAX as u64);

    zip.start_file(entry.as_str(), options)
        .map_err(|e| fail(e.to_string()))?;
    io::copy(&mut BufReader::new(input), &mut zip).map_err(|e| fail(e.to_string()))?;

    let mut writer = zip.finish().map_err(|e| fail(e.to_string()))?;
    writer.flush().map_err(|e| fail(e.to_string()))?;

    tracing::debug!("zipped {} as {}", source.display(), archive.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn test_zip_single_entry() {
        let dir = tempdir().unwrap();
        let rom = dir.path().join("Mario Kart 64 (USA).z64");
        let content: Vec<u8> = (0..64 * 1024).map(|i| (i % 7) as u8).collect();
        fs::write(&rom, &content).unwrap();

        let archive = dir.path().join("Mario Kart 64 (USA).zip");
        zip_single(&rom, &archive).unwrap();

        let bytes = fs::read(&archive).unwrap();
        assert!(bytes.starts_with(b"PK\x03\x04"));
        assert!(bytes.len() < content.len());

        let mut reader = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(reader.len(), 1);
        let mut entry = reader.by_index(0).unwrap();
        assert_eq!(entry.name(), "Mario Kart 64 (USA).z64");
        let mut unpacked = Vec::new();
        entry.read_to_end(&mut unpacked).unwrap();
        assert_eq!(unpacked, content);
    }

    #[test]
    fn test_missing_source_is_verification_failure() {
        let dir = tempdir().unwrap();
        let err = zip_single(&dir.path().join("gone.z64"), &dir.path().join("gone.zip"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::models::ErrorKind::VerificationFailed);
        assert!(!dir.path().join("gone.zip").exists());
    }
}
