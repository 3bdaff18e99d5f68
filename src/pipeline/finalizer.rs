//! # 校验与提交
//!
//! 检查后端产物，再不覆盖地把它放到最终位置。
//!
//! ## 功能
//! - 产物必须存在、非空，并以产物类型的魔数开头
//! - 提交在同一文件系统内完成，最终路径上不会出现写了一半的文件
//! - 提交从不覆盖已有文件：优先 `hard_link`（目标存在时由文件系统拒绝），
//!   不支持硬链接的文件系统上退回到持锁检查后 `rename`
//! - 只有提交成功后才按策略删除原文件；删除失败只记为警告
//! - 可选的目录扁平化：产物所在目录只剩它自己时向上移动，不越过扫描根目录
//!
//! ## 依赖关系
//! - 被 `pipeline/mod.rs` 使用
//! - 使用 `pipeline/registry.rs` 的 `ArtifactKind`

use super::registry::ArtifactKind;
use crate::error::UnitError;
use crate::models::ConversionUnit;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// 已提交的产物
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub output: PathBuf,
    pub bytes_written: u64,
    pub warnings: Vec<String>,
}

/// 提交策略，所有工作线程共享
#[derive(Debug, Default)]
pub struct Finalizer {
    /// 提交后删除原文件
    remove_originals: bool,
    /// 扁平化的上限目录
    flatten_root: Option<PathBuf>,
    /// 退回 rename 时串行化“检查再移动”
    place_lock: Mutex<()>,
}

/// 把 `from` 移到 `to`，`to` 已存在时返回 `AlreadyExists`
fn place_new(from: &Path, to: &Path, lock: &Mutex<()>) -> io::Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(from) {
                tracing::debug!("could not unlink {}: {}", from.display(), e);
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        Err(e) => {
            tracing::debug!("hard link to {} failed ({}), using rename", to.display(), e);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            if to.exists() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists", to.display()),
                ));
            }
            fs::rename(from, to)
        }
    }
}

impl Finalizer {
    pub fn new(remove_originals: bool, flatten_root: Option<PathBuf>) -> Self {
        Self {
            remove_originals,
            flatten_root,
            place_lock: Mutex::new(()),
        }
    }

    /// 单元的最终产物路径：原目录下的 `<stem>.<ext>`
    pub fn target_path(unit: &ConversionUnit, artifact: ArtifactKind) -> PathBuf {
        let mut name = unit.stem();
        name.push(".");
        name.push(artifact.extension());
        unit.directory().join(name)
    }

    /// 检查产物，返回其大小
    pub fn verify(path: &Path, artifact: ArtifactKind) -> Result<u64, UnitError> {
        let rejected = |reason: String| UnitError::VerificationFailed {
            path: path.to_path_buf(),
            reason,
        };

        let metadata = fs::metadata(path).map_err(|e| rejected(format!("missing: {}", e)))?;
        if !metadata.is_file() {
            return Err(rejected("not a regular file".to_string()));
        }
        if metadata.len() == 0 {
            return Err(rejected("empty output".to_string()));
        }

        let magic = artifact.magic();
        let mut header = vec![0u8; magic.len()];
        File::open(path)
            .and_then(|mut f| f.read_exact(&mut header))
            .map_err(|e| rejected(format!("cannot read header: {}", e)))?;

        if header != magic {
            return Err(rejected(format!(
                "no {} header",
                artifact.extension().to_uppercase()
            )));
        }

        Ok(metadata.len())
    }

    /// 把已校验的产物移动到最终位置，然后处理原文件
    pub fn commit(
        &self,
        unit: &ConversionUnit,
        staged: &Path,
        target: &Path,
    ) -> Result<Committed, UnitError> {
        let failed = |reason: String| UnitError::FinalizeFailed {
            path: target.to_path_buf(),
            reason,
        };

        let bytes_written = fs::metadata(staged)
            .map(|m| m.len())
            .map_err(|e| failed(e.to_string()))?;
        place_new(staged, target, &self.place_lock).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => failed("target appeared while converting".to_string()),
            _ => failed(e.to_string()),
        })?;
        tracing::debug!("committed {}", target.display());

        let mut committed = Committed {
            output: target.to_path_buf(),
            bytes_written,
            warnings: Vec::new(),
        };

        if !self.remove_originals {
            return Ok(committed);
        }

        for file in unit.files() {
            if let Err(e) = fs::remove_file(file) {
                tracing::warn!("could not remove {}: {}", file.display(), e);
                committed
                    .warnings
                    .push(format!("could not remove {}: {}", file.display(), e));
            }
        }

        Ok(committed)
    }

    /// 工作目录删除之后调用，按需扁平化产物所在目录
    pub fn settle(&self, mut committed: Committed) -> Committed {
        if !self.remove_originals {
            return committed;
        }
        if let Some(root) = &self.flatten_root {
            match flatten(&committed.output, root, &self.place_lock) {
                Ok(Some(moved)) => committed.output = moved,
                Ok(None) => {}
                Err(warning) => {
                    tracing::warn!("{}", warning);
                    committed.warnings.push(warning)
                }
            }
        }
        committed
    }
}

fn is_sole_entry(dir: &Path) -> bool {
    fs::read_dir(dir).map(|rd| rd.count() == 1).unwrap_or(false)
}

/// 向上移动产物，直到目录中还有其他文件或到达 `root`
///
/// 返回新位置；无需移动时返回 `None`。
fn flatten(file: &Path, root: &Path, lock: &Mutex<()>) -> Result<Option<PathBuf>, String> {
    let Some(start) = file.parent() else {
        return Ok(None);
    };
    let Some(name) = file.file_name() else {
        return Ok(None);
    };

    let mut dir = start;
    while dir != root && dir.starts_with(root) && is_sole_entry(dir) {
        match dir.parent() {
            Some(parent) => dir = parent,
            None => break,
        }
    }

    if dir == start {
        return Ok(None);
    }

    let destination = dir.join(name);
    place_new(file, &destination, lock).map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists => {
            format!("not flattened, {} already exists", destination.display())
        }
        _ => format!("could not move to {}: {}", destination.display(), e),
    })?;
    tracing::debug!("flattened {} -> {}", file.display(), destination.display());

    let mut current = start;
    while current != dir {
        if let Err(e) = fs::remove_dir(current) {
            return Err(format!(
                "could not remove empty directory {}: {}",
                current.display(),
                e
            ));
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }

    Ok(Some(destination))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorKind, FormatKind};
    use tempfile::tempdir;

    fn cue_unit(dir: &Path) -> ConversionUnit {
        let cue = dir.join("game.cue");
        let bin = dir.join("game.bin");
        fs::write(&cue, "FILE \"game.bin\" BINARY\n").unwrap();
        fs::write(&bin, vec![1u8; 2352]).unwrap();
        ConversionUnit::with_dependents(cue, vec![bin], FormatKind::CueBin)
    }

    fn staged_chd(dir: &Path) -> PathBuf {
        let work = dir.join(".romcomp-test");
        fs::create_dir_all(&work).unwrap();
        let staged = work.join("game.chd");
        fs::write(&staged, b"MComprHD\0\0\0\x7c").unwrap();
        staged
    }

    #[test]
    fn test_verify() {
        let dir = tempdir().unwrap();
        let good = staged_chd(dir.path());
        assert_eq!(Finalizer::verify(&good, ArtifactKind::Chd).unwrap(), 12);

        let empty = dir.path().join("empty.chd");
        fs::write(&empty, b"").unwrap();
        let err = Finalizer::verify(&empty, ArtifactKind::Chd).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VerificationFailed);
        assert!(err.to_string().contains("empty"));

        let wrong = dir.path().join("wrong.cso");
        fs::write(&wrong, b"not a cso file").unwrap();
        assert!(Finalizer::verify(&wrong, ArtifactKind::Cso).is_err());

        assert!(Finalizer::verify(&dir.path().join("gone.chd"), ArtifactKind::Chd).is_err());
    }

    #[test]
    fn test_target_path() {
        let unit = ConversionUnit::single("/roms/psp/game.iso", FormatKind::RawIso);
        assert_eq!(
            Finalizer::target_path(&unit, ArtifactKind::Cso),
            PathBuf::from("/roms/psp/game.cso")
        );
    }

    #[test]
    fn test_commit_keeps_originals_by_default() {
        let dir = tempdir().unwrap();
        let unit = cue_unit(dir.path());
        let staged = staged_chd(dir.path());
        let target = dir.path().join("game.chd");

        let committed = Finalizer::default().commit(&unit, &staged, &target).unwrap();
        assert_eq!(committed.output, target);
        assert_eq!(committed.bytes_written, 12);
        assert!(committed.warnings.is_empty());
        assert!(!staged.exists());
        assert!(unit.files().all(|f| f.exists()));
    }

    #[test]
    fn test_commit_removes_all_originals() {
        let dir = tempdir().unwrap();
        let unit = cue_unit(dir.path());
        let staged = staged_chd(dir.path());
        let target = dir.path().join("game.chd");

        Finalizer::new(true, None)
            .commit(&unit, &staged, &target)
            .unwrap();
        assert!(target.exists());
        assert!(unit.files().all(|f| !f.exists()));
    }

    #[test]
    fn test_commit_refuses_existing_target() {
        let dir = tempdir().unwrap();
        let unit = cue_unit(dir.path());
        let staged = staged_chd(dir.path());
        let target = dir.path().join("game.chd");
        fs::write(&target, b"older").unwrap();

        let err = Finalizer::new(true, None)
            .commit(&unit, &staged, &target)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FinalizeFailed);
        assert_eq!(fs::read(&target).unwrap(), b"older");
        assert!(unit.files().all(|f| f.exists()));
    }

    #[test]
    fn test_concurrent_commits_to_same_target() {
        let dir = tempdir().unwrap();
        let unit = cue_unit(dir.path());
        let target = dir.path().join("game.chd");
        let staged: Vec<PathBuf> = (0..4)
            .map(|i| {
                let work = dir.path().join(format!(".romcomp-{}", i));
                fs::create_dir_all(&work).unwrap();
                let path = work.join("game.chd");
                fs::write(&path, format!("MComprHD{}", i)).unwrap();
                path
            })
            .collect();

        let finalizer = Finalizer::default();
        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = staged
                .iter()
                .map(|path| {
                    let (finalizer, unit, target) = (&finalizer, &unit, &target);
                    scope.spawn(move || finalizer.commit(unit, path, target))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_ok())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.kind() == ErrorKind::FinalizeFailed));

        // 留在最终位置的是胜出者的产物，其他暂存文件原样保留
        let winner = winners[0];
        assert_eq!(
            fs::read(&target).unwrap(),
            format!("MComprHD{}", winner).into_bytes()
        );
        for (i, path) in staged.iter().enumerate() {
            assert_eq!(path.exists(), i != winner);
        }
    }

    #[test]
    fn test_place_new_never_overwrites() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("new.zip");
        let to = dir.path().join("old.zip");
        fs::write(&from, b"new").unwrap();
        fs::write(&to, b"old").unwrap();

        let err = place_new(&from, &to, &Mutex::new(())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&to).unwrap(), b"old");
        assert!(from.exists());
    }

    #[test]
    fn test_flatten_stops_at_root() {
        let root = tempdir().unwrap();
        let deep = root.path().join("n64").join("Game (USA)");
        fs::create_dir_all(&deep).unwrap();
        let rom = deep.join("game.zip");
        fs::write(&rom, b"PK\x03\x04").unwrap();

        let moved = flatten(&rom, root.path(), &Mutex::new(())).unwrap().unwrap();
        assert_eq!(moved, root.path().join("game.zip"));
        assert!(!root.path().join("n64").exists());
    }

    #[test]
    fn test_settle_flattens_only_when_removing() {
        let root = tempdir().unwrap();
        let sub = root.path().join("Game");
        fs::create_dir_all(&sub).unwrap();
        let output = sub.join("game.chd");
        fs::write(&output, b"MComprHD").unwrap();
        let committed = Committed {
            output: output.clone(),
            bytes_written: 8,
            warnings: vec![],
        };

        let kept = Finalizer::new(false, Some(root.path().to_path_buf())).settle(committed.clone());
        assert_eq!(kept.output, output);

        let moved = Finalizer::new(true, Some(root.path().to_path_buf())).settle(committed);
        assert_eq!(moved.output, root.path().join("game.chd"));
        assert!(moved.warnings.is_empty());
        assert!(!sub.exists());
    }

    #[test]
    fn test_flatten_keeps_shared_directory() {
        let root = tempdir().unwrap();
        let sub = root.path().join("psx");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("a.chd"), b"MComprHD").unwrap();
        fs::write(sub.join("b.chd"), b"MComprHD").unwrap();

        assert_eq!(
            flatten(&sub.join("a.chd"), root.path(), &Mutex::new(())).unwrap(),
            None
        );
    }
}
