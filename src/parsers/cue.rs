//! # cue sheet 解析器
//!
//! 解析光盘镜像的 cue 描述文件。
//!
//! ## cue 格式说明
//! ```text
//! FILE "Game (Track 1).bin" BINARY
//!   TRACK 01 MODE2/2352
//!     INDEX 01 00:00:00
//! FILE "Game (Track 2).bin" BINARY
//!   TRACK 02 AUDIO
//!     INDEX 00 00:00:00
//!     INDEX 01 00:02:00
//! ```
//!
//! 识别基于语法结构而不是扩展名：至少一个 `FILE` 子句且每个 `FILE`
//! 之后至少有一个 `TRACK`。
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs`（格式嗅探）和 `pipeline/resolver.rs` 使用
//! - 使用 `regex`

use regex::Regex;
use std::sync::OnceLock;

/// 一个 `TRACK` 条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueTrack {
    /// 轨道号 (1-99)
    pub number: u32,
    /// 轨道模式，如 `MODE1/2352`, `AUDIO`
    pub mode: String,
    /// `INDEX` 列表: (索引号, 帧偏移)
    pub indexes: Vec<(u32, u32)>,
}

/// 一个 `FILE` 子句及其下属轨道
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueFile {
    /// cue 中写的文件名（相对 cue 所在目录）
    pub name: String,
    /// 文件类型，如 `BINARY`, `WAVE`
    pub file_type: String,
    pub tracks: Vec<CueTrack>,
}

/// 解析后的 cue sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueSheet {
    pub files: Vec<CueFile>,
}

impl CueSheet {
    /// 按出现顺序列出引用的文件名（去重）
    pub fn file_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for file in &self.files {
            if !names.contains(&file.name.as_str()) {
                names.push(&file.name);
            }
        }
        names
    }

    pub fn track_count(&self) -> usize {
        self.files.iter().map(|f| f.tracks.len()).sum()
    }
}

fn file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)^FILE\s+(?:"([^"]*)"|(\S+))\s+([A-Z0-9]+)$"#).expect("valid regex")
    })
}

fn track_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^TRACK\s+(\d{1,2})\s+(\S+)$").expect("valid regex"))
}

fn index_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^INDEX\s+(\d{1,2})\s+(\d{1,3}):(\d{2}):(\d{2})$").expect("valid regex")
    })
}

/// 从字符串内容解析 cue sheet
///
/// 返回 `None` 表示内容不符合 cue 语法。
pub fn parse_cue_content(content: &str) -> Option<CueSheet> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut files: Vec<CueFile> = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let keyword = line
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_uppercase();

        match keyword.as_str() {
            "FILE" => {
                let caps = file_re().captures(line)?;
                let name = caps.get(1).or_else(|| caps.get(2))?.as_str();
                if name.is_empty() {
                    return None;
                }
                files.push(CueFile {
                    name: name.to_string(),
                    file_type: caps[3].to_ascii_uppercase(),
                    tracks: Vec::new(),
                });
            }
            "TRACK" => {
                let caps = track_re().captures(line)?;
                let number: u32 = caps[1].parse().ok()?;
                if number == 0 {
                    return None;
                }
                // TRACK 必须出现在 FILE 之后
                let file = files.last_mut()?;
                file.tracks.push(CueTrack {
                    number,
                    mode: caps[2].to_ascii_uppercase(),
                    indexes: Vec::new(),
                });
            }
            "INDEX" => {
                let caps = index_re().captures(line)?;
                let track = files.last_mut()?.tracks.last_mut()?;
                let index: u32 = caps[1].parse().ok()?;
                let minutes: u32 = caps[2].parse().ok()?;
                let seconds: u32 = caps[3].parse().ok()?;
                let frames: u32 = caps[4].parse().ok()?;
                if seconds >= 60 || frames >= 75 {
                    return None;
                }
                track
                    .indexes
                    .push((index, (minutes * 60 + seconds) * 75 + frames));
            }
            "REM" | "CATALOG" | "CDTEXTFILE" | "FLAGS" | "ISRC" | "PERFORMER" | "POSTGAP"
            | "PREGAP" | "SONGWRITER" | "TITLE" => {}
            _ => return None,
        }
    }

    if files.is_empty() || files.iter().any(|f| f.tracks.is_empty()) {
        return None;
    }

    Some(CueSheet { files })
}

/// 重写 cue 文本中每个 `FILE` 的文件名，其余行原样保留
///
/// 用于把非 `.cue` 命名的描述文件暂存为 chdman 能识别的 `.cue`。
pub fn rewrite_file_names<F>(content: &str, mut rename: F) -> String
where
    F: FnMut(&str) -> String,
{
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut out = String::with_capacity(content.len());

    for line in content.lines() {
        let trimmed = line.trim();
        match file_re().captures(trimmed) {
            Some(caps) => {
                let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
                let indent = &line[..line.len() - line.trim_start().len()];
                out.push_str(&format!("{}FILE \"{}\" {}\n", indent, rename(name), &caps[3]));
            }
            None => {
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTI_TRACK: &str = r#"REM GENRE "Platform"
FILE "Game (USA) (Track 1).bin" BINARY
  TRACK 01 MODE2/2352
    INDEX 01 00:00:00
FILE "Game (USA) (Track 2).bin" BINARY
  TRACK 02 AUDIO
    INDEX 00 00:00:00
    INDEX 01 00:02:00
"#;

    #[test]
    fn test_parse_multi_track() {
        let sheet = parse_cue_content(MULTI_TRACK).unwrap();
        assert_eq!(sheet.files.len(), 2);
        assert_eq!(
            sheet.file_names(),
            vec!["Game (USA) (Track 1).bin", "Game (USA) (Track 2).bin"]
        );
        assert_eq!(sheet.track_count(), 2);
        assert_eq!(sheet.files[0].tracks[0].mode, "MODE2/2352");
        assert_eq!(sheet.files[1].tracks[0].indexes, vec![(0, 0), (1, 150)]);
    }

    #[test]
    fn test_parse_unquoted_and_lowercase() {
        let content = "\u{feff}file game.bin binary\r\n  track 1 mode1/2352\r\n    index 1 00:00:00\r\n";
        let sheet = parse_cue_content(content).unwrap();
        assert_eq!(sheet.file_names(), vec!["game.bin"]);
        assert_eq!(sheet.files[0].file_type, "BINARY");
        assert_eq!(sheet.files[0].tracks[0].number, 1);
    }

    #[test]
    fn test_shared_file_listed_once() {
        let content = r#"FILE "game.bin" BINARY
  TRACK 01 MODE1/2352
    INDEX 01 00:00:00
  TRACK 02 AUDIO
    INDEX 01 10:00:00
"#;
        let sheet = parse_cue_content(content).unwrap();
        assert_eq!(sheet.file_names(), vec!["game.bin"]);
        assert_eq!(sheet.track_count(), 2);
    }

    #[test]
    fn test_reject_non_cue_text() {
        assert!(parse_cue_content("").is_none());
        assert!(parse_cue_content("hello world\n").is_none());
        // TRACK 在 FILE 之前
        assert!(parse_cue_content("TRACK 01 AUDIO\nFILE \"a.bin\" BINARY\n").is_none());
        // FILE 没有轨道
        assert!(parse_cue_content("FILE \"a.bin\" BINARY\n").is_none());
        // 非法时间码
        assert!(parse_cue_content(
            "FILE \"a.bin\" BINARY\n TRACK 01 AUDIO\n INDEX 01 00:61:00\n"
        )
        .is_none());
    }

    #[test]
    fn test_restage_with_absolute_names() {
        let text = rewrite_file_names(MULTI_TRACK, |name| format!("/roms/psx/{}", name));
        assert!(text.starts_with("REM GENRE \"Platform\"\n"));
        let reparsed = parse_cue_content(&text).unwrap();
        assert_eq!(reparsed.files.len(), 2);
        assert_eq!(reparsed.files[0].name, "/roms/psx/Game (USA) (Track 1).bin");
        assert_eq!(reparsed.files[1].tracks[0].indexes, vec![(0, 0), (1, 150)]);
    }
}
