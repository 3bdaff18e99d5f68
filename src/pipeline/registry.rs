//! # 后端注册表
//!
//! `FormatKind` 到后端描述 `Backend` 的静态映射。
//!
//! | 格式 | 工具 | 产物 |
//! |------|------|------|
//! | cue/bin | `chdman createcd` | `.chd` |
//! | iso | `maxcso`（或 `chdman createdvd`） | `.cso` / `.chd` |
//! | wii/gc | `dolphin-tool convert` | `.rvz` |
//! | n64 | `rom64 convert` + zip（.z64 大端直接 zip） | `.zip` |
//! | nds | `BitButcher -e` + zip | `.zip` |
//!
//! 映射是对枚举的穷尽匹配，新增格式时编译器会要求补全。
//! 注册表在启动时构建一次，之后只读。
//!
//! ## 依赖关系
//! - 被 `pipeline/mod.rs` 和 `commands/` 使用
//! - 使用 `pipeline/tools.rs` 查找可执行文件

use super::tools::{Tool, ToolLocator};
use crate::error::UnknownBackend;
use crate::models::{ConversionUnit, FormatKind};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

/// 参数模板中的一项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg {
    Lit(&'static str),
    /// 输入文件（cue sheet 或单文件）
    Input,
    /// 工作目录中的产物路径
    Output,
    /// 单元的临时工作目录
    WorkDir,
}

/// 工具把结果写到哪里
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Produces {
    /// 写到 `Arg::Output` 指定的路径
    OutputArg,
    /// 写到工作目录，文件名为输入文件主干加给定扩展名
    InWorkdir(&'static str),
    /// 原地修改输入文件，输入必须先复制到工作目录
    InPlace,
}

/// 工具运行后的打包步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packaging {
    None,
    Zip,
}

/// 最终产物类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Chd,
    Cso,
    Rvz,
    Zip,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Chd => "chd",
            ArtifactKind::Cso => "cso",
            ArtifactKind::Rvz => "rvz",
            ArtifactKind::Zip => "zip",
        }
    }

    /// 文件开头应有的魔数
    pub fn magic(self) -> &'static [u8] {
        match self {
            ArtifactKind::Chd => b"MComprHD",
            ArtifactKind::Cso => b"CISO",
            ArtifactKind::Rvz => b"RVZ\x01",
            ArtifactKind::Zip => b"PK\x03\x04",
        }
    }
}

/// 退出码分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Success,
    KnownFailure(&'static str),
    Unknown,
}

/// 退出码策略
#[derive(Debug, PartialEq, Eq)]
pub struct ExitPolicy {
    pub success: &'static [i32],
    pub known_failures: &'static [(i32, &'static str)],
}

impl ExitPolicy {
    /// 被信号终止（没有退出码）总是 `Unknown`
    pub fn classify(&self, status: &ExitStatus) -> ExitClass {
        let Some(code) = status.code() else {
            return ExitClass::Unknown;
        };
        if self.success.contains(&code) {
            return ExitClass::Success;
        }
        self.known_failures
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, meaning)| ExitClass::KnownFailure(*meaning))
            .unwrap_or(ExitClass::Unknown)
    }
}

pub static STANDARD_EXIT_POLICY: ExitPolicy = ExitPolicy {
    success: &[0],
    known_failures: &[(1, "tool reported an error")],
};

/// 不可变的后端描述
#[derive(Debug)]
pub struct Backend {
    pub tool: Tool,
    pub args: &'static [Arg],
    pub produces: Produces,
    pub packaging: Packaging,
    pub artifact: ArtifactKind,
    pub exit_policy: &'static ExitPolicy,
}

impl Backend {
    /// 工具运行完成后的结果文件
    pub fn produced_path(&self, input: &Path, workdir: &Path, output: &Path) -> PathBuf {
        match self.produces {
            Produces::OutputArg => output.to_path_buf(),
            Produces::InWorkdir(ext) => {
                let mut name = input.file_stem().unwrap_or(input.as_os_str()).to_os_string();
                name.push(".");
                name.push(ext);
                workdir.join(name)
            }
            Produces::InPlace => input.to_path_buf(),
        }
    }

    /// 单元已是规范布局且产物是 zip 时，跳过工具只打包
    pub fn is_package_only(&self, unit: &ConversionUnit) -> bool {
        unit.is_canonical() && self.packaging == Packaging::Zip
    }
}

pub static CHDMAN_CD: Backend = Backend {
    tool: Tool::Chdman,
    args: &[
        Arg::Lit("createcd"),
        Arg::Lit("-i"),
        Arg::Input,
        Arg::Lit("-o"),
        Arg::Output,
    ],
    produces: Produces::OutputArg,
    packaging: Packaging::None,
    artifact: ArtifactKind::Chd,
    exit_policy: &STANDARD_EXIT_POLICY,
};

pub static CHDMAN_DVD: Backend = Backend {
    tool: Tool::Chdman,
    args: &[
        Arg::Lit("createdvd"),
        Arg::Lit("-i"),
        Arg::Input,
        Arg::Lit("-o"),
        Arg::Output,
    ],
    produces: Produces::OutputArg,
    packaging: Packaging::None,
    artifact: ArtifactKind::Chd,
    exit_policy: &STANDARD_EXIT_POLICY,
};

pub static MAXCSO: Backend = Backend {
    tool: Tool::Maxcso,
    args: &[Arg::Lit("-o"), Arg::Output, Arg::Input],
    produces: Produces::OutputArg,
    packaging: Packaging::None,
    artifact: ArtifactKind::Cso,
    exit_policy: &STANDARD_EXIT_POLICY,
};

pub static DOLPHIN_RVZ: Backend = Backend {
    tool: Tool::DolphinTool,
    args: &[
        Arg::Lit("convert"),
        Arg::Lit("-b"),
        Arg::Lit("131072"),
        Arg::Lit("-c"),
        Arg::Lit("zstd"),
        Arg::Lit("-f"),
        Arg::Lit("rvz"),
        Arg::Lit("-i"),
        Arg::Input,
        Arg::Lit("-l"),
        Arg::Lit("5"),
        Arg::Lit("-o"),
        Arg::Output,
    ],
    produces: Produces::OutputArg,
    packaging: Packaging::None,
    artifact: ArtifactKind::Rvz,
    exit_policy: &STANDARD_EXIT_POLICY,
};

pub static ROM64: Backend = Backend {
    tool: Tool::Rom64,
    args: &[Arg::Lit("convert"), Arg::Input, Arg::WorkDir],
    produces: Produces::InWorkdir("z64"),
    packaging: Packaging::Zip,
    artifact: ArtifactKind::Zip,
    exit_policy: &STANDARD_EXIT_POLICY,
};

pub static BITBUTCHER: Backend = Backend {
    tool: Tool::BitButcher,
    args: &[Arg::Lit("-e"), Arg::Input],
    produces: Produces::InPlace,
    packaging: Packaging::Zip,
    artifact: ArtifactKind::Zip,
    exit_policy: &STANDARD_EXIT_POLICY,
};

/// raw ISO 镜像使用的后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum IsoTarget {
    /// CSO via maxcso
    #[default]
    Cso,
    /// CHD via chdman createdvd
    Chd,
}

impl std::fmt::Display for IsoTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IsoTarget::Cso => write!(f, "cso"),
            IsoTarget::Chd => write!(f, "chd"),
        }
    }
}

/// 查找到的后端及其可执行文件
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    pub backend: &'static Backend,
    pub program: &'a Path,
}

/// 单元的处理路线
#[derive(Debug, Clone, Copy)]
pub enum Route<'a> {
    /// 运行后端工具，再按 `packaging` 打包
    Tool(Resolved<'a>),
    /// 输入已是规范布局，不运行工具，直接打包
    PackageOnly(&'static Backend),
}

impl Route<'_> {
    pub fn backend(&self) -> &'static Backend {
        match self {
            Route::Tool(resolved) => resolved.backend,
            Route::PackageOnly(backend) => backend,
        }
    }
}

/// 一次具体的后端调用
#[derive(Debug, Clone)]
pub struct Invocation {
    pub tool: Tool,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub exit_policy: &'static ExitPolicy,
}

/// shell 风格的单引号转义，仅用于显示
fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=+,@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

impl Invocation {
    /// 可以复制到 shell 中执行的命令行
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(|a| a.as_os_str()))
            .map(|a| quote(&a.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// 后端注册表
#[derive(Debug)]
pub struct BackendRegistry {
    enabled: HashSet<FormatKind>,
    iso_target: IsoTarget,
    tools: ToolLocator,
}

impl BackendRegistry {
    pub fn new(enabled: HashSet<FormatKind>, iso_target: IsoTarget, tools: ToolLocator) -> Self {
        Self {
            enabled,
            iso_target,
            tools,
        }
    }

    /// 格式对应的静态后端，不检查启用状态和工具
    pub fn backend_of(&self, kind: FormatKind) -> Result<&'static Backend, UnknownBackend> {
        match kind {
            FormatKind::CueBin => Ok(&CHDMAN_CD),
            FormatKind::RawIso => Ok(match self.iso_target {
                IsoTarget::Cso => &MAXCSO,
                IsoTarget::Chd => &CHDMAN_DVD,
            }),
            FormatKind::WiiIso => Ok(&DOLPHIN_RVZ),
            FormatKind::N64Rom => Ok(&ROM64),
            FormatKind::NdsRom => Ok(&BITBUTCHER),
            FormatKind::Chd => Err(UnknownBackend::AlreadyCompressed),
            FormatKind::Unknown => Err(UnknownBackend::NoBackend(kind)),
        }
    }

    /// 查找格式的后端，同时检查格式是否启用、工具是否可用
    pub fn backend_for(&self, kind: FormatKind) -> Result<Resolved<'_>, UnknownBackend> {
        let backend = self.backend_of(kind)?;
        if !self.enabled.contains(&kind) {
            return Err(UnknownBackend::Disabled(kind));
        }
        let program = self
            .tools
            .get(backend.tool)
            .ok_or(UnknownBackend::ToolUnavailable {
                kind,
                tool: backend.tool.executable(),
            })?;
        Ok(Resolved { backend, program })
    }

    /// 单元的处理路线
    ///
    /// 规范布局且产物是 zip 的单元不需要工具，缺少工具也不会跳过。
    pub fn route(&self, unit: &ConversionUnit) -> Result<Route<'_>, UnknownBackend> {
        let kind = unit.kind();
        let backend = self.backend_of(kind)?;
        if backend.is_package_only(unit) {
            if !self.enabled.contains(&kind) {
                return Err(UnknownBackend::Disabled(kind));
            }
            return Ok(Route::PackageOnly(backend));
        }
        self.backend_for(kind).map(Route::Tool)
    }

    /// 已启用但工具缺失的格式
    pub fn missing_tools(&self) -> Vec<(FormatKind, Tool)> {
        FormatKind::CONVERTIBLE
            .iter()
            .filter(|kind| self.enabled.contains(kind))
            .filter_map(|&kind| {
                let backend = self.backend_of(kind).ok()?;
                match self.tools.get(backend.tool) {
                    Some(_) => None,
                    None => Some((kind, backend.tool)),
                }
            })
            .collect()
    }

    /// 用单元的路径填充参数模板
    pub fn invocation(
        &self,
        resolved: &Resolved<'_>,
        input: &Path,
        output: &Path,
        workdir: &Path,
    ) -> Invocation {
        let args = resolved
            .backend
            .args
            .iter()
            .map(|arg| match arg {
                Arg::Lit(s) => OsString::from(*s),
                Arg::Input => input.as_os_str().to_os_string(),
                Arg::Output => output.as_os_str().to_os_string(),
                Arg::WorkDir => workdir.as_os_str().to_os_string(),
            })
            .collect();

        Invocation {
            tool: resolved.backend.tool,
            program: resolved.program.to_path_buf(),
            args,
            exit_policy: resolved.backend.exit_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(enabled: &[FormatKind], iso_target: IsoTarget) -> BackendRegistry {
        let tools = ToolLocator::from_paths(
            Tool::ALL
                .iter()
                .map(|&t| (t, PathBuf::from(format!("/opt/tools/{}", t.executable())))),
        );
        BackendRegistry::new(enabled.iter().copied().collect(), iso_target, tools)
    }

    #[test]
    fn test_backend_lookup() {
        let reg = registry(&FormatKind::CONVERTIBLE, IsoTarget::Cso);

        let resolved = reg.backend_for(FormatKind::CueBin).unwrap();
        assert_eq!(resolved.backend.tool, Tool::Chdman);
        assert_eq!(resolved.backend.artifact, ArtifactKind::Chd);
        assert_eq!(resolved.program, Path::new("/opt/tools/chdman"));

        assert_eq!(
            reg.backend_for(FormatKind::RawIso).unwrap().backend.artifact,
            ArtifactKind::Cso
        );
        assert_eq!(
            reg.backend_for(FormatKind::NdsRom).unwrap().backend.packaging,
            Packaging::Zip
        );
        assert_eq!(
            reg.backend_for(FormatKind::Unknown).unwrap_err(),
            UnknownBackend::NoBackend(FormatKind::Unknown)
        );
        assert_eq!(
            reg.backend_for(FormatKind::Chd).unwrap_err(),
            UnknownBackend::AlreadyCompressed
        );
    }

    #[test]
    fn test_iso_target_chd() {
        let reg = registry(&[FormatKind::RawIso], IsoTarget::Chd);
        let resolved = reg.backend_for(FormatKind::RawIso).unwrap();
        assert_eq!(resolved.backend.args[0], Arg::Lit("createdvd"));
        assert_eq!(resolved.backend.artifact, ArtifactKind::Chd);
    }

    #[test]
    fn test_disabled_and_missing_tool() {
        let reg = registry(&[FormatKind::CueBin], IsoTarget::Cso);
        assert_eq!(
            reg.backend_for(FormatKind::WiiIso).unwrap_err(),
            UnknownBackend::Disabled(FormatKind::WiiIso)
        );

        let tools = ToolLocator::from_paths([(Tool::Maxcso, PathBuf::from("/bin/maxcso"))]);
        let reg = BackendRegistry::new(
            [FormatKind::CueBin, FormatKind::RawIso].into_iter().collect(),
            IsoTarget::Cso,
            tools,
        );
        assert_eq!(
            reg.backend_for(FormatKind::CueBin).unwrap_err(),
            UnknownBackend::ToolUnavailable {
                kind: FormatKind::CueBin,
                tool: "chdman"
            }
        );
        assert!(reg.backend_for(FormatKind::RawIso).is_ok());
        assert_eq!(reg.missing_tools(), vec![(FormatKind::CueBin, Tool::Chdman)]);
    }

    #[test]
    fn test_canonical_n64_routes_to_package_only() {
        let z64 = ConversionUnit::single("/roms/game.z64", FormatKind::N64Rom).canonical(true);
        let v64 = ConversionUnit::single("/roms/game.v64", FormatKind::N64Rom);

        // rom64 不存在
        let reg = BackendRegistry::new(
            [FormatKind::N64Rom].into_iter().collect(),
            IsoTarget::Cso,
            ToolLocator::default(),
        );
        let route = reg.route(&z64).unwrap();
        assert!(matches!(route, Route::PackageOnly(_)));
        assert_eq!(route.backend().artifact, ArtifactKind::Zip);
        assert_eq!(
            reg.route(&v64).unwrap_err(),
            UnknownBackend::ToolUnavailable {
                kind: FormatKind::N64Rom,
                tool: "rom64"
            }
        );

        let reg = registry(&[FormatKind::CueBin], IsoTarget::Cso);
        assert_eq!(
            reg.route(&z64).unwrap_err(),
            UnknownBackend::Disabled(FormatKind::N64Rom)
        );

        let reg = registry(&FormatKind::CONVERTIBLE, IsoTarget::Cso);
        assert!(matches!(reg.route(&v64).unwrap(), Route::Tool(_)));
    }

    #[test]
    fn test_invocation_keeps_paths_as_single_arguments() {
        let reg = registry(&FormatKind::CONVERTIBLE, IsoTarget::Cso);
        let resolved = reg.backend_for(FormatKind::CueBin).unwrap();
        let inv = reg.invocation(
            &resolved,
            Path::new("/roms/Final Fantasy VII (Disc 1).cue"),
            Path::new("/roms/.romcomp-x/Final Fantasy VII (Disc 1).chd"),
            Path::new("/roms/.romcomp-x"),
        );

        assert_eq!(inv.args.len(), 5);
        assert_eq!(inv.args[2], OsString::from("/roms/Final Fantasy VII (Disc 1).cue"));
        assert_eq!(
            inv.command_line(),
            "/opt/tools/chdman createcd -i '/roms/Final Fantasy VII (Disc 1).cue' \
             -o '/roms/.romcomp-x/Final Fantasy VII (Disc 1).chd'"
        );
    }

    #[test]
    fn test_quote_single_quote() {
        assert_eq!(quote("Baldur's Gate.iso"), r"'Baldur'\''s Gate.iso'");
        assert_eq!(quote(""), "''");
        assert_eq!(quote("plain.iso"), "plain.iso");
    }

    #[test]
    fn test_produced_path() {
        let workdir = Path::new("/roms/.romcomp-x");
        let output = workdir.join("game.zip");
        assert_eq!(
            ROM64.produced_path(Path::new("/roms/game.v64"), workdir, &output),
            workdir.join("game.z64")
        );
        let staged = workdir.join("stage/game.nds");
        assert_eq!(BITBUTCHER.produced_path(&staged, workdir, &output), staged);
        assert_eq!(MAXCSO.produced_path(Path::new("/roms/a.iso"), workdir, &output), output);
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_policy() {
        use std::os::unix::process::ExitStatusExt;
        let ok = ExitStatus::from_raw(0);
        let one = ExitStatus::from_raw(1 << 8);
        let two = ExitStatus::from_raw(2 << 8);
        let killed = ExitStatus::from_raw(9);

        assert_eq!(STANDARD_EXIT_POLICY.classify(&ok), ExitClass::Success);
        assert_eq!(
            STANDARD_EXIT_POLICY.classify(&one),
            ExitClass::KnownFailure("tool reported an error")
        );
        assert_eq!(STANDARD_EXIT_POLICY.classify(&two), ExitClass::Unknown);
        assert_eq!(STANDARD_EXIT_POLICY.classify(&killed), ExitClass::Unknown);
    }

    #[test]
    fn test_magic_values() {
        assert_eq!(ArtifactKind::Chd.magic(), b"MComprHD");
        assert_eq!(ArtifactKind::Zip.extension(), "zip");
    }
}
