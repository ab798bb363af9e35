//! Guarded build and smoke test.
//!
//! Install runs its checks in a fixed order, each with its own failure
//! class: host version, build tool, version control tool, then the build
//! itself. Everything is sequential and nothing is retried.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use semver::Version;
use visor_util::process::CommandBuilder;
use visor_util::progress;

use crate::error::InstallError;
use crate::formula::{Formula, VcsRemediation};

/// Lines of build stderr kept in [`InstallError::BuildFailed`].
const STDERR_TAIL: usize = 20;

fn version_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").ok())
        .as_ref()
}

/// First version-looking token in `output`, e.g. `4.2` in `Homebrew 4.2`.
pub fn parse_host_version(output: &str) -> Option<Version> {
    let caps = version_regex()?.captures(output)?;
    let num = |i: usize| caps.get(i).map_or(Some(0), |m| m.as_str().parse().ok());
    Some(Version::new(num(1)?, num(2)?, num(3)?))
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

/// Runs a formula's install and test procedures.
#[derive(Debug, Clone)]
pub struct Installer<'a> {
    formula: &'a Formula,
    search_path: Option<OsString>,
}

impl<'a> Installer<'a> {
    pub fn new(formula: &'a Formula) -> Self {
        Self {
            formula,
            search_path: None,
        }
    }

    /// Look tools up in `path` instead of the inherited `PATH`.
    pub fn search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    fn path(&self) -> OsString {
        self.search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"))
            .unwrap_or_default()
    }

    fn which(&self, tool: &str) -> Option<PathBuf> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        which::which_in(tool, Some(self.path()), cwd).ok()
    }

    fn require(&self, tool: &str) -> Result<PathBuf, InstallError> {
        self.which(tool).ok_or_else(|| InstallError::MissingDependency {
            tool: tool.to_string(),
        })
    }

    fn tool(&self, path: &Path) -> CommandBuilder {
        CommandBuilder::new(path.to_string_lossy()).env("PATH", self.path().to_string_lossy())
    }

    /// Abort when the host package manager is older than `min-host-version`.
    pub fn check_host(&self) -> Result<(), InstallError> {
        let Some(required) = &self.formula.min_host_version else {
            return Ok(());
        };
        let host = self.require(&self.formula.host)?;
        let output = self.tool(&host).arg("--version").exec()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let found = parse_host_version(&stdout);
        tracing::debug!(host = %self.formula.host, ?found, %required, "host version");
        match found {
            Some(v) if v >= *required => Ok(()),
            other => Err(InstallError::OutdatedHost {
                host: self.formula.host.clone(),
                found: other.map_or_else(|| "an unknown version".to_string(), |v| v.to_string()),
                required: required.to_string(),
            }),
        }
    }

    /// The build-time dependency must be on the search path.
    pub fn check_dependency(&self) -> Result<PathBuf, InstallError> {
        self.require(&self.formula.depends_on)
    }

    /// Make sure the version control tool is present and working.
    pub fn check_vcs(&self) -> Result<(), InstallError> {
        let Some(vcs) = &self.formula.vcs else {
            return Ok(());
        };
        let host = &self.formula.host;
        let path = match self.which(vcs) {
            Some(path) => path,
            None => match self.formula.vcs_remediation {
                VcsRemediation::Manual => {
                    progress::status_error("Missing", &format!("{vcs} is required to build"));
                    progress::status_info("Run", &format!("{host} install {vcs}"));
                    return Err(InstallError::MissingVcs {
                        vcs: vcs.clone(),
                        host: host.clone(),
                    });
                }
                VcsRemediation::AutoInstall => {
                    progress::status_warn("Installing", &format!("{vcs} via {host}"));
                    let host_path = self.require(host)?;
                    let output = self.tool(&host_path).args(["install", vcs.as_str()]).exec()?;
                    if !output.status.success() {
                        tracing::warn!(vcs = %vcs, "`{host} install {vcs}` failed");
                    }
                    self.which(vcs).ok_or_else(|| InstallError::MissingVcs {
                        vcs: vcs.clone(),
                        host: host.clone(),
                    })?
                }
            },
        };
        let output = self.tool(&path).arg("--version").exec()?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(InstallError::BrokenVcs {
                vcs: vcs.clone(),
                detail: match stderr.trim() {
                    "" => format!("exit status {}", output.status),
                    msg => tail(msg, 3),
                },
            })
        }
    }

    /// The build invocation: program, environment and working directory.
    pub fn build_command(&self, buildpath: &Path, prefix: &Path) -> Result<CommandBuilder, InstallError> {
        let (program, args) = self
            .formula
            .build
            .split_first()
            .ok_or_else(|| InstallError::Process {
                message: "formula has an empty build command".to_string(),
            })?;
        let program = self.require(program)?;
        let bin = prefix.join("bin");

        let mut path = vec![bin.clone()];
        path.extend(std::env::split_paths(&self.path()));
        let path = std::env::join_paths(path).map_err(|e| InstallError::Process {
            message: format!("invalid search path: {e}"),
        })?;

        let expand = |value: &str| {
            value
                .replace("{buildpath}", &buildpath.to_string_lossy())
                .replace("{prefix}", &prefix.to_string_lossy())
        };
        Ok(CommandBuilder::new(program.to_string_lossy())
            .args(args.iter().cloned())
            .env("GOPATH", buildpath.to_string_lossy())
            .env("GOBIN", bin.to_string_lossy())
            .env("PATH", path.to_string_lossy())
            .envs(self.formula.env.iter().map(|(k, v)| (k.clone(), expand(v))))
            .cwd(buildpath))
    }

    /// Check the environment and build from `buildpath` into `prefix`.
    pub fn install(&self, buildpath: &Path, prefix: &Path) -> Result<(), InstallError> {
        self.check_host()?;
        self.check_dependency()?;
        self.check_vcs()?;

        visor_util::fs::ensure_dir(&prefix.join("bin"))?;
        let cmd = self.build_command(buildpath, prefix)?;
        let line = self.formula.build_line();
        let spinner = progress::spinner(&format!("Building {} {}", self.formula.name, self.formula.version));
        let output = cmd.exec();
        spinner.finish_and_clear();
        let output = output?;

        if !output.status.success() {
            return Err(InstallError::BuildFailed {
                command: line,
                code: output.status.code(),
                stderr: tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL),
            });
        }
        progress::status(
            "Installed",
            &format!("{} {} to {}", self.formula.name, self.formula.version, prefix.display()),
        );
        Ok(())
    }

    /// Run `<prefix>/bin/<name> --version` and return what it printed.
    pub fn smoke_test(&self, prefix: &Path) -> Result<String, InstallError> {
        let binary = prefix.join("bin").join(&self.formula.name);
        let command = format!("{} --version", binary.display());
        let output = CommandBuilder::new(binary.to_string_lossy())
            .arg("--version")
            .exec()
            .map_err(|e| InstallError::SmokeTest {
                command: command.clone(),
                message: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(InstallError::SmokeTest {
                command,
                message: format!("exit status {}", output.status),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Install `formula` with the inherited `PATH`.
pub fn install(formula: &Formula, buildpath: &Path, prefix: &Path) -> Result<(), InstallError> {
    Installer::new(formula).install(buildpath, prefix)
}

/// Smoke test an installed `formula`.
pub fn smoke_test(formula: &Formula, prefix: &Path) -> Result<String, InstallError> {
    Installer::new(formula).smoke_test(prefix)
}
