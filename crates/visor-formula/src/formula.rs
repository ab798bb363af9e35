//! The formula descriptor and its Ruby rendering.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::FormulaError;

/// What to do when the formula's version control tool is missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VcsRemediation {
    /// Run `<host> install <vcs>` and check again.
    #[default]
    AutoInstall,
    /// Print the remediation steps and abort.
    Manual,
}

/// A package formula, loaded from `Formula.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Formula {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub desc: String,
    pub homepage: String,
    pub url: String,
    pub version: String,
    pub depends_on: String,
    #[serde(default)]
    pub skip_clean: BTreeSet<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub vcs: Option<String>,
    #[serde(default)]
    pub vcs_remediation: VcsRemediation,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub min_host_version: Option<Version>,
    #[serde(default = "default_build")]
    pub build: Vec<String>,
    /// Extra build environment. `{buildpath}` and `{prefix}` are expanded.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_name() -> String {
    "visor".to_string()
}

fn default_host() -> String {
    "brew".to_string()
}

fn default_build() -> Vec<String> {
    vec!["make".to_string()]
}

impl FromStr for Formula {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s)
    }
}

impl Formula {
    /// The formula visor ships with.
    pub fn visor() -> Self {
        Self {
            name: default_name(),
            desc: "Coordination registry for a process supervision platform".to_string(),
            homepage: "http://github.com/soundcloud/visor".to_string(),
            url: "https://github.com/soundcloud/visor/zipball/feature/makefile-leanification"
                .to_string(),
            version: "0.5.4".to_string(),
            depends_on: "go".to_string(),
            skip_clean: BTreeSet::from(["bin".to_string()]),
            sha256: None,
            vcs: Some("hg".to_string()),
            vcs_remediation: VcsRemediation::AutoInstall,
            host: default_host(),
            min_host_version: None,
            build: default_build(),
            env: BTreeMap::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, FormulaError> {
        let content = std::fs::read_to_string(path).map_err(|source| FormulaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse().map_err(|e: toml::de::Error| FormulaError::Parse {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })
    }

    /// Ruby class name: `visor` becomes `Visor`, `visor-cli` becomes `VisorCli`.
    pub fn class_name(&self) -> String {
        self.name
            .split(['-', '_'])
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect()
    }

    /// The build command line as a single string.
    pub fn build_line(&self) -> String {
        self.build.join(" ")
    }

    /// Render the formula as a Ruby recipe for the host package manager.
    pub fn to_ruby(&self) -> String {
        Ruby(self).to_string()
    }
}

/// Ruby recipe rendering of a [`Formula`].
struct Ruby<'a>(&'a Formula);

impl Ruby<'_> {
    fn vcs_guard(&self, f: &mut fmt::Formatter<'_>, vcs: &str) -> fmt::Result {
        let host = &self.0.host;
        match self.0.vcs_remediation {
            VcsRemediation::AutoInstall => {
                writeln!(f, "    begin")?;
                writeln!(f, "      system(\"which {vcs}\")")?;
                writeln!(f, "    rescue")?;
                writeln!(f, "      system \"{host} install {vcs}\"")?;
                writeln!(f, "    end")
            }
            VcsRemediation::Manual => {
                writeln!(f, "    unless system(\"which {vcs}\")")?;
                writeln!(
                    f,
                    "      onoe \"{vcs} is required: run `{host} install {vcs}` and retry\""
                )?;
                writeln!(f, "      exit 3")?;
                writeln!(f, "    end")
            }
        }
    }
}

impl fmt::Display for Ruby<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formula = self.0;
        writeln!(f, "require 'formula'")?;
        writeln!(f)?;
        writeln!(f, "class {} < Formula", formula.class_name())?;
        if !formula.desc.is_empty() {
            writeln!(f, "  desc {}", quote(&formula.desc))?;
        }
        writeln!(f, "  homepage {}", quote(&formula.homepage))?;
        writeln!(f, "  url {}", quote(&formula.url))?;
        if let Some(sha) = &formula.sha256 {
            writeln!(f, "  sha256 {}", quote(sha))?;
        }
        writeln!(f, "  depends_on {}", quote(&formula.depends_on))?;
        for dir in &formula.skip_clean {
            writeln!(f, "  skip_clean {}", quote(dir))?;
        }
        writeln!(f, "  version {}", quote(&formula.version))?;

        writeln!(f)?;
        writeln!(f, "  def install")?;
        if let Some(vcs) = &formula.vcs {
            self.vcs_guard(f, vcs)?;
        }
        writeln!(f, "    ENV['GOPATH'] = buildpath")?;
        writeln!(f, "    ENV['GOBIN'] = \"#{{prefix}}/bin\"")?;
        for (key, value) in &formula.env {
            writeln!(f, "    ENV[{}] = {}", quote(key), interpolate(value))?;
        }
        let build: Vec<String> = formula.build.iter().map(|a| quote_double(a)).collect();
        writeln!(f, "    system {}", build.join(", "))?;
        writeln!(f, "  end")?;

        writeln!(f)?;
        writeln!(f, "  def test")?;
        writeln!(f, "    system \"{} --version\"", formula.name)?;
        writeln!(f, "  end")?;
        writeln!(f, "end")
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn quote_double(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Double-quoted Ruby string with `{buildpath}` and `{prefix}` interpolated.
fn interpolate(s: &str) -> String {
    quote_double(s)
        .replace("{buildpath}", "#{buildpath}")
        .replace("{prefix}", "#{prefix}")
}
