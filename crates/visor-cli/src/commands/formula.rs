use std::path::Path;

use miette::Result;
use visor_formula::{verify_archive, Formula, Installer};
use visor_util::errors::VisorError;
use visor_util::fs::find_ancestor_with;
use visor_util::progress;

use crate::cli::FormulaAction;

const FORMULA_FILE: &str = "Formula.toml";

/// `--file`, else the nearest `Formula.toml`, else the built-in formula.
fn load(file: Option<&Path>) -> Result<Formula> {
    if let Some(path) = file {
        return Ok(Formula::load(path)?);
    }
    let cwd = std::env::current_dir().map_err(VisorError::Io)?;
    match find_ancestor_with(&cwd, FORMULA_FILE) {
        Some(dir) => {
            let path = dir.join(FORMULA_FILE);
            tracing::debug!(path = %path.display(), "using formula");
            Ok(Formula::load(&path)?)
        }
        None => Ok(Formula::visor()),
    }
}

pub fn exec(file: Option<&Path>, action: FormulaAction) -> Result<()> {
    let formula = load(file)?;
    let installer = Installer::new(&formula);
    match action {
        FormulaAction::Install { buildpath, prefix } => {
            installer.install(&buildpath, &prefix)?;
        }
        FormulaAction::Test { prefix } => {
            let version = installer.smoke_test(&prefix)?;
            progress::status("Passed", &format!("{} --version: {version}", formula.name));
        }
        FormulaAction::Render => print!("{}", formula.to_ruby()),
        FormulaAction::Verify { archive } => {
            let digest = verify_archive(&formula, &archive)?;
            progress::status("Verified", &format!("{} sha256 {digest}", archive.display()));
        }
    }
    Ok(())
}
