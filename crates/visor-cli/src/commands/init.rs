use miette::Result;
use visor_core::{get_schema_version, Store};
use visor_util::progress;

use crate::cli::CoordinatorArgs;

pub fn exec(args: &CoordinatorArgs) -> Result<()> {
    let (uri, root) = super::coordinator(args)?;
    let store = Store::dial(&uri, &root)?.init()?;
    let version = get_schema_version(store.snapshot())?.unwrap_or_default();
    progress::status(
        "Initialized",
        &format!("registry {root} at {uri} (schema version {version})"),
    );
    Ok(())
}
