use miette::Result;
use visor_util::progress;

use crate::cli::CoordinatorArgs;

pub fn exec(
    args: &CoordinatorArgs,
    app: &str,
    rev: &str,
    proc: &str,
    factor: i64,
    env: &str,
) -> Result<()> {
    let store = super::connect(args)?;
    let change = store.scale(app, rev, proc, env, factor)?;
    let target = format!("{app}:{proc}@{rev}");
    if change.current == change.previous {
        progress::status_info("Unchanged", &format!("{target} at {} instances", change.current));
        return Ok(());
    }
    progress::status(
        "Scaled",
        &format!("{target} from {} to {}", change.previous, change.current),
    );
    for ins in &change.instances {
        println!("{}", ins.id);
    }
    Ok(())
}
