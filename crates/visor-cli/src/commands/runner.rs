use miette::Result;

use crate::cli::{CoordinatorArgs, RunnerAction};

pub fn exec(args: &CoordinatorArgs, action: RunnerAction) -> Result<()> {
    let store = super::connect(args)?;
    match action {
        RunnerAction::List { host } => {
            let runners = match host {
                Some(host) => store.runners_by_host(&host)?,
                None => store.get_runners()?,
            };
            for runner in runners {
                println!("{}\t{}", runner.addr, runner.instance_id);
            }
        }
    }
    Ok(())
}
