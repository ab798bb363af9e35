use std::process::ExitCode;

use miette::Result;
use visor_core::time::format_time;
use visor_util::progress;

use super::app::print_instances;
use crate::cli::{CoordinatorArgs, RevisionAction};

pub fn exec(args: &CoordinatorArgs, action: RevisionAction) -> Result<ExitCode> {
    let store = super::connect(args)?;
    match action {
        RevisionAction::Register {
            app,
            rev,
            archive_url,
        } => {
            let app = store.get_app(&app)?;
            let rev = store.new_revision(&app, &rev, &archive_url).register()?;
            progress::status("Registered", &format!("revision {} of app {}", rev.reference, app.name));
        }
        RevisionAction::Describe { app, rev } => {
            let rev = store.get_app(&app)?.get_revision(&rev)?;
            println!("app:         {}", rev.app_name);
            println!("ref:         {}", rev.reference);
            println!("archive-url: {}", rev.archive_url);
            if let Some(t) = &rev.registered {
                println!("registered:  {}", format_time(t));
            }
        }
        RevisionAction::Exists { app, rev } => {
            return match store.get_app(&app)?.get_revision(&rev) {
                Ok(_) => Ok(ExitCode::SUCCESS),
                Err(e) if e.is_not_found() => Ok(ExitCode::FAILURE),
                Err(e) => Err(e.into()),
            };
        }
        RevisionAction::Unregister { app, rev } => {
            store.get_app(&app)?.get_revision(&rev)?.unregister()?;
            progress::status("Unregistered", &format!("revision {rev} of app {app}"));
        }
        RevisionAction::Instances { app, rev } => {
            store.get_app(&app)?.get_revision(&rev)?;
            print_instances(
                store
                    .get_instances()?
                    .iter()
                    .filter(|i| i.app_name == app && i.rev_name == rev),
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}
