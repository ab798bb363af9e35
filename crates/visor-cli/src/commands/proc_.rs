use miette::Result;
use visor_core::time::format_time;
use visor_util::progress;

use super::app::print_instances;
use crate::cli::{CoordinatorArgs, ProcAction};

pub fn exec(args: &CoordinatorArgs, action: ProcAction) -> Result<()> {
    let store = super::connect(args)?;
    match action {
        ProcAction::Register {
            app,
            name,
            memory_limit_mb,
        } => {
            let app = store.get_app(&app)?;
            let mut proc = store.new_proc(&app, &name);
            proc.attrs.limits.memory_limit_mb = memory_limit_mb;
            let mut proc = proc.register()?;
            if memory_limit_mb.is_some() {
                proc = proc.store_attrs()?;
            }
            progress::status(
                "Registered",
                &format!("proc {} of app {} on port {}", proc.name, app.name, proc.port),
            );
        }
        ProcAction::Unregister { app, name } => {
            store.get_app(&app)?.get_proc(&name)?.unregister()?;
            progress::status("Unregistered", &format!("proc {name} of app {app}"));
        }
        ProcAction::Describe { app, name } => {
            let proc = store.get_app(&app)?.get_proc(&name)?;
            println!("app:         {}", proc.app_name);
            println!("name:        {}", proc.name);
            println!("port:        {}", proc.port);
            if let Some(mb) = proc.attrs.limits.memory_limit_mb {
                println!("memory-mb:   {mb}");
            }
            if let Some(t) = &proc.registered {
                println!("registered:  {}", format_time(t));
            }
            println!("instances:   {}", proc.num_instances()?);
            let revs = proc.get_running_revs()?;
            if !revs.is_empty() {
                println!("running:     {}", revs.join(" "));
            }
        }
        ProcAction::Instances { app, name } => {
            let proc = store.get_app(&app)?.get_proc(&name)?;
            print_instances(&proc.get_instances()?);
            print_instances(&proc.get_failed_instances()?);
            print_instances(&proc.get_lost_instances()?);
        }
    }
    Ok(())
}
