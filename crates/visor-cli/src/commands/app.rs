use miette::Result;
use visor_core::time::format_time;
use visor_core::Instance;
use visor_util::progress;

use super::or_dash;
use crate::cli::{AppAction, CoordinatorArgs};

pub fn exec(args: &CoordinatorArgs, action: AppAction) -> Result<()> {
    let store = super::connect(args)?;
    match action {
        AppAction::List => {
            for app in store.get_apps()? {
                println!("{}", app.name);
            }
        }
        AppAction::Register {
            name,
            repo,
            stack,
            deploy_type,
        } => {
            let mut app = store.new_app(&name, &repo, &stack);
            if let Some(deploy_type) = deploy_type {
                app.deploy_type = deploy_type;
            }
            let app = app.register()?;
            progress::status("Registered", &format!("app {} ({})", app.name, app.deploy_type));
        }
        AppAction::Describe { name } => {
            let app = store.get_app(&name)?;
            let head = match app.get_head() {
                Ok(head) => head,
                Err(e) if e.is_not_found() => String::new(),
                Err(e) => return Err(e.into()),
            };
            println!("name:        {}", app.name);
            println!("repo-url:    {}", or_dash(&app.repo_url));
            println!("stack:       {}", or_dash(&app.stack));
            println!("deploy-type: {}", app.deploy_type);
            println!("head:        {}", or_dash(&head));
            if let Some(t) = &app.registered {
                println!("registered:  {}", format_time(t));
            }
            let procs: Vec<String> = app.get_procs()?.into_iter().map(|p| p.name).collect();
            println!("procs:       {}", or_dash(&procs.join(" ")));
            let revs: Vec<String> = app
                .get_revisions()?
                .into_iter()
                .map(|r| r.reference)
                .collect();
            println!("revisions:   {}", or_dash(&revs.join(" ")));
        }
        AppAction::Unregister { name } => {
            store.get_app(&name)?.unregister()?;
            progress::status("Unregistered", &format!("app {name}"));
        }
        AppAction::Env { name } => {
            for (key, value) in store.get_app(&name)?.environment_vars()? {
                println!("{key}={value}");
            }
        }
        AppAction::Getenv { name, key } => {
            println!("{}", store.get_app(&name)?.get_environment_var(&key)?);
        }
        AppAction::Setenv { name, key, value } => {
            store.get_app(&name)?.set_environment_var(&key, &value)?;
            progress::status("Set", &format!("{key} on app {name}"));
        }
        AppAction::Delenv { name, key } => {
            store.get_app(&name)?.del_environment_var(&key)?;
            progress::status("Deleted", &format!("{key} from app {name}"));
        }
        AppAction::Head { name, rev } => {
            let app = store.get_app(&name)?;
            match rev {
                Some(rev) => {
                    app.get_revision(&rev)?;
                    app.set_head(&rev)?;
                    progress::status("Head", &format!("of app {name} is now {rev}"));
                }
                None => println!("{}", app.get_head()?),
            }
        }
        AppAction::Revisions { name } => {
            for rev in store.get_app(&name)?.get_revisions()? {
                println!("{}", rev.reference);
            }
        }
        AppAction::Instances { name } => {
            store.get_app(&name)?;
            print_instances(store.get_instances()?.iter().filter(|i| i.app_name == name));
        }
    }
    Ok(())
}

/// One line per instance: id, proc, revision, env, status, address.
pub(crate) fn print_instances<'a>(instances: impl IntoIterator<Item = &'a Instance>) {
    for ins in instances {
        let addr = if ins.ip.is_empty() {
            "-".to_string()
        } else {
            format!("{}:{}", ins.ip, ins.port)
        };
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            ins.id, ins.proc_name, ins.rev_name, ins.env, ins.status, addr
        );
    }
}
