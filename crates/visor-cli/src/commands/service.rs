use miette::Result;
use visor_core::time::format_time;
use visor_util::progress;

use crate::cli::{CoordinatorArgs, ServiceAction};

pub fn exec(args: &CoordinatorArgs, action: ServiceAction) -> Result<()> {
    let store = super::connect(args)?;
    match action {
        ServiceAction::Register { name } => {
            store.new_service(&name).register()?;
            progress::status("Registered", &format!("service {name}"));
        }
        ServiceAction::Unregister { name } => {
            store.get_service(&name)?.unregister()?;
            progress::status("Unregistered", &format!("service {name}"));
        }
        ServiceAction::List => {
            for srv in store.get_services()? {
                println!("{}", srv.name);
            }
        }
        ServiceAction::Describe { name } => {
            let srv = store.get_service(&name)?;
            println!("name:        {}", srv.name);
            if let Some(t) = &srv.registered {
                println!("registered:  {}", format_time(t));
            }
            for ep in srv.get_endpoints()? {
                println!(
                    "endpoint:    {} {}:{} priority={} weight={} target={}",
                    ep.id(),
                    ep.ip,
                    ep.port,
                    ep.priority,
                    ep.weight,
                    ep.target
                );
            }
        }
    }
    Ok(())
}
