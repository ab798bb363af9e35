use miette::Result;
use visor_util::progress;

use super::or_dash;
use crate::cli::{CoordinatorArgs, InstanceAction};

pub fn exec(args: &CoordinatorArgs, action: InstanceAction) -> Result<()> {
    let store = super::connect(args)?;
    match action {
        InstanceAction::Describe { id } => {
            let ins = store.get_instance(id)?;
            println!("id:          {}", ins.id);
            println!("app:         {}", ins.app_name);
            println!("revision:    {}", ins.rev_name);
            println!("proc:        {}", ins.proc_name);
            println!("env:         {}", ins.env);
            println!("status:      {}", ins.status);
            println!("claimer:     {}", ins.claimer.as_deref().unwrap_or("-"));
            if !ins.ip.is_empty() {
                println!("address:     {}:{}", ins.ip, ins.port);
                println!("host:        {}", or_dash(&ins.host));
                println!("tele-port:   {}", ins.tele_port);
            }
            if ins.stop_requested {
                println!("stop:        requested");
            }
            if let Some(reason) = &ins.reason {
                println!("reason:      {reason}");
            }
        }
        InstanceAction::Stop { id } => {
            let ins = store.get_instance(id)?.stop()?;
            progress::status("Stopping", &ins.to_string());
        }
        InstanceAction::Claims { id } => {
            for host in store.get_instance(id)?.claims()? {
                println!("{host}");
            }
        }
    }
    Ok(())
}
