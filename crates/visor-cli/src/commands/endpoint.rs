use miette::Result;
use visor_util::progress;

use crate::cli::{CoordinatorArgs, EndpointAction};

pub fn exec(args: &CoordinatorArgs, action: EndpointAction) -> Result<()> {
    let store = super::connect(args)?;
    match action {
        EndpointAction::Register {
            service,
            addr,
            port,
            priority,
            weight,
        } => {
            let mut ep = store.get_service(&service)?.new_endpoint(&addr, port)?;
            ep.priority = priority;
            ep.weight = weight;
            let ep = ep.register()?;
            progress::status(
                "Registered",
                &format!("endpoint {} ({}:{}) of service {service}", ep.id(), ep.ip, ep.port),
            );
        }
        EndpointAction::Unregister {
            service,
            addr,
            port,
        } => {
            let ep = store.get_service(&service)?.new_endpoint(&addr, port)?;
            ep.unregister()?;
            progress::status("Unregistered", &format!("endpoint {} of service {service}", ep.id()));
        }
    }
    Ok(())
}
