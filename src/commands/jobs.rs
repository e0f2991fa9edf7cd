//! One-shot runs of the scheduled jobs, for cron or manual use.

use anyhow::{bail, Result};

use deskflow::models::{Actor, Role};

use super::Service;

fn ensure_admin(actor: &Actor, what: &str) -> Result<()> {
    if actor.role != Role::Admin || !actor.active {
        bail!("Unauthorized: only admins can run {}", what);
    }
    Ok(())
}

pub fn sweep(service: &Service, actor: &Actor) -> Result<()> {
    ensure_admin(actor, "the SLA sweep")?;
    let report = service.run_sla_sweep()?;

    println!(
        "SLA sweep: {} updated ({} near, {} breached)",
        report.updated, report.near, report.breached
    );
    if report.failed > 0 {
        eprintln!("Warning: {} tickets could not be updated", report.failed);
    }
    Ok(())
}

pub fn auto_close(service: &Service, actor: &Actor, days: i64) -> Result<()> {
    ensure_admin(actor, "auto-close")?;
    let report = service.run_auto_close(days)?;

    println!("Auto-close: {} tickets closed", report.closed);
    if report.failed > 0 {
        eprintln!("Warning: {} tickets could not be closed", report.failed);
    }
    Ok(())
}

pub fn reinit_sla(service: &Service, actor: &Actor) -> Result<()> {
    ensure_admin(actor, "SLA reinitialization")?;
    let processed = service.reinitialize_all_sla()?;
    println!("Reinitialized SLA deadlines on {} tickets", processed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{create_ticket, setup};
    use deskflow::store::TicketStore;

    #[test]
    fn test_jobs_require_admin() {
        let fx = setup();
        assert!(sweep(&fx.service, &fx.agent).is_err());
        assert!(auto_close(&fx.service, &fx.agent, 7).is_err());
        assert!(reinit_sla(&fx.service, &fx.reporter).is_err());
    }

    #[test]
    fn test_jobs_run_for_admin() {
        let fx = setup();
        create_ticket(&fx);

        sweep(&fx.service, &fx.admin).unwrap();
        auto_close(&fx.service, &fx.admin, 7).unwrap();
        reinit_sla(&fx.service, &fx.admin).unwrap();
    }

    #[test]
    fn test_reinit_restamps_deadlines() {
        let fx = setup();
        let ticket = create_ticket(&fx);

        reinit_sla(&fx.service, &fx.admin).unwrap();
        let stored = fx.service.store().find_ticket(ticket.id).unwrap().unwrap();
        assert!(stored.sla_response_deadline >= ticket.sla_response_deadline);
    }

    #[test]
    fn test_negative_days_rejected() {
        let fx = setup();
        assert!(auto_close(&fx.service, &fx.admin, -3).is_err());
    }
}
