//! Batch operations run without a live request: the SLA sweep, auto-close
//! of long-resolved tickets, and the administrative SLA reset.
//!
//! Each ticket is handled in its own unit of work and re-read inside it, so a
//! concurrent interactive change is never overwritten with stale state. A
//! failure on one ticket is logged and counted; the batch carries on.

use chrono::Duration;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::models::{NewHistoryEntry, SlaFlag, Status, TicketFilter};
use crate::service::TicketService;
use crate::store::{ActorDirectory, TicketStore};
use crate::workflow::apply_transition;

pub const AUTO_CLOSE_NOTE: &str = "Auto closed by system";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub updated: usize,
    pub near: usize,
    pub breached: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AutoCloseReport {
    pub closed: usize,
    pub failed: usize,
}

impl<S, C> TicketService<S, C>
where
    S: TicketStore + ActorDirectory,
    C: Clock,
{
    /// Re-evaluate the flag of every tracked ticket and persist the ones that moved.
    pub fn run_sla_sweep(&self) -> Result<SweepReport> {
        let now = self.now();
        let candidates = self.store.find_tickets_with_status_in(&Status::SLA_TRACKED)?;
        let mut report = SweepReport::default();

        for candidate in candidates {
            let outcome = self.store.in_transaction(|| {
                let Some(mut ticket) = self.store.find_ticket(candidate.id)? else {
                    return Ok(None);
                };
                let flag = self.sla.evaluate_flag(&ticket, now);
                if flag == ticket.sla_flag {
                    return Ok(None);
                }

                debug!(ticket = %ticket.ticket_number, from = %ticket.sla_flag, to = %flag, "sla flag changed");
                ticket.sla_flag = flag;
                self.store.save_ticket(&ticket)?;
                Ok(Some(flag))
            });

            match outcome {
                Ok(Some(flag)) => {
                    report.updated += 1;
                    match flag {
                        SlaFlag::Near => report.near += 1,
                        SlaFlag::Breached => report.breached += 1,
                        SlaFlag::Ok => {}
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(ticket = %candidate.ticket_number, error = %e, "sla sweep failed for ticket");
                    report.failed += 1;
                }
            }
        }

        info!(
            updated = report.updated,
            near = report.near,
            breached = report.breached,
            failed = report.failed,
            "sla sweep finished"
        );
        Ok(report)
    }

    /// Close every ticket resolved more than `threshold_days` ago.
    ///
    /// This is a system transition: role and guard checks do not apply. The
    /// history entry is attributed to the assignee, else the reporter.
    pub fn run_auto_close(&self, threshold_days: i64) -> Result<AutoCloseReport> {
        if threshold_days < 0 {
            return Err(Error::Validation(
                "Auto-close threshold must not be negative".to_string(),
            ));
        }

        let now = self.now();
        let threshold = Duration::try_days(threshold_days)
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| {
                Error::Validation(format!(
                    "Auto-close threshold of {} days is out of range",
                    threshold_days
                ))
            })?;
        let candidates = self
            .store
            .find_by_status_resolved_before(Status::Resolved, threshold)?;
        let mut report = AutoCloseReport::default();

        for candidate in candidates {
            let outcome = self.store.in_transaction(|| {
                let Some(mut ticket) = self.store.find_ticket(candidate.id)? else {
                    return Ok(false);
                };
                let still_due = ticket.status == Status::Resolved
                    && ticket.resolved_at.is_some_and(|at| at < threshold);
                if !still_due {
                    return Ok(false);
                }

                let actor_id = ticket.assignee_id.unwrap_or(ticket.reporter_id);
                apply_transition(&mut ticket, Status::Closed, now, &self.sla);
                self.recorder.record(
                    &self.store,
                    NewHistoryEntry {
                        ticket_id: ticket.id,
                        from_status: Some(Status::Resolved),
                        to_status: Status::Closed,
                        actor_id,
                        note: Some(AUTO_CLOSE_NOTE.to_string()),
                        created_at: now,
                    },
                )?;
                self.store.save_ticket(&ticket)?;
                Ok(true)
            });

            match outcome {
                Ok(true) => report.closed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(ticket = %candidate.ticket_number, error = %e, "auto-close failed for ticket");
                    report.failed += 1;
                }
            }
        }

        info!(
            closed = report.closed,
            failed = report.failed,
            threshold_days,
            "auto-close finished"
        );
        Ok(report)
    }

    /// Restart every ticket's SLA clock from now. All or nothing.
    pub fn reinitialize_all_sla(&self) -> Result<usize> {
        self.store.in_transaction(|| {
            let now = self.now();
            let tickets = self.store.list_tickets(&TicketFilter::default())?;
            let mut processed = 0;

            for mut ticket in tickets {
                self.sla.initialize(&mut ticket, now);
                ticket.sla_flag = self.sla.evaluate_flag(&ticket, now);
                ticket.updated_at = now;
                self.store.save_ticket(&ticket)?;
                processed += 1;
            }

            info!(processed, "reinitialized sla deadlines");
            Ok(processed)
        })
    }
}
