//! Interactive ticket commands.
//!
//! Every mutation runs as a single unit of work against the store: load,
//! validate, mutate, record history, persist. A reader never sees a status
//! change without its history entry.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::history::HistoryRecorder;
use crate::models::{
    Actor, Category, HistoryEntry, NewHistoryEntry, NewTicket, Priority, Role, SlaFlag, Status, Ticket,
    TicketFilter,
};
use crate::numbering::TicketNumberIssuer;
use crate::sla::SlaPolicy;
use crate::store::{ActorDirectory, TicketStore};
use crate::workflow::{apply_transition, TransitionRequest, Workflow};

pub const SUBJECT_MIN_CHARS: usize = 5;
pub const SUBJECT_MAX_CHARS: usize = 255;
pub const DESCRIPTION_MIN_CHARS: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct CreateTicket {
    pub subject: String,
    pub description: String,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
}

/// Partial update applied by agents and admins. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct UpdateTicket {
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    pub assignee_id: Option<i64>,
}

impl UpdateTicket {
    pub fn is_empty(&self) -> bool {
        self.priority.is_none() && self.category.is_none() && self.assignee_id.is_none()
    }
}

pub struct TicketService<S, C> {
    pub(crate) store: S,
    pub(crate) clock: C,
    pub(crate) issuer: Arc<TicketNumberIssuer>,
    pub(crate) workflow: Workflow,
    pub(crate) sla: SlaPolicy,
    pub(crate) recorder: HistoryRecorder,
}

impl<S, C> TicketService<S, C>
where
    S: TicketStore + ActorDirectory,
    C: Clock,
{
    pub fn new(
        store: S,
        clock: C,
        issuer: Arc<TicketNumberIssuer>,
        workflow: Workflow,
        sla: SlaPolicy,
    ) -> Self {
        TicketService {
            store,
            clock,
            issuer,
            workflow,
            sla,
            recorder: HistoryRecorder,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn sla(&self) -> &SlaPolicy {
        &self.sla
    }

    pub fn create_ticket(&self, command: CreateTicket, reporter_id: i64) -> Result<Ticket> {
        let subject = command.subject.trim();
        let description = command.description.trim();

        let subject_len = subject.chars().count();
        if !(SUBJECT_MIN_CHARS..=SUBJECT_MAX_CHARS).contains(&subject_len) {
            return Err(Error::Validation(format!(
                "Subject must be between {} and {} characters",
                SUBJECT_MIN_CHARS, SUBJECT_MAX_CHARS
            )));
        }
        if description.chars().count() < DESCRIPTION_MIN_CHARS {
            return Err(Error::Validation(format!(
                "Description must be at least {} characters",
                DESCRIPTION_MIN_CHARS
            )));
        }
        let category = command
            .category
            .ok_or_else(|| Error::Validation("Category is required".to_string()))?;
        let priority = command.priority.unwrap_or_default();

        self.store.in_transaction(|| {
            let reporter = self.resolve_actor(reporter_id)?;
            if !reporter.active {
                return Err(Error::NotFound(format!("Active user {}", reporter_id)));
            }

            let now = self.clock.now();
            let ticket_number = self.issuer.next_number(&self.store, now)?;
            let ticket = self.store.insert_ticket(&NewTicket {
                ticket_number,
                subject: subject.to_string(),
                description: description.to_string(),
                category,
                priority,
                reporter_id: reporter.id,
                created_at: now,
                sla_response_deadline: self.sla.response_deadline(priority, now),
                sla_resolution_deadline: self.sla.resolution_deadline(priority, now),
                sla_flag: SlaFlag::Ok,
            })?;

            self.recorder.record(
                &self.store,
                NewHistoryEntry {
                    ticket_id: ticket.id,
                    from_status: None,
                    to_status: Status::New,
                    actor_id: reporter.id,
                    note: None,
                    created_at: now,
                },
            )?;

            info!(
                ticket = %ticket.ticket_number,
                id = ticket.id,
                priority = %ticket.priority,
                reporter = %reporter.username,
                "created ticket"
            );
            Ok(ticket)
        })
    }

    pub fn change_status(
        &self,
        ticket_id: i64,
        to: Status,
        note: Option<&str>,
        actor_id: i64,
    ) -> Result<Ticket> {
        self.store.in_transaction(|| {
            let mut ticket = self.load_ticket(ticket_id)?;
            let actor = self.resolve_actor(actor_id)?;
            ensure_can_view(&ticket, &actor)?;

            self.workflow.check(&TransitionRequest {
                ticket: &ticket,
                to,
                actor: &actor,
                note,
            })?;

            let from = ticket.status;
            let now = self.clock.now();
            apply_transition(&mut ticket, to, now, &self.sla);

            self.recorder.record(
                &self.store,
                NewHistoryEntry {
                    ticket_id: ticket.id,
                    from_status: Some(from),
                    to_status: to,
                    actor_id: actor.id,
                    note: note.map(String::from),
                    created_at: now,
                },
            )?;
            self.store.save_ticket(&ticket)?;
            Ok(ticket)
        })
    }

    pub fn update_ticket(
        &self,
        ticket_id: i64,
        update: UpdateTicket,
        actor_id: i64,
    ) -> Result<Ticket> {
        if update.is_empty() {
            return Err(Error::Validation("Nothing to update".to_string()));
        }

        self.store.in_transaction(|| {
            let mut ticket = self.load_ticket(ticket_id)?;
            let actor = self.resolve_actor(actor_id)?;
            ensure_active(&actor)?;
            if !actor.role.is_staff() {
                return Err(Error::Unauthorized(
                    "Only agents and admins can update tickets".to_string(),
                ));
            }

            let now = self.clock.now();

            if let Some(assignee_id) = update.assignee_id {
                let assignee = self
                    .store
                    .find_actor(assignee_id)?
                    .ok_or_else(|| Error::NotFound(format!("Assignee {}", assignee_id)))?;
                if !assignee.active {
                    return Err(Error::Validation(format!(
                        "Assignee '{}' is inactive",
                        assignee.username
                    )));
                }
                ticket.assignee_id = Some(assignee.id);
            }

            if let Some(category) = update.category {
                ticket.category = category;
            }

            if let Some(priority) = update.priority {
                if priority != ticket.priority {
                    ticket.priority = priority;
                    self.sla.recompute_deadlines(&mut ticket, now);
                }
            }

            ticket.sla_flag = self.sla.evaluate_flag(&ticket, now);
            ticket.updated_at = now;
            self.store.save_ticket(&ticket)?;

            info!(
                ticket = %ticket.ticket_number,
                actor = %actor.username,
                priority = %ticket.priority,
                assignee = ?ticket.assignee_id,
                "updated ticket"
            );
            Ok(ticket)
        })
    }

    pub fn get_ticket(&self, ticket_id: i64, actor_id: i64) -> Result<Ticket> {
        let ticket = self.load_ticket(ticket_id)?;
        let actor = self.resolve_actor(actor_id)?;
        ensure_active(&actor)?;
        ensure_can_view(&ticket, &actor)?;
        Ok(ticket)
    }

    pub fn ticket_history(&self, ticket_id: i64, actor_id: i64) -> Result<Vec<HistoryEntry>> {
        let ticket = self.get_ticket(ticket_id, actor_id)?;
        self.store.history_for(ticket.id)
    }

    /// End users only ever see their own tickets, whatever the filter says.
    pub fn list_tickets(&self, filter: &TicketFilter, actor_id: i64) -> Result<Vec<Ticket>> {
        let actor = self.resolve_actor(actor_id)?;
        ensure_active(&actor)?;

        let mut filter = filter.clone();
        if actor.role == Role::EndUser {
            filter.reporter_id = Some(actor.id);
        }
        self.store.list_tickets(&filter)
    }

    pub(crate) fn load_ticket(&self, ticket_id: i64) -> Result<Ticket> {
        self.store
            .find_ticket(ticket_id)?
            .ok_or_else(|| Error::NotFound(format!("Ticket {}", ticket_id)))
    }

    fn resolve_actor(&self, actor_id: i64) -> Result<Actor> {
        self.store
            .find_actor(actor_id)?
            .ok_or_else(|| Error::NotFound(format!("User {}", actor_id)))
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

fn ensure_active(actor: &Actor) -> Result<()> {
    if !actor.active {
        return Err(Error::Unauthorized(format!(
            "User '{}' is inactive",
            actor.username
        )));
    }
    Ok(())
}

fn ensure_can_view(ticket: &Ticket, actor: &Actor) -> Result<()> {
    if actor.role == Role::EndUser && ticket.reporter_id != actor.id {
        return Err(Error::Unauthorized(format!(
            "User '{}' cannot access ticket {}",
            actor.username, ticket.ticket_number
        )));
    }
    Ok(())
}
