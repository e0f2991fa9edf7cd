//! Ticket status state machine.
//!
//! Legal moves live in an explicit table keyed by status; extra business
//! rules are registered per `(from, to)` edge. Nothing outside this module
//! assigns `Ticket::status`.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::{Error, Result};
use crate::models::{Actor, Role, SlaFlag, Status, Ticket};
use crate::sla::SlaPolicy;

/// Everything a guard may inspect about a requested transition.
#[derive(Debug, Clone, Copy)]
pub struct TransitionRequest<'a> {
    pub ticket: &'a Ticket,
    pub to: Status,
    pub actor: &'a Actor,
    pub note: Option<&'a str>,
}

pub type Guard = fn(&TransitionRequest<'_>) -> Result<()>;

#[derive(Clone)]
pub struct Workflow {
    transitions: HashMap<Status, BTreeSet<Status>>,
    guards: HashMap<(Status, Status), Guard>,
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut guarded: Vec<_> = self.guards.keys().copied().collect();
        guarded.sort();
        f.debug_struct("Workflow")
            .field("transitions", &self.transitions)
            .field("guarded_edges", &guarded)
            .finish()
    }
}

impl Default for Workflow {
    fn default() -> Self {
        Workflow::standard()
    }
}

impl Workflow {
    /// The base table with no cancellation edges.
    pub fn standard() -> Self {
        let mut transitions: HashMap<Status, BTreeSet<Status>> = HashMap::new();
        transitions.insert(Status::New, BTreeSet::from([Status::InProgress]));
        transitions.insert(
            Status::InProgress,
            BTreeSet::from([Status::OnHold, Status::Resolved]),
        );
        transitions.insert(Status::OnHold, BTreeSet::from([Status::InProgress]));
        transitions.insert(
            Status::Resolved,
            BTreeSet::from([Status::Closed, Status::Reopened]),
        );
        transitions.insert(Status::Closed, BTreeSet::from([Status::Reopened]));
        transitions.insert(Status::Reopened, BTreeSet::from([Status::InProgress]));
        transitions.insert(Status::Cancelled, BTreeSet::new());

        let mut guards: HashMap<(Status, Status), Guard> = HashMap::new();
        guards.insert((Status::New, Status::InProgress), require_assignee);
        guards.insert((Status::InProgress, Status::Resolved), require_resolution_note);
        guards.insert((Status::Resolved, Status::Reopened), require_reporter);

        Workflow {
            transitions,
            guards,
        }
    }

    /// Allow CANCELLED from each of `sources`. Terminal states cannot be sources.
    pub fn with_cancellable_from<I>(mut self, sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = Status>,
    {
        for source in sources {
            if matches!(source, Status::Closed | Status::Cancelled) {
                return Err(Error::Config(format!(
                    "Tickets cannot be cancelled from '{}'",
                    source
                )));
            }
            self.transitions
                .entry(source)
                .or_default()
                .insert(Status::Cancelled);
        }
        Ok(self)
    }

    pub fn allowed_targets(&self, from: Status) -> Vec<Status> {
        self.transitions
            .get(&from)
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn can_transition(&self, from: Status, to: Status) -> bool {
        from != to
            && self
                .transitions
                .get(&from)
                .is_some_and(|targets| targets.contains(&to))
    }

    /// Role gating, independent of the table.
    pub fn authorize(&self, ticket: &Ticket, to: Status, actor: &Actor) -> Result<()> {
        if !actor.active {
            return Err(Error::Unauthorized(format!(
                "User '{}' is inactive",
                actor.username
            )));
        }

        match actor.role {
            Role::Agent | Role::Admin => Ok(()),
            Role::EndUser => {
                if to == Status::Reopened && ticket.reporter_id == actor.id {
                    Ok(())
                } else {
                    Err(Error::Unauthorized(
                        "End users can only reopen their own tickets".to_string(),
                    ))
                }
            }
        }
    }

    /// Table membership plus any guard registered for the edge.
    pub fn validate(&self, request: &TransitionRequest<'_>) -> Result<()> {
        let from = request.ticket.status;
        if !self.can_transition(from, request.to) {
            return Err(Error::InvalidTransition {
                from,
                to: request.to,
            });
        }

        match self.guards.get(&(from, request.to)) {
            Some(guard) => guard(request),
            None => Ok(()),
        }
    }

    pub fn check(&self, request: &TransitionRequest<'_>) -> Result<()> {
        self.authorize(request.ticket, request.to, request.actor)?;
        self.validate(request)
    }
}

fn require_assignee(request: &TransitionRequest<'_>) -> Result<()> {
    if request.ticket.assignee_id.is_none() {
        return Err(Error::GuardViolation(format!(
            "Cannot move to {} without an assignee",
            request.to
        )));
    }
    Ok(())
}

fn require_resolution_note(request: &TransitionRequest<'_>) -> Result<()> {
    match request.note {
        Some(note) if !note.trim().is_empty() => Ok(()),
        _ => Err(Error::GuardViolation(
            "A resolution note is required when resolving a ticket".to_string(),
        )),
    }
}

fn require_reporter(request: &TransitionRequest<'_>) -> Result<()> {
    let actor = request.actor;
    if actor.role != Role::EndUser || actor.id != request.ticket.reporter_id {
        return Err(Error::GuardViolation(
            "Only the reporter can reopen a resolved ticket".to_string(),
        ));
    }
    Ok(())
}

/// Enact an accepted transition: set the status and stamp its side effects.
///
/// Does not validate; callers run [`Workflow::check`] first unless the change
/// is system-initiated.
pub fn apply_transition(ticket: &mut Ticket, to: Status, now: DateTime<Utc>, sla: &SlaPolicy) {
    ticket.status = to;

    match to {
        Status::Resolved => ticket.resolved_at = Some(now),
        Status::Closed => {
            ticket.closed_at = Some(now);
            ticket.sla_flag = SlaFlag::Ok;
        }
        Status::Cancelled => {
            ticket.closed_at = Some(now);
            ticket.resolved_at = None;
            ticket.sla_flag = SlaFlag::Ok;
        }
        Status::Reopened => {
            ticket.closed_at = None;
            ticket.resolved_at = None;
            sla.initialize(ticket, now);
        }
        Status::New | Status::InProgress | Status::OnHold => {}
    }

    if to.is_sla_tracked() {
        ticket.sla_flag = sla.evaluate_flag(ticket, now);
    }
    ticket.updated_at = now;
}
