//! Narrow persistence and directory interfaces the engine is written against.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Actor, HistoryEntry, NewHistoryEntry, NewTicket, Status, Ticket, TicketFilter};

pub trait TicketStore {
    /// Run `f` as one atomic unit. Any error rolls back everything `f` wrote.
    fn in_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>;

    fn find_ticket(&self, id: i64) -> Result<Option<Ticket>>;

    fn find_tickets_with_status_in(&self, statuses: &[Status]) -> Result<Vec<Ticket>>;

    fn find_by_status_resolved_before(
        &self,
        status: Status,
        threshold: DateTime<Utc>,
    ) -> Result<Vec<Ticket>>;

    fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>>;

    fn ticket_number_exists(&self, ticket_number: &str) -> Result<bool>;

    /// Highest sequence already persisted under `{prefix}-{year}-`, if any.
    fn max_ticket_sequence(&self, prefix: &str, year: i32) -> Result<Option<u32>>;

    fn insert_ticket(&self, ticket: &NewTicket) -> Result<Ticket>;

    fn save_ticket(&self, ticket: &Ticket) -> Result<()>;

    fn append_history(&self, entry: &NewHistoryEntry) -> Result<HistoryEntry>;

    /// Entries for one ticket, oldest first.
    fn history_for(&self, ticket_id: i64) -> Result<Vec<HistoryEntry>>;
}

pub trait ActorDirectory {
    fn find_actor(&self, id: i64) -> Result<Option<Actor>>;
}
