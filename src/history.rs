use tracing::info;

use crate::error::Result;
use crate::models::{HistoryEntry, NewHistoryEntry};
use crate::store::TicketStore;

/// Appends one immutable audit entry per accepted transition.
///
/// No decisions are made here; the workflow has already accepted the change.
/// Storage failures propagate to the caller's transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryRecorder;

impl HistoryRecorder {
    /// Persist `entry` with its note trimmed; a blank note is stored as none.
    pub fn record<S: TicketStore>(
        &self,
        store: &S,
        mut entry: NewHistoryEntry,
    ) -> Result<HistoryEntry> {
        entry.note = entry
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from);
        let stored = store.append_history(&entry)?;

        info!(
            ticket_id = stored.ticket_id,
            from = stored.from_status.map(|s| s.as_str()).unwrap_or("-"),
            to = %stored.to_status,
            actor_id = stored.actor_id,
            history_id = stored.id,
            "recorded status change"
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Category, NewTicket, Priority, Role, SlaFlag, Status};
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    fn setup_test_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(&db_path).unwrap();
        (db, dir)
    }

    #[test]
    fn test_entries_are_ordered_by_time() {
        let (db, _dir) = setup_test_db();
        let reporter = db.create_user("alice", Role::EndUser).unwrap();
        let agent = db.create_user("bob", Role::Agent).unwrap();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
        let ticket = db
            .insert_ticket(&NewTicket {
                ticket_number: "ITSM-2025-0001".to_string(),
                subject: "Email bounce".to_string(),
                description: "Outbound mail bounces".to_string(),
                category: Category::Services,
                priority: Priority::Medium,
                reporter_id: reporter,
                created_at: t0,
                sla_response_deadline: None,
                sla_resolution_deadline: None,
                sla_flag: SlaFlag::Ok,
            })
            .unwrap();

        let entry = |from, to, actor_id, note: Option<&str>, minutes| NewHistoryEntry {
            ticket_id: ticket.id,
            from_status: from,
            to_status: to,
            actor_id,
            note: note.map(String::from),
            created_at: t0 + Duration::minutes(minutes),
        };

        let recorder = HistoryRecorder;
        recorder
            .record(&db, entry(None, Status::New, reporter, None, 0))
            .unwrap();
        recorder
            .record(
                &db,
                entry(Some(Status::New), Status::InProgress, agent, Some("  picking up  "), 5),
            )
            .unwrap();
        let blank = recorder
            .record(
                &db,
                entry(Some(Status::InProgress), Status::OnHold, agent, Some("   "), 9),
            )
            .unwrap();
        assert_eq!(blank.note, None);

        let history = db.history_for(ticket.id).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].from_status, None);
        assert_eq!(history[0].to_status, Status::New);
        assert_eq!(history[1].note.as_deref(), Some("picking up"));
        assert_eq!(history[2].note, None);
        assert!(history.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }
}
