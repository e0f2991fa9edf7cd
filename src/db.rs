use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::{
    Actor, HistoryEntry, NewHistoryEntry, NewTicket, Role, Status, Ticket, TicketFilter,
};
use crate::store::{ActorDirectory, TicketStore};

const SCHEMA_VERSION: i32 = 1;

const TICKET_COLUMNS: &str = "id, ticket_number, subject, description, category, priority, status, reporter_id, assignee_id, created_at, updated_at, resolved_at, closed_at, sla_response_deadline, sla_resolution_deadline, sla_flag";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version < SCHEMA_VERSION {
            self.conn.execute_batch(
                r#"
                -- Actor directory
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    role TEXT NOT NULL,
                    active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL
                );

                -- Ticket aggregate
                CREATE TABLE IF NOT EXISTS tickets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ticket_number TEXT NOT NULL UNIQUE,
                    subject TEXT NOT NULL,
                    description TEXT NOT NULL,
                    category TEXT NOT NULL,
                    priority TEXT NOT NULL DEFAULT 'medium',
                    status TEXT NOT NULL DEFAULT 'new',
                    reporter_id INTEGER NOT NULL,
                    assignee_id INTEGER,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    resolved_at TEXT,
                    closed_at TEXT,
                    sla_response_deadline TEXT,
                    sla_resolution_deadline TEXT,
                    sla_flag TEXT NOT NULL DEFAULT 'ok',
                    FOREIGN KEY (reporter_id) REFERENCES users(id),
                    FOREIGN KEY (assignee_id) REFERENCES users(id)
                );

                -- Append-only audit trail
                CREATE TABLE IF NOT EXISTS ticket_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ticket_id INTEGER NOT NULL,
                    from_status TEXT,
                    to_status TEXT NOT NULL,
                    actor_id INTEGER NOT NULL,
                    note TEXT,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (ticket_id) REFERENCES tickets(id),
                    FOREIGN KEY (actor_id) REFERENCES users(id)
                );

                CREATE TRIGGER IF NOT EXISTS ticket_history_no_update
                BEFORE UPDATE ON ticket_history
                BEGIN
                    SELECT RAISE(ABORT, 'ticket history is append-only');
                END;

                CREATE TRIGGER IF NOT EXISTS ticket_history_no_delete
                BEFORE DELETE ON ticket_history
                BEGIN
                    SELECT RAISE(ABORT, 'ticket history is append-only');
                END;

                -- Indexes
                CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
                CREATE INDEX IF NOT EXISTS idx_tickets_priority ON tickets(priority);
                CREATE INDEX IF NOT EXISTS idx_tickets_assignee ON tickets(assignee_id);
                CREATE INDEX IF NOT EXISTS idx_tickets_reporter ON tickets(reporter_id);
                CREATE INDEX IF NOT EXISTS idx_history_ticket ON ticket_history(ticket_id, created_at);
                "#,
            )?;

            self.conn
                .execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;
        }

        self.conn.execute("PRAGMA foreign_keys = ON", [])?;

        Ok(())
    }

    // Users
    pub fn create_user(&self, username: &str, role: Role) -> Result<i64> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::Validation("Username must not be empty".to_string()));
        }
        if self.get_user_by_username(username)?.is_some() {
            return Err(Error::Validation(format!(
                "User '{}' already exists",
                username
            )));
        }

        self.conn.execute(
            "INSERT INTO users (username, role, active, created_at) VALUES (?1, ?2, 1, ?3)",
            params![username, role.as_str(), format_datetime(Utc::now())],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<Actor>> {
        let actor = self
            .conn
            .query_row(
                "SELECT id, username, role, active FROM users WHERE username = ?1",
                [username],
                actor_from_row,
            )
            .optional()?;
        Ok(actor)
    }

    pub fn list_users(&self) -> Result<Vec<Actor>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, username, role, active FROM users ORDER BY id")?;
        let users = stmt
            .query_map([], actor_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn set_user_active(&self, id: i64, active: bool) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE users SET active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        Ok(rows > 0)
    }
}

impl TicketStore for Database {
    fn in_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        // Already inside a unit of work: join it instead of nesting.
        if !self.conn.is_autocommit() {
            return f();
        }

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let value = f()?;
        tx.commit()?;
        Ok(value)
    }

    fn find_ticket(&self, id: i64) -> Result<Option<Ticket>> {
        let ticket = self
            .conn
            .query_row(
                &format!("SELECT {} FROM tickets WHERE id = ?1", TICKET_COLUMNS),
                [id],
                ticket_from_row,
            )
            .optional()?;
        Ok(ticket)
    }

    fn find_tickets_with_status_in(&self, statuses: &[Status]) -> Result<Vec<Ticket>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: Vec<String> = (1..=statuses.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "SELECT {} FROM tickets WHERE status IN ({}) ORDER BY id",
            TICKET_COLUMNS,
            placeholders.join(", ")
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let params_vec: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let tickets = stmt
            .query_map(rusqlite::params_from_iter(params_vec), ticket_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tickets)
    }

    fn find_by_status_resolved_before(
        &self,
        status: Status,
        threshold: DateTime<Utc>,
    ) -> Result<Vec<Ticket>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM tickets WHERE status = ?1 AND resolved_at IS NOT NULL AND resolved_at < ?2 ORDER BY id",
            TICKET_COLUMNS
        ))?;
        let tickets = stmt
            .query_map(
                params![status.as_str(), format_datetime(threshold)],
                ticket_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tickets)
    }

    fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        let mut sql = format!("SELECT {} FROM tickets", TICKET_COLUMNS);
        let mut conditions = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push(format!("status = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(status.as_str()));
        }

        if let Some(priority) = filter.priority {
            conditions.push(format!("priority = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(priority.as_str()));
        }

        if let Some(assignee_id) = filter.assignee_id {
            conditions.push(format!("assignee_id = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(assignee_id));
        }

        if let Some(reporter_id) = filter.reporter_id {
            conditions.push(format!("reporter_id = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(reporter_id));
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        sql.push_str(" ORDER BY id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let tickets = stmt
            .query_map(params_refs.as_slice(), ticket_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tickets)
    }

    fn ticket_number_exists(&self, ticket_number: &str) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tickets WHERE ticket_number = ?1)",
            [ticket_number],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn max_ticket_sequence(&self, prefix: &str, year: i32) -> Result<Option<u32>> {
        let stem = format!("{}-{}-", prefix, year);
        let mut stmt = self
            .conn
            .prepare("SELECT ticket_number FROM tickets WHERE substr(ticket_number, 1, ?1) = ?2")?;
        let numbers = stmt
            .query_map(params![stem.len() as i64, stem], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Padding widens past 9999, so compare numerically rather than in SQL.
        Ok(numbers
            .iter()
            .filter_map(|n| n.strip_prefix(&stem))
            .filter_map(|seq| seq.parse::<u32>().ok())
            .max())
    }

    fn insert_ticket(&self, ticket: &NewTicket) -> Result<Ticket> {
        let created = format_datetime(ticket.created_at);
        self.conn.execute(
            "INSERT INTO tickets (ticket_number, subject, description, category, priority, status, reporter_id, created_at, updated_at, sla_response_deadline, sla_resolution_deadline, sla_flag) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?9, ?10, ?11)",
            params![
                ticket.ticket_number,
                ticket.subject,
                ticket.description,
                ticket.category.as_str(),
                ticket.priority.as_str(),
                Status::New.as_str(),
                ticket.reporter_id,
                created,
                ticket.sla_response_deadline.map(format_datetime),
                ticket.sla_resolution_deadline.map(format_datetime),
                ticket.sla_flag.as_str(),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        self.find_ticket(id)?
            .ok_or_else(|| Error::NotFound(format!("Ticket #{}", id)))
    }

    fn save_ticket(&self, ticket: &Ticket) -> Result<()> {
        // subject, description, reporter and ticket number are immutable after creation.
        let rows = self.conn.execute(
            "UPDATE tickets SET category = ?1, priority = ?2, status = ?3, assignee_id = ?4, updated_at = ?5, resolved_at = ?6, closed_at = ?7, sla_response_deadline = ?8, sla_resolution_deadline = ?9, sla_flag = ?10 WHERE id = ?11",
            params![
                ticket.category.as_str(),
                ticket.priority.as_str(),
                ticket.status.as_str(),
                ticket.assignee_id,
                format_datetime(ticket.updated_at),
                ticket.resolved_at.map(format_datetime),
                ticket.closed_at.map(format_datetime),
                ticket.sla_response_deadline.map(format_datetime),
                ticket.sla_resolution_deadline.map(format_datetime),
                ticket.sla_flag.as_str(),
                ticket.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("Ticket #{}", ticket.id)));
        }
        Ok(())
    }

    fn append_history(&self, entry: &NewHistoryEntry) -> Result<HistoryEntry> {
        self.conn.execute(
            "INSERT INTO ticket_history (ticket_id, from_status, to_status, actor_id, note, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.ticket_id,
                entry.from_status.map(|s| s.as_str()),
                entry.to_status.as_str(),
                entry.actor_id,
                entry.note,
                format_datetime(entry.created_at),
            ],
        )?;

        Ok(HistoryEntry {
            id: self.conn.last_insert_rowid(),
            ticket_id: entry.ticket_id,
            from_status: entry.from_status,
            to_status: entry.to_status,
            actor_id: entry.actor_id,
            note: entry.note.clone(),
            created_at: entry.created_at,
        })
    }

    fn history_for(&self, ticket_id: i64) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ticket_id, from_status, to_status, actor_id, note, created_at FROM ticket_history WHERE ticket_id = ?1 ORDER BY created_at, id",
        )?;
        let entries = stmt
            .query_map([ticket_id], |row| {
                Ok(HistoryEntry {
                    id: row.get(0)?,
                    ticket_id: row.get(1)?,
                    from_status: row
                        .get::<_, Option<String>>(2)?
                        .map(|s| parse_column(2, &s))
                        .transpose()?,
                    to_status: parse_column(3, &row.get::<_, String>(3)?)?,
                    actor_id: row.get(4)?,
                    note: row.get(5)?,
                    created_at: parse_datetime(6, &row.get::<_, String>(6)?)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

impl ActorDirectory for Database {
    fn find_actor(&self, id: i64) -> Result<Option<Actor>> {
        let actor = self
            .conn
            .query_row(
                "SELECT id, username, role, active FROM users WHERE id = ?1",
                [id],
                actor_from_row,
            )
            .optional()?;
        Ok(actor)
    }
}

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: row.get(0)?,
        ticket_number: row.get(1)?,
        subject: row.get(2)?,
        description: row.get(3)?,
        category: parse_column(4, &row.get::<_, String>(4)?)?,
        priority: parse_column(5, &row.get::<_, String>(5)?)?,
        status: parse_column(6, &row.get::<_, String>(6)?)?,
        reporter_id: row.get(7)?,
        assignee_id: row.get(8)?,
        created_at: parse_datetime(9, &row.get::<_, String>(9)?)?,
        updated_at: parse_datetime(10, &row.get::<_, String>(10)?)?,
        resolved_at: parse_optional_datetime(11, row.get(11)?)?,
        closed_at: parse_optional_datetime(12, row.get(12)?)?,
        sla_response_deadline: parse_optional_datetime(13, row.get(13)?)?,
        sla_resolution_deadline: parse_optional_datetime(14, row.get(14)?)?,
        sla_flag: parse_column(15, &row.get::<_, String>(15)?)?,
    })
}

fn actor_from_row(row: &Row<'_>) -> rusqlite::Result<Actor> {
    Ok(Actor {
        id: row.get(0)?,
        username: row.get(1)?,
        role: parse_column(2, &row.get::<_, String>(2)?)?,
        active: row.get(3)?,
    })
}

fn parse_column<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = Error>,
{
    value
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Fixed-width UTC text so lexical order in SQL matches time order.
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_datetime(idx: usize, s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_datetime(idx, &s)).transpose()
}
