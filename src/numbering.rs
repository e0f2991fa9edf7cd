//! Human-readable ticket numbers of the form `PREFIX-YEAR-SEQ`.
//!
//! The counter is the only shared mutable state in the engine. It lives
//! behind a mutex together with the year it belongs to, and every candidate
//! is checked against the store before it is handed out. The store's unique
//! index on `ticket_number` remains the final authority.

use chrono::{DateTime, Datelike, Utc};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::store::TicketStore;

pub const DEFAULT_PREFIX: &str = "ITSM";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10_000;

#[derive(Debug)]
struct Counter {
    year: i32,
    sequence: u32,
}

#[derive(Debug)]
pub struct TicketNumberIssuer {
    prefix: String,
    max_attempts: u32,
    counter: Mutex<Counter>,
}

impl TicketNumberIssuer {
    pub fn new(prefix: &str, max_attempts: u32) -> Result<Self> {
        validate_prefix(prefix)?;
        if max_attempts == 0 {
            return Err(Error::Config(
                "numbering.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(TicketNumberIssuer {
            prefix: prefix.to_string(),
            max_attempts,
            counter: Mutex::new(Counter {
                year: 0,
                sequence: 0,
            }),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn format(&self, year: i32, sequence: u32) -> String {
        format!("{}-{}-{:04}", self.prefix, year, sequence)
    }

    /// Seed the counter from what the store already holds for `now`'s year.
    pub fn prime<S: TicketStore>(&self, store: &S, now: DateTime<Utc>) -> Result<()> {
        let year = now.year();
        let highest = store.max_ticket_sequence(&self.prefix, year)?.unwrap_or(0);

        let mut counter = self.lock();
        if counter.year != year {
            counter.year = year;
            counter.sequence = 0;
        }
        counter.sequence = counter.sequence.max(highest);
        debug!(prefix = %self.prefix, year, sequence = counter.sequence, "primed ticket counter");
        Ok(())
    }

    /// Hand out the next free number for the year of `now`.
    pub fn next_number<S: TicketStore>(&self, store: &S, now: DateTime<Utc>) -> Result<String> {
        let year = now.year();
        let mut counter = self.lock();

        if counter.year != year {
            if counter.year != 0 {
                debug!(from = counter.year, to = year, "ticket counter rolled over");
            }
            counter.year = year;
            counter.sequence = 0;
        }

        for attempt in 1..=self.max_attempts {
            counter.sequence = counter.sequence.checked_add(1).ok_or_else(|| {
                Error::NumberExhausted {
                    prefix: self.prefix.clone(),
                    year,
                    attempts: attempt,
                }
            })?;
            let candidate = self.format(year, counter.sequence);

            if !store.ticket_number_exists(&candidate)? {
                if attempt > 1 {
                    warn!(%candidate, attempts = attempt, "ticket counter had drifted from the store");
                }
                return Ok(candidate);
            }
            debug!(%candidate, "ticket number already taken");
        }

        Err(Error::NumberExhausted {
            prefix: self.prefix.clone(),
            year,
            attempts: self.max_attempts,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counter> {
        // The counter is re-validated against the store on every call.
        self.counter.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::Config(format!(
            "Ticket prefix '{}' must be non-empty ASCII letters or digits",
            prefix
        )));
    }
    Ok(())
}
