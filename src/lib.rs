//! Ticket lifecycle engine for a helpdesk.
//!
//! The engine is written against the [`store::TicketStore`] and
//! [`store::ActorDirectory`] traits and a [`clock::Clock`]; [`db::Database`]
//! is the SQLite implementation used by the `deskflow` binary.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod jobs;
pub mod models;
pub mod numbering;
pub mod scheduler;
pub mod service;
pub mod sla;
pub mod store;
pub mod workflow;

pub use error::{Error, Result};
