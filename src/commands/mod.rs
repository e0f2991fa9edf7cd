pub mod create;
pub mod export;
pub mod init;
pub mod jobs;
pub mod list;
pub mod show;
pub mod status;
pub mod update;
pub mod user;

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use deskflow::clock::{Clock, SystemClock};
use deskflow::config::Config;
use deskflow::db::Database;
use deskflow::models::Actor;
use deskflow::service::TicketService;
use deskflow::store::ActorDirectory;

pub type Service = TicketService<Database, SystemClock>;

pub const DB_FILE: &str = "deskflow.db";
pub const CONFIG_FILE: &str = "config.toml";

/// Open the database under `deskflow_dir` and wire the engine from its config.
pub fn open_service(deskflow_dir: &Path) -> Result<Service> {
    let config = Config::load(&deskflow_dir.join(CONFIG_FILE))
        .context("Failed to load configuration")?;
    let db = Database::open(&deskflow_dir.join(DB_FILE)).context("Failed to open database")?;
    build_service(db, &config)
}

pub fn build_service(db: Database, config: &Config) -> Result<Service> {
    let issuer = config.issuer()?;
    issuer.prime(&db, SystemClock.now())?;

    Ok(TicketService::new(
        db,
        SystemClock,
        Arc::new(issuer),
        config.workflow()?,
        config.sla_policy()?,
    ))
}

/// Resolve the `--as` user. Every ticket command acts on someone's behalf.
pub fn acting_user(service: &Service, username: Option<&str>) -> Result<Actor> {
    let Some(username) = username else {
        bail!("No acting user. Pass --as <username> or set DESKFLOW_USER.");
    };

    match service.store().get_user_by_username(username)? {
        Some(actor) => Ok(actor),
        None => bail!("User '{}' not found", username),
    }
}

fn display_user(service: &Service, id: i64) -> String {
    match service.store().find_actor(id) {
        Ok(Some(actor)) => actor.username,
        _ => format!("#{}", id),
    }
}
