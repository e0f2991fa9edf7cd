use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};

use deskflow::models::{Actor, HistoryEntry, Ticket, TicketFilter};
use deskflow::store::TicketStore;

use super::Service;

pub const EXPORT_VERSION: i32 = 1;

#[derive(Serialize)]
pub struct ExportedTicket {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub history: Vec<HistoryEntry>,
}

#[derive(Serialize)]
pub struct ExportData {
    pub version: i32,
    pub exported_at: String,
    pub tickets: Vec<ExportedTicket>,
}

fn collect(service: &Service, actor: &Actor) -> Result<ExportData> {
    if !actor.role.is_staff() {
        bail!("Unauthorized: only agents and admins can export tickets");
    }

    let mut tickets = service.list_tickets(&TicketFilter::default(), actor.id)?;
    tickets.reverse();

    let exported = tickets
        .into_iter()
        .map(|ticket| -> Result<ExportedTicket> {
            let history = service.store().history_for(ticket.id)?;
            Ok(ExportedTicket { ticket, history })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ExportData {
        version: EXPORT_VERSION,
        exported_at: chrono::Utc::now().to_rfc3339(),
        tickets: exported,
    })
}

pub fn run_json(service: &Service, actor: &Actor, output_path: Option<&str>) -> Result<()> {
    let data = collect(service, actor)?;
    let json = serde_json::to_string_pretty(&data)?;

    match output_path {
        Some(path) => {
            fs::write(path, json).context("Failed to write export file")?;
            eprintln!("Exported {} tickets to {}", data.tickets.len(), path);
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", json)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{create_ticket, setup};
    use tempfile::tempdir;

    #[test]
    fn test_export_to_file() {
        let fx = setup();
        let first = create_ticket(&fx);
        create_ticket(&fx);

        let dir = tempdir().unwrap();
        let path = dir.path().join("export.json");
        run_json(&fx.service, &fx.agent, Some(path.to_str().unwrap())).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["version"], EXPORT_VERSION);
        let tickets = value["tickets"].as_array().unwrap();
        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0]["ticket_number"], first.ticket_number.as_str());
        assert_eq!(tickets[0]["status"], "new");
        assert_eq!(tickets[0]["history"][0]["to_status"], "new");
        assert!(tickets[0]["history"][0]["from_status"].is_null());
    }

    #[test]
    fn test_export_requires_staff() {
        let fx = setup();
        let result = run_json(&fx.service, &fx.reporter, None);
        assert!(result.unwrap_err().to_string().contains("Unauthorized"));
    }

    #[test]
    fn test_export_empty() {
        let fx = setup();
        let data = collect(&fx.service, &fx.admin).unwrap();
        assert!(data.tickets.is_empty());
    }
}
