use anyhow::{Context, Result};

use deskflow::models::{Actor, Category, Priority};
use deskflow::service::CreateTicket;

use super::Service;

pub fn run(
    service: &Service,
    actor: &Actor,
    subject: &str,
    description: &str,
    category: Option<&str>,
    priority: Option<&str>,
) -> Result<()> {
    let category = category.map(str::parse::<Category>).transpose()?;
    let priority = priority.map(str::parse::<Priority>).transpose()?;

    let ticket = service
        .create_ticket(
            CreateTicket {
                subject: subject.to_string(),
                description: description.to_string(),
                priority,
                category,
            },
            actor.id,
        )
        .context("Failed to create ticket")?;

    println!("Created ticket {} (#{})", ticket.ticket_number, ticket.id);
    if let Some(deadline) = ticket.sla_resolution_deadline {
        println!("Resolve by: {}", deadline.format("%Y-%m-%d %H:%M UTC"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::setup;
    use deskflow::models::{Status, TicketFilter};
    use deskflow::store::TicketStore;

    #[test]
    fn test_create_ticket() {
        let fx = setup();
        run(
            &fx.service,
            &fx.reporter,
            "Keyboard missing keys",
            "The E and R keys fell off",
            Some("hardware"),
            Some("low"),
        )
        .unwrap();

        let tickets = fx.service.store().list_tickets(&TicketFilter::default()).unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].priority, Priority::Low);
        assert_eq!(tickets[0].category, Category::Hardware);
        assert_eq!(tickets[0].status, Status::New);
        assert!(tickets[0].ticket_number.starts_with("ITSM-"));
    }

    #[test]
    fn test_create_default_priority() {
        let fx = setup();
        run(
            &fx.service,
            &fx.reporter,
            "Wifi slow",
            "Office wifi is slow after lunch",
            Some("network"),
            None,
        )
        .unwrap();

        let tickets = fx.service.store().list_tickets(&TicketFilter::default()).unwrap();
        assert_eq!(tickets[0].priority, Priority::Medium);
        assert!(tickets[0].sla_resolution_deadline.is_some());
    }

    #[test]
    fn test_create_missing_category() {
        let fx = setup();
        let result = run(
            &fx.service,
            &fx.reporter,
            "Wifi slow",
            "Office wifi is slow after lunch",
            None,
            None,
        );
        let err = format!("{:#}", result.unwrap_err());
        assert!(err.contains("Category is required"));
    }

    #[test]
    fn test_create_invalid_priority() {
        let fx = setup();
        let result = run(
            &fx.service,
            &fx.reporter,
            "Wifi slow",
            "Office wifi is slow after lunch",
            Some("network"),
            Some("urgent"),
        );
        assert!(result.unwrap_err().to_string().contains("Invalid priority"));
    }

    #[test]
    fn test_create_sql_injection() {
        let fx = setup();
        let malicious = "'; DROP TABLE tickets; --";
        run(
            &fx.service,
            &fx.reporter,
            malicious,
            "Description long enough",
            Some("security"),
            None,
        )
        .unwrap();

        let tickets = fx.service.store().list_tickets(&TicketFilter::default()).unwrap();
        assert_eq!(tickets[0].subject, malicious);
    }
}
