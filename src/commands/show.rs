use anyhow::Result;
use chrono::{DateTime, Utc};

use deskflow::models::Actor;

use super::{display_user, Service};

fn stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn run(service: &Service, actor: &Actor, id: i64) -> Result<()> {
    let ticket = service.get_ticket(id, actor.id)?;
    let history = service.ticket_history(id, actor.id)?;

    println!("Ticket {} (#{}): {}", ticket.ticket_number, ticket.id, ticket.subject);
    println!("Status: {}", ticket.status);
    println!("Priority: {}", ticket.priority);
    println!("Category: {}", ticket.category);
    println!("Reporter: {}", display_user(service, ticket.reporter_id));
    match ticket.assignee_id {
        Some(assignee) => println!("Assignee: {}", display_user(service, assignee)),
        None => println!("Assignee: (none)"),
    }
    println!("Created: {}", stamp(ticket.created_at));
    println!("Updated: {}", stamp(ticket.updated_at));
    if let Some(resolved) = ticket.resolved_at {
        println!("Resolved: {}", stamp(resolved));
    }
    if let Some(closed) = ticket.closed_at {
        println!("Closed: {}", stamp(closed));
    }

    println!("\nSLA: {}", ticket.sla_flag);
    if let Some(deadline) = ticket.sla_response_deadline {
        println!("  Respond by: {}", stamp(deadline));
    }
    if let Some(deadline) = ticket.sla_resolution_deadline {
        println!("  Resolve by: {}", stamp(deadline));
    }

    println!("\nDescription:");
    for line in ticket.description.lines() {
        println!("  {}", line);
    }

    if !history.is_empty() {
        println!("\nHistory:");
        for entry in history {
            let from = entry
                .from_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            print!(
                "  [{}] {} -> {} by {}",
                entry.created_at.format("%Y-%m-%d %H:%M"),
                from,
                entry.to_status,
                display_user(service, entry.actor_id)
            );
            match entry.note {
                Some(note) => println!(": {}", note),
                None => println!(),
            }
        }
    }

    Ok(())
}
