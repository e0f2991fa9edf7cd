use anyhow::Result;

use deskflow::models::{Actor, Status};

use super::Service;

pub fn run(
    service: &Service,
    actor: &Actor,
    id: i64,
    to: &str,
    note: Option<&str>,
) -> Result<()> {
    let to: Status = to.parse()?;
    let ticket = service.change_status(id, to, note, actor.id)?;

    println!("Ticket {} is now {}", ticket.ticket_number, ticket.status);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{create_ticket, setup};
    use deskflow::service::UpdateTicket;
    use deskflow::store::TicketStore;

    #[test]
    fn test_status_change_and_history() {
        let fx = setup();
        let ticket = create_ticket(&fx);
        fx.service
            .update_ticket(
                ticket.id,
                UpdateTicket {
                    assignee_id: Some(fx.agent.id),
                    ..Default::default()
                },
                fx.agent.id,
            )
            .unwrap();

        run(&fx.service, &fx.agent, ticket.id, "in-progress", None).unwrap();
        run(&fx.service, &fx.agent, ticket.id, "resolved", Some("Swapped cable")).unwrap();

        let stored = fx.service.store().find_ticket(ticket.id).unwrap().unwrap();
        assert_eq!(stored.status, Status::Resolved);
        assert!(stored.resolved_at.is_some());
        assert_eq!(fx.service.store().history_for(ticket.id).unwrap().len(), 3);
    }

    #[test]
    fn test_invalid_status_name() {
        let fx = setup();
        let ticket = create_ticket(&fx);
        let result = run(&fx.service, &fx.agent, ticket.id, "done", None);
        assert!(result.unwrap_err().to_string().contains("Invalid status"));
    }

    #[test]
    fn test_guard_message_surfaces() {
        let fx = setup();
        let ticket = create_ticket(&fx);
        let result = run(&fx.service, &fx.agent, ticket.id, "in_progress", None);
        assert!(result.unwrap_err().to_string().contains("without an assignee"));
    }

    #[test]
    fn test_nonexistent_ticket() {
        let fx = setup();
        let result = run(&fx.service, &fx.agent, 99999, "closed", None);
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[test]
    fn test_cancel_from_template_config() {
        let fx = setup();
        let ticket = create_ticket(&fx);
        run(&fx.service, &fx.admin, ticket.id, "canceled", Some("Duplicate")).unwrap();

        let stored = fx.service.store().find_ticket(ticket.id).unwrap().unwrap();
        assert_eq!(stored.status, Status::Cancelled);
        assert!(stored.closed_at.is_some());
    }
}
