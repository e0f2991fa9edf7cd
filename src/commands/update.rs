use anyhow::{bail, Result};

use deskflow::models::{Actor, Category, Priority};
use deskflow::service::UpdateTicket;

use super::Service;

pub fn run(
    service: &Service,
    actor: &Actor,
    id: i64,
    priority: Option<&str>,
    category: Option<&str>,
    assignee: Option<&str>,
) -> Result<()> {
    if priority.is_none() && category.is_none() && assignee.is_none() {
        bail!("Nothing to update. Use --priority, --category, or --assign");
    }

    let assignee_id = match assignee {
        Some(name) => match service.store().get_user_by_username(name)? {
            Some(user) => Some(user.id),
            None => bail!("Assignee '{}' not found", name),
        },
        None => None,
    };

    let update = UpdateTicket {
        priority: priority.map(str::parse::<Priority>).transpose()?,
        category: category.map(str::parse::<Category>).transpose()?,
        assignee_id,
    };
    let ticket = service.update_ticket(id, update, actor.id)?;

    println!("Updated ticket {}", ticket.ticket_number);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{create_ticket, setup};
    use deskflow::models::{Role, SlaFlag};
    use deskflow::store::TicketStore;

    // ==================== Unit Tests ====================

    #[test]
    fn test_update_priority_moves_deadlines() {
        let fx = setup();
        let ticket = create_ticket(&fx);

        run(&fx.service, &fx.agent, ticket.id, Some("critical"), None, None).unwrap();

        let stored = fx.service.store().find_ticket(ticket.id).unwrap().unwrap();
        assert_eq!(stored.priority, Priority::Critical);
        assert!(stored.sla_response_deadline < ticket.sla_response_deadline);
        assert_eq!(stored.sla_flag, SlaFlag::Ok);
    }

    #[test]
    fn test_assign_by_username() {
        let fx = setup();
        let ticket = create_ticket(&fx);

        run(&fx.service, &fx.admin, ticket.id, None, None, Some("bob")).unwrap();

        let stored = fx.service.store().find_ticket(ticket.id).unwrap().unwrap();
        assert_eq!(stored.assignee_id, Some(fx.agent.id));
    }

    #[test]
    fn test_update_category() {
        let fx = setup();
        let ticket = create_ticket(&fx);

        run(&fx.service, &fx.agent, ticket.id, None, Some("software"), None).unwrap();
        let stored = fx.service.store().find_ticket(ticket.id).unwrap().unwrap();
        assert_eq!(stored.category, Category::Software);
    }

    #[test]
    fn test_update_nothing_fails() {
        let fx = setup();
        let ticket = create_ticket(&fx);
        let result = run(&fx.service, &fx.agent, ticket.id, None, None, None);
        assert!(result.unwrap_err().to_string().contains("Nothing to update"));
    }

    #[test]
    fn test_end_user_cannot_update() {
        let fx = setup();
        let ticket = create_ticket(&fx);
        let result = run(&fx.service, &fx.reporter, ticket.id, Some("critical"), None, None);
        assert!(result.unwrap_err().to_string().contains("Unauthorized"));
    }

    #[test]
    fn test_unknown_assignee() {
        let fx = setup();
        let ticket = create_ticket(&fx);
        let result = run(&fx.service, &fx.agent, ticket.id, None, None, Some("ghost"));
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[test]
    fn test_inactive_assignee() {
        let fx = setup();
        let ticket = create_ticket(&fx);
        let id = fx.service.store().create_user("eve", Role::Agent).unwrap();
        fx.service.store().set_user_active(id, false).unwrap();

        let result = run(&fx.service, &fx.agent, ticket.id, None, None, Some("eve"));
        assert!(result.unwrap_err().to_string().contains("inactive"));
    }

    #[test]
    fn test_update_nonexistent_ticket() {
        let fx = setup();
        let result = run(&fx.service, &fx.agent, 99999, Some("low"), None, None);
        assert!(result.unwrap_err().to_string().contains("not found"));
    }
}
