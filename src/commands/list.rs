use anyhow::{bail, Result};

use deskflow::models::{Actor, Priority, SlaFlag, Status, TicketFilter};

use super::Service;

pub fn run(
    service: &Service,
    actor: &Actor,
    status: Option<&str>,
    priority: Option<&str>,
    assignee: Option<&str>,
) -> Result<()> {
    let assignee_id = match assignee {
        Some(name) => match service.store().get_user_by_username(name)? {
            Some(user) => Some(user.id),
            None => bail!("User '{}' not found", name),
        },
        None => None,
    };

    let filter = TicketFilter {
        status: status.map(str::parse::<Status>).transpose()?,
        priority: priority.map(str::parse::<Priority>).transpose()?,
        assignee_id,
        reporter_id: None,
    };
    let tickets = service.list_tickets(&filter, actor.id)?;

    if tickets.is_empty() {
        println!("No tickets found.");
        return Ok(());
    }

    for ticket in tickets {
        let status_display = format!("[{}]", ticket.status);
        let sla = match ticket.sla_flag {
            SlaFlag::Ok => String::new(),
            flag => format!(" SLA:{}", flag),
        };
        println!(
            "{:<16} {:13} {:<40} {:8} {}{}",
            ticket.ticket_number,
            status_display,
            truncate(&ticket.subject, 40),
            ticket.priority,
            ticket.created_at.format("%Y-%m-%d"),
            sla
        );
    }

    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars - 3).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{create_ticket, setup};
    use proptest::prelude::*;

    #[test]
    fn test_list_empty() {
        let fx = setup();
        assert!(run(&fx.service, &fx.agent, None, None, None).is_ok());
    }

    #[test]
    fn test_list_with_filters() {
        let fx = setup();
        create_ticket(&fx);
        assert!(run(&fx.service, &fx.agent, Some("new"), Some("high"), None).is_ok());
        assert!(run(&fx.service, &fx.reporter, None, None, None).is_ok());
        assert!(run(&fx.service, &fx.agent, None, None, Some("bob")).is_ok());
    }

    #[test]
    fn test_list_invalid_filters() {
        let fx = setup();
        assert!(run(&fx.service, &fx.agent, Some("open"), None, None).is_err());
        assert!(run(&fx.service, &fx.agent, None, Some("urgent"), None).is_err());
        assert!(run(&fx.service, &fx.agent, None, None, Some("ghost")).is_err());
    }

    #[test]
    fn test_truncate_short() {
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn test_truncate_long() {
        assert_eq!(truncate("this is a very long string", 10), "this is...");
    }

    #[test]
    fn test_truncate_unicode() {
        assert_eq!(truncate("日本語のテキストです", 6), "日本語...");
    }

    proptest! {
        #[test]
        fn prop_truncate_never_exceeds_limit(s in ".{0,100}", max in 4usize..50) {
            let result = truncate(&s, max);
            prop_assert!(result.chars().count() <= max);
        }
    }
}
