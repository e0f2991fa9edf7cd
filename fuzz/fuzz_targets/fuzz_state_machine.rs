#![no_main]

//! Fuzz target for the ticket status machine.
//!
//! Drives arbitrary sequences of status changes, updates and batch jobs
//! against a scratch database and checks that every accepted change left
//! exactly one matching history entry and every rejected one left none.

use arbitrary::Arbitrary;
use chrono::{Duration, TimeZone, Utc};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use tempfile::tempdir;

use deskflow::clock::ManualClock;
use deskflow::config::{Config, TEMPLATE};
use deskflow::db::Database;
use deskflow::models::{Category, Priority, Role, Status};
use deskflow::service::{CreateTicket, TicketService, UpdateTicket};
use deskflow::store::TicketStore;

#[derive(Arbitrary, Debug)]
enum Op {
    Change { status: u8, actor: u8, note: bool },
    Assign { actor: u8 },
    Reprioritize { priority: u8 },
    Advance { minutes: u16 },
    Sweep,
    AutoClose { days: u8 },
}

#[derive(Arbitrary, Debug)]
struct Input {
    priority: u8,
    ops: Vec<Op>,
}

fuzz_target!(|input: Input| {
    let dir = match tempdir() {
        Ok(d) => d,
        Err(_) => return,
    };
    let db = match Database::open(&dir.path().join("fuzz.db")) {
        Ok(d) => d,
        Err(_) => return,
    };

    let users = [
        db.create_user("reporter", Role::EndUser).unwrap(),
        db.create_user("other", Role::EndUser).unwrap(),
        db.create_user("agent", Role::Agent).unwrap(),
        db.create_user("admin", Role::Admin).unwrap(),
    ];

    let config = Config::parse(TEMPLATE).unwrap();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
    ));
    let service = TicketService::new(
        db,
        clock.clone(),
        Arc::new(config.issuer().unwrap()),
        config.workflow().unwrap(),
        config.sla_policy().unwrap(),
    );

    let pick_priority = |p: u8| Priority::ALL[p as usize % Priority::ALL.len()];
    let ticket = service
        .create_ticket(
            CreateTicket {
                subject: "Fuzzed ticket".to_string(),
                description: "Generated by the state machine fuzzer".to_string(),
                priority: Some(pick_priority(input.priority)),
                category: Some(Category::Software),
            },
            users[0],
        )
        .unwrap();

    for op in input.ops.into_iter().take(64) {
        let before = service.store().history_for(ticket.id).unwrap().len();

        match op {
            Op::Change { status, actor, note } => {
                let from = service.store().find_ticket(ticket.id).unwrap().unwrap().status;
                let to = Status::ALL[status as usize % Status::ALL.len()];
                let actor = users[actor as usize % users.len()];
                let note = if note { Some("fuzz note") } else { None };

                let result = service.change_status(ticket.id, to, note, actor);
                let history = service.store().history_for(ticket.id).unwrap();
                match result {
                    Ok(t) => {
                        assert_eq!(t.status, to);
                        assert_eq!(history.len(), before + 1);
                        let last = history.last().unwrap();
                        assert_eq!(last.from_status, Some(from));
                        assert_eq!(last.to_status, to);
                    }
                    Err(_) => assert_eq!(history.len(), before),
                }
            }
            Op::Assign { actor } => {
                let actor = users[actor as usize % users.len()];
                let _ = service.update_ticket(
                    ticket.id,
                    UpdateTicket {
                        assignee_id: Some(users[2]),
                        ..Default::default()
                    },
                    actor,
                );
            }
            Op::Reprioritize { priority } => {
                let _ = service.update_ticket(
                    ticket.id,
                    UpdateTicket {
                        priority: Some(pick_priority(priority)),
                        ..Default::default()
                    },
                    users[3],
                );
            }
            Op::Advance { minutes } => clock.advance(Duration::minutes(minutes as i64)),
            Op::Sweep => {
                service.run_sla_sweep().unwrap();
                assert_eq!(service.run_sla_sweep().unwrap().updated, 0);
            }
            Op::AutoClose { days } => {
                let report = service.run_auto_close((days % 14) as i64).unwrap();
                let history = service.store().history_for(ticket.id).unwrap();
                assert_eq!(history.len(), before + report.closed);
            }
        }

        let current = service.store().find_ticket(ticket.id).unwrap().unwrap();
        let history = service.store().history_for(ticket.id).unwrap();
        assert_eq!(history.last().unwrap().to_status, current.status);
        if !current.status.is_sla_tracked() {
            assert_eq!(current.sla_flag, deskflow::models::SlaFlag::Ok);
        }
    }
});
