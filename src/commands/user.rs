use anyhow::{bail, Result};

use deskflow::db::Database;
use deskflow::models::{Actor, Role};

/// Only admins manage users, except for the very first account.
fn ensure_can_manage(db: &Database, actor: Option<&Actor>) -> Result<()> {
    if db.list_users()?.is_empty() {
        return Ok(());
    }

    match actor {
        Some(a) if a.role == Role::Admin && a.active => Ok(()),
        Some(a) => bail!("Unauthorized: user '{}' is not an active admin", a.username),
        None => bail!("No acting user. Pass --as <username> or set DESKFLOW_USER."),
    }
}

fn lookup(db: &Database, username: Option<&str>) -> Result<Option<Actor>> {
    match username {
        Some(name) => match db.get_user_by_username(name)? {
            Some(actor) => Ok(Some(actor)),
            None => bail!("User '{}' not found", name),
        },
        None => Ok(None),
    }
}

pub fn add(db: &Database, acting: Option<&str>, username: &str, role: &str) -> Result<()> {
    let actor = lookup(db, acting)?;
    ensure_can_manage(db, actor.as_ref())?;

    let role: Role = role.parse()?;
    let id = db.create_user(username, role)?;
    println!("Created user #{} {} ({})", id, username.trim(), role);
    Ok(())
}

pub fn list(db: &Database) -> Result<()> {
    let users = db.list_users()?;
    if users.is_empty() {
        println!("No users found.");
        return Ok(());
    }

    for user in users {
        let state = if user.active { "" } else { " (inactive)" };
        println!("#{:<4} {:<20} {}{}", user.id, user.username, user.role, state);
    }
    Ok(())
}

pub fn deactivate(db: &Database, acting: Option<&str>, username: &str) -> Result<()> {
    let actor = lookup(db, acting)?;
    ensure_can_manage(db, actor.as_ref())?;

    let target = match db.get_user_by_username(username)? {
        Some(t) => t,
        None => bail!("User '{}' not found", username),
    };
    if !target.active {
        println!("User '{}' is already inactive", target.username);
        return Ok(());
    }

    db.set_user_active(target.id, false)?;
    println!("Deactivated user '{}'", target.username);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup_test_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(&db_path).unwrap();
        (db, dir)
    }

    #[test]
    fn test_first_user_needs_no_actor() {
        let (db, _dir) = setup_test_db();
        add(&db, None, "admin", "admin").unwrap();

        let admin = db.get_user_by_username("admin").unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.active);
    }

    #[test]
    fn test_later_users_need_admin() {
        let (db, _dir) = setup_test_db();
        add(&db, None, "admin", "admin").unwrap();
        add(&db, Some("admin"), "bob", "agent").unwrap();

        let result = add(&db, None, "carol", "end_user");
        assert!(result.is_err());

        let result = add(&db, Some("bob"), "carol", "end_user");
        assert!(result.unwrap_err().to_string().contains("Unauthorized"));
    }

    #[test]
    fn test_invalid_role() {
        let (db, _dir) = setup_test_db();
        let result = add(&db, None, "admin", "superuser");
        assert!(result.unwrap_err().to_string().contains("Invalid role"));
    }

    #[test]
    fn test_unknown_acting_user() {
        let (db, _dir) = setup_test_db();
        add(&db, None, "admin", "admin").unwrap();
        let result = add(&db, Some("ghost"), "bob", "agent");
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[test]
    fn test_deactivate() {
        let (db, _dir) = setup_test_db();
        add(&db, None, "admin", "admin").unwrap();
        add(&db, Some("admin"), "bob", "agent").unwrap();

        deactivate(&db, Some("admin"), "bob").unwrap();
        let bob = db.get_user_by_username("bob").unwrap().unwrap();
        assert!(!bob.active);

        // Idempotent.
        assert!(deactivate(&db, Some("admin"), "bob").is_ok());
        assert!(deactivate(&db, Some("admin"), "nobody").is_err());
    }

    #[test]
    fn test_list_empty_and_populated() {
        let (db, _dir) = setup_test_db();
        assert!(list(&db).is_ok());
        add(&db, None, "admin", "admin").unwrap();
        assert!(list(&db).is_ok());
    }
}
