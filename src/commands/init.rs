use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use deskflow::config::TEMPLATE;
use deskflow::db::Database;

use super::{CONFIG_FILE, DB_FILE};

pub fn run(path: &Path, force: bool) -> Result<()> {
    let deskflow_dir = path.join(".deskflow");
    let config_path = deskflow_dir.join(CONFIG_FILE);

    let dir_exists = deskflow_dir.exists();
    let config_exists = config_path.exists();

    if dir_exists && config_exists && !force {
        println!("Already initialized at {}", path.display());
        println!("Use --force to restore the default configuration.");
        return Ok(());
    }

    if !dir_exists {
        fs::create_dir_all(&deskflow_dir).context("Failed to create .deskflow directory")?;
    }

    // Opening creates the schema.
    Database::open(&deskflow_dir.join(DB_FILE))?;

    if !config_exists || force {
        fs::write(&config_path, TEMPLATE).context("Failed to write config.toml")?;
        if config_exists {
            println!("Restored {}", config_path.display());
        } else {
            println!("Created {}", config_path.display());
        }
    }

    println!("Deskflow initialized at {}", deskflow_dir.display());
    println!("\nNext steps:");
    println!("  deskflow user add admin --role admin");
    println!("  deskflow --as admin create \"Subject\" -d \"Description\" -c hardware");

    Ok(())
}
