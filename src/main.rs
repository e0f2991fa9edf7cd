mod commands;
mod daemon;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use deskflow::config::Config;
use deskflow::db::Database;

use commands::{acting_user, open_service, CONFIG_FILE, DB_FILE};

#[derive(Parser)]
#[command(name = "deskflow")]
#[command(about = "Helpdesk ticket lifecycle: workflow, SLA tracking and scheduled sweeps")]
#[command(version)]
struct Cli {
    /// Username to act as
    #[arg(long = "as", global = true, env = "DESKFLOW_USER")]
    acting: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize deskflow in the current directory
    Init {
        /// Overwrite config.toml with the default template
        #[arg(short, long)]
        force: bool,
    },

    /// Manage users
    User {
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Open a new ticket
    Create {
        /// Short summary
        subject: String,
        /// Full description
        #[arg(short, long)]
        description: String,
        /// Category (hardware, software, network, security, access, services)
        #[arg(short, long)]
        category: Option<String>,
        /// Priority (low, medium, high, critical)
        #[arg(short, long)]
        priority: Option<String>,
    },

    /// List tickets
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,
        /// Filter by priority
        #[arg(short, long)]
        priority: Option<String>,
        /// Filter by assignee username
        #[arg(short, long)]
        assignee: Option<String>,
    },

    /// Show ticket details and history
    Show {
        /// Ticket ID
        id: i64,
    },

    /// Move a ticket to another status
    Status {
        /// Ticket ID
        id: i64,
        /// Target status (in_progress, on_hold, resolved, closed, reopened, cancelled)
        status: String,
        /// Note recorded in the history (required when resolving)
        #[arg(short, long)]
        note: Option<String>,
    },

    /// Change priority, category or assignee
    Update {
        /// Ticket ID
        id: i64,
        /// New priority
        #[arg(short, long)]
        priority: Option<String>,
        /// New category
        #[arg(short, long)]
        category: Option<String>,
        /// Assignee username
        #[arg(short, long)]
        assign: Option<String>,
    },

    /// Export all tickets with history as JSON
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Re-evaluate SLA flags on all tracked tickets once
    Sweep,

    /// Close tickets resolved longer ago than the retention window
    AutoClose {
        /// Retention window in days (defaults to scheduler.auto_close_after_days)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Restart every ticket's SLA clock from now
    ReinitSla,

    /// Run the scheduler in the foreground
    Daemon,
}

#[derive(Subcommand)]
enum UserCommands {
    /// Add a user
    Add {
        username: String,
        /// Role (end_user, agent, admin)
        #[arg(short, long, default_value = "end_user")]
        role: String,
    },
    /// List users
    List,
    /// Deactivate a user
    Deactivate { username: String },
}

fn find_deskflow_dir() -> Result<PathBuf> {
    let mut current = env::current_dir()?;

    loop {
        let candidate = current.join(".deskflow");
        if candidate.exists() && candidate.is_dir() {
            return Ok(candidate);
        }

        if !current.pop() {
            bail!("Not a deskflow directory (or any parent). Run 'deskflow init' first.");
        }
    }
}

fn get_db() -> Result<Database> {
    let deskflow_dir = find_deskflow_dir()?;
    Database::open(&deskflow_dir.join(DB_FILE)).context("Failed to open database")
}

fn init_logging(json: bool, default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = match cli.command {
        Commands::Daemon => "info",
        _ => "warn",
    };
    init_logging(cli.json_logs, default_level);

    let acting = cli.acting.as_deref();

    match cli.command {
        Commands::Init { force } => {
            let cwd = env::current_dir()?;
            commands::init::run(&cwd, force)
        }

        Commands::User { action } => {
            let db = get_db()?;
            match action {
                UserCommands::Add { username, role } => {
                    commands::user::add(&db, acting, &username, &role)
                }
                UserCommands::List => commands::user::list(&db),
                UserCommands::Deactivate { username } => {
                    commands::user::deactivate(&db, acting, &username)
                }
            }
        }

        Commands::Create {
            subject,
            description,
            category,
            priority,
        } => {
            let service = open_service(&find_deskflow_dir()?)?;
            let actor = acting_user(&service, acting)?;
            commands::create::run(
                &service,
                &actor,
                &subject,
                &description,
                category.as_deref(),
                priority.as_deref(),
            )
        }

        Commands::List {
            status,
            priority,
            assignee,
        } => {
            let service = open_service(&find_deskflow_dir()?)?;
            let actor = acting_user(&service, acting)?;
            commands::list::run(
                &service,
                &actor,
                status.as_deref(),
                priority.as_deref(),
                assignee.as_deref(),
            )
        }

        Commands::Show { id } => {
            let service = open_service(&find_deskflow_dir()?)?;
            let actor = acting_user(&service, acting)?;
            commands::show::run(&service, &actor, id)
        }

        Commands::Status { id, status, note } => {
            let service = open_service(&find_deskflow_dir()?)?;
            let actor = acting_user(&service, acting)?;
            commands::status::run(&service, &actor, id, &status, note.as_deref())
        }

        Commands::Update {
            id,
            priority,
            category,
            assign,
        } => {
            let service = open_service(&find_deskflow_dir()?)?;
            let actor = acting_user(&service, acting)?;
            commands::update::run(
                &service,
                &actor,
                id,
                priority.as_deref(),
                category.as_deref(),
                assign.as_deref(),
            )
        }

        Commands::Export { output } => {
            let service = open_service(&find_deskflow_dir()?)?;
            let actor = acting_user(&service, acting)?;
            commands::export::run_json(&service, &actor, output.as_deref())
        }

        Commands::Sweep => {
            let service = open_service(&find_deskflow_dir()?)?;
            let actor = acting_user(&service, acting)?;
            commands::jobs::sweep(&service, &actor)
        }

        Commands::AutoClose { days } => {
            let deskflow_dir = find_deskflow_dir()?;
            let config = Config::load(&deskflow_dir.join(CONFIG_FILE))?;
            let service = open_service(&deskflow_dir)?;
            let actor = acting_user(&service, acting)?;
            let days = days.unwrap_or(config.scheduler.auto_close_after_days);
            commands::jobs::auto_close(&service, &actor, days)
        }

        Commands::ReinitSla => {
            let service = open_service(&find_deskflow_dir()?)?;
            let actor = acting_user(&service, acting)?;
            commands::jobs::reinit_sla(&service, &actor)
        }

        Commands::Daemon => {
            let deskflow_dir = find_deskflow_dir()?;
            let config = Config::load(&deskflow_dir.join(CONFIG_FILE))?;
            let service = open_service(&deskflow_dir)?;
            daemon::run(&service, &config)
        }
    }
}
