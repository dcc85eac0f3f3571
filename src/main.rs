use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use classdesk::auth::{ensure_admin, PasswordService};
use classdesk::config::Config;
use classdesk::store::{audit, AuditView};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "classdesk", version, about = "Classroom admin backend")]
struct Cli {
    /// Path to config.toml (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `classdesk=trace`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP gateway
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create the admin account if it is missing, then exit
    Bootstrap,
    /// Print the audit trail, newest first
    Audit,
    /// Print the stored digest for a plaintext password
    HashPassword { plaintext: String },
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("classdesk=info,tower_http=info")),
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let port = port.unwrap_or(config.gateway.port);
            classdesk::gateway::run_gateway(&host, port, config).await?;
        }
        Commands::Bootstrap => {
            let db = config.open_database()?;
            let passwords = PasswordService::new(config.auth.hash_rounds);
            let created = ensure_admin(&db, &passwords, &config.auth.admin_password)
                .context("Admin bootstrap failed")?;
            if created {
                println!("Created admin account");
            } else {
                println!("Admin account already exists");
            }
        }
        Commands::Audit => {
            let db = config.open_database()?;
            let conn = db.conn()?;
            for entry in audit::list_all(&conn)? {
                let view = AuditView::from(&entry);
                println!(
                    "{:>6}  {}  {:<16}  {}",
                    view.id,
                    view.timestamp,
                    view.username.as_deref().unwrap_or("-"),
                    view.action
                );
            }
        }
        Commands::HashPassword { plaintext } => {
            let passwords = PasswordService::new(config.auth.hash_rounds);
            println!("{}", passwords.hash(&plaintext)?);
        }
    }
    Ok(())
}
