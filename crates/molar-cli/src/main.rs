mod config;
mod item_cmds;
mod plan_cmds;
mod serve_cmd;
mod status_cmd;

use clap::{Parser, Subcommand};

use molar_db::pool;

use config::MolarConfig;

#[derive(Parser)]
#[command(
    name = "molar",
    about = "Treatment plan lifecycle and pricing engine for dental practices"
)]
struct Cli {
    /// Database URL (overrides MOLAR_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Path to the service catalog TOML file (overrides MOLAR_CATALOG env var)
    #[arg(long, global = true)]
    catalog: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a molar config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/molar")]
        db_url: String,
        /// Path to the service catalog TOML file
        #[arg(long)]
        catalog_path: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the molar database (requires config file or env vars)
    DbInit,
    /// Plan management
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Item management
    Item {
        #[command(subcommand)]
        command: ItemCommands,
    },
    /// Show plan status and item progress (omit plan_id to list all plans)
    Status {
        /// Plan ID to show status for (omit to list all plans)
        plan_id: Option<String>,
    },
    /// Serve the HTTP API
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 7310)]
        port: u16,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Create a new draft plan
    Create {
        /// Patient ID
        patient: String,
        /// Practitioner ID
        practitioner: String,
        /// Plan title
        title: String,
        /// Free-text description
        #[arg(long)]
        description: Option<String>,
        /// Priority: low, medium, high, urgent (default: medium)
        #[arg(long)]
        priority: Option<String>,
        /// Internal notes (not shown to the patient)
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show plan details with items (or list plans)
    Show {
        /// Plan ID to show (omit to list)
        plan_id: Option<String>,
        /// When listing, only show plans for this patient
        #[arg(long)]
        patient: Option<String>,
    },
    /// Present a plan to the patient
    Present {
        /// Plan ID to present
        plan_id: String,
    },
    /// Record the patient's acceptance
    Accept {
        /// Plan ID to accept
        plan_id: String,
    },
    /// Record a rejection
    Reject {
        /// Plan ID to reject
        plan_id: String,
        /// Reason for the rejection
        #[arg(long)]
        reason: Option<String>,
    },
    /// Cancel an active plan
    Cancel {
        /// Plan ID to cancel
        plan_id: String,
        /// Reason for the cancellation (required)
        #[arg(long)]
        reason: String,
    },
}

#[derive(Subcommand)]
pub enum ItemCommands {
    /// Add a priced procedure to a draft plan
    Add {
        /// Plan ID to add the item to
        plan_id: String,
        /// Service ID from the catalog
        service_id: String,
        /// Selected material option ID
        #[arg(long)]
        material: Option<String>,
        /// Item notes
        #[arg(long)]
        notes: Option<String>,
        /// Estimated date (YYYY-MM-DD)
        #[arg(long)]
        estimated_date: Option<String>,
    },
    /// Remove a pending item from a draft plan
    Remove {
        /// Item ID to remove
        item_id: String,
    },
    /// Edit an item's notes or estimated date
    Edit {
        /// Item ID to edit
        item_id: String,
        /// The item version the edit is based on
        #[arg(long)]
        item_version: i32,
        /// New notes
        #[arg(long)]
        notes: Option<String>,
        /// New estimated date (YYYY-MM-DD)
        #[arg(long)]
        estimated_date: Option<String>,
    },
    /// Complete an item manually (administrative override, no episode)
    Complete {
        /// Item ID to complete
        item_id: String,
    },
    /// Link a clinical episode to an item, completing it
    Link {
        /// Item ID the episode realizes
        item_id: String,
        /// Episode ID
        episode_id: String,
        /// Episode date-time (RFC 3339); defaults to now
        #[arg(long)]
        date: Option<String>,
    },
}

/// Execute the `molar init` command: write config file.
fn cmd_init(db_url: &str, catalog_path: Option<&str>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        catalog: catalog_path.map(|p| config::CatalogSection {
            path: p.to_string(),
        }),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    if let Some(p) = catalog_path {
        println!("  catalog.path = {p}");
    }
    println!();
    println!("Next: run `molar db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `molar db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = MolarConfig::resolve(cli_db_url, None)?;

    println!("Initializing molar database...");

    // 1. Create the database if it does not exist.
    pool::ensure_database_exists(&resolved.db_config).await?;

    // 2. Connect to the target database.
    let db_pool = pool::create_pool(&resolved.db_config).await?;

    // 3. Run migrations.
    pool::run_migrations(&db_pool).await?;

    // 4. Print success with table counts.
    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    // 5. Clean shutdown.
    db_pool.close().await;

    println!("molar db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            db_url,
            catalog_path,
            force,
        } => {
            cmd_init(&db_url, catalog_path.as_deref(), force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Plan { command } => {
            let resolved = MolarConfig::resolve(cli.database_url.as_deref(), cli.catalog.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = plan_cmds::run_plan_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Item { command } => {
            let resolved = MolarConfig::resolve(cli.database_url.as_deref(), cli.catalog.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = item_cmds::run_item_command(command, &db_pool, &resolved).await;
            db_pool.close().await;
            result?;
        }
        Commands::Status { plan_id } => {
            let resolved = MolarConfig::resolve(cli.database_url.as_deref(), cli.catalog.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = status_cmd::run_status(&db_pool, plan_id.as_deref()).await;
            db_pool.close().await;
            result?;
        }
        Commands::Serve { bind, port } => {
            let resolved = MolarConfig::resolve(cli.database_url.as_deref(), cli.catalog.as_deref())?;
            let catalog =
                molar_core::catalog::TomlCatalog::from_path(resolved.require_catalog()?)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = serve_cmd::run_serve(db_pool.clone(), catalog, &bind, port).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
