use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use transient_marshall::config::{DatabaseConfig, MarshallConfig};
use transient_marshall::database::SqliteStore;
use transient_marshall::identity::ActingUser;
use transient_marshall::store::TransientStore;
use transient_marshall::telemetry::init_telemetry;
use transient_marshall::workflow::{TransientRecord, TriageRequest, TriageService, WorkflowEngine};

#[derive(Parser)]
#[command(name = "marshall")]
#[command(about = "Triage workflow for astronomical transients")]
#[command(long_about = "Moves transients between the marshall's curation and alert lists, assigns \
                       principal investigators, sets observation priorities and records \
                       classifications, writing a history entry for every change.")]
struct Cli {
    /// Login of the acting user, recorded in the history log
    #[arg(long, global = true, env = "MARSHALL_USER", default_value = "marshall.bot")]
    user: String,

    /// Override the configured database URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and apply migrations
    InitDb,
    /// Start tracking a transient in the inbox
    Register {
        transient_id: i64,
        name: String,
        #[arg(long, allow_hyphen_values = true)]
        ra: f64,
        #[arg(long, allow_hyphen_values = true)]
        dec: f64,
    },
    /// Move a transient to another marshall and/or alert workflow list
    Move {
        transient_id: i64,
        /// Target marshallWorkflowLocation, e.g. "review for followup"
        #[arg(long)]
        mwl: Option<String>,
        /// Target alertWorkflowLocation, e.g. "queued for atel"
        #[arg(long)]
        awl: Option<String>,
        /// Snooze the object while moving it
        #[arg(long)]
        snooze: bool,
    },
    /// Assign the principal investigator of a transient
    SetPi {
        transient_id: i64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Set the observation priority; pass an empty string to clear it
    SetPriority { transient_id: i64, priority: String },
    /// Record a classification
    Classify {
        transient_id: i64,
        /// Observation date, YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS
        #[arg(long)]
        obsdate: String,
        #[arg(long)]
        source: String,
        #[arg(long = "type")]
        spectral_type: String,
        #[arg(long)]
        sub_type: Option<String>,
        #[arg(long)]
        redshift: Option<String>,
        #[arg(long)]
        wrt_max: Option<String>,
        #[arg(long)]
        phase: Option<String>,
        #[arg(long)]
        peculiar: bool,
    },
    /// Show the current workflow fields of a transient
    Show { transient_id: i64 },
    /// Print the history log of a transient
    History { transient_id: i64 },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    MarshallConfig::load_env_file()?;
    let config = MarshallConfig::load().context("failed to load marshall configuration")?;
    init_telemetry(&config.observability)?;

    tokio::runtime::Runtime::new()?.block_on(async { run(cli, config).await })
}

async fn run(cli: Cli, config: MarshallConfig) -> Result<()> {
    let mut db_config = config.database.clone().unwrap_or(DatabaseConfig {
        url: "sqlite://marshall.db".to_string(),
        max_connections: 10,
        auto_migrate: true,
    });
    if let Some(url) = cli.database_url {
        db_config.url = url;
    }

    let store = Arc::new(SqliteStore::connect(&db_config).await?);
    let actor = ActingUser::new(cli.user);
    let service = TriageService::new(WorkflowEngine::new(store.clone(), config.workflow));

    let outcome = execute(cli.command, &store, &service, &actor).await;
    store.shutdown().await;
    outcome
}

async fn execute(
    command: Commands,
    store: &SqliteStore,
    service: &TriageService,
    actor: &ActingUser,
) -> Result<()> {
    let request = match command {
        Commands::InitDb => {
            store.migrate().await?;
            println!("✅ Database ready");
            return Ok(());
        }
        Commands::Register {
            transient_id,
            name,
            ra,
            dec,
        } => {
            store
                .insert(TransientRecord::new(transient_id, name, ra, dec))
                .await?;
            println!("✅ transient #{transient_id} added to the inbox");
            return Ok(());
        }
        Commands::Show { transient_id } => {
            let record = service.engine().record(transient_id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            if let Some(classification) = store.classification(transient_id).await? {
                println!("{}", serde_json::to_string_pretty(&classification)?);
            }
            return Ok(());
        }
        Commands::History { transient_id } => {
            for entry in service.engine().history(transient_id).await? {
                println!("{}  {}", entry.date_created.format("%Y-%m-%d %H:%M:%S"), entry.message);
            }
            return Ok(());
        }
        Commands::Move {
            transient_id,
            mwl,
            awl,
            snooze,
        } => TriageRequest::MoveWorkflow {
            transient_id,
            mwl,
            awl,
            snoozed: snooze,
        },
        Commands::SetPi {
            transient_id,
            name,
            email,
        } => TriageRequest::SetPi {
            transient_id,
            pi_name: name,
            pi_email: email,
        },
        Commands::SetPriority {
            transient_id,
            priority,
        } => TriageRequest::SetPriority {
            transient_id,
            observation_priority: priority,
        },
        Commands::Classify {
            transient_id,
            obsdate,
            source,
            spectral_type,
            sub_type,
            redshift,
            wrt_max,
            phase,
            peculiar,
        } => TriageRequest::Classify {
            transient_id,
            observation_date: obsdate,
            source,
            spectral_type,
            sub_type,
            redshift,
            classification_wrt_max: wrt_max,
            phase,
            peculiar,
        },
    };

    match service.handle(request, actor).await {
        Ok(message) => {
            println!("✅ {message}");
            Ok(())
        }
        Err(err) => {
            eprintln!("❌ {err}");
            Err(err.into())
        }
    }
}
