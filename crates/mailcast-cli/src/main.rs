//! CLI entry point for `mailcast`.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use mailcast::authz::{self, Subject};
use mailcast::config::{self, Config, LoggingConfig};
use mailcast::db::{attempt_repo, mailing_repo, stats_repo, user_repo, Database};
use mailcast::scheduler::{self, Scheduler};
use mailcast::{logging, mailer, Dispatcher};

#[derive(Parser)]
#[command(name = "mailcast", version, about = "Scheduled email campaigns")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (YAML or JSON). Defaults to ~/.mailcast/config.yaml
    #[arg(short, long, global = true, env = "MAILCAST_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one batch pass over due mailings and exit
    SendMailings {
        #[arg(long)]
        json: bool,
    },
    /// Run the recurring scheduler until interrupted
    RunScheduler,
    /// Send a mailing immediately, ignoring its window
    SendNow {
        mailing_id: i64,
        /// Email of the user on whose behalf to send
        #[arg(long = "as", value_name = "EMAIL")]
        as_user: String,
    },
    /// Create a user account
    CreateUser {
        email: String,
        #[arg(long)]
        superuser: bool,
    },
    /// Grant the manager permissions to a user
    GrantManager { email: String },
    /// Show mailing statistics
    Stats {
        /// Only count objects owned by this user
        #[arg(long, value_name = "EMAIL")]
        owner: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List delivery attempts of a mailing
    Attempts {
        mailing_id: i64,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_or_default(cli.config.as_deref()).context("loading config")?;

    let level = match cli.verbose {
        0 => config.logging.level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    logging::init(&LoggingConfig {
        level,
        json: config.logging.json,
    })?;

    match cli.command {
        Commands::SendMailings { json } => cmd_send_mailings(&config, json),
        Commands::RunScheduler => cmd_run_scheduler(&config),
        Commands::SendNow {
            mailing_id,
            as_user,
        } => cmd_send_now(&config, mailing_id, &as_user),
        Commands::CreateUser { email, superuser } => cmd_create_user(&config, &email, superuser),
        Commands::GrantManager { email } => cmd_grant_manager(&config, &email),
        Commands::Stats { owner, json } => cmd_stats(&config, owner.as_deref(), json),
        Commands::Attempts { mailing_id, json } => cmd_attempts(&config, mailing_id, json),
    }
}

fn open_database(config: &Config) -> anyhow::Result<Database> {
    let path = config
        .database_path()
        .context("no home directory; set database_path in the config")?;
    tracing::debug!("Opening database at {}", path.display());
    Database::open(&path).with_context(|| format!("opening database {}", path.display()))
}

fn build_dispatcher(config: &Config) -> anyhow::Result<Dispatcher> {
    let db = open_database(config)?;
    let transport = mailer::from_config(config).context("building mail transport")?;
    Ok(Dispatcher::new(db, transport, config.from_address.clone())
        .with_claim_ttl(chrono::Duration::seconds(
            config.scheduler.claim_ttl_secs as i64,
        )))
}

fn find_user(db: &Database, email: &str) -> anyhow::Result<mailcast::model::User> {
    user_repo::find_by_email(db, email)?
        .with_context(|| format!("no user with email '{}'", email))
}

fn cmd_send_mailings(config: &Config, json: bool) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(config)?;
    let report = dispatcher.process_due(dispatcher.now())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} due, {} dispatched, {} skipped, {} completed ({} attempts, {} failed)",
            report.selected,
            report.dispatched,
            report.skipped,
            report.completed,
            report.attempts,
            report.failures
        );
    }
    Ok(())
}

fn cmd_run_scheduler(config: &Config) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(config)?;
    let scheduler = Scheduler::new(dispatcher, config.scheduler.clone());
    scheduler::run_until_interrupted(&scheduler)?;
    Ok(())
}

fn cmd_send_now(config: &Config, mailing_id: i64, as_user: &str) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(config)?;
    let user = find_user(dispatcher.db(), as_user)?;
    let subject = Subject::load(dispatcher.db(), user.id)?
        .with_context(|| format!("user '{}' disappeared", as_user))?;

    let notice = authz::manual_send(&dispatcher, &subject, mailing_id);
    if !notice.is_success() {
        anyhow::bail!("{}", notice);
    }
    println!("{}", notice);
    Ok(())
}

fn cmd_create_user(config: &Config, email: &str, superuser: bool) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let user = user_repo::insert(&db, email, superuser, chrono::Utc::now())?;
    println!("Created user {} ({})", user.id, user.email);
    Ok(())
}

fn cmd_grant_manager(config: &Config, email: &str) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let user = find_user(&db, email)?;
    authz::grant_manager(&db, user.id)?;
    println!("{} is now a manager", user.email);
    Ok(())
}

fn cmd_stats(config: &Config, owner: Option<&str>, json: bool) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let owner_id = owner.map(|email| find_user(&db, email).map(|u| u.id)).transpose()?;
    let summary = stats_repo::summary(&db, owner_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Mailings:          {}", summary.total_mailings);
        println!("Running:           {}", summary.active_mailings);
        println!("Unique recipients: {}", summary.unique_recipients);
        println!("Attempts OK:       {}", summary.successful_attempts);
        println!("Attempts failed:   {}", summary.failed_attempts);
    }
    Ok(())
}

fn cmd_attempts(config: &Config, mailing_id: i64, json: bool) -> anyhow::Result<()> {
    let db = open_database(config)?;
    if mailing_repo::find_by_id(&db, mailing_id)?.is_none() {
        anyhow::bail!("mailing {} not found", mailing_id);
    }
    let attempts = attempt_repo::list_for_mailing(&db, mailing_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&attempts)?);
        return Ok(());
    }

    if attempts.is_empty() {
        println!("No attempts for mailing {}", mailing_id);
        return Ok(());
    }
    for attempt in &attempts {
        println!(
            "{:>6}  {}  {:<7}  {}",
            attempt.id,
            attempt.attempt_time.format("%Y-%m-%d %H:%M:%S"),
            attempt.status.as_str(),
            attempt.server_response.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
