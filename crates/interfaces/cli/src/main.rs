use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use jalt_config::{AppConfig, StorageBackend, mask_secret};
use jalt_journal::{
    DocumentTransport, FileTransport, GithubOptions, GithubTransport, JournalStore,
    MemoryTransport, entry_count, word_count,
};

#[derive(Debug, Parser)]
#[command(
    name = "jalt",
    version,
    about = "Just Another Journaling Tool: an append-only markdown journal kept in git"
)]
struct Cli {
    /// TOML configuration file.  Environment variables override it.
    #[arg(long, global = true, default_value = "config/default.toml")]
    config: PathBuf,
    /// Keep the journal in memory instead of the configured backend.
    #[arg(long, global = true)]
    dry_run: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the Telegram bot (default).
    Telegram,
    /// Append one entry from the command line.
    Append {
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Entry and word counts.
    Stats,
    /// Print the most recent entry.
    Last,
    /// Print the whole journal.
    Show,
    /// Print the resolved configuration and check the document is reachable.
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let command = cli.command.unwrap_or(Commands::Telegram);
    if !cli.dry_run && !matches!(command, Commands::Doctor) {
        config.validate(matches!(command, Commands::Telegram))?;
    }

    let config = Arc::new(config);
    let store = build_store(&config, cli.dry_run)?;

    match command {
        Commands::Telegram => {
            jalt_telegram::start_bot(config, store).await?;
        }
        Commands::Append { text } => {
            let text = text.join(" ");
            let now = Utc::now().with_timezone(&config.timezone());
            let receipt = store.append(&text, now).await?;
            if receipt.created {
                println!("created {}", store.location());
            }
            println!(
                "saved {} - {} words",
                receipt.at.format("%Y-%m-%d %H:%M"),
                receipt.words
            );
        }
        Commands::Stats => match store.stats().await? {
            Some(stats) => {
                println!("entries     : {}", stats.entries);
                println!("words       : {}", stats.words);
                if let Some(first) = stats.first_entry {
                    println!("first entry : {first}");
                }
                if let Some(last) = stats.last_entry_at {
                    println!("latest entry: {}", last.format("%Y-%m-%d %H:%M"));
                }
            }
            None => println!("no journal yet"),
        },
        Commands::Last => match store.last_entry().await? {
            Some(entry) => println!("{entry}"),
            None => println!("no entries yet"),
        },
        Commands::Show => match store.fetch_text().await? {
            Some(text) => print!("{text}"),
            None => println!("no journal yet"),
        },
        Commands::Doctor => run_doctor(&config, &store, cli.dry_run).await,
    }

    Ok(())
}

fn build_store(config: &AppConfig, dry_run: bool) -> Result<JournalStore> {
    let transport: Arc<dyn DocumentTransport> = if dry_run {
        info!("dry run: journal kept in memory");
        Arc::new(MemoryTransport::new())
    } else {
        match config.storage.backend {
            StorageBackend::Github => Arc::new(GithubTransport::new(GithubOptions {
                api_base_url: config.github.api_base_url.clone(),
                repo: config.github.repo.clone(),
                branch: config.github.branch.clone(),
                token: config.github.token.clone(),
                timeout: Duration::from_secs(config.github.http_timeout_secs.max(1)),
            })?),
            StorageBackend::File => {
                if config.storage.local_root.trim().is_empty() {
                    bail!("storage.local_root is empty");
                }
                Arc::new(FileTransport::new(&config.storage.local_root))
            }
        }
    };
    Ok(JournalStore::new(
        transport,
        config.journal.path.clone(),
        config.journal.title.clone(),
    ))
}

async fn run_doctor(config: &AppConfig, store: &JournalStore, dry_run: bool) {
    println!("jalt doctor");
    println!("- config valid     : {}", match config.validate(true) {
        Ok(()) => "yes".to_string(),
        Err(err) => format!("no ({err})"),
    });
    println!("- backend          : {:?}{}", config.storage.backend, if dry_run { " (dry run)" } else { "" });
    println!("- document         : {}", store.location());
    println!("- timezone         : {}", config.timezone());
    println!("- github token     : {}", mask_secret(&config.github.token));
    println!("- telegram token   : {}", mask_secret(&config.telegram.bot_token));
    println!(
        "- authorized users : {}",
        if config.telegram.authorized_users.is_empty() {
            "anyone".to_string()
        } else {
            config
                .telegram
                .authorized_users
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        }
    );
    println!(
        "- reminder         : {}",
        if config.telegram.reminder_enabled {
            config.telegram.reminder_time.as_str()
        } else {
            "disabled"
        }
    );
    match store.fetch_text().await {
        Ok(Some(text)) => println!(
            "- reachable        : yes ({} entries, {} words)",
            entry_count(&text),
            word_count(&text)
        ),
        Ok(None) => println!("- reachable        : yes (document not created yet)"),
        Err(err) => println!("- reachable        : no ({err})"),
    }
}
