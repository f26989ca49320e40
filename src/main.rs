use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tweet_relay::analysis::Analyzer;
use tweet_relay::config::Config;
use tweet_relay::db::Repository;
use tweet_relay::error::{AppError, Result};
use tweet_relay::feed::MirrorFetcher;
use tweet_relay::models::normalize_handle;
use tweet_relay::notify::TelegramNotifier;
use tweet_relay::pipeline::Pipeline;

/// Forward relevant posts from followed X accounts to Telegram.
#[derive(Parser)]
#[command(name = "tweet-relay")]
#[command(version)]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process all enabled followers once
    Run,

    /// Start following an account
    AddFollower { handle: String },

    /// Stop following an account and drop its cached posts
    RemoveFollower { handle: String },

    /// Show followed accounts
    ListFollowers {
        /// Include disabled accounts
        #[arg(long)]
        all: bool,
    },

    /// Resume processing an account
    EnableFollower { handle: String },

    /// Pause processing an account, keeping its history
    DisableFollower { handle: String },

    /// Prune old irrelevant posts from the cache
    Maintenance {
        /// Posts to keep per follower (defaults to the configured value)
        #[arg(long)]
        keep: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = real_main(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn real_main(cli: Cli) -> Result<()> {
    dotenvy::dotenv().ok();

    let default_filter = if cli.verbose {
        "tweet_relay=debug,info"
    } else {
        "tweet_relay=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref())?;
    let repo = Repository::new(&config.db_path).await?;

    match cli.command {
        Commands::Run => run(config, repo).await,
        Commands::AddFollower { handle } => {
            let follower = repo.add_follower(&normalize_handle(&handle)?).await?;
            println!("Now following @{} (id {})", follower.username, follower.id);
            Ok(())
        }
        Commands::RemoveFollower { handle } => {
            let handle = normalize_handle(&handle)?;
            let posts = repo.remove_follower(&handle).await?;
            println!("Removed @{handle} and {posts} cached posts");
            Ok(())
        }
        Commands::ListFollowers { all } => {
            let followers = repo.list_followers(!all).await?;
            if followers.is_empty() {
                println!("No followers configured");
                return Ok(());
            }
            println!("{:<6} {:<24} {}", "ID", "Handle", "Status");
            for follower in followers {
                println!(
                    "{:<6} {:<24} {}",
                    follower.id,
                    format!("@{}", follower.username),
                    follower.status()
                );
            }
            Ok(())
        }
        Commands::EnableFollower { handle } => {
            let handle = normalize_handle(&handle)?;
            repo.set_follower_enabled(&handle, true).await?;
            println!("Enabled @{handle}");
            Ok(())
        }
        Commands::DisableFollower { handle } => {
            let handle = normalize_handle(&handle)?;
            repo.set_follower_enabled(&handle, false).await?;
            println!("Disabled @{handle}");
            Ok(())
        }
        Commands::Maintenance { keep } => {
            let keep = config.maintenance_keep(keep);
            let deleted = repo.run_maintenance(keep).await?;
            println!("Deleted {deleted} old irrelevant posts (kept {keep} per follower)");
            Ok(())
        }
    }
}

async fn run(config: Config, repo: Repository) -> Result<()> {
    config.validate_for_run()?;

    let (Some(token), Some(chat_id)) = (config.telegram_bot_token.clone(), config.telegram_chat_id.clone())
    else {
        return Err(AppError::Config("Telegram credentials missing".to_string()));
    };

    let feed = MirrorFetcher::new(config.nitter_mirrors.clone(), config.feed_timeout());
    let notifier = TelegramNotifier::new(config.telegram_api_url.clone(), token, chat_id, config.telegram_timeout())
        .with_retry(
            config.telegram_max_attempts,
            std::time::Duration::from_secs(2),
            std::time::Duration::from_secs(60),
        );
    let analyzer = Analyzer::from_config(&config)?;

    let pipeline = Pipeline::new(Arc::new(repo), Arc::new(feed), analyzer, Arc::new(notifier))
        .with_max_posts(config.max_tweets_per_user)
        .with_concurrency(config.concurrency);

    let summary = pipeline.run().await?;
    print!("{summary}");
    Ok(())
}
