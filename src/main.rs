//! Pushline CLI - listen for notifications as a given identity.
//!
//! This is the main binary entry point. See the `pushline` library for the
//! core functionality.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use pushline::{Config, IdentityEvent, Notification, NotificationCenter, ToastSink};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "pushline", version, about = "Real-time notification client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bind to an identity and print toasts until Ctrl-C
    Listen {
        /// User id to bind
        #[arg(long)]
        user_id: u64,
        /// Role the user acts as (e.g. creator, brand)
        #[arg(long)]
        user_role: String,
    },
    /// Print the effective configuration
    Config,
}

/// Prints toasts to stdout.
#[derive(Debug)]
struct StdoutSink;

impl ToastSink for StdoutSink {
    fn show(&self, toast: &Notification) {
        println!(
            "[{}] #{} {}: {}",
            toast.created_at.format("%H:%M:%S"),
            toast.id,
            toast.event_type,
            toast.message
        );
    }
}

fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();
    if let Ok(path) = std::env::var("PUSHLINE_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .map_err(|e| anyhow::anyhow!("Failed to create log file at {path}: {e}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.init();
    Ok(())
}

async fn listen(config: Config, user_id: u64, user_role: String) -> Result<()> {
    if !config.has_token() {
        anyhow::bail!("No session token. Set PUSHLINE_TOKEN.");
    }

    let center = NotificationCenter::from_config(&config, Arc::new(StdoutSink))?;
    center.handle_identity_event(IdentityEvent::SignedIn { user_id, user_role });

    let mut phase = center.watch_phase();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = phase.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *phase.borrow_and_update();
                log::info!("Connection phase: {:?} ({} unread)", current, center.unread_count());
            }
        }
    }

    println!("Shutting down...");
    center.handle_identity_event(IdentityEvent::SignedOut);
    center.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        log::error!("PANIC: {:?}", panic_info);
        default_hook(panic_info);
    }));

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Listen { user_id, user_role } => listen(config, user_id, user_role).await?,
        Commands::Config => println!("{}", serde_json::to_string_pretty(&config)?),
    }

    Ok(())
}
