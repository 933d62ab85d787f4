//! Warden CLI - Demo host for the session lifecycle coordinator
//!
//! `warden demo` walks a session through login, activity, a credential
//! refresh, a background/foreground lock and an inactivity timeout.
//! `warden config` manages the JSON configuration file.

mod console;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

use warden_core::{
    AuthMethod, Authenticator, CredentialStore, MemoryStorage, SecureStorage, StaticAuthenticator,
};
use warden_lifecycle::{LifecycleConfig, LifecycleHandle, LockNotice, SessionNotice};
use warden_vault::EncryptedFileStorage;

use crate::console::ConsoleAuthenticator;

/// Environment variable holding the vault passphrase
const PASSPHRASE_ENV: &str = "WARDEN_PASSPHRASE";

/// Inactivity timeout used by `warden demo` unless overridden
const DEMO_TIMEOUT_SECS: u64 = 10;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Session inactivity and foreground lock coordinator", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted session lifecycle
    Demo {
        /// Inactivity timeout in seconds; the demo idles this long before
        /// the session expires
        #[arg(short, long, default_value_t = DEMO_TIMEOUT_SECS)]
        timeout: u64,

        /// Lock delay in seconds (overrides the config file)
        #[arg(short, long)]
        lock_delay: Option<u64>,

        /// Lifetime of the simulated access token in seconds
        #[arg(long, default_value_t = 45)]
        token_lifetime: u64,

        /// Keep credentials in an encrypted vault under this directory
        /// (passphrase read from WARDEN_PASSPHRASE)
        #[arg(long)]
        vault: Option<PathBuf>,

        /// Approve every unlock challenge instead of prompting
        #[arg(long)]
        auto_approve: bool,
    },

    /// Configuration file commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a configuration file
    Init {
        /// Profile to write (default, strict, development)
        #[arg(short, long, default_value = "default")]
        profile: String,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,

        /// Config file path (defaults to WARDEN_CONFIG or the user config dir)
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Print the effective configuration
    Show {
        /// Config file path (defaults to WARDEN_CONFIG or the user config dir)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warden=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            timeout,
            lock_delay,
            token_lifetime,
            vault,
            auto_approve,
        } => {
            let mut config = load_config(None)?;
            config.session_timeout_secs = timeout;
            if let Some(lock_delay) = lock_delay {
                config.lock_delay_secs = lock_delay;
            }
            run_demo(config, token_lifetime, vault, auto_approve).await
        }
        Commands::Config(cmd) => handle_config_command(cmd),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<LifecycleConfig> {
    let path = path.unwrap_or_else(LifecycleConfig::default_path);
    if path.exists() {
        LifecycleConfig::load(&path).with_context(|| format!("Failed to load {:?}", path))
    } else {
        Ok(LifecycleConfig::default())
    }
}

fn handle_config_command(cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Init {
            profile,
            force,
            path,
        } => {
            let path = path.unwrap_or_else(LifecycleConfig::default_path);
            if path.exists() && !force {
                bail!("{:?} already exists (use --force to overwrite)", path);
            }

            let Some(config) = LifecycleConfig::profile(&profile) else {
                bail!("Unknown profile '{}'", profile);
            };
            config.save(&path)?;
            println!("Wrote {} profile to {:?}", profile, path);
        }
        ConfigCommands::Show { path } => {
            let config = load_config(path)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

fn open_storage(config: &LifecycleConfig, vault: Option<PathBuf>) -> Result<Arc<dyn SecureStorage>> {
    let Some(base) = vault else {
        return Ok(Arc::new(MemoryStorage::new(config.storage_namespace.clone())));
    };

    let passphrase = Zeroizing::new(
        std::env::var(PASSPHRASE_ENV)
            .with_context(|| format!("{} must be set to use --vault", PASSPHRASE_ENV))?,
    );
    let storage =
        EncryptedFileStorage::open_with_passphrase(&base, config.storage_namespace.clone(), &passphrase)?;
    info!("Using encrypted vault at {:?}", storage.directory());
    Ok(Arc::new(storage))
}

async fn run_demo(
    config: LifecycleConfig,
    token_lifetime: u64,
    vault: Option<PathBuf>,
    auto_approve: bool,
) -> Result<()> {
    let storage = open_storage(&config, vault)?;
    let credentials = CredentialStore::new(storage);

    let authenticator: Arc<dyn Authenticator> = if auto_approve {
        Arc::new(StaticAuthenticator::approving(AuthMethod::None))
    } else {
        Arc::new(ConsoleAuthenticator::new())
    };

    let (handle, worker) =
        warden_lifecycle::LifecycleWorker::spawn(&config, credentials.clone(), authenticator);
    let printer = tokio::spawn(print_notices(handle.subscribe_session(), handle.subscribe_lock()));
    let mut lock_notices = handle.subscribe_lock();

    println!("== Login");
    let token_lifetime = chrono::Duration::seconds(i64::try_from(token_lifetime)?);
    credentials.save_access_token("demo-access-token")?;
    credentials.save_refresh_token("demo-refresh-token")?;
    handle.set_expiry(Utc::now() + token_lifetime)?;
    handle.start_session()?;
    handle.enable_lock()?;
    println!("Allowed: {}", handle.is_allowed().await?);

    println!("\n== Activity and refresh");
    handle.record_activity()?;
    let refreshed = handle
        .refresh_if_needed(move || async move { anyhow::Ok(Utc::now() + token_lifetime) })
        .await??;
    println!("Refreshed: {}", refreshed);

    println!("\n== Background for {}s", config.lock_delay_secs);
    handle.entered_background()?;
    tokio::time::sleep(config.lock_delay() + Duration::from_millis(100)).await;
    handle.will_enter_foreground()?;
    wait_for_unlock(&handle, &mut lock_notices).await?;
    println!("Allowed: {}", handle.is_allowed().await?);

    println!("\n== Idle for {}s", config.session_timeout_secs);
    handle.record_activity()?;
    tokio::time::sleep(config.session_timeout() + Duration::from_millis(100)).await;
    println!("Valid: {}", handle.check_validity().await?);
    println!(
        "Access token cleared: {}",
        credentials.access_token().is_none()
    );

    let snapshot = handle.snapshot().await?;
    println!("\n{}", serde_json::to_string_pretty(&snapshot)?);

    handle.shutdown()?;
    worker.await?;
    printer.abort();
    Ok(())
}

/// Wait until unlocked, retrying the challenge after each failure
async fn wait_for_unlock(
    handle: &LifecycleHandle,
    notices: &mut broadcast::Receiver<LockNotice>,
) -> Result<()> {
    const ATTEMPTS: usize = 3;
    const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

    if !handle.snapshot().await?.locked {
        println!("Returned within the lock delay, not locked");
        return Ok(());
    }

    for attempt in 1..=ATTEMPTS {
        if attempt > 1 {
            handle.request_unlock()?;
        }

        let unlocked = tokio::time::timeout(ATTEMPT_TIMEOUT, async {
            loop {
                match notices.recv().await {
                    Ok(LockNotice::Unlocked) => return true,
                    Ok(LockNotice::Locked) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return false,
                }
            }
        })
        .await
        .unwrap_or(false);

        if unlocked {
            return Ok(());
        }
    }

    bail!("Still locked after {} attempts", ATTEMPTS)
}

async fn print_notices(
    mut session: broadcast::Receiver<SessionNotice>,
    mut lock: broadcast::Receiver<LockNotice>,
) {
    loop {
        tokio::select! {
            notice = session.recv() => match notice {
                Ok(notice) => println!("  [session] {:?}", notice),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
            notice = lock.recv() => match notice {
                Ok(notice) => println!("  [lock] {:?}", notice),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
        }
    }
}
