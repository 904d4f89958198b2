#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! powerctl: log in, list VMs, start them, and watch their status.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use powerctl_client::{ClientConfig, Controller, DeviceClient, PollEvent};
use powerctl_core::model::{CommandOutcome, ResourceId};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PASSWORD_ENV: &str = "POWERCTL_PASSWORD";

#[derive(Parser, Debug)]
#[command(name = "powerctl")]
struct Args {
    /// TOML config file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `base_url` from the config file.
    #[arg(long)]
    base_url: Option<String>,

    /// Account email. The password is read from POWERCTL_PASSWORD.
    #[arg(long)]
    email: Option<String>,

    /// Log level (env-filter syntax).
    #[arg(long, default_value = "info")]
    log: String,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Probe the backend's /health endpoint.
    Health,
    /// List VMs visible to the account.
    List,
    /// Show one VM.
    Status {
        #[arg(long)]
        id: String,
    },
    /// Start a VM.
    Start {
        #[arg(long)]
        id: String,
    },
    /// Poll the VM list and print it on every refresh until interrupted.
    Watch {
        /// Exit after this many successful refreshes.
        #[arg(long)]
        ticks: Option<u32>,
    },
    /// Read the configured device's power state.
    DeviceStatus,
    /// Send turn_on to the configured device.
    DeviceOn,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match &args.config {
        Some(path) => ClientConfig::load_from(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }

    match args.cmd {
        Cmd::Health => {
            let ctl = Controller::new(config)?;
            let healthy = ctl.health().await;
            println!("{}", serde_json::json!({ "healthy": healthy }));
            if !healthy {
                anyhow::bail!("backend at {} is not healthy", ctl.config().base_url);
            }
        }
        Cmd::List => {
            let ctl = login(config, args.email.as_deref()).await?;
            ctl.list_resources().await.context("list VMs")?;
            println!("{}", serde_json::to_string_pretty(&ctl.resource_views())?);
        }
        Cmd::Status { id } => {
            let ctl = login(config, args.email.as_deref()).await?;
            let id = ResourceId::from(id);
            let vm = ctl
                .get_resource_status(&id)
                .await
                .with_context(|| format!("status of VM {id}"))?;
            println!("{}", serde_json::to_string_pretty(&vm)?);
        }
        Cmd::Start { id } => {
            let ctl = login(config, args.email.as_deref()).await?;
            let id = ResourceId::from(id);
            let outcome = ctl
                .start_resource(&id)
                .await
                .with_context(|| format!("start VM {id}"))?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Cmd::Watch { ticks } => {
            let ctl = login(config, args.email.as_deref()).await?;
            watch(&ctl, ticks).await?;
        }
        Cmd::DeviceStatus => {
            let device = DeviceClient::new(&config)?;
            let on = device
                .status()
                .await
                .with_context(|| format!("read {}", device.endpoint_url()))?;
            println!("{}", serde_json::json!({ "on": on }));
        }
        Cmd::DeviceOn => {
            let device = DeviceClient::new(&config)?;
            let outcome = device
                .turn_on()
                .await
                .with_context(|| format!("turn on {}", device.endpoint_url()))?;
            if let CommandOutcome::Acknowledged(ack) = &outcome {
                if !ack.success {
                    anyhow::bail!("device refused turn_on: {}", ack.message);
                }
            }
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    Ok(())
}

async fn login(config: ClientConfig, email: Option<&str>) -> anyhow::Result<Controller> {
    let email = email.context("--email is required for this command")?;
    let password =
        std::env::var(PASSWORD_ENV).with_context(|| format!("{PASSWORD_ENV} is not set"))?;

    let ctl = Controller::new(config)?;
    ctl.on_session_expired(|| tracing::warn!("session expired; log in again"));
    ctl.login(email, &password)
        .await
        .with_context(|| format!("log in as {email}"))?;
    Ok(ctl)
}

async fn watch(ctl: &Controller, ticks: Option<u32>) -> anyhow::Result<()> {
    let mut events = ctl.subscribe();
    let handle = ctl.start_polling();
    tracing::info!(%handle, interval_ms = ctl.config().poll_interval_ms, "watching");

    let mut refreshed = 0u32;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(PollEvent::Refreshed { .. }) => {
                    println!("{}", serde_json::to_string(&ctl.resource_views())?);
                    refreshed += 1;
                    if ticks.is_some_and(|limit| refreshed >= limit) {
                        break;
                    }
                }
                Ok(PollEvent::Failed(failure)) => {
                    tracing::warn!(error = %failure, "refresh failed; will retry next tick");
                }
                Ok(PollEvent::SessionExpired) => {
                    ctl.teardown();
                    anyhow::bail!("session expired while watching");
                }
                Ok(PollEvent::Stopped(_)) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event receiver lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    ctl.teardown();
    Ok(())
}
