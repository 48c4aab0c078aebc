//! spotwatch — spot instance reclaim watcher daemon

use anyhow::Context;
use clap::{Parser, Subcommand};
use spot_health::{CooldownGovernor, PingProbe, Remediator};
use spot_notify::{BotCommand, CommandPoller, LogTransport, Notifier, TelegramTransport, Transport};
use spot_provider::AliyunClient;
use spotwatch::{CommandDispatcher, Config, Monitor, MonitorParts, logging};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "spotwatch")]
#[command(about = "Spot instance reclaim watcher")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch spot instances and restart reclaimed ones (default)
    Run,

    /// Run one discovery pass and print the spot instances as JSON
    Discover,

    /// Build one report and print it instead of sending it
    ///
    /// Examples:
    ///   spotwatch report billing
    ///   spotwatch report traffic
    Report {
        /// billing, traffic or status (aliases accepted)
        kind: BotCommand,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            logging::init(&config.log_level, config.log_file.as_deref(), cli.json);
            run(config).await
        }
        // One-shot commands keep stdout clean for their output.
        Commands::Discover => discover(config).await,
        Commands::Report { kind } => report(config, kind).await,
    }
}

// ─── Wiring ───────────────────────────────────────────────────────────────────

struct Wiring {
    monitor: Arc<Monitor>,
    telegram: Option<Arc<TelegramTransport>>,
}

fn build(config: &Config) -> Wiring {
    let aliyun = Arc::new(AliyunClient::new(config.credentials.clone()));

    let telegram = config
        .telegram
        .as_ref()
        .map(|t| Arc::new(TelegramTransport::new(&t.bot_token, &t.chat_id)));
    let transport: Arc<dyn Transport> = match &telegram {
        Some(t) => t.clone(),
        None => Arc::new(LogTransport),
    };
    let notifier = Arc::new(Notifier::new(transport.clone()));

    let remediator = Remediator::new(
        aliyun.clone(),
        Arc::new(PingProbe::default()),
        notifier.clone(),
        Arc::new(CooldownGovernor::new(config.notify_cooldown)),
        config.remediation_policy(),
    );

    let monitor = Monitor::new(MonitorParts {
        compute: aliyun.clone(),
        billing: aliyun.clone(),
        traffic: aliyun,
        remediator,
        sink: notifier,
        transport,
    });

    Wiring {
        monitor: Arc::new(monitor),
        telegram,
    }
}

// ─── Run ──────────────────────────────────────────────────────────────────────

async fn run(config: Config) -> anyhow::Result<()> {
    info!(?config, "starting spotwatch");
    let Wiring { monitor, telegram } = build(&config);

    monitor.discover().await.context("initial discovery")?;
    monitor.announce_startup().await;

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    if let Some(transport) = telegram {
        let chat = transport.chat_id().to_string();
        let dispatcher = Arc::new(CommandDispatcher::new(monitor.clone()));
        tasks.push(tokio::spawn(CommandPoller::new(transport, dispatcher, chat).run()));
    } else {
        info!("telegram disabled; alerts go to the log");
    }

    if let Some(every) = config.discovery_interval {
        tasks.push(tokio::spawn(rediscover(monitor.clone(), every)));
    }

    let mut ticker = tokio::time::interval(config.check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        instances = monitor.registry().len(),
        interval_secs = config.check_interval.as_secs(),
        "watching"
    );

    let watch = async {
        loop {
            ticker.tick().await;
            monitor.reconcile().await;
        }
    };

    tokio::select! {
        _ = watch => {}
        _ = shutdown_signal() => info!("shutdown requested"),
    }

    for task in tasks {
        task.abort();
    }
    info!("spotwatch stopped");
    Ok(())
}

async fn rediscover(monitor: Arc<Monitor>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; startup discovery already ran.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(e) = monitor.discover().await {
            warn!(error = %e, "rediscovery failed, keeping previous instance list");
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

// ─── One-shot commands ────────────────────────────────────────────────────────

async fn discover(config: Config) -> anyhow::Result<()> {
    let Wiring { monitor, .. } = build(&config);
    monitor.discover().await.context("discovery")?;
    let instances = monitor.registry().snapshot();
    println!("{}", serde_json::to_string_pretty(instances.as_ref())?);
    Ok(())
}

async fn report(config: Config, kind: BotCommand) -> anyhow::Result<()> {
    let Wiring { monitor, .. } = build(&config);
    if kind != BotCommand::Help {
        monitor.discover().await.context("discovery")?;
    }
    let text = monitor
        .render(kind)
        .await
        .with_context(|| format!("{kind} report"))?;
    println!("{text}");
    Ok(())
}
