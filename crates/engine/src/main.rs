//! Guardian - main entry point.
//!
//! Runs the command server against the simulated host. The main thread plays
//! the game client: it forwards host events, runs one bridge tick per tick
//! interval and stops the server on Ctrl+C or SIGTERM. SIGHUP reloads the
//! authorized id list.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use guardian_domain::{WorldInfo, WorldNumber};
use guardian_engine::infrastructure::clock::SystemClock;
use guardian_engine::infrastructure::simulated_host::SimulatedHost;
use guardian_engine::{Guardian, GuardianConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Default)]
struct Signals {
    stop: AtomicBool,
    reload: AtomicBool,
}

fn main() -> anyhow::Result<()> {
    load_dotenv_from_repo_root(false);

    let config = GuardianConfig::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.default_log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Guardian");

    let tick_interval = config.tick_interval;
    let mut host = simulated_host()?;
    let mut guardian = Guardian::new(config, Arc::new(SystemClock::new()));

    let Some(addr) = guardian.start()? else {
        tracing::info!("Nothing to do while disabled; exiting");
        return Ok(());
    };
    tracing::info!(%addr, "Guardian ready");

    let signals = Arc::new(Signals::default());
    spawn_signal_listener(Arc::clone(&signals))?;

    while !signals.stop.load(Ordering::SeqCst) {
        if signals.reload.swap(false, Ordering::SeqCst) {
            load_dotenv_from_repo_root(true);
            guardian.reload_authorizations(GuardianConfig::authorized_ids_from_env());
        }

        for event in host.drain_events() {
            guardian.on_event(event);
        }
        let report = guardian.on_tick(&mut host);
        if report.executed > 0 {
            tracing::debug!(
                executed = report.executed,
                failed = report.failed,
                detached = report.detached,
                "Tick"
            );
        }

        std::thread::sleep(tick_interval);
    }

    guardian.stop();
    tracing::info!("Guardian stopped");
    Ok(())
}

/// Worlds and nearby players for the simulated client.
///
/// `GUARDIAN_SIM_PLAYERS` lists the players that accept trade requests.
fn simulated_host() -> anyhow::Result<SimulatedHost> {
    let mut worlds = Vec::new();
    for (number, population, members) in [
        (301, 1200, false),
        (302, 1650, true),
        (308, 700, false),
        (330, 950, true),
    ] {
        let world = WorldInfo::new(WorldNumber::new(number)?, population);
        worlds.push(if members {
            world.with_flags(["members"])
        } else {
            world
        });
    }

    let current = worlds.first().map(|world| world.number);
    let players = std::env::var("GUARDIAN_SIM_PLAYERS").unwrap_or_default();
    Ok(players
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .fold(SimulatedHost::new(worlds, current), |host, name| {
            host.with_player(name)
        }))
}

fn spawn_signal_listener(signals: Arc<Signals>) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name("guardian-signals".into())
        .spawn(move || runtime.block_on(listen_for_signals(signals)))?;
    Ok(())
}

async fn listen_for_signals(signals: Arc<Signals>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut terminate, mut hangup) =
            match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
                (Ok(terminate), Ok(hangup)) => (terminate, hangup),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(error = %e, "Failed to install signal handlers");
                    signals.stop.store(true, Ordering::SeqCst);
                    return;
                }
            };

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                    }
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                    break;
                }
                _ = terminate.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    break;
                }
                _ = hangup.recv() => {
                    tracing::info!("Received SIGHUP, reloading authorized ids");
                    signals.reload.store(true, Ordering::SeqCst);
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
        tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
    }

    signals.stop.store(true, Ordering::SeqCst);
}

fn load_dotenv_from_repo_root(overwrite: bool) {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides. Without overwrite the first file to set a key
    // wins; with overwrite the last one does.
    if overwrite {
        for filename in [".env", ".env.local"] {
            let path = repo_root.join(filename);
            if path.exists() {
                let _ = dotenvy::from_path_override(path);
            }
        }
    } else {
        for filename in [".env.local", ".env"] {
            let path = repo_root.join(filename);
            if path.exists() {
                let _ = dotenvy::from_path(path);
            }
        }
    }
}
