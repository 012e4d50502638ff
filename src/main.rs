//! odds-align entry point
//!
//! 1. Loads configuration (`CONFIG_PATH`, default `config.yaml`)
//! 2. Reads JSON-line events from stdin and routes them to the control task
//! 3. Writes dispatched actuator commands as JSON lines to stdout
//! 4. Logs state changes and suspend/resume signals
//! 5. Shuts down on Ctrl+C

use std::path::PathBuf;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use odds_align::config::{self, constants};
use odds_align::core::{
    control_task, current_time_ms, parse_event, route, ActuatorCommand, ChannelActuator,
    ChannelBundle, ControlCommand, ControlRuntime, ControlSignal, CoordinatorState, IngestEvent,
    Routed, SystemClock,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenvy::dotenv().ok();

    config::init_logging();
    info!("odds-align starting...");
    constants::log_configuration();

    let config_path =
        PathBuf::from(std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string()));
    let app_config = config::load_config_or_default(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;
    info!(
        mode = %app_config.mode,
        script_target = %app_config.targets.script,
        service_target = %app_config.targets.service,
        "[CONFIG] Loaded"
    );

    let ChannelBundle {
        ingest_tx,
        ingest_rx,
        command_tx,
        command_rx,
        actuator_tx,
        actuator_rx,
        shutdown_tx,
    } = ChannelBundle::default();

    let runtime = ControlRuntime::new(
        &app_config,
        ChannelActuator::new(actuator_tx),
        Box::new(SystemClock),
    )
    .context("building control runtime")?;

    let monitor = tokio::spawn(monitor_task(
        runtime.subscribe_state(),
        runtime.signals(),
        shutdown_tx.subscribe(),
    ));
    let writer = tokio::spawn(writer_task(actuator_rx, shutdown_tx.subscribe()));
    tokio::spawn(reader_task(ingest_tx, command_tx, shutdown_tx.subscribe()));
    let control = tokio::spawn(control_task(
        runtime,
        ingest_rx,
        command_rx,
        shutdown_tx.subscribe(),
    ));

    match signal::ctrl_c().await {
        Ok(()) => info!("[SHUTDOWN] Graceful shutdown initiated"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
    // Broadcast shutdown to all tasks
    let _ = shutdown_tx.send(());

    let runtime = control.await.context("control task panicked")?;
    let _ = writer.await;
    let _ = monitor.await;

    info!(
        epoch = runtime.state().epoch,
        phase = ?runtime.state().phase,
        "[SHUTDOWN] Clean exit"
    );
    Ok(())
}

/// stdin -> ingest/command channels
async fn reader_task(
    ingest_tx: mpsc::Sender<IngestEvent>,
    command_tx: mpsc::Sender<ControlCommand>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let routed = parse_event(&line).and_then(|event| route(event, current_time_ms()));
                    let sent = match routed {
                        Ok(Routed::Ingest(event)) => ingest_tx.send(event).await.is_ok(),
                        Ok(Routed::Command(command)) => command_tx.send(command).await.is_ok(),
                        Err(e) => {
                            warn!(error = %e, "Input line rejected");
                            true
                        }
                    };
                    if !sent {
                        debug!("Control task gone, input reader stopping");
                        break;
                    }
                }
                Ok(None) => {
                    info!("stdin closed, no further input");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    }
}

/// Actuator commands -> stdout, one JSON object per line
async fn writer_task(
    mut actuator_rx: mpsc::Receiver<ActuatorCommand>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            Some(command) = actuator_rx.recv() => {
                let line = match serde_json::to_string(&command) {
                    Ok(line) => line,
                    Err(e) => {
                        error!(error = %e, key = %command.key, "Failed to encode actuator command");
                        continue;
                    }
                };
                if let Err(e) = stdout.write_all(format!("{}\n", line).as_bytes()).await {
                    error!(error = %e, "stdout write failed");
                    break;
                }
                let _ = stdout.flush().await;
            }
        }
    }
}

/// Logs state transitions and suspend/resume signals
async fn monitor_task(
    mut state_rx: watch::Receiver<CoordinatorState>,
    mut signal_rx: broadcast::Receiver<ControlSignal>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                info!(
                    active = state.active,
                    phase = ?state.phase,
                    mode = %state.mode,
                    reason = ?state.reason,
                    status = %state.status,
                    epoch = state.epoch,
                    "State changed"
                );
            }
            signal = signal_rx.recv() => match signal {
                Ok(signal) => info!(kind = ?signal.kind, reason = ?signal.reason, at_ms = signal.at_ms, "Control signal"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Signal feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
