// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod capture;
mod config;
mod export;
mod monitor;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use iqduo_app::init_logging;
use iqduo_core::{
    DspCommand, DspPipeline, DynResult, InputPool, OutputRing, PhaseAnalyzer, ProcessTimes,
    StatusEvent,
};

use config::{NetworkFormat, ServerConfig};
use export::ExportSettings;
use monitor::{MonitorSettings, Supervisor};

const PKG_DESCRIPTION: &str =
    concat!(env!("CARGO_PKG_NAME"), " - dual-channel IF to baseband DSP");
const STATUS_CHANNEL_BUFFER: usize = 64;

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Output sample rate (96000 or 192000)
    #[arg(short = 'r', long = "rate")]
    rate: Option<u32>,
    /// Channel mode: off, a or ab
    #[arg(short = 'm', long = "mode")]
    mode: Option<String>,
    /// Mirror the network passband about fs/2
    #[arg(long = "reposition")]
    reposition: bool,
}

/// CLI arguments take priority over the config file.
fn apply_cli(cli: &Cli, cfg: &mut ServerConfig) {
    if let Some(rate) = cli.rate {
        cfg.dsp.sample_rate = rate;
    }
    if let Some(ref mode) = cli.mode {
        cfg.dsp.mode = mode.clone();
    }
    if cli.reposition {
        cfg.dsp.reposition = true;
    }
}

async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    if *shutdown_rx.borrow() {
        return;
    }
    while shutdown_rx.changed().await.is_ok() {
        if *shutdown_rx.borrow() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_combined_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = ServerConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        ServerConfig::load_from_default_paths()?
    };
    apply_cli(&cli, &mut cfg);
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let chain = cfg.chain_config()?;
    info!(
        "Starting iqduo-server ({}, mode {}, reposition {})",
        chain.sample_rate, chain.mode, chain.reposition
    );

    let pool_a = Arc::new(InputPool::new());
    let pool_b = Arc::new(InputPool::new());
    let ring = Arc::new(OutputRing::new());
    let times = ProcessTimes::new();
    let (status_tx, status_rx) = broadcast::channel::<StatusEvent>(STATUS_CHANNEL_BUFFER);

    let phase_a = cfg.dsp.phase_a_deg.to_radians();
    let phase_b = cfg.dsp.phase_b_deg.to_radians();
    let mut pipeline = DspPipeline::new(
        chain,
        pool_a.clone(),
        pool_b.clone(),
        ring.clone(),
        times.clone(),
        status_tx.clone(),
    )?;
    if phase_a != 0.0 || phase_b != 0.0 {
        pipeline.retune(phase_a, phase_b);
    }

    let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<DspCommand>();
    let dsp_thread = pipeline.spawn_with_tick(cmd_rx, Duration::from_millis(cfg.dsp.tick_ms))?;

    let capture_stop = Arc::new(AtomicBool::new(false));
    let capture_thread = if cfg.capture.enabled {
        Some(capture::spawn_capture(
            &cfg.capture,
            pool_a.clone(),
            pool_b.clone(),
            capture_stop.clone(),
        )?)
    } else {
        warn!("Synthetic capture disabled; no input will arrive");
        None
    };

    let mut task_handles: Vec<JoinHandle<()>> = Vec::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let logger_shutdown_rx = shutdown_rx.clone();
    task_handles.push(tokio::spawn(async move {
        tokio::select! {
            _ = monitor::run_status_logger(status_rx) => {}
            _ = wait_for_shutdown(logger_shutdown_rx) => {}
        }
    }));

    let supervisor = Supervisor::new(
        times,
        PhaseAnalyzer::new(cfg.phase.required_deg, cfg.phase.auto_cal),
        MonitorSettings {
            dual: chain.mode.is_dual(),
            mirrored: chain.reposition,
            phase_a,
            phase_b,
        },
        ring.clone(),
        status_tx,
        cmd_tx.clone(),
    );
    task_handles.push(tokio::spawn(monitor::run_supervisor(
        supervisor,
        shutdown_rx.clone(),
    )));

    if cfg.network.enabled {
        let settings = ExportSettings {
            format: cfg.network.format,
            dest: format!("{}:{}", cfg.network.host, cfg.network.resolved_port()),
            dual: chain.mode.is_dual(),
            centre_khz: cfg.network.centre_khz,
            sample_rate: chain.sample_rate.hz(),
        };
        let export_ring = ring.clone();
        let export_shutdown_rx = shutdown_rx.clone();
        task_handles.push(tokio::spawn(async move {
            if let Err(e) =
                export::run_network_export(settings, export_ring, export_shutdown_rx).await
            {
                error!("Network export error: {:?}", e);
            }
        }));

        if cfg.network.format == NetworkFormat::Raw16 {
            let control_addr =
                SocketAddr::from((cfg.network.control_listen, cfg.network.control_port));
            let sample_rate = chain.sample_rate.hz();
            let control_shutdown_rx = shutdown_rx.clone();
            task_handles.push(tokio::spawn(async move {
                if let Err(e) =
                    export::run_control_listener(control_addr, sample_rate, control_shutdown_rx)
                        .await
                {
                    error!("Control listener error: {:?}", e);
                }
            }));
        }
    }

    if let Some(path) = cfg.output.pcm_path.clone() {
        let layout = cfg.output.pcm_layout();
        let select_b = cfg.output.soundcard_select_b;
        let pcm_ring = ring.clone();
        let pcm_shutdown_rx = shutdown_rx.clone();
        task_handles.push(tokio::spawn(async move {
            if let Err(e) =
                export::run_pcm_sink(path, layout, select_b, pcm_ring, pcm_shutdown_rx).await
            {
                error!("PCM sink error: {:?}", e);
            }
        }));
    }

    signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");
    let _ = shutdown_tx.send(true);
    let _ = cmd_tx.send(DspCommand::Stop);
    capture_stop.store(true, Ordering::Relaxed);
    tokio::time::sleep(Duration::from_millis(400)).await;

    for handle in &task_handles {
        if !handle.is_finished() {
            handle.abort();
        }
    }
    for handle in task_handles {
        let _ = handle.await;
    }

    let _ = tokio::task::spawn_blocking(move || {
        if dsp_thread.join().is_err() {
            error!("DSP worker panicked");
        }
        if let Some(thread) = capture_thread {
            if thread.join().is_err() {
                error!("Capture thread panicked");
            }
        }
    })
    .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "iqduo-server",
            "--rate",
            "192000",
            "-m",
            "ab",
            "--reposition",
        ]);
        let mut cfg = ServerConfig::default();
        apply_cli(&cli, &mut cfg);
        assert_eq!(cfg.dsp.sample_rate, 192_000);
        assert_eq!(cfg.dsp.mode, "ab");
        assert!(cfg.dsp.reposition);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_cli_leaves_config_alone() {
        let cli = Cli::parse_from(["iqduo-server"]);
        let mut cfg = ServerConfig::default();
        cfg.dsp.reposition = true;
        apply_cli(&cli, &mut cfg);
        assert_eq!(cfg.dsp.sample_rate, 96_000);
        assert!(cfg.dsp.reposition);
    }
}
