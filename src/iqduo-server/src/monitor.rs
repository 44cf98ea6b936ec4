// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Periodic load and phase supervision, plus status event logging.

use std::f64::consts::TAU;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use iqduo_core::{
    DspCommand, OutputRing, PerformanceMonitor, PhaseAnalyzer, ProcessTimes, StatusEvent,
};

const MONITOR_INTERVAL: Duration = Duration::from_secs(1);

/// What the monitor needs to know about the running chain.
#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub dual: bool,
    pub mirrored: bool,
    /// LO start phases currently in effect (radians).
    pub phase_a: f64,
    pub phase_b: f64,
}

pub struct Supervisor {
    perf: PerformanceMonitor,
    analyzer: PhaseAnalyzer,
    settings: MonitorSettings,
    ring: Arc<OutputRing>,
    status: broadcast::Sender<StatusEvent>,
    commands: Sender<DspCommand>,
}

impl Supervisor {
    pub fn new(
        times: ProcessTimes,
        analyzer: PhaseAnalyzer,
        settings: MonitorSettings,
        ring: Arc<OutputRing>,
        status: broadcast::Sender<StatusEvent>,
        commands: Sender<DspCommand>,
    ) -> Self {
        Self {
            perf: PerformanceMonitor::new(times),
            analyzer,
            settings,
            ring,
            status,
            commands,
        }
    }

    /// One supervision pass. Returns the retune command sent, if any.
    pub fn pass(&mut self) -> Option<DspCommand> {
        if let Some(summary) = self.perf.check() {
            if summary.overrun {
                let _ = self.status.send(summary.to_event());
            }
        }

        if !self.settings.dual {
            return None;
        }
        let report = self.analyzer.analyze(&self.ring, self.settings.mirrored)?;
        debug!(
            "A-B phase {:.1} deg (spread {:.2} deg, peak {:.0})",
            report.mean.to_degrees(),
            report.spread().to_degrees(),
            report.peak
        );
        let correction = self.analyzer.auto_correction(&report)?;
        self.settings.phase_b = (self.settings.phase_b + correction).rem_euclid(TAU);
        let command = DspCommand::Retune {
            phase_a: self.settings.phase_a,
            phase_b: self.settings.phase_b,
        };
        if self.commands.send(command.clone()).is_err() {
            warn!("DSP worker gone; phase correction dropped");
            return None;
        }
        Some(command)
    }
}

pub async fn run_supervisor(mut supervisor: Supervisor, mut shutdown_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(MONITOR_INTERVAL);
    // The first tick fires immediately; skip it so a full second of jobs
    // is measured.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                supervisor.pass();
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

/// Log every status event as one JSON line.
pub async fn run_status_logger(mut status_rx: broadcast::Receiver<StatusEvent>) {
    loop {
        match status_rx.recv().await {
            Ok(event) => {
                let json = serde_json::to_string(&event).unwrap_or_default();
                match event {
                    StatusEvent::Retuned { .. } => info!("status {}", json),
                    _ => debug!("status {}", json),
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("status logger: dropped {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
