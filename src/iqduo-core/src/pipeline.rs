// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The DSP context: owns every piece of per-run state and executes one job
//! per admitted block.

use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::admission::{Admission, AdmittedBlock, JobAdmission};
use crate::config::ChainConfig;
use crate::dsp::{LoChannel, OscillatorTable, Repositioner, ResamplingChain};
use crate::error::DspError;
use crate::input::InputPool;
use crate::output::{OutputRing, Purpose};
use crate::telemetry::{ProcessTimes, StatusEvent};
use crate::{Iq, BLOCK_DURATION, TICK_INTERVAL};

/// Control messages handled by the worker between jobs.
#[derive(Debug, Clone, PartialEq)]
pub enum DspCommand {
    /// Regenerate the LO tables at these start phases (radians).
    Retune { phase_a: f64, phase_b: f64 },
    Reconfigure(ChainConfig),
    Stop,
}

/// Result of one processed block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobReport {
    pub block: u64,
    /// Complex samples written per purpose.
    pub samples: usize,
    pub elapsed: Duration,
    pub mismatch: Option<(u64, u64)>,
    /// Overwritten backlog blocks dropped at admission plus those that
    /// landed mid-job.
    pub skipped: u64,
}

pub struct DspPipeline {
    config: ChainConfig,
    pool_a: Arc<InputPool>,
    pool_b: Arc<InputPool>,
    output: Arc<OutputRing>,
    times: ProcessTimes,
    status: broadcast::Sender<StatusEvent>,

    table: OscillatorTable,
    chain_a: ResamplingChain,
    chain_b: ResamplingChain,
    repositioner: Repositioner,
    admission: JobAdmission,

    block_a: Vec<i16>,
    block_b: Vec<i16>,
    out_a: Vec<Iq>,
    out_b: Vec<Iq>,
    net_a: Vec<Iq>,
    net_b: Vec<Iq>,
}

impl DspPipeline {
    pub fn new(
        config: ChainConfig,
        pool_a: Arc<InputPool>,
        pool_b: Arc<InputPool>,
        output: Arc<OutputRing>,
        times: ProcessTimes,
        status: broadcast::Sender<StatusEvent>,
    ) -> Result<Self, DspError> {
        let chain_a = ResamplingChain::new(config.sample_rate, LoChannel::A)?;
        let chain_b = ResamplingChain::new(config.sample_rate, LoChannel::B)?;
        let admission = JobAdmission::with_depth(pool_a.completed(), pool_a.blocks());
        Ok(Self {
            config,
            pool_a,
            pool_b,
            output,
            times,
            status,
            table: OscillatorTable::default(),
            chain_a,
            chain_b,
            repositioner: Repositioner::new(),
            admission,
            block_a: Vec::new(),
            block_b: Vec::new(),
            out_a: Vec::new(),
            out_b: Vec::new(),
            net_a: Vec::new(),
            net_b: Vec::new(),
        })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn output(&self) -> &Arc<OutputRing> {
        &self.output
    }

    pub fn admission(&self) -> &JobAdmission {
        &self.admission
    }

    pub fn table(&self) -> &OscillatorTable {
        &self.table
    }

    fn emit(&self, event: StatusEvent) {
        // No subscribers is fine.
        let _ = self.status.send(event);
    }

    /// Regenerate both LO tables and restart the table walk.
    pub fn retune(&mut self, phase_a: f64, phase_b: f64) {
        self.table = OscillatorTable::generate(phase_a, phase_b);
        self.chain_a.reset_mixer();
        self.chain_b.reset_mixer();
        info!(
            "retuned LO: A {:.1} deg, B {:.1} deg",
            phase_a.to_degrees(),
            phase_b.to_degrees()
        );
        self.emit(StatusEvent::Retuned { phase_a, phase_b });
    }

    /// Swap the chain configuration. A rate change rebuilds both chains.
    pub fn reconfigure(&mut self, config: ChainConfig) -> Result<(), DspError> {
        if config.sample_rate != self.config.sample_rate {
            self.chain_a = ResamplingChain::new(config.sample_rate, LoChannel::A)?;
            self.chain_b = ResamplingChain::new(config.sample_rate, LoChannel::B)?;
            self.repositioner = Repositioner::new();
        }
        if !self.config.mode.is_enabled() && config.mode.is_enabled() {
            self.admission.resync(self.pool_a.completed());
        }
        info!(
            "DSP config: {} mode {}, reposition {}, duplicate A {}, network {}, soundcard {}",
            config.sample_rate,
            config.mode,
            config.reposition,
            config.duplicate_a,
            config.network_output,
            config.soundcard_output
        );
        self.config = config;
        Ok(())
    }

    /// Apply a command. Returns `false` once the worker should stop.
    pub fn handle(&mut self, command: DspCommand) -> Result<bool, DspError> {
        match command {
            DspCommand::Retune { phase_a, phase_b } => self.retune(phase_a, phase_b),
            DspCommand::Reconfigure(config) => self.reconfigure(config)?,
            DspCommand::Stop => return Ok(false),
        }
        Ok(true)
    }

    /// One admission check; runs a job if a new block is ready.
    pub fn tick(&mut self) -> Result<Option<JobReport>, DspError> {
        let latest_a = self.pool_a.completed();
        let latest_b = self.config.mode.is_dual().then(|| self.pool_b.completed());
        match self
            .admission
            .poll(self.config.mode.is_enabled(), latest_a, latest_b)
        {
            Admission::Admit(block) => self.run_job(block).map(Some),
            _ => Ok(None),
        }
    }

    fn run_job(&mut self, block: AdmittedBlock) -> Result<JobReport, DspError> {
        let started = Instant::now();
        if let Some((a, b)) = block.mismatch {
            warn!("block mismatch: A at {}, B at {}; using A", a, b);
            self.emit(StatusEvent::BlockMismatch { a, b });
        }

        self.pool_a.read_block(block.count, &mut self.block_a);
        if self.config.mode.is_dual() {
            self.pool_b.read_block(block.count, &mut self.block_b);
        }
        let result = self.process_loaded();

        let elapsed = started.elapsed();
        let late = self.admission.complete(self.pool_a.completed());
        self.times.record(elapsed);
        let samples = result?;

        let skipped = block.skipped + late;
        if skipped > 0 {
            debug!("skipped {} block(s) around block {}", skipped, block.count);
            self.emit(StatusEvent::BlocksSkipped { count: skipped });
        }
        if elapsed > BLOCK_DURATION {
            debug!("block {} took {:?}", block.count, elapsed);
        }
        Ok(JobReport {
            block: block.count,
            samples,
            elapsed,
            mismatch: block.mismatch,
            skipped,
        })
    }

    /// Run the chain over caller-supplied blocks, bypassing admission.
    ///
    /// `b` is ignored unless the mode is dual.
    pub fn process_block(&mut self, a: &[i16], b: Option<&[i16]>) -> Result<usize, DspError> {
        self.block_a.clear();
        self.block_a.extend_from_slice(a);
        self.block_b.clear();
        if let Some(b) = b {
            self.block_b.extend_from_slice(b);
        }
        self.process_loaded()
    }

    fn process_loaded(&mut self) -> Result<usize, DspError> {
        let dual = self.config.mode.is_dual();
        self.chain_a
            .process(&self.table, &self.block_a, &mut self.out_a)?;
        let n = self.out_a.len();
        if dual {
            self.chain_b
                .process(&self.table, &self.block_b, &mut self.out_b)?;
        } else {
            self.out_b.clear();
        }
        self.out_b.resize(n, Iq::new(0.0, 0.0));

        if self.config.network_output {
            self.net_a.clear();
            self.net_a.extend_from_slice(&self.out_a);
            self.net_b.clear();
            if self.config.duplicate_a {
                self.net_b.extend_from_slice(&self.out_a);
            } else if dual {
                self.net_b.extend_from_slice(&self.out_b);
            } else {
                self.net_b.resize(n, Iq::new(0.0, 0.0));
            }
            if self.config.reposition {
                self.repositioner
                    .apply_pair(&mut self.net_a, &mut self.net_b);
            }
        }

        let mut writes: Vec<(Purpose, &[Iq])> = Vec::with_capacity(4);
        if self.config.network_output {
            writes.push((Purpose::NetworkA, self.net_a.as_slice()));
            writes.push((Purpose::NetworkB, self.net_b.as_slice()));
        }
        if self.config.soundcard_output {
            writes.push((Purpose::SoundcardA, self.out_a.as_slice()));
            writes.push((Purpose::SoundcardB, self.out_b.as_slice()));
        }
        self.output.publish(n, &writes);
        Ok(n)
    }

    /// Move the pipeline onto its own worker thread.
    ///
    /// The thread ticks every [`TICK_INTERVAL`] and applies commands only
    /// between jobs. It exits on [`DspCommand::Stop`] or when the command
    /// sender is dropped.
    pub fn spawn(self, commands: Receiver<DspCommand>) -> std::io::Result<JoinHandle<()>> {
        self.spawn_with_tick(commands, TICK_INTERVAL)
    }

    /// [`DspPipeline::spawn`] with a custom admission period.
    pub fn spawn_with_tick(
        mut self,
        commands: Receiver<DspCommand>,
        tick: Duration,
    ) -> std::io::Result<JoinHandle<()>> {
        let tick = tick.max(Duration::from_millis(1));
        std::thread::Builder::new()
            .name("iqduo-dsp".to_string())
            .spawn(move || {
                info!("DSP worker started ({})", self.config.sample_rate);
                let mut next = Instant::now();
                'run: loop {
                    loop {
                        match commands.try_recv() {
                            Ok(command) => match self.handle(command) {
                                Ok(true) => {}
                                Ok(false) => break 'run,
                                Err(e) => warn!("DSP command rejected: {}", e),
                            },
                            Err(TryRecvError::Empty) => break,
                            Err(TryRecvError::Disconnected) => break 'run,
                        }
                    }

                    match self.tick() {
                        Ok(Some(report)) => debug!(
                            "block {}: {} samples in {:?}",
                            report.block, report.samples, report.elapsed
                        ),
                        Ok(None) => {}
                        Err(e) => warn!("DSP job failed: {}", e),
                    }

                    next += tick;
                    let now = Instant::now();
                    if next > now {
                        std::thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                }
                info!("DSP worker stopped");
            })
    }
}
