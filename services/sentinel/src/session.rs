//! One monitoring session.
//!
//! Feed items are handled strictly one at a time in arrival order by a single
//! consumer, so operator commands and snapshots keep their relative order.
//! Every new state is published on a `watch` channel for display. Alarm
//! dispatch is decided inline, right after reduction, so the shared cooldown
//! is never raced; the capture work itself runs on spawned tasks.

use crate::camera::FrameSource;
use crate::capture::CapturePipeline;
use crate::config::Config;
use crate::dispatcher::{AlarmDispatcher, DispatchDecision};
use crate::error::{CaptureError, FrameError};
use crate::feed::FeedItem;
use crate::ledger::Severity;
use crate::reducer::reduce;
use crate::sink::{ArtifactRef, ArtifactSink, DirectorySink, DownloadSink};
use crate::state::{PartialSnapshot, SystemState};
use chrono::{DateTime, Local, Utc};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Operator commands passed through to the collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    StartCamera,
    StopCamera,
    LinkDirectory(PathBuf),
    UnlinkDirectory,
}

/// Statistics for the session.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub snapshots_reduced: u64,
    pub empty_snapshots: u64,
    pub events_logged: u64,
    pub capture_batches: u64,
    pub captures_requested: u64,
    pub captures_suppressed: u64,
}

/// Outcome of processing one snapshot.
#[derive(Debug)]
pub struct Processed {
    pub decision: Option<DispatchDecision>,
    /// Spawned capture tasks; dropping them does not cancel the work.
    pub captures: Vec<JoinHandle<Result<ArtifactRef, CaptureError>>>,
}

pub struct Session {
    state_tx: watch::Sender<SystemState>,
    dispatcher: AlarmDispatcher,
    pipeline: Arc<CapturePipeline>,
    require_camera: bool,
    stats: RwLock<SessionStats>,
}

impl Session {
    /// Create a session over an existing frame source.
    pub fn new(config: &Config, frames: Arc<FrameSource>) -> Self {
        let fallback: Arc<dyn ArtifactSink> =
            Arc::new(DownloadSink::new(config.capture.download_dir.clone()));
        let pipeline = Arc::new(CapturePipeline::new(frames, fallback));

        if let Some(dir) = &config.capture.directory {
            pipeline.set_primary(Some(Arc::new(DirectorySink::new(dir.clone()))));
        }

        let baseline =
            SystemState::baseline(config.buffers.history_capacity, config.buffers.log_capacity);
        let (state_tx, _) = watch::channel(baseline);

        Self {
            state_tx,
            dispatcher: AlarmDispatcher::new(config.alarms.clone()),
            pipeline,
            require_camera: config.alarms.require_camera,
            stats: RwLock::new(SessionStats::default()),
        }
    }

    /// Create a session with the frame device selected in `config`.
    pub fn from_config(config: &Config) -> Result<Self, FrameError> {
        let frames = Arc::new(FrameSource::from_config(&config.camera)?);
        Ok(Self::new(config, frames))
    }

    /// Subscribe to every state the session produces.
    pub fn subscribe(&self) -> watch::Receiver<SystemState> {
        self.state_tx.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> SystemState {
        self.state_tx.borrow().clone()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.read().clone()
    }

    pub fn pipeline(&self) -> &Arc<CapturePipeline> {
        &self.pipeline
    }

    /// Consume feed items until the channel closes, then wait for the
    /// captures still in flight.
    pub async fn run(&self, mut items: mpsc::Receiver<FeedItem>) {
        info!("Reduction loop started");
        let mut in_flight: Vec<JoinHandle<Result<ArtifactRef, CaptureError>>> = Vec::new();

        while let Some(item) = items.recv().await {
            match item {
                FeedItem::Snapshot(raw) => {
                    let processed = self.process(&raw, Utc::now());
                    in_flight.retain(|handle| !handle.is_finished());
                    in_flight.extend(processed.captures);
                }
                FeedItem::Command(command) => {
                    if let Err(e) = self.apply(command).await {
                        error!(error = %e, "Command failed");
                    }
                }
            }
        }

        if !in_flight.is_empty() {
            info!(pending = in_flight.len(), "Waiting for in-flight captures");
        }
        for handle in in_flight {
            // Outcomes are logged by the capture task itself.
            if let Err(e) = handle.await {
                warn!(error = %e, "Capture task did not complete");
            }
        }

        info!("Feed channel closed, reduction loop finished");
    }

    /// Reduce one snapshot at `now` and dispatch any alarm captures.
    ///
    /// Must only be called from one task at a time.
    pub fn process(&self, raw: &PartialSnapshot, now: DateTime<Utc>) -> Processed {
        if raw.is_empty() {
            debug!("Snapshot carried no usable fields");
            self.stats.write().empty_snapshots += 1;
        }

        let local = now.with_timezone(&Local);
        let reduction = {
            let prev = self.state_tx.borrow();
            reduce(&prev, raw, &local)
        };
        self.state_tx.send_replace(reduction.state.clone());

        for event in &reduction.events {
            match event.severity() {
                Severity::Info => info!(severity = %event.severity(), "{}", event.message()),
                Severity::Alert | Severity::Error => {
                    warn!(severity = %event.severity(), "{}", event.message())
                }
            }
        }

        metrics::counter!("sentinel.snapshots.reduced").increment(1);
        metrics::counter!("sentinel.events.logged").increment(reduction.logged as u64);
        {
            let mut stats = self.stats.write();
            stats.snapshots_reduced += 1;
            stats.events_logged += reduction.logged as u64;
        }

        if self.require_camera && !self.pipeline.frames().is_active() {
            trace!("Frame source inactive, alarm dispatch skipped");
            return Processed {
                decision: None,
                captures: Vec::new(),
            };
        }

        let decision = self.dispatcher.dispatch(&reduction.state, now);
        let captures = match &decision {
            DispatchDecision::Fire(requests) => {
                info!(
                    tags = ?requests.iter().map(|r| r.tag.as_str()).collect::<Vec<_>>(),
                    "Alarm capture batch dispatched"
                );
                metrics::counter!("sentinel.captures.dispatched").increment(requests.len() as u64);
                {
                    let mut stats = self.stats.write();
                    stats.capture_batches += 1;
                    stats.captures_requested += requests.len() as u64;
                }
                requests
                    .iter()
                    .cloned()
                    .map(|request| {
                        let pipeline = self.pipeline.clone();
                        tokio::spawn(async move {
                            let result = pipeline.capture(&request).await;
                            match &result {
                                Ok(artifact) => {
                                    metrics::counter!(
                                        "sentinel.captures.persisted",
                                        "sink" => artifact.sink.as_str()
                                    )
                                    .increment(1);
                                }
                                Err(CaptureError::NoFrameSource) => {
                                    warn!(tag = %request.tag, "Capture skipped, no frame source");
                                    metrics::counter!("sentinel.captures.failed").increment(1);
                                }
                                Err(e) => {
                                    error!(tag = %request.tag, error = %e, "Capture failed");
                                    metrics::counter!("sentinel.captures.failed").increment(1);
                                }
                            }
                            result
                        })
                    })
                    .collect()
            }
            DispatchDecision::CoolingDown { .. } => {
                metrics::counter!("sentinel.captures.suppressed").increment(1);
                self.stats.write().captures_suppressed += 1;
                Vec::new()
            }
            DispatchDecision::Idle => Vec::new(),
        };

        Processed {
            decision: Some(decision),
            captures,
        }
    }

    /// Apply an operator command.
    pub async fn apply(&self, command: SessionCommand) -> Result<(), FrameError> {
        debug!(command = ?command, "Applying session command");
        match command {
            SessionCommand::StartCamera => {
                self.pipeline.frames().start().await?;
            }
            SessionCommand::StopCamera => {
                self.pipeline.frames().stop().await;
            }
            SessionCommand::LinkDirectory(path) => {
                self.set_directory_handle(Some(Arc::new(DirectorySink::new(path))));
            }
            SessionCommand::UnlinkDirectory => self.set_directory_handle(None),
        }
        Ok(())
    }

    /// Link or clear the primary sink.
    pub fn set_directory_handle(&self, sink: Option<Arc<dyn ArtifactSink>>) {
        self.pipeline.set_primary(sink);
    }

    /// Release the camera and the storage link.
    pub async fn shutdown(&self) {
        self.pipeline.frames().stop().await;
        self.set_directory_handle(None);

        let stats = self.stats();
        info!(
            snapshots_reduced = stats.snapshots_reduced,
            events_logged = stats.events_logged,
            capture_batches = stats.capture_batches,
            captures_suppressed = stats.captures_suppressed,
            "Session closed"
        );
    }
}
