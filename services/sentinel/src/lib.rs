//! Fence Sentinel
//!
//! Monitoring core for a perimeter fence installation. The service ingests
//! periodic sensor snapshots from the site controller, folds them into a
//! consistent [`SystemState`], records human-readable events on state edges,
//! and captures annotated evidence stills when alarm conditions hold.
//!
//! ## Features
//!
//! - **Partial-merge reduction**: sparse snapshots update only the fields they
//!   carry; history and event log are bounded
//! - **Edge detection**: motion, vibration, tamper, power and connectivity
//!   transitions become deduplicated log entries
//! - **Rate-limited capture**: one shared cooldown gates every alarm kind
//! - **Sink fallback**: captures go to a linked directory, or are delivered
//!   as downloads when no directory is linked or the write fails
//!
//! ## Architecture
//!
//! ```text
//!  Snapshot feed          Reducer               Dispatcher
//! ┌──────────────┐      ┌──────────────┐      ┌──────────────┐
//! │ JSON lines   │─────▶│ merge        │─────▶│ predicates   │
//! │ (mpsc, FIFO) │      │ history      │      │ cooldown     │
//! └──────────────┘      │ transitions  │      └──────────────┘
//!                       │ ledger       │             │
//!                       └──────────────┘             ▼
//!                              │              ┌──────────────┐
//!                              ▼              │ Capture      │
//!                       ┌──────────────┐      │ grab/overlay │
//!                       │ watch: view  │      │ png encode   │
//!                       └──────────────┘      └──────────────┘
//!                                                    │
//!                                         ┌──────────┴─────────┐
//!                                         ▼                    ▼
//!                                  ┌──────────────┐     ┌──────────────┐
//!                                  │ Directory    │────▶│ Downloads    │
//!                                  │ (primary)    │fail │ (fallback)   │
//!                                  └──────────────┘     └──────────────┘
//! ```

pub mod camera;
pub mod capture;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod feed;
pub mod history;
pub mod ledger;
pub mod overlay;
pub mod reducer;
pub mod session;
pub mod sink;
pub mod state;
pub mod transitions;

pub use camera::{FrameDevice, FrameSource, StillImageDevice, TestPatternDevice};
pub use capture::{artifact_filename, CapturePipeline};
pub use config::Config;
pub use dispatcher::{AlarmDispatcher, AlarmTag, CaptureRequest, DispatchDecision};
pub use error::{CaptureError, FrameError, SinkError};
pub use feed::{parse_line, parse_snapshot, run_feed, FeedError, FeedItem, FeedStats};
pub use history::{HistoryBuffer, HistoryPoint};
pub use ledger::{LogEntry, LogLedger, Severity};
pub use reducer::{reduce, Reduction};
pub use session::{Processed, Session, SessionCommand, SessionStats};
pub use sink::{ArtifactRef, ArtifactSink, DirectorySink, DownloadSink, SinkKind};
pub use state::{PartialSnapshot, SensorState, SystemState};
pub use transitions::{detect, Transition};
