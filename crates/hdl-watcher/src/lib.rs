//! File-drop watcher for HDL batch files.
//!
//! A [`DropWatcher`] polls an inbound directory for trigger files, hands each
//! resolved [`Artifact`](hdl_core::artifact::Artifact) to a bounded pool of
//! workers, and every worker runs the [`Pipeline`]: decrypt, parse, classify,
//! load, audit, archive.

pub mod archive;
pub mod config;
pub mod error;
pub mod gpg;
pub mod loader;
pub mod pipeline;
pub mod watcher;

pub use archive::Archiver;
pub use config::WatcherConfig;
pub use error::{PipelineError, RecordError, Result};
pub use gpg::GpgDecryptor;
pub use pipeline::{ArtifactReport, ArtifactState, Pipeline};
pub use watcher::{DropWatcher, InFlight, TriggerTracker};
