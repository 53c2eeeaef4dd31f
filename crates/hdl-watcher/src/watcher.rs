//! [`DropWatcher`]: polls the inbound directory and feeds a worker pool.
//!
//! The poller only detects and resolves triggers. Resolved artifacts go into a
//! bounded channel; `workers` tasks drain it, each running one artifact at a
//! time through the [`Pipeline`]. When the channel is full the poller waits.

use std::{
  collections::{HashMap, HashSet},
  path::{Path, PathBuf},
  sync::{Arc, Mutex, PoisonError},
  time::{Duration, Instant, SystemTime},
};

use hdl_core::{artifact::Artifact, decrypt::PayloadDecryptor, store::ImportStore};
use tokio::{
  sync::{Mutex as AsyncMutex, mpsc},
  task::JoinSet,
  time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{
  Pipeline, PipelineError, Result,
  config::{WatchConfig, WorkerConfig},
};

// ─── Quiescence tracking ─────────────────────────────────────────────────────

/// One trigger as seen by a directory scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed {
  pub path:     PathBuf,
  pub len:      u64,
  pub modified: Option<SystemTime>,
}

#[derive(Debug)]
struct Candidate {
  len:          u64,
  modified:     Option<SystemTime>,
  stable_since: Instant,
  dispatched:   bool,
}

/// Decides when a trigger is ready: its size and mtime must stay unchanged
/// for the quiescence window. A trigger is reported once per version: a size
/// or mtime change, or [`TriggerTracker::forget`], makes it a new candidate.
#[derive(Debug)]
pub struct TriggerTracker {
  quiescence: Duration,
  candidates: HashMap<PathBuf, Candidate>,
}

impl TriggerTracker {
  pub fn new(quiescence: Duration) -> Self {
    Self { quiescence, candidates: HashMap::new() }
  }

  /// Feed one scan; returns the triggers that became ready.
  ///
  /// Triggers absent from the scan are forgotten, so a later re-delivery
  /// under the same name is a new candidate.
  pub fn observe(&mut self, scan: Vec<Observed>, now: Instant) -> Vec<PathBuf> {
    let present: HashSet<&Path> = scan.iter().map(|o| o.path.as_path()).collect();
    self.candidates.retain(|path, _| present.contains(path.as_path()));

    let mut ready = Vec::new();
    for seen in &scan {
      let candidate = self
        .candidates
        .entry(seen.path.clone())
        .or_insert_with(|| Candidate {
          len:          seen.len,
          modified:     seen.modified,
          stable_since: now,
          dispatched:   false,
        });

      if candidate.len != seen.len || candidate.modified != seen.modified {
        candidate.len = seen.len;
        candidate.modified = seen.modified;
        candidate.stable_since = now;
        candidate.dispatched = false;
      }

      if !candidate.dispatched && now.duration_since(candidate.stable_since) >= self.quiescence {
        candidate.dispatched = true;
        ready.push(seen.path.clone());
      }
    }
    ready
  }

  /// Drop what is known about `path`; if it is still present at the next
  /// scan it waits out a fresh quiescence window and is reported again.
  pub fn forget(&mut self, path: &Path) { self.candidates.remove(path); }

  /// Treat `path` as already dispatched.
  pub fn mark_seen(&mut self, seen: Observed, now: Instant) {
    self.candidates.insert(seen.path, Candidate {
      len:          seen.len,
      modified:     seen.modified,
      stable_since: now,
      dispatched:   true,
    });
  }
}

// ─── In-flight guard ─────────────────────────────────────────────────────────

/// Payload names currently queued or being processed. A name is admitted at
/// most once at a time.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<Mutex<HashSet<String>>>);

impl InFlight {
  /// `false` when `name` is already in flight.
  pub fn admit(&self, name: &str) -> bool {
    self.0.lock().unwrap_or_else(PoisonError::into_inner).insert(name.to_owned())
  }

  pub fn release(&self, name: &str) {
    self.0.lock().unwrap_or_else(PoisonError::into_inner).remove(name);
  }

  pub fn len(&self) -> usize { self.0.lock().unwrap_or_else(PoisonError::into_inner).len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

// ─── Watcher ─────────────────────────────────────────────────────────────────

pub struct DropWatcher<S, D> {
  watch:     WatchConfig,
  workers:   WorkerConfig,
  pipeline:  Arc<Pipeline<S, D>>,
  in_flight: InFlight,
}

impl<S, D> DropWatcher<S, D>
where
  S: ImportStore + 'static,
  D: PayloadDecryptor + 'static,
{
  pub fn new(watch: WatchConfig, workers: WorkerConfig, pipeline: Pipeline<S, D>) -> Self {
    Self {
      watch,
      workers,
      pipeline: Arc::new(pipeline),
      in_flight: InFlight::default(),
    }
  }

  pub fn pipeline(&self) -> &Pipeline<S, D> { &self.pipeline }

  /// Poll until `cancel` fires, then let the workers finish what they hold.
  pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
    let (tx, rx) = mpsc::channel(self.workers.queue_capacity.max(1));
    let (retry_tx, mut retry_rx) = mpsc::unbounded_channel();
    let mut workers = self.spawn_workers(rx, Some(retry_tx));
    let mut tracker = TriggerTracker::new(self.watch.quiescence());

    if !self.watch.process_existing {
      let now = Instant::now();
      for seen in self.scan().await? {
        tracker.mark_seen(seen, now);
      }
    }

    tracing::info!(
      dir = %self.watch.inbound_dir.display(),
      workers = self.workers.count.max(1),
      "watching for triggers"
    );

    let mut ticker = tokio::time::interval(self.watch.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = ticker.tick() => {}
      }

      let scan = match self.scan().await {
        Ok(scan) => scan,
        Err(e) => {
          tracing::warn!(error = %e, "scan failed");
          continue;
        }
      };

      while let Ok(trigger) = retry_rx.try_recv() {
        tracker.forget(&trigger);
      }

      for trigger in tracker.observe(scan, Instant::now()) {
        let Some(artifact) = self.admit(&trigger).await else { continue };
        tokio::select! {
          sent = tx.send(artifact) => if sent.is_err() { break },
          _ = cancel.cancelled() => break,
        }
      }
    }

    drop(tx);
    let processed = drain(&mut workers).await;
    tracing::info!(processed, "watcher stopped");
    Ok(())
  }

  /// Process every trigger currently present, without waiting for
  /// quiescence, and return once all of them are done.
  pub async fn run_once(&self) -> Result<usize> {
    let (tx, rx) = mpsc::channel(self.workers.queue_capacity.max(1));
    let mut workers = self.spawn_workers(rx, None);

    for seen in self.scan().await? {
      let Some(artifact) = self.admit(&seen.path).await else { continue };
      if tx.send(artifact).await.is_err() {
        break;
      }
    }

    drop(tx);
    Ok(drain(&mut workers).await)
  }

  /// Trigger files directly inside the inbound directory, by name order.
  async fn scan(&self) -> Result<Vec<Observed>> {
    let dir = &self.watch.inbound_dir;
    let scan_error = |source| PipelineError::Scan { dir: dir.clone(), source };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(scan_error)?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(scan_error)? {
      let name = entry.file_name();
      let Some(name) = name.to_str() else { continue };
      if !name.ends_with(&self.watch.trigger_suffix) {
        continue;
      }
      let Ok(meta) = entry.metadata().await else { continue };
      if !meta.is_file() {
        continue;
      }
      found.push(Observed {
        path:     entry.path(),
        len:      meta.len(),
        modified: meta.modified().ok(),
      });
    }
    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
  }

  /// Resolve a trigger to its artifact and claim it for processing.
  async fn admit(&self, trigger: &Path) -> Option<Artifact> {
    let artifact = match Artifact::from_trigger(trigger, &self.watch.trigger_suffix) {
      Ok(artifact) => artifact,
      Err(e) => {
        tracing::warn!(trigger = %trigger.display(), error = %e, "ignoring trigger");
        return None;
      }
    };

    if !tokio::fs::try_exists(&artifact.payload_path).await.unwrap_or(false) {
      let err = PipelineError::TriggerResolution {
        trigger: artifact.trigger_path,
        payload: artifact.payload_path,
      };
      tracing::error!(error = %err, "abandoning trigger");
      return None;
    }

    if !self.in_flight.admit(&artifact.file_name) {
      tracing::warn!(file = %artifact.file_name, "already in flight; duplicate trigger ignored");
      return None;
    }

    tracing::debug!(file = %artifact.file_name, "artifact detected");
    Some(artifact)
  }

  /// Start the worker pool. When `retry` is set, the trigger of every
  /// artifact that is still in the inbound directory after processing (its
  /// archive or quarantine move failed) is sent back so the poller re-arms it.
  fn spawn_workers(
    &self,
    rx: mpsc::Receiver<Artifact>,
    retry: Option<mpsc::UnboundedSender<PathBuf>>,
  ) -> JoinSet<usize> {
    let rx = Arc::new(AsyncMutex::new(rx));
    let mut set = JoinSet::new();
    for worker in 0..self.workers.count.max(1) {
      let rx = Arc::clone(&rx);
      let pipeline = Arc::clone(&self.pipeline);
      let in_flight = self.in_flight.clone();
      let retry = retry.clone();
      set.spawn(async move {
        let mut processed = 0;
        loop {
          let next = rx.lock().await.recv().await;
          let Some(artifact) = next else { break };
          let name = artifact.file_name.clone();
          let trigger = artifact.trigger_path.clone();
          let report = pipeline.process(artifact).await;
          // Release before re-arming, or the retry is dropped as a duplicate.
          in_flight.release(&name);
          if report.archived_to.is_none()
            && let Some(retry) = &retry
          {
            tracing::warn!(worker, file = %name, "artifact left in inbound; will retry");
            let _ = retry.send(trigger);
          }
          processed += 1;
          tracing::debug!(worker, file = %name, state = ?report.state, "worker finished artifact");
        }
        processed
      });
    }
    set
  }
}

async fn drain(workers: &mut JoinSet<usize>) -> usize {
  let mut processed = 0;
  while let Some(joined) = workers.join_next().await {
    match joined {
      Ok(n) => processed += n,
      Err(e) => tracing::error!(error = %e, "worker task failed"),
    }
  }
  processed
}
