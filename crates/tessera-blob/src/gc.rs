//! Mark-and-sweep collection of unreferenced chunks.
//!
//! A pass runs `clear_in_use → start_mark → mark* → sweep`. The mark flag
//! and last-modified time live on each chunk in the backend, so the
//! collector never holds the id space in memory. Writers are never blocked:
//! a chunk modified at or after the epoch opened by `start_mark`, or more
//! recently than the configured minimum age, survives the following sweep
//! whatever its mark state.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tessera_store::ChunkStore;
use tessera_types::{ChunkId, Clock, Timestamp};
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::BlockCache;
use crate::error::BlobResult;

/// Where a collection pass stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GcPhase {
    /// Marks cleared (or never set); no epoch open.
    Idle,
    /// An epoch is open; `mark` and `sweep` are accepted.
    Marking { epoch: Timestamp },
    /// The last epoch has been swept.
    Swept,
}

impl fmt::Display for GcPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Marking { epoch } => write!(f, "marking (epoch {epoch})"),
            Self::Swept => f.write_str("swept"),
        }
    }
}

/// Collection protocol misuse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GcError {
    #[error("{operation} requires an open marking epoch, but the collector is {phase}")]
    NotMarking {
        operation: &'static str,
        phase: GcPhase,
    },
}

/// Outcome of one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcReport {
    pub deleted: usize,
    pub bytes_freed: u64,
    /// Chunks kept because they were marked.
    pub retained_marked: usize,
    /// Unmarked chunks kept because they were modified too recently.
    pub retained_recent: usize,
}

/// Drives the collection state machine over a [`ChunkStore`].
pub struct GarbageCollector {
    chunks: Arc<dyn ChunkStore>,
    cache: Arc<BlockCache>,
    clock: Arc<dyn Clock>,
    min_age_ms: u64,
    phase: Mutex<GcPhase>,
}

impl GarbageCollector {
    pub fn new(
        chunks: Arc<dyn ChunkStore>,
        cache: Arc<BlockCache>,
        clock: Arc<dyn Clock>,
        min_age_ms: u64,
    ) -> Self {
        Self {
            chunks,
            cache,
            clock,
            min_age_ms,
            phase: Mutex::new(GcPhase::Idle),
        }
    }

    pub fn phase(&self) -> GcPhase {
        *self.phase.lock()
    }

    pub fn min_age_ms(&self) -> u64 {
        self.min_age_ms
    }

    /// Unmark every chunk and return to [`GcPhase::Idle`].
    pub fn clear_in_use(&self) -> BlobResult<()> {
        let mut phase = self.phase.lock();
        self.chunks.clear_marks()?;
        *phase = GcPhase::Idle;
        info!("gc: marks cleared");
        Ok(())
    }

    /// Open a marking epoch at the current clock reading.
    ///
    /// Calling this again while marking reopens the epoch at the new time;
    /// marks already set are kept.
    pub fn start_mark(&self) -> Timestamp {
        let epoch = self.clock.now();
        let mut phase = self.phase.lock();
        if let GcPhase::Marking { epoch: previous } = *phase {
            debug!(%previous, %epoch, "gc: reopening marking epoch");
        }
        *phase = GcPhase::Marking { epoch };
        info!(%epoch, "gc: marking started");
        epoch
    }

    /// Fail unless an epoch is open.
    pub fn ensure_marking(&self, operation: &'static str) -> Result<Timestamp, GcError> {
        match *self.phase.lock() {
            GcPhase::Marking { epoch } => Ok(epoch),
            phase => Err(GcError::NotMarking { operation, phase }),
        }
    }

    /// Mark one physical chunk. Returns `false` if the chunk is absent.
    pub fn mark_chunk(&self, id: &ChunkId) -> BlobResult<bool> {
        self.ensure_marking("mark")?;
        let present = self.chunks.set_marked(id, true)?;
        if !present {
            debug!(chunk = %id.short_hex(), "gc: marked chunk is not stored");
        }
        Ok(present)
    }

    /// Delete every unmarked chunk last modified before both the epoch and
    /// the minimum-age horizon, then move to [`GcPhase::Swept`].
    pub fn sweep(&self) -> BlobResult<GcReport> {
        let epoch = self.ensure_marking("sweep")?;
        let now = self.clock.now();
        let horizon = now
            .saturating_sub_millis(self.min_age_ms)
            .saturating_add_millis(1);
        let cutoff = epoch.min(horizon);

        let mut report = GcReport::default();
        for id in self.chunks.ids()? {
            let id = id?;
            match self.chunks.sweep_chunk(&id, cutoff)? {
                Some(freed) => {
                    self.cache.invalidate(&id);
                    report.deleted += 1;
                    report.bytes_freed += freed;
                    debug!(chunk = %id.short_hex(), freed, "gc: swept chunk");
                }
                None => match self.chunks.metadata(&id)? {
                    Some(meta) if meta.marked => report.retained_marked += 1,
                    Some(_) => report.retained_recent += 1,
                    None => {}
                },
            }
        }

        let mut phase = self.phase.lock();
        if *phase == (GcPhase::Marking { epoch }) {
            *phase = GcPhase::Swept;
        }
        info!(
            %cutoff,
            deleted = report.deleted,
            bytes_freed = report.bytes_freed,
            retained_marked = report.retained_marked,
            retained_recent = report.retained_recent,
            "gc: sweep finished"
        );
        Ok(report)
    }
}

impl fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("phase", &self.phase())
            .field("min_age_ms", &self.min_age_ms)
            .finish()
    }
}
