use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::pipeline::stage::StageKind;

/// How one stage execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Output delivered to the talkback address.
    Reported,
    /// Nothing to report; the reason names what was missing.
    Skipped(&'static str),
    /// Output produced but the talkback call failed.
    NotifyFailed,
}

#[derive(Debug, Default)]
struct OutcomeCounters {
    reported: AtomicU64,
    skipped: AtomicU64,
    notify_failed: AtomicU64,
}

/// Process-wide counters shared by the dispatcher and the pipeline.
#[derive(Debug, Default)]
pub struct PipelineStats {
    accepted: AtomicU64,
    malformed: AtomicU64,
    queue_full: AtomicU64,
    pool_closed: AtomicU64,
    unknown_stage: AtomicU64,
    stages: [OutcomeCounters; 5],
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: StageKind, outcome: &StageOutcome) {
        let counters = &self.stages[kind.index()];
        let counter = match outcome {
            StageOutcome::Reported => &counters.reported,
            StageOutcome::Skipped(_) => &counters.skipped,
            StageOutcome::NotifyFailed => &counters.notify_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue_full(&self) {
        self.queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pool_closed(&self) {
        self.pool_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_stage(&self) {
        self.unknown_stage.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let stages = StageKind::ALL
            .iter()
            .map(|kind| {
                let c = &self.stages[kind.index()];
                (
                    kind.name().to_string(),
                    StageCounts {
                        reported: c.reported.load(Ordering::Relaxed),
                        skipped: c.skipped.load(Ordering::Relaxed),
                        notify_failed: c.notify_failed.load(Ordering::Relaxed),
                    },
                )
            })
            .collect();

        StatsSnapshot {
            dispatcher: DispatcherCounts {
                accepted: self.accepted.load(Ordering::Relaxed),
                malformed: self.malformed.load(Ordering::Relaxed),
                queue_full: self.queue_full.load(Ordering::Relaxed),
                pool_closed: self.pool_closed.load(Ordering::Relaxed),
                unknown_stage: self.unknown_stage.load(Ordering::Relaxed),
            },
            stages,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherCounts {
    pub accepted: u64,
    pub malformed: u64,
    pub queue_full: u64,
    pub pool_closed: u64,
    pub unknown_stage: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub reported: u64,
    pub skipped: u64,
    pub notify_failed: u64,
}

/// Point-in-time copy of [`PipelineStats`], served on `/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub dispatcher: DispatcherCounts,
    pub stages: BTreeMap<String, StageCounts>,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let d = &self.dispatcher;
        writeln!(f, "\n=== Monitor Worker Stats ===")?;
        writeln!(f, "Tasks accepted:     {}", d.accepted)?;
        writeln!(f, "Malformed payloads: {}", d.malformed)?;
        writeln!(f, "Rejected (full):    {}", d.queue_full)?;
        writeln!(f, "Rejected (closed):  {}", d.pool_closed)?;
        writeln!(f, "Unknown stages:     {}", d.unknown_stage)?;
        writeln!(f, "\nBy stage (reported / skipped / notify failed):")?;
        for (name, c) in &self.stages {
            writeln!(
                f,
                "  {:<15} {} / {} / {}",
                name, c.reported, c.skipped, c.notify_failed
            )?;
        }
        Ok(())
    }
}
