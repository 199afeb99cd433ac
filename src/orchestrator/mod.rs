//! Run orchestration
//!
//! Every (server, version) moves through
//! `pending -> fetching -> scanning -> scored -> persisted`. A source that
//! cannot be fetched ends in `skipped` with a placeholder record. Versions
//! run concurrently on a rayon pool; the adapters of one version run
//! concurrently under a shared deadline (see [`dispatch`]).
//!
//! Persisting is the caller's job: records are handed back by value and the
//! caller commits them to the store in one pass.

pub mod dispatch;

use crate::adapters::CategoryAdapter;
use crate::discovery::ScanContext;
use crate::models::{AssessmentRecord, SecurityStatus};
use crate::record::{RecordBuilder, RecordError};
use crate::source::{ScanTarget, SourceProvider};
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default per-version deadline for all adapters together
pub const DEFAULT_ADAPTER_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanPhase {
    Pending,
    Fetching,
    Scanning,
    Scored,
    Persisted,
    Skipped,
}

impl ScanPhase {
    pub fn can_advance_to(self, next: ScanPhase) -> bool {
        use ScanPhase::*;
        matches!(
            (self, next),
            (Pending, Fetching)
                | (Fetching, Scanning)
                | (Fetching, Skipped)
                | (Scanning, Scored)
                | (Scored, Persisted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ScanPhase::Persisted | ScanPhase::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Pending => "pending",
            ScanPhase::Fetching => "fetching",
            ScanPhase::Scanning => "scanning",
            ScanPhase::Scored => "scored",
            ScanPhase::Persisted => "persisted",
            ScanPhase::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a version's scan amounted to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum OutcomeKind {
    Scored {
        overall_score: u32,
        status: SecurityStatus,
    },
    AwaitingScan {
        reason: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct VersionOutcome {
    pub target: ScanTarget,
    pub phase: ScanPhase,
    pub kind: OutcomeKind,
    /// Record to persist; `None` for errors, which leave the stored record alone
    pub record: Option<AssessmentRecord>,
    pub elapsed: Duration,
}

impl VersionOutcome {
    fn pending(target: ScanTarget) -> Self {
        Self {
            target,
            phase: ScanPhase::Pending,
            kind: OutcomeKind::Error {
                message: "scan did not complete".to_string(),
            },
            record: None,
            elapsed: Duration::ZERO,
        }
    }

    fn advance(&mut self, next: ScanPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {} -> {}",
            self.phase,
            next
        );
        debug!("{}: {} -> {}", self.target.label(), self.phase, next);
        self.phase = next;
    }

    /// Record that the store now holds this outcome's record.
    pub fn mark_persisted(&mut self) {
        if self.phase.can_advance_to(ScanPhase::Persisted) {
            self.advance(ScanPhase::Persisted);
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.phase == ScanPhase::Skipped
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct Orchestrator {
    adapters: Vec<Arc<dyn CategoryAdapter>>,
    source: Arc<dyn SourceProvider>,
    builder: RecordBuilder,
    adapter_timeout: Duration,
    workers: usize,
}

impl Orchestrator {
    /// All records of one run share `builder`'s timestamp and tool inventory.
    pub fn new(
        adapters: Vec<Arc<dyn CategoryAdapter>>,
        source: Arc<dyn SourceProvider>,
        builder: RecordBuilder,
    ) -> Self {
        Self {
            adapters,
            source,
            builder,
            adapter_timeout: DEFAULT_ADAPTER_TIMEOUT,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }

    pub fn adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Scan one version. Never panics and never fails the batch.
    pub fn scan_version(&self, target: &ScanTarget) -> VersionOutcome {
        let started = Instant::now();
        let mut outcome = VersionOutcome::pending(target.clone());

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.drive(&mut outcome)));
        if let Err(payload) = result {
            let message = panic_message(payload.as_ref());
            error!(
                "{}: scan aborted during {}: {}",
                target.label(),
                outcome.phase,
                message
            );
            outcome.kind = OutcomeKind::Error { message };
            outcome.record = None;
        }

        outcome.elapsed = started.elapsed();
        outcome
    }

    fn drive(&self, outcome: &mut VersionOutcome) {
        let label = outcome.target.label();
        outcome.advance(ScanPhase::Fetching);

        let checkout = match self.source.checkout(&outcome.target) {
            Ok(checkout) => checkout,
            Err(e) => {
                warn!("Skipping {}: {}", label, e);
                let reason = e.to_string();
                outcome.record = Some(self.builder.source_unavailable(&reason));
                outcome.kind = OutcomeKind::AwaitingScan { reason };
                outcome.advance(ScanPhase::Skipped);
                return;
            }
        };

        outcome.advance(ScanPhase::Scanning);
        let ctx = Arc::new(ScanContext::discover(checkout.path()));
        let results =
            dispatch::run_adapters(&self.adapters, &ctx, self.adapter_timeout, &label);

        let (record, kind) = match self.builder.build(results) {
            Ok(record) => {
                let kind = OutcomeKind::Scored {
                    overall_score: record.overall_score,
                    status: record.security_status(),
                };
                (record, kind)
            }
            Err(RecordError::NoCategoryResults) => {
                info!("{}: no categories evaluated, recording placeholder", label);
                (
                    self.builder.awaiting_scan(),
                    OutcomeKind::AwaitingScan {
                        reason: "no categories evaluated".to_string(),
                    },
                )
            }
        };
        info!("{}: {}", label, describe(&kind));
        outcome.record = Some(record);
        outcome.kind = kind;
        outcome.advance(ScanPhase::Scored);
    }

    /// Scan all targets concurrently. Outcomes come back in input order.
    pub fn run(&self, targets: &[ScanTarget], progress: Option<&ProgressBar>) -> Vec<VersionOutcome> {
        let scan_one = |target: &ScanTarget| {
            if let Some(pb) = progress {
                pb.set_message(target.label());
            }
            let outcome = self.scan_version(target);
            if let Some(pb) = progress {
                pb.inc(1);
            }
            outcome
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("mcpvet-scan-{}", i))
            .build();
        match pool {
            Ok(pool) => pool.install(|| targets.par_iter().map(scan_one).collect()),
            Err(e) => {
                warn!("Could not start worker pool ({}); scanning sequentially", e);
                targets.iter().map(scan_one).collect()
            }
        }
    }
}

fn describe(kind: &OutcomeKind) -> String {
    match kind {
        OutcomeKind::Scored {
            overall_score,
            status,
        } => format!("scored {} ({})", overall_score, status),
        OutcomeKind::AwaitingScan { reason } => format!("awaiting scan ({})", reason),
        OutcomeKind::Error { message } => format!("error ({})", message),
    }
}

#[cfg(test)]
mod tests {
    use super::dispatch::tests::FakeAdapter;
    use super::*;
    use crate::models::{Category, RecordState};
    use crate::record::PLACEHOLDER_SCORE;
    use crate::source::{Checkout, LocalSourceProvider, SourceError};
    use chrono::{TimeZone, Utc};

    fn target(slug: &str) -> ScanTarget {
        ScanTarget {
            server_name: slug.to_string(),
            slug: slug.to_string(),
            repository: String::new(),
            version: "1.0.0".to_string(),
        }
    }

    fn builder() -> RecordBuilder {
        RecordBuilder::new(Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap())
    }

    fn adapters(scores: [u32; 5]) -> Vec<Arc<dyn CategoryAdapter>> {
        Category::ALL
            .into_iter()
            .zip(scores)
            .map(|(c, s)| FakeAdapter::fixed(c, s))
            .collect()
    }

    fn sources(slugs: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for slug in slugs {
            std::fs::create_dir_all(dir.path().join(slug).join("1.0.0")).unwrap();
        }
        dir
    }

    struct PanickingSource;

    impl SourceProvider for PanickingSource {
        fn checkout(&self, _target: &ScanTarget) -> Result<Checkout, SourceError> {
            panic!("provider bug");
        }
    }

    #[test]
    fn test_phase_transitions() {
        assert!(ScanPhase::Pending.can_advance_to(ScanPhase::Fetching));
        assert!(ScanPhase::Fetching.can_advance_to(ScanPhase::Skipped));
        assert!(!ScanPhase::Pending.can_advance_to(ScanPhase::Scored));
        assert!(!ScanPhase::Skipped.can_advance_to(ScanPhase::Persisted));
        assert!(ScanPhase::Skipped.is_terminal());
    }

    #[test]
    fn test_scored_version() {
        let dir = sources(&["alpha"]);
        let orch = Orchestrator::new(
            adapters([90, 60, 100, 50, 100]),
            Arc::new(LocalSourceProvider::new(dir.path())),
            builder(),
        );
        let mut outcome = orch.scan_version(&target("alpha"));
        assert_eq!(outcome.phase, ScanPhase::Scored);
        assert_eq!(
            outcome.kind,
            OutcomeKind::Scored {
                overall_score: 82,
                status: SecurityStatus::Conditional
            }
        );
        outcome.mark_persisted();
        assert_eq!(outcome.phase, ScanPhase::Persisted);
    }

    #[test]
    fn test_unreachable_source_is_skipped_with_placeholder() {
        let dir = sources(&[]);
        let orch = Orchestrator::new(
            adapters([100; 5]),
            Arc::new(LocalSourceProvider::new(dir.path())),
            builder(),
        );
        let mut outcome = orch.scan_version(&target("ghost"));
        assert!(outcome.is_skipped());
        assert!(matches!(outcome.kind, OutcomeKind::AwaitingScan { .. }));
        let record = outcome.record.clone().unwrap();
        assert_eq!(record.overall_score, PLACEHOLDER_SCORE);
        assert_eq!(record.security_status(), SecurityStatus::UnderReview);
        assert_eq!(record.record_state, RecordState::AwaitingScan);

        outcome.mark_persisted();
        assert!(outcome.is_skipped());
    }

    #[test]
    fn test_no_adapters_gives_awaiting_scan() {
        let dir = sources(&["alpha"]);
        let orch = Orchestrator::new(
            vec![],
            Arc::new(LocalSourceProvider::new(dir.path())),
            builder(),
        );
        let outcome = orch.scan_version(&target("alpha"));
        assert_eq!(outcome.phase, ScanPhase::Scored);
        assert!(outcome.record.unwrap().is_placeholder());
    }

    #[test]
    fn test_panic_becomes_error_without_record() {
        let orch = Orchestrator::new(adapters([100; 5]), Arc::new(PanickingSource), builder());
        let outcome = orch.scan_version(&target("alpha"));
        assert_eq!(outcome.phase, ScanPhase::Fetching);
        assert!(matches!(outcome.kind, OutcomeKind::Error { ref message } if message == "provider bug"));
        assert!(outcome.record.is_none());
    }

    #[test]
    fn test_identical_inputs_give_identical_records() {
        let dir = sources(&["alpha"]);
        let orch = Orchestrator::new(
            adapters([70, 80, 90, 100, 60]),
            Arc::new(LocalSourceProvider::new(dir.path())),
            builder(),
        );
        let a = serde_json::to_string(&orch.scan_version(&target("alpha")).record).unwrap();
        let b = serde_json::to_string(&orch.scan_version(&target("alpha")).record).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_run_keeps_order_and_isolates_failures() {
        let dir = sources(&["a", "c"]);
        let orch = Orchestrator::new(
            adapters([100; 5]),
            Arc::new(LocalSourceProvider::new(dir.path())),
            builder(),
        )
        .workers(2);
        let targets = vec![target("a"), target("b"), target("c")];
        let pb = ProgressBar::hidden();
        let outcomes = orch.run(&targets, Some(&pb));
        let slugs: Vec<&str> = outcomes.iter().map(|o| o.target.slug.as_str()).collect();
        assert_eq!(slugs, vec!["a", "b", "c"]);
        assert!(!outcomes[0].is_skipped());
        assert!(outcomes[1].is_skipped());
        assert!(!outcomes[2].is_skipped());
        assert_eq!(pb.position(), 3);
    }
}
