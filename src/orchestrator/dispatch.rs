//! Concurrent adapter dispatch for one checkout
//!
//! Every adapter runs on its own thread and reports back over a bounded
//! channel. All adapters share one deadline; an adapter that misses it, or
//! whose thread dies, is recorded as not-applicable with the neutral score.

use crate::adapters::{CategoryAdapter, NEUTRAL_SCORE};
use crate::discovery::ScanContext;
use crate::models::{Category, CategoryResult, CategoryResults};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

struct Pending {
    category: Category,
    name: &'static str,
    receiver: Option<Receiver<CategoryResult>>,
}

/// Run all adapters against `ctx` and wait for them (or the deadline).
///
/// Threads that miss the deadline are left to finish on their own; their
/// results are discarded.
pub fn run_adapters(
    adapters: &[Arc<dyn CategoryAdapter>],
    ctx: &Arc<ScanContext>,
    timeout: Duration,
    label: &str,
) -> CategoryResults {
    let deadline = Instant::now() + timeout;

    let pending: Vec<Pending> = adapters
        .iter()
        .map(|adapter| {
            let (tx, rx) = bounded(1);
            let worker = Arc::clone(adapter);
            let worker_ctx = Arc::clone(ctx);
            let spawned = thread::Builder::new()
                .name(format!("mcpvet-{}", adapter.name()))
                .spawn(move || {
                    let result = worker.scan(&worker_ctx);
                    // Receiver is gone once the deadline passed
                    let _ = tx.send(result);
                });
            let receiver = match spawned {
                Ok(_) => Some(rx),
                Err(e) => {
                    warn!("{}: could not start {} adapter: {}", label, adapter.name(), e);
                    None
                }
            };
            Pending {
                category: adapter.category(),
                name: adapter.name(),
                receiver,
            }
        })
        .collect();

    let mut results = CategoryResults::default();
    for p in pending {
        let result = match p.receiver {
            None => CategoryResult::not_applicable(
                NEUTRAL_SCORE,
                format!("{} adapter could not be started", p.name),
            ),
            Some(rx) => match rx.recv_deadline(deadline) {
                Ok(result) => {
                    debug!("{}: {} -> {} ({})", label, p.name, result.score, result.details);
                    result
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "{}: {} adapter timed out after {}s",
                        label,
                        p.name,
                        timeout.as_secs()
                    );
                    CategoryResult::not_applicable(
                        NEUTRAL_SCORE,
                        format!("{} timed out after {}s", p.name, timeout.as_secs()),
                    )
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("{}: {} adapter crashed", label, p.name);
                    CategoryResult::not_applicable(
                        NEUTRAL_SCORE,
                        format!("{} adapter crashed before reporting", p.name),
                    )
                }
            },
        };
        results.set(p.category, result);
    }
    results
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::CategoryStatus;
    use crate::scoring;

    /// Adapter returning a canned result, optionally after a delay or by panicking
    pub(crate) struct FakeAdapter {
        pub category: Category,
        pub result: CategoryResult,
        pub delay: Duration,
        pub panics: bool,
    }

    impl FakeAdapter {
        pub(crate) fn fixed(category: Category, score: u32) -> Arc<dyn CategoryAdapter> {
            Arc::new(Self {
                category,
                result: CategoryResult::pass(score, "fake"),
                delay: Duration::ZERO,
                panics: false,
            })
        }

        pub(crate) fn slow(category: Category, delay: Duration) -> Arc<dyn CategoryAdapter> {
            Arc::new(Self {
                category,
                result: CategoryResult::pass(100, "slow"),
                delay,
                panics: false,
            })
        }

        pub(crate) fn panicking(category: Category) -> Arc<dyn CategoryAdapter> {
            Arc::new(Self {
                category,
                result: CategoryResult::pass(100, "unreachable"),
                delay: Duration::ZERO,
                panics: true,
            })
        }
    }

    impl CategoryAdapter for FakeAdapter {
        fn category(&self) -> Category {
            self.category
        }

        fn name(&self) -> &'static str {
            "fake"
        }

        fn scan(&self, _ctx: &ScanContext) -> CategoryResult {
            if self.panics {
                panic!("adapter blew up");
            }
            thread::sleep(self.delay);
            self.result.clone()
        }
    }

    fn ctx() -> (tempfile::TempDir, Arc<ScanContext>) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(ScanContext::discover(dir.path()));
        (dir, ctx)
    }

    #[test]
    fn test_collects_every_category() {
        let (_dir, ctx) = ctx();
        let adapters: Vec<_> = Category::ALL
            .into_iter()
            .map(|c| FakeAdapter::fixed(c, 90))
            .collect();
        let results = run_adapters(&adapters, &ctx, Duration::from_secs(5), "t@1");
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|(_, r)| r.score == 90));
    }

    #[test]
    fn test_timeout_is_neutral() {
        let (_dir, ctx) = ctx();
        let mut adapters: Vec<_> = Category::ALL
            .into_iter()
            .filter(|c| *c != Category::Dependency)
            .map(|c| FakeAdapter::fixed(c, 90))
            .collect();
        adapters.push(FakeAdapter::slow(Category::Dependency, Duration::from_secs(3)));

        let results = run_adapters(&adapters, &ctx, Duration::from_millis(200), "t@1");
        let dep = results.get(Category::Dependency).unwrap();
        assert_eq!(dep.status, CategoryStatus::NotApplicable);
        assert_eq!(dep.score, NEUTRAL_SCORE);
        assert!(dep.details.contains("timed out"));

        // 35*90 + 25*50 + 20*90 + 10*90 + 10*90 = 8000
        let breakdown = scoring::calculate(&results).unwrap();
        assert_eq!(breakdown.overall_score, 80);
    }

    #[test]
    fn test_panic_is_contained() {
        let (_dir, ctx) = ctx();
        let adapters = vec![
            FakeAdapter::panicking(Category::StaticAnalysis),
            FakeAdapter::fixed(Category::Documentation, 100),
        ];
        let results = run_adapters(&adapters, &ctx, Duration::from_secs(5), "t@1");
        let crashed = results.get(Category::StaticAnalysis).unwrap();
        assert_eq!(crashed.score, NEUTRAL_SCORE);
        assert!(crashed.details.contains("crashed"));
        assert_eq!(results.get(Category::Documentation).unwrap().score, 100);
    }
}
