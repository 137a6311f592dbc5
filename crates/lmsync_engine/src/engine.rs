//! Sync engine state machine and cycle driver.

use crate::adapter::{CrossReferenceResolver, SourceAdapter, TransformOutcome};
use crate::clock::{Clock, SystemClock};
use crate::config::{SourceConfig, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::reader::ChangeFeedReader;
use crate::reconcile::RevisionReconciler;
use crate::store::{CheckpointStore, SourceStore, TargetStore};
use crate::writer::TargetWriter;
use lmsync_protocol::{FeedMode, RouterDocument, Seq};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// The current phase of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    /// Between cycles.
    Idle,
    /// Pulling a page from a source's change feed.
    Fetching,
    /// Converting and filtering native documents.
    Transforming,
    /// Merging existing target revisions into the batch.
    Reconciling,
    /// Writing the batch to the target store.
    Writing,
    /// Durably recording the new cursor.
    Checkpointing,
    /// Finished; only reached in one-shot mode.
    Done,
}

impl EnginePhase {
    /// Returns true if the engine will not run further cycles.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EnginePhase::Done)
    }
}

/// How the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// One full cycle per source, then stop.
    OneShot,
    /// Cycle forever, long-polling the sources, until the process is
    /// terminated.
    Continuous,
}

impl SyncMode {
    fn feed_mode(&self) -> FeedMode {
        match self {
            SyncMode::OneShot => FeedMode::Normal,
            SyncMode::Continuous => FeedMode::Longpoll,
        }
    }
}

/// Counters for one source's cycle; the user-visible summary.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Which source the cycle ran against.
    pub source_id: String,
    /// Change events fetched from the feed.
    pub fetched: usize,
    /// Deletion events (counted, not propagated).
    pub deleted: usize,
    /// Documents filtered out as non-routers or lacking a body.
    pub skipped: usize,
    /// Documents dropped because required fields were missing.
    pub malformed: usize,
    /// Documents accepted by the target.
    pub accepted: usize,
    /// Documents deferred to the next cycle after a revision conflict.
    pub conflicted: usize,
    /// Documents the target rejected for other reasons.
    pub failed: usize,
    /// The cursor recorded for this cycle.
    pub seq: Seq,
}

impl CycleReport {
    fn new(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            fetched: 0,
            deleted: 0,
            skipped: 0,
            malformed: 0,
            accepted: 0,
            conflicted: 0,
            failed: 0,
            seq: Seq::zero(),
        }
    }
}

/// Cumulative statistics across cycles.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Completed cycles, over all sources.
    pub cycles_completed: u64,
    /// Total documents accepted by the target.
    pub docs_accepted: u64,
    /// Total revision conflicts deferred.
    pub docs_conflicted: u64,
    /// Total non-conflict write failures.
    pub docs_failed: u64,
    /// Total documents filtered or malformed.
    pub docs_skipped: u64,
    /// Transient-failure retries in continuous mode.
    pub retries: u64,
    /// The most recent error message, if any.
    pub last_error: Option<String>,
}

struct BoundSource {
    config: SourceConfig,
    adapter: SourceAdapter,
    store: Arc<dyn SourceStore>,
    /// Native ids whose last write conflicted; re-read next cycle.
    deferred: RwLock<BTreeSet<String>>,
}

/// The sync engine: replicates configured sources into the target store.
///
/// Single-threaded and cooperative: one cycle runs to completion before
/// the next begins, and a source's checkpoint advances strictly after that
/// source's write step. Interrupting the process mid-cycle is safe — the
/// un-checkpointed range is simply re-processed, and revision forwarding
/// makes the writes idempotent.
pub struct SyncEngine {
    config: SyncConfig,
    sources: Vec<BoundSource>,
    target: Arc<dyn TargetStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    clock: Arc<dyn Clock>,
    reader: ChangeFeedReader,
    phase: RwLock<EnginePhase>,
    stats: RwLock<EngineStats>,
}

impl SyncEngine {
    /// Creates an engine over the given target and checkpoint stores.
    ///
    /// Each configured source must be bound to its store with
    /// [`bind_source`](Self::bind_source) before running.
    pub fn new(
        config: SyncConfig,
        target: Arc<dyn TargetStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        let reader = match config.fetch_limit {
            Some(limit) => ChangeFeedReader::with_limit(limit),
            None => ChangeFeedReader::new(),
        };
        Self {
            config,
            sources: Vec::new(),
            target,
            checkpoints,
            clock: Arc::new(SystemClock),
            reader,
            phase: RwLock::new(EnginePhase::Idle),
            stats: RwLock::new(EngineStats::default()),
        }
    }

    /// Replaces the clock; tests inject a fixed one.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Binds a configured source to the store that serves it.
    pub fn bind_source(
        &mut self,
        source_id: &str,
        store: Arc<dyn SourceStore>,
    ) -> SyncResult<()> {
        let config = self
            .config
            .sources
            .iter()
            .find(|s| s.id == source_id)
            .cloned()
            .ok_or_else(|| SyncError::Config(format!("unknown source id {source_id:?}")))?;
        let adapter = SourceAdapter::from_config(&config);
        self.sources.push(BoundSource {
            config,
            adapter,
            store,
            deferred: RwLock::new(BTreeSet::new()),
        });
        Ok(())
    }

    /// The engine's current phase.
    pub fn phase(&self) -> EnginePhase {
        *self.phase.read()
    }

    /// Cumulative statistics.
    pub fn stats(&self) -> EngineStats {
        self.stats.read().clone()
    }

    fn set_phase(&self, phase: EnginePhase) {
        *self.phase.write() = phase;
    }

    fn ensure_bound(&self) -> SyncResult<()> {
        for configured in &self.config.sources {
            if !self.sources.iter().any(|b| b.config.id == configured.id) {
                return Err(SyncError::Config(format!(
                    "source {:?} has no bound store",
                    configured.id
                )));
            }
        }
        if self.sources.is_empty() {
            return Err(SyncError::Config("no sources bound".into()));
        }
        Ok(())
    }

    /// Runs one full cycle for every source and returns the reports.
    pub fn run_once(&self, mode: SyncMode) -> SyncResult<Vec<CycleReport>> {
        self.ensure_bound()?;

        let mut reports = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let report = self.run_cycle(source, mode)?;
            tracing::info!(
                source = %report.source_id,
                fetched = report.fetched,
                accepted = report.accepted,
                conflicted = report.conflicted,
                failed = report.failed,
                skipped = report.skipped,
                malformed = report.malformed,
                seq = %report.seq,
                "cycle complete"
            );
            {
                let mut stats = self.stats.write();
                stats.cycles_completed += 1;
                stats.docs_accepted += report.accepted as u64;
                stats.docs_conflicted += report.conflicted as u64;
                stats.docs_failed += report.failed as u64;
                stats.docs_skipped += (report.skipped + report.malformed) as u64;
                stats.last_error = None;
            }
            reports.push(report);
        }
        Ok(reports)
    }

    /// Runs the engine until done (one-shot) or until the process is
    /// terminated (continuous).
    ///
    /// In continuous mode transient store failures are logged and retried
    /// with backoff, without advancing any checkpoint; a checkpoint persist
    /// failure halts in every mode.
    pub fn run(&self, mode: SyncMode) -> SyncResult<()> {
        match mode {
            SyncMode::OneShot => {
                self.run_once(mode)?;
                self.set_phase(EnginePhase::Done);
                Ok(())
            }
            SyncMode::Continuous => {
                let mut consecutive_failures: u32 = 0;
                loop {
                    match self.run_once(mode) {
                        Ok(_) => {
                            consecutive_failures = 0;
                            self.set_phase(EnginePhase::Idle);
                            std::thread::sleep(self.config.poll_interval());
                        }
                        Err(e) if e.is_transient() => {
                            consecutive_failures += 1;
                            {
                                let mut stats = self.stats.write();
                                stats.retries += 1;
                                stats.last_error = Some(e.to_string());
                            }
                            if consecutive_failures >= self.config.retry.max_attempts {
                                return Err(e);
                            }
                            let delay = self.config.retry.delay_for_attempt(consecutive_failures);
                            tracing::warn!(
                                error = %e,
                                attempt = consecutive_failures,
                                delay_ms = delay.as_millis() as u64,
                                "transient failure, backing off"
                            );
                            self.set_phase(EnginePhase::Idle);
                            std::thread::sleep(delay);
                        }
                        Err(e) => {
                            self.stats.write().last_error = Some(e.to_string());
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// One cycle for one source:
    /// fetch → transform → reconcile → write → checkpoint.
    fn run_cycle(&self, source: &BoundSource, mode: SyncMode) -> SyncResult<CycleReport> {
        let source_id = source.config.id.as_str();
        let mut report = CycleReport::new(source_id);

        self.set_phase(EnginePhase::Fetching);
        let since = self.checkpoints.load(source_id)?.unwrap_or_default();
        let page = self
            .reader
            .pull(source.store.as_ref(), &since, mode.feed_mode())?;
        report.fetched = page.events.len();

        self.set_phase(EnginePhase::Transforming);
        // Conflicts from the previous cycle are retried by re-reading the
        // documents' current source state, not by replaying consumed change
        // events. The deferred set is only rewritten once this cycle's
        // write step has run, so an aborted cycle loses nothing.
        let mut pending: Vec<(String, serde_json::Value)> = Vec::new();
        let feed_ids: HashSet<&str> = page.events.iter().map(|e| e.id.as_str()).collect();
        for native_id in source.deferred.read().iter() {
            if feed_ids.contains(native_id.as_str()) {
                continue;
            }
            if let Some(raw) = source.store.get(native_id)? {
                pending.push((native_id.clone(), raw));
            }
        }
        for event in &page.events {
            if event.deleted {
                report.deleted += 1;
                continue;
            }
            let Some(raw) = &event.doc else {
                report.skipped += 1;
                continue;
            };
            pending.push((event.id.clone(), raw.clone()));
        }

        let now = self.clock.now();
        let resolver = CrossReferenceResolver::new(source.store.as_ref());
        let mut batch: BTreeMap<String, RouterDocument> = BTreeMap::new();
        let mut origins: HashMap<String, String> = HashMap::new();
        for (native_id, raw) in pending {
            match source.adapter.transform(&raw, &resolver, &now) {
                Ok(TransformOutcome::Document(doc)) => {
                    origins.insert(doc.id.clone(), native_id);
                    batch.insert(doc.id.clone(), doc);
                }
                Ok(TransformOutcome::Skip) => report.skipped += 1,
                Err(e @ SyncError::MalformedDocument { .. }) => {
                    report.malformed += 1;
                    tracing::warn!(source = source_id, error = %e, "dropping malformed document");
                }
                Err(e) => return Err(e),
            }
        }

        self.set_phase(EnginePhase::Reconciling);
        RevisionReconciler.reconcile(self.target.as_ref(), &mut batch)?;

        self.set_phase(EnginePhase::Writing);
        let docs: Vec<RouterDocument> = batch.into_values().collect();
        let write_report = TargetWriter.write(self.target.as_ref(), &docs)?;
        report.accepted = write_report.accepted();
        report.conflicted = write_report.conflicted();
        report.failed = write_report.failed();

        let retry_next_cycle: BTreeSet<String> = write_report
            .conflicted_ids()
            .iter()
            .filter_map(|target_id| origins.get(*target_id).cloned())
            .collect();
        *source.deferred.write() = retry_next_cycle;

        // The cursor advances only after the batch has been attempted;
        // conflicted documents wait in the deferred set, not in the feed.
        self.set_phase(EnginePhase::Checkpointing);
        self.checkpoints.save(source_id, &page.next_seq)?;
        report.seq = page.next_seq;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::SourceKind;
    use crate::store::{MemoryCheckpointStore, MemorySourceStore, MemoryTargetStore};
    use serde_json::json;

    fn altermap_config() -> SyncConfig {
        SyncConfig::new("memory://target").with_source(SourceConfig::new(
            "am",
            "memory://am",
            SourceKind::AlterMap,
        ))
    }

    fn node(id: &str, name: &str) -> serde_json::Value {
        json!({
            "_id": id,
            "collection": "nodes",
            "name": name,
            "coords": {"lat": 1.0, "lon": 2.0}
        })
    }

    fn engine_over(
        source: Arc<MemorySourceStore>,
        target: Arc<MemoryTargetStore>,
        checkpoints: Arc<MemoryCheckpointStore>,
    ) -> SyncEngine {
        let mut engine = SyncEngine::new(altermap_config(), target, checkpoints)
            .with_clock(Arc::new(FixedClock::new("2024-01-01T00:00:00.000Z")));
        engine.bind_source("am", source).unwrap();
        engine
    }

    #[test]
    fn initial_phase_is_idle() {
        let engine = engine_over(
            Arc::new(MemorySourceStore::new()),
            Arc::new(MemoryTargetStore::new()),
            Arc::new(MemoryCheckpointStore::new()),
        );
        assert_eq!(engine.phase(), EnginePhase::Idle);
        assert!(!engine.phase().is_terminal());
        assert_eq!(engine.stats().cycles_completed, 0);
    }

    #[test]
    fn one_shot_run_ends_done() {
        let source = Arc::new(MemorySourceStore::new());
        source.insert("n1", node("n1", "router-a"));
        let target = Arc::new(MemoryTargetStore::new());
        let engine = engine_over(source, Arc::clone(&target), Arc::new(MemoryCheckpointStore::new()));

        engine.run(SyncMode::OneShot).unwrap();
        assert_eq!(engine.phase(), EnginePhase::Done);
        assert!(engine.phase().is_terminal());
        assert_eq!(target.len(), 1);
        assert_eq!(engine.stats().docs_accepted, 1);
    }

    #[test]
    fn unbound_source_is_a_config_error() {
        let engine = SyncEngine::new(
            altermap_config(),
            Arc::new(MemoryTargetStore::new()),
            Arc::new(MemoryCheckpointStore::new()),
        );
        let err = engine.run_once(SyncMode::OneShot).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn binding_an_unknown_source_fails() {
        let mut engine = SyncEngine::new(
            altermap_config(),
            Arc::new(MemoryTargetStore::new()),
            Arc::new(MemoryCheckpointStore::new()),
        );
        let err = engine
            .bind_source("nope", Arc::new(MemorySourceStore::new()))
            .unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn transient_fetch_is_fatal_in_one_shot() {
        let source = Arc::new(MemorySourceStore::new());
        source.set_failing(true);
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let engine = engine_over(source, Arc::new(MemoryTargetStore::new()), Arc::clone(&checkpoints));

        let err = engine.run(SyncMode::OneShot).unwrap_err();
        assert!(err.is_transient());
        // Nothing was checkpointed.
        assert_eq!(checkpoints.load("am").unwrap(), None);
    }

    #[test]
    fn continuous_mode_retries_transient_failures_then_gives_up() {
        use crate::config::RetryConfig;
        use std::time::Duration;

        let config = altermap_config()
            .with_retry(RetryConfig::new(2).with_initial_delay(Duration::ZERO));
        let source = Arc::new(MemorySourceStore::new());
        source.set_failing(true);
        let checkpoints = Arc::new(MemoryCheckpointStore::new());

        let mut engine = SyncEngine::new(
            config,
            Arc::new(MemoryTargetStore::new()),
            Arc::clone(&checkpoints) as Arc<dyn CheckpointStore>,
        )
        .with_clock(Arc::new(FixedClock::new("2024-01-01T00:00:00.000Z")));
        engine.bind_source("am", source).unwrap();

        // Attempt one backs off, attempt two exhausts the budget.
        let err = engine.run(SyncMode::Continuous).unwrap_err();
        assert!(err.is_transient());

        let stats = engine.stats();
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.cycles_completed, 0);
        assert!(stats
            .last_error
            .as_deref()
            .unwrap()
            .contains("injected failure"));
        // The cursor never moved.
        assert_eq!(checkpoints.load("am").unwrap(), None);
    }

    #[test]
    fn checkpoint_persist_failure_halts() {
        let source = Arc::new(MemorySourceStore::new());
        source.insert("n1", node("n1", "router-a"));
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        checkpoints.set_failing(true);
        let engine = engine_over(source, Arc::new(MemoryTargetStore::new()), checkpoints);

        let err = engine.run_once(SyncMode::OneShot).unwrap_err();
        assert!(matches!(err, SyncError::CheckpointPersist { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn checkpoint_advances_after_write() {
        let source = Arc::new(MemorySourceStore::new());
        source.insert("n1", node("n1", "router-a"));
        let last = source.insert("n2", node("n2", "router-b"));
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let engine = engine_over(source, Arc::new(MemoryTargetStore::new()), Arc::clone(&checkpoints));

        let reports = engine.run_once(SyncMode::OneShot).unwrap();
        assert_eq!(reports[0].seq, last);
        assert_eq!(checkpoints.load("am").unwrap(), Some(last));
    }

    #[test]
    fn deletions_are_counted_not_propagated() {
        let source = Arc::new(MemorySourceStore::new());
        let target = Arc::new(MemoryTargetStore::new());
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let engine = engine_over(Arc::clone(&source), Arc::clone(&target), checkpoints);

        source.insert("n1", node("n1", "router-a"));
        engine.run_once(SyncMode::OneShot).unwrap();
        assert_eq!(target.len(), 1);

        source.delete("n1");
        let reports = engine.run_once(SyncMode::OneShot).unwrap();
        assert_eq!(reports[0].deleted, 1);
        assert_eq!(reports[0].accepted, 0);
        // The target document remains.
        assert_eq!(target.len(), 1);
    }

    #[test]
    fn malformed_documents_do_not_abort_the_batch() {
        let source = Arc::new(MemorySourceStore::new());
        source.insert("bad", json!({"_id": "bad", "collection": "nodes"}));
        source.insert("n1", node("n1", "router-a"));
        let target = Arc::new(MemoryTargetStore::new());
        let engine = engine_over(source, Arc::clone(&target), Arc::new(MemoryCheckpointStore::new()));

        let reports = engine.run_once(SyncMode::OneShot).unwrap();
        assert_eq!(reports[0].malformed, 1);
        assert_eq!(reports[0].accepted, 1);
        assert!(target.get("n1").is_some());
    }
}
