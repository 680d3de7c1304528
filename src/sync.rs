//! Delta sync engine.
//!
//! One forward pass reconciling a full directory snapshot against the local
//! store: load the known identifiers, bind, fetch, process each entry in
//! fetch order (normalize, upsert, index), then delete everything known but
//! not re-affirmed, and finally persist run metadata.
//!
//! The pass is a single sequential async task: every store and directory
//! operation is a suspension point, and nothing runs in parallel. The index
//! maintainer's read-modify-write on shared token entries is only safe under
//! that discipline.
//!
//! Failure model: a failure during `LoadingKnown`, `Binding`, or `Fetching`
//! aborts with no writes. A failure during `Processing` or `Deleting` aborts
//! after whatever records were already durably written; those writes are not
//! rolled back, and run metadata keeps pointing at the last successful pass.
//! Re-running the pass is idempotent and closes the gap.

use std::collections::BTreeSet;

use anyhow::{Context, Result};

use crate::directory::{DirectorySource, PERSON_FILTER, SYNC_ATTRIBUTES};
use crate::index;
use crate::models::SyncRunMeta;
use crate::normalize;
use crate::report::{SyncEvent, SyncReporter};
use crate::store::{self, collections, KvStore};
use crate::tokenize;

/// Phases of a sync pass, in forward order. `Failed` is terminal and
/// reachable from `Binding`, `Fetching`, or any unexpected error later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    LoadingKnown,
    Binding,
    Fetching,
    Processing,
    Deleting,
    Finalized,
    Failed,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::LoadingKnown => "loading-known",
            SyncPhase::Binding => "binding",
            SyncPhase::Fetching => "fetching",
            SyncPhase::Processing => "processing",
            SyncPhase::Deleting => "deleting",
            SyncPhase::Finalized => "finalized",
            SyncPhase::Failed => "failed",
        }
    }
}

/// Why an entry was skipped without failing the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Entry had no resolvable distinguished name.
    MissingDn,
    /// An existing manual record occupies the entry's primary key.
    ManualCollision,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::MissingDn => "missing-dn",
            SkipReason::ManualCollision => "manual-collision",
        }
    }
}

/// Counts from one completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records written because their content changed (or they are new).
    pub upserts: u64,
    pub deletes: u64,
    pub ldap_count: u64,
    /// Records whose content matched the stored record and were not
    /// rewritten.
    pub unchanged: u64,
    pub skipped_missing_dn: u64,
    pub skipped_manual: u64,
    pub dry_run: bool,
}

/// The delta sync orchestrator.
///
/// Owns the phase state so callers and tests can observe where a pass ended
/// up; the reporter is injected and receives every phase boundary.
pub struct SyncEngine<'a> {
    store: &'a dyn KvStore,
    reporter: &'a dyn SyncReporter,
    phase: SyncPhase,
}

impl<'a> SyncEngine<'a> {
    pub fn new(store: &'a dyn KvStore, reporter: &'a dyn SyncReporter) -> Self {
        Self {
            store,
            reporter,
            phase: SyncPhase::Idle,
        }
    }

    /// The phase the last pass reached.
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Run one full pass. With `dry_run`, binds and fetches normally but
    /// performs no writes; the report carries the counts that would result.
    pub async fn run(
        &mut self,
        source: &mut dyn DirectorySource,
        base_dn: &str,
        page_size: usize,
        dry_run: bool,
    ) -> Result<SyncReport> {
        match self.run_pass(source, base_dn, page_size, dry_run).await {
            Ok(report) => Ok(report),
            Err(err) => {
                let failed_in = self.phase;
                self.phase = SyncPhase::Failed;
                self.reporter.report(&SyncEvent::Failed {
                    phase: failed_in,
                    message: format!("{err:#}"),
                });
                Err(err)
            }
        }
    }

    fn enter(&mut self, phase: SyncPhase) {
        self.phase = phase;
        self.reporter.report(&SyncEvent::PhaseStarted { phase });
    }

    async fn run_pass(
        &mut self,
        source: &mut dyn DirectorySource,
        base_dn: &str,
        page_size: usize,
        dry_run: bool,
    ) -> Result<SyncReport> {
        let mut report = SyncReport {
            dry_run,
            ..SyncReport::default()
        };

        // Without the known set we cannot safely compute deletions.
        self.enter(SyncPhase::LoadingKnown);
        let known: BTreeSet<String> = self
            .store
            .keys(collections::KNOWN)
            .await
            .context("failed to load known identifiers")?
            .into_iter()
            .collect();

        self.enter(SyncPhase::Binding);
        source.bind().await.context("directory bind failed")?;

        self.enter(SyncPhase::Fetching);
        let entries = source
            .search(base_dn, PERSON_FILTER, SYNC_ATTRIBUTES, page_size)
            .await
            .context("directory search failed")?;
        report.ldap_count = entries.len() as u64;

        self.enter(SyncPhase::Processing);
        let synced_at = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let total = entries.len() as u64;
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut last_milestone: u8 = 0;

        for (i, entry) in entries.iter().enumerate() {
            match normalize::normalize(entry, &synced_at) {
                None => {
                    report.skipped_missing_dn += 1;
                    self.reporter.report(&SyncEvent::EntrySkipped {
                        reason: SkipReason::MissingDn,
                        dn: None,
                    });
                }
                Some(record) => {
                    seen.insert(record.dn.clone());

                    // Manual records always win: discard the incoming
                    // update whole, no merge.
                    let existing = store::get_record(self.store, &record.dn).await?;
                    if existing.as_ref().is_some_and(|r| r.is_manual) {
                        report.skipped_manual += 1;
                        self.reporter.report(&SyncEvent::EntrySkipped {
                            reason: SkipReason::ManualCollision,
                            dn: Some(record.dn.clone()),
                        });
                    } else {
                        // A fresh synced_at alone is not a content change;
                        // skip the rewrite so a pass over an unchanged
                        // snapshot leaves every record byte-identical.
                        let unchanged = existing.as_ref().is_some_and(|prev| {
                            let mut prev = prev.clone();
                            prev.synced_at = record.synced_at.clone();
                            prev == record
                        });
                        if unchanged {
                            if !dry_run {
                                // Keep the tracking mark authoritative even
                                // if an earlier pass died before writing it.
                                self.store.put(collections::KNOWN, &record.dn, "1").await?;
                            }
                            report.unchanged += 1;
                        } else {
                            if !dry_run {
                                store::put_record(self.store, &record)
                                    .await
                                    .with_context(|| format!("upsert failed for {}", record.dn))?;
                                if let Some(guid) = &record.guid {
                                    self.store.put(collections::GUIDS, guid, &record.dn).await?;
                                }
                                self.store.put(collections::KNOWN, &record.dn, "1").await?;

                                let tokens = tokenize::record_tokens(&record);
                                index::update_record(self.store, &record.dn, &tokens)
                                    .await
                                    .with_context(|| {
                                        format!("index update failed for {}", record.dn)
                                    })?;
                            }
                            report.upserts += 1;
                        }
                    }
                }
            }

            let processed = (i + 1) as u64;
            let milestone = ((processed * 100) / total.max(1)) as u8 / 10 * 10;
            if milestone > last_milestone {
                last_milestone = milestone;
                self.reporter.report(&SyncEvent::Progress {
                    processed,
                    total,
                    percent: milestone,
                });
            }
        }

        // Deletions: known before the pass minus re-affirmed during it.
        // Manual records never enter the known collection, but re-check the
        // flag anyway before destroying anything.
        self.enter(SyncPhase::Deleting);
        for dn in known.difference(&seen) {
            let existing = store::get_record(self.store, dn).await?;
            if existing.as_ref().is_some_and(|r| r.is_manual) {
                continue;
            }

            if !dry_run {
                if let Some(guid) = existing.as_ref().and_then(|r| r.guid.as_deref()) {
                    self.store.remove(collections::GUIDS, guid).await?;
                }
                self.store.remove(collections::RECORDS, dn).await?;
                index::remove_record(self.store, dn)
                    .await
                    .with_context(|| format!("index removal failed for {dn}"))?;
                self.store.remove(collections::KNOWN, dn).await?;
            }
            report.deletes += 1;
        }

        self.enter(SyncPhase::Finalized);
        if !dry_run {
            let meta = SyncRunMeta {
                at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                base_dn: base_dn.to_string(),
                upserts: report.upserts,
                deletes: report.deletes,
                ldap_count: report.ldap_count,
            };
            store::put_run_meta(self.store, &meta).await?;
        }

        self.reporter.report(&SyncEvent::Finished {
            upserts: report.upserts,
            deletes: report.deletes,
            ldap_count: report.ldap_count,
        });

        Ok(report)
    }
}

/// CLI entry point: run one pass against the configured snapshot source,
/// with progress on stderr and an optional per-run log file.
pub async fn run_sync(config: &crate::config::Config, dry_run: bool) -> Result<()> {
    use crate::report::{JsonReporter, MultiReporter, RunLog, StderrReporter};
    use crate::store::SqliteKv;

    let kv = SqliteKv::new(crate::db::connect(config).await?);
    let mut source = crate::directory::TimeoutSource::new(
        crate::directory::SnapshotFile::new(config.directory.snapshot.clone()),
        std::time::Duration::from_secs(config.directory.bind_timeout_secs),
        std::time::Duration::from_secs(config.directory.operation_timeout_secs),
    );

    let stderr_reporter: Box<dyn SyncReporter> = if atty::is(atty::Stream::Stderr) {
        Box::new(StderrReporter)
    } else {
        Box::new(JsonReporter)
    };
    let run_log = match &config.sync.log_dir {
        Some(dir) => Some(RunLog::create(dir)?),
        None => None,
    };

    let result = {
        let mut sinks: Vec<&dyn SyncReporter> = vec![stderr_reporter.as_ref()];
        if let Some(log) = &run_log {
            sinks.push(log);
        }
        let reporter = MultiReporter::new(sinks);
        let mut engine = SyncEngine::new(&kv, &reporter);
        engine
            .run(
                &mut source,
                &config.directory.base_dn,
                config.directory.page_size,
                dry_run,
            )
            .await
    };

    kv.close().await;
    // Close the sink on success and failure alike; never mask a pass error.
    if let Some(log) = run_log {
        if let Err(err) = log.close() {
            eprintln!("warning: {err:#}");
        }
    }
    let report = result?;

    if report.dry_run {
        println!("sync (dry-run)");
    } else {
        println!("sync");
    }
    println!("  fetched: {} entries", report.ldap_count);
    println!("  upserts: {}", report.upserts);
    println!("  deletes: {}", report.deletes);
    if report.unchanged > 0 {
        println!("  unchanged: {}", report.unchanged);
    }
    if report.skipped_missing_dn > 0 {
        println!("  skipped (no dn): {}", report.skipped_missing_dn);
    }
    if report.skipped_manual > 0 {
        println!("  skipped (manual collision): {}", report.skipped_manual);
    }
    println!("ok");

    Ok(())
}
