//! Enrichment pipeline coordinator.
//!
//! Sequences normalize, classify, dedup and extract over a raw record
//! stream. Normalize, classify and dedup run inline in input order.
//! Extraction runs on a bounded pool; each batch is drained, reassembled in
//! input order and appended to the record log before the next batch starts.
//!
//! Per-posting failures become counters and failure-log entries. Only
//! classifier unavailability and storage failures end a run, and they come
//! back as [`RunAborted`] carrying everything done so far.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{EnrichmentError, ExtractError, RecordError, RunAborted};
use crate::pipeline::classify::Classifier;
use crate::pipeline::dedup::DedupIndex;
use crate::pipeline::extract::{Extraction, Orchestrator};
use crate::pipeline::normalize::Normalizer;
use crate::traits::store::{IndexEntry, RecordLog};
use crate::types::config::PipelineConfig;
use crate::types::posting::{Posting, PostingStatus};
use crate::types::raw::RawPosting;
use crate::types::result::{EnrichmentResult, FailureKind, ItemFailure};

type TaskOutput = (usize, Result<Extraction, ExtractError>);

/// The enrichment pipeline.
///
/// Holds shared handles only; one `Pipeline` can serve many runs.
#[derive(Clone)]
pub struct Pipeline {
    normalizer: Normalizer,
    classifier: Classifier,
    orchestrator: Option<Orchestrator>,
    config: PipelineConfig,
}

impl Pipeline {
    /// A pipeline without an extraction stage.
    pub fn new(normalizer: Normalizer, classifier: Classifier, config: PipelineConfig) -> Self {
        Self {
            normalizer,
            classifier,
            orchestrator: None,
            config,
        }
    }

    pub fn with_orchestrator(mut self, orchestrator: Orchestrator) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Whether unique postings are sent to the extraction backend.
    pub fn extraction_enabled(&self) -> bool {
        self.config.extract && self.orchestrator.is_some()
    }

    /// Run over well-formed raw records.
    pub async fn run<I>(
        &self,
        input: I,
        index: &mut DedupIndex,
        log: &mut dyn RecordLog,
    ) -> Result<EnrichmentResult, RunAborted>
    where
        I: IntoIterator<Item = RawPosting>,
    {
        self.run_records(input.into_iter().map(Ok), index, log).await
    }

    /// Run over records that may already have failed to decode upstream.
    ///
    /// `Err` items are counted as malformed like records the normalizer
    /// rejects.
    pub async fn run_records<I>(
        &self,
        input: I,
        index: &mut DedupIndex,
        log: &mut dyn RecordLog,
    ) -> Result<EnrichmentResult, RunAborted>
    where
        I: IntoIterator<Item = Result<RawPosting, RecordError>>,
    {
        let mut run = Run::new(self, index, log);
        info!(
            run_id = %run.result.run_id,
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            extraction = self.extraction_enabled(),
            backend = self.orchestrator.as_ref().map(|o| o.backend_name()),
            desired_language = self.config.desired_language.as_deref(),
            "Starting enrichment run"
        );

        let mut input = input.into_iter().enumerate();
        loop {
            let exhausted = match run.fill_batch(&mut input) {
                Ok(exhausted) => exhausted,
                Err(cause) => return Err(run.abort(cause).await),
            };
            if let Err(cause) = run.finish_batch().await {
                return Err(run.abort(cause).await);
            }
            if exhausted {
                break;
            }
        }

        if let Err(cause) = run.index.flush() {
            return Err(run.abort(cause).await);
        }

        let result = run.result.finish(true);
        let counts = &result.counts;
        info!(
            run_id = %result.run_id,
            seen = counts.seen,
            dropped_malformed = counts.dropped_malformed,
            limit_skipped = counts.limit_skipped,
            duplicates = counts.duplicates,
            unique = counts.unique,
            low_confidence = counts.low_confidence,
            language_skipped = counts.language_skipped,
            extracted = counts.extracted,
            extraction_failed = counts.extraction_failed,
            tokens_used = counts.tokens_used,
            "Enrichment run complete"
        );
        Ok(result)
    }
}

/// A unique posting waiting in the current batch.
struct Slot {
    /// Position of the raw record in the input.
    index: usize,
    posting: Posting,
    dispatched: bool,
}

/// Mutable state of one run.
struct Run<'a> {
    pipeline: &'a Pipeline,
    index: &'a mut DedupIndex,
    log: &'a mut dyn RecordLog,
    result: EnrichmentResult,
    accepted: usize,
    per_position: HashMap<String, usize>,
    batch: Vec<Slot>,
    batches_written: usize,
    tasks: JoinSet<TaskOutput>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl<'a> Run<'a> {
    fn new(pipeline: &'a Pipeline, index: &'a mut DedupIndex, log: &'a mut dyn RecordLog) -> Self {
        Self {
            pipeline,
            index,
            log,
            result: EnrichmentResult::start(),
            accepted: 0,
            per_position: HashMap::new(),
            batch: Vec::new(),
            batches_written: 0,
            tasks: JoinSet::new(),
            semaphore: Arc::new(Semaphore::new(pipeline.config.concurrency.max(1))),
            cancel: CancellationToken::new(),
        }
    }

    /// Pull records until the batch is full. Returns true once the input is
    /// exhausted or the posting limit is reached.
    fn fill_batch<I>(&mut self, input: &mut I) -> Result<bool, EnrichmentError>
    where
        I: Iterator<Item = (usize, Result<RawPosting, RecordError>)>,
    {
        let batch_size = self.pipeline.config.batch_size.max(1);
        while self.batch.len() < batch_size {
            if let Some(max) = self.pipeline.config.max_postings {
                if self.accepted >= max {
                    info!(max_postings = max, "Posting limit reached, not reading further");
                    return Ok(true);
                }
            }

            let Some((index, item)) = input.next() else {
                return Ok(true);
            };
            self.result.counts.seen += 1;
            self.admit(index, item)?;
        }
        Ok(false)
    }

    /// Take one record through normalize, classify and dedup, and dispatch
    /// it for extraction when eligible.
    fn admit(
        &mut self,
        index: usize,
        item: Result<RawPosting, RecordError>,
    ) -> Result<(), EnrichmentError> {
        let pipeline = self.pipeline;
        let raw = match item {
            Ok(raw) => raw,
            Err(e) => {
                self.drop_malformed(index, format!("record #{}", index), e);
                return Ok(());
            }
        };

        let mut posting = match pipeline.normalizer.normalize(&raw) {
            Ok(posting) => posting,
            Err(e) => {
                self.drop_malformed(index, raw_identity(&raw, index), e);
                return Ok(());
            }
        };
        self.accepted += 1;

        if !self.within_position_limit(&posting) {
            self.result.counts.limit_skipped += 1;
            debug!(
                identity = %posting.identity(),
                position = posting.position.as_deref(),
                "Position limit reached, skipping posting"
            );
            return Ok(());
        }

        let tag = pipeline.classifier.classify(posting.classification_text())?;
        if !tag.is_known() {
            self.result.counts.low_confidence += 1;
        }
        posting.title_language = Some(if posting.description.trim().is_empty() {
            tag.clone()
        } else {
            pipeline.classifier.classify(&posting.title)?
        });
        posting.set_language(tag);

        if self.index.is_duplicate(&posting.fingerprint) {
            posting.advance(PostingStatus::DedupedDuplicate);
            self.result.counts.duplicates += 1;
            debug!(
                fingerprint = %posting.fingerprint,
                identity = %posting.identity(),
                first_seen = ?self.index.get(&posting.fingerprint).map(|e| e.first_seen),
                "Duplicate posting"
            );
            return Ok(());
        }

        match self.index.record(IndexEntry::for_posting(&posting)) {
            Ok(()) => {}
            Err(EnrichmentError::AlreadyRecorded { fingerprint }) => {
                error!(fingerprint = %fingerprint, "Fingerprint recorded twice in one run");
                self.result.counts.duplicates += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        posting.advance(PostingStatus::DedupedUnique);
        self.result.counts.unique += 1;

        let slot = self.batch.len();
        let mut dispatched = false;

        if pipeline.extraction_enabled() {
            let wanted = pipeline.config.desired_language.as_deref();
            let matches = |lang: &str| {
                posting
                    .language
                    .as_ref()
                    .map_or(false, |tag| tag.matches(lang))
            };

            match wanted {
                Some(lang) if !matches(lang) => {
                    posting.advance(PostingStatus::LanguageSkipped);
                    self.result.counts.language_skipped += 1;
                    debug!(
                        fingerprint = %posting.fingerprint,
                        language = posting.language.as_ref().map(|t| t.code.as_str()),
                        desired = lang,
                        "Language not selected for extraction"
                    );
                }
                _ => {
                    self.dispatch(slot, &posting);
                    dispatched = true;
                }
            }
        }

        debug!(
            fingerprint = %posting.fingerprint,
            identity = %posting.identity(),
            status = %posting.status,
            dispatched,
            "Unique posting recorded"
        );
        self.batch.push(Slot {
            index,
            posting,
            dispatched,
        });
        Ok(())
    }

    fn within_position_limit(&mut self, posting: &Posting) -> bool {
        let (Some(max), Some(position)) = (
            self.pipeline.config.max_per_position,
            posting.position.as_deref(),
        ) else {
            return true;
        };

        let count = self
            .per_position
            .entry(position.trim().to_lowercase())
            .or_insert(0);
        if *count >= max {
            return false;
        }
        *count += 1;
        true
    }

    fn drop_malformed(&mut self, index: usize, identity: String, error: RecordError) {
        warn!(index, identity = %identity, error = %error, "Dropping malformed record");
        self.result.counts.dropped_malformed += 1;
        self.result.failures.push(ItemFailure {
            index,
            identity,
            kind: FailureKind::MalformedRecord,
            reason: error.to_string(),
        });
    }

    fn dispatch(&mut self, slot: usize, posting: &Posting) {
        let Some(orchestrator) = self.pipeline.orchestrator.clone() else {
            return;
        };
        let semaphore = self.semaphore.clone();
        let cancel = self.cancel.clone();
        let posting = posting.clone();

        self.tasks.spawn(async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(ExtractError::Cancelled),
                outcome = extract_with_permit(&orchestrator, semaphore, &posting) => outcome,
            };
            (slot, outcome)
        });
    }

    /// Wait for every extraction of the batch, then append the batch to the
    /// record log in input order.
    async fn finish_batch(&mut self) -> Result<(), EnrichmentError> {
        self.drain_tasks().await;

        if self.batch.is_empty() {
            return Ok(());
        }

        let postings: Vec<Posting> = self.batch.drain(..).map(|slot| slot.posting).collect();
        let appended = self.log.append(&postings);
        let count = postings.len();
        self.result.postings.extend(postings);
        appended?;

        self.batches_written += 1;
        info!(
            batch = self.batches_written,
            postings = count,
            extracted = self.result.counts.extracted,
            extraction_failed = self.result.counts.extraction_failed,
            "Batch persisted"
        );
        Ok(())
    }

    async fn drain_tasks(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((slot, outcome)) => self.complete(slot, outcome),
                Err(e) => error!(error = %e, "Extraction task did not complete"),
            }
        }

        // A task that panicked never reported its slot.
        for slot in 0..self.batch.len() {
            if self.batch[slot].dispatched && !self.batch[slot].posting.status.is_terminal() {
                self.complete(
                    slot,
                    Err(ExtractError::Unavailable {
                        attempts: 0,
                        reason: "extraction task aborted".into(),
                    }),
                );
            }
        }

        // Completions arrive in any order; the failure log follows the input.
        self.result.failures.sort_by_key(|failure| failure.index);
    }

    fn complete(&mut self, slot: usize, outcome: Result<Extraction, ExtractError>) {
        let Some(entry) = self.batch.get_mut(slot) else {
            return;
        };

        match outcome {
            Ok(extraction) => {
                debug!(
                    fingerprint = %entry.posting.fingerprint,
                    calls = extraction.calls,
                    tokens = extraction.tokens_used,
                    "Posting extracted"
                );
                self.result.counts.extracted += 1;
                self.result.counts.tokens_used += extraction.tokens_used;
                entry
                    .posting
                    .mark_extracted(extraction.attributes, extraction.tokens_used);
            }
            Err(e) => {
                let kind = match e {
                    ExtractError::Unparseable { .. } => FailureKind::ExtractionUnparseable,
                    ExtractError::Unavailable { .. } => FailureKind::ExtractionUnavailable,
                    ExtractError::Cancelled => FailureKind::Cancelled,
                };
                warn!(
                    fingerprint = %entry.posting.fingerprint,
                    identity = %entry.posting.identity(),
                    error = %e,
                    "Extraction failed"
                );
                self.result.counts.extraction_failed += 1;
                self.result.failures.push(ItemFailure {
                    index: entry.index,
                    identity: entry.posting.identity().to_string(),
                    kind,
                    reason: e.to_string(),
                });
                entry.posting.mark_failed(e.to_string());
            }
        }
    }

    /// Cancel in-flight work, keep what was recorded, and package the
    /// partial result.
    async fn abort(mut self, cause: EnrichmentError) -> RunAborted {
        error!(
            run_id = %self.result.run_id,
            error = %cause,
            "Run-fatal error, cancelling in-flight extractions"
        );
        self.cancel.cancel();
        self.drain_tasks().await;

        if !self.batch.is_empty() {
            let postings: Vec<Posting> = self.batch.drain(..).map(|slot| slot.posting).collect();
            if let Err(e) = self.log.append(&postings) {
                error!(error = %e, "Could not persist the interrupted batch");
            }
            self.result.postings.extend(postings);
        }

        if let Err(e) = self.index.flush() {
            error!(error = %e, "Could not flush the dedup index");
        }

        RunAborted {
            cause,
            partial: Box::new(self.result.finish(false)),
        }
    }
}

async fn extract_with_permit(
    orchestrator: &Orchestrator,
    semaphore: Arc<Semaphore>,
    posting: &Posting,
) -> Result<Extraction, ExtractError> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|_| ExtractError::Cancelled)?;
    orchestrator.extract(posting).await
}

/// Best identity available on a record that failed normalization.
fn raw_identity(raw: &RawPosting, index: usize) -> String {
    [&raw.source_id, &raw.url, &raw.title]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("record #{}", index))
}
