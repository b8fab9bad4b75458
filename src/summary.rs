//! AI page summaries, invalidated by content hash.
//!
//! A summary is valid for a page while its stored `content_hash` matches
//! the page's current title/body/tags digest. Generation is skipped when
//! the stored summary is still valid, so update flows can request a
//! summary unconditionally. A failed model call degrades to the prior
//! summary when one exists rather than erroring.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::config::IndexingConfig;
use crate::error::{Error, Result};
use crate::index::content_hash;
use crate::jobs::JobQueue;
use crate::models::{SourceType, SummaryRecord};
use crate::provider::{GenerationClient, PromptMessage, PromptRole};
use crate::store::Store;

/// Page body beyond this is not sent to the model.
const MAX_PROMPT_BODY_CHARS: usize = 8_000;

const SUMMARY_SYSTEM_PROMPT: &str = "You summarize workspace pages. Write a concise 2-3 sentence \
summary of the page capturing its purpose and key points. Respond with the summary only.";

/// Per-workspace summary counts, for surfacing coverage in the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryCoverage {
    pub total_pages: usize,
    pub summarized: usize,
}

impl SummaryCoverage {
    pub fn percent(&self) -> f32 {
        if self.total_pages == 0 {
            return 0.0;
        }
        self.summarized as f32 / self.total_pages as f32 * 100.0
    }
}

#[derive(Clone)]
pub struct SummaryService {
    store: Arc<dyn Store>,
    generator: Arc<dyn GenerationClient>,
    jobs: Arc<JobQueue>,
    batching: IndexingConfig,
}

impl SummaryService {
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<dyn GenerationClient>,
        jobs: Arc<JobQueue>,
        batching: IndexingConfig,
    ) -> Self {
        Self {
            store,
            generator,
            jobs,
            batching,
        }
    }

    /// Generate (or refresh) the summary for one page.
    ///
    /// With `force` off, a stored summary whose hash matches the page's
    /// current content is returned without a model call. A model failure
    /// falls back to the prior summary when one exists.
    pub async fn generate_summary(&self, page_id: &str, force: bool) -> Result<SummaryRecord> {
        let unit = self
            .store
            .get_unit(page_id)
            .await
            .map_err(Error::Persistence)?
            .ok_or_else(|| Error::not_found("page", page_id))?;
        if unit.source_type != SourceType::Page {
            return Err(Error::Validation(format!(
                "summaries are generated for pages only, got {}",
                unit.source_type.label()
            )));
        }

        let hash = content_hash(&unit.title, &unit.body, &unit.tags);
        let prior = self
            .store
            .get_summary(page_id)
            .await
            .map_err(Error::Persistence)?;
        if !force {
            if let Some(existing) = &prior {
                if existing.content_hash == hash {
                    debug!(page_id, "summary up to date, skipping model call");
                    return Ok(existing.clone());
                }
            }
        }

        let body: String = unit.body.chars().take(MAX_PROMPT_BODY_CHARS).collect();
        let prompt = [
            PromptMessage::new(PromptRole::System, SUMMARY_SYSTEM_PROMPT),
            PromptMessage::new(
                PromptRole::User,
                format!("Title: {}\n\n{}", unit.title, body),
            ),
        ];

        let text = match self.generator.generate(&prompt).await {
            Ok(t) => t.trim().to_string(),
            Err(e) => {
                // Keep serving the stale summary rather than failing the
                // caller; it is still roughly right.
                if let Some(existing) = prior {
                    warn!(page_id, error = %e, "summary generation failed, keeping prior");
                    return Ok(existing);
                }
                return Err(Error::ExternalService(e));
            }
        };

        let record = SummaryRecord {
            page_id: page_id.to_string(),
            text,
            content_hash: hash,
            generated_at: Utc::now(),
        };
        self.store
            .upsert_summary(&record)
            .await
            .map_err(Error::Persistence)?;
        Ok(record)
    }

    /// Queue a summary refresh for every page in the workspace and return
    /// the number of pages scheduled. Pages run in fixed-size batches:
    /// concurrent within a batch, a pause between batches, same pacing as
    /// the embedding indexer. Individual failures are logged by the jobs
    /// themselves.
    pub async fn regenerate_workspace(&self, workspace_id: &str, force: bool) -> Result<usize> {
        let pages = self
            .store
            .list_pages(workspace_id)
            .await
            .map_err(Error::Persistence)?;

        let batch_size = self.batching.batch_size.max(1);
        let delay = Duration::from_millis(self.batching.batch_delay_ms);
        let mut scheduled = 0;
        for (i, batch) in pages.chunks(batch_size).enumerate() {
            let service = self.clone();
            let ids: Vec<String> = batch.iter().map(|p| p.id.clone()).collect();
            let count = ids.len();
            let pause = if i == 0 { Duration::ZERO } else { delay };
            let queued = self.jobs.enqueue(async move {
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
                let service = &service;
                join_all(ids.iter().map(|id| service.refresh_logged(id, force))).await;
            });
            if queued {
                scheduled += count;
            }
        }
        Ok(scheduled)
    }

    async fn refresh_logged(&self, page_id: &str, force: bool) {
        if let Err(e) = self.generate_summary(page_id, force).await {
            warn!(page_id, error = %e, "background summary job failed");
        }
    }

    /// Remove a page's summary; idempotent.
    pub async fn delete_summary(&self, page_id: &str) -> Result<()> {
        self.store
            .delete_summary(page_id)
            .await
            .map_err(Error::Persistence)
    }

    /// How many of the workspace's pages currently have a summary.
    pub async fn coverage(&self, workspace_id: &str) -> Result<SummaryCoverage> {
        let pages = self
            .store
            .list_pages(workspace_id)
            .await
            .map_err(Error::Persistence)?;
        let summaries = self
            .store
            .list_summaries(workspace_id)
            .await
            .map_err(Error::Persistence)?;
        Ok(SummaryCoverage {
            total_pages: pages.len(),
            summarized: summaries.len(),
        })
    }
}
