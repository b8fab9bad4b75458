//! Heuristic inline-link suggestions for the editor.
//!
//! Scores candidate target pages against the text being edited. The
//! enhanced path works over pages that already have an AI summary and
//! sums an ordered list of independently-capped scoring rules; the basic
//! string-matching path covers workspaces where no summaries exist yet,
//! or where the enhanced path errored.
//!
//! Suggestions are transient: nothing here is persisted.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::config::SuggestConfig;
use crate::models::LinkSuggestion;
use crate::store::Store;

/// Fixed bonus when the full title appears verbatim in the context.
const TITLE_MATCH_BONUS: f32 = 0.5;
/// Scale for the fraction of long title words present in the context.
const TITLE_WORD_SCALE: f32 = 0.3;
/// Scale for the fraction of leading summary words present in the context.
const SUMMARY_WORD_SCALE: f32 = 0.25;
/// Per shared 2-3 word phrase, capped.
const PHRASE_BONUS: f32 = 0.05;
const PHRASE_BONUS_CAP: f32 = 0.15;
/// Relevance-to-confidence boost, clamped to 1.0.
const CONFIDENCE_BOOST: f32 = 1.4;

/// Leading summary words considered significant for rule 3.
const SUMMARY_WORD_WINDOW: usize = 30;
/// Words shorter than this carry no signal.
const MIN_WORD_LEN: usize = 4;

/// Basic-path confidences.
const BASIC_TITLE_CONFIDENCE: f32 = 0.8;
const BASIC_WORD_CONFIDENCE: f32 = 0.4;
const BASIC_TERM_CONFIDENCE: f32 = 0.5;
const BASIC_TRIGGER_CONFIDENCE: f32 = 0.3;
const BASIC_MAX_SUGGESTIONS: usize = 10;

/// Context words that make every page a weak candidate.
const TRIGGER_WORDS: [&str; 3] = ["link", "relevant", "page"];
/// Small domain vocabulary whose co-occurrence in context and title
/// suggests a link.
const BUSINESS_TERMS: [&str; 7] = [
    "sales",
    "marketing",
    "revenue",
    "strategy",
    "planning",
    "budget",
    "report",
];

pub struct LinkSuggestionScorer {
    store: Arc<dyn Store>,
    config: SuggestConfig,
}

impl LinkSuggestionScorer {
    pub fn new(store: Arc<dyn Store>, config: SuggestConfig) -> Self {
        Self { store, config }
    }

    /// Rank candidate link targets for `context_text`.
    ///
    /// `current_page_id` excludes the page being edited. Degrades to an
    /// empty list rather than failing.
    pub async fn suggest(
        &self,
        workspace_id: &str,
        current_page_id: Option<&str>,
        context_text: &str,
    ) -> Vec<LinkSuggestion> {
        if context_text.trim().is_empty() {
            return Vec::new();
        }

        match self.enhanced(workspace_id, current_page_id, context_text).await {
            Ok(Some(suggestions)) => suggestions,
            Ok(None) => {
                // No page has a summary yet.
                self.basic(workspace_id, current_page_id, context_text).await
            }
            Err(e) => {
                warn!(error = %e, "enhanced link scoring failed, using basic matching");
                self.basic(workspace_id, current_page_id, context_text).await
            }
        }
    }

    /// Summary-aware scoring. `Ok(None)` when no summaries exist.
    async fn enhanced(
        &self,
        workspace_id: &str,
        current_page_id: Option<&str>,
        context_text: &str,
    ) -> anyhow::Result<Option<Vec<LinkSuggestion>>> {
        let summaries = self.store.list_summaries(workspace_id).await?;
        if summaries.is_empty() {
            return Ok(None);
        }

        let mut scored: Vec<(f32, LinkSuggestion)> = Vec::new();
        for summary in &summaries {
            if current_page_id == Some(summary.page_id.as_str()) {
                continue;
            }
            let Some(page) = self.store.get_unit(&summary.page_id).await? else {
                continue;
            };

            let (relevance, span) = score_candidate(context_text, &page.title, &summary.text);
            let confidence = (relevance * CONFIDENCE_BOOST).min(1.0);
            if confidence <= self.config.confidence_cutoff {
                continue;
            }

            let (matched_text, start, end) = match span {
                Some((start, end)) => (context_text[start..end].to_string(), start, end),
                None => (page.title.clone(), 0, 0),
            };
            scored.push((
                relevance,
                LinkSuggestion {
                    target_page_id: page.id.clone(),
                    target_title: page.title.clone(),
                    matched_text,
                    start_index: start,
                    end_index: end,
                    confidence,
                },
            ));
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let mut suggestions: Vec<LinkSuggestion> =
            scored.into_iter().map(|(_, s)| s).collect();
        suggestions.truncate(self.config.max_suggestions);
        Ok(Some(suggestions))
    }

    /// Plain string matching over every workspace page.
    async fn basic(
        &self,
        workspace_id: &str,
        current_page_id: Option<&str>,
        context_text: &str,
    ) -> Vec<LinkSuggestion> {
        let pages = match self.store.list_pages(workspace_id).await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "page listing failed, no link suggestions");
                return Vec::new();
            }
        };

        let context_lower = context_text.to_lowercase();
        let has_trigger = TRIGGER_WORDS.iter().any(|w| context_lower.contains(w));
        let mut suggestions: Vec<LinkSuggestion> = Vec::new();

        for page in &pages {
            if current_page_id == Some(page.id.as_str()) {
                continue;
            }

            if let Some((start, end)) = find_case_insensitive(context_text, &page.title) {
                suggestions.push(LinkSuggestion {
                    target_page_id: page.id.clone(),
                    target_title: page.title.clone(),
                    matched_text: context_text[start..end].to_string(),
                    start_index: start,
                    end_index: end,
                    confidence: BASIC_TITLE_CONFIDENCE,
                });
            }

            for word in significant_words(&page.title) {
                if let Some((start, end)) = find_case_insensitive(context_text, word) {
                    suggestions.push(LinkSuggestion {
                        target_page_id: page.id.clone(),
                        target_title: page.title.clone(),
                        matched_text: context_text[start..end].to_string(),
                        start_index: start,
                        end_index: end,
                        confidence: BASIC_WORD_CONFIDENCE,
                    });
                }
            }

            let title_lower = page.title.to_lowercase();
            for term in BUSINESS_TERMS {
                if context_lower.contains(term) && title_lower.contains(term) {
                    let (start, end) =
                        find_case_insensitive(context_text, term).unwrap_or((0, 0));
                    suggestions.push(LinkSuggestion {
                        target_page_id: page.id.clone(),
                        target_title: page.title.clone(),
                        matched_text: context_text[start..end].to_string(),
                        start_index: start,
                        end_index: end,
                        confidence: BASIC_TERM_CONFIDENCE,
                    });
                }
            }

            if has_trigger {
                suggestions.push(LinkSuggestion {
                    target_page_id: page.id.clone(),
                    target_title: page.title.clone(),
                    matched_text: page.title.clone(),
                    start_index: 0,
                    end_index: 0,
                    confidence: BASIC_TRIGGER_CONFIDENCE,
                });
            }
        }

        dedup_keep_best(&mut suggestions);
        suggestions.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        suggestions.truncate(BASIC_MAX_SUGGESTIONS);
        suggestions
    }
}

/// Sum the enhanced scoring rules for one candidate page. Returns the
/// relevance and, if any literal match was found, its span in the context.
fn score_candidate(context: &str, title: &str, summary: &str) -> (f32, Option<(usize, usize)>) {
    let context_words = word_set(context);
    let mut relevance = 0.0f32;
    let mut span = None;

    // Rule 1: full title appears verbatim.
    if let Some(found) = find_case_insensitive(context, title) {
        relevance += TITLE_MATCH_BONUS;
        span = Some(found);
    }

    // Rule 2: coverage of the title's long words.
    let title_words: Vec<&str> = significant_words(title).collect();
    if !title_words.is_empty() {
        let present = title_words
            .iter()
            .filter(|w| context_words.contains(&w.to_lowercase()))
            .count();
        relevance += (present as f32 / title_words.len() as f32) * TITLE_WORD_SCALE;
        if span.is_none() {
            span = title_words
                .iter()
                .find_map(|w| find_case_insensitive(context, w));
        }
    }

    // Rule 3: coverage of the summary's leading significant words.
    let summary_words: Vec<&str> = significant_words(summary)
        .take(SUMMARY_WORD_WINDOW)
        .collect();
    if !summary_words.is_empty() {
        let present = summary_words
            .iter()
            .filter(|w| context_words.contains(&w.to_lowercase()))
            .count();
        relevance += (present as f32 / summary_words.len() as f32) * SUMMARY_WORD_SCALE;
    }

    // Rule 4: shared 2-3 word phrases, small bonus each, capped.
    let candidate_text = format!("{} {}", title, summary);
    let context_lower = context.to_lowercase();
    let mut phrase_bonus = 0.0f32;
    for phrase in phrases(&candidate_text) {
        if context_lower.contains(&phrase) {
            phrase_bonus += PHRASE_BONUS;
            if phrase_bonus >= PHRASE_BONUS_CAP {
                break;
            }
        }
    }
    relevance += phrase_bonus.min(PHRASE_BONUS_CAP);

    (relevance.min(1.0), span)
}

/// Byte span of the first ASCII-case-insensitive occurrence of `needle`.
fn find_case_insensitive(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    h.windows(n.len())
        .position(|w| w.eq_ignore_ascii_case(n))
        .map(|start| (start, start + n.len()))
}

/// Words of length > 3 with punctuation stripped.
fn significant_words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= MIN_WORD_LEN)
}

/// Lowercased word set of a text.
fn word_set(text: &str) -> std::collections::HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Lowercased 2- and 3-word shingles.
fn phrases(text: &str) -> Vec<String> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= MIN_WORD_LEN)
        .map(|w| w.to_lowercase())
        .collect();
    let mut out = Vec::new();
    for window in words.windows(2) {
        out.push(window.join(" "));
    }
    for window in words.windows(3) {
        out.push(window.join(" "));
    }
    out
}

/// Remove duplicate `(page_id, matched_text)` pairs, keeping the highest
/// confidence.
fn dedup_keep_best(suggestions: &mut Vec<LinkSuggestion>) {
    let mut best: HashMap<(String, String), f32> = HashMap::new();
    for s in suggestions.iter() {
        let key = (s.target_page_id.clone(), s.matched_text.clone());
        let entry = best.entry(key).or_insert(f32::MIN);
        if s.confidence > *entry {
            *entry = s.confidence;
        }
    }
    let mut seen: HashMap<(String, String), bool> = HashMap::new();
    suggestions.retain(|s| {
        let key = (s.target_page_id.clone(), s.matched_text.clone());
        if best.get(&key) != Some(&s.confidence) {
            return false;
        }
        // Keep only the first instance at the best confidence.
        !std::mem::replace(seen.entry(key).or_insert(false), true)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentUnit, OwnerScope, SourceType, SummaryRecord};
    use crate::store::memory::InMemoryStore;
    use chrono::Utc;

    fn page(id: &str, title: &str, body: &str) -> ContentUnit {
        ContentUnit {
            id: id.to_string(),
            title: title.to_string(),
            source_type: SourceType::Page,
            scope: OwnerScope::Workspace("ws".to_string()),
            body: body.to_string(),
            tags: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    fn summary(page_id: &str, text: &str) -> SummaryRecord {
        SummaryRecord {
            page_id: page_id.to_string(),
            text: text.to_string(),
            content_hash: "h".to_string(),
            generated_at: Utc::now(),
        }
    }

    async fn scorer_with_pages(pages: &[ContentUnit]) -> LinkSuggestionScorer {
        let store = Arc::new(InMemoryStore::new());
        for p in pages {
            store.upsert_unit(p).await.unwrap();
        }
        LinkSuggestionScorer::new(store, SuggestConfig::default())
    }

    #[test]
    fn exact_title_match_scores_high() {
        let (relevance, span) = score_candidate(
            "see the Marketing Plan for details",
            "Marketing Plan",
            "Quarterly marketing activities and budget.",
        );
        assert!(relevance >= TITLE_MATCH_BONUS);
        let (start, end) = span.unwrap();
        assert_eq!(&"see the Marketing Plan for details"[start..end], "Marketing Plan");
    }

    #[test]
    fn unrelated_candidate_scores_low() {
        let (relevance, span) =
            score_candidate("notes about gardening", "Quarterly Revenue", "Sales by region.");
        assert!(relevance < 0.1);
        assert!(span.is_none());
    }

    #[test]
    fn find_case_insensitive_reports_byte_span() {
        assert_eq!(find_case_insensitive("a PLAN here", "plan"), Some((2, 6)));
        assert_eq!(find_case_insensitive("short", "longer needle"), None);
    }

    #[tokio::test]
    async fn enhanced_path_requires_summaries() {
        let scorer = scorer_with_pages(&[page("p1", "Marketing Plan", "body")]).await;
        // No summaries stored: the basic path runs and matches on title.
        let suggestions = scorer
            .suggest("ws", None, "our marketing plan needs work")
            .await;
        assert!(!suggestions.is_empty());
        assert_eq!(suggestions[0].target_page_id, "p1");
        assert!((suggestions[0].confidence - BASIC_TITLE_CONFIDENCE).abs() < 1e-6);
    }

    #[tokio::test]
    async fn enhanced_path_filters_by_cutoff() {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_unit(&page("p1", "Marketing Plan", "body"))
            .await
            .unwrap();
        store
            .upsert_unit(&page("p2", "Holiday Photos", "body"))
            .await
            .unwrap();
        store
            .upsert_summary(&summary("p1", "Quarterly marketing plan and budget."))
            .await
            .unwrap();
        store
            .upsert_summary(&summary("p2", "Pictures from the team offsite."))
            .await
            .unwrap();
        let scorer = LinkSuggestionScorer::new(store, SuggestConfig::default());

        let suggestions = scorer
            .suggest("ws", None, "drafting the Marketing Plan budget for next quarter")
            .await;
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].target_page_id, "p1");
        assert!(suggestions[0].confidence > 0.6);
    }

    #[tokio::test]
    async fn suggestions_obey_invariants() {
        let pages: Vec<ContentUnit> = (0..15)
            .map(|i| page(&format!("p{}", i), &format!("Sales Report {}", i), "body"))
            .collect();
        let scorer = scorer_with_pages(&pages).await;

        let suggestions = scorer
            .suggest("ws", None, "link the latest sales report here")
            .await;

        assert!(suggestions.len() <= BASIC_MAX_SUGGESTIONS);
        let mut seen = std::collections::HashSet::new();
        for s in &suggestions {
            assert!((0.0..=1.0).contains(&s.confidence));
            assert!(
                seen.insert((s.target_page_id.clone(), s.matched_text.clone())),
                "duplicate (page, matched_text)"
            );
        }
        for pair in suggestions.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[tokio::test]
    async fn current_page_is_excluded() {
        let scorer = scorer_with_pages(&[page("p1", "Marketing Plan", "body")]).await;
        let suggestions = scorer
            .suggest("ws", Some("p1"), "the marketing plan is here")
            .await;
        assert!(suggestions.is_empty());
    }

    #[tokio::test]
    async fn trigger_words_surface_all_pages_weakly() {
        let scorer = scorer_with_pages(&[
            page("p1", "Zebra Notes", "body"),
            page("p2", "Quokka Diary", "body"),
        ])
        .await;
        let suggestions = scorer.suggest("ws", None, "add a link somewhere").await;
        assert_eq!(suggestions.len(), 2);
        for s in &suggestions {
            assert!((s.confidence - BASIC_TRIGGER_CONFIDENCE).abs() < 1e-6);
            assert_eq!(s.start_index, 0);
            assert_eq!(s.end_index, 0);
        }
    }
}
