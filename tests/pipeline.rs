//! End-to-end pipeline tests over the in-memory store with deterministic
//! model fakes: ingest, index, retrieve, summarize, chat, delete.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use noteworks::chat::{AskRequest, ConversationOrchestrator};
use noteworks::chunk::Chunker;
use noteworks::config::{ChatConfig, ChunkingConfig, IndexingConfig};
use noteworks::index::EmbeddingIndexer;
use noteworks::jobs::JobQueue;
use noteworks::models::{ChatMode, ContentUnit, OwnerScope, SourceType};
use noteworks::provider::{EmbeddingClient, GenerationClient, PromptMessage};
use noteworks::search::{RetrievalEngine, SearchRequest, SearchStrategy};
use noteworks::store::memory::InMemoryStore;
use noteworks::store::{SearchScope, Store};
use noteworks::summary::SummaryService;

/// Embeds text as normalized term counts over a small fixed vocabulary,
/// so cosine similarity tracks topical overlap deterministically.
struct VocabEmbedder {
    calls: AtomicUsize,
}

const VOCAB: [&str; 8] = [
    "travel", "itinerary", "flight", "budget", "revenue", "sales", "onboarding", "hire",
];

impl VocabEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingClient for VocabEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        let mut v: Vec<f32> = VOCAB
            .iter()
            .map(|term| lower.matches(term).count() as f32)
            .collect();
        // Trailing constant keeps unrelated texts from being zero vectors
        // while leaving them nearly orthogonal to topical ones.
        v.push(0.1);
        Ok(v)
    }

    fn dims(&self) -> usize {
        VOCAB.len() + 1
    }
}

struct CountingGenerator {
    calls: AtomicUsize,
}

impl CountingGenerator {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl GenerationClient for CountingGenerator {
    async fn generate(&self, _messages: &[PromptMessage]) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("Generated answer {}.", n))
    }
}

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

#[test]
fn long_document_chunks_stay_within_token_budget() {
    let config = ChunkingConfig {
        max_tokens: 300,
        overlap_tokens: 50,
        ..ChunkingConfig::default()
    };
    let chunker = Chunker::new();

    let text = (0..1500)
        .map(|i| format!("Sentence number {} about travel plans and budgets.", i))
        .collect::<Vec<_>>()
        .join(" ");
    let chunks = chunker.chunk("doc", &text, &config);

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(
            chunk.token_count <= 320,
            "chunk {} has {} tokens",
            chunk.index,
            chunk.token_count
        );
    }
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.index, i);
        assert_eq!(chunk.parent_id, "doc");
    }
}

#[tokio::test]
async fn indexed_page_is_retrievable_by_meaning() {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(VocabEmbedder::new());
    let indexer = EmbeddingIndexer::new(store.clone(), embedder.clone(), IndexingConfig::default());
    let engine = RetrievalEngine::new(store.clone(), embedder.clone());

    let travel = page(
        "p-travel",
        "Tokyo Trip",
        "Flight options, itinerary drafts, and the travel budget.",
    );
    let sales = page("p-sales", "Q3 Numbers", "Sales and revenue by region.");
    store.upsert_unit(&travel).await.unwrap();
    store.upsert_unit(&sales).await.unwrap();
    indexer.index_unit(&travel).await;
    indexer.index_unit(&sales).await;

    let request = SearchRequest {
        threshold: 0.5,
        ..SearchRequest::new(
            "travel itinerary and flight",
            SearchScope::Workspace("ws".to_string()),
        )
    };
    let outcome = engine.search(&request).await.unwrap();

    assert_eq!(outcome.strategy, SearchStrategy::MultiSource);
    assert!(!outcome.results.is_empty());
    assert_eq!(outcome.results[0].owner_id, "p-travel");
    for hit in &outcome.results {
        assert!(hit.similarity >= request.threshold);
    }
}

#[tokio::test]
async fn reindexing_unchanged_content_never_calls_the_model() {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(VocabEmbedder::new());
    let indexer = EmbeddingIndexer::new(store.clone(), embedder.clone(), IndexingConfig::default());

    let p = page("p1", "Travel", "Flight and itinerary notes.");
    store.upsert_unit(&p).await.unwrap();
    indexer.index_unit(&p).await;
    let calls_after_first = embedder.calls.load(Ordering::SeqCst);
    indexer.index_unit(&p).await;
    indexer.index_unit(&p).await;

    assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_first);
}

#[tokio::test]
async fn unchanged_page_summary_is_served_from_the_store() {
    let store = Arc::new(InMemoryStore::new());
    let generator = Arc::new(CountingGenerator::new());
    let service = SummaryService::new(
        store.clone(),
        generator.clone(),
        Arc::new(JobQueue::new()),
        IndexingConfig::default(),
    );

    store
        .upsert_unit(&page("p1", "Travel", "Flight and itinerary notes."))
        .await
        .unwrap();

    let first = service.generate_summary("p1", false).await.unwrap();
    let second = service.generate_summary("p1", false).await.unwrap();

    assert_eq!(first.text, second.text);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn deleted_page_disappears_from_retrieval() {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(VocabEmbedder::new());
    let indexer = EmbeddingIndexer::new(store.clone(), embedder.clone(), IndexingConfig::default());
    let generator = Arc::new(CountingGenerator::new());
    let summaries = SummaryService::new(
        store.clone(),
        generator,
        Arc::new(JobQueue::new()),
        IndexingConfig::default(),
    );
    let engine = RetrievalEngine::new(store.clone(), embedder);

    let p = page("p1", "Travel", "Flight and itinerary notes.");
    store.upsert_unit(&p).await.unwrap();
    indexer.index_unit(&p).await;
    summaries.generate_summary("p1", false).await.unwrap();

    // Permanent deletion: unit, embedding, summary.
    store.delete_unit("p1").await.unwrap();
    indexer.delete("p1").await;
    summaries.delete_summary("p1").await.unwrap();

    assert!(store.get_embedding_hash("p1").await.unwrap().is_none());
    assert!(store.get_summary("p1").await.unwrap().is_none());

    let request = SearchRequest {
        threshold: 0.0,
        ..SearchRequest::new("travel flight", SearchScope::Workspace("ws".to_string()))
    };
    let outcome = engine.search(&request).await.unwrap();
    assert!(outcome.results.iter().all(|h| h.owner_id != "p1"));
}

#[tokio::test]
async fn off_topic_question_answers_without_citations() {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(VocabEmbedder::new());
    let indexer = EmbeddingIndexer::new(store.clone(), embedder.clone(), IndexingConfig::default());

    let p = page("p1", "Travel", "Flight and itinerary notes for the trip.");
    store.upsert_unit(&p).await.unwrap();
    indexer.index_unit(&p).await;

    let engine = Arc::new(RetrievalEngine::new(store.clone(), embedder));
    let orchestrator = ConversationOrchestrator::new(
        store.clone(),
        engine,
        Arc::new(CountingGenerator::new()),
        None,
        ChatConfig::default(),
    );

    let response = orchestrator
        .ask(&AskRequest {
            conversation_id: None,
            workspace_id: "ws".to_string(),
            user_id: "u1".to_string(),
            mode: ChatMode::Workspace,
            question: "What's a good chocolate cake recipe?".to_string(),
            web_search_enabled: false,
        })
        .await
        .unwrap();

    assert!(!response.answer.content.is_empty());
    assert!(response.answer.citations.is_empty());

    // Both turns persisted regardless.
    let messages = store
        .list_messages(&response.conversation.id)
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn workspace_chat_cites_relevant_pages() {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(VocabEmbedder::new());
    let indexer = EmbeddingIndexer::new(store.clone(), embedder.clone(), IndexingConfig::default());

    let p = page(
        "p-onboarding",
        "Onboarding Guide",
        "Each new hire follows the onboarding checklist in their first week.",
    );
    store.upsert_unit(&p).await.unwrap();
    indexer.index_unit(&p).await;

    let engine = Arc::new(RetrievalEngine::new(store.clone(), embedder));
    let orchestrator = ConversationOrchestrator::new(
        store,
        engine,
        Arc::new(CountingGenerator::new()),
        None,
        ChatConfig::default(),
    );

    let response = orchestrator
        .ask(&AskRequest {
            conversation_id: None,
            workspace_id: "ws".to_string(),
            user_id: "u1".to_string(),
            mode: ChatMode::Workspace,
            question: "How does onboarding work for a new hire?".to_string(),
            web_search_enabled: false,
        })
        .await
        .unwrap();

    assert!(!response.answer.citations.is_empty());
    assert_eq!(response.answer.citations[0].source_id, "p-onboarding");
    assert!(response.answer.citations.len() <= ChatConfig::default().max_citations);
}
