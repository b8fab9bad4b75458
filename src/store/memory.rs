//! In-memory [`Store`] implementation for testing and local runs.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Vector search is brute-force cosine similarity over all stored
//! embeddings; keyword search is case-insensitive substring matching
//! scored by the fraction of query terms present.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    ContentUnit, Conversation, EmbeddingRecord, Message, OwnerScope, SourceHit, SourceType,
    SummaryRecord,
};

use super::{SearchScope, Store};

/// Excerpt length carried on search hits.
const SNIPPET_CHARS: usize = 240;

/// In-memory store; cheap to construct per test.
#[derive(Default)]
pub struct InMemoryStore {
    units: RwLock<HashMap<String, ContentUnit>>,
    embeddings: RwLock<HashMap<String, EmbeddingRecord>>,
    summaries: RwLock<HashMap<String, SummaryRecord>>,
    conversations: RwLock<HashMap<String, Conversation>>,
    messages: RwLock<Vec<Message>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

fn in_scope(unit: &ContentUnit, scope: &SearchScope) -> bool {
    match scope {
        SearchScope::Workspace(ws) => unit.scope == OwnerScope::Workspace(ws.clone()),
        SearchScope::Help => unit.scope == OwnerScope::Global,
    }
}

fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}

fn hit_from_unit(unit: &ContentUnit, similarity: f32) -> SourceHit {
    SourceHit {
        owner_id: unit.id.clone(),
        source_type: unit.source_type,
        title: unit.title.clone(),
        excerpt: snippet(&unit.body),
        similarity,
        updated_at: unit.updated_at,
        tags: unit.tags.clone(),
    }
}

fn sort_best_first(hits: &mut [SourceHit]) {
    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.updated_at.cmp(&a.updated_at))
    });
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_unit(&self, unit: &ContentUnit) -> Result<()> {
        self.units
            .write()
            .unwrap()
            .insert(unit.id.clone(), unit.clone());
        Ok(())
    }

    async fn get_unit(&self, id: &str) -> Result<Option<ContentUnit>> {
        Ok(self.units.read().unwrap().get(id).cloned())
    }

    async fn list_pages(&self, workspace_id: &str) -> Result<Vec<ContentUnit>> {
        let units = self.units.read().unwrap();
        let mut pages: Vec<ContentUnit> = units
            .values()
            .filter(|u| {
                u.source_type == SourceType::Page
                    && u.scope == OwnerScope::Workspace(workspace_id.to_string())
            })
            .cloned()
            .collect();
        pages.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(pages)
    }

    async fn delete_unit(&self, id: &str) -> Result<()> {
        self.units.write().unwrap().remove(id);
        Ok(())
    }

    async fn get_embedding_hash(&self, owner_id: &str) -> Result<Option<String>> {
        Ok(self
            .embeddings
            .read()
            .unwrap()
            .get(owner_id)
            .map(|e| e.content_hash.clone()))
    }

    async fn upsert_embedding(&self, record: &EmbeddingRecord) -> Result<()> {
        self.embeddings
            .write()
            .unwrap()
            .insert(record.owner_id.clone(), record.clone());
        Ok(())
    }

    async fn delete_embedding(&self, owner_id: &str) -> Result<()> {
        self.embeddings.write().unwrap().remove(owner_id);
        Ok(())
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        scope: &SearchScope,
        source_types: &[SourceType],
        limit: usize,
    ) -> Result<Vec<SourceHit>> {
        let embeddings = self.embeddings.read().unwrap();
        let units = self.units.read().unwrap();

        let mut hits: Vec<SourceHit> = embeddings
            .values()
            .filter_map(|e| {
                // Embeddings whose owner is gone are stale rows; skip them.
                let unit = units.get(&e.owner_id)?;
                if !in_scope(unit, scope) || !source_types.contains(&unit.source_type) {
                    return None;
                }
                Some(hit_from_unit(unit, cosine_sim(query, &e.vector)))
            })
            .collect();

        sort_best_first(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn keyword_search(
        &self,
        query: &str,
        scope: &SearchScope,
        limit: usize,
    ) -> Result<Vec<SourceHit>> {
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let units = self.units.read().unwrap();
        let mut hits: Vec<SourceHit> = units
            .values()
            .filter(|u| in_scope(u, scope))
            .filter_map(|u| {
                let haystack = format!("{} {}", u.title, u.body).to_lowercase();
                let matched = terms.iter().filter(|t| haystack.contains(**t)).count();
                if matched == 0 {
                    return None;
                }
                let score = matched as f32 / terms.len() as f32;
                Some(hit_from_unit(u, score))
            })
            .collect();

        sort_best_first(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn get_summary(&self, page_id: &str) -> Result<Option<SummaryRecord>> {
        Ok(self.summaries.read().unwrap().get(page_id).cloned())
    }

    async fn upsert_summary(&self, record: &SummaryRecord) -> Result<()> {
        self.summaries
            .write()
            .unwrap()
            .insert(record.page_id.clone(), record.clone());
        Ok(())
    }

    async fn delete_summary(&self, page_id: &str) -> Result<()> {
        self.summaries.write().unwrap().remove(page_id);
        Ok(())
    }

    async fn list_summaries(&self, workspace_id: &str) -> Result<Vec<SummaryRecord>> {
        let units = self.units.read().unwrap();
        let summaries = self.summaries.read().unwrap();
        let mut out: Vec<SummaryRecord> = summaries
            .values()
            .filter(|s| {
                units
                    .get(&s.page_id)
                    .map(|u| u.scope == OwnerScope::Workspace(workspace_id.to_string()))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.page_id.cmp(&b.page_id));
        Ok(out)
    }

    async fn create_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.conversations
            .write()
            .unwrap()
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(self.conversations.read().unwrap().get(id).cloned())
    }

    async fn update_conversation_title(&self, id: &str, title: &str) -> Result<()> {
        if let Some(conv) = self.conversations.write().unwrap().get_mut(id) {
            conv.title = title.to_string();
            conv.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        self.conversations.write().unwrap().remove(id);
        self.messages
            .write()
            .unwrap()
            .retain(|m| m.conversation_id != id);
        Ok(())
    }

    async fn append_message(&self, message: &Message) -> Result<()> {
        self.messages.write().unwrap().push(message.clone());
        if let Some(conv) = self
            .conversations
            .write()
            .unwrap()
            .get_mut(&message.conversation_id)
        {
            conv.updated_at = message.created_at;
        }
        Ok(())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let messages = self.messages.read().unwrap();
        Ok(messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }
}
