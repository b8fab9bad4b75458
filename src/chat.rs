//! Retrieval-augmented conversation orchestrator.
//!
//! One entry point, [`ConversationOrchestrator::ask`], drives the whole
//! exchange: resolve or create the conversation, persist the user turn,
//! retrieve grounding sources for the question, optionally add a web
//! digest, prompt the generation model with history and sources, and
//! persist the assistant turn with citations.
//!
//! Failure policy: persisting the user's message is the one fatal step.
//! Retrieval and web search degrade to answering without that context;
//! a generation failure produces a fixed apology rather than an error.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::config::ChatConfig;
use crate::error::{Error, Result};
use crate::models::{
    ChatMode, Citation, Conversation, Message, MessageRole, SourceHit, SourceType,
};
use crate::provider::{GenerationClient, PromptMessage, PromptRole, WebSearchClient};
use crate::search::{RetrievalEngine, SearchRequest};
use crate::store::{SearchScope, Store};

/// Title given to a thread before its first exchange names it.
const UNTITLED: &str = "New conversation";

/// Returned verbatim when the generation model fails.
const APOLOGY: &str =
    "I'm sorry, I wasn't able to generate a response just now. Please try again.";

const WORKSPACE_SYSTEM_PROMPT: &str = "You are a knowledgeable assistant for a team workspace. \
Answer the user's question using the provided workspace sources when they are relevant, and say \
so plainly when they don't cover the question. Be concise.";

const HELP_SYSTEM_PROMPT: &str = "You are the product's help assistant. Answer questions about \
how to use the product, grounded in the provided help articles. If the articles don't cover the \
question, say so rather than guessing.";

/// One question aimed at a conversation thread.
#[derive(Debug, Clone)]
pub struct AskRequest {
    /// Existing thread to continue, or `None` to start a new one.
    pub conversation_id: Option<String>,
    pub workspace_id: String,
    pub user_id: String,
    pub mode: ChatMode,
    pub question: String,
    pub web_search_enabled: bool,
}

/// A completed exchange.
#[derive(Debug, Clone)]
pub struct AskResponse {
    pub conversation: Conversation,
    pub answer: Message,
}

pub struct ConversationOrchestrator {
    store: Arc<dyn Store>,
    engine: Arc<RetrievalEngine>,
    generator: Arc<dyn GenerationClient>,
    web: Option<Arc<dyn WebSearchClient>>,
    config: ChatConfig,
}

impl ConversationOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        engine: Arc<RetrievalEngine>,
        generator: Arc<dyn GenerationClient>,
        web: Option<Arc<dyn WebSearchClient>>,
        config: ChatConfig,
    ) -> Self {
        Self {
            store,
            engine,
            generator,
            web,
            config,
        }
    }

    /// Run one full question/answer exchange.
    pub async fn ask(&self, request: &AskRequest) -> Result<AskResponse> {
        if request.question.trim().is_empty() {
            return Err(Error::Validation("question must not be empty".into()));
        }

        let (mut conversation, is_first_exchange) = self.resolve_conversation(request).await?;

        // Prior turns, captured before the new user message is appended.
        let history = self
            .store
            .list_messages(&conversation.id)
            .await
            .map_err(Error::Persistence)?;

        let user_message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation.id.clone(),
            role: MessageRole::User,
            content: request.question.clone(),
            citations: Vec::new(),
            created_at: Utc::now(),
        };
        // The user's words must never be lost; this is the one fatal step.
        self.store
            .append_message(&user_message)
            .await
            .map_err(Error::Persistence)?;

        let sources = self.retrieve_sources(request).await;
        let web_digest = self.web_digest(request).await;
        let prompt = self.build_prompt(request, &history, &sources, web_digest.as_deref());

        // Citations come from retrieval, so a failed generation only
        // degrades the answer text.
        let citations = self.citations_for(&sources);
        let content = match self.generator.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(conversation_id = %conversation.id, error = %e, "generation failed");
                APOLOGY.to_string()
            }
        };

        let answer = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation.id.clone(),
            role: MessageRole::Assistant,
            content,
            citations,
            created_at: Utc::now(),
        };
        self.store
            .append_message(&answer)
            .await
            .map_err(Error::Persistence)?;

        if is_first_exchange {
            let title = derive_title(&request.question, self.config.title_max_chars);
            match self
                .store
                .update_conversation_title(&conversation.id, &title)
                .await
            {
                Ok(()) => conversation.title = title,
                Err(e) => {
                    warn!(conversation_id = %conversation.id, error = %e, "title update failed")
                }
            }
        }

        Ok(AskResponse {
            conversation,
            answer,
        })
    }

    /// Delete a thread and its messages.
    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        self.store
            .get_conversation(id)
            .await
            .map_err(Error::Persistence)?
            .ok_or_else(|| Error::not_found("conversation", id))?;
        self.store
            .delete_conversation(id)
            .await
            .map_err(Error::Persistence)
    }

    /// Load the requested thread, or create a fresh untitled one.
    async fn resolve_conversation(&self, request: &AskRequest) -> Result<(Conversation, bool)> {
        if let Some(id) = &request.conversation_id {
            let conversation = self
                .store
                .get_conversation(id)
                .await
                .map_err(Error::Persistence)?
                .ok_or_else(|| Error::not_found("conversation", id))?;
            let messages = self
                .store
                .list_messages(id)
                .await
                .map_err(Error::Persistence)?;
            return Ok((conversation, messages.is_empty()));
        }

        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            workspace_id: request.workspace_id.clone(),
            user_id: request.user_id.clone(),
            title: UNTITLED.to_string(),
            mode: request.mode,
            created_at: now,
            updated_at: now,
        };
        self.store
            .create_conversation(&conversation)
            .await
            .map_err(Error::Persistence)?;
        Ok((conversation, true))
    }

    /// Retrieve grounding sources for the question. Degrades to none.
    async fn retrieve_sources(&self, request: &AskRequest) -> Vec<SourceHit> {
        let (scope, threshold, source_types) = match request.mode {
            ChatMode::Workspace => (
                SearchScope::Workspace(request.workspace_id.clone()),
                self.config.workspace_threshold,
                vec![SourceType::Page, SourceType::File],
            ),
            ChatMode::Help => (
                SearchScope::Help,
                self.config.help_threshold,
                vec![SourceType::Help],
            ),
        };

        let search = SearchRequest {
            threshold,
            max_results: self.config.context_sources,
            source_types,
            ..SearchRequest::new(request.question.clone(), scope)
        };
        match self.engine.search(&search).await {
            Ok(outcome) => outcome.results,
            Err(e) => {
                warn!(error = %e, "retrieval failed, answering without sources");
                Vec::new()
            }
        }
    }

    /// Optional web context; workspace mode only, silent on failure.
    async fn web_digest(&self, request: &AskRequest) -> Option<String> {
        if !request.web_search_enabled || request.mode != ChatMode::Workspace {
            return None;
        }
        let client = self.web.as_ref()?;
        match client.search(&request.question).await {
            Ok(digest) if !digest.trim().is_empty() => Some(digest),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "web search failed, continuing without it");
                None
            }
        }
    }

    /// System prompt, labeled source excerpts, recent history, question.
    fn build_prompt(
        &self,
        request: &AskRequest,
        history: &[Message],
        sources: &[SourceHit],
        web_digest: Option<&str>,
    ) -> Vec<PromptMessage> {
        let mut system = match request.mode {
            ChatMode::Workspace => WORKSPACE_SYSTEM_PROMPT.to_string(),
            ChatMode::Help => HELP_SYSTEM_PROMPT.to_string(),
        };

        if !sources.is_empty() {
            system.push_str("\n\nSources:\n");
            for (i, hit) in sources.iter().enumerate() {
                system.push_str(&format!(
                    "{}. [{}] {}\n{}\n",
                    i + 1,
                    hit.source_type.label(),
                    hit.title,
                    hit.excerpt
                ));
            }
        }
        if let Some(digest) = web_digest {
            system.push_str("\n\nWeb results:\n");
            system.push_str(digest);
        }

        let mut prompt = vec![PromptMessage::new(PromptRole::System, system)];

        let skip = history.len().saturating_sub(self.config.history_limit);
        for message in &history[skip..] {
            let role = match message.role {
                MessageRole::User => PromptRole::User,
                MessageRole::Assistant => PromptRole::Assistant,
            };
            prompt.push(PromptMessage::new(role, message.content.clone()));
        }

        prompt.push(PromptMessage::new(PromptRole::User, request.question.clone()));
        prompt
    }

    /// Top sources as citations, best-first, clamped to [0, 1].
    fn citations_for(&self, sources: &[SourceHit]) -> Vec<Citation> {
        sources
            .iter()
            .take(self.config.max_citations)
            .map(|hit| Citation {
                source_id: hit.owner_id.clone(),
                source_title: hit.title.clone(),
                source_type: hit.source_type,
                relevance: hit.similarity.clamp(0.0, 1.0),
                excerpt: hit.excerpt.clone(),
            })
            .collect()
    }
}

/// First line of the question, whitespace-collapsed, truncated on a char
/// boundary with an ellipsis.
fn derive_title(question: &str, max_chars: usize) -> String {
    let collapsed: String = question.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", truncated.trim_end())
}
