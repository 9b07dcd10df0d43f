use std::sync::Arc;

use common::{
    error::{AppError, TransportError},
    utils::{chat::ChatService, retry::RetryPolicy},
};
use tracing::{info, warn};

pub const REWRITE_SYSTEM_PROMPT: &str = "You are a search assistant. Rewrite the following query to make it more effective for search, but maintain the original intent and scope.";

/// Rewrites queries through a chat deployment, falling back to the original text.
#[derive(Clone)]
pub struct QueryRewriter {
    chat: Arc<dyn ChatService>,
    policy: RetryPolicy,
}

impl QueryRewriter {
    pub fn new(chat: Arc<dyn ChatService>, policy: RetryPolicy) -> Self {
        Self { chat, policy }
    }

    /// Never fails: any error yields `query` unchanged.
    pub async fn rewrite(&self, query: &str) -> String {
        match self.try_rewrite(query).await {
            Ok(rewritten) => {
                info!(original = %query, rewritten = %rewritten, "query rewritten");
                rewritten
            }
            Err(err) => {
                warn!(error = %err, "query rewrite failed; using original query");
                query.to_string()
            }
        }
    }

    async fn try_rewrite(&self, query: &str) -> Result<String, AppError> {
        let chat = &self.chat;
        let rewritten = self
            .policy
            .run(move || async move {
                let reply = chat.complete(REWRITE_SYSTEM_PROMPT, query).await?;
                let reply = reply.trim();
                if reply.is_empty() {
                    return Err(TransportError::Decode("empty rewrite completion".into()));
                }
                Ok(reply.to_string())
            })
            .await
            .map_err(|err| AppError::Rewrite(err.to_string()))?;

        Ok(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use common::test_utils::ScriptedChat;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn failing_chat_returns_the_original_query() {
        let chat = Arc::new(ScriptedChat::failing());
        let rewriter = QueryRewriter::new(chat.clone(), RetryPolicy::resilient());

        assert_eq!(rewriter.rewrite("x").await, "x");
        assert_eq!(chat.call_count(), 6);
    }

    #[tokio::test]
    async fn successful_rewrite_is_trimmed() {
        let chat = Arc::new(ScriptedChat::replying("  duties of primary care managers \n"));
        let rewriter = QueryRewriter::new(chat.clone(), RetryPolicy::resilient());

        assert_eq!(
            rewriter.rewrite("What do PCMs do?").await,
            "duties of primary care managers"
        );
        assert_eq!(chat.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_completion_counts_as_failure() {
        let chat = Arc::new(ScriptedChat::replying("   "));
        let rewriter = QueryRewriter::new(chat, RetryPolicy::resilient());

        assert_eq!(rewriter.rewrite("original").await, "original");
    }
}
