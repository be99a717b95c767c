//! Dummy LLM provider: echoes the latest user message back prefixed with
//! `[echo]`. Used to exercise the chat loop without a model server.

use crate::llm::{ChatMessage, ProviderError, Role};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        Ok(reply_to(messages))
    }

    /// Streams the echo one word (with its trailing space) at a time.
    pub async fn stream<F>(&self, messages: &[ChatMessage], mut on_delta: F) -> Result<String, ProviderError>
    where
        F: FnMut(&str),
    {
        let reply = reply_to(messages);
        for piece in reply.split_inclusive(' ') {
            on_delta(piece);
        }
        Ok(reply)
    }
}

fn reply_to(messages: &[ChatMessage]) -> String {
    let last_user = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default();
    format!("[echo] {last_user}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_echoes_last_user_message() {
        let p = DummyProvider;
        let history = [
            ChatMessage::user("first"),
            ChatMessage::assistant("[echo] first"),
            ChatMessage::user("hello"),
        ];
        assert_eq!(p.complete(&history).await.unwrap(), "[echo] hello");
    }

    #[tokio::test]
    async fn complete_without_user_message() {
        let p = DummyProvider;
        assert_eq!(p.complete(&[ChatMessage::system("s")]).await.unwrap(), "[echo] ");
    }

    #[tokio::test]
    async fn stream_yields_words_in_order() {
        let p = DummyProvider;
        let mut pieces = Vec::new();
        let full = p
            .stream(&[ChatMessage::user("a b c")], |d| pieces.push(d.to_string()))
            .await
            .unwrap();
        assert_eq!(pieces, vec!["[echo] ", "a ", "b ", "c"]);
        assert_eq!(full, "[echo] a b c");
    }
}
