//! Interactive chat console.
//!
//! The session owns the whole conversation and replays it to the provider on
//! every turn. The model speaks first: history is seeded with the system
//! prompt and a greeting request, so the console opens with the model's
//! introduction before the first `> ` prompt.
//!
//! The loop ends on EOF, `/exit` / `/quit`, or when `shutdown` is cancelled
//! (Ctrl-C). Provider failures are reported inline and the loop keeps going.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::error::AppError;
use crate::llm::{ChatMessage, LlmProvider, ProviderError};

const EXIT_COMMANDS: &[&str] = &["/exit", "/quit"];

pub struct ChatSession {
    provider: LlmProvider,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(provider: LlmProvider, chat: &ChatConfig) -> Self {
        let history = vec![
            ChatMessage::system(chat.system_prompt.clone()),
            ChatMessage::user(chat.greeting.clone()),
        ];
        Self { provider, history }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::user(content));
    }

    /// Stream a reply to the current history into `out` and record it.
    /// On error nothing is recorded.
    pub async fn respond<W: Write>(&mut self, out: &mut W) -> Result<String, ProviderError> {
        let reply = self
            .provider
            .stream(&self.history, |delta| {
                let _ = out.write_all(delta.as_bytes());
                let _ = out.flush();
            })
            .await?;
        self.history.push(ChatMessage::assistant(reply.clone()));
        debug!(turns = self.history.len(), reply_len = reply.len(), "assistant turn recorded");
        Ok(reply)
    }
}

/// Drive the console until EOF, an exit command, or `shutdown`.
pub async fn run<R, W>(
    session: &mut ChatSession,
    input: R,
    out: &mut W,
    shutdown: CancellationToken,
) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    info!(provider = session.provider.name(), "chat console started");
    let mut lines = input.lines();

    'session: loop {
        let turn = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            result = session.respond(out) => Some(result),
        };
        match turn {
            None => break 'session,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "chat turn failed");
                write!(out, "[error] {e}")?;
            }
        }
        writeln!(out)?;

        loop {
            write!(out, "> ")?;
            out.flush()?;

            let line = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                line = lines.next_line() => Some(line),
            };
            let input = match line {
                None => {
                    writeln!(out)?;
                    info!("chat console interrupted");
                    break 'session;
                }
                Some(Err(e)) => {
                    warn!("console read error: {e}");
                    break 'session;
                }
                Some(Ok(None)) => {
                    info!("console input closed");
                    break 'session;
                }
                Some(Ok(Some(input))) => input.trim().to_string(),
            };

            if input.is_empty() {
                continue;
            }
            if EXIT_COMMANDS.contains(&input.as_str()) {
                break 'session;
            }
            debug!(input_len = input.len(), "user turn received");
            session.push_user(input);
            break;
        }
    }

    info!(turns = session.history.len(), "chat console closed");
    Ok(())
}
