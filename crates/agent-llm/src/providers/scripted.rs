use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use agent_core::{tools::ToolSchema, Message};
use async_trait::async_trait;
use futures::StreamExt;

use crate::provider::{LLMError, LLMProvider, LLMStream, Result};
use crate::types::LLMChunk;

/// One canned provider turn.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Chunks streamed in order
    Chunks(Vec<LLMChunk>),
    /// Chunks streamed, then a mid-stream failure
    FailAfter(Vec<LLMChunk>, String),
    /// `chat_stream` itself fails
    Reject(String),
}

/// Plays back scripted turns; the last turn repeats once the script runs out.
///
/// Used by tests and for reproducing provider behaviour locally.
#[derive(Debug)]
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    last: Mutex<Option<ScriptedTurn>>,
    requests: Mutex<Vec<Vec<Message>>>,
    chunk_delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            chunk_delay: None,
        }
    }

    /// Sleeps before each chunk, to exercise cancellation.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Messages of every `chat_stream` call so far.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn next_turn(&self) -> Option<ScriptedTurn> {
        let mut turns = self.turns.lock().ok()?;
        let mut last = self.last.lock().ok()?;
        match turns.pop_front() {
            Some(turn) => {
                *last = Some(turn.clone());
                Some(turn)
            }
            None => last.clone(),
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat_stream(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
        _model: &str,
    ) -> Result<LLMStream> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }

        let items: Vec<Result<LLMChunk>> = match self.next_turn() {
            Some(ScriptedTurn::Chunks(chunks)) => chunks.into_iter().map(Ok).collect(),
            Some(ScriptedTurn::FailAfter(chunks, error)) => chunks
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(LLMError::Stream(error))))
                .collect(),
            Some(ScriptedTurn::Reject(error)) => return Err(LLMError::Api(error)),
            None => vec![Ok(LLMChunk::Done)],
        };

        let delay = self.chunk_delay;
        let stream = futures::stream::iter(items).then(move |item| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            item
        });

        Ok(Box::pin(stream))
    }
}
