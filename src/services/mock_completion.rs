//! Scripted completion backend for tests, built with the `test-util` feature.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::models::ChatTurn;
use crate::services::llm_client::{CompletionError, CompletionService};

#[derive(Debug, Clone)]
enum Scripted {
    Reply(Result<String, CompletionError>),
    Stall(Duration),
}

struct Rule {
    marker: String,
    queue: VecDeque<Scripted>,
    last: Scripted,
}

impl Rule {
    fn next(&mut self) -> Scripted {
        match self.queue.pop_front() {
            Some(scripted) => {
                self.last = scripted.clone();
                scripted
            }
            None => self.last.clone(),
        }
    }
}

/// One recorded `chat` invocation.
#[derive(Debug, Clone)]
pub struct ChatCall {
    pub history_len: usize,
    pub message: String,
}

/// Completion service that answers from a script.
///
/// `complete` prompts are matched against rules by substring, first rule
/// wins. A rule with several responses hands them out in order and then
/// repeats the last one. `chat` pops replies from a queue and falls back to
/// a fixed follow-up question.
pub struct ScriptedCompletion {
    rules: Mutex<Vec<Rule>>,
    chat_replies: Mutex<VecDeque<Result<String, CompletionError>>>,
    pub complete_calls: Arc<Mutex<Vec<String>>>,
    pub chat_calls: Arc<Mutex<Vec<ChatCall>>>,
}

pub const DEFAULT_CHAT_REPLY: &str = "Tell me more about that.";

impl Default for ScriptedCompletion {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            chat_replies: Mutex::new(VecDeque::new()),
            complete_calls: Arc::new(Mutex::new(Vec::new())),
            chat_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn push_rule(self, marker: &str, scripted: Vec<Scripted>) -> Self {
        let mut queue: VecDeque<Scripted> = scripted.into();
        let last = queue
            .back()
            .cloned()
            .unwrap_or_else(|| Scripted::Reply(Ok(String::new())));
        if queue.len() == 1 {
            queue.clear();
        }
        self.rules
            .lock()
            .expect("script lock poisoned")
            .push(Rule {
                marker: marker.to_string(),
                queue,
                last,
            });
        self
    }

    /// Always answer prompts containing `marker` with `reply`.
    pub fn on_prompt(self, marker: &str, reply: impl Into<String>) -> Self {
        self.push_rule(marker, vec![Scripted::Reply(Ok(reply.into()))])
    }

    /// Answer successive matching prompts with `replies`, repeating the last.
    pub fn on_prompt_sequence(self, marker: &str, replies: Vec<&str>) -> Self {
        let scripted = replies
            .into_iter()
            .map(|r| Scripted::Reply(Ok(r.to_string())))
            .collect();
        self.push_rule(marker, scripted)
    }

    pub fn on_prompt_error(self, marker: &str, error: CompletionError) -> Self {
        self.push_rule(marker, vec![Scripted::Reply(Err(error))])
    }

    /// Never answer matching prompts within `stall`.
    pub fn on_prompt_stall(self, marker: &str, stall: Duration) -> Self {
        self.push_rule(marker, vec![Scripted::Stall(stall)])
    }

    pub fn with_chat_replies(self, replies: Vec<Result<String, CompletionError>>) -> Self {
        self.chat_replies
            .lock()
            .expect("script lock poisoned")
            .extend(replies);
        self
    }

    pub fn complete_call_count(&self, marker: &str) -> usize {
        self.complete_calls
            .lock()
            .expect("script lock poisoned")
            .iter()
            .filter(|p| p.contains(marker))
            .count()
    }

    pub fn chat_call_count(&self) -> usize {
        self.chat_calls.lock().expect("script lock poisoned").len()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.complete_calls
            .lock()
            .expect("script lock poisoned")
            .push(prompt.to_string());

        let scripted = {
            let mut rules = self.rules.lock().expect("script lock poisoned");
            rules
                .iter_mut()
                .find(|rule| prompt.contains(&rule.marker))
                .map(Rule::next)
        };

        match scripted {
            Some(Scripted::Reply(result)) => result,
            Some(Scripted::Stall(stall)) => {
                tokio::time::sleep(stall).await;
                Err(CompletionError::Timeout(stall))
            }
            None => Err(CompletionError::InvalidResponse(
                "no scripted response for prompt".to_string(),
            )),
        }
    }

    async fn chat(&self, history: &[ChatTurn], message: &str) -> Result<String, CompletionError> {
        self.chat_calls
            .lock()
            .expect("script lock poisoned")
            .push(ChatCall {
                history_len: history.len(),
                message: message.to_string(),
            });

        self.chat_replies
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(DEFAULT_CHAT_REPLY.to_string()))
    }
}
