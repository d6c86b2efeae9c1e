use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use utoipa::ToSchema;

/// Longest user id accepted; ids become file and collection names.
const MAX_USER_ID_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidUserId {
    #[error("user id must not be empty")]
    Empty,
    #[error("user id exceeds {MAX_USER_ID_LEN} characters")]
    TooLong,
    #[error("user id contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// Identity selecting a user's entry file and similarity index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: &str) -> Result<Self, InvalidUserId> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(InvalidUserId::Empty);
        }
        if raw.chars().count() > MAX_USER_ID_LEN {
            return Err(InvalidUserId::TooLong);
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(InvalidUserId::InvalidCharacter(bad));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = InvalidUserId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// The three facts a conversation must surface before it can be finalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConversationLabels {
    pub emotions_experienced: Option<String>,
    pub current_state: Option<String>,
    pub desired_state: Option<String>,
}

impl ConversationLabels {
    pub fn is_complete(&self) -> bool {
        [
            &self.emotions_experienced,
            &self.current_state,
            &self.desired_state,
        ]
        .iter()
        .all(|field| field.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }

    /// Folds a fresh extraction into the accumulator. Newer values win, but a
    /// field that is already set is never cleared.
    pub fn merge(&mut self, newer: ConversationLabels) {
        fn keep(current: &mut Option<String>, newer: Option<String>) {
            if let Some(value) = newer.filter(|v| !v.trim().is_empty()) {
                *current = Some(value);
            }
        }

        keep(&mut self.emotions_experienced, newer.emotions_experienced);
        keep(&mut self.current_state, newer.current_state);
        keep(&mut self.desired_state, newer.desired_state);
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.emotions_experienced.is_none() {
            missing.push("emotions_experienced");
        }
        if self.current_state.is_none() {
            missing.push("current_state");
        }
        if self.desired_state.is_none() {
            missing.push("desired_state");
        }
        missing
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct DiaryEntry {
    pub id: String,
    #[schema(value_type = String, format = Date)]
    pub date: NaiveDate,
    pub title: String,
    pub content: String,
    pub emotions: Vec<String>,
    pub key_topics: Vec<String>,
    pub mental_tendencies: Vec<String>,
    pub reflection_questions: String,
    #[serde(default)]
    pub labels: ConversationLabels,
}

impl DiaryEntry {
    /// Metadata copy stored next to the vector: every field except `content`.
    pub fn index_metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "date": self.date.format("%Y-%m-%d").to_string(),
            "title": self.title,
            "emotions": self.emotions,
            "key_topics": self.key_topics,
            "mental_tendencies": self.mental_tendencies,
            "reflection_questions": self.reflection_questions,
            "emotions_experienced": self.labels.emotions_experienced,
            "current_state": self.labels.current_state,
            "desired_state": self.labels.desired_state,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    /// Seed turns are sent to the model but never shown or analyzed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            hidden: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            hidden: false,
        }
    }

    fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// Append-only transcript of one conversation.
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    turns: Vec<ChatTurn>,
}

impl ChatSession {
    /// Starts a session whose model context opens with `instruction`,
    /// answered by `acknowledgment`. Neither turn is visible to the user.
    pub fn seeded(instruction: impl Into<String>, acknowledgment: impl Into<String>) -> Self {
        Self {
            turns: vec![
                ChatTurn::user(instruction).hidden(),
                ChatTurn::assistant(acknowledgment).hidden(),
            ],
        }
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    /// Drops the most recent turn if it is a visible user turn.
    pub(crate) fn rollback_user_turn(&mut self) -> Option<ChatTurn> {
        match self.turns.last() {
            Some(turn) if turn.role == Role::User && !turn.hidden => self.turns.pop(),
            _ => None,
        }
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn visible_turns(&self) -> impl Iterator<Item = &ChatTurn> {
        self.turns.iter().filter(|t| !t.hidden)
    }

    /// Concatenated text of every visible user turn.
    pub fn user_transcript(&self) -> String {
        self.visible_turns()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Visible turns rendered as `role: text` lines.
    pub fn transcript(&self) -> String {
        self.visible_turns()
            .map(|t| format!("{}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
