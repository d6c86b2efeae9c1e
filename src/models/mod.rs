pub mod internal;
pub mod vocabulary;

pub use internal::{ChatSession, ChatTurn, ConversationLabels, DiaryEntry, Role, UserId};
