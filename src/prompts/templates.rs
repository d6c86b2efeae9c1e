// Prompt library. Each function takes no input and returns an immutable
// template; callers fill the declared slots with `PromptTemplate::format`.

use super::PromptTemplate;

// ==================== ENTRY ANALYTICS ====================

pub fn emotions_template() -> PromptTemplate {
    PromptTemplate::new(
        "emotions",
        "Based on the content from this diary entry, can you tag it with the relevant emotions?
This is the diary entry: {entry_content}.
This is the list of emotions that you can tag from: {emotions}
Respond with a comma-separated list of emotions taken only from that list. No preamble.",
        &["entry_content", "emotions"],
    )
}

pub fn key_topics_template() -> PromptTemplate {
    PromptTemplate::new(
        "key_topics",
        "Based on the content from this diary entry, can you tag it with the relevant key topics?
This is the diary entry: {entry_content}.
This is the list of key topics that you can tag from: {key_topics}
Respond with a comma-separated list of key topics taken only from that list. No preamble.",
        &["entry_content", "key_topics"],
    )
}

pub fn mental_tendencies_template() -> PromptTemplate {
    PromptTemplate::new(
        "mental_tendencies",
        "Based on the content from this diary entry, can you tag it with the relevant mental tendencies?
This is the diary entry: {entry_content}.
This is the list of mental tendencies that you can tag from: {mental_tendencies}
Respond with a comma-separated list of mental tendencies taken only from that list. No preamble.",
        &["entry_content", "mental_tendencies"],
    )
}

pub fn reflection_questions_template() -> PromptTemplate {
    PromptTemplate::new(
        "reflection_questions",
        "You are a thoughtful pen pal. Read this diary entry and write three short questions \
that would help the writer reflect on it more deeply.
This is the diary entry: {entry_content}.
Write one question per line. No preamble.",
        &["entry_content"],
    )
}

// ==================== CONVERSATION ====================

pub fn label_extraction_template() -> PromptTemplate {
    PromptTemplate::new(
        "label_extraction",
        r#"Read what this person has written so far in a journaling conversation.
Extract the following if, and only if, the person has actually said it:
1. emotions_experienced: the emotions this person experienced
2. current_state: the current state (or real outcome) this person experienced
3. desired_state: the desired state (or desired outcome, expectation) this person expected

Respond with a JSON object and nothing else, using null for anything not yet stated:
{{"emotions_experienced": string or null, "current_state": string or null, "desired_state": string or null}}

What the person wrote:
{transcript}"#,
        &["transcript"],
    )
}

pub fn summary_template() -> PromptTemplate {
    PromptTemplate::new(
        "summary",
        r#"Turn this journaling conversation into a diary entry written in the first person.
Give it a short title and condense the content to what the writer shared.

Respond with a JSON object and nothing else:
{{"title": string, "content": string}}

Conversation:
{transcript}"#,
        &["transcript"],
    )
}

pub fn chatbot_system_template() -> PromptTemplate {
    PromptTemplate::new(
        "chatbot_system",
        "You are a therapist psychologist, and you have ability like Chris Voss, the FBI hostage \
negotiator, who labels what this person is going through.

Based on the ongoing conversations, prompt the user and ask questions to get the following information:
1. The emotions that this person experienced
2. The current state (or real outcome) that this person experienced
3. The desired state (or desired outcome, expectation) that this person expected.

Ask one question at a time and keep replies short and warm.

Past diary entries that may be related:
{similar_entries}",
        &["similar_entries"],
    )
}

// ==================== JOURNAL QUERY ====================

pub fn question_generation_template() -> PromptTemplate {
    PromptTemplate::new(
        "question_generation",
        "You are a pen pal for a friend who has been struggling with their mental health.
Based on the following past diary entries, generate 5 relevant questions to prompt your friend to start journalling.
Past Entries: {context}

Write one question per line. No preamble.
Questions:",
        &["context"],
    )
}

pub fn opening_question_template() -> PromptTemplate {
    PromptTemplate::new(
        "opening_question",
        "We talked about the following in my latest journal: {latest_entry}
Help me come up with an idea of what I should talk about today. Phrase it as a single question.",
        &["latest_entry"],
    )
}

pub fn topics_from_chat_template() -> PromptTemplate {
    PromptTemplate::new(
        "topics_from_chat",
        "User has said this: {user_chat}
What are some of the keywords, topics, nouns mentioned in this user response?
Provide a simple comma-separated list of single words. No preamble.",
        &["user_chat"],
    )
}

pub fn topic_query_template() -> PromptTemplate {
    PromptTemplate::new("topic_query", "{user_chat} {topics}", &["user_chat", "topics"])
}

/// Every template in the library.
pub fn all() -> Vec<PromptTemplate> {
    vec![
        emotions_template(),
        key_topics_template(),
        mental_tendencies_template(),
        reflection_questions_template(),
        label_extraction_template(),
        summary_template(),
        chatbot_system_template(),
        question_generation_template(),
        opening_question_template(),
        topics_from_chat_template(),
        topic_query_template(),
    ]
}
