//! Controlled vocabularies used to tag diary entries.

pub const EMOTIONS: &[&str] = &[
    "Happiness",
    "Sadness",
    "Anger",
    "Fear",
    "Surprise",
    "Disgust",
    "Love",
    "Anticipation",
    "Trust",
    "Jealousy",
    "Envy",
    "Guilt",
    "Shame",
    "Relief",
    "Pride",
    "Contempt",
    "Frustration",
    "Boredom",
    "Hope",
    "Confusion",
    "Embarrassment",
];

pub const KEY_TOPICS: &[&str] = &[
    "Work",
    "Career",
    "Studies",
    "Relationships",
    "Family",
    "Friendship",
    "Health",
    "Fitness",
    "Sleep",
    "Finances",
    "Personal Growth",
    "Hobbies",
    "Travel",
    "Self-care",
    "Productivity",
    "Spirituality",
    "Community",
];

pub const MENTAL_TENDENCIES: &[&str] = &[
    "High Expectations",
    "External Validation",
    "Reluctance to Share",
    "Expectation of Reciprocity",
    "Guilt-trapping",
    "Balancing Correction and Encouragement",
    "Demotivation from Initial Failures",
    "Perfectionism",
    "Tunnel Vision",
    "Self-efficacy",
    "Learned Helplessness",
    "Overanalysis",
    "Fear of Failure",
    "Risk Aversion",
    "Impostor Syndrome",
    "Distractibility",
    "Multitasking",
];

/// Renders a vocabulary for a prompt slot.
pub fn as_prompt_list(vocabulary: &[&str]) -> String {
    vocabulary.join(", ")
}

/// Case-insensitive lookup returning the canonical spelling.
pub fn canonical<'a>(vocabulary: &[&'a str], candidate: &str) -> Option<&'a str> {
    let candidate = candidate.trim();
    vocabulary
        .iter()
        .find(|term| term.eq_ignore_ascii_case(candidate))
        .copied()
}
