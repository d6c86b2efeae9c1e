use super::*;
use chrono::NaiveDate;
use journal_companion::orchestrator::import::{read_import_file, stable_entry_id, ImportedEntry};
use journal_companion::CompletionError;

fn imported(day: u32, title: &str, content: &str) -> ImportedEntry {
    ImportedEntry {
        date: NaiveDate::from_ymd_opt(2024, 9, day).unwrap(),
        title: title.to_string(),
        content: content.to_string(),
    }
}

fn sample_entries() -> Vec<ImportedEntry> {
    vec![
        imported(1, "Garden", "Planted tomatoes with my sister, felt calm afterwards."),
        imported(2, "Deadline", "Stayed late at the office finishing the quarterly report."),
        imported(3, "Run", "Morning run by the river, legs sore but happy."),
    ]
}

// ==================== IMPORT ====================

#[tokio::test]
async fn test_import_annotates_and_stores_entries() {
    let ctx = TestContext::new(with_analytics(ScriptedCompletion::new()));
    let alice = user("alice");

    let summary = ctx.orchestrator.import_entries(&alice, sample_entries()).await;

    assert_eq!(summary.imported, 3);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.failed, 0);

    let stored = ctx.orchestrator.store().entries(&alice).await.unwrap();
    let titles: Vec<&str> = stored.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Garden", "Deadline", "Run"]);
    assert_eq!(stored[0].emotions, vec!["Fear", "Hope"]);
    assert_eq!(stored[0].id, stable_entry_id(&alice, &sample_entries()[0]));
    assert!(ctx.orchestrator.reconcile(&alice).await.unwrap().is_consistent());
}

#[tokio::test]
async fn test_reimport_skips_known_entries() {
    let ctx = TestContext::new(with_analytics(ScriptedCompletion::new()));
    let alice = user("alice");

    ctx.orchestrator.import_entries(&alice, sample_entries()).await;
    let mut again = sample_entries();
    again.push(imported(4, "Rest", "Slept in and read all afternoon."));
    let summary = ctx.orchestrator.import_entries(&alice, again).await;

    assert_eq!(summary.imported, 1);
    assert_eq!(summary.skipped, 3);
    assert_eq!(ctx.orchestrator.store().entries(&alice).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_import_survives_analytics_outage() {
    let script = ScriptedCompletion::new()
        .on_prompt_error(EMOTIONS, CompletionError::Transient("down".to_string()))
        .on_prompt_error(TOPICS, CompletionError::Transient("down".to_string()))
        .on_prompt_error(TENDENCIES, CompletionError::Transient("down".to_string()))
        .on_prompt_error(REFLECTION, CompletionError::Transient("down".to_string()));
    let ctx = TestContext::new(script);
    let alice = user("alice");

    let summary = ctx.orchestrator.import_entries(&alice, sample_entries()).await;

    assert_eq!(summary.imported, 3);
    let stored = ctx.orchestrator.store().entries(&alice).await.unwrap();
    assert!(stored.iter().all(|e| e.emotions.is_empty() && e.reflection_questions.is_empty()));
}

#[test]
fn test_read_import_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("old.csv");
    std::fs::write(
        &path,
        "date,title,content\n2024-09-01,Garden,\"Planted tomatoes, felt calm.\"\n",
    )
    .unwrap();

    let entries = read_import_file(&path).unwrap();
    assert_eq!(entries, vec![imported(1, "Garden", "Planted tomatoes, felt calm.")]);

    std::fs::write(&path, "date,title,content\nyesterday,Garden,text\n").unwrap();
    assert!(read_import_file(&path).is_err());
}

// ==================== RETRIEVAL ====================

#[tokio::test]
async fn test_search_ranks_related_entry_first() {
    let ctx = TestContext::new(with_analytics(ScriptedCompletion::new()));
    let alice = user("alice");
    ctx.orchestrator.import_entries(&alice, sample_entries()).await;

    let hits = ctx
        .orchestrator
        .store()
        .search_text(&alice, "quarterly report at the office", 2)
        .await
        .unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].metadata["title"], "Deadline");
    assert!(hits[0].score >= hits[1].score);
}

#[tokio::test]
async fn test_entries_and_index_survive_restart() {
    let ctx = TestContext::new(with_analytics(ScriptedCompletion::new()));
    let alice = user("alice");
    ctx.orchestrator.import_entries(&alice, sample_entries()).await;

    let store = ctx.reopened_store();

    assert_eq!(store.load_index_for_user(&alice).await.unwrap(), DIMENSION);
    assert_eq!(store.entries(&alice).await.unwrap().len(), 3);
    let hits = store.search_text(&alice, "river run", 1).await.unwrap();
    assert_eq!(hits[0].metadata["title"], "Run");
    assert_eq!(hits[0].metadata["key_topics"][0], "Studies");
    assert!(store.reconcile(&alice).await.unwrap().is_consistent());
}

#[tokio::test]
async fn test_rows_and_index_agree_on_each_entry() {
    let ctx = TestContext::new(with_analytics(ScriptedCompletion::new()));
    let alice = user("alice");
    ctx.orchestrator.import_entries(&alice, sample_entries()).await;

    let store = ctx.orchestrator.store();
    for entry in store.entries(&alice).await.unwrap() {
        let hits = store.search_text(&alice, &entry.content, 3).await.unwrap();
        let hit = hits.iter().find(|h| h.id == entry.id).unwrap();

        assert_eq!(hit.content, entry.content);
        assert_eq!(hit.metadata["id"], entry.id.as_str());
        assert_eq!(hit.metadata["title"], entry.title.as_str());
        assert_eq!(
            hit.metadata["date"],
            entry.date.format("%Y-%m-%d").to_string().as_str()
        );
    }
}

#[tokio::test]
async fn test_zero_k_search_is_empty() {
    let ctx = TestContext::new(with_analytics(ScriptedCompletion::new()));
    let alice = user("alice");
    ctx.orchestrator.import_entries(&alice, sample_entries()).await;

    let hits = ctx
        .orchestrator
        .store()
        .search_text(&alice, "anything", 0)
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_topic_search_widens_query_with_keywords() {
    let script = with_analytics(ScriptedCompletion::new()).on_prompt(KEYWORDS, "tomatoes, sister");
    let ctx = TestContext::new(script);
    let alice = user("alice");
    ctx.orchestrator.import_entries(&alice, sample_entries()).await;

    let hits = ctx
        .orchestrator
        .topic_search(&alice, "what did I do last weekend?", 1)
        .await
        .unwrap();

    assert_eq!(hits[0].metadata["title"], "Garden");
    assert_eq!(ctx.script.complete_call_count(KEYWORDS), 1);
}

#[tokio::test]
async fn test_topic_search_without_keywords_uses_raw_text() {
    let script = with_analytics(ScriptedCompletion::new())
        .on_prompt_error(KEYWORDS, CompletionError::Transient("down".to_string()));
    let ctx = TestContext::new(script);
    let alice = user("alice");
    ctx.orchestrator.import_entries(&alice, sample_entries()).await;

    let hits = ctx
        .orchestrator
        .topic_search(&alice, "river run", 1)
        .await
        .unwrap();

    assert_eq!(hits[0].metadata["title"], "Run");
}

// ==================== JOURNAL PROMPTS ====================

#[tokio::test]
async fn test_starter_questions_use_recent_entries() {
    let script = with_analytics(ScriptedCompletion::new()).on_prompt(
        STARTERS,
        "Questions:\n1. How is the garden?\n2. How did the report go?\n3. Still running?\n4. Who did you see?\n5. What made you smile?\n6. Extra?",
    );
    let ctx = TestContext::new(script);
    let alice = user("alice");
    ctx.orchestrator.import_entries(&alice, sample_entries()).await;

    let questions = ctx.orchestrator.starter_questions(&alice).await.unwrap();

    assert_eq!(questions.len(), 5);
    assert_eq!(questions[0], "How is the garden?");

    let calls = ctx.script.complete_calls.lock().unwrap().clone();
    let prompt = calls.iter().find(|p| p.contains(STARTERS)).unwrap();
    assert!(prompt.contains("Morning run by the river"));
}

#[tokio::test]
async fn test_starter_questions_for_new_user() {
    let script = ScriptedCompletion::new().on_prompt(STARTERS, "What brought you here today?");
    let ctx = TestContext::new(script);

    let questions = ctx.orchestrator.starter_questions(&user("newcomer")).await.unwrap();

    assert_eq!(questions, vec!["What brought you here today?"]);
    let calls = ctx.script.complete_calls.lock().unwrap().clone();
    assert!(calls[0].contains("No past entries yet."));
}

#[tokio::test]
async fn test_opening_question_follows_latest_entry() {
    let script = with_analytics(ScriptedCompletion::new())
        .on_prompt(OPENING, "  How are your legs after the run?  ");
    let ctx = TestContext::new(script);
    let alice = user("alice");

    assert_eq!(ctx.orchestrator.opening_question(&alice).await.unwrap(), None);
    assert_eq!(ctx.script.complete_call_count(OPENING), 0);

    ctx.orchestrator.import_entries(&alice, sample_entries()).await;
    let question = ctx.orchestrator.opening_question(&alice).await.unwrap();

    assert_eq!(question.as_deref(), Some("How are your legs after the run?"));
    let calls = ctx.script.complete_calls.lock().unwrap().clone();
    let prompt = calls.iter().find(|p| p.contains(OPENING)).unwrap();
    assert!(prompt.contains("Morning run by the river"));
}
