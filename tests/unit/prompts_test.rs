use journal_companion::prompts::{self, PromptError};

#[test]
fn test_library_has_unique_names() {
    let templates = prompts::all();
    let mut names: Vec<&str> = templates.iter().map(|t| t.name()).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), templates.len());
}

#[test]
fn test_every_template_renders_with_its_declared_slots() {
    for template in prompts::all() {
        let values: Vec<(&str, &str)> = template
            .input_variables()
            .iter()
            .map(|slot| (*slot, "VALUE"))
            .collect();

        let rendered = template.format(&values).unwrap();
        assert!(!rendered.contains('{') || rendered.contains("{\""), "{}", template.name());
        if !template.input_variables().is_empty() {
            assert!(rendered.contains("VALUE"), "{}", template.name());
        }
    }
}

#[test]
fn test_tagging_templates_embed_vocabulary() {
    let rendered = prompts::emotions_template()
        .format(&[("entry_content", "I slept badly"), ("emotions", "Fear, Hope")])
        .unwrap();

    assert!(rendered.contains("I slept badly"));
    assert!(rendered.contains("Fear, Hope"));
}

#[test]
fn test_label_template_keeps_literal_json_braces() {
    let rendered = prompts::label_extraction_template()
        .format(&[("transcript", "I felt tired")])
        .unwrap();

    assert!(rendered.contains(r#"{"emotions_experienced": string or null"#));
    assert!(rendered.ends_with("I felt tired"));
}

#[test]
fn test_missing_slot_names_template() {
    let err = prompts::topic_query_template()
        .format(&[("user_chat", "hello")])
        .unwrap_err();

    assert_eq!(
        err,
        PromptError::MissingSlot {
            template: "topic_query",
            slot: "topics".to_string(),
        }
    );
}
