use manos_rich_text_core::{
    CommandSpec, Document, Editor, EditorPlugin, ElementKind, MarkFormat, Marks, Node, NodeSpec,
    PluginRegistry, Point, QuerySpec, RegistryError, Selection,
};
use serde_json::{Value, json};

fn editor_with_text(text: &str) -> Editor {
    Editor::new(
        Document::new(vec![Node::paragraph(text)]),
        Selection::new(Point::new(vec![0, 0], 0), Point::new(vec![0, 0], text.len())),
        PluginRegistry::richtext(),
    )
}

#[test]
fn marks_queries_report_the_selection() {
    let mut editor = editor_with_text("abc");

    let bold_active: bool = editor.run_query("marks.is_bold_active", None).unwrap();
    assert!(!bold_active);

    editor.run_command("marks.toggle_bold", None).unwrap();
    editor.run_command("marks.toggle_code", None).unwrap();

    let bold_active: bool = editor.run_query("marks.is_bold_active", None).unwrap();
    assert!(bold_active);
    let marks: Marks = editor.run_query("marks.get_active", None).unwrap();
    assert_eq!(
        marks,
        Marks::default()
            .with(MarkFormat::Bold, true)
            .with(MarkFormat::Code, true)
    );
    assert_eq!(
        editor.run_query_json("marks.get_active", None).unwrap(),
        json!({ "bold": true, "code": true })
    );
}

#[test]
fn unknown_ids_are_errors() {
    let mut editor = editor_with_text("abc");
    let err = editor.run_command("marks.toggle_strike", None).unwrap_err();
    assert_eq!(err.message(), "Unknown command: marks.toggle_strike");

    let err = editor.run_query_json("marks.is_strike_active", None).unwrap_err();
    assert_eq!(err.message(), "Unknown query: marks.is_strike_active");

    let err = editor
        .run_command("marks.toggle", Some(json!({ "format": "strike" })))
        .unwrap_err();
    assert!(err.message().contains("strike"));
}

#[test]
fn typed_query_results_must_decode() {
    let editor = editor_with_text("abc");
    let err = editor.run_query::<String>("marks.is_bold_active", None).unwrap_err();
    assert!(err.message().starts_with("Failed to decode query result"));
}

#[test]
fn registry_lists_plugin_contributions() {
    let registry = PluginRegistry::richtext();
    for id in [
        "history.undo",
        "history.redo",
        "marks.toggle_bold",
        "marks.toggle_italic",
        "marks.toggle_underline",
        "marks.toggle_code",
        "block.toggle",
        "link.insert",
        "link.remove",
    ] {
        assert!(registry.command(id).is_some(), "missing command {id}");
    }
    for kind in ElementKind::ALL {
        assert!(registry.is_known_kind(kind), "missing node spec for {kind}");
    }

    let core = PluginRegistry::core();
    assert!(core.is_known_kind(ElementKind::Paragraph));
    assert!(!core.is_known_kind(ElementKind::Link));
    assert!(core.command("marks.toggle_bold").is_none());

    let bold = registry.command("marks.toggle_bold").unwrap();
    assert_eq!(bold.label, "Toggle bold");
    assert!(bold.keywords.iter().any(|k| k == "bold"));
}

struct WordCountPlugin;

impl EditorPlugin for WordCountPlugin {
    fn id(&self) -> &'static str {
        "word_count"
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("word_count.words", |editor, _args| {
            Ok(json!(editor.doc().plain_text().split_whitespace().count()))
        })]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![CommandSpec::new("word_count.clear", "Clear document", |editor, _args| {
            editor
                .reset(Document::new(vec![Node::paragraph("")]))
                .map_err(|err| manos_rich_text_core::CommandError::new(err.to_string()))
        })]
    }
}

#[test]
fn custom_plugins_extend_the_registry() {
    let mut registry = PluginRegistry::richtext();
    registry.register_plugin(Box::new(WordCountPlugin)).unwrap();

    let mut editor = Editor::new(
        Document::new(vec![Node::paragraph("one two three")]),
        Selection::collapsed(Point::new(vec![0, 0], 0)),
        registry,
    );
    let words: usize = editor.run_query("word_count.words", None).unwrap();
    assert_eq!(words, 3);

    editor.run_command("word_count.clear", None).unwrap();
    assert_eq!(editor.run_query_json("word_count.words", None).unwrap(), Value::from(0));
}

struct DuplicateParagraph;

impl EditorPlugin for DuplicateParagraph {
    fn id(&self) -> &'static str {
        "duplicate_paragraph"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec::of(ElementKind::Paragraph)]
    }
}

#[test]
fn duplicate_registrations_are_rejected() {
    let mut registry = PluginRegistry::core();
    assert_eq!(
        registry.register_plugin(Box::new(DuplicateParagraph)).unwrap_err(),
        RegistryError::DuplicateKind(ElementKind::Paragraph)
    );
    assert!(PluginRegistry::new([
        Box::new(WordCountPlugin) as Box<dyn EditorPlugin>,
        Box::new(WordCountPlugin),
    ])
    .is_err());
}
