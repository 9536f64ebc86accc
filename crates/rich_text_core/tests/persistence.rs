use std::sync::{Arc, Mutex};

use anyhow::Result;
use manos_rich_text_core::value::to_json;
use manos_rich_text_core::{
    DEFAULT_STORAGE_KEY, Document, DocumentStore, Editor, EditorConfig, ElementKind, MemoryStore,
    Node, PluginRegistry, StoreError, load_document, save_document,
};

/// Records every save in a shared log so tests can inspect it after the
/// store has moved into the editor.
#[derive(Clone, Default)]
struct SharedStore {
    entries: Arc<Mutex<Vec<(String, String)>>>,
    initial: Option<String>,
}

impl SharedStore {
    fn saves(&self) -> Vec<(String, String)> {
        self.entries.lock().unwrap().clone()
    }
}

impl DocumentStore for SharedStore {
    fn load(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.initial.clone())
    }

    fn save(&mut self, key: &str, contents: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap()
            .push((key.to_string(), contents.to_string()));
        Ok(())
    }
}

struct BrokenStore;

impl DocumentStore for BrokenStore {
    fn load(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    fn save(&mut self, _key: &str, _contents: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("quota exceeded".to_string()))
    }
}

#[test]
fn empty_store_yields_the_seed_document() -> Result<()> {
    let store = MemoryStore::new();
    assert_eq!(load_document(&store, DEFAULT_STORAGE_KEY)?, Document::seed());
    Ok(())
}

#[test]
fn memory_store_round_trips_documents() -> Result<()> {
    let mut store = MemoryStore::new();
    let doc = Document::new(vec![
        Node::text_block(ElementKind::HeadingTwo, "Notes"),
        Node::paragraph("body"),
    ]);
    save_document(&mut store, "notes", &doc)?;

    assert_eq!(store.get("notes"), Some(to_json(&doc)?.as_str()));
    assert_eq!(load_document(&store, "notes")?, doc);
    Ok(())
}

#[test]
fn editor_saves_after_every_change() -> Result<()> {
    let store = SharedStore::default();
    let mut editor = Editor::from_store(
        Box::new(store.clone()),
        PluginRegistry::richtext(),
        EditorConfig::default(),
    )?;
    assert_eq!(editor.doc(), &Document::seed());
    assert!(store.saves().is_empty());

    editor.insert_text("Hello. ")?;
    let saves = store.saves();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].0, DEFAULT_STORAGE_KEY);
    assert_eq!(saves[0].1, to_json(editor.doc())?);

    editor.undo();
    assert_eq!(store.saves().len(), 2);
    assert_eq!(store.saves()[1].1, to_json(&Document::seed())?);
    Ok(())
}

#[test]
fn editor_reopens_what_it_saved() -> Result<()> {
    let config = EditorConfig {
        storage_key: "draft".to_string(),
        ..EditorConfig::default()
    };
    let mut editor = Editor::from_store(
        Box::new(MemoryStore::new()),
        PluginRegistry::richtext(),
        config.clone(),
    )?;
    editor.insert_text("Edited: ")?;
    let expected = editor.doc().clone();

    let store = editor.detach_store().expect("store attached");
    let json = store.load("draft")?.expect("document saved");
    let reopened = Editor::from_store(
        Box::new(MemoryStore::new().with_entry("draft", json)),
        PluginRegistry::richtext(),
        config,
    )?;
    assert_eq!(reopened.doc(), &expected);
    Ok(())
}

#[test]
fn storage_failures_do_not_roll_back_edits() -> Result<()> {
    let mut editor = Editor::from_store(
        Box::new(BrokenStore),
        PluginRegistry::richtext(),
        EditorConfig::default(),
    )?;
    editor.insert_text("kept ")?;
    assert!(editor.doc().plain_text().starts_with("kept "));
    assert!(editor.can_undo());

    assert!(matches!(editor.save(), Err(StoreError::Backend(_))));
    Ok(())
}

#[test]
fn corrupt_stored_documents_fail_to_open() {
    let store = MemoryStore::new().with_entry(DEFAULT_STORAGE_KEY, "{ not json");
    let result = Editor::from_store(
        Box::new(store),
        PluginRegistry::richtext(),
        EditorConfig::default(),
    );
    assert!(matches!(result, Err(StoreError::Value(_))));
}

#[test]
fn stored_kinds_must_have_a_plugin() {
    let json = r#"[{ "type": "heading-one", "children": [{ "text": "x" }] }]"#;
    let result = Editor::from_store(
        Box::new(MemoryStore::new().with_entry(DEFAULT_STORAGE_KEY, json)),
        PluginRegistry::core(),
        EditorConfig::default(),
    );
    assert!(matches!(result, Err(StoreError::Value(_))));
}

#[test]
fn attach_store_starts_persisting() -> Result<()> {
    let mut editor = Editor::with_core_plugins();
    assert!(editor.store().is_none());
    editor.insert_text("unsaved")?;

    let store = SharedStore::default();
    editor.attach_store(Box::new(store.clone()));
    editor.save()?;
    editor.insert_text("!")?;

    let saves = store.saves();
    assert_eq!(saves.len(), 2);
    assert_eq!(saves[1].1, to_json(editor.doc())?);
    Ok(())
}

#[test]
fn new_document_is_persisted() -> Result<()> {
    let store = SharedStore {
        initial: Some(r#"[{ "type": "paragraph", "children": [{ "text": "old" }] }]"#.to_string()),
        ..SharedStore::default()
    };
    let mut editor = Editor::from_store(
        Box::new(store.clone()),
        PluginRegistry::richtext(),
        EditorConfig::default(),
    )?;
    assert_eq!(editor.doc().plain_text(), "old");

    editor.reset(Document::new(vec![Node::paragraph("")]))?;
    assert_eq!(store.saves().len(), 1);
    assert_eq!(store.saves()[0].1, to_json(editor.doc())?);
    Ok(())
}
