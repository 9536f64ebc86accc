use std::collections::HashMap;

use crate::document::Document;
use crate::error::StoreError;
use crate::value;

pub trait DocumentStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn save(&mut self, key: &str, contents: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: impl Into<String>, contents: impl Into<String>) -> Self {
        self.entries.insert(key.into(), contents.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, contents: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), contents.to_string());
        Ok(())
    }
}

pub fn load_document(store: &dyn DocumentStore, key: &str) -> Result<Document, StoreError> {
    match store.load(key)? {
        Some(json) => Ok(value::from_json(&json)?),
        None => {
            tracing::debug!(key, "no stored document, using seed");
            Ok(Document::seed())
        }
    }
}

pub fn save_document(store: &mut dyn DocumentStore, key: &str, doc: &Document) -> Result<(), StoreError> {
    let json = value::to_json(doc)?;
    store.save(key, &json)
}
