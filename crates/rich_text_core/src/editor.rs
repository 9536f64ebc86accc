use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{Document, Marks};
use crate::error::{SchemaError, StoreError, TransformError, ValueError};
use crate::hotkey::{HotkeyAction, HotkeyMap, Platform};
use crate::inline::{Bias, block_text, inline_len, locate, point_at};
use crate::ops::{Op, Transaction, apply_ops};
use crate::plugin::{
    CommandError, DEFAULT_MAX_NORMALIZE_ITERATIONS, DEFAULT_MAX_UNDO, PluginRegistry, QueryError,
    TransactionPreview, normalize_document,
};
use crate::range::{Point, Selection, normalize_selection};
use crate::store::{DocumentStore, load_document, save_document};
use crate::transforms::{plan_delete_range, plan_insert_marked_text, plan_insert_text, plan_split_block};

pub const INSERT_TEXT_SOURCE: &str = "input:insert_text";
pub const INSERT_BREAK_SOURCE: &str = "input:insert_break";
pub const DELETE_BACKWARD_SOURCE: &str = "input:delete_backward";
pub const DELETE_FORWARD_SOURCE: &str = "input:delete_forward";
pub const DELETE_FRAGMENT_SOURCE: &str = "input:delete_fragment";

pub const DEFAULT_STORAGE_KEY: &str = "content";

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub inverse_ops: Vec<Op>,
    pub selection_before: Selection,
    pub selection_after: Selection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub max_undo: usize,
    pub max_normalize_iterations: usize,
    pub storage_key: String,
    pub platform: Platform,
    pub hotkeys: BTreeMap<String, HotkeyAction>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_undo: DEFAULT_MAX_UNDO,
            max_normalize_iterations: DEFAULT_MAX_NORMALIZE_ITERATIONS,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            platform: Platform::current(),
            hotkeys: BTreeMap::new(),
        }
    }
}

impl EditorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(json).map(Self::with_defaults)
    }

    fn with_defaults(mut self) -> Self {
        if self.max_undo == 0 {
            self.max_undo = DEFAULT_MAX_UNDO;
        }
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = DEFAULT_MAX_NORMALIZE_ITERATIONS;
        }
        if self.storage_key.is_empty() {
            self.storage_key = DEFAULT_STORAGE_KEY.to_string();
        }
        self
    }
}

pub struct Editor {
    doc: Document,
    selection: Selection,
    pub(crate) stored_marks: Option<Marks>,
    registry: PluginRegistry,
    pub(crate) hotkeys: HotkeyMap,
    config: EditorConfig,
    undo_stack: Vec<UndoRecord>,
    redo_stack: Vec<UndoRecord>,
    store: Option<Box<dyn DocumentStore + Send>>,
}

impl Editor {
    pub fn new(doc: Document, selection: Selection, registry: PluginRegistry) -> Self {
        Self::with_config(doc, selection, registry, EditorConfig::default())
    }

    pub fn with_config(
        doc: Document,
        selection: Selection,
        registry: PluginRegistry,
        config: EditorConfig,
    ) -> Self {
        let config = config.with_defaults();
        let hotkeys = HotkeyMap::build(registry.hotkeys(), &config.hotkeys, config.platform);
        let mut editor = Self {
            doc,
            selection,
            stored_marks: None,
            registry,
            hotkeys,
            config,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            store: None,
        };
        editor.normalize_in_place();
        editor
    }

    pub fn with_core_plugins() -> Self {
        let doc = Document::new(vec![crate::document::Node::paragraph("")]);
        let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
        Self::new(doc, selection, PluginRegistry::core())
    }

    pub fn with_richtext_plugins() -> Self {
        let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
        Self::new(Document::seed(), selection, PluginRegistry::richtext())
    }

    pub fn from_store(
        store: Box<dyn DocumentStore + Send>,
        registry: PluginRegistry,
        config: EditorConfig,
    ) -> Result<Self, StoreError> {
        let config = config.with_defaults();
        let doc = load_document(&*store, &config.storage_key)?;
        registry.check_document(&doc).map_err(ValueError::from)?;
        let selection = Selection::collapsed(doc.start_point().unwrap_or_else(|| Point::new(vec![0, 0], 0)));
        let mut editor = Self::with_config(doc, selection, registry, config);
        editor.store = Some(store);
        Ok(editor)
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        let selection = normalize_selection(&self.doc, &selection);
        self.update_selection(selection);
    }

    pub fn stored_marks(&self) -> Option<Marks> {
        self.stored_marks
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo(&mut self) -> bool {
        let Some(record) = self.undo_stack.pop() else {
            return false;
        };
        match self.replay(&record.inverse_ops) {
            Ok((doc, redo_ops)) => {
                self.doc = doc;
                let selection = normalize_selection(&self.doc, &record.selection_before);
                self.update_selection(selection);
                self.redo_stack.push(UndoRecord {
                    inverse_ops: redo_ops,
                    ..record
                });
                self.persist();
                true
            }
            Err(err) => {
                tracing::warn!(%err, "failed to undo, dropping history entry");
                false
            }
        }
    }

    pub fn redo(&mut self) -> bool {
        let Some(record) = self.redo_stack.pop() else {
            return false;
        };
        match self.replay(&record.inverse_ops) {
            Ok((doc, undo_ops)) => {
                self.doc = doc;
                let selection = normalize_selection(&self.doc, &record.selection_after);
                self.update_selection(selection);
                self.undo_stack.push(UndoRecord {
                    inverse_ops: undo_ops,
                    ..record
                });
                self.persist();
                true
            }
            Err(err) => {
                tracing::warn!(%err, "failed to redo, dropping history entry");
                false
            }
        }
    }

    /// Applies a transaction atomically. On error the document and selection
    /// are unchanged.
    pub fn apply(&mut self, tx: Transaction) -> Result<(), TransformError> {
        let tx = self.transform_transaction(tx);
        let selection_before = self.selection.clone();
        let mut doc = self.doc.clone();
        let mut selection = self.selection.clone();

        let mut inverse_ops = apply_ops(&mut doc, &mut selection, tx.ops)?;
        if let Some(sel) = tx.selection_after {
            selection = sel;
        }
        let normalized = normalize_document(
            self.registry.normalize_passes(),
            &mut doc,
            &mut selection,
            self.config.max_normalize_iterations,
        )?;
        inverse_ops.extend(normalized.inverse);
        inverse_ops.reverse();
        let selection = normalize_selection(&doc, &selection);

        if inverse_ops.is_empty() {
            self.update_selection(selection);
            return Ok(());
        }

        let op_count = inverse_ops.len();
        self.doc = doc;
        self.update_selection(selection);
        self.undo_stack.push(UndoRecord {
            inverse_ops,
            selection_before,
            selection_after: self.selection.clone(),
        });
        self.redo_stack.clear();
        if self.undo_stack.len() > self.config.max_undo {
            self.undo_stack.remove(0);
        }
        tracing::debug!(
            source = tx.meta.source.as_deref().unwrap_or("unknown"),
            ops = op_count,
            "applied transaction"
        );
        self.persist();
        Ok(())
    }

    fn transform_transaction(&self, mut tx: Transaction) -> Transaction {
        for transform in self.registry.transaction_transforms() {
            if let Some(next) = transform.transform(self, &tx) {
                tracing::debug!(transform = transform.id(), "transaction rewritten");
                tx = next;
            }
        }
        tx
    }

    pub fn preview_transaction(&self, tx: &Transaction) -> Result<TransactionPreview, TransformError> {
        let mut doc = self.doc.clone();
        let mut selection = self.selection.clone();

        apply_ops(&mut doc, &mut selection, tx.ops.iter().cloned())?;
        if let Some(sel) = &tx.selection_after {
            selection = sel.clone();
        }
        let normalized = normalize_document(
            self.registry.normalize_passes(),
            &mut doc,
            &mut selection,
            self.config.max_normalize_iterations,
        )?;

        let mut ops = tx.ops.clone();
        ops.extend(normalized.applied);
        let selection = normalize_selection(&doc, &selection);
        Ok(TransactionPreview { doc, selection, ops })
    }

    pub fn run_command(&mut self, id: &str, args: Option<Value>) -> Result<(), CommandError> {
        let Some(command) = self.registry.command(id) else {
            return Err(CommandError::new(format!("Unknown command: {id}")));
        };
        (command.handler)(self, args)
    }

    pub fn run_query_json(&self, id: &str, args: Option<Value>) -> Result<Value, QueryError> {
        let Some(query) = self.registry.query(id) else {
            return Err(QueryError::new(format!("Unknown query: {id}")));
        };
        (query.handler)(self, args)
    }

    pub fn run_query<T>(&self, id: &str, args: Option<Value>) -> Result<T, QueryError>
    where
        T: DeserializeOwned,
    {
        let value = self.run_query_json(id, args)?;
        serde_json::from_value(value)
            .map_err(|err| QueryError::new(format!("Failed to decode query result: {err}")))
    }

    pub fn reset(&mut self, doc: Document) -> Result<(), SchemaError> {
        self.registry.check_document(&doc)?;
        self.doc = doc;
        self.selection = Selection::collapsed(self.doc.start_point().unwrap_or_else(|| Point::new(vec![0, 0], 0)));
        self.normalize_in_place();
        self.stored_marks = None;
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.persist();
        Ok(())
    }

    pub fn insert_text(&mut self, text: &str) -> Result<(), TransformError> {
        if text.is_empty() {
            return Ok(());
        }
        if !self.selection.is_collapsed() && crate::link::is_url(text) {
            match self.insert_link(text) {
                Err(err) if err.is_precondition() => {}
                other => return other,
            }
        }

        let (mut ops, doc, point) = self.clear_selection_preview()?;
        let (insert_ops, caret) = match self.stored_marks {
            Some(marks) => plan_insert_marked_text(&doc, &point, text, marks)?,
            None => plan_insert_text(&doc, &point, text)?,
        };
        ops.extend(insert_ops);
        self.apply(
            Transaction::new(ops)
                .selection_after(Selection::collapsed(caret))
                .source(INSERT_TEXT_SOURCE),
        )
    }

    pub fn insert_break(&mut self) -> Result<(), TransformError> {
        let (mut ops, doc, point) = self.clear_selection_preview()?;
        let (split_ops, caret) = plan_split_block(&doc, &point)?;
        ops.extend(split_ops);
        self.apply(
            Transaction::new(ops)
                .selection_after(Selection::collapsed(caret))
                .source(INSERT_BREAK_SOURCE),
        )
    }

    pub fn delete_selection(&mut self) -> Result<(), TransformError> {
        self.delete_with_source(self.selection.clone(), DELETE_FRAGMENT_SOURCE)
    }

    pub fn delete_backward(&mut self) -> Result<(), TransformError> {
        if !self.selection.is_collapsed() {
            return self.delete_with_source(self.selection.clone(), DELETE_BACKWARD_SOURCE);
        }
        let focus = self.selection.focus.clone();
        let at = locate(&self.doc, &focus)?;
        let start = if at.global > 0 {
            let text = block_text(&at.block.children);
            let step = text[..at.global].chars().next_back().map_or(0, char::len_utf8);
            Some(point_at(&at.block_path, &at.block.children, at.global - step, Bias::Forward))
        } else {
            let blocks = self.doc.text_blocks();
            blocks
                .iter()
                .position(|(path, _)| *path == at.block_path)
                .and_then(|ix| ix.checked_sub(1))
                .map(|ix| {
                    let (path, prev) = &blocks[ix];
                    let children = &prev.element.children;
                    point_at(path, children, inline_len(children), Bias::Backward)
                })
        };
        // Still dispatched without a target so transforms can react.
        let range = Selection::new(start.unwrap_or_else(|| focus.clone()), focus);
        self.delete_with_source(range, DELETE_BACKWARD_SOURCE)
    }

    pub fn delete_forward(&mut self) -> Result<(), TransformError> {
        if !self.selection.is_collapsed() {
            return self.delete_with_source(self.selection.clone(), DELETE_FORWARD_SOURCE);
        }
        let focus = self.selection.focus.clone();
        let at = locate(&self.doc, &focus)?;
        let len = inline_len(&at.block.children);
        let end = if at.global < len {
            let text = block_text(&at.block.children);
            let step = text[at.global..].chars().next().map_or(0, char::len_utf8);
            Some(point_at(&at.block_path, &at.block.children, at.global + step, Bias::Backward))
        } else {
            let blocks = self.doc.text_blocks();
            blocks
                .iter()
                .position(|(path, _)| *path == at.block_path)
                .and_then(|ix| blocks.get(ix + 1))
                .map(|(path, next)| point_at(path, &next.element.children, 0, Bias::Forward))
        };
        let range = Selection::new(focus.clone(), end.unwrap_or(focus));
        self.delete_with_source(range, DELETE_FORWARD_SOURCE)
    }

    fn delete_with_source(&mut self, range: Selection, source: &str) -> Result<(), TransformError> {
        let (ops, caret) = plan_delete_range(&self.doc, &range)?;
        self.apply(
            Transaction::new(ops)
                .selection_after(Selection::collapsed(caret))
                .source(source),
        )
    }

    fn clear_selection_preview(&self) -> Result<(Vec<Op>, Document, Point), TransformError> {
        let mut doc = self.doc.clone();
        if self.selection.is_collapsed() {
            return Ok((Vec::new(), doc, self.selection.focus.clone()));
        }
        let (ops, caret) = plan_delete_range(&self.doc, &self.selection)?;
        let mut scratch = Selection::collapsed(caret.clone());
        apply_ops(&mut doc, &mut scratch, ops.iter().cloned())?;
        Ok((ops, doc, caret))
    }

    pub fn attach_store(&mut self, store: Box<dyn DocumentStore + Send>) {
        self.store = Some(store);
    }

    pub fn detach_store(&mut self) -> Option<Box<dyn DocumentStore + Send>> {
        self.store.take()
    }

    pub fn store(&self) -> Option<&(dyn DocumentStore + Send)> {
        self.store.as_deref()
    }

    pub fn save(&mut self) -> Result<(), StoreError> {
        match self.store.as_mut() {
            Some(store) => save_document(&mut **store, &self.config.storage_key, &self.doc),
            None => Ok(()),
        }
    }

    // Storage failures never roll back an edit.
    fn persist(&mut self) {
        if let Err(err) = self.save() {
            tracing::warn!(%err, key = %self.config.storage_key, "failed to persist document");
        }
    }

    fn update_selection(&mut self, selection: Selection) {
        if selection != self.selection {
            self.stored_marks = None;
        }
        self.selection = selection;
    }

    fn replay(&self, ops: &[Op]) -> Result<(Document, Vec<Op>), TransformError> {
        let mut doc = self.doc.clone();
        let mut scratch = self.selection.clone();
        let mut inverse = apply_ops(&mut doc, &mut scratch, ops.iter().cloned())?;
        inverse.reverse();
        Ok((doc, inverse))
    }

    fn normalize_in_place(&mut self) {
        let mut selection = self.selection.clone();
        if let Err(err) = normalize_document(
            self.registry.normalize_passes(),
            &mut self.doc,
            &mut selection,
            self.config.max_normalize_iterations,
        ) {
            tracing::warn!(%err, "document did not normalize");
        }
        self.selection = normalize_selection(&self.doc, &selection);
    }
}
