use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::autoformat::AutoformatPlugin;
use crate::block_type::BlockTypePlugin;
use crate::document::{ChildConstraint, Document, ElementKind, Node, NodeRole};
use crate::editor::Editor;
use crate::error::{RegistryError, SchemaError, TransformError};
use crate::hotkey::{HotkeyAction, HotkeyBinding, TextShortcutsPlugin};
use crate::inline::{self, normalize_inline};
use crate::link::LinkPlugin;
use crate::marks::MarksPlugin;
use crate::ops::{Op, apply_ops};
use crate::range::Selection;

pub const DEFAULT_MAX_UNDO: usize = 200;
pub const DEFAULT_MAX_NORMALIZE_ITERATIONS: usize = 100;

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct QueryError {
    message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

type CommandHandler = dyn Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync;
type QueryHandler = dyn Fn(&Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync;

#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub args_example: Option<Value>,
    pub handler: Arc<CommandHandler>,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            keywords: Vec::new(),
            args_example: None,
            handler: Arc::new(handler),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn args_example(mut self, args_example: Value) -> Self {
        self.args_example = Some(args_example);
        self
    }
}

#[derive(Clone)]
pub struct QuerySpec {
    pub id: String,
    pub handler: Arc<QueryHandler>,
}

impl QuerySpec {
    pub fn new(
        id: impl Into<String>,
        handler: impl Fn(&Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            handler: Arc::new(handler),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub kind: ElementKind,
    pub role: NodeRole,
    pub children: ChildConstraint,
}

impl NodeSpec {
    pub fn of(kind: ElementKind) -> Self {
        Self {
            kind,
            role: kind.role(),
            children: kind.children(),
        }
    }
}

pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    fn run(&self, doc: &Document) -> Vec<Op>;
}

#[derive(Debug, Clone)]
pub struct TransactionPreview {
    pub doc: Document,
    pub selection: Selection,
    pub ops: Vec<Op>,
}

pub trait TransactionTransform: Send + Sync {
    fn id(&self) -> &'static str;
    fn transform(&self, editor: &Editor, tx: &crate::ops::Transaction) -> Option<crate::ops::Transaction>;
}

pub trait EditorPlugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn node_specs(&self) -> Vec<NodeSpec> {
        Vec::new()
    }
    fn transaction_transforms(&self) -> Vec<Box<dyn TransactionTransform>> {
        Vec::new()
    }
    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        Vec::new()
    }
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
    fn queries(&self) -> Vec<QuerySpec> {
        Vec::new()
    }
    fn hotkeys(&self) -> Vec<HotkeyBinding> {
        Vec::new()
    }
}

#[derive(Default)]
pub struct PluginRegistry {
    node_specs: HashMap<ElementKind, NodeSpec>,
    transaction_transforms: Vec<Box<dyn TransactionTransform>>,
    normalize_passes: Vec<Box<dyn NormalizePass>>,
    commands: HashMap<String, CommandSpec>,
    queries: HashMap<String, QuerySpec>,
    hotkeys: Vec<HotkeyBinding>,
}

impl PluginRegistry {
    pub fn new(plugins: impl IntoIterator<Item = Box<dyn EditorPlugin>>) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register_plugin(plugin)?;
        }
        Ok(registry)
    }

    pub fn core() -> Self {
        Self::new(core_plugins()).expect("core registry must be valid")
    }

    pub fn richtext() -> Self {
        let mut plugins = core_plugins();
        plugins.extend([
            Box::new(MarksPlugin) as Box<dyn EditorPlugin>,
            Box::new(BlockTypePlugin),
            Box::new(AutoformatPlugin),
            Box::new(LinkPlugin),
            Box::new(TextShortcutsPlugin),
        ]);
        Self::new(plugins).expect("richtext registry must be valid")
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn EditorPlugin>) -> Result<(), RegistryError> {
        for spec in plugin.node_specs() {
            if self.node_specs.contains_key(&spec.kind) {
                return Err(RegistryError::DuplicateKind(spec.kind));
            }
            self.node_specs.insert(spec.kind, spec);
        }

        self.transaction_transforms.extend(plugin.transaction_transforms());
        self.normalize_passes.extend(plugin.normalize_passes());

        for cmd in plugin.commands() {
            if self.commands.contains_key(&cmd.id) {
                return Err(RegistryError::DuplicateCommand(cmd.id));
            }
            self.commands.insert(cmd.id.clone(), cmd);
        }

        for query in plugin.queries() {
            if self.queries.contains_key(&query.id) {
                return Err(RegistryError::DuplicateQuery(query.id));
            }
            self.queries.insert(query.id.clone(), query);
        }

        self.hotkeys.extend(plugin.hotkeys());
        tracing::debug!(plugin = plugin.id(), "registered editor plugin");
        Ok(())
    }

    pub fn node_specs(&self) -> &HashMap<ElementKind, NodeSpec> {
        &self.node_specs
    }

    pub fn transaction_transforms(&self) -> &[Box<dyn TransactionTransform>] {
        &self.transaction_transforms
    }

    pub fn normalize_passes(&self) -> &[Box<dyn NormalizePass>] {
        &self.normalize_passes
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }

    pub fn queries(&self) -> &HashMap<String, QuerySpec> {
        &self.queries
    }

    pub fn query(&self, id: &str) -> Option<QuerySpec> {
        self.queries.get(id).cloned()
    }

    pub fn hotkeys(&self) -> &[HotkeyBinding] {
        &self.hotkeys
    }

    pub fn is_known_kind(&self, kind: ElementKind) -> bool {
        self.node_specs.contains_key(&kind)
    }

    pub fn check_document(&self, doc: &Document) -> Result<(), SchemaError> {
        doc.validate()?;
        fn walk(children: &[Node], registry: &PluginRegistry) -> Result<(), SchemaError> {
            for node in children {
                if let Node::Element(el) = node {
                    if !registry.is_known_kind(el.kind) {
                        return Err(SchemaError::UnknownKind(el.kind));
                    }
                    walk(&el.children, registry)?;
                }
            }
            Ok(())
        }
        walk(&doc.children, self)
    }
}

fn core_plugins() -> Vec<Box<dyn EditorPlugin>> {
    vec![
        Box::new(CoreBlocksPlugin),
        Box::new(CoreNormalizePlugin),
        Box::new(HistoryPlugin),
    ]
}

pub fn core_normalize_passes() -> Vec<Box<dyn NormalizePass>> {
    vec![
        Box::new(EnsureNonEmptyDocument),
        Box::new(RemoveEmptyContainers),
        Box::new(NormalizeInlineContent),
    ]
}

#[derive(Debug, Default)]
pub(crate) struct Normalized {
    pub applied: Vec<Op>,
    pub inverse: Vec<Op>,
}

/// Runs the passes until none produces ops. Each pass sees the document left
/// by the previous one, and any change restarts the round.
pub(crate) fn normalize_document(
    passes: &[Box<dyn NormalizePass>],
    doc: &mut Document,
    selection: &mut Selection,
    max_iterations: usize,
) -> Result<Normalized, TransformError> {
    let mut out = Normalized::default();
    'round: for _ in 0..max_iterations {
        for pass in passes {
            let ops = pass.run(doc);
            if ops.is_empty() {
                continue;
            }
            tracing::trace!(pass = pass.id(), ops = ops.len(), "normalize pass produced ops");
            out.inverse.extend(apply_ops(doc, selection, ops.clone())?);
            out.applied.extend(ops);
            continue 'round;
        }
        return Ok(out);
    }
    Err(TransformError::NormalizeDidNotConverge(max_iterations))
}

pub(crate) fn run_edit(action: &str, result: Result<(), TransformError>) -> Result<(), CommandError> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.is_precondition() => {
            tracing::debug!(action, %err, "command skipped");
            Ok(())
        }
        Err(err) => Err(CommandError::new(format!("Failed to {action}: {err}"))),
    }
}

pub(crate) fn string_arg(args: Option<&Value>, key: &str) -> Result<String, CommandError> {
    args.and_then(|args| args.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CommandError::new(format!("Missing string argument: {key}")))
}

struct CoreBlocksPlugin;

impl EditorPlugin for CoreBlocksPlugin {
    fn id(&self) -> &'static str {
        "core.blocks"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![
            NodeSpec::of(ElementKind::Paragraph),
            NodeSpec::of(ElementKind::Default),
        ]
    }
}

struct CoreNormalizePlugin;

impl EditorPlugin for CoreNormalizePlugin {
    fn id(&self) -> &'static str {
        "core.normalize"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        core_normalize_passes()
    }
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_document"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        if doc.children.is_empty() {
            return vec![Op::InsertNode {
                path: vec![0],
                node: Node::paragraph(""),
            }];
        }
        Vec::new()
    }
}

struct RemoveEmptyContainers;

impl NormalizePass for RemoveEmptyContainers {
    fn id(&self) -> &'static str {
        "core.remove_empty_containers"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        fn walk(children: &[Node], path: &mut Vec<usize>, out: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };
                if !el.kind.is_container() {
                    continue;
                }
                path.push(ix);
                if el.children.is_empty() {
                    out.push(Op::RemoveNode { path: path.clone() });
                } else {
                    walk(&el.children, path, out);
                }
                path.pop();
            }
        }

        let mut ops = Vec::new();
        walk(&doc.children, &mut Vec::new(), &mut ops);
        ops.reverse();
        ops
    }
}

struct NormalizeInlineContent;

impl NormalizePass for NormalizeInlineContent {
    fn id(&self) -> &'static str {
        "core.normalize_inline_content"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        doc.text_blocks()
            .into_iter()
            .filter_map(|(path, block)| {
                let children = &block.element.children;
                let fallback = inline::leaves(children)
                    .first()
                    .map(|leaf| leaf.text.marks)
                    .unwrap_or_default();
                let normalized = normalize_inline(children.clone(), fallback);
                (&normalized != children).then(|| Op::ReplaceChildren {
                    path,
                    children: normalized,
                })
            })
            .collect()
    }
}

struct HistoryPlugin;

impl EditorPlugin for HistoryPlugin {
    fn id(&self) -> &'static str {
        "history"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("history.undo", "Undo", |editor, _args| {
                editor.undo();
                Ok(())
            })
            .description("Revert the most recent edit.")
            .keywords(["undo", "history"]),
            CommandSpec::new("history.redo", "Redo", |editor, _args| {
                editor.redo();
                Ok(())
            })
            .description("Re-apply the most recently undone edit.")
            .keywords(["redo", "history"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![
            QuerySpec::new("history.can_undo", |editor, _args| {
                Ok(Value::Bool(editor.can_undo()))
            }),
            QuerySpec::new("history.can_redo", |editor, _args| {
                Ok(Value::Bool(editor.can_redo()))
            }),
        ]
    }

    fn hotkeys(&self) -> Vec<HotkeyBinding> {
        vec![
            HotkeyBinding::new("mod+z", HotkeyAction::command("history.undo")),
            HotkeyBinding::new("mod+shift+z", HotkeyAction::command("history.redo")),
            HotkeyBinding::new("mod+y", HotkeyAction::command("history.redo")),
        ]
    }
}
