use serde_json::Value;

use crate::document::{Document, ElementKind};
use crate::editor::Editor;
use crate::error::TransformError;
use crate::ops::{Op, Transaction};
use crate::plugin::{
    CommandError, CommandSpec, EditorPlugin, NodeSpec, NormalizePass, QueryError, QuerySpec, run_edit,
    string_arg,
};
use crate::transforms::{NodeProps, plan_node_updates, repair_lists, spanned_blocks};

fn block_target(kind: ElementKind) -> Result<ElementKind, TransformError> {
    match kind {
        ElementKind::BulletedList => Ok(ElementKind::ListItem),
        ElementKind::Link => Err(TransformError::InvalidRange(
            "link is an inline element, not a block type".to_string(),
        )),
        other => Ok(other),
    }
}

impl Editor {
    pub fn active_block_kind(&self) -> Option<ElementKind> {
        let path = self.doc().text_block_of(&self.selection().focus.path)?;
        self.doc().element_at(&path).ok().map(|el| el.kind)
    }

    pub fn is_block_active(&self, kind: ElementKind) -> bool {
        let Ok(kind) = block_target(kind) else {
            return false;
        };
        spanned_blocks(self.doc(), self.selection())
            .map(|spans| spans.iter().any(|span| span.block.kind == kind))
            .unwrap_or(false)
    }

    pub fn toggle_block_type(&mut self, kind: ElementKind) -> Result<(), TransformError> {
        let target = block_target(kind)?;
        let updates = spanned_blocks(self.doc(), self.selection())?
            .into_iter()
            .map(|span| {
                let next = if span.block.kind == target {
                    ElementKind::Paragraph
                } else {
                    target
                };
                (span.path, NodeProps::kind(next))
            })
            .collect();
        let ops = plan_node_updates(self.doc(), updates)?;
        if ops.is_empty() {
            return Ok(());
        }
        self.apply(Transaction::new(ops).source(format!("command:block.toggle.{target}")))
    }
}

pub(crate) struct BlockTypePlugin;

impl EditorPlugin for BlockTypePlugin {
    fn id(&self) -> &'static str {
        "block_type"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        [
            ElementKind::HeadingOne,
            ElementKind::HeadingTwo,
            ElementKind::HeadingThree,
            ElementKind::HeadingFour,
            ElementKind::HeadingFive,
            ElementKind::HeadingSix,
            ElementKind::BlockQuote,
            ElementKind::BulletedList,
            ElementKind::ListItem,
            ElementKind::Code,
        ]
        .into_iter()
        .map(NodeSpec::of)
        .collect()
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(RepairListStructure)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("block.toggle", "Toggle block type", |editor, args| {
                let name = string_arg(args.as_ref(), "kind")?;
                let kind = name.parse::<ElementKind>().map_err(CommandError::new)?;
                run_edit(&format!("toggle {kind}"), editor.toggle_block_type(kind))
            })
            .description("Toggle the selected blocks between args.kind and paragraph.")
            .keywords(["heading", "quote", "list", "code", "paragraph", "block"])
            .args_example(serde_json::json!({ "kind": "heading-one" })),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![
            QuerySpec::new("block.active_kind", |editor, _args| {
                match editor.active_block_kind() {
                    Some(kind) => serde_json::to_value(kind)
                        .map_err(|err| QueryError::new(format!("Failed to encode kind: {err}"))),
                    None => Ok(Value::Null),
                }
            }),
            QuerySpec::new("block.is_active", |editor, args| {
                let name = args
                    .as_ref()
                    .and_then(|args| args.get("kind"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| QueryError::new("Missing string argument: kind"))?;
                let kind = name.parse::<ElementKind>().map_err(QueryError::new)?;
                Ok(Value::Bool(editor.is_block_active(kind)))
            }),
        ]
    }
}

struct RepairListStructure;

impl NormalizePass for RepairListStructure {
    fn id(&self) -> &'static str {
        "block_type.repair_list_structure"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        repair_lists(&doc.children)
            .map(|children| {
                vec![Op::ReplaceChildren {
                    path: Vec::new(),
                    children,
                }]
            })
            .unwrap_or_default()
    }
}
