use serde_json::Value;
use url::Url;

use crate::document::{ElementKind, ElementNode};
use crate::editor::Editor;
use crate::error::TransformError;
use crate::inline::{self, locate};
use crate::ops::Transaction;
use crate::plugin::{CommandSpec, EditorPlugin, NodeSpec, QuerySpec, run_edit, string_arg};
use crate::range::Selection;
use crate::transforms::{covered_leaves, plan_unwrap_inline, plan_wrap_inline};

pub fn is_url(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() || text.contains(char::is_whitespace) {
        return false;
    }
    Url::parse(text).is_ok_and(|url| url.has_host())
}

fn is_link(el: &ElementNode) -> bool {
    el.kind == ElementKind::Link
}

impl Editor {
    pub fn active_link(&self) -> Option<&ElementNode> {
        let selection = self.selection();
        if selection.is_collapsed() {
            let at = locate(self.doc(), &selection.focus).ok()?;
            let rel = &selection.focus.path[at.block_path.len()..];
            return inline::leaves(&at.block.children)
                .into_iter()
                .find(|leaf| leaf.rel_path() == rel)
                .and_then(|leaf| leaf.parent)
                .filter(|el| is_link(el));
        }
        covered_leaves(self.doc(), selection)
            .ok()?
            .into_iter()
            .find_map(|leaf| leaf.parent.filter(|el| is_link(el)))
    }

    pub fn is_link_active(&self) -> bool {
        self.active_link().is_some()
    }

    pub fn insert_link(&mut self, url: &str) -> Result<(), TransformError> {
        if self.selection().is_collapsed() {
            return Err(TransformError::EmptySelection);
        }
        if self.is_link_active() {
            return Err(TransformError::NestedLink);
        }
        let (ops, after) = plan_wrap_inline(self.doc(), self.selection(), &ElementNode::link_template(url))?;
        self.apply(
            Transaction::new(ops)
                .selection_after(Selection::collapsed(after))
                .source("command:link.insert"),
        )
    }

    pub fn unwrap_link(&mut self) -> Result<(), TransformError> {
        let ops = plan_unwrap_inline(self.doc(), self.selection(), &is_link)?;
        if ops.is_empty() {
            return Ok(());
        }
        self.apply(Transaction::new(ops).source("command:link.remove"))
    }
}

pub(crate) struct LinkPlugin;

impl EditorPlugin for LinkPlugin {
    fn id(&self) -> &'static str {
        "link"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec::of(ElementKind::Link)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("link.insert", "Insert link", |editor, args| {
                let url = string_arg(args.as_ref(), "url")?;
                run_edit("insert link", editor.insert_link(&url))
            })
            .description("Wrap the selected text in a link to args.url.")
            .keywords(["link", "url", "href"])
            .args_example(serde_json::json!({ "url": "https://example.com" })),
            CommandSpec::new("link.remove", "Remove link", |editor, _args| {
                run_edit("remove link", editor.unwrap_link())
            })
            .description("Remove links from the selection, keeping their text.")
            .keywords(["link", "unlink"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![
            QuerySpec::new("link.is_active", |editor, _args| {
                Ok(Value::Bool(editor.is_link_active()))
            }),
            QuerySpec::new("link.active_url", |editor, _args| {
                Ok(editor
                    .active_link()
                    .and_then(ElementNode::url)
                    .map_or(Value::Null, |url| Value::String(url.to_string())))
            }),
        ]
    }
}
