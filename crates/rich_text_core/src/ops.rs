use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::document::{Attrs, Document, ElementKind, Marks, Node, TextNode, collect_text_blocks, edge_text_point};
use crate::error::TransformError;
use crate::inline::{self, Bias};
use crate::range::{Point, Selection};

pub type Path = Vec<usize>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    InsertText {
        #[serde(default)]
        path: Path,
        offset: usize,
        text: String,
    },
    RemoveText {
        #[serde(default)]
        path: Path,
        range: Range<usize>,
    },
    InsertNode {
        #[serde(default)]
        path: Path,
        node: Node,
    },
    RemoveNode {
        #[serde(default)]
        path: Path,
    },
    SetNodeAttrs {
        #[serde(default)]
        path: Path,
        patch: AttrPatch,
    },
    SetNodeKind {
        #[serde(default)]
        path: Path,
        kind: ElementKind,
    },
    SetTextMarks {
        #[serde(default)]
        path: Path,
        marks: Marks,
    },
    /// Swaps the whole child list of an element. The empty path addresses the
    /// document root.
    ReplaceChildren {
        #[serde(default)]
        path: Path,
        children: Vec<Node>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub ops: Vec<Op>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_after: Option<Selection>,
    #[serde(default)]
    pub meta: TransactionMeta,
}

impl Transaction {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            selection_after: None,
            meta: TransactionMeta::default(),
        }
    }

    pub fn selection_after(mut self, selection_after: Selection) -> Self {
        self.selection_after = Some(selection_after);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.meta.source = Some(source.into());
        self
    }

    pub fn source_is(&self, source: &str) -> bool {
        self.meta.source.as_deref() == Some(source)
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.selection_after.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttrPatch {
    #[serde(default)]
    pub set: Attrs,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl AttrPatch {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }
}

fn patch_apply(attrs: &mut Attrs, patch: &AttrPatch) -> AttrPatch {
    let mut old_set: Attrs = Attrs::new();
    let mut old_remove: Vec<String> = Vec::new();

    for (k, v) in &patch.set {
        if let Some(prev) = attrs.insert(k.clone(), v.clone()) {
            old_set.insert(k.clone(), prev);
        } else {
            old_remove.push(k.clone());
        }
    }

    for key in &patch.remove {
        if let Some(prev) = attrs.remove(key) {
            old_set.insert(key.clone(), prev);
        }
    }

    AttrPatch {
        set: old_set,
        remove: old_remove,
    }
}

/// Applies `ops` in order, returning their inverses in application order.
/// Stops at the first failure; callers work on a copy.
pub(crate) fn apply_ops(
    doc: &mut Document,
    selection: &mut Selection,
    ops: impl IntoIterator<Item = Op>,
) -> Result<Vec<Op>, TransformError> {
    ops.into_iter()
        .map(|op| apply_op_to(doc, selection, op))
        .collect()
}

pub(crate) fn apply_op_to(
    doc: &mut Document,
    selection: &mut Selection,
    op: Op,
) -> Result<Op, TransformError> {
    match op {
        Op::InsertText { path, offset, text } => {
            let text_node = node_text_mut(doc, &path)?;
            if offset > text_node.text.len() || !text_node.text.is_char_boundary(offset) {
                return Err(TransformError::out_of_range(&path, offset));
            }
            text_node.text.insert_str(offset, &text);
            transform_selection_insert_text(selection, &path, offset, text.len());
            Ok(Op::RemoveText {
                path,
                range: offset..offset + text.len(),
            })
        }
        Op::RemoveText { path, range } => {
            let text_node = node_text_mut(doc, &path)?;
            let len = text_node.text.len();
            if range.start > range.end
                || range.end > len
                || !text_node.text.is_char_boundary(range.start)
                || !text_node.text.is_char_boundary(range.end)
            {
                return Err(TransformError::out_of_range(&path, range.end));
            }
            let removed: String = text_node.text.drain(range.clone()).collect();
            transform_selection_remove_text(selection, &path, range.clone());
            Ok(Op::InsertText {
                path,
                offset: range.start,
                text: removed,
            })
        }
        Op::InsertNode { path, node } => {
            insert_node(doc, &path, node)?;
            transform_selection_insert_node(selection, &path);
            Ok(Op::RemoveNode { path })
        }
        Op::RemoveNode { path } => {
            let removed = remove_node(doc, &path)?;
            transform_selection_remove_node(selection, &path, &removed, doc);
            Ok(Op::InsertNode {
                path,
                node: removed,
            })
        }
        Op::SetNodeAttrs { path, patch } => match node_mut(doc, &path)? {
            Node::Element(el) => {
                let old = patch_apply(&mut el.attrs, &patch);
                Ok(Op::SetNodeAttrs { path, patch: old })
            }
            Node::Text(_) => Err(TransformError::invalid_path(&path, "text has no attributes")),
        },
        Op::SetNodeKind { path, kind } => match node_mut(doc, &path)? {
            Node::Element(el) => {
                let old = std::mem::replace(&mut el.kind, kind);
                Ok(Op::SetNodeKind { path, kind: old })
            }
            Node::Text(_) => Err(TransformError::invalid_path(&path, "text has no kind")),
        },
        Op::SetTextMarks { path, marks } => {
            let text_node = node_text_mut(doc, &path)?;
            let old = std::mem::replace(&mut text_node.marks, marks);
            Ok(Op::SetTextMarks { path, marks: old })
        }
        Op::ReplaceChildren { path, children } => {
            let text_block = !path.is_empty() && doc.element_at(&path)?.kind.is_text_block();
            let slot = children_mut(doc, &path)?;
            let old = std::mem::replace(slot, children);
            if text_block {
                transform_selection_replace_inline(selection, &path, &old, slot);
            } else {
                transform_selection_replace_blocks(selection, &path, &old, slot);
            }
            Ok(Op::ReplaceChildren {
                path,
                children: old,
            })
        }
    }
}

fn transform_selection_insert_text(
    selection: &mut Selection,
    path: &[usize],
    offset: usize,
    len: usize,
) {
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path == path && point.offset >= offset {
            point.offset = point.offset.saturating_add(len);
        }
    }
}

fn transform_selection_remove_text(selection: &mut Selection, path: &[usize], range: Range<usize>) {
    let removed_len = range.end - range.start;
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path != path || point.offset <= range.start {
            continue;
        }
        if point.offset >= range.end {
            point.offset -= removed_len;
        } else {
            point.offset = range.start;
        }
    }
}

fn transform_selection_insert_node(selection: &mut Selection, path: &[usize]) {
    let Some((&index, parent_path)) = path.split_last() else {
        return;
    };
    let depth = parent_path.len();
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() > depth && point.path.starts_with(parent_path) && point.path[depth] >= index {
            point.path[depth] += 1;
        }
    }
}

fn transform_selection_remove_node(
    selection: &mut Selection,
    path: &[usize],
    removed: &Node,
    doc_after_remove: &Document,
) {
    let Some((&index, parent_path)) = path.split_last() else {
        return;
    };
    let depth = parent_path.len();

    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= depth || !point.path.starts_with(parent_path) {
            continue;
        }
        let ix = point.path[depth];
        if ix > index {
            point.path[depth] = ix - 1;
            continue;
        }
        if ix < index {
            continue;
        }
        *point = relocate_removed_point(doc_after_remove, parent_path, index, removed, point);
    }
}

fn relocate_removed_point(
    doc: &Document,
    parent_path: &[usize],
    index: usize,
    removed: &Node,
    point: &Point,
) -> Point {
    let Ok(siblings) = doc.children_at(parent_path) else {
        return point.clone();
    };

    if let Some(left_ix) = index.checked_sub(1) {
        let mut left_path = parent_path.to_vec();
        left_path.push(left_ix);
        match (&siblings[left_ix], removed) {
            (Node::Text(left), Node::Text(gone)) => {
                let prefix = if left.marks == gone.marks && left.text.ends_with(&gone.text) {
                    left.text.len() - gone.text.len()
                } else {
                    left.text.len()
                };
                return Point::new(left_path, (prefix + point.offset).min(left.text.len()));
            }
            (Node::Text(left), Node::Element(_)) => {
                return Point::new(left_path, left.text.len());
            }
            (Node::Element(left), _) => {
                if let Some(found) = edge_text_point(&left.children, &mut left_path, true) {
                    return found;
                }
            }
        }
    }

    let mut next_path = parent_path.to_vec();
    next_path.push(index);
    match siblings.get(index) {
        Some(Node::Text(_)) => Point::new(next_path, 0),
        Some(Node::Element(next)) => {
            edge_text_point(&next.children, &mut next_path, false).unwrap_or_else(|| point.clone())
        }
        None => point.clone(),
    }
}

fn transform_selection_replace_inline(
    selection: &mut Selection,
    block_path: &[usize],
    old: &[Node],
    new: &[Node],
) {
    let collapsed = selection.is_collapsed();
    let backward = selection.is_backward();
    let depth = block_path.len();

    for (is_anchor, point) in [(true, &mut selection.anchor), (false, &mut selection.focus)] {
        if point.path.len() <= depth || !point.path.starts_with(block_path) {
            continue;
        }
        let Some(global) = inline::global_offset(old, &point.path[depth..], point.offset) else {
            continue;
        };
        let is_start = is_anchor != backward;
        let bias = if !collapsed && is_start {
            Bias::Forward
        } else {
            Bias::Backward
        };
        *point = inline::point_at(block_path, new, global, bias);
    }
}

fn transform_selection_replace_blocks(
    selection: &mut Selection,
    path: &[usize],
    old: &[Node],
    new: &[Node],
) {
    let mut old_blocks = Vec::new();
    collect_text_blocks(old, &mut Vec::new(), &mut old_blocks);
    let mut new_blocks = Vec::new();
    collect_text_blocks(new, &mut Vec::new(), &mut new_blocks);
    if old_blocks.len() != new_blocks.len() {
        return;
    }

    let depth = path.len();
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= depth || !point.path.starts_with(path) {
            continue;
        }
        let rel = &point.path[depth..];
        let Some(ix) = old_blocks
            .iter()
            .position(|(block_path, _)| rel.starts_with(block_path))
        else {
            continue;
        };
        let old_len = old_blocks[ix].0.len();
        let mut mapped = path.to_vec();
        mapped.extend_from_slice(&new_blocks[ix].0);
        mapped.extend_from_slice(&rel[old_len..]);
        point.path = mapped;
    }
}

fn node_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut Node, TransformError> {
    let Some((&last, parent)) = path.split_last() else {
        return Err(TransformError::invalid_path(path, "the root is not a node"));
    };
    children_mut(doc, parent)?
        .get_mut(last)
        .ok_or_else(|| TransformError::invalid_path(path, "index out of bounds"))
}

fn children_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut Vec<Node>, TransformError> {
    let mut children = &mut doc.children;
    for (depth, &ix) in path.iter().enumerate() {
        children = match children.get_mut(ix) {
            Some(Node::Element(el)) => &mut el.children,
            Some(Node::Text(_)) => {
                return Err(TransformError::invalid_path(
                    path,
                    format!("text node at depth {depth} has no children"),
                ));
            }
            None => {
                return Err(TransformError::invalid_path(
                    path,
                    format!("index out of bounds at depth {depth}"),
                ));
            }
        };
    }
    Ok(children)
}

fn node_text_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut TextNode, TransformError> {
    match node_mut(doc, path)? {
        Node::Text(t) => Ok(t),
        Node::Element(_) => Err(TransformError::invalid_path(path, "expected a text node")),
    }
}

fn insert_node(doc: &mut Document, path: &[usize], node: Node) -> Result<(), TransformError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(TransformError::invalid_path(path, "empty insert path"));
    };
    let children = children_mut(doc, parent_path)?;
    if index > children.len() {
        return Err(TransformError::invalid_path(
            path,
            format!("insert index {index} > {}", children.len()),
        ));
    }
    children.insert(index, node);
    Ok(())
}

fn remove_node(doc: &mut Document, path: &[usize]) -> Result<Node, TransformError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(TransformError::invalid_path(path, "empty remove path"));
    };
    let children = children_mut(doc, parent_path)?;
    if index >= children.len() {
        return Err(TransformError::invalid_path(
            path,
            format!("remove index {index} >= {}", children.len()),
        ));
    }
    Ok(children.remove(index))
}
