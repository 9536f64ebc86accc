use std::collections::BTreeSet;

use crate::document::{Attrs, Document, ElementKind, ElementNode, MarkFormat, Marks, Node, TextNode};
use crate::error::TransformError;
use crate::inline::{self, Bias, Leaf, locate, normalize_inline, point_at, split_inline};
use crate::ops::{AttrPatch, Op, Path, apply_ops};
use crate::plugin::{DEFAULT_MAX_NORMALIZE_ITERATIONS, core_normalize_passes, normalize_document};
use crate::range::{Point, Selection};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeProps {
    pub kind: Option<ElementKind>,
    pub attrs: AttrPatch,
}

impl NodeProps {
    pub fn kind(kind: ElementKind) -> Self {
        Self {
            kind: Some(kind),
            attrs: AttrPatch::default(),
        }
    }

    pub fn set_attr(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attrs.set.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BlockSpan<'a> {
    pub path: Path,
    pub block: &'a ElementNode,
    pub start: usize,
    pub end: usize,
}

pub(crate) fn spanned_blocks<'a>(
    doc: &'a Document,
    range: &Selection,
) -> Result<Vec<BlockSpan<'a>>, TransformError> {
    let (start, end) = range.edges();
    let start = locate(doc, start)?;
    let end = locate(doc, end)?;

    let mut out = Vec::new();
    let mut inside = false;
    for (path, block) in doc.text_blocks() {
        inside |= path == start.block_path;
        if !inside {
            continue;
        }
        let children = &block.element.children;
        let last = path == end.block_path;
        out.push(BlockSpan {
            start: if path == start.block_path { start.global } else { 0 },
            end: if last { end.global } else { inline::inline_len(children) },
            block: block.element,
            path,
        });
        if last {
            break;
        }
    }
    Ok(out)
}

pub(crate) fn covered_leaves<'a>(
    doc: &'a Document,
    range: &Selection,
) -> Result<Vec<Leaf<'a>>, TransformError> {
    let mut out = Vec::new();
    for span in spanned_blocks(doc, range)? {
        out.extend(
            inline::leaves(&span.block.children)
                .into_iter()
                .filter(|leaf| leaf.start < span.end && span.start < leaf.end()),
        );
    }
    Ok(out)
}

pub(crate) fn plan_insert_text(
    doc: &Document,
    point: &Point,
    text: &str,
) -> Result<(Vec<Op>, Point), TransformError> {
    locate(doc, point)?;
    if text.is_empty() {
        return Ok((Vec::new(), point.clone()));
    }
    let ops = vec![Op::InsertText {
        path: point.path.clone(),
        offset: point.offset,
        text: text.to_string(),
    }];
    Ok((ops, Point::new(point.path.clone(), point.offset + text.len())))
}

pub(crate) fn plan_insert_marked_text(
    doc: &Document,
    point: &Point,
    text: &str,
    marks: Marks,
) -> Result<(Vec<Op>, Point), TransformError> {
    let at = locate(doc, point)?;
    if at.marks == marks || text.is_empty() {
        return plan_insert_text(doc, point, text);
    }

    let rel = &point.path[at.block_path.len()..];
    let leaf = TextNode::marked(text, marks);
    let spliced = splice_leaf(&at.block.children, rel, point.offset, &leaf);
    let children = normalize_inline(spliced, marks);
    let caret = point_at(&at.block_path, &children, at.global + text.len(), Bias::Backward);
    let ops = vec![Op::ReplaceChildren {
        path: at.block_path,
        children,
    }];
    Ok((ops, caret))
}

fn splice_leaf(children: &[Node], rel: &[usize], offset: usize, leaf: &TextNode) -> Vec<Node> {
    let Some((&ix, rest)) = rel.split_first() else {
        return children.to_vec();
    };
    let mut out = Vec::with_capacity(children.len() + 2);
    for (i, node) in children.iter().enumerate() {
        if i != ix {
            out.push(node.clone());
            continue;
        }
        match node {
            Node::Text(t) if rest.is_empty() => {
                out.push(Node::marked(&t.text[..offset], t.marks));
                out.push(Node::Text(leaf.clone()));
                out.push(Node::marked(&t.text[offset..], t.marks));
            }
            Node::Element(el) => out.push(Node::Element(ElementNode {
                children: splice_leaf(&el.children, rest, offset, leaf),
                ..el.clone()
            })),
            other => out.push(other.clone()),
        }
    }
    out
}

pub(crate) fn plan_delete_range(
    doc: &Document,
    range: &Selection,
) -> Result<(Vec<Op>, Point), TransformError> {
    let (start, end) = range.edges();
    let from = locate(doc, start)?;
    let to = locate(doc, end)?;
    if start == end {
        return Ok((Vec::new(), start.clone()));
    }

    let (mut joined, rest) = split_inline(&from.block.children, from.global);
    let right = if from.block_path == to.block_path {
        split_inline(&rest, to.global - from.global).1
    } else {
        split_inline(&to.block.children, to.global).1
    };
    joined.extend(right);
    let joined = normalize_inline(joined, from.marks);
    let caret = point_at(&from.block_path, &joined, from.global, Bias::Backward);

    let mut ops = vec![Op::ReplaceChildren {
        path: from.block_path.clone(),
        children: joined,
    }];
    if from.block_path != to.block_path {
        // Blocks after the start one, up to and including the end block,
        // removed last-first so earlier paths stay valid.
        let doomed: Vec<Path> = doc
            .text_blocks()
            .into_iter()
            .map(|(path, _)| path)
            .skip_while(|path| *path != from.block_path)
            .skip(1)
            .take_while(|path| *path <= to.block_path)
            .collect();
        ops.extend(doomed.into_iter().rev().map(|path| Op::RemoveNode { path }));
    }
    Ok((ops, caret))
}

pub(crate) fn plan_set_text_properties(
    doc: &Document,
    range: &Selection,
    props: &[(MarkFormat, bool)],
    split: bool,
) -> Result<Vec<Op>, TransformError> {
    if range.is_collapsed() || props.is_empty() {
        return Ok(Vec::new());
    }
    let mut apply = |text: &mut TextNode| {
        for (format, value) in props {
            text.marks.set(*format, *value);
        }
    };

    let mut ops = Vec::new();
    for span in spanned_blocks(doc, range)? {
        if span.start >= span.end {
            continue;
        }
        let children = &span.block.children;
        let updated = if split {
            inline::map_range(children, span.start, span.end, &mut apply)
        } else {
            inline::map_touching(children, span.start, span.end, &mut apply)
        };
        let fallback = inline::leaves(children)
            .first()
            .map(|leaf| leaf.text.marks)
            .unwrap_or_default();
        let updated = normalize_inline(updated, fallback);
        if &updated != children {
            ops.push(Op::ReplaceChildren {
                path: span.path,
                children: updated,
            });
        }
    }
    Ok(ops)
}

pub(crate) fn plan_set_node_properties(
    doc: &Document,
    range: &Selection,
    matcher: &dyn Fn(&ElementNode) -> bool,
    props: &NodeProps,
) -> Result<Vec<Op>, TransformError> {
    let ancestry: BTreeSet<Path> = spanned_blocks(doc, range)?
        .into_iter()
        .flat_map(|span| (1..=span.path.len()).map(move |len| span.path[..len].to_vec()))
        .collect();

    let mut updates = Vec::new();
    for path in ancestry {
        if matcher(doc.element_at(&path)?) {
            updates.push((path, props.clone()));
        }
    }
    plan_node_updates(doc, updates)
}

/// Kind and attribute changes for specific elements, followed by list repair.
/// Kind changes that would change what an element may contain are skipped.
pub(crate) fn plan_node_updates(
    doc: &Document,
    updates: Vec<(Path, NodeProps)>,
) -> Result<Vec<Op>, TransformError> {
    let mut ops = Vec::new();
    for (path, props) in updates {
        let el = doc.element_at(&path)?;
        if let Some(kind) = props.kind {
            let compatible = kind.role() == el.kind.role() && kind.children() == el.kind.children();
            if kind != el.kind && compatible {
                ops.push(Op::SetNodeKind {
                    path: path.clone(),
                    kind,
                });
            }
        }
        if !props.attrs.is_empty() {
            ops.push(Op::SetNodeAttrs {
                path,
                patch: props.attrs,
            });
        }
    }
    if ops.is_empty() {
        return Ok(ops);
    }

    let mut preview = doc.clone();
    let mut scratch = Selection::collapsed(Point::new(Vec::new(), 0));
    apply_ops(&mut preview, &mut scratch, ops.clone())?;
    if let Some(children) = repair_lists(&preview.children) {
        ops.push(Op::ReplaceChildren {
            path: Vec::new(),
            children,
        });
    }
    Ok(ops)
}

pub(crate) fn repair_lists(children: &[Node]) -> Option<Vec<Node>> {
    let mut flat: Vec<Node> = Vec::with_capacity(children.len());
    for node in children {
        match node {
            Node::Element(el) if el.kind == ElementKind::BulletedList => {
                flat.extend(el.children.iter().cloned());
            }
            other => flat.push(other.clone()),
        }
    }

    let mut out: Vec<Node> = Vec::with_capacity(flat.len());
    for node in flat {
        let is_item = matches!(&node, Node::Element(el) if el.kind == ElementKind::ListItem);
        if is_item {
            if let Some(Node::Element(list)) = out.last_mut() {
                if list.kind == ElementKind::BulletedList {
                    list.children.push(node);
                    continue;
                }
            }
            out.push(Node::Element(ElementNode {
                kind: ElementKind::BulletedList,
                attrs: Attrs::default(),
                children: vec![node],
            }));
        } else {
            out.push(node);
        }
    }

    (out != children).then_some(out)
}

pub(crate) fn plan_wrap_inline(
    doc: &Document,
    range: &Selection,
    template: &ElementNode,
) -> Result<(Vec<Op>, Point), TransformError> {
    if !template.kind.is_inline() || range.is_collapsed() {
        return Err(TransformError::NotInlineCandidate);
    }
    let (start, end) = range.edges();
    let from = locate(doc, start)?;
    let to = locate(doc, end)?;
    if from.block_path != to.block_path {
        return Err(TransformError::NotInlineCandidate);
    }
    let intersects = covered_leaves(doc, range)?
        .iter()
        .any(|leaf| leaf.parent.is_some_and(|el| el.kind == template.kind));
    if intersects {
        return Err(TransformError::NotInlineCandidate);
    }

    let (mut children, rest) = split_inline(&from.block.children, from.global);
    let (mid, tail) = split_inline(&rest, to.global - from.global);
    let wrapped = ElementNode {
        children: inline::leaves(&mid)
            .into_iter()
            .map(|leaf| Node::Text(leaf.text.clone()))
            .collect(),
        ..template.clone()
    };
    children.push(Node::Element(wrapped));
    children.extend(tail);
    let children = normalize_inline(children, from.marks);
    let after = point_at(&from.block_path, &children, to.global, Bias::Forward);

    let ops = vec![Op::ReplaceChildren {
        path: from.block_path,
        children,
    }];
    Ok((ops, after))
}

pub(crate) fn plan_unwrap_inline(
    doc: &Document,
    range: &Selection,
    matches: &dyn Fn(&ElementNode) -> bool,
) -> Result<Vec<Op>, TransformError> {
    let mut ops = Vec::new();
    for span in spanned_blocks(doc, range)? {
        let children = &span.block.children;
        let lifted = inline::unwrap_elements(children, span.start, span.end, matches);
        let lifted = normalize_inline(lifted, Marks::default());
        if &lifted != children {
            ops.push(Op::ReplaceChildren {
                path: span.path,
                children: lifted,
            });
        }
    }
    Ok(ops)
}

pub(crate) fn plan_split_block(doc: &Document, point: &Point) -> Result<(Vec<Op>, Point), TransformError> {
    let at = locate(doc, point)?;
    let (left, right) = split_inline(&at.block.children, at.global);
    let left = normalize_inline(left, at.marks);
    let right = normalize_inline(right, at.marks);

    let mut new_path = at.block_path.clone();
    if let Some(last) = new_path.last_mut() {
        *last += 1;
    }
    let caret = point_at(&new_path, &right, 0, Bias::Forward);
    let ops = vec![
        Op::ReplaceChildren {
            path: at.block_path.clone(),
            children: left,
        },
        Op::InsertNode {
            path: new_path,
            node: Node::Element(ElementNode {
                children: right,
                ..at.block.clone()
            }),
        },
    ];
    Ok((ops, caret))
}

fn commit(doc: &Document, ops: Vec<Op>, point: Point) -> Result<(Document, Point), TransformError> {
    let mut next = doc.clone();
    // `point` is already the post-edit caret; only normalization may move it.
    let mut scratch = Selection::collapsed(point.clone());
    apply_ops(&mut next, &mut scratch, ops)?;
    let mut selection = Selection::collapsed(point);
    normalize_document(
        &core_normalize_passes(),
        &mut next,
        &mut selection,
        DEFAULT_MAX_NORMALIZE_ITERATIONS,
    )?;
    Ok((next, selection.focus))
}

pub fn insert_text(doc: &Document, point: &Point, text: &str) -> Result<(Document, Point), TransformError> {
    let (ops, caret) = plan_insert_text(doc, point, text)?;
    commit(doc, ops, caret)
}

pub fn delete_range(doc: &Document, range: &Selection) -> Result<(Document, Point), TransformError> {
    let (ops, caret) = plan_delete_range(doc, range)?;
    commit(doc, ops, caret)
}

pub fn set_text_properties(
    doc: &Document,
    range: &Selection,
    props: &[(MarkFormat, bool)],
    split: bool,
) -> Result<Document, TransformError> {
    let ops = plan_set_text_properties(doc, range, props, split)?;
    let (start, _) = range.edges();
    commit(doc, ops, start.clone()).map(|(doc, _)| doc)
}

pub fn set_node_properties(
    doc: &Document,
    range: &Selection,
    matcher: impl Fn(&ElementNode) -> bool,
    props: &NodeProps,
) -> Result<Document, TransformError> {
    let ops = plan_set_node_properties(doc, range, &matcher, props)?;
    let (start, _) = range.edges();
    commit(doc, ops, start.clone()).map(|(doc, _)| doc)
}

pub fn wrap_inline(doc: &Document, range: &Selection, template: &ElementNode) -> Result<Document, TransformError> {
    let (ops, after) = plan_wrap_inline(doc, range, template)?;
    commit(doc, ops, after).map(|(doc, _)| doc)
}

pub fn split_block(doc: &Document, point: &Point) -> Result<(Document, Point), TransformError> {
    let (ops, caret) = plan_split_block(doc, point)?;
    commit(doc, ops, caret)
}
