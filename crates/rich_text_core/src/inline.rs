use crate::document::{Document, ElementNode, Marks, Node, TextNode};
use crate::error::TransformError;
use crate::ops::Path;
use crate::range::{Point, clamp_to_char_boundary};

#[derive(Debug, Clone, Copy)]
pub(crate) struct Leaf<'a> {
    pub rel: [usize; 2],
    pub depth: usize,
    pub start: usize,
    pub text: &'a TextNode,
    pub parent: Option<&'a ElementNode>,
}

impl<'a> Leaf<'a> {
    pub fn end(&self) -> usize {
        self.start + self.text.text.len()
    }

    pub fn rel_path(&self) -> &[usize] {
        &self.rel[..self.depth]
    }
}

pub(crate) fn leaves(children: &[Node]) -> Vec<Leaf<'_>> {
    let mut out = Vec::new();
    let mut cursor = 0;
    for (ix, node) in children.iter().enumerate() {
        match node {
            Node::Text(text) => {
                out.push(Leaf {
                    rel: [ix, 0],
                    depth: 1,
                    start: cursor,
                    text,
                    parent: None,
                });
                cursor += text.text.len();
            }
            Node::Element(el) => {
                for (jx, child) in el.children.iter().enumerate() {
                    if let Node::Text(text) = child {
                        out.push(Leaf {
                            rel: [ix, jx],
                            depth: 2,
                            start: cursor,
                            text,
                            parent: Some(el),
                        });
                        cursor += text.text.len();
                    }
                }
            }
        }
    }
    out
}

pub(crate) fn inline_len(children: &[Node]) -> usize {
    children.iter().map(node_len).sum()
}

fn node_len(node: &Node) -> usize {
    match node {
        Node::Text(t) => t.text.len(),
        Node::Element(el) => inline_len(&el.children),
    }
}

pub(crate) fn block_text(children: &[Node]) -> String {
    leaves(children).iter().map(|leaf| leaf.text.text.as_str()).collect()
}

pub(crate) fn global_offset(children: &[Node], rel: &[usize], offset: usize) -> Option<usize> {
    leaves(children)
        .into_iter()
        .find(|leaf| leaf.rel_path() == rel)
        .filter(|leaf| offset <= leaf.text.text.len())
        .map(|leaf| leaf.start + offset)
}

/// Which leaf wins when an offset sits on the boundary between two leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Bias {
    Backward,
    Forward,
}

pub(crate) fn point_at(block_path: &[usize], children: &[Node], global: usize, bias: Bias) -> Point {
    let leaves = leaves(children);
    let contains = |leaf: &&Leaf<'_>| leaf.start <= global && global <= leaf.end();
    let hit = match bias {
        Bias::Backward => leaves.iter().find(contains),
        Bias::Forward => leaves
            .iter()
            .find(|leaf| leaf.start <= global && global < leaf.end())
            .or_else(|| leaves.iter().rev().find(contains)),
    };
    let leaf = hit.or(leaves.last());

    let mut path = block_path.to_vec();
    match leaf {
        Some(leaf) => {
            path.extend_from_slice(leaf.rel_path());
            let local = global.saturating_sub(leaf.start).min(leaf.text.text.len());
            Point::new(path, clamp_to_char_boundary(&leaf.text.text, local))
        }
        None => {
            path.push(0);
            Point::new(path, 0)
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Located<'a> {
    pub block_path: Path,
    pub block: &'a ElementNode,
    pub global: usize,
    pub marks: Marks,
}

pub(crate) fn locate<'a>(doc: &'a Document, point: &Point) -> Result<Located<'a>, TransformError> {
    let text = doc.text_at(&point.path)?;
    if point.offset > text.text.len() || !text.text.is_char_boundary(point.offset) {
        return Err(TransformError::out_of_range(&point.path, point.offset));
    }
    let block_path = doc
        .text_block_of(&point.path)
        .ok_or_else(|| TransformError::invalid_path(&point.path, "text is not inside a text block"))?;
    let block = doc.element_at(&block_path)?;
    let global = global_offset(&block.children, &point.path[block_path.len()..], point.offset)
        .ok_or_else(|| TransformError::out_of_range(&point.path, point.offset))?;
    Ok(Located {
        block_path,
        block,
        global,
        marks: text.marks,
    })
}

pub(crate) fn split_inline(children: &[Node], at: usize) -> (Vec<Node>, Vec<Node>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut cursor = 0;
    for node in children {
        let len = node_len(node);
        if cursor + len <= at {
            left.push(node.clone());
        } else if cursor >= at {
            right.push(node.clone());
        } else {
            match node {
                Node::Text(t) => {
                    let cut = clamp_to_char_boundary(&t.text, at - cursor);
                    left.push(Node::marked(&t.text[..cut], t.marks));
                    right.push(Node::marked(&t.text[cut..], t.marks));
                }
                Node::Element(el) => {
                    let (l, r) = split_inline(&el.children, at - cursor);
                    left.push(Node::Element(ElementNode {
                        children: l,
                        ..el.clone()
                    }));
                    right.push(Node::Element(ElementNode {
                        children: r,
                        ..el.clone()
                    }));
                }
            }
        }
        cursor += len;
    }
    (left, right)
}

fn map_leaves(children: &[Node], f: &mut dyn FnMut(&mut TextNode)) -> Vec<Node> {
    children
        .iter()
        .map(|node| match node {
            Node::Text(t) => {
                let mut t = t.clone();
                f(&mut t);
                Node::Text(t)
            }
            Node::Element(el) => Node::Element(ElementNode {
                children: map_leaves(&el.children, f),
                ..el.clone()
            }),
        })
        .collect()
}

pub(crate) fn map_range(
    children: &[Node],
    start: usize,
    end: usize,
    f: &mut dyn FnMut(&mut TextNode),
) -> Vec<Node> {
    if start >= end {
        return children.to_vec();
    }
    let (mut out, rest) = split_inline(children, start);
    let (mid, tail) = split_inline(&rest, end - start);
    out.extend(map_leaves(&mid, f));
    out.extend(tail);
    out
}

pub(crate) fn map_touching(
    children: &[Node],
    start: usize,
    end: usize,
    f: &mut dyn FnMut(&mut TextNode),
) -> Vec<Node> {
    fn walk(
        children: &[Node],
        cursor: &mut usize,
        start: usize,
        end: usize,
        f: &mut dyn FnMut(&mut TextNode),
    ) -> Vec<Node> {
        children
            .iter()
            .map(|node| match node {
                Node::Text(t) => {
                    let mut t = t.clone();
                    let leaf_start = *cursor;
                    *cursor += t.text.len();
                    if leaf_start < end && start < *cursor {
                        f(&mut t);
                    }
                    Node::Text(t)
                }
                Node::Element(el) => Node::Element(ElementNode {
                    children: walk(&el.children, cursor, start, end, f),
                    ..el.clone()
                }),
            })
            .collect()
    }
    walk(children, &mut 0, start, end, f)
}

pub(crate) fn unwrap_elements(
    children: &[Node],
    start: usize,
    end: usize,
    matches: &dyn Fn(&ElementNode) -> bool,
) -> Vec<Node> {
    let mut out = Vec::new();
    let mut cursor = 0;
    for node in children {
        let len = node_len(node);
        let (a, b) = (cursor, cursor + len);
        cursor = b;
        if let Node::Element(el) = node {
            let overlaps = if start == end {
                a <= start && start <= b
            } else {
                a < end && start < b
            };
            if overlaps && matches(el) {
                out.extend(el.children.iter().cloned());
                continue;
            }
        }
        out.push(node.clone());
    }
    out
}

/// `fallback` marks the leaf created when nothing is left.
pub(crate) fn normalize_inline(children: Vec<Node>, fallback: Marks) -> Vec<Node> {
    let mut merged: Vec<Node> = Vec::new();
    for node in children {
        let node = match node {
            Node::Element(mut el) => {
                el.children = merge_text_runs(std::mem::take(&mut el.children));
                if inline_len(&el.children) == 0 {
                    continue;
                }
                Node::Element(el)
            }
            text => text,
        };
        if let Node::Element(el) = &node {
            if let Some(Node::Element(prev)) = merged.last_mut() {
                if prev.kind == el.kind && prev.attrs == el.attrs {
                    let mut joined = std::mem::take(&mut prev.children);
                    joined.extend(el.children.iter().cloned());
                    prev.children = merge_text_runs(joined);
                    continue;
                }
            }
        }
        merged.push(node);
    }

    let runs = merge_text_runs(merged);

    let mut out: Vec<Node> = Vec::with_capacity(runs.len() + 2);
    for node in runs {
        if node.is_inline() && !matches!(out.last(), Some(Node::Text(_))) {
            out.push(Node::text(""));
        }
        out.push(node);
    }
    if matches!(out.last(), Some(node) if node.is_inline()) {
        out.push(Node::text(""));
    }
    if out.is_empty() {
        out.push(Node::marked("", fallback));
    }
    out
}

fn merge_text_runs(nodes: Vec<Node>) -> Vec<Node> {
    let is_text = |ix: Option<usize>| ix.and_then(|ix| nodes.get(ix)).is_some_and(Node::is_text);
    let keep: Vec<bool> = nodes
        .iter()
        .enumerate()
        .map(|(ix, node)| match node {
            Node::Text(t) if t.text.is_empty() => {
                !(is_text(ix.checked_sub(1)) || is_text(Some(ix + 1)))
            }
            _ => true,
        })
        .collect();

    let mut out: Vec<Node> = Vec::with_capacity(nodes.len());
    for (node, keep) in nodes.into_iter().zip(keep) {
        if !keep {
            continue;
        }
        if let (Some(Node::Text(prev)), Node::Text(t)) = (out.last_mut(), &node) {
            if prev.marks == t.marks {
                prev.text.push_str(&t.text);
                continue;
            }
        }
        out.push(node);
    }
    out
}
