use serde::{Deserialize, Serialize};

use crate::document::{Document, Node, edge_text_point};
use crate::error::TransformError;
use crate::inline;
use crate::ops::Path;

/// A position inside a text leaf. `offset` is a byte index on a char boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedRange {
    pub start: Point,
    pub end: Point,
    pub backward: bool,
}

impl OrderedRange {
    pub fn into_selection(self) -> Selection {
        if self.backward {
            Selection::new(self.end, self.start)
        } else {
            Selection::new(self.start, self.end)
        }
    }
}

impl Selection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn is_backward(&self) -> bool {
        self.focus < self.anchor
    }

    pub fn edges(&self) -> (&Point, &Point) {
        if self.is_backward() {
            (&self.focus, &self.anchor)
        } else {
            (&self.anchor, &self.focus)
        }
    }

    pub fn normalize(&self) -> OrderedRange {
        let (start, end) = self.edges();
        OrderedRange {
            start: start.clone(),
            end: end.clone(),
            backward: self.is_backward(),
        }
    }
}

pub fn text_between(doc: &Document, range: &Selection) -> Result<String, TransformError> {
    let (start, end) = range.edges();
    let out_of_range = |point: &Point| TransformError::out_of_range(&point.path, point.offset);
    let start_at = inline::locate(doc, start).map_err(|_| out_of_range(start))?;
    let end_at = inline::locate(doc, end).map_err(|_| out_of_range(end))?;

    let mut out = String::new();
    let mut inside = false;
    for (path, block) in doc.text_blocks() {
        if path == start_at.block_path {
            inside = true;
        }
        if !inside {
            continue;
        }
        let text = inline::block_text(&block.element.children);
        let from = if path == start_at.block_path {
            start_at.global
        } else {
            0
        };
        let to = if path == end_at.block_path {
            end_at.global
        } else {
            text.len()
        };
        if from < to {
            out.push_str(&text[from..to]);
        }
        if path == end_at.block_path {
            break;
        }
    }
    Ok(out)
}

pub fn normalize_selection(doc: &Document, selection: &Selection) -> Selection {
    Selection {
        anchor: normalize_point(doc, &selection.anchor),
        focus: normalize_point(doc, &selection.focus),
    }
}

fn normalize_point(doc: &Document, point: &Point) -> Point {
    if let Ok(text) = doc.text_at(&point.path) {
        let offset = clamp_to_char_boundary(&text.text, point.offset);
        return Point::new(point.path.clone(), offset);
    }

    // Walk up until the path resolves, then descend to the nearest text below it.
    let mut path = point.path.clone();
    while let Some(&ix) = path.last() {
        let parent = &path[..path.len() - 1];
        if let Ok(siblings) = doc.children_at(parent) {
            match siblings.get(ix) {
                Some(Node::Text(t)) => {
                    let offset = clamp_to_char_boundary(&t.text, point.offset);
                    return Point::new(path, offset);
                }
                Some(Node::Element(el)) => {
                    if let Some(found) = edge_text_point(&el.children, &mut path.clone(), false) {
                        return found;
                    }
                }
                // Past the end of its parent: snap to the end of the last sibling.
                None => {
                    if let Some(found) = edge_text_point(siblings, &mut parent.to_vec(), true) {
                        return found;
                    }
                }
            }
        }
        path.pop();
    }

    doc.start_point().unwrap_or_else(|| Point::new(vec![0, 0], 0))
}

pub(crate) fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_order_by_path_then_offset() {
        let a = Point::new(vec![0, 1], 5);
        let b = Point::new(vec![0, 2], 0);
        let c = Point::new(vec![1], 0);
        assert!(a < b);
        assert!(b < c);
        assert!(Point::new(vec![0, 1], 2) < a);
    }

    #[test]
    fn backward_selection_normalizes_and_restores() {
        let sel = Selection::new(Point::new(vec![0, 0], 4), Point::new(vec![0, 0], 1));
        assert!(sel.is_backward());
        let ordered = sel.normalize();
        assert_eq!(ordered.start.offset, 1);
        assert_eq!(ordered.end.offset, 4);
        assert_eq!(ordered.into_selection(), sel);
    }

    #[test]
    fn clamp_snaps_inside_multibyte_chars() {
        let s = "aé";
        assert_eq!(clamp_to_char_boundary(s, 2), 1);
        assert_eq!(clamp_to_char_boundary(s, 10), 3);
    }

    #[test]
    fn dangling_point_moves_to_previous_block_end() {
        let doc = Document::new(vec![Node::paragraph("one"), Node::paragraph("two")]);
        let sel = Selection::collapsed(Point::new(vec![2, 0], 0));
        let normalized = normalize_selection(&doc, &sel);
        assert_eq!(normalized.focus, Point::new(vec![1, 0], 3));
    }
}
