use crate::document::ElementKind;
use crate::editor::{DELETE_BACKWARD_SOURCE, Editor, INSERT_TEXT_SOURCE};
use crate::inline::{self, Bias, block_text, point_at};
use crate::ops::{Transaction, apply_ops};
use crate::plugin::{EditorPlugin, TransactionTransform};
use crate::range::Selection;
use crate::transforms::{NodeProps, plan_delete_range, plan_node_updates};

pub fn shortcut_kind(prefix: &str) -> Option<ElementKind> {
    match prefix {
        "> " => Some(ElementKind::BlockQuote),
        "* " | "- " => Some(ElementKind::ListItem),
        "``` " => Some(ElementKind::Code),
        _ => {
            let hashes = prefix.strip_suffix(' ')?;
            if !hashes.is_empty() && hashes.bytes().all(|b| b == b'#') {
                ElementKind::heading(hashes.len())
            } else {
                None
            }
        }
    }
}

pub(crate) struct AutoformatPlugin;

impl EditorPlugin for AutoformatPlugin {
    fn id(&self) -> &'static str {
        "autoformat"
    }

    fn transaction_transforms(&self) -> Vec<Box<dyn TransactionTransform>> {
        vec![Box::new(BlockShortcutOnInsert), Box::new(ResetBlockOnBackspace)]
    }
}

struct BlockShortcutOnInsert;

impl TransactionTransform for BlockShortcutOnInsert {
    fn id(&self) -> &'static str {
        "autoformat.block_shortcut"
    }

    fn transform(&self, editor: &Editor, tx: &Transaction) -> Option<Transaction> {
        if !tx.source_is(INSERT_TEXT_SOURCE) {
            return None;
        }
        let preview = editor.preview_transaction(tx).ok()?;
        if !preview.selection.is_collapsed() {
            return None;
        }
        let caret = preview.selection.focus.clone();
        let block_path = preview.doc.text_block_of(&caret.path)?;
        let block = preview.doc.element_at(&block_path).ok()?;
        if block.kind == ElementKind::Code {
            return None;
        }

        let global =
            inline::global_offset(&block.children, &caret.path[block_path.len()..], caret.offset)?;
        let target = shortcut_kind(block_text(&block.children).get(..global)?)?;

        let block_start = point_at(&block_path, &block.children, 0, Bias::Forward);
        let (delete_ops, block_start) =
            plan_delete_range(&preview.doc, &Selection::new(block_start, caret)).ok()?;
        let mut doc = preview.doc.clone();
        let mut scratch = preview.selection.clone();
        apply_ops(&mut doc, &mut scratch, delete_ops.iter().cloned()).ok()?;
        let mut selection = Selection::collapsed(block_start);

        let kind_ops = plan_node_updates(&doc, vec![(block_path, NodeProps::kind(target))]).ok()?;
        apply_ops(&mut doc, &mut selection, kind_ops.iter().cloned()).ok()?;

        tracing::debug!(kind = %target, "autoformat shortcut");
        let mut ops = preview.ops;
        ops.extend(delete_ops);
        ops.extend(kind_ops);
        Some(
            Transaction::new(ops)
                .selection_after(selection)
                .source(format!("autoformat:{target}")),
        )
    }
}

struct ResetBlockOnBackspace;

impl TransactionTransform for ResetBlockOnBackspace {
    fn id(&self) -> &'static str {
        "autoformat.reset_block"
    }

    fn transform(&self, editor: &Editor, tx: &Transaction) -> Option<Transaction> {
        if !tx.source_is(DELETE_BACKWARD_SOURCE) {
            return None;
        }
        let selection = editor.selection();
        if !selection.is_collapsed() {
            return None;
        }
        let at = inline::locate(editor.doc(), &selection.focus).ok()?;
        if at.global != 0 || matches!(at.block.kind, ElementKind::Paragraph | ElementKind::Default) {
            return None;
        }
        let ops = plan_node_updates(
            editor.doc(),
            vec![(at.block_path, NodeProps::kind(ElementKind::Paragraph))],
        )
        .ok()?;
        Some(Transaction::new(ops).source(DELETE_BACKWARD_SOURCE))
    }
}
