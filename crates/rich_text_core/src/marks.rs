use serde_json::Value;

use crate::document::{MarkFormat, Marks};
use crate::editor::Editor;
use crate::error::TransformError;
use crate::hotkey::{HotkeyAction, HotkeyBinding};
use crate::inline::locate;
use crate::ops::Transaction;
use crate::plugin::{CommandError, CommandSpec, EditorPlugin, QueryError, QuerySpec, run_edit, string_arg};
use crate::transforms::{covered_leaves, plan_set_text_properties};

impl Editor {
    pub fn active_marks(&self) -> Marks {
        let selection = self.selection();
        if selection.is_collapsed() {
            if let Some(marks) = self.stored_marks {
                return marks;
            }
            return locate(self.doc(), &selection.focus)
                .map(|at| at.marks)
                .unwrap_or_default();
        }

        let leaves = covered_leaves(self.doc(), selection).unwrap_or_default();
        if leaves.is_empty() {
            return Marks::default();
        }
        let mut active = Marks::default();
        for format in MarkFormat::ALL {
            active.set(format, leaves.iter().all(|leaf| leaf.text.marks.get(format)));
        }
        active
    }

    pub fn is_mark_active(&self, format: MarkFormat) -> bool {
        self.active_marks().get(format)
    }

    /// Turns `format` on for the whole selection if any covered text lacks it,
    /// off if all of it has it. At a collapsed caret only the stored marks
    /// change.
    pub fn toggle_mark(&mut self, format: MarkFormat) -> Result<(), TransformError> {
        let value = !self.is_mark_active(format);
        self.set_mark(format, value)
    }

    pub fn set_mark(&mut self, format: MarkFormat, value: bool) -> Result<(), TransformError> {
        if self.selection().is_collapsed() {
            self.stored_marks = Some(self.active_marks().with(format, value));
            return Ok(());
        }
        let ops = plan_set_text_properties(self.doc(), self.selection(), &[(format, value)], true)?;
        if ops.is_empty() {
            return Ok(());
        }
        self.apply(Transaction::new(ops).source(format!("command:marks.{format}")))
    }
}

pub(crate) struct MarksPlugin;

fn toggle_command(format: MarkFormat, label: &'static str) -> CommandSpec {
    CommandSpec::new(format!("marks.toggle_{format}"), label, move |editor, _args| {
        run_edit(&format!("toggle {format}"), editor.toggle_mark(format))
    })
    .description(format!("Toggle {format} on the current selection or caret."))
    .keywords([format.as_str(), "mark", "format"])
}

fn active_query(format: MarkFormat) -> QuerySpec {
    QuerySpec::new(format!("marks.is_{format}_active"), move |editor, _args| {
        Ok(Value::Bool(editor.is_mark_active(format)))
    })
}

impl EditorPlugin for MarksPlugin {
    fn id(&self) -> &'static str {
        "marks"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            toggle_command(MarkFormat::Bold, "Toggle bold"),
            toggle_command(MarkFormat::Italic, "Toggle italic"),
            toggle_command(MarkFormat::Underline, "Toggle underline"),
            toggle_command(MarkFormat::Code, "Toggle inline code"),
            CommandSpec::new("marks.toggle", "Toggle mark", |editor, args| {
                let name = string_arg(args.as_ref(), "format")?;
                let format = name.parse::<MarkFormat>().map_err(CommandError::new)?;
                run_edit(&format!("toggle {format}"), editor.toggle_mark(format))
            })
            .description("Toggle the mark named by args.format.")
            .args_example(serde_json::json!({ "format": "bold" })),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        let mut queries: Vec<QuerySpec> = MarkFormat::ALL.into_iter().map(active_query).collect();
        queries.push(QuerySpec::new("marks.get_active", |editor, _args| {
            serde_json::to_value(editor.active_marks())
                .map_err(|err| QueryError::new(format!("Failed to encode marks: {err}")))
        }));
        queries
    }

    fn hotkeys(&self) -> Vec<HotkeyBinding> {
        vec![
            HotkeyBinding::new("mod+b", HotkeyAction::command("marks.toggle_bold")),
            HotkeyBinding::new("mod+i", HotkeyAction::command("marks.toggle_italic")),
            HotkeyBinding::new("mod+u", HotkeyAction::command("marks.toggle_underline")),
            HotkeyBinding::new("mod+`", HotkeyAction::command("marks.toggle_code")),
        ]
    }
}
