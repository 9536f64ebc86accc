use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::editor::Editor;
use crate::error::HotkeyError;
use crate::plugin::EditorPlugin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Mac,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Mac
        } else {
            Platform::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct KeyCombo {
    pub key: String,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl KeyCombo {
    pub fn new(key: impl Into<String>, ctrl: bool, alt: bool, shift: bool, meta: bool) -> Self {
        let key = canonical_key(&key.into());
        // Shift is part of the character for symbols like `&`.
        let mut chars = key.chars();
        let implied_shift = matches!((chars.next(), chars.next()), (Some(c), None) if !c.is_alphabetic());
        Self {
            shift: shift && !implied_shift,
            key,
            ctrl,
            alt,
            meta,
        }
    }

    /// Parses `mod+shift+z` style strings. Modifiers may come in any order;
    /// `mod` is Cmd on macOS and Ctrl elsewhere.
    pub fn parse(combo: &str, platform: Platform) -> Result<Self, HotkeyError> {
        let trimmed = combo.trim();
        if trimmed.is_empty() {
            return Err(HotkeyError::Empty);
        }
        let tokens: Vec<&str> = trimmed.split('+').map(str::trim).collect();
        let (mut ctrl, mut alt, mut shift, mut meta) = (false, false, false, false);
        let mut key: Option<String> = None;

        for (ix, token) in tokens.iter().enumerate() {
            if token.is_empty() {
                return Err(HotkeyError::MissingKey(combo.to_string()));
            }
            match token.to_ascii_lowercase().as_str() {
                "mod" => match platform {
                    Platform::Mac => meta = true,
                    Platform::Other => ctrl = true,
                },
                "ctrl" | "control" => ctrl = true,
                "cmd" | "command" | "meta" | "super" => meta = true,
                "alt" | "option" | "opt" => alt = true,
                "shift" => shift = true,
                other if ix + 1 == tokens.len() => {
                    if key.is_some() {
                        return Err(HotkeyError::MultipleKeys(combo.to_string()));
                    }
                    key = Some(other.to_string());
                }
                other if other.chars().count() == 1 => {
                    return Err(HotkeyError::MultipleKeys(combo.to_string()));
                }
                other => return Err(HotkeyError::UnknownModifier(other.to_string())),
            }
        }

        let key = key.ok_or_else(|| HotkeyError::MissingKey(combo.to_string()))?;
        Ok(Self::new(key, ctrl, alt, shift, meta))
    }
}

fn canonical_key(key: &str) -> String {
    let lower = if key.chars().count() == 1 {
        key.to_lowercase()
    } else {
        key.to_ascii_lowercase()
    };
    match lower.as_str() {
        "space" | "spacebar" => " ".to_string(),
        "return" => "enter".to_string(),
        "esc" => "escape".to_string(),
        "del" => "delete".to_string(),
        "plus" => "+".to_string(),
        _ => lower,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyEvent {
    pub key: String,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl KeyEvent {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn alt(mut self) -> Self {
        self.alt = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn meta(mut self) -> Self {
        self.meta = true;
        self
    }

    pub fn combo(&self) -> KeyCombo {
        KeyCombo::new(self.key.as_str(), self.ctrl, self.alt, self.shift, self.meta)
    }

    pub fn printable_char(&self) -> Option<char> {
        let mut chars = self.key.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if !c.is_control() => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HotkeyAction {
    Command {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
    },
    InsertText {
        text: String,
    },
}

impl HotkeyAction {
    pub fn command(id: impl Into<String>) -> Self {
        HotkeyAction::Command {
            id: id.into(),
            args: None,
        }
    }

    pub fn insert_text(text: impl Into<String>) -> Self {
        HotkeyAction::InsertText { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HotkeyBinding {
    pub combo: String,
    pub action: HotkeyAction,
}

impl HotkeyBinding {
    pub fn new(combo: impl Into<String>, action: HotkeyAction) -> Self {
        Self {
            combo: combo.into(),
            action,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HotkeyMap {
    bindings: HashMap<KeyCombo, HotkeyAction>,
}

impl HotkeyMap {
    pub fn build(
        defaults: &[HotkeyBinding],
        overrides: &BTreeMap<String, HotkeyAction>,
        platform: Platform,
    ) -> Self {
        let mut map = Self::default();
        let all = defaults
            .iter()
            .map(|binding| (binding.combo.as_str(), &binding.action))
            .chain(overrides.iter().map(|(combo, action)| (combo.as_str(), action)));
        for (combo, action) in all {
            match KeyCombo::parse(combo, platform) {
                Ok(parsed) => {
                    map.bindings.insert(parsed, action.clone());
                }
                Err(err) => tracing::warn!(combo, %err, "ignoring hotkey binding"),
            }
        }
        map
    }

    pub fn lookup(&self, combo: &KeyCombo) -> Option<&HotkeyAction> {
        self.bindings.get(combo)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Handled,
    Inserted,
    Ignored,
}

impl Editor {
    pub fn hotkeys(&self) -> &HotkeyMap {
        &self.hotkeys
    }

    pub fn handle_key(&mut self, event: &KeyEvent) -> KeyOutcome {
        if let Some(action) = self.hotkeys.lookup(&event.combo()).cloned() {
            self.dispatch_hotkey(action);
            return KeyOutcome::Handled;
        }
        if event.ctrl || event.meta || event.alt {
            return KeyOutcome::Ignored;
        }

        let result = match event.combo().key.as_str() {
            "enter" => self.insert_break(),
            "backspace" => self.delete_backward(),
            "delete" => self.delete_forward(),
            _ => {
                let Some(ch) = event.printable_char() else {
                    return KeyOutcome::Ignored;
                };
                if let Err(err) = self.insert_text(ch.encode_utf8(&mut [0; 4])) {
                    tracing::warn!(%err, "failed to insert typed text");
                }
                return KeyOutcome::Inserted;
            }
        };
        if let Err(err) = result {
            tracing::warn!(key = %event.key, %err, "structural edit failed");
        }
        KeyOutcome::Handled
    }

    fn dispatch_hotkey(&mut self, action: HotkeyAction) {
        match action {
            HotkeyAction::Command { id, args } => {
                if let Err(err) = self.run_command(&id, args) {
                    tracing::warn!(command = %id, %err, "hotkey command failed");
                }
            }
            HotkeyAction::InsertText { text } => {
                if let Err(err) = self.insert_text(&text) {
                    tracing::warn!(%err, "hotkey text insertion failed");
                }
            }
        }
    }
}

pub(crate) struct TextShortcutsPlugin;

impl EditorPlugin for TextShortcutsPlugin {
    fn id(&self) -> &'static str {
        "text_shortcuts"
    }

    fn hotkeys(&self) -> Vec<HotkeyBinding> {
        vec![HotkeyBinding::new("&", HotkeyAction::insert_text("and"))]
    }
}
