use thiserror::Error;

use crate::document::ElementKind;
use crate::ops::Path;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: Path, reason: String },

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("point {path:?}:{offset} is out of range")]
    OutOfRange { path: Path, offset: usize },

    #[error("range cannot be wrapped in an inline element")]
    NotInlineCandidate,

    #[error("selection intersects an existing link")]
    NestedLink,

    #[error("selection is collapsed")]
    EmptySelection,

    #[error("normalization did not converge after {0} iterations")]
    NormalizeDidNotConverge(usize),
}

impl TransformError {
    pub(crate) fn invalid_path(path: &[usize], reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_vec(),
            reason: reason.into(),
        }
    }

    pub(crate) fn out_of_range(path: &[usize], offset: usize) -> Self {
        Self::OutOfRange {
            path: path.to_vec(),
            offset,
        }
    }

    /// Plugin-level precondition failures. Commands degrade these to no-ops.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NotInlineCandidate | Self::NestedLink | Self::EmptySelection
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("{kind:?} element at {path:?} has no children")]
    EmptyElement { kind: ElementKind, path: Path },

    #[error("{parent:?} element at {path:?} cannot contain {child}")]
    InvalidChild {
        parent: ElementKind,
        child: String,
        path: Path,
    },

    #[error("document root cannot contain {child} at {path:?}")]
    InvalidRootChild { child: String, path: Path },

    #[error("attribute {key:?} is reserved")]
    ReservedAttribute { key: String, path: Path },

    #[error("no registered plugin provides {0:?} elements")]
    UnknownKind(ElementKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate node spec kind: {0}")]
    DuplicateKind(ElementKind),

    #[error("duplicate command id: {0}")]
    DuplicateCommand(String),

    #[error("duplicate query id: {0}")]
    DuplicateQuery(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HotkeyError {
    #[error("empty key combination")]
    Empty,

    #[error("unknown modifier {0:?}")]
    UnknownModifier(String),

    #[error("key combination {0:?} has no key")]
    MissingKey(String),

    #[error("key combination {0:?} names more than one key")]
    MultipleKeys(String),
}

#[derive(Debug, Error)]
pub enum ValueError {
    #[error("failed to decode document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid document: {0}")]
    Schema(#[from] SchemaError),

    #[error("unsupported document version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failed: {0}")]
    Backend(String),

    #[error(transparent)]
    Value(#[from] ValueError),
}
