mod autoformat;
mod block_type;
mod document;
mod editor;
mod error;
mod hotkey;
mod inline;
mod link;
mod marks;
mod ops;
mod plugin;
mod range;
mod store;
mod transforms;
pub mod value;

pub use crate::autoformat::shortcut_kind;
pub use crate::document::*;
pub use crate::editor::*;
pub use crate::error::*;
pub use crate::hotkey::*;
pub use crate::link::is_url;
pub use crate::ops::*;
pub use crate::plugin::*;
pub use crate::range::*;
pub use crate::store::*;
pub use crate::transforms::*;
