use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;
use crate::error::ValueError;

const DEFAULT_SCHEMA: &str = "manos-rich-text";
const DEFAULT_VERSION: u32 = 1;

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_version() -> u32 {
    DEFAULT_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentValue {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub document: Document,
}

impl DocumentValue {
    pub fn from_document(document: Document) -> Self {
        Self {
            schema: default_schema(),
            version: default_version(),
            document,
        }
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn to_json_pretty(&self) -> Result<String, ValueError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub fn to_json(doc: &Document) -> Result<String, ValueError> {
    Ok(serde_json::to_string(doc)?)
}

pub fn from_json(json: &str) -> Result<Document, ValueError> {
    let value: Value = serde_json::from_str(json)?;
    let document = if value.get("document").is_some() {
        let envelope = DocumentValue::deserialize(value)?;
        if envelope.version > DEFAULT_VERSION {
            return Err(ValueError::UnsupportedVersion {
                found: envelope.version,
                supported: DEFAULT_VERSION,
            });
        }
        envelope.into_document()
    } else {
        Document::deserialize(value)?
    };
    document.validate()?;
    Ok(document)
}
