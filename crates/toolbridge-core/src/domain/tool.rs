//! Tool descriptors and invocation results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool definition advertised by a child server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name as the child server knows it (unprefixed).
    pub name: String,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for input parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

impl ToolDescriptor {
    /// Create a new tool descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

/// One content block in the shape the front-facing protocol server expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Plain text block.
    Text {
        /// The text payload.
        text: String,
    },
    /// Anything that is not a recognized text block is passed through as-is.
    Json {
        /// Raw content item from the child server.
        value: Value,
    },
}

impl ToolContent {
    /// Convert a child server's raw content array into front-server blocks.
    ///
    /// Items carrying a string `text` field become `Text`; everything else
    /// is passed through untouched rather than dropped.
    pub fn from_raw_content(raw: &Value) -> Vec<Self> {
        let Some(items) = raw.as_array() else {
            return vec![Self::Json { value: raw.clone() }];
        };

        items
            .iter()
            .map(|item| {
                item.get("text").and_then(Value::as_str).map_or_else(
                    || Self::Json {
                        value: item.clone(),
                    },
                    |text| Self::Text {
                        text: text.to_string(),
                    },
                )
            })
            .collect()
    }
}

/// Result of a proxied tool invocation, in front-server shape.
///
/// Transport and remote failures are represented as an error-shaped
/// response (`is_error = true`), never as a panic or an unhandled error
/// crossing the front server's handler boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    /// Content blocks returned to the front-facing caller.
    pub content: Vec<ToolContent>,
    /// Whether this response describes a failure.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResponse {
    /// Create a success response from content blocks.
    pub fn success(content: Vec<ToolContent>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// Create a success response holding a single text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::success(vec![ToolContent::Text { text: text.into() }])
    }

    /// Create an error-shaped response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// First text block, if any. Mostly useful in tests and diagnostics.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ToolContent::Text { text } => Some(text.as_str()),
            ToolContent::Json { .. } => None,
        })
    }
}
