/// Shape of one content segment returned by the upstream model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Code,
    Other(String),
}

impl From<&str> for ContentKind {
    fn from(s: &str) -> Self {
        match s {
            "output_text" | "text" => ContentKind::Text,
            "code" => ContentKind::Code,
            other => ContentKind::Other(other.to_string()),
        }
    }
}

/// One `{type, text}` segment of a generation. Missing text is kept as empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentBlock {
    pub kind: ContentKind,
    pub text: String,
}

impl ContentBlock {
    pub fn new(kind: impl Into<ContentKind>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: text.into(),
        }
    }

    pub fn is_code(&self) -> bool {
        self.kind == ContentKind::Code
    }
}

/// Normalized result of a single upstream call.
#[derive(Clone, Debug)]
pub struct Generation {
    /// Id assigned by the upstream API; becomes the stored response id.
    pub response_id: String,
    /// Ordered content segments, possibly empty when the output was malformed.
    pub blocks: Vec<ContentBlock>,
}

impl Generation {
    /// Text of the first segment, or `None` when it is missing or empty.
    pub fn primary_text(&self) -> Option<&str> {
        self.blocks
            .first()
            .map(|b| b.text.as_str())
            .filter(|t| !t.trim().is_empty())
    }
}
