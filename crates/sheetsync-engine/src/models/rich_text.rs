use serde::{Deserialize, Serialize};

/// Styling flags carried by an inline span.
///
/// A span owns its own copy, taken from the parser state when the span is
/// emitted. Later state changes never reach spans that were already pushed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub code: bool,
}

impl Annotations {
    pub const PLAIN: Annotations = Annotations {
        bold: false,
        italic: false,
        underline: false,
        strikethrough: false,
        code: false,
    };

    /// Annotations seeded from the four style flags of a block variable binding.
    pub fn styled(bold: bool, italic: bool, underline: bool, strikethrough: bool) -> Self {
        Self {
            bold,
            italic,
            underline,
            strikethrough,
            code: false,
        }
    }

    fn code_only() -> Self {
        Self {
            code: true,
            ..Self::PLAIN
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Text,
    Equation,
    Code,
}

/// A run of text, code or math with uniform styling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineSpan {
    pub kind: SpanKind,
    pub content: String,
    pub annotations: Annotations,
    pub link: Option<String>,
}

impl InlineSpan {
    pub fn text(content: impl Into<String>, annotations: Annotations) -> Self {
        Self {
            kind: SpanKind::Text,
            content: content.into(),
            annotations: Annotations {
                code: false,
                ..annotations
            },
            link: None,
        }
    }

    pub fn plain(content: impl Into<String>) -> Self {
        Self::text(content, Annotations::PLAIN)
    }

    /// Code spans never inherit ambient styling.
    pub fn code(content: impl Into<String>) -> Self {
        Self {
            kind: SpanKind::Code,
            content: content.into(),
            annotations: Annotations::code_only(),
            link: None,
        }
    }

    pub fn equation(expression: impl Into<String>, annotations: Annotations) -> Self {
        Self {
            kind: SpanKind::Equation,
            content: expression.into(),
            annotations: Annotations {
                code: false,
                ..annotations
            },
            link: None,
        }
    }

    pub fn with_link(mut self, url: Option<String>) -> Self {
        self.link = url;
        self
    }

    pub fn is_plain_text(&self) -> bool {
        self.kind == SpanKind::Text
    }
}

/// Concatenated content of a rich text run, ignoring styling.
pub fn plain_text(spans: &[InlineSpan]) -> String {
    spans.iter().map(|s| s.content.as_str()).collect()
}

// Wire format of the document store. Rich text items look like
// `{"type": "text", "text": {"content": .., "link": {"url": ..}}, "annotations": {..}}`.

#[derive(Serialize, Deserialize, Default)]
struct WireAnnotations {
    #[serde(default)]
    bold: bool,
    #[serde(default)]
    italic: bool,
    #[serde(default)]
    strikethrough: bool,
    #[serde(default)]
    underline: bool,
    #[serde(default)]
    code: bool,
    #[serde(default = "default_color")]
    color: String,
}

fn default_color() -> String {
    "default".to_string()
}

impl From<Annotations> for WireAnnotations {
    fn from(a: Annotations) -> Self {
        Self {
            bold: a.bold,
            italic: a.italic,
            strikethrough: a.strikethrough,
            underline: a.underline,
            code: a.code,
            color: default_color(),
        }
    }
}

impl From<WireAnnotations> for Annotations {
    fn from(a: WireAnnotations) -> Self {
        Self {
            bold: a.bold,
            italic: a.italic,
            underline: a.underline,
            strikethrough: a.strikethrough,
            code: a.code,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireLink {
    url: String,
}

#[derive(Serialize, Deserialize)]
struct WireText {
    content: String,
    #[serde(default)]
    link: Option<WireLink>,
}

#[derive(Serialize, Deserialize)]
struct WireEquation {
    expression: String,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireSpan {
    Text {
        text: WireText,
        #[serde(default)]
        annotations: WireAnnotations,
    },
    Equation {
        equation: WireEquation,
        #[serde(default)]
        annotations: WireAnnotations,
    },
    Mention {
        #[serde(default)]
        plain_text: String,
        #[serde(default)]
        annotations: WireAnnotations,
    },
}

impl Serialize for InlineSpan {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let annotations = WireAnnotations::from(self.annotations);
        let wire = match self.kind {
            SpanKind::Text | SpanKind::Code => WireSpan::Text {
                text: WireText {
                    content: self.content.clone(),
                    link: self.link.clone().map(|url| WireLink { url }),
                },
                annotations,
            },
            SpanKind::Equation => WireSpan::Equation {
                equation: WireEquation {
                    expression: self.content.clone(),
                },
                annotations,
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InlineSpan {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let span = match WireSpan::deserialize(deserializer)? {
            WireSpan::Text { text, annotations } => {
                let annotations = Annotations::from(annotations);
                InlineSpan {
                    kind: if annotations.code {
                        SpanKind::Code
                    } else {
                        SpanKind::Text
                    },
                    content: text.content,
                    annotations,
                    link: text.link.map(|l| l.url),
                }
            }
            WireSpan::Equation {
                equation,
                annotations,
            } => InlineSpan::equation(equation.expression, annotations.into()),
            // Mentions only matter to us as the text they display.
            WireSpan::Mention {
                plain_text,
                annotations,
            } => InlineSpan::text(plain_text, annotations.into()),
        };
        Ok(span)
    }
}
