//! Cached snapshot of what is selected in a surface and how it is formatted.
//!
//! A [`SelectionState`] is always rebuilt in full from the engine's payload
//! and swapped in; fields are never patched one at a time. Decoding never
//! fails: missing or ill-typed fields fall back to their defaults, and a
//! payload that cannot be read at all yields [`SelectionState::invalid`].

use crate::Rect;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Character-level formats. Several can apply to the same run of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Bold,
    Italic,
    Underline,
    Strike,
    Subscript,
    Superscript,
    Code,
}

impl Format {
    pub const ALL: [Format; 7] = [
        Format::Bold,
        Format::Italic,
        Format::Underline,
        Format::Strike,
        Format::Subscript,
        Format::Superscript,
        Format::Code,
    ];
}

/// Paragraph-level style tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParagraphStyle {
    #[serde(rename = "P")]
    Paragraph,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    #[serde(rename = "PRE")]
    Preformatted,
}

impl ParagraphStyle {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Paragraph => "P",
            Self::H1 => "H1",
            Self::H2 => "H2",
            Self::H3 => "H3",
            Self::H4 => "H4",
            Self::H5 => "H5",
            Self::H6 => "H6",
            Self::Preformatted => "PRE",
        }
    }
}

impl FromStr for ParagraphStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let style = match s.to_ascii_uppercase().as_str() {
            "P" => Self::Paragraph,
            "H1" => Self::H1,
            "H2" => Self::H2,
            "H3" => Self::H3,
            "H4" => Self::H4,
            "H5" => Self::H5,
            "H6" => Self::H6,
            "PRE" => Self::Preformatted,
            other => return Err(format!("unknown paragraph style {}", other)),
        };
        Ok(style)
    }
}

impl fmt::Display for ParagraphStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// List flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListType {
    #[serde(rename = "UL")]
    Bullet,
    #[serde(rename = "OL")]
    Numbered,
}

impl ListType {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Bullet => "UL",
            Self::Numbered => "OL",
        }
    }
}

impl FromStr for ListType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UL" => Ok(Self::Bullet),
            "OL" => Ok(Self::Numbered),
            other => Err(format!("unknown list type {}", other)),
        }
    }
}

/// Table border styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableBorder {
    /// Borders around every cell.
    #[default]
    Cell,
    /// Border under the header row only.
    Header,
    /// Border around the whole table only.
    Outer,
    None,
}

impl TableBorder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cell => "cell",
            Self::Header => "header",
            Self::Outer => "outer",
            Self::None => "none",
        }
    }
}

impl FromStr for TableBorder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cell" => Ok(Self::Cell),
            "header" => Ok(Self::Header),
            "outer" => Ok(Self::Outer),
            "none" => Ok(Self::None),
            other => Err(format!("unknown table border {}", other)),
        }
    }
}

/// Part of a table a delete applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableArea {
    Row,
    Col,
    Table,
}

impl TableArea {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Row => "row",
            Self::Col => "col",
            Self::Table => "table",
        }
    }
}

/// Whether the snapshot means anything, and which region it belongs to.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Validity {
    #[serde(deserialize_with = "lenient::flag")]
    pub valid: bool,
    #[serde(rename = "divid", deserialize_with = "lenient::opt")]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextSelection {
    #[serde(rename = "selection", deserialize_with = "lenient::opt")]
    pub selected: Option<String>,
    #[serde(rename = "selrect", deserialize_with = "lenient::opt")]
    pub rect: Option<Rect>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkState {
    #[serde(deserialize_with = "lenient::opt")]
    pub href: Option<String>,
    #[serde(rename = "link", deserialize_with = "lenient::opt")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageState {
    #[serde(deserialize_with = "lenient::opt")]
    pub src: Option<String>,
    #[serde(deserialize_with = "lenient::opt")]
    pub alt: Option<String>,
    #[serde(deserialize_with = "lenient::opt_count")]
    pub width: Option<u32>,
    #[serde(deserialize_with = "lenient::opt_count")]
    pub height: Option<u32>,
    /// Percentage of the natural size.
    #[serde(deserialize_with = "lenient::opt_count")]
    pub scale: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TableState {
    #[serde(rename = "table", deserialize_with = "lenient::flag")]
    pub in_table: bool,
    #[serde(rename = "thead", deserialize_with = "lenient::flag")]
    pub in_header: bool,
    #[serde(rename = "tbody", deserialize_with = "lenient::flag")]
    pub in_body: bool,
    /// The table has a header row.
    #[serde(deserialize_with = "lenient::flag")]
    pub header: bool,
    /// The header row spans all columns.
    #[serde(deserialize_with = "lenient::flag")]
    pub colspan: bool,
    #[serde(deserialize_with = "lenient::count")]
    pub rows: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub cols: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub row: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub col: u32,
    #[serde(deserialize_with = "lenient::border")]
    pub border: TableBorder,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParagraphState {
    #[serde(deserialize_with = "lenient::parsed")]
    pub style: Option<ParagraphStyle>,
    #[serde(deserialize_with = "lenient::parsed")]
    pub list: Option<ListType>,
    #[serde(rename = "li", deserialize_with = "lenient::flag")]
    pub list_item: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub quote: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatState {
    #[serde(deserialize_with = "lenient::flag")]
    pub bold: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub italic: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub underline: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub strike: bool,
    #[serde(rename = "sub", deserialize_with = "lenient::flag")]
    pub subscript: bool,
    #[serde(rename = "sup", deserialize_with = "lenient::flag")]
    pub superscript: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub code: bool,
}

/// Snapshot of the selection and its formatting context.
///
/// When `validity.valid` is false every other field is stale and must not
/// drive UI.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionState {
    #[serde(flatten)]
    pub validity: Validity,
    #[serde(flatten)]
    pub text: TextSelection,
    #[serde(flatten)]
    pub link: LinkState,
    #[serde(flatten)]
    pub image: ImageState,
    #[serde(flatten)]
    pub table: TableState,
    #[serde(flatten)]
    pub paragraph: ParagraphState,
    #[serde(flatten)]
    pub formats: FormatState,
}

impl SelectionState {
    /// The state consumers fall back to when nothing trustworthy is known.
    pub fn invalid() -> Self {
        Self::default()
    }

    /// Decode a JSON text payload; anything unreadable becomes [`Self::invalid`].
    pub fn decode(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::invalid();
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_value(value),
            Err(e) => {
                tracing::warn!(error = %e, "undecodable selection state, resetting to invalid");
                Self::invalid()
            }
        }
    }

    /// Decode an already-parsed payload.
    ///
    /// Engines return the state either as an object or as its JSON text.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(_) => serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "unusable selection state, resetting to invalid");
                Self::invalid()
            }),
            Value::String(text) => Self::decode(&text),
            Value::Null => Self::invalid(),
            other => {
                tracing::warn!(payload = %other, "selection state is not an object");
                Self::invalid()
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validity.valid
    }

    pub fn has_format(&self, format: Format) -> bool {
        if !self.is_valid() {
            return false;
        }
        let f = &self.formats;
        match format {
            Format::Bold => f.bold,
            Format::Italic => f.italic,
            Format::Underline => f.underline,
            Format::Strike => f.strike,
            Format::Subscript => f.subscript,
            Format::Superscript => f.superscript,
            Format::Code => f.code,
        }
    }

    /// Selected text, empty when the selection is collapsed.
    pub fn selected_text(&self) -> &str {
        self.text.selected.as_deref().unwrap_or("")
    }

    pub fn is_in_link(&self) -> bool {
        self.is_valid() && self.link.href.is_some()
    }

    /// A link can be inserted or edited here.
    pub fn is_linkable(&self) -> bool {
        self.is_valid() && (self.link.href.is_some() || !self.selected_text().is_empty())
    }

    pub fn is_in_image(&self) -> bool {
        self.is_valid() && self.image.src.is_some()
    }

    pub fn is_in_table(&self) -> bool {
        self.is_valid() && self.table.in_table
    }

    pub fn can_indent(&self) -> bool {
        self.is_valid() && (self.paragraph.list_item || self.paragraph.style.is_some())
    }

    pub fn can_outdent(&self) -> bool {
        self.is_valid() && (self.paragraph.list_item || self.paragraph.quote)
    }

    pub fn is_style_normal(&self) -> bool {
        self.is_valid() && self.paragraph.style == Some(ParagraphStyle::Paragraph)
    }
}

/// Field decoders that never fail; bad input turns into the field default.
mod lenient {
    use super::TableBorder;
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::str::FromStr;

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Bool(b) => b,
            Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
            Value::String(s) => s == "true" || s == "1",
            _ => false,
        })
    }

    fn as_count(value: Value) -> Option<u32> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
                .map(|n| n.min(u32::MAX as u64) as u32),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        Ok(as_count(Value::deserialize(d)?).unwrap_or(0))
    }

    pub fn opt_count<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        Ok(as_count(Value::deserialize(d)?))
    }

    pub fn opt<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(d)? {
            Value::Null => None,
            value => serde_json::from_value(value).ok(),
        })
    }

    pub fn parsed<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
    {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
    }

    pub fn border<'de, D: Deserializer<'de>>(d: D) -> Result<TableBorder, D::Error> {
        Ok(parsed(d)?.unwrap_or_default())
    }
}
