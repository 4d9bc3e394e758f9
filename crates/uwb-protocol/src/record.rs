//! Message layouts and decoded records
//!
//! Each EVB1000 report line starts with a 3-character tag that selects a
//! fixed field layout. The layouts live in a static dispatch table that is
//! resolved once per line; individual fields never re-branch on the tag.

/// 3-character message tag at the start of each report line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Tag position report: id + trilaterated x/y/z
    Tpr,
    /// Anchor positions report: id + four anchor x/y/z triples
    Apr,
    /// Anchor-to-anchor auto-ranging report
    Arr,
    /// Tag ranging report: id + ranges to four anchors
    Trr,
}

impl Tag {
    /// Parse a 3-character tag, `None` if unknown
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "tpr" => Some(Tag::Tpr),
            "apr" => Some(Tag::Apr),
            "arr" => Some(Tag::Arr),
            "trr" => Some(Tag::Trr),
            _ => None,
        }
    }

    /// The tag as it appears on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Tpr => "tpr",
            Tag::Apr => "apr",
            Tag::Arr => "arr",
            Tag::Trr => "trr",
        }
    }

    /// Field layout for this tag
    pub fn spec(&self) -> &'static MessageSpec {
        // SPECS is ordered to match the enum discriminants
        &SPECS[*self as usize]
    }

    /// All known tags
    pub fn all() -> &'static [Tag] {
        &[Tag::Tpr, Tag::Apr, Tag::Arr, Tag::Trr]
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of one message field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Hex text token decoded as a non-negative integer
    Unsigned,
    /// 8 hex characters decoded as big-endian IEEE-754 bits
    Float,
    /// Token passed through unchanged
    Text,
}

impl FieldType {
    /// Human-readable name, used in decode diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Unsigned => "unsigned",
            FieldType::Float => "float",
            FieldType::Text => "string",
        }
    }
}

/// Static field layout for one message tag
#[derive(Debug)]
pub struct MessageSpec {
    /// Tag this layout belongs to
    pub tag: Tag,
    /// Ordered (name, type) pairs for the tokens after the tag
    pub fields: &'static [(&'static str, FieldType)],
}

use FieldType::{Float, Text, Unsigned};

static SPECS: [MessageSpec; 4] = [
    MessageSpec {
        tag: Tag::Tpr,
        fields: &[
            ("id", Unsigned),
            ("x", Float),
            ("y", Float),
            ("z", Float),
        ],
    },
    MessageSpec {
        tag: Tag::Apr,
        fields: &[
            ("id", Unsigned),
            ("a0_x", Float),
            ("a0_y", Float),
            ("a0_z", Float),
            ("a1_x", Float),
            ("a1_y", Float),
            ("a1_z", Float),
            ("a2_x", Float),
            ("a2_y", Float),
            ("a2_z", Float),
            ("a3_x", Float),
            ("a3_y", Float),
            ("a3_z", Float),
        ],
    },
    MessageSpec {
        tag: Tag::Arr,
        fields: &[
            ("id", Unsigned),
            ("master_id", Unsigned),
            ("src_id", Unsigned),
            ("dest_id", Unsigned),
            ("range", Float),
            ("flag", Text),
        ],
    },
    MessageSpec {
        tag: Tag::Trr,
        fields: &[
            ("id", Unsigned),
            ("range_num", Unsigned),
            ("r0", Unsigned),
            ("r1", Unsigned),
            ("r2", Unsigned),
            ("r3", Unsigned),
        ],
    },
];

/// Key under which every record exposes its own tag text
pub const TAG_FIELD: &str = "msg_type";

/// A single decoded field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Decoded unsigned integer
    Unsigned(u64),
    /// Decoded 32-bit float
    Float(f32),
    /// Pass-through text token
    Text(String),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Unsigned(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
        }
    }
}

impl Value {
    /// Unsigned payload, if this value is one
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            Value::Unsigned(v) => Some(*v),
            _ => None,
        }
    }

    /// Float payload, if this value is one
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// One fully decoded report line
///
/// Fields keep their wire order; the first field is always
/// [`TAG_FIELD`] carrying the tag text, so sinks that write records
/// generically (CSV headers, meters) see one consistent shape.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    tag: Tag,
    fields: Vec<(&'static str, Value)>,
}

impl DecodedRecord {
    pub(crate) fn new(tag: Tag, mut values: Vec<Value>) -> Self {
        let spec = tag.spec();
        debug_assert_eq!(values.len(), spec.fields.len());

        let mut fields = Vec::with_capacity(values.len() + 1);
        fields.push((TAG_FIELD, Value::Text(tag.as_str().to_string())));
        for (value, (name, _)) in values.drain(..).zip(spec.fields) {
            fields.push((*name, value));
        }
        Self { tag, fields }
    }

    /// Message tag
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Ordered (name, value) pairs, tag field first
    pub fn fields(&self) -> &[(&'static str, Value)] {
        &self.fields
    }

    /// Look up a field by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    /// The reporting device's in-message id, present in every layout
    pub fn device_id(&self) -> u64 {
        self.get("id").and_then(Value::as_unsigned).unwrap_or(0)
    }
}
