use core::fmt;
use std::collections::{BTreeMap, HashMap};

/// A single record returned by a store, keyed by attribute name.
///
/// The scanner never looks inside an item. It only moves items from the
/// store client into the final result.
pub type Item = HashMap<String, AttributeValue>;

/// A typed attribute value.
///
/// Numbers are carried as their decimal string form so that no precision is
/// lost between the store and the caller.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AttributeValue {
    /// A UTF-8 string.
    S(String),
    /// A number in decimal string form.
    N(String),
    /// Raw binary data.
    B(Vec<u8>),
    /// A boolean.
    Bool(bool),
    /// An explicit null.
    Null,
    /// An ordered list of values.
    L(Vec<AttributeValue>),
    /// A nested map of values.
    M(BTreeMap<String, AttributeValue>),
    /// A set of strings.
    Ss(Vec<String>),
    /// A set of numbers.
    Ns(Vec<String>),
    /// A set of binary values.
    Bs(Vec<Vec<u8>>),
}

impl AttributeValue {
    /// Returns the string payload if this is an [`AttributeValue::S`].
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number payload if this is an [`AttributeValue::N`].
    pub fn as_n(&self) -> Option<&str> {
        match self {
            Self::N(n) => Some(n),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::S(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::S(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        Self::N(value.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::N(value.to_string())
    }
}

/// One disjoint slice of a table's keyspace.
///
/// A segment is identified by its `index` within `total` segments. The pair
/// is handed to the store client as-is; how the store maps it onto its
/// partitions is up to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Segment {
    index: usize,
    total: usize,
}

impl Segment {
    /// Creates a segment, or `None` if `index` is not below `total`.
    pub const fn new(index: usize, total: usize) -> Option<Self> {
        if index < total {
            Some(Self { index, total })
        } else {
            None
        }
    }

    /// Enumerates every segment `0..total` in order.
    pub fn all(total: usize) -> impl Iterator<Item = Self> {
        (0..total).map(move |index| Self { index, total })
    }

    pub const fn index(&self) -> usize {
        self.index
    }

    pub const fn total(&self) -> usize {
        self.total
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.total)
    }
}

/// One batch of items returned by a single paginated request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    /// Number of items the store reports for this page.
    pub count: usize,
    /// `true` when the store has no further pages for the segment.
    pub is_last: bool,
}

impl Page {
    /// Builds a page whose `count` matches `items.len()`.
    pub fn new(items: Vec<Item>, is_last: bool) -> Self {
        Self {
            count: items.len(),
            items,
            is_last,
        }
    }

    /// An empty final page, as returned for an empty segment.
    pub fn empty_last() -> Self {
        Self::new(Vec::new(), true)
    }
}

/// The parameters for scanning one segment of a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentRequest {
    pub table: String,
    pub segment: Segment,
    /// Upper bound on items per page.
    pub page_limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_rejects_out_of_range_index() {
        assert!(Segment::new(3, 3).is_none());
        assert!(Segment::new(0, 0).is_none());
        let seg = Segment::new(2, 3).unwrap();
        assert_eq!(seg.index(), 2);
        assert_eq!(seg.total(), 3);
        assert_eq!(seg.to_string(), "2/3");
    }

    #[test]
    fn all_segments_cover_every_index_once() {
        let segments: Vec<_> = Segment::all(4).collect();
        assert_eq!(segments.len(), 4);
        for (i, seg) in segments.iter().enumerate() {
            assert_eq!(seg.index(), i);
            assert_eq!(seg.total(), 4);
        }
        assert_eq!(Segment::all(0).count(), 0);
    }

    #[test]
    fn page_count_tracks_items() {
        let mut item = Item::new();
        item.insert("pk".into(), "a".into());
        let page = Page::new(vec![item.clone(), item], false);
        assert_eq!(page.count, 2);
        assert!(!page.is_last);

        let last = Page::empty_last();
        assert_eq!(last.count, 0);
        assert!(last.is_last);
    }

    #[test]
    fn attribute_value_conversions() {
        assert_eq!(AttributeValue::from("x").as_s(), Some("x"));
        assert_eq!(AttributeValue::from(42_u64).as_n(), Some("42"));
        assert_eq!(AttributeValue::from(-7_i64).as_n(), Some("-7"));
        assert_eq!(AttributeValue::from(true), AttributeValue::Bool(true));
        assert_eq!(AttributeValue::Null.as_s(), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn attribute_value_serializes_with_type_tag() {
        let value = AttributeValue::S("hello".into());
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"S":"hello"}"#);
        let back: AttributeValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
