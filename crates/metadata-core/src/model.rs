use crate::filter::FilterSpec;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// Name of the identifier field every stored document carries.
pub const DID_FIELD: &str = "did";

/// A schema-less metadata record.
pub type Document = Map<String, JsonValue>;

/// Extracts the document identifier: a non-empty string, nothing else.
pub fn document_did(doc: &Document) -> Option<String> {
    match doc.get(DID_FIELD)? {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

// Wire form is the integer convention (1 / -1); strings are accepted too.
impl Serialize for SortOrder {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SortOrder::Ascending => serializer.serialize_i64(1),
            SortOrder::Descending => serializer.serialize_i64(-1),
        }
    }
}

impl<'de> Deserialize<'de> for SortOrder {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderVisitor;

        impl<'de> Visitor<'de> for OrderVisitor {
            type Value = SortOrder;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("1, -1, \"asc\" or \"desc\"")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<SortOrder, E> {
                match v {
                    1 | 0 => Ok(SortOrder::Ascending),
                    -1 => Ok(SortOrder::Descending),
                    other => Err(E::custom(format!("invalid sort order {other}"))),
                }
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<SortOrder, E> {
                let v = i64::try_from(v)
                    .map_err(|_| E::custom(format!("invalid sort order {v}")))?;
                self.visit_i64(v)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<SortOrder, E> {
                match v.to_ascii_lowercase().as_str() {
                    "asc" | "ascending" => Ok(SortOrder::Ascending),
                    "desc" | "descending" => Ok(SortOrder::Descending),
                    other => Err(E::custom(format!("invalid sort order {other:?}"))),
                }
            }
        }

        deserializer.deserialize_any(OrderVisitor)
    }
}

fn unbounded() -> i64 {
    -1
}

/// Query portion of a search/count request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceQuery {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub spec: Option<FilterSpec>,
    #[serde(default)]
    pub idx: usize,
    #[serde(default = "unbounded")]
    pub limit: i64,
    #[serde(default)]
    pub sort_keys: Vec<String>,
    #[serde(default)]
    pub sort_order: SortOrder,
}

impl Default for ServiceQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            spec: None,
            idx: 0,
            limit: unbounded(),
            sort_keys: Vec::new(),
            sort_order: SortOrder::Ascending,
        }
    }
}

impl ServiceQuery {
    pub fn page(&self) -> Page {
        Page::new(self.idx, self.limit)
    }
}

/// Body of `/search` and `/count`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceRequest {
    #[serde(default)]
    pub client: String,
    pub service_query: ServiceQuery,
}

/// Pagination window: skip `idx` matches, then take at most `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Page {
    pub idx: usize,
    pub limit: Option<usize>,
}

impl Page {
    /// `limit <= 0` means unbounded.
    pub fn new(idx: usize, limit: i64) -> Self {
        let limit = if limit > 0 { Some(limit as usize) } else { None };
        Self { idx, limit }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        let it = items.into_iter().skip(self.idx);
        match self.limit {
            Some(l) => it.take(l).collect(),
            None => it.collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ResultSet {
    pub nrecords: u64,
    #[serde(default)]
    pub records: Vec<Document>,
}

impl ResultSet {
    pub fn records(nrecords: u64, records: Vec<Document>) -> Self {
        Self { nrecords, records }
    }

    pub fn count(nrecords: u64) -> Self {
        Self {
            nrecords,
            records: Vec::new(),
        }
    }
}

/// Resolved caller identity, produced by the server's identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserIdentity {
    pub user: String,
    #[serde(default)]
    pub attributes: Map<String, JsonValue>,
}

impl UserIdentity {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            attributes: Map::new(),
        }
    }
}
