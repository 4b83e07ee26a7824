//! Compiles a [`FilterSpec`] into a predicate and evaluates it against
//! documents. Unknown `$` operators and invalid regexes are rejected at
//! compile time, before any document is visited.

use metadata_core::{Document, FilterSpec, SortOrder, StoreError};
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;

const MAX_PATH_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone)]
pub enum Cond {
    Eq(JsonValue),
    Ne(JsonValue),
    Cmp(CmpOp, JsonValue),
    In(Vec<JsonValue>),
    Nin(Vec<JsonValue>),
    Exists(bool),
    Regex(Regex),
}

#[derive(Debug, Clone)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Nor(Vec<Predicate>),
    Text(String),
    Field { path: String, conds: Vec<Cond> },
}

fn invalid(msg: impl Into<String>) -> StoreError {
    StoreError::InvalidFilter(msg.into())
}

pub fn compile(spec: &FilterSpec) -> Result<Predicate, StoreError> {
    compile_map(&spec.0)
}

fn compile_map(map: &Map<String, JsonValue>) -> Result<Predicate, StoreError> {
    let mut preds = Vec::with_capacity(map.len());
    for (key, value) in map {
        let pred = match key.as_str() {
            "$and" => Predicate::And(compile_list(key, value)?),
            "$or" => Predicate::Or(compile_list(key, value)?),
            "$nor" => Predicate::Nor(compile_list(key, value)?),
            "$text" => {
                let needle = value
                    .get("$search")
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| invalid("$text requires a $search string"))?;
                Predicate::Text(needle.to_lowercase())
            }
            k if k.starts_with('$') => return Err(invalid(format!("unknown operator {k}"))),
            path => Predicate::Field {
                path: path.to_string(),
                conds: compile_conds(path, value)?,
            },
        };
        preds.push(pred);
    }
    Ok(Predicate::And(preds))
}

fn compile_list(op: &str, value: &JsonValue) -> Result<Vec<Predicate>, StoreError> {
    let items = value
        .as_array()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| invalid(format!("{op} requires a non-empty array")))?;
    items
        .iter()
        .map(|item| match item {
            JsonValue::Object(m) => compile_map(m),
            _ => Err(invalid(format!("{op} entries must be objects"))),
        })
        .collect()
}

fn is_operator_object(value: &JsonValue) -> bool {
    match value {
        JsonValue::Object(m) => !m.is_empty() && m.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

fn compile_conds(path: &str, value: &JsonValue) -> Result<Vec<Cond>, StoreError> {
    let ops = match value {
        JsonValue::Object(m) if is_operator_object(value) => m,
        _ => return Ok(vec![Cond::Eq(value.clone())]),
    };
    let mut conds = Vec::with_capacity(ops.len());
    for (op, arg) in ops {
        let cond = match op.as_str() {
            "$eq" => Cond::Eq(arg.clone()),
            "$ne" => Cond::Ne(arg.clone()),
            "$gt" => Cond::Cmp(CmpOp::Gt, arg.clone()),
            "$gte" => Cond::Cmp(CmpOp::Gte, arg.clone()),
            "$lt" => Cond::Cmp(CmpOp::Lt, arg.clone()),
            "$lte" => Cond::Cmp(CmpOp::Lte, arg.clone()),
            "$in" | "$nin" => {
                let list = arg
                    .as_array()
                    .ok_or_else(|| invalid(format!("{op} on {path} requires an array")))?
                    .clone();
                if op == "$in" {
                    Cond::In(list)
                } else {
                    Cond::Nin(list)
                }
            }
            "$exists" => Cond::Exists(
                arg.as_bool()
                    .ok_or_else(|| invalid(format!("$exists on {path} requires a boolean")))?,
            ),
            "$regex" => {
                let pattern = arg
                    .as_str()
                    .ok_or_else(|| invalid(format!("$regex on {path} requires a string")))?;
                let options = ops.get("$options").and_then(JsonValue::as_str).unwrap_or("");
                Cond::Regex(build_regex(pattern, options)?)
            }
            "$options" if ops.contains_key("$regex") => continue,
            other => return Err(invalid(format!("unknown operator {other} on {path}"))),
        };
        conds.push(cond);
    }
    Ok(conds)
}

fn build_regex(pattern: &str, options: &str) -> Result<Regex, StoreError> {
    let mut b = RegexBuilder::new(pattern);
    for c in options.chars() {
        match c {
            'i' => b.case_insensitive(true),
            'm' => b.multi_line(true),
            's' => b.dot_matches_new_line(true),
            'x' => b.ignore_whitespace(true),
            other => return Err(invalid(format!("unsupported regex option {other}"))),
        };
    }
    b.build().map_err(|e| invalid(format!("bad regex: {e}")))
}

impl Predicate {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Predicate::And(ps) => ps.iter().all(|p| p.matches(doc)),
            Predicate::Or(ps) => ps.iter().any(|p| p.matches(doc)),
            Predicate::Nor(ps) => !ps.iter().any(|p| p.matches(doc)),
            Predicate::Text(needle) => doc.values().any(|v| contains_text(v, needle)),
            Predicate::Field { path, conds } => {
                let value = lookup(doc, path);
                conds.iter().all(|c| c.holds(value))
            }
        }
    }
}

impl Cond {
    fn holds(&self, value: Option<&JsonValue>) -> bool {
        match self {
            Cond::Eq(lit) => equals(value, lit),
            Cond::Ne(lit) => !equals(value, lit),
            Cond::Cmp(op, lit) => value.is_some_and(|v| {
                any_element(v, |x| {
                    comparable(x, lit).is_some_and(|ord| match op {
                        CmpOp::Gt => ord == Ordering::Greater,
                        CmpOp::Gte => ord != Ordering::Less,
                        CmpOp::Lt => ord == Ordering::Less,
                        CmpOp::Lte => ord != Ordering::Greater,
                    })
                })
            }),
            Cond::In(list) => list.iter().any(|lit| equals(value, lit)),
            Cond::Nin(list) => !list.iter().any(|lit| equals(value, lit)),
            Cond::Exists(want) => value.is_some() == *want,
            Cond::Regex(re) => value.is_some_and(|v| {
                any_element(v, |x| x.as_str().is_some_and(|s| re.is_match(s)))
            }),
        }
    }
}

/// Equality with array membership; a `null` literal also matches a missing
/// field.
fn equals(value: Option<&JsonValue>, lit: &JsonValue) -> bool {
    match value {
        None => lit.is_null(),
        Some(v) => {
            json_eq(v, lit)
                || matches!(v, JsonValue::Array(a) if a.iter().any(|x| json_eq(x, lit)))
        }
    }
}

fn any_element(v: &JsonValue, f: impl Fn(&JsonValue) -> bool) -> bool {
    match v {
        JsonValue::Array(a) => a.iter().any(&f),
        other => f(other),
    }
}

fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        (JsonValue::Array(x), JsonValue::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| json_eq(p, q))
        }
        (JsonValue::Object(x), JsonValue::Object(y)) => {
            x.len() == y.len() && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| json_eq(v, w)))
        }
        _ => a == b,
    }
}

/// Ordering between values of the same kind; `None` across kinds.
fn comparable(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(_), JsonValue::Number(_))
        | (JsonValue::String(_), JsonValue::String(_))
        | (JsonValue::Bool(_), JsonValue::Bool(_)) => Some(compare_json(a, b)),
        _ => None,
    }
}

fn contains_text(v: &JsonValue, needle: &str) -> bool {
    match v {
        JsonValue::String(s) => s.to_lowercase().contains(needle),
        JsonValue::Array(a) => a.iter().any(|x| contains_text(x, needle)),
        JsonValue::Object(m) => m.values().any(|x| contains_text(x, needle)),
        _ => false,
    }
}

/// Resolves a dotted path through nested objects.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a JsonValue> {
    if let Some(v) = doc.get(path) {
        return Some(v);
    }
    let mut parts = path.split('.');
    let mut cur = doc.get(parts.next()?)?;
    for (depth, part) in parts.enumerate() {
        if depth >= MAX_PATH_DEPTH {
            return None;
        }
        cur = cur.as_object()?.get(part)?;
    }
    Some(cur)
}

pub fn compare_json(a: &JsonValue, b: &JsonValue) -> Ordering {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (JsonValue::String(x), JsonValue::String(y)) => x.cmp(y),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &JsonValue) -> u8 {
    match v {
        JsonValue::Null => 0,
        JsonValue::Bool(_) => 1,
        JsonValue::Number(_) => 2,
        JsonValue::String(_) => 3,
        JsonValue::Array(_) => 4,
        JsonValue::Object(_) => 5,
    }
}

/// Compares on each key in turn; missing values sort before present ones.
pub fn compare_docs(a: &Document, b: &Document, keys: &[String], order: SortOrder) -> Ordering {
    for key in keys {
        let ord = match (lookup(a, key), lookup(b, key)) {
            (Some(x), Some(y)) => compare_json(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return match order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            };
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: JsonValue) -> Document {
        v.as_object().cloned().unwrap()
    }

    fn matches(spec: JsonValue, d: JsonValue) -> bool {
        let spec: FilterSpec = serde_json::from_value(spec).unwrap();
        compile(&spec).unwrap().matches(&doc(d))
    }

    #[test]
    fn equality_and_arrays() {
        assert!(matches(json!({"did": "D1"}), json!({"did": "D1", "x": 1})));
        assert!(!matches(json!({"did": "D2"}), json!({"did": "D1"})));
        assert!(matches(json!({"tags": "a"}), json!({"tags": ["b", "a"]})));
        assert!(matches(json!({"n": 1}), json!({"n": 1.0})));
        assert!(matches(json!({"gone": null}), json!({"did": "D1"})));
    }

    #[test]
    fn nested_paths() {
        let d = json!({"sample": {"material": {"name": "Si"}}});
        assert!(matches(json!({"sample.material.name": "Si"}), d.clone()));
        assert!(!matches(json!({"sample.material.name": "Ge"}), d.clone()));
        assert!(matches(json!({"sample.size": {"$exists": false}}), d));
    }

    #[test]
    fn comparisons_do_not_cross_types() {
        assert!(matches(json!({"age": {"$gt": 3, "$lte": 5}}), json!({"age": 5})));
        assert!(!matches(json!({"age": {"$gt": 3}}), json!({"age": "9"})));
        assert!(matches(json!({"age": {"$ne": 3}}), json!({"age": 4})));
        assert!(matches(json!({"age": {"$in": [1, 4]}}), json!({"age": 4})));
        assert!(matches(json!({"age": {"$nin": [1, 4]}}), json!({"age": 5})));
    }

    #[test]
    fn logical_operators_and_text() {
        let d = json!({"beamline": "3a", "note": "Thin FILM sample"});
        assert!(matches(json!({"$or": [{"beamline": "1b"}, {"beamline": "3a"}]}), d.clone()));
        assert!(!matches(json!({"$nor": [{"beamline": "3a"}]}), d.clone()));
        assert!(matches(
            json!({"$and": [{"beamline": "3a"}, {"$text": {"$search": "film"}}]}),
            d.clone()
        ));
        assert!(matches(json!({"note": {"$regex": "^thin", "$options": "i"}}), d));
    }

    #[test]
    fn bad_filters_are_rejected() {
        let bad = [
            json!({"$where": "1"}),
            json!({"age": {"$near": 1}}),
            json!({"$or": []}),
            json!({"$and": [1]}),
            json!({"name": {"$regex": "("}}),
            json!({"age": {"$in": 3}}),
            json!({"$text": "film"}),
        ];
        for spec in bad {
            let spec: FilterSpec = serde_json::from_value(spec).unwrap();
            assert!(matches!(compile(&spec), Err(StoreError::InvalidFilter(_))), "{spec}");
        }
    }

    #[test]
    fn sort_orders_missing_first_then_by_key_list() {
        let a = doc(json!({"age": 5, "name": "b"}));
        let b = doc(json!({"age": 5, "name": "a"}));
        let c = doc(json!({"name": "z"}));
        let keys = vec!["age".to_string(), "name".to_string()];
        assert_eq!(compare_docs(&a, &b, &keys, SortOrder::Ascending), Ordering::Greater);
        assert_eq!(compare_docs(&c, &a, &keys, SortOrder::Ascending), Ordering::Less);
        assert_eq!(compare_docs(&c, &a, &keys, SortOrder::Descending), Ordering::Greater);
    }
}
