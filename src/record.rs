//! Records, attribute filters and vector-field extraction.
//!
//! A [`Record`] is a JSON object addressed by [`RecordId`]. Fields are read
//! with dotted paths such as `embeddings.text_vector`, which walk nested
//! objects.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Dense embedding vector.
pub type Vector = Vec<f64>;

/// Opaque, totally ordered identifier of a record in the external store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A record as returned by the store: an id plus its attribute document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Build a record from a JSON value. Non-object values yield an empty
    /// document.
    pub fn from_json(id: impl Into<RecordId>, value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(id, fields)
    }

    /// Look up a dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.fields, path)
    }

    /// Extract the vector stored at `path`, if there is a usable one.
    ///
    /// See [`extract_vector`] for the accepted layouts.
    pub fn vector(&self, path: &str) -> Option<Vector> {
        self.get(path).and_then(extract_vector)
    }

    /// Copy of this record keeping only the top-level fields that `projection`
    /// touches.
    pub fn project(&self, projection: &Projection) -> Record {
        match projection {
            Projection::All => self.clone(),
            Projection::Fields(paths) => {
                let mut fields = Map::new();
                for path in paths {
                    let head = path.split('.').next().unwrap_or(path);
                    if let Some(v) = self.fields.get(head) {
                        fields.insert(head.to_owned(), v.clone());
                    }
                }
                Record::new(self.id.clone(), fields)
            }
        }
    }
}

/// A record together with its similarity to the query vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record: Record,
    pub score: f64,
}

/// Which fields a fetch should materialize.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    All,
    /// Only the top-level fields named by these dotted paths.
    Fields(Vec<String>),
}

impl Projection {
    pub fn field(path: impl Into<String>) -> Self {
        Projection::Fields(vec![path.into()])
    }
}

fn lookup<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = fields.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn numeric_array(value: &Value) -> Option<Vector> {
    value
        .as_array()?
        .iter()
        .map(Value::as_f64)
        .collect::<Option<Vector>>()
}

/// Highest chunk index probed when reassembling a chunked vector.
pub const MAX_VECTOR_CHUNKS: usize = 64;

/// Turn a stored field value into a vector.
///
/// Accepted layouts:
/// - a non-empty array of numbers;
/// - an object of `chunk_1`, `chunk_2`, ... numeric arrays, concatenated in
///   chunk order; missing chunk numbers up to [`MAX_VECTOR_CHUNKS`] are
///   skipped, so a gap shortens the vector rather than ending it;
/// - an object whose values are numeric arrays, concatenated in key order.
///
/// Anything else, including an empty result, is `None`.
pub fn extract_vector(value: &Value) -> Option<Vector> {
    let vector = match value {
        Value::Array(_) => numeric_array(value)?,
        Value::Object(map) => {
            let mut out = Vector::new();
            for i in 1..=MAX_VECTOR_CHUNKS {
                if let Some(chunk) = map.get(&format!("chunk_{i}")) {
                    out.extend(numeric_array(chunk)?);
                }
            }
            if out.is_empty() {
                // `serde_json::Map` iterates in key order.
                for v in map.values() {
                    out.extend(numeric_array(v)?);
                }
            }
            out
        }
        _ => return None,
    };
    (!vector.is_empty()).then_some(vector)
}

/// A single attribute predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// `field == value`. When the field holds an array, membership counts.
    Eq { field: String, value: Value },
    /// `field` equals one of `values`.
    In { field: String, values: Vec<Value> },
    /// Numeric `min <= field <= max`; either bound may be open.
    Range {
        field: String,
        min: Option<f64>,
        max: Option<f64>,
    },
}

impl Predicate {
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Predicate::Eq { field, value } => match record.get(field) {
                Some(Value::Array(items)) if !value.is_array() => items.contains(value),
                Some(v) => v == value,
                None => false,
            },
            Predicate::In { field, values } => match record.get(field) {
                Some(Value::Array(items)) => items.iter().any(|i| values.contains(i)),
                Some(v) => values.contains(v),
                None => false,
            },
            Predicate::Range { field, min, max } => {
                let Some(x) = record.get(field).and_then(Value::as_f64) else {
                    return false;
                };
                min.map_or(true, |lo| x >= lo) && max.map_or(true, |hi| x <= hi)
            }
        }
    }
}

/// A conjunction of attribute predicates.
///
/// An empty filter matches every record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeFilter {
    predicates: Vec<Predicate>,
}

impl AttributeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn one_of<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.predicates.push(Predicate::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn range(mut self, field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        self.predicates.push(Predicate::Range {
            field: field.into(),
            min,
            max,
        });
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from_json("r1", value)
    }

    #[test]
    fn test_dotted_lookup() {
        let r = record(json!({"embeddings": {"text_vector": [1.0, 2.0]}, "brand": "x"}));
        assert_eq!(r.vector("embeddings.text_vector"), Some(vec![1.0, 2.0]));
        assert_eq!(r.get("brand"), Some(&json!("x")));
        assert!(r.get("embeddings.visual_vector").is_none());
        assert!(r.get("brand.name").is_none());
    }

    #[test]
    fn test_vector_rejects_bad_values() {
        let r = record(json!({
            "empty": [],
            "mixed": [1.0, "a"],
            "scalar": 3.0,
            "ints": [1, 2, 3]
        }));
        assert_eq!(r.vector("empty"), None);
        assert_eq!(r.vector("mixed"), None);
        assert_eq!(r.vector("scalar"), None);
        assert_eq!(r.vector("missing"), None);
        assert_eq!(r.vector("ints"), Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_chunked_vector_reassembly() {
        let r = record(json!({"v": {
            "chunk_2": [3.0, 4.0],
            "chunk_1": [1.0, 2.0],
            "chunk_3": [5.0]
        }}));
        assert_eq!(r.vector("v"), Some(vec![1.0, 2.0, 3.0, 4.0, 5.0]));
    }

    #[test]
    fn test_chunk_gaps_are_skipped() {
        let r = record(json!({"v": {
            "chunk_1": [1.0],
            "chunk_3": [3.0, 4.0],
            "chunk_7": [7.0]
        }}));
        assert_eq!(r.vector("v"), Some(vec![1.0, 3.0, 4.0, 7.0]));

        let late = record(json!({"v": {"chunk_2": [2.0], "chunk_4": [4.0]}}));
        assert_eq!(late.vector("v"), Some(vec![2.0, 4.0]));
    }

    #[test]
    fn test_single_array_object() {
        let r = record(json!({"v": {"full": [0.5, 0.25]}}));
        assert_eq!(r.vector("v"), Some(vec![0.5, 0.25]));
    }

    #[test]
    fn test_projection_keeps_top_level_fields() {
        let r = record(json!({"embeddings": {"a": [1.0]}, "brand": "x", "title": "t"}));
        let p = r.project(&Projection::field("embeddings.a"));
        assert_eq!(p.fields.len(), 1);
        assert!(p.fields.contains_key("embeddings"));
        assert_eq!(r.project(&Projection::All), r);
    }

    #[test]
    fn test_filter_predicates() {
        let r = record(json!({"brand": "x", "tags": ["a", "b"], "duration": 12.5}));
        assert!(AttributeFilter::new().matches(&r));
        assert!(AttributeFilter::new().eq("brand", "x").matches(&r));
        assert!(!AttributeFilter::new().eq("brand", "y").matches(&r));
        assert!(AttributeFilter::new().eq("tags", "b").matches(&r));
        assert!(AttributeFilter::new().one_of("brand", ["y", "x"]).matches(&r));
        assert!(AttributeFilter::new().one_of("tags", ["c", "a"]).matches(&r));
        assert!(!AttributeFilter::new().one_of("brand", ["y"]).matches(&r));
        assert!(AttributeFilter::new()
            .range("duration", Some(10.0), Some(20.0))
            .matches(&r));
        assert!(!AttributeFilter::new()
            .range("duration", None, Some(10.0))
            .matches(&r));
        assert!(!AttributeFilter::new()
            .eq("brand", "x")
            .eq("missing", 1)
            .matches(&r));
    }

    #[test]
    fn test_filter_serializes_stably() {
        let f = AttributeFilter::new().eq("brand", "x").range("d", Some(1.0), None);
        let a = serde_json::to_string(&f).unwrap();
        let b = serde_json::to_string(&f.clone()).unwrap();
        assert_eq!(a, b);
        let back: AttributeFilter = serde_json::from_str(&a).unwrap();
        assert_eq!(back, f);
    }
}
