//! Source Record Model
//!
//! Records arrive from the host framework already decoded. Values are
//! normalized into a small tagged variant so the formatter can recurse
//! without any dynamic type dispatch.

use serde::Deserialize;
use std::fmt;

/// Declared type of a record value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaType {
    Boolean,
    Int,
    Float,
    String,
    Bytes,
    Struct,
    Map,
    Array,
}

/// A named field of a struct schema
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
}

/// Value schema attached to a record
///
/// Only `Struct` schemas carry fields; their order is the declaration order
/// used when formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub schema_type: SchemaType,
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn primitive(schema_type: SchemaType) -> Self {
        Schema {
            schema_type,
            fields: Vec::new(),
        }
    }

    pub fn map() -> Self {
        Self::primitive(SchemaType::Map)
    }

    pub fn array() -> Self {
        Self::primitive(SchemaType::Array)
    }

    /// Build a struct schema from `(name, schema)` pairs in declaration order
    pub fn structure<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Schema)>,
        S: Into<String>,
    {
        Schema {
            schema_type: SchemaType::Struct,
            fields: fields
                .into_iter()
                .map(|(name, schema)| Field {
                    name: name.into(),
                    schema,
                })
                .collect(),
        }
    }
}

/// Structured value conforming to a struct schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Struct {
    values: Vec<(String, Value)>,
}

impl Struct {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any previous value for the same name
    pub fn put(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
        self
    }

    /// Look up a field by name; unset fields read as `None`
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Fields in the order they were first set
    pub fn entries(&self) -> &[(String, Value)] {
        &self.values
    }
}

/// Record value
///
/// `Map` keeps its entries in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Map(Vec<(String, Value)>),
    Array(Vec<Value>),
    Struct(Struct),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Native textual form, used for schemaless and primitive values
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            // integral floats keep a trailing `.0`
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 => {
                write!(f, "{:.1}", x)
            }
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Struct(s) => {
                write!(f, "Struct{{")?;
                for (i, (k, v)) in s.values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Struct> for Value {
    fn from(s: Struct) -> Self {
        Value::Struct(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// One record delivered by the host framework
#[derive(Debug, Clone, PartialEq)]
pub struct SinkRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub schema: Option<Schema>,
    pub value: Value,
}

impl SinkRecord {
    /// Schemaless record
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, value: impl Into<Value>) -> Self {
        SinkRecord {
            topic: topic.into(),
            partition,
            offset,
            schema: None,
            value: value.into(),
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Decode one line of the driver's JSON-lines input
    ///
    /// Objects and arrays get a map/array schema unless the line sets
    /// `"schemaless": true`, in which case the value is kept as-is.
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct JsonRecord {
            topic: String,
            partition: i32,
            offset: i64,
            #[serde(default)]
            value: serde_json::Value,
            #[serde(default)]
            schemaless: bool,
        }

        let raw: JsonRecord = serde_json::from_str(line)?;
        let schema = if raw.schemaless {
            None
        } else {
            Some(match &raw.value {
                serde_json::Value::Object(_) => Schema::map(),
                serde_json::Value::Array(_) => Schema::array(),
                serde_json::Value::Bool(_) => Schema::primitive(SchemaType::Boolean),
                serde_json::Value::Number(n) if n.is_i64() => Schema::primitive(SchemaType::Int),
                serde_json::Value::Number(_) => Schema::primitive(SchemaType::Float),
                _ => Schema::primitive(SchemaType::String),
            })
        };

        Ok(SinkRecord {
            topic: raw.topic,
            partition: raw.partition,
            offset: raw.offset,
            schema,
            value: Value::from(raw.value),
        })
    }
}
