//! Dynamic argument values
//!
//! `ArgValue` is the closed JSON value model used for classifier arguments.
//! Its `Deserialize` impl is the strict grammar: duplicate object keys and
//! integers that do not fit exactly in an `f64` are rejected. The lossy
//! conversion from `serde_json::Value` is the permissive path.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Value;

/// Argument map as carried by a decision (keys sorted, unique)
pub type ArgMap = BTreeMap<String, ArgValue>;

/// Largest integer magnitude an `f64` holds without rounding (2^53)
const MAX_EXACT_INT: u64 = 1 << 53;

/// Recursive JSON value
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ArgValue>),
    Object(ArgMap),
}

impl ArgValue {
    /// Short type name for logs and error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ArgValue::Null => "null",
            ArgValue::Bool(_) => "boolean",
            ArgValue::Number(_) => "number",
            ArgValue::String(_) => "string",
            ArgValue::Array(_) => "array",
            ArgValue::Object(_) => "object",
        }
    }

    /// Compact JSON text (no whitespace)
    pub fn to_compact_json(&self) -> String {
        // Serializing a tree of owned strings and finite numbers cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| "null".to_string())
    }

    /// Text form used for a single environment variable
    ///
    /// Strings are passed verbatim, scalars use their JSON spelling,
    /// containers their compact JSON.
    pub fn to_env_string(&self) -> String {
        match self {
            ArgValue::String(s) => s.clone(),
            ArgValue::Bool(b) => b.to_string(),
            ArgValue::Number(n) => number_text(*n),
            ArgValue::Array(_) | ArgValue::Object(_) => self.to_compact_json(),
            ArgValue::Null => "null".to_string(),
        }
    }

    /// Convert to a `serde_json::Value` (for event payloads)
    pub fn to_json(&self) -> Value {
        match self {
            ArgValue::Null => Value::Null,
            ArgValue::Bool(b) => Value::Bool(*b),
            ArgValue::Number(n) => number_json(*n),
            ArgValue::String(s) => Value::String(s.clone()),
            ArgValue::Array(items) => Value::Array(items.iter().map(ArgValue::to_json).collect()),
            ArgValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Integral values inside the exact range print without a fraction
fn integral(n: f64) -> Option<i64> {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_EXACT_INT as f64 {
        Some(n as i64)
    } else {
        None
    }
}

/// Canonical decimal text of a number (`3`, `2.5`, `1e300`)
pub fn number_text(n: f64) -> String {
    match integral(n) {
        Some(i) => i.to_string(),
        None => number_json(n).to_string(),
    }
}

fn number_json(n: f64) -> Value {
    match integral(n) {
        Some(i) => Value::from(i),
        None => serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
    }
}

/// Lossy conversion used by the permissive decode pass
impl From<Value> for ArgValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ArgValue::Null,
            Value::Bool(b) => ArgValue::Bool(b),
            Value::Number(n) => n.as_f64().map_or(ArgValue::Null, ArgValue::Number),
            Value::String(s) => ArgValue::String(s),
            Value::Array(items) => ArgValue::Array(items.into_iter().map(ArgValue::from).collect()),
            Value::Object(map) => {
                ArgValue::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::String(s.to_string())
    }
}

impl From<f64> for ArgValue {
    fn from(n: f64) -> Self {
        ArgValue::Number(n)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Bool(b)
    }
}

impl Serialize for ArgValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ArgValue::Null => serializer.serialize_unit(),
            ArgValue::Bool(b) => serializer.serialize_bool(*b),
            ArgValue::Number(n) => match integral(*n) {
                Some(i) => serializer.serialize_i64(i),
                None => serializer.serialize_f64(*n),
            },
            ArgValue::String(s) => serializer.serialize_str(s),
            ArgValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ArgValue::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

struct StrictVisitor;

impl<'de> Visitor<'de> for StrictVisitor {
    type Value = ArgValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<ArgValue, E> {
        Ok(ArgValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<ArgValue, E> {
        Ok(ArgValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<ArgValue, D::Error> {
        ArgValue::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<ArgValue, E> {
        Ok(ArgValue::Bool(b))
    }

    fn visit_i64<E: de::Error>(self, n: i64) -> Result<ArgValue, E> {
        if n.unsigned_abs() > MAX_EXACT_INT {
            return Err(E::custom(format!("integer {} is not exactly representable", n)));
        }
        Ok(ArgValue::Number(n as f64))
    }

    fn visit_u64<E: de::Error>(self, n: u64) -> Result<ArgValue, E> {
        if n > MAX_EXACT_INT {
            return Err(E::custom(format!("integer {} is not exactly representable", n)));
        }
        Ok(ArgValue::Number(n as f64))
    }

    fn visit_f64<E: de::Error>(self, n: f64) -> Result<ArgValue, E> {
        if !n.is_finite() {
            return Err(E::custom("non-finite number"));
        }
        Ok(ArgValue::Number(n))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<ArgValue, E> {
        Ok(ArgValue::String(s.to_string()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<ArgValue, E> {
        Ok(ArgValue::String(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<ArgValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(ArgValue::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ArgValue, A::Error> {
        let mut map = ArgMap::new();
        while let Some((key, value)) = access.next_entry::<String, ArgValue>()? {
            if map.contains_key(&key) {
                return Err(de::Error::custom(format!("duplicate key '{}'", key)));
            }
            map.insert(key, value);
        }
        Ok(ArgValue::Object(map))
    }
}

impl<'de> Deserialize<'de> for ArgValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(StrictVisitor)
    }
}

/// `deserialize_with` helper: strict object of `ArgValue`s
pub(crate) fn strict_object<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ArgMap, D::Error> {
    match ArgValue::deserialize(deserializer)? {
        ArgValue::Object(map) => Ok(map),
        other => Err(de::Error::invalid_type(
            de::Unexpected::Other(other.type_name()),
            &"an object",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn env_strings_by_type() {
        assert_eq!(ArgValue::from("Bob").to_env_string(), "Bob");
        assert_eq!(ArgValue::Number(3.0).to_env_string(), "3");
        assert_eq!(ArgValue::Number(2.5).to_env_string(), "2.5");
        assert_eq!(ArgValue::Number(-0.1).to_env_string(), "-0.1");
        assert_eq!(ArgValue::Bool(true).to_env_string(), "true");
        assert_eq!(ArgValue::Null.to_env_string(), "null");
        let tags = ArgValue::Array(vec!["a".into(), "b".into()]);
        assert_eq!(tags.to_env_string(), r#"["a","b"]"#);
    }

    #[test]
    fn strings_are_not_quoted_or_escaped() {
        let v = ArgValue::from("say \"hi\"\nbye");
        assert_eq!(v.to_env_string(), "say \"hi\"\nbye");
    }

    #[test]
    fn integral_numbers_serialize_without_fraction() {
        let obj = ArgValue::Object(
            [("n".to_string(), ArgValue::Number(3.0))]
                .into_iter()
                .collect(),
        );
        assert_eq!(obj.to_compact_json(), r#"{"n":3}"#);
    }

    #[test]
    fn strict_accepts_nested_values() {
        let v: ArgValue = serde_json::from_str(r#"{"a":[1,{"b":null}],"c":false}"#).unwrap();
        let ArgValue::Object(map) = v else {
            panic!("expected object");
        };
        assert_eq!(map["c"], ArgValue::Bool(false));
        assert_eq!(map["a"].type_name(), "array");
    }

    #[test]
    fn strict_rejects_inexact_integers() {
        let result = serde_json::from_str::<ArgValue>("9007199254740993");
        assert!(result.is_err());
        let ok = serde_json::from_str::<ArgValue>("9007199254740992").unwrap();
        assert_eq!(ok, ArgValue::Number(9007199254740992.0));
    }

    #[test]
    fn strict_rejects_duplicate_keys() {
        let result = serde_json::from_str::<ArgValue>(r#"{"a":1,"a":2}"#);
        assert!(result.is_err());
    }

    #[test]
    fn lossy_conversion_keeps_big_integers_as_floats() {
        let v = ArgValue::from(json!(12345678901234567890u64));
        assert!(matches!(v, ArgValue::Number(n) if n > 1.2e19));
    }

    #[test]
    fn to_json_matches_input() {
        let input = json!({"name": "Bob", "count": 3, "tags": ["a", "b"], "x": null});
        let v = ArgValue::from(input.clone());
        assert_eq!(v.to_json(), input);
    }
}
