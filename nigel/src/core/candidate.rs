//! Candidate model and the candidate-source parser.
//!
//! A candidate source prints either a JSON array (of strings, arrays or
//! objects) or plain newline-delimited text. Each element becomes a
//! [`Candidate`] with a canonical [`Candidate::key`] used for ignore-list
//! membership and shard hashing.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::core::canonical::{canonical_json, display_value};
use crate::core::errors::{ParseError, Shape};

/// Structured payload behind a candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateData {
    Scalar(String),
    Sequence(Vec<Value>),
    Mapping(BTreeMap<String, Value>),
}

/// One unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    key: String,
    data: CandidateData,
}

impl Candidate {
    /// Build a plain-string candidate; the key is the string itself.
    pub fn scalar(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            key: value.clone(),
            data: CandidateData::Scalar(value),
        }
    }

    /// Build a candidate from a decoded JSON element.
    ///
    /// Returns `None` for numbers, booleans and null.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::scalar(s)),
            Value::Array(items) => {
                let key = canonical_json(&Value::Array(items.clone()));
                Some(Self {
                    key,
                    data: CandidateData::Sequence(items),
                })
            }
            Value::Object(map) => {
                let key = canonical_json(&Value::Object(map.clone()));
                Some(Self {
                    key,
                    data: CandidateData::Mapping(map.into_iter().collect()),
                })
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn data(&self) -> &CandidateData {
        &self.data
    }

    pub fn shape(&self) -> Shape {
        match self.data {
            CandidateData::Scalar(_) => Shape::String,
            CandidateData::Sequence(_) => Shape::Array,
            CandidateData::Mapping(_) => Shape::Map,
        }
    }

    /// Natural string form (`$INPUT`).
    ///
    /// Single-element arrays unwrap to their element; other arrays and
    /// objects render as canonical JSON.
    pub fn as_input(&self) -> String {
        match &self.data {
            CandidateData::Scalar(s) => s.clone(),
            CandidateData::Sequence(items) if items.len() == 1 => display_value(&items[0]),
            CandidateData::Sequence(_) | CandidateData::Mapping(_) => self.key.clone(),
        }
    }

    /// Element `index` of an array candidate (`None` when out of bounds or not an array).
    pub fn element(&self, index: usize) -> Option<String> {
        match &self.data {
            CandidateData::Sequence(items) => items.get(index).map(display_value),
            _ => None,
        }
    }

    /// Canonical JSON of elements from `start` onward (`[]` past the end).
    pub fn slice_from(&self, start: usize) -> Option<String> {
        match &self.data {
            CandidateData::Sequence(items) => {
                let rest = items.get(start..).unwrap_or(&[]).to_vec();
                Some(canonical_json(&Value::Array(rest)))
            }
            _ => None,
        }
    }

    /// Field `name` of an object candidate.
    pub fn field(&self, name: &str) -> Option<String> {
        match &self.data {
            CandidateData::Mapping(map) => map.get(name).map(display_value),
            _ => None,
        }
    }

    /// Positional elements for the legacy `$ARGUMENT*` placeholders.
    pub fn arguments(&self) -> Vec<String> {
        match &self.data {
            CandidateData::Scalar(s) => vec![s.clone()],
            CandidateData::Sequence(items) => items.iter().map(display_value).collect(),
            CandidateData::Mapping(_) => vec![self.key.clone()],
        }
    }
}

/// Decode candidate-source output, preserving source order.
///
/// A JSON array is tried first; if the bytes are not a JSON array at all, they
/// are read as newline-delimited text with blank lines dropped.
pub fn parse_candidates(bytes: &[u8]) -> Result<Vec<Candidate>, ParseError> {
    if let Ok(items) = serde_json::from_slice::<Vec<Value>>(bytes) {
        return items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let found = json_type_name(&item);
                Candidate::from_value(item).ok_or(ParseError::UnsupportedElement { index, found })
            })
            .collect();
    }

    let text = std::str::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8)?;
    let candidates: Vec<Candidate> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Candidate::scalar)
        .collect();
    if candidates.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(candidates)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(input: &str) -> Vec<String> {
        parse_candidates(input.as_bytes())
            .expect("parse")
            .iter()
            .map(|c| c.key().to_string())
            .collect()
    }

    fn one(json: &str) -> Candidate {
        parse_candidates(format!("[{json}]").as_bytes())
            .expect("parse")
            .remove(0)
    }

    #[test]
    fn parses_string_array() {
        assert_eq!(
            keys(r#"["file1.go", "file2.go", "file3.go"]"#),
            vec!["file1.go", "file2.go", "file3.go"]
        );
    }

    #[test]
    fn array_elements_use_canonical_json_keys() {
        assert_eq!(
            keys(r#"[["file1.go", "line 10"], ["file2.go", "line 20"]]"#),
            vec![r#"["file1.go","line 10"]"#, r#"["file2.go","line 20"]"#]
        );
    }

    #[test]
    fn object_elements_use_sorted_keys() {
        assert_eq!(
            keys(r#"[{"line": 10, "file": "test.go"}, {"file": "other.go"}]"#),
            vec![r#"{"file":"test.go","line":10}"#, r#"{"file":"other.go"}"#]
        );
    }

    #[test]
    fn mixed_strings_and_arrays() {
        assert_eq!(
            keys(r#"["simple.go", ["complex.go", "extra"]]"#),
            vec!["simple.go", r#"["complex.go","extra"]"#]
        );
    }

    #[test]
    fn empty_json_array_is_not_an_error() {
        assert!(keys("[]").is_empty());
    }

    #[test]
    fn rejects_scalar_json_elements() {
        let err = parse_candidates(br#"["ok", 7]"#).unwrap_err();
        assert_eq!(
            err,
            ParseError::UnsupportedElement {
                index: 1,
                found: "number"
            }
        );
        assert!(parse_candidates(b"[null]").is_err());
        assert!(parse_candidates(b"[true]").is_err());
    }

    #[test]
    fn falls_back_to_trimmed_lines() {
        assert_eq!(
            keys("  file1.go  \n\n\tfile2.go\t\n\n  file3.go  "),
            vec!["file1.go", "file2.go", "file3.go"]
        );
    }

    #[test]
    fn single_line_without_newline() {
        assert_eq!(keys("single.go"), vec!["single.go"]);
    }

    #[test]
    fn plain_text_keeps_quotes_and_apostrophes() {
        assert_eq!(
            keys("file with \"quotes\".go\nfile's with apostrophe.go"),
            vec!["file with \"quotes\".go", "file's with apostrophe.go"]
        );
    }

    #[test]
    fn blank_output_is_a_parse_error() {
        assert_eq!(parse_candidates(b"  \n\n").unwrap_err(), ParseError::Empty);
        assert_eq!(
            parse_candidates(&[0xff, 0xfe]).unwrap_err(),
            ParseError::InvalidUtf8
        );
    }

    #[test]
    fn reparsing_is_deterministic() {
        let input = r#"[{"file": "test.go", "line": 10}, {"line": 20, "file": "other.go"}]"#;
        let first = keys(input);
        for _ in 0..10 {
            assert_eq!(keys(input), first);
        }
    }

    #[test]
    fn accessors_follow_shape() {
        let s = one(r#""hello""#);
        assert_eq!(s.shape(), Shape::String);
        assert_eq!(s.as_input(), "hello");
        assert_eq!(s.element(0), None);

        let arr = one(r#"["a", "b", "c", "d"]"#);
        assert_eq!(arr.element(1).as_deref(), Some("b"));
        assert_eq!(arr.element(10), None);
        assert_eq!(arr.slice_from(1).as_deref(), Some(r#"["b","c","d"]"#));
        assert_eq!(arr.slice_from(3).as_deref(), Some(r#"["d"]"#));
        assert_eq!(arr.slice_from(10).as_deref(), Some("[]"));
        assert_eq!(arr.as_input(), r#"["a","b","c","d"]"#);

        let map = one(r#"{"file": "test.go", "line": 42}"#);
        assert_eq!(map.shape(), Shape::Map);
        assert_eq!(map.field("file").as_deref(), Some("test.go"));
        assert_eq!(map.field("line").as_deref(), Some("42"));
        assert_eq!(map.field("missing"), None);
    }

    #[test]
    fn single_item_array_unwraps() {
        assert_eq!(one(r#"["only_item"]"#).as_input(), "only_item");
    }
}
