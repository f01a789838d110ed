// Copyright 2025 DataShare Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Conversions between command-line text and DataShare values.
//!
//! Column values are given as `key=value`. The value is read as `null`, a
//! boolean, an integer or a float when it looks like one, and as a string
//! otherwise. Double quotes force a string: `code="007"`.
//!
//! Everything printed to stdout is compact JSON.

use anyhow::{anyhow, Result};
use datashare_common::protocol::{OperationResult, Predicates, ResultSet, ValueObject, ValuesBucket};
use serde_json::{Map, Value};

/// Reads one column value.
pub fn parse_value(raw: &str) -> ValueObject {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return ValueObject::String(raw[1..raw.len() - 1].to_string());
    }
    match raw {
        "null" => ValueObject::Null,
        "true" => ValueObject::Bool(true),
        "false" => ValueObject::Bool(false),
        _ => {
            if let Ok(n) = raw.parse::<i64>() {
                ValueObject::Int64(n)
            } else if let Ok(f) = raw.parse::<f64>() {
                ValueObject::Double(f)
            } else {
                ValueObject::String(raw.to_string())
            }
        }
    }
}

/// Splits `key=value`.
pub fn parse_assignment(raw: &str) -> Result<(String, ValueObject)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid assignment '{}': expected key=value", raw))?;
    if key.is_empty() {
        return Err(anyhow!("Invalid assignment '{}': empty key", raw));
    }
    Ok((key.to_string(), parse_value(value)))
}

pub fn bucket_from(assignments: &[String]) -> Result<ValuesBucket> {
    let mut bucket = ValuesBucket::new();
    for raw in assignments {
        let (key, value) = parse_assignment(raw)?;
        bucket.put(key, value);
    }
    Ok(bucket)
}

/// Builds predicates matching rows where every `key=value` holds.
pub fn predicates_from(filters: &[String]) -> Result<Predicates> {
    let mut predicates = Predicates::new();
    for raw in filters {
        let (key, value) = parse_assignment(raw)?;
        predicates = match value {
            ValueObject::Null => predicates.is_null(&key),
            value => predicates.equal_to(&key, value),
        };
    }
    Ok(predicates)
}

/// Renders rows as an array of `{column: value}` objects.
pub fn rows_json(result: &ResultSet) -> Result<Value> {
    let mut rows = Vec::with_capacity(result.row_count());
    for row in &result.rows {
        let mut object = Map::new();
        for (column, value) in result.columns.iter().zip(row) {
            object.insert(column.clone(), serde_json::to_value(value)?);
        }
        rows.push(Value::Object(object));
    }
    Ok(Value::Array(rows))
}

/// Renders batch results as `[{"uri": .., "code": ..}]`.
pub fn results_json(results: &[OperationResult]) -> Result<Value> {
    Ok(serde_json::to_value(results)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("null"), ValueObject::Null);
        assert_eq!(parse_value("true"), ValueObject::Bool(true));
        assert_eq!(parse_value("-12"), ValueObject::Int64(-12));
        assert_eq!(parse_value("2.5"), ValueObject::Double(2.5));
        assert_eq!(parse_value("Rose"), ValueObject::from("Rose"));
        assert_eq!(parse_value("\"007\""), ValueObject::from("007"));
        assert_eq!(parse_value(""), ValueObject::from(""));
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(parse_assignment("age=31").unwrap(), ("age".to_string(), ValueObject::Int64(31)));
        assert_eq!(parse_assignment("note=a=b").unwrap(), ("note".to_string(), ValueObject::from("a=b")));
        assert!(parse_assignment("age").is_err());
        assert!(parse_assignment("=31").is_err());
    }

    #[test]
    fn test_bucket_from() {
        let bucket = bucket_from(&["name=Rose".into(), "age=31".into()]).unwrap();
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket.get("age"), Some(&ValueObject::Int64(31)));
        assert!(bucket_from(&["broken".into()]).is_err());
    }

    #[test]
    fn test_predicates_from() {
        let predicates = predicates_from(&["name=Rose".into(), "deleted=null".into()]).unwrap();
        assert_eq!(predicates.operations().len(), 2);
        assert_eq!(predicates.operations()[0].field(), Some("name"));
        assert!(predicates_from(&[]).unwrap().operations().is_empty());
    }

    #[test]
    fn test_rows_json() {
        let result = ResultSet {
            columns: vec!["name".into(), "age".into()],
            rows: vec![vec![ValueObject::from("Rose"), ValueObject::Int64(31)], vec![ValueObject::from("Lily"), ValueObject::Null]],
        };
        let json = rows_json(&result).unwrap();
        assert_eq!(json, serde_json::json!([{"name": "Rose", "age": 31}, {"name": "Lily", "age": null}]));
    }

    #[test]
    fn test_results_json() {
        let results = vec![OperationResult::ok("datashare:///a"), OperationResult::new("x", 1)];
        let json = results_json(&results).unwrap();
        assert_eq!(json, serde_json::json!([{"uri": "datashare:///a", "code": 0}, {"uri": "x", "code": 1}]));
    }
}
