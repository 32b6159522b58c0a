//! Dump line format.
//!
//! ```text
//! {"key":"user:1","type":"string","value":"alice"}
//! {"key":"queue","type":"list","ttl":5000,"value":["a","b"]}
//! {"key":"scores","type":"zset","value":[{"member":"m","score":1.5}]}
//! {"key":"h","type":"hash","value":[["field","value"]]}
//! {"key":"s","type":"stream","value":[{"id":"1-0","fields":[["f","v"]]}]}
//! ```
//!
//! `ttl` is in milliseconds; `-1` or a missing `ttl` means no expiry.
//! Byte strings that are not valid UTF-8 are written as `{"base64": "..."}`.

use anyhow::{anyhow, bail, Context, Result};
use keyspace_types::{Bytes, DataType, KeyValue, ScoredMember, StreamEntry, Ttl, Value};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::{AsyncWriteExt, BufWriter};

#[derive(Debug, Serialize, Deserialize)]
struct DumpLine {
    key: Bytes,
    #[serde(rename = "type")]
    data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ttl: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    memory_usage: Option<u64>,
    value: serde_json::Value,
}

/// Parse one dump line. `line_number` is 1-based and only used in errors.
pub fn parse_line(line: &str, line_number: usize) -> Result<KeyValue> {
    let raw: DumpLine = serde_json::from_str(line)
        .map_err(|e| anyhow!("Error parsing JSON at line {line_number}: {e}"))?;

    let ttl = match raw.ttl {
        None | Some(-1) => Ttl::Persistent,
        Some(ms) if ms >= 0 => Ttl::from_millis(ms as u64),
        Some(other) => bail!("Invalid ttl {other} at line {line_number}"),
    };

    let value = decode_value(raw.data_type, raw.value).with_context(|| {
        format!(
            "Invalid {} value for key '{}' at line {line_number}",
            raw.data_type, raw.key
        )
    })?;

    let kv = KeyValue::new(raw.key, value, ttl);
    Ok(match raw.memory_usage {
        Some(bytes) => kv.with_memory_usage(bytes),
        None => kv,
    })
}

fn decode_value(data_type: DataType, value: serde_json::Value) -> Result<Value> {
    Ok(match data_type {
        DataType::String => Value::String(serde_json::from_value(value)?),
        DataType::List => Value::List(serde_json::from_value(value)?),
        DataType::Set => Value::Set(serde_json::from_value(value)?),
        DataType::SortedSet => {
            Value::SortedSet(serde_json::from_value::<Vec<ScoredMember>>(value)?)
        }
        DataType::Hash => Value::Hash(serde_json::from_value(value)?),
        DataType::Stream => Value::Stream(serde_json::from_value::<Vec<StreamEntry>>(value)?),
        DataType::Unknown => Value::Unknown(serde_json::from_value(value)?),
        DataType::None => bail!("a dump cannot contain absent keys"),
    })
}

fn encode_value(value: &Value) -> Result<serde_json::Value> {
    Ok(match value {
        Value::String(b) | Value::Unknown(b) => serde_json::to_value(b)?,
        Value::List(items) | Value::Set(items) => serde_json::to_value(items)?,
        Value::SortedSet(members) => serde_json::to_value(members)?,
        Value::Hash(fields) => serde_json::to_value(fields)?,
        Value::Stream(entries) => serde_json::to_value(entries)?,
    })
}

/// Serialize one snapshot as a dump line (without the trailing newline).
pub fn to_line(kv: &KeyValue) -> Result<String> {
    let value = kv
        .value
        .as_ref()
        .ok_or_else(|| anyhow!("Key '{}' has no value to dump", kv.key))?;
    let line = DumpLine {
        key: kv.key.clone(),
        data_type: kv.data_type,
        ttl: kv.ttl.filter(|t| !t.is_persistent()).map(|t| t.as_pttl()),
        memory_usage: kv.memory_usage,
        value: encode_value(value)?,
    };
    Ok(serde_json::to_string(&line)?)
}

/// Write `snapshots` to `path` as a dump, replacing any existing file.
///
/// Returns the number of lines written.
pub async fn write_dump<'a, I>(path: &Path, snapshots: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a KeyValue>,
{
    let file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create dump file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0;
    for kv in snapshots {
        let line = to_line(kv)?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        written += 1;
    }
    writer.flush().await?;
    tracing::debug!("Wrote {} keys to {}", written, path.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_every_type() {
        let lines = [
            r#"{"key":"a","type":"string","value":"1"}"#,
            r#"{"key":"b","type":"list","ttl":5000,"value":["1","2"]}"#,
            r#"{"key":"c","type":"set","value":["x"]}"#,
            r#"{"key":"d","type":"zset","value":[{"member":"m","score":1.5}]}"#,
            r#"{"key":"e","type":"hash","value":[["f","v"]]}"#,
            r#"{"key":"f","type":"stream","value":[{"id":"1-0","fields":[["f","v"]]}]}"#,
            r#"{"key":"g","type":"ReJSON-RL","value":"raw"}"#,
        ];
        let types: Vec<DataType> = lines
            .iter()
            .enumerate()
            .map(|(i, l)| parse_line(l, i + 1).unwrap().data_type)
            .collect();
        assert_eq!(
            types,
            vec![
                DataType::String,
                DataType::List,
                DataType::Set,
                DataType::SortedSet,
                DataType::Hash,
                DataType::Stream,
                DataType::Unknown,
            ]
        );
    }

    #[test]
    fn test_ttl_conventions() {
        let persistent = parse_line(r#"{"key":"a","type":"string","ttl":-1,"value":"1"}"#, 1).unwrap();
        assert_eq!(persistent.ttl, Some(Ttl::Persistent));
        let expiring = parse_line(r#"{"key":"a","type":"string","ttl":250,"value":"1"}"#, 1).unwrap();
        assert_eq!(expiring.ttl, Some(Ttl::from_millis(250)));
        assert!(parse_line(r#"{"key":"a","type":"string","ttl":-2,"value":"1"}"#, 1).is_err());
    }

    #[test]
    fn test_errors_name_the_line() {
        let err = parse_line("{not json", 17).unwrap_err();
        assert!(err.to_string().contains("line 17"));

        let err = parse_line(r#"{"key":"a","type":"list","value":"oops"}"#, 3).unwrap_err();
        assert!(format!("{err:#}").contains("line 3"));
    }

    #[test]
    fn test_line_shape() {
        let kv = KeyValue::new(
            Bytes::from("h"),
            Value::Hash(vec![(Bytes::from("f"), Bytes(vec![0xff, 0x00]))]),
            Ttl::from_millis(10),
        );
        let line = to_line(&kv).unwrap();
        assert_eq!(
            line,
            r#"{"key":"h","type":"hash","ttl":10,"value":[["f",{"base64":"/wA="}]]}"#
        );
        assert_eq!(parse_line(&line, 1).unwrap(), kv);
    }

    #[test]
    fn test_absent_and_valueless_snapshots_cannot_be_dumped() {
        assert!(to_line(&KeyValue::absent(Bytes::from("a"))).is_err());
        assert!(parse_line(r#"{"key":"a","type":"none","value":null}"#, 1).is_err());
    }
}
