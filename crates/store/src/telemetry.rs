//! Repair and decode of the raw telemetry blob sent by the field controller.
//!
//! The controller's encoder leaves artifacts in its output: `', '` joins
//! between array elements, escaped `\n`/`\t` sequences, noise around the
//! object and unquoted word values. [`normalize`] undoes those, [`decode`]
//! reads the result.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, StoreError};

/// Payload used by the hub's self-test: one log with all four sensors.
pub const SELF_TEST_PAYLOAD: &str = "{\n\
\t\"logFrequency\":60,\n\
\t\"numberOfLogs\":1,\n\
\t\"logs\":\n\
\t[\n\
\t\t{\n\
\t\t\t\"date\":\"12/11/2017\",\n\
\t\t\t\"time\":\"06:11:00\",\n\
\t\t\t\"numberOfSensors\":4,\n\
\t\t\t\"sensors\":\n\
\t\t\t[\n\
\t\t\t\t{\"name\":\"Temperature\", \"data\":22, \"unit\":\"°C\"},\n\
\t\t\t\t{\"name\":\"Moisture\", \"data\":35, \"unit\":\"%\"},\n\
\t\t\t\t{\"name\":\"Luminosity\", \"data\":Day, \"unit\":\"Lux\"},\n\
\t\t\t\t{\"name\":\"Soil Moisture\", \"data\":\"Low\", \"unit\":\"\"}\n\
\t\t\t]\n\
\t\t}\n\
\t]\n\
}";

/// Sensor values from the most recent log entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Readings {
    pub temperature: Option<i64>,
    pub moisture: Option<i64>,
    pub luminosity: Option<String>,
    pub soil_moisture: Option<String>,
}

/// A decoded telemetry payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Telemetry {
    pub number_of_logs: u32,
    pub log_frequency: Option<u32>,
    pub last_irrigation_time: Option<String>,
    pub latest: Readings,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Turn a raw telemetry blob into text a strict JSON decoder accepts.
/// Never fails; whatever is still broken fails in [`decode`].
pub fn normalize(raw: &str) -> String {
    let joined = raw.replace("', '", "");
    let framed = frame_object(&joined);
    let unescaped = framed.replace("\\n", "").replace("\\t", "");
    quote_bare_words(&unescaped)
}

/// Keep the first `{` through the last `}`; untouched if there is no pair.
fn frame_object(s: &str) -> &str {
    match (s.find('{'), s.rfind('}')) {
        (Some(start), Some(end)) if start < end => &s[start..=end],
        _ => s,
    }
}

/// Characters that end an unquoted value.
const BARE_STOP: &[char] = &[',', ':', ']', '}', '/', '\\', '"', '[', '{', ';', '=', '#'];

/// Rewrite the lenient value forms the controller emits into strict JSON:
/// unquoted text runs to the next delimiter and is trimmed, then quoted
/// unless it is a number or `true`/`false`/`null`; single-quoted strings are
/// re-emitted with double quotes. Double-quoted strings pass through.
fn quote_bare_words(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    let mut chars = s.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                out.push(c);
                let mut escaped = false;
                for (_, n) in chars.by_ref() {
                    out.push(n);
                    if escaped {
                        escaped = false;
                    } else if n == '\\' {
                        escaped = true;
                    } else if n == '"' {
                        break;
                    }
                }
            }
            '\'' => {
                let mut text = String::new();
                while let Some((_, n)) = chars.next() {
                    match n {
                        '\'' => break,
                        '\\' => match chars.next() {
                            Some((_, '\'')) => text.push('\''),
                            Some((_, e)) => {
                                // keep the escape for the JSON decoder
                                text.push('\\');
                                text.push(e);
                            }
                            None => text.push('\\'),
                        },
                        '"' => text.push_str("\\\""),
                        _ => text.push(n),
                    }
                }
                out.push('"');
                out.push_str(&text);
                out.push('"');
            }
            c if c.is_whitespace() || c < ' ' || BARE_STOP.contains(&c) => {
                out.push(c);
            }
            _ => {
                let mut end = i + c.len_utf8();
                while let Some(&(j, n)) = chars.peek() {
                    if BARE_STOP.contains(&n) || n < ' ' {
                        break;
                    }
                    end = j + n.len_utf8();
                    chars.next();
                }
                let raw = &s[i..end];
                let word = raw.trim_end();
                if is_json_literal(word) {
                    out.push_str(word);
                } else {
                    out.push('"');
                    out.push_str(word);
                    out.push('"');
                }
                out.push_str(&raw[word.len()..]);
            }
        }
    }
    out
}

fn is_json_literal(word: &str) -> bool {
    matches!(word, "true" | "false" | "null")
        || serde_json::from_str::<serde_json::Number>(word).is_ok()
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    number_of_logs: u32,
    #[serde(default)]
    logs: Vec<Value>,
    log_frequency: Option<u32>,
    last_irrigation_time: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogRecord {
    number_of_sensors: usize,
    sensors: Vec<SensorSample>,
}

#[derive(Deserialize)]
struct SensorSample {
    name: String,
    data: Value,
}

/// Decode normalized telemetry text. Only the first (most recent) log is read.
pub fn decode(text: &str) -> Result<Telemetry> {
    let payload: Payload = serde_json::from_str(text)
        .map_err(|e| StoreError::Format(format!("telemetry: {e}")))?;

    if payload.number_of_logs == 0 {
        return Err(StoreError::NoData);
    }
    let first = payload.logs.into_iter().next().ok_or(StoreError::NoData)?;
    let log: LogRecord = serde_json::from_value(first)
        .map_err(|e| StoreError::Format(format!("telemetry log: {e}")))?;

    if log.number_of_sensors > log.sensors.len() {
        return Err(StoreError::Format(format!(
            "telemetry log announces {} sensors but lists {}",
            log.number_of_sensors,
            log.sensors.len()
        )));
    }

    let mut latest = Readings::default();
    for sample in log.sensors.iter().take(log.number_of_sensors) {
        match sample.name.as_str() {
            "Temperature" => latest.temperature = Some(integer_reading(sample)?),
            "Moisture" => latest.moisture = Some(integer_reading(sample)?),
            "Luminosity" => latest.luminosity = Some(text_reading(sample)?),
            "Soil Moisture" => latest.soil_moisture = Some(text_reading(sample)?),
            _ => {}
        }
    }

    Ok(Telemetry {
        number_of_logs: payload.number_of_logs,
        log_frequency: payload.log_frequency,
        last_irrigation_time: payload.last_irrigation_time,
        latest,
    })
}

/// [`normalize`] then [`decode`].
pub fn parse(raw: &str) -> Result<Telemetry> {
    decode(&normalize(raw))
}

fn integer_reading(sample: &SensorSample) -> Result<i64> {
    let value = match &sample.data {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    };
    value.ok_or_else(|| {
        StoreError::Format(format!(
            "sensor '{}' data {} is not an integer",
            sample.name, sample.data
        ))
    })
}

fn text_reading(sample: &SensorSample) -> Result<String> {
    match &sample.data {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(StoreError::Format(format!(
            "sensor '{}' data {other} is not text",
            sample.name
        ))),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
