//! Reading log files.
//!
//! Logs are a JSON array of records, rewritten in full by the training
//! process on every report. Python's `json` module writes non-finite floats as
//! the bare literals `NaN`, `Infinity` and `-Infinity`, which strict JSON
//! parsers reject, so they are quoted before parsing and turned back into
//! numbers by [`Record::from_raw`](crate::record::Record::from_raw).

use std::borrow::Cow;
use std::path::Path;

use crate::record::RawRecord;
use crate::Result;

const LITERALS: [&str; 3] = ["-Infinity", "Infinity", "NaN"];

/// Read and parse a log file.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<RawRecord>> {
    let text = std::fs::read_to_string(path)?;
    parse_records(&text)
}

pub fn parse_records(text: &str) -> Result<Vec<RawRecord>> {
    let text = normalize_non_finite(text);
    Ok(serde_json::from_str(&text)?)
}

/// Quote bare non-finite literals outside of JSON strings.
pub fn normalize_non_finite(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if b == b'"' {
            in_string = true;
            i += 1;
            continue;
        }
        let literal = LITERALS
            .iter()
            .find(|lit| bytes[i..].starts_with(lit.as_bytes()));
        match literal {
            Some(lit) => {
                let buf = out.get_or_insert_with(|| String::with_capacity(text.len() + 16));
                buf.push_str(&text[copied..i]);
                buf.push('"');
                buf.push_str(lit);
                buf.push('"');
                i += lit.len();
                copied = i;
            }
            None => i += 1,
        }
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&text[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(text),
    }
}
