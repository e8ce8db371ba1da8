//! Delimited-text encoding of result sets
//!
//! Comma separated, LF line endings, one header row. Fields containing a
//! comma, quote, CR or LF are wrapped in quotes with embedded quotes
//! doubled. NULL is the empty unquoted field.

use crate::models::{ResultSet, Scalar};

/// Field delimiter
pub const DELIMITER: char = ',';

fn needs_quoting(field: &str) -> bool {
    field.contains([DELIMITER, '"', '\n', '\r'])
}

/// Quote a single field if required
pub fn escape_field(field: &str) -> String {
    if needs_quoting(field) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn push_record(output: &mut String, fields: impl Iterator<Item = String>) {
    let mut first = true;
    for field in fields {
        if !first {
            output.push(DELIMITER);
        }
        output.push_str(&escape_field(&field));
        first = false;
    }
    output.push('\n');
}

/// Encode a result set, header first
pub fn encode(result: &ResultSet) -> String {
    let mut output = String::new();

    // Header row
    push_record(&mut output, result.columns.iter().cloned());

    // Data rows
    for row in &result.rows {
        push_record(&mut output, row.iter().map(Scalar::render));
    }

    output
}

/// Split delimited text into records of raw fields
///
/// Inverse of [`encode`] at the text level; quoted fields may span lines.
/// Returns `None` when a quoted field is never closed.
pub fn decode(content: &str) -> Option<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                other => field.push(other),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            DELIMITER => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            other => field.push(other),
        }
    }

    if in_quotes {
        return None;
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Some(records)
}
