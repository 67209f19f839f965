//! Append-only CSV record log
//!
//! The client appends one row per successful upload; the analyzer loads
//! whatever complete rows exist at that moment. Rows are never rewritten.

use crate::error::{Result, TransferError};
use crate::record::TransferRecord;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Column order of the log, written once as the header row
pub const COLUMNS: [&str; 9] = [
    "file_name",
    "original_size",
    "compressed_size",
    "compression_ratio",
    "latency_ms",
    "is_large_file",
    "bug_triggered",
    "checksum_ok",
    "failed",
];

/// Handle to a record log on disk
#[derive(Debug, Clone)]
pub struct RecordLog {
    path: PathBuf,
}

impl RecordLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, writing the header first if the log is new
    pub fn append(&self, record: &TransferRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut out = String::new();
        if file.metadata()?.len() == 0 {
            out.push_str(&header());
            out.push('\n');
        }
        out.push_str(&format_row(record));
        out.push('\n');

        // Single write so a concurrent reader sees either nothing or a full row
        file.write_all(out.as_bytes())?;
        Ok(())
    }

    /// Load every complete row
    ///
    /// A final row without its newline is an append still in flight and is
    /// skipped.
    pub fn load(&self) -> Result<Vec<TransferRecord>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TransferError::Io(std::io::Error::new(
                    ErrorKind::NotFound,
                    format!("record log not found: {}", self.path.display()),
                )))
            }
            Err(e) => return Err(e.into()),
        };
        parse_log(&text)
    }
}

/// Header row for the log
pub fn header() -> String {
    COLUMNS.join(",")
}

/// Escape CSV field (handle commas, quotes, newlines)
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
    {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Format a record as a CSV row (without newline)
pub fn format_row(record: &TransferRecord) -> String {
    let latency = (record.latency_ms * 1000.0).round() / 1000.0;
    [
        escape_field(&record.file_name),
        record.original_size.to_string(),
        record.compressed_size.to_string(),
        record.compression_ratio.to_string(),
        latency.to_string(),
        flag(record.is_large_file).to_string(),
        flag(record.bug_triggered).to_string(),
        flag(record.checksum_ok).to_string(),
        flag(record.failed).to_string(),
    ]
    .join(",")
}

/// Parse the full text of a record log
pub fn parse_log(text: &str) -> Result<Vec<TransferRecord>> {
    let mut rows = split_rows(text)?.into_iter();

    let Some((_, header_fields)) = rows.next() else {
        return Ok(Vec::new());
    };
    if header_fields != COLUMNS {
        return Err(TransferError::InvalidHeader {
            found: header_fields.join(","),
        });
    }

    rows.map(|(line, fields)| parse_fields(line, &fields))
        .collect()
}

/// Split CSV text into complete rows of unescaped fields
///
/// Returns `(line_number, fields)` pairs. Blank lines are dropped, as is an
/// unterminated trailing row. A quote only opens a quoted field at the start
/// of that field; anywhere else it is an ordinary character. A quoted field
/// still open when a later newline exists is malformed, not in flight.
fn split_rows(text: &str) -> Result<Vec<(usize, Vec<String>)>> {
    let mut rows = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut at_field_start = true;
    let mut line = 1;
    let mut row_start = 1;
    let mut row_offset = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        if in_quotes {
            match c {
                '"' if matches!(chars.peek(), Some((_, '"'))) => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if at_field_start => {
                in_quotes = true;
                at_field_start = false;
            }
            ',' => {
                fields.push(std::mem::take(&mut field));
                at_field_start = true;
            }
            '\r' => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                let row = std::mem::take(&mut fields);
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push((row_start, row));
                }
                line += 1;
                row_start = line;
                row_offset = pos + 1;
                at_field_start = true;
            }
            _ => {
                field.push(c);
                at_field_start = false;
            }
        }
    }

    if in_quotes && text[row_offset..].contains('\n') {
        return Err(TransferError::MalformedRecord {
            line: row_start,
            reason: "unterminated quoted field".to_string(),
        });
    }
    if in_quotes || !field.is_empty() || !fields.is_empty() {
        tracing::debug!(line = row_start, "skipping unterminated trailing row");
    }
    Ok(rows)
}

fn parse_fields(line: usize, fields: &[String]) -> Result<TransferRecord> {
    let malformed = |reason: String| TransferError::MalformedRecord { line, reason };

    if fields.len() != COLUMNS.len() {
        return Err(malformed(format!(
            "expected {} fields, found {}",
            COLUMNS.len(),
            fields.len()
        )));
    }

    let int = |idx: usize| {
        fields[idx]
            .trim()
            .parse::<u64>()
            .map_err(|e| malformed(format!("{}: {}", COLUMNS[idx], e)))
    };
    let float = |idx: usize| {
        fields[idx]
            .trim()
            .parse::<f64>()
            .map_err(|e| malformed(format!("{}: {}", COLUMNS[idx], e)))
    };
    let boolean = |idx: usize| match fields[idx].trim() {
        "1" | "true" | "True" => Ok(true),
        "0" | "false" | "False" => Ok(false),
        other => Err(malformed(format!("{}: not a flag: {}", COLUMNS[idx], other))),
    };

    Ok(TransferRecord {
        file_name: fields[0].clone(),
        original_size: int(1)?,
        compressed_size: int(2)?,
        compression_ratio: float(3)?,
        latency_ms: float(4)?,
        is_large_file: boolean(5)?,
        bug_triggered: boolean(6)?,
        checksum_ok: boolean(7)?,
        failed: boolean(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(name: &str, checksum_ok: bool) -> TransferRecord {
        TransferRecord::new(name, 2048, 1024, 12.345_678, false, !checksum_ok, checksum_ok)
    }

    #[test]
    fn test_header_column_order() {
        assert_eq!(
            header(),
            "file_name,original_size,compressed_size,compression_ratio,latency_ms,\
             is_large_file,bug_triggered,checksum_ok,failed"
        );
    }

    #[test]
    fn test_escape_field_simple() {
        assert_eq!(escape_field("hello"), "hello");
    }

    #[test]
    fn test_escape_field_with_comma() {
        assert_eq!(escape_field("a,b.bin"), "\"a,b.bin\"");
    }

    #[test]
    fn test_escape_field_with_quote() {
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_format_row_flags_and_rounding() {
        let row = format_row(&sample("x.bin", false));
        assert_eq!(row, "x.bin,2048,1024,0.5,12.346,0,1,0,1");
    }

    #[test]
    fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let log = RecordLog::new(dir.path().join("sd").join("sd_data.csv"));
        log.append(&sample("a", true)).unwrap();
        log.append(&sample("b", false)).unwrap();

        let text = fs::read_to_string(log.path()).unwrap();
        assert_eq!(text.matches("file_name,").count(), 1);
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_append_then_load() {
        let dir = TempDir::new().unwrap();
        let log = RecordLog::new(dir.path().join("log.csv"));
        log.append(&sample("plain.txt", true)).unwrap();
        log.append(&sample("odd, \"name\".bin", false)).unwrap();

        let records = log.load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].file_name, "plain.txt");
        assert!(!records[0].failed);
        assert_eq!(records[1].file_name, "odd, \"name\".bin");
        assert!(records[1].failed);
        assert!(records[1].bug_triggered);
        assert_eq!(records[1].latency_ms, 12.346);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = TempDir::new().unwrap();
        let log = RecordLog::new(dir.path().join("absent.csv"));
        assert!(log.load().is_err());
    }

    #[test]
    fn test_parse_skips_unterminated_row() {
        let text = format!("{}\nf,1,1,1.0,1.0,0,0,1,0\nhalf,12", header());
        let records = parse_log(&text).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_parse_rejects_bad_header() {
        let result = parse_log("a,b,c\n");
        assert!(matches!(result, Err(TransferError::InvalidHeader { .. })));
    }

    #[test]
    fn test_parse_reports_line_of_bad_row() {
        let text = format!("{}\nf,1,1,1.0,1.0,0,0,1,0\nf,zz,1,1.0,1.0,0,0,1,0\n", header());
        match parse_log(&text) {
            Err(TransferError::MalformedRecord { line, reason }) => {
                assert_eq!(line, 3);
                assert!(reason.contains("original_size"));
            }
            other => panic!("expected malformed record, got {:?}", other),
        }
    }

    #[test]
    fn test_quote_inside_field_is_literal() {
        let text = format!(
            "{}\nab\"c,1,1,1.0,1.0,0,0,1,0\nf,1,1,1.0,1.0,0,0,1,0\ng,1,1,1.0,1.0,0,0,0,1\n",
            header()
        );
        let records = parse_log(&text).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].file_name, "ab\"c");
        assert_eq!(records[2].file_name, "g");
        assert!(records[2].failed);
    }

    #[test]
    fn test_text_after_closing_quote_is_kept() {
        let text = format!("{}\n\"a\"b,1,1,1.0,1.0,0,0,1,0\n", header());
        let records = parse_log(&text).unwrap();
        assert_eq!(records[0].file_name, "ab");
    }

    #[test]
    fn test_unclosed_quote_before_complete_rows_is_malformed() {
        let text = format!(
            "{}\nf,1,1,1.0,1.0,0,0,1,0\n\"open,1,1,1.0,1.0,0,0,1,0\ng,1,1,1.0,1.0,0,0,1,0\n",
            header()
        );
        match parse_log(&text) {
            Err(TransferError::MalformedRecord { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected malformed record, got {:?}", other),
        }
    }

    #[test]
    fn test_unclosed_quote_in_final_row_is_skipped() {
        let text = format!("{}\nf,1,1,1.0,1.0,0,0,1,0\n\"still writ", header());
        assert_eq!(parse_log(&text).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_empty_text() {
        assert!(parse_log("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_accepts_crlf() {
        let text = format!("{}\r\nf,1,1,1.0,1.0,1,0,1,0\r\n", header());
        let records = parse_log(&text).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_large_file);
    }
}
