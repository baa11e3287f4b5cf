//! Lazy CSV record source.
//!
//! Produces a finite, single-pass sequence of [`RawRecord`]s from a delimited
//! file. Construction fails when the file is missing or the header lacks a
//! required column; any structural error mid-stream (wrong field count,
//! unterminated quote, bad UTF-8) is fatal and ends the sequence — corrupt
//! input is infrastructure failure, not a per-record condition.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use csv::{ReaderBuilder, StringRecord};

use ri_common::{Error, RawRecord, Result, COLUMNS};

/// CSV read buffer: large enough to keep syscall overhead irrelevant while
/// staying far below any memory threshold worth throttling over.
const READ_BUFFER_BYTES: usize = 1 << 20;

/// Streaming parser over one input file.
#[derive(Debug)]
pub struct RecordParser {
    reader: csv::Reader<File>,
    headers: Arc<[String]>,
    row: StringRecord,
    /// 1-based data line counter (header excluded).
    line: u64,
    done: bool,
}

impl RecordParser {
    /// Open the input file and read the header row eagerly.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::InputFile(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .buffer_capacity(READ_BUFFER_BYTES)
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| Error::MalformedInput(format!("header row: {e}")))?
            .iter()
            .map(str::to_string)
            .collect();

        for required in COLUMNS {
            if !headers.iter().any(|h| h == required) {
                return Err(Error::MissingColumn(required.to_string()));
            }
        }

        Ok(Self {
            reader,
            headers: headers.into(),
            row: StringRecord::new(),
            line: 0,
            done: false,
        })
    }

    pub fn headers(&self) -> &Arc<[String]> {
        &self.headers
    }
}

impl Iterator for RecordParser {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_record(&mut self.row) {
            Ok(false) => {
                self.done = true;
                None
            }
            Ok(true) => {
                self.line += 1;
                let values = self.row.iter().map(str::to_string).collect();
                Some(Ok(RawRecord::new(
                    Arc::clone(&self.headers),
                    values,
                    self.line,
                )))
            }
            Err(e) => {
                // The stream is not restartable past a structural error.
                self.done = true;
                Some(Err(Error::MalformedInput(format!(
                    "row {}: {e}",
                    self.line + 1
                ))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "first_name,last_name,email,department,job_title,hire_date,salary";

    fn write_file(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn missing_file_is_rejected_at_construction() {
        let err = RecordParser::open(Path::new("/nonexistent/employees.csv")).unwrap_err();
        assert!(matches!(err, Error::InputFile(_)));
        assert_eq!(err.code(), 20);
    }

    #[test]
    fn missing_required_column_is_rejected() {
        let f = write_file("first_name,last_name\nAda,Lovelace\n");
        let err = RecordParser::open(f.path()).unwrap_err();
        assert!(matches!(err, Error::MissingColumn(ref c) if c == "email"));
    }

    #[test]
    fn parses_rows_in_order_with_line_numbers() {
        let f = write_file(&format!(
            "{HEADER}\nAda,Lovelace,ada@example.com,Eng,Analyst,1843-10-18,100\nAlan,Turing,alan@example.com,Eng,Fellow,,\n"
        ));
        let parser = RecordParser::open(f.path()).unwrap();
        let records: Vec<RawRecord> = parser.map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("first_name"), Some("Ada"));
        assert_eq!(records[0].line(), 1);
        assert_eq!(records[1].get("email"), Some("alan@example.com"));
        assert_eq!(records[1].line(), 2);
        assert_eq!(records[1].get_trimmed("hire_date"), None);
    }

    #[test]
    fn wrong_column_count_is_fatal_and_ends_stream() {
        let f = write_file(&format!(
            "{HEADER}\nAda,Lovelace,ada@example.com,Eng,Analyst,1843-10-18,100\nshort,row\nAlan,Turing,alan@example.com,Eng,Fellow,,\n"
        ));
        let mut parser = RecordParser::open(f.path()).unwrap();
        assert!(parser.next().unwrap().is_ok());
        let err = parser.next().unwrap().unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
        assert!(err.to_string().contains("row 2"));
        // Stream is fused after a fatal error.
        assert!(parser.next().is_none());
    }

    #[test]
    fn unterminated_quote_is_fatal() {
        let f = write_file(&format!(
            "{HEADER}\n\"Ada,Lovelace,ada@example.com,Eng,Analyst,1843-10-18,100\n"
        ));
        let mut parser = RecordParser::open(f.path()).unwrap();
        let first = parser.find(|r| r.is_err());
        assert!(matches!(first, Some(Err(Error::MalformedInput(_)))));
    }

    #[test]
    fn empty_body_yields_nothing() {
        let f = write_file(&format!("{HEADER}\n"));
        let mut parser = RecordParser::open(f.path()).unwrap();
        assert!(parser.next().is_none());
    }
}
