use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Append-only CSV file with a fixed header.
///
/// The header is written only when the file is new or empty, so repeated
/// runs can share one file. Rows are not de-duplicated across runs.
pub struct CsvSink {
    path: PathBuf,
    columns: &'static [&'static str],
    file: File,
}

impl CsvSink {
    pub fn open(path: &Path, columns: &'static [&'static str]) -> Result<Self> {
        let is_new = std::fs::metadata(path).map_or(true, |m| m.len() == 0);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if is_new {
            writeln!(file, "{}", format_record(columns.iter().copied()))?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            columns,
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, row: &[String]) -> Result<()> {
        debug_assert_eq!(row.len(), self.columns.len(), "row does not match header");
        writeln!(self.file, "{}", format_record(row.iter().map(String::as_str)))?;
        Ok(())
    }
}

fn format_record<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    fields.map(escape_field).collect::<Vec<_>>().join(",")
}

/// Quote a field when it contains a delimiter, quote or line break.
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split one CSV line, honouring double-quoted fields and `""` escapes.
pub fn parse_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches(['\r', '\n']).chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const COLUMNS: &[&str] = &["id", "title", "labels"];

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn test_parse_line_quotes() {
        assert_eq!(parse_line("a,b"), vec!["a", "b"]);
        assert_eq!(parse_line("\"a,b\",c"), vec!["a,b", "c"]);
        assert_eq!(parse_line("\"say \"\"hi\"\"\",x\r\n"), vec!["say \"hi\"", "x"]);
        assert_eq!(parse_line(""), vec![""]);
    }

    #[test]
    fn test_header_written_once_rows_appended() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("merge_requests.csv");

        {
            let mut sink = CsvSink::open(&path, COLUMNS).unwrap();
            sink.append(&["1".into(), "Fix, things".into(), "bug".into()])
                .unwrap();
        }
        {
            let mut sink = CsvSink::open(&path, COLUMNS).unwrap();
            sink.append(&["1".into(), "Fix, things".into(), "bug".into()])
                .unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "id,title,labels",
                "1,\"Fix, things\",bug",
                "1,\"Fix, things\",bug"
            ]
        );
    }

    #[test]
    fn test_empty_existing_file_gets_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("commits.csv");
        std::fs::write(&path, "").unwrap();

        let mut sink = CsvSink::open(&path, COLUMNS).unwrap();
        sink.append(&["1".into(), "t".into(), "".into()]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "id,title,labels\n1,t,\n");
    }
}
