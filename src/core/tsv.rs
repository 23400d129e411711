//! Tab-separated tables with a mandatory header row.
//!
//! Free text is escaped on write (`\\`, `\t`, `\n`, `\r`) so a cell can never
//! split a row or a line, and the header gets a trailing [`ESCAPED_MARKER`]
//! column. Only files carrying the marker are unescaped on read; anything
//! else is taken verbatim, so backslashes in hand-made files survive.
//! Reading is header-driven: a column that is absent reads as an empty
//! string.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::error::{CatalogError, CatalogResult};

/// Last header cell of every table this crate writes.
pub const ESCAPED_MARKER: &str = "#escaped";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Source line of each row, 1-based
    lines: Vec<usize>,
    escaped: bool,
}

impl Table {
    pub fn new(header: &[&str]) -> Self {
        Self {
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
            lines: Vec::new(),
            escaped: true,
        }
    }

    /// Read a table from disk. A missing file is an error; callers decide
    /// whether that means "empty".
    pub fn read(path: &Path) -> CatalogResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content).map_err(|(line, reason)| CatalogError::Malformed {
            file: path.to_path_buf(),
            line,
            reason,
        })
    }

    /// Parse table text. Errors carry a 1-based line number.
    pub fn parse(content: &str) -> Result<Self, (usize, String)> {
        let mut lines = content.lines().enumerate();

        let mut header: Vec<String> = match lines.next() {
            Some((_, line)) if !line.trim().is_empty() => {
                line.split('\t').map(|h| h.trim().to_string()).collect()
            }
            _ => return Err((1, "missing header row".to_string())),
        };
        let escaped = header.last().map(String::as_str) == Some(ESCAPED_MARKER);
        if escaped {
            header.pop();
        }

        let mut rows = Vec::new();
        let mut row_lines = Vec::new();
        for (idx, line) in lines {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            let mut cells: Vec<String> = if escaped {
                line.split('\t').map(unescape).collect()
            } else {
                line.split('\t').map(String::from).collect()
            };
            if cells.len() > header.len() {
                return Err((
                    idx + 1,
                    format!(
                        "{} fields but the header has {} columns",
                        cells.len(),
                        header.len()
                    ),
                ));
            }
            cells.resize(header.len(), String::new());
            rows.push(cells);
            row_lines.push(idx + 1);
        }

        Ok(Self {
            header,
            rows,
            lines: row_lines,
            escaped,
        })
    }

    /// Serialize the table. A verbatim (unmarked) table is written back
    /// without escaping so its cells keep their bytes.
    pub fn to_text(&self) -> String {
        let mut out = self.header.join("\t");
        if self.escaped {
            out.push('\t');
            out.push_str(ESCAPED_MARKER);
        }
        out.push('\n');
        for row in &self.rows {
            if self.escaped {
                let cells: Vec<String> = row.iter().map(|c| escape(c)).collect();
                out.push_str(&cells.join("\t"));
            } else {
                out.push_str(&row.join("\t"));
            }
            out.push('\n');
        }
        out
    }

    pub fn write(&self, path: &Path) -> CatalogResult<()> {
        write_atomic(path, &self.to_text())
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.lines.push(self.rows.len() + 2);
        self.rows.push(row);
    }

    /// Keep the rows `keep` accepts; it may edit a row in place.
    pub fn retain_rows(&mut self, mut keep: impl FnMut(&mut Vec<String>) -> bool) {
        let rows = std::mem::take(&mut self.rows);
        let lines = std::mem::take(&mut self.lines);
        for (mut row, line) in rows.into_iter().zip(lines) {
            if keep(&mut row) {
                self.rows.push(row);
                self.lines.push(line);
            }
        }
    }

    /// Iterate rows as name-addressable records.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        let index: HashMap<&str, usize> = self
            .header
            .iter()
            .enumerate()
            .map(|(i, h)| (h.as_str(), i))
            .collect();
        let index = std::rc::Rc::new(index);
        self.rows
            .iter()
            .zip(&self.lines)
            .map(move |(cells, &line)| Record {
                line,
                index: index.clone(),
                cells,
            })
    }
}

pub struct Record<'a> {
    /// 1-based line number in the source file (header is line 1).
    pub line: usize,
    index: std::rc::Rc<HashMap<&'a str, usize>>,
    cells: &'a [String],
}

impl<'a> Record<'a> {
    pub fn get(&self, column: &str) -> &'a str {
        self.index
            .get(column)
            .and_then(|&i| self.cells.get(i))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    /// Non-empty cell value, `None` for blank or absent columns.
    pub fn optional(&self, column: &str) -> Option<String> {
        let value = self.get(column).trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }
}

/// Write atomically: a sibling temp file is renamed over the target.
pub fn write_atomic(path: &Path, text: &str) -> CatalogResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tsv.tmp");
    fs::write(&tmp, text)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn escape(cell: &str) -> String {
    let mut out = String::with_capacity(cell.len());
    for c in cell.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

pub fn unescape(cell: &str) -> String {
    let mut out = String::with_capacity(cell.len());
    let mut chars = cell.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            // Unknown escape: keep both characters verbatim
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_keeps_rows_intact() {
        let mut table = Table::new(&["Title", "Description"]);
        table.push(vec![
            "Tabs\tand\nnewlines".to_string(),
            r"C:\data\set".to_string(),
        ]);

        let text = table.to_text();
        assert_eq!(text.lines().count(), 2);

        let parsed = Table::parse(&text).unwrap();
        assert_eq!(parsed, table);
    }

    #[test]
    fn test_missing_columns_read_empty() {
        let table = Table::parse("Title\tLikes\nAtlas\t3\nShort\n").unwrap();
        let records: Vec<_> = table.records().collect();
        assert_eq!(records[0].get("Likes"), "3");
        assert_eq!(records[1].get("Likes"), "");
        assert_eq!(records[1].get("Date"), "");
        assert!(records[1].optional("Date").is_none());
    }

    #[test]
    fn test_unmarked_file_is_read_verbatim() {
        let table = Table::parse("Title\tDescription\nA\tfiles in C:\\data\\raw\n").unwrap();
        assert_eq!(table.rows[0][1], r"files in C:\data\raw");
        assert_eq!(table.to_text(), "Title\tDescription\nA\tfiles in C:\\data\\raw\n");
    }

    #[test]
    fn test_written_tables_carry_marker() {
        let mut table = Table::new(&["Text"]);
        table.push(vec![r"a\b".to_string()]);
        let text = table.to_text();
        assert_eq!(text, format!("Text\t{}\na\\\\b\n", ESCAPED_MARKER));
        assert_eq!(Table::parse(&text).unwrap().rows[0][0], r"a\b");
    }

    #[test]
    fn test_record_lines_skip_blank_rows() {
        let table = Table::parse("Id\n1\n\n\n2\n").unwrap();
        let lines: Vec<usize> = table.records().map(|r| r.line).collect();
        assert_eq!(lines, vec![2, 5]);

        let err = Table::parse("A\n1\n\n1\t2\n").unwrap_err();
        assert_eq!(err.0, 4);
    }

    #[test]
    fn test_extra_fields_are_malformed() {
        let err = Table::parse("A\tB\n1\t2\t3\n").unwrap_err();
        assert_eq!(err.0, 2);
    }

    #[test]
    fn test_empty_file_has_no_header() {
        assert!(Table::parse("").is_err());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/posts.tsv");
        let mut table = Table::new(&["Post ID"]);
        table.push(vec!["7".to_string()]);
        table.write(&path).unwrap();

        let read = Table::read(&path).unwrap();
        assert_eq!(read.rows, vec![vec!["7".to_string()]]);
    }
}
