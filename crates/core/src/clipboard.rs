//! Clipboard text interchange.
//!
//! Rows are separated by `\n`, cells by `\t`. A cell holding a tab, a line
//! break, or starting with a double quote is written quoted with inner
//! quotes doubled, the way spreadsheet applications put ranges on the
//! clipboard. Unquoted text parses as a plain split, so text from tools
//! that never quote round-trips unchanged.
//!
//! Blank lines are dropped on parse. A copied row whose cells are all
//! blank is written with its first cell quoted (`""`) so it keeps its
//! place in the block.

use std::borrow::Cow;
use std::fmt;

/// Failure reported by a clipboard port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardError(pub String);

impl fmt::Display for ClipboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clipboard unavailable: {}", self.0)
    }
}

impl std::error::Error for ClipboardError {}

/// System clipboard access, injected so hosts and tests choose the backend.
pub trait ClipboardPort {
    fn read(&mut self) -> Result<String, ClipboardError>;
    fn write(&mut self, text: &str) -> Result<(), ClipboardError>;
}

/// In-process clipboard.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    text: Option<String>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()) }
    }

    pub fn contents(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

impl ClipboardPort for MemoryClipboard {
    fn read(&mut self) -> Result<String, ClipboardError> {
        Ok(self.text.clone().unwrap_or_default())
    }

    fn write(&mut self, text: &str) -> Result<(), ClipboardError> {
        self.text = Some(text.to_string());
        Ok(())
    }
}

/// Quote a cell only when a plain split would corrupt it.
pub fn encode_cell(value: &str) -> Cow<'_, str> {
    let needs_quotes = value.starts_with('"')
        || value.contains('\t')
        || value.contains('\n')
        || value.contains('\r');
    if !needs_quotes {
        return Cow::Borrowed(value);
    }
    Cow::Owned(quote(value))
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Serialize a rectangle of cell text. Every row ends with `\n`.
pub fn serialize<R, C>(rows: R) -> String
where
    R: IntoIterator<Item = C>,
    C: IntoIterator,
    C::Item: AsRef<str>,
{
    let mut out = String::new();
    for row in rows {
        let cells: Vec<C::Item> = row.into_iter().collect();
        let blank = cells.iter().all(|c| c.as_ref().trim().is_empty());
        for (i, cell) in cells.iter().enumerate() {
            if i > 0 {
                out.push('\t');
            }
            if blank && i == 0 {
                out.push_str(&quote(cell.as_ref()));
            } else {
                out.push_str(&encode_cell(cell.as_ref()));
            }
        }
        out.push('\n');
    }
    out
}

/// Parse clipboard text into rows of cells. Blank lines (empty or
/// whitespace-only, tabs included) are dropped; `\r\n` counts as `\n`.
pub fn parse(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut row_had_quotes = false;
    let mut at_cell_start = true;
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        if at_cell_start && c == '"' {
            if let Some((value, used)) = scan_quoted(rest) {
                cell.push_str(&value);
                row_had_quotes = true;
                at_cell_start = false;
                rest = &rest[used..];
                continue;
            }
        }
        at_cell_start = false;
        match c {
            '\t' => {
                row.push(std::mem::take(&mut cell));
                at_cell_start = true;
            }
            '\n' => {
                row.push(std::mem::take(&mut cell));
                push_row(&mut rows, std::mem::take(&mut row), row_had_quotes);
                row_had_quotes = false;
                at_cell_start = true;
            }
            '\r' if rest[1..].starts_with('\n') => {}
            _ => cell.push(c),
        }
        rest = &rest[c.len_utf8()..];
    }

    if !cell.is_empty() || !row.is_empty() || row_had_quotes {
        row.push(cell);
        push_row(&mut rows, row, row_had_quotes);
    }
    rows
}

fn push_row(rows: &mut Vec<Vec<String>>, row: Vec<String>, had_quotes: bool) {
    let blank = !had_quotes && row.iter().all(|c| c.trim().is_empty());
    if !blank {
        rows.push(row);
    }
}

/// Read a quoted cell at the start of `s`. Only accepted when the closing
/// quote is followed by a delimiter or the end of input; otherwise the
/// quote is literal text.
fn scan_quoted(s: &str) -> Option<(String, usize)> {
    let mut value = String::new();
    let mut chars = s[1..].char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '"' {
            value.push(c);
            continue;
        }
        if matches!(chars.peek(), Some((_, '"'))) {
            value.push('"');
            chars.next();
            continue;
        }
        let end = 1 + i + 1;
        let after = &s[end..];
        let closed = after.is_empty()
            || after.starts_with('\t')
            || after.starts_with('\n')
            || after.starts_with("\r\n");
        return closed.then_some((value, end));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn parse_plain_tsv() {
        assert_eq!(parse("A\tB\nC\tD"), grid(&[&["A", "B"], &["C", "D"]]));
    }

    #[test]
    fn parse_drops_blank_lines() {
        assert_eq!(parse("A\n\n  \n\t\nB\n"), grid(&[&["A"], &["B"]]));
        assert!(parse("").is_empty());
        assert!(parse("\n\n").is_empty());
    }

    #[test]
    fn parse_keeps_empty_cells() {
        assert_eq!(parse("A\t\tC\n"), grid(&[&["A", "", "C"]]));
        assert_eq!(parse("\tB"), grid(&[&["", "B"]]));
    }

    #[test]
    fn parse_crlf() {
        assert_eq!(parse("A\tB\r\nC\tD\r\n"), grid(&[&["A", "B"], &["C", "D"]]));
    }

    #[test]
    fn parse_quoted_cells() {
        assert_eq!(
            parse("\"line1\nline2\"\tx\n\"tab\there\"\t\"say \"\"hi\"\"\"\n"),
            grid(&[&["line1\nline2", "x"], &["tab\there", "say \"hi\""]]),
        );
    }

    #[test]
    fn unterminated_quote_is_literal() {
        assert_eq!(parse("\"abc\tdef"), grid(&[&["\"abc", "def"]]));
        assert_eq!(parse("\"5\" pipe\tx"), grid(&[&["\"5\" pipe", "x"]]));
    }

    #[test]
    fn serialize_terminates_each_row() {
        let text = serialize(grid(&[&["A", "B"], &["", "D"]]));
        assert_eq!(text, "A\tB\n\tD\n");
    }

    #[test]
    fn serialize_quotes_only_when_needed() {
        assert_eq!(encode_cell("plain"), "plain");
        assert_eq!(encode_cell("a\tb"), "\"a\tb\"");
        assert_eq!(encode_cell("\"q\""), "\"\"\"q\"\"\"");
        assert_eq!(encode_cell("mid \"q\""), "mid \"q\"");
    }

    #[test]
    fn awkward_cells_round_trip() {
        let rows = grid(&[&["multi\nline", "\"quoted\"", "tab\tcell"], &["x", "", "y"]]);
        assert_eq!(parse(&serialize(rows.clone())), rows);
    }

    #[test]
    fn blank_row_keeps_its_place() {
        let rows = grid(&[&["L1", "x"], &["", " "], &["L3", "y"]]);
        let text = serialize(rows.clone());
        assert_eq!(text, "L1\tx\n\"\"\t \nL3\ty\n");
        assert_eq!(parse(&text), rows);
        assert_eq!(parse("A\n\"\"\nC\n"), grid(&[&["A"], &[""], &["C"]]));
    }

    #[test]
    fn memory_clipboard() {
        let mut clip = MemoryClipboard::new();
        assert_eq!(clip.read().unwrap(), "");
        clip.write("A\tB\n").unwrap();
        assert_eq!(clip.contents(), Some("A\tB\n"));
    }
}
