// src/decode/tokenize.rs

use csv::{ReaderBuilder, StringRecord, Trim};

const BLANK: &[char] = &[' ', '\t', '\n', '\r', '\0', '\x0B'];
const QUOTES: &[char] = &['"', '\''];

/// Splits single rows into cleaned cells.
///
/// Rows go through `csv` with `"` as the quote character, which handles
/// quoted delimiters and `""` escapes. `csv` only knows one quote byte and
/// only honours it as the very first byte of a field, so rows with a
/// `'`-quoted cell or a padded `"` cell (`a, "x,y"`) take [`split_quoted`].
/// A quote anywhere else in a cell is literal: `O'Brien` stays one cell.
#[derive(Debug)]
pub struct RowSplitter {
    builder: ReaderBuilder,
    delimiter: char,
}

impl RowSplitter {
    pub fn new(delimiter: u8) -> Self {
        let mut builder = ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .quote(b'"')
            .delimiter(delimiter);
        Self {
            builder,
            delimiter: delimiter as char,
        }
    }

    pub fn split(&self, row: &str) -> Vec<String> {
        if opens_lenient_quote(row, self.delimiter) {
            return split_quoted(row, self.delimiter);
        }
        let mut reader = self.builder.from_reader(row.as_bytes());
        let mut record = StringRecord::new();
        match reader.read_record(&mut record) {
            Ok(true) => record.iter().map(str::to_string).collect(),
            Ok(false) => vec![String::new()],
            Err(_) => split_quoted(row, self.delimiter),
        }
    }
}

/// One-off [`RowSplitter::split`].
pub fn split_row(row: &str, delimiter: u8) -> Vec<String> {
    RowSplitter::new(delimiter).split(row)
}

/// Does some cell start (after blanks) with `'`, or with `"` after blanks?
/// Scans every position after a delimiter, so it may say yes for a row
/// `csv` could have handled; never the other way round.
fn opens_lenient_quote(row: &str, delimiter: char) -> bool {
    let mut at_start = true;
    let mut padded = false;
    for ch in row.chars() {
        if at_start {
            if BLANK.contains(&ch) {
                padded = true;
                continue;
            }
            if ch == '\'' || (ch == '"' && padded) {
                return true;
            }
            at_start = false;
        }
        if ch == delimiter {
            at_start = true;
            padded = false;
        }
    }
    false
}

/// Cells are either an unquoted run or a span opened by `"` or `'` as the
/// first non-blank character. A span closes only on the quote that opened
/// it, a doubled quote inside it is one literal quote, and an unterminated
/// span runs to the end of the row. Text between a closing quote and the
/// next delimiter is kept.
fn split_quoted(row: &str, delimiter: char) -> Vec<String> {
    let mut cells = Vec::new();
    let mut chars = row.chars().peekable();
    loop {
        while chars.next_if(|c| BLANK.contains(c)).is_some() {}

        let mut cell = String::new();
        if let Some(quote) = chars.next_if(|c| QUOTES.contains(c)) {
            while let Some(ch) = chars.next() {
                if ch != quote {
                    cell.push(ch);
                } else if chars.next_if_eq(&quote).is_some() {
                    cell.push(quote);
                } else {
                    break;
                }
            }
        }

        let mut last = true;
        for ch in chars.by_ref() {
            if ch == delimiter {
                last = false;
                break;
            }
            cell.push(ch);
        }
        cells.push(cell.trim_matches(BLANK).to_string());
        if last {
            return cells;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_cells() {
        assert_eq!(split_row("a,b,c", b','), vec!["a", "b", "c"]);
    }

    #[test]
    fn delimiter_inside_quotes_is_literal() {
        assert_eq!(split_row("\"x,y\",z", b','), vec!["x,y", "z"]);
        assert_eq!(split_row("'x,y',z", b','), vec!["x,y", "z"]);
        assert_eq!(split_row("a, \"x,y\"", b','), vec!["a", "x,y"]);
    }

    #[test]
    fn quotes_must_match_to_close() {
        // `"` never closes on `'`, so the span runs to end of row
        assert_eq!(split_row("'x,y\",z", b','), vec!["x,y\",z"]);
        // the other quote char is literal inside a span
        assert_eq!(split_row("\"it's\",b", b','), vec!["it's", "b"]);
        assert_eq!(split_row("'say \"hi\"',b", b','), vec!["say \"hi\"", "b"]);
    }

    #[test]
    fn mid_cell_quote_is_literal() {
        assert_eq!(split_row("1,O'Brien,10", b','), vec!["1", "O'Brien", "10"]);
        assert_eq!(split_row("'a',O'Brien,10", b','), vec!["a", "O'Brien", "10"]);
        assert_eq!(split_row("6\" pipe,2", b','), vec!["6\" pipe", "2"]);
    }

    #[test]
    fn doubled_quote_is_an_escape() {
        assert_eq!(
            split_row("\"say \"\"hi\"\"\",x", b','),
            vec!["say \"hi\"", "x"]
        );
        assert_eq!(split_row("'it''s',x", b','), vec!["it's", "x"]);
    }

    #[test]
    fn whitespace_and_quotes_trimmed() {
        assert_eq!(split_row("  a , \"b\" ,c\r", b','), vec!["a", "b", "c"]);
        assert_eq!(split_row("a,b\r", b','), vec!["a", "b"]);
    }

    #[test]
    fn empty_cells_are_kept() {
        assert_eq!(split_row("a,,b", b','), vec!["a", "", "b"]);
        assert_eq!(split_row("a,b,", b','), vec!["a", "b", ""]);
        assert_eq!(split_row("\"\",b", b','), vec!["", "b"]);
        assert_eq!(split_row("'',b", b','), vec!["", "b"]);
    }

    #[test]
    fn other_delimiter() {
        assert_eq!(split_row("a;\"b;c\";d", b';'), vec!["a", "b;c", "d"]);
        assert_eq!(split_row("a;'b;c';d", b';'), vec!["a", "b;c", "d"]);
    }

    #[test]
    fn lenient_path_only_when_needed() {
        assert!(!opens_lenient_quote("a,\"b\",O'Brien", ','));
        assert!(opens_lenient_quote("a,'b'", ','));
        assert!(opens_lenient_quote("a, \"b\"", ','));
    }
}
