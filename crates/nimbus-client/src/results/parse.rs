use std::fmt;

use serde::Serialize;

use nimbus_common::ParseError;

/// One value of a prediction row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRow {
    pub file: String,
    pub prediction: Scalar,
}

/// Parsed scoring output with columns `file` and `prediction`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PredictionTable {
    rows: Vec<PredictionRow>,
}

impl PredictionTable {
    pub fn rows(&self) -> &[PredictionRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render as `file,prediction` CSV with a header line.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("file,prediction\n");
        for row in &self.rows {
            out.push_str(&csv_field(&row.file));
            out.push(',');
            out.push_str(&csv_field(&row.prediction.to_string()));
            out.push('\n');
        }
        out
    }
}

impl IntoIterator for PredictionTable {
    type Item = PredictionRow;
    type IntoIter = std::vec::IntoIter<PredictionRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

/// Parse scoring output made of `(file, prediction)` tuples separated by
/// commas or newlines.
///
/// ```text
/// table   := sep* ( tuple ( sep+ tuple )* )? sep*
/// sep     := ',' | newline
/// tuple   := '(' scalar ',' scalar ','? ')'
/// scalar  := quoted-string | number | bare-word
/// ```
///
/// Other whitespace is ignored. No recovery: the first error is returned with
/// the byte offset where parsing stopped.
pub fn parse_predictions(text: &str) -> Result<PredictionTable, ParseError> {
    Parser { src: text, pos: 0 }.table()
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

fn is_blank(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r')
}

fn is_bare(b: u8) -> bool {
    !b.is_ascii_whitespace() && !matches!(b, b',' | b'(' | b')' | b'\'' | b'"')
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.pos, message)
    }

    fn skip_blanks(&mut self) {
        while self.peek().is_some_and(is_blank) {
            self.pos += 1;
        }
    }

    /// Inside a tuple newlines are plain whitespace.
    fn skip_inner(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Returns the number of separators consumed.
    fn skip_separators(&mut self) -> usize {
        let mut seps = 0;
        loop {
            self.skip_blanks();
            match self.peek() {
                Some(b',' | b'\n') => {
                    self.pos += 1;
                    seps += 1;
                }
                _ => return seps,
            }
        }
    }

    fn table(mut self) -> Result<PredictionTable, ParseError> {
        let mut rows = Vec::new();
        self.skip_separators();
        while let Some(b) = self.peek() {
            match b {
                b'(' => rows.push(self.tuple()?),
                b')' => return Err(self.error("unbalanced ')'")),
                _ => return Err(self.error("expected '('")),
            }
            let seps = self.skip_separators();
            if seps == 0 {
                match self.peek() {
                    None => break,
                    Some(b')') => return Err(self.error("unbalanced ')'")),
                    Some(_) => return Err(self.error("expected ',' or newline between rows")),
                }
            }
        }
        Ok(PredictionTable { rows })
    }

    fn tuple(&mut self) -> Result<PredictionRow, ParseError> {
        let open = self.pos;
        self.pos += 1;
        self.skip_inner();

        let file_at = self.pos;
        let file = match self.scalar(open)? {
            Scalar::Text(s) => s,
            other => {
                return Err(ParseError::new(
                    file_at,
                    format!("file column must be text, found {other}"),
                ))
            }
        };

        self.skip_inner();
        match self.peek() {
            Some(b',') => self.pos += 1,
            None => return Err(ParseError::new(open, "unbalanced '('")),
            Some(_) => return Err(self.error("expected ',' between file and prediction")),
        }
        self.skip_inner();
        let prediction = self.scalar(open)?;

        self.skip_inner();
        if self.peek() == Some(b',') {
            self.pos += 1;
            self.skip_inner();
        }
        match self.peek() {
            Some(b')') => {
                self.pos += 1;
                Ok(PredictionRow { file, prediction })
            }
            None => Err(ParseError::new(open, "unbalanced '('")),
            Some(_) => Err(self.error("expected ')' after two elements")),
        }
    }

    fn scalar(&mut self, open: usize) -> Result<Scalar, ParseError> {
        match self.peek() {
            Some(q @ (b'\'' | b'"')) => self.quoted(q as char).map(Scalar::Text),
            Some(b) if is_bare(b) => Ok(self.bare()),
            Some(_) => Err(self.error("expected a value")),
            None => Err(ParseError::new(open, "unbalanced '('")),
        }
    }

    fn bare(&mut self) -> Scalar {
        let start = self.pos;
        while self.peek().is_some_and(is_bare) {
            self.pos += 1;
        }
        let word = &self.src[start..self.pos];
        if let Ok(v) = word.parse::<i64>() {
            return Scalar::Int(v);
        }
        // Keep words like "nan" or "inf" as text.
        if word.bytes().any(|b| b.is_ascii_digit()) {
            if let Ok(v) = word.parse::<f64>() {
                return Scalar::Float(v);
            }
        }
        Scalar::Text(word.to_string())
    }

    fn quoted(&mut self, quote: char) -> Result<String, ParseError> {
        let start = self.pos;
        let body = start + 1;
        let mut out = String::new();
        let mut chars = self.src[body..].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, other)) => out.push(other),
                    None => break,
                },
                c if c == quote => {
                    self.pos = body + i + c.len_utf8();
                    return Ok(out);
                }
                c => out.push(c),
            }
        }
        Err(ParseError::new(start, "unterminated string"))
    }
}
