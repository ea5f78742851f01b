//! Splits SQL text into verbatim text and `{...}` placeholder spans.

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    /// Text copied to the output unchanged, including comments and literals.
    Text(&'a str),
    /// The content between a pair of braces.
    Placeholder {
        body: &'a str,
        /// Offset of the opening brace in the scanned text.
        start: usize,
        /// Offset just past the closing brace.
        end: usize,
    },
}

/// Iterates over the [`Token`]s of an SQL template.
///
/// Block comments and quoted literals are never scanned for braces; when
/// one is left open it runs to the end of the text. Scanning stops after
/// the first error.
pub(crate) struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Scanner { text, pos: 0 }
    }

    fn fail(&mut self, message: &str, start: usize, length: usize) -> Option<Result<Token<'a>, ParseError>> {
        self.pos = self.text.len();
        Some(Err(ParseError::new(message, start, length)))
    }
}

/// Offset just past the comment opening at `start`.
pub(crate) fn skip_comment(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 2;
    while i + 1 < bytes.len() {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            return i + 2;
        }
        i += 1;
    }
    bytes.len()
}

/// Offset just past the literal opening at `start`; a doubled quote is an
/// escaped quote.
pub(crate) fn skip_literal(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<Token<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.text.as_bytes();
        let begin = self.pos;
        if begin >= bytes.len() {
            return None;
        }

        let mut i = begin;
        while i < bytes.len() {
            match bytes[i] {
                b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_comment(bytes, i),
                b'\'' | b'"' => i = skip_literal(bytes, i),
                b'{' | b'}' if i > begin => {
                    self.pos = i;
                    return Some(Ok(Token::Text(&self.text[begin..i])));
                }
                b'}' => return self.fail("Unmatched closing brace", i, 1),
                b'{' => {
                    let mut in_separator = false;
                    let mut close = None;
                    for (k, &c) in bytes.iter().enumerate().skip(i + 1) {
                        match c {
                            b'#' => in_separator = !in_separator,
                            _ if in_separator => {}
                            b'{' => return self.fail("Nested placeholder", k, 1),
                            b'}' => {
                                close = Some(k);
                                break;
                            }
                            _ => {}
                        }
                    }
                    let Some(close) = close else {
                        return self.fail("Unterminated placeholder", i, bytes.len() - i);
                    };
                    self.pos = close + 1;
                    return Some(Ok(Token::Placeholder {
                        body: &self.text[i + 1..close],
                        start: i,
                        end: close + 1,
                    }));
                }
                _ => i += 1,
            }
        }

        self.pos = bytes.len();
        Some(Ok(Token::Text(&self.text[begin..])))
    }
}
