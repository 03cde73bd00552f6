//! Text-format array literals: `{1,2,NULL}`, `{"a b","c\"d"}`, `{{1,2},{3,4}}`.

use std::borrow::Cow;

use crate::error::{Error, Result};

use super::Value;

/// Parse an array literal, converting each non-NULL element with `element`.
///
/// Nested braces produce nested `Value::Array`s. A leading dimension
/// decoration such as `[0:1]=` is skipped.
pub fn parse_array(text: &str, element: &dyn Fn(&str) -> Result<Value>) -> Result<Value> {
    let body = match text.strip_prefix('[') {
        Some(_) => text
            .split_once('=')
            .map(|(_, rest)| rest)
            .ok_or_else(|| invalid(text, "dimension decoration without '='"))?,
        None => text,
    };

    let mut parser = Parser {
        input: body,
        pos: 0,
    };
    let items = parser.parse_list(element)?;
    if parser.pos != body.len() {
        return Err(invalid(text, "trailing characters"));
    }
    Ok(Value::Array(items))
}

fn invalid(text: &str, reason: &str) -> Error {
    Error::Value(format!("invalid array literal {:?}: {}", text, reason))
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() != Some(byte) {
            return Err(invalid(self.input, &format!("expected '{}' at {}", byte as char, self.pos)));
        }
        self.pos += 1;
        Ok(())
    }

    fn parse_list(&mut self, element: &dyn Fn(&str) -> Result<Value>) -> Result<Vec<Value>> {
        self.expect(b'{')?;
        let mut items = Vec::new();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(items);
        }

        loop {
            let item = match self.peek() {
                Some(b'{') => Value::Array(self.parse_list(element)?),
                Some(b'"') => element(&self.quoted()?)?,
                Some(_) => {
                    let raw = self.unquoted();
                    if raw.eq_ignore_ascii_case("NULL") {
                        Value::Null
                    } else {
                        element(raw)?
                    }
                }
                None => return Err(invalid(self.input, "unterminated array")),
            };
            items.push(item);

            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(items);
                }
                _ => return Err(invalid(self.input, &format!("expected ',' or '}}' at {}", self.pos))),
            }
        }
    }

    fn quoted(&mut self) -> Result<Cow<'a, str>> {
        self.expect(b'"')?;
        let input = self.input;
        let bytes = input.as_bytes();
        let start = self.pos;
        let mut owned: Option<String> = None;
        let mut run_start = start;

        while let Some(&b) = bytes.get(self.pos) {
            match b {
                b'"' => {
                    let text = match owned {
                        Some(mut s) => {
                            s.push_str(&input[run_start..self.pos]);
                            Cow::Owned(s)
                        }
                        None => Cow::Borrowed(&input[start..self.pos]),
                    };
                    self.pos += 1;
                    return Ok(text);
                }
                b'\\' => {
                    let s = owned.get_or_insert_with(String::new);
                    s.push_str(&input[run_start..self.pos]);
                    // Escaped character is kept verbatim; it may be multi-byte.
                    let escaped = input[self.pos + 1..]
                        .chars()
                        .next()
                        .ok_or_else(|| invalid(input, "dangling backslash"))?;
                    s.push(escaped);
                    self.pos += 1 + escaped.len_utf8();
                    run_start = self.pos;
                }
                _ => self.pos += 1,
            }
        }

        Err(invalid(input, "unterminated quoted element"))
    }

    fn unquoted(&mut self) -> &'a str {
        let input = self.input;
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b',' || b == b'}' {
                break;
            }
            self.pos += 1;
        }
        input[start..self.pos].trim()
    }
}
