use std::collections::HashSet;

use super::{
    scanner::{Scanner, Token},
    ParameterDefinition, PartialSlot, ResultDefinition, Template,
};
use crate::{error::ParseError, registry::AUTO};

const ONE_TARGET: &str = "A result may target only one field or constructor parameter";

/// Parses SQL templates.
///
/// ```
/// use sqlx_query_mapper::template::Parser;
///
/// let template = Parser::new("call add_user({%1}, {long %%})")
///     .call_statement(true)
///     .parameter_count(1)
///     .parse()?;
///
/// assert_eq!(template.sql, "call add_user(?, ?)");
/// assert_eq!(template.results[0].columns, vec![2]);
/// # Ok::<(), sqlx_query_mapper::error::ParseError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Parser<'a> {
    sql: &'a str,
    call: bool,
    parameter_count: Option<usize>,
}

enum Definition {
    Parameter(ParameterDefinition),
    Result(ResultDefinition),
}

impl Definition {
    fn is_result(&self) -> bool {
        matches!(self, Definition::Result(_))
    }

    fn is_map_key(&self) -> bool {
        matches!(self, Definition::Result(r) if r.map_key)
    }

    fn partial(&self) -> Option<(&str, PartialSlot)> {
        match self {
            Definition::Parameter(p) => p.partial.map(|slot| (p.type_name.as_str(), slot)),
            Definition::Result(r) => r.partial.map(|slot| (r.type_name.as_str(), slot)),
        }
    }
}

impl<'a> Parser<'a> {
    pub fn new(sql: &'a str) -> Self {
        Parser {
            sql,
            call: false,
            parameter_count: None,
        }
    }

    /// In call statements a placeholder may pair an input parameter with
    /// an output result, and result placeholders occupy `?` slots.
    pub fn call_statement(mut self, call: bool) -> Self {
        self.call = call;
        self
    }

    /// Rejects `%N` references past the method's parameter count.
    pub fn parameter_count(mut self, count: usize) -> Self {
        self.parameter_count = Some(count);
        self
    }

    pub fn parse(self) -> Result<Template, ParseError> {
        let mut sql = String::with_capacity(self.sql.len());
        let mut parameters = Vec::new();
        let mut results = Vec::new();
        let mut markers = 0;
        let mut columns = 0;
        let mut partials = HashSet::new();

        for token in Scanner::new(self.sql) {
            let (body, start, end) = match token? {
                Token::Text(text) => {
                    sql.push_str(text);
                    continue;
                }
                Token::Placeholder { body, start, end } => (body, start, end),
            };

            let definitions = self.definitions(body, start + 1)?;
            self.check_group(&definitions, start, end)?;

            for (definition, (def_start, def_len)) in &definitions {
                if let Some((type_name, slot)) = definition.partial() {
                    if let Some(position) = slot.position {
                        let key = (
                            definition.is_result(),
                            type_name.to_owned(),
                            slot.group,
                            position,
                        );
                        if !partials.insert(key) {
                            return Err(ParseError::new(
                                "Duplicate partial definition",
                                *def_start,
                                *def_len,
                            ));
                        }
                    }
                }
            }

            let emits_marker = self.call || definitions.iter().any(|(d, _)| !d.is_result());
            let slot = if emits_marker {
                sql.push('?');
                markers += 1;
                markers
            } else {
                columns += 1;
                columns
            };

            for (definition, _) in definitions {
                match definition {
                    Definition::Parameter(mut p) => {
                        p.sql_indexes.push(slot);
                        parameters.push(p);
                    }
                    Definition::Result(mut r) => {
                        r.columns.push(slot);
                        results.push(r);
                    }
                }
            }
        }

        Ok(Template {
            sql: sql.trim().to_owned(),
            parameters,
            results,
        })
    }

    /// Splits a placeholder body on commas outside separators.
    fn definitions(
        &self,
        body: &str,
        offset: usize,
    ) -> Result<Vec<(Definition, (usize, usize))>, ParseError> {
        let mut parts = Vec::new();
        let mut in_separator = false;
        let mut from = 0;
        for (i, c) in body.char_indices() {
            match c {
                '#' => in_separator = !in_separator,
                ',' if !in_separator => {
                    parts.push((from, &body[from..i]));
                    from = i + 1;
                }
                _ => {}
            }
        }
        parts.push((from, &body[from..]));

        parts
            .into_iter()
            .map(|(at, part)| {
                let leading = part.len() - part.trim_start().len();
                let text = part.trim();
                let start = offset + at + leading;
                if text.is_empty() {
                    return Err(ParseError::new("Empty definition", offset + at, part.len()));
                }
                let definition = self.definition(text, start)?;
                Ok((definition, (start, text.len())))
            })
            .collect()
    }

    fn definition(&self, text: &str, start: usize) -> Result<Definition, ParseError> {
        let mut c = Cursor { text, start, pos: 0 };

        let type_name = if c.peek() == Some('%') {
            AUTO.to_owned()
        } else {
            let name = c.ident().ok_or_else(|| c.error("Expected mapping type or '%'"))?;
            c.skip_whitespace();
            name.to_owned()
        };

        if !c.eat('%') {
            return Err(c.error("Expected '%'"));
        }

        let mut definition = if c.eat('%') {
            Definition::Result(ResultDefinition {
                type_name,
                columns: Vec::new(),
                field: None,
                constructor_parameter: None,
                map_key: c.eat('*'),
                partial: None,
            })
        } else {
            let at = c.pos;
            let parameter = c
                .number()?
                .ok_or_else(|| c.error("Expected parameter index or '%'"))?;
            if parameter == 0 {
                return Err(c.error_at("Parameter indexes start at 1", at));
            }
            if self.parameter_count.is_some_and(|count| parameter > count) {
                return Err(c.error_at(&format!("Parameter index {parameter} out of range"), at));
            }
            Definition::Parameter(ParameterDefinition {
                type_name,
                parameter,
                sql_indexes: Vec::new(),
                fields: Vec::new(),
                separator: None,
                partial: None,
            })
        };

        while c.eat('.') {
            match &mut definition {
                Definition::Result(r) if c.eat('$') => {
                    let at = c.pos;
                    let ordinal = c
                        .number()?
                        .ok_or_else(|| c.error("Expected constructor parameter ordinal"))?;
                    if ordinal == 0 {
                        return Err(c.error_at("Constructor parameter ordinals start at 1", at));
                    }
                    if r.field.is_some() || r.constructor_parameter.is_some() {
                        return Err(c.error_at(ONE_TARGET, at));
                    }
                    r.constructor_parameter = Some(ordinal);
                }
                Definition::Result(r) => {
                    let at = c.pos;
                    let field = c.ident().ok_or_else(|| c.error("Expected field name"))?;
                    if r.field.is_some() || r.constructor_parameter.is_some() {
                        return Err(c.error_at(ONE_TARGET, at));
                    }
                    r.field = Some(field.to_owned());
                }
                Definition::Parameter(p) => {
                    let field = c.ident().ok_or_else(|| c.error("Expected field name"))?;
                    p.fields.push(field.to_owned());
                }
            }
        }

        if c.eat('@') {
            let group = c
                .number()?
                .ok_or_else(|| c.error("Expected partial definition group index"))?;
            let position = if c.eat('[') {
                let position = c
                    .number()?
                    .ok_or_else(|| c.error("Expected partial definition position"))?;
                if !c.eat(']') {
                    return Err(c.error("Expected ']'"));
                }
                Some(position)
            } else {
                None
            };
            let slot = Some(PartialSlot { group, position });
            match &mut definition {
                Definition::Parameter(p) => p.partial = slot,
                Definition::Result(r) => r.partial = slot,
            }
        }

        if c.peek() == Some('#') {
            let at = c.pos;
            c.pos += 1;
            let rest = &c.text[c.pos..];
            let Some(len) = rest.find('#') else {
                return Err(c.error_at("Unterminated separator", at));
            };
            let separator = rest[..len].to_owned();
            c.pos += len + 1;
            match &mut definition {
                Definition::Parameter(p) => p.separator = Some(separator),
                Definition::Result(_) => {
                    return Err(
                        c.error_at("Separators are only allowed on parameter definitions", at)
                    );
                }
            }
        }

        c.skip_whitespace();
        if let Some(ch) = c.peek() {
            return Err(c.error(&format!("Unexpected character '{ch}'")));
        }
        Ok(definition)
    }

    fn check_group(
        &self,
        definitions: &[(Definition, (usize, usize))],
        start: usize,
        end: usize,
    ) -> Result<(), ParseError> {
        let error = |message: &str| Err(ParseError::new(message, start, end - start));
        match definitions {
            [_] => Ok(()),
            [(a, _), (b, _)] if self.call => {
                if a.is_result() == b.is_result() {
                    error("A call placeholder may only pair one parameter with one result definition")
                } else {
                    Ok(())
                }
            }
            [(a, _), (b, _)] => {
                if !a.is_result() || !b.is_result() {
                    error("Parameter definitions cannot share a placeholder")
                } else if !a.is_map_key() && !b.is_map_key() {
                    error("One of the definitions must be a map key definition")
                } else if a.is_map_key() && b.is_map_key() {
                    error("Only one of the definitions may be a map key definition")
                } else {
                    Ok(())
                }
            }
            _ => error("A placeholder may hold at most two definitions"),
        }
    }
}

/// Position within one definition's text.
struct Cursor<'a> {
    text: &'a str,
    /// Offset of `text` in the original SQL.
    start: usize,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek().filter(|c| c.is_whitespace()) {
            self.pos += c.len_utf8();
        }
    }

    fn ident(&mut self) -> Option<&'a str> {
        let rest = &self.text[self.pos..];
        let first = rest.chars().next()?;
        if !(first.is_ascii_alphabetic() || first == '_') {
            return None;
        }
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        self.pos += len;
        Some(&rest[..len])
    }

    fn number(&mut self) -> Result<Option<usize>, ParseError> {
        let rest = &self.text[self.pos..];
        let len = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if len == 0 {
            return Ok(None);
        }
        let at = self.pos;
        self.pos += len;
        rest[..len]
            .parse()
            .map(Some)
            .map_err(|_| ParseError::new("Number out of range", self.start + at, len))
    }

    fn error(&self, message: &str) -> ParseError {
        self.error_at(message, self.pos)
    }

    /// Error spanning from `at` to the end of the definition.
    fn error_at(&self, message: &str, at: usize) -> ParseError {
        let length = (self.text.len() - at).max(1);
        ParseError::new(message, self.start + at, length)
    }
}
