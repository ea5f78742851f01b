//! The placeholder mini-language embedded in SQL templates.
//!
//! A placeholder is a brace group holding one or two definitions:
//!
//! ```text
//! definition := [type] '%' ( index | '%' ['*'] ) ('.' field | '.$' ordinal)*
//!               ['@' group ['[' position ']']] ['#' separator '#']
//! ```
//!
//! `%N` reads method parameter `N` (1-based), `%%` writes a result column
//! (`%%*` marks the map key). Parameter placeholders become `?` in the
//! rewritten SQL; result placeholders annotate the select list and are
//! removed, except in call statements where every placeholder is a `?`.
//!
//! ```
//! use sqlx_query_mapper::template::parse;
//!
//! let template = parse("SELECT id {%%.id}, name {%%.name} FROM users WHERE id = {%1}", false)?;
//! assert_eq!(template.sql, "SELECT id , name  FROM users WHERE id = ?");
//! assert_eq!(template.parameters[0].sql_indexes, vec![1]);
//! assert_eq!(template.results[1].columns, vec![2]);
//! # Ok::<(), sqlx_query_mapper::error::ParseError>(())
//! ```

mod combine;
mod parser;
pub(crate) mod scanner;

pub use combine::{combine, GroupConflict, Partial};
pub use parser::Parser;

use crate::error::ParseError;

/// Marks a definition as one column of a multi-column mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartialSlot {
    pub group: usize,
    pub position: Option<usize>,
}

/// A method parameter flowing into SQL parameter slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDefinition {
    pub type_name: String,
    /// 1-based method parameter index.
    pub parameter: usize,
    /// 1-based `?` positions in the rewritten SQL.
    pub sql_indexes: Vec<usize>,
    /// Getter chain applied to the parameter value.
    pub fields: Vec<String>,
    pub separator: Option<String>,
    pub partial: Option<PartialSlot>,
}

/// A result column flowing back into the return value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultDefinition {
    pub type_name: String,
    /// 1-based result columns, or output parameter slots in call statements.
    pub columns: Vec<usize>,
    pub field: Option<String>,
    pub constructor_parameter: Option<usize>,
    pub map_key: bool,
    pub partial: Option<PartialSlot>,
}

/// A parsed SQL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Driver-ready SQL with placeholders rewritten.
    pub sql: String,
    pub parameters: Vec<ParameterDefinition>,
    pub results: Vec<ResultDefinition>,
}

impl Template {
    /// Merges partial definitions sharing a type and group index.
    pub fn combined(self) -> Result<Template, GroupConflict> {
        Ok(Template {
            sql: self.sql,
            parameters: combine(self.parameters)?,
            results: combine(self.results)?,
        })
    }
}

/// Parses `sql`, treating it as a call statement when `call` is set.
pub fn parse(sql: &str, call: bool) -> Result<Template, ParseError> {
    Parser::new(sql).call_statement(call).parse()
}
