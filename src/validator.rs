//! Safety Validator
//!
//! The only security boundary of the pipeline: the final normalized text must
//! be exactly one `SELECT` query with no data-changing keywords, statement
//! separators or comments. Runs on the final string, never on raw or
//! intermediate candidates.

use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use thiserror::Error;
use tracing::warn;

/// Keywords that may not appear anywhere in an accepted query.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE",
];

const INJECTION_MARKERS: &[&str] = &[";", "--", "/*"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty query generated")]
    Empty,

    #[error("only SELECT queries are supported")]
    NotSelect,

    #[error("only a single SELECT statement is supported")]
    MultipleStatements,

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("potential SQL injection detected")]
    Injection,

    #[error("SQL validation error: {0}")]
    Malformed(String),
}

/// Accept `sql` only if it is a single, read-only `SELECT`.
///
/// Tokens are screened before the statement is classified, so a forbidden
/// keyword is reported by name even when the surrounding text does not parse.
pub fn validate_select(sql: &str) -> Result<(), ValidationError> {
    let result = check(sql);
    if let Err(ref err) = result {
        warn!("Rejected generated SQL ({}): {}", err, sql);
    }
    result
}

fn check(sql: &str) -> Result<(), ValidationError> {
    if sql.trim().is_empty() {
        return Err(ValidationError::Empty);
    }

    let dialect = GenericDialect {};
    let mut tokenizer = Tokenizer::new(&dialect, sql);
    let tokens = match tokenizer.tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            if INJECTION_MARKERS.iter().any(|m| sql.contains(m)) {
                return Err(ValidationError::Injection);
            }
            return Err(ValidationError::Malformed(e.to_string()));
        }
    };
    screen_tokens(&tokens)?;

    let statements =
        Parser::parse_sql(&dialect, sql).map_err(|e| ValidationError::Malformed(e.to_string()))?;

    match statements.as_slice() {
        [] => Err(ValidationError::Empty),
        [Statement::Query(query)] if is_read_only_query(query) => Ok(()),
        [_] => Err(ValidationError::NotSelect),
        _ => Err(ValidationError::MultipleStatements),
    }
}

/// Every leaf of the query (CTEs included) is a plain `SELECT` without `INTO`.
/// `VALUES` lists and `SELECT ... INTO` do not qualify.
fn is_read_only_query(query: &Query) -> bool {
    let ctes_read_only = query.with.as_ref().map_or(true, |with| {
        with.cte_tables
            .iter()
            .all(|cte| is_read_only_query(&cte.query))
    });
    ctes_read_only && is_read_only_body(&query.body)
}

fn is_read_only_body(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => is_read_only_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            is_read_only_body(left) && is_read_only_body(right)
        }
        _ => false,
    }
}

fn screen_tokens(tokens: &[Token]) -> Result<(), ValidationError> {
    for token in tokens {
        match token {
            Token::Word(word) => {
                let upper = word.value.to_uppercase();
                if FORBIDDEN_KEYWORDS.contains(&upper.as_str()) {
                    return Err(ValidationError::UnsupportedOperation(upper));
                }
            }
            Token::SemiColon
            | Token::Whitespace(Whitespace::SingleLineComment { .. })
            | Token::Whitespace(Whitespace::MultiLineComment(_)) => {
                return Err(ValidationError::Injection);
            }
            _ => {}
        }
    }
    Ok(())
}
