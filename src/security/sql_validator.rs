//! SQL Validator
//!
//! Parses candidate SQL into an AST and allow-lists read-only statements.
//! Anything that is not a single SELECT (DROP, DELETE, INSERT, UPDATE,
//! ALTER, SELECT INTO, ...) comes back marked unsafe.

use crate::error::AnalystError;
use crate::sql_query::SqlQuery;
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::{Parser, ParserError};
use tracing::{debug, warn};

pub const READ_ONLY_POLICY: &str = "only SELECT (read-only) queries are allowed";
pub const SINGLE_STATEMENT_POLICY: &str = "only a single SELECT statement is allowed";

/// AST-based read-only gate
pub struct SqlValidator;

impl SqlValidator {
    /// Validate a candidate query, returning a new instance marked safe or unsafe.
    ///
    /// Never fails: parser errors become syntax verdicts, anything unexpected
    /// becomes an unknown-validation verdict.
    pub fn validate(query: &SqlQuery) -> SqlQuery {
        let sql_text = query.raw_text().trim().trim_end_matches(';').trim_end();

        let dialect = DuckDbDialect {};
        let statements = match Parser::parse_sql(&dialect, sql_text) {
            Ok(statements) => statements,
            Err(ParserError::RecursionLimitExceeded) => {
                warn!("SQL validation hit the parser recursion limit");
                return query.mark_as_unsafe(format!(
                    "Unknown validation error: {}",
                    ParserError::RecursionLimitExceeded
                ));
            }
            Err(e) => {
                debug!("SQL parse failed: {}", e);
                return query.mark_as_unsafe(AnalystError::Syntax(e.to_string()).to_string());
            }
        };

        let statement = match statements.as_slice() {
            [] => {
                return query.mark_as_unsafe(
                    AnalystError::Syntax("no SQL statement found".to_string()).to_string(),
                )
            }
            [statement] => statement,
            _ => {
                return query.mark_as_unsafe(
                    AnalystError::SecurityPolicy(SINGLE_STATEMENT_POLICY.to_string()).to_string(),
                )
            }
        };

        match statement {
            Statement::Query(q) if is_read_only_query(q) => query.mark_as_safe(),
            _ => {
                warn!("Rejected non read-only statement");
                query.mark_as_unsafe(
                    AnalystError::SecurityPolicy(READ_ONLY_POLICY.to_string()).to_string(),
                )
            }
        }
    }
}

fn is_read_only_query(query: &Query) -> bool {
    let ctes_read_only = query.with.as_ref().map_or(true, |with| {
        with.cte_tables
            .iter()
            .all(|cte| is_read_only_query(&cte.query))
    });
    ctes_read_only && is_read_only_set_expr(&query.body)
}

fn is_read_only_set_expr(expr: &SetExpr) -> bool {
    match expr {
        // SELECT ... INTO creates a table
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(inner) => is_read_only_query(inner),
        SetExpr::SetOperation { left, right, .. } => {
            is_read_only_set_expr(left) && is_read_only_set_expr(right)
        }
        _ => false,
    }
}
