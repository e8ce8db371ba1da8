//! Static checks on transformation definitions
//!
//! Run before any connection is opened. A definition that fails here is a
//! configuration error, not a per-entity failure.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use super::TransformationDefinition;
use crate::error::{EtlError, EtlResult};

// Warehouse table and column names
static RE_ENTITY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,1023}$").expect("Invalid regex"));

/// Check that a name is usable as a warehouse table name
pub fn validate_entity_name(name: &str) -> EtlResult<()> {
    if RE_ENTITY_NAME.is_match(name) {
        Ok(())
    } else {
        Err(EtlError::Config(format!(
            "'{}' is not a valid warehouse table name",
            name
        )))
    }
}

fn is_read_only(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => is_read_only(&query.body),
        SetExpr::SetOperation { left, right, .. } => is_read_only(left) && is_read_only(right),
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        _ => false,
    }
}

/// Check that a rendered query is exactly one read-only `SELECT`
pub fn validate_query(sql: &str) -> EtlResult<()> {
    let dialect = GenericDialect {};
    let statements = Parser::parse_sql(&dialect, sql)
        .map_err(|e| EtlError::Config(format!("query does not parse: {}", e)))?;

    match statements.as_slice() {
        [Statement::Query(query)] if is_read_only(&query.body) => Ok(()),
        [Statement::Query(_)] => Err(EtlError::Config(
            "query writes data; only plain SELECT is allowed".to_string(),
        )),
        [_] => Err(EtlError::Config(
            "statement is not a SELECT query".to_string(),
        )),
        other => Err(EtlError::Config(format!(
            "expected exactly one statement, found {}",
            other.len()
        ))),
    }
}

/// Check a definition as a whole
pub fn validate_definition(def: &TransformationDefinition) -> EtlResult<()> {
    validate_entity_name(def.name())?;

    validate_query(&def.render_query(None)).map_err(|e| match e {
        EtlError::Config(message) => EtlError::Config(format!("{}: {}", def.name(), message)),
        other => other,
    })?;

    if def.output_columns().is_empty() {
        return Err(EtlError::Config(format!(
            "{}: no output columns declared",
            def.name()
        )));
    }

    let mut seen = HashSet::new();
    for column in def.output_columns() {
        validate_entity_name(&column.name)?;
        if !seen.insert(column.name.to_lowercase()) {
            return Err(EtlError::Config(format!(
                "{}: duplicate output column '{}'",
                def.name(),
                column.name
            )));
        }
    }

    for reference in def.dimension_refs() {
        if !seen.contains(&reference.column.to_lowercase()) {
            return Err(EtlError::Config(format!(
                "{}: reference column '{}' is not an output column",
                def.name(),
                reference.column
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutputColumn;

    #[test]
    fn test_validate_entity_name() {
        assert!(validate_entity_name("DimTiempo").is_ok());
        assert!(validate_entity_name("hecho_2024").is_ok());
        assert!(validate_entity_name("").is_err());
        assert!(validate_entity_name("1Dim").is_err());
        assert!(validate_entity_name("Dim Tiempo").is_err());
        assert!(validate_entity_name("x;DROP").is_err());
    }

    #[test]
    fn test_validate_query_accepts_selects() {
        assert!(validate_query("SELECT a FROM t").is_ok());
        assert!(validate_query("SELECT a FROM t UNION ALL SELECT b FROM u").is_ok());
        assert!(
            validate_query("SELECT t.a, u.b FROM t LEFT JOIN u ON t.id = u.id WHERE u.c = 'x'")
                .is_ok()
        );
    }

    #[test]
    fn test_validate_query_rejects_writes_and_batches() {
        assert!(validate_query("DELETE FROM t").is_err());
        assert!(validate_query("INSERT INTO t VALUES (1)").is_err());
        assert!(validate_query("SELECT 1; SELECT 2").is_err());
        assert!(validate_query("SELEC a FROM t").is_err());
    }

    #[test]
    fn test_validate_definition_duplicate_columns() {
        let def = TransformationDefinition::dimension("DimX", "SELECT id FROM x").columns(vec![
            OutputColumn::int("Key"),
            OutputColumn::int("key"),
        ]);
        let err = validate_definition(&def).unwrap_err();
        assert!(err.to_string().contains("duplicate output column"));
    }

    #[test]
    fn test_validate_definition_bad_reference() {
        let def = TransformationDefinition::fact("HechoX", "SELECT id FROM x")
            .columns(vec![OutputColumn::int("Key")])
            .references("TurnoKey", "DimTurno");
        assert!(validate_definition(&def).is_err());
    }
}
