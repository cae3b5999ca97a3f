//! SQL statement validators.
//!
//! Validators run against raw SQL text before anything reaches a backend.
//! The chain is ordered; the first failure stops execution and is reported
//! with the name of the validator that raised it.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::errors::{AppError, AppResult};

/// Statement kind, derived from the leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Update,
    Delete,
    Insert,
}

impl QueryType {
    /// Detects the query type from the first six characters of the trimmed,
    /// upper-cased statement.
    pub fn detect(sql: &str) -> AppResult<Self> {
        let upper = sql.trim().to_uppercase();
        let head: String = upper.chars().take(6).collect();
        match head.as_str() {
            "SELECT" => Ok(QueryType::Select),
            "UPDATE" => Ok(QueryType::Update),
            "DELETE" => Ok(QueryType::Delete),
            "INSERT" => Ok(QueryType::Insert),
            _ => Err(AppError::UnsupportedQueryType(head)),
        }
    }

    /// Verb used in error messages.
    pub fn verb(&self) -> &'static str {
        match self {
            QueryType::Select => "query",
            QueryType::Update => "update",
            QueryType::Delete => "delete",
            QueryType::Insert => "insert",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryType::Select => write!(f, "SELECT"),
            QueryType::Update => write!(f, "UPDATE"),
            QueryType::Delete => write!(f, "DELETE"),
            QueryType::Insert => write!(f, "INSERT"),
        }
    }
}

/// A pre-execution policy check.
pub trait SqlValidator: Send + Sync {
    /// Name used for diagnostics and removal.
    fn name(&self) -> &str;

    /// Returns a human readable reason when the statement is rejected.
    fn validate(&self, query: &str, query_type: QueryType) -> Result<(), String>;
}

/// Requires a `LIMIT` clause on every SELECT.
pub struct RequireLimit;

impl SqlValidator for RequireLimit {
    fn name(&self) -> &str {
        "require_limit"
    }

    fn validate(&self, query: &str, query_type: QueryType) -> Result<(), String> {
        if query_type == QueryType::Select && !contains_word(query, "LIMIT") {
            return Err("SELECT statements must include a LIMIT clause".to_string());
        }
        Ok(())
    }
}

/// Rejects `DROP TABLE`.
pub struct ForbidDropTable;

impl SqlValidator for ForbidDropTable {
    fn name(&self) -> &str {
        "forbid_drop_table"
    }

    fn validate(&self, query: &str, _query_type: QueryType) -> Result<(), String> {
        if normalize(query).contains("DROP TABLE") {
            return Err("DROP TABLE is not allowed".to_string());
        }
        Ok(())
    }
}

/// Rejects `TRUNCATE`.
pub struct ForbidTruncate;

impl SqlValidator for ForbidTruncate {
    fn name(&self) -> &str {
        "forbid_truncate"
    }

    fn validate(&self, query: &str, _query_type: QueryType) -> Result<(), String> {
        if contains_word(query, "TRUNCATE") {
            return Err("TRUNCATE is not allowed".to_string());
        }
        Ok(())
    }
}

/// Upper-cases and collapses whitespace so `DROP\n  TABLE` still matches.
fn normalize(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

fn contains_word(query: &str, word: &str) -> bool {
    normalize(query)
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .any(|token| token == word)
}

/// Ordered list of validators.
#[derive(Default)]
pub struct ValidatorChain {
    validators: RwLock<Vec<Arc<dyn SqlValidator>>>,
}

impl ValidatorChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a chain with every built-in validator.
    pub fn with_defaults() -> Self {
        let chain = Self::new();
        chain.add(Arc::new(RequireLimit));
        chain.add(Arc::new(ForbidDropTable));
        chain.add(Arc::new(ForbidTruncate));
        chain
    }

    /// Creates a chain from built-in validator names, skipping unknown ones.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let chain = Self::new();
        for name in names {
            match builtin(name.as_ref()) {
                Some(v) => chain.add(v),
                None => tracing::warn!(validator = %name.as_ref(), "Unknown SQL validator ignored"),
            }
        }
        chain
    }

    /// Appends a validator.
    pub fn add(&self, validator: Arc<dyn SqlValidator>) {
        self.validators.write().push(validator);
    }

    /// Removes every validator with the given name. Returns whether any was removed.
    pub fn remove(&self, name: &str) -> bool {
        let mut validators = self.validators.write();
        let before = validators.len();
        validators.retain(|v| v.name() != name);
        validators.len() != before
    }

    /// Names of the registered validators, in order.
    pub fn names(&self) -> Vec<String> {
        self.validators
            .read()
            .iter()
            .map(|v| v.name().to_string())
            .collect()
    }

    /// Detects the query type and runs every validator in order.
    pub fn check(&self, query: &str) -> AppResult<QueryType> {
        let query_type = QueryType::detect(query)?;
        for validator in self.validators.read().iter() {
            if let Err(message) = validator.validate(query, query_type) {
                return Err(AppError::ValidationFailed {
                    validator: validator.name().to_string(),
                    message,
                });
            }
        }
        Ok(query_type)
    }
}

fn builtin(name: &str) -> Option<Arc<dyn SqlValidator>> {
    match name {
        "require_limit" => Some(Arc::new(RequireLimit)),
        "forbid_drop_table" => Some(Arc::new(ForbidDropTable)),
        "forbid_truncate" => Some(Arc::new(ForbidTruncate)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_query_type() {
        assert_eq!(QueryType::detect("  select 1").unwrap(), QueryType::Select);
        assert_eq!(QueryType::detect("UPDATE t SET a=1").unwrap(), QueryType::Update);
        assert_eq!(QueryType::detect("insert into t values (1)").unwrap(), QueryType::Insert);
        assert!(matches!(
            QueryType::detect("DROP TABLE t"),
            Err(AppError::UnsupportedQueryType(_))
        ));
        assert!(QueryType::detect("").is_err());
    }

    #[test]
    fn test_require_limit_can_be_removed() {
        let chain = ValidatorChain::new();
        chain.add(Arc::new(RequireLimit));
        let err = chain.check("SELECT * FROM t").unwrap_err();
        match err {
            AppError::ValidationFailed { validator, .. } => assert_eq!(validator, "require_limit"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(chain.check("SELECT * FROM t LIMIT 10").is_ok());

        assert!(chain.remove("require_limit"));
        assert!(chain.check("SELECT * FROM t").is_ok());
        assert!(chain.check("SELECT * FROM t LIMIT 10").is_ok());
    }

    #[test]
    fn test_limit_must_be_a_keyword() {
        assert!(RequireLimit
            .validate("SELECT speed_limit FROM cars", QueryType::Select)
            .is_err());
        assert!(RequireLimit
            .validate("UPDATE t SET a = 1", QueryType::Update)
            .is_ok());
    }

    #[test]
    fn test_unsupported_type_rejected_before_validators() {
        let chain = ValidatorChain::with_defaults();
        assert!(matches!(
            chain.check("TRUNCATE TABLE users"),
            Err(AppError::UnsupportedQueryType(_))
        ));
    }

    #[test]
    fn test_forbidden_statements_inside_allowed_types() {
        let chain = ValidatorChain::with_defaults();
        let err = chain
            .check("DELETE FROM t WHERE id IN (1); DROP   TABLE t")
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed { ref validator, .. } if validator == "forbid_drop_table"));

        let err = chain.check("UPDATE t SET a = 1; TRUNCATE t").unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed { ref validator, .. } if validator == "forbid_truncate"));
    }

    #[test]
    fn test_first_failure_wins() {
        let chain = ValidatorChain::with_defaults();
        let err = chain.check("SELECT * FROM t; DROP TABLE t").unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed { ref validator, .. } if validator == "require_limit"));
    }

    #[test]
    fn test_from_names() {
        let chain = ValidatorChain::from_names(&["forbid_truncate", "nope"]);
        assert_eq!(chain.names(), vec!["forbid_truncate".to_string()]);
    }
}
