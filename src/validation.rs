//! Identifier validation
//!
//! Table, column and queue names cannot be bound as query parameters, so every name
//! that ends up interpolated into SQL goes through these checks first.

use crate::error::{DispatchError, DispatchResult};

/// PostgreSQL truncates identifiers beyond this length
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validates a single unquoted SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`
pub fn validate_identifier(name: &str, component: &str) -> DispatchResult<()> {
    if name.is_empty() {
        return Err(DispatchError::configuration(component, "identifier must not be empty"));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(DispatchError::configuration(
            component,
            format!(
                "identifier too long: {} chars (max: {MAX_IDENTIFIER_LENGTH})",
                name.len()
            ),
        ));
    }

    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !starts_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DispatchError::configuration(
            component,
            format!("invalid identifier {name:?}"),
        ));
    }

    Ok(())
}

/// Validates a table name, optionally schema-qualified (`schema.table`)
pub fn validate_table_name(name: &str) -> DispatchResult<()> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        return Err(DispatchError::configuration(
            "table",
            format!("invalid table name {name:?}"),
        ));
    }

    for part in parts {
        validate_identifier(part, "table")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(validate_identifier("customer", "table").is_ok());
        assert!(validate_identifier("_id2", "column").is_ok());
        assert!(validate_table_name("public.customer").is_ok());
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(validate_identifier("", "column").is_err());
        assert!(validate_identifier("2fast", "column").is_err());
        assert!(validate_identifier("id; DROP TABLE customer", "column").is_err());
        assert!(validate_identifier("na\"me", "column").is_err());
        assert!(validate_identifier(&"a".repeat(64), "column").is_err());
        assert!(validate_table_name("a.b.c").is_err());
        assert!(validate_table_name("public.").is_err());
    }
}
