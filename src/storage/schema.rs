//! Database schema constants.
//!
//! Quiz items are stored as JSON text; nothing in the pipeline queries into
//! them. `(parent_id, sequence_number)` is the idempotency key and carries the
//! only uniqueness constraint that matters.

/// SQL schema for creating the content_records table.
pub const CREATE_CONTENT_RECORDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS content_records (
    id TEXT PRIMARY KEY,
    parent_id TEXT NOT NULL,
    sequence_number INTEGER NOT NULL CHECK (sequence_number > 0),
    passage_a TEXT NOT NULL,
    passage_b TEXT NOT NULL,
    multiple_choice TEXT NOT NULL,
    true_false TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(parent_id, sequence_number)
)
"#;

/// Index for listing a parent's records in order.
pub const CREATE_CONTENT_RECORDS_PARENT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_content_records_parent
    ON content_records(parent_id, sequence_number)
"#;

/// Returns all schema statements in the order they must be applied.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_CONTENT_RECORDS_TABLE,
        CREATE_CONTENT_RECORDS_PARENT_INDEX,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_are_idempotent() {
        for statement in all_schema_statements() {
            assert!(statement.contains("IF NOT EXISTS"));
        }
    }

    #[test]
    fn test_idempotency_key_is_unique() {
        assert!(CREATE_CONTENT_RECORDS_TABLE.contains("UNIQUE(parent_id, sequence_number)"));
    }
}
