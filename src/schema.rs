//! Schema Parser
//!
//! Parses the optional `Table(col, col), Other(col)` schema description that
//! callers may prepend to a question, and splits the combined
//! `Schema: ... Question: ...` input format.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    static ref TABLE_DEF: Regex = Regex::new(r"(\w+)\s*\(([^)]+)\)").unwrap();
}

const SCHEMA_MARKER: &str = "Schema:";
const QUESTION_MARKER: &str = "Question:";

/// Table name -> ordered column names, all lowercase.
///
/// Insertion order is preserved so that term resolution is deterministic:
/// the first table that owns a column wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    tables: Vec<(String, Vec<String>)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table. A table that is already present keeps its position but
    /// its columns are replaced (last definition wins).
    pub fn insert(&mut self, table: impl Into<String>, columns: Vec<String>) {
        let table = table.into();
        if let Some(entry) = self.tables.iter_mut().find(|(name, _)| *name == table) {
            entry.1 = columns;
        } else {
            self.tables.push((table, columns));
        }
    }

    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, cols)| cols.as_slice())
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.tables
            .iter()
            .map(|(name, cols)| (name.as_str(), cols.as_slice()))
    }

    pub fn first_table(&self) -> Option<(&str, &[String])> {
        self.tables().next()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Render back into the description format, e.g. `orders(id, total)`.
    pub fn describe(&self) -> String {
        self.tables
            .iter()
            .map(|(name, cols)| format!("{}({})", name, cols.join(", ")))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Parse a schema description. Never fails: fragments without a matching
/// parenthesised column list are skipped, and empty column names dropped.
pub fn parse_schema(text: &str) -> Schema {
    let mut schema = Schema::new();

    for caps in TABLE_DEF.captures_iter(text) {
        let table = caps[1].to_lowercase();
        let columns: Vec<String> = caps[2]
            .split(',')
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();

        if columns.is_empty() {
            debug!("Skipping schema fragment without columns: {}", &caps[0]);
            continue;
        }
        schema.insert(table, columns);
    }

    schema
}

/// Split `Schema: <description> Question: <question>` into its parts.
///
/// Both markers must be present verbatim (case-sensitive); otherwise the whole
/// input is the question and the schema is empty.
pub fn split_schema_question(input: &str) -> (Schema, String) {
    if !(input.contains(SCHEMA_MARKER) && input.contains(QUESTION_MARKER)) {
        return (Schema::new(), input.trim().to_string());
    }

    match input.split_once(QUESTION_MARKER) {
        Some((schema_part, question)) => {
            let schema_text = schema_part.replace(SCHEMA_MARKER, "");
            let schema = parse_schema(schema_text.trim());
            debug!("Extracted schema with {} table(s)", schema.len());
            (schema, question.trim().to_string())
        }
        None => (Schema::new(), input.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_table() {
        let schema = parse_schema("Orders(id, total)");
        assert_eq!(schema.len(), 1);
        assert_eq!(
            schema.columns("orders"),
            Some(&["id".to_string(), "total".to_string()][..])
        );
    }

    #[test]
    fn test_parse_multiple_tables_keeps_order() {
        let schema = parse_schema("Employee(EmpID, Salary), Dept ( DeptID ,Name )");
        let names: Vec<&str> = schema.tables().map(|(t, _)| t).collect();
        assert_eq!(names, vec!["employee", "dept"]);
        assert_eq!(
            schema.columns("dept"),
            Some(&["deptid".to_string(), "name".to_string()][..])
        );
    }

    #[test]
    fn test_duplicate_table_last_wins() {
        let schema = parse_schema("t(a, b), u(c), t(x)");
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.columns("t"), Some(&["x".to_string()][..]));
        assert_eq!(schema.first_table().map(|(t, _)| t), Some("t"));
    }

    #[test]
    fn test_malformed_fragments_are_skipped() {
        assert!(parse_schema("").is_empty());
        assert!(parse_schema("Orders(id, total").is_empty());
        let schema = parse_schema("broken( , ), Items(sku)");
        assert_eq!(schema.len(), 1);
        assert!(schema.columns("items").is_some());
    }

    #[test]
    fn test_split_combined_input() {
        let (schema, question) =
            split_schema_question("Schema: Orders(id, total) Question: list all orders");
        assert_eq!(question, "list all orders");
        assert_eq!(schema.describe(), "orders(id, total)");
    }

    #[test]
    fn test_split_requires_both_markers() {
        let (schema, question) = split_schema_question("Schema: Orders(id) list orders");
        assert!(schema.is_empty());
        assert_eq!(question, "Schema: Orders(id) list orders");

        let (schema, _) = split_schema_question("schema: Orders(id) question: list");
        assert!(schema.is_empty());
    }
}
