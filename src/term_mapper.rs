//! Term Mapper - resolves natural-language words onto schema identifiers.

use crate::schema::Schema;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\b\w+\b").unwrap();
}

/// Resolve a single word against the schema (case-insensitive, exact).
///
/// Returns the table name for a table match, `table.column` for a column
/// match, or the word unchanged. Tables are scanned in insertion order and a
/// table's own name is checked before its columns.
pub fn map_term(term: &str, schema: &Schema) -> String {
    let lower = term.to_lowercase();
    for (table, columns) in schema.tables() {
        if lower == table {
            return table.to_string();
        }
        if let Some(col) = columns.iter().find(|c| **c == lower) {
            return format!("{}.{}", table, col);
        }
    }
    term.to_string()
}

/// Every distinct word of a question whose resolution differs from the word
/// itself, in order of first appearance.
#[derive(Debug, Clone, Default)]
pub struct TermMapping {
    entries: Vec<(String, String)>,
}

impl TermMapping {
    pub fn build(question: &str, schema: &Schema) -> Self {
        if schema.is_empty() {
            return Self::default();
        }

        let entries = WORD
            .find_iter(question)
            .map(|m| m.as_str())
            .unique()
            .filter_map(|word| {
                let mapped = map_term(word, schema);
                (mapped != word).then(|| (word.to_string(), mapped))
            })
            .collect();

        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(t, m)| (t.as_str(), m.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_schema;

    #[test]
    fn test_map_table_and_column() {
        let schema = parse_schema("Orders(id, total)");
        assert_eq!(map_term("orders", &schema), "orders");
        assert_eq!(map_term("Orders", &schema), "orders");
        assert_eq!(map_term("total", &schema), "orders.total");
        assert_eq!(map_term("TOTAL", &schema), "orders.total");
    }

    #[test]
    fn test_unmatched_term_is_unchanged() {
        let schema = parse_schema("Orders(id, total)");
        assert_eq!(map_term("Customers", &schema), "Customers");
        assert_eq!(map_term("tot", &schema), "tot");
        assert_eq!(map_term("anything", &Schema::new()), "anything");
    }

    #[test]
    fn test_first_table_wins_for_shared_column() {
        let schema = parse_schema("Orders(id, total), Items(id, sku)");
        assert_eq!(map_term("id", &schema), "orders.id");
        assert_eq!(map_term("sku", &schema), "items.sku");
    }

    #[test]
    fn test_mapping_lists_changed_words_once() {
        let schema = parse_schema("Orders(id, total)");
        let mapping = TermMapping::build("total of orders and total of Orders", &schema);
        let entries: Vec<(&str, &str)> = mapping.iter().collect();
        assert_eq!(entries, vec![("total", "orders.total"), ("Orders", "orders")]);
    }
}
