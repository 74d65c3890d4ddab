//! Top-level clause splitting for candidate SQL.
//!
//! Not a SQL parser: the text is cut at clause keywords that sit outside
//! parentheses and quotes. That is enough to spot repeated or missing
//! `SELECT`/`FROM`/`WHERE` clauses in generator output and to re-serialize the
//! statement in canonical clause order.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref KEYWORD: Regex = Regex::new(
        r"(?i)\b(SELECT|FROM|WHERE|GROUP\s+BY|HAVING|ORDER\s+BY|LIMIT|UNION|INTERSECT|EXCEPT)\b"
    )
    .unwrap();
    static ref SET_OPERATION: Regex =
        Regex::new(r"(?i)\b(?:UNION(?:\s+(?:ALL|DISTINCT))?|INTERSECT|EXCEPT)\b").unwrap();
    static ref WITH_PREFIX: Regex = Regex::new(r"(?i)^WITH\b").unwrap();
    static ref COLUMN_LIST: Regex = Regex::new(r"^[\w.*]+(?:\s*,\s*[\w.*]+)*$").unwrap();
}

/// Clause kinds in the order they are serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClauseKind {
    Select,
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
}

impl ClauseKind {
    fn from_keyword(keyword: &str) -> Option<Self> {
        let normalized = keyword
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();
        match normalized.as_str() {
            "SELECT" => Some(ClauseKind::Select),
            "FROM" => Some(ClauseKind::From),
            "WHERE" => Some(ClauseKind::Where),
            "GROUP BY" => Some(ClauseKind::GroupBy),
            "HAVING" => Some(ClauseKind::Having),
            "ORDER BY" => Some(ClauseKind::OrderBy),
            "LIMIT" => Some(ClauseKind::Limit),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            ClauseKind::Select => "SELECT",
            ClauseKind::From => "FROM",
            ClauseKind::Where => "WHERE",
            ClauseKind::GroupBy => "GROUP BY",
            ClauseKind::Having => "HAVING",
            ClauseKind::OrderBy => "ORDER BY",
            ClauseKind::Limit => "LIMIT",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clauses {
    /// Text before the first clause keyword.
    pub preamble: String,
    pub segments: Vec<(ClauseKind, String)>,
    /// A top-level set operation (UNION, INTERSECT, EXCEPT) was seen.
    compound: bool,
}

impl Clauses {
    pub fn parse(sql: &str) -> Self {
        let mask = top_level_mask(sql);
        let mut clauses = Clauses::default();
        let mut current: Option<ClauseKind> = None;
        let mut cursor = 0;

        for m in KEYWORD.find_iter(sql) {
            if !mask[m.start()] {
                continue;
            }
            let Some(kind) = ClauseKind::from_keyword(m.as_str()) else {
                clauses.compound = true;
                continue;
            };
            let text = sql[cursor..m.start()].trim().to_string();
            match current {
                None => clauses.preamble = text,
                Some(prev) => clauses.segments.push((prev, text)),
            }
            current = Some(kind);
            cursor = m.end();
        }

        let tail = sql[cursor..].trim().to_string();
        match current {
            None => clauses.preamble = tail,
            Some(prev) => clauses.segments.push((prev, tail)),
        }

        clauses
    }

    /// Single query block without CTEs or set operations. Clause-level
    /// rewrites only touch plain statements.
    pub fn is_plain(&self) -> bool {
        !self.compound && !self.has_cte()
    }

    pub fn has_cte(&self) -> bool {
        WITH_PREFIX.is_match(&self.preamble)
    }

    pub fn has(&self, kind: ClauseKind) -> bool {
        self.segments.iter().any(|(k, _)| *k == kind)
    }

    pub fn body_mut(&mut self, kind: ClauseKind) -> Option<&mut String> {
        self.segments
            .iter_mut()
            .find(|(k, _)| *k == kind)
            .map(|(_, body)| body)
    }

    /// Insert a clause before the first clause that serializes after it.
    pub fn insert(&mut self, kind: ClauseKind, body: impl Into<String>) {
        let pos = self
            .segments
            .iter()
            .position(|(k, _)| *k > kind)
            .unwrap_or(self.segments.len());
        self.segments.insert(pos, (kind, body.into()));
    }

    /// Keep one clause per kind (the first non-empty one), in canonical
    /// order. Text in front of a `SELECT` is dropped.
    pub fn dedupe(self) -> Self {
        let mut kept: Vec<(ClauseKind, String)> = Vec::new();
        for (kind, body) in self.segments {
            match kept.iter_mut().find(|(k, _)| *k == kind) {
                Some(existing) => {
                    if existing.1.is_empty() && !body.is_empty() {
                        existing.1 = body;
                    }
                }
                None => kept.push((kind, body)),
            }
        }
        kept.sort_by_key(|(kind, _)| *kind);

        let preamble = if kept.iter().any(|(k, _)| *k == ClauseKind::Select) {
            String::new()
        } else {
            self.preamble
        };

        Clauses {
            preamble,
            segments: kept,
            compound: self.compound,
        }
    }

    pub fn render(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !self.preamble.is_empty() {
            parts.push(self.preamble.clone());
        }
        for (kind, body) in &self.segments {
            if body.is_empty() {
                parts.push(kind.keyword().to_string());
            } else {
                parts.push(format!("{} {}", kind.keyword(), body));
            }
        }
        parts.join(" ")
    }
}

/// Split at top-level `UNION` / `INTERSECT` / `EXCEPT`. Returns the query
/// blocks and, between them, the operators as written.
pub fn split_set_operations(sql: &str) -> (Vec<&str>, Vec<&str>) {
    let mask = top_level_mask(sql);
    let mut blocks = Vec::new();
    let mut operators = Vec::new();
    let mut cursor = 0;

    for m in SET_OPERATION.find_iter(sql) {
        if !mask[m.start()] {
            continue;
        }
        blocks.push(sql[cursor..m.start()].trim());
        operators.push(m.as_str());
        cursor = m.end();
    }
    blocks.push(sql[cursor..].trim());

    (blocks, operators)
}

/// Whether `text` is a bare comma-separated list of column references.
pub fn is_column_list(text: &str) -> bool {
    COLUMN_LIST.is_match(text.trim())
}

/// `mask[i]` is true when byte offset `i` is outside parentheses and
/// single-quoted strings.
fn top_level_mask(sql: &str) -> Vec<bool> {
    let mut mask = vec![false; sql.len() + 1];
    let mut depth = 0usize;
    let mut in_quote = false;

    for (i, c) in sql.char_indices() {
        mask[i] = depth == 0 && !in_quote;
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    mask[sql.len()] = depth == 0 && !in_quote;
    mask
}
