//! Rewrite rules, one function per rule. Each takes the current candidate
//! text and the per-request context and returns the rewritten text. Rules
//! leave text they do not recognize alone.

use super::clauses::{is_column_list, split_set_operations, ClauseKind, Clauses};
use super::{RuleContext, ID_COLUMN, SALARY_COLUMN};
use lazy_static::lazy_static;
use regex::Regex;

const NUM: &str = r"\d+(?:,\d{3})*(?:\.\d+)?";
const OP: &str = r"(?:<=|>=|<>|!=|=|<|>)";

/// Words never substituted from the schema, even when a column shares the name.
const RESERVED: &[&str] = &[
    "select", "from", "where", "group", "order", "by", "having", "limit", "and", "or", "not",
    "between", "as", "on", "join", "in", "is", "null", "like", "distinct",
];

/// Words that may follow a complete condition.
const CONDITION_BOUNDARY: &[&str] = &[
    "AND", "OR", "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "FROM", "SELECT", "UNION",
    "INTERSECT", "EXCEPT",
];

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"(?i)```(?:sql)?").unwrap();
    static ref STRIPPED: Regex = Regex::new(r#"[`";]"#).unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();

    static ref DOLLAR_WHERE: Regex = Regex::new(r"(?i)\bWHERE\s+\w+\s*\(\s*\$\s*\)").unwrap();
    static ref DOLLAR_COLUMN: Regex = Regex::new(
        r"(?i)\b(?:salar(?:y|ies)|earnings?|pay|compensation|wages?|income)\s*\(\s*\$\s*\)"
    )
    .unwrap();
    static ref SALARY_SYNONYM: Regex =
        Regex::new(r"(?i)\b(?:salar(?:y|ies)|earnings?|pay|compensation|wages?|income)\b").unwrap();
    static ref ID_SYNONYM: Regex = Regex::new(r"(?i)\b(?:emp_?id|employee_?id)\b").unwrap();
    static ref GENERIC_PROJECTION: Regex = Regex::new(
        r"(?i)\bSELECT\s+(?:all\s+)?(?:employees?|emp|staff|table)\s*,?\s*(FROM\b|WHERE\b|$)"
    )
    .unwrap();
    static ref GENERIC_SOURCE: Regex =
        Regex::new(r"(?i)\b(FROM|JOIN)\s+(?:table|employees?|emp|staff)\b").unwrap();

    static ref SALARY_WHERE: Regex = Regex::new(&format!(
        r"(?i)\bWHERE\s+(?:Salary\b|{op})(?:\s*(?:{op}|BETWEEN\b|{num}|Salary\b|AND\s+(?:{num}|Salary\b)))*",
        op = OP,
        num = NUM
    ))
    .unwrap();
    static ref SALARY_COMPARISON: Regex = Regex::new(&format!(
        r"(?i)\bSalary\s*(?:{op}\s*{num}|BETWEEN\s+{num}\s+AND\s+{num})",
        op = OP,
        num = NUM
    ))
    .unwrap();
    static ref HAS_WHERE: Regex = Regex::new(r"(?i)\bWHERE\b").unwrap();

    static ref BETWEEN_GLUED: Regex = Regex::new(&format!(
        r"(?i)(BETWEEN\s+{num}\s+AND\s+{num})[^\s)\d.,][^\s)]*",
        num = NUM
    ))
    .unwrap();
    static ref BETWEEN_REPEATED: Regex = Regex::new(&format!(
        r"(?i)(BETWEEN\s+{num}\s+AND\s+{num})(?:\s+(?:AND\s+)?BETWEEN\s+{num}\s+AND\s+{num})+",
        num = NUM
    ))
    .unwrap();
    static ref BETWEEN_TRAILING: Regex = Regex::new(&format!(
        r"(?i)(BETWEEN\s+{num}\s+AND\s+{num})\s*{op}\s*{num}(?:\s+AND\s+{num})?",
        op = OP,
        num = NUM
    ))
    .unwrap();

    static ref DANGLING_COMMA: Regex = Regex::new(r"(?i),\s*\bFROM\b").unwrap();
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Drop code fences, quotes, backticks and statement separators.
pub fn sanitize(sql: &str, _ctx: &RuleContext<'_>) -> String {
    let text = CODE_FENCE.replace_all(sql, " ");
    let text = STRIPPED.replace_all(&text, "");
    collapse_whitespace(&text)
}

/// Replace question words that name schema elements with their qualified
/// form. Occurrences already part of a dotted reference are left as they are.
pub fn substitute_terms(sql: &str, ctx: &RuleContext<'_>) -> String {
    let mut out = sql.to_string();
    for (term, mapped) in ctx.terms.iter() {
        if RESERVED.contains(&term.to_lowercase().as_str()) {
            continue;
        }
        let Ok(pattern) = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(term))) else {
            continue;
        };
        out = replace_unqualified(&out, &pattern, mapped);
    }
    out
}

fn replace_unqualified(text: &str, pattern: &Regex, replacement: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut last = 0;
    for m in pattern.find_iter(text) {
        let before = text[..m.start()].chars().next_back();
        let after = text[m.end()..].chars().next();
        if before == Some('.') || after == Some('.') {
            continue;
        }
        result.push_str(&text[last..m.start()]);
        result.push_str(replacement);
        last = m.end();
    }
    result.push_str(&text[last..]);
    result
}

/// Canonical column names for the modeled relation: `EmpID`, `Salary`.
pub fn domain_columns(sql: &str, ctx: &RuleContext<'_>) -> String {
    if !ctx.domain {
        return sql.to_string();
    }
    let text = DOLLAR_WHERE.replace_all(sql, format!("WHERE {}", SALARY_COLUMN).as_str());
    let text = DOLLAR_COLUMN.replace_all(&text, SALARY_COLUMN);
    let text = SALARY_SYNONYM.replace_all(&text, SALARY_COLUMN);
    ID_SYNONYM.replace_all(&text, ID_COLUMN).into_owned()
}

/// Canonical table name and projection for the modeled relation.
pub fn domain_relation(sql: &str, ctx: &RuleContext<'_>) -> String {
    if !ctx.domain {
        return sql.to_string();
    }
    let projection = format!("SELECT {} ${{1}}", ctx.target.projection());
    let text = GENERIC_PROJECTION.replace_all(sql, projection.as_str());
    let source = format!("${{1}} {}", ctx.target.table);
    let text = GENERIC_SOURCE.replace_all(&text, source.as_str());
    collapse_whitespace(&text)
}

/// Force the salary condition to the predicate read from the question.
///
/// A `WHERE` fragment built from salary comparisons is replaced as a whole;
/// later fragments are removed. A comparison elsewhere is rewritten in place.
/// Either is only touched when it ends at a condition boundary (`AND`, `OR`,
/// a clause keyword, `)` or the end of the text): `Salary IS NOT NULL` or
/// `Salary IN (..)` are well-formed conditions and stay as they are. An empty
/// `WHERE` is filled and with no `WHERE` at all one is added. A `WHERE` on
/// other columns only is left untouched.
pub fn inject_predicate(sql: &str, ctx: &RuleContext<'_>) -> String {
    if !ctx.domain {
        return sql.to_string();
    }
    let Some(condition) = ctx.predicate.render(SALARY_COLUMN) else {
        return sql.to_string();
    };
    let clause = format!("WHERE {}", condition);

    let fragments: Vec<(usize, usize)> = SALARY_WHERE
        .find_iter(sql)
        .filter(|m| ends_condition(sql, m.end()))
        .map(|m| (m.start(), m.end()))
        .collect();
    if !fragments.is_empty() {
        let mut text = String::with_capacity(sql.len());
        let mut last = 0;
        for (i, (start, end)) in fragments.into_iter().enumerate() {
            text.push_str(&sql[last..start]);
            if i == 0 {
                text.push_str(&clause);
            }
            last = end;
        }
        text.push_str(&sql[last..]);
        return collapse_whitespace(&text);
    }

    let has_where = HAS_WHERE.is_match(sql);
    let comparison = SALARY_COMPARISON
        .find_iter(sql)
        .find(|m| starts_condition(sql, m.start()) && ends_condition(sql, m.end()));
    if let Some(m) = comparison {
        let replacement = if has_where { &condition } else { &clause };
        return format!("{}{}{}", &sql[..m.start()], replacement, &sql[m.end()..]);
    }

    let clauses = Clauses::parse(sql);
    if !clauses.is_plain() {
        if has_where {
            return sql.to_string();
        }
        return format!("{} {}", sql, clause);
    }
    if !has_where {
        let mut clauses = clauses;
        clauses.insert(ClauseKind::Where, condition);
        return clauses.render();
    }

    let mut clauses = clauses.dedupe();
    match clauses.body_mut(ClauseKind::Where) {
        Some(body) if body.is_empty() => {
            *body = condition;
            clauses.render()
        }
        _ => sql.to_string(),
    }
}

fn ends_condition(text: &str, end: usize) -> bool {
    let rest = text[end..].trim_start();
    if rest.is_empty() || rest.starts_with(')') {
        return true;
    }
    let word: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    CONDITION_BOUNDARY.contains(&word.to_uppercase().as_str())
}

fn starts_condition(text: &str, start: usize) -> bool {
    let before = text[..start].trim_end();
    if before.is_empty() || before.ends_with('(') {
        return true;
    }
    let word: String = before
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    matches!(word.to_uppercase().as_str(), "WHERE" | "AND" | "OR")
}

/// Clean up BETWEEN clauses: junk glued to the upper bound, the same range
/// repeated, and a stray comparison left behind after the range.
pub fn repair_between(sql: &str, _ctx: &RuleContext<'_>) -> String {
    let text = BETWEEN_GLUED.replace_all(sql, "${1}");
    let text = BETWEEN_REPEATED.replace_all(&text, "${1}");
    BETWEEN_TRAILING.replace_all(&text, "${1}").into_owned()
}

/// At most one clause of each kind, in canonical order.
pub fn collapse_clauses(sql: &str, _ctx: &RuleContext<'_>) -> String {
    let clauses = Clauses::parse(sql);
    if !clauses.is_plain() {
        return sql.to_string();
    }
    clauses.dedupe().render()
}

/// Supply a missing or empty projection and a missing `FROM`.
///
/// Text that sanitized down to nothing becomes the bare canonical query.
/// Compound statements are completed block by block.
pub fn complete_statement(sql: &str, ctx: &RuleContext<'_>) -> String {
    let target = &ctx.target;

    let mut clauses = Clauses::parse(sql);
    if !clauses.is_plain() {
        let (blocks, operators) = split_set_operations(sql);
        let mut parts = Vec::with_capacity(blocks.len() + operators.len());
        for (i, block) in blocks.into_iter().enumerate() {
            if i > 0 {
                parts.push(operators[i - 1].to_string());
            }
            parts.push(complete_block(block, ctx));
        }
        return parts.join(" ");
    }

    let mut leftover = String::new();
    if !clauses.has(ClauseKind::Select) {
        let preamble = std::mem::take(&mut clauses.preamble);
        let list = trim_list(&preamble);
        let projection = if list.is_empty() || (is_column_list(list) && target.covers(list)) {
            target.projection()
        } else if clauses.has(ClauseKind::From) {
            format!("{} {}", target.projection(), preamble)
        } else {
            leftover = preamble;
            target.projection()
        };
        clauses.insert(ClauseKind::Select, projection);
    }

    if !clauses.has(ClauseKind::From) {
        let source = format!("{} {}", target.table, leftover).trim().to_string();
        clauses.insert(ClauseKind::From, source);
    }

    if let Some(body) = clauses.body_mut(ClauseKind::Select) {
        let list = trim_list(body).to_string();
        let widen = list.is_empty() || (ctx.domain && list.eq_ignore_ascii_case(ID_COLUMN));
        *body = if widen { target.projection() } else { list };
    }

    clauses.render()
}

/// One block of a compound statement (or a statement behind a CTE). Blocks
/// that already have a top-level `SELECT` and `FROM` are returned as written.
fn complete_block(block: &str, ctx: &RuleContext<'_>) -> String {
    let target = &ctx.target;
    let mut clauses = Clauses::parse(block);

    if !clauses.has(ClauseKind::Select) {
        if !(clauses.preamble.is_empty() || clauses.has_cte()) {
            return format!("SELECT {} FROM {} {}", target.projection(), target.table, block);
        }
        clauses.insert(ClauseKind::Select, target.projection());
    } else if clauses.has(ClauseKind::From) {
        return block.to_string();
    }

    if !clauses.has(ClauseKind::From) {
        clauses.insert(ClauseKind::From, target.table.clone());
    }
    if let Some(body) = clauses.body_mut(ClauseKind::Select) {
        if trim_list(body).is_empty() {
            *body = target.projection();
        }
    }
    clauses.render()
}

fn trim_list(text: &str) -> &str {
    text.trim_matches(|c: char| c == ',' || c.is_whitespace())
}

/// Remove a dangling comma before `FROM` and normalize spacing.
pub fn tidy(sql: &str, _ctx: &RuleContext<'_>) -> String {
    let text = DANGLING_COMMA.replace_all(sql, " FROM");
    collapse_whitespace(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Comparison, NumericPredicate};
    use crate::schema::{parse_schema, Schema};

    fn employee_ctx<'a>(schema: &'a Schema, predicate: &'a NumericPredicate) -> RuleContext<'a> {
        RuleContext::new("show employees", schema, predicate)
    }

    #[test]
    fn test_sanitize_strips_quotes_and_separators() {
        let schema = Schema::new();
        let pred = NumericPredicate::None;
        let ctx = employee_ctx(&schema, &pred);
        assert_eq!(
            sanitize("```sql\nSELECT `EmpID` FROM \"employee\";\n```", &ctx),
            "SELECT EmpID FROM employee"
        );
    }

    #[test]
    fn test_substitute_terms_skips_qualified_occurrences() {
        let schema = parse_schema("Orders(id, total)");
        let pred = NumericPredicate::None;
        let ctx = RuleContext::new("total of orders", &schema, &pred);
        let once = substitute_terms("SELECT total FROM orders", &ctx);
        assert_eq!(once, "SELECT orders.total FROM orders");
        assert_eq!(substitute_terms(&once, &ctx), once);
    }

    #[test]
    fn test_substitute_terms_never_touches_keywords() {
        let schema = parse_schema("Items(order, sku)");
        let pred = NumericPredicate::None;
        let ctx = RuleContext::new("items by order", &schema, &pred);
        assert_eq!(
            substitute_terms("SELECT sku FROM items ORDER BY sku", &ctx),
            "SELECT sku FROM items ORDER BY sku"
        );
    }

    #[test]
    fn test_domain_columns() {
        let schema = Schema::new();
        let pred = NumericPredicate::None;
        let ctx = employee_ctx(&schema, &pred);
        assert_eq!(
            domain_columns("SELECT emp_id FROM t WHERE Earnings ($) > 5", &ctx),
            "SELECT EmpID FROM t WHERE Salary > 5"
        );
        assert_eq!(
            domain_columns("SELECT x FROM t WHERE Bonus ($) >= 5", &ctx),
            "SELECT x FROM t WHERE Salary >= 5"
        );
    }

    #[test]
    fn test_domain_relation() {
        let schema = Schema::new();
        let pred = NumericPredicate::None;
        let ctx = employee_ctx(&schema, &pred);
        assert_eq!(
            domain_relation("SELECT Employees FROM table WHERE Salary > 1", &ctx),
            "SELECT EmpID, Salary FROM employee WHERE Salary > 1"
        );
        assert_eq!(
            domain_relation("SELECT name FROM employees_archive", &ctx),
            "SELECT name FROM employees_archive"
        );
    }

    #[test]
    fn test_domain_rules_inactive_outside_domain() {
        let schema = Schema::new();
        let pred = NumericPredicate::Compare { op: Comparison::Greater, value: "5".to_string() };
        let ctx = RuleContext::new("list all orders over 5", &schema, &pred);
        let sql = "SELECT pay FROM table";
        assert_eq!(domain_columns(sql, &ctx), sql);
        assert_eq!(domain_relation(sql, &ctx), sql);
        assert_eq!(inject_predicate(sql, &ctx), sql);
    }

    #[test]
    fn test_inject_replaces_partial_fragment() {
        let schema = Schema::new();
        let pred = NumericPredicate::Range { low: "40000".to_string(), high: "60000".to_string() };
        let ctx = employee_ctx(&schema, &pred);
        assert_eq!(
            inject_predicate("SELECT EmpID FROM employee WHERE Salary > 40000 AND 60000", &ctx),
            "SELECT EmpID FROM employee WHERE Salary BETWEEN 40000 AND 60000"
        );
        assert_eq!(
            inject_predicate("SELECT EmpID FROM employee WHERE > 40000", &ctx),
            "SELECT EmpID FROM employee WHERE Salary BETWEEN 40000 AND 60000"
        );
    }

    #[test]
    fn test_inject_keeps_other_conditions() {
        let schema = Schema::new();
        let pred = NumericPredicate::Compare { op: Comparison::Less, value: "100".to_string() };
        let ctx = employee_ctx(&schema, &pred);
        assert_eq!(
            inject_predicate("SELECT a FROM employee WHERE Salary = 7 AND dept = 3", &ctx),
            "SELECT a FROM employee WHERE Salary < 100 AND dept = 3"
        );
        assert_eq!(
            inject_predicate("SELECT a FROM employee WHERE dept = 3 AND Salary >= 7", &ctx),
            "SELECT a FROM employee WHERE dept = 3 AND Salary < 100"
        );
        assert_eq!(
            inject_predicate("SELECT a FROM employee WHERE dept = 3", &ctx),
            "SELECT a FROM employee WHERE dept = 3"
        );
    }

    #[test]
    fn test_inject_appends_where() {
        let schema = Schema::new();
        let pred = NumericPredicate::Compare { op: Comparison::Greater, value: "50000".to_string() };
        let ctx = employee_ctx(&schema, &pred);
        assert_eq!(
            inject_predicate("SELECT EmpID, Salary FROM employee ORDER BY Salary", &ctx),
            "SELECT EmpID, Salary FROM employee WHERE Salary > 50000 ORDER BY Salary"
        );
        assert_eq!(inject_predicate("Salary 5", &ctx), "Salary 5 WHERE Salary > 50000");
        assert_eq!(inject_predicate("Salary >= 5", &ctx), "WHERE Salary > 50000");
    }

    #[test]
    fn test_inject_leaves_well_formed_salary_conditions() {
        let schema = Schema::new();
        let pred = NumericPredicate::Compare { op: Comparison::Greater, value: "50000".to_string() };
        let ctx = employee_ctx(&schema, &pred);
        for sql in [
            "SELECT EmpID, Salary FROM employee WHERE Salary IS NOT NULL",
            "SELECT EmpID, Salary FROM employee WHERE Salary IN (1, 2)",
            "SELECT EmpID, Salary FROM employee WHERE Salary LIKE 5",
            "SELECT EmpID, Salary FROM employee WHERE Salary > 5 IS NOT NULL",
        ] {
            assert_eq!(inject_predicate(sql, &ctx), sql);
        }
        assert_eq!(
            inject_predicate("SELECT EmpID FROM employee WHERE (Salary > 5) AND dept = 1", &ctx),
            "SELECT EmpID FROM employee WHERE (Salary > 50000) AND dept = 1"
        );
    }

    #[test]
    fn test_inject_fills_empty_where() {
        let schema = Schema::new();
        let pred = NumericPredicate::Compare { op: Comparison::Greater, value: "5".to_string() };
        let ctx = employee_ctx(&schema, &pred);
        assert_eq!(
            inject_predicate("FROM employee WHERE WHERE", &ctx),
            "FROM employee WHERE Salary > 5"
        );
        assert_eq!(
            inject_predicate("SELECT EmpID FROM employee WHERE ORDER BY Salary", &ctx),
            "SELECT EmpID FROM employee WHERE Salary > 5 ORDER BY Salary"
        );
    }

    #[test]
    fn test_repair_between() {
        let schema = Schema::new();
        let pred = NumericPredicate::None;
        let ctx = employee_ctx(&schema, &pred);
        assert_eq!(
            repair_between("WHERE Salary BETWEEN 40000 AND 60000 = 45000 AND 60000", &ctx),
            "WHERE Salary BETWEEN 40000 AND 60000"
        );
        assert_eq!(
            repair_between("WHERE Salary BETWEEN 1 AND 2 BETWEEN 1 AND 2", &ctx),
            "WHERE Salary BETWEEN 1 AND 2"
        );
        assert_eq!(
            repair_between("WHERE Salary BETWEEN 1 AND 20000x", &ctx),
            "WHERE Salary BETWEEN 1 AND 20000"
        );
        assert_eq!(
            repair_between("WHERE (Salary BETWEEN 1 AND 20000)", &ctx),
            "WHERE (Salary BETWEEN 1 AND 20000)"
        );
    }

    #[test]
    fn test_complete_statement() {
        let schema = Schema::new();
        let pred = NumericPredicate::None;
        let ctx = employee_ctx(&schema, &pred);
        assert_eq!(
            complete_statement("SELECT , FROM employee", &ctx),
            "SELECT EmpID, Salary FROM employee"
        );
        assert_eq!(
            complete_statement("WHERE Salary > 5", &ctx),
            "SELECT EmpID, Salary FROM employee WHERE Salary > 5"
        );
        assert_eq!(
            complete_statement("EmpID FROM employee", &ctx),
            "SELECT EmpID, Salary FROM employee"
        );
        assert_eq!(
            complete_statement("SELECT name WHERE x = 1", &ctx),
            "SELECT name FROM employee WHERE x = 1"
        );
        assert_eq!(
            complete_statement("hello world", &ctx),
            "SELECT EmpID, Salary FROM employee hello world"
        );
    }

    #[test]
    fn test_complete_compound_blocks() {
        let schema = Schema::new();
        let pred = NumericPredicate::None;
        let ctx = employee_ctx(&schema, &pred);
        assert_eq!(
            complete_statement("SELECT a UNION SELECT b", &ctx),
            "SELECT a FROM employee UNION SELECT b FROM employee"
        );
        assert_eq!(
            complete_statement("SELECT a FROM t UNION ALL SELECT , ", &ctx),
            "SELECT a FROM t UNION ALL SELECT EmpID, Salary FROM employee"
        );
        let complete = "WITH x AS (SELECT 1) SELECT * FROM x";
        assert_eq!(complete_statement(complete, &ctx), complete);
        assert_eq!(
            complete_statement("WITH x AS (SELECT 1)", &ctx),
            "WITH x AS (SELECT 1) SELECT EmpID, Salary FROM employee"
        );
    }

    #[test]
    fn test_complete_uses_supplied_schema_outside_domain() {
        let schema = parse_schema("Orders(id, total)");
        let pred = NumericPredicate::None;
        let ctx = RuleContext::new("list all orders", &schema, &pred);
        assert_eq!(complete_statement("SELECT id", &ctx), "SELECT id FROM orders");
        assert_eq!(complete_statement("", &ctx), "SELECT id, total FROM orders");
        assert_eq!(complete_statement("FROM orders", &ctx), "SELECT id, total FROM orders");
    }

    #[test]
    fn test_tidy() {
        let schema = Schema::new();
        let pred = NumericPredicate::None;
        let ctx = employee_ctx(&schema, &pred);
        assert_eq!(tidy("SELECT EmpID,  FROM  employee ", &ctx), "SELECT EmpID FROM employee");
    }
}
