//! SQL Normalizer
//!
//! Turns untrusted generator output into a canonical
//! `SELECT <columns> FROM <table> [WHERE <predicate>]` statement by running a
//! fixed, ordered list of pure rewrite rules. The list is versioned: any
//! change to rule order or behaviour bumps [`RULESET_VERSION`].
//!
//! Rules, in order:
//!
//! | # | rule | effect |
//! |---|------|--------|
//! | 1 | `sanitize` | strip quotes, backticks, `;`, code fences |
//! | 2 | `substitute_terms` | question words -> schema `table` / `table.column` |
//! | 3 | `domain_columns` | salary/id synonyms -> `Salary` / `EmpID` (employee questions only) |
//! | 3 | `domain_relation` | generic table / projection -> `employee` / `EmpID, Salary` |
//! | 4 | `inject_predicate` | salary condition from the question |
//! | 5 | `repair_between` | glued, doubled and trailing BETWEEN junk |
//! | 5 | `collapse_clauses` | one clause per kind, canonical order |
//! | 6 | `complete_statement` | missing projection / `FROM` |
//! | 7 | `tidy` | dangling comma before `FROM`, spacing |
//!
//! Applying the whole list to its own output is a no-op.

pub mod clauses;
pub mod rules;

use crate::condition::NumericPredicate;
use crate::schema::Schema;
use crate::term_mapper::TermMapping;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

pub const RULESET_VERSION: u32 = 1;

pub const EMPLOYEE_TABLE: &str = "employee";
pub const ID_COLUMN: &str = "EmpID";
pub const SALARY_COLUMN: &str = "Salary";

lazy_static! {
    static ref DOMAIN_KEYWORD: Regex = Regex::new(
        r"(?i)\b(?:employees?|staff|salar(?:y|ies)|earn(?:s|ing|ings|ers?)?|payroll)\b"
    )
    .unwrap();
}

/// Whether a question is about the modeled employee relation.
pub fn is_employee_question(question: &str) -> bool {
    DOMAIN_KEYWORD.is_match(question)
}

/// The relation used to fill in a missing projection or `FROM`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub table: String,
    pub columns: Vec<String>,
}

impl Target {
    pub fn employee() -> Self {
        Self {
            table: EMPLOYEE_TABLE.to_string(),
            columns: vec![ID_COLUMN.to_string(), SALARY_COLUMN.to_string()],
        }
    }

    pub fn projection(&self) -> String {
        self.columns.join(", ")
    }

    /// True when every item of a bare column list is already projected.
    pub fn covers(&self, list: &str) -> bool {
        list.split(',')
            .map(str::trim)
            .all(|item| self.columns.iter().any(|c| c.eq_ignore_ascii_case(item)))
    }

    /// Employee questions always target the modeled relation; otherwise the
    /// first table of a supplied schema is used, falling back to the modeled
    /// relation when there is none.
    pub fn resolve(domain: bool, schema: &Schema) -> Self {
        if domain {
            return Self::employee();
        }
        match schema.first_table() {
            Some((table, columns)) => Self {
                table: table.to_string(),
                columns: columns.to_vec(),
            },
            None => Self::employee(),
        }
    }
}

/// Everything a rule may consult, built once per request.
pub struct RuleContext<'a> {
    pub question: &'a str,
    pub schema: &'a Schema,
    pub predicate: &'a NumericPredicate,
    pub terms: TermMapping,
    pub domain: bool,
    pub target: Target,
}

impl<'a> RuleContext<'a> {
    pub fn new(question: &'a str, schema: &'a Schema, predicate: &'a NumericPredicate) -> Self {
        let domain = is_employee_question(question);
        Self {
            question,
            schema,
            predicate,
            terms: TermMapping::build(question, schema),
            domain,
            target: Target::resolve(domain, schema),
        }
    }
}

pub struct Rule {
    pub name: &'static str,
    pub apply: fn(&str, &RuleContext<'_>) -> String,
}

pub static RULES: &[Rule] = &[
    Rule { name: "sanitize", apply: rules::sanitize },
    Rule { name: "substitute_terms", apply: rules::substitute_terms },
    Rule { name: "domain_columns", apply: rules::domain_columns },
    Rule { name: "domain_relation", apply: rules::domain_relation },
    Rule { name: "inject_predicate", apply: rules::inject_predicate },
    Rule { name: "repair_between", apply: rules::repair_between },
    Rule { name: "collapse_clauses", apply: rules::collapse_clauses },
    Rule { name: "complete_statement", apply: rules::complete_statement },
    Rule { name: "tidy", apply: rules::tidy },
];

pub struct SqlNormalizer<'a> {
    ctx: RuleContext<'a>,
}

impl<'a> SqlNormalizer<'a> {
    pub fn new(question: &'a str, schema: &'a Schema, predicate: &'a NumericPredicate) -> Self {
        Self {
            ctx: RuleContext::new(question, schema, predicate),
        }
    }

    pub fn context(&self) -> &RuleContext<'a> {
        &self.ctx
    }

    /// A blank candidate is returned as is so the validator can report it;
    /// anything else comes out with a projection and a `FROM`.
    pub fn normalize(&self, candidate: &str) -> String {
        if candidate.trim().is_empty() {
            return candidate.to_string();
        }
        RULES.iter().fold(candidate.to_string(), |sql, rule| {
            let next = (rule.apply)(&sql, &self.ctx);
            if next != sql {
                debug!(rule = rule.name, "{} -> {}", sql, next);
            }
            next
        })
    }
}

/// Run the full rule list over a raw candidate.
pub fn normalize_sql(
    candidate: &str,
    question: &str,
    schema: &Schema,
    predicate: &NumericPredicate,
) -> String {
    SqlNormalizer::new(question, schema, predicate).normalize(candidate)
}
