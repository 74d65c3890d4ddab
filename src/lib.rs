//! text2sql - repairs and validates the output of a natural-language to SQL
//! model so that only a single, read-only `SELECT` ever leaves the pipeline.

pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod generator;
pub mod normalizer;
pub mod schema;
pub mod term_mapper;
pub mod validator;

pub use condition::{extract_condition, Comparison, NumericPredicate};
pub use config::Config;
pub use engine::{load_engine, DecodingParams, GenerationEngine, HttpEngine, OfflineEngine};
pub use error::{Result, Text2SqlError};
pub use generator::{build_prompt, normalize_and_validate, SqlGenerator};
pub use normalizer::{normalize_sql, SqlNormalizer, RULESET_VERSION};
pub use schema::{parse_schema, split_schema_question, Schema};
pub use term_mapper::{map_term, TermMapping};
pub use validator::{validate_select, ValidationError};
