//! SQL Generator
//!
//! Orchestrates one request: split off an optional schema, prompt the
//! generation engine once, repair the candidate and run it through the safety
//! validator. Every failure comes back as a [`Text2SqlError`]; panics inside
//! the pipeline are caught here and reported as generation failures.

use crate::condition::extract_condition;
use crate::engine::{load_engine, GenerationEngine};
use crate::error::{Result, Text2SqlError};
use crate::normalizer::normalize_sql;
use crate::schema::{split_schema_question, Schema};
use crate::validator::validate_select;
use crate::config::Config;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info};

pub use crate::engine::DecodingParams;

pub const PROMPT_PREFIX: &str = "translate English to SQL: ";
pub const SCHEMA_ANNOTATION: &str = " | schema: ";

/// The fixed prompt template the fine-tuned model was trained on, with the
/// supplied schema (if any) appended.
pub fn build_prompt(question: &str, schema: &Schema) -> String {
    if schema.is_empty() {
        format!("{}{}", PROMPT_PREFIX, question)
    } else {
        format!("{}{}{}{}", PROMPT_PREFIX, question, SCHEMA_ANNOTATION, schema.describe())
    }
}

pub struct SqlGenerator {
    engine: Arc<dyn GenerationEngine>,
    params: DecodingParams,
}

impl SqlGenerator {
    pub fn new(engine: Arc<dyn GenerationEngine>, params: DecodingParams) -> Self {
        Self { engine, params }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(load_engine(config)?, DecodingParams::from(config)))
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn params(&self) -> &DecodingParams {
        &self.params
    }

    /// Translate a question (optionally prefixed with `Schema: ... Question:`)
    /// into a validated `SELECT`.
    pub fn generate_sql(&self, text: &str) -> Result<String> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.run(text))) {
            Ok(result) => result,
            Err(payload) => Err(Text2SqlError::Generation(panic_message(payload.as_ref()))),
        }
    }

    fn run(&self, text: &str) -> Result<String> {
        let (schema, question) = split_schema_question(text);
        if !schema.is_empty() {
            info!("Using supplied schema: {}", schema.describe());
        }

        let prompt = build_prompt(&question, &schema);
        debug!("Prompt: {}", prompt);

        let raw = self
            .engine
            .generate(&prompt, &self.params)
            .map_err(|e| Text2SqlError::Generation(e.to_string()))?;
        info!("Raw candidate from {}: {}", self.engine.name(), raw);

        normalize_and_validate(&raw, &question, &schema)
    }
}

/// Repair a candidate the caller already holds and validate the result.
pub fn normalize_and_validate(raw: &str, question: &str, schema: &Schema) -> Result<String> {
    let predicate = extract_condition(question);
    debug!("Extracted predicate: {:?}", predicate);

    let sql = normalize_sql(raw, question, schema, &predicate);
    validate_select(&sql)?;

    info!("Generated SQL: {}", sql);
    Ok(sql)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "engine panicked".to_string()
    }
}
