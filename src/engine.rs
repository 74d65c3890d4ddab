//! Generation Engine
//!
//! The seam between the pipeline and the text-to-SQL model. The pipeline only
//! needs "prompt in, one candidate out"; everything about how the model is
//! hosted lives behind [`GenerationEngine`].
//!
//! - [`HttpEngine`] talks to a text2text inference endpoint.
//! - [`OfflineEngine`] is a deterministic stand-in that emits candidates in the
//!   shape of the fine-tuned model's training targets. It is used when no
//!   endpoint is configured.

use crate::condition::extract_condition;
use crate::config::Config;
use crate::error::{Result, Text2SqlError};
use crate::generator::{PROMPT_PREFIX, SCHEMA_ANNOTATION};
use crate::normalizer::is_employee_question;
use crate::schema::{parse_schema, Schema};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

lazy_static! {
    static ref TOP_N: Regex = Regex::new(r"(?i)\btop\s+(\d+)\b").unwrap();
}

/// Beam-search decoding parameters, fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodingParams {
    pub max_new_tokens: usize,
    pub num_beams: usize,
}

impl Default for DecodingParams {
    fn default() -> Self {
        Self {
            max_new_tokens: crate::config::DEFAULT_MAX_NEW_TOKENS,
            num_beams: crate::config::DEFAULT_NUM_BEAMS,
        }
    }
}

impl From<&Config> for DecodingParams {
    fn from(config: &Config) -> Self {
        Self {
            max_new_tokens: config.max_new_tokens,
            num_beams: config.num_beams,
        }
    }
}

/// A text-to-SQL model. Called at most once per request, from any thread;
/// implementations must not rely on mutable state.
pub trait GenerationEngine: Send + Sync {
    fn generate(&self, prompt: &str, params: &DecodingParams) -> Result<String>;

    fn name(&self) -> &str;
}

pub struct HttpEngine {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: String,
}

impl HttpEngine {
    pub fn new(url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            model: model.into(),
        })
    }

    pub fn request_body(&self, prompt: &str, params: &DecodingParams) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": params.max_new_tokens,
                "num_beams": params.num_beams,
                "early_stopping": true
            }
        })
    }
}

impl GenerationEngine for HttpEngine {
    fn generate(&self, prompt: &str, params: &DecodingParams) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt, params))
            .send()?
            .error_for_status()?;

        let body: serde_json::Value = response.json()?;
        parse_generated_text(body)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Inference servers answer either `[{"generated_text": ..}]` or
/// `{"generated_text": ..}`. Only the first candidate is used.
pub fn parse_generated_text(body: serde_json::Value) -> Result<String> {
    let first = match body {
        serde_json::Value::Array(mut items) => {
            if items.is_empty() {
                return Err(Text2SqlError::Engine("engine returned no candidates".to_string()));
            }
            items.swap_remove(0)
        }
        other => other,
    };
    let generated: GeneratedText = serde_json::from_value(first)
        .map_err(|e| Text2SqlError::Engine(format!("unexpected engine response: {}", e)))?;
    Ok(generated.generated_text)
}

/// Deterministic candidates without a model.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineEngine;

impl GenerationEngine for OfflineEngine {
    fn generate(&self, prompt: &str, _params: &DecodingParams) -> Result<String> {
        let body = prompt.strip_prefix(PROMPT_PREFIX).unwrap_or(prompt);
        let (question, schema) = match body.split_once(SCHEMA_ANNOTATION) {
            Some((question, description)) => (question, parse_schema(description)),
            None => (body, Schema::new()),
        };

        if !is_employee_question(question) {
            if let Some((table, _)) = schema.first_table() {
                return Ok(format!("SELECT * FROM {}", table));
            }
        }

        let mut sql = "SELECT EmpID, Salary FROM Employee".to_string();
        if let Some(caps) = TOP_N.captures(question) {
            sql.push_str(&format!(" ORDER BY Salary DESC LIMIT {}", &caps[1]));
        } else if let Some(condition) = extract_condition(question).render("Salary") {
            sql.push_str(&format!(" WHERE {}", condition));
        }
        Ok(sql)
    }

    fn name(&self) -> &str {
        "offline"
    }
}

/// Pick the engine for this process: a local fine-tuned model served by the
/// configured endpoint, else the remote model name on that endpoint, else the
/// offline engine.
pub fn load_engine(config: &Config) -> Result<Arc<dyn GenerationEngine>> {
    let Some(url) = config.engine_url.as_deref() else {
        warn!("TEXT2SQL_ENGINE_URL not set, falling back to the offline engine");
        return Ok(Arc::new(OfflineEngine));
    };

    let model = match config.local_model() {
        Some(path) => {
            info!("Using local model at {}", path.display());
            path.display().to_string()
        }
        None => {
            warn!(
                "No local model in {}, using remote model {}",
                config.model_cache_dir.display(),
                config.model
            );
            config.model.clone()
        }
    };

    let engine = HttpEngine::new(url, model, Duration::from_secs(config.timeout_secs))?;
    info!("Generation engine: {} via {}", engine.name(), url);
    Ok(Arc::new(engine))
}
