//! Entity extraction - names the things a question is about

use crate::config::RetrievalConfig;
use crate::ports::LanguageModel;
use crate::retry::call_with_retry;
use graphrag_core::{Entity, EntityType, ModelOutput, Outcome, RetrievalWarning};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const EXTRACTION_PROMPT: &str = "You are extracting organization, person, location and concept entities from the text. \
Return every entity mentioned in the question as an object with its exact name and its type \
(person, organization, location or concept). Return an empty list if there are none.";

/// JSON schema the model is asked to fill
pub fn extraction_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "entities": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "type": { "type": "string" }
                    },
                    "required": ["name"]
                }
            }
        },
        "required": ["entities"]
    })
}

/// Extracts named entities from a question through a language model
pub struct EntityExtractor {
    llm: Arc<dyn LanguageModel>,
    config: RetrievalConfig,
}

impl EntityExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>, config: RetrievalConfig) -> Self {
        Self { llm, config }
    }

    /// Extract entities from `question`.
    ///
    /// Never fails: a model error, timeout or unparseable answer yields an
    /// empty set with an [`RetrievalWarning::ExtractionDegraded`] warning.
    #[instrument(skip(self, question))]
    pub async fn extract(&self, question: &str) -> Outcome<Vec<Entity>> {
        let question = question.trim();
        if question.is_empty() {
            return Outcome::ok(Vec::new());
        }

        let prompt = format!("{EXTRACTION_PROMPT}\n\nQuestion: {question}");
        let schema = extraction_schema();

        let output = call_with_retry(
            &self.config.retry,
            self.config.call_timeout,
            "entity extraction",
            || self.llm.complete_structured(&prompt, &schema),
        )
        .await;

        match output {
            Ok(ModelOutput::Parsed(value)) => {
                let mut entities = Entity::dedup(parse_entities(&value));
                entities.truncate(self.config.max_entities);
                debug!("Extracted {} entities", entities.len());
                Outcome::ok(entities)
            }
            Ok(ModelOutput::Malformed(raw)) => {
                warn!("Entity extraction returned malformed output: {}", raw);
                Outcome::degraded(
                    Vec::new(),
                    RetrievalWarning::ExtractionDegraded {
                        reason: "malformed model output".to_string(),
                    },
                )
            }
            Err(e) => {
                warn!("Entity extraction failed: {}", e);
                Outcome::degraded(
                    Vec::new(),
                    RetrievalWarning::ExtractionDegraded {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }
}

/// Read entities out of any of the shapes models tend to return:
/// `{"entities": [..]}`, `{"names": [..]}` or a bare array, with items as
/// strings or objects.
pub fn parse_entities(value: &Value) -> Vec<Entity> {
    let items = match value {
        Value::Array(items) => items,
        other => match other
            .get("entities")
            .or_else(|| other.get("names"))
            .and_then(|v| v.as_array())
        {
            Some(items) => items,
            None => return Vec::new(),
        },
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(name) => Some(Entity::new(name.as_str(), EntityType::Concept)),
            Value::Object(obj) => {
                let name = obj
                    .get("name")
                    .or_else(|| obj.get("entity"))
                    .or_else(|| obj.get("value"))
                    .and_then(value_to_string)?;
                let entity_type = obj
                    .get("type")
                    .or_else(|| obj.get("entity_type"))
                    .or_else(|| obj.get("label"))
                    .or_else(|| obj.get("category"))
                    .and_then(value_to_string)
                    .map(|label| EntityType::from_label(&label))
                    .unwrap_or_default();
                Some(Entity::new(name, entity_type))
            }
            _ => None,
        })
        .collect()
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(arr) => arr.first().and_then(value_to_string),
        Value::Object(obj) => obj
            .get("name")
            .or_else(|| obj.get("value"))
            .and_then(value_to_string),
        _ => None,
    }
}
