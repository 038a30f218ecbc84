//! Gemini-backed predictor
//!
//! Renders a signature into a prompt that asks for one JSON object keyed by
//! the signature's output fields, then parses the reply leniently.

use super::{extract_json_object, Fields, Prediction, Predictor, Signature};
use crate::error::OrchestrationError;
use crate::gemini::GeminiClient;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

pub struct GeminiPredictor {
    client: GeminiClient,
}

impl GeminiPredictor {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: GeminiClient::new(api_key, model, timeout)?,
        })
    }
}

#[async_trait]
impl Predictor for GeminiPredictor {
    async fn predict(&self, signature: &Signature, inputs: &Fields) -> Result<Prediction> {
        let system_prompt = build_system_prompt(signature);
        let prompt = build_prompt(signature, inputs);

        let reply = self.client.generate(&system_prompt, &prompt).await?;
        debug!(signature = signature.name, chars = reply.len(), "Prediction received");

        parse_reply(signature, &reply)
    }
}

fn build_system_prompt(signature: &Signature) -> String {
    let keys: Vec<String> = signature
        .outputs
        .iter()
        .map(|field| {
            if field.desc.is_empty() {
                format!("- {}", field.name)
            } else {
                format!("- {}: {}", field.name, field.desc)
            }
        })
        .collect();

    format!(
        "{}\n\nRespond with a single JSON object with exactly these keys:\n{}\nDo not wrap the JSON in markdown.",
        signature.instructions,
        keys.join("\n")
    )
}

fn build_prompt(signature: &Signature, inputs: &Fields) -> String {
    signature
        .inputs
        .iter()
        .map(|field| {
            let value = inputs.get(field.name).map(String::as_str).unwrap_or("");
            format!("{}:\n{}", field.name, value)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn parse_reply(signature: &Signature, reply: &str) -> Result<Prediction> {
    let object = extract_json_object(reply).ok_or_else(|| {
        OrchestrationError::PredictionError(format!(
            "'{}' reply is not a JSON object",
            signature.name
        ))
    })?;

    let missing: Vec<&str> = signature
        .outputs
        .iter()
        .map(|field| field.name)
        .filter(|name| !object.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        warn!(signature = signature.name, ?missing, "Prediction is missing output fields");
    }

    Ok(Prediction::new(object.into_iter().collect()))
}
