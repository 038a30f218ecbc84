//! Scripted stand-in for the language model

use super::{Fields, Prediction, Predictor, Signature};
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Replays queued predictions per signature in place of a language model
#[derive(Default)]
pub struct ScriptedPredictor {
    queues: Mutex<HashMap<&'static str, VecDeque<Result<Prediction>>>>,
    calls: Mutex<Vec<(&'static str, Fields)>>,
}

impl ScriptedPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful prediction for `signature`
    pub fn push(self, signature: &Signature, prediction: Prediction) -> Self {
        self.enqueue(signature, Ok(prediction));
        self
    }

    /// Queue a failure for `signature`
    pub fn push_error(self, signature: &Signature, message: &str) -> Self {
        self.enqueue(signature, Err(OrchestrationError::LlmError(message.to_string())));
        self
    }

    fn enqueue(&self, signature: &Signature, item: Result<Prediction>) {
        if let Ok(mut queues) = self.queues.lock() {
            queues.entry(signature.name).or_default().push_back(item);
        }
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<(&'static str, Fields)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, signature: &Signature) -> usize {
        self.calls()
            .iter()
            .filter(|(name, _)| *name == signature.name)
            .count()
    }
}

#[async_trait]
impl Predictor for ScriptedPredictor {
    async fn predict(&self, signature: &Signature, inputs: &Fields) -> Result<Prediction> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((signature.name, inputs.clone()));
        }

        let next = self
            .queues
            .lock()
            .map_err(|_| OrchestrationError::PredictionError("scripted predictor poisoned".to_string()))?
            .get_mut(signature.name)
            .and_then(VecDeque::pop_front);

        next.unwrap_or_else(|| {
            Err(OrchestrationError::PredictionError(format!(
                "No scripted prediction left for '{}'",
                signature.name
            )))
        })
    }
}
