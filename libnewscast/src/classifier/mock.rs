//! Scripted text generator for testing

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::classifier::TextGenerator;
use crate::error::ClassifierError;

/// Replays a queue of responses, then repeats a fallback
#[derive(Clone)]
pub struct ScriptedGenerator {
    script: Arc<Mutex<VecDeque<Result<String, ClassifierError>>>>,
    fallback: Result<String, ClassifierError>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedGenerator {
    /// Responses are consumed in order; afterwards every call is a transport error
    pub fn new(script: Vec<Result<String, ClassifierError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            fallback: Err(ClassifierError::Transport("script exhausted".into())),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answer with `response`
    pub fn always(response: &str) -> Self {
        Self::new(Vec::new()).with_fallback(Ok(response.to_string()))
    }

    /// Always fail with `error`
    pub fn failing(error: ClassifierError) -> Self {
        Self::new(Vec::new()).with_fallback(Err(error))
    }

    pub fn with_fallback(mut self, fallback: Result<String, ClassifierError>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Queue another response
    pub fn push(&self, response: Result<String, ClassifierError>) {
        self.script.lock().unwrap().push_back(response);
    }

    /// Get the number of times complete was called
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// Get all prompts that were sent
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String, ClassifierError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}
