//! Retrieval-augmented answering: top-k context from the knowledge base, one prompt, one
//! generator call.

use std::sync::Arc;

use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;
use tracing::debug;

use maitre_core::retrieval::{KnowledgeBase, RetrievalError, ScoredChunk};

use crate::llm::{AnswerGenerator, GenerationError};
use crate::persona::Persona;

const PROMPT_TEMPLATE_NAME: &str = "answer_prompt";
const PROMPT_TEMPLATE: &str = "Context:\n{{ context }}\n\nQuestion:\n{{ question }}";

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("knowledge base not initialized")]
    NotReady,
    #[error("retrieval failed: {0}")]
    Retrieval(RetrievalError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("prompt template error: {0}")]
    Template(String),
}

impl From<RetrievalError> for AnswerError {
    fn from(value: RetrievalError) -> Self {
        match value {
            RetrievalError::NotReady => Self::NotReady,
            other => Self::Retrieval(other),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Answer {
    pub text: String,
    pub context: Vec<ScoredChunk>,
}

pub struct RetrievalAugmentedAnswerer {
    knowledge_base: Arc<KnowledgeBase>,
    generator: Arc<dyn AnswerGenerator>,
    top_k: usize,
    templates: Tera,
}

impl RetrievalAugmentedAnswerer {
    pub fn new(
        knowledge_base: Arc<KnowledgeBase>,
        generator: Arc<dyn AnswerGenerator>,
        top_k: usize,
    ) -> Result<Self, AnswerError> {
        let mut templates = Tera::default();
        templates
            .add_raw_template(PROMPT_TEMPLATE_NAME, PROMPT_TEMPLATE)
            .map_err(|error| AnswerError::Template(error.to_string()))?;
        Ok(Self { knowledge_base, generator, top_k, templates })
    }

    pub async fn answer(&self, question: &str, persona: Persona) -> Result<Answer, AnswerError> {
        let context = self.knowledge_base.query(question, self.top_k).await?;
        let prompt = self.render_prompt(question, &context)?;

        debug!(
            event_name = "agent.answer.prompt_built",
            persona = persona.role(),
            chunks = context.len(),
            model = self.generator.model_id(),
            "answer prompt built"
        );

        let text = self.generator.generate(&prompt, persona).await?;
        Ok(Answer { text, context })
    }

    pub fn render_prompt(
        &self,
        question: &str,
        context: &[ScoredChunk],
    ) -> Result<String, AnswerError> {
        let joined = context.iter().map(|chunk| chunk.text.as_str()).collect::<Vec<_>>().join("\n");

        let mut values = Context::new();
        values.insert("context", &joined);
        values.insert("question", question);
        self.templates
            .render(PROMPT_TEMPLATE_NAME, &values)
            .map_err(|error| AnswerError::Template(error.to_string()))
    }
}
