//! Retrieve-then-generate workflow
//!
//! An explicit state machine:
//!
//! ```text
//! Retrieve --ok--> Generate --ok--> Done
//!    |                 |
//!    | no context      +--llm error--> Error
//!    v
//! Fallback        (other retrieval errors go straight to Error)
//! ```
//!
//! Fallback answers without calling the language model. Generate calls it
//! exactly once; there are no retries.

use super::language::{detect_language, Language};
use super::prompt::{assemble_prompt, extract_citations, DEFAULT_SYSTEM_INSTRUCTION};
use crate::config::{ConversationConfig, LlmConfig};
use crate::errors::AppError;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::metrics;
use crate::models::{Answer, ConversationTurn, Evidence, RetrievalResult};
use crate::retrieval::Retriever;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Generation parameters fixed for the lifetime of the workflow
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub system_instruction: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub history_turn_chars: usize,
}

impl GenerationSettings {
    pub fn from_config(llm: &LlmConfig, conversation: &ConversationConfig) -> Self {
        Self {
            system_instruction: llm
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            max_tokens: llm.max_tokens,
            temperature: llm.temperature,
            history_turn_chars: conversation.history_turn_chars,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default(), &ConversationConfig::default())
    }
}

/// Terminal result of one workflow run
#[derive(Debug)]
pub enum WorkflowOutcome {
    /// Generated from retrieved evidence
    Answered(Answer),
    /// Nothing relevant was retrieved
    NoContext(Answer),
    /// Retrieval or generation failed; `answer` is the user-facing message
    Failed { answer: Answer, cause: AppError },
}

impl WorkflowOutcome {
    pub fn answer(&self) -> &Answer {
        match self {
            WorkflowOutcome::Answered(answer)
            | WorkflowOutcome::NoContext(answer)
            | WorkflowOutcome::Failed { answer, .. } => answer,
        }
    }

    pub fn into_answer(self) -> Answer {
        match self {
            WorkflowOutcome::Answered(answer)
            | WorkflowOutcome::NoContext(answer)
            | WorkflowOutcome::Failed { answer, .. } => answer,
        }
    }
}

enum WorkflowState {
    Retrieve,
    Generate(RetrievalResult),
    Fallback,
    Done(Answer),
    Error(AppError),
}

impl WorkflowState {
    fn name(&self) -> &'static str {
        match self {
            WorkflowState::Retrieve => "retrieve",
            WorkflowState::Generate(_) => "generate",
            WorkflowState::Fallback => "fallback",
            WorkflowState::Done(_) => "done",
            WorkflowState::Error(_) => "error",
        }
    }
}

pub struct GenerationWorkflow {
    retriever: Arc<Retriever>,
    model: Arc<dyn LanguageModel>,
    settings: GenerationSettings,
}

impl GenerationWorkflow {
    pub fn new(
        retriever: Arc<Retriever>,
        model: Arc<dyn LanguageModel>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            retriever,
            model,
            settings,
        }
    }

    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }

    /// Run one question through the state machine. `history` is the
    /// bounded window of earlier turns, oldest first.
    #[instrument(skip_all, fields(query_chars = query.chars().count(), history_turns = history.len()))]
    pub async fn run(&self, query: &str, history: &[ConversationTurn]) -> WorkflowOutcome {
        let language = detect_language(query);
        let mut state = WorkflowState::Retrieve;

        loop {
            debug!(state = state.name(), "Workflow step");
            state = match state {
                WorkflowState::Retrieve => self.retrieve(query).await,
                WorkflowState::Generate(evidence) => self.generate(query, history, evidence).await,
                WorkflowState::Fallback => {
                    info!(language = language.name(), "No relevant context, answering with fallback");
                    metrics::record_answer("no_context");
                    return WorkflowOutcome::NoContext(Answer::no_context(
                        language.no_context_message().to_string(),
                    ));
                }
                WorkflowState::Done(answer) => {
                    metrics::record_answer("grounded");
                    return WorkflowOutcome::Answered(answer);
                }
                WorkflowState::Error(cause) => {
                    warn!(error = %cause, "Workflow failed");
                    metrics::record_answer("failed");
                    return WorkflowOutcome::Failed {
                        answer: failure_answer(language),
                        cause,
                    };
                }
            };
        }
    }

    async fn retrieve(&self, query: &str) -> WorkflowState {
        match self.retriever.retrieve(query).await {
            Ok(evidence) => WorkflowState::Generate(evidence),
            Err(AppError::NoRelevantContext) => WorkflowState::Fallback,
            Err(e) => WorkflowState::Error(e),
        }
    }

    async fn generate(
        &self,
        query: &str,
        history: &[ConversationTurn],
        evidence: RetrievalResult,
    ) -> WorkflowState {
        let prompt = assemble_prompt(
            &self.settings.system_instruction,
            &evidence,
            history,
            query,
            self.settings.history_turn_chars,
        );

        let request = CompletionRequest {
            system: prompt.system,
            prompt: prompt.user,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let start = Instant::now();
        let result = self.model.complete(request).await;
        metrics::record_generation(start.elapsed().as_secs_f64(), result.is_ok());

        match result {
            Ok(text) => {
                let cited = extract_citations(&text, evidence.len());
                let sources: Vec<Evidence> = if cited.is_empty() {
                    evidence.iter().map(|s| Evidence::from(&s.chunk)).collect()
                } else {
                    cited
                        .iter()
                        .map(|&n| Evidence::from(&evidence[n - 1].chunk))
                        .collect()
                };
                debug!(cited = cited.len(), passages = evidence.len(), "Answer generated");
                WorkflowState::Done(Answer::grounded(text, sources))
            }
            Err(AppError::GenerationFailed { message }) => {
                WorkflowState::Error(AppError::GenerationFailed { message })
            }
            Err(other) => WorkflowState::Error(AppError::GenerationFailed {
                message: other.to_string(),
            }),
        }
    }
}

fn failure_answer(language: Language) -> Answer {
    Answer::failed(language.error_message().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnswerOutcome;
    use crate::testing::{retriever_over, ConceptEmbedder, ScriptedModel};

    const CORPUS: &[&str] = &[
        "Digital health literacy improves patient outcomes.",
        "The annual budget of the institute grew.",
    ];

    async fn workflow(model: Arc<ScriptedModel>) -> GenerationWorkflow {
        let retriever = retriever_over(Arc::new(ConceptEmbedder), CORPUS, 2, Some(0.3)).await;
        GenerationWorkflow::new(Arc::new(retriever), model, GenerationSettings::default())
    }

    #[tokio::test]
    async fn test_done_cites_evidence_in_citation_order() {
        let model = Arc::new(ScriptedModel::replying("Literacy improves outcomes [1]."));
        let outcome = workflow(model.clone()).await.run("health literacy", &[]).await;

        let answer = outcome.answer();
        assert!(answer.success);
        assert_eq!(answer.outcome, AnswerOutcome::Grounded);
        assert_eq!(answer.evidence.len(), 1);
        assert_eq!(answer.evidence[0].pages.first, 1);
        assert_eq!(model.calls(), 1);

        let request = model.last_request().unwrap();
        assert!(request.prompt.contains("Digital health literacy improves patient outcomes."));
    }

    #[tokio::test]
    async fn test_uncited_answer_keeps_all_evidence() {
        let model = Arc::new(ScriptedModel::replying("No citation here."));
        let outcome = workflow(model).await.run("health literacy", &[]).await;
        assert_eq!(outcome.answer().evidence.len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_skips_language_model() {
        let model = Arc::new(ScriptedModel::replying("should not be used"));
        let outcome = workflow(model.clone()).await.run("weather forecast", &[]).await;

        assert!(matches!(outcome, WorkflowOutcome::NoContext(_)));
        let answer = outcome.answer();
        assert!(answer.evidence.is_empty());
        assert_eq!(answer.text, Language::English.no_context_message());
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_fallback_in_hebrew() {
        let model = Arc::new(ScriptedModel::replying("unused"));
        let outcome = workflow(model).await.run("מה מזג האוויר?", &[]).await;
        assert_eq!(outcome.answer().text, Language::Hebrew.no_context_message());
    }

    #[tokio::test]
    async fn test_model_failure_is_error_state() {
        let model = Arc::new(ScriptedModel::failing("timed out"));
        let outcome = workflow(model.clone()).await.run("health literacy", &[]).await;

        match outcome {
            WorkflowOutcome::Failed { answer, cause } => {
                assert!(!answer.success);
                assert_eq!(answer.outcome, AnswerOutcome::Failed);
                assert!(matches!(cause, AppError::GenerationFailed { .. }));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_history_reaches_prompt() {
        let model = Arc::new(ScriptedModel::replying("ok [1]"));
        let history = vec![
            ConversationTurn::user("Tell me about literacy"),
            ConversationTurn::assistant("It is a skill"),
        ];
        workflow(model.clone()).await.run("health literacy", &history).await;

        let request = model.last_request().unwrap();
        assert!(request.prompt.contains("User: Tell me about literacy"));
        assert!(request.prompt.contains("Assistant: It is a skill"));
    }
}
