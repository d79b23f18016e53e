//! Chat pipeline
//!
//! - Language detection for answer mirroring
//! - Pure prompt assembly and citation extraction
//! - The retrieve/generate state machine
//! - Session-scoped conversation management

mod conversation;
mod language;
mod prompt;
mod workflow;

pub use conversation::{ConversationManager, HistoryPolicy};
pub use language::{detect_language, Language};
pub use prompt::{assemble_prompt, extract_citations, Prompt, DEFAULT_SYSTEM_INSTRUCTION};
pub use workflow::{GenerationSettings, GenerationWorkflow, WorkflowOutcome};
