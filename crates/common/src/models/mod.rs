//! Domain models
//!
//! Plain data types shared by ingestion, the vector index and the chat
//! workflow.

mod answer;
mod chunk;
mod conversation;
mod document;

pub use answer::{Answer, AnswerOutcome, Evidence};
pub use chunk::{Chunk, EntryMetadata, IndexEntry, PageSpan, RetrievalResult, ScoredChunk};
pub use conversation::{ConversationTurn, Role};
pub use document::{document_id_for, Document};
