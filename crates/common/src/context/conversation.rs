//! Conversation sessions
//!
//! Each session owns its turn history behind its own async mutex, held for
//! the whole of `submit`, so turns within a session are strictly ordered
//! while different sessions run concurrently. The user turn and the
//! assistant turn are appended together once the workflow has finished;
//! dropping a `submit` future part-way leaves history untouched.

use super::workflow::{GenerationWorkflow, WorkflowOutcome};
use crate::config::ConversationConfig;
use crate::metrics;
use crate::models::{Answer, ConversationTurn};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

/// Bounds on how much history is kept and how much is shown to the model
#[derive(Debug, Clone)]
pub struct HistoryPolicy {
    /// Turns passed to the workflow
    pub window: usize,
    pub max_turns: usize,
    pub max_chars: usize,
    pub idle_timeout: Duration,
}

impl From<&ConversationConfig> for HistoryPolicy {
    fn from(config: &ConversationConfig) -> Self {
        Self {
            window: config.history_window,
            max_turns: config.max_turns,
            max_chars: config.max_chars,
            idle_timeout: config.idle_timeout(),
        }
    }
}

struct Session {
    turns: VecDeque<ConversationTurn>,
    chars: usize,
    last_active: Instant,
    /// Set when the session is dropped from the store while a caller still
    /// holds a handle to it
    evicted: bool,
}

impl Session {
    fn new() -> Self {
        Self {
            turns: VecDeque::new(),
            chars: 0,
            last_active: Instant::now(),
            evicted: false,
        }
    }

    fn window(&self, size: usize) -> Vec<ConversationTurn> {
        let skip = self.turns.len().saturating_sub(size);
        self.turns.iter().skip(skip).cloned().collect()
    }

    fn commit(&mut self, user: ConversationTurn, assistant: ConversationTurn, policy: &HistoryPolicy) {
        self.chars += user.char_count() + assistant.char_count();
        self.turns.push_back(user);
        self.turns.push_back(assistant);

        // Oldest turns go first; the newest exchange always stays.
        while self.turns.len() > 2
            && (self.turns.len() > policy.max_turns || self.chars > policy.max_chars)
        {
            if let Some(dropped) = self.turns.pop_front() {
                self.chars -= dropped.char_count();
            }
        }
        self.last_active = Instant::now();
    }
}

/// Multi-turn front door to the generation workflow
pub struct ConversationManager {
    workflow: Arc<GenerationWorkflow>,
    policy: HistoryPolicy,
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
}

impl ConversationManager {
    pub fn new(workflow: Arc<GenerationWorkflow>, policy: HistoryPolicy) -> Self {
        Self {
            workflow,
            policy,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn workflow(&self) -> &Arc<GenerationWorkflow> {
        &self.workflow
    }

    async fn session(&self, session_id: &str) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new())))
            .clone();
        metrics::set_sessions_active(sessions.len());
        session
    }

    /// Answer `user_text` within `session_id`, creating the session on
    /// first use. Never fails: errors become a best-effort answer with
    /// `success == false`.
    #[instrument(skip(self, user_text), fields(session = %session_id))]
    pub async fn submit(&self, session_id: &str, user_text: &str) -> Answer {
        let mut session = loop {
            let session = self.session(session_id).await.lock_owned().await;
            if !session.evicted {
                break session;
            }
            debug!("Session evicted while waiting, starting a new one");
        };

        let window = session.window(self.policy.window);
        let user_turn = ConversationTurn::user(user_text);

        let outcome = self.workflow.run(user_text, &window).await;
        let answer = match outcome {
            WorkflowOutcome::Failed { answer, cause } => {
                error!(error = %cause, code = ?cause.code(), "Chat turn failed");
                answer
            }
            other => other.into_answer(),
        };

        session.commit(user_turn, ConversationTurn::assistant(answer.text.clone()), &self.policy);
        debug!(turns = session.turns.len(), chars = session.chars, "History updated");

        answer
    }

    /// Snapshot of a session's history, oldest first
    pub async fn history(&self, session_id: &str) -> Option<Vec<ConversationTurn>> {
        let handle = self.sessions.lock().await.get(session_id).cloned()?;
        let session = handle.lock().await;
        Some(session.turns.iter().cloned().collect())
    }

    /// Drop a session. Returns whether it existed.
    pub async fn reset(&self, session_id: &str) -> bool {
        let removed = {
            let mut sessions = self.sessions.lock().await;
            let removed = sessions.remove(session_id);
            metrics::set_sessions_active(sessions.len());
            removed
        };
        match removed {
            Some(handle) => {
                handle.lock().await.evicted = true;
                info!(session = %session_id, "Session reset");
                true
            }
            None => false,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Remove sessions idle for longer than the idle timeout. Sessions with
    /// a turn in flight are skipped.
    pub async fn evict_idle(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        let timeout = self.policy.idle_timeout;

        sessions.retain(|_, handle| match handle.try_lock() {
            Ok(mut session) if session.last_active.elapsed() >= timeout => {
                session.evicted = true;
                false
            }
            _ => true,
        });

        let evicted = before - sessions.len();
        metrics::set_sessions_active(sessions.len());
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "Idle sessions evicted");
        }
        evicted
    }
}
