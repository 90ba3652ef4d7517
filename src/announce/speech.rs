//! Speech output port.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

/// Failure reported by a speech engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpeechError {
    #[error("speech engine unavailable")]
    Unavailable,

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
}

/// Speech synthesis collaborator.
///
/// `speak` starts an utterance and returns; `is_speaking` reports whether
/// it is still playing.
pub trait SpeechPort: Send {
    fn speak(&mut self, text: &str) -> Result<(), SpeechError>;
    fn is_speaking(&self) -> bool;
    fn cancel(&mut self);
}

/// Writes utterances to the log and stays busy for as long as reading them
/// aloud would take.
#[derive(Debug, Clone)]
pub struct LogSpeech {
    words_per_minute: u32,
    busy_until: Option<Instant>,
}

impl LogSpeech {
    pub fn new(words_per_minute: u32) -> Self {
        Self {
            words_per_minute: words_per_minute.max(1),
            busy_until: None,
        }
    }

    /// Time needed to say `text`.
    pub fn utterance_duration(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count() as f64;
        Duration::from_secs_f64(words * 60.0 / self.words_per_minute as f64)
    }
}

impl SpeechPort for LogSpeech {
    fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        tracing::info!("Speaking: \"{}\"", text);
        self.busy_until = Some(Instant::now() + self.utterance_duration(text));
        Ok(())
    }

    fn is_speaking(&self) -> bool {
        self.busy_until.is_some_and(|t| Instant::now() < t)
    }

    fn cancel(&mut self) {
        self.busy_until = None;
    }
}

#[derive(Debug, Default)]
struct MockState {
    busy: bool,
    spoken: Vec<String>,
    fail_next: bool,
    cancels: usize,
}

/// Scriptable speech port for tests. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockSpeech {
    state: Arc<Mutex<MockState>>,
}

impl MockSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report busy (or idle) from now on.
    pub fn set_busy(&self, busy: bool) {
        self.state.lock().busy = busy;
    }

    /// Fail the next `speak` call.
    pub fn fail_next(&self) {
        self.state.lock().fail_next = true;
    }

    /// Everything spoken so far, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.state.lock().spoken.clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.state.lock().cancels
    }
}

impl SpeechPort for MockSpeech {
    fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        let mut state = self.state.lock();
        if state.fail_next {
            state.fail_next = false;
            return Err(SpeechError::Synthesis("mock failure".to_string()));
        }
        state.spoken.push(text.to_string());
        Ok(())
    }

    fn is_speaking(&self) -> bool {
        self.state.lock().busy
    }

    fn cancel(&mut self) {
        let mut state = self.state.lock();
        state.cancels += 1;
        state.busy = false;
    }
}
