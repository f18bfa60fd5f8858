//! Stop sequence handling over streamed text
//!
//! Text that could still turn into a stop sequence is held back until it
//! either completes the match or diverges, so a stream never emits text
//! past (or the beginning of) a stop sequence.

/// Matches stop sequences against text pushed in arbitrary fragments
#[derive(Debug, Clone, Default)]
pub struct StopSequenceMatcher {
    stops: Vec<String>,
    pending: String,
    stopped: bool,
}

/// Result of pushing one fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopCheck {
    /// Text that is safe to emit now
    pub emit: String,
    /// A stop sequence completed; nothing after it may be emitted
    pub stopped: bool,
}

impl StopSequenceMatcher {
    pub fn new(stops: Vec<String>) -> Self {
        Self {
            stops: stops.into_iter().filter(|s| !s.is_empty()).collect(),
            pending: String::new(),
            stopped: false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn push(&mut self, fragment: &str) -> StopCheck {
        if self.stopped {
            return StopCheck {
                emit: String::new(),
                stopped: true,
            };
        }
        self.pending.push_str(fragment);

        let earliest = self
            .stops
            .iter()
            .filter_map(|stop| self.pending.find(stop.as_str()))
            .min();
        if let Some(at) = earliest {
            self.stopped = true;
            let emit = self.pending[..at].to_string();
            self.pending.clear();
            return StopCheck {
                emit,
                stopped: true,
            };
        }

        let hold = self.held_back_len();
        let split = self.pending.len() - hold;
        let emit = self.pending[..split].to_string();
        self.pending.drain(..split);
        StopCheck {
            emit,
            stopped: false,
        }
    }

    /// Release held-back text at the end of generation
    pub fn finish(&mut self) -> String {
        if self.stopped {
            return String::new();
        }
        std::mem::take(&mut self.pending)
    }

    /// Length of the longest pending suffix that starts some stop sequence
    fn held_back_len(&self) -> usize {
        let longest_stop = self.stops.iter().map(String::len).max().unwrap_or(0);
        let limit = longest_stop.saturating_sub(1).min(self.pending.len());
        (1..=limit)
            .rev()
            .filter(|len| self.pending.is_char_boundary(self.pending.len() - len))
            .find(|len| {
                let suffix = &self.pending[self.pending.len() - len..];
                self.stops.iter().any(|stop| stop.starts_with(suffix))
            })
            .unwrap_or(0)
    }
}
