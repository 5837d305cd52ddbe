//! Degeneration watchdog for streamed model output.
//!
//! Small local models sometimes loop ("\n\n\n…" or the same sentence over
//! and over). The guard watches the piece stream through a ring buffer and
//! aborts the turn once a repetition pattern crosses its threshold.

use std::collections::VecDeque;
use std::fmt;

use crate::pipeline::text::truncate_chars;

// ═══════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════

/// Thresholds for the watchdog. Normal answers never reach them.
#[derive(Debug, Clone)]
pub struct StreamGuardConfig {
    /// Same piece repeated this many times in a row aborts.
    pub max_consecutive_identical: usize,
    /// Window length for sequence repetition.
    pub sequence_length: usize,
    /// Same window repeated this many times aborts.
    pub max_sequence_repeats: usize,
    /// Hard cap on streamed pieces per turn.
    pub max_total_pieces: usize,
    /// Ring buffer capacity.
    pub ring_buffer_size: usize,
}

impl Default for StreamGuardConfig {
    fn default() -> Self {
        Self {
            max_consecutive_identical: 20,
            sequence_length: 10,
            max_sequence_repeats: 5,
            max_total_pieces: 4096,
            ring_buffer_size: 200,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Degeneration patterns
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegenerationPattern {
    PieceRepeat { piece: String, count: usize },
    SequenceRepeat { sequence_chars: usize, repeat_count: usize },
    PieceLimitExceeded { total_pieces: usize },
}

impl fmt::Display for DegenerationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PieceRepeat { piece, count } => {
                write!(f, "piece_repeat({:?} × {})", truncate_chars(piece, 20), count)
            }
            Self::SequenceRepeat {
                sequence_chars,
                repeat_count,
            } => write!(f, "sequence_repeat({sequence_chars} chars × {repeat_count})"),
            Self::PieceLimitExceeded { total_pieces } => {
                write!(f, "piece_limit_exceeded({total_pieces})")
            }
        }
    }
}

/// Returned by [`StreamGuard::feed`] when the stream must stop.
#[derive(Debug, Clone, thiserror::Error)]
#[error("degenerate output: {pattern} after {pieces_before_abort} pieces")]
pub struct DegenerationAbort {
    pub pattern: DegenerationPattern,
    pub pieces_before_abort: usize,
}

// ═══════════════════════════════════════════════════════════
// StreamGuard
// ═══════════════════════════════════════════════════════════

/// One guard per streamed turn.
pub struct StreamGuard {
    config: StreamGuardConfig,
    buffer: VecDeque<String>,
    total_pieces: usize,
    consecutive_count: usize,
    last_piece: Option<String>,
    sequence_repeat_count: usize,
}

impl StreamGuard {
    pub fn new(config: StreamGuardConfig) -> Self {
        let capacity = config.ring_buffer_size;
        Self {
            config,
            buffer: VecDeque::with_capacity(capacity),
            total_pieces: 0,
            consecutive_count: 0,
            last_piece: None,
            sequence_repeat_count: 0,
        }
    }

    /// Check one piece. `Err` means abort the stream without forwarding it.
    pub fn feed(&mut self, piece: &str) -> Result<(), DegenerationAbort> {
        self.total_pieces += 1;

        if self.total_pieces > self.config.max_total_pieces {
            return Err(self.abort(DegenerationPattern::PieceLimitExceeded {
                total_pieces: self.total_pieces,
            }));
        }

        if self.last_piece.as_deref() == Some(piece) {
            self.consecutive_count += 1;
            if self.consecutive_count >= self.config.max_consecutive_identical {
                return Err(self.abort(DegenerationPattern::PieceRepeat {
                    piece: piece.to_string(),
                    count: self.consecutive_count,
                }));
            }
        } else {
            self.consecutive_count = 1;
            self.last_piece = Some(piece.to_string());
        }

        if self.buffer.len() >= self.config.ring_buffer_size {
            self.buffer.pop_front();
        }
        self.buffer.push_back(piece.to_string());

        let k = self.config.sequence_length;
        if k > 0 && self.buffer.len() >= 2 * k {
            let len = self.buffer.len();
            let repeated = self
                .buffer
                .range(len - k..len)
                .zip(self.buffer.range(len - 2 * k..len - k))
                .all(|(a, b)| a == b);

            if repeated {
                self.sequence_repeat_count += 1;
                if self.sequence_repeat_count >= self.config.max_sequence_repeats {
                    let sequence_chars = self
                        .buffer
                        .range(len - k..len)
                        .map(|p| p.chars().count())
                        .sum();
                    return Err(self.abort(DegenerationPattern::SequenceRepeat {
                        sequence_chars,
                        repeat_count: self.sequence_repeat_count,
                    }));
                }
            } else {
                self.sequence_repeat_count = 0;
            }
        }

        Ok(())
    }

    pub fn total_pieces(&self) -> usize {
        self.total_pieces
    }

    fn abort(&self, pattern: DegenerationPattern) -> DegenerationAbort {
        tracing::warn!(%pattern, pieces = self.total_pieces, "Stream guard tripped");
        DegenerationAbort {
            pattern,
            pieces_before_abort: self.total_pieces,
        }
    }
}
