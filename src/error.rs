//! Error types for decoding and encoding.

use thiserror::Error;

use crate::viterbi::SubState;

/// Fatal conditions raised by the decoders and the encoder.
///
/// Non-fatal anomalies (unresolved ambiguity at end of stream, trailing bits
/// in the packer, discarded meta-symbols) are not errors: they are logged and
/// returned as report values by `close`/`finish`.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A state was reached along two paths with different pending input.
    #[error("state {state} has two possible input queues ({first}, {second})")]
    NonDeterministic {
        state: String,
        first: String,
        second: String,
    },

    /// No live hypothesis has a usable transition emitting the symbol.
    #[error("can't decode '{symbol}' from states [{}]", states.join(", "))]
    NoUsableTransition { symbol: char, states: Vec<String> },

    /// A finite matrix cell has no recorded predecessor.
    #[error("no predecessor for cell (state {state}, pos {pos}, {sub})")]
    MissingPredecessor {
        state: usize,
        pos: usize,
        sub: SubState,
    },

    /// No path through the matrix ends in an end state.
    #[error("observed sequence has zero likelihood under the machine")]
    NoPath,

    /// Observed symbol outside the channel alphabet.
    #[error("unknown base '{symbol}' at position {pos}")]
    UnknownBase { symbol: char, pos: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid machine: {0}")]
    InvalidMachine(String),

    /// The encoder found no way to consume an input symbol.
    #[error("state {state} cannot consume input '{symbol}'")]
    Unencodable { state: String, symbol: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_items() {
        let err = DecodeError::NoUsableTransition {
            symbol: 'G',
            states: vec!["s0".into(), "s3".into()],
        };
        assert_eq!(err.to_string(), "can't decode 'G' from states [s0, s3]");

        let err = DecodeError::MissingPredecessor {
            state: 4,
            pos: 7,
            sub: SubState::TandemRepeat(1),
        };
        assert_eq!(
            err.to_string(),
            "no predecessor for cell (state 4, pos 7, T1)"
        );
    }
}
