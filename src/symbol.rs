//! Input and output alphabets of the machine.

use std::fmt;

/// Identity of a machine state (dense index into [`Machine::states`](crate::machine::Machine)).
pub type StateId = usize;

/// An observable output symbol, typically a DNA base.
pub type OutputSymbol = char;

/// Symbols the machine consumes on its input side.
///
/// The "null" input of a silent transition is modelled as `Option::None`
/// wherever a transition's input appears.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InputSymbol {
    /// Ordinary data bit.
    Bit(bool),
    StartOfFile,
    EndOfFile,
    /// Out-of-band control symbol with its index.
    Control(u8),
    /// Machine-internal bookkeeping symbol, never decoded.
    Other(char),
}

impl InputSymbol {
    pub const BIT0: InputSymbol = InputSymbol::Bit(false);
    pub const BIT1: InputSymbol = InputSymbol::Bit(true);

    /// Parse the single-character rendering used in machine descriptions:
    /// `0`, `1`, `^` (start of file), `$` (end of file).
    pub fn from_char(c: char) -> Self {
        match c {
            '0' => Self::BIT0,
            '1' => Self::BIT1,
            '^' => Self::StartOfFile,
            '$' => Self::EndOfFile,
            other => Self::Other(other),
        }
    }

    pub fn is_bit(self) -> bool {
        matches!(self, Self::Bit(_))
    }

    pub fn is_control(self) -> bool {
        matches!(self, Self::Control(_))
    }

    /// Meta symbols never appear in recovered user data.
    pub fn is_meta(self) -> bool {
        matches!(
            self,
            Self::StartOfFile | Self::EndOfFile | Self::Control(_)
        )
    }
}

impl fmt::Display for InputSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSymbol::Bit(false) => f.write_str("0"),
            InputSymbol::Bit(true) => f.write_str("1"),
            InputSymbol::StartOfFile => f.write_str("^"),
            InputSymbol::EndOfFile => f.write_str("$"),
            InputSymbol::Control(idx) => write!(f, "#{idx}"),
            InputSymbol::Other(c) => write!(f, "{c}"),
        }
    }
}

/// Whether a transition with this input can take part in decoding.
///
/// Excludes [`InputSymbol::Other`], which marks bookkeeping edges outside the
/// decodable alphabet.
#[inline]
pub fn is_usable(input: Option<InputSymbol>) -> bool {
    !matches!(input, Some(InputSymbol::Other(_)))
}

/// Parse a string of `0`/`1`/`^`/`$` characters into input symbols.
pub fn parse_inputs(s: &str) -> Vec<InputSymbol> {
    s.chars().map(InputSymbol::from_char).collect()
}
