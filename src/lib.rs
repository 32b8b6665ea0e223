//! Decoders for transducer-based DNA storage codes.
//!
//! Data is encoded by a probabilistic finite-state transducer (the
//! *machine*) that reads bits and control symbols and writes bases. This
//! crate inverts that mapping in two ways:
//!
//! 1. [`Decoder`] walks the machine backwards one observed base at a time,
//!    keeping every state the machine could be in together with the input it
//!    would have read. Input is written to a [`SymbolSink`] as soon as every
//!    hypothesis agrees on it; [`BitPacker`] is the sink that turns bits
//!    back into bytes.
//! 2. [`ViterbiMatrix`] finds the most likely input for a sequence that went
//!    through a mutation channel (substitutions, deletions and tandem
//!    duplications), described by [`MutatorParams`].
//!
//! ## Quick start
//! ```
//! use basecodec::{codes, encoder, BitOrder, BitPacker, Decoder, InputModel, MutatorParams, ViterbiMatrix};
//!
//! let machine = codes::rotating_code(2).unwrap();
//! let seq = encoder::encode_bytes(&machine, b"hi", BitOrder::Msb0).unwrap();
//!
//! // Clean channel: stream the bases through the closure decoder.
//! let mut bytes = Vec::new();
//! {
//!     let mut packer = BitPacker::new(&mut bytes, BitOrder::Msb0);
//!     let mut decoder = Decoder::new(&machine, &mut packer).unwrap();
//!     decoder.decode_str(&seq).unwrap();
//!     assert!(decoder.close().unwrap().is_none());
//! }
//! assert_eq!(bytes, b"hi");
//!
//! // Noisy channel: a duplicated base is explained away.
//! let mut noisy = seq.clone();
//! noisy.insert(5, noisy.as_bytes()[4] as char);
//! let vm = ViterbiMatrix::new(&machine, &InputModel::flat(), &MutatorParams::default(), &noisy).unwrap();
//! assert!(vm.loglike().is_finite());
//! ```

pub mod batch;
pub mod bitpack;
pub mod builder;
pub mod codes;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod input_model;
pub mod machine;
pub mod mutator;
pub mod scores;
pub mod symbol;
pub mod utils;
pub mod viterbi;

pub use crate::batch::{decode_batch, Decoded, Record};
pub use crate::bitpack::{BitOrder, BitPacker, TrailingBits};
pub use crate::builder::MatrixBuilder;
pub use crate::decoder::{Decoder, SymbolSink, Unresolved, UnresolvedKind};
pub use crate::error::{DecodeError, Result};
pub use crate::input_model::InputModel;
pub use crate::machine::{Machine, MachineBuilder, MachineState, MachineTransition};
pub use crate::mutator::{MutatorParams, MutatorScores};
pub use crate::scores::MachineScores;
pub use crate::symbol::{InputSymbol, OutputSymbol, StateId};
pub use crate::viterbi::{AlignedCell, SubState, ViterbiMatrix};
