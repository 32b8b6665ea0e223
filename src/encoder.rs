//! Forward walk of the machine: input symbols in, bases out.
//!
//! The encoder is the inverse of [`Decoder`](crate::decoder::Decoder) for
//! machines whose input-free transitions form no cycles. It exists so that
//! decoders can be exercised end to end and is not a general transducer
//! composer.

use tracing::trace;

use crate::bitpack::{unpack_bits, BitOrder};
use crate::error::{DecodeError, Result};
use crate::machine::{Machine, MachineTransition};
use crate::symbol::{InputSymbol, OutputSymbol, StateId};

pub struct Encoder<'a> {
    machine: &'a Machine,
    state: StateId,
    out: Vec<OutputSymbol>,
}

impl<'a> Encoder<'a> {
    pub fn new(machine: &'a Machine) -> Self {
        Self {
            machine,
            state: machine.start_state(),
            out: Vec::new(),
        }
    }

    pub fn state(&self) -> StateId {
        self.state
    }

    pub fn output(&self) -> &[OutputSymbol] {
        &self.out
    }

    /// Follow input-free transitions until one consuming `sym` is available,
    /// then take it.
    pub fn encode_symbol(&mut self, sym: InputSymbol) -> Result<()> {
        let machine = self.machine;
        for _ in 0..=machine.n_states() {
            let state = machine.state(self.state);
            if let Some(t) = state
                .trans
                .iter()
                .find(|t| t.is_usable() && t.input == Some(sym))
            {
                self.take(t);
                return Ok(());
            }
            match first_silent_input(&state.trans) {
                Some(t) => self.take(t),
                None => break,
            }
        }
        Err(DecodeError::Unencodable {
            state: self.machine.state_name(self.state).to_string(),
            symbol: sym.to_string(),
        })
    }

    pub fn encode_all<I>(&mut self, inputs: I) -> Result<()>
    where
        I: IntoIterator<Item = InputSymbol>,
    {
        inputs.into_iter().try_for_each(|sym| self.encode_symbol(sym))
    }

    /// Walk input-free transitions to an end state and return the output.
    pub fn finish(mut self) -> Result<String> {
        let machine = self.machine;
        for _ in 0..=machine.n_states() {
            let state = machine.state(self.state);
            if state.is_end() {
                return Ok(self.out.into_iter().collect());
            }
            match first_silent_input(&state.trans) {
                Some(t) => self.take(t),
                None => break,
            }
        }
        Err(DecodeError::Unencodable {
            state: self.machine.state_name(self.state).to_string(),
            symbol: "end of stream".to_string(),
        })
    }

    fn take(&mut self, t: &MachineTransition) {
        trace!(
            src = self.machine.state_name(self.state),
            dest = self.machine.state_name(t.dest),
            output = ?t.output,
            "encoder transition"
        );
        self.out.extend(t.output);
        self.state = t.dest;
    }
}

fn first_silent_input(trans: &[MachineTransition]) -> Option<&MachineTransition> {
    trans.iter().find(|t| t.input_empty())
}

/// Encode a complete input stream and walk to an end state.
pub fn encode_inputs<I>(machine: &Machine, inputs: I) -> Result<String>
where
    I: IntoIterator<Item = InputSymbol>,
{
    let mut encoder = Encoder::new(machine);
    encoder.encode_all(inputs)?;
    encoder.finish()
}

/// Bits of `bytes` in `order`, framed by start/end-of-file markers when the
/// machine reads them.
pub fn byte_inputs(machine: &Machine, bytes: &[u8], order: BitOrder) -> Vec<InputSymbol> {
    let alphabet = machine.input_alphabet();
    let mut inputs = Vec::with_capacity(bytes.len() * 8 + 2);
    if alphabet.contains(&InputSymbol::StartOfFile) {
        inputs.push(InputSymbol::StartOfFile);
    }
    inputs.extend(unpack_bits(bytes, order).into_iter().map(InputSymbol::Bit));
    if alphabet.contains(&InputSymbol::EndOfFile) {
        inputs.push(InputSymbol::EndOfFile);
    }
    inputs
}

pub fn encode_bytes(machine: &Machine, bytes: &[u8], order: BitOrder) -> Result<String> {
    encode_inputs(machine, byte_inputs(machine, bytes, order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::MachineBuilder;
    use crate::symbol::parse_inputs;

    /// S emits A/C for 0/1 via a silent hop through H; `$` ends.
    fn hop_machine() -> Machine {
        let mut b = MachineBuilder::new();
        let s = b.add_state("S");
        let h = b.add_state("H");
        let e = b.add_state("E");
        b.add_transition(s, h, None, Some('G'), 0.0)
            .add_transition(h, s, Some(InputSymbol::BIT0), Some('A'), 0.0)
            .add_transition(h, s, Some(InputSymbol::BIT1), Some('C'), 0.0)
            .add_transition(h, e, Some(InputSymbol::EndOfFile), None, 0.0);
        b.build().unwrap()
    }

    #[test]
    fn silent_inputs_are_followed() {
        let m = hop_machine();
        assert_eq!(encode_inputs(&m, parse_inputs("01$")).unwrap(), "GAGCG");
    }

    #[test]
    fn unconsumable_symbol_is_reported() {
        let m = hop_machine();
        let err = encode_inputs(&m, parse_inputs("0^")).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Unencodable { ref state, ref symbol } if state == "H" && symbol == "^"
        ));
    }

    #[test]
    fn finish_requires_reaching_an_end_state() {
        let m = hop_machine();
        let mut encoder = Encoder::new(&m);
        encoder.encode_symbol(InputSymbol::BIT1).unwrap();
        assert!(encoder.finish().is_err());
    }

    #[test]
    fn byte_inputs_frame_with_markers() {
        let m = hop_machine();
        let inputs = byte_inputs(&m, &[0x01], BitOrder::Msb0);
        assert_eq!(inputs, parse_inputs("00000001$"));
    }
}
