//! In-memory transducer representation.
//!
//! States are dense indices; state 0 is the start state. Flags that the
//! decoders consult (`is_end`, `emits_output`, `exits_with_input`) are derived
//! from the outgoing transitions.

use std::collections::BTreeSet;

use crate::error::{DecodeError, Result};
use crate::symbol::{is_usable, InputSymbol, OutputSymbol, StateId};

/// Edge of the machine.
#[derive(Clone, Debug, PartialEq)]
pub struct MachineTransition {
    pub dest: StateId,
    /// `None` is the null input.
    pub input: Option<InputSymbol>,
    /// `None` is a silent edge.
    pub output: Option<OutputSymbol>,
    /// Natural-log transition weight; `0.0` for unweighted machines.
    pub log_prob: f64,
}

impl MachineTransition {
    pub fn new(
        dest: StateId,
        input: Option<InputSymbol>,
        output: Option<OutputSymbol>,
        log_prob: f64,
    ) -> Self {
        Self {
            dest,
            input,
            output,
            log_prob,
        }
    }

    #[inline]
    pub fn input_empty(&self) -> bool {
        self.input.is_none()
    }

    #[inline]
    pub fn output_empty(&self) -> bool {
        self.output.is_none()
    }

    #[inline]
    pub fn is_usable(&self) -> bool {
        is_usable(self.input)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MachineState {
    pub name: String,
    pub trans: Vec<MachineTransition>,
}

impl MachineState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trans: Vec::new(),
        }
    }

    /// Terminal states have no way out.
    pub fn is_end(&self) -> bool {
        self.trans.is_empty()
    }

    pub fn emits_output(&self) -> bool {
        self.trans.iter().any(|t| !t.output_empty())
    }

    pub fn exits_with_input(&self) -> bool {
        self.trans.iter().any(|t| !t.input_empty())
    }
}

/// A validated transducer.
#[derive(Clone, Debug, PartialEq)]
pub struct Machine {
    states: Vec<MachineState>,
}

impl Machine {
    /// Validate and wrap a list of states.
    ///
    /// Rejects an empty state list, dangling destinations, and weights that
    /// are NaN or positive.
    pub fn new(states: Vec<MachineState>) -> Result<Self> {
        if states.is_empty() {
            return Err(DecodeError::InvalidMachine("machine has no states".into()));
        }
        let n = states.len();
        for (s, state) in states.iter().enumerate() {
            for t in &state.trans {
                if t.dest >= n {
                    return Err(DecodeError::InvalidMachine(format!(
                        "transition from {} (#{s}) to nonexistent state #{}",
                        state.name, t.dest
                    )));
                }
                if t.log_prob.is_nan() || t.log_prob > 0.0 {
                    return Err(DecodeError::InvalidMachine(format!(
                        "transition from {} to {} has log-probability {}",
                        state.name, states[t.dest].name, t.log_prob
                    )));
                }
            }
        }
        Ok(Self { states })
    }

    #[inline]
    pub fn start_state(&self) -> StateId {
        0
    }

    #[inline]
    pub fn n_states(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub fn state(&self, id: StateId) -> &MachineState {
        &self.states[id]
    }

    pub fn states(&self) -> &[MachineState] {
        &self.states
    }

    pub fn state_name(&self, id: StateId) -> &str {
        &self.states[id].name
    }

    /// Usable, non-null input symbols appearing anywhere in the machine.
    pub fn input_alphabet(&self) -> Vec<InputSymbol> {
        self.states
            .iter()
            .flat_map(|s| s.trans.iter())
            .filter(|t| t.is_usable())
            .filter_map(|t| t.input)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Output symbols appearing anywhere in the machine.
    pub fn output_alphabet(&self) -> Vec<OutputSymbol> {
        self.states
            .iter()
            .flat_map(|s| s.trans.iter())
            .filter_map(|t| t.output)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Incremental construction of a [`Machine`].
#[derive(Debug, Default)]
pub struct MachineBuilder {
    states: Vec<MachineState>,
}

impl MachineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a state and return its id. The first state added is the start.
    pub fn add_state(&mut self, name: impl Into<String>) -> StateId {
        self.states.push(MachineState::new(name));
        self.states.len() - 1
    }

    /// Append a transition; destinations are checked in [`build`](Self::build).
    ///
    /// # Panics
    /// Panics if `src` has not been added.
    pub fn add_transition(
        &mut self,
        src: StateId,
        dest: StateId,
        input: Option<InputSymbol>,
        output: Option<OutputSymbol>,
        log_prob: f64,
    ) -> &mut Self {
        self.states[src]
            .trans
            .push(MachineTransition::new(dest, input, output, log_prob));
        self
    }

    pub fn n_states(&self) -> usize {
        self.states.len()
    }

    pub fn build(self) -> Result<Machine> {
        Machine::new(self.states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_state() -> MachineBuilder {
        let mut b = MachineBuilder::new();
        let s = b.add_state("S");
        let e = b.add_state("E");
        b.add_transition(s, s, Some(InputSymbol::BIT0), Some('A'), 0.5f64.ln())
            .add_transition(s, s, Some(InputSymbol::BIT1), Some('C'), 0.5f64.ln())
            .add_transition(s, e, Some(InputSymbol::EndOfFile), None, 0.0);
        b
    }

    #[test]
    fn derived_flags() {
        let m = two_state().build().unwrap();
        assert_eq!(m.start_state(), 0);
        let s = m.state(0);
        assert!(s.emits_output());
        assert!(s.exits_with_input());
        assert!(!s.is_end());
        assert!(m.state(1).is_end());
        assert!(!m.state(1).emits_output());
    }

    #[test]
    fn alphabets_are_sorted_and_unique() {
        let m = two_state().build().unwrap();
        assert_eq!(
            m.input_alphabet(),
            vec![
                InputSymbol::BIT0,
                InputSymbol::BIT1,
                InputSymbol::EndOfFile
            ]
        );
        assert_eq!(m.output_alphabet(), vec!['A', 'C']);
    }

    #[test]
    fn rejects_dangling_destination() {
        let mut b = two_state();
        b.add_transition(1, 7, None, None, 0.0);
        assert!(matches!(b.build(), Err(DecodeError::InvalidMachine(_))));
    }

    #[test]
    fn rejects_positive_or_nan_weights() {
        let mut b = two_state();
        b.add_transition(1, 0, None, None, 0.3);
        assert!(b.build().is_err());

        let mut b = two_state();
        b.add_transition(1, 0, None, None, f64::NAN);
        assert!(b.build().is_err());
    }

    #[test]
    fn rejects_empty_machine() {
        assert!(Machine::new(Vec::new()).is_err());
    }
}
