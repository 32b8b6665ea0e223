//! Prior over input symbols.

use std::collections::BTreeMap;

use crate::error::{DecodeError, Result};
use crate::machine::Machine;
use crate::symbol::InputSymbol;
use crate::utils::log_prob;

/// Probability of each input symbol, independent of the machine's own
/// transition weights.
///
/// An empty model is flat: every symbol scores `ln 1 = 0`. A non-empty
/// model gives symbols outside its alphabet probability zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputModel {
    sym_prob: BTreeMap<InputSymbol, f64>,
}

impl InputModel {
    /// Control symbols share `control_prob` equally; the remaining mass is
    /// split equally among the other symbols. With no control symbols in
    /// the alphabet, all mass goes to the others. Use [`InputModel::flat`]
    /// for a model without an alphabet.
    pub fn new(alphabet: &[InputSymbol], control_prob: f64) -> Result<Self> {
        if alphabet.is_empty() {
            return Err(DecodeError::InvalidParameter("input alphabet is empty".into()));
        }
        if !(0.0..=1.0).contains(&control_prob) {
            return Err(DecodeError::InvalidParameter(format!(
                "control probability {control_prob} outside [0, 1]"
            )));
        }
        let n_control = alphabet.iter().filter(|s| s.is_control()).count();
        let n_data = alphabet.len() - n_control;
        let (control_mass, data_mass) = match (n_control, n_data) {
            (0, _) => (0.0, 1.0),
            (_, 0) => (1.0, 0.0),
            _ => (control_prob, 1.0 - control_prob),
        };
        let sym_prob = alphabet
            .iter()
            .map(|&sym| {
                let p = if sym.is_control() {
                    control_mass / n_control as f64
                } else {
                    data_mass / n_data as f64
                };
                (sym, p)
            })
            .collect();
        Ok(Self { sym_prob })
    }

    /// Model over the usable input alphabet of `machine`.
    pub fn from_machine(machine: &Machine, control_prob: f64) -> Result<Self> {
        Self::new(&machine.input_alphabet(), control_prob)
    }

    /// Model that leaves transition weights untouched.
    pub fn flat() -> Self {
        Self::default()
    }

    pub fn is_flat(&self) -> bool {
        self.sym_prob.is_empty()
    }

    pub fn prob(&self, sym: InputSymbol) -> f64 {
        if self.is_flat() {
            1.0
        } else {
            self.sym_prob.get(&sym).copied().unwrap_or(0.0)
        }
    }

    pub fn log_prob(&self, sym: InputSymbol) -> f64 {
        log_prob(self.prob(sym))
    }

    pub fn symbols(&self) -> impl Iterator<Item = (InputSymbol, f64)> + '_ {
        self.sym_prob.iter().map(|(&s, &p)| (s, p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_mass_between_control_and_data() {
        let alphabet = [
            InputSymbol::BIT0,
            InputSymbol::BIT1,
            InputSymbol::Control(0),
            InputSymbol::Control(1),
        ];
        let model = InputModel::new(&alphabet, 0.1).unwrap();
        assert!((model.prob(InputSymbol::BIT0) - 0.45).abs() < 1e-12);
        assert!((model.prob(InputSymbol::Control(1)) - 0.05).abs() < 1e-12);
        let total: f64 = model.symbols().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(model.log_prob(InputSymbol::EndOfFile), f64::NEG_INFINITY);
    }

    #[test]
    fn data_only_alphabet_ignores_control_mass() {
        let model = InputModel::new(&[InputSymbol::BIT0, InputSymbol::BIT1], 0.3).unwrap();
        assert!((model.prob(InputSymbol::BIT1) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn flat_model_scores_zero() {
        let model = InputModel::flat();
        assert_eq!(model.log_prob(InputSymbol::Control(9)), 0.0);
        assert_eq!(model.log_prob(InputSymbol::BIT0), 0.0);
    }

    #[test]
    fn rejects_bad_control_probability() {
        assert!(InputModel::new(&[InputSymbol::BIT0], 1.5).is_err());
        assert!(InputModel::new(&[InputSymbol::BIT0], f64::NAN).is_err());
    }

    #[test]
    fn rejects_empty_alphabet() {
        assert!(matches!(
            InputModel::new(&[], 0.0),
            Err(DecodeError::InvalidParameter(_))
        ));
    }
}
