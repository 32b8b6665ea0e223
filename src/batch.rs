//! Decoding many independent records against one machine.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::input_model::InputModel;
use crate::machine::Machine;
use crate::mutator::MutatorParams;
use crate::scores::MachineScores;
use crate::symbol::InputSymbol;
use crate::viterbi::ViterbiMatrix;

/// Named observed sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub seq: String,
}

impl Record {
    pub fn new(name: impl Into<String>, seq: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seq: seq.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Decoded {
    pub name: String,
    pub loglike: f64,
    pub inputs: Vec<InputSymbol>,
}

/// Viterbi-decode every record. Results are in input order; a failing
/// record does not stop the others.
pub fn decode_batch(
    machine: &Machine,
    input_model: &InputModel,
    params: &MutatorParams,
    records: &[Record],
) -> Result<Vec<Result<Decoded>>> {
    let scores = Arc::new(MachineScores::new(machine, input_model, params)?);
    info!(records = records.len(), "decoding batch");
    Ok(run(&scores, params, records))
}

fn decode_one(
    scores: &Arc<MachineScores>,
    params: &MutatorParams,
    record: &Record,
) -> Result<Decoded> {
    let span = tracing::trace_span!("decode_record", name = %record.name);
    let _enter = span.enter();
    let matrix = ViterbiMatrix::from_scores(Arc::clone(scores), params, &record.seq)?;
    let inputs = matrix.traceback().map_err(|err| {
        warn!(name = %record.name, error = %err, "record failed to decode");
        err
    })?;
    Ok(Decoded {
        name: record.name.clone(),
        loglike: matrix.loglike(),
        inputs,
    })
}

#[cfg(feature = "parallel")]
fn run(
    scores: &Arc<MachineScores>,
    params: &MutatorParams,
    records: &[Record],
) -> Vec<Result<Decoded>> {
    use rayon::prelude::*;

    records
        .par_iter()
        .map(|record| decode_one(scores, params, record))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn run(
    scores: &Arc<MachineScores>,
    params: &MutatorParams,
    records: &[Record],
) -> Vec<Result<Decoded>> {
    records
        .iter()
        .map(|record| decode_one(scores, params, record))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::machine::MachineBuilder;
    use crate::symbol::parse_inputs;

    #[test]
    fn failures_stay_with_their_record() {
        let mut b = MachineBuilder::new();
        let s = b.add_state("S");
        let e = b.add_state("E");
        b.add_transition(s, s, Some(InputSymbol::BIT0), Some('A'), 0.0)
            .add_transition(s, s, Some(InputSymbol::BIT1), Some('T'), 0.0)
            .add_transition(s, e, Some(InputSymbol::EndOfFile), None, 0.0);
        let m = b.build().unwrap();

        let records = vec![
            Record::new("ok", "ATA"),
            Record::new("bad-base", "AXA"),
            Record::new("no-path", "AGA"),
        ];
        let out = decode_batch(&m, &InputModel::flat(), &MutatorParams::noiseless(), &records)
            .unwrap();
        assert_eq!(out.len(), 3);
        let first = out[0].as_ref().unwrap();
        assert_eq!(first.name, "ok");
        assert_eq!(first.inputs, parse_inputs("010$"));
        assert!(matches!(out[1], Err(DecodeError::UnknownBase { symbol: 'X', pos: 1 })));
        assert!(matches!(out[2], Err(DecodeError::NoPath)));
    }
}
