use std::sync::Arc;

use crate::error::Result;
use crate::input_model::InputModel;
use crate::machine::Machine;
use crate::mutator::MutatorParams;
use crate::scores::MachineScores;
use crate::viterbi::ViterbiMatrix;

/// Configures the channel once and fills a [`ViterbiMatrix`] per observed
/// sequence, sharing the machine scores between them.
pub struct MatrixBuilder<'a> {
    machine: &'a Machine,
    input_model: Option<InputModel>,
    params: MutatorParams,
    scores: Option<Arc<MachineScores>>,
}

impl<'a> MatrixBuilder<'a> {
    pub fn new(machine: &'a Machine) -> Self {
        Self {
            machine,
            input_model: None,
            params: MutatorParams::default(),
            scores: None,
        }
    }

    /// Defaults to a flat model when not set.
    pub fn with_input_model(mut self, input_model: InputModel) -> Self {
        self.input_model = Some(input_model);
        self.scores = None;
        self
    }

    pub fn with_mutator(mut self, params: MutatorParams) -> Self {
        self.params = params;
        self.scores = None;
        self
    }

    pub fn params(&self) -> &MutatorParams {
        &self.params
    }

    /// Validate the configuration and precompute machine scores.
    pub fn prepare(&mut self) -> Result<Arc<MachineScores>> {
        if let Some(scores) = &self.scores {
            return Ok(Arc::clone(scores));
        }
        let model = self.input_model.clone().unwrap_or_default();
        let scores = Arc::new(MachineScores::new(self.machine, &model, &self.params)?);
        self.scores = Some(Arc::clone(&scores));
        Ok(scores)
    }

    pub fn build(&mut self, seq: &str) -> Result<ViterbiMatrix> {
        let scores = self.prepare()?;
        ViterbiMatrix::from_scores(scores, &self.params, seq)
    }
}
