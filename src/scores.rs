//! Per-state scoring tables for the Viterbi fill.
//!
//! For every state we collect the usable transitions that enter it, split by
//! whether they emit a base, with the log-probability increment already
//! combined with the input prior. Each state also gets a *left context*: the
//! bases that every path into the state ends with, which is what a tandem
//! duplication at that state copies.

use std::collections::VecDeque;

use crate::error::{DecodeError, Result};
use crate::input_model::InputModel;
use crate::machine::Machine;
use crate::mutator::{Base, MutatorParams};
use crate::symbol::{InputSymbol, StateId};
use crate::utils::common_suffix_len;

#[derive(Clone, Debug, PartialEq)]
pub struct IncomingTransScore {
    pub src: StateId,
    /// Transition weight plus input prior.
    pub score: f64,
    pub input: Option<InputSymbol>,
    /// Emitted base; `None` on silent transitions.
    pub base: Option<Base>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateScores {
    /// Most recent base last, at most `max_dup_len` long.
    pub left_context: Vec<Base>,
    pub emit: Vec<IncomingTransScore>,
    pub null: Vec<IncomingTransScore>,
}

impl StateScores {
    /// Base emitted on entry to this state, when every path agrees on it.
    pub fn base(&self) -> Option<Base> {
        self.left_context.last().copied()
    }

    pub fn incoming(&self, kind: EdgeKind) -> &[IncomingTransScore] {
        match kind {
            EdgeKind::Emit => &self.emit,
            EdgeKind::Null => &self.null,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    Emit,
    Null,
}

/// Forward view of an incoming entry: `state_scores[dest].incoming(kind)[index]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutgoingRef {
    pub dest: StateId,
    pub kind: EdgeKind,
    pub index: usize,
}

#[derive(Clone, Debug)]
pub struct MachineScores {
    pub state_scores: Vec<StateScores>,
    pub start: StateId,
    /// End states in id order.
    pub end_states: Vec<StateId>,
    outgoing: Vec<Vec<OutgoingRef>>,
    /// Channel alphabet the base indices refer to.
    alphabet: Vec<char>,
    /// Cap applied to every left context.
    max_dup_len: usize,
}

impl MachineScores {
    pub fn new(
        machine: &Machine,
        input_model: &InputModel,
        params: &MutatorParams,
    ) -> Result<Self> {
        params.validate()?;
        let n = machine.n_states();
        let mut state_scores = vec![StateScores::default(); n];
        let mut outgoing = vec![Vec::new(); n];

        for (src, state) in machine.states().iter().enumerate() {
            for t in state.trans.iter().filter(|t| t.is_usable()) {
                let prior = t.input.map_or(0.0, |sym| input_model.log_prob(sym));
                let base = match t.output {
                    Some(c) => Some(params.base_index(c).ok_or_else(|| {
                        DecodeError::InvalidMachine(format!(
                            "output '{c}' of {} is not in the channel alphabet",
                            state.name
                        ))
                    })?),
                    None => None,
                };
                let its = IncomingTransScore {
                    src,
                    score: t.log_prob + prior,
                    input: t.input,
                    base,
                };
                let dest = &mut state_scores[t.dest];
                let (kind, list) = if base.is_some() {
                    (EdgeKind::Emit, &mut dest.emit)
                } else {
                    (EdgeKind::Null, &mut dest.null)
                };
                outgoing[src].push(OutgoingRef {
                    dest: t.dest,
                    kind,
                    index: list.len(),
                });
                list.push(its);
            }
        }

        let mut scores = Self {
            state_scores,
            start: machine.start_state(),
            end_states: (0..n).filter(|&s| machine.state(s).is_end()).collect(),
            outgoing,
            alphabet: params.alphabet.clone(),
            max_dup_len: params.max_dup_len(),
        };
        let contexts = scores.infer_left_contexts(scores.start, params.max_dup_len());
        for (ss, ctx) in scores.state_scores.iter_mut().zip(contexts) {
            ss.left_context = ctx;
        }
        Ok(scores)
    }

    /// Fail unless `params` has the alphabet and duplication window these
    /// scores were built with.
    pub fn check_params(&self, params: &MutatorParams) -> Result<()> {
        if params.alphabet != self.alphabet {
            return Err(DecodeError::InvalidParameter(format!(
                "channel alphabet {:?} differs from the scored alphabet {:?}",
                params.alphabet, self.alphabet
            )));
        }
        if params.max_dup_len() != self.max_dup_len {
            return Err(DecodeError::InvalidParameter(format!(
                "duplication window {} differs from the scored window {}",
                params.max_dup_len(),
                self.max_dup_len
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn max_dup_len(&self) -> usize {
        self.max_dup_len
    }

    #[inline]
    pub fn n_states(&self) -> usize {
        self.state_scores.len()
    }

    #[inline]
    pub fn state(&self, s: StateId) -> &StateScores {
        &self.state_scores[s]
    }

    #[inline]
    pub fn outgoing(&self, s: StateId) -> &[OutgoingRef] {
        &self.outgoing[s]
    }

    #[inline]
    pub fn edge(&self, edge: OutgoingRef) -> &IncomingTransScore {
        &self.state_scores[edge.dest].incoming(edge.kind)[edge.index]
    }

    /// Longest common suffix of emitted bases over all paths into each
    /// state, capped at `max_len`. The start state's context is empty, and
    /// so is that of any unreachable state.
    fn infer_left_contexts(&self, start: StateId, max_len: usize) -> Vec<Vec<Base>> {
        let n = self.n_states();
        let mut ctx: Vec<Option<Vec<Base>>> = vec![None; n];
        let mut queued = vec![false; n];
        let mut work = VecDeque::new();
        ctx[start] = Some(Vec::new());
        queued[start] = true;
        work.push_back(start);

        while let Some(src) = work.pop_front() {
            queued[src] = false;
            let Some(src_ctx) = ctx[src].clone() else {
                continue;
            };
            for &edge in self.outgoing(src) {
                let mut cand = src_ctx.clone();
                if let Some(base) = self.edge(edge).base {
                    cand.push(base);
                    if cand.len() > max_len {
                        cand.drain(..cand.len() - max_len);
                    }
                }
                let merged = match &ctx[edge.dest] {
                    None => cand,
                    Some(old) => {
                        let k = common_suffix_len(old, &cand);
                        old[old.len() - k..].to_vec()
                    }
                };
                if ctx[edge.dest].as_ref() != Some(&merged) {
                    ctx[edge.dest] = Some(merged);
                    if !queued[edge.dest] {
                        queued[edge.dest] = true;
                        work.push_back(edge.dest);
                    }
                }
            }
        }
        ctx.into_iter().map(Option::unwrap_or_default).collect()
    }
}
