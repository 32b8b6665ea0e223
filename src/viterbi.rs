//! Maximum-likelihood decoding through the mutation channel.
//!
//! The matrix has one cell per `(state, pos, sub)`: `state` is a machine
//! state, `pos` the number of observed bases consumed, and `sub` the channel
//! phase. `Plain` cells have emitted everything the machine produced so far,
//! `Deletion` cells are inside a run of deleted bases, and `TandemRepeat(i)`
//! cells are re-emitting a copy of the state's left context with `i` bases of
//! the copy still to come.
//!
//! Each position is filled in two phases. Cells reached by consuming an
//! observed base are computed from the previous position; then the cells
//! reachable without consuming anything (silent transitions and deletions)
//! are settled best-first, which handles cycles among them because every
//! weight is a log-probability.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{DecodeError, Result};
use crate::input_model::InputModel;
use crate::machine::Machine;
use crate::mutator::{MutatorParams, MutatorScores, TokSeq};
use crate::scores::{EdgeKind, MachineScores};
use crate::symbol::{InputSymbol, StateId};

/// Channel phase of a matrix cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubState {
    Plain,
    Deletion,
    /// Duplicating the left context; the offset counts back from its end.
    TandemRepeat(usize),
}

impl SubState {
    #[inline]
    pub fn slot(self) -> usize {
        match self {
            SubState::Plain => 0,
            SubState::Deletion => 1,
            SubState::TandemRepeat(i) => 2 + i,
        }
    }

    #[inline]
    pub fn from_slot(slot: usize) -> Self {
        match slot {
            0 => SubState::Plain,
            1 => SubState::Deletion,
            n => SubState::TandemRepeat(n - 2),
        }
    }
}

impl fmt::Display for SubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubState::Plain => f.write_str("S"),
            SubState::Deletion => f.write_str("D"),
            SubState::TandemRepeat(i) => write!(f, "T{i}"),
        }
    }
}

/// Total-ordering wrapper for f64 to satisfy `Ord` (NaN-safe via `total_cmp`).
#[derive(Clone, Copy, Debug)]
pub struct TotalF64(pub f64);

impl PartialEq for TotalF64 {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}
impl Eq for TotalF64 {}
impl PartialOrd for TotalF64 {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TotalF64 {
    #[inline]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}
impl fmt::Display for TotalF64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shape of the cell table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub n_states: usize,
    pub max_dup_len: usize,
    pub seq_len: usize,
}

impl Layout {
    /// Sub-states per `(state, pos)`.
    #[inline]
    pub fn width(&self) -> usize {
        self.max_dup_len + 2
    }

    #[inline]
    pub fn n_cells(&self) -> Option<usize> {
        self.width()
            .checked_mul(self.n_states)?
            .checked_mul(self.seq_len.checked_add(1)?)
    }

    #[inline]
    pub fn index(&self, state: StateId, pos: usize, sub: SubState) -> usize {
        self.width() * (pos * self.n_states + state) + sub.slot()
    }
}

/// How a cell got its value. `k` indexes the incoming list of the cell's
/// state (emit or null, according to the step).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Unset,
    Origin,
    /// Plain cell from `from` at the previous position via emit `k`.
    Match { from: SubState, k: usize },
    /// Deletion cell from `from` at the same position via emit `k`.
    Delete { from: SubState, k: usize },
    /// Same sub-state at the same position via null `k`.
    Null { k: usize },
    DupStart,
    DupContinue,
    DupEnd,
}

/// One cell on the traceback path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlignedCell {
    pub state: StateId,
    pub pos: usize,
    pub sub: SubState,
    pub score: f64,
}

pub struct ViterbiMatrix {
    scores: Arc<MachineScores>,
    mutator: MutatorScores,
    seq: TokSeq,
    layout: Layout,
    cells: Vec<f64>,
    steps: Vec<Step>,
    loglike: f64,
    final_cell: Option<(StateId, SubState)>,
}

impl ViterbiMatrix {
    /// Fill the matrix for `seq` observed through the channel described by
    /// `params`.
    pub fn new(
        machine: &Machine,
        input_model: &InputModel,
        params: &MutatorParams,
        seq: &str,
    ) -> Result<Self> {
        let scores = MachineScores::new(machine, input_model, params)?;
        Self::from_scores(Arc::new(scores), params, seq)
    }

    /// Fill the matrix reusing precomputed machine scores. `params` must
    /// describe the channel the scores were built for.
    pub fn from_scores(
        scores: Arc<MachineScores>,
        params: &MutatorParams,
        seq: &str,
    ) -> Result<Self> {
        params.validate()?;
        scores.check_params(params)?;
        let seq = params.tokenize(seq)?;
        let layout = Layout {
            n_states: scores.n_states(),
            max_dup_len: params.max_dup_len(),
            seq_len: seq.len(),
        };
        let n_cells = layout.n_cells().ok_or_else(|| {
            DecodeError::InvalidParameter(format!(
                "matrix for {} states and {} bases does not fit in memory",
                layout.n_states, layout.seq_len
            ))
        })?;
        let mut matrix = Self {
            scores,
            mutator: MutatorScores::new(params),
            seq,
            layout,
            cells: vec![f64::NEG_INFINITY; n_cells],
            steps: vec![Step::Unset; n_cells],
            loglike: f64::NEG_INFINITY,
            final_cell: None,
        };
        matrix.fill();
        Ok(matrix)
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    #[inline]
    pub fn n_states(&self) -> usize {
        self.layout.n_states
    }

    #[inline]
    pub fn seq_len(&self) -> usize {
        self.layout.seq_len
    }

    #[inline]
    pub fn max_dup_len(&self) -> usize {
        self.layout.max_dup_len
    }

    /// Longest duplication that can start at `state`.
    #[inline]
    pub fn max_dup_len_at(&self, state: StateId) -> usize {
        self.layout
            .max_dup_len
            .min(self.scores.state(state).left_context.len())
    }

    pub fn machine_scores(&self) -> &MachineScores {
        &self.scores
    }

    /// Log-likelihood of the best path; `-inf` when there is none.
    #[inline]
    pub fn loglike(&self) -> f64 {
        self.loglike
    }

    #[inline]
    pub fn cell(&self, state: StateId, pos: usize, sub: SubState) -> f64 {
        self.cells[self.layout.index(state, pos, sub)]
    }

    #[inline]
    pub fn s_cell(&self, state: StateId, pos: usize) -> f64 {
        self.cell(state, pos, SubState::Plain)
    }

    #[inline]
    pub fn d_cell(&self, state: StateId, pos: usize) -> f64 {
        self.cell(state, pos, SubState::Deletion)
    }

    #[inline]
    pub fn t_cell(&self, state: StateId, pos: usize, offset: usize) -> f64 {
        self.cell(state, pos, SubState::TandemRepeat(offset))
    }

    /// Most likely input sequence, in forward order.
    pub fn traceback(&self) -> Result<Vec<InputSymbol>> {
        let span = tracing::info_span!("traceback", len = self.layout.seq_len);
        let _enter = span.enter();
        Ok(self
            .walk()?
            .into_iter()
            .filter_map(|(_, input)| input)
            .collect())
    }

    /// Cells on the best path, from the origin to the final cell.
    pub fn alignment(&self) -> Result<Vec<AlignedCell>> {
        Ok(self.walk()?.into_iter().map(|(cell, _)| cell).collect())
    }

    fn fill(&mut self) {
        let span = tracing::info_span!(
            "viterbi_fill",
            states = self.layout.n_states,
            len = self.layout.seq_len,
            max_dup_len = self.layout.max_dup_len
        );
        let _enter = span.enter();

        let origin = self.layout.index(self.scores.start, 0, SubState::Plain);
        self.cells[origin] = 0.0;
        self.steps[origin] = Step::Origin;
        self.relax(0);
        for pos in 1..=self.layout.seq_len {
            self.fill_tandem(pos);
            self.fill_plain(pos);
            self.relax(pos);
        }
        self.pick_final_cell();
        debug!(loglike = self.loglike, "viterbi fill complete");
    }

    #[inline]
    fn offer(&mut self, idx: usize, score: f64, step: Step) -> bool {
        if score > self.cells[idx] {
            self.cells[idx] = score;
            self.steps[idx] = step;
            true
        } else {
            false
        }
    }

    fn fill_tandem(&mut self, pos: usize) {
        let layout = self.layout;
        let obs = self.seq[pos - 1];
        let scores = Arc::clone(&self.scores);
        for d in 0..layout.n_states {
            let ctx = &scores.state(d).left_context;
            let max_len = layout.max_dup_len.min(ctx.len());
            let from_plain = self.cells[layout.index(d, pos - 1, SubState::Plain)];
            for i in 0..max_len {
                let emit = self.mutator.sub[ctx[ctx.len() - 1 - i]][obs];
                let idx = layout.index(d, pos, SubState::TandemRepeat(i));
                let start = from_plain + self.mutator.tan_dup + self.mutator.dup_len[i] + emit;
                self.offer(idx, start, Step::DupStart);
                if i + 1 < max_len {
                    let prev = self.cells[layout.index(d, pos - 1, SubState::TandemRepeat(i + 1))];
                    self.offer(idx, prev + emit, Step::DupContinue);
                }
            }
        }
    }

    fn fill_plain(&mut self, pos: usize) {
        let layout = self.layout;
        let obs = self.seq[pos - 1];
        let scores = Arc::clone(&self.scores);
        for d in 0..layout.n_states {
            let idx = layout.index(d, pos, SubState::Plain);
            let emit = &scores.state(d).emit;
            for (from, gap) in [
                (SubState::Plain, self.mutator.no_gap),
                (SubState::Deletion, self.mutator.del_end),
            ] {
                for (k, t) in emit.iter().enumerate() {
                    let Some(base) = t.base else { continue };
                    let prev = self.cells[layout.index(t.src, pos - 1, from)];
                    let score = prev + gap + t.score + self.mutator.sub[base][obs];
                    self.offer(idx, score, Step::Match { from, k });
                }
            }
            if self.max_dup_len_at(d) > 0 {
                let dup = self.cells[layout.index(d, pos, SubState::TandemRepeat(0))];
                self.offer(idx, dup, Step::DupEnd);
            }
        }
    }

    /// Settle the cells reachable at `pos` without consuming a base.
    fn relax(&mut self, pos: usize) {
        let span = tracing::trace_span!("relax", pos);
        let _enter = span.enter();

        let layout = self.layout;
        let n = layout.n_states;
        let scores = Arc::clone(&self.scores);
        let mut settled = vec![false; 2 * n];
        // Max-heap on score; ties pop Plain before Deletion, then lower ids.
        let mut heap = BinaryHeap::new();
        for sub in [SubState::Plain, SubState::Deletion] {
            for s in 0..n {
                let v = self.cells[layout.index(s, pos, sub)];
                if v > f64::NEG_INFINITY {
                    heap.push((TotalF64(v), Reverse(sub.slot()), Reverse(s)));
                }
            }
        }

        while let Some((TotalF64(score), Reverse(slot), Reverse(src))) = heap.pop() {
            if settled[slot * n + src] {
                continue;
            }
            settled[slot * n + src] = true;
            let sub = SubState::from_slot(slot);
            for &edge in scores.outgoing(src) {
                let t = scores.edge(edge);
                let (dest_sub, cand, step) = match edge.kind {
                    EdgeKind::Null => (sub, score + t.score, Step::Null { k: edge.index }),
                    EdgeKind::Emit => {
                        let gap = match sub {
                            SubState::Plain => self.mutator.del_open,
                            _ => self.mutator.del_extend,
                        };
                        (
                            SubState::Deletion,
                            score + gap + t.score,
                            Step::Delete {
                                from: sub,
                                k: edge.index,
                            },
                        )
                    }
                };
                if settled[dest_sub.slot() * n + edge.dest] {
                    continue;
                }
                let idx = layout.index(edge.dest, pos, dest_sub);
                if self.offer(idx, cand, step) {
                    heap.push((TotalF64(cand), Reverse(dest_sub.slot()), Reverse(edge.dest)));
                }
            }
        }
    }

    fn pick_final_cell(&mut self) {
        let pos = self.layout.seq_len;
        let mut best = f64::NEG_INFINITY;
        let mut cell = None;
        for &e in &self.scores.end_states {
            for slot in 0..self.layout.width() {
                let sub = SubState::from_slot(slot);
                let v = self.cell(e, pos, sub);
                if v > best {
                    best = v;
                    cell = Some((e, sub));
                }
            }
        }
        self.loglike = best;
        self.final_cell = cell;
    }

    /// Follow backpointers from the final cell to the origin. Each cell is
    /// paired with the input consumed by the step into it.
    fn walk(&self) -> Result<Vec<(AlignedCell, Option<InputSymbol>)>> {
        let (mut state, mut sub) = self.final_cell.ok_or(DecodeError::NoPath)?;
        let mut pos = self.layout.seq_len;
        let mut path = Vec::new();
        loop {
            let idx = self.layout.index(state, pos, sub);
            let cell = AlignedCell {
                state,
                pos,
                sub,
                score: self.cells[idx],
            };
            let missing = DecodeError::MissingPredecessor { state, pos, sub };
            let ss = self.scores.state(state);
            let (prev, input) = match self.steps[idx] {
                Step::Origin => {
                    path.push((cell, None));
                    break;
                }
                Step::Unset => return Err(missing),
                Step::Match { from, k } => {
                    let t = &ss.emit[k];
                    ((t.src, pos - 1, from), t.input)
                }
                Step::Delete { from, k } => {
                    let t = &ss.emit[k];
                    ((t.src, pos, from), t.input)
                }
                Step::Null { k } => {
                    let t = &ss.null[k];
                    ((t.src, pos, sub), t.input)
                }
                Step::DupStart => ((state, pos - 1, SubState::Plain), None),
                Step::DupContinue => match sub {
                    SubState::TandemRepeat(i) => {
                        ((state, pos - 1, SubState::TandemRepeat(i + 1)), None)
                    }
                    _ => return Err(missing),
                },
                Step::DupEnd => ((state, pos, SubState::TandemRepeat(0)), None),
            };
            path.push((cell, input));
            (state, pos, sub) = prev;
        }
        path.reverse();
        Ok(path)
    }
}

impl fmt::Debug for ViterbiMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViterbiMatrix")
            .field("layout", &self.layout)
            .field("loglike", &self.loglike)
            .field("final_cell", &self.final_cell)
            .finish()
    }
}
