//! Deterministic state-closure decoder.
//!
//! The decoder inverts the machine one observed output symbol at a time. It
//! keeps every state the machine could be in, each paired with the input
//! symbols that would have been read to get there but have not yet been
//! written out. Input is emitted as soon as it is unambiguous: either a single
//! hypothesis survives, or all hypotheses agree on the front of their queues.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use tracing::{trace, warn};

use crate::error::{DecodeError, Result};
use crate::machine::{Machine, MachineTransition};
use crate::symbol::{InputSymbol, OutputSymbol, StateId};
use crate::utils::join_symbols;

/// Input symbols read but not yet written to the sink.
pub type InputQueue = VecDeque<InputSymbol>;

/// Live hypotheses, keyed by state.
pub type HypothesisSet = BTreeMap<StateId, InputQueue>;

/// Destination for decoded input symbols.
pub trait SymbolSink {
    fn write_symbol(&mut self, sym: InputSymbol) -> Result<()>;
}

impl SymbolSink for Vec<InputSymbol> {
    fn write_symbol(&mut self, sym: InputSymbol) -> Result<()> {
        self.push(sym);
        Ok(())
    }
}

impl<S: SymbolSink + ?Sized> SymbolSink for &mut S {
    fn write_symbol(&mut self, sym: InputSymbol) -> Result<()> {
        (**self).write_symbol(sym)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnresolvedKind {
    /// Several end states were reachable when the stream closed.
    EndStates,
    /// No end state was reachable, but several states were live.
    LiveStates,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub state: StateId,
    pub name: String,
    pub queue: Vec<InputSymbol>,
}

/// Ambiguity left over at end of stream. Reported, not raised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unresolved {
    pub kind: UnresolvedKind,
    pub candidates: Vec<Candidate>,
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            UnresolvedKind::EndStates => "end states",
            UnresolvedKind::LiveStates => "states",
        };
        write!(f, "decoder unresolved: {} possible {what}", self.candidates.len())?;
        for c in &self.candidates {
            write!(f, "; state {}: input queue {}", c.name, join_symbols(&c.queue))?;
        }
        Ok(())
    }
}

/// Streaming decoder for an input-deterministic machine.
///
/// ```
/// use basecodec::{Decoder, MachineBuilder, InputSymbol};
///
/// let mut b = MachineBuilder::new();
/// let s = b.add_state("S");
/// let e = b.add_state("E");
/// b.add_transition(s, s, Some(InputSymbol::BIT0), Some('A'), 0.0)
///     .add_transition(s, s, Some(InputSymbol::BIT1), Some('C'), 0.0)
///     .add_transition(s, e, Some(InputSymbol::EndOfFile), None, 0.0);
/// let machine = b.build().unwrap();
///
/// let mut out: Vec<InputSymbol> = Vec::new();
/// let mut decoder = Decoder::new(&machine, &mut out).unwrap();
/// decoder.decode_str("caa").unwrap();
/// decoder.close().unwrap();
/// drop(decoder);
/// assert_eq!(basecodec::utils::join_symbols(&out), "100$");
/// ```
pub struct Decoder<'a, S: SymbolSink + ?Sized> {
    machine: &'a Machine,
    sink: &'a mut S,
    current: HypothesisSet,
}

impl<'a, S: SymbolSink + ?Sized> Decoder<'a, S> {
    /// Start from `{start state: empty queue}` and expand it.
    pub fn new(machine: &'a Machine, sink: &'a mut S) -> Result<Self> {
        let mut current = HypothesisSet::new();
        current.insert(machine.start_state(), InputQueue::new());
        let mut decoder = Self {
            machine,
            sink,
            current,
        };
        decoder.expand()?;
        Ok(decoder)
    }

    pub fn hypotheses(&self) -> &HypothesisSet {
        &self.current
    }

    /// True once the decoder holds no hypotheses (closed, or failed).
    pub fn is_closed(&self) -> bool {
        self.current.is_empty()
    }

    /// Replace the hypothesis set by its closure under silent transitions.
    ///
    /// On failure the decoder is left without hypotheses.
    pub fn expand(&mut self) -> Result<()> {
        let current = std::mem::take(&mut self.current);
        self.current = closure(self.machine, current)?;
        Ok(())
    }

    /// Consume one observed output symbol.
    ///
    /// After a fatal error the decoder holds no hypotheses, so later calls
    /// fail and [`close`](Self::close) is a no-op.
    pub fn decode_symbol(&mut self, out: OutputSymbol) -> Result<()> {
        trace!(symbol = %out, "decoding");
        let next = match self.step(out) {
            Ok(next) => next,
            Err(err) => {
                self.current.clear();
                return Err(err);
            }
        };
        self.current = next;
        self.expand()?;

        if self.current.len() == 1 {
            let unique = self
                .current
                .keys()
                .next()
                .copied()
                .filter(|&s| self.machine.state(s).exits_with_input());
            if let Some(state) = unique {
                self.flush(state)?;
            }
            Ok(())
        } else {
            self.shift_resolved_symbols()
        }
    }

    /// Decode every character of `seq`, upper-casing it first.
    pub fn decode_str(&mut self, seq: &str) -> Result<()> {
        for c in seq.chars() {
            self.decode_symbol(c.to_ascii_uppercase())?;
        }
        Ok(())
    }

    /// Finish the stream, flushing the unique end-state hypothesis.
    ///
    /// Leftover ambiguity is logged and returned, never raised. The
    /// hypothesis set is cleared, so calling this again does nothing.
    pub fn close(&mut self) -> Result<Option<Unresolved>> {
        if self.current.is_empty() {
            return Ok(None);
        }
        let outcome = self.finish_stream();
        self.current.clear();
        outcome
    }

    /// The front symbol shared by every queue, if all queues are non-empty
    /// and agree on it.
    pub fn consensus_front(&self) -> Option<InputSymbol> {
        let mut fronts = self.current.values().map(|q| q.front().copied());
        let first = fronts.next()??;
        fronts.all(|f| f == Some(first)).then_some(first)
    }

    fn step(&self, out: OutputSymbol) -> Result<HypothesisSet> {
        let mut next = HypothesisSet::new();
        for (&state, queue) in &self.current {
            let emitting = self
                .machine
                .state(state)
                .trans
                .iter()
                .filter(|t| t.is_usable() && t.output == Some(out));
            for t in emitting {
                let queue = extend_queue(queue, t);
                if let Some(prev) = next.get(&t.dest) {
                    if *prev != queue {
                        return Err(non_deterministic(self.machine, t.dest, prev, &queue));
                    }
                    continue;
                }
                trace!(
                    from = self.machine.state_name(state),
                    to = self.machine.state_name(t.dest),
                    queue = %join_symbols(&queue),
                    output = %out,
                    "transition"
                );
                next.insert(t.dest, queue);
            }
        }
        if next.is_empty() {
            return Err(DecodeError::NoUsableTransition {
                symbol: out,
                states: self
                    .current
                    .keys()
                    .map(|&s| self.machine.state_name(s).to_string())
                    .collect(),
            });
        }
        Ok(next)
    }

    fn shift_resolved_symbols(&mut self) -> Result<()> {
        while let Some(front) = self.consensus_front() {
            trace!(symbol = %front, "all input queues agree on first symbol; shifting");
            self.sink.write_symbol(front)?;
            for queue in self.current.values_mut() {
                queue.pop_front();
            }
        }
        Ok(())
    }

    fn flush(&mut self, state: StateId) -> Result<()> {
        let queue = match self.current.get_mut(&state) {
            Some(queue) => std::mem::take(queue),
            None => return Ok(()),
        };
        if !queue.is_empty() {
            trace!(queue = %join_symbols(&queue), "flushing input queue");
        }
        for sym in queue {
            self.sink.write_symbol(sym)?;
        }
        Ok(())
    }

    fn finish_stream(&mut self) -> Result<Option<Unresolved>> {
        self.expand()?;
        let machine = self.machine;
        let ends: Vec<StateId> = self
            .current
            .keys()
            .copied()
            .filter(|&s| machine.state(s).is_end())
            .collect();

        match ends.len() {
            1 => {
                self.flush(ends[0])?;
                Ok(None)
            }
            0 if self.current.len() > 1 => {
                let live: Vec<StateId> = self.current.keys().copied().collect();
                Ok(Some(self.report(UnresolvedKind::LiveStates, &live)))
            }
            0 => {
                if let Some((&state, queue)) = self.current.iter().next() {
                    warn!(
                        state = machine.state_name(state),
                        queue = %join_symbols(queue),
                        "decoder closed outside an end state"
                    );
                }
                Ok(None)
            }
            _ => Ok(Some(self.report(UnresolvedKind::EndStates, &ends))),
        }
    }

    fn report(&self, kind: UnresolvedKind, states: &[StateId]) -> Unresolved {
        let candidates: Vec<Candidate> = states
            .iter()
            .map(|&state| Candidate {
                state,
                name: self.machine.state_name(state).to_string(),
                queue: self
                    .current
                    .get(&state)
                    .map(|q| q.iter().copied().collect())
                    .unwrap_or_default(),
            })
            .collect();
        let unresolved = Unresolved { kind, candidates };
        warn!("{unresolved}");
        unresolved
    }
}

impl<S: SymbolSink + ?Sized> Drop for Decoder<'_, S> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "decoder failed while closing on drop");
        }
    }
}

/// Closure of `start` under usable transitions with empty output.
///
/// States that are terminal or emit output are kept; the rest are only
/// passed through. Reaching one state with two different queues means the
/// machine is not input-deterministic along silent paths, which is fatal.
pub fn closure(machine: &Machine, start: HypothesisSet) -> Result<HypothesisSet> {
    let mut frontier: Vec<StateId> = start.keys().copied().collect();
    let mut seen = start;
    let mut kept = HypothesisSet::new();

    while !frontier.is_empty() {
        let mut discovered = HypothesisSet::new();
        for &state in &frontier {
            let ms = machine.state(state);
            let queue = &seen[&state];
            trace!(state = ms.name.as_str(), queue = %join_symbols(queue), "input queue");
            if ms.is_end() || ms.emits_output() {
                kept.insert(state, queue.clone());
            }
            for t in ms.trans.iter().filter(|t| t.is_usable() && t.output_empty()) {
                let next = extend_queue(queue, t);
                match seen.get(&t.dest).or_else(|| discovered.get(&t.dest)) {
                    Some(prev) if *prev != next => {
                        return Err(non_deterministic(machine, t.dest, prev, &next));
                    }
                    Some(_) => {}
                    None => {
                        trace!(
                            from = ms.name.as_str(),
                            to = machine.state_name(t.dest),
                            queue = %join_symbols(&next),
                            "silent transition"
                        );
                        discovered.insert(t.dest, next);
                    }
                }
            }
        }
        frontier = discovered.keys().copied().collect();
        seen.extend(discovered);
    }
    Ok(kept)
}

fn extend_queue(queue: &InputQueue, t: &MachineTransition) -> InputQueue {
    let mut next = queue.clone();
    if let Some(input) = t.input {
        next.push_back(input);
    }
    next
}

fn non_deterministic(
    machine: &Machine,
    state: StateId,
    first: &InputQueue,
    second: &InputQueue,
) -> DecodeError {
    DecodeError::NonDeterministic {
        state: machine.state_name(state).to_string(),
        first: join_symbols(first),
        second: join_symbols(second),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::MachineBuilder;
    use crate::symbol::parse_inputs;

    const B0: Option<InputSymbol> = Some(InputSymbol::BIT0);
    const B1: Option<InputSymbol> = Some(InputSymbol::BIT1);
    const EOF: Option<InputSymbol> = Some(InputSymbol::EndOfFile);

    /// Two bits per base: the first bit is held silently until the base
    /// reveals the second.
    fn pair_machine() -> Machine {
        let mut b = MachineBuilder::new();
        let s = b.add_state("S");
        let h0 = b.add_state("H0");
        let h1 = b.add_state("H1");
        let e = b.add_state("E");
        b.add_transition(s, h0, B0, None, 0.0)
            .add_transition(s, h1, B1, None, 0.0)
            .add_transition(s, e, EOF, None, 0.0)
            .add_transition(h0, s, B0, Some('A'), 0.0)
            .add_transition(h0, s, B1, Some('C'), 0.0)
            .add_transition(h1, s, B0, Some('G'), 0.0)
            .add_transition(h1, s, B1, Some('T'), 0.0);
        b.build().unwrap()
    }

    fn queue(s: &str) -> InputQueue {
        parse_inputs(s).into_iter().collect()
    }

    #[test]
    fn initial_closure_holds_one_symbol_per_branch() {
        let m = pair_machine();
        let mut out: Vec<InputSymbol> = Vec::new();
        let d = Decoder::new(&m, &mut out).unwrap();
        let h = d.hypotheses();
        assert_eq!(h.len(), 3);
        assert_eq!(h[&1], queue("0"));
        assert_eq!(h[&2], queue("1"));
        assert_eq!(h[&3], queue("$"));
    }

    #[test]
    fn consensus_shifts_shared_prefix() {
        let m = pair_machine();
        let mut out: Vec<InputSymbol> = Vec::new();
        {
            let mut d = Decoder::new(&m, &mut out).unwrap();
            d.decode_symbol('C').unwrap();
            // Every branch starts with "01"; the next pair is still open.
            assert!(d.hypotheses().values().all(|q| q.len() == 1));
            assert_eq!(d.consensus_front(), None);
        }
        assert_eq!(join_symbols(&out), "01$");
    }

    #[test]
    fn lowercase_input_is_normalised() {
        let m = pair_machine();
        let mut out: Vec<InputSymbol> = Vec::new();
        {
            let mut d = Decoder::new(&m, &mut out).unwrap();
            d.decode_str("gta").unwrap();
            assert_eq!(d.close().unwrap(), None);
        }
        assert_eq!(join_symbols(&out), "101100$");
    }

    #[test]
    fn unknown_symbol_is_fatal_and_poisons() {
        let m = pair_machine();
        let mut out: Vec<InputSymbol> = Vec::new();
        let mut d = Decoder::new(&m, &mut out).unwrap();
        let err = d.decode_symbol('N').unwrap_err();
        assert!(matches!(err, DecodeError::NoUsableTransition { symbol: 'N', .. }));
        assert!(d.is_closed());
        assert_eq!(d.close().unwrap(), None);
    }

    #[test]
    fn silent_fork_with_different_queues_is_fatal() {
        let mut b = MachineBuilder::new();
        let s = b.add_state("S");
        let a = b.add_state("A");
        let c = b.add_state("C");
        let e = b.add_state("E");
        b.add_transition(s, a, B0, None, 0.0)
            .add_transition(s, c, B1, None, 0.0)
            .add_transition(a, e, None, None, 0.0)
            .add_transition(c, e, None, None, 0.0);
        let m = b.build().unwrap();
        let mut out: Vec<InputSymbol> = Vec::new();
        let err = Decoder::new(&m, &mut out).err().unwrap();
        assert!(matches!(err, DecodeError::NonDeterministic { ref state, .. } if state == "E"));
    }

    #[test]
    fn emitting_fork_with_different_queues_is_fatal() {
        let mut b = MachineBuilder::new();
        let s = b.add_state("S");
        let e = b.add_state("E");
        b.add_transition(s, e, B0, Some('A'), 0.0)
            .add_transition(s, e, B1, Some('A'), 0.0);
        let m = b.build().unwrap();
        let mut out: Vec<InputSymbol> = Vec::new();
        let mut d = Decoder::new(&m, &mut out).unwrap();
        assert!(matches!(
            d.decode_symbol('A'),
            Err(DecodeError::NonDeterministic { .. })
        ));
    }

    #[test]
    fn closure_is_idempotent() {
        let m = pair_machine();
        let mut start = HypothesisSet::new();
        start.insert(0, InputQueue::new());
        let once = closure(&m, start).unwrap();
        let twice = closure(&m, once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn closing_twice_is_a_no_op() {
        let m = pair_machine();
        let mut out: Vec<InputSymbol> = Vec::new();
        {
            let mut d = Decoder::new(&m, &mut out).unwrap();
            d.decode_str("A").unwrap();
            assert_eq!(d.close().unwrap(), None);
            assert!(d.is_closed());
            assert_eq!(d.close().unwrap(), None);
        }
        assert_eq!(join_symbols(&out), "00$");
    }

    #[test]
    fn drop_flushes_unclosed_decoder() {
        let m = pair_machine();
        let mut out: Vec<InputSymbol> = Vec::new();
        {
            let mut d = Decoder::new(&m, &mut out).unwrap();
            d.decode_str("T").unwrap();
        }
        assert_eq!(join_symbols(&out), "11$");
    }
}
