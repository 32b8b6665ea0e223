//! Ready-made machines.
//!
//! These are small, fully specified codes for exercising the decoders and for
//! benchmarking; real codes are built elsewhere and loaded through
//! [`MachineBuilder`].

use std::collections::BTreeMap;

use crate::error::{DecodeError, Result};
use crate::machine::{Machine, MachineBuilder};
use crate::mutator::DNA_ALPHABET;
use crate::symbol::{InputSymbol, StateId};

/// Rotating code over `ACGT`: bit 0 emits the base after the previous one,
/// bit 1 the base two after it (the first base behaves as if preceded by
/// `T`). No base ever repeats, so homopolymers and many duplications are
/// visible as errors.
///
/// States remember the last `context_len` bases, which is how far back a
/// tandem duplication can be traced. `$` moves from any state to `end`.
pub fn rotating_code(context_len: usize) -> Result<Machine> {
    if context_len == 0 {
        return Err(DecodeError::InvalidParameter(
            "rotating code needs a context of at least one base".into(),
        ));
    }
    let bases: Vec<char> = DNA_ALPHABET.chars().collect();
    let n = bases.len();
    let name = |ctx: &[usize]| -> String { ctx.iter().map(|&b| bases[b]).collect() };

    let mut b = MachineBuilder::new();
    let start = b.add_state("start");
    let end = b.add_state("end");
    let mut ids: BTreeMap<Vec<usize>, StateId> = BTreeMap::new();
    let mut work: Vec<(StateId, Vec<usize>)> = vec![(start, Vec::new())];

    while let Some((src, ctx)) = work.pop() {
        let last = ctx.last().copied().unwrap_or(n - 1);
        for (bit, step) in [(false, 1), (true, 2)] {
            let base = (last + step) % n;
            let mut next = ctx.clone();
            next.push(base);
            if next.len() > context_len {
                next.remove(0);
            }
            let dest = match ids.get(&next) {
                Some(&id) => id,
                None => {
                    let id = b.add_state(name(&next));
                    ids.insert(next.clone(), id);
                    work.push((id, next));
                    id
                }
            };
            b.add_transition(
                src,
                dest,
                Some(InputSymbol::Bit(bit)),
                Some(bases[base]),
                -std::f64::consts::LN_2,
            );
        }
        b.add_transition(src, end, Some(InputSymbol::EndOfFile), None, 0.0);
    }
    b.build()
}
