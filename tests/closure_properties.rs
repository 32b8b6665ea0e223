use std::cell::RefCell;
use std::rc::Rc;

use basecodec::decoder::{closure, HypothesisSet, InputQueue};
use basecodec::symbol::parse_inputs;
use basecodec::{
    codes, encoder, BitOrder, Decoder, InputSymbol, Machine, MachineBuilder, SymbolSink,
    UnresolvedKind,
};
use proptest::prelude::*;

/// Sink that stays readable while a decoder holds it.
#[derive(Clone, Default)]
struct Shared(Rc<RefCell<Vec<InputSymbol>>>);

impl SymbolSink for Shared {
    fn write_symbol(&mut self, sym: InputSymbol) -> basecodec::Result<()> {
        self.0.borrow_mut().push(sym);
        Ok(())
    }
}

/// Silent preamble (`^` then a null hop) before a one-bit-per-base loop;
/// `$` leaves the loop through a silent state.
fn preamble_machine() -> Machine {
    let mut b = MachineBuilder::new();
    let s0 = b.add_state("S0");
    let s1 = b.add_state("S1");
    let s2 = b.add_state("S2");
    let s3 = b.add_state("S3");
    let e = b.add_state("E");
    b.add_transition(s0, s1, None, None, 0.0)
        .add_transition(s1, s2, Some(InputSymbol::StartOfFile), None, 0.0)
        .add_transition(s2, s3, Some(InputSymbol::BIT0), Some('A'), 0.0)
        .add_transition(s2, s3, Some(InputSymbol::BIT1), Some('C'), 0.0)
        .add_transition(s3, s2, None, None, 0.0)
        .add_transition(s3, e, Some(InputSymbol::EndOfFile), None, 0.0);
    b.build().unwrap()
}

fn single(state: usize, queue: &str) -> HypothesisSet {
    let mut set = HypothesisSet::new();
    set.insert(state, parse_inputs(queue).into_iter().collect::<InputQueue>());
    set
}

#[test]
fn closure_passes_through_silent_states() {
    let m = preamble_machine();
    let once = closure(&m, single(0, "")).unwrap();
    assert_eq!(once, single(2, "^"));

    let from_loop = closure(&m, single(3, "0")).unwrap();
    assert_eq!(from_loop.len(), 2);
    assert_eq!(from_loop[&2], parse_inputs("0").into_iter().collect::<InputQueue>());
    assert_eq!(from_loop[&4], parse_inputs("0$").into_iter().collect::<InputQueue>());
}

#[test]
fn preamble_is_decoded() {
    let m = preamble_machine();
    let sink = Shared::default();
    {
        let mut writer = sink.clone();
        let mut decoder = Decoder::new(&m, &mut writer).unwrap();
        // Both live hypotheses agree on everything but the end marker.
        decoder.decode_str("CA").unwrap();
        assert_eq!(sink.0.borrow().as_slice(), parse_inputs("^10").as_slice());
        assert_eq!(decoder.close().unwrap(), None);
    }
    assert_eq!(sink.0.borrow().as_slice(), parse_inputs("^10$").as_slice());
}

#[test]
fn several_end_states_are_reported_not_raised() {
    let mut b = MachineBuilder::new();
    let s = b.add_state("S");
    let e1 = b.add_state("E1");
    let e2 = b.add_state("E2");
    b.add_transition(s, s, Some(InputSymbol::BIT0), Some('A'), 0.0)
        .add_transition(s, e1, Some(InputSymbol::EndOfFile), None, 0.0)
        .add_transition(s, e2, Some(InputSymbol::Control(0)), None, 0.0);
    let m = b.build().unwrap();

    let mut out: Vec<InputSymbol> = Vec::new();
    let report = {
        let mut decoder = Decoder::new(&m, &mut out).unwrap();
        decoder.decode_str("AA").unwrap();
        decoder.close().unwrap().unwrap()
    };
    assert_eq!(report.kind, UnresolvedKind::EndStates);
    let names: Vec<&str> = report.candidates.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["E1", "E2"]);
    assert_eq!(report.candidates[0].queue, parse_inputs("$"));
    assert_eq!(report.candidates[1].queue, vec![InputSymbol::Control(0)]);
    assert!(report.to_string().contains("2 possible end states"));
    assert_eq!(out, parse_inputs("00"));
}

#[test]
fn several_live_states_are_reported() {
    let mut b = MachineBuilder::new();
    let s = b.add_state("S");
    let x = b.add_state("X");
    let y = b.add_state("Y");
    b.add_transition(s, x, Some(InputSymbol::BIT0), Some('A'), 0.0)
        .add_transition(s, y, Some(InputSymbol::BIT1), Some('A'), 0.0)
        .add_transition(x, s, Some(InputSymbol::BIT0), Some('C'), 0.0)
        .add_transition(y, s, Some(InputSymbol::BIT0), Some('G'), 0.0);
    let m = b.build().unwrap();

    let mut out: Vec<InputSymbol> = Vec::new();
    let mut decoder = Decoder::new(&m, &mut out).unwrap();
    decoder.decode_str("A").unwrap();
    let report = decoder.close().unwrap().unwrap();
    assert_eq!(report.kind, UnresolvedKind::LiveStates);
    assert_eq!(report.candidates.len(), 2);
    assert!(decoder.is_closed());
}

proptest! {
    #[test]
    fn closure_is_idempotent(
        context in 1usize..4,
        pick in any::<prop::sample::Index>(),
        queue in "[01]{0,6}"
    ) {
        let m = codes::rotating_code(context).unwrap();
        let state = pick.index(m.n_states());
        let once = closure(&m, single(state, &queue)).unwrap();
        let twice = closure(&m, once.clone()).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn each_base_releases_exactly_its_bit(payload in prop::collection::vec(any::<u8>(), 1..6)) {
        let m = codes::rotating_code(2).unwrap();
        let inputs = encoder::byte_inputs(&m, &payload, BitOrder::Lsb0);
        let seq = encoder::encode_bytes(&m, &payload, BitOrder::Lsb0).unwrap();
        let sink = Shared::default();
        let mut writer = sink.clone();
        let mut decoder = Decoder::new(&m, &mut writer).unwrap();
        for (k, base) in seq.chars().enumerate() {
            decoder.decode_symbol(base).unwrap();
            let got = sink.0.borrow();
            prop_assert_eq!(got.as_slice(), &inputs[..=k]);
        }
        prop_assert_eq!(decoder.close().unwrap(), None);
        let got = sink.0.borrow();
        prop_assert_eq!(got.as_slice(), inputs.as_slice());
    }
}
