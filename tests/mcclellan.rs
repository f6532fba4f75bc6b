use std::collections::BTreeSet;

use mcclellan::{
    compile,
    dfa::image::{ACCEL_FLAG, ACCEPT_FLAG, STATE_MASK},
    CompileContext, DfaImage, Grey, RawDfa, StateId, ALPHABET_SIZE,
    DEAD_STATE, TOP,
};

fn two_class_remap() -> [u16; ALPHABET_SIZE] {
    let mut remap = [0u16; ALPHABET_SIZE];
    remap[b'a' as usize] = 1;
    remap[TOP] = 2;
    remap
}

fn identity_remap() -> [u16; ALPHABET_SIZE] {
    let mut remap = [0u16; ALPHABET_SIZE];
    for i in 0..ALPHABET_SIZE {
        remap[i] = i as u16;
    }
    remap
}

/// Checks that decoding any `(state, byte)` from the image agrees with
/// the raw DFA, and that every decoded index is a valid assigned one.
fn assert_decode_equivalence(raw: &RawDfa, image: &DfaImage) {
    for (i, state) in raw.states.iter().enumerate() {
        for byte in 0..=0xFFu8 {
            let raw_succ = raw.next_on_byte(i as StateId, byte);
            let want = raw.states[raw_succ as usize].impl_id;
            let got = image.next_state(state.impl_id, byte);
            assert_eq!(
                want, got,
                "state {} (impl {}) on byte {:#04x}",
                i, state.impl_id, byte,
            );
        }
    }
}

/// Checks the three-zone ordering of an 8-bit image against the raw DFA.
fn assert_zones_8(raw: &RawDfa, image: &DfaImage) {
    assert!(image.is_8bit());
    let accel_limit = image.accel_limit_8();
    let accept_limit = image.accept_limit_8();
    assert!(accel_limit <= accept_limit);
    for (i, state) in raw.states.iter().enumerate() {
        if i == 0 {
            assert_eq!(0, state.impl_id);
            continue;
        }
        let id = state.impl_id;
        let aux = image.aux(id);
        if !state.reports.is_empty() {
            assert!(id >= accept_limit, "state {} not in accept zone", i);
            assert_ne!(0, aux.accept);
        } else if aux.accel_offset != 0 {
            assert!(
                id >= accel_limit && id < accept_limit,
                "state {} not in accel zone",
                i
            );
        } else {
            assert!(id < accel_limit, "state {} not in normal zone", i);
        }
    }
}

/// Checks that every stored successor of a 16-bit image carries exactly
/// the flags its target's aux record implies.
fn assert_flags_16(image: &DfaImage) {
    assert!(!image.is_8bit());
    let alpha_size = {
        // Count distinct symbols actually used by the remap.
        let max = (0..=0xFFu8).map(|b| image.remap(b)).max().unwrap();
        u16::from(max) + 1
    };
    let check = |stored: u16| {
        let target = stored & STATE_MASK;
        let aux = image.aux(target);
        assert_eq!(aux.accept != 0, stored & ACCEPT_FLAG != 0);
        assert_eq!(aux.accel_offset != 0, stored & ACCEL_FLAG != 0);
    };
    for id in 0..image.sherman_limit() {
        for sym in 0..alpha_size {
            check(image.trans_entry(id, sym as u8));
        }
    }
    for id in image.sherman_limit()..image.state_count() {
        for &succ in image.sherman(id).succs.iter() {
            check(succ);
        }
    }
}

#[test]
fn dead_only_dfa() {
    let mut raw = RawDfa::new(3, two_class_remap());
    let image = compile(&mut raw, &CompileContext::default(), None).unwrap();

    assert!(image.is_8bit());
    assert_eq!(1, image.state_count());
    assert_eq!(1, image.n_positions());
    assert!(!image.has_accel());
    assert!(!image.accepts_eod());
    assert!(!image.is_single_report());
    assert_eq!(image.as_bytes().len(), image.length() as usize);
    assert_decode_equivalence(&raw, &image);
}

#[test]
fn match_any_a() {
    // State 0 dead; state 1 reports on 'a' and otherwise stays put.
    let mut raw = RawDfa::new(3, two_class_remap());
    let s = raw.add_state(&[1, 1, 1]);
    raw.states[s as usize].reports.insert(42);
    raw.start_anchored = s;
    raw.start_floating = s;

    let image = compile(&mut raw, &CompileContext::default(), None).unwrap();
    assert!(image.is_8bit());
    assert_eq!(2, image.state_count());
    assert!(image.is_single_report());
    assert_eq!(42, image.arb_report());
    assert_eq!(1, image.scratch_state_size());
    assert_eq!(1, image.stream_state_size());

    let id = raw.states[s as usize].impl_id;
    assert_eq!(id, image.start_anchored());
    assert_eq!(id, image.start_floating());
    let aux = image.aux(id);
    assert_ne!(0, aux.accept);
    assert_eq!(vec![42], image.report_list_at(aux.accept));
    assert_zones_8(&raw, &image);
    assert_decode_equivalence(&raw, &image);
}

#[test]
fn vermicelli_accelerable_scanner() {
    // State 1 loops on everything but 'x'.
    let mut raw = RawDfa::new(ALPHABET_SIZE as u16, identity_remap());
    let mut row1 = vec![1 as StateId; ALPHABET_SIZE];
    row1[b'x' as usize] = 2;
    raw.add_state(&row1);
    let mut row2 = vec![2 as StateId; ALPHABET_SIZE];
    row2[b'q' as usize] = DEAD_STATE;
    raw.add_state(&row2);
    raw.start_anchored = 1;

    let mut accel_states = BTreeSet::new();
    let image = compile(
        &mut raw,
        &CompileContext::default(),
        Some(&mut accel_states),
    )
    .unwrap();

    assert!(image.has_accel());
    assert!(accel_states.contains(&1));
    let id = raw.states[1].impl_id;
    match image.accel(id) {
        Some(mcclellan::dfa::accel::Accel::Verm { c }) => assert_eq!(b'x', c),
        other => panic!("expected vermicelli, got {:?}", other),
    }
    assert_zones_8(&raw, &image);
    assert_decode_equivalence(&raw, &image);
}

#[test]
fn caseless_double_vermicelli() {
    // State 1 leaves on 'A'/'a' to state 2, which only diverges from it
    // on 'B'/'b': the four escape pairs agree modulo the case bit.
    let mut raw = RawDfa::new(ALPHABET_SIZE as u16, identity_remap());
    let mut row1 = vec![1 as StateId; ALPHABET_SIZE];
    row1[b'A' as usize] = 2;
    row1[b'a' as usize] = 2;
    raw.add_state(&row1);
    let mut row2 = row1.clone();
    row2[b'B' as usize] = 3;
    row2[b'b' as usize] = 3;
    raw.add_state(&row2);
    raw.add_state(&vec![3 as StateId; ALPHABET_SIZE]);
    raw.start_anchored = 1;

    let image = compile(&mut raw, &CompileContext::default(), None).unwrap();
    let id = raw.states[1].impl_id;
    match image.accel(id) {
        Some(mcclellan::dfa::accel::Accel::DvermNocase { c1, c2 }) => {
            assert_eq!(b'A' & !0x20, c1);
            assert_eq!(b'B' & !0x20, c2);
        }
        other => panic!("expected nocase double vermicelli, got {:?}", other),
    }
    assert_decode_equivalence(&raw, &image);
}

#[test]
fn sherman_compression_round_trips() {
    // Nine symbol alphabet, bytes '0'..'7' in their own classes. State 2
    // agrees with state 1 on all but one symbol, and state 1 is offered
    // as a daddy hint.
    let mut remap = [0u16; ALPHABET_SIZE];
    for (i, b) in (b'0'..=b'7').enumerate() {
        remap[b as usize] = i as u16;
    }
    remap[TOP] = 8;
    let mut raw = RawDfa::new(9, remap);
    raw.add_state(&[1, 2, 1, 1, 1, 1, 1, 1, 0]);
    raw.add_state(&[1, 2, 1, 1, 1, 1, 1, 2, 0]);
    raw.states[2].daddy = 1;

    let grey = Grey::default().allow_mcclellan_8(false);
    let cc = CompileContext::new(grey, false);
    let image = compile(&mut raw, &cc, None).unwrap();

    assert!(!image.is_8bit());
    assert_eq!(3, image.state_count());
    // One sherman state: the packed table holds two rows.
    assert_eq!(2, image.sherman_limit());
    assert!(image.sherman_offset() < image.sherman_end());
    assert_eq!(image.length(), image.sherman_end());

    let sherman_id = raw.states[2].impl_id;
    assert!(sherman_id >= image.sherman_limit());
    let rec = image.sherman(sherman_id);
    assert_eq!(raw.states[1].impl_id, rec.daddy);
    assert_eq!(vec![7u8], rec.chars);
    assert_eq!(1, rec.succs.len());
    assert_eq!(sherman_id, rec.succs[0] & STATE_MASK);

    // Decoding at the override symbol and at fall-through symbols agrees
    // with the raw DFA everywhere.
    assert_decode_equivalence(&raw, &image);
    assert_flags_16(&image);
}

#[test]
fn overflow_produces_no_image() {
    use mcclellan::RawState;
    let mut raw = RawDfa::new(3, two_class_remap());
    let template = RawState {
        next: vec![0, 0, 0],
        reports: BTreeSet::new(),
        reports_eod: BTreeSet::new(),
        daddy: 0,
        impl_id: 0,
    };
    raw.states
        .extend(std::iter::repeat_with(|| template.clone()).take(70_000));
    assert!(compile(&mut raw, &CompileContext::default(), None).is_err());
}

#[test]
fn sixteen_bit_flags_mark_accepting_successors() {
    let mut raw = RawDfa::new(3, two_class_remap());
    let s = raw.add_state(&[1, 1, 1]);
    raw.states[s as usize].reports.insert(7);
    raw.start_anchored = s;
    raw.start_floating = s;

    let grey = Grey::default().allow_mcclellan_8(false);
    let image = compile(&mut raw, &CompileContext::new(grey, false), None).unwrap();

    assert!(!image.is_8bit());
    assert_eq!(2, image.scratch_state_size());
    let id = raw.states[s as usize].impl_id;
    // Every transition into the accepting state carries ACCEPT_FLAG.
    for sym in 0..2u8 {
        let stored = image.trans_entry(id, sym);
        assert_eq!(id, stored & STATE_MASK);
        assert_ne!(0, stored & ACCEPT_FLAG);
    }
    assert_flags_16(&image);
    assert_decode_equivalence(&raw, &image);
}

#[test]
fn impl_ids_are_dense_and_distinct() {
    let mut raw = RawDfa::new(ALPHABET_SIZE as u16, identity_remap());
    for i in 1..=5u16 {
        let mut row = vec![i; ALPHABET_SIZE];
        row[b'x' as usize] = (i % 5) + 1;
        raw.add_state(&row);
    }
    raw.states[3].reports.insert(1);
    raw.start_anchored = 1;

    let image = compile(&mut raw, &CompileContext::default(), None).unwrap();
    let mut seen = BTreeSet::new();
    for (i, state) in raw.states.iter().enumerate() {
        if i > 0 {
            assert!(state.impl_id >= 1);
        }
        assert!(seen.insert(state.impl_id), "duplicate impl id");
    }
    assert_eq!(raw.states.len(), seen.len());
    assert_eq!(Some(&0), seen.iter().next());
    assert_zones_8(&raw, &image);
    assert_decode_equivalence(&raw, &image);
}

#[test]
fn eod_reports_are_stripped_in_block_mode() {
    let mut raw = RawDfa::new(3, two_class_remap());
    let s = raw.add_state(&[1, 1, 1]);
    raw.states[s as usize].reports.insert(7);
    raw.states[s as usize].reports_eod.extend([7, 9]);
    raw.start_anchored = s;

    let image = compile(&mut raw, &CompileContext::default(), None).unwrap();
    assert!(image.accepts_eod());
    let aux = image.aux(raw.states[s as usize].impl_id);
    // Report 7 is redundant with the normal accept and got stripped.
    assert_eq!(vec![9], image.report_list_at(aux.accept_eod));
    assert_eq!(vec![7], image.report_list_at(aux.accept));
}

#[test]
fn eod_reports_survive_streaming_mode() {
    let mut raw = RawDfa::new(3, two_class_remap());
    let s = raw.add_state(&[1, 1, 1]);
    raw.states[s as usize].reports.insert(7);
    raw.states[s as usize].reports_eod.extend([7, 9]);
    raw.start_anchored = s;

    let cc = CompileContext::new(Grey::default(), true);
    let image = compile(&mut raw, &cc, None).unwrap();
    assert!(image.accepts_eod());
    let aux = image.aux(raw.states[s as usize].impl_id);
    assert_eq!(vec![7, 9], image.report_list_at(aux.accept_eod));
}

#[test]
fn eod_only_state_sets_the_header_flag() {
    let mut raw = RawDfa::new(3, two_class_remap());
    let s = raw.add_state(&[1, 1, 1]);
    raw.states[s as usize].reports_eod.insert(3);
    raw.start_anchored = s;

    let image = compile(&mut raw, &CompileContext::default(), None).unwrap();
    assert!(image.accepts_eod());
    let aux = image.aux(raw.states[s as usize].impl_id);
    assert_eq!(0, aux.accept);
    assert_ne!(0, aux.accept_eod);
}

#[test]
fn acceleration_can_be_toggled_off() {
    let mut raw = RawDfa::new(ALPHABET_SIZE as u16, identity_remap());
    let mut row1 = vec![1 as StateId; ALPHABET_SIZE];
    row1[b'x' as usize] = DEAD_STATE;
    raw.add_state(&row1);
    raw.start_anchored = 1;

    let grey = Grey::default().accelerate_dfa(false);
    let image = compile(&mut raw, &CompileContext::new(grey, false), None).unwrap();
    assert!(!image.has_accel());
    assert_eq!(None, image.accel(raw.states[1].impl_id));
}

#[test]
fn sherman_can_be_toggled_off() {
    let mut remap = [0u16; ALPHABET_SIZE];
    for (i, b) in (b'0'..=b'7').enumerate() {
        remap[b as usize] = i as u16;
    }
    remap[TOP] = 8;
    let mut raw = RawDfa::new(9, remap);
    raw.add_state(&[1, 2, 1, 1, 1, 1, 1, 1, 0]);
    raw.add_state(&[1, 2, 1, 1, 1, 1, 1, 2, 0]);
    raw.states[2].daddy = 1;

    let grey = Grey::default().allow_mcclellan_8(false).allow_sherman_states(false);
    let image = compile(&mut raw, &CompileContext::new(grey, false), None).unwrap();
    assert_eq!(image.state_count(), image.sherman_limit());
    assert_decode_equivalence(&raw, &image);
}

#[test]
fn top_aux_points_at_the_top_successor() {
    let mut remap = two_class_remap();
    remap[TOP] = 2;
    let mut raw = RawDfa::new(3, remap);
    // State 1 goes to state 2 on TOP; dead's top is the floating start.
    let s1 = raw.add_state(&[1, 1, 2]);
    let s2 = raw.add_state(&[2, 2, 2]);
    raw.start_anchored = s1;
    raw.start_floating = s1;

    let image = compile(&mut raw, &CompileContext::default(), None).unwrap();
    let id1 = raw.states[s1 as usize].impl_id;
    let id2 = raw.states[s2 as usize].impl_id;
    assert_eq!(id2, image.aux(id1).top);
    assert_eq!(id1, image.aux(0).top);
}

#[test]
fn remap_is_recorded_in_the_header() {
    let mut raw = RawDfa::new(3, two_class_remap());
    raw.add_state(&[1, 1, 1]);
    let image = compile(&mut raw, &CompileContext::default(), None).unwrap();
    assert_eq!(1, image.remap(b'a'));
    assert_eq!(0, image.remap(b'b'));
}
