/*!
The image assembler and the public compile entry point.

Within one compile the stages run in a fixed order: Sherman selection,
implementation-number allocation, report gathering, acceleration analysis
and finally assembly. All region offsets are computed before the output
buffer is allocated, so the image is written linearly; the last pass
stamps accept/accelerate flag bits onto every stored 16-bit successor so
the runtime's inner loop can test them without touching the aux records.
*/

use std::collections::BTreeSet;

use crate::{
    dfa::{
        accel::{self, ACCEL_AUX_SIZE},
        alphabet::Alphabet,
        config::{CompileContext, Grey},
        error::BuildError,
        image::{
            self, DfaImage, StateAux, ACCEL_FLAG, ACCEPT_FLAG,
            SHERMAN_FIXED_SIZE, STATE_MASK,
        },
        raw::{RawDfa, StateId, TOP},
        reports::{self, GatheredReports, INVALID_REPORT_INDEX},
        sherman,
    },
    util,
};

/// Per-state facts derived during compilation.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct StateExtra {
    /// How many transitions coincide with the chosen daddy's.
    pub(crate) daddytaken: u16,
    /// Stored as an override list against the daddy rather than as a row.
    pub(crate) sherman: bool,
    /// Scanning through this state can be accelerated.
    pub(crate) accelerable: bool,
}

fn impl_id(raw: &RawDfa, raw_id: StateId) -> StateId {
    raw.states[raw_id as usize].impl_id
}

/// Marks every accelerable state and returns how many there are.
fn populate_acceleration_info(
    raw: &RawDfa,
    extra: &mut [StateExtra],
    grey: &Grey,
) -> u32 {
    if !grey.accelerate_dfa {
        return 0;
    }
    let sds_proxy = accel::sds_or_proxy(raw);
    debug!("sds {}", sds_proxy);

    let mut count = 0;
    for i in 0..raw.states.len() {
        if accel::is_accel(raw, sds_proxy, i as StateId) {
            count += 1;
            extra[i].accelerable = true;
        }
    }
    count
}

/// Assigns 16-bit implementation numbers: normal states first, then
/// Sherman states, preserving raw order within each group. Returns the
/// first Sherman number, which doubles as the row count of the packed
/// transition table.
fn allocate_fsn_16(
    raw: &mut RawDfa,
    extra: &[StateExtra],
) -> Result<u16, BuildError> {
    // Dead is always 0.
    raw.states[0].impl_id = 0;

    if raw.states.len() > (1 << 16) {
        debug!("too many states");
        return Err(BuildError::state_overflow(1 << 16));
    }

    let mut next_norm: u32 = 1;
    for i in 1..raw.states.len() {
        if !extra[i].sherman {
            raw.states[i].impl_id = next_norm as StateId;
            next_norm += 1;
        }
    }
    let sherman_base = next_norm;
    let mut next_sherman = next_norm;
    for i in 1..raw.states.len() {
        if extra[i].sherman {
            raw.states[i].impl_id = next_sherman as StateId;
            next_sherman += 1;
        }
    }

    // Check that the largest assigned number leaves the flag bits clear.
    trace!(
        "next sherman {} masked {}",
        next_sherman,
        next_sherman & u32::from(STATE_MASK)
    );
    if (next_sherman - 1) != ((next_sherman - 1) & u32::from(STATE_MASK)) {
        return Err(BuildError::state_overflow(usize::from(STATE_MASK) + 1));
    }
    Ok(sherman_base as u16)
}

/// Assigns 8-bit implementation numbers in three zones: plain normal
/// states, then accelerable-but-not-accepting, then accept-bearing.
/// Returns the two zone boundaries the runtime uses to skip checks.
fn allocate_fsn_8(raw: &mut RawDfa, extra: &[StateExtra]) -> (u16, u16) {
    // Dead is always 0.
    raw.states[0].impl_id = 0;
    assert!(raw.states.len() <= (1 << 8));

    let mut norm = Vec::new();
    let mut accel = Vec::new();
    let mut accept = Vec::new();
    for i in 1..raw.states.len() {
        if !raw.states[i].reports.is_empty() {
            accept.push(i);
        } else if extra[i].accelerable {
            accel.push(i);
        } else {
            norm.push(i);
        }
    }

    let mut j: u16 = 1;
    for &s in norm.iter() {
        trace!("mapping state {} to {}", s, j);
        raw.states[s].impl_id = j;
        j += 1;
    }
    let accel_limit = j;
    for &s in accel.iter() {
        trace!("mapping state {} to {}", s, j);
        raw.states[s].impl_id = j;
        j += 1;
    }
    let accept_limit = j;
    for &s in accept.iter() {
        trace!("mapping state {} to {}", s, j);
        raw.states[s].impl_id = j;
        j += 1;
    }
    (accel_limit, accept_limit)
}

/// The aux record for raw state `i`, minus any acceleration offset.
fn make_aux(
    raw: &RawDfa,
    i: usize,
    ri: &GatheredReports,
    report_offsets: &[u32],
) -> StateAux {
    let state = &raw.states[i];
    let accept = if state.reports.is_empty() {
        0
    } else {
        debug_assert_ne!(INVALID_REPORT_INDEX, ri.reports[i]);
        report_offsets[ri.reports[i] as usize]
    };
    let accept_eod = if state.reports_eod.is_empty() {
        0
    } else {
        report_offsets[ri.reports_eod[i] as usize]
    };
    // The dead state's top points at the floating start, which is where a
    // TOP event lands when no engine state is alive yet.
    let raw_top = if i == 0 {
        raw.start_floating
    } else {
        state.next[raw.alpha_remap[TOP] as usize]
    };
    StateAux { accept, accept_eod, top: impl_id(raw, raw_top), accel_offset: 0 }
}

fn calc_sherman_region_size(extra: &[StateExtra]) -> usize {
    let count = extra.iter().filter(|e| e.sherman).count();
    util::roundup_16(count * SHERMAN_FIXED_SIZE)
}

/// Stamps ACCEPT/ACCEL flag bits onto every stored successor: the packed
/// transition rows first, then the override lists of every sherman
/// record. 16-bit images only; the 8-bit layout encodes both facts in its
/// zone boundaries instead.
fn mark_edges(nfa: &mut DfaImage, alphabet: &Alphabet) {
    let alpha_shift = alphabet.shift();
    let alpha_size = alphabet.impl_alpha_size;

    for i in 0..nfa.sherman_limit() as usize {
        for j in 0..alpha_size as usize {
            let c_prime = (i << alpha_shift) + j;
            let mut succ = nfa.trans16(c_prime);
            let aux = nfa.aux(succ);
            if aux.accept != 0 {
                succ |= ACCEPT_FLAG;
            }
            if aux.accel_offset != 0 {
                succ |= ACCEL_FLAG;
            }
            nfa.set_trans16(c_prime, succ);
        }
    }

    for j in nfa.sherman_limit()..nfa.state_count() {
        for i in 0..nfa.sherman_len(j) {
            let mut succ = nfa.sherman_succ(j, i);
            let aux = nfa.aux(succ);
            if aux.accept != 0 {
                succ |= ACCEPT_FLAG;
            }
            if aux.accel_offset != 0 {
                succ |= ACCEL_FLAG;
            }
            nfa.set_sherman_succ(j, i, succ);
        }
    }
}

fn compile_16(
    raw: &mut RawDfa,
    extra: &mut [StateExtra],
    cc: &CompileContext,
) -> Result<DfaImage, BuildError> {
    debug!("building mcclellan 16");
    let alphabet = Alphabet::new(raw.impl_alpha_size());
    let alpha_shift = alphabet.shift();

    let count_real_states = allocate_fsn_16(raw, extra)?;
    let ri = reports::gather_reports(raw);
    let accel_count = populate_acceleration_info(raw, extra, &cc.grey);

    let tran_size = alphabet.row_len() * 2 * count_real_states as usize;
    let aux_size = image::AUX_SIZE * raw.states.len();
    let aux_offset = util::roundup_16(image::TRANS_OFFSET + tran_size);
    let accel_size = ACCEL_AUX_SIZE * accel_count as usize;
    let accel_offset =
        util::roundup(aux_offset + aux_size + ri.report_list_size(), 32);
    let sherman_offset = util::roundup_16(accel_offset + accel_size);
    let sherman_size = calc_sherman_region_size(extra);
    let total_size = sherman_offset + sherman_size;

    // Accel offsets stored in the image are relative to the mcclellan
    // header, which is what the runtime dereferences them against.
    let mut accel_cursor = (accel_offset - image::NFA_HEADER_SIZE) as u32;

    let mut nfa = DfaImage::new(total_size);
    nfa.write_basic_info(
        2,
        total_size,
        raw.states.len(),
        &raw.alpha_remap[..256],
        alpha_shift,
        aux_offset as u32,
        accel_cursor,
        accel_count,
        ri.arb_report,
        ri.single,
    );
    nfa.set_starts(
        impl_id(raw, raw.start_anchored),
        impl_id(raw, raw.start_floating),
    );
    nfa.set_sherman_region(
        sherman_offset as u32,
        total_size as u32,
        count_real_states,
    );

    let report_offsets =
        ri.fill_report_lists(nfa.as_bytes_mut(), aux_offset + aux_size);

    // Normal states: packed rows plus aux.
    for i in 0..raw.states.len() {
        if extra[i].sherman {
            continue;
        }
        let fs = raw.states[i].impl_id;
        debug_assert!(fs < count_real_states);

        for j in 0..alphabet.impl_alpha_size as usize {
            let idx = ((fs as usize) << alpha_shift) + j;
            nfa.set_trans16(idx, impl_id(raw, raw.states[i].next[j]));
        }

        let mut aux = make_aux(raw, i, &ri, &report_offsets);
        if extra[i].accelerable {
            aux.accel_offset = accel_cursor;
            nfa.write_accel(accel_cursor, &accel::build_accel(raw, i as StateId));
            accel_cursor += ACCEL_AUX_SIZE as u32;
            debug_assert!(
                accel_cursor as usize + image::NFA_HEADER_SIZE
                    <= sherman_offset
            );
        }
        nfa.write_aux(fs, aux);
    }

    // Sherman states: aux plus the override record.
    for i in 0..raw.states.len() {
        if !extra[i].sherman {
            continue;
        }
        let fs = raw.states[i].impl_id;
        debug_assert!(fs >= count_real_states);

        let mut aux = make_aux(raw, i, &ri, &report_offsets);
        if extra[i].accelerable {
            aux.accel_offset = accel_cursor;
            nfa.write_accel(accel_cursor, &accel::build_accel(raw, i as StateId));
            accel_cursor += ACCEL_AUX_SIZE as u32;
            debug_assert!(
                accel_cursor as usize + image::NFA_HEADER_SIZE
                    <= sherman_offset
            );
        }
        nfa.write_aux(fs, aux);

        let d = raw.states[i].daddy;
        let mut chars = Vec::new();
        let mut succs = Vec::new();
        for s in 0..alphabet.impl_alpha_size as usize {
            if raw.states[i].next[s] != raw.states[d as usize].next[s] {
                trace!(
                    "{} overrides daddy {} on symbol {} -> {}",
                    fs,
                    impl_id(raw, d),
                    s,
                    impl_id(raw, raw.states[i].next[s])
                );
                chars.push(s as u8);
                succs.push(impl_id(raw, raw.states[i].next[s]));
            }
        }
        let len = alphabet.impl_alpha_size - extra[i].daddytaken;
        debug_assert_eq!(usize::from(len), chars.len());
        debug_assert!(len <= sherman::MAX_SHERMAN_LIST_LEN);
        nfa.write_sherman_record(fs, impl_id(raw, d), &chars, &succs);
    }

    mark_edges(&mut nfa, &alphabet);
    Ok(nfa)
}

fn compile_8(
    raw: &mut RawDfa,
    extra: &mut [StateExtra],
    cc: &CompileContext,
) -> Result<DfaImage, BuildError> {
    debug!("building mcclellan 8");
    let alphabet = Alphabet::new(raw.impl_alpha_size());
    let alpha_shift = alphabet.shift();

    let ri = reports::gather_reports(raw);
    let accel_count = populate_acceleration_info(raw, extra, &cc.grey);

    let tran_size = alphabet.row_len() * raw.states.len();
    let aux_size = image::AUX_SIZE * raw.states.len();
    let aux_offset = util::roundup_16(image::TRANS_OFFSET + tran_size);
    let accel_size = ACCEL_AUX_SIZE * accel_count as usize;
    let accel_offset =
        util::roundup(aux_offset + aux_size + ri.report_list_size(), 32);
    let total_size = accel_offset + accel_size;

    trace!("aux_size {}", aux_size);
    trace!("aux_offset {}", aux_offset);
    trace!("rl size {}", ri.report_list_size());
    trace!("accel_size {}", accel_size);
    trace!("accel_offset {}", accel_offset);
    trace!("total_size {}", total_size);

    let mut accel_cursor = (accel_offset - image::NFA_HEADER_SIZE) as u32;

    let mut nfa = DfaImage::new(total_size);
    let (accel_limit, accept_limit) = allocate_fsn_8(raw, extra);
    nfa.set_limits_8(accel_limit, accept_limit);
    nfa.write_basic_info(
        1,
        total_size,
        raw.states.len(),
        &raw.alpha_remap[..256],
        alpha_shift,
        aux_offset as u32,
        accel_cursor,
        accel_count,
        ri.arb_report,
        ri.single,
    );
    nfa.set_starts(
        impl_id(raw, raw.start_anchored),
        impl_id(raw, raw.start_floating),
    );

    let report_offsets =
        ri.fill_report_lists(nfa.as_bytes_mut(), aux_offset + aux_size);

    for i in 0..raw.states.len() {
        let j = raw.states[i].impl_id;
        let mut aux = make_aux(raw, i, &ri, &report_offsets);
        if extra[i].accelerable {
            aux.accel_offset = accel_cursor;
            nfa.write_accel(accel_cursor, &accel::build_accel(raw, i as StateId));
            accel_cursor += ACCEL_AUX_SIZE as u32;
        }
        for s in 0..alphabet.impl_alpha_size as usize {
            let idx = ((j as usize) << alpha_shift) + s;
            let succ = impl_id(raw, raw.states[i].next[s]);
            debug_assert!(succ <= 0xFF);
            nfa.set_trans8(idx, succ as u8);
        }
        nfa.write_aux(j, aux);
    }
    debug_assert!(accel_cursor as usize + image::NFA_HEADER_SIZE <= total_size);

    Ok(nfa)
}

fn fill_accel_out(extra: &[StateExtra], accel_states: &mut BTreeSet<StateId>) {
    for (i, e) in extra.iter().enumerate() {
        if e.accelerable {
            accel_states.insert(i as StateId);
        }
    }
}

/// Compiles a raw DFA into an executable image.
///
/// The DFA is consulted read-mostly, but two things are written back into
/// it: redundant end-of-data reports are stripped when not compiling for
/// streaming, and every state's `impl_id` and `daddy` fields are
/// populated. When `accel_states` is given, the raw indices of every
/// accelerable state are added to it on success.
///
/// The input state numbering is assumed to be breadth-first from the
/// anchored start; the compression heuristics lean on this and degrade
/// silently (never incorrectly) under other orderings.
///
/// Fails with a [`BuildError`] when the states cannot be numbered within
/// the packed representation; nothing is returned in that case.
pub fn compile(
    raw: &mut RawDfa,
    cc: &CompileContext,
    accel_states: Option<&mut BTreeSet<StateId>>,
) -> Result<DfaImage, BuildError> {
    // The raw representation can hold more states than any packed image
    // can number; refuse those before analysis starts indexing by u16.
    if raw.states.len() > (1 << 16) {
        debug!("too many states, {} total", raw.states.len());
        return Err(BuildError::state_overflow(1 << 16));
    }

    let mut extra = vec![StateExtra::default(); raw.states.len()];
    let using8bit = cc.grey.allow_mcclellan_8 && raw.states.len() <= 256;

    if !cc.streaming {
        raw.strip_extra_eod_reports();
    }
    let has_eod_reports = raw.has_eod_reports();
    let any_cyclic_near_anchored_state =
        sherman::is_cyclic_near(raw, raw.start_anchored);

    let mut total_daddy: u32 = 0;
    for i in 0..raw.states.len() {
        sherman::find_better_daddy(
            raw,
            &mut extra,
            i as StateId,
            using8bit,
            any_cyclic_near_anchored_state,
            &cc.grey,
        );
        total_daddy += u32::from(extra[i].daddytaken);
    }
    debug!(
        "daddy {}/{} states={} alpha={}",
        total_daddy,
        raw.states.len() * raw.impl_alpha_size() as usize,
        raw.states.len(),
        raw.impl_alpha_size()
    );

    let mut nfa = if !using8bit {
        compile_16(raw, &mut extra, cc)?
    } else {
        compile_8(raw, &mut extra, cc)?
    };

    if has_eod_reports {
        nfa.set_accepts_eod();
    }
    if let Some(accel_states) = accel_states {
        fill_accel_out(&extra, accel_states);
    }
    debug!("compile done");
    Ok(nfa)
}
