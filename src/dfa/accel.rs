/*!
Per-state acceleration analysis.

A state whose transitions mostly loop back to itself is cheap to scan
through: instead of stepping the automaton byte by byte, the runtime can
search forward for one of the few bytes that actually leave the state.
This module decides which states qualify and synthesizes the description
of the search the runtime should run, choosing among single and double
byte "vermicelli" searches, nibble-mask "shufti" lookups, and the
fallback "truffle" masks that can represent any byte set.

Analysis happens in two layers. [`is_accel`] is the cheap eligibility
gate, based only on how many bytes escape the state. [`build_accel`] then
runs the full escape analysis ([`find_escape_strings`]) and picks the
strongest primitive that fits, down to a `NONE` record for states that
passed the gate but defeat every primitive.
*/

use std::collections::BTreeSet;

use crate::{
    dfa::raw::{RawDfa, StateId, DEAD_STATE, TOP},
    util::byteset::{ByteSet, CASE_CLEAR},
};

/// Escape-count budget for an ordinary state. Above this, scanning the
/// transition table directly is as fast as any primitive.
pub(crate) const ACCEL_MAX_STOP_CHAR: usize = 160;

/// Escape-count budget for the start-of-data-stream state (or its proxy).
/// The scanner spends most of its life there, so a weaker primitive still
/// pays for itself.
pub(crate) const ACCEL_MAX_FLOATING_STOP_CHAR: usize = 192;

/// The serialized size of one acceleration record. Mask-bearing variants
/// keep their masks at 16-byte-aligned record offsets so the runtime can
/// load them straight into vector registers.
pub(crate) const ACCEL_AUX_SIZE: usize = 80;

const ACCEL_NONE: u8 = 0;
const ACCEL_VERM: u8 = 1;
const ACCEL_VERM_NOCASE: u8 = 2;
const ACCEL_DVERM: u8 = 3;
const ACCEL_DVERM_NOCASE: u8 = 4;
const ACCEL_SHUFTI: u8 = 5;
const ACCEL_DSHUFTI: u8 = 6;
const ACCEL_TRUFFLE: u8 = 7;
const ACCEL_RED_TAPE: u8 = 8;

/// An acceleration primitive for one state, as stored in the image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Accel {
    /// The state passed the eligibility gate but no primitive fits.
    None,
    /// The state is a terminal sink: no byte leaves it, scanning can jump
    /// straight to the end of the buffer.
    RedTape,
    /// Exactly one byte leaves the state: search for it.
    Verm {
        /// The single escaping byte.
        c: u8,
    },
    /// Both cases of one ASCII letter leave the state: caseless search.
    VermNocase {
        /// The escaping letter, upper cased.
        c: u8,
    },
    /// Exactly one two-byte sequence leaves the state and its successor.
    Dverm {
        /// First byte of the escaping sequence.
        c1: u8,
        /// Second byte of the escaping sequence.
        c2: u8,
    },
    /// The escaping two-byte sequences are the case variants of one pair.
    DvermNocase {
        /// First byte, upper cased.
        c1: u8,
        /// Second byte, upper cased.
        c2: u8,
    },
    /// Nibble-indexed mask lookup over the escaping bytes.
    Shufti {
        /// Low-nibble mask.
        lo: [u8; 16],
        /// High-nibble mask.
        hi: [u8; 16],
    },
    /// Nibble-indexed mask lookup over escaping two-byte sequences.
    Dshufti {
        /// First-byte low-nibble mask.
        lo1: [u8; 16],
        /// First-byte high-nibble mask.
        hi1: [u8; 16],
        /// Second-byte low-nibble mask.
        lo2: [u8; 16],
        /// Second-byte high-nibble mask.
        hi2: [u8; 16],
    },
    /// Bitwise membership masks covering any byte set.
    Truffle {
        /// Mask for bytes 0x00-0x7F.
        mask1: [u8; 16],
        /// Mask for bytes 0x80-0xFF.
        mask2: [u8; 16],
    },
}

impl Accel {
    fn tag(&self) -> u8 {
        match *self {
            Accel::None => ACCEL_NONE,
            Accel::RedTape => ACCEL_RED_TAPE,
            Accel::Verm { .. } => ACCEL_VERM,
            Accel::VermNocase { .. } => ACCEL_VERM_NOCASE,
            Accel::Dverm { .. } => ACCEL_DVERM,
            Accel::DvermNocase { .. } => ACCEL_DVERM_NOCASE,
            Accel::Shufti { .. } => ACCEL_SHUFTI,
            Accel::Dshufti { .. } => ACCEL_DSHUFTI,
            Accel::Truffle { .. } => ACCEL_TRUFFLE,
        }
    }

    /// Serialize this record into `dst`, which must hold at least
    /// [`ACCEL_AUX_SIZE`] bytes and should be zeroed.
    pub(crate) fn write_to(&self, dst: &mut [u8]) {
        assert!(dst.len() >= ACCEL_AUX_SIZE);
        dst[0] = self.tag();
        match *self {
            Accel::None | Accel::RedTape => {}
            Accel::Verm { c } | Accel::VermNocase { c } => {
                dst[1] = c;
            }
            Accel::Dverm { c1, c2 } | Accel::DvermNocase { c1, c2 } => {
                dst[1] = c1;
                dst[2] = c2;
            }
            Accel::Shufti { lo, hi } => {
                dst[16..32].copy_from_slice(&lo);
                dst[32..48].copy_from_slice(&hi);
            }
            Accel::Dshufti { lo1, hi1, lo2, hi2 } => {
                dst[16..32].copy_from_slice(&lo1);
                dst[32..48].copy_from_slice(&hi1);
                dst[48..64].copy_from_slice(&lo2);
                dst[64..80].copy_from_slice(&hi2);
            }
            Accel::Truffle { mask1, mask2 } => {
                dst[16..32].copy_from_slice(&mask1);
                dst[32..48].copy_from_slice(&mask2);
            }
        }
    }

    /// Deserialize a record from `slice`, which must hold at least
    /// [`ACCEL_AUX_SIZE`] bytes.
    ///
    /// # Panics
    ///
    /// When the type tag is not one this crate writes.
    pub(crate) fn from_bytes(slice: &[u8]) -> Accel {
        assert!(slice.len() >= ACCEL_AUX_SIZE);
        let mask = |at: usize| -> [u8; 16] {
            let mut m = [0u8; 16];
            m.copy_from_slice(&slice[at..at + 16]);
            m
        };
        match slice[0] {
            ACCEL_NONE => Accel::None,
            ACCEL_RED_TAPE => Accel::RedTape,
            ACCEL_VERM => Accel::Verm { c: slice[1] },
            ACCEL_VERM_NOCASE => Accel::VermNocase { c: slice[1] },
            ACCEL_DVERM => Accel::Dverm { c1: slice[1], c2: slice[2] },
            ACCEL_DVERM_NOCASE => {
                Accel::DvermNocase { c1: slice[1], c2: slice[2] }
            }
            ACCEL_SHUFTI => Accel::Shufti { lo: mask(16), hi: mask(32) },
            ACCEL_DSHUFTI => Accel::Dshufti {
                lo1: mask(16),
                hi1: mask(32),
                lo2: mask(48),
                hi2: mask(64),
            },
            ACCEL_TRUFFLE => {
                Accel::Truffle { mask1: mask(16), mask2: mask(32) }
            }
            t => panic!("invalid acceleration type tag: {}", t),
        }
    }
}

/// The escape structure of one state: which bytes leave it, and which
/// two-byte sequences leave both it and the state the first byte reaches.
#[derive(Debug, Default)]
pub(crate) struct EscapeInfo {
    /// Bytes whose transition leads away from the state.
    pub(crate) outs: ByteSet,
    /// Two-byte sequences `(c, d)` where `c` leaves the state and the
    /// reached state's transition on `d` also diverges from this state's.
    pub(crate) outs2: BTreeSet<(u8, u8)>,
    /// First bytes that individually generate too many pairs, promoted out
    /// of `outs2` wholesale.
    pub(crate) outs2_single: ByteSet,
    /// Two-byte analysis is unusable: a pair overflow, or a first hop that
    /// raises reports the runtime must not skip.
    pub(crate) outs2_broken: bool,
}

/// Computes the escape structure of `this_idx`.
pub(crate) fn find_escape_strings(
    raw: &RawDfa,
    this_idx: StateId,
) -> EscapeInfo {
    let state = &raw.states[this_idx as usize];
    let mut out = EscapeInfo::default();

    for i in 0..=0xFFu8 {
        let next_i = state.next[raw.alpha_remap[i as usize] as usize];
        if next_i == this_idx {
            continue;
        }
        out.outs.add(i);

        trace!("next is {}", next_i);
        let raw_next = &raw.states[next_i as usize];

        if !raw_next.reports.is_empty() && raw.kind.generates_callbacks() {
            // Cannot accelerate over reports.
            trace!("leads to report");
            out.outs2_broken = true;
        }
        if out.outs2_broken {
            continue;
        }

        let mut outs2_local = BTreeSet::new();
        for j in 0..=0xFFu8 {
            let jsym = raw.alpha_remap[j as usize] as usize;
            if raw_next.next[jsym] == state.next[jsym] {
                continue;
            }
            trace!("adding {:02x} {:02x} -> {}", i, j, raw_next.next[jsym]);
            outs2_local.insert((i, j));
        }

        if outs2_local.len() > 8 {
            trace!("adding {:02x} to outs2_single", i);
            out.outs2_single.add(i);
        } else {
            out.outs2.extend(outs2_local);
        }
        if out.outs2.len() > 8 {
            trace!("outs2 too big");
            out.outs2_broken = true;
        }
    }
    out
}

/// Whether the state can be accelerated at all, before any primitive is
/// chosen. The dead state never is; a report-bearing state of a
/// callback-raising DFA never is; otherwise the state qualifies when few
/// enough bytes escape it, with a looser budget for the SDS proxy.
pub(crate) fn is_accel(
    raw: &RawDfa,
    sds_or_proxy: StateId,
    this_idx: StateId,
) -> bool {
    if this_idx == DEAD_STATE {
        return false;
    }

    // While we can't accelerate while we are spamming out callbacks, the
    // query paths don't raise reports during scanning so those kinds can
    // accelerate report states.
    if raw.kind.generates_callbacks()
        && !raw.states[this_idx as usize].reports.is_empty()
    {
        return false;
    }

    let single_limit = if this_idx == sds_or_proxy {
        ACCEL_MAX_FLOATING_STOP_CHAR
    } else {
        ACCEL_MAX_STOP_CHAR
    };
    trace!("inspecting {}/{}: {}", this_idx, sds_or_proxy, single_limit);

    let mut out = ByteSet::empty();
    for i in 0..=0xFFu8 {
        if raw.next_on_byte(this_idx, i) != this_idx {
            out.add(i);
        }
    }

    if out.len() <= single_limit {
        trace!("state {} should be accelerable {}", this_idx, out.len());
        return true;
    }
    trace!("state {} is not accelerable has {}", this_idx, out.len());
    false
}

/// Whether `s` loops back to itself on any symbol other than TOP.
fn has_self_loop(raw: &RawDfa, s: StateId) -> bool {
    let top_remap = raw.alpha_remap[TOP];
    let state = &raw.states[s as usize];
    for (i, &t) in state.next.iter().enumerate() {
        if i as u16 != top_remap && t == s {
            return true;
        }
    }
    false
}

/// Finds the state the scanner will spend most of its time in: the
/// floating start if there is one, otherwise the nearest self-looping
/// state reachable from the anchored start. Returns the dead state when
/// the reachable component has no self loop at all, which silently
/// disables the looser SDS acceleration budget for this DFA.
pub(crate) fn sds_or_proxy(raw: &RawDfa) -> StateId {
    if raw.start_floating != DEAD_STATE {
        trace!("has floating start");
        return raw.start_floating;
    }

    trace!("looking for SDS proxy");
    let mut s = raw.start_anchored;
    if has_self_loop(raw, s) {
        return s;
    }

    let top_remap = raw.alpha_remap[TOP];
    let mut seen = BTreeSet::new();
    loop {
        seen.insert(s);
        trace!("basis {}", s);

        // Check if we are connected to a state with a self loop.
        let state = &raw.states[s as usize];
        for (i, &t) in state.next.iter().enumerate() {
            if i as u16 != top_remap && t != DEAD_STATE && has_self_loop(raw, t)
            {
                return t;
            }
        }

        // Find a neighbour to use as the next basis for the search.
        let mut t = DEAD_STATE;
        for (i, &tt) in state.next.iter().enumerate() {
            if i as u16 != top_remap && tt != DEAD_STATE && !seen.contains(&tt)
            {
                t = tt;
                break;
            }
        }
        if t == DEAD_STATE {
            // We were unable to find a state to use as a SDS proxy.
            return DEAD_STATE;
        }
        s = t;
        seen.insert(t);
    }
}

/// Builds the acceleration record for `this_idx`, which must have passed
/// [`is_accel`]. The first primitive whose conditions hold wins; `NONE`
/// and `TRUFFLE` between them guarantee the chain always terminates.
pub(crate) fn build_accel(raw: &RawDfa, this_idx: StateId) -> Accel {
    let esc = find_escape_strings(raw, this_idx);

    if !esc.outs2_broken
        && esc.outs2_single.is_empty()
        && esc.outs2.len() == 1
    {
        let &(c1, c2) = esc.outs2.iter().next().unwrap();
        trace!("state {} is double vermicelli", this_idx);
        return Accel::Dverm { c1, c2 };
    }

    if !esc.outs2_broken
        && esc.outs2_single.is_empty()
        && (esc.outs2.len() == 2 || esc.outs2.len() == 4)
    {
        let &(first, second) = esc.outs2.iter().next().unwrap();
        let (c1, c2) = (first & CASE_CLEAR, second & CASE_CLEAR);
        let ok = esc
            .outs2
            .iter()
            .all(|&(a, b)| a & CASE_CLEAR == c1 && b & CASE_CLEAR == c2);
        if ok {
            trace!("state {} is nc double vermicelli", this_idx);
            return Accel::DvermNocase { c1, c2 };
        }
    }

    if !esc.outs2_broken
        && esc.outs2_single.len() + esc.outs2.len() <= 8
        && esc.outs2_single.len() < esc.outs2.len()
        && esc.outs2_single.len() <= 2
        && !esc.outs2.is_empty()
    {
        let (lo1, hi1, lo2, hi2) =
            shufti_build_double_masks(&esc.outs2_single, &esc.outs2);
        trace!("state {} is double shufti", this_idx);
        return Accel::Dshufti { lo1, hi1, lo2, hi2 };
    }

    if esc.outs.is_empty() {
        trace!("state {} is a dead end with no escape", this_idx);
        return Accel::RedTape;
    }

    if esc.outs.len() == 1 {
        trace!("state {} is vermicelli", this_idx);
        return Accel::Verm { c: esc.outs.first().unwrap() };
    }

    if esc.outs.is_caseless_pair() {
        trace!("state {} is caseless vermicelli", this_idx);
        return Accel::VermNocase { c: esc.outs.first().unwrap() & CASE_CLEAR };
    }

    if esc.outs.len() > ACCEL_MAX_FLOATING_STOP_CHAR {
        trace!("state {} is too broad", this_idx);
        return Accel::None;
    }

    if let Some((lo, hi)) = shufti_build_masks(&esc.outs) {
        trace!("state {} is shufti", this_idx);
        return Accel::Shufti { lo, hi };
    }

    debug_assert!(!esc.outs.is_empty());
    trace!("state {} is truffle", this_idx);
    let (mask1, mask2) = truffle_build_masks(&esc.outs);
    Accel::Truffle { mask1, mask2 }
}

/// Builds shufti masks for a byte set: one bucket per distinct high
/// nibble, a byte matching when `lo[b & 0xf] & hi[b >> 4]` is non-zero.
/// Fails when the set spans more than eight high nibbles, in which case
/// the caller falls back to truffle.
fn shufti_build_masks(set: &ByteSet) -> Option<([u8; 16], [u8; 16])> {
    let mut bucket_of = [0xFFu8; 16];
    let mut nbuckets: u8 = 0;
    for b in set.iter() {
        let hi = (b >> 4) as usize;
        if bucket_of[hi] == 0xFF {
            if nbuckets == 8 {
                return None;
            }
            bucket_of[hi] = nbuckets;
            nbuckets += 1;
        }
    }

    let mut lo = [0u8; 16];
    let mut hi = [0u8; 16];
    for b in set.iter() {
        let bit = 1u8 << bucket_of[(b >> 4) as usize];
        lo[(b & 0xF) as usize] |= bit;
        hi[(b >> 4) as usize] |= bit;
    }
    Some((lo, hi))
}

/// Builds double-shufti masks: one bucket per two-byte sequence and one
/// per promoted single byte. The caller has already bounded the total at
/// eight. A promoted single byte sets its bucket bit in every second-byte
/// slot, so any following byte completes the match.
fn shufti_build_double_masks(
    singles: &ByteSet,
    pairs: &BTreeSet<(u8, u8)>,
) -> ([u8; 16], [u8; 16], [u8; 16], [u8; 16]) {
    assert!(singles.len() + pairs.len() <= 8);
    let mut lo1 = [0u8; 16];
    let mut hi1 = [0u8; 16];
    let mut lo2 = [0u8; 16];
    let mut hi2 = [0u8; 16];

    let mut bucket: u8 = 0;
    for &(c, d) in pairs.iter() {
        let bit = 1u8 << bucket;
        bucket += 1;
        lo1[(c & 0xF) as usize] |= bit;
        hi1[(c >> 4) as usize] |= bit;
        lo2[(d & 0xF) as usize] |= bit;
        hi2[(d >> 4) as usize] |= bit;
    }
    for c in singles.iter() {
        let bit = 1u8 << bucket;
        bucket += 1;
        lo1[(c & 0xF) as usize] |= bit;
        hi1[(c >> 4) as usize] |= bit;
        for n in 0..16 {
            lo2[n] |= bit;
            hi2[n] |= bit;
        }
    }
    (lo1, hi1, lo2, hi2)
}

/// Builds truffle masks, which represent any byte set exactly: `mask1`
/// covers 0x00-0x7F and `mask2` covers 0x80-0xFF, each indexed by the low
/// nibble with one bit per 16-byte block.
fn truffle_build_masks(set: &ByteSet) -> ([u8; 16], [u8; 16]) {
    let mut mask1 = [0u8; 16];
    let mut mask2 = [0u8; 16];
    for b in set.iter() {
        if b < 0x80 {
            mask1[(b & 0xF) as usize] |= 1 << (b >> 4);
        } else {
            mask2[(b & 0xF) as usize] |= 1 << ((b & 0x7F) >> 4);
        }
    }
    (mask1, mask2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dfa::raw::{DfaKind, ALPHABET_SIZE};

    // A full byte alphabet: every byte is its own symbol, TOP is 256.
    fn identity_remap() -> [u16; ALPHABET_SIZE] {
        let mut remap = [0u16; ALPHABET_SIZE];
        for i in 0..ALPHABET_SIZE {
            remap[i] = i as u16;
        }
        remap
    }

    fn full_alpha_dfa() -> RawDfa {
        RawDfa::new(ALPHABET_SIZE as u16, identity_remap())
    }

    // A state looping to itself everywhere except the listed bytes, which
    // all lead to `to`.
    fn looped_row(this: StateId, escapes: &[u8], to: StateId) -> Vec<StateId> {
        let mut row = vec![this; ALPHABET_SIZE];
        for &b in escapes {
            row[b as usize] = to;
        }
        row
    }

    #[test]
    fn single_escape_is_vermicelli() {
        let mut raw = full_alpha_dfa();
        let s = raw.add_state(&looped_row(1, &[b'x'], DEAD_STATE));
        assert!(is_accel(&raw, DEAD_STATE, s));
        assert_eq!(Accel::Verm { c: b'x' }, build_accel(&raw, s));
    }

    #[test]
    fn caseless_escape_pair_is_nocase_vermicelli() {
        let mut raw = full_alpha_dfa();
        let s = raw.add_state(&looped_row(1, &[b'q', b'Q'], DEAD_STATE));
        assert_eq!(Accel::VermNocase { c: b'Q' }, build_accel(&raw, s));
    }

    #[test]
    fn single_pair_is_double_vermicelli() {
        let mut raw = full_alpha_dfa();
        // State 1 leaves on 'x' to state 2, which only diverges from
        // state 1 on 'y'.
        let s1 = raw.add_state(&looped_row(1, &[b'x'], 2));
        let mut row2 = looped_row(1, &[b'x'], 2);
        row2[b'y' as usize] = 3;
        let s2 = raw.add_state(&row2);
        let s3 = raw.add_state(&looped_row(3, &[], DEAD_STATE));
        assert_eq!((1, 2, 3), (s1, s2, s3));

        let esc = find_escape_strings(&raw, s1);
        assert_eq!(1, esc.outs.len());
        assert!(esc.outs2_single.is_empty());
        assert!(!esc.outs2_broken);
        assert_eq!(Accel::Dverm { c1: b'x', c2: b'y' }, build_accel(&raw, s1));
    }

    #[test]
    fn case_square_is_nocase_double_vermicelli() {
        let mut raw = full_alpha_dfa();
        let s1 = raw.add_state(&looped_row(1, &[b'A', b'a'], 2));
        let mut row2 = looped_row(1, &[b'A', b'a'], 2);
        row2[b'B' as usize] = 3;
        row2[b'b' as usize] = 3;
        raw.add_state(&row2);
        raw.add_state(&looped_row(3, &[], DEAD_STATE));

        let esc = find_escape_strings(&raw, s1);
        assert_eq!(4, esc.outs2.len());
        assert_eq!(
            Accel::DvermNocase { c1: b'A', c2: b'B' },
            build_accel(&raw, s1)
        );
    }

    #[test]
    fn sink_state_is_red_tape() {
        let mut raw = full_alpha_dfa();
        let s = raw.add_state(&looped_row(1, &[], DEAD_STATE));
        assert_eq!(Accel::RedTape, build_accel(&raw, s));
    }

    #[test]
    fn report_states_of_callback_dfas_never_accelerate() {
        let mut raw = full_alpha_dfa();
        let s = raw.add_state(&looped_row(1, &[b'x'], DEAD_STATE));
        raw.states[s as usize].reports.insert(42);
        assert_eq!(DfaKind::Outfix, raw.kind);
        assert!(!is_accel(&raw, DEAD_STATE, s));

        // Engines queried at block boundaries may accelerate them.
        raw.kind = DfaKind::Prefix;
        assert!(is_accel(&raw, DEAD_STATE, s));
    }

    #[test]
    fn sds_budget_is_looser() {
        let mut raw = full_alpha_dfa();
        // 170 escaping bytes: over the ordinary budget, within the SDS one.
        let escapes = (0..170).map(|i| i as u8).collect::<Vec<u8>>();
        let s = raw.add_state(&looped_row(1, &escapes, DEAD_STATE));
        assert!(!is_accel(&raw, DEAD_STATE, s));
        assert!(is_accel(&raw, s, s));
    }

    #[test]
    fn reports_on_first_hop_break_double_byte_analysis() {
        let mut raw = full_alpha_dfa();
        let s1 = raw.add_state(&looped_row(1, &[b'x'], 2));
        let mut row2 = looped_row(1, &[b'x'], 2);
        row2[b'y' as usize] = 3;
        raw.add_state(&row2);
        raw.add_state(&looped_row(3, &[], DEAD_STATE));
        raw.states[2].reports.insert(9);

        let esc = find_escape_strings(&raw, s1);
        assert!(esc.outs2_broken);
        // Falls through to plain vermicelli on the single escape byte.
        assert_eq!(Accel::Verm { c: b'x' }, build_accel(&raw, s1));
    }

    #[test]
    fn shufti_masks_match_exactly() {
        let mut set = ByteSet::empty();
        for b in [b'a', b'z', 0x03, 0x91, 0xF0] {
            set.add(b);
        }
        let (lo, hi) = shufti_build_masks(&set).unwrap();
        for b in 0..=0xFFu8 {
            let hit = lo[(b & 0xF) as usize] & hi[(b >> 4) as usize] != 0;
            assert_eq!(set.contains(b), hit, "byte {:#04x}", b);
        }
    }

    #[test]
    fn shufti_masks_fail_past_eight_high_nibbles() {
        let mut set = ByteSet::empty();
        for n in 0..9u8 {
            set.add(n << 4);
        }
        assert!(shufti_build_masks(&set).is_none());
    }

    #[test]
    fn truffle_masks_match_everything() {
        let mut set = ByteSet::empty();
        for b in [0x00, 0x7F, 0x80, 0xFF, b'm'] {
            set.add(b);
        }
        let (m1, m2) = truffle_build_masks(&set);
        for b in 0..=0xFFu8 {
            let hit = if b < 0x80 {
                m1[(b & 0xF) as usize] & (1 << (b >> 4)) != 0
            } else {
                m2[(b & 0xF) as usize] & (1 << ((b & 0x7F) >> 4)) != 0
            };
            assert_eq!(set.contains(b), hit, "byte {:#04x}", b);
        }
    }

    #[test]
    fn sds_proxy_walk() {
        // Floating start wins outright.
        let mut raw = full_alpha_dfa();
        let s = raw.add_state(&looped_row(1, &[b'x'], DEAD_STATE));
        raw.start_floating = s;
        assert_eq!(s, sds_or_proxy(&raw));

        // No floating start: an anchored start with a self loop is its
        // own proxy.
        raw.start_floating = DEAD_STATE;
        raw.start_anchored = s;
        assert_eq!(s, sds_or_proxy(&raw));

        // A loop-free chain into a self-looping state finds that state.
        let mut raw = full_alpha_dfa();
        let mut row1 = vec![DEAD_STATE; ALPHABET_SIZE];
        row1[b'a' as usize] = 2;
        let s1 = raw.add_state(&row1);
        raw.add_state(&looped_row(2, &[b'b'], DEAD_STATE));
        raw.start_anchored = s1;
        assert_eq!(2, sds_or_proxy(&raw));

        // A component with no self loop anywhere yields the dead state,
        // quietly keeping the tighter budget for every state.
        let mut raw = full_alpha_dfa();
        let mut row1 = vec![DEAD_STATE; ALPHABET_SIZE];
        row1[b'a' as usize] = 2;
        let s1 = raw.add_state(&row1);
        let mut row2 = vec![DEAD_STATE; ALPHABET_SIZE];
        row2[b'b' as usize] = 1;
        raw.add_state(&row2);
        raw.start_anchored = s1;
        assert_eq!(DEAD_STATE, sds_or_proxy(&raw));
    }

    #[test]
    fn vermicelli_agrees_with_memchr() {
        // The stop byte the analysis picks is exactly what a memchr for
        // it would find first when simulating the raw DFA.
        let mut raw = full_alpha_dfa();
        let s = raw.add_state(&looped_row(1, &[b'x'], DEAD_STATE));
        let c = match build_accel(&raw, s) {
            Accel::Verm { c } => c,
            a => panic!("expected vermicelli, got {:?}", a),
        };

        let haystack = b"aaaaaaaaaaaaaaaaaaaaaaaaaaxbbbb";
        let found = memchr::memchr(c, haystack);

        let mut stepped = None;
        let mut cur = s;
        for (i, &b) in haystack.iter().enumerate() {
            let nxt = raw.next_on_byte(cur, b);
            if nxt != cur {
                stepped = Some(i);
                break;
            }
            cur = nxt;
        }
        assert_eq!(stepped, found);
    }
}
