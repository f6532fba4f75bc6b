/*!
The raw DFA: the compiler's input representation.

A raw DFA is a flat table of states over a remapped byte alphabet. State 0
is always the dead state, a non-accepting sink. The remaining states are
expected to be numbered in breadth-first order from the anchored start
state; the compiler stays correct regardless, but its compression
heuristics lean on that ordering to spot frequently visited states, and
degrade silently when it does not hold.
*/

use std::collections::BTreeSet;

use crate::util::byteset::ByteSet;

/// The index of a raw or implementation DFA state.
pub type StateId = u16;

/// The identifier emitted when a pattern matches.
pub type ReportId = u32;

/// The dead state: the non-accepting sink at index 0 whose every
/// transition returns to itself.
pub const DEAD_STATE: StateId = 0;

/// The symbol slot in `alpha_remap` holding the TOP trigger symbol, the
/// internal event that (re)starts an anchored engine mid-stream.
pub const TOP: usize = 256;

/// The size of the remap table: 256 byte values plus TOP.
pub const ALPHABET_SIZE: usize = 257;

/// The number of special (non-byte) symbols at the top of the remapped
/// alphabet. Currently just TOP.
pub const N_SPECIAL_SYMBOL: u16 = 1;

/// What role a DFA plays in the enclosing pattern graph. The compiler only
/// cares whether accepts raise callbacks during scanning: engines that do
/// cannot skip over report-bearing states while accelerating.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DfaKind {
    /// Leads into further literal or engine work; accepts are consumed
    /// internally.
    Prefix,
    /// Connects two literals; accepts are consumed internally.
    Infix,
    /// Runs after a literal and raises its accepts as match callbacks.
    Suffix,
    /// A whole pattern on its own; accepts are raised as match callbacks.
    Outfix,
}

impl DfaKind {
    /// Whether accepts of this DFA are delivered as callbacks during
    /// scanning (as opposed to being queried at block boundaries).
    pub fn generates_callbacks(&self) -> bool {
        matches!(self, DfaKind::Suffix | DfaKind::Outfix)
    }
}

/// A single raw DFA state.
#[derive(Clone, Debug)]
pub struct RawState {
    /// Successor state for each remapped symbol; length equals the DFA's
    /// `alpha_size`.
    pub next: Vec<StateId>,
    /// Reports raised when this state is reached.
    pub reports: BTreeSet<ReportId>,
    /// Reports raised when the data stream ends in this state.
    pub reports_eod: BTreeSet<ReportId>,
    /// Donor state this state's transition row is diffed against. Zero
    /// until the Sherman selector runs; always strictly less than this
    /// state's own index afterwards.
    pub daddy: StateId,
    /// Implementation index assigned by the compiler. Zero until state
    /// numbers are allocated.
    pub impl_id: StateId,
}

impl RawState {
    fn new(next: Vec<StateId>) -> RawState {
        RawState {
            next,
            reports: BTreeSet::new(),
            reports_eod: BTreeSet::new(),
            daddy: 0,
            impl_id: 0,
        }
    }
}

/// A raw deterministic finite automaton over a remapped byte alphabet.
#[derive(Clone, Debug)]
pub struct RawDfa {
    /// The role of this DFA in the enclosing pattern graph.
    pub kind: DfaKind,
    /// All states; index 0 is the dead state.
    pub states: Vec<RawState>,
    /// The state scanning starts in at the beginning of input.
    pub start_anchored: StateId,
    /// The state scanning restarts in after the anchored prefix is
    /// exhausted; the dead state when this DFA has no floating start.
    pub start_floating: StateId,
    /// Number of remapped symbols, including the special symbols.
    pub alpha_size: u16,
    /// Mapping from raw byte (and TOP) to remapped symbol.
    pub alpha_remap: [u16; ALPHABET_SIZE],
}

impl RawDfa {
    /// Create a DFA with the given alphabet and a fresh dead state. The
    /// dead state's transitions all point back at itself.
    pub fn new(alpha_size: u16, alpha_remap: [u16; ALPHABET_SIZE]) -> RawDfa {
        let dead = RawState::new(vec![DEAD_STATE; alpha_size as usize]);
        RawDfa {
            kind: DfaKind::Outfix,
            states: vec![dead],
            start_anchored: DEAD_STATE,
            start_floating: DEAD_STATE,
            alpha_size,
            alpha_remap,
        }
    }

    /// Append a state with the given successor row and return its index.
    ///
    /// # Panics
    ///
    /// When the row length does not match `alpha_size`, or when the DFA
    /// already has `u16::MAX` states.
    pub fn add_state(&mut self, next: &[StateId]) -> StateId {
        assert_eq!(next.len(), self.alpha_size as usize);
        assert!(self.states.len() < u16::MAX as usize);
        let id = self.states.len() as StateId;
        self.states.push(RawState::new(next.to_vec()));
        id
    }

    /// The number of symbols the packed transition tables carry: the
    /// remapped alphabet without the special symbols.
    pub fn impl_alpha_size(&self) -> u16 {
        self.alpha_size - N_SPECIAL_SYMBOL
    }

    /// The successor of `state` on the raw byte `byte`.
    pub fn next_on_byte(&self, state: StateId, byte: u8) -> StateId {
        let sym = self.alpha_remap[byte as usize] as usize;
        self.states[state as usize].next[sym]
    }

    /// If a state generates a given report as a normal accept then it does
    /// not also need to generate an end-of-data report for it: drop the
    /// duplicates. Only valid for block mode scans, where the two flavours
    /// are always inspected together.
    pub fn strip_extra_eod_reports(&mut self) {
        for ds in self.states.iter_mut() {
            for report in ds.reports.iter() {
                ds.reports_eod.remove(report);
            }
        }
    }

    /// Whether any state raises reports at end of data.
    pub fn has_eod_reports(&self) -> bool {
        self.states.iter().any(|ds| !ds.reports_eod.is_empty())
    }

    /// The number of bytes that move the anchored start state somewhere
    /// other than dead. Callers use this to size prefilters; a trivial DFA
    /// reports zero.
    pub fn start_reach_size(&self) -> u32 {
        if self.states.len() < 2 {
            return 0;
        }
        let mut out = ByteSet::empty();
        for i in 0..=0xFF {
            if self.next_on_byte(self.start_anchored, i) != DEAD_STATE {
                out.add(i);
            }
        }
        out.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_class_remap() -> [u16; ALPHABET_SIZE] {
        let mut remap = [0u16; ALPHABET_SIZE];
        remap[b'a' as usize] = 1;
        remap[TOP] = 2;
        remap
    }

    #[test]
    fn dead_state_is_a_sink() {
        let rdfa = RawDfa::new(3, two_class_remap());
        assert_eq!(1, rdfa.states.len());
        for b in 0..=0xFFu8 {
            assert_eq!(DEAD_STATE, rdfa.next_on_byte(DEAD_STATE, b));
        }
        assert_eq!(2, rdfa.impl_alpha_size());
    }

    #[test]
    fn strip_extra_eod_reports_removes_only_the_overlap() {
        let mut rdfa = RawDfa::new(3, two_class_remap());
        let s = rdfa.add_state(&[1, 1, 1]);
        let st = &mut rdfa.states[s as usize];
        st.reports.extend([7, 9]);
        st.reports_eod.extend([7, 11]);

        rdfa.strip_extra_eod_reports();
        let st = &rdfa.states[s as usize];
        assert_eq!(
            vec![11],
            st.reports_eod.iter().copied().collect::<Vec<ReportId>>()
        );
        assert!(rdfa.has_eod_reports());
    }

    #[test]
    fn start_reach_counts_escaping_bytes() {
        let mut rdfa = RawDfa::new(3, two_class_remap());
        // Start moves only on 'a'; everything else falls to dead.
        let s = rdfa.add_state(&[0, 2, 0]);
        let t = rdfa.add_state(&[2, 2, 2]);
        rdfa.start_anchored = s;
        assert_eq!(t, rdfa.next_on_byte(s, b'a'));
        assert_eq!(1, rdfa.start_reach_size());
    }
}
