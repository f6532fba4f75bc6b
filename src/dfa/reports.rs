/*!
Report table construction.

Many states raise the same set of reports, so the image stores each
distinct set once and points at it from the per-state aux records. Sets
are deduplicated under their sorted order; the per-state indirection also
lets the compiler notice the common case where every accepting state
raises one and the same report, which the runtime exploits by skipping
the lookup entirely.
*/

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    dfa::raw::{RawDfa, ReportId},
    util,
};

/// Per-state marker for "this state has no list in the report table".
pub(crate) const INVALID_REPORT_INDEX: u32 = u32::MAX;

/// The deduplicated report lists of a DFA, plus the per-state indices
/// into them.
#[derive(Debug)]
pub(crate) struct GatheredReports {
    /// Distinct report lists in first-seen order.
    rl: Vec<Vec<ReportId>>,
    /// Per state: index into `rl` for the normal accepts, or
    /// [`INVALID_REPORT_INDEX`].
    pub(crate) reports: Vec<u32>,
    /// As `reports`, for the end-of-data accepts.
    pub(crate) reports_eod: Vec<u32>,
    /// An arbitrary report of this DFA; the report when `single` is true.
    pub(crate) arb_report: ReportId,
    /// Every normal accept in the DFA raises exactly one report, and it
    /// is the same one everywhere.
    pub(crate) single: bool,
}

impl GatheredReports {
    /// Total bytes of the serialized report list region.
    pub(crate) fn report_list_size(&self) -> usize {
        self.rl.iter().map(|reps| 4 + 4 * reps.len()).sum()
    }

    /// Serializes every list into `buf` starting at `base_offset` and
    /// returns the absolute offset of each list, indexed like `rl`.
    pub(crate) fn fill_report_lists(
        &self,
        buf: &mut [u8],
        mut base_offset: usize,
    ) -> Vec<u32> {
        let mut offsets = Vec::with_capacity(self.rl.len());
        for reps in self.rl.iter() {
            offsets.push(base_offset as u32);
            util::write_u32(&mut buf[base_offset..], reps.len() as u32);
            let mut at = base_offset + 4;
            for &report in reps.iter() {
                util::write_u32(&mut buf[at..], report);
                at += 4;
            }
            base_offset = at;
        }
        offsets
    }

    #[cfg(test)]
    fn list(&self, idx: u32) -> &[ReportId] {
        &self.rl[idx as usize]
    }
}

/// Deduplicates the accept and end-of-data accept sets of every state.
pub(crate) fn gather_reports(raw: &RawDfa) -> GatheredReports {
    debug!("gathering reports");
    let mut rl: Vec<Vec<ReportId>> = Vec::new();
    let mut rev: BTreeMap<Vec<ReportId>, u32> = BTreeMap::new();
    let mut reports = Vec::with_capacity(raw.states.len());
    let mut reports_eod = Vec::with_capacity(raw.states.len());

    let mut intern = |rrl: Vec<ReportId>,
                      rl: &mut Vec<Vec<ReportId>>|
     -> u32 {
        if let Some(&idx) = rev.get(&rrl) {
            return idx;
        }
        trace!("adding to rl {}", rl.len());
        let idx = rl.len() as u32;
        rev.insert(rrl.clone(), idx);
        rl.push(rrl);
        idx
    };

    for s in raw.states.iter() {
        if s.reports.is_empty() {
            reports.push(INVALID_REPORT_INDEX);
            continue;
        }
        let rrl = s.reports.iter().copied().collect::<Vec<ReportId>>();
        reports.push(intern(rrl, &mut rl));
    }
    for s in raw.states.iter() {
        if s.reports_eod.is_empty() {
            reports_eod.push(INVALID_REPORT_INDEX);
            continue;
        }
        let rrl = s.reports_eod.iter().copied().collect::<Vec<ReportId>>();
        reports_eod.push(intern(rrl, &mut rl));
    }

    let mut arb_report = rl.first().and_then(|l| l.first().copied()).unwrap_or(0);

    // If we have only a single report id generated from all accepts (not
    // eod) we can take some short cuts.
    let mut reps: BTreeSet<ReportId> = BTreeSet::new();
    for &rl_index in reports.iter() {
        if rl_index == INVALID_REPORT_INDEX {
            continue;
        }
        reps.extend(rl[rl_index as usize].iter().copied());
    }
    let single = reps.len() == 1;
    if single {
        arb_report = *reps.iter().next().unwrap();
        debug!("single report -- {}", arb_report);
    }

    GatheredReports { rl, reports, reports_eod, arb_report, single }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dfa::raw::{RawDfa, ALPHABET_SIZE, TOP};

    fn small_dfa(nstates: usize) -> RawDfa {
        let mut remap = [0u16; ALPHABET_SIZE];
        remap[TOP] = 1;
        let mut rdfa = RawDfa::new(2, remap);
        for _ in 1..nstates {
            rdfa.add_state(&[0, 0]);
        }
        rdfa
    }

    #[test]
    fn identical_sets_share_a_list() {
        let mut rdfa = small_dfa(4);
        rdfa.states[1].reports.extend([3, 5]);
        rdfa.states[2].reports.extend([5, 3]);
        rdfa.states[3].reports.insert(5);

        let gathered = gather_reports(&rdfa);
        assert_eq!(INVALID_REPORT_INDEX, gathered.reports[0]);
        assert_eq!(gathered.reports[1], gathered.reports[2]);
        assert_ne!(gathered.reports[1], gathered.reports[3]);
        assert_eq!(&[3, 5], gathered.list(gathered.reports[1]));
        assert!(!gathered.single);
    }

    #[test]
    fn single_report_shortcut() {
        let mut rdfa = small_dfa(3);
        rdfa.states[1].reports.insert(7);
        rdfa.states[2].reports.insert(7);
        // A different EOD report does not defeat the shortcut.
        rdfa.states[2].reports_eod.insert(8);

        let gathered = gather_reports(&rdfa);
        assert!(gathered.single);
        assert_eq!(7, gathered.arb_report);
    }

    #[test]
    fn no_reports_anywhere() {
        let rdfa = small_dfa(2);
        let gathered = gather_reports(&rdfa);
        assert!(!gathered.single);
        assert_eq!(0, gathered.arb_report);
        assert_eq!(0, gathered.report_list_size());
    }

    #[test]
    fn serialization_round_trips() {
        let mut rdfa = small_dfa(3);
        rdfa.states[1].reports.extend([2, 4, 6]);
        rdfa.states[2].reports_eod.insert(9);

        let gathered = gather_reports(&rdfa);
        assert_eq!((4 + 12) + (4 + 4), gathered.report_list_size());

        let mut buf = vec![0u8; 64];
        let offsets = gathered.fill_report_lists(&mut buf, 8);
        assert_eq!(2, offsets.len());
        assert_eq!(8, offsets[0]);
        assert_eq!(3, util::read_u32(&buf[8..]));
        assert_eq!(2, util::read_u32(&buf[12..]));
        assert_eq!(6, util::read_u32(&buf[20..]));
        assert_eq!(24, offsets[1]);
        assert_eq!(1, util::read_u32(&buf[24..]));
        assert_eq!(9, util::read_u32(&buf[28..]));
    }
}
