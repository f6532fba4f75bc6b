/*!
Daddy selection: choosing, for each state, an earlier "donor" state whose
transition row this state can be stored as a diff against.

A Sherman state's row is not written into the packed transition table at
all. Instead the image holds a short record listing the symbols on which
the state disagrees with its daddy, plus the overriding successors; every
other symbol falls through to the daddy's row. Selection is a pure
heuristic: any daddy gives a correct image, a good daddy gives a short
override list.

The veto windows around the start states assume the input is numbered in
breadth-first order, so that low raw indices are the states the scanner
visits most. With a different ordering the vetoes lose their aim but
nothing breaks.
*/

use std::collections::BTreeSet;

use crate::dfa::{
    compile::StateExtra,
    config::Grey,
    raw::{RawDfa, RawState, StateId, DEAD_STATE},
};

/// Longest override list a Sherman record can hold.
pub(crate) const MAX_SHERMAN_LIST_LEN: u16 = 8;

/// States with more self-looping bytes than this stay normal: their row is
/// hot and should not be read through a daddy indirection.
const MAX_SHERMAN_SELF_LOOP: u32 = 20;

fn add_if_earlier(dest: &mut BTreeSet<StateId>, candidate: StateId, max: StateId) {
    if candidate < max {
        dest.insert(candidate);
    }
}

fn add_successors(
    dest: &mut BTreeSet<StateId>,
    source: &RawState,
    alphasize: u16,
    curr_id: StateId,
) {
    for s in 0..alphasize as usize {
        add_if_earlier(dest, source.next[s], curr_id);
    }
}

/// Whether any successor of `root` can step back to `root` or to itself in
/// one symbol. Used to spot a tight cycle near the anchored start, which
/// marks the low raw indices as too hot to compress.
pub(crate) fn is_cyclic_near(raw: &RawDfa, root: StateId) -> bool {
    let alphasize = raw.impl_alpha_size();
    for s in 0..alphasize as usize {
        let succ_id = raw.states[root as usize].next[s];
        if succ_id == DEAD_STATE {
            continue;
        }
        let succ = &raw.states[succ_id as usize];
        for t in 0..alphasize as usize {
            if succ.next[t] == root || succ.next[t] == succ_id {
                return true;
            }
        }
    }
    false
}

/// Picks the best daddy for `curr_id` from a small hinted candidate set and
/// records the choice, then decides whether the state is worth compressing
/// at all. The daddy and agreement count are recorded even when the state
/// stays normal, so later states can chase granddaddy hints.
pub(crate) fn find_better_daddy(
    raw: &mut RawDfa,
    extra: &mut [StateExtra],
    curr_id: StateId,
    using8bit: bool,
    any_cyclic_near_anchored_state: bool,
    grey: &Grey,
) {
    if !grey.allow_sherman_states {
        return;
    }

    let width: u16 = if using8bit { 1 } else { 2 };
    let alphasize = raw.impl_alpha_size();

    if raw.start_anchored != DEAD_STATE
        && any_cyclic_near_anchored_state
        && u32::from(curr_id) < u32::from(alphasize) * 3
    {
        // Crude attempt to prevent frequent states from being sherman'ed;
        // depends on the states being numbered in bfs order.
        trace!("{} is banned", curr_id);
        return;
    }

    if raw.start_floating != DEAD_STATE
        && curr_id >= raw.start_floating
        && u32::from(curr_id) < u32::from(raw.start_floating) + u32::from(alphasize) * 3
    {
        // As above, for the floating start region.
        trace!("{} is banned ({})", curr_id, raw.start_floating);
        return;
    }

    // A record must undercut a full row to be worth it; trivial alphabets
    // can never qualify.
    let full_state_size = width * alphasize;
    let max_list_len =
        MAX_SHERMAN_LIST_LEN.min(full_state_size.saturating_sub(2) / (width + 1));
    let mut best_score: u32 = 0;
    let mut best_daddy: StateId = 0;

    // Set of states to search for a better daddy.
    let mut hinted = BTreeSet::new();
    add_if_earlier(&mut hinted, DEAD_STATE, curr_id);
    add_if_earlier(&mut hinted, raw.start_anchored, curr_id);
    add_if_earlier(&mut hinted, raw.start_floating, curr_id);

    let mydaddy = raw.states[curr_id as usize].daddy;
    if mydaddy != DEAD_STATE {
        add_if_earlier(&mut hinted, mydaddy, curr_id);
        add_successors(
            &mut hinted,
            &raw.states[mydaddy as usize],
            alphasize,
            curr_id,
        );
        let mygranddaddy = raw.states[mydaddy as usize].daddy;
        if mygranddaddy != DEAD_STATE {
            add_if_earlier(&mut hinted, mygranddaddy, curr_id);
            add_successors(
                &mut hinted,
                &raw.states[mygranddaddy as usize],
                alphasize,
                curr_id,
            );
        }
    }

    for &donor in hinted.iter() {
        debug_assert!(donor < curr_id);
        if extra[donor as usize].sherman {
            continue;
        }

        let mut score: u32 = 0;
        for s in 0..alphasize as usize {
            if raw.states[curr_id as usize].next[s]
                == raw.states[donor as usize].next[s]
            {
                score += 1;
            }
        }

        // Prefer lower ids to provide some stability amongst potential
        // siblings.
        if score > best_score || (score == best_score && donor < best_daddy) {
            best_daddy = donor;
            best_score = score;
            if score == u32::from(alphasize) {
                break;
            }
        }
    }

    raw.states[curr_id as usize].daddy = best_daddy;
    extra[curr_id as usize].daddytaken = best_score as u16;
    trace!(
        "{} -> daddy {}: {}/{} transitions taken",
        curr_id,
        best_daddy,
        best_score,
        alphasize
    );

    if best_score + u32::from(max_list_len) < u32::from(alphasize) {
        // Override list would not fit; not profitable.
        return;
    }

    if extra[best_daddy as usize].sherman {
        return;
    }

    let mut self_loop_width: u32 = 0;
    for i in 0..=0xFFu8 {
        if raw.next_on_byte(curr_id, i) == curr_id {
            self_loop_width += 1;
        }
    }
    if self_loop_width > MAX_SHERMAN_SELF_LOOP {
        trace!("{} is banned wide self loop ({})", curr_id, self_loop_width);
        return;
    }

    trace!("{} is sherman", curr_id);
    extra[curr_id as usize].sherman = true;
}
