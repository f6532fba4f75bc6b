/*!
A compiler from raw deterministic finite automata to compact, executable
"McClellan" images.

The input to this crate is a [`RawDfa`]: a logical table of states and
transitions over a remapped byte alphabet, with per-state accept reports.
The output is a [`DfaImage`]: a self-contained byte blob with a fixed
header and offset-addressed regions, laid out exactly as a matching
runtime interpreter expects to consume it.

Compilation performs four intertwined jobs:

* state renumbering under two packed representations (8-bit and 16-bit
  transition entries);
* a space-compressing "Sherman" transformation that stores a state's
  transition row as a short list of overrides against a chosen parent
  ("daddy") state;
* per-state acceleration analysis that picks among several SIMD-friendly
  scanning primitives (vermicelli, shufti, truffle and their double
  variants) for states that are cheap to skip through;
* byte-exact assembly of the image, including in-place stamping of
  accept/accelerate flag bits on stored successor indices.

This crate does not execute matches, does not minimize the input DFA and
does not re-order its states. The input state numbering is assumed to be a
breadth-first ordering from the anchored start state; several compression
heuristics quietly degrade (but remain correct) if it is not.

# Example

```
use mcclellan::{compile, CompileContext, RawDfa, ALPHABET_SIZE, TOP};

// A one state DFA over a two class alphabet that reports continuously
// once entered.
let mut remap = [0u16; ALPHABET_SIZE];
remap[b'a' as usize] = 1;
remap[TOP] = 2;
let mut rdfa = RawDfa::new(3, remap);
let s = rdfa.add_state(&[1, 1, 1]);
rdfa.states[s as usize].reports.insert(7);
rdfa.start_anchored = s;
rdfa.start_floating = s;

let image = compile(&mut rdfa, &CompileContext::default(), None).unwrap();
assert_eq!(2, image.state_count());
assert!(image.is_single_report());
assert_eq!(7, image.arb_report());
assert_eq!(s, rdfa.states[s as usize].impl_id);
```
*/

#![deny(missing_docs)]

pub use crate::dfa::{
    compile::compile,
    config::{CompileContext, Grey},
    error::BuildError,
    image::DfaImage,
    raw::{DfaKind, RawDfa, RawState, ReportId, StateId, ALPHABET_SIZE,
          DEAD_STATE, TOP},
};

#[macro_use]
mod macros;

pub mod dfa;
mod util;
