/*!
The McClellan DFA compiler.

The pipeline, leaves first:

* `alphabet` exposes the remapped alphabet width and the bit shift used
  to index packed transition rows.
* `sherman` chooses, for each state, a parent "daddy" state whose
  transition row this state can be compressed against.
* [`accel`] decides per state whether scanning can be accelerated and
  synthesizes one of several SIMD-friendly primitives.
* [`reports`] deduplicates per-state report sets into an offset-addressed
  table.
* [`image`] defines the byte-exact output layout and a reference decoder.
* [`compile`] allocates implementation state numbers, assembles the image
  and stamps flag bits onto stored successors.

Data flows top-down within one compile: raw DFA, then Sherman marking,
then implementation-index allocation, report gathering, acceleration
decisions and finally assembly.
*/

pub mod accel;
pub mod compile;
pub mod config;
pub mod error;
pub mod image;
pub mod raw;
pub mod reports;

pub(crate) mod alphabet;
pub(crate) mod sherman;
