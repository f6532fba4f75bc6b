/*!
The compiled image: an owned, over-aligned byte blob with a fixed header
and offset-addressed regions, plus typed accessors over it.

All offsets are computed before the blob is allocated, so assembly writes
it linearly; nothing in here requires external metadata to decode. All
multi-byte fields are little-endian. The regions of a 16-bit image, in
order:

```text
[ engine header ][ mcclellan header ]
[ transition table: sherman_limit rows x (1 << alpha_shift) x u16 ]
-> aux_offset (16 byte aligned):
[ aux record x state_count ][ report lists ]
-> accel_offset (32 byte aligned; stored relative to mcclellan header):
[ accel record x accel_count ]
-> sherman_offset (16 byte aligned):
[ sherman record x sherman_count ]
```

An 8-bit image has no sherman region and its transition table holds
`state_count` rows of `u8` entries. The successor arrays inside sherman
records sit at whatever offset the variable-length symbol list leaves
them at, and are always accessed through explicit unaligned operations.
*/

use crate::{
    dfa::{
        accel::{Accel, ACCEL_AUX_SIZE},
        raw::StateId,
    },
    util,
};

/// Total size of the engine-generic header at the start of the image.
pub(crate) const NFA_HEADER_SIZE: usize = 32;

/// Total size of the mcclellan-specific header that follows it.
pub(crate) const MCCLELLAN_HEADER_SIZE: usize = 304;

/// Offset of the packed transition table (16 byte aligned by
/// construction).
pub(crate) const TRANS_OFFSET: usize = NFA_HEADER_SIZE + MCCLELLAN_HEADER_SIZE;

/// Image type tag for the 8-bit representation.
pub const MCCLELLAN_NFA_8: u8 = 0;

/// Image type tag for the 16-bit representation.
pub const MCCLELLAN_NFA_16: u8 = 1;

/// Engine header flag: some state raises reports at end of data.
pub(crate) const NFA_ACCEPTS_EOD: u8 = 1 << 0;

/// Mcclellan header flag: all accepts raise the single `arb_report`.
pub(crate) const MCCLELLAN_FLAG_SINGLE: u8 = 1 << 0;

/// Flag bit stamped on a stored 16-bit successor whose target accepts.
pub const ACCEPT_FLAG: u16 = 0x8000;

/// Flag bit stamped on a stored 16-bit successor whose target is
/// accelerable.
pub const ACCEL_FLAG: u16 = 0x4000;

/// The bits of a stored 16-bit successor that form the state index.
pub const STATE_MASK: u16 = 0x3FFF;

/// Size of one per-state aux record.
pub(crate) const AUX_SIZE: usize = 16;

/// Size of one sherman record. Fixed regardless of override list length.
pub(crate) const SHERMAN_FIXED_SIZE: usize = 32;

/// Type tag of a sherman record.
pub(crate) const SHERMAN_STATE: u8 = 1;

// Engine header field offsets.
const H_LENGTH: usize = 0;
const H_TYPE: usize = 4;
const H_FLAGS: usize = 5;
const H_NPOSITIONS: usize = 8;
const H_SCRATCH_STATE_SIZE: usize = 12;
const H_STREAM_STATE_SIZE: usize = 16;

// Mcclellan header field offsets, relative to NFA_HEADER_SIZE.
const M_REMAP: usize = 0;
const M_ALPHA_SHIFT: usize = 256;
const M_HAS_ACCEL: usize = 257;
const M_FLAGS: usize = 258;
const M_LENGTH: usize = 260;
const M_AUX_OFFSET: usize = 264;
const M_ACCEL_OFFSET: usize = 268;
const M_ARB_REPORT: usize = 272;
const M_STATE_COUNT: usize = 276;
const M_START_ANCHORED: usize = 278;
const M_START_FLOATING: usize = 280;
const M_SHERMAN_LIMIT: usize = 282;
const M_SHERMAN_OFFSET: usize = 284;
const M_SHERMAN_END: usize = 288;
const M_ACCEL_LIMIT_8: usize = 292;
const M_ACCEPT_LIMIT_8: usize = 294;

// Sherman record field offsets.
const SHERMAN_TYPE_OFFSET: usize = 0;
const SHERMAN_LEN_OFFSET: usize = 1;
const SHERMAN_DADDY_OFFSET: usize = 2;
const SHERMAN_CHARS_OFFSET: usize = 4;

/// Offset of the override successor array within a sherman record. A one
/// byte pad after an odd-length symbol list keeps the array at an even
/// record offset; access still goes through unaligned loads and stores
/// since the image guarantees nothing about the absolute address.
pub(crate) fn sherman_states_offset(len: usize) -> usize {
    SHERMAN_CHARS_OFFSET + len + (len & 1)
}

/// The per-state auxiliary record: where the state's report lists live,
/// its successor on the TOP trigger, and its acceleration record if any.
///
/// `accept`/`accept_eod` are absolute image offsets (zero meaning "does
/// not accept"); `accel_offset` is relative to the mcclellan header (zero
/// meaning "not accelerable").
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StateAux {
    /// Absolute offset of the accept report list, or zero.
    pub accept: u32,
    /// Absolute offset of the end-of-data report list, or zero.
    pub accept_eod: u32,
    /// Implementation id of the successor on TOP.
    pub top: u16,
    /// Header-relative offset of the acceleration record, or zero.
    pub accel_offset: u32,
}

/// A decoded view of one sherman record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShermanRecord {
    /// Implementation id of the daddy state.
    pub daddy: StateId,
    /// The symbols on which this state overrides its daddy.
    pub chars: Vec<u8>,
    /// The overriding successors, flag bits included.
    pub succs: Vec<u16>,
}

/// A compiled McClellan DFA image.
///
/// The backing buffer is allocated with initial padding so that
/// [`DfaImage::as_bytes`] starts on a 64 byte boundary, satisfying the
/// cache-line alignment the runtime expects of the header.
pub struct DfaImage {
    buf: Vec<u8>,
    pad: usize,
}

impl DfaImage {
    /// Allocate a zeroed image of `size` bytes, 64 byte aligned.
    pub(crate) fn new(size: usize) -> DfaImage {
        // There is no direct way to over-align a Vec<u8>, so allocate
        // slack and skip to the first aligned byte.
        let mut buf = vec![0u8; size + 63];
        let address = buf.as_ptr() as usize;
        let pad = (64 - (address & 63)) & 63;
        buf.truncate(pad + size);
        DfaImage { buf, pad }
    }

    /// The serialized image.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[self.pad..]
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        let pad = self.pad;
        &mut self.buf[pad..]
    }

    fn read_u8(&self, at: usize) -> u8 {
        self.as_bytes()[at]
    }

    fn read_u16(&self, at: usize) -> u16 {
        util::read_u16_unaligned(&self.as_bytes()[at..])
    }

    fn read_u32(&self, at: usize) -> u32 {
        util::read_u32(&self.as_bytes()[at..])
    }

    fn write_u8(&mut self, at: usize, v: u8) {
        self.as_bytes_mut()[at] = v;
    }

    fn write_u16(&mut self, at: usize, v: u16) {
        util::write_u16_unaligned(&mut self.as_bytes_mut()[at..], v);
    }

    fn write_u32(&mut self, at: usize, v: u32) {
        util::write_u32(&mut self.as_bytes_mut()[at..], v);
    }

    // ---- engine header ----

    /// Total length of the image in bytes, as recorded in the header.
    pub fn length(&self) -> u32 {
        self.read_u32(H_LENGTH)
    }

    /// The image type tag: [`MCCLELLAN_NFA_8`] or [`MCCLELLAN_NFA_16`].
    pub fn image_type(&self) -> u8 {
        self.read_u8(H_TYPE)
    }

    /// Whether this is the narrow 8-bit representation.
    pub fn is_8bit(&self) -> bool {
        self.image_type() == MCCLELLAN_NFA_8
    }

    /// Whether any state raises reports at end of data.
    pub fn accepts_eod(&self) -> bool {
        self.read_u8(H_FLAGS) & NFA_ACCEPTS_EOD != 0
    }

    /// The number of states, as recorded in the engine header.
    pub fn n_positions(&self) -> u32 {
        self.read_u32(H_NPOSITIONS)
    }

    /// Bytes of scratch state the runtime must reserve: the successor
    /// width.
    pub fn scratch_state_size(&self) -> u32 {
        self.read_u32(H_SCRATCH_STATE_SIZE)
    }

    /// Bytes of stream state the runtime must reserve: the successor
    /// width.
    pub fn stream_state_size(&self) -> u32 {
        self.read_u32(H_STREAM_STATE_SIZE)
    }

    // ---- mcclellan header ----

    /// The remapped symbol for a raw input byte.
    pub fn remap(&self, byte: u8) -> u8 {
        self.read_u8(NFA_HEADER_SIZE + M_REMAP + byte as usize)
    }

    /// The shift converting an implementation id to its transition row
    /// index.
    pub fn alpha_shift(&self) -> u8 {
        self.read_u8(NFA_HEADER_SIZE + M_ALPHA_SHIFT)
    }

    /// Whether any state carries an acceleration record.
    pub fn has_accel(&self) -> bool {
        self.read_u8(NFA_HEADER_SIZE + M_HAS_ACCEL) != 0
    }

    /// Whether every accept raises the single [`DfaImage::arb_report`].
    pub fn is_single_report(&self) -> bool {
        self.read_u8(NFA_HEADER_SIZE + M_FLAGS) & MCCLELLAN_FLAG_SINGLE != 0
    }

    /// An arbitrary report of this DFA; the only report when
    /// [`DfaImage::is_single_report`] holds.
    pub fn arb_report(&self) -> u32 {
        self.read_u32(NFA_HEADER_SIZE + M_ARB_REPORT)
    }

    /// The number of states.
    pub fn state_count(&self) -> u16 {
        self.read_u16(NFA_HEADER_SIZE + M_STATE_COUNT)
    }

    /// Implementation id of the anchored start state.
    pub fn start_anchored(&self) -> StateId {
        self.read_u16(NFA_HEADER_SIZE + M_START_ANCHORED)
    }

    /// Implementation id of the floating start state (the dead state when
    /// there is none).
    pub fn start_floating(&self) -> StateId {
        self.read_u16(NFA_HEADER_SIZE + M_START_FLOATING)
    }

    /// Absolute offset of the aux record array.
    pub fn aux_offset(&self) -> u32 {
        self.read_u32(NFA_HEADER_SIZE + M_AUX_OFFSET)
    }

    /// Header-relative offset of the acceleration region.
    pub fn accel_offset(&self) -> u32 {
        self.read_u32(NFA_HEADER_SIZE + M_ACCEL_OFFSET)
    }

    /// First implementation id stored as a sherman record; every id below
    /// it has a row in the packed transition table. 16-bit images only.
    pub fn sherman_limit(&self) -> u16 {
        self.read_u16(NFA_HEADER_SIZE + M_SHERMAN_LIMIT)
    }

    /// Absolute offset of the sherman region. 16-bit images only.
    pub fn sherman_offset(&self) -> u32 {
        self.read_u32(NFA_HEADER_SIZE + M_SHERMAN_OFFSET)
    }

    /// Absolute offset one past the sherman region. 16-bit images only.
    pub fn sherman_end(&self) -> u32 {
        self.read_u32(NFA_HEADER_SIZE + M_SHERMAN_END)
    }

    /// First implementation id of the accelerable-but-not-accepting zone.
    /// 8-bit images only.
    pub fn accel_limit_8(&self) -> u16 {
        self.read_u16(NFA_HEADER_SIZE + M_ACCEL_LIMIT_8)
    }

    /// First implementation id of the accept-bearing zone. 8-bit images
    /// only.
    pub fn accept_limit_8(&self) -> u16 {
        self.read_u16(NFA_HEADER_SIZE + M_ACCEPT_LIMIT_8)
    }

    // ---- header writers ----

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn write_basic_info(
        &mut self,
        state_size: usize,
        total_size: usize,
        n_states: usize,
        remap: &[u16],
        alpha_shift: u8,
        aux_offset: u32,
        accel_offset: u32,
        accel_count: u32,
        arb_report: u32,
        single: bool,
    ) {
        assert!(state_size == 1 || state_size == 2);
        self.write_u32(H_LENGTH, total_size as u32);
        self.write_u8(
            H_TYPE,
            if state_size == 1 { MCCLELLAN_NFA_8 } else { MCCLELLAN_NFA_16 },
        );
        self.write_u32(H_NPOSITIONS, n_states as u32);
        self.write_u32(H_SCRATCH_STATE_SIZE, state_size as u32);
        self.write_u32(H_STREAM_STATE_SIZE, state_size as u32);

        for i in 0..256 {
            debug_assert!(remap[i] <= 0xFF);
            self.write_u8(NFA_HEADER_SIZE + M_REMAP + i, remap[i] as u8);
        }
        self.write_u8(NFA_HEADER_SIZE + M_ALPHA_SHIFT, alpha_shift);
        self.write_u32(NFA_HEADER_SIZE + M_LENGTH, total_size as u32);
        self.write_u32(NFA_HEADER_SIZE + M_AUX_OFFSET, aux_offset);
        self.write_u32(NFA_HEADER_SIZE + M_ACCEL_OFFSET, accel_offset);
        self.write_u32(NFA_HEADER_SIZE + M_ARB_REPORT, arb_report);
        self.write_u16(NFA_HEADER_SIZE + M_STATE_COUNT, n_states as u16);
        self.write_u8(
            NFA_HEADER_SIZE + M_HAS_ACCEL,
            if accel_count != 0 { 1 } else { 0 },
        );
        if single {
            let flags = self.read_u8(NFA_HEADER_SIZE + M_FLAGS);
            self.write_u8(NFA_HEADER_SIZE + M_FLAGS, flags | MCCLELLAN_FLAG_SINGLE);
        }
    }

    pub(crate) fn set_starts(&mut self, anchored: StateId, floating: StateId) {
        self.write_u16(NFA_HEADER_SIZE + M_START_ANCHORED, anchored);
        self.write_u16(NFA_HEADER_SIZE + M_START_FLOATING, floating);
    }

    pub(crate) fn set_sherman_region(
        &mut self,
        offset: u32,
        end: u32,
        limit: u16,
    ) {
        self.write_u32(NFA_HEADER_SIZE + M_SHERMAN_OFFSET, offset);
        self.write_u32(NFA_HEADER_SIZE + M_SHERMAN_END, end);
        self.write_u16(NFA_HEADER_SIZE + M_SHERMAN_LIMIT, limit);
    }

    pub(crate) fn set_limits_8(&mut self, accel_limit: u16, accept_limit: u16) {
        self.write_u16(NFA_HEADER_SIZE + M_ACCEL_LIMIT_8, accel_limit);
        self.write_u16(NFA_HEADER_SIZE + M_ACCEPT_LIMIT_8, accept_limit);
    }

    pub(crate) fn set_accepts_eod(&mut self) {
        let flags = self.read_u8(H_FLAGS);
        self.write_u8(H_FLAGS, flags | NFA_ACCEPTS_EOD);
    }

    // ---- transition table ----

    /// The stored entry at packed index `idx` of the 16-bit transition
    /// table, flag bits included.
    pub(crate) fn trans16(&self, idx: usize) -> u16 {
        self.read_u16(TRANS_OFFSET + 2 * idx)
    }

    pub(crate) fn set_trans16(&mut self, idx: usize, v: u16) {
        self.write_u16(TRANS_OFFSET + 2 * idx, v);
    }

    pub(crate) fn trans8(&self, idx: usize) -> u8 {
        self.read_u8(TRANS_OFFSET + idx)
    }

    pub(crate) fn set_trans8(&mut self, idx: usize, v: u8) {
        self.write_u8(TRANS_OFFSET + idx, v);
    }

    /// The stored transition table entry for `impl_id` on the remapped
    /// symbol `sym`, widened to `u16`. For 16-bit images the value carries
    /// the accept/accel flag bits; mask with [`STATE_MASK`] to obtain the
    /// successor index. The id must be below the sherman limit for 16-bit
    /// images.
    pub fn trans_entry(&self, impl_id: StateId, sym: u8) -> u16 {
        let idx = ((impl_id as usize) << self.alpha_shift()) + sym as usize;
        if self.is_8bit() {
            u16::from(self.trans8(idx))
        } else {
            debug_assert!(impl_id < self.sherman_limit());
            self.trans16(idx)
        }
    }

    // ---- aux records ----

    fn aux_at(&self, impl_id: StateId) -> usize {
        self.aux_offset() as usize + AUX_SIZE * impl_id as usize
    }

    /// The aux record of `impl_id`.
    pub fn aux(&self, impl_id: StateId) -> StateAux {
        let at = self.aux_at(impl_id);
        StateAux {
            accept: self.read_u32(at),
            accept_eod: self.read_u32(at + 4),
            top: self.read_u16(at + 8),
            accel_offset: self.read_u32(at + 12),
        }
    }

    pub(crate) fn write_aux(&mut self, impl_id: StateId, aux: StateAux) {
        let at = self.aux_at(impl_id);
        self.write_u32(at, aux.accept);
        self.write_u32(at + 4, aux.accept_eod);
        self.write_u16(at + 8, aux.top);
        self.write_u32(at + 12, aux.accel_offset);
    }

    /// The report list at absolute offset `at` (as found in
    /// [`StateAux::accept`]).
    pub fn report_list_at(&self, at: u32) -> Vec<u32> {
        let count = self.read_u32(at as usize) as usize;
        (0..count)
            .map(|i| self.read_u32(at as usize + 4 + 4 * i))
            .collect()
    }

    // ---- accel records ----

    /// The acceleration record of `impl_id`, if it has one.
    pub fn accel(&self, impl_id: StateId) -> Option<Accel> {
        let rel = self.aux(impl_id).accel_offset;
        if rel == 0 {
            return None;
        }
        let at = NFA_HEADER_SIZE + rel as usize;
        Some(Accel::from_bytes(&self.as_bytes()[at..at + ACCEL_AUX_SIZE]))
    }

    pub(crate) fn write_accel(&mut self, rel: u32, accel: &Accel) {
        let at = NFA_HEADER_SIZE + rel as usize;
        accel.write_to(&mut self.as_bytes_mut()[at..at + ACCEL_AUX_SIZE]);
    }

    // ---- sherman records ----

    fn sherman_at(&self, impl_id: StateId) -> usize {
        debug_assert!(!self.is_8bit());
        debug_assert!(impl_id >= self.sherman_limit());
        self.sherman_offset() as usize
            + SHERMAN_FIXED_SIZE * (impl_id - self.sherman_limit()) as usize
    }

    pub(crate) fn write_sherman_record(
        &mut self,
        impl_id: StateId,
        daddy: StateId,
        chars: &[u8],
        succs: &[u16],
    ) {
        assert_eq!(chars.len(), succs.len());
        assert!(chars.len() <= 8);
        let at = self.sherman_at(impl_id);
        debug_assert!(
            sherman_states_offset(chars.len()) + 2 * succs.len()
                <= SHERMAN_FIXED_SIZE
        );
        self.write_u8(at + SHERMAN_TYPE_OFFSET, SHERMAN_STATE);
        self.write_u8(at + SHERMAN_LEN_OFFSET, chars.len() as u8);
        self.write_u16(at + SHERMAN_DADDY_OFFSET, daddy);
        for (i, &c) in chars.iter().enumerate() {
            self.write_u8(at + SHERMAN_CHARS_OFFSET + i, c);
        }
        let states_at = at + sherman_states_offset(chars.len());
        for (i, &succ) in succs.iter().enumerate() {
            self.write_u16(states_at + 2 * i, succ);
        }
    }

    pub(crate) fn sherman_len(&self, impl_id: StateId) -> usize {
        let at = self.sherman_at(impl_id);
        debug_assert_eq!(SHERMAN_STATE, self.read_u8(at + SHERMAN_TYPE_OFFSET));
        self.read_u8(at + SHERMAN_LEN_OFFSET) as usize
    }

    pub(crate) fn sherman_succ(&self, impl_id: StateId, i: usize) -> u16 {
        let at = self.sherman_at(impl_id);
        let len = self.sherman_len(impl_id);
        debug_assert!(i < len);
        self.read_u16(at + sherman_states_offset(len) + 2 * i)
    }

    pub(crate) fn set_sherman_succ(
        &mut self,
        impl_id: StateId,
        i: usize,
        v: u16,
    ) {
        let at = self.sherman_at(impl_id);
        let len = self.sherman_len(impl_id);
        debug_assert!(i < len);
        let states_at = at + sherman_states_offset(len);
        self.write_u16(states_at + 2 * i, v);
    }

    /// A decoded view of the sherman record of `impl_id`, which must be at
    /// or above [`DfaImage::sherman_limit`] in a 16-bit image.
    pub fn sherman(&self, impl_id: StateId) -> ShermanRecord {
        let at = self.sherman_at(impl_id);
        let len = self.sherman_len(impl_id);
        let chars = (0..len)
            .map(|i| self.read_u8(at + SHERMAN_CHARS_OFFSET + i))
            .collect();
        let succs = (0..len).map(|i| self.sherman_succ(impl_id, i)).collect();
        ShermanRecord {
            daddy: self.read_u16(at + SHERMAN_DADDY_OFFSET),
            chars,
            succs,
        }
    }

    // ---- reference decoder ----

    /// Decodes the successor of `impl_id` on the raw input byte `byte`,
    /// flag bits masked off. For sherman states this chases the daddy
    /// pointer exactly as the runtime does: scan the override symbols, and
    /// fall through to the daddy's row on a miss.
    pub fn next_state(&self, impl_id: StateId, byte: u8) -> StateId {
        let sym = self.remap(byte);
        let shift = self.alpha_shift();
        if self.is_8bit() {
            let idx = ((impl_id as usize) << shift) + sym as usize;
            return u16::from(self.trans8(idx));
        }

        let mut s = impl_id;
        loop {
            if s < self.sherman_limit() {
                let idx = ((s as usize) << shift) + sym as usize;
                return self.trans16(idx) & STATE_MASK;
            }
            let at = self.sherman_at(s);
            let len = self.sherman_len(s);
            let hit = (0..len).find(|&i| {
                self.read_u8(at + SHERMAN_CHARS_OFFSET + i) == sym
            });
            if let Some(i) = hit {
                return self.sherman_succ(s, i) & STATE_MASK;
            }
            // Daddies are never sherman states themselves, so this
            // terminates after one hop.
            s = self.read_u16(at + SHERMAN_DADDY_OFFSET);
        }
    }
}

impl core::fmt::Debug for DfaImage {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("DfaImage")
            .field("type", &self.image_type())
            .field("length", &self.length())
            .field("state_count", &self.state_count())
            .finish()
    }
}
