/*!
The packed-alphabet oracle.

Transition tables in a compiled image are indexed as
`(impl_id << alpha_shift) + symbol`. Keeping the row width a power of two
turns the row lookup into a shift instead of a multiply; the padding slots
between `impl_alpha_size` and `1 << alpha_shift` must be present in every
row but are never referenced.
*/

/// The implementation alphabet of a compile: how many symbols each packed
/// row carries and how rows are addressed.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Alphabet {
    /// The number of live symbols per transition row (the remapped
    /// alphabet minus the special symbols).
    pub(crate) impl_alpha_size: u16,
}

impl Alphabet {
    pub(crate) fn new(impl_alpha_size: u16) -> Alphabet {
        Alphabet { impl_alpha_size }
    }

    /// The left shift that converts an implementation state id into its
    /// transition row index: 1 for a trivial alphabet, otherwise the
    /// smallest `k` with `2^k >= impl_alpha_size`.
    pub(crate) fn shift(&self) -> u8 {
        if self.impl_alpha_size < 2 {
            return 1;
        }
        // log2 round up
        let shift = 32 - (u32::from(self.impl_alpha_size) - 1).leading_zeros();
        debug_assert!(shift <= 8);
        shift as u8
    }

    /// The full row width including padding slots.
    pub(crate) fn row_len(&self) -> usize {
        1 << self.shift()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_covers_the_alphabet() {
        assert_eq!(1, Alphabet::new(0).shift());
        assert_eq!(1, Alphabet::new(1).shift());
        assert_eq!(1, Alphabet::new(2).shift());
        assert_eq!(2, Alphabet::new(3).shift());
        assert_eq!(2, Alphabet::new(4).shift());
        assert_eq!(3, Alphabet::new(5).shift());
        assert_eq!(8, Alphabet::new(256).shift());
        for n in 2..=256u16 {
            let a = Alphabet::new(n);
            assert!(a.row_len() >= n as usize);
            assert!(a.row_len() < 2 * (n as usize));
        }
    }
}
