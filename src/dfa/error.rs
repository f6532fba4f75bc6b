/*!
Errors that can occur while compiling a raw DFA to an image.
*/

/// An error that occurred during compilation of a raw DFA.
///
/// This error does not provide many introspection capabilities. Its main
/// supported operation is obtaining a human readable message via its
/// `std::fmt::Display` impl.
///
/// Compilation is all-or-nothing: when an error is returned, no partial
/// image exists.
#[derive(Clone, Debug)]
pub struct BuildError {
    kind: BuildErrorKind,
}

/// The kind of error that occurred.
#[derive(Clone, Debug)]
enum BuildErrorKind {
    /// The DFA has more states than the packed representation can number,
    /// either because the total exceeds 2^16 or because an assigned index
    /// would collide with the flag bits reserved at the top of a stored
    /// successor.
    StateOverflow { limit: usize },
}

impl BuildError {
    fn kind(&self) -> &BuildErrorKind {
        &self.kind
    }

    pub(crate) fn state_overflow(limit: usize) -> BuildError {
        BuildError { kind: BuildErrorKind::StateOverflow { limit } }
    }
}

impl std::error::Error for BuildError {}

impl core::fmt::Display for BuildError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind() {
            BuildErrorKind::StateOverflow { limit } => write!(
                f,
                "number of DFA states exceeds representable limit of {}",
                limit,
            ),
        }
    }
}
