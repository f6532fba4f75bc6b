/*!
Compile-time configuration for the McClellan compiler.
*/

/// Feature toggles consulted during compilation.
///
/// The defaults enable everything. Individual toggles exist mostly for
/// debugging and for measuring how much each transformation buys; disabling
/// them never changes what the compiled image matches, only its size and
/// scanning speed.
#[derive(Clone, Copy, Debug)]
pub struct Grey {
    /// Perform per-state acceleration analysis and emit acceleration
    /// records into the image.
    pub accelerate_dfa: bool,
    /// Compress states against a donor "daddy" state where profitable.
    /// Only meaningful for the 16-bit representation.
    pub allow_sherman_states: bool,
    /// Use the narrow 8-bit representation when the DFA has at most 256
    /// states.
    pub allow_mcclellan_8: bool,
}

impl Default for Grey {
    fn default() -> Grey {
        Grey {
            accelerate_dfa: true,
            allow_sherman_states: true,
            allow_mcclellan_8: true,
        }
    }
}

impl Grey {
    /// Set whether acceleration analysis runs.
    pub fn accelerate_dfa(mut self, yes: bool) -> Grey {
        self.accelerate_dfa = yes;
        self
    }

    /// Set whether Sherman compression is attempted.
    pub fn allow_sherman_states(mut self, yes: bool) -> Grey {
        self.allow_sherman_states = yes;
        self
    }

    /// Set whether the 8-bit representation may be chosen.
    pub fn allow_mcclellan_8(mut self, yes: bool) -> Grey {
        self.allow_mcclellan_8 = yes;
        self
    }
}

/// The context a single compile runs in: feature toggles plus the target
/// scanning mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompileContext {
    /// Feature toggles.
    pub grey: Grey,
    /// True when compiling for streaming scans. In streaming mode,
    /// redundant end-of-data reports are kept rather than stripped, since
    /// the stream may be queried at a point where only the EOD flavour
    /// fires.
    pub streaming: bool,
}

impl CompileContext {
    /// Create a context with the given toggles and mode.
    pub fn new(grey: Grey, streaming: bool) -> CompileContext {
        CompileContext { grey, streaming }
    }
}
