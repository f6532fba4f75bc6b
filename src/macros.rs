/// A simple macro for swallowing log expressions when the 'logging' feature
/// is disabled. Using this (instead of sprinkling cfgs everywhere) keeps
/// call sites clean and guarantees zero cost in the default configuration.
#[cfg(feature = "logging")]
macro_rules! log {
    ($($tt:tt)*) => {
        $($tt)*
    }
}

#[cfg(not(feature = "logging"))]
macro_rules! log {
    ($($tt:tt)*) => {};
}

macro_rules! debug {
    ($($tt:tt)*) => { log!(log::debug!($($tt)*)) }
}

macro_rules! trace {
    ($($tt:tt)*) => { log!(log::trace!($($tt)*)) }
}
