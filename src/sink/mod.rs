//! Log sink: the shared text buffer the data-access layer logs into.

pub mod buffer;
pub mod trace;
