//! Small shared helpers.

pub(crate) mod lock;
