//! Command handlers grouped by concern.

pub(crate) mod listing;
pub(crate) mod secrets;
pub(crate) mod values;
