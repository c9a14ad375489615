/// Input state shared across connections

pub mod hold;

pub use hold::{HoldTable, HoldTarget, DEFAULT_HOLD_TIMEOUT};
