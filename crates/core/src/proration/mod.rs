//! Mid-cycle plan change proration.

pub mod calculator;

#[cfg(test)]
mod props;

pub use calculator::{Proration, calculate};
