//! Common value types.

pub mod money;

pub use money::{Currency, Money};

#[cfg(test)]
mod money_tests;
