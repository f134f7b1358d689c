//! Winner selection: strategies and the per-experiment selector.

pub mod selector;
pub mod strategy;

pub use selector::{Evaluation, WinnerSelector};
pub use strategy::{strategy_for, SelectionPhase, SelectionStrategy};
