//! Evaluation pipeline for low-light enhancement networks.

mod engine;
mod evaluate;

pub use engine::{Engine, Restore};
pub use evaluate::{enhance, EvalConfig, Evaluator, OutputLayout, Summary};
