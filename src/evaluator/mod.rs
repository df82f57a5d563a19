pub mod stats;
pub mod validate;

pub use validate::Evaluator;
