mod context;
mod evaluator;
mod roles;

pub use context::*;
pub use evaluator::*;
pub use roles::*;

#[cfg(any(test, feature = "testing"))]
pub use evaluator::MockAccessEvaluator;
