mod audit;
mod context_item;
mod feature;
mod isolation;
mod organization;
mod quota;
mod result;
mod sharing;

pub use audit::*;
pub use context_item::*;
pub use feature::*;
pub use isolation::*;
pub use organization::*;
pub use quota::*;
pub use result::*;
pub use sharing::*;
