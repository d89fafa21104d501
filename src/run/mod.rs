//! Run primitives (input, ids, state machine).

pub mod ids;
pub mod machine;
pub mod types;

pub use ids::*;
pub use machine::*;
pub use types::*;
