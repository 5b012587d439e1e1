//! Request handlers.

pub mod clip;
pub mod health;
pub mod jobs;

pub use clip::*;
pub use health::*;
pub use jobs::*;
