//! Output modules.

pub mod human;
pub mod json;

pub use human::{HumanOutput, HumanOutputConfig};
pub use json::{JsonOutput, JsonOutputConfig};
