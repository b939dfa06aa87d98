//! Composition fragments and the composer that merges them.

pub mod composer;
pub mod parser;
pub mod types;


pub use composer::{compose, Composition, Fragment};
pub use parser::ComposeParser;
pub use types::*;
