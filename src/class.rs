//! Raw class-file model, its nom parser and a writer for generated units.

pub mod parser;
mod structs;
mod writer;

pub use structs::*;
pub use writer::*;
