pub mod class;
pub mod config;
pub mod consts;
pub mod descriptor;
pub mod error;
pub mod loader;
pub mod metadata;
pub mod modifiers;
pub mod resolve;
pub mod runtime;
pub mod synth;

pub use config::BindingConfig;
pub use modifiers::{Lookup, LookupMiss, ModifierExtractor, ModifierSet};
pub use runtime::Runtime;
pub use synth::{StubSpec, Synthesizer};
