use std::{io, path::PathBuf};

use thiserror::Error;

/// A type descriptor that does not match the descriptor grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid descriptor {input:?} at offset {offset}")]
pub struct DescriptorError {
    pub input: String,
    pub offset: usize,
}

/// Structural failure while parsing compiled-unit bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("malformed compiled unit at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },
    #[error("constant pool index {index} is not a valid {expected} entry")]
    BadConstant { index: u16, expected: &'static str },
    #[error("unsupported class file version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("constant pool entry {index} is not valid modified UTF-8")]
    InvalidUtf8 { index: u16 },
    #[error("invalid descriptor in constant pool: {0}")]
    Descriptor(#[from] DescriptorError),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("class {0} not found")]
    NotFound(String),
    #[error("invalid class name {0:?}")]
    InvalidClassName(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("class {0} not found")]
    ClassNotFound(String),
    #[error("class {class} cannot be linked: {missing} is missing")]
    NoClassDefFound { class: String, missing: String },
    #[error("class {class} is malformed: {source}")]
    ClassFormat {
        class: String,
        #[source]
        source: UnitError,
    },
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("class {0} is already defined")]
    DuplicateClass(String),
    #[error("class {0} is its own superclass or superinterface")]
    ClassCircularity(String),
    #[error("type {0} is not present")]
    TypeNotPresent(String),
    #[error("no method {class}.{name}{descriptor}")]
    NoSuchMethod {
        class: String,
        name: String,
        descriptor: String,
    },
    #[error("no field {class}.{name}")]
    NoSuchField { class: String, name: String },
    #[error("no native implementation bound for {class}.{name}{descriptor}")]
    UnsatisfiedLink {
        class: String,
        name: String,
        descriptor: String,
    },
    #[error("method {class}.{name}{descriptor} is abstract")]
    AbstractMethod {
        class: String,
        name: String,
        descriptor: String,
    },
    #[error("method {class}.{name}{descriptor} has a bytecode body and cannot be executed")]
    InterpretationUnsupported {
        class: String,
        name: String,
        descriptor: String,
    },
    #[error("null reference")]
    NullReference,
    #[error("invalid object reference {0}")]
    InvalidReference(u32),
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    #[error("failed to emit core classes: {0}")]
    Bootstrap(#[from] WriteError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure to turn descriptor text into loaded types.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Hard failures of modifier extraction. Lookup misses are not errors.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("class {class} is malformed: {source}")]
    Unit {
        class: String,
        #[source]
        source: UnitError,
    },
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("invalid class name {0:?}")]
    InvalidName(String),
    #[error("superclass {name} cannot be resolved: {source}")]
    Superclass {
        name: String,
        #[source]
        source: RuntimeError,
    },
    #[error("superclass {0} is final or an interface")]
    IllegalSuperclass(String),
    #[error("stub {method} has an invalid descriptor: {source}")]
    Descriptor {
        method: String,
        #[source]
        source: DescriptorError,
    },
    #[error("stub {method}{descriptor} cannot be resolved: {source}")]
    Type {
        method: String,
        descriptor: String,
        #[source]
        source: RuntimeError,
    },
    #[error("stub name {0:?} is not a legal method name")]
    IllegalMethodName(String),
    #[error("stub {name}{descriptor} is declared twice")]
    DuplicateMethod { name: String, descriptor: String },
    #[error("stub {name}{descriptor} takes more than 255 argument slots")]
    TooManyParameters { name: String, descriptor: String },
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error("failed to define {class}: {source}")]
    Define {
        class: String,
        #[source]
        source: RuntimeError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("constant pool exceeds 65535 entries")]
    PoolOverflow,
    #[error("{0} exceeds the class file size limit")]
    TooLarge(&'static str),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
