mod object;

use std::{fmt, sync::Arc};

use dashmap::DashMap;

use crate::{
    descriptor::FieldType,
    error::RuntimeError,
    runtime::{Class, Runtime},
};

pub(in crate::runtime) use object::register_natives;

pub type NativeResult<T> = Result<T, RuntimeError>;

pub type NativeFunction =
    Arc<dyn Fn(NativeEnv<'_>) -> NativeResult<Option<NativeVariable>> + Send + Sync>;

/// Everything a native implementation sees of its call.
pub struct NativeEnv<'a> {
    pub runtime: &'a Runtime,
    /// Class declaring the invoked method.
    pub class: Arc<Class>,
    /// Receiver reference; `None` for static methods.
    pub this: Option<u32>,
    pub args: Vec<NativeVariable>,
}

impl NativeEnv<'_> {
    /// The receiver's opaque native handle.
    pub fn handle(&self) -> NativeResult<i64> {
        let this = self.this.ok_or(RuntimeError::NullReference)?;
        self.runtime.handle(this)
    }

    pub fn arg(&self, index: usize) -> NativeResult<NativeVariable> {
        self.args.get(index).copied().ok_or_else(|| {
            RuntimeError::IllegalArgument(format!("missing argument {index}"))
        })
    }
}

/// A value crossing the native boundary. `Reference(0)` is `null`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeVariable {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Reference(u32),
}

macro_rules! getter {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self) -> NativeResult<$ty> {
            match self {
                NativeVariable::$variant(value) => Ok(*value),
                other => Err(RuntimeError::IllegalArgument(format!(
                    "expected {}, got {other:?}",
                    stringify!($variant)
                ))),
            }
        }
    };
}

impl NativeVariable {
    getter!(get_boolean, Boolean, bool);
    getter!(get_byte, Byte, i8);
    getter!(get_char, Char, u16);
    getter!(get_short, Short, i16);
    getter!(get_int, Int, i32);
    getter!(get_long, Long, i64);
    getter!(get_float, Float, f32);
    getter!(get_double, Double, f64);
    getter!(get_ref, Reference, u32);

    /// Default value of a slot of `field_type`.
    pub fn zero(field_type: &FieldType) -> NativeVariable {
        match field_type {
            FieldType::Boolean => NativeVariable::Boolean(false),
            FieldType::Byte => NativeVariable::Byte(0),
            FieldType::Char => NativeVariable::Char(0),
            FieldType::Short => NativeVariable::Short(0),
            FieldType::Int => NativeVariable::Int(0),
            FieldType::Long => NativeVariable::Long(0),
            FieldType::Float => NativeVariable::Float(0.0),
            FieldType::Double => NativeVariable::Double(0.0),
            FieldType::Object(_) | FieldType::Array(_) => NativeVariable::Reference(0),
        }
    }

    /// Whether the value has the representation `field_type` needs. Reference
    /// assignability is checked separately against the heap.
    pub fn fits(&self, field_type: &FieldType) -> bool {
        matches!(
            (self, field_type),
            (NativeVariable::Boolean(_), FieldType::Boolean)
                | (NativeVariable::Byte(_), FieldType::Byte)
                | (NativeVariable::Char(_), FieldType::Char)
                | (NativeVariable::Short(_), FieldType::Short)
                | (NativeVariable::Int(_), FieldType::Int)
                | (NativeVariable::Long(_), FieldType::Long)
                | (NativeVariable::Float(_), FieldType::Float)
                | (NativeVariable::Double(_), FieldType::Double)
                | (NativeVariable::Reference(_), FieldType::Object(_) | FieldType::Array(_))
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NativeKey {
    class_name: String,
    method_name: String,
    descriptor: String,
}

/// Native implementations keyed by declaring class, name and exact descriptor.
#[derive(Default)]
pub struct NativeTable {
    functions: DashMap<NativeKey, NativeFunction>,
}

impl fmt::Debug for NativeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeTable")
            .field("functions", &self.functions.len())
            .finish()
    }
}

impl NativeTable {
    /// Binds `function`, returning whether a previous binding was replaced.
    pub fn register(
        &self,
        class_name: &str,
        method_name: &str,
        descriptor: &str,
        function: NativeFunction,
    ) -> bool {
        let key = NativeKey {
            class_name: class_name.to_string(),
            method_name: method_name.to_string(),
            descriptor: descriptor.to_string(),
        };
        self.functions.insert(key, function).is_some()
    }

    pub fn get(
        &self,
        class_name: &str,
        method_name: &str,
        descriptor: &str,
    ) -> Option<NativeFunction> {
        let key = NativeKey {
            class_name: class_name.to_string(),
            method_name: method_name.to_string(),
            descriptor: descriptor.to_string(),
        };
        self.functions.get(&key).map(|function| Arc::clone(function.value()))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
