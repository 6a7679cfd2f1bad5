//! Host runtime: class registry, reflective view, dynamic definition, object
//! heap and native dispatch. One [`Runtime`] is one isolated class universe.

mod class_loader;
mod famous_classes;
mod heap;
mod inheritance;
mod native;
mod structs;

use std::sync::Arc;

use parking_lot::RwLock;

pub use heap::Heap;
pub use native::*;
pub use structs::*;

use crate::{
    config::BindingConfig,
    descriptor::{FieldType, ReturnType, parse_method_descriptor},
    error::RuntimeError,
    loader::{ClassPath, checked_internal_name},
    runtime::{class_loader::ClassLoader, famous_classes::famous_classes},
};

#[derive(Debug)]
pub struct Runtime {
    config: BindingConfig,
    class_path: ClassPath,
    class_loader: ClassLoader,
    heap: RwLock<Heap>,
    natives: NativeTable,
}

impl Runtime {
    pub fn new(config: BindingConfig) -> Result<Runtime, RuntimeError> {
        config.validate()?;
        let runtime = Runtime {
            class_path: config.class_path(),
            config,
            class_loader: ClassLoader::new(),
            heap: RwLock::new(Heap::new()),
            natives: NativeTable::default(),
        };
        for bytes in famous_classes()? {
            runtime.class_loader.define_class(
                &bytes,
                ClassOrigin::Builtin(bytes.as_slice().into()),
                &runtime.class_path,
            )?;
        }
        native::register_natives(&runtime.natives);
        Ok(runtime)
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    pub fn class_path(&self) -> &ClassPath {
        &self.class_path
    }

    /// Loads and links `name`, given as `a.b.C`, `a/b/C` or `La/b/C;`.
    pub fn class_for_name(&self, name: &str) -> Result<Arc<Class>, RuntimeError> {
        let internal = checked_internal_name(name)?;
        self.class_loader.resolve_class(&internal, &self.class_path)
    }

    pub fn find_loaded(&self, name: &str) -> Option<Arc<Class>> {
        let internal = checked_internal_name(name).ok()?;
        self.class_loader.find_loaded(&internal)
    }

    pub fn loaded_class_count(&self) -> usize {
        self.class_loader.loaded_count()
    }

    /// Defines a class from raw bytes. The name comes from the bytes and
    /// must not already be loaded.
    pub fn define_class(&self, bytes: &[u8]) -> Result<Arc<Class>, RuntimeError> {
        self.class_loader
            .define_class(bytes, ClassOrigin::Defined(bytes.into()), &self.class_path)
    }

    /// Allocates an instance with zeroed fields. No constructor runs.
    pub fn alloc_object(&self, class: &Arc<Class>) -> Result<u32, RuntimeError> {
        if class.is_interface() || class.is_abstract() {
            return Err(RuntimeError::IllegalArgument(format!(
                "{} cannot be instantiated",
                class.name()
            )));
        }
        self.heap.write().allocate(Arc::clone(class))
    }

    pub fn free_object(&self, object: u32) -> Result<(), RuntimeError> {
        self.heap.write().deallocate(object)
    }

    pub fn class_of(&self, object: u32) -> Result<Arc<Class>, RuntimeError> {
        Ok(Arc::clone(self.heap.read().get(object)?.class()))
    }

    pub fn is_instance_of(&self, object: u32, class_name: &str) -> Result<bool, RuntimeError> {
        let internal = checked_internal_name(class_name)?;
        Ok(inheritance::is_assignable_to(&*self.class_of(object)?, &internal))
    }

    pub fn get_field(&self, object: u32, name: &str) -> Result<NativeVariable, RuntimeError> {
        let object = self.heap.read().get(object)?;
        let class = object.class();
        let slot = class
            .instance_field(name)
            .and_then(|field| field.slot)
            .ok_or_else(|| RuntimeError::NoSuchField {
                class: class.name().to_string(),
                name: name.to_string(),
            })?;
        object
            .get_field(slot)
            .ok_or_else(|| RuntimeError::IllegalArgument(format!("slot {slot} out of range")))
    }

    pub fn put_field(
        &self,
        object: u32,
        name: &str,
        value: NativeVariable,
    ) -> Result<(), RuntimeError> {
        let object = self.heap.read().get(object)?;
        let class = object.class();
        let field = class
            .instance_field(name)
            .ok_or_else(|| RuntimeError::NoSuchField {
                class: class.name().to_string(),
                name: name.to_string(),
            })?;
        self.check_value(field.field_type(), value)?;
        let stored = field
            .slot
            .is_some_and(|slot| object.put_field(slot, value));
        if stored {
            Ok(())
        } else {
            Err(RuntimeError::IllegalArgument(format!("field {name} has no slot")))
        }
    }

    /// Stores the opaque native handle in the configured handle field.
    pub fn set_handle(&self, object: u32, handle: i64) -> Result<(), RuntimeError> {
        self.put_field(object, &self.config.handle_field, NativeVariable::Long(handle))
    }

    pub fn handle(&self, object: u32) -> Result<i64, RuntimeError> {
        self.get_field(object, &self.config.handle_field)?.get_long()
    }

    /// Binds a native implementation to `class_name.method_name` with the
    /// exact `descriptor`. A previous binding is replaced.
    pub fn register_native<F>(
        &self,
        class_name: &str,
        method_name: &str,
        descriptor: &str,
        function: F,
    ) -> Result<(), RuntimeError>
    where
        F: Fn(NativeEnv<'_>) -> NativeResult<Option<NativeVariable>> + Send + Sync + 'static,
    {
        let internal = checked_internal_name(class_name)?;
        parse_method_descriptor(descriptor)
            .map_err(|err| RuntimeError::IllegalArgument(err.to_string()))?;
        if self
            .natives
            .register(&internal, method_name, descriptor, Arc::new(function))
        {
            log::debug!("replaced native {internal}.{method_name}{descriptor}");
        }
        Ok(())
    }

    /// Virtual call on `this`.
    pub fn invoke(
        &self,
        this: u32,
        name: &str,
        descriptor: &str,
        args: Vec<NativeVariable>,
    ) -> Result<Option<NativeVariable>, RuntimeError> {
        let class = self.class_of(this)?;
        let (owner, method) = inheritance::find_method(&class, name, descriptor).ok_or_else(
            || RuntimeError::NoSuchMethod {
                class: class.name().to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            },
        )?;
        if method.is_static() {
            return Err(RuntimeError::IllegalArgument(format!(
                "{}.{name}{descriptor} is static",
                owner.name()
            )));
        }
        self.call(owner, method, Some(this), args)
    }

    pub fn invoke_static(
        &self,
        class: &Arc<Class>,
        name: &str,
        descriptor: &str,
        args: Vec<NativeVariable>,
    ) -> Result<Option<NativeVariable>, RuntimeError> {
        let (owner, method) = inheritance::find_method(class, name, descriptor).ok_or_else(
            || RuntimeError::NoSuchMethod {
                class: class.name().to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            },
        )?;
        if !method.is_static() {
            return Err(RuntimeError::IllegalArgument(format!(
                "{}.{name}{descriptor} is not static",
                owner.name()
            )));
        }
        self.call(owner, method, None, args)
    }

    fn call(
        &self,
        owner: &Arc<Class>,
        method: &MethodInfo,
        this: Option<u32>,
        args: Vec<NativeVariable>,
    ) -> Result<Option<NativeVariable>, RuntimeError> {
        let parameters = &method.descriptor().parameters;
        if args.len() != parameters.len() {
            return Err(RuntimeError::IllegalArgument(format!(
                "{}.{}{} takes {} arguments, got {}",
                owner.name(),
                method.name(),
                method.descriptor_text(),
                parameters.len(),
                args.len()
            )));
        }
        for (parameter, arg) in parameters.iter().zip(&args) {
            self.check_value(parameter, *arg)?;
        }

        let signature = || {
            (
                owner.name().to_string(),
                method.name().to_string(),
                method.descriptor_text().to_string(),
            )
        };
        if method.is_abstract() {
            let (class, name, descriptor) = signature();
            return Err(RuntimeError::AbstractMethod {
                class,
                name,
                descriptor,
            });
        }
        if !method.is_native() {
            let (class, name, descriptor) = signature();
            return Err(RuntimeError::InterpretationUnsupported {
                class,
                name,
                descriptor,
            });
        }
        let function = self
            .natives
            .get(owner.name(), method.name(), method.descriptor_text())
            .ok_or_else(|| {
                let (class, name, descriptor) = signature();
                RuntimeError::UnsatisfiedLink {
                    class,
                    name,
                    descriptor,
                }
            })?;

        let result = function(NativeEnv {
            runtime: self,
            class: Arc::clone(owner),
            this,
            args,
        })?;
        self.check_return(&method.descriptor().return_type, result)?;
        Ok(result)
    }

    fn check_value(&self, expected: &FieldType, value: NativeVariable) -> Result<(), RuntimeError> {
        if !value.fits(expected) {
            return Err(RuntimeError::IllegalArgument(format!(
                "{value:?} is not a valid {expected}"
            )));
        }
        let NativeVariable::Reference(object) = value else {
            return Ok(());
        };
        if object == 0 {
            return Ok(());
        }
        let assignable = match expected {
            FieldType::Object(class_name) => {
                inheritance::is_assignable_to(&*self.class_of(object)?, class_name)
            }
            // no array objects live on this heap
            _ => false,
        };
        if assignable {
            Ok(())
        } else {
            Err(RuntimeError::IllegalArgument(format!(
                "object {object} is not a {expected}"
            )))
        }
    }

    fn check_return(
        &self,
        expected: &ReturnType,
        value: Option<NativeVariable>,
    ) -> Result<(), RuntimeError> {
        match (expected, value) {
            (None, None) => Ok(()),
            (Some(expected), Some(value)) => self.check_value(expected, value),
            (None, Some(value)) => Err(RuntimeError::IllegalArgument(format!(
                "void method returned {value:?}"
            ))),
            (Some(expected), None) => Err(RuntimeError::IllegalArgument(format!(
                "method returning {expected} returned nothing"
            ))),
        }
    }
}
