use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;

use crate::{
    class::{self, parser},
    error::{LoadError, RuntimeError, UnitError},
    loader::ClassPath,
    runtime::{self, ClassOrigin, class_loader::parse_class},
};

/// Registry of linked classes. Each name is initialized at most once; a
/// failed load leaves the cell empty so a later attempt may succeed.
#[derive(Debug, Default)]
pub(in crate::runtime) struct ClassLoader {
    class_registry: DashMap<String, Arc<OnceCell<Arc<runtime::Class>>>>,
}

impl ClassLoader {
    pub(in crate::runtime) fn new() -> Self {
        Self::default()
    }

    pub(in crate::runtime) fn find_loaded(&self, class_name: &str) -> Option<Arc<runtime::Class>> {
        self.class_registry
            .get(class_name)
            .and_then(|cell| cell.get().map(Arc::clone))
    }

    pub(in crate::runtime) fn loaded_count(&self) -> usize {
        self.class_registry
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }

    /// Loads `class_name` (internal form) from `class_path` unless it is
    /// already registered.
    pub(in crate::runtime) fn resolve_class(
        &self,
        class_name: &str,
        class_path: &ClassPath,
    ) -> Result<Arc<runtime::Class>, RuntimeError> {
        self.resolve_class_inner(class_name, class_path, &mut Vec::new())
    }

    fn resolve_class_inner(
        &self,
        class_name: &str,
        class_path: &ClassPath,
        loading: &mut Vec<String>,
    ) -> Result<Arc<runtime::Class>, RuntimeError> {
        if loading.iter().any(|name| name == class_name) {
            return Err(RuntimeError::ClassCircularity(class_name.to_string()));
        }
        let class_cell = Arc::clone(
            self.class_registry
                .entry(class_name.to_string())
                .or_default()
                .value(),
        );
        if let Some(class) = class_cell.get() {
            return Ok(Arc::clone(class));
        }

        loading.push(class_name.to_string());
        let result = class_cell
            .get_or_try_init(|| self.load_from_class_path(class_name, class_path, loading))
            .map(Arc::clone);
        loading.pop();
        result
    }

    fn load_from_class_path(
        &self,
        class_name: &str,
        class_path: &ClassPath,
        loading: &mut Vec<String>,
    ) -> Result<Arc<runtime::Class>, RuntimeError> {
        let (bytes, entry) = class_path
            .find_class_bytes(class_name)
            .map_err(|err| match err {
                LoadError::NotFound(_) => RuntimeError::ClassNotFound(class_name.to_string()),
                err => RuntimeError::Load(err),
            })?;
        let class_file = parser::class_file(&bytes).map_err(|source| RuntimeError::ClassFormat {
            class: class_name.to_string(),
            source,
        })?;
        let declared = class_file
            .this_class_name()
            .map_err(|source| RuntimeError::ClassFormat {
                class: class_name.to_string(),
                source,
            })?;
        if declared != class_name {
            return Err(RuntimeError::ClassFormat {
                class: class_name.to_string(),
                source: UnitError::Malformed {
                    offset: 0,
                    reason: format!("unit declares {declared}"),
                },
            });
        }

        let class = self.link(
            class_name,
            &class_file,
            ClassOrigin::ClassPath(entry.clone()),
            class_path,
            loading,
        )?;
        log::debug!("loaded {class_name} from {}", entry.path().display());
        Ok(Arc::new(class))
    }

    /// Registers a class from raw bytes. Fails if the name is already taken.
    pub(in crate::runtime) fn define_class(
        &self,
        bytes: &[u8],
        origin: ClassOrigin,
        class_path: &ClassPath,
    ) -> Result<Arc<runtime::Class>, RuntimeError> {
        let class_file = parser::class_file(bytes).map_err(|source| RuntimeError::ClassFormat {
            class: "<unnamed>".to_string(),
            source,
        })?;
        let class_name = class_file
            .this_class_name()
            .map_err(|source| RuntimeError::ClassFormat {
                class: "<unnamed>".to_string(),
                source,
            })?
            .into_owned();
        if self.find_loaded(&class_name).is_some() {
            return Err(RuntimeError::DuplicateClass(class_name));
        }

        let mut loading = vec![class_name.clone()];
        let class = Arc::new(self.link(&class_name, &class_file, origin, class_path, &mut loading)?);

        let class_cell = Arc::clone(
            self.class_registry
                .entry(class_name.clone())
                .or_default()
                .value(),
        );
        class_cell
            .set(Arc::clone(&class))
            .map_err(|_| RuntimeError::DuplicateClass(class_name.clone()))?;
        log::debug!("defined {class_name}");
        Ok(class)
    }

    fn link(
        &self,
        class_name: &str,
        class_file: &class::Class,
        origin: ClassOrigin,
        class_path: &ClassPath,
        loading: &mut Vec<String>,
    ) -> Result<runtime::Class, RuntimeError> {
        let format_error = |source| RuntimeError::ClassFormat {
            class: class_name.to_string(),
            source,
        };

        let super_class = match class_file.super_class_name().map_err(format_error)? {
            Some(super_name) => Some(self.load_dependency(
                class_name,
                &super_name,
                class_path,
                loading,
            )?),
            None => None,
        };
        let mut interfaces = Vec::with_capacity(class_file.interfaces.len());
        for interface in class_file.interface_names().map_err(format_error)? {
            interfaces.push(self.load_dependency(class_name, &interface, class_path, loading)?);
        }

        parse_class(class_file, super_class, interfaces, origin).map_err(format_error)
    }

    fn load_dependency(
        &self,
        class_name: &str,
        dependency: &str,
        class_path: &ClassPath,
        loading: &mut Vec<String>,
    ) -> Result<Arc<runtime::Class>, RuntimeError> {
        self.resolve_class_inner(dependency, class_path, loading)
            .map_err(|err| match err {
                RuntimeError::ClassNotFound(missing) => RuntimeError::NoClassDefFound {
                    class: class_name.to_string(),
                    missing,
                },
                err => err,
            })
    }
}
