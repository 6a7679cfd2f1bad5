use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    consts::NULLABLE_ANNOTATION,
    descriptor::{FieldType, parse_field_descriptor},
    error::ConfigError,
    loader::{ClassPath, checked_internal_name},
};

/// Settings shared by every component of one binding session.
///
/// ```toml
/// class_path = ["build/classes", "libs/api.jar"]
/// generated_package = "com/example/native"
/// handle_field = "rust_object"
/// nullable_annotations = ["Lorg/jetbrains/annotations/Nullable;"]
/// cache_compiled_units = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BindingConfig {
    /// Ordered entries; `.jar`/`.zip` files are archives, anything else a directory.
    pub class_path: Vec<PathBuf>,
    /// Internal-form package synthesized classes are placed in. Empty means
    /// the unnamed package.
    pub generated_package: String,
    /// Name of the public `long` field holding the native handle.
    pub handle_field: String,
    /// Annotation descriptors that mark a member or parameter nullable.
    pub nullable_annotations: Vec<String>,
    /// Memoize parsed compiled units and method descriptors across queries.
    pub cache_compiled_units: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            class_path: Vec::new(),
            generated_package: "classbind/generated".to_string(),
            handle_field: "rust_object".to_string(),
            nullable_annotations: vec![NULLABLE_ANNOTATION.to_string()],
            cache_compiled_units: false,
        }
    }
}

impl BindingConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let mut config: BindingConfig = toml::from_str(input)?;
        config.generated_package = config.generated_package.replace('.', "/");
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file. Relative class-path entries are resolved against
    /// the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&input)?;
        if let Some(base) = path.parent() {
            for entry in &mut config.class_path {
                if entry.is_relative() {
                    *entry = base.join(&*entry);
                }
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.generated_package.is_empty() {
            checked_internal_name(&self.generated_package).map_err(|_| {
                ConfigError::Invalid(format!(
                    "generated_package {:?} is not a package name",
                    self.generated_package
                ))
            })?;
        }
        if self.handle_field.is_empty()
            || self
                .handle_field
                .chars()
                .any(|c| matches!(c, '.' | ';' | '[' | '/' | '<' | '>') || c.is_whitespace())
        {
            return Err(ConfigError::Invalid(format!(
                "handle_field {:?} is not a field name",
                self.handle_field
            )));
        }
        for marker in &self.nullable_annotations {
            match parse_field_descriptor(marker) {
                Ok(descriptor) if matches!(descriptor.0, FieldType::Object(_)) => {}
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "nullable annotation {marker:?} is not a class descriptor"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn class_path(&self) -> ClassPath {
        ClassPath::from_paths(self.class_path.iter().cloned())
    }

    /// Internal name of the class synthesized for `simple_name`.
    pub fn generated_class_name(&self, simple_name: &str) -> String {
        if self.generated_package.is_empty() {
            simple_name.to_string()
        } else {
            format!("{}/{simple_name}", self.generated_package)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::ClassPathEntry;

    #[test]
    fn test_defaults() {
        let config = BindingConfig::from_toml_str("").unwrap();
        assert_eq!(config, BindingConfig::default());
        assert_eq!(
            config.generated_class_name("Furnace"),
            "classbind/generated/Furnace"
        );
    }

    #[test]
    fn test_parse() {
        let config = BindingConfig::from_toml_str(
            r#"
            class_path = ["classes", "libs/api.jar"]
            generated_package = "com.example.bind"
            nullable_annotations = ["Ljavax/annotation/Nullable;"]
            cache_compiled_units = true
            "#,
        )
        .unwrap();
        assert_eq!(config.generated_package, "com/example/bind");
        assert_eq!(config.handle_field, "rust_object");
        assert!(config.cache_compiled_units);
        assert!(matches!(
            config.class_path().entries(),
            [ClassPathEntry::Directory(_), ClassPathEntry::Archive(_)]
        ));
    }

    #[test]
    fn test_invalid() {
        for input in [
            "handle_field = \"\"",
            "handle_field = \"a.b\"",
            "nullable_annotations = [\"I\"]",
            "generated_package = \"a//b\"",
        ] {
            assert!(
                matches!(
                    BindingConfig::from_toml_str(input),
                    Err(ConfigError::Invalid(_))
                ),
                "{input}"
            );
        }
        assert!(matches!(
            BindingConfig::from_toml_str("cache_compiled_units = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classbind.toml");
        fs::write(&path, "class_path = [\"classes\"]").unwrap();
        let config = BindingConfig::load(&path).unwrap();
        assert_eq!(config.class_path, vec![dir.path().join("classes")]);
    }
}
