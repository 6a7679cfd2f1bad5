//! Locates compiled units on a class path made of archives and directories.

use std::{
    fs::{self, File},
    io::{self, Read},
    path::{Path, PathBuf},
};

use zip::{ZipArchive, result::ZipError};

use crate::{descriptor::to_internal_name, error::LoadError};

// An archive's declared entry size is untrusted; the buffer grows past this
// only as bytes actually arrive.
const MAX_PRESIZE: u64 = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassPathEntry {
    /// A `.jar` or `.zip` file; entries are `a/b/C.class` from its root.
    Archive(PathBuf),
    Directory(PathBuf),
}

impl ClassPathEntry {
    /// Classifies `path` by extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let is_archive = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jar") || ext.eq_ignore_ascii_case("zip"));
        if is_archive {
            ClassPathEntry::Archive(path)
        } else {
            ClassPathEntry::Directory(path)
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ClassPathEntry::Archive(path) | ClassPathEntry::Directory(path) => path,
        }
    }

    /// Reads the bytes of `class_name` (dotted or internal form) from this entry.
    pub fn read_class_bytes(&self, class_name: &str) -> Result<Vec<u8>, LoadError> {
        let internal = checked_internal_name(class_name)?;
        let entry_name = format!("{internal}.class");
        match self {
            ClassPathEntry::Archive(path) => read_archive_entry(path, &entry_name, class_name),
            ClassPathEntry::Directory(base) => {
                let path = base.join(&entry_name);
                log::trace!("reading {}", path.display());
                fs::read(&path).map_err(|source| match source.kind() {
                    io::ErrorKind::NotFound => LoadError::NotFound(class_name.to_string()),
                    _ => LoadError::Io { path, source },
                })
            }
        }
    }
}

fn read_archive_entry(
    path: &Path,
    entry_name: &str,
    class_name: &str,
) -> Result<Vec<u8>, LoadError> {
    log::trace!("reading {entry_name} from {}", path.display());
    let archive_error = |source| LoadError::Archive {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(file).map_err(archive_error)?;
    let mut entry = match archive.by_name(entry_name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Err(LoadError::NotFound(class_name.to_string())),
        Err(err) => return Err(archive_error(err)),
    };

    let mut content = Vec::with_capacity(entry.size().min(MAX_PRESIZE) as usize);
    entry
        .read_to_end(&mut content)
        .map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(content)
}

/// Normalizes `class_name` to internal form and rejects anything that is not
/// a sequence of non-empty identifiers.
pub fn checked_internal_name(class_name: &str) -> Result<String, LoadError> {
    let internal = to_internal_name(class_name);
    let valid = !internal.is_empty()
        && internal.split('/').all(|segment| {
            !segment.is_empty()
                && !segment
                    .chars()
                    .any(|c| matches!(c, ';' | '[' | '.' | '<' | '>') || c.is_whitespace())
        });
    if valid {
        Ok(internal.into_owned())
    } else {
        Err(LoadError::InvalidClassName(class_name.to_string()))
    }
}

/// Ordered class path; the first entry containing a class wins.
#[derive(Debug, Clone, Default)]
pub struct ClassPath {
    entries: Vec<ClassPathEntry>,
}

impl ClassPath {
    pub fn new(entries: Vec<ClassPathEntry>) -> Self {
        Self { entries }
    }

    pub fn from_paths<P: Into<PathBuf>>(paths: impl IntoIterator<Item = P>) -> Self {
        Self::new(paths.into_iter().map(ClassPathEntry::from_path).collect())
    }

    pub fn push(&mut self, entry: ClassPathEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ClassPathEntry] {
        &self.entries
    }

    pub fn find_class_bytes(
        &self,
        class_name: &str,
    ) -> Result<(Vec<u8>, &ClassPathEntry), LoadError> {
        checked_internal_name(class_name)?;
        for entry in &self.entries {
            match entry.read_class_bytes(class_name) {
                Ok(bytes) => return Ok((bytes, entry)),
                Err(LoadError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(LoadError::NotFound(class_name.to_string()))
    }
}
