//! Runtime-resolved dependencies for the backend bundle.
//!
//! Every package installed in the modules directory is mapped to a
//! `commonjs <name>` external so the server bundle `require`s it at runtime
//! instead of inlining it.

use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{ConfigError, Result};

/// Scan `modules_dir` and build the externals table.
///
/// Scoped packages (`@scope/name`) are expanded one level. Dot-entries such
/// as `.bin` are skipped. A missing directory yields an empty table.
pub fn scan_externals(modules_dir: &Path) -> Result<Map<String, Value>> {
    let mut externals = Map::new();

    let entries = match fs::read_dir(modules_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(
                dir = %modules_dir.display(),
                "modules directory not found, backend bundle will have no externals"
            );
            return Ok(externals);
        }
        Err(e) => return Err(ConfigError::io(modules_dir, e)),
    };

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::io(modules_dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }

        if name.starts_with('@') && entry.path().is_dir() {
            let scope_dir = entry.path();
            let scoped = fs::read_dir(&scope_dir).map_err(|e| ConfigError::io(&scope_dir, e))?;
            for package in scoped {
                let package = package.map_err(|e| ConfigError::io(&scope_dir, e))?;
                let package_name = package.file_name().to_string_lossy().into_owned();
                if package_name.starts_with('.') {
                    continue;
                }
                insert_external(&mut externals, format!("{}/{}", name, package_name));
            }
            continue;
        }

        insert_external(&mut externals, name);
    }

    tracing::debug!(count = externals.len(), "scanned backend externals");
    Ok(externals)
}

fn insert_external(externals: &mut Map<String, Value>, name: String) {
    let target = Value::String(format!("commonjs {}", name));
    externals.insert(name, target);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let externals = scan_externals(&dir.path().join("node_modules")).unwrap();
        assert!(externals.is_empty());
    }

    #[test]
    fn packages_map_to_commonjs() {
        let dir = TempDir::new().unwrap();
        let modules = dir.path().join("node_modules");
        fs::create_dir_all(modules.join("express")).unwrap();
        fs::create_dir_all(modules.join("lodash")).unwrap();
        fs::create_dir_all(modules.join(".bin")).unwrap();

        let externals = scan_externals(&modules).unwrap();
        assert_eq!(externals.len(), 2);
        assert_eq!(externals["express"], "commonjs express");
        assert_eq!(externals["lodash"], "commonjs lodash");
        assert!(!externals.contains_key(".bin"));
    }

    #[test]
    fn scoped_packages_are_expanded() {
        let dir = TempDir::new().unwrap();
        let modules = dir.path().join("node_modules");
        fs::create_dir_all(modules.join("@angular/core")).unwrap();
        fs::create_dir_all(modules.join("@angular/common")).unwrap();

        let externals = scan_externals(&modules).unwrap();
        assert_eq!(externals["@angular/core"], "commonjs @angular/core");
        assert_eq!(externals["@angular/common"], "commonjs @angular/common");
        assert!(!externals.contains_key("@angular"));
    }
}
