//! YAML resource manifest read by `instance-check`.
//!
//! ```yaml
//! styles:
//!   - uri: res://styles/Dark
//!     path: styles/dark.xml
//! instances:
//!   - path: ui/MainWindow.xml
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::InstanceResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub styles: Vec<StyleEntry>,
    #[serde(default)]
    pub instances: Vec<InstanceEntry>,
}

/// A style document and the resource URL instances use to refer to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleEntry {
    pub uri: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceEntry {
    pub path: PathBuf,
}

impl Manifest {
    pub fn parse(yaml: &str) -> InstanceResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read a manifest file and make its entry paths relative to the
    /// directory that holds it.
    pub fn load(path: &Path) -> InstanceResult<Self> {
        let content = fs::read_to_string(path)?;
        let mut manifest = Self::parse(&content)?;
        if let Some(base) = path.parent() {
            for style in &mut manifest.styles {
                style.path = base.join(&style.path);
            }
            for instance in &mut manifest.instances {
                instance.path = base.join(&instance.path);
            }
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::parse(
            r#"
styles:
  - uri: res://styles/Dark
    path: styles/dark.xml
instances:
  - path: ui/Main.xml
  - path: ui/About.xml
"#,
        )
        .unwrap();
        assert_eq!(manifest.styles[0].uri, "res://styles/Dark");
        assert_eq!(manifest.styles[0].path, PathBuf::from("styles/dark.xml"));
        assert_eq!(manifest.instances.len(), 2);
    }

    #[test]
    fn test_sections_are_optional() {
        let manifest = Manifest::parse("instances:\n  - path: a.xml\n").unwrap();
        assert!(manifest.styles.is_empty());
        assert_eq!(manifest.instances.len(), 1);
    }

    #[test]
    fn test_invalid_manifest() {
        assert!(Manifest::parse("styles: 12").is_err());
    }
}
