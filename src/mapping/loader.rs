//! Descriptor file loader.
//!
//! Descriptors are read from YAML (`.yaml`, `.yml`) or JSON (`.json`)
//! files into [`DescriptorDef`] structures.

use std::fs;
use std::path::{Path, PathBuf};
use crate::mapping::types::DescriptorDef;

/// Errors raised while loading a descriptor or run configuration.
///
/// All of these are fatal and stop a run before any table is touched.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported descriptor format: {} (expected .yaml, .yml or .json)", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("{location} has an empty table name")]
    EmptyTableName { location: String },

    #[error("{kind} name '{name}' is not a plain SQL identifier")]
    InvalidIdentifier { kind: &'static str, name: String },

    #[error("group '{table}' has an empty context expression")]
    EmptyContext { table: String },

    #[error("table '{0}' is mapped more than once")]
    DuplicateTable(String),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

/// Load a descriptor file, choosing the format from its extension.
///
/// # Example
///
/// ```ignore
/// use docmap::mapping::load_descriptor;
///
/// let descriptor = load_descriptor("mappings/encounter.yaml")?;
/// println!("Root table: {}", descriptor.table);
/// ```
pub fn load_descriptor<P: AsRef<Path>>(path: P) -> Result<DescriptorDef, ConfigError> {
    let path = path.as_ref();

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let contents = || {
        fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    };

    match extension.as_deref() {
        Some("yaml") | Some("yml") => DescriptorDef::from_yaml_str(&contents()?),
        Some("json") => DescriptorDef::from_json_str(&contents()?),
        _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    }
}

impl DescriptorDef {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
table: Encounter
namespaces:
  - prefix: cda
    uri: urn:hl7-org:v3
columns:
  - name: PatientId
    value: "@id"
groups:
  - table: Diagnosis
    context: ".//diagnosis"
    columns:
      - name: Code
        value: "@code"
      - name: Note
        value: "text"
        narrative: true
"#;

    #[test]
    fn test_from_yaml_str() {
        let descriptor = DescriptorDef::from_yaml_str(YAML).unwrap();

        assert_eq!(descriptor.table, "Encounter");
        assert_eq!(descriptor.namespaces[0].prefix, "cda");
        assert_eq!(descriptor.columns[0].value, "@id");
        assert_eq!(descriptor.groups.len(), 1);
        assert_eq!(descriptor.groups[0].columns.len(), 2);
        assert!(!descriptor.groups[0].columns[0].narrative);
        assert!(descriptor.groups[0].columns[1].narrative);
        assert!(descriptor.groups[0].groups.is_empty());
    }

    #[test]
    fn test_from_json_str_accepts_original_field_names() {
        let json = r#"{
            "tableName": "Record",
            "columns": [{"name": "Title", "value": "title", "isNarrative": true}],
            "groups": [{"tableName": "Entry", "context": "entry"}]
        }"#;

        let descriptor = DescriptorDef::from_json_str(json).unwrap();
        assert_eq!(descriptor.table, "Record");
        assert!(descriptor.columns[0].narrative);
        assert_eq!(descriptor.groups[0].table, "Entry");
        assert!(descriptor.namespaces.is_empty());
    }

    #[test]
    fn test_load_descriptor_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("mapping.yml");
        fs::File::create(&yaml_path)
            .unwrap()
            .write_all(YAML.as_bytes())
            .unwrap();
        assert_eq!(load_descriptor(&yaml_path).unwrap().table, "Encounter");

        let txt_path = dir.path().join("mapping.txt");
        fs::write(&txt_path, YAML).unwrap();
        assert!(matches!(
            load_descriptor(&txt_path),
            Err(ConfigError::UnsupportedFormat(_))
        ));

        assert!(matches!(
            load_descriptor(dir.path().join("missing.yaml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        assert!(matches!(
            DescriptorDef::from_yaml_str("table: [unclosed"),
            Err(ConfigError::Yaml(_))
        ));
        assert!(DescriptorDef::from_yaml_str("columns: []").is_err());
    }
}
