//! Input document enumeration.

use std::fs;
use std::path::{Path, PathBuf};
use glob::{MatchOptions, Pattern};
use crate::engine::ConvertError;
use crate::mapping::ConfigError;

/// Default file name pattern of input documents.
pub const DEFAULT_PATTERN: &str = "*.xml";

/// One input document: a name for diagnostics and the header row, and its
/// full text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDocument {
    pub name: String,
    pub text: String,
}

impl InputDocument {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// File names are matched case-insensitively.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Documents in one directory whose file names match a glob pattern, in
/// file name order.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    directory: PathBuf,
    pattern: Pattern,
}

impl DirectorySource {
    pub fn new(directory: impl Into<PathBuf>, pattern: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            directory: directory.into(),
            pattern: Pattern::new(pattern)
                .map_err(|e| ConfigError::InvalidSetting(format!("file pattern '{}': {}", pattern, e)))?,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Matching file paths, sorted by file name.
    pub fn paths(&self) -> Result<Vec<PathBuf>, ConvertError> {
        let read_error = |source| ConvertError::Read {
            name: self.directory.display().to_string(),
            source,
        };

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.directory).map_err(read_error)? {
            let path = entry.map_err(read_error)?.path();
            let matches = path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map_or(false, |name| self.pattern.matches_with(name, MATCH_OPTIONS));
            if matches {
                paths.push(path);
            }
        }

        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        tracing::debug!(directory = %self.directory.display(), count = paths.len(), "Found input documents");
        Ok(paths)
    }

    /// Read every matching document lazily. Enumeration failures are
    /// yielded as a single error item.
    pub fn documents(&self) -> Box<dyn Iterator<Item = Result<InputDocument, ConvertError>>> {
        match self.paths() {
            Ok(paths) => Box::new(paths.into_iter().map(|path| read_document(&path))),
            Err(error) => Box::new(std::iter::once(Err(error))),
        }
    }
}

/// Read one document; its name is the file name.
pub fn read_document(path: &Path) -> Result<InputDocument, ConvertError> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let text = fs::read_to_string(path).map_err(|source| ConvertError::Read {
        name: name.clone(),
        source,
    })?;

    Ok(InputDocument { name, text })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching() {
        let source = DirectorySource::new(".", "*.xml").unwrap();
        let matches = |name: &str| source.pattern.matches_with(name, MATCH_OPTIONS);
        assert!(matches("a.xml"));
        assert!(matches("B.XML"));
        assert!(!matches("a.xml.bak"));
        assert!(!matches("axml"));

        let source = DirectorySource::new(".", "cda_??.xml").unwrap();
        assert!(source.pattern.matches_with("cda_01.xml", MATCH_OPTIONS));
        assert!(!source.pattern.matches_with("cda_1.xml", MATCH_OPTIONS));

        assert!(matches!(
            DirectorySource::new(".", "[.xml"),
            Err(ConfigError::InvalidSetting(_))
        ));
    }

    #[test]
    fn test_directory_source_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.xml"), "<b/>").unwrap();
        fs::write(dir.path().join("a.xml"), "<a/>").unwrap();
        fs::write(dir.path().join("notes.txt"), "skip").unwrap();
        fs::create_dir(dir.path().join("c.xml")).unwrap();

        let source = DirectorySource::new(dir.path(), DEFAULT_PATTERN).unwrap();
        let documents: Vec<InputDocument> = source.documents().map(|d| d.unwrap()).collect();

        assert_eq!(
            documents,
            vec![InputDocument::new("a.xml", "<a/>"), InputDocument::new("b.xml", "<b/>")]
        );
    }

    #[test]
    fn test_missing_directory_yields_one_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectorySource::new(dir.path().join("missing"), DEFAULT_PATTERN).unwrap();

        let items: Vec<_> = source.documents().collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(ConvertError::Read { .. })));
    }
}
