//! File-name handling for upload targets.
//!
//! Remote file names are plain names inside one fixed folder, not paths.
//! Conflict resolution renames by inserting a timestamp between the stem
//! and the extension.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated remote file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileName(String);

impl FileName {
    /// Parse a file name.
    ///
    /// # Preconditions
    /// - `name` must be non-empty
    /// - `name` must not contain path separators
    ///
    /// # Errors
    /// - Returns error if the name is empty or contains a separator
    pub fn parse(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(crate::Error::InvalidInput(
                "file name cannot be empty".to_string(),
            ));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(crate::Error::InvalidInput(
                "file name cannot contain separators".to_string(),
            ));
        }
        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stem and extension, split at the last dot.
    ///
    /// A name with no dot has no extension.
    pub fn split(&self) -> (&str, Option<&str>) {
        match self.0.rfind('.') {
            Some(pos) => (&self.0[..pos], Some(&self.0[pos + 1..])),
            None => (self.0.as_str(), None),
        }
    }

    /// Extension, if any.
    pub fn extension(&self) -> Option<&str> {
        self.split().1
    }

    /// Rename by inserting a timestamp between stem and extension.
    ///
    /// `report.pdf` becomes `report_1700000000000.pdf`; a name with no
    /// extension keeps the suffix with no trailing dot.
    pub fn timestamped(&self, ts_millis: i64) -> FileName {
        let renamed = match self.split() {
            (stem, Some(ext)) => format!("{}_{}.{}", stem, ts_millis, ext),
            (stem, None) => format!("{}_{}", stem, ts_millis),
        };
        FileName(renamed)
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_rejects_empty_and_separators() {
        assert!(FileName::parse("").is_err());
        assert!(FileName::parse("a/b.txt").is_err());
        assert!(FileName::parse("a\\b.txt").is_err());
        assert!(FileName::parse("report.pdf").is_ok());
    }

    #[test]
    fn test_split_with_extension() {
        let name = FileName::parse("archive.tar.gz").unwrap();
        assert_eq!(name.split(), ("archive.tar", Some("gz")));
    }

    #[test]
    fn test_split_without_extension() {
        let name = FileName::parse("README").unwrap();
        assert_eq!(name.split(), ("README", None));
        assert_eq!(name.extension(), None);
    }

    #[test]
    fn test_timestamped_with_extension() {
        let name = FileName::parse("report.pdf").unwrap();
        assert_eq!(name.timestamped(1700000000000).as_str(), "report_1700000000000.pdf");
    }

    #[test]
    fn test_timestamped_without_extension() {
        let name = FileName::parse("README").unwrap();
        let renamed = name.timestamped(1700000000000);
        assert_eq!(renamed.as_str(), "README_1700000000000");
        assert!(!renamed.as_str().ends_with('.'));
    }

    proptest! {
        #[test]
        fn prop_timestamped_preserves_extension(
            stem in "[A-Za-z0-9_-]{1,24}",
            ext in "[A-Za-z0-9]{1,8}",
            ts in 0i64..4_102_444_800_000,
        ) {
            let name = FileName::parse(format!("{}.{}", stem, ext)).unwrap();
            let renamed = name.timestamped(ts);
            prop_assert_eq!(renamed.extension(), Some(ext.as_str()));
            let expected = format!("{}_{}.{}", stem, ts, ext);
            prop_assert_eq!(renamed.as_str(), expected.as_str());
        }

        #[test]
        fn prop_timestamped_no_trailing_separator(
            stem in "[A-Za-z0-9_-]{1,24}",
            ts in 0i64..4_102_444_800_000,
        ) {
            let name = FileName::parse(stem.clone()).unwrap();
            let renamed = name.timestamped(ts);
            prop_assert!(!renamed.as_str().contains('.'));
            let expected = format!("{}_{}", stem, ts);
            prop_assert_eq!(renamed.as_str(), expected.as_str());
        }
    }
}
