//! Language classifier
//!
//! Infers a repository's dominant language from marker files at the root of
//! the workspace. Markers are checked in a fixed order and the first hit
//! wins, so a repository with both `package.json` and `go.mod` is JavaScript.

use devyntra_core::domain::DetectedLanguage;
use std::path::Path;
use tracing::debug;

/// Marker files in precedence order
pub const MARKERS: [(&str, DetectedLanguage); 4] = [
    ("package.json", DetectedLanguage::JavaScript),
    ("requirements.txt", DetectedLanguage::Python),
    ("pom.xml", DetectedLanguage::Java),
    ("go.mod", DetectedLanguage::Go),
];

/// Classifies the repository checked out at `workspace`
///
/// Never fails: a missing or unreadable workspace is `Unknown`.
pub fn classify(workspace: &Path) -> DetectedLanguage {
    let detected = MARKERS
        .iter()
        .find(|(marker, _)| workspace.join(marker).exists())
        .map(|(_, language)| *language)
        .unwrap_or(DetectedLanguage::Unknown);

    debug!("Classified {} as {}", workspace.display(), detected);
    detected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace_with(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            std::fs::write(dir.path().join(file), "").unwrap();
        }
        dir
    }

    #[test]
    fn test_single_markers() {
        for (marker, expected) in MARKERS {
            let dir = workspace_with(&[marker]);
            assert_eq!(classify(dir.path()), expected, "marker {}", marker);
        }
    }

    #[test]
    fn test_javascript_beats_go() {
        let dir = workspace_with(&["go.mod", "package.json"]);
        assert_eq!(classify(dir.path()), DetectedLanguage::JavaScript);
    }

    #[test]
    fn test_precedence_order() {
        let dir = workspace_with(&["go.mod", "pom.xml", "requirements.txt"]);
        assert_eq!(classify(dir.path()), DetectedLanguage::Python);

        let dir = workspace_with(&["go.mod", "pom.xml"]);
        assert_eq!(classify(dir.path()), DetectedLanguage::Java);
    }

    #[test]
    fn test_no_markers_is_unknown() {
        let dir = workspace_with(&["README.md", "Cargo.toml"]);
        assert_eq!(classify(dir.path()), DetectedLanguage::Unknown);
    }

    #[test]
    fn test_nested_markers_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("web")).unwrap();
        std::fs::write(dir.path().join("web/package.json"), "{}").unwrap();
        assert_eq!(classify(dir.path()), DetectedLanguage::Unknown);
    }

    #[test]
    fn test_missing_workspace_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        assert_eq!(classify(&missing), DetectedLanguage::Unknown);
    }

    #[test]
    fn test_marker_directory_still_counts() {
        // Any entry named like a marker counts.
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("pom.xml")).unwrap();
        assert_eq!(classify(dir.path()), DetectedLanguage::Java);
    }
}
