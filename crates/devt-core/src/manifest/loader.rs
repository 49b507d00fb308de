//! Locating and parsing manifest files.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, IoContext, Result};

use super::Manifest;
use super::node::Map;

/// Candidate manifest file names, in lookup order.
pub const MANIFEST_CANDIDATES: [&str; 4] = [
    "manifest.yaml",
    "manifest.yml",
    "manifest.json",
    "manifest.cjson",
];

/// Serialization format of a manifest file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Yaml,
    Json,
    /// JSON with `//` and `/* */` comments.
    CommentedJson,
}

impl ManifestFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            "cjson" => Some(Self::CommentedJson),
            _ => None,
        }
    }
}

/// First manifest candidate present in `dir`.
pub fn find_manifest(dir: &Path) -> Option<PathBuf> {
    MANIFEST_CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// True when `path` names a file that could be a manifest.
pub fn is_manifest_file(path: &Path) -> bool {
    path.file_stem().and_then(|stem| stem.to_str()) == Some("manifest")
        && ManifestFormat::from_path(path).is_some()
}

/// Locate the manifest of `dir` and load it.
pub fn load_from_dir(dir: &Path) -> Result<Manifest> {
    let path = find_manifest(dir).ok_or_else(|| Error::ManifestNotFound {
        dir: dir.to_path_buf(),
    })?;
    load_manifest(&path)
}

/// Read, parse and validate a manifest file.
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let format = ManifestFormat::from_path(path).ok_or_else(|| Error::ManifestParse {
        path: path.to_path_buf(),
        message: "unsupported manifest extension".to_string(),
    })?;
    let content = std::fs::read_to_string(path)
        .io_context(|| format!("Failed to read manifest {}", path.display()))?;
    debug!(path = %path.display(), ?format, "loading manifest");
    let document = parse_document(&content, format, path)?;
    Manifest::from_document(document, path)
}

/// Parse manifest text into its top-level map.
pub fn parse_document(content: &str, format: ManifestFormat, path: &Path) -> Result<Map> {
    let parse_error = |message: String| Error::ManifestParse {
        path: path.to_path_buf(),
        message,
    };
    let document: Option<Map> = match format {
        ManifestFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| parse_error(e.to_string()))?
        }
        ManifestFormat::Json => {
            serde_json::from_str(content).map_err(|e| parse_error(e.to_string()))?
        }
        ManifestFormat::CommentedJson => serde_json::from_str(&strip_json_comments(content))
            .map_err(|e| parse_error(e.to_string()))?,
    };
    document.ok_or_else(|| parse_error("manifest is empty".to_string()))
}

/// Remove `//` line comments and `/* */` block comments outside strings.
pub fn strip_json_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut previous = '\0';
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                    }
                    if previous == '*' && skipped == '/' {
                        break;
                    }
                    previous = skipped;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn candidates_follow_lookup_order() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("manifest.json"), "{}").unwrap();
        std::fs::write(temp.path().join("manifest.yml"), "a: 1").unwrap();

        let found = find_manifest(temp.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "manifest.yml");
    }

    #[test]
    fn missing_manifest_is_reported() {
        let temp = TempDir::new().unwrap();
        let err = load_from_dir(temp.path()).unwrap_err();
        assert!(matches!(err, Error::ManifestNotFound { .. }));
    }

    #[test]
    fn strips_comments_but_keeps_strings() {
        let input = r#"{
  // leading comment
  "url": "http://example.com/a", /* block
  comment */ "glob": "src/**/*.rs"
}"#;
        let stripped = strip_json_comments(input);
        let map: Map = serde_json::from_str(&stripped).unwrap();
        assert_eq!(map["url"].as_str(), Some("http://example.com/a"));
        assert_eq!(map["glob"].as_str(), Some("src/**/*.rs"));
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let err = parse_document("name: [unclosed", ManifestFormat::Yaml, Path::new("m.yaml"))
            .unwrap_err();
        assert!(matches!(err, Error::ManifestParse { .. }));
    }

    #[test]
    fn recognizes_manifest_files() {
        assert!(is_manifest_file(Path::new("a/manifest.cjson")));
        assert!(!is_manifest_file(Path::new("a/manifest.toml")));
        assert!(!is_manifest_file(Path::new("a/other.yaml")));
    }
}
