//! Reference identity store.
//!
//! Identities are read once from a TOML file of `[[identity]]` tables and
//! never change for the lifetime of the process.

use crate::types::Category;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("failed to read identity file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid identity file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("identity has an empty id")]
    EmptyId,
    #[error("duplicate identity id: {0}")]
    DuplicateId(String),
    #[error("identity {0} cannot use the unknown category")]
    UnknownCategory(String),
}

/// Where a portrait comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PortraitSource {
    Url(String),
    Path(PathBuf),
}

impl PortraitSource {
    /// Classify a raw `image` value. Relative paths resolve against `base`.
    pub fn parse(raw: &str, base: Option<&Path>) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return PortraitSource::Url(raw.to_string());
        }
        let path = PathBuf::from(raw);
        match base {
            Some(dir) if path.is_relative() => PortraitSource::Path(dir.join(path)),
            _ => PortraitSource::Path(path),
        }
    }
}

impl std::fmt::Display for PortraitSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortraitSource::Url(url) => f.write_str(url),
            PortraitSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceIdentity {
    pub id: String,
    pub name: String,
    pub image: PortraitSource,
    pub category: Category,
}

#[derive(Deserialize)]
struct IdentityFile {
    #[serde(default)]
    identity: Vec<IdentityEntry>,
}

#[derive(Deserialize)]
struct IdentityEntry {
    id: String,
    name: String,
    image: String,
    category: Category,
}

/// Immutable, ordered list of reference identities.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct IdentityStore {
    identities: Vec<ReferenceIdentity>,
}

impl IdentityStore {
    pub fn new(identities: Vec<ReferenceIdentity>) -> Result<Self, IdentityError> {
        let mut seen = HashSet::new();
        for identity in &identities {
            if identity.id.trim().is_empty() {
                return Err(IdentityError::EmptyId);
            }
            if identity.category == Category::Unknown {
                return Err(IdentityError::UnknownCategory(identity.id.clone()));
            }
            if !seen.insert(identity.id.as_str()) {
                return Err(IdentityError::DuplicateId(identity.id.clone()));
            }
        }
        Ok(Self { identities })
    }

    /// Parse identities from TOML text. Relative image paths resolve against `base`.
    pub fn from_toml_str(src: &str, base: Option<&Path>) -> Result<Self, IdentityError> {
        let file: IdentityFile = toml::from_str(src)?;
        let identities = file
            .identity
            .into_iter()
            .map(|e| ReferenceIdentity {
                image: PortraitSource::parse(&e.image, base),
                id: e.id,
                name: e.name,
                category: e.category,
            })
            .collect();
        Self::new(identities)
    }

    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        let src = std::fs::read_to_string(path).map_err(|source| IdentityError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_toml_str(&src, path.parent())?;
        tracing::info!(path = %path.display(), count = store.len(), "loaded reference identities");
        Ok(store)
    }

    pub fn get(&self, id: &str) -> Option<&ReferenceIdentity> {
        self.identities.iter().find(|i| i.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceIdentity> {
        self.identities.iter()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[[identity]]
id = "ada"
name = "Ada Lovelace"
image = "portraits/ada.jpg"
category = "user"

[[identity]]
id = "grace"
name = "Grace Hopper"
image = "https://example.org/grace.png"
category = "celebrity"
"#;

    #[test]
    fn test_parse_sample() {
        let store = IdentityStore::from_toml_str(SAMPLE, Some(Path::new("/etc/facewatch"))).unwrap();
        assert_eq!(store.len(), 2);

        let ada = store.get("ada").unwrap();
        assert_eq!(ada.name, "Ada Lovelace");
        assert_eq!(ada.category, Category::User);
        assert_eq!(
            ada.image,
            PortraitSource::Path(PathBuf::from("/etc/facewatch/portraits/ada.jpg"))
        );

        let grace = store.get("grace").unwrap();
        assert_eq!(grace.category, Category::Celebrity);
        assert_eq!(grace.image, PortraitSource::Url("https://example.org/grace.png".into()));
    }

    #[test]
    fn test_order_is_preserved() {
        let store = IdentityStore::from_toml_str(SAMPLE, None).unwrap();
        let ids: Vec<_> = store.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["ada", "grace"]);
    }

    #[test]
    fn test_absolute_path_untouched() {
        let src = PortraitSource::parse("/srv/a.jpg", Some(Path::new("/etc")));
        assert_eq!(src, PortraitSource::Path(PathBuf::from("/srv/a.jpg")));
    }

    #[test]
    fn test_empty_file_is_empty_store() {
        let store = IdentityStore::from_toml_str("", None).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let src = r#"
[[identity]]
id = "a"
name = "A"
image = "a.jpg"
category = "user"

[[identity]]
id = "a"
name = "A again"
image = "b.jpg"
category = "user"
"#;
        let err = IdentityStore::from_toml_str(src, None).unwrap_err();
        assert!(matches!(err, IdentityError::DuplicateId(id) if id == "a"));
    }

    #[test]
    fn test_unknown_category_rejected() {
        let src = r#"
[[identity]]
id = "x"
name = "X"
image = "x.jpg"
category = "unknown"
"#;
        let err = IdentityStore::from_toml_str(src, None).unwrap_err();
        assert!(matches!(err, IdentityError::UnknownCategory(_)));
    }

    #[test]
    fn test_bad_category_is_parse_error() {
        let src = r#"
[[identity]]
id = "x"
name = "X"
image = "x.jpg"
category = "villain"
"#;
        assert!(matches!(
            IdentityStore::from_toml_str(src, None),
            Err(IdentityError::Parse(_))
        ));
    }

    #[test]
    fn test_load_resolves_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let store = IdentityStore::load(&path).unwrap();
        assert_eq!(
            store.get("ada").unwrap().image,
            PortraitSource::Path(dir.path().join("portraits/ada.jpg"))
        );
    }

    #[test]
    fn test_contrib_example_parses() {
        let src = include_str!("../../../contrib/identities.example.toml");
        let store = IdentityStore::from_toml_str(src, Some(Path::new("/home/me/.config/facewatch"))).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.get("guest-speaker").unwrap().category, Category::Celebrity);
    }

    #[test]
    fn test_load_missing_file() {
        let err = IdentityStore::load(Path::new("/nonexistent/identities.toml")).unwrap_err();
        assert!(matches!(err, IdentityError::Read { .. }));
    }
}
