// src/cwe.rs
// Narrow lookup surface over the localized CWE catalog. The catalog file is
// produced out-of-band (XML import + translation); the CVE formatter only
// needs id -> localized name/description.
use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LocalizedWeakness {
    pub id: String,
    pub name_en: String,
    pub name_ko: String,
    pub description_ko: String,
}

pub trait WeaknessLookup: Send + Sync {
    fn get_localized_weakness(&self, id: &str) -> Option<LocalizedWeakness>;
}

#[derive(Default)]
pub struct CweCatalog {
    map: HashMap<String, LocalizedWeakness>,
}

impl CweCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from a JSON array of localized entries.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading CWE catalog from {}", path.display()))?;
        let entries: Vec<LocalizedWeakness> =
            serde_json::from_str(&content).context("parsing CWE catalog json")?;
        let map = entries.into_iter().map(|e| (e.id.clone(), e)).collect();
        Ok(Self { map })
    }

    /// Missing catalog file is not fatal; CVE embeds just omit the
    /// localized weakness description.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(cat) => cat,
            Err(e) => {
                tracing::warn!(error = ?e, path = %path.display(), "CWE catalog unavailable, using empty");
                Self::empty()
            }
        }
    }
}

impl WeaknessLookup for CweCatalog {
    fn get_localized_weakness(&self, id: &str) -> Option<LocalizedWeakness> {
        self.map.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn catalog_lookup_hits_and_misses() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"[{{"id":"CWE-79","name_en":"Cross-site Scripting","name_ko":"크로스 사이트 스크립팅","description_ko":"웹 페이지에 악성 스크립트가 삽입되는 취약점"}}]"#
        )
        .unwrap();

        let cat = CweCatalog::load_from(f.path()).unwrap();
        let hit = cat.get_localized_weakness("CWE-79").unwrap();
        assert_eq!(hit.name_en, "Cross-site Scripting");
        assert!(cat.get_localized_weakness("CWE-89").is_none());
    }

    #[test]
    fn missing_file_degrades_to_empty() {
        let cat = CweCatalog::load_or_empty(Path::new("does/not/exist.json"));
        assert!(cat.get_localized_weakness("CWE-79").is_none());
    }
}
