#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use memory::Database;

use crate::config::ContextConfig;
use crate::context::Context;
use crate::{EngineError, Result};

/// Read a word list: one entry per line, trimmed and lower-cased, blanks
/// skipped.
pub fn read_word_list(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)?;
    Ok(raw
        .lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|line| !line.is_empty())
        .collect())
}

fn valid_context_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Opens and caches contexts under a data directory.
///
/// Layout:
/// - `languages/<language>.banned` and `languages/<language>.boring`
/// - `contexts/<id>.json` (configuration) and `contexts/<id>.sqlite3` (model)
pub struct ContextManager {
    contexts_dir: PathBuf,
    banned: HashMap<String, Vec<String>>,
    boring: HashMap<String, Vec<String>>,
    open: Mutex<HashMap<String, Arc<Context>>>,
}

impl ContextManager {
    /// Load every word list under `data_dir/languages`.
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let mut banned = HashMap::new();
        let mut boring = HashMap::new();
        let languages_dir = data_dir.join("languages");
        if languages_dir.is_dir() {
            for entry in fs::read_dir(&languages_dir)? {
                let path = entry?.path();
                let (Some(language), Some(kind)) = (
                    path.file_stem().and_then(|s| s.to_str()).map(str::to_string),
                    path.extension().and_then(|s| s.to_str()),
                ) else {
                    continue;
                };
                let target = match kind {
                    "banned" => &mut banned,
                    "boring" => &mut boring,
                    _ => continue,
                };
                let words = read_word_list(&path)?;
                log::info!("loaded {} {} words for {}", words.len(), kind, language);
                target.insert(language, words);
            }
        } else {
            log::warn!("no languages directory under {}", data_dir.display());
        }
        Ok(Self {
            contexts_dir: data_dir.join("contexts"),
            banned,
            boring,
            open: Mutex::new(HashMap::new()),
        })
    }

    /// Open `id`, or return the already-open instance.
    pub fn get_context(&self, id: &str) -> Result<Arc<Context>> {
        if !valid_context_id(id) {
            return Err(EngineError::InvalidContextId(id.to_string()));
        }
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ctx) = open.get(id) {
            return Ok(Arc::clone(ctx));
        }

        let config = ContextConfig::load(self.contexts_dir.join(format!("{}.json", id)))?;
        let missing = |kind: &'static str| EngineError::MissingWordList { language: config.language.clone(), kind };
        let banned = self.banned.get(&config.language).ok_or_else(|| missing("banned"))?;
        let boring = self.boring.get(&config.language).ok_or_else(|| missing("boring"))?;
        let db = Database::open(self.contexts_dir.join(format!("{}.sqlite3", id)))?;
        let ctx = Arc::new(Context::open(id, config, db, banned, boring)?);
        open.insert(id.to_string(), Arc::clone(&ctx));
        Ok(ctx)
    }

    /// Drop every cached context. Callers holding an `Arc` keep theirs.
    pub fn close(&self) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        log::info!("closing {} contexts", open.len());
        open.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn data_dir(config: &str, lists: &[(&str, &str)]) -> Result<TempDir> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("contexts"))?;
        fs::create_dir_all(dir.path().join("languages"))?;
        fs::write(dir.path().join("contexts/chat.json"), config)?;
        for (name, body) in lists {
            fs::write(dir.path().join("languages").join(name), body)?;
        }
        Ok(dir)
    }

    #[test]
    fn opens_caches_and_reopens_from_disk() -> Result<()> {
        let dir = data_dir(
            r#"{"language": "english", "production": {"seed": 4}}"#,
            &[("english.banned", "Heck\n\n"), ("english.boring", "the\na\n")],
        )?;
        let manager = ContextManager::new(dir.path())?;
        let ctx = manager.get_context("chat")?;
        assert!(Arc::ptr_eq(&ctx, &manager.get_context("chat")?));
        assert!(!ctx.is_allowed("what the HECK"));
        assert_eq!(ctx.learn(&["the cat sat on the mat"]), 1);
        drop(ctx);

        manager.close();
        let again = ContextManager::new(dir.path())?.get_context("chat")?;
        assert_eq!(again.learn(&["the cat sat on the mat"]), 1);
        assert!(dir.path().join("contexts/chat.sqlite3").exists());
        Ok(())
    }

    #[test]
    fn missing_lists_and_bad_ids_are_errors() -> Result<()> {
        let dir = data_dir(r#"{"language": "english"}"#, &[("english.banned", "")])?;
        let manager = ContextManager::new(dir.path())?;
        assert!(matches!(
            manager.get_context("chat"),
            Err(EngineError::MissingWordList { kind: "boring", .. })
        ));
        assert!(matches!(manager.get_context("../etc"), Err(EngineError::InvalidContextId(_))));
        assert!(matches!(manager.get_context("nope"), Err(EngineError::Io(_))));
        Ok(())
    }

    #[test]
    fn unknown_language_is_rejected() -> Result<()> {
        let dir = data_dir(
            r#"{"language": "klingon"}"#,
            &[("klingon.banned", ""), ("klingon.boring", "")],
        )?;
        let manager = ContextManager::new(dir.path())?;
        assert!(matches!(manager.get_context("chat"), Err(EngineError::UnknownLanguage(_))));
        Ok(())
    }
}
