use log::{ info, warn };
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{ Path, PathBuf };
use thiserror::Error;

pub const THEME_KEY: &str = "theme";

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("Preference file IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Preference JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Small persisted key/value store. Only the UI uses it.
pub trait PreferenceStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PrefsError>;
}

/// Preferences kept as a flat JSON object on disk, rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFilePreferences {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFilePreferences {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PrefsError> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No preference file at {}, starting with defaults", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                return Err(e.into());
            }
        };
        Ok(Self { path, values })
    }

    /// Like `load`, but a broken file is replaced by empty preferences.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!("Ignoring unreadable preference file {}: {}", path.display(), e);
                Self { path: path.to_path_buf(), values: BTreeMap::new() }
            }
        }
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PrefsError> {
        self.values.insert(key.to_string(), value.to_string());
        let json = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn load(store: &dyn PreferenceStore) -> Self {
        match store.get(THEME_KEY).as_deref() {
            Some("dark") => Theme::Dark,
            _ => Theme::Light,
        }
    }

    pub fn toggle(store: &mut dyn PreferenceStore) -> Result<Self, PrefsError> {
        let next = match Self::load(store) {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        };
        store.set(THEME_KEY, next.as_str())?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_light_theme() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = JsonFilePreferences::load(dir.path().join("prefs.json")).unwrap();
        assert_eq!(prefs.get(THEME_KEY), None);
        assert_eq!(Theme::load(&prefs), Theme::Light);
    }

    #[test]
    fn toggle_persists_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let mut prefs = JsonFilePreferences::load(&path).unwrap();
        assert_eq!(Theme::toggle(&mut prefs).unwrap(), Theme::Dark);

        let reloaded = JsonFilePreferences::load(&path).unwrap();
        assert_eq!(reloaded.get(THEME_KEY).as_deref(), Some("dark"));
        assert_eq!(Theme::load(&reloaded), Theme::Dark);

        let mut reloaded = reloaded;
        assert_eq!(Theme::toggle(&mut reloaded).unwrap(), Theme::Light);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(JsonFilePreferences::load(&path), Err(PrefsError::Json(_))));
        let prefs = JsonFilePreferences::load_or_default(&path);
        assert_eq!(Theme::load(&prefs), Theme::Light);
    }
}
