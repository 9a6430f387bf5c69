//! Connection profile storage
//!
//! Saved profiles live in `profiles.toml` next to the settings file. The
//! session core never reads this store; the CLI resolves a profile here and
//! hands it to the session.

use crate::config::Settings;
use crate::database::profile::ConnectionProfile;
use crate::error::{BrowserError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

/// Profiles file name
const PROFILES_FILE: &str = "profiles.toml";

/// Keyed store of connection profiles
pub trait ProfileStore {
    /// All saved profiles, in insertion order
    fn list(&self) -> Result<Vec<ConnectionProfile>>;

    /// Insert or replace by id; an empty id gets a fresh one
    fn save(&self, profile: ConnectionProfile) -> Result<ConnectionProfile>;

    /// Remove a profile, reporting whether it existed
    fn delete(&self, id: &str) -> Result<bool>;

    /// Stamp the profile's last-used time
    fn mark_used(&self, id: &str) -> Result<()>;

    /// Look a profile up by id, then by name
    fn find(&self, key: &str) -> Result<Option<ConnectionProfile>> {
        let profiles = self.list()?;
        let by_id = profiles.iter().position(|p| p.id == key);
        let index = by_id.or_else(|| profiles.iter().position(|p| p.name == key));
        Ok(index.map(|i| profiles[i].clone()))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfilesFile {
    #[serde(default)]
    profiles: Vec<ConnectionProfile>,
}

/// TOML file backed profile store
#[derive(Debug, Clone)]
pub struct TomlProfileStore {
    path: PathBuf,
}

impl TomlProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location under the configuration directory
    pub fn with_default_path() -> Result<Self> {
        Ok(Self::new(Settings::config_dir()?.join(PROFILES_FILE)))
    }

    fn read(&self) -> Result<ProfilesFile> {
        if !self.path.exists() {
            return Ok(ProfilesFile::default());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&content)?)
    }

    fn write(&self, file: &ProfilesFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(file)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl ProfileStore for TomlProfileStore {
    fn list(&self) -> Result<Vec<ConnectionProfile>> {
        Ok(self.read()?.profiles)
    }

    fn save(&self, mut profile: ConnectionProfile) -> Result<ConnectionProfile> {
        if profile.id.is_empty() {
            profile.id = Uuid::new_v4().to_string();
        }

        let mut stored = profile.clone();
        if !stored.persist_password {
            stored.password.clear();
        }

        let mut file = self.read()?;
        match file.profiles.iter().position(|p| p.id == stored.id) {
            Some(pos) => file.profiles[pos] = stored,
            None => file.profiles.push(stored),
        }
        self.write(&file)?;

        Ok(profile)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut file = self.read()?;
        let before = file.profiles.len();
        file.profiles.retain(|p| p.id != id);
        let removed = file.profiles.len() != before;
        if removed {
            self.write(&file)?;
        }
        Ok(removed)
    }

    fn mark_used(&self, id: &str) -> Result<()> {
        let mut file = self.read()?;
        let profile = file
            .profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| BrowserError::NotFound(format!("profile {}", id)))?;
        profile.last_used_at = Some(Utc::now());
        self.write(&file)
    }
}
