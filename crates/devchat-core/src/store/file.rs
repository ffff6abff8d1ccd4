use super::{record_hashes, Store};
use crate::error::{DevchatError, Result};
use crate::prompt::Prompt;
use std::fs;
use std::path::PathBuf;

/// Stores each prompt as pretty JSON, one file per response hash.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a store in the default directory (`<data_dir>/devchat/prompts`).
    pub fn new() -> Result<Self> {
        let base_dir = Self::default_dir()?;
        Self::with_dir(base_dir)
    }

    /// Create a store rooted at `base_dir`, creating it if needed.
    pub fn with_dir(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| {
            DevchatError::Config(format!("Failed to create prompt store directory: {}", e))
        })?;

        Ok(Self { base_dir })
    }

    pub fn default_dir() -> Result<PathBuf> {
        let data = dirs::data_dir().ok_or_else(|| {
            DevchatError::Config("Could not determine data directory".to_string())
        })?;

        Ok(data.join("devchat").join("prompts"))
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    fn prompt_path(&self, hash: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", hash))
    }
}

impl Store for FileStore {
    fn get_prompt(&self, hash: &str) -> Result<Prompt> {
        let path = self.prompt_path(hash);
        if !path.exists() {
            return Err(DevchatError::NotFound(hash.to_string()));
        }

        let contents = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn store_prompt(&self, prompt: &Prompt) -> Result<()> {
        let contents = serde_json::to_string_pretty(prompt)?;

        for hash in record_hashes(prompt)? {
            let path = self.prompt_path(&hash);
            let tmp_path = path.with_extension("json.tmp");
            fs::write(&tmp_path, &contents)?;
            fs::rename(&tmp_path, &path)?;
            tracing::debug!(%hash, path = %path.display(), "stored prompt");
        }
        Ok(())
    }

    fn hashes(&self) -> Result<Vec<String>> {
        let mut hashes = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                hashes.push(stem.to_string());
            }
        }
        hashes.sort();
        Ok(hashes)
    }
}
