mod file;

pub use file::FileStore;

use crate::error::{DevchatError, Result};
use crate::prompt::Prompt;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{OnceLock, RwLock};

/// Content-addressed prompt storage. Records are keyed by each of their
/// response hashes and never change once written, so writing the same
/// prompt twice is harmless.
pub trait Store: Send + Sync {
    fn get_prompt(&self, hash: &str) -> Result<Prompt>;

    fn store_prompt(&self, prompt: &Prompt) -> Result<()>;

    /// Every hash with a stored record.
    fn hashes(&self) -> Result<Vec<String>>;

    /// Expand a hash prefix to the single stored hash it names.
    fn resolve_hash(&self, prefix: &str) -> Result<String> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() {
            return Err(DevchatError::validation("empty prompt hash"));
        }

        let matches: Vec<String> = self
            .hashes()?
            .into_iter()
            .filter(|h| h.starts_with(&prefix))
            .collect();

        match matches.len() {
            0 => Err(DevchatError::NotFound(prefix)),
            1 => Ok(matches.into_iter().next().unwrap_or_default()),
            _ if matches.contains(&prefix) => Ok(prefix),
            _ => Err(DevchatError::AmbiguousHash { prefix, matches }),
        }
    }

    /// Stored prompts, newest first. A prompt with several response
    /// variants is listed once.
    fn list_recent(&self, limit: usize) -> Result<Vec<Prompt>> {
        let mut prompts = Vec::new();
        for hash in self.hashes()? {
            let prompt = self.get_prompt(&hash)?;
            if prompt.hashes().values().next() == Some(&hash) {
                prompts.push(prompt);
            }
        }
        prompts.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        prompts.truncate(limit);
        Ok(prompts)
    }
}

pub(crate) fn record_hashes(prompt: &Prompt) -> Result<Vec<String>> {
    let hashes: Vec<String> = prompt.hashes().into_values().collect();
    if hashes.is_empty() {
        return Err(DevchatError::validation(
            "cannot store a prompt without a response",
        ));
    }
    Ok(hashes)
}

/// Split user-supplied hash lists (comma or whitespace separated) into
/// lowercase hex tokens, dropping duplicates but keeping first-seen order.
pub fn parse_hashes<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<String>> {
    static HEX: OnceLock<Regex> = OnceLock::new();
    let hex = HEX.get_or_init(|| Regex::new(r"^[0-9a-fA-F]+$").expect("valid regex"));

    let mut hashes: Vec<String> = Vec::new();
    for token in inputs
        .iter()
        .flat_map(|s| s.as_ref().split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|t| !t.is_empty())
    {
        if !hex.is_match(token) {
            return Err(DevchatError::validation(format!(
                "invalid prompt hash: {}",
                token
            )));
        }
        let token = token.to_lowercase();
        if !hashes.contains(&token) {
            hashes.push(token);
        }
    }
    Ok(hashes)
}

/// Store backed by a map in memory.
#[derive(Default)]
pub struct MemoryStore {
    prompts: RwLock<BTreeMap<String, Prompt>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.prompts.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for MemoryStore {
    fn get_prompt(&self, hash: &str) -> Result<Prompt> {
        self.prompts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(hash)
            .cloned()
            .ok_or_else(|| DevchatError::NotFound(hash.to_string()))
    }

    fn store_prompt(&self, prompt: &Prompt) -> Result<()> {
        let hashes = record_hashes(prompt)?;
        let mut prompts = self.prompts.write().unwrap_or_else(|e| e.into_inner());
        for hash in hashes {
            prompts.insert(hash, prompt.clone());
        }
        Ok(())
    }

    fn hashes(&self) -> Result<Vec<String>> {
        Ok(self
            .prompts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect())
    }
}
