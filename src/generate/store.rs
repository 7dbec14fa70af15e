//! Session result persistence
//!
//! One pretty-printed JSON document per session, named
//! `{strategy}_{topic}_{model}.json`. Non-ASCII text is written verbatim.

use crate::question::SessionResult;
use crate::util::write_json;
use std::fs;
use std::path::{Path, PathBuf};

pub struct SessionStore {
    dir: PathBuf,
    model_name: String,
}

impl SessionStore {
    /// `model_name` is the short model name (last segment of the model id)
    pub fn new(dir: impl Into<PathBuf>, model_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            model_name: model_name.into(),
        }
    }

    pub fn file_name(&self, strategy: &str, topic: &str) -> String {
        format!(
            "{}_{}_{}.json",
            sanitize_component(strategy),
            sanitize_component(topic),
            sanitize_component(&self.model_name)
        )
    }

    pub fn path_for(&self, strategy: &str, topic: &str) -> PathBuf {
        self.dir.join(self.file_name(strategy, topic))
    }

    pub fn save(&self, strategy: &str, result: &SessionResult) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            anyhow::anyhow!("Failed to create output directory {}: {}", self.dir.display(), e)
        })?;

        let path = self.path_for(strategy, &result.topic);
        write_json(&path, result)?;
        Ok(path)
    }

    pub fn load(path: &Path) -> anyhow::Result<SessionResult> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid session file {}: {}", path.display(), e))
    }
}

/// Replace characters that cannot appear in a file name component
fn sanitize_component(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect()
}
