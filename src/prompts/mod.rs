//! Prompt records and the mode registry.
//!
//! Each documentation mode is backed by a [`PromptRecord`] with a system
//! instruction template. Built-in records cover the standard modes and can
//! be overridden by TOML files in a custom prompts directory (one file per
//! mode, file stem = record id).
//!
//! Templates use `${name}` placeholders resolved by safe substitution so
//! instructions can contain literal `{}` braces in sample JSON.

mod builtin;

pub use builtin::builtin_records;

use crate::error::{Result, VidereError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Record id used for the relevance-selection pass.
pub const RELEVANCE_PROMPT_ID: &str = "audio_filter";

/// Which model tier a mode prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelPreference {
    Fast,
    #[default]
    Quality,
}

/// Declared output format of a mode's document payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptOutputFormat {
    #[default]
    Markdown,
    Json,
}

impl std::fmt::Display for PromptOutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptOutputFormat::Markdown => write!(f, "markdown"),
            PromptOutputFormat::Json => write!(f, "json"),
        }
    }
}

/// One documentation mode: display metadata plus the instruction template.
///
/// Records are immutable once loaded; [`PromptRegistry::reload`] swaps the
/// whole set atomically instead of mutating records in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRecord {
    /// Falls back to the file stem when a prompt file omits it.
    #[serde(default)]
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    pub description: String,
    #[serde(rename = "model", default)]
    pub model_preference: ModelPreference,
    pub system_instruction: String,
    #[serde(default)]
    pub output_format: PromptOutputFormat,
    #[serde(default)]
    pub guidelines: Vec<String>,
}

/// Substitute `${name}` placeholders in a template.
///
/// A placeholder is `${` followed by one or more `[A-Za-z0-9_]` characters
/// and a closing `}`. Declared names are replaced by their value, unknown
/// names by the empty string. Any other `${` sequence is preserved
/// verbatim, which keeps raw JSON samples in instructions intact. The
/// operation is idempotent: a second pass over the output is a no-op.
pub fn interpolate(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find("${") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];

        let placeholder = after.find('}').and_then(|end| {
            let name = &after[..end];
            let valid = !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            valid.then_some((name, end))
        });

        match placeholder {
            Some((name, end)) => {
                if let Some(value) = vars.get(name) {
                    out.push_str(value);
                }
                rest = &after[end + 1..];
            }
            None => {
                // Not a placeholder; keep the marker and move past it.
                out.push_str("${");
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// A prompt record with its templates resolved for one session.
#[derive(Debug, Clone)]
pub struct ResolvedPrompt {
    pub record: Arc<PromptRecord>,
    pub system_instruction: String,
    pub guidelines: Vec<String>,
}

/// Registry of prompt records keyed by mode id.
pub struct PromptRegistry {
    custom_dir: Option<PathBuf>,
    /// Config-level variables merged under per-session variables.
    variables: HashMap<String, String>,
    records: RwLock<Arc<HashMap<String, Arc<PromptRecord>>>>,
}

impl PromptRegistry {
    /// Load built-in records, then apply overrides from `custom_dir`.
    pub fn load(
        custom_dir: Option<&str>,
        variables: Option<&HashMap<String, String>>,
    ) -> Result<Self> {
        let custom_dir = custom_dir
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).to_string()));

        let registry = Self {
            custom_dir,
            variables: variables.cloned().unwrap_or_default(),
            records: RwLock::new(Arc::new(HashMap::new())),
        };
        registry.reload()?;
        Ok(registry)
    }

    /// Rebuild the record set and swap it in atomically.
    ///
    /// Readers that already hold a record keep seeing the old version
    /// until they drop it.
    pub fn reload(&self) -> Result<()> {
        let mut records: HashMap<String, Arc<PromptRecord>> = builtin_records()
            .into_iter()
            .map(|r| (r.id.clone(), Arc::new(r)))
            .collect();

        if let Some(dir) = &self.custom_dir {
            if dir.exists() {
                for entry in std::fs::read_dir(dir)?.flatten() {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                        continue;
                    }
                    match Self::load_record(&path) {
                        Ok(record) => {
                            debug!("Loaded prompt override: {}", record.id);
                            records.insert(record.id.clone(), Arc::new(record));
                        }
                        Err(e) => {
                            warn!("Skipping prompt file {}: {}", path.display(), e);
                        }
                    }
                }
            } else {
                warn!("Prompts directory does not exist: {}", dir.display());
            }
        }

        info!("Prompt registry loaded with {} records", records.len());
        let mut guard = self
            .records
            .write()
            .map_err(|_| VidereError::Internal("prompt registry lock poisoned".into()))?;
        *guard = Arc::new(records);
        Ok(())
    }

    fn load_record(path: &std::path::Path) -> Result<PromptRecord> {
        let content = std::fs::read_to_string(path)?;
        let mut record: PromptRecord = toml::from_str(&content)?;
        if record.id.is_empty() {
            record.id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
        }
        if record.id.is_empty() {
            return Err(VidereError::Prompt(format!(
                "prompt file {} has no id",
                path.display()
            )));
        }
        Ok(record)
    }

    /// Look up a record by mode id.
    pub fn get(&self, id: &str) -> Result<Arc<PromptRecord>> {
        let records = self.snapshot()?;
        records.get(id).cloned().ok_or_else(|| {
            let mut available: Vec<&str> = records.keys().map(|k| k.as_str()).collect();
            available.sort_unstable();
            VidereError::Prompt(format!(
                "Unknown mode '{}'. Available modes: {}",
                id,
                available.join(", ")
            ))
        })
    }

    /// All records, sorted by id.
    pub fn list(&self) -> Result<Vec<Arc<PromptRecord>>> {
        let records = self.snapshot()?;
        let mut all: Vec<Arc<PromptRecord>> = records.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    /// Resolve a record's templates with per-session variables.
    ///
    /// Session variables take precedence over config-level ones.
    pub fn resolve(
        &self,
        record: Arc<PromptRecord>,
        vars: &HashMap<String, String>,
    ) -> ResolvedPrompt {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }

        let system_instruction = interpolate(&record.system_instruction, &merged);
        let guidelines = record
            .guidelines
            .iter()
            .map(|g| interpolate(g, &merged))
            .collect();

        ResolvedPrompt {
            record,
            system_instruction,
            guidelines,
        }
    }

    fn snapshot(&self) -> Result<Arc<HashMap<String, Arc<PromptRecord>>>> {
        self.records
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| VidereError::Internal("prompt registry lock poisoned".into()))
    }
}
