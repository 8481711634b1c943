//! Session-scoped artifact storage.
//!
//! Every session owns one directory under the store root:
//!
//! ```text
//! <root>/<session_id>/
//!   source.<ext>      original input (copied or hard-linked in)
//!   proxy.mp4         1-fps analysis proxy
//!   audio.wav         16 kHz mono speech track
//!   frames/           frame_<n>_t<sec>s.jpg keyframes
//!   transcript.json   normalized transcript
//!   moments.json      normalized relevant moments
//!   doc.md | doc.json final document payload
//!   session.json      persisted session record
//!   trace.jsonl       per-stage trace events
//! ```
//!
//! All writes go to a temp file in the same directory followed by a
//! rename, so a crash mid-write never clobbers a previously good
//! artifact.

use crate::error::{Result, VidereError};
use crate::media::parse_keyframe_timestamp;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

/// Filesystem-backed artifact store.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The session's artifact directory, created on first use.
    pub fn session_root(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        let dir = self.root.join(session_id);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Whether a session directory exists on disk.
    pub fn exists(&self, session_id: &str) -> bool {
        validate_session_id(session_id).is_ok() && self.root.join(session_id).is_dir()
    }

    /// Atomically write `bytes` under `name` in the session directory.
    /// `name` may contain one level of subdirectory (e.g. `frames/x.jpg`).
    #[instrument(skip(self, bytes), fields(session_id, name))]
    pub fn put_bytes(&self, session_id: &str, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dest = self.artifact_path(session_id, name)?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let parent = dest
            .parent()
            .ok_or_else(|| VidereError::Store(format!("no parent for {}", dest.display())))?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(&dest)
            .map_err(|e| VidereError::Store(format!("persist {}: {}", dest.display(), e.error)))?;

        debug!("Wrote artifact {}", dest.display());
        Ok(dest)
    }

    /// Atomically place an existing file under `name`, copying across
    /// the boundary.
    pub fn put_file(&self, session_id: &str, name: &str, source: &Path) -> Result<PathBuf> {
        let bytes = std::fs::read(source)?;
        self.put_bytes(session_id, name, &bytes)
    }

    /// Serialize `value` as pretty JSON under `name`.
    pub fn put_json<T: serde::Serialize>(
        &self,
        session_id: &str,
        name: &str,
        value: &T,
    ) -> Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.put_bytes(session_id, name, &bytes)
    }

    /// Read an artifact's bytes.
    pub fn get_bytes(&self, session_id: &str, name: &str) -> Result<Vec<u8>> {
        let path = self.artifact_path(session_id, name)?;
        std::fs::read(&path).map_err(|e| {
            VidereError::Store(format!("read {}: {}", path.display(), e))
        })
    }

    /// Deserialize a JSON artifact.
    pub fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        session_id: &str,
        name: &str,
    ) -> Result<T> {
        let bytes = self.get_bytes(session_id, name)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Absolute path for an artifact name (the file may not exist yet).
    pub fn artifact_path(&self, session_id: &str, name: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        validate_artifact_name(name)?;
        Ok(self.root.join(session_id).join(name))
    }

    /// Map of logical artifact names to session-relative paths for
    /// everything currently on disk.
    pub fn manifest(&self, session_id: &str) -> Result<BTreeMap<String, String>> {
        validate_session_id(session_id)?;
        let dir = self.root.join(session_id);
        let mut manifest = BTreeMap::new();

        if !dir.is_dir() {
            return Ok(manifest);
        }

        for entry in std::fs::read_dir(&dir)?.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let path = entry.path();

            if path.is_file() {
                let logical = match name.as_str() {
                    "proxy.mp4" => "proxy",
                    "audio.wav" => "audio",
                    "transcript.json" => "transcript",
                    "moments.json" => "moments",
                    "doc.md" | "doc.json" => "doc",
                    "session.json" => "session",
                    "trace.jsonl" => "trace",
                    other if other.starts_with("source.") => "source",
                    _ => continue,
                };
                manifest.insert(logical.to_string(), name.clone());
            } else if path.is_dir() && name == "frames" {
                manifest.insert("frames".to_string(), "frames".to_string());
            }
        }

        Ok(manifest)
    }

    /// Ordered `{index, timestamp_sec, path}` listing of extracted frames,
    /// reconstructed from filenames.
    pub fn keyframe_manifest(&self, session_id: &str) -> Result<Vec<KeyframeEntry>> {
        validate_session_id(session_id)?;
        let frames_dir = self.root.join(session_id).join("frames");
        let mut entries = Vec::new();

        if !frames_dir.is_dir() {
            return Ok(entries);
        }

        for entry in std::fs::read_dir(&frames_dir)?.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(timestamp_sec) = parse_keyframe_timestamp(&name) else {
                continue;
            };
            entries.push(KeyframeEntry {
                index: 0,
                timestamp_sec,
                path: format!("frames/{}", name),
            });
        }

        entries.sort_by(|a, b| {
            a.timestamp_sec
                .partial_cmp(&b.timestamp_sec)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.index = i;
        }

        Ok(entries)
    }

    /// Remove a session directory and everything in it.
    pub fn delete(&self, session_id: &str) -> Result<()> {
        validate_session_id(session_id)?;
        let dir = self.root.join(session_id);
        if dir.is_dir() {
            std::fs::remove_dir_all(&dir)?;
            debug!("Deleted session directory {}", dir.display());
        }
        Ok(())
    }

    /// Session ids that have a directory on disk.
    pub fn list_sessions(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root)?.flatten() {
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if validate_session_id(name).is_ok() {
                        ids.push(name.to_string());
                    } else {
                        warn!("Ignoring foreign directory in store: {}", name);
                    }
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

/// One entry of the keyframes sub-manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct KeyframeEntry {
    pub index: usize,
    pub timestamp_sec: f64,
    pub path: String,
}

/// Session ids are opaque URL-safe strings; anything else risks path
/// traversal through the store.
fn validate_session_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(VidereError::Store(format!("invalid session id: {:?}", id)))
    }
}

fn validate_artifact_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && !name.starts_with('/')
        && name.split('/').all(|part| {
            !part.is_empty() && part != "." && part != ".." && !part.contains('\\')
        });
    if ok {
        Ok(())
    } else {
        Err(VidereError::Store(format!("invalid artifact name: {:?}", name)))
    }
}
