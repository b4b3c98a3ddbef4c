// Resolution of the caller-supplied model path into something loadable

use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref REMOTE_ID: Regex =
        Regex::new(r"^([A-Za-z0-9][\w.-]*/[\w.-]+)(?::([^\s:/]+\.gguf))?$").unwrap();
}

/// Quantization picked when a directory or repository holds several weights.
const PREFERRED_QUANTIZATION: &str = "q4_k_m";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    LocalFile(PathBuf),
    /// Model repository id; `file` pins one GGUF inside it.
    Remote { repo: String, file: Option<String> },
}

impl ModelSource {
    /// Map a path string to a source. Touches the filesystem, so call it off
    /// the async runtime.
    pub fn resolve(path: &str) -> Result<Self, String> {
        let candidate = Path::new(path);

        if candidate.is_file() {
            return Ok(ModelSource::LocalFile(candidate.to_path_buf()));
        }

        if candidate.is_dir() {
            let names: Vec<String> = fs::read_dir(candidate)
                .map_err(|e| format!("cannot read model directory: {e}"))?
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_file())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect();

            return pick_gguf_file(&names)
                .map(|name| ModelSource::LocalFile(candidate.join(name)))
                .ok_or_else(|| "no .gguf model file found in directory".to_string());
        }

        if let Some(caps) = REMOTE_ID.captures(path) {
            let repo = caps[1].to_string();
            // "dir/model.gguf" that does not exist is a missing file, not a repository
            if !repo.to_lowercase().ends_with(".gguf") {
                return Ok(ModelSource::Remote {
                    repo,
                    file: caps.get(2).map(|m| m.as_str().to_string()),
                });
            }
        }

        Err("model path does not exist".to_string())
    }
}

/// Choose the weights file among a listing: projector (`mmproj`) files are
/// skipped, a Q4_K_M quantization wins, otherwise the first name in order.
pub fn pick_gguf_file<S: AsRef<str>>(names: &[S]) -> Option<String> {
    let mut candidates: Vec<&str> = names
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| {
            let lower = name.to_lowercase();
            lower.ends_with(".gguf") && !lower.contains("mmproj")
        })
        .collect();
    candidates.sort_unstable();

    candidates
        .iter()
        .find(|name| name.to_lowercase().contains(PREFERRED_QUANTIZATION))
        .or_else(|| candidates.first())
        .map(|name| name.to_string())
}
