//! Repository file enumeration and content-hash change detection.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

const CODE_EXTENSIONS: &[&str] = &["py", "ts", "tsx", "js", "jsx"];
const DOC_EXTENSIONS: &[&str] = &["md", "yaml", "yml", "json", "toml", "sql", "sh"];
const EXTRA_EXTENSIONS: &[&str] = &["css", "html", "cfg", "ini"];
const EXTRA_NAMES: &[&str] = &["Dockerfile", "Makefile", "Procfile"];

const EXCLUDE_DIRS: &[&str] = &[
    "node_modules", "venv", ".venv", "__pycache__", ".git",
    ".mypy_cache", ".pytest_cache", "dist", "build", ".tox",
    "egg-info", ".eggs",
];

const MAX_FILE_BYTES: u64 = 500_000;

pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "py" => Some("python"),
        "ts" => Some("typescript"),
        "tsx" => Some("tsx"),
        "js" | "jsx" => Some("javascript"),
        "sql" => Some("sql"),
        _ => None,
    }
}

pub fn is_code_extension(ext: &str) -> bool {
    CODE_EXTENSIONS.contains(&ext)
}

/// Walk `root`, pruning excluded directories, returning every processable
/// file path (absolute).
pub fn find_files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    walk(root, &mut out);
    out
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if path.is_dir() {
            if EXCLUDE_DIRS.contains(&name.as_str()) || name.starts_with('.') {
                continue;
            }
            walk(&path, out);
            continue;
        }
        if EXTRA_NAMES.contains(&name.as_str()) {
            out.push(path);
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else { continue };
        let ext = ext.to_lowercase();
        if CODE_EXTENSIONS.contains(&ext.as_str()) || DOC_EXTENSIONS.contains(&ext.as_str()) || EXTRA_EXTENSIONS.contains(&ext.as_str()) {
            out.push(path);
        }
    }
}

/// Read a file as UTF-8 (lossy), skipping files over the size cap.
pub fn read_file(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    if bytes.len() as u64 > MAX_FILE_BYTES {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(digest)[..32].to_string()
}

/// True if `rel_path`'s freshly-computed hash matches the previously stored one.
pub fn is_unchanged(existing: &HashMap<String, String>, rel_path: &str, hash: &str) -> bool {
    existing.get(rel_path).map(|h| h.as_str()) == Some(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash("hello"), content_hash("hello"));
        assert_ne!(content_hash("hello"), content_hash("world"));
        assert_eq!(content_hash("hello").len(), 32);
    }

    #[test]
    fn language_mapping_covers_code_extensions() {
        assert_eq!(language_for_extension("py"), Some("python"));
        assert_eq!(language_for_extension("tsx"), Some("tsx"));
        assert_eq!(language_for_extension("rs"), None);
    }
}
