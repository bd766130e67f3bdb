//! Shared entity construction across language extractors.

use koi_core::{CodeEntity, CodeEntityType};
use sha2::{Digest, Sha256};

pub fn create_file_entity(
    file_path: &str,
    repo: &str,
    language: &str,
    content: &str,
    module_name: &str,
    module_path: &str,
) -> CodeEntity {
    let file_name = std::path::Path::new(file_path).file_name().map(|f| f.to_string_lossy().to_string()).unwrap_or_else(|| file_path.to_string());
    let line_count = content.lines().count().max(1) as u32;
    let digest = Sha256::digest(content.as_bytes());
    let file_hash = hex::encode(digest)[..16].to_string();

    CodeEntity {
        entity_id: crate::ids::entity_id(repo, file_path, &file_name, "file"),
        name: file_name,
        entity_type: CodeEntityType::File,
        file_path: file_path.to_string(),
        line_start: 1,
        line_end: line_count,
        language: language.to_string(),
        repo: repo.to_string(),
        signature: Some(format!("{file_path} ({line_count} lines)")),
        params: None,
        return_type: None,
        docstring: Some(format!("hash:{file_hash}")),
        receiver_type: None,
        module_name: Some(module_name.to_string()),
        module_path: Some(module_path.to_string()),
        extraction_method: "tree_sitter".to_string(),
        extraction_run_id: String::new(),
    }
}
