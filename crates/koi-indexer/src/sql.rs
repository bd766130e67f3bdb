//! Regex-based extraction for `.sql` files: tables, indexes, views,
//! functions. No tree-sitter grammar for SQL in the corpus, so this
//! mirrors the original's regex approach rather than reaching for one.

use koi_core::{CodeEdge, CodeEdgeType, CodeEntity, CodeEntityType};
use regex::Regex;

use crate::ids::{edge_id, entity_id};

pub fn extract(content: &str, file_path: &str, repo: &str) -> (Vec<CodeEntity>, Vec<CodeEdge>) {
    let file_entity = crate::common::create_file_entity(file_path, repo, "sql", content, "", "");
    let mut entities = vec![file_entity.clone()];
    let mut edges = Vec::new();

    for (name, line_num) in find_all(content, r"(?i)CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?(\w+)") {
        let entity = sql_entity(&name, "table", CodeEntityType::Class, file_path, repo, line_num, &format!("CREATE TABLE {name}"));
        edges.push(CodeEdge {
            edge_id: edge_id(&file_entity.entity_id, &entity.entity_id, "CONTAINS"),
            from_entity_id: file_entity.entity_id.clone(),
            to_entity_id: entity.entity_id.clone(),
            edge_type: CodeEdgeType::Contains,
            file_path: file_path.to_string(),
            line_number: line_num,
        });
        entities.push(entity);
    }

    for (name, line_num) in find_all(content, r"(?i)CREATE\s+(?:UNIQUE\s+)?INDEX\s+(?:IF\s+NOT\s+EXISTS\s+)?(\w+)") {
        entities.push(sql_entity(&name, "index", CodeEntityType::Function, file_path, repo, line_num, &format!("CREATE INDEX {name}")));
    }

    for (name, line_num) in find_all(content, r"(?i)CREATE\s+(?:OR\s+REPLACE\s+)?VIEW\s+(\w+)") {
        entities.push(sql_entity(&name, "view", CodeEntityType::Class, file_path, repo, line_num, &format!("CREATE VIEW {name}")));
    }

    for (name, line_num) in find_all(content, r"(?i)CREATE\s+(?:OR\s+REPLACE\s+)?FUNCTION\s+(\w+)") {
        entities.push(sql_entity(&name, "sql_function", CodeEntityType::Function, file_path, repo, line_num, &format!("CREATE FUNCTION {name}")));
    }

    (entities, edges)
}

fn find_all(content: &str, pattern: &str) -> Vec<(String, u32)> {
    let Ok(re) = Regex::new(pattern) else { return Vec::new() };
    re.captures_iter(content)
        .filter_map(|caps| {
            let m = caps.get(0)?;
            let name = caps.get(1)?.as_str().to_string();
            let line_num = content[..m.start()].matches('\n').count() as u32 + 1;
            Some((name, line_num))
        })
        .collect()
}

fn sql_entity(
    name: &str,
    signature_kind: &str,
    entity_type: CodeEntityType,
    file_path: &str,
    repo: &str,
    line_num: u32,
    signature: &str,
) -> CodeEntity {
    CodeEntity {
        entity_id: entity_id(repo, file_path, name, signature_kind),
        name: name.to_string(),
        entity_type,
        file_path: file_path.to_string(),
        line_start: line_num,
        line_end: line_num,
        language: "sql".to_string(),
        repo: repo.to_string(),
        signature: Some(signature.to_string()),
        params: None,
        return_type: None,
        docstring: None,
        receiver_type: None,
        module_name: None,
        module_path: None,
        extraction_method: "regex".to_string(),
        extraction_run_id: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_table_and_index() {
        let sql = "CREATE TABLE IF NOT EXISTS widgets (id TEXT);\nCREATE UNIQUE INDEX idx_widgets_id ON widgets (id);\n";
        let (entities, edges) = extract(sql, "schema.sql", "repo");
        assert!(entities.iter().any(|e| e.name == "widgets" && e.entity_type == CodeEntityType::Class));
        assert!(entities.iter().any(|e| e.name == "idx_widgets_id" && e.entity_type == CodeEntityType::Function));
        assert_eq!(edges.len(), 1);
    }
}
