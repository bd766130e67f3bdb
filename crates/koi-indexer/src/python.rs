//! Python entity/edge extraction via `tree-sitter-python`.

use koi_core::{CodeEdge, CodeEdgeType, CodeEntity, CodeEntityType};
use tree_sitter::{Node, Parser};

use crate::ids::{edge_id, entity_id};
use crate::ts_util::{find_nodes_by_kind, line_end, line_start, node_text};

pub fn extract(content: &str, file_path: &str, repo: &str) -> (Vec<CodeEntity>, Vec<CodeEdge>) {
    let mut parser = Parser::new();
    if parser.set_language(&tree_sitter_python::language()).is_err() {
        return (Vec::new(), Vec::new());
    }
    let Some(tree) = parser.parse(content, None) else {
        return (Vec::new(), Vec::new());
    };
    let root = tree.root_node();
    let source = content.as_bytes();

    let mut entities = Vec::new();
    let mut edges = Vec::new();

    let dir_path = std::path::Path::new(file_path).parent().map(|p| p.to_string_lossy().to_string()).unwrap_or_default();
    let file_name = std::path::Path::new(file_path).file_name().map(|f| f.to_string_lossy().to_string()).unwrap_or_default();

    let module_name = if file_name == "__init__.py" {
        if dir_path.is_empty() {
            repo.to_string()
        } else {
            std::path::Path::new(&dir_path).file_name().map(|f| f.to_string_lossy().to_string()).unwrap_or_else(|| dir_path.clone())
        }
    } else {
        std::path::Path::new(&file_name).file_stem().map(|f| f.to_string_lossy().to_string()).unwrap_or(file_name.clone())
    };

    let full_module_path = if dir_path.is_empty() {
        module_name.clone()
    } else {
        let dotted = dir_path.replace(std::path::MAIN_SEPARATOR, ".").replace('/', ".");
        let dir_base = std::path::Path::new(&dir_path).file_name().map(|f| f.to_string_lossy().to_string());
        if dir_base.as_deref() != Some(module_name.as_str()) {
            format!("{dotted}.{module_name}")
        } else {
            dotted
        }
    };

    let module_entity = create_module_entity(&module_name, file_path, repo, content, &full_module_path, file_name == "__init__.py");
    entities.push(module_entity.clone());

    let file_entity = crate::common::create_file_entity(file_path, repo, "python", content, &module_name, &full_module_path);
    edges.push(CodeEdge {
        edge_id: edge_id(&file_entity.entity_id, &module_entity.entity_id, "BELONGS_TO"),
        from_entity_id: file_entity.entity_id.clone(),
        to_entity_id: module_entity.entity_id.clone(),
        edge_type: CodeEdgeType::BelongsTo,
        file_path: file_path.to_string(),
        line_number: 1,
    });
    entities.push(file_entity.clone());

    let mut import_nodes = Vec::new();
    find_nodes_by_kind(root, "import_statement", &mut import_nodes);
    find_nodes_by_kind(root, "import_from_statement", &mut import_nodes);
    for node in import_nodes {
        if let Some(mut imp) = extract_import(node, source, file_path, repo) {
            imp.module_name = Some(module_name.clone());
            imp.module_path = Some(full_module_path.clone());
            entities.push(imp);
        }
    }

    let mut class_nodes = Vec::new();
    find_nodes_by_kind(root, "class_definition", &mut class_nodes);
    for node in class_nodes {
        if let Some(mut entity) = extract_class(node, source, file_path, repo) {
            entity.module_name = Some(module_name.clone());
            entity.module_path = Some(full_module_path.clone());
            edges.push(contains_edge(&file_entity, &entity, file_path));
            entities.push(entity);
        }
    }

    let mut function_nodes = Vec::new();
    find_nodes_by_kind(root, "function_definition", &mut function_nodes);
    for node in function_nodes {
        if let Some(mut entity) = extract_function(node, source, file_path, repo) {
            entity.module_name = Some(module_name.clone());
            entity.module_path = Some(full_module_path.clone());
            edges.push(contains_edge(&file_entity, &entity, file_path));
            edges.extend(extract_calls(node, source, &entity));
            entities.push(entity);
        }
    }

    (entities, edges)
}

fn contains_edge(file_entity: &CodeEntity, entity: &CodeEntity, file_path: &str) -> CodeEdge {
    CodeEdge {
        edge_id: edge_id(&file_entity.entity_id, &entity.entity_id, "CONTAINS"),
        from_entity_id: file_entity.entity_id.clone(),
        to_entity_id: entity.entity_id.clone(),
        edge_type: CodeEdgeType::Contains,
        file_path: file_path.to_string(),
        line_number: entity.line_start,
    }
}

fn create_module_entity(
    module_name: &str,
    file_path: &str,
    repo: &str,
    content: &str,
    full_module_path: &str,
    is_package: bool,
) -> CodeEntity {
    let docstring = extract_module_docstring(content);
    CodeEntity {
        entity_id: entity_id(repo, file_path, module_name, "module"),
        name: module_name.to_string(),
        entity_type: CodeEntityType::Module,
        file_path: file_path.to_string(),
        line_start: 1,
        line_end: 1,
        language: "python".to_string(),
        repo: repo.to_string(),
        signature: Some(format!("module {full_module_path}{}", if is_package { " (package)" } else { "" })),
        params: None,
        return_type: None,
        docstring: if docstring.is_empty() { None } else { Some(docstring) },
        receiver_type: None,
        module_name: Some(module_name.to_string()),
        module_path: Some(full_module_path.to_string()),
        extraction_method: "tree_sitter".to_string(),
        extraction_run_id: String::new(),
    }
}

fn extract_module_docstring(content: &str) -> String {
    let mut docstring = String::new();
    let lines: Vec<&str> = content.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        let stripped = line.trim();
        if stripped.starts_with("\"\"\"") || stripped.starts_with("'''") {
            let quote = if stripped.starts_with("\"\"\"") { "\"\"\"" } else { "'''" };
            if stripped.matches(quote).count() >= 2 {
                docstring = stripped.trim_matches(|c| quote.contains(c)).trim().to_string();
            } else {
                let mut parts = vec![stripped.trim_start_matches(quote).to_string()];
                for later in lines.iter().skip(i + 1).take(19) {
                    if later.contains(quote) {
                        parts.push(later.split(quote).next().unwrap_or("").to_string());
                        break;
                    }
                    parts.push(later.to_string());
                }
                docstring = parts.join(" ").trim().to_string();
            }
            break;
        } else if !stripped.is_empty() && !stripped.starts_with('#') {
            break;
        }
    }
    if docstring.chars().count() > 200 {
        let truncated: String = docstring.chars().take(200).collect();
        format!("{truncated}...")
    } else {
        docstring
    }
}

fn extract_import(node: Node, source: &[u8], file_path: &str, repo: &str) -> Option<CodeEntity> {
    let kind = node.kind();
    let mut cursor = node.walk();
    let name = if kind == "import_statement" {
        node.children(&mut cursor).find(|c| c.kind() == "dotted_name").map(|c| node_text(c, source).to_string())
    } else {
        node.children(&mut cursor).find(|c| c.kind() == "dotted_name").map(|c| node_text(c, source).to_string())
    }?;

    Some(CodeEntity {
        entity_id: entity_id(repo, file_path, &format!("import:{name}"), ""),
        name,
        entity_type: CodeEntityType::Import,
        file_path: file_path.to_string(),
        line_start: line_start(node),
        line_end: line_end(node),
        language: "python".to_string(),
        repo: repo.to_string(),
        signature: Some(node_text(node, source).to_string()),
        params: None,
        return_type: None,
        docstring: None,
        receiver_type: None,
        module_name: None,
        module_path: None,
        extraction_method: "tree_sitter".to_string(),
        extraction_run_id: String::new(),
    })
}

fn extract_class(node: Node, source: &[u8], file_path: &str, repo: &str) -> Option<CodeEntity> {
    let mut cursor = node.walk();
    let name = node.children(&mut cursor).find(|c| c.kind() == "identifier").map(|c| node_text(c, source).to_string())?;
    let docstring = python_docstring(node, source);
    let signature = node_text(node, source).lines().next().unwrap_or("").to_string();

    Some(CodeEntity {
        entity_id: entity_id(repo, file_path, &name, "class"),
        name,
        entity_type: CodeEntityType::Class,
        file_path: file_path.to_string(),
        line_start: line_start(node),
        line_end: line_end(node),
        language: "python".to_string(),
        repo: repo.to_string(),
        signature: Some(signature),
        params: None,
        return_type: None,
        docstring: if docstring.is_empty() { None } else { Some(docstring) },
        receiver_type: None,
        module_name: None,
        module_path: None,
        extraction_method: "tree_sitter".to_string(),
        extraction_run_id: String::new(),
    })
}

fn extract_function(node: Node, source: &[u8], file_path: &str, repo: &str) -> Option<CodeEntity> {
    let mut name = String::new();
    let mut params = String::new();
    let mut return_type = String::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "identifier" => name = node_text(child, source).to_string(),
            "parameters" => params = node_text(child, source).to_string(),
            "type" => return_type = node_text(child, source).to_string(),
            _ => {}
        }
    }
    if name.is_empty() {
        return None;
    }

    let docstring = python_docstring(node, source);
    let signature = node_text(node, source).lines().next().unwrap_or("").to_string();

    Some(CodeEntity {
        entity_id: entity_id(repo, file_path, &name, &params),
        name,
        entity_type: CodeEntityType::Function,
        file_path: file_path.to_string(),
        line_start: line_start(node),
        line_end: line_end(node),
        language: "python".to_string(),
        repo: repo.to_string(),
        signature: Some(signature),
        params: if params.is_empty() { None } else { Some(params) },
        return_type: if return_type.is_empty() { None } else { Some(return_type) },
        docstring: if docstring.is_empty() { None } else { Some(docstring) },
        receiver_type: None,
        module_name: None,
        module_path: None,
        extraction_method: "tree_sitter".to_string(),
        extraction_run_id: String::new(),
    })
}

fn extract_calls(node: Node, source: &[u8], caller: &CodeEntity) -> Vec<CodeEdge> {
    let mut calls = Vec::new();
    find_nodes_by_kind(node, "call", &mut calls);

    let mut edges = Vec::new();
    for call in calls {
        let mut cursor = call.walk();
        let callee = call
            .children(&mut cursor)
            .find(|c| c.kind() == "identifier" || c.kind() == "attribute")
            .map(|c| node_text(c, source).to_string());
        if let Some(callee_name) = callee {
            edges.push(CodeEdge {
                edge_id: edge_id(&caller.entity_id, &callee_name, "CALLS"),
                from_entity_id: caller.entity_id.clone(),
                to_entity_id: callee_name,
                edge_type: CodeEdgeType::Calls,
                file_path: caller.file_path.clone(),
                line_number: line_start(call),
            });
        }
    }
    edges
}

fn python_docstring(node: Node, source: &[u8]) -> String {
    let mut cursor = node.walk();
    let Some(body) = node.children(&mut cursor).find(|c| c.kind() == "block") else {
        return String::new();
    };
    let mut body_cursor = body.walk();
    let Some(first) = body.children(&mut body_cursor).next() else {
        return String::new();
    };
    if first.kind() != "expression_statement" {
        return String::new();
    }
    let mut expr_cursor = first.walk();
    let Some(string_node) = first.children(&mut expr_cursor).find(|c| c.kind() == "string") else {
        return String::new();
    };
    node_text(string_node, source).trim_matches(|c| c == '"' || c == '\'').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#""""Widget helpers."""
import os
from typing import Optional


class Widget:
    """A single widget."""

    def describe(self, verbose: bool) -> str:
        """Describe this widget."""
        return format_description(self, verbose)


def format_description(widget, verbose):
    return str(widget)
"#;

    #[test]
    fn extracts_module_class_function_and_import() {
        let (entities, edges) = extract(SAMPLE, "widgets/widget.py", "acme/widgets");

        let module = entities.iter().find(|e| e.entity_type == CodeEntityType::Module).unwrap();
        assert_eq!(module.name, "widget");
        assert_eq!(module.docstring.as_deref(), Some("Widget helpers."));

        assert!(entities.iter().any(|e| e.entity_type == CodeEntityType::Import && e.name == "os"));

        let class = entities.iter().find(|e| e.entity_type == CodeEntityType::Class).unwrap();
        assert_eq!(class.name, "Widget");
        assert_eq!(class.docstring.as_deref(), Some("A single widget."));

        let methods: Vec<_> = entities.iter().filter(|e| e.entity_type == CodeEntityType::Function).collect();
        assert!(methods.iter().any(|e| e.name == "describe"));
        assert!(methods.iter().any(|e| e.name == "format_description"));

        assert!(edges.iter().any(|e| e.edge_type == CodeEdgeType::BelongsTo));
        assert!(edges.iter().filter(|e| e.edge_type == CodeEdgeType::Contains).count() >= 3);
        assert!(edges.iter().any(|e| e.edge_type == CodeEdgeType::Calls && e.to_entity_id == "format_description"));
    }

    #[test]
    fn init_file_derives_module_name_from_package_directory() {
        let (entities, _) = extract("x = 1\n", "pkg/__init__.py", "acme/pkg");
        let module = entities.iter().find(|e| e.entity_type == CodeEntityType::Module).unwrap();
        assert_eq!(module.name, "pkg");
    }

    #[test]
    fn empty_file_still_yields_module_and_file_entities() {
        let (entities, edges) = extract("", "empty.py", "acme/empty");
        assert_eq!(entities.len(), 2);
        assert_eq!(edges.len(), 1);
    }
}
