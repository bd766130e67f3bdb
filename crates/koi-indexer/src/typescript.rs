//! TypeScript/TSX/JavaScript entity/edge extraction. Function/class/
//! interface/import coverage; call-graph edges are left to the Python
//! extractor (the original's arrow-function and call-edge passes for this
//! family are not ported — noted as a scope trim in DESIGN.md).

use koi_core::{CodeEdge, CodeEdgeType, CodeEntity, CodeEntityType};
use tree_sitter::{Node, Parser};

use crate::ids::{edge_id, entity_id};
use crate::ts_util::{find_nodes_by_kind, line_end, line_start, node_text};

pub fn extract(language: &str, content: &str, file_path: &str, repo: &str) -> (Vec<CodeEntity>, Vec<CodeEdge>) {
    let mut parser = Parser::new();
    let grammar = match language {
        "tsx" => tree_sitter_typescript::language_tsx(),
        "typescript" => tree_sitter_typescript::language_typescript(),
        _ => tree_sitter_javascript::language(),
    };
    if parser.set_language(&grammar).is_err() {
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

    let mut module_name = std::path::Path::new(&file_name).file_stem().map(|f| f.to_string_lossy().to_string()).unwrap_or(file_name.clone());
    if module_name == "index" {
        module_name = if dir_path.is_empty() {
            repo.to_string()
        } else {
            std::path::Path::new(&dir_path).file_name().map(|f| f.to_string_lossy().to_string()).unwrap_or_else(|| dir_path.clone())
        };
    }
    let full_module_path = if dir_path.is_empty() { module_name.clone() } else { format!("{dir_path}/{module_name}") };

    let module_entity = create_module_entity(&module_name, file_path, repo, content, &full_module_path, language, &file_name);
    let file_entity = crate::common::create_file_entity(file_path, repo, language, content, &module_name, &full_module_path);

    edges.push(CodeEdge {
        edge_id: edge_id(&file_entity.entity_id, &module_entity.entity_id, "BELONGS_TO"),
        from_entity_id: file_entity.entity_id.clone(),
        to_entity_id: module_entity.entity_id.clone(),
        edge_type: CodeEdgeType::BelongsTo,
        file_path: file_path.to_string(),
        line_number: 1,
    });
    entities.push(module_entity);
    entities.push(file_entity.clone());

    let mut import_nodes = Vec::new();
    find_nodes_by_kind(root, "import_statement", &mut import_nodes);
    for node in import_nodes {
        if let Some(mut imp) = extract_import(node, source, file_path, repo, language) {
            imp.module_name = Some(module_name.clone());
            imp.module_path = Some(full_module_path.clone());
            entities.push(imp);
        }
    }

    let mut class_nodes = Vec::new();
    find_nodes_by_kind(root, "class_declaration", &mut class_nodes);
    for node in class_nodes {
        if let Some(mut entity) = extract_typed_decl(node, source, file_path, repo, language, CodeEntityType::Class, "class") {
            entity.module_name = Some(module_name.clone());
            entity.module_path = Some(full_module_path.clone());
            edges.push(contains_edge(&file_entity, &entity, file_path));
            entities.push(entity);
        }
    }

    let mut interface_nodes = Vec::new();
    find_nodes_by_kind(root, "interface_declaration", &mut interface_nodes);
    for node in interface_nodes {
        if let Some(mut entity) = extract_typed_decl(node, source, file_path, repo, language, CodeEntityType::Interface, "interface") {
            entity.module_name = Some(module_name.clone());
            entity.module_path = Some(full_module_path.clone());
            edges.push(contains_edge(&file_entity, &entity, file_path));
            entities.push(entity);
        }
    }

    let mut function_nodes = Vec::new();
    find_nodes_by_kind(root, "function_declaration", &mut function_nodes);
    for node in function_nodes {
        if let Some(mut entity) = extract_function(node, source, file_path, repo, language) {
            entity.module_name = Some(module_name.clone());
            entity.module_path = Some(full_module_path.clone());
            edges.push(contains_edge(&file_entity, &entity, file_path));
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
    language: &str,
    file_name: &str,
) -> CodeEntity {
    let is_index = module_name == "index" || file_name.starts_with("index.");
    let docstring = jsdoc_header(content);

    CodeEntity {
        entity_id: entity_id(repo, file_path, module_name, "module"),
        name: module_name.to_string(),
        entity_type: CodeEntityType::Module,
        file_path: file_path.to_string(),
        line_start: 1,
        line_end: 1,
        language: language.to_string(),
        repo: repo.to_string(),
        signature: Some(format!("module {full_module_path}{}", if is_index { " (index)" } else { "" })),
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

fn jsdoc_header(content: &str) -> String {
    let mut lines = content.lines();
    let Some(first) = lines.next() else { return String::new() };
    if !first.trim().starts_with("/**") {
        return String::new();
    }
    let mut parts = Vec::new();
    for line in std::iter::once(first).chain(lines) {
        let stripped = line.trim();
        if stripped.starts_with("/**") {
            parts.push(stripped.trim_start_matches("/**").trim().to_string());
        } else if stripped.starts_with("*/") {
            break;
        } else if let Some(rest) = stripped.strip_prefix('*') {
            parts.push(rest.trim().to_string());
        } else {
            parts.push(stripped.to_string());
        }
    }
    let mut docstring = parts.join(" ").trim().to_string();
    if docstring.chars().count() > 200 {
        docstring = format!("{}...", docstring.chars().take(200).collect::<String>());
    }
    docstring
}

fn extract_import(node: Node, source: &[u8], file_path: &str, repo: &str, language: &str) -> Option<CodeEntity> {
    let mut strings = Vec::new();
    find_nodes_by_kind(node, "string", &mut strings);
    let module_path = strings.first().map(|n| node_text(*n, source).trim_matches(|c| c == '"' || c == '\'').to_string())?;

    Some(CodeEntity {
        entity_id: entity_id(repo, file_path, &format!("import:{module_path}"), ""),
        name: module_path,
        entity_type: CodeEntityType::Import,
        file_path: file_path.to_string(),
        line_start: line_start(node),
        line_end: line_end(node),
        language: language.to_string(),
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

fn extract_typed_decl(
    node: Node,
    source: &[u8],
    file_path: &str,
    repo: &str,
    language: &str,
    entity_type: CodeEntityType,
    signature_suffix: &str,
) -> Option<CodeEntity> {
    let mut cursor = node.walk();
    let name = node.children(&mut cursor).find(|c| c.kind() == "type_identifier").map(|c| node_text(c, source).to_string())?;
    let signature = node_text(node, source).lines().next().unwrap_or("").to_string();

    Some(CodeEntity {
        entity_id: entity_id(repo, file_path, &name, signature_suffix),
        name,
        entity_type,
        file_path: file_path.to_string(),
        line_start: line_start(node),
        line_end: line_end(node),
        language: language.to_string(),
        repo: repo.to_string(),
        signature: Some(signature),
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

fn extract_function(node: Node, source: &[u8], file_path: &str, repo: &str, language: &str) -> Option<CodeEntity> {
    let mut cursor = node.walk();
    let name = node.children(&mut cursor).find(|c| c.kind() == "identifier").map(|c| node_text(c, source).to_string())?;
    let mut cursor2 = node.walk();
    let params = node.children(&mut cursor2).find(|c| c.kind() == "formal_parameters").map(|c| node_text(c, source).to_string()).unwrap_or_default();
    let signature = node_text(node, source).lines().next().unwrap_or("").to_string();

    Some(CodeEntity {
        entity_id: entity_id(repo, file_path, &name, &params),
        name,
        entity_type: CodeEntityType::Function,
        file_path: file_path.to_string(),
        line_start: line_start(node),
        line_end: line_end(node),
        language: language.to_string(),
        repo: repo.to_string(),
        signature: Some(signature),
        params: if params.is_empty() { None } else { Some(params) },
        return_type: None,
        docstring: None,
        receiver_type: None,
        module_name: None,
        module_path: None,
        extraction_method: "tree_sitter".to_string(),
        extraction_run_id: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"/**
 * Widget module.
 */
import { Base } from './base';

export interface Widget {
    id: string;
}

export class WidgetStore {
    items: Widget[];
}

function createWidget(id: string): Widget {
    return { id };
}
"#;

    #[test]
    fn extracts_module_file_and_declarations() {
        let (entities, edges) = extract("typescript", SAMPLE, "src/widget.ts", "acme/widgets");

        let module = entities.iter().find(|e| e.entity_type == CodeEntityType::Module).unwrap();
        assert_eq!(module.name, "widget");
        assert!(module.docstring.as_deref().unwrap().contains("Widget module"));

        assert!(entities.iter().any(|e| e.entity_type == CodeEntityType::File));
        assert!(entities.iter().any(|e| e.entity_type == CodeEntityType::Import && e.name == "./base"));

        let interface = entities.iter().find(|e| e.entity_type == CodeEntityType::Interface).unwrap();
        assert_eq!(interface.name, "Widget");

        let class = entities.iter().find(|e| e.entity_type == CodeEntityType::Class).unwrap();
        assert_eq!(class.name, "WidgetStore");

        let func = entities.iter().find(|e| e.entity_type == CodeEntityType::Function).unwrap();
        assert_eq!(func.name, "createWidget");
        assert!(func.params.as_deref().unwrap().contains("id"));

        let contains_count = edges.iter().filter(|e| e.edge_type == CodeEdgeType::Contains).count();
        assert_eq!(contains_count, 3);
        assert!(edges.iter().any(|e| e.edge_type == CodeEdgeType::BelongsTo));
    }

    #[test]
    fn index_file_derives_module_name_from_directory() {
        let (entities, _) = extract("typescript", "export const x = 1;\n", "src/widgets/index.ts", "acme/widgets");
        let module = entities.iter().find(|e| e.entity_type == CodeEntityType::Module).unwrap();
        assert_eq!(module.name, "widgets");
    }

    #[test]
    fn plain_js_file_still_yields_module_and_file_entities() {
        let (entities, _) = extract("javascript", "const x = 1;\n", "a.js", "acme/misc");
        assert!(entities.iter().any(|e| e.entity_type == CodeEntityType::Module));
        assert!(entities.iter().any(|e| e.entity_type == CodeEntityType::File));
    }
}
