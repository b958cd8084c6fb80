// Shared ECMAScript draft extraction for JavaScript, JSX, TypeScript and TSX.
//
// Handles the patterns common to all four grammars:
// - function/generator declarations, function expressions, arrow functions, methods
// - classes (declarations, expressions, abstract) with `extends` heritage
// - import statements, CommonJS `require` bindings, exports and re-exports
// - call_expression, new_expression and capitalised JSX elements
// - TypeScript parameter and variable type annotations

use tree_sitter::Node;

use crate::DocCommentData;
use crate::drafts::{CallHint, DeclaredEntity, DiagnosticKind, FunctionKind};

use super::helpers::{
    Callee, DraftCollector, extract_block_doc_comment, extract_doc_comment_above,
    find_child_by_kind, node_line, normalize_callee,
};
use super::{Extraction, ParseLimits};

const FUNCTION_VALUE_KINDS: [&str; 4] = [
    "arrow_function",
    "function_expression",
    "function",
    "generator_function",
];

const CLASS_KINDS: [&str; 3] = ["class_declaration", "abstract_class_declaration", "class"];

/// Walk an ECMAScript syntax tree into drafts.
pub fn extract(tree: &tree_sitter::Tree, source: &str, limits: &ParseLimits) -> Extraction {
    let mut collector = DraftCollector::new(source, limits);
    walk_children(tree.root_node(), &mut collector);
    collector.finish()
}

fn walk_node(node: Node<'_>, c: &mut DraftCollector<'_>) {
    // Keyword tokens share kinds with nodes (`function`, `class`).
    if !node.is_named() || !c.descend(node) {
        return;
    }
    match node.kind() {
        "ERROR" => {}
        "function_declaration" | "generator_function_declaration" => {
            visit_function_declaration(node, c);
        }
        "method_definition" => visit_method(node, c),
        kind if FUNCTION_VALUE_KINDS.contains(&kind) => {
            visit_function_like(node, None, c);
        }
        kind if CLASS_KINDS.contains(&kind) => {
            visit_class(node, None, c);
        }
        "field_definition" | "public_field_definition" => visit_field(node, c),
        "variable_declarator" => visit_declarator(node, c),
        "assignment_expression" => visit_assignment(node, c),
        "pair" => visit_pair(node, c),
        "import_statement" => visit_import(node, c),
        "export_statement" => visit_export(node, c),
        "call_expression" => {
            visit_call(node, c);
            walk_children(node, c);
        }
        "new_expression" => {
            visit_new(node, c);
            walk_children(node, c);
        }
        "jsx_opening_element" | "jsx_self_closing_element" => {
            visit_jsx_element(node, c);
            walk_children(node, c);
        }
        _ => walk_children(node, c),
    }
    c.ascend();
}

fn walk_children(node: Node<'_>, c: &mut DraftCollector<'_>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_node(child, c);
    }
}

// ── Functions ──────────────────────────────────────────────────────

fn visit_function_declaration(node: Node<'_>, c: &mut DraftCollector<'_>) {
    let name = node.child_by_field_name("name").map(|n| c.text(n));
    let index = visit_function_like(node, name, c);
    if let Some(name) = name {
        c.declare(name, DeclaredEntity::Function(index));
    }
}

fn visit_method(node: Node<'_>, c: &mut DraftCollector<'_>) {
    let name = node
        .child_by_field_name("name")
        .map(|n| normalize_callee(c.text(n)));
    let is_constructor = name.as_deref() == Some("constructor") && c.in_class_body();
    let index = visit_function_like(node, name.as_deref(), c);
    if is_constructor {
        c.mark_constructor(index);
    }
}

/// Record any function-like node and walk its body. `name` is the binding
/// the function was found under; without one the function is positional.
fn visit_function_like(node: Node<'_>, name: Option<&str>, c: &mut DraftCollector<'_>) -> usize {
    let kind = match node.kind() {
        "method_definition" if c.in_class_body() => FunctionKind::Method,
        "function_declaration" | "method_definition" => FunctionKind::Function,
        "generator_function_declaration" | "generator_function" => FunctionKind::Generator,
        "arrow_function" => FunctionKind::Arrow,
        _ if c.in_class_body() => FunctionKind::Method,
        _ => FunctionKind::Anonymous,
    };
    let own_name = node.child_by_field_name("name").map(|n| c.text(n));
    let name = name.or(own_name);

    let doc = leading_doc(node, c.source());
    let index = c.enter_function(name, kind, node, doc);

    if let Some(params) = node
        .child_by_field_name("parameters")
        .or_else(|| node.child_by_field_name("parameter"))
    {
        bind_parameter_types(params, c);
        walk_children(params, c);
    }
    if let Some(body) = node.child_by_field_name("body") {
        walk_node(body, c);
    }
    c.leave();
    index
}

fn bind_parameter_types(params: Node<'_>, c: &mut DraftCollector<'_>) {
    let mut cursor = params.walk();
    for param in params.named_children(&mut cursor) {
        if !matches!(param.kind(), "required_parameter" | "optional_parameter") {
            continue;
        }
        let pattern = param
            .child_by_field_name("pattern")
            .filter(|p| p.kind() == "identifier");
        let annotation = param.child_by_field_name("type");
        if let (Some(pattern), Some(annotation)) = (pattern, annotation) {
            if let Some(class_name) = annotated_type(annotation, c.source()) {
                let var = c.text(pattern);
                c.bind_type(var, &class_name);
            }
        }
    }
}

// ── Classes ────────────────────────────────────────────────────────

fn visit_class(node: Node<'_>, binding: Option<&str>, c: &mut DraftCollector<'_>) -> usize {
    let own_name = node.child_by_field_name("name").map(|n| c.text(n));
    let name = match own_name.or(binding) {
        Some(name) => name.to_string(),
        None => {
            let pos = node.start_position();
            format!("class@{}:{}", pos.row + 1, pos.column + 1)
        }
    };

    let mut bases = Vec::new();
    if let Some(heritage) = find_child_by_kind(node, "class_heritage") {
        collect_bases(heritage, c.source(), &mut bases);
        walk_children(heritage, c);
    }

    let index = c.enter_class(&name, bases, node);
    if let Some(body) = node.child_by_field_name("body") {
        walk_children(body, c);
    }
    c.leave();

    // Class expressions are declared under their binding by the caller.
    if node.kind() != "class" {
        c.declare(&name, DeclaredEntity::Class(index));
    }
    index
}

/// `extends X` in JavaScript; `extends_clause` values in TypeScript.
fn collect_bases(heritage: Node<'_>, source: &str, bases: &mut Vec<String>) {
    let mut cursor = heritage.walk();
    for child in heritage.named_children(&mut cursor) {
        match child.kind() {
            "extends_clause" => collect_bases(child, source, bases),
            "implements_clause" => {}
            _ => {
                if let Some(path) = member_path(child, source) {
                    bases.push(path);
                }
            }
        }
    }
}

fn visit_field(node: Node<'_>, c: &mut DraftCollector<'_>) {
    let name = node
        .child_by_field_name("property")
        .or_else(|| node.child_by_field_name("name"))
        .map(|n| normalize_callee(c.text(n)));
    match node.child_by_field_name("value") {
        Some(value) if FUNCTION_VALUE_KINDS.contains(&value.kind()) => {
            visit_function_like(value, name.as_deref(), c);
        }
        _ => walk_children(node, c),
    }
}

// ── Bindings ───────────────────────────────────────────────────────

fn visit_declarator(node: Node<'_>, c: &mut DraftCollector<'_>) {
    let Some(value) = node.child_by_field_name("value") else {
        return walk_children(node, c);
    };
    let name_node = node.child_by_field_name("name");
    let name = name_node
        .filter(|n| n.kind() == "identifier")
        .map(|n| c.text(n));

    if let Some(module) = require_source(value, c.source()) {
        if let Some(pattern) = name_node {
            bind_require(pattern, &module, c);
        }
        return;
    }

    if let (Some(var), Some(annotation)) = (name, node.child_by_field_name("type")) {
        if let Some(class_name) = annotated_type(annotation, c.source()) {
            c.bind_type(var, &class_name);
        }
    }

    match (name, value.kind()) {
        (Some(var), kind) if FUNCTION_VALUE_KINDS.contains(&kind) => {
            let index = visit_function_like(value, Some(var), c);
            c.declare(var, DeclaredEntity::Function(index));
        }
        (Some(var), "class") => {
            let index = visit_class(value, Some(var), c);
            c.declare(var, DeclaredEntity::Class(index));
        }
        (Some(var), _) => {
            if let Some(class_name) = constructed_class(value, c.source()) {
                c.bind_type(var, &class_name);
            }
            if value.kind() == "identifier" {
                let aliased = c.text(value).to_string();
                c.declare(var, DeclaredEntity::Alias(aliased));
            }
            walk_node(value, c);
        }
        (None, _) => walk_node(value, c),
    }
}

fn visit_assignment(node: Node<'_>, c: &mut DraftCollector<'_>) {
    let (Some(left), Some(right)) = (
        node.child_by_field_name("left"),
        node.child_by_field_name("right"),
    ) else {
        return walk_children(node, c);
    };
    let source = c.source();
    let left_path = member_path(left, source);

    // `module.exports = x` / `exports.x = ...` / `x = ...`
    let exported = match left_path.as_deref() {
        Some("module.exports") => Some("default".to_string()),
        Some(path) => path
            .strip_prefix("module.exports.")
            .or_else(|| path.strip_prefix("exports."))
            .or((left.kind() == "identifier").then_some(path))
            .map(str::to_string),
        None => None,
    };
    let binding = left_path
        .as_deref()
        .map(|p| p.rsplit('.').next().unwrap_or(p).to_string());

    if FUNCTION_VALUE_KINDS.contains(&right.kind()) {
        let index = visit_function_like(right, binding.as_deref(), c);
        if let Some(name) = exported {
            c.declare(&name, DeclaredEntity::Function(index));
        }
        return;
    }

    if let Some(name) = exported {
        if right.kind() == "identifier" {
            let aliased = c.text(right).to_string();
            c.declare(&name, DeclaredEntity::Alias(aliased));
        }
    }
    if left.kind() == "identifier" {
        if let Some(class_name) = constructed_class(right, source) {
            let var = c.text(left);
            c.bind_type(var, &class_name);
        }
    }
    walk_node(right, c);
}

fn visit_pair(node: Node<'_>, c: &mut DraftCollector<'_>) {
    let key = node
        .child_by_field_name("key")
        .map(|k| c.text(k).trim_matches(['"', '\'']).to_string());
    match node.child_by_field_name("value") {
        Some(value) if FUNCTION_VALUE_KINDS.contains(&value.kind()) => {
            visit_function_like(value, key.as_deref(), c);
        }
        _ => walk_children(node, c),
    }
}

// ── Imports and exports ────────────────────────────────────────────

fn visit_import(node: Node<'_>, c: &mut DraftCollector<'_>) {
    let Some(module) = node
        .child_by_field_name("source")
        .map(|s| string_value(s, c.source()))
    else {
        return;
    };
    let line = node_line(node);
    let Some(clause) = find_child_by_kind(node, "import_clause") else {
        return;
    };

    let mut cursor = clause.walk();
    for child in clause.named_children(&mut cursor) {
        match child.kind() {
            "identifier" => {
                let local = c.text(child);
                c.declare_import(local, &module, Some("default"), line);
            }
            "namespace_import" => {
                if let Some(local) = find_child_by_kind(child, "identifier") {
                    let local = c.text(local);
                    c.declare_import(local, &module, None, line);
                }
            }
            "named_imports" => {
                let mut inner = child.walk();
                for spec in child.named_children(&mut inner) {
                    if spec.kind() != "import_specifier" {
                        continue;
                    }
                    let Some(name) = spec.child_by_field_name("name").map(|n| c.text(n)) else {
                        continue;
                    };
                    let local = spec
                        .child_by_field_name("alias")
                        .map_or(name, |a| c.text(a));
                    c.declare_import(local, &module, Some(name), line);
                }
            }
            _ => {}
        }
    }
}

fn visit_export(node: Node<'_>, c: &mut DraftCollector<'_>) {
    let source = c.source();
    let line = node_line(node);
    let is_default = (0..node.child_count())
        .filter_map(|i| node.child(i))
        .any(|child| child.kind() == "default");
    let from = node
        .child_by_field_name("source")
        .map(|s| string_value(s, source));

    if let Some(declaration) = node.child_by_field_name("declaration") {
        walk_node(declaration, c);
        if is_default {
            if let Some(name) = declaration.child_by_field_name("name") {
                let aliased = c.text(name).to_string();
                c.declare("default", DeclaredEntity::Alias(aliased));
            }
        }
        return;
    }

    if let Some(value) = node.child_by_field_name("value") {
        match value.kind() {
            "identifier" => {
                let aliased = c.text(value).to_string();
                c.declare("default", DeclaredEntity::Alias(aliased));
            }
            kind if FUNCTION_VALUE_KINDS.contains(&kind) => {
                let index = visit_function_like(value, Some("default"), c);
                c.declare("default", DeclaredEntity::Function(index));
            }
            "class" => {
                let index = visit_class(value, Some("default"), c);
                c.declare("default", DeclaredEntity::Class(index));
            }
            _ => walk_node(value, c),
        }
        return;
    }

    if let Some(namespace) = find_child_by_kind(node, "namespace_export") {
        if let (Some(module), Some(local)) = (&from, find_child_by_kind(namespace, "identifier")) {
            let local = c.text(local);
            c.declare_import(local, module, None, line);
        }
        return;
    }

    if let Some(clause) = find_child_by_kind(node, "export_clause") {
        let mut cursor = clause.walk();
        for spec in clause.named_children(&mut cursor) {
            if spec.kind() != "export_specifier" {
                continue;
            }
            let Some(name) = spec.child_by_field_name("name").map(|n| c.text(n)) else {
                continue;
            };
            let exported = spec
                .child_by_field_name("alias")
                .map_or(name, |a| c.text(a));
            match &from {
                Some(module) => c.declare_import(exported, module, Some(name), line),
                None if exported != name => {
                    c.declare(exported, DeclaredEntity::Alias(name.to_string()));
                }
                None => {}
            }
        }
        return;
    }

    // `export * from './x'`
    if let Some(module) = from {
        c.add_wildcard(&module);
    }
}

/// `"./x"` for `require("./x")`.
fn require_source(value: Node<'_>, source: &str) -> Option<String> {
    if value.kind() != "call_expression" {
        return None;
    }
    let func = value.child_by_field_name("function")?;
    if &source[func.byte_range()] != "require" {
        return None;
    }
    let args = value.child_by_field_name("arguments")?;
    let first = args.named_child(0)?;
    (first.kind() == "string").then(|| string_value(first, source))
}

/// `const x = require(m)` binds the module; `const { a, b: c } = require(m)` binds members.
fn bind_require(pattern: Node<'_>, module: &str, c: &mut DraftCollector<'_>) {
    let line = node_line(pattern);
    match pattern.kind() {
        "identifier" => {
            let local = c.text(pattern);
            c.declare_import(local, module, None, line);
        }
        "object_pattern" => {
            let mut cursor = pattern.walk();
            for prop in pattern.named_children(&mut cursor) {
                match prop.kind() {
                    "shorthand_property_identifier_pattern" => {
                        let name = c.text(prop);
                        c.declare_import(name, module, Some(name), line);
                    }
                    "pair_pattern" => {
                        let key = prop.child_by_field_name("key").map(|k| c.text(k));
                        let value = prop
                            .child_by_field_name("value")
                            .filter(|v| v.kind() == "identifier")
                            .map(|v| c.text(v));
                        if let (Some(key), Some(value)) = (key, value) {
                            c.declare_import(value, module, Some(key), line);
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

// ── Calls ──────────────────────────────────────────────────────────

fn visit_call(node: Node<'_>, c: &mut DraftCollector<'_>) {
    let Some(func) = node.child_by_field_name("function") else {
        return;
    };
    let source = c.source();

    match func.kind() {
        "identifier" => {
            let name = c.text(func);
            // `require` calls are import bindings, not call sites.
            if name != "require" {
                c.record_call(Callee::direct(name), node);
            }
        }
        "import" => {
            let target = normalize_callee(c.text(node));
            c.diagnose(
                DiagnosticKind::DynamicImport,
                node,
                format!("dynamic import `{target}`"),
            );
        }
        // `super(...)` inside a constructor.
        "super" => {
            let callee =
                Callee::attribute("super".to_string(), "constructor", CallHint::SuperReference);
            c.record_call(callee, node);
        }
        "member_expression" => {
            let (Some(object), Some(property)) = (
                func.child_by_field_name("object"),
                func.child_by_field_name("property"),
            ) else {
                return;
            };
            let member = c.text(property);
            let callee = match object.kind() {
                "this" => Callee::attribute("this".to_string(), member, CallHint::SelfReference),
                "super" => {
                    Callee::attribute("super".to_string(), member, CallHint::SuperReference)
                }
                _ => match member_path(object, source) {
                    Some(path) => Callee::attribute(path, member, CallHint::Attribute),
                    None => Callee::attribute(
                        normalize_callee(c.text(object)),
                        member,
                        CallHint::Attribute,
                    ),
                },
            };
            c.record_call(callee, node);
        }
        other => {
            let message = format!("dynamic callee `{}` ({other})", normalize_callee(c.text(func)));
            c.diagnose(DiagnosticKind::DynamicCallee, node, message);
        }
    }
}

fn visit_new(node: Node<'_>, c: &mut DraftCollector<'_>) {
    let Some(constructor) = node.child_by_field_name("constructor") else {
        return;
    };
    if let Some(path) = member_path(constructor, c.source()) {
        c.record_call(callee_from_path(&path), node);
    }
}

/// `<Button />` and `<UI.Button>` render components; lowercase tags are intrinsic.
fn visit_jsx_element(node: Node<'_>, c: &mut DraftCollector<'_>) {
    let Some(name) = node.child_by_field_name("name") else {
        return;
    };
    let Some(path) = member_path(name, c.source()) else {
        return;
    };
    let component = path.rsplit('.').next().unwrap_or(&path);
    if component.starts_with(|ch: char| ch.is_ascii_uppercase()) {
        c.record_call(callee_from_path(&path), node);
    }
}

fn callee_from_path(path: &str) -> Callee {
    match path.rsplit_once('.') {
        Some((receiver, member)) => {
            let hint = if receiver == "this" {
                CallHint::SelfReference
            } else {
                CallHint::Attribute
            };
            Callee::attribute(receiver.to_string(), member, hint)
        }
        None => Callee::direct(path),
    }
}

// ── Small helpers ──────────────────────────────────────────────────

/// `a`, `a.b.c`, `this.a` for identifier/member chains; `None` otherwise.
fn member_path(node: Node<'_>, source: &str) -> Option<String> {
    let mut segments = Vec::new();
    let mut current = node;
    while matches!(current.kind(), "member_expression" | "nested_identifier") {
        let property = current
            .child_by_field_name("property")
            .or_else(|| current.named_child(current.named_child_count().checked_sub(1)?))?;
        segments.push(&source[property.byte_range()]);
        current = current
            .child_by_field_name("object")
            .or_else(|| current.named_child(0))?;
    }
    if !matches!(
        current.kind(),
        "identifier" | "this" | "type_identifier" | "property_identifier"
    ) {
        return None;
    }
    segments.push(&source[current.byte_range()]);
    segments.reverse();
    Some(segments.join("."))
}

/// `Foo` for `new Foo()` / `new ns.Foo()`.
fn constructed_class(value: Node<'_>, source: &str) -> Option<String> {
    if value.kind() != "new_expression" {
        return None;
    }
    let path = member_path(value.child_by_field_name("constructor")?, source)?;
    Some(path.rsplit('.').next().unwrap_or(&path).to_string())
}

/// Class name from a `: Foo` type annotation; generics and unions are ignored.
fn annotated_type(annotation: Node<'_>, source: &str) -> Option<String> {
    let ty = annotation.named_child(0)?;
    match ty.kind() {
        "type_identifier" => Some(source[ty.byte_range()].to_string()),
        "nested_type_identifier" => {
            let name = ty.child_by_field_name("name")?;
            Some(source[name.byte_range()].to_string())
        }
        _ => None,
    }
}

fn string_value(node: Node<'_>, source: &str) -> String {
    find_child_by_kind(node, "string_fragment").map_or_else(
        || {
            source[node.byte_range()]
                .trim_matches(['"', '\'', '`'])
                .to_string()
        },
        |frag| source[frag.byte_range()].to_string(),
    )
}

/// JSDoc block or `//` comments above the statement that introduces `node`.
fn leading_doc(node: Node<'_>, source: &str) -> Option<DocCommentData> {
    let mut anchor = node;
    while let Some(parent) = anchor.parent() {
        if !matches!(
            parent.kind(),
            "export_statement"
                | "variable_declarator"
                | "lexical_declaration"
                | "variable_declaration"
                | "assignment_expression"
                | "expression_statement"
        ) {
            break;
        }
        anchor = parent;
    }
    extract_block_doc_comment(anchor, source)
        .or_else(|| extract_doc_comment_above(anchor, source, "//"))
}
