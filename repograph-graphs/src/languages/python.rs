use tree_sitter::Node;

use crate::drafts::{CallHint, DeclaredEntity, DiagnosticKind, FunctionKind};
use crate::{DocCommentData, DocStyle, Language, Result};

use super::helpers::{Callee, DraftCollector, find_child_by_kind, node_line, normalize_callee};
use super::{Extraction, LanguageAdapter, ParseLimits};

const SELF_RECEIVERS: [&str; 2] = ["self", "cls"];

#[derive(Debug)]
pub struct PythonAdapter;

impl LanguageAdapter for PythonAdapter {
    fn languages(&self) -> &'static [Language] {
        &[Language::Python]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn tree_sitter_language(&self, _language: Language) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn extract(
        &self,
        tree: &tree_sitter::Tree,
        source: &str,
        limits: &ParseLimits,
    ) -> Result<Extraction> {
        let mut collector = DraftCollector::new(source, limits);
        walk_python_children(tree.root_node(), &mut collector);
        Ok(collector.finish())
    }
}

fn walk_python_node(node: Node<'_>, c: &mut DraftCollector<'_>) {
    // Keyword tokens share kinds with nodes (`lambda`).
    if !node.is_named() || !c.descend(node) {
        return;
    }
    match node.kind() {
        // Already reported as a syntax diagnostic.
        "ERROR" => {}
        "function_definition" => visit_function(node, c),
        "class_definition" => visit_class(node, c),
        "lambda" => visit_lambda(node, None, c),
        "assignment" => visit_assignment(node, c),
        "import_statement" => visit_import(node, c),
        "import_from_statement" => visit_from_import(node, c),
        "call" => {
            visit_call(node, c);
            walk_python_children(node, c);
        }
        _ => walk_python_children(node, c),
    }
    c.ascend();
}

fn walk_python_children(node: Node<'_>, c: &mut DraftCollector<'_>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_python_node(child, c);
    }
}

// ── Definitions ────────────────────────────────────────────────────

fn visit_function(node: Node<'_>, c: &mut DraftCollector<'_>) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return walk_python_children(node, c);
    };
    let name = c.text(name_node);
    let in_class = c.in_class_body();
    let body = node.child_by_field_name("body");

    let kind = if in_class {
        FunctionKind::Method
    } else if body.is_some_and(contains_yield) {
        FunctionKind::Generator
    } else {
        FunctionKind::Function
    };

    let doc = extract_python_docstring(node, c.source());
    let index = c.enter_function(Some(name), kind, node, doc);
    if in_class && name == "__init__" {
        c.mark_constructor(index);
    }

    if let Some(params) = node.child_by_field_name("parameters") {
        bind_parameter_types(params, c);
        walk_python_children(params, c);
    }
    if let Some(body) = body {
        walk_python_children(body, c);
    }
    c.leave();

    c.declare(name, DeclaredEntity::Function(index));
}

fn visit_class(node: Node<'_>, c: &mut DraftCollector<'_>) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return walk_python_children(node, c);
    };
    let name = c.text(name_node);

    let mut bases = Vec::new();
    if let Some(superclasses) = node.child_by_field_name("superclasses") {
        let mut cursor = superclasses.walk();
        for arg in superclasses.named_children(&mut cursor) {
            if let Some(path) = dotted_path(arg, c.source()) {
                bases.push(path);
            }
        }
        // Base expressions may contain calls (`class A(make_base()):`).
        walk_python_children(superclasses, c);
    }

    let index = c.enter_class(name, bases, node);
    if let Some(body) = node.child_by_field_name("body") {
        walk_python_children(body, c);
    }
    c.leave();

    c.declare(name, DeclaredEntity::Class(index));
}

/// `name` is the variable a lambda is assigned to, if any.
fn visit_lambda(node: Node<'_>, name: Option<&str>, c: &mut DraftCollector<'_>) {
    let index = c.enter_function(name, FunctionKind::Anonymous, node, None);
    walk_python_children(node, c);
    c.leave();
    if let Some(name) = name {
        c.declare(name, DeclaredEntity::Function(index));
    }
}

fn visit_assignment(node: Node<'_>, c: &mut DraftCollector<'_>) {
    let left = node.child_by_field_name("left");
    let right = node.child_by_field_name("right");
    let target = left
        .filter(|l| l.kind() == "identifier")
        .map(|l| c.text(l));

    if let (Some(var), Some(annotation)) = (target, node.child_by_field_name("type")) {
        if let Some(class_name) = type_name(annotation, c.source()) {
            c.bind_type(var, &class_name);
        }
    }

    match (target, right) {
        (Some(var), Some(value)) if value.kind() == "lambda" => {
            visit_lambda(value, Some(var), c);
        }
        (Some(var), Some(value)) => {
            if let Some(class_name) = constructed_class(value, c.source()) {
                c.bind_type(var, &class_name);
            }
            if value.kind() == "identifier" {
                let aliased = c.text(value).to_string();
                c.declare(var, DeclaredEntity::Alias(aliased));
            }
            walk_python_node(value, c);
        }
        _ => walk_python_children(node, c),
    }
}

fn bind_parameter_types(params: Node<'_>, c: &mut DraftCollector<'_>) {
    let mut cursor = params.walk();
    for param in params.named_children(&mut cursor) {
        let (name, annotation) = match param.kind() {
            "typed_parameter" => (
                find_child_by_kind(param, "identifier"),
                param.child_by_field_name("type"),
            ),
            "typed_default_parameter" => (
                param.child_by_field_name("name"),
                param.child_by_field_name("type"),
            ),
            _ => continue,
        };
        if let (Some(name), Some(annotation)) = (name, annotation) {
            if let Some(class_name) = type_name(annotation, c.source()) {
                let var = c.text(name);
                c.bind_type(var, &class_name);
            }
        }
    }
}

// ── Imports ────────────────────────────────────────────────────────

fn visit_import(node: Node<'_>, c: &mut DraftCollector<'_>) {
    let line = node_line(node);
    let mut cursor = node.walk();
    for name in node.children_by_field_name("name", &mut cursor) {
        match name.kind() {
            // `import a.b` binds `a`.
            "dotted_name" => {
                let module = c.text(name);
                let root = module.split('.').next().unwrap_or(module);
                c.declare_import(root, root, None, line);
            }
            "aliased_import" => {
                let module = name.child_by_field_name("name").map(|n| c.text(n));
                let alias = name.child_by_field_name("alias").map(|n| c.text(n));
                if let (Some(module), Some(alias)) = (module, alias) {
                    c.declare_import(alias, module, None, line);
                }
            }
            _ => {}
        }
    }
}

fn visit_from_import(node: Node<'_>, c: &mut DraftCollector<'_>) {
    let line = node_line(node);
    let Some(module_node) = node.child_by_field_name("module_name") else {
        return;
    };
    let module = normalize_callee(c.text(module_node));

    if find_child_by_kind(node, "wildcard_import").is_some() {
        c.add_wildcard(&module);
        return;
    }

    let mut cursor = node.walk();
    for name in node.children_by_field_name("name", &mut cursor) {
        match name.kind() {
            "dotted_name" => {
                let symbol = c.text(name);
                c.declare_import(symbol, &module, Some(symbol), line);
            }
            "aliased_import" => {
                let symbol = name.child_by_field_name("name").map(|n| c.text(n));
                let alias = name.child_by_field_name("alias").map(|n| c.text(n));
                if let (Some(symbol), Some(alias)) = (symbol, alias) {
                    c.declare_import(alias, &module, Some(symbol), line);
                }
            }
            _ => {}
        }
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
            // `super()` on its own is only a receiver.
            if name != "super" {
                c.record_call(Callee::direct(name), node);
            }
        }
        "attribute" => {
            let (Some(object), Some(attr)) = (
                func.child_by_field_name("object"),
                func.child_by_field_name("attribute"),
            ) else {
                return;
            };
            let member = c.text(attr);
            let callee = if is_super_call(object, source) {
                Callee::attribute("super".to_string(), member, CallHint::SuperReference)
            } else if let Some(path) = dotted_path(object, source) {
                let hint = if SELF_RECEIVERS.contains(&path.as_str()) {
                    CallHint::SelfReference
                } else {
                    CallHint::Attribute
                };
                Callee::attribute(path, member, hint)
            } else {
                Callee::attribute(normalize_callee(c.text(object)), member, CallHint::Attribute)
            };
            c.record_call(callee, node);
        }
        other => {
            let message = format!("dynamic callee `{}` ({other})", normalize_callee(c.text(func)));
            c.diagnose(DiagnosticKind::DynamicCallee, node, message);
        }
    }
}

fn is_super_call(node: Node<'_>, source: &str) -> bool {
    node.kind() == "call"
        && node
            .child_by_field_name("function")
            .is_some_and(|f| f.kind() == "identifier" && &source[f.byte_range()] == "super")
}

/// `a`, `a.b.c` for identifier/attribute chains; `None` for anything else.
fn dotted_path(node: Node<'_>, source: &str) -> Option<String> {
    let mut segments = Vec::new();
    let mut current = node;
    while current.kind() == "attribute" {
        let attr = current.child_by_field_name("attribute")?;
        segments.push(&source[attr.byte_range()]);
        current = current.child_by_field_name("object")?;
    }
    if current.kind() != "identifier" {
        return None;
    }
    segments.push(&source[current.byte_range()]);
    segments.reverse();
    Some(segments.join("."))
}

/// `Foo` for `Foo(...)` and `mod.Foo(...)` when the callee looks like a class.
fn constructed_class(value: Node<'_>, source: &str) -> Option<String> {
    if value.kind() != "call" {
        return None;
    }
    let path = dotted_path(value.child_by_field_name("function")?, source)?;
    let last = path.rsplit('.').next().unwrap_or(&path);
    last.starts_with(|ch: char| ch.is_ascii_uppercase())
        .then(|| last.to_string())
}

/// Simple class name from an annotation; generics and unions are ignored.
fn type_name(annotation: Node<'_>, source: &str) -> Option<String> {
    let text = source[annotation.byte_range()].trim().trim_matches(['"', '\'']);
    let valid = !text.is_empty()
        && text
            .chars()
            .all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '.');
    valid.then(|| text.rsplit('.').next().unwrap_or(text).to_string())
}

/// Whether a function body yields, ignoring nested scopes.
fn contains_yield(body: Node<'_>) -> bool {
    let mut stack = vec![body];
    while let Some(node) = stack.pop() {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "yield" => return true,
                "function_definition" | "class_definition" | "lambda" => {}
                _ => stack.push(child),
            }
        }
    }
    false
}

/// Extract Python docstring from the first statement of a function/class body.
fn extract_python_docstring(node: Node<'_>, source: &str) -> Option<DocCommentData> {
    let body = node.child_by_field_name("body")?;
    let mut cursor = body.walk();
    let first_stmt = body.named_children(&mut cursor).next()?;

    if first_stmt.kind() != "expression_statement" {
        return None;
    }

    let expr = first_stmt.named_child(0)?;
    if expr.kind() != "string" {
        return None;
    }

    let text = &source[expr.byte_range()];
    let text = text.trim_start_matches(['r', 'R', 'u', 'U']);
    let content = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find_map(|q| text.strip_prefix(q).and_then(|s| s.strip_suffix(q)))
        .unwrap_or(text)
        .trim()
        .to_string();

    if content.is_empty() {
        return None;
    }

    let style = if content.contains(":param ") || content.contains(":type ") {
        DocStyle::Sphinx
    } else if content.contains("Args:") || content.contains("Returns:") {
        DocStyle::Google
    } else if content.contains("Parameters\n") || content.contains("----------") {
        DocStyle::Numpy
    } else {
        DocStyle::Other("python".to_string())
    };

    Some(DocCommentData {
        text: content,
        style,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drafts::{CallSiteDraft, FunctionDraft};

    fn extract(source: &str) -> Extraction {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .unwrap();
        let tree = parser.parse(source, None).unwrap();
        PythonAdapter
            .extract(&tree, source, &ParseLimits::default())
            .unwrap()
    }

    fn function<'a>(ex: &'a Extraction, local_path: &str) -> &'a FunctionDraft {
        ex.drafts
            .functions
            .iter()
            .find(|f| f.local_path == local_path)
            .unwrap_or_else(|| panic!("no function {local_path}"))
    }

    fn calls_named<'a>(ex: &'a Extraction, text: &str) -> Vec<&'a CallSiteDraft> {
        ex.drafts
            .calls
            .iter()
            .filter(|c| c.callee_text == text)
            .collect()
    }

    #[test]
    fn extracts_function_and_class() {
        let source = r#"
def hello():
    """Says hello."""
    print("hi")

class Greeter:
    def __init__(self):
        pass

    def greet(self):
        pass
"#;
        let ex = extract(source);
        assert_eq!(ex.drafts.functions.len(), 3);

        let hello = function(&ex, "hello");
        assert_eq!(hello.kind, FunctionKind::Function);
        assert_eq!(hello.doc.as_ref().unwrap().text, "Says hello.");

        let greet = function(&ex, "Greeter.greet");
        assert_eq!(greet.kind, FunctionKind::Method);
        assert_eq!(greet.class_path.as_deref(), Some("Greeter"));
        assert!(function(&ex, "Greeter.__init__").is_constructor);

        assert!(matches!(
            ex.drafts.scope.get("Greeter"),
            Some(DeclaredEntity::Class(0))
        ));
    }

    #[test]
    fn nested_functions_are_qualified_by_parent() {
        let source = "\
def outer():
    def inner():
        return 1
    return inner()
";
        let ex = extract(source);
        let inner = function(&ex, "outer.inner");
        assert_eq!(inner.parent, Some(0));
        // Nested names are not file-level declarations.
        assert!(ex.drafts.scope.get("inner").is_none());

        let call = calls_named(&ex, "inner");
        assert_eq!(call[0].caller, Some(0));
    }

    #[test]
    fn generators_and_lambdas() {
        let source = "\
def numbers():
    yield 1

square = lambda x: x * x

def apply(items):
    return map(lambda v: v + 1, items)
";
        let ex = extract(source);
        assert_eq!(function(&ex, "numbers").kind, FunctionKind::Generator);

        let square = function(&ex, "square");
        assert_eq!(square.kind, FunctionKind::Anonymous);
        assert!(!square.positional);

        let positional: Vec<_> = ex.drafts.functions.iter().filter(|f| f.positional).collect();
        assert_eq!(positional.len(), 1);
        assert_eq!(positional[0].local_path, "lambda@7:16");
        assert_eq!(positional[0].parent, Some(2));
    }

    #[test]
    fn redefinition_is_disambiguated_by_line() {
        let source = "def f():\n    pass\n\ndef f():\n    pass\n";
        let ex = extract(source);
        let paths: Vec<_> = ex.drafts.functions.iter().map(|f| f.local_path.as_str()).collect();
        assert_eq!(paths, vec!["f", "f@4"]);
        // The later definition wins the name.
        assert!(matches!(ex.drafts.scope.get("f"), Some(DeclaredEntity::Function(1))));
    }

    #[test]
    fn same_line_redefinitions_stay_distinct() {
        let ex = extract("f = lambda: 1; f = lambda: 2; f = lambda: 3\n");
        let paths: Vec<_> = ex.drafts.functions.iter().map(|f| f.local_path.as_str()).collect();
        assert_eq!(paths, vec!["f", "f@1", "f@1:35"]);
    }

    #[test]
    fn lambda_keyword_is_not_a_function() {
        let ex = extract("f = lambda x: x\nitems.sort(key=lambda v: v)\n");
        assert_eq!(ex.drafts.functions.len(), 2);
        assert_eq!(ex.drafts.functions.iter().filter(|f| f.positional).count(), 1);
    }

    #[test]
    fn extracts_imports() {
        let source = "\
import os
import os.path
import numpy as np
from pathlib import Path
from .util import helper as h
from ..pkg import *
";
        let ex = extract(source);
        let scope = &ex.drafts.scope;

        let os = scope.import("os").unwrap();
        assert_eq!(os.module, "os");
        assert_eq!(os.symbol, None);

        assert_eq!(scope.import("np").unwrap().module, "numpy");

        let path = scope.import("Path").unwrap();
        assert_eq!(path.module, "pathlib");
        assert_eq!(path.symbol.as_deref(), Some("Path"));

        let h = scope.import("h").unwrap();
        assert_eq!(h.module, ".util");
        assert_eq!(h.symbol.as_deref(), Some("helper"));
        assert_eq!(h.line, 5);

        assert_eq!(scope.wildcard_imports, vec!["..pkg".to_string()]);
    }

    #[test]
    fn call_hints() {
        let source = "\
import requests
from a import helper

class Service(Base):
    def run(self):
        self.step()
        super().run()
        requests.get('x')
        helper()
        local()
        self.client.fetch()
";
        let ex = extract(source);
        assert_eq!(calls_named(&ex, "self.step")[0].hint, CallHint::SelfReference);

        let sup = calls_named(&ex, "super.run");
        assert_eq!(sup[0].hint, CallHint::SuperReference);
        assert_eq!(sup[0].member, "run");

        let get = calls_named(&ex, "requests.get");
        assert_eq!(get[0].hint, CallHint::ImportedAlias);
        assert_eq!(get[0].receiver.as_deref(), Some("requests"));

        assert_eq!(calls_named(&ex, "helper")[0].hint, CallHint::ImportedAlias);
        assert_eq!(calls_named(&ex, "local")[0].hint, CallHint::Direct);
        assert_eq!(calls_named(&ex, "self.client.fetch")[0].hint, CallHint::Attribute);
        // `super()` itself is not a call site.
        assert!(calls_named(&ex, "super").is_empty());

        assert_eq!(ex.drafts.classes[0].bases, vec!["Base".to_string()]);
    }

    #[test]
    fn receiver_types_from_constructors_and_annotations() {
        let source = "\
def main(repo: Repository):
    svc = Service()
    svc.run()
    repo.save()
    other.run()
";
        let ex = extract(source);
        assert_eq!(
            calls_named(&ex, "svc.run")[0].receiver_type.as_deref(),
            Some("Service")
        );
        assert_eq!(
            calls_named(&ex, "repo.save")[0].receiver_type.as_deref(),
            Some("Repository")
        );
        assert_eq!(calls_named(&ex, "other.run")[0].receiver_type, None);
    }

    #[test]
    fn dynamic_callee_is_diagnosed_and_skipped() {
        let source = "\
def run(fns):
    fns[0]()
    ok()
";
        let ex = extract(source);
        assert_eq!(ex.diagnostics.len(), 1);
        assert_eq!(ex.diagnostics[0].kind, DiagnosticKind::DynamicCallee);
        assert_eq!(ex.diagnostics[0].line, 2);
        assert_eq!(ex.drafts.calls.len(), 1);
        assert_eq!(ex.drafts.calls[0].callee_text, "ok");
    }

    #[test]
    fn module_level_calls_have_no_caller() {
        let ex = extract("setup()\n");
        assert_eq!(ex.drafts.calls[0].caller, None);
    }
}
