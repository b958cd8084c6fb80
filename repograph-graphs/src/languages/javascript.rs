use crate::{Language, Result};

use super::{Extraction, LanguageAdapter, ParseLimits, ecma};

/// JavaScript and JSX; the JavaScript grammar parses JSX natively.
#[derive(Debug)]
pub struct JavaScriptAdapter;

impl LanguageAdapter for JavaScriptAdapter {
    fn languages(&self) -> &'static [Language] {
        &[Language::JavaScript, Language::Jsx]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["js", "mjs", "cjs", "jsx"]
    }

    fn tree_sitter_language(&self, _language: Language) -> tree_sitter::Language {
        tree_sitter_javascript::LANGUAGE.into()
    }

    fn extract(
        &self,
        tree: &tree_sitter::Tree,
        source: &str,
        limits: &ParseLimits,
    ) -> Result<Extraction> {
        Ok(ecma::extract(tree, source, limits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drafts::{
        CallHint, CallSiteDraft, DeclaredEntity, DiagnosticKind, FunctionDraft, FunctionKind,
    };

    fn extract(source: &str) -> Extraction {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_javascript::LANGUAGE.into())
            .unwrap();
        let tree = parser.parse(source, None).unwrap();
        JavaScriptAdapter
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
    fn extracts_functions_and_classes() {
        let source = r"
/** Adds numbers. */
function add(a, b) { return a + b; }

function* ids() { yield 1; }

const double = (x) => x * 2;

class Counter extends Base {
  constructor() { super(); this.n = 0; }
  increment() { this.n = add(this.n, 1); }
}
";
        let ex = extract(source);

        let add = function(&ex, "add");
        assert_eq!(add.kind, FunctionKind::Function);
        assert_eq!(add.doc.as_ref().unwrap().text, "Adds numbers.");

        assert_eq!(function(&ex, "ids").kind, FunctionKind::Generator);
        assert_eq!(function(&ex, "double").kind, FunctionKind::Arrow);

        let increment = function(&ex, "Counter.increment");
        assert_eq!(increment.kind, FunctionKind::Method);
        assert_eq!(increment.class_path.as_deref(), Some("Counter"));
        assert!(function(&ex, "Counter.constructor").is_constructor);

        assert_eq!(ex.drafts.classes[0].bases, vec!["Base".to_string()]);
        assert!(matches!(ex.drafts.scope.get("double"), Some(DeclaredEntity::Function(_))));
        assert!(matches!(ex.drafts.scope.get("Counter"), Some(DeclaredEntity::Class(0))));

        let sup = calls_named(&ex, "super.constructor");
        assert_eq!(sup[0].hint, CallHint::SuperReference);
    }

    #[test]
    fn anonymous_functions_named_by_binding_or_position() {
        let source = "\
const handler = function () { work(); };
const api = { load() { fetch(); }, save: () => persist() };
items.forEach(function (item) { render(item); });
";
        let ex = extract(source);
        assert_eq!(function(&ex, "handler").kind, FunctionKind::Anonymous);
        assert_eq!(function(&ex, "load").kind, FunctionKind::Function);
        assert_eq!(function(&ex, "save").kind, FunctionKind::Arrow);

        let positional = function(&ex, "lambda@3:15");
        assert!(positional.positional);
        assert_eq!(calls_named(&ex, "render")[0].caller, Some(3));
    }

    #[test]
    fn es_module_imports_and_exports() {
        let source = r"
import React from 'react';
import { helper, other as renamed } from './util';
import * as api from '../api';
export { run as start } from './runner';
export * from './shared';
export default function main() { helper(); }
";
        let ex = extract(source);
        let scope = &ex.drafts.scope;

        let react = scope.import("React").unwrap();
        assert_eq!(react.module, "react");
        assert_eq!(react.symbol.as_deref(), Some("default"));

        assert_eq!(scope.import("helper").unwrap().symbol.as_deref(), Some("helper"));
        assert_eq!(scope.import("renamed").unwrap().symbol.as_deref(), Some("other"));

        let api = scope.import("api").unwrap();
        assert_eq!(api.module, "../api");
        assert_eq!(api.symbol, None);

        let start = scope.import("start").unwrap();
        assert_eq!(start.module, "./runner");
        assert_eq!(start.symbol.as_deref(), Some("run"));

        assert_eq!(scope.wildcard_imports, vec!["./shared".to_string()]);
        assert_eq!(
            scope.get("default"),
            Some(&DeclaredEntity::Alias("main".to_string()))
        );
        assert_eq!(calls_named(&ex, "helper")[0].hint, CallHint::ImportedAlias);
    }

    #[test]
    fn commonjs_require_and_exports() {
        let source = r"
const fs = require('fs');
const { parse, format: fmt } = require('./text');
exports.load = function () { return parse(fs.readFileSync('x')); };
module.exports = load;
";
        let ex = extract(source);
        let scope = &ex.drafts.scope;
        assert_eq!(scope.import("fs").unwrap().symbol, None);
        assert_eq!(scope.import("parse").unwrap().module, "./text");
        assert_eq!(scope.import("fmt").unwrap().symbol.as_deref(), Some("format"));
        assert!(matches!(scope.get("load"), Some(DeclaredEntity::Function(_))));
        assert_eq!(
            scope.get("default"),
            Some(&DeclaredEntity::Alias("load".to_string()))
        );
        // `require(...)` itself is not a call site.
        assert!(calls_named(&ex, "require").is_empty());
        assert_eq!(
            calls_named(&ex, "fs.readFileSync")[0].hint,
            CallHint::ImportedAlias
        );
    }

    #[test]
    fn call_shapes() {
        let source = r"
function run(svc) {
  const repo = new Repository();
  repo.save();
  svc?.client.fetch();
  this.step();
  fns[0]();
  import('./lazy');
}
";
        let ex = extract(source);
        assert_eq!(calls_named(&ex, "Repository")[0].hint, CallHint::Direct);
        assert_eq!(
            calls_named(&ex, "repo.save")[0].receiver_type.as_deref(),
            Some("Repository")
        );
        let fetch = calls_named(&ex, "svc.client.fetch");
        assert_eq!(fetch[0].receiver.as_deref(), Some("svc.client"));
        assert_eq!(calls_named(&ex, "this.step")[0].hint, CallHint::SelfReference);

        let kinds: Vec<_> = ex.diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![DiagnosticKind::DynamicCallee, DiagnosticKind::DynamicImport]
        );
    }

    #[test]
    fn jsx_components_are_calls() {
        let source = r#"
function App() {
  return <Layout><Button label="x" /><div /><UI.Card /></Layout>;
}
"#;
        let ex = extract(source);
        assert_eq!(calls_named(&ex, "Layout").len(), 1);
        assert_eq!(calls_named(&ex, "Button").len(), 1);
        assert_eq!(calls_named(&ex, "UI.Card")[0].member, "Card");
        assert!(calls_named(&ex, "div").is_empty());
        assert!(ex.drafts.calls.iter().all(|c| c.caller == Some(0)));
    }
}
