//! Maps every call site to a function node, an external library, or nothing.
//!
//! Rules are tried in order, first match wins:
//! 1. local scope (enclosing functions, then file top level)
//! 2. method lookup on `self`/`this`/`super`, a named class, or an inferred receiver class,
//!    then every repository method with that name
//! 3. import-qualified lookup in the imported file, following re-exports
//! 4. imports of modules outside the repository
//! 5. unresolved
//!
//! Resolution never fails; a call that matches nothing becomes an `unresolved` edge.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::drafts::{CallHint, CallSiteDraft, DeclaredEntity, ImportBinding};
use crate::model::{CallEdge, ResolutionStatus};
use crate::modules::{ModuleTarget, join_module};
use crate::symbols::{ClassRef, SymbolTable};

/// Re-exports and aliases are followed at most this deep.
const MAX_REEXPORT_DEPTH: usize = 8;

const SELF_RECEIVERS: [&str; 3] = ["self", "cls", "this"];

/// One call site after resolution, before edges are merged.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResolvedCall {
    pub file: String,
    pub start_byte: usize,
    pub line: u32,
    pub caller: String,
    pub callee: Option<String>,
    pub status: ResolutionStatus,
    pub rationale: String,
    pub callee_text: String,
}

/// Output of [`resolve_calls`].
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub edges: Vec<CallEdge>,
    /// Call sites at file top level; they have no caller node.
    pub module_level_calls: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Node { node: usize, rationale: String },
    External(String),
    Unresolved(String),
}

impl Outcome {
    fn node(node: usize, rationale: impl Into<String>) -> Self {
        Self::Node {
            node,
            rationale: rationale.into(),
        }
    }

    fn unresolved(rationale: impl Into<String>) -> Self {
        Self::Unresolved(rationale.into())
    }
}

/// Resolve every call site in the table and collapse them into edges.
pub fn resolve_calls(table: &SymbolTable<'_>) -> Resolution {
    let resolver = Resolver { table };
    let mut calls = Vec::new();
    let mut module_level_calls = 0;

    for (file_idx, file) in table.files().iter().enumerate() {
        for call in &file.parsed.drafts.calls {
            let Some(caller_draft) = call.caller else {
                module_level_calls += 1;
                continue;
            };
            calls.push(resolver.resolve_site(file_idx, caller_draft, call));
        }
    }

    let sites = calls.len();
    let edges = merge_calls(calls);
    debug!(sites, edges = edges.len(), module_level_calls, "Resolved call sites");

    Resolution {
        edges,
        module_level_calls,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum EdgeKey {
    Resolved {
        caller: String,
        callee: String,
    },
    Open {
        caller: String,
        status: ResolutionStatus,
        callee_text: String,
    },
}

/// Collapse call sites into one edge per (caller, callee), or per
/// (caller, status, callee text) when there is no callee node.
///
/// Sites are keyed by location, so feeding the same site twice changes
/// nothing, and the result does not depend on input order.
pub fn merge_calls(calls: impl IntoIterator<Item = ResolvedCall>) -> Vec<CallEdge> {
    let mut sites: BTreeMap<(String, usize, String), ResolvedCall> = BTreeMap::new();
    for call in calls {
        let key = (call.file.clone(), call.start_byte, call.callee_text.clone());
        match sites.get(&key) {
            Some(existing) if *existing <= call => {}
            _ => {
                sites.insert(key, call);
            }
        }
    }

    let mut edges: BTreeMap<EdgeKey, CallEdge> = BTreeMap::new();
    for call in sites.into_values() {
        let key = match &call.callee {
            Some(callee) => EdgeKey::Resolved {
                caller: call.caller.clone(),
                callee: callee.clone(),
            },
            None => EdgeKey::Open {
                caller: call.caller.clone(),
                status: call.status,
                callee_text: call.callee_text.clone(),
            },
        };
        edges
            .entry(key)
            .and_modify(|edge| {
                edge.call_count += 1;
                edge.lines.push(call.line);
                if call.callee_text < edge.callee_text {
                    edge.callee_text.clone_from(&call.callee_text);
                }
                if call.rationale < edge.rationale {
                    edge.rationale.clone_from(&call.rationale);
                }
            })
            .or_insert_with(|| CallEdge {
                caller: call.caller.clone(),
                callee: call.callee.clone(),
                status: call.status,
                rationale: call.rationale.clone(),
                callee_text: call.callee_text.clone(),
                call_count: 1,
                lines: vec![call.line],
            });
    }

    edges
        .into_values()
        .map(|mut edge| {
            edge.lines.sort_unstable();
            edge.lines.dedup();
            edge
        })
        .collect()
}

struct Resolver<'t, 'a> {
    table: &'t SymbolTable<'a>,
}

impl Resolver<'_, '_> {
    fn resolve_site(&self, file: usize, caller_draft: usize, call: &CallSiteDraft) -> ResolvedCall {
        let caller = self.table.node_of(file, caller_draft);
        let outcome = match &call.receiver {
            None => self.resolve_bare(file, caller_draft, &call.member),
            Some(receiver) => {
                let outcome = self.resolve_attribute(file, caller_draft, receiver, call);
                let recursion_allowed = call.hint == CallHint::SelfReference
                    || SELF_RECEIVERS.contains(&receiver.as_str());
                match outcome {
                    Outcome::Node { node, .. } if node == caller && !recursion_allowed => {
                        Outcome::unresolved("only match is the calling function itself")
                    }
                    other => other,
                }
            }
        };

        let caller_node = self.table.node(caller);
        let (callee, status, rationale) = match outcome {
            Outcome::Node { node, rationale } => {
                let target = self.table.node(node);
                let status = if target.file == caller_node.file {
                    ResolutionStatus::ResolvedLocal
                } else {
                    ResolutionStatus::ResolvedCrossFile
                };
                (Some(target.id.clone()), status, rationale)
            }
            Outcome::External(rationale) => {
                (None, ResolutionStatus::ResolvedExternalLibrary, rationale)
            }
            Outcome::Unresolved(rationale) => (None, ResolutionStatus::Unresolved, rationale),
        };

        ResolvedCall {
            file: caller_node.file.clone(),
            start_byte: call.span.start_byte,
            line: call.span.start_line(),
            caller: caller_node.id.clone(),
            callee,
            status,
            rationale,
            callee_text: call.callee_text.clone(),
        }
    }

    // ── Bare names ─────────────────────────────────────────────────

    fn resolve_bare(&self, file: usize, caller_draft: usize, name: &str) -> Outcome {
        let symbols = self.table.file(file);

        let mut scope = Some(caller_draft);
        while let Some(func) = scope {
            if let Some(nested) = symbols.nested(func, name) {
                return Outcome::node(
                    self.table.node_of(file, nested),
                    format!("local scope: `{name}` defined in an enclosing function"),
                );
            }
            scope = symbols.function(func).parent;
        }

        if let Some(entity) = symbols.top_level(name) {
            return self.resolve_top_level(file, name, entity, 0);
        }

        for module in symbols.wildcard_imports() {
            if let ModuleTarget::File(path) = self.resolve_module(file, module) {
                if let Some(target) = self.table.file_index(&path) {
                    if let Some(node) = self.lookup_export(target, name, &[], 0) {
                        return Outcome::node(
                            node,
                            format!("import-qualified: `{name}` via wildcard import of `{module}`"),
                        );
                    }
                }
            }
        }

        Outcome::unresolved(format!("no definition of `{name}` in scope"))
    }

    fn resolve_top_level(
        &self,
        file: usize,
        name: &str,
        entity: &DeclaredEntity,
        depth: usize,
    ) -> Outcome {
        if depth > MAX_REEXPORT_DEPTH {
            return Outcome::unresolved(format!("alias chain for `{name}` too deep"));
        }
        match entity {
            DeclaredEntity::Function(draft) => Outcome::node(
                self.table.node_of(file, *draft),
                format!("local scope: `{name}` defined at file top level"),
            ),
            DeclaredEntity::Class(class) => {
                match self.table.constructor(ClassRef {
                    file,
                    class: *class,
                }) {
                    Some(node) => {
                        Outcome::node(node, format!("local scope: constructor of class `{name}`"))
                    }
                    None => Outcome::unresolved(format!("class `{name}` declares no constructor")),
                }
            }
            DeclaredEntity::Alias(target) if target != name => {
                match self.table.file(file).top_level(target) {
                    Some(next) => self.resolve_top_level(file, target, next, depth + 1),
                    None => Outcome::unresolved(format!("`{name}` aliases unknown `{target}`")),
                }
            }
            DeclaredEntity::Alias(_) => Outcome::unresolved(format!("`{name}` aliases itself")),
            DeclaredEntity::Import(binding) => self.resolve_import(file, binding, &[], depth),
        }
    }

    // ── Attribute calls ────────────────────────────────────────────

    fn resolve_attribute(
        &self,
        file: usize,
        caller_draft: usize,
        receiver: &str,
        call: &CallSiteDraft,
    ) -> Outcome {
        let symbols = self.table.file(file);
        let member = call.member.as_str();
        let segments: Vec<&str> = receiver.split('.').collect();
        let root = segments[0];

        if call.hint == CallHint::SuperReference {
            let Some(class) = symbols.enclosing_class(caller_draft) else {
                return Outcome::unresolved("`super` used outside a class");
            };
            for base in self.table.base_classes(ClassRef { file, class }) {
                if let Some(node) = self.table.class_method(base, member) {
                    return Outcome::node(node, format!("method match: `{member}` of base class"));
                }
            }
            return Outcome::unresolved(format!(
                "no base class in the repository defines `{member}`"
            ));
        }

        let self_receiver = segments.len() == 1 && SELF_RECEIVERS.contains(&root);
        if self_receiver {
            if let Some(class) = symbols.enclosing_class(caller_draft) {
                if let Some(node) = self.table.class_method(ClassRef { file, class }, member) {
                    return Outcome::node(
                        node,
                        format!("method match: `{member}` of the enclosing class"),
                    );
                }
            }
            return self.pick_candidate(file, caller_draft, call, true);
        }

        // Receivers bound by an import are looked up in the imported module only.
        if let Some(binding) = symbols.import(root) {
            let mut rest: Vec<&str> = segments[1..].to_vec();
            rest.push(member);
            return self.resolve_import(file, binding, &rest, 0);
        }

        if segments.len() == 1 {
            if let Some(DeclaredEntity::Class(class)) = symbols.top_level(root) {
                let class = ClassRef {
                    file,
                    class: *class,
                };
                if let Some(node) = self.table.class_method(class, member) {
                    return Outcome::node(node, format!("method match: `{root}.{member}` on the class"));
                }
            }
        }

        if let Some(class_name) = call.receiver_type.as_deref() {
            if let Some(class) = self.class_named(file, class_name) {
                if let Some(node) = self.table.class_method(class, member) {
                    return Outcome::node(
                        node,
                        format!("method match: `{member}` of inferred receiver class `{class_name}`"),
                    );
                }
            }
        }

        self.pick_candidate(file, caller_draft, call, false)
    }

    /// A class by simple name: visible from `file`, else the only one in the
    /// repository, else the one in `file`.
    fn class_named(&self, file: usize, name: &str) -> Option<ClassRef> {
        if let Some(class) = self.table.class_by_expression(file, name) {
            return Some(class);
        }
        match self.table.classes_named(name) {
            [only] => Some(*only),
            many => many.iter().copied().find(|c| c.file == file),
        }
    }

    /// Method candidates by name alone: a unique candidate wins; otherwise the
    /// one nearest the call in the caller's file; otherwise unresolved.
    fn pick_candidate(
        &self,
        file: usize,
        caller_draft: usize,
        call: &CallSiteDraft,
        allow_caller: bool,
    ) -> Outcome {
        let member = call.member.as_str();
        let caller = self.table.node_of(file, caller_draft);
        let candidates: Vec<usize> = self
            .table
            .methods_named(member)
            .iter()
            .copied()
            .filter(|&node| allow_caller || node != caller)
            .collect();

        match candidates.as_slice() {
            [] => Outcome::unresolved(format!("no method named `{member}` in the repository")),
            [only] => Outcome::node(
                *only,
                format!("method match: only method named `{member}` in the repository"),
            ),
            many => {
                let path = self.table.file(file).path();
                let line = call.span.start_line();
                let nearest = many
                    .iter()
                    .copied()
                    .filter(|&n| self.table.node(n).file == path)
                    .min_by_key(|&n| {
                        let node = self.table.node(n);
                        (node.start_line.abs_diff(line), node.start_byte)
                    });
                match nearest {
                    Some(node) => Outcome::node(
                        node,
                        format!(
                            "method match: {} candidates for `{member}`, chose nearest in caller's file",
                            many.len()
                        ),
                    ),
                    None => Outcome::unresolved(format!(
                        "ambiguous: {} methods named `{member}` in other files",
                        many.len()
                    )),
                }
            }
        }
    }

    // ── Imports ────────────────────────────────────────────────────

    fn resolve_module(&self, file: usize, module: &str) -> ModuleTarget {
        let symbols = self.table.file(file);
        self.table
            .modules()
            .resolve(symbols.path(), symbols.parsed.language, module)
    }

    /// Resolve a call through an import binding. `rest` holds the attribute
    /// segments after the bound name, ending with the called member.
    fn resolve_import(
        &self,
        file: usize,
        binding: &ImportBinding,
        rest: &[&str],
        depth: usize,
    ) -> Outcome {
        if depth > MAX_REEXPORT_DEPTH {
            return Outcome::unresolved("re-export chain too deep");
        }
        let module = binding.module.as_str();
        let language = self.table.file(file).parsed.language;

        let Some(symbol) = binding.symbol.as_deref() else {
            if rest.is_empty() {
                // Calling a CommonJS module object calls its default export.
                if language.is_ecmascript() {
                    return self.resolve_namespace(file, module, &["default"], depth);
                }
                return Outcome::unresolved(format!("module `{module}` called directly"));
            }
            return self.resolve_namespace(file, module, rest, depth);
        };

        let path = match self.resolve_module(file, module) {
            ModuleTarget::External => {
                return Outcome::External(format!("import of external module `{module}`"));
            }
            ModuleTarget::Missing => None,
            ModuleTarget::File(path) => Some(path),
        };
        if let Some(path) = &path {
            let Some(target) = self.table.file_index(path) else {
                return Outcome::unresolved(format!("import target `{path}` could not be parsed"));
            };
            if let Some(node) = self.lookup_export(target, symbol, rest, depth + 1) {
                return Outcome::node(node, format!("import-qualified: `{symbol}` from `{path}`"));
            }
        }
        // `from pkg import sub` where `sub` is a submodule; `pkg` may be a
        // namespace package with no file of its own.
        if !rest.is_empty() {
            let submodule = join_module(module, symbol, language);
            if let outcome @ (Outcome::Node { .. } | Outcome::External(_)) =
                self.resolve_namespace(file, &submodule, rest, depth + 1)
            {
                return outcome;
            }
        }
        match path {
            Some(path) => Outcome::unresolved(format!("`{symbol}` not found in `{path}`")),
            None => {
                Outcome::unresolved(format!("import target `{module}` not found in the repository"))
            }
        }
    }

    /// `segments` are looked up in `module`, trying the longest submodule
    /// prefix first (`import a` + `a.b.f()` tries module `a.b`, then `a`).
    fn resolve_namespace(&self, file: usize, module: &str, segments: &[&str], depth: usize) -> Outcome {
        let language = self.table.file(file).parsed.language;
        let mut base_external = false;
        let mut searched = None;

        for split in (0..segments.len()).rev() {
            let candidate = segments[..split]
                .iter()
                .fold(module.to_string(), |m, part| join_module(&m, part, language));
            match self.resolve_module(file, &candidate) {
                ModuleTarget::File(path) => {
                    let Some(target) = self.table.file_index(&path) else {
                        continue;
                    };
                    if let Some(node) =
                        self.lookup_export(target, segments[split], &segments[split + 1..], depth + 1)
                    {
                        return Outcome::node(
                            node,
                            format!("import-qualified: `{}` from `{path}`", segments[split..].join(".")),
                        );
                    }
                    searched.get_or_insert(path);
                }
                ModuleTarget::External if split == 0 => base_external = true,
                ModuleTarget::External | ModuleTarget::Missing => {}
            }
        }

        if base_external {
            return Outcome::External(format!("import of external module `{module}`"));
        }
        match searched {
            Some(path) => Outcome::unresolved(format!(
                "`{}` not found in `{path}`",
                segments.join(".")
            )),
            None => Outcome::unresolved(format!("import target `{module}` not found in the repository")),
        }
    }

    /// Find `name` (then `rest`) among `file`'s top-level declarations,
    /// following aliases, re-exports and wildcard re-exports.
    fn lookup_export(&self, file: usize, name: &str, rest: &[&str], depth: usize) -> Option<usize> {
        if depth > MAX_REEXPORT_DEPTH {
            return None;
        }
        let symbols = self.table.file(file);
        match symbols.top_level(name) {
            Some(DeclaredEntity::Function(draft)) => {
                rest.is_empty().then(|| self.table.node_of(file, *draft))
            }
            Some(DeclaredEntity::Class(class)) => {
                let class = ClassRef {
                    file,
                    class: *class,
                };
                match rest {
                    [] => self.table.constructor(class),
                    [method] => self.table.class_method(class, method),
                    _ => None,
                }
            }
            Some(DeclaredEntity::Alias(target)) if target != name => {
                self.lookup_export(file, target, rest, depth + 1)
            }
            Some(DeclaredEntity::Alias(_)) => None,
            Some(DeclaredEntity::Import(binding)) => {
                match self.resolve_import(file, binding, rest, depth + 1) {
                    Outcome::Node { node, .. } => Some(node),
                    _ => None,
                }
            }
            None => symbols.wildcard_imports().iter().find_map(|module| {
                let ModuleTarget::File(path) = self.resolve_module(file, module) else {
                    return None;
                };
                let target = self.table.file_index(&path)?;
                self.lookup_export(target, name, rest, depth + 1)
            }),
        }
    }
}
