use std::collections::{HashMap, HashSet};

use tree_sitter::Node;

use super::{Extraction, ParseLimits};
use crate::drafts::{
    CallHint, CallSiteDraft, ClassDraft, DeclaredEntity, Diagnostic, DiagnosticKind, FileDrafts,
    FunctionDraft, FunctionKind, ImportBinding,
};
use crate::{DocCommentData, DocStyle, TextRange};

/// Extract the source text for a tree-sitter node.
pub fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

/// Find the first child with a specific kind.
pub fn find_child_by_kind<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).find(|child| child.kind() == kind)
}

/// Convert a tree-sitter node to a `TextRange`.
pub fn node_range(node: Node<'_>) -> TextRange {
    node.range().into()
}

/// 1-based line of a node's first character.
#[allow(clippy::cast_possible_truncation)]
pub fn node_line(node: Node<'_>) -> u32 {
    node.start_position().row as u32 + 1
}

/// Strip whitespace and optional chaining from a callee expression.
pub fn normalize_callee(text: &str) -> String {
    text.replace("?.", ".")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '!')
        .collect()
}

/// Cut `text` to at most `max` bytes on a character boundary.
pub fn truncate_snippet(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Extract a doc comment from comment nodes immediately preceding a definition.
pub fn extract_doc_comment_above(
    node: Node<'_>,
    source: &str,
    prefix: &str,
) -> Option<DocCommentData> {
    let mut comments = Vec::new();
    let mut current = node;

    while let Some(prev) = current.prev_sibling() {
        if prev.kind() == "comment" {
            let text = node_text(prev, source);
            if let Some(stripped) = text.strip_prefix(prefix) {
                // A blank line detaches the comment.
                if prev.end_position().row + 1 < current.start_position().row {
                    break;
                }
                comments.push(stripped.trim().to_string());
                current = prev;
                continue;
            }
        }
        break;
    }

    if comments.is_empty() {
        return None;
    }

    comments.reverse();
    Some(DocCommentData {
        text: comments.join("\n"),
        style: DocStyle::LineComment,
    })
}

/// Extract a block doc comment (/** ... */) from the preceding sibling.
pub fn extract_block_doc_comment(node: Node<'_>, source: &str) -> Option<DocCommentData> {
    let prev = node.prev_sibling()?;
    if prev.kind() != "comment" {
        return None;
    }

    let text = node_text(prev, source);
    let body = text.strip_prefix("/**")?.strip_suffix("*/")?;

    let inner = body
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            trimmed
                .strip_prefix("* ")
                .or(trimmed.strip_prefix('*'))
                .unwrap_or(trimmed)
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    if inner.is_empty() {
        return None;
    }

    Some(DocCommentData {
        text: inner,
        style: DocStyle::Jsdoc,
    })
}

/// Count bytes covered by error nodes and report each error region.
pub fn syntax_diagnostics(root: Node<'_>) -> (usize, Vec<Diagnostic>) {
    let mut error_bytes = 0;
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() {
            error_bytes += node.byte_range().len();
            out.push(Diagnostic {
                kind: DiagnosticKind::SyntaxError,
                line: node_line(node),
                message: "syntax error region skipped".to_string(),
            });
            continue;
        }
        if node.is_missing() {
            out.push(Diagnostic {
                kind: DiagnosticKind::SyntaxError,
                line: node_line(node),
                message: format!("missing `{}`", node.kind()),
            });
            continue;
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<_> = node.children(&mut cursor).collect();
        // Reversed so regions pop in source order.
        stack.extend(children.into_iter().rev());
    }
    (error_bytes, out)
}

// ── Draft collector ────────────────────────────────────────────────

/// Deepest syntax-tree level the adapters walk into.
pub const MAX_WALK_DEPTH: usize = 512;

/// A call target split into receiver path and member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callee {
    pub receiver: Option<String>,
    pub member: String,
    pub hint: CallHint,
}

impl Callee {
    pub fn direct(name: &str) -> Self {
        Self {
            receiver: None,
            member: name.to_string(),
            hint: CallHint::Direct,
        }
    }

    pub fn attribute(receiver: String, member: &str, hint: CallHint) -> Self {
        Self {
            receiver: Some(receiver),
            member: member.to_string(),
            hint,
        }
    }
}

#[derive(Debug)]
enum Frame {
    Function {
        index: usize,
        types: HashMap<String, String>,
    },
    Class {
        index: usize,
    },
}

/// Accumulates drafts while an adapter walks a syntax tree.
///
/// Adapters push a frame on entering a function or class body and pop it on
/// the way out; names, parents and class paths are derived from the frame stack.
#[derive(Debug)]
pub struct DraftCollector<'s> {
    source: &'s str,
    max_snippet_bytes: usize,
    drafts: FileDrafts,
    diagnostics: Vec<Diagnostic>,
    frames: Vec<Frame>,
    module_types: HashMap<String, String>,
    used_paths: HashSet<String>,
    depth: usize,
    too_deep: bool,
}

impl<'s> DraftCollector<'s> {
    pub fn new(source: &'s str, limits: &ParseLimits) -> Self {
        Self {
            source,
            max_snippet_bytes: limits.max_snippet_bytes,
            drafts: FileDrafts::default(),
            diagnostics: Vec::new(),
            frames: Vec::new(),
            module_types: HashMap::new(),
            used_paths: HashSet::new(),
            depth: 0,
            too_deep: false,
        }
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    pub fn text(&self, node: Node<'_>) -> &'s str {
        node_text(node, self.source)
    }

    pub fn at_top_level(&self) -> bool {
        self.frames.is_empty()
    }

    /// Whether the innermost frame is a class body.
    pub fn in_class_body(&self) -> bool {
        matches!(self.frames.last(), Some(Frame::Class { .. }))
    }

    /// Innermost enclosing function.
    pub fn current_function(&self) -> Option<usize> {
        self.frames.iter().rev().find_map(|frame| match frame {
            Frame::Function { index, .. } => Some(*index),
            Frame::Class { .. } => None,
        })
    }

    fn prefix(&self) -> Option<&str> {
        match self.frames.last()? {
            Frame::Function { index, .. } => Some(&self.drafts.functions[*index].local_path),
            Frame::Class { index } => Some(&self.drafts.classes[*index].local_path),
        }
    }

    fn join(&self, name: &str) -> String {
        match self.prefix() {
            Some(prefix) => format!("{prefix}.{name}"),
            None => name.to_string(),
        }
    }

    /// Record a function and enter its body. `name` is `None` for functions
    /// with no binding, which get a positional name.
    pub fn enter_function(
        &mut self,
        name: Option<&str>,
        kind: FunctionKind,
        node: Node<'_>,
        doc: Option<DocCommentData>,
    ) -> usize {
        let span = node_range(node);
        let class_path = match self.frames.last() {
            Some(Frame::Class { index }) => Some(self.drafts.classes[*index].local_path.clone()),
            _ => None,
        };

        let (display, mut local_path, positional) = match name {
            Some(name) => (name.to_string(), self.join(name), false),
            None => {
                let label = format!("lambda@{}:{}", span.start_line(), span.start_column());
                (label.clone(), label, true)
            }
        };
        if !self.used_paths.insert(local_path.clone()) {
            local_path = self.redefined_path(&local_path, &span);
        }

        let parent = self.current_function();
        let snippet = truncate_snippet(self.text(node), self.max_snippet_bytes);
        let index = self.drafts.functions.len();
        self.drafts.functions.push(FunctionDraft {
            name: display,
            local_path,
            kind,
            class_path,
            parent,
            positional,
            is_constructor: false,
            span,
            snippet,
            doc,
        });
        self.frames.push(Frame::Function {
            index,
            types: HashMap::new(),
        });
        index
    }

    /// `f@line`, then `f@line:col`, then `f@line:col~n` until unused.
    fn redefined_path(&mut self, base: &str, span: &TextRange) -> String {
        let line = span.start_line();
        let column = span.start_column();
        let mut candidate = format!("{base}@{line}");
        let mut n = 1;
        while !self.used_paths.insert(candidate.clone()) {
            n += 1;
            candidate = if n == 2 {
                format!("{base}@{line}:{column}")
            } else {
                format!("{base}@{line}:{column}~{n}")
            };
        }
        candidate
    }

    /// Enter one syntax-tree level. Returns `false` past `MAX_WALK_DEPTH`;
    /// the subtree is then skipped and reported once per file.
    pub fn descend(&mut self, node: Node<'_>) -> bool {
        if self.depth >= MAX_WALK_DEPTH {
            if !self.too_deep {
                self.too_deep = true;
                self.diagnose(
                    DiagnosticKind::NestingTooDeep,
                    node,
                    format!("syntax nested deeper than {MAX_WALK_DEPTH} levels skipped"),
                );
            }
            return false;
        }
        self.depth += 1;
        true
    }

    pub fn ascend(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn mark_constructor(&mut self, index: usize) {
        self.drafts.functions[index].is_constructor = true;
    }

    pub fn enter_class(&mut self, name: &str, bases: Vec<String>, node: Node<'_>) -> usize {
        let index = self.drafts.classes.len();
        self.drafts.classes.push(ClassDraft {
            name: name.to_string(),
            local_path: self.join(name),
            bases,
            span: node_range(node),
        });
        self.frames.push(Frame::Class { index });
        index
    }

    /// Leave the innermost function or class body.
    pub fn leave(&mut self) {
        self.frames.pop();
    }

    /// Bind a top-level name. Later bindings shadow earlier ones.
    pub fn declare(&mut self, name: &str, entity: DeclaredEntity) {
        if self.at_top_level() {
            self.drafts.scope.entries.insert(name.to_string(), entity);
        }
    }

    /// Imports are visible file-wide; nested imports never shadow top-level names.
    pub fn declare_import(&mut self, local: &str, module: &str, symbol: Option<&str>, line: u32) {
        let entity = DeclaredEntity::Import(ImportBinding {
            module: module.to_string(),
            symbol: symbol.map(str::to_string),
            line,
        });
        if self.at_top_level() {
            self.drafts.scope.entries.insert(local.to_string(), entity);
        } else {
            self.drafts
                .scope
                .entries
                .entry(local.to_string())
                .or_insert(entity);
        }
    }

    pub fn add_wildcard(&mut self, module: &str) {
        if !self.drafts.scope.wildcard_imports.iter().any(|m| m == module) {
            self.drafts.scope.wildcard_imports.push(module.to_string());
        }
    }

    /// Remember the class of a local variable in the innermost function.
    pub fn bind_type(&mut self, var: &str, class_name: &str) {
        let types = self.frames.iter_mut().rev().find_map(|frame| match frame {
            Frame::Function { types, .. } => Some(types),
            Frame::Class { .. } => None,
        });
        types
            .unwrap_or(&mut self.module_types)
            .insert(var.to_string(), class_name.to_string());
    }

    pub fn lookup_type(&self, var: &str) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| match frame {
                Frame::Function { types, .. } => types.get(var),
                Frame::Class { .. } => None,
            })
            .or_else(|| self.module_types.get(var))
            .map(String::as_str)
    }

    pub fn record_call(&mut self, callee: Callee, node: Node<'_>) {
        let receiver_type = callee
            .receiver
            .as_deref()
            .filter(|r| !r.contains('.'))
            .and_then(|r| self.lookup_type(r))
            .map(str::to_string);
        let callee_text = match &callee.receiver {
            Some(receiver) => format!("{receiver}.{}", callee.member),
            None => callee.member.clone(),
        };
        self.drafts.calls.push(CallSiteDraft {
            caller: self.current_function(),
            callee_text,
            receiver: callee.receiver,
            member: callee.member,
            receiver_type,
            hint: callee.hint,
            span: node_range(node),
        });
    }

    pub fn diagnose(&mut self, kind: DiagnosticKind, node: Node<'_>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            kind,
            line: node_line(node),
            message: message.into(),
        });
    }

    /// Finish the walk. Calls rooted at an imported name are re-hinted.
    pub fn finish(mut self) -> Extraction {
        let scope = &self.drafts.scope;
        for call in &mut self.drafts.calls {
            if matches!(call.hint, CallHint::Direct | CallHint::Attribute)
                && scope.import(call.root()).is_some()
            {
                call.hint = CallHint::ImportedAlias;
            }
        }
        Extraction {
            drafts: self.drafts,
            diagnostics: self.diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_whitespace_and_optional_chaining() {
        assert_eq!(normalize_callee("obj ?.\n  bar"), "obj.bar");
        assert_eq!(normalize_callee("a.b!.c"), "a.b.c");
        assert_eq!(normalize_callee("self . run"), "self.run");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_snippet("short", 100), "short");
        assert_eq!(truncate_snippet("abcdef", 3), "abc");
        // 'é' is two bytes; cutting at 2 would split it.
        assert_eq!(truncate_snippet("aé", 2), "a");
    }
}
