//! Repository-wide index over every successfully parsed file's drafts.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::drafts::{DeclaredEntity, FunctionDraft, ImportBinding, ParsedFile};
use crate::model::{FunctionNode, function_id};
use crate::modules::ModuleIndex;

/// Base classes are followed at most this deep.
const MAX_BASE_DEPTH: usize = 8;

/// A class somewhere in the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassRef {
    pub file: usize,
    pub class: usize,
}

/// Per-file view: drafts plus derived lookups.
#[derive(Debug)]
pub struct FileSymbols<'a> {
    pub parsed: &'a ParsedFile,
    /// Function draft index → node index.
    pub nodes: Vec<usize>,
    /// Named functions nested directly in each function, by name.
    nested: HashMap<usize, HashMap<&'a str, usize>>,
    /// Methods of each class, by name.
    methods: Vec<HashMap<&'a str, usize>>,
    /// Constructor draft of each class.
    constructors: Vec<Option<usize>>,
}

impl<'a> FileSymbols<'a> {
    fn new(parsed: &'a ParsedFile, nodes: Vec<usize>) -> Self {
        let drafts = &parsed.drafts;
        let class_index: HashMap<&str, usize> = drafts
            .classes
            .iter()
            .enumerate()
            .map(|(i, class)| (class.local_path.as_str(), i))
            .collect();

        let mut nested: HashMap<usize, HashMap<&str, usize>> = HashMap::new();
        let mut methods = vec![HashMap::new(); drafts.classes.len()];
        let mut constructors = vec![None; drafts.classes.len()];

        for (i, func) in drafts.functions.iter().enumerate() {
            if func.positional {
                continue;
            }
            if let Some(class) = func.class_path.as_deref().and_then(|p| class_index.get(p)) {
                methods[*class].insert(func.name.as_str(), i);
                if func.is_constructor {
                    constructors[*class] = Some(i);
                }
            } else if let Some(parent) = func.parent {
                nested.entry(parent).or_default().insert(func.name.as_str(), i);
            }
        }

        Self {
            parsed,
            nodes,
            nested,
            methods,
            constructors,
        }
    }

    pub fn path(&self) -> &'a str {
        &self.parsed.path
    }

    pub fn function(&self, draft: usize) -> &'a FunctionDraft {
        &self.parsed.drafts.functions[draft]
    }

    pub fn top_level(&self, name: &str) -> Option<&'a DeclaredEntity> {
        self.parsed.drafts.scope.get(name)
    }

    pub fn import(&self, name: &str) -> Option<&'a ImportBinding> {
        self.parsed.drafts.scope.import(name)
    }

    pub fn wildcard_imports(&self) -> &'a [String] {
        &self.parsed.drafts.scope.wildcard_imports
    }

    /// A named function declared directly inside `parent`.
    pub fn nested(&self, parent: usize, name: &str) -> Option<usize> {
        self.nested.get(&parent)?.get(name).copied()
    }

    pub fn class_bases(&self, class: usize) -> &'a [String] {
        &self.parsed.drafts.classes[class].bases
    }

    /// The class a function belongs to, directly or through enclosing functions
    /// (an arrow function inside a method sees the method's `this`).
    pub fn enclosing_class(&self, mut draft: usize) -> Option<usize> {
        loop {
            let func = self.function(draft);
            if let Some(path) = func.class_path.as_deref() {
                return self
                    .parsed
                    .drafts
                    .classes
                    .iter()
                    .position(|c| c.local_path == path);
            }
            draft = func.parent?;
        }
    }
}

/// Repository-wide symbol index.
#[derive(Debug)]
pub struct SymbolTable<'a> {
    files: Vec<FileSymbols<'a>>,
    by_path: HashMap<&'a str, usize>,
    nodes: Vec<FunctionNode>,
    by_qualified_name: HashMap<String, usize>,
    methods_by_name: BTreeMap<&'a str, Vec<usize>>,
    classes_by_name: BTreeMap<&'a str, Vec<ClassRef>>,
    modules: ModuleIndex,
    total_files: usize,
}

impl<'a> SymbolTable<'a> {
    /// Index every `ok` file. Others contribute nothing but still count as
    /// import targets, so imports of them are not mistaken for libraries.
    pub fn build(parsed: &'a [ParsedFile]) -> Self {
        let modules = ModuleIndex::new(parsed.iter().map(|f| f.path.clone()));
        let ok_files: Vec<&ParsedFile> = parsed.iter().filter(|f| f.is_ok()).collect();

        // Qualified names first, so cross-file collisions can be detected.
        let mut named: Vec<(usize, usize, String)> = Vec::new();
        let mut files_per_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (file_idx, file) in ok_files.iter().enumerate() {
            for (draft_idx, func) in file.drafts.functions.iter().enumerate() {
                let qualified = if func.positional {
                    format!("{}::{}", file.path, func.local_path)
                } else {
                    format!("{}.{}", file.module, func.local_path)
                };
                let owners = files_per_name.entry(qualified.clone()).or_default();
                if !owners.contains(&file_idx) {
                    owners.push(file_idx);
                }
                named.push((file_idx, draft_idx, qualified));
            }
        }

        let mut nodes = Vec::with_capacity(named.len());
        let mut per_file: Vec<Vec<usize>> = ok_files
            .iter()
            .map(|f| Vec::with_capacity(f.drafts.functions.len()))
            .collect();
        let mut collisions = 0usize;

        for (file_idx, draft_idx, qualified) in named {
            let file = ok_files[file_idx];
            let qualified = if files_per_name[&qualified].len() > 1 {
                collisions += 1;
                format!("{qualified}@{}", file.path)
            } else {
                qualified
            };
            let func = &file.drafts.functions[draft_idx];
            per_file[file_idx].push(nodes.len());
            nodes.push(FunctionNode {
                id: function_id(&file.path, &qualified),
                qualified_name: qualified,
                name: func.name.clone(),
                language: file.language,
                file: file.path.clone(),
                start_line: func.span.start_line(),
                end_line: func.span.end_line(),
                start_byte: func.span.start_byte,
                end_byte: func.span.end_byte,
                snippet: func.snippet.clone(),
                docstring: func.doc.as_ref().map(|d| d.text.clone()),
                kind: func.kind,
            });
        }

        let files: Vec<FileSymbols<'a>> = ok_files
            .iter()
            .zip(per_file)
            .map(|(file, nodes)| FileSymbols::new(file, nodes))
            .collect();

        let by_path = files
            .iter()
            .enumerate()
            .map(|(i, f)| (f.path(), i))
            .collect();
        let by_qualified_name = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.qualified_name.clone(), i))
            .collect();

        let mut methods_by_name: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        let mut classes_by_name: BTreeMap<&str, Vec<ClassRef>> = BTreeMap::new();
        for (file_idx, file) in files.iter().enumerate() {
            for (draft_idx, func) in file.parsed.drafts.functions.iter().enumerate() {
                if func.class_path.is_some() && !func.positional {
                    methods_by_name
                        .entry(func.name.as_str())
                        .or_default()
                        .push(file.nodes[draft_idx]);
                }
            }
            for (class_idx, class) in file.parsed.drafts.classes.iter().enumerate() {
                classes_by_name
                    .entry(class.name.as_str())
                    .or_default()
                    .push(ClassRef {
                        file: file_idx,
                        class: class_idx,
                    });
            }
        }

        debug!(
            files = files.len(),
            functions = nodes.len(),
            collisions,
            "Built symbol table"
        );

        Self {
            files,
            by_path,
            nodes,
            by_qualified_name,
            methods_by_name,
            classes_by_name,
            modules,
            total_files: ok_files.len(),
        }
    }

    pub fn files(&self) -> &[FileSymbols<'a>] {
        &self.files
    }

    pub fn file(&self, index: usize) -> &FileSymbols<'a> {
        &self.files[index]
    }

    pub fn file_index(&self, path: &str) -> Option<usize> {
        self.by_path.get(path).copied()
    }

    pub fn nodes(&self) -> &[FunctionNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &FunctionNode {
        &self.nodes[index]
    }

    /// Node index of a draft.
    pub fn node_of(&self, file: usize, draft: usize) -> usize {
        self.files[file].nodes[draft]
    }

    pub fn lookup(&self, qualified_name: &str) -> Option<&FunctionNode> {
        self.by_qualified_name
            .get(qualified_name)
            .map(|&i| &self.nodes[i])
    }

    pub fn modules(&self) -> &ModuleIndex {
        &self.modules
    }

    /// Files that parsed successfully.
    pub fn total_files(&self) -> usize {
        self.total_files
    }

    /// Every method named `name` in the repository, as node indices.
    pub fn methods_named(&self, name: &str) -> &[usize] {
        self.methods_by_name.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn classes_named(&self, name: &str) -> &[ClassRef] {
        self.classes_by_name.get(name).map_or(&[], Vec::as_slice)
    }

    /// Method `name` of `class`, searching base classes found in the repository.
    pub fn class_method(&self, class: ClassRef, name: &str) -> Option<usize> {
        self.class_method_at(class, name, 0)
    }

    fn class_method_at(&self, class: ClassRef, name: &str, depth: usize) -> Option<usize> {
        if depth > MAX_BASE_DEPTH {
            return None;
        }
        let file = &self.files[class.file];
        if let Some(&draft) = file.methods[class.class].get(name) {
            return Some(file.nodes[draft]);
        }
        self.base_classes(class)
            .into_iter()
            .find_map(|base| self.class_method_at(base, name, depth + 1))
    }

    /// Constructor of `class`, inherited if the class declares none.
    pub fn constructor(&self, class: ClassRef) -> Option<usize> {
        let mut current = class;
        for _ in 0..=MAX_BASE_DEPTH {
            let file = &self.files[current.file];
            if let Some(draft) = file.constructors[current.class] {
                return Some(file.nodes[draft]);
            }
            current = *self.base_classes(current).first()?;
        }
        None
    }

    /// Base classes of `class` that resolve to classes of this repository.
    pub fn base_classes(&self, class: ClassRef) -> Vec<ClassRef> {
        let file = &self.files[class.file];
        file.class_bases(class.class)
            .iter()
            .filter_map(|base| self.class_by_expression(class.file, base))
            .filter(|base| *base != class)
            .collect()
    }

    /// Resolve a class expression (`Base`, `models.Base`) as seen from `file`.
    pub fn class_by_expression(&self, file: usize, expr: &str) -> Option<ClassRef> {
        let (head, rest) = match expr.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (expr, None),
        };
        let symbols = &self.files[file];

        match (symbols.top_level(head), rest) {
            (Some(DeclaredEntity::Class(class)), None) => Some(ClassRef {
                file,
                class: *class,
            }),
            (Some(DeclaredEntity::Import(binding)), _) => {
                let target = self.import_file(file, binding, rest)?;
                let name = match (&binding.symbol, rest) {
                    (Some(symbol), None) => symbol.as_str(),
                    (_, Some(rest)) => rest.rsplit('.').next().unwrap_or(rest),
                    (None, None) => return None,
                };
                self.class_in_file(target, name, 0)
            }
            _ => None,
        }
    }

    /// File an import binding points into, when it is part of this repository.
    /// `rest` is the dotted remainder used for namespace imports (`ns.Base`).
    fn import_file(&self, file: usize, binding: &ImportBinding, rest: Option<&str>) -> Option<usize> {
        let symbols = &self.files[file];
        let language = symbols.parsed.language;
        let mut module = binding.module.clone();
        if binding.symbol.is_none() {
            if let Some((submodule, _)) = rest.and_then(|r| r.rsplit_once('.')) {
                for part in submodule.split('.') {
                    module = crate::modules::join_module(&module, part, language);
                }
            }
        }
        match self.modules.resolve(symbols.path(), language, &module) {
            crate::modules::ModuleTarget::File(path) => self.file_index(&path),
            _ => None,
        }
    }

    /// A class exported from `file` under `name`, following aliases and re-exports.
    fn class_in_file(&self, file: usize, name: &str, depth: usize) -> Option<ClassRef> {
        if depth > MAX_BASE_DEPTH {
            return None;
        }
        match self.files[file].top_level(name)? {
            DeclaredEntity::Class(class) => Some(ClassRef {
                file,
                class: *class,
            }),
            DeclaredEntity::Alias(target) => self.class_in_file(file, target, depth + 1),
            DeclaredEntity::Import(binding) => {
                let symbol = binding.symbol.as_deref()?;
                let target = self.import_file(file, binding, None)?;
                self.class_in_file(target, symbol, depth + 1)
            }
            DeclaredEntity::Function(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;
    use crate::drafts::SourceFile;
    use crate::languages::{AdapterRegistry, ParseLimits};
    use crate::Language;

    fn parse_all(files: &[(&str, &str)]) -> Vec<ParsedFile> {
        let registry = AdapterRegistry::new();
        files
            .iter()
            .map(|(path, text)| {
                let language = Language::from_path(std::path::Path::new(path)).unwrap();
                registry.parse(
                    &SourceFile::new(*path, language, *text),
                    &ParseLimits::default(),
                    &AtomicBool::new(false),
                )
            })
            .collect()
    }

    #[test]
    fn qualified_names_use_module_paths() {
        let parsed = parse_all(&[
            ("pkg/__init__.py", ""),
            ("pkg/service.py", "class Service:\n    def run(self):\n        pass\n"),
            ("web/app.js", "export function start() {}\n"),
        ]);
        let table = SymbolTable::build(&parsed);
        assert!(table.lookup("pkg.service.Service.run").is_some());
        assert!(table.lookup("web.app.start").is_some());
        assert_eq!(table.total_files(), 3);
    }

    #[test]
    fn cross_file_collisions_get_path_suffix() {
        let parsed = parse_all(&[
            ("util.js", "export function helper() {}\n"),
            ("util.ts", "export function helper() {}\n"),
            ("other.py", "def helper():\n    pass\n"),
        ]);
        let table = SymbolTable::build(&parsed);
        let names: Vec<_> = table.nodes().iter().map(|n| n.qualified_name.as_str()).collect();
        assert!(names.contains(&"util.helper@util.js"));
        assert!(names.contains(&"util.helper@util.ts"));
        assert!(names.contains(&"other.helper"));
        assert_eq!(table.nodes().len(), 3);
    }

    #[test]
    fn anonymous_functions_are_positional() {
        let parsed = parse_all(&[("app.js", "run(() => 1);\n")]);
        let table = SymbolTable::build(&parsed);
        assert_eq!(table.nodes()[0].qualified_name, "app.js::lambda@1:5");
    }

    #[test]
    fn methods_found_through_imported_base_classes() {
        let parsed = parse_all(&[
            ("base.py", "class Base:\n    def save(self):\n        pass\n"),
            (
                "models.py",
                "from base import Base\n\nclass User(Base):\n    def __init__(self):\n        pass\n",
            ),
        ]);
        let table = SymbolTable::build(&parsed);
        let models = table.file_index("models.py").unwrap();
        let user = table.classes_named("User")[0];
        assert_eq!(user.file, models);

        let save = table.class_method(user, "save").unwrap();
        assert_eq!(table.node(save).qualified_name, "base.Base.save");
        assert_eq!(
            table.node(table.constructor(user).unwrap()).qualified_name,
            "models.User.__init__"
        );
        assert_eq!(table.methods_named("save").len(), 1);
    }

    #[test]
    fn failed_files_are_not_indexed() {
        let garbage = "))) ((( ]]] ::: ".repeat(100);
        let parsed = parse_all(&[("ok.py", "def f():\n    pass\n"), ("bad.py", &garbage)]);
        let table = SymbolTable::build(&parsed);
        assert_eq!(table.total_files(), 1);
        assert!(table.file_index("bad.py").is_none());
        assert!(table.modules().contains("bad.py"));
    }
}
