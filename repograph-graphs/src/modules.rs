//! Module naming and import specifier resolution against the repository's files.

use std::collections::BTreeSet;

use crate::Language;

const ECMA_EXTENSIONS: [&str; 8] = ["ts", "tsx", "js", "jsx", "mjs", "cjs", "mts", "cts"];

/// Module path used to prefix qualified names.
///
/// Python: dotted path, `pkg/__init__.py` names `pkg`. ECMAScript: the path
/// without its extension, `/` replaced by `.`.
pub fn module_name(path: &str, language: Language) -> String {
    let stem = path.rsplit_once('.').map_or(path, |(stem, ext)| {
        if Language::from_extension(ext).is_some() {
            stem
        } else {
            path
        }
    });
    let stem = match language {
        Language::Python => match stem.strip_suffix("/__init__") {
            Some(pkg) => pkg,
            None => stem,
        },
        _ => stem,
    };
    stem.replace('/', ".")
}

/// Join an imported module and a symbol into a submodule specifier
/// (`pkg` + `sub` → `pkg.sub`, `.` + `sub` → `.sub`).
pub fn join_module(module: &str, symbol: &str, language: Language) -> String {
    match language {
        Language::Python if module.ends_with('.') => format!("{module}{symbol}"),
        Language::Python => format!("{module}.{symbol}"),
        _ => format!("{}/{symbol}", module.trim_end_matches('/')),
    }
}

/// Where an import specifier points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleTarget {
    /// A file of this repository.
    File(String),
    /// Outside the repository (a library).
    External,
    /// Looks repository-relative but matches no file.
    Missing,
}

/// The set of repository files that imports can resolve to.
#[derive(Debug, Clone, Default)]
pub struct ModuleIndex {
    files: BTreeSet<String>,
    /// Directories containing top-level Python packages (`src` for `src/pkg/__init__.py`).
    python_roots: Vec<String>,
}

impl ModuleIndex {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let files: BTreeSet<String> = paths.into_iter().map(Into::into).collect();

        let mut roots = BTreeSet::new();
        for file in &files {
            let Some(package) = file.strip_suffix("/__init__.py") else {
                continue;
            };
            let mut top = package;
            while let Some((parent, _)) = top.rsplit_once('/') {
                if files.contains(&format!("{parent}/__init__.py")) {
                    top = parent;
                } else {
                    break;
                }
            }
            if let Some((root, _)) = top.rsplit_once('/') {
                roots.insert(root.to_string());
            }
        }

        Self {
            files,
            python_roots: roots.into_iter().collect(),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains(path)
    }

    /// Resolve `specifier` as imported from `importer`.
    pub fn resolve(&self, importer: &str, language: Language, specifier: &str) -> ModuleTarget {
        if language.is_ecmascript() {
            self.resolve_ecma(importer, specifier)
        } else {
            self.resolve_python(importer, specifier)
        }
    }

    fn resolve_python(&self, importer: &str, module: &str) -> ModuleTarget {
        if module.is_empty() {
            return ModuleTarget::Missing;
        }

        if module.starts_with('.') {
            let levels = module.chars().take_while(|&c| c == '.').count();
            let suffix = &module[levels..];
            let mut base = parent_dir(importer).to_string();
            for _ in 1..levels {
                if base.is_empty() {
                    return ModuleTarget::Missing;
                }
                base = parent_dir(&base).to_string();
            }
            let target = join_path(&base, &suffix.replace('.', "/"));
            return self
                .probe_python(&target)
                .map_or(ModuleTarget::Missing, ModuleTarget::File);
        }

        let relative = module.replace('.', "/");
        let importer_dir = parent_dir(importer);
        let bases = std::iter::once("")
            .chain(self.python_roots.iter().map(String::as_str))
            .chain(std::iter::once(importer_dir));
        let mut namespace_package = false;
        for base in bases {
            let target = join_path(base, &relative);
            if let Some(found) = self.probe_python(&target) {
                return ModuleTarget::File(found);
            }
            namespace_package |= self.has_python_sources(&target);
        }
        if namespace_package {
            ModuleTarget::Missing
        } else {
            ModuleTarget::External
        }
    }

    /// Whether `dir` holds repository Python files (a package without `__init__.py`).
    fn has_python_sources(&self, dir: &str) -> bool {
        let prefix = format!("{dir}/");
        self.files
            .range(prefix.clone()..)
            .take_while(|f| f.starts_with(&prefix))
            .any(|f| f.ends_with(".py") || f.ends_with(".pyi"))
    }

    fn probe_python(&self, base: &str) -> Option<String> {
        let candidates = if base.is_empty() {
            vec!["__init__.py".to_string()]
        } else {
            vec![
                format!("{base}.py"),
                format!("{base}.pyi"),
                format!("{base}/__init__.py"),
            ]
        };
        candidates.into_iter().find(|c| self.files.contains(c))
    }

    fn resolve_ecma(&self, importer: &str, specifier: &str) -> ModuleTarget {
        let relative = matches!(specifier, "." | "..")
            || specifier.starts_with("./")
            || specifier.starts_with("../");
        let joined = if relative {
            format!("{}/{specifier}", parent_dir(importer))
        } else if let Some(absolute) = specifier.strip_prefix('/') {
            absolute.to_string()
        } else {
            return ModuleTarget::External;
        };

        let Some(base) = normalize_posix_path(&joined) else {
            return ModuleTarget::Missing;
        };
        self.probe_ecma(&base)
            .map_or(ModuleTarget::Missing, ModuleTarget::File)
    }

    fn probe_ecma(&self, base: &str) -> Option<String> {
        if self.files.contains(base) {
            return Some(base.to_string());
        }
        // `./util.js` written in TypeScript sources refers to `util.ts`.
        if let Some(stem) = base.strip_suffix(".js").or_else(|| base.strip_suffix(".jsx")) {
            for ext in ["ts", "tsx"] {
                let candidate = format!("{stem}.{ext}");
                if self.files.contains(&candidate) {
                    return Some(candidate);
                }
            }
        }
        let with_ext = ECMA_EXTENSIONS.iter().map(|ext| format!("{base}.{ext}"));
        let index = ECMA_EXTENSIONS
            .iter()
            .map(|ext| join_path(base, &format!("index.{ext}")));
        with_ext.chain(index).find(|c| self.files.contains(c))
    }
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

fn join_path(base: &str, rest: &str) -> String {
    match (base.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{rest}"),
    }
}

/// Collapse `.` and `..` segments. `None` when the path escapes the root.
fn normalize_posix_path(path: &str) -> Option<String> {
    let mut stack: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                stack.pop()?;
            }
            _ => stack.push(part),
        }
    }
    Some(stack.join("/"))
}
