// Integration test utilities and fixture repositories for repograph.

use std::path::Path;
use std::sync::Arc;

use repograph_core::config::RepographConfig;
use repograph_core::job::{IngestJob, JobHandle};
use repograph_core::pipeline::IngestPipeline;
use repograph_core::progress::NoopReporter;
use repograph_core::store::GraphStore;
use repograph_graphs::{CallEdge, RepositoryGraph};

/// A fixture repository in a temporary directory.
#[derive(Debug)]
pub struct TestRepo {
    pub dir: tempfile::TempDir,
}

impl TestRepo {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Empty repository.
    pub fn empty() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create tempdir"),
        }
    }

    /// Repository holding exactly the given files.
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let repo = Self::empty();
        for (path, text) in files {
            repo.write(path, text);
        }
        repo
    }

    /// Write (or overwrite) a file, creating parent directories.
    pub fn write(&self, rel: &str, content: &str) {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    pub fn remove(&self, rel: &str) {
        std::fs::remove_file(self.path().join(rel)).unwrap();
    }

    /// Python package: `app/a.py` defines `helper`, `app/b.py` imports and
    /// calls it, and calls `requests.get` and `print`.
    pub fn python_cross_file() -> Self {
        Self::with_files(&[
            ("app/__init__.py", ""),
            (
                "app/a.py",
                "def helper():\n    \"\"\"Return one.\"\"\"\n    return 1\n\ndef unused():\n    return helper()\n",
            ),
            (
                "app/b.py",
                "import requests\nfrom app.a import helper\n\ndef main():\n    helper()\n    helper()\n    requests.get('https://example.com')\n    print('done')\n\nif __name__ == '__main__':\n    main()\n",
            ),
        ])
    }

    /// Nine parseable modules plus one file that does not parse.
    pub fn nine_valid_one_broken() -> Self {
        let repo = Self::empty();
        for i in 0..9 {
            repo.write(
                &format!("pkg/mod_{i}.py"),
                &format!("def func_{i}():\n    return {i}\n"),
            );
        }
        repo.write("pkg/broken.py", "))) ((( ]]] ::: ))) ((( ]]] :::\n");
        repo
    }

    /// Two unrelated classes in different files each define `run`, and
    /// `main.py` calls `obj.run()` on a receiver of unknown type.
    pub fn ambiguous_methods() -> Self {
        Self::with_files(&[
            ("jobs.py", "class Job:\n    def run(self):\n        pass\n"),
            ("tasks.py", "class Task:\n    def run(self):\n        pass\n"),
            ("main.py", "def go(obj):\n    obj.run()\n"),
        ])
    }

    /// Mixed JavaScript / TypeScript / TSX web project with re-exports,
    /// JSX components and a third-party import.
    pub fn web_app() -> Self {
        Self::with_files(&[
            (
                "src/util/format.ts",
                "export function formatName(name: string): string {\n  return name.trim();\n}\n",
            ),
            ("src/util/index.ts", "export { formatName } from './format';\n"),
            (
                "src/components/Greeting.tsx",
                "import { formatName } from '../util';\n\nexport default function Greeting({ name }: { name: string }) {\n  return <p>{formatName(name)}</p>;\n}\n",
            ),
            (
                "src/App.tsx",
                "import React from 'react';\nimport Greeting from './components/Greeting';\n\nexport function App() {\n  React.useEffect(() => {}, []);\n  return <Greeting name=\"world\" />;\n}\n",
            ),
            (
                "src/legacy.js",
                "const format = require('./util/format');\nfunction shout(name) {\n  return format.formatName(name).toUpperCase();\n}\nmodule.exports = { shout };\n",
            ),
            ("node_modules/react/index.js", "export function useEffect() {}\n"),
        ])
    }
}

/// Run one ingest over `repo` with default config.
pub async fn ingest(
    repo: &Path,
    repository: &str,
    store: &dyn GraphStore,
) -> (anyhow::Result<RepositoryGraph>, IngestJob) {
    ingest_with(repo, store, &JobHandle::new(repository), RepographConfig::default()).await
}

/// Run one ingest with an explicit handle and config.
pub async fn ingest_with(
    repo: &Path,
    store: &dyn GraphStore,
    handle: &JobHandle,
    config: RepographConfig,
) -> (anyhow::Result<RepositoryGraph>, IngestJob) {
    let result = match IngestPipeline::new(config) {
        Ok(pipeline) => pipeline
            .ingest_directory(repo, store, handle, Arc::new(NoopReporter))
            .await
            .map_err(anyhow::Error::from),
        Err(e) => Err(e.into()),
    };
    (result, handle.snapshot())
}

/// The single edge from `caller` (qualified name) with the given callee text.
pub fn edge<'g>(graph: &'g RepositoryGraph, caller: &str, callee_text: &str) -> &'g CallEdge {
    let caller_id = &graph
        .find_by_qualified_name(caller)
        .unwrap_or_else(|| panic!("no function {caller}"))
        .id;
    let matches: Vec<_> = graph
        .edges
        .iter()
        .filter(|e| &e.caller == caller_id && e.callee_text == callee_text)
        .collect();
    assert_eq!(matches.len(), 1, "edges {caller} -> {callee_text}: {matches:?}");
    matches[0]
}

/// Id of the function with this qualified name.
pub fn id(graph: &RepositoryGraph, qualified_name: &str) -> String {
    graph
        .find_by_qualified_name(qualified_name)
        .unwrap_or_else(|| panic!("no function {qualified_name}"))
        .id
        .clone()
}
