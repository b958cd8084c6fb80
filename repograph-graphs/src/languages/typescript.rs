use crate::{Language, Result};

use super::{Extraction, LanguageAdapter, ParseLimits, ecma};

/// TypeScript and TSX. The two use different grammars: only TSX accepts JSX,
/// only plain TypeScript accepts `<T>expr` casts.
#[derive(Debug)]
pub struct TypeScriptAdapter;

impl LanguageAdapter for TypeScriptAdapter {
    fn languages(&self) -> &'static [Language] {
        &[Language::TypeScript, Language::Tsx]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ts", "mts", "cts", "tsx"]
    }

    fn tree_sitter_language(&self, language: Language) -> tree_sitter::Language {
        match language {
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            _ => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        }
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
    use crate::drafts::{CallHint, CallSiteDraft, DeclaredEntity, FunctionKind};

    fn extract_as(language: Language, source: &str) -> Extraction {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&TypeScriptAdapter.tree_sitter_language(language))
            .unwrap();
        let tree = parser.parse(source, None).unwrap();
        TypeScriptAdapter
            .extract(&tree, source, &ParseLimits::default())
            .unwrap()
    }

    fn calls_named<'a>(ex: &'a Extraction, text: &str) -> Vec<&'a CallSiteDraft> {
        ex.drafts
            .calls
            .iter()
            .filter(|c| c.callee_text == text)
            .collect()
    }

    #[test]
    fn extracts_typed_functions_and_classes() {
        let source = r"
import { Repository } from './repo';

export interface Store { save(): void; }

export abstract class Service<T> extends BaseService implements Store {
  private handler = (x: number): number => x;

  constructor(private repo: Repository) { super(); }

  save(): void { this.repo.persist(); }

  abstract load(): T;
}

export function make(repo: Repository): Service<number> {
  repo.persist();
  return null!;
}
";
        let ex = extract_as(Language::TypeScript, source);
        let paths: Vec<_> = ex
            .drafts
            .functions
            .iter()
            .map(|f| f.local_path.as_str())
            .collect();
        // Signatures without bodies are not functions.
        assert_eq!(
            paths,
            vec!["Service.handler", "Service.constructor", "Service.save", "make"]
        );

        let class = &ex.drafts.classes[0];
        assert_eq!(class.name, "Service");
        assert_eq!(class.bases, vec!["BaseService".to_string()]);
        assert!(matches!(ex.drafts.scope.get("Service"), Some(DeclaredEntity::Class(0))));

        let handler = &ex.drafts.functions[0];
        assert_eq!(handler.kind, FunctionKind::Arrow);
        assert_eq!(handler.class_path.as_deref(), Some("Service"));

        let persist = calls_named(&ex, "repo.persist");
        assert_eq!(persist.len(), 1);
        assert_eq!(persist[0].receiver_type.as_deref(), Some("Repository"));
        assert_eq!(calls_named(&ex, "this.repo.persist")[0].hint, CallHint::Attribute);
    }

    #[test]
    fn ambient_declarations_are_not_functions() {
        let source = "declare function greet(name: string): void;\nexport function run() { greet('x'); }\n";
        let ex = extract_as(Language::TypeScript, source);
        assert_eq!(ex.drafts.functions.len(), 1);
        assert_eq!(ex.drafts.functions[0].local_path, "run");
    }

    #[test]
    fn tsx_components() {
        let source = r"
import { Card } from './Card';

export const App = ({ title }: { title: string }) => {
  const [state] = useState(0);
  return <Card title={title}>{state}</Card>;
};
";
        let ex = extract_as(Language::Tsx, source);
        assert_eq!(ex.drafts.functions.len(), 1);
        assert_eq!(ex.drafts.functions[0].local_path, "App");
        assert_eq!(calls_named(&ex, "Card")[0].hint, CallHint::ImportedAlias);
        assert_eq!(calls_named(&ex, "useState")[0].hint, CallHint::Direct);
    }

    #[test]
    fn typescript_grammar_differs_from_tsx() {
        let cast = "function f(x: unknown) { return <string>x; }";
        let ts = extract_as(Language::TypeScript, cast);
        assert_eq!(ts.drafts.functions.len(), 1);
    }
}
