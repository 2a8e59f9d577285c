use rustc_hash::FxHashMap;

use crate::{
    ast::{NodeId, SyntaxTree},
    builtins::Builtins,
    config::Config,
    parser::{ParseErrorWithContext, Parser},
    span::Span,
    tokenizer::TokenType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(usize);

impl StatementId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement<'a> {
    /// Checks the statement right before it against `expected`.
    Assertion {
        root: NodeId<'a>,
        subject: StatementId,
        expected: NodeId<'a>,
    },
    Expression {
        root: NodeId<'a>,
    },
    VarDeclaration {
        root: NodeId<'a>,
        name: &'a str,
        value: NodeId<'a>,
    },
    FunctionDeclaration {
        root: NodeId<'a>,
        name: &'a str,
        parameters: Vec<&'a str>,
        body: NodeId<'a>,
    },
}

impl<'a> Statement<'a> {
    pub fn root(&self) -> NodeId<'a> {
        match self {
            Statement::Assertion { root, .. }
            | Statement::Expression { root }
            | Statement::VarDeclaration { root, .. }
            | Statement::FunctionDeclaration { root, .. } => *root,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Assertion { .. } => "assertion",
            Statement::Expression { .. } => "expression",
            Statement::VarDeclaration { .. } => "variable declaration",
            Statement::FunctionDeclaration { .. } => "function declaration",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Parse(#[from] ParseErrorWithContext),
    #[error("Duplicate declaration of '{name}' at {span}")]
    DuplicateDeclaration { name: String, span: Span },
    #[error("'{name}' at {span} is a builtin and cannot be redeclared")]
    BuiltinRedeclaration { name: String, span: Span },
    #[error("Invalid parameter '{text}' at {span}")]
    InvalidParameter { text: String, span: Span },
    #[error("Duplicate parameter '{name}' at {span}")]
    DuplicateParameter { name: String, span: Span },
    #[error("ASSERT at {span} has no statement before it to check")]
    MissingAssertionSubject { span: Span },
    #[error("ASSERT at {span} cannot check a {kind}")]
    InvalidAssertionSubject { kind: &'static str, span: Span },
    #[error("Program exceeds the capacity of {capacity} statements at {span}")]
    CapacityExceeded { capacity: usize, span: Span },
}

/// Every top-level statement of a program, in source order, together with
/// the tree their syntax lives in.
#[derive(Debug)]
pub struct Ledger<'a> {
    tree: SyntaxTree<'a>,
    statements: Vec<Statement<'a>>,
    declarations: FxHashMap<&'a str, StatementId>,
}

impl<'a> Ledger<'a> {
    pub fn parse(
        source: &'a str,
        builtins: &Builtins,
        config: &Config,
    ) -> Result<Self, LedgerError> {
        let mut tree = SyntaxTree::new();
        let mut statements = Vec::new();
        let mut declarations = FxHashMap::default();

        let mut parser = Parser::new(source, &mut tree).with_max_depth(config.max_nesting_depth);
        while let Some(root) = parser.statement()? {
            let tree = parser.tree();
            if statements.len() == config.capacity {
                return Err(LedgerError::CapacityExceeded {
                    capacity: config.capacity,
                    span: tree.span(root),
                });
            }

            let statement = classify(tree, root, &statements)?;
            if let Some((name, span)) = declared_name(tree, &statement) {
                if builtins.contains(name) {
                    return Err(LedgerError::BuiltinRedeclaration {
                        name: name.to_string(),
                        span,
                    });
                }
                if declarations.contains_key(name) {
                    return Err(LedgerError::DuplicateDeclaration {
                        name: name.to_string(),
                        span,
                    });
                }
                declarations.insert(name, StatementId(statements.len()));
            }

            tracing::debug!(
                index = statements.len(),
                kind = statement.kind(),
                statement = %tree.infix(root),
                "classified statement"
            );
            statements.push(statement);
        }

        Ok(Self {
            tree,
            statements,
            declarations,
        })
    }

    pub fn tree(&self) -> &SyntaxTree<'a> {
        &self.tree
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn statement(&self, id: StatementId) -> &Statement<'a> {
        &self.statements[id.0]
    }

    pub fn statements(&self) -> impl Iterator<Item = (StatementId, &Statement<'a>)> {
        self.statements
            .iter()
            .enumerate()
            .map(|(index, statement)| (StatementId(index), statement))
    }

    pub fn variable(&self, name: &str) -> Option<StatementId> {
        self.declarations
            .get(name)
            .copied()
            .filter(|id| matches!(self.statement(*id), Statement::VarDeclaration { .. }))
    }

    pub fn function(&self, name: &str) -> Option<StatementId> {
        self.declarations
            .get(name)
            .copied()
            .filter(|id| matches!(self.statement(*id), Statement::FunctionDeclaration { .. }))
    }

    /// Source text of the statement, fully parenthesized.
    pub fn display(&self, id: StatementId) -> String {
        self.tree.infix(self.statement(id).root()).to_string()
    }

    pub fn span(&self, id: StatementId) -> Span {
        self.tree.span(self.statement(id).root())
    }

    /// Releases every statement's syntax and returns how many nodes are still
    /// live, which is zero unless something leaked.
    pub fn teardown(mut self) -> usize {
        for statement in self.statements.drain(..) {
            self.tree.release(statement.root());
        }
        self.tree.live()
    }
}

fn classify<'a>(
    tree: &SyntaxTree<'a>,
    root: NodeId<'a>,
    previous: &[Statement<'a>],
) -> Result<Statement<'a>, LedgerError> {
    let node = tree.node(root);
    match (node.token.token_type, node.left, node.right) {
        (TokenType::Assert, _, Some(expected)) => {
            let span = node.token.span;
            let Some(subject) = previous.len().checked_sub(1) else {
                return Err(LedgerError::MissingAssertionSubject { span });
            };
            match &previous[subject] {
                Statement::Expression { .. } | Statement::VarDeclaration { .. } => {
                    Ok(Statement::Assertion {
                        root,
                        subject: StatementId(subject),
                        expected,
                    })
                }
                other => Err(LedgerError::InvalidAssertionSubject {
                    kind: other.kind(),
                    span,
                }),
            }
        }
        (TokenType::Equal, Some(target), Some(value)) => {
            let target_node = tree.node(target);
            match (target_node.token.token_type, target_node.left) {
                (TokenType::Identifier, _) => Ok(Statement::VarDeclaration {
                    root,
                    name: target_node.token.lexeme,
                    value,
                }),
                (TokenType::Application, Some(callee))
                    if tree.node(callee).token.is(TokenType::Identifier) =>
                {
                    Ok(Statement::FunctionDeclaration {
                        root,
                        name: tree.node(callee).token.lexeme,
                        parameters: parameters(tree, target_node.right)?,
                        body: value,
                    })
                }
                _ => Ok(Statement::Expression { root }),
            }
        }
        _ => Ok(Statement::Expression { root }),
    }
}

fn parameters<'a>(
    tree: &SyntaxTree<'a>,
    list: Option<NodeId<'a>>,
) -> Result<Vec<&'a str>, LedgerError> {
    let mut names: Vec<&'a str> = Vec::new();
    for id in tree.list(list) {
        let node = tree.node(id);
        if !node.token.is(TokenType::Identifier) || !node.is_leaf() {
            return Err(LedgerError::InvalidParameter {
                text: tree.infix(id).to_string(),
                span: tree.span(id),
            });
        }
        if names.contains(&node.token.lexeme) {
            return Err(LedgerError::DuplicateParameter {
                name: node.token.lexeme.to_string(),
                span: node.token.span,
            });
        }
        names.push(node.token.lexeme);
    }
    Ok(names)
}

fn declared_name<'a>(tree: &SyntaxTree<'a>, statement: &Statement<'a>) -> Option<(&'a str, Span)> {
    match statement {
        Statement::VarDeclaration { name, root, .. }
        | Statement::FunctionDeclaration { name, root, .. } => {
            let target = tree.node(*root).left?;
            Some((*name, tree.span(target)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParseError;

    fn ledger(source: &str) -> Result<Ledger<'_>, LedgerError> {
        Ledger::parse(source, &Builtins::standard(), &Config::default())
    }

    fn kinds(source: &str) -> Vec<&'static str> {
        ledger(source)
            .unwrap()
            .statements()
            .map(|(_, statement)| statement.kind())
            .collect()
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            kinds("x = 5; f(a, b) = a*b; g() = 1; 2x; ASSERT 10; (x) = 3;"),
            vec![
                "variable declaration",
                "function declaration",
                "function declaration",
                "expression",
                "assertion",
                "expression",
            ]
        );
    }

    #[test]
    fn test_function_parameters() {
        let ledger = ledger("f(a, b, c) = a + b + c; g(x) = x; h() = 2;").unwrap();
        let parameters: Vec<Vec<&str>> = ledger
            .statements()
            .map(|(_, statement)| match statement {
                Statement::FunctionDeclaration { parameters, .. } => parameters.clone(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(parameters, vec![vec!["a", "b", "c"], vec!["x"], vec![]]);
    }

    #[test]
    fn test_assertion_binds_previous_statement() {
        let ledger = ledger("1; 2 + 2; ASSERT 4;").unwrap();
        let (_, assertion) = ledger.statements().last().unwrap();
        match assertion {
            Statement::Assertion { subject, .. } => assert_eq!(subject.index(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_lookup_by_kind() {
        let ledger = ledger("x = 1; f(a) = a;").unwrap();
        assert_eq!(ledger.variable("x").map(StatementId::index), Some(0));
        assert_eq!(ledger.variable("f"), None);
        assert_eq!(ledger.function("f").map(StatementId::index), Some(1));
        assert_eq!(ledger.function("y"), None);
    }

    #[test]
    fn test_duplicate_declarations() {
        assert!(matches!(
            ledger("x = 1; x = 2;"),
            Err(LedgerError::DuplicateDeclaration { name, .. }) if name == "x"
        ));
        assert!(matches!(
            ledger("f(a) = a; f = 2;"),
            Err(LedgerError::DuplicateDeclaration { name, .. }) if name == "f"
        ));
        assert!(matches!(
            ledger("pi = 3;"),
            Err(LedgerError::BuiltinRedeclaration { name, .. }) if name == "pi"
        ));
        assert!(matches!(
            ledger("sin(x) = x;"),
            Err(LedgerError::BuiltinRedeclaration { name, .. }) if name == "sin"
        ));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            ledger("f(a, 2) = a;"),
            Err(LedgerError::InvalidParameter { text, .. }) if text == "2"
        ));
        assert!(matches!(
            ledger("f(a, a) = a;"),
            Err(LedgerError::DuplicateParameter { name, .. }) if name == "a"
        ));
    }

    #[test]
    fn test_assertion_subjects() {
        assert!(matches!(
            ledger("ASSERT 1;"),
            Err(LedgerError::MissingAssertionSubject { .. })
        ));
        assert!(matches!(
            ledger("f(a) = a; ASSERT 1;"),
            Err(LedgerError::InvalidAssertionSubject { kind: "function declaration", .. })
        ));
        assert!(matches!(
            ledger("1; ASSERT 1; ASSERT 1;"),
            Err(LedgerError::InvalidAssertionSubject { kind: "assertion", .. })
        ));
    }

    #[test]
    fn test_capacity() {
        let config = Config {
            capacity: 2,
            ..Config::default()
        };
        assert!(Ledger::parse("1; 2;", &Builtins::standard(), &config).is_ok());
        assert!(matches!(
            Ledger::parse("1; 2; 3;", &Builtins::standard(), &config),
            Err(LedgerError::CapacityExceeded { capacity: 2, .. })
        ));
    }

    #[test]
    fn test_parse_errors_propagate() {
        assert!(matches!(ledger("1 + ;"), Err(LedgerError::Parse(_))));
    }

    #[test]
    fn test_nesting_depth_follows_config() {
        let source = format!("{}1{};", "(".repeat(3_000), ")".repeat(3_000));
        let error = ledger(&source).unwrap_err();
        assert!(
            matches!(&error, LedgerError::Parse(e) if e.error == ParseError::NestingTooDeep(256)),
            "{error}"
        );

        let config = Config {
            max_nesting_depth: 8,
            ..Config::default()
        };
        assert!(Ledger::parse("((((1))));", &Builtins::standard(), &config).is_ok());
        assert!(matches!(
            Ledger::parse("((((((((1))))))));", &Builtins::standard(), &config),
            Err(LedgerError::Parse(e)) if e.error == ParseError::NestingTooDeep(8)
        ));
    }

    #[test]
    fn test_teardown_releases_every_node() {
        let ledger = ledger("x = 5; f(a, b) = a*b + 1; f(2, 3); 2x!; ASSERT 240;").unwrap();
        assert!(ledger.tree().live() > 0);
        assert_eq!(ledger.teardown(), 0);
    }

    #[test]
    fn test_empty_program() {
        let ledger = ledger("  // nothing here\n").unwrap();
        assert!(ledger.is_empty());
    }
}
