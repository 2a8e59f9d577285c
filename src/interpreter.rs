use std::{cell::RefCell, fmt::Debug, rc::Rc};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    ast::NodeId,
    builtins::{Argument, Builtins},
    config::Config,
    ledger::{Ledger, Statement, StatementId},
    span::Span,
    tokenizer::{Token, TokenType},
};

/// Where a cacheable statement is in its evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Status {
    NotYetComputed,
    CurrentlyComputing,
    Cached(f32),
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Error executing statement `{current_statement}` (starting at {span}): {kind}")]
    Execution {
        kind: ExecutionErrorKind,
        current_statement: String,
        span: Span,
    },
}

impl ExecutionError {
    pub fn kind(&self) -> &ExecutionErrorKind {
        match self {
            ExecutionError::Execution { kind, .. } => kind,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionErrorKind {
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Circular definition of '{name}' at {span}")]
    CircularDefinition { name: String, span: Span },
    #[error("Undeclared identifier '{name}' at {span}")]
    UndeclaredIdentifier { name: String, span: Span },
    #[error("'{name}' at {span} is a function and has no value")]
    NotAValue { name: String, span: Span },
    #[error("'{name}' called with {found} arguments at {span}, expected {expected}")]
    InvalidFunctionCall {
        name: String,
        found: usize,
        expected: usize,
        span: Span,
    },
    #[error("Call depth exceeded {limit} at {span}")]
    CallDepthExceeded { limit: usize, span: Span },
    #[error("Evaluation nested deeper than {limit} levels at {span}")]
    EvaluationTooDeep { limit: usize, span: Span },
    #[error("\"{operator}\" at {span} has no value")]
    NotAnExpression { operator: TokenType, span: Span },
    #[error("Invalid number '{lexeme}' at {span}")]
    InvalidNumber { lexeme: String, span: Span },
    #[error("Assertion failed at {span}: expected {expected}, found {actual}")]
    AssertionFailed {
        expected: f32,
        actual: f32,
        span: Span,
    },
}

/// Demand-driven evaluator over a parsed [`Ledger`]. Results of expression
/// statements and variable declarations are computed at most once.
pub struct Interpreter<'l, 'a> {
    ledger: &'l Ledger<'a>,
    builtins: &'l Builtins,
    config: Config,
    cache: FxHashMap<StatementId, f32>,
    in_progress: FxHashSet<StatementId>,
    current: Vec<StatementId>,
    depth: usize,
    frames: usize,
    visits: usize,
    stdout: Rc<RefCell<dyn std::io::Write>>,
}

impl Debug for Interpreter<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("cache", &self.cache)
            .field("in_progress", &self.in_progress)
            .field("visits", &self.visits)
            .finish()
    }
}

impl<'l, 'a> Interpreter<'l, 'a> {
    pub fn new(
        ledger: &'l Ledger<'a>,
        builtins: &'l Builtins,
        stdout: Rc<RefCell<dyn std::io::Write>>,
    ) -> Self {
        Self {
            ledger,
            builtins,
            config: Config::default(),
            cache: FxHashMap::default(),
            in_progress: FxHashSet::default(),
            current: Vec::new(),
            depth: 0,
            frames: 0,
            visits: 0,
            stdout,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Syntax nodes walked so far. Stays put when a cached result is reused.
    pub fn visits(&self) -> usize {
        self.visits
    }

    pub fn status(&self, id: StatementId) -> Status {
        if let Some(value) = self.cache.get(&id) {
            Status::Cached(*value)
        } else if self.in_progress.contains(&id) {
            Status::CurrentlyComputing
        } else {
            Status::NotYetComputed
        }
    }

    /// Evaluates every statement in source order, writing one line per
    /// expression and per assertion.
    pub fn interpret(&mut self) -> Result<(), ExecutionError> {
        let ledger = self.ledger;
        for (id, statement) in ledger.statements() {
            let line = match (statement, self.evaluate(id)?) {
                (Statement::Expression { .. }, Some(value)) => {
                    format!("{} = {}", ledger.display(id), value)
                }
                (Statement::Assertion { .. }, Some(value)) => {
                    format!("{} passed ({})", ledger.display(id), value)
                }
                _ => continue,
            };
            writeln!(self.stdout.borrow_mut(), "{line}").map_err(|e| self.error_in(id, e.into()))?;
        }

        Ok(())
    }

    /// The value of an expression, variable or assertion subject. Function
    /// declarations have none until called.
    pub fn evaluate(&mut self, id: StatementId) -> Result<Option<f32>, ExecutionError> {
        let ledger = self.ledger;
        match ledger.statement(id) {
            Statement::Expression { root } => {
                if let Some(value) = self.cache.get(&id) {
                    tracing::trace!(index = id.index(), "reusing cached expression");
                    return Ok(Some(*value));
                }
                let value = self.within(id, |interpreter| interpreter.node(*root, &[]))?;
                self.cache.insert(id, value);
                Ok(Some(value))
            }
            Statement::VarDeclaration { .. } => self.variable(id, None).map(Some),
            Statement::FunctionDeclaration { .. } => Ok(None),
            Statement::Assertion {
                subject, expected, ..
            } => {
                let actual = self.evaluate(*subject)?.unwrap_or(f32::NAN);
                let expected_node = *expected;
                let tolerance = self.config.tolerance;
                self.within(id, |interpreter| {
                    let expected = interpreter.node(expected_node, &[])?;
                    if (expected - actual).abs() <= tolerance {
                        Ok(actual)
                    } else {
                        Err(interpreter.error(ExecutionErrorKind::AssertionFailed {
                            expected,
                            actual,
                            span: interpreter.ledger.tree().span(expected_node),
                        }))
                    }
                })
                .map(Some)
            }
        }
    }

    fn variable(
        &mut self,
        id: StatementId,
        reference: Option<Span>,
    ) -> Result<f32, ExecutionError> {
        let ledger = self.ledger;
        let Statement::VarDeclaration { name, value, .. } = ledger.statement(id) else {
            unreachable!("variable lookup returned a non-variable statement");
        };

        match self.status(id) {
            Status::Cached(value) => return Ok(value),
            Status::CurrentlyComputing => {
                return Err(self.error(ExecutionErrorKind::CircularDefinition {
                    name: name.to_string(),
                    span: reference.unwrap_or_else(|| ledger.span(id)),
                }))
            }
            Status::NotYetComputed => {}
        }

        tracing::debug!(name, "evaluating variable");
        self.in_progress.insert(id);
        let result = self.within(id, |interpreter| interpreter.node(*value, &[]));
        self.in_progress.remove(&id);

        let value = result?;
        self.cache.insert(id, value);
        Ok(value)
    }

    fn node(&mut self, id: NodeId<'a>, arguments: &[Argument<'a>]) -> Result<f32, ExecutionError> {
        let limit = self.config.max_evaluation_depth;
        if self.frames >= limit {
            let span = self.ledger.tree().node(id).token.span;
            return Err(self.error(ExecutionErrorKind::EvaluationTooDeep { limit, span }));
        }

        self.frames += 1;
        let result = self.visit(id, arguments);
        self.frames -= 1;
        result
    }

    fn visit(&mut self, id: NodeId<'a>, arguments: &[Argument<'a>]) -> Result<f32, ExecutionError> {
        self.visits += 1;
        let ledger = self.ledger;
        let tree = ledger.tree();
        let node = tree.node(id);
        let token = node.token;

        match (token.token_type, node.left, node.right) {
            (TokenType::Number, _, _) => token.lexeme.parse::<f32>().map_err(|_| {
                self.error(ExecutionErrorKind::InvalidNumber {
                    lexeme: token.lexeme.to_string(),
                    span: token.span,
                })
            }),
            (TokenType::Identifier, _, _) => self.identifier(&token, arguments),
            (TokenType::Plus, Some(a), Some(b)) => {
                Ok(self.node(a, arguments)? + self.node(b, arguments)?)
            }
            (TokenType::Minus, Some(a), Some(b)) => {
                Ok(self.node(a, arguments)? - self.node(b, arguments)?)
            }
            (TokenType::Minus, None, Some(x)) => Ok(-self.node(x, arguments)?),
            (TokenType::Star, Some(a), Some(b)) => {
                Ok(self.node(a, arguments)? * self.node(b, arguments)?)
            }
            (TokenType::Slash, Some(a), Some(b)) => {
                Ok(self.node(a, arguments)? / self.node(b, arguments)?)
            }
            (TokenType::Caret, Some(a), Some(b)) => {
                Ok(self.node(a, arguments)?.powf(self.node(b, arguments)?))
            }
            (TokenType::Bang, Some(x), None) => Ok(libm::tgammaf(self.node(x, arguments)? + 1.0)),
            (TokenType::Application, None, Some(inner)) => self.node(inner, arguments),
            (TokenType::Application, Some(callee), inner) => {
                self.application(callee, inner, arguments, &token)
            }
            (operator, _, _) => Err(self.error(ExecutionErrorKind::NotAnExpression {
                operator,
                span: token.span,
            })),
        }
    }

    fn identifier(
        &mut self,
        token: &Token<'a>,
        arguments: &[Argument<'a>],
    ) -> Result<f32, ExecutionError> {
        let name = token.lexeme;
        if let Some(argument) = arguments.iter().find(|a| a.name == Some(name)) {
            return Ok(argument.value);
        }
        if let Some(value) = self.builtins.constant(name) {
            return Ok(value);
        }
        if let Some(id) = self.ledger.variable(name) {
            return self.variable(id, Some(token.span));
        }

        let callable =
            self.builtins.function(name).is_some() || self.ledger.function(name).is_some();
        let kind = if callable {
            ExecutionErrorKind::NotAValue {
                name: name.to_string(),
                span: token.span,
            }
        } else {
            ExecutionErrorKind::UndeclaredIdentifier {
                name: name.to_string(),
                span: token.span,
            }
        };
        Err(self.error(kind))
    }

    /// `callee(inner)` is a call when `callee` names a function, otherwise a
    /// product.
    fn application(
        &mut self,
        callee: NodeId<'a>,
        inner: Option<NodeId<'a>>,
        arguments: &[Argument<'a>],
        token: &Token<'a>,
    ) -> Result<f32, ExecutionError> {
        let ledger = self.ledger;
        let callee_token = ledger.tree().node(callee).token;
        let name = callee_token.lexeme;
        let is_bound = arguments.iter().any(|a| a.name == Some(name));

        if callee_token.is(TokenType::Identifier) && !is_bound {
            if let Some(native) = self.builtins.function(name) {
                let values = self.arguments(inner, arguments)?;
                self.check_arity(name, values.len(), native.arity, callee_token.span)?;
                tracing::trace!(name, "calling builtin");
                return Ok(native.call(&values));
            }

            if let Some(id) = ledger.function(name) {
                return self.call(id, inner, arguments, callee_token.span);
            }
        }

        let Some(inner) = inner else {
            return Err(self.error(ExecutionErrorKind::NotAnExpression {
                operator: TokenType::Application,
                span: token.span,
            }));
        };
        Ok(self.node(callee, arguments)? * self.node(inner, arguments)?)
    }

    fn call(
        &mut self,
        id: StatementId,
        inner: Option<NodeId<'a>>,
        arguments: &[Argument<'a>],
        span: Span,
    ) -> Result<f32, ExecutionError> {
        let ledger = self.ledger;
        let Statement::FunctionDeclaration {
            name,
            parameters,
            body,
            ..
        } = ledger.statement(id)
        else {
            unreachable!("function lookup returned a non-function statement");
        };

        let values = self.arguments(inner, arguments)?;
        self.check_arity(name, values.len(), parameters.len(), span)?;
        if self.depth >= self.config.max_call_depth {
            return Err(self.error(ExecutionErrorKind::CallDepthExceeded {
                limit: self.config.max_call_depth,
                span,
            }));
        }

        let bound: Vec<Argument<'a>> = parameters
            .iter()
            .zip(values)
            .map(|(parameter, argument)| Argument {
                name: Some(*parameter),
                value: argument.value,
            })
            .collect();

        tracing::debug!(name, depth = self.depth, "calling function");
        self.depth += 1;
        let result = self.within(id, |interpreter| interpreter.node(*body, &bound));
        self.depth -= 1;
        result
    }

    /// Evaluates a comma chain left to right in the caller's bindings.
    fn arguments(
        &mut self,
        inner: Option<NodeId<'a>>,
        arguments: &[Argument<'a>],
    ) -> Result<Vec<Argument<'a>>, ExecutionError> {
        let elements = self.ledger.tree().list(inner);
        elements
            .into_iter()
            .map(|id| Ok(Argument::positional(self.node(id, arguments)?)))
            .collect()
    }

    fn check_arity(
        &self,
        name: &str,
        found: usize,
        expected: usize,
        span: Span,
    ) -> Result<(), ExecutionError> {
        if found == expected {
            return Ok(());
        }
        Err(self.error(ExecutionErrorKind::InvalidFunctionCall {
            name: name.to_string(),
            found,
            expected,
            span,
        }))
    }

    /// Runs `f` with `id` as the statement errors are reported against.
    fn within<T>(
        &mut self,
        id: StatementId,
        f: impl FnOnce(&mut Self) -> Result<T, ExecutionError>,
    ) -> Result<T, ExecutionError> {
        self.current.push(id);
        let result = f(self);
        self.current.pop();
        result
    }

    fn error(&self, kind: ExecutionErrorKind) -> ExecutionError {
        match self.current.last() {
            Some(id) => self.error_in(*id, kind),
            None => ExecutionError::Execution {
                kind,
                current_statement: String::new(),
                span: Span::default(),
            },
        }
    }

    fn error_in(&self, id: StatementId, kind: ExecutionErrorKind) -> ExecutionError {
        ExecutionError::Execution {
            kind,
            current_statement: self.ledger.display(id),
            span: self.ledger.span(id),
        }
    }
}
