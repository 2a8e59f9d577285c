use crate::{
    ast::{NodeId, SyntaxTree},
    config::Config,
    span::Span,
    tokenizer::{Token, TokenType, TokenizeError, Tokenizer},
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    #[error("Expected \"{0}\"")]
    Expected(TokenType),
    #[error("Expected an expression")]
    ExpectedExpression,
    #[error("Unexpected \"{0}\"")]
    Unexpected(TokenType),
    #[error("Empty parentheses")]
    EmptyGroup,
    #[error("Expression nested deeper than {0} levels")]
    NestingTooDeep(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseErrorWithContext {
    pub error: ParseError,
    pub context: &'static str,
    pub found: Option<(TokenType, Span)>,
}

impl std::error::Error for ParseErrorWithContext {}

impl std::fmt::Display for ParseErrorWithContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "While parsing {}", self.context)?;
        write!(f, "{}", self.error)?;
        if let Some((token_type, span)) = &self.found {
            write!(f, " at {span} but found \"{token_type}\"")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Assert,      // ASSERT
    Assignment,  // =
    List,        // ,
    Term,        // + -
    Factor,      // * / and juxtaposition
    Application, // f(...)
    Power,       // ^
    Postfix,     // !
}

impl Precedence {
    pub fn lowest() -> Precedence {
        Precedence::Assert
    }

    fn higher(&self) -> Precedence {
        match self {
            Precedence::Assert => Precedence::Assignment,
            Precedence::Assignment => Precedence::List,
            Precedence::List => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Application,
            Precedence::Application => Precedence::Power,
            Precedence::Power => Precedence::Postfix,
            Precedence::Postfix => Precedence::Postfix,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Associativity {
    Left,
    Right,
}

fn infix_operator(token_type: TokenType) -> Option<(Precedence, Associativity)> {
    match token_type {
        TokenType::Caret => Some((Precedence::Power, Associativity::Right)),
        TokenType::Star | TokenType::Slash => Some((Precedence::Factor, Associativity::Left)),
        TokenType::Plus | TokenType::Minus => Some((Precedence::Term, Associativity::Left)),
        TokenType::Comma => Some((Precedence::List, Associativity::Right)),
        TokenType::Equal => Some((Precedence::Assignment, Associativity::Left)),
        _ => None,
    }
}

/// Precedence climbing over a token stream, allocating into a shared tree.
pub struct Parser<'a, 't> {
    tokenizer: Tokenizer<'a>,
    tree: &'t mut SyntaxTree<'a>,
    previous: Option<TokenType>,
    depth: usize,
    max_depth: usize,
}

impl<'a, 't> Parser<'a, 't> {
    pub fn new(source: &'a str, tree: &'t mut SyntaxTree<'a>) -> Self {
        Self {
            tokenizer: Tokenizer::new(source),
            tree,
            previous: None,
            depth: 0,
            max_depth: Config::default().max_nesting_depth,
        }
    }

    /// Bounds both parser recursion and the height of every tree it builds.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn tree(&self) -> &SyntaxTree<'a> {
        self.tree
    }

    pub fn is_at_end(&self) -> Result<bool, ParseErrorWithContext> {
        Ok(self.peek("program")?.is(TokenType::Eof))
    }

    /// Parses `expr ;`. Returns `None` once the stream is exhausted.
    pub fn statement(&mut self) -> Result<Option<NodeId<'a>>, ParseErrorWithContext> {
        if self.is_at_end()? {
            return Ok(None);
        }

        let root = self.operand(Precedence::lowest(), "statement")?;
        if let Err(e) = self.consume(TokenType::Semicolon, "statement") {
            self.tree.release(root);
            return Err(e);
        }
        Ok(Some(root))
    }

    /// `None` means no expression starts here, which is how statement
    /// terminators and closing parentheses are detected.
    pub fn parse_expression(
        &mut self,
        min_precedence: Precedence,
    ) -> Result<Option<NodeId<'a>>, ParseErrorWithContext> {
        if self.depth >= self.max_depth {
            let token = self.peek("expression")?;
            return Err(self.too_deep(&token));
        }

        self.depth += 1;
        let result = self.expression(min_precedence);
        self.depth -= 1;
        result
    }

    fn expression(
        &mut self,
        min_precedence: Precedence,
    ) -> Result<Option<NodeId<'a>>, ParseErrorWithContext> {
        let token = self.peek("expression")?;
        let mut expr = match token.token_type {
            TokenType::Minus => {
                self.advance("expression")?;
                let operand = self.operand(Precedence::Factor.higher(), "negation")?;
                self.tree.add(token, None, Some(operand))
            }
            TokenType::Assert if Precedence::Assert >= min_precedence => {
                self.advance("expression")?;
                let operand = self.operand(Precedence::Assert, "assertion")?;
                self.tree.add(token, None, Some(operand))
            }
            TokenType::LeftParen => {
                self.advance("expression")?;
                let inner = match self.group()? {
                    Some(inner) => inner,
                    None => return Err(self.error_at(ParseError::EmptyGroup, "group", &token)),
                };
                self.tree.add(
                    Token::synthesized(TokenType::Application, &token),
                    None,
                    Some(inner),
                )
            }
            TokenType::Number | TokenType::Identifier => {
                self.advance("expression")?;
                self.tree.leaf(token)
            }
            _ => return Ok(None),
        };
        self.check_height(expr, &token)?;

        loop {
            let token = self.peek("expression")?;
            expr = match token.token_type {
                TokenType::Bang => {
                    if Precedence::Postfix < min_precedence {
                        break;
                    }
                    self.advance("expression")?;
                    self.tree.add(token, Some(expr), None)
                }
                TokenType::LeftParen => {
                    if Precedence::Application < min_precedence {
                        break;
                    }
                    self.advance("expression")?;
                    let inner = self.group()?;
                    self.tree.add(
                        Token::synthesized(TokenType::Application, &token),
                        Some(expr),
                        inner,
                    )
                }
                TokenType::Number | TokenType::Identifier => {
                    if Precedence::Factor < min_precedence {
                        break;
                    }
                    if token.is(TokenType::Number) && self.previous == Some(TokenType::Number) {
                        return Err(self.error_at(
                            ParseError::Unexpected(TokenType::Number),
                            "expression",
                            &token,
                        ));
                    }
                    let right = self.operand(Precedence::Factor.higher(), "implicit product")?;
                    self.tree.add(
                        Token::synthesized(TokenType::Star, &token),
                        Some(expr),
                        Some(right),
                    )
                }
                TokenType::Semicolon | TokenType::RightParen | TokenType::Eof => break,
                token_type => {
                    let Some((precedence, associativity)) = infix_operator(token_type) else {
                        return Err(self.error_at(
                            ParseError::Unexpected(token_type),
                            "expression",
                            &token,
                        ));
                    };
                    if precedence < min_precedence {
                        break;
                    }
                    self.advance("expression")?;
                    let next = match associativity {
                        Associativity::Left => precedence.higher(),
                        Associativity::Right => precedence,
                    };
                    let right = self.operand(next, "binary operator")?;
                    self.tree.add(token, Some(expr), Some(right))
                }
            };
            self.check_height(expr, &token)?;
        }

        Ok(Some(expr))
    }

    fn operand(
        &mut self,
        min_precedence: Precedence,
        context: &'static str,
    ) -> Result<NodeId<'a>, ParseErrorWithContext> {
        match self.parse_expression(min_precedence)? {
            Some(expr) => Ok(expr),
            None => {
                let token = self.peek(context)?;
                Err(self.error_at(ParseError::ExpectedExpression, context, &token))
            }
        }
    }

    /// Everything after a `(` up to and including the matching `)`.
    fn group(&mut self) -> Result<Option<NodeId<'a>>, ParseErrorWithContext> {
        let inner = self.parse_expression(Precedence::Assignment)?;
        self.consume(TokenType::RightParen, "group")?;
        Ok(inner)
    }

    /// Left-leaning chains grow the tree without recursing, so height is
    /// checked separately from `depth`.
    fn check_height(
        &self,
        expr: NodeId<'a>,
        token: &Token<'_>,
    ) -> Result<(), ParseErrorWithContext> {
        if self.tree.node(expr).height > self.max_depth {
            return Err(self.too_deep(token));
        }
        Ok(())
    }

    fn too_deep(&self, token: &Token<'_>) -> ParseErrorWithContext {
        self.error_at(ParseError::NestingTooDeep(self.max_depth), "expression", token)
    }

    fn peek(&self, context: &'static str) -> Result<Token<'a>, ParseErrorWithContext> {
        self.tokenizer.peek().map_err(|e| ParseErrorWithContext {
            error: e.into(),
            context,
            found: None,
        })
    }

    fn advance(&mut self, context: &'static str) -> Result<Token<'a>, ParseErrorWithContext> {
        let token = self.tokenizer.token().map_err(|e| ParseErrorWithContext {
            error: e.into(),
            context,
            found: None,
        })?;
        self.previous = Some(token.token_type);
        Ok(token)
    }

    fn consume(
        &mut self,
        token_type: TokenType,
        context: &'static str,
    ) -> Result<Token<'a>, ParseErrorWithContext> {
        let token = self.peek(context)?;
        if !token.is(token_type) {
            return Err(self.error_at(ParseError::Expected(token_type), context, &token));
        }
        self.advance(context)
    }

    fn error_at(
        &self,
        error: ParseError,
        context: &'static str,
        token: &Token<'_>,
    ) -> ParseErrorWithContext {
        ParseErrorWithContext {
            error,
            context,
            found: Some((token.token_type, token.span)),
        }
    }
}
