use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Single-character tokens
    Semicolon,
    LeftParen,
    RightParen,
    Equal,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Bang,

    // Literals
    Identifier,
    Number,

    // Keywords
    Assert,

    // Synthesized by the parser for `callee(...)` and `(...)`
    Application,

    // End of file
    Eof,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TokenType::Semicolon => ";",
            TokenType::LeftParen => "(",
            TokenType::RightParen => ")",
            TokenType::Equal => "=",
            TokenType::Comma => ",",
            TokenType::Plus => "+",
            TokenType::Minus => "-",
            TokenType::Star => "*",
            TokenType::Slash => "/",
            TokenType::Caret => "^",
            TokenType::Bang => "!",
            TokenType::Identifier => "identifier",
            TokenType::Number => "number",
            TokenType::Assert => "ASSERT",
            TokenType::Application => "()",
            TokenType::Eof => "end of file",
        };
        write!(f, "{text}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'a> {
    pub token_type: TokenType,
    pub lexeme: &'a str,
    pub span: Span,
}

impl<'a> Token<'a> {
    /// A token the parser invents, borrowing the text of the token that caused it.
    pub fn synthesized(token_type: TokenType, from: &Token<'a>) -> Self {
        Self {
            token_type,
            lexeme: from.lexeme,
            span: from.span,
        }
    }

    pub fn is(&self, token_type: TokenType) -> bool {
        self.token_type == token_type
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TokenizeError {
    #[error("Unrecognized token '{character}' at {span}")]
    UnexpectedCharacter { character: char, span: Span },
    #[error("Malformed number '{lexeme}' at {span}")]
    MalformedNumber { lexeme: String, span: Span },
    #[error("Unterminated block comment starting at {span}")]
    UnterminatedComment { span: Span },
}

const LITERALS: &[(&str, TokenType)] = &[
    (";", TokenType::Semicolon),
    ("=", TokenType::Equal),
    (",", TokenType::Comma),
    ("+", TokenType::Plus),
    ("-", TokenType::Minus),
    ("*", TokenType::Star),
    ("/", TokenType::Slash),
    ("^", TokenType::Caret),
    ("!", TokenType::Bang),
    ("(", TokenType::LeftParen),
    (")", TokenType::RightParen),
    ("ASSERT", TokenType::Assert),
];

/// Cursor over a source buffer. Cloning it is how lookahead is done.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    source: &'a str,
    current: usize,
    line: usize,
    column: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            current: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn token(&mut self) -> Result<Token<'a>, TokenizeError> {
        self.skip_trivia()?;

        let rest = &self.source[self.current..];
        if rest.is_empty() {
            return Ok(Token {
                token_type: TokenType::Eof,
                lexeme: rest,
                span: self.span_of(0),
            });
        }

        let (token_type, len) = match maximal(rest) {
            Some(found) => found,
            None => {
                let character = rest.chars().next().unwrap_or_default();
                return Err(TokenizeError::UnexpectedCharacter {
                    character,
                    span: self.span_of(character.len_utf8()),
                });
            }
        };

        let token = Token {
            token_type,
            lexeme: &rest[..len],
            span: self.span_of(len),
        };

        if token_type == TokenType::Number {
            validate_number(&token)?;
        }

        self.advance(len);
        Ok(token)
    }

    pub fn peek(&self) -> Result<Token<'a>, TokenizeError> {
        self.clone().token()
    }

    pub fn tokens(mut self) -> Result<Vec<Token<'a>>, TokenizeError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.token()?;
            let done = token.is(TokenType::Eof);
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn skip_trivia(&mut self) -> Result<(), TokenizeError> {
        loop {
            let rest = &self.source[self.current..];
            let len = match rest.as_bytes() {
                [b' ' | b'\t' | b'\r' | b'\n', ..] => 1,
                [b'/', b'/', ..] => rest.find('\n').unwrap_or(rest.len()),
                [b'/', b'*', ..] => match rest[2..].find("*/") {
                    Some(end) => end + 4,
                    None => {
                        return Err(TokenizeError::UnterminatedComment {
                            span: self.span_of(2),
                        })
                    }
                },
                _ => return Ok(()),
            };
            self.advance(len);
        }
    }

    fn advance(&mut self, len: usize) {
        for c in self.source[self.current..self.current + len].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.current += len;
    }

    fn span_of(&self, len: usize) -> Span {
        Span {
            start_line: self.line,
            start_column: self.column,
            end_line: self.line,
            end_column: self.column + len,
        }
    }
}

/// Longest match over every token shape. Ties go to the earlier candidate, so
/// `ASSERT` is a keyword while `ASSERTED` is an identifier.
fn maximal(source: &str) -> Option<(TokenType, usize)> {
    let candidates = LITERALS
        .iter()
        .filter(|(word, _)| source.starts_with(word))
        .map(|(word, token_type)| (*token_type, word.len()))
        .chain(number(source).map(|len| (TokenType::Number, len)))
        .chain(identifier(source).map(|len| (TokenType::Identifier, len)));

    let mut best: Option<(TokenType, usize)> = None;
    for (token_type, len) in candidates {
        if best.map_or(true, |(_, best_len)| len > best_len) {
            best = Some((token_type, len));
        }
    }
    best
}

fn identifier(source: &str) -> Option<usize> {
    let bytes = source.as_bytes();
    let first = *bytes.first()?;
    if !first.is_ascii_alphabetic() && first != b'_' {
        return None;
    }

    Some(
        1 + bytes[1..]
            .iter()
            .take_while(|c| c.is_ascii_alphanumeric() || **c == b'_')
            .count(),
    )
}

/// Digits with `.` anywhere. Stops before the third component of `1.2.3` so
/// the caller can reject it.
fn number(source: &str) -> Option<usize> {
    let bytes = source.as_bytes();
    let first = *bytes.first()?;
    if !first.is_ascii_digit() && first != b'.' {
        return None;
    }

    Some(
        bytes
            .iter()
            .take_while(|c| c.is_ascii_digit() || **c == b'.')
            .count(),
    )
}

fn validate_number(token: &Token<'_>) -> Result<(), TokenizeError> {
    let decimals = token.lexeme.bytes().filter(|c| *c == b'.').count();
    if decimals > 1 || token.lexeme == "." {
        return Err(TokenizeError::MalformedNumber {
            lexeme: token.lexeme.to_string(),
            span: token.span,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(source: &str) -> Vec<TokenType> {
        Tokenizer::new(source)
            .tokens()
            .unwrap()
            .into_iter()
            .map(|token| token.token_type)
            .collect()
    }

    #[test]
    fn test_tokens() {
        let source = "x = 1;";
        let expected = vec![
            TokenType::Identifier,
            TokenType::Equal,
            TokenType::Number,
            TokenType::Semicolon,
            TokenType::Eof,
        ];
        assert_eq!(types(source), expected);
    }

    #[test]
    fn test_tokens_with_comments() {
        let source = "x = 1; // comment\n/* block\n comment */ y";
        let expected = vec![
            TokenType::Identifier,
            TokenType::Equal,
            TokenType::Number,
            TokenType::Semicolon,
            TokenType::Identifier,
            TokenType::Eof,
        ];
        assert_eq!(types(source), expected);
    }

    #[test]
    fn test_lexemes_borrow_source() {
        let source = "f(a_1, .5) ^ 2.25!";
        let tokens = Tokenizer::new(source).tokens().unwrap();
        let lexemes: Vec<&str> = tokens.iter().map(|t| t.lexeme).collect();
        assert_eq!(
            lexemes,
            vec!["f", "(", "a_1", ",", ".5", ")", "^", "2.25", "!", ""]
        );
    }

    #[test]
    fn test_assert_keyword() {
        assert_eq!(
            types("ASSERT ASSERTED"),
            vec![TokenType::Assert, TokenType::Identifier, TokenType::Eof]
        );
    }

    #[test]
    fn test_adjacent_number_and_identifier() {
        assert_eq!(
            types("2x"),
            vec![TokenType::Number, TokenType::Identifier, TokenType::Eof]
        );
    }

    #[test]
    fn test_second_decimal_point() {
        let err = Tokenizer::new("1.2.3").tokens().unwrap_err();
        assert!(matches!(err, TokenizeError::MalformedNumber { lexeme, .. } if lexeme == "1.2.3"));
    }

    #[test]
    fn test_unrecognized_character() {
        let err = Tokenizer::new("x = 1 # 2;").tokens().unwrap_err();
        assert_eq!(
            err,
            TokenizeError::UnexpectedCharacter {
                character: '#',
                span: Span {
                    start_line: 1,
                    start_column: 7,
                    end_line: 1,
                    end_column: 8,
                },
            }
        );
    }

    #[test]
    fn test_unterminated_comment() {
        let err = Tokenizer::new("1; /* never closed").tokens().unwrap_err();
        assert!(matches!(err, TokenizeError::UnterminatedComment { .. }));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut tokenizer = Tokenizer::new("a b");
        assert_eq!(tokenizer.peek().unwrap().lexeme, "a");
        assert_eq!(tokenizer.token().unwrap().lexeme, "a");
        assert_eq!(tokenizer.token().unwrap().lexeme, "b");
        assert!(tokenizer.token().unwrap().is(TokenType::Eof));
    }

    #[test]
    fn test_line_tracking() {
        let tokens = Tokenizer::new("a\n  b").tokens().unwrap();
        assert_eq!(tokens[1].span.start_line, 2);
        assert_eq!(tokens[1].span.start_column, 3);
    }
}
