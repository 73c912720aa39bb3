//! Tokenizer.

use super::{FrontendError, Span};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    Int,
    Bool,
    If,
    Else,
    While,
    For,
    Break,
    Continue,
    Return,
    True,
    False,

    Ident(String),
    Number(i32),

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    Semi,
    Question,
    Colon,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    Amp,
    Pipe,
    Caret,
    AmpAmp,
    PipePipe,
    Bang,
    Tilde,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    ShlAssign,
    ShrAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    PlusPlus,
    MinusMinus,

    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Operators sorted so that longer spellings are tried first.
const OPERATORS: &[(&str, TokenKind)] = &[
    ("<<=", TokenKind::ShlAssign),
    (">>=", TokenKind::ShrAssign),
    ("<<", TokenKind::Shl),
    (">>", TokenKind::Shr),
    ("<=", TokenKind::Le),
    (">=", TokenKind::Ge),
    ("==", TokenKind::EqEq),
    ("!=", TokenKind::Ne),
    ("&&", TokenKind::AmpAmp),
    ("||", TokenKind::PipePipe),
    ("+=", TokenKind::PlusAssign),
    ("-=", TokenKind::MinusAssign),
    ("*=", TokenKind::StarAssign),
    ("/=", TokenKind::SlashAssign),
    ("%=", TokenKind::PercentAssign),
    ("&=", TokenKind::AmpAssign),
    ("|=", TokenKind::PipeAssign),
    ("^=", TokenKind::CaretAssign),
    ("++", TokenKind::PlusPlus),
    ("--", TokenKind::MinusMinus),
    ("(", TokenKind::LParen),
    (")", TokenKind::RParen),
    ("{", TokenKind::LBrace),
    ("}", TokenKind::RBrace),
    (";", TokenKind::Semi),
    ("?", TokenKind::Question),
    (":", TokenKind::Colon),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("%", TokenKind::Percent),
    ("<", TokenKind::Lt),
    (">", TokenKind::Gt),
    ("&", TokenKind::Amp),
    ("|", TokenKind::Pipe),
    ("^", TokenKind::Caret),
    ("!", TokenKind::Bang),
    ("~", TokenKind::Tilde),
    ("=", TokenKind::Assign),
];

/// Split `source` into tokens, ending with `Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, FrontendError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    text: &'a str,
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, FrontendError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let span = self.span();
            let Some(ch) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    span,
                });
                return Ok(tokens);
            };

            let kind = if ch.is_ascii_alphabetic() || ch == '_' {
                self.read_word()
            } else if ch.is_ascii_digit() {
                self.read_number(span)?
            } else {
                self.read_operator(span)?
            };
            tokens.push(Token { kind, span });
        }
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.column)
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.peek() {
            self.pos += ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn advance_by(&mut self, count: usize) {
        for _ in 0..count {
            self.advance();
        }
    }

    fn error(span: Span, message: impl Into<String>) -> FrontendError {
        FrontendError::Lex {
            span,
            message: message.into(),
        }
    }

    /// Skip whitespace, line comments and block comments.
    fn skip_trivia(&mut self) -> Result<(), FrontendError> {
        loop {
            let rest = self.rest();
            if rest.starts_with("//") {
                while let Some(ch) = self.peek() {
                    self.advance();
                    if ch == '\n' {
                        break;
                    }
                }
            } else if rest.starts_with("/*") {
                let start = self.span();
                self.advance_by(2);
                loop {
                    if self.rest().starts_with("*/") {
                        self.advance_by(2);
                        break;
                    }
                    if self.peek().is_none() {
                        return Err(Self::error(start, "unterminated block comment"));
                    }
                    self.advance();
                }
            } else if self.peek().is_some_and(char::is_whitespace) {
                self.advance();
            } else {
                return Ok(());
            }
        }
    }

    fn read_word(&mut self) -> TokenKind {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        {
            self.advance();
        }
        match &self.text[start..self.pos] {
            "int" => TokenKind::Int,
            "bool" => TokenKind::Bool,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "return" => TokenKind::Return,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            word => TokenKind::Ident(word.to_string()),
        }
    }

    fn read_number(&mut self, span: Span) -> Result<TokenKind, FrontendError> {
        let rest = self.rest();
        if rest.starts_with("0x") || rest.starts_with("0X") {
            self.advance_by(2);
            let start = self.pos;
            while self.peek().is_some_and(|ch| ch.is_ascii_hexdigit()) {
                self.advance();
            }
            let digits = &self.text[start..self.pos];
            self.reject_trailing_word(span)?;
            if digits.is_empty() {
                return Err(Self::error(span, "hex literal without digits"));
            }
            let value = u32::from_str_radix(digits, 16)
                .map_err(|_| Self::error(span, format!("hex literal 0x{digits} out of range")))?;
            return Ok(TokenKind::Number(value as i32));
        }

        let start = self.pos;
        while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            self.advance();
        }
        let digits = &self.text[start..self.pos];
        self.reject_trailing_word(span)?;
        if digits.len() > 1 && digits.starts_with('0') {
            return Err(Self::error(
                span,
                format!("decimal literal {digits} has a leading zero"),
            ));
        }
        match digits.parse::<u64>() {
            // 2^31 is only meaningful under unary minus and wraps to i32::MIN.
            Ok(value) if value <= 1 << 31 => Ok(TokenKind::Number(value as u32 as i32)),
            _ => Err(Self::error(
                span,
                format!("decimal literal {digits} out of range"),
            )),
        }
    }

    fn reject_trailing_word(&self, span: Span) -> Result<(), FrontendError> {
        match self.peek() {
            Some(ch) if ch.is_ascii_alphanumeric() || ch == '_' => Err(Self::error(
                span,
                format!("invalid character '{ch}' in numeric literal"),
            )),
            _ => Ok(()),
        }
    }

    fn read_operator(&mut self, span: Span) -> Result<TokenKind, FrontendError> {
        let rest = self.rest();
        for (spelling, kind) in OPERATORS {
            if rest.starts_with(spelling) {
                self.advance_by(spelling.len());
                return Ok(kind.clone());
            }
        }
        let ch = self.peek().unwrap_or('\0');
        Err(Self::error(span, format!("unexpected character '{ch}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("int x_1 while for_ever"),
            vec![
                TokenKind::Int,
                TokenKind::Ident("x_1".into()),
                TokenKind::While,
                TokenKind::Ident("for_ever".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_longest_operator_wins() {
        assert_eq!(
            kinds("a <<= b << c <= d"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::ShlAssign,
                TokenKind::Ident("b".into()),
                TokenKind::Shl,
                TokenKind::Ident("c".into()),
                TokenKind::Le,
                TokenKind::Ident("d".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numeric_literals() {
        assert_eq!(kinds("0")[0], TokenKind::Number(0));
        assert_eq!(kinds("2147483647")[0], TokenKind::Number(i32::MAX));
        assert_eq!(kinds("2147483648")[0], TokenKind::Number(i32::MIN));
        assert_eq!(kinds("0xFFFFFFFF")[0], TokenKind::Number(-1));
        assert_eq!(kinds("0x10")[0], TokenKind::Number(16));

        assert!(tokenize("2147483649").is_err());
        assert!(tokenize("0x100000000").is_err());
        assert!(tokenize("007").is_err());
        assert!(tokenize("12abc").is_err());
        assert!(tokenize("0x").is_err());
    }

    #[test]
    fn test_comments_and_positions() {
        let tokens = tokenize("// line\n/* block\n */ x").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Ident("x".into()));
        assert_eq!(tokens[0].span, Span::new(3, 5));
    }

    #[test]
    fn test_lexical_errors() {
        let err = tokenize("/* never closed").unwrap_err();
        assert!(matches!(err, FrontendError::Lex { .. }));
        assert_eq!(err.span(), Span::new(1, 1));

        let err = tokenize("x = @;").unwrap_err();
        assert_eq!(err.span(), Span::new(1, 5));
    }
}
