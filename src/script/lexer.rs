//! Tokenizer for the restricted script grammar.
//!
//! Tracks line:col for every token so compile-time rejections can point at
//! the offending spot. Identifiers containing a double underscore are
//! rejected here — reflection-flavored names never reach the parser.

use crate::error::SandboxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    // Keywords
    Import,
    If,
    Else,
    For,
    In,
    Break,
    Continue,
    And,
    Or,
    Not,
    True,
    False,
    Null,
    // Punctuation
    Assign,    // =
    Eq,        // ==
    NotEq,     // !=
    Lt,        // <
    LtEq,      // <=
    Gt,        // >
    GtEq,      // >=
    Plus,      // +
    Minus,     // -
    Star,      // *
    Slash,     // /
    Percent,   // %
    PlusEq,    // +=
    MinusEq,   // -=
    StarEq,    // *=
    SlashEq,   // /=
    PercentEq, // %=
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Semi,
    Newline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
    pub col: usize,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().peekable(),
            line: 1,
            col: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn err(&self, line: usize, col: usize, reason: impl std::fmt::Display) -> SandboxError {
        SandboxError::restriction(line, col, reason)
    }
}

fn keyword(ident: &str) -> Option<Tok> {
    let tok = match ident {
        "import" => Tok::Import,
        "if" => Tok::If,
        "else" => Tok::Else,
        "for" => Tok::For,
        "in" => Tok::In,
        "break" => Tok::Break,
        "continue" => Tok::Continue,
        "and" => Tok::And,
        "or" => Tok::Or,
        "not" => Tok::Not,
        "true" => Tok::True,
        "false" => Tok::False,
        "null" => Tok::Null,
        _ => return None,
    };
    Some(tok)
}

/// Tokenize script source. Any character sequence outside the grammar is a
/// `RestrictionViolation` carrying its location.
pub fn tokenize(src: &str) -> Result<Vec<Token>, SandboxError> {
    let mut lx = Lexer::new(src);
    let mut tokens = Vec::new();

    while let Some(c) = lx.peek() {
        let (line, col) = (lx.line, lx.col);
        match c {
            ' ' | '\t' | '\r' => {
                lx.bump();
            }
            '\n' => {
                lx.bump();
                tokens.push(Token { tok: Tok::Newline, line, col });
            }
            '#' => {
                // Comment to end of line
                while let Some(c) = lx.peek() {
                    if c == '\n' {
                        break;
                    }
                    lx.bump();
                }
            }
            '"' => {
                lx.bump();
                let s = lex_string(&mut lx, line, col)?;
                tokens.push(Token { tok: Tok::Str(s), line, col });
            }
            c if c.is_ascii_digit() => {
                let tok = lex_number(&mut lx, line, col)?;
                tokens.push(Token { tok, line, col });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(c) = lx.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        lx.bump();
                    } else {
                        break;
                    }
                }
                if ident.contains("__") {
                    return Err(lx.err(
                        line,
                        col,
                        format!("identifier '{ident}' contains a double underscore"),
                    ));
                }
                let tok = keyword(&ident).unwrap_or(Tok::Ident(ident));
                tokens.push(Token { tok, line, col });
            }
            _ => {
                lx.bump();
                let tok = match c {
                    '(' => Tok::LParen,
                    ')' => Tok::RParen,
                    '[' => Tok::LBracket,
                    ']' => Tok::RBracket,
                    '{' => Tok::LBrace,
                    '}' => Tok::RBrace,
                    ',' => Tok::Comma,
                    ':' => Tok::Colon,
                    '.' => Tok::Dot,
                    ';' => Tok::Semi,
                    '+' => two_char(&mut lx, Tok::Plus, Tok::PlusEq),
                    '-' => two_char(&mut lx, Tok::Minus, Tok::MinusEq),
                    '*' => two_char(&mut lx, Tok::Star, Tok::StarEq),
                    '/' => two_char(&mut lx, Tok::Slash, Tok::SlashEq),
                    '%' => two_char(&mut lx, Tok::Percent, Tok::PercentEq),
                    '=' => two_char(&mut lx, Tok::Assign, Tok::Eq),
                    '<' => two_char(&mut lx, Tok::Lt, Tok::LtEq),
                    '>' => two_char(&mut lx, Tok::Gt, Tok::GtEq),
                    '!' => {
                        if lx.peek() == Some('=') {
                            lx.bump();
                            Tok::NotEq
                        } else {
                            return Err(lx.err(line, col, "unexpected character '!'"));
                        }
                    }
                    other => {
                        return Err(lx.err(line, col, format!("unexpected character '{other}'")));
                    }
                };
                tokens.push(Token { tok, line, col });
            }
        }
    }

    Ok(tokens)
}

/// `X` or `X=` depending on whether '=' follows.
fn two_char(lx: &mut Lexer<'_>, plain: Tok, with_eq: Tok) -> Tok {
    if lx.peek() == Some('=') {
        lx.bump();
        with_eq
    } else {
        plain
    }
}

fn lex_string(lx: &mut Lexer<'_>, line: usize, col: usize) -> Result<String, SandboxError> {
    let mut s = String::new();
    loop {
        match lx.bump() {
            Some('"') => return Ok(s),
            Some('\\') => match lx.bump() {
                Some('n') => s.push('\n'),
                Some('t') => s.push('\t'),
                Some('\\') => s.push('\\'),
                Some('"') => s.push('"'),
                Some(other) => {
                    return Err(lx.err(line, col, format!("unknown escape '\\{other}' in string")));
                }
                None => return Err(lx.err(line, col, "unterminated string literal")),
            },
            Some('\n') | None => return Err(lx.err(line, col, "unterminated string literal")),
            Some(c) => s.push(c),
        }
    }
}

fn lex_number(lx: &mut Lexer<'_>, line: usize, col: usize) -> Result<Tok, SandboxError> {
    let mut text = String::new();
    while let Some(c) = lx.peek() {
        if c.is_ascii_digit() {
            text.push(c);
            lx.bump();
        } else {
            break;
        }
    }

    // Fractional part only if a digit follows the dot, so `xs[0].field`
    // style chains on integer results still tokenize as Dot.
    let mut is_float = false;
    if lx.peek() == Some('.') {
        let mut ahead = lx.chars.clone();
        ahead.next();
        if ahead.peek().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            text.push('.');
            lx.bump();
            while let Some(c) = lx.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    lx.bump();
                } else {
                    break;
                }
            }
        }
    }

    if is_float {
        text.parse::<f64>()
            .map(Tok::Float)
            .map_err(|_| lx.err(line, col, format!("invalid number literal '{text}'")))
    } else {
        text.parse::<i64>()
            .map(Tok::Int)
            .map_err(|_| lx.err(line, col, format!("integer literal '{text}' out of range")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_simple_assignment() {
        assert_eq!(
            toks("x = 1"),
            vec![Tok::Ident("x".into()), Tok::Assign, Tok::Int(1)]
        );
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            toks("for row in rows"),
            vec![
                Tok::For,
                Tok::Ident("row".into()),
                Tok::In,
                Tok::Ident("rows".into())
            ]
        );
    }

    #[test]
    fn test_augmented_operators() {
        assert_eq!(
            toks("x += 1; y %= 2"),
            vec![
                Tok::Ident("x".into()),
                Tok::PlusEq,
                Tok::Int(1),
                Tok::Semi,
                Tok::Ident("y".into()),
                Tok::PercentEq,
                Tok::Int(2)
            ]
        );
    }

    #[test]
    fn test_comparison_operators() {
        assert_eq!(
            toks("a <= b != c"),
            vec![
                Tok::Ident("a".into()),
                Tok::LtEq,
                Tok::Ident("b".into()),
                Tok::NotEq,
                Tok::Ident("c".into())
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            toks(r#""a\nb\"c""#),
            vec![Tok::Str("a\nb\"c".into())]
        );
    }

    #[test]
    fn test_unterminated_string_is_restriction_violation() {
        let err = tokenize("x = \"oops").unwrap_err();
        assert!(err.to_string().starts_with("RestrictionViolation"));
        assert!(err.to_string().contains("unterminated string"));
    }

    #[test]
    fn test_float_vs_attr_dot() {
        assert_eq!(toks("1.5"), vec![Tok::Float(1.5)]);
        assert_eq!(
            toks("m.field"),
            vec![Tok::Ident("m".into()), Tok::Dot, Tok::Ident("field".into())]
        );
    }

    #[test]
    fn test_comment_skipped() {
        assert_eq!(
            toks("x = 1 # set x\ny = 2"),
            vec![
                Tok::Ident("x".into()),
                Tok::Assign,
                Tok::Int(1),
                Tok::Newline,
                Tok::Ident("y".into()),
                Tok::Assign,
                Tok::Int(2)
            ]
        );
    }

    #[test]
    fn test_double_underscore_identifier_rejected() {
        let err = tokenize("a__b = 1").unwrap_err();
        assert!(err.to_string().contains("double underscore"));
        let err = tokenize("x = __class__").unwrap_err();
        assert!(err.to_string().contains("double underscore"));
    }

    #[test]
    fn test_location_tracking() {
        let tokens = tokenize("x = 1\n  y = 2").unwrap();
        let y = tokens.iter().find(|t| t.tok == Tok::Ident("y".into())).unwrap();
        assert_eq!((y.line, y.col), (2, 3));
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("x = 1 @ 2").unwrap_err();
        assert!(err.to_string().contains("unexpected character '@'"));
    }
}
