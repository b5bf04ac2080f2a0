use crate::error::SchemaError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    /// Numeric literal as written (`42`, `16#FF`, `1.5`, `1_000`).
    Number(String),
    Str(String),
    Colon,
    Assign,
    Semi,
    Comma,
    DotDot,
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Minus,
    Plus,
    Other(char),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub line: u32,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    pub comments: Vec<Comment>,
}

pub fn lex(src: &str) -> Result<Lexed, SchemaError> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Lexed::default();
    let mut i = 0usize;
    let mut line = 1u32;

    while i < chars.len() {
        let c = chars[i];
        if c == '\n' {
            line += 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // (* block comment *)
        if c == '(' && chars.get(i + 1) == Some(&'*') {
            let start_line = line;
            let mut j = i + 2;
            let mut text = String::new();
            loop {
                match chars.get(j) {
                    None => {
                        return Err(SchemaError::Syntax {
                            line: start_line,
                            message: "unterminated comment".to_string(),
                        })
                    }
                    Some('*') if chars.get(j + 1) == Some(&')') => {
                        j += 2;
                        break;
                    }
                    Some(ch) => {
                        if *ch == '\n' {
                            line += 1;
                        }
                        text.push(*ch);
                        j += 1;
                    }
                }
            }
            out.comments.push(Comment {
                line: start_line,
                text: text.trim().to_string(),
            });
            i = j;
            continue;
        }

        // // line comment
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            let mut j = i + 2;
            let mut text = String::new();
            while let Some(ch) = chars.get(j) {
                if *ch == '\n' {
                    break;
                }
                text.push(*ch);
                j += 1;
            }
            out.comments.push(Comment {
                line,
                text: text.trim().to_string(),
            });
            i = j;
            continue;
        }

        // {PRAGMA} attributes are dropped.
        if c == '{' {
            let start_line = line;
            let mut j = i + 1;
            loop {
                match chars.get(j) {
                    None => {
                        return Err(SchemaError::Syntax {
                            line: start_line,
                            message: "unterminated pragma".to_string(),
                        })
                    }
                    Some('}') => {
                        j += 1;
                        break;
                    }
                    Some(ch) => {
                        if *ch == '\n' {
                            line += 1;
                        }
                        j += 1;
                    }
                }
            }
            i = j;
            continue;
        }

        if c == '_' || c.is_ascii_alphabetic() {
            let mut j = i;
            while j < chars.len() && (chars[j] == '_' || chars[j].is_ascii_alphanumeric()) {
                j += 1;
            }
            let word: String = chars[i..j].iter().collect();
            // Typed literals such as `T#5s` or `INT#3` belong to initializers.
            if chars.get(j) == Some(&'#') {
                let mut k = j + 1;
                while k < chars.len() && (chars[k] == '_' || chars[k] == '.' || chars[k].is_ascii_alphanumeric()) {
                    k += 1;
                }
                let lit: String = chars[i..k].iter().collect();
                out.tokens.push(Token {
                    tok: Tok::Number(lit),
                    line,
                });
                i = k;
                continue;
            }
            out.tokens.push(Token {
                tok: Tok::Ident(word),
                line,
            });
            i = j;
            continue;
        }

        if c.is_ascii_digit() {
            let mut j = i;
            while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '_') {
                j += 1;
            }
            if chars.get(j) == Some(&'#') {
                j += 1;
                while j < chars.len() && (chars[j] == '_' || chars[j].is_ascii_alphanumeric()) {
                    j += 1;
                }
            } else if chars.get(j) == Some(&'.') && chars.get(j + 1).is_some_and(|d| d.is_ascii_digit()) {
                j += 1;
                while j < chars.len() && chars[j].is_ascii_digit() {
                    j += 1;
                }
                if matches!(chars.get(j), Some('e') | Some('E')) {
                    j += 1;
                    if matches!(chars.get(j), Some('+') | Some('-')) {
                        j += 1;
                    }
                    while j < chars.len() && chars[j].is_ascii_digit() {
                        j += 1;
                    }
                }
            }
            out.tokens.push(Token {
                tok: Tok::Number(chars[i..j].iter().collect()),
                line,
            });
            i = j;
            continue;
        }

        if c == '\'' || c == '"' {
            let quote = c;
            let start_line = line;
            let mut j = i + 1;
            let mut text = String::new();
            loop {
                match chars.get(j) {
                    None | Some('\n') => {
                        return Err(SchemaError::Syntax {
                            line: start_line,
                            message: "unterminated string literal".to_string(),
                        })
                    }
                    Some('$') => {
                        if let Some(esc) = chars.get(j + 1) {
                            text.push(*esc);
                        }
                        j += 2;
                    }
                    Some(ch) if *ch == quote => {
                        j += 1;
                        break;
                    }
                    Some(ch) => {
                        text.push(*ch);
                        j += 1;
                    }
                }
            }
            out.tokens.push(Token {
                tok: Tok::Str(text),
                line: start_line,
            });
            i = j;
            continue;
        }

        let (tok, len) = match (c, chars.get(i + 1)) {
            (':', Some('=')) => (Tok::Assign, 2),
            (':', _) => (Tok::Colon, 1),
            ('.', Some('.')) => (Tok::DotDot, 2),
            ('.', _) => (Tok::Dot, 1),
            (';', _) => (Tok::Semi, 1),
            (',', _) => (Tok::Comma, 1),
            ('[', _) => (Tok::LBracket, 1),
            (']', _) => (Tok::RBracket, 1),
            ('(', _) => (Tok::LParen, 1),
            (')', _) => (Tok::RParen, 1),
            ('-', _) => (Tok::Minus, 1),
            ('+', _) => (Tok::Plus, 1),
            (other, _) => (Tok::Other(other), 1),
        };
        out.tokens.push(Token { tok, line });
        i += len;
    }

    Ok(out)
}
