use std::collections::BTreeMap;

use crate::error::SchemaError;
use crate::model::Primitive;

use super::lex::{Comment, Tok, Token};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    Lit(i64),
    Const(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawType {
    Primitive(Primitive),
    Named(String),
    String(Option<Bound>),
    Array {
        ranges: Vec<(Bound, Bound)>,
        element: Box<RawType>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    pub name: String,
    pub ty: RawType,
    pub line: u32,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub name: String,
    pub fields: Vec<RawField>,
    pub line: u32,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConstant {
    pub name: String,
    pub value: i64,
    pub line: u32,
}

/// Every declaration of one source document, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDocument {
    pub records: Vec<RawRecord>,
    pub constants: Vec<RawConstant>,
}

pub fn parse_document(tokens: &[Token], comments: &[Comment]) -> Result<RawDocument, SchemaError> {
    let mut p = Parser {
        tokens,
        pos: 0,
        comments: comments
            .iter()
            .map(|c| (c.line, c.text.clone()))
            .collect(),
    };
    let mut doc = RawDocument::default();

    while !p.at_end() {
        let (word, line) = p.expect_ident("TYPE or VAR")?;
        match word.to_ascii_uppercase().as_str() {
            "TYPE" => p.type_block(&mut doc)?,
            "VAR" | "VAR_GLOBAL" => p.var_block(&mut doc)?,
            _ => {
                return Err(SchemaError::Syntax {
                    line,
                    message: format!("expected TYPE or VAR, found {word:?}"),
                })
            }
        }
    }

    Ok(doc)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    comments: BTreeMap<u32, String>,
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn line(&self) -> u32 {
        self.peek()
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn bump(&mut self) -> Option<&'a Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn err(&self, message: impl Into<String>) -> SchemaError {
        SchemaError::Syntax {
            line: self.line(),
            message: message.into(),
        }
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token { tok: Tok::Ident(w), .. }) if w.eq_ignore_ascii_case(kw))
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), SchemaError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.err(format!("expected {kw}")))
        }
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek().map(|t| &t.tok) == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<u32, SchemaError> {
        let line = self.line();
        if self.eat(&tok) {
            Ok(line)
        } else {
            Err(self.err(format!("expected {what}")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, u32), SchemaError> {
        match self.bump() {
            Some(Token {
                tok: Tok::Ident(w),
                line,
            }) => Ok((w.clone(), *line)),
            Some(t) => Err(SchemaError::Syntax {
                line: t.line,
                message: format!("expected {what}, found {:?}", t.tok),
            }),
            None => Err(self.err(format!("expected {what}, found end of input"))),
        }
    }

    fn comment_on(&self, line: u32) -> Option<String> {
        self.comments.get(&line).filter(|c| !c.is_empty()).cloned()
    }

    fn type_block(&mut self, doc: &mut RawDocument) -> Result<(), SchemaError> {
        loop {
            if self.eat_keyword("END_TYPE") {
                return Ok(());
            }
            if self.at_end() {
                return Err(self.err("missing END_TYPE"));
            }
            let (name, line) = self.expect_ident("type name")?;
            self.expect(Tok::Colon, "':' after type name")?;

            if self.eat_keyword("STRUCT") {
                let comment = self.comment_on(line);
                let fields = self.struct_body()?;
                self.expect(Tok::Semi, "';' after END_STRUCT")?;
                doc.records.push(RawRecord {
                    name,
                    fields,
                    line,
                    comment,
                });
                continue;
            }

            let what = if self.peek().map(|t| &t.tok) == Some(&Tok::LParen) {
                "enumeration"
            } else {
                "type alias"
            };
            return Err(SchemaError::Unsupported {
                line,
                name,
                what: what.to_string(),
            });
        }
    }

    fn struct_body(&mut self) -> Result<Vec<RawField>, SchemaError> {
        let mut fields = Vec::new();
        loop {
            if self.eat_keyword("END_STRUCT") {
                return Ok(fields);
            }
            if self.at_end() {
                return Err(self.err("missing END_STRUCT"));
            }
            let (name, line) = self.expect_ident("field name")?;
            self.expect(Tok::Colon, "':' after field name")?;
            let ty = self.type_spec(&name)?;
            if self.eat(&Tok::Assign) {
                self.skip_initializer()?;
            }
            let semi_line = self.expect(Tok::Semi, "';' after field declaration")?;
            let comment = self.comment_on(semi_line).or_else(|| self.comment_on(line));
            fields.push(RawField {
                name,
                ty,
                line,
                comment,
            });
        }
    }

    fn type_spec(&mut self, owner: &str) -> Result<RawType, SchemaError> {
        if self.peek().map(|t| &t.tok) == Some(&Tok::LParen) {
            return Err(SchemaError::Unsupported {
                line: self.line(),
                name: owner.to_string(),
                what: "inline enumeration".to_string(),
            });
        }
        let (word, line) = self.expect_ident("type")?;
        let upper = word.to_ascii_uppercase();
        match upper.as_str() {
            "ARRAY" => {
                self.expect(Tok::LBracket, "'[' after ARRAY")?;
                let mut ranges = Vec::new();
                loop {
                    let lo = self.bound()?;
                    self.expect(Tok::DotDot, "'..' in array range")?;
                    let hi = self.bound()?;
                    ranges.push((lo, hi));
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                self.expect(Tok::RBracket, "']' after array range")?;
                self.expect_keyword("OF")?;
                let element = self.type_spec(owner)?;
                Ok(RawType::Array {
                    ranges,
                    element: Box::new(element),
                })
            }
            "STRING" => {
                let bound = if self.eat(&Tok::LBracket) {
                    let b = self.bound()?;
                    self.expect(Tok::RBracket, "']' after STRING length")?;
                    Some(b)
                } else if self.eat(&Tok::LParen) {
                    let b = self.bound()?;
                    self.expect(Tok::RParen, "')' after STRING length")?;
                    Some(b)
                } else {
                    None
                };
                Ok(RawType::String(bound))
            }
            "WSTRING" | "POINTER" | "REF_TO" | "REFERENCE" | "STRUCT" => {
                Err(SchemaError::Unsupported {
                    line,
                    name: owner.to_string(),
                    what: upper.to_lowercase(),
                })
            }
            _ => match Primitive::from_keyword(&word) {
                Some(p) => Ok(RawType::Primitive(p)),
                None => Ok(RawType::Named(word)),
            },
        }
    }

    fn bound(&mut self) -> Result<Bound, SchemaError> {
        let negative = self.eat(&Tok::Minus);
        match self.bump() {
            Some(Token {
                tok: Tok::Number(n),
                line,
            }) => {
                let v = parse_int_literal(n).ok_or_else(|| SchemaError::Syntax {
                    line: *line,
                    message: format!("expected integer bound, found {n:?}"),
                })?;
                Ok(Bound::Lit(if negative { -v } else { v }))
            }
            Some(Token {
                tok: Tok::Ident(name),
                line,
            }) => {
                if negative {
                    return Err(SchemaError::Syntax {
                        line: *line,
                        message: "negated constants are not supported in bounds".to_string(),
                    });
                }
                Ok(Bound::Const(name.clone()))
            }
            _ => Err(self.err("expected array or string bound")),
        }
    }

    /// Skips a field initializer up to (not including) the terminating ';'.
    fn skip_initializer(&mut self) -> Result<(), SchemaError> {
        let mut depth = 0usize;
        loop {
            match self.peek().map(|t| &t.tok) {
                None => return Err(self.err("unterminated initializer")),
                Some(Tok::Semi) if depth == 0 => return Ok(()),
                Some(Tok::LParen) | Some(Tok::LBracket) => depth += 1,
                Some(Tok::RParen) | Some(Tok::RBracket) => depth = depth.saturating_sub(1),
                Some(_) => {}
            }
            self.pos += 1;
        }
    }

    fn var_block(&mut self, doc: &mut RawDocument) -> Result<(), SchemaError> {
        let constant = self.eat_keyword("CONSTANT");
        loop {
            if self.eat_keyword("END_VAR") {
                return Ok(());
            }
            if self.at_end() {
                return Err(self.err("missing END_VAR"));
            }
            let (name, line) = self.expect_ident("variable name")?;
            self.expect(Tok::Colon, "':' after variable name")?;
            let _ty = self.type_spec(&name)?;
            let mut value = None;
            if self.eat(&Tok::Assign) {
                let start = self.pos;
                self.skip_initializer()?;
                value = int_initializer(&self.tokens[start..self.pos]);
            }
            self.expect(Tok::Semi, "';' after variable declaration")?;
            if !constant {
                continue;
            }
            if let Some(value) = value {
                doc.constants.push(RawConstant { name, value, line });
            }
        }
    }
}

fn int_initializer(tokens: &[Token]) -> Option<i64> {
    match tokens {
        [Token {
            tok: Tok::Number(n), ..
        }] => parse_int_literal(n),
        [Token { tok: Tok::Minus, .. }, Token {
            tok: Tok::Number(n), ..
        }] => parse_int_literal(n).map(|v| -v),
        _ => None,
    }
}

/// Parses `42`, `1_000`, `16#FF`, `2#1010`, `8#17` and typed forms like `INT#3`.
pub(crate) fn parse_int_literal(s: &str) -> Option<i64> {
    let cleaned: String = s.chars().filter(|c| *c != '_').collect();
    match cleaned.split_once('#') {
        None => cleaned.parse().ok(),
        Some((prefix, digits)) => {
            let radix = match prefix {
                "2" => 2,
                "8" => 8,
                "16" => 16,
                p if p.chars().all(|c| c.is_ascii_alphabetic()) => {
                    return parse_int_literal(digits);
                }
                _ => return None,
            };
            i64::from_str_radix(digits, radix).ok()
        }
    }
}
