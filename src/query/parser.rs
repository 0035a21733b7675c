//! Query parser
//!
//! Grammar:
//!
//! ```text
//! query      := loop+ operation* RETURN projection
//! loop       := FOR ident IN source
//! source     := ident | @@param
//! operation  := FILTER path op operand
//!             | SORT path [ASC | DESC]
//!             | LIMIT [number ,] number
//! projection := ident | path
//! path       := ident ( . ident )+
//! operand    := literal | @param
//! ```
//!
//! Several loops iterate the cross product of their collections, outermost
//! loop first.

use serde_json::Value;

use super::lexer::{CompareOp, Keyword, Lexer, Token, TokenKind};
use crate::error::{QueryError, Result};

/// Where a loop reads its documents from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// Collection named in the query text
    Collection(String),
    /// Collection supplied through `@@name`
    CollectionParam(String),
}

/// `FOR variable IN source`
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub variable: String,
    pub source: Source,
}

/// Attribute path below a loop variable, e.g. `a.address.city`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePath {
    pub variable: String,
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    /// Value supplied through `@name`
    Param(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub path: AttributePath,
    pub op: CompareOp,
    pub operand: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Filter(Condition),
    Sort { path: AttributePath, descending: bool },
    Limit { offset: usize, count: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// The whole document bound to a variable
    Document(String),
    /// One attribute path of a document
    Path(AttributePath),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub loops: Vec<Loop>,
    pub operations: Vec<Operation>,
    pub projection: Projection,
}

impl Query {
    pub fn parse(text: &str) -> Result<Self> {
        let tokens = Lexer::new(text).tokenize()?;
        Parser {
            tokens,
            pos: 0,
            variables: Vec::new(),
        }
        .query()
    }

    /// Bind parameter keys the query declares, as they appear in `bindVars`
    /// (`@name` for collection parameters, `name` for values).
    pub fn declared_parameters(&self) -> Vec<String> {
        let mut names = Vec::new();
        for l in &self.loops {
            if let Source::CollectionParam(name) = &l.source {
                names.push(format!("@{name}"));
            }
        }
        for op in &self.operations {
            if let Operation::Filter(Condition {
                operand: Operand::Param(name),
                ..
            }) = op
            {
                names.push(name.clone());
            }
        }
        names.sort();
        names.dedup();
        names
    }

    /// Position of `variable` among the loops.
    pub fn variable_index(&self, variable: &str) -> Option<usize> {
        self.loops.iter().position(|l| l.variable == variable)
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Loop variables declared so far
    variables: Vec<String>,
}

impl Parser {
    fn query(&mut self) -> Result<Query> {
        let mut loops = vec![self.for_loop()?];
        while matches!(self.peek(), TokenKind::Keyword(Keyword::For)) {
            loops.push(self.for_loop()?);
        }

        let mut operations = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Keyword(Keyword::Filter) => {
                    self.advance();
                    operations.push(Operation::Filter(self.condition()?));
                }
                TokenKind::Keyword(Keyword::Sort) => {
                    self.advance();
                    let path = self.path()?;
                    let descending = match self.peek() {
                        TokenKind::Keyword(Keyword::Desc) => {
                            self.advance();
                            true
                        }
                        TokenKind::Keyword(Keyword::Asc) => {
                            self.advance();
                            false
                        }
                        _ => false,
                    };
                    operations.push(Operation::Sort { path, descending });
                }
                TokenKind::Keyword(Keyword::Limit) => {
                    self.advance();
                    let first = self.unsigned()?;
                    let op = if matches!(self.peek(), TokenKind::Comma) {
                        self.advance();
                        Operation::Limit {
                            offset: first,
                            count: self.unsigned()?,
                        }
                    } else {
                        Operation::Limit {
                            offset: 0,
                            count: first,
                        }
                    };
                    operations.push(op);
                }
                _ => break,
            }
        }

        self.expect_keyword(Keyword::Return)?;
        let variable = self.variable()?;
        let projection = if matches!(self.peek(), TokenKind::Dot) {
            Projection::Path(AttributePath {
                variable,
                attributes: self.attributes()?,
            })
        } else {
            Projection::Document(variable)
        };

        if !matches!(self.peek(), TokenKind::Eof) {
            return Err(self.error_here("end of query expected"));
        }

        Ok(Query {
            loops,
            operations,
            projection,
        })
    }

    fn for_loop(&mut self) -> Result<Loop> {
        self.expect_keyword(Keyword::For)?;
        let variable = self.ident()?;
        if self.variables.contains(&variable) {
            return Err(QueryError::VariableRedeclared(variable).into());
        }
        self.expect_keyword(Keyword::In)?;
        let source = match self.advance() {
            TokenKind::Ident(name) => Source::Collection(name),
            TokenKind::CollectionParam(name) => Source::CollectionParam(name),
            _ => return Err(self.error_at_previous("collection expected")),
        };
        self.variables.push(variable.clone());
        Ok(Loop { variable, source })
    }

    /// A declared loop variable.
    fn variable(&mut self) -> Result<String> {
        let name = self.ident()?;
        if self.variables.contains(&name) {
            Ok(name)
        } else {
            Err(QueryError::UnknownVariable(name).into())
        }
    }

    fn condition(&mut self) -> Result<Condition> {
        let path = self.path()?;
        let op = match self.advance() {
            TokenKind::Op(op) => op,
            _ => return Err(self.error_at_previous("comparison operator expected")),
        };
        let operand = match self.advance() {
            TokenKind::Literal(v) => Operand::Literal(v),
            TokenKind::BindParam(name) => Operand::Param(name),
            _ => return Err(self.error_at_previous("value expected")),
        };
        Ok(Condition { path, op, operand })
    }

    /// `variable.attr(.attr)*`
    fn path(&mut self) -> Result<AttributePath> {
        let variable = self.variable()?;
        if !matches!(self.peek(), TokenKind::Dot) {
            return Err(self.error_here("attribute access expected"));
        }
        Ok(AttributePath {
            variable,
            attributes: self.attributes()?,
        })
    }

    fn attributes(&mut self) -> Result<Vec<String>> {
        let mut path = Vec::new();
        while matches!(self.peek(), TokenKind::Dot) {
            self.advance();
            path.push(self.ident()?);
        }
        Ok(path)
    }

    fn unsigned(&mut self) -> Result<usize> {
        match self.advance() {
            TokenKind::Literal(Value::Number(n)) => n
                .as_u64()
                .map(|v| v as usize)
                .ok_or_else(|| self.error_at_previous("non-negative integer expected")),
            _ => Err(self.error_at_previous("number expected")),
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.advance() {
            TokenKind::Ident(name) => Ok(name),
            _ => Err(self.error_at_previous("identifier expected")),
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        match self.advance() {
            TokenKind::Keyword(k) if k == keyword => Ok(()),
            _ => {
                let name = format!("{keyword:?}").to_uppercase();
                Err(self.error_at_previous(&format!("{name} expected")))
            }
        }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    /// Consume the current token; `Eof` is never consumed.
    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if !matches!(kind, TokenKind::Eof) {
            self.pos += 1;
        }
        kind
    }

    fn error_here(&self, message: &str) -> crate::error::CursordError {
        QueryError::Syntax {
            message: message.to_string(),
            position: self.tokens[self.pos].offset,
        }
        .into()
    }

    fn error_at_previous(&self, message: &str) -> crate::error::CursordError {
        let token = if matches!(self.tokens[self.pos].kind, TokenKind::Eof) || self.pos == 0 {
            &self.tokens[self.pos]
        } else {
            &self.tokens[self.pos - 1]
        };
        QueryError::Syntax {
            message: message.to_string(),
            position: token.offset,
        }
        .into()
    }
}
