use std::error::Error;
use std::fmt::{self, Display};
use std::rc::Rc;

use smallvec::SmallVec;

use sheetcalc_common::{Array, CellError, Point, Scalar};

use crate::ast::{Node, NodeKind};
use crate::functions::FunctionId;
use crate::reference::Reference;
use crate::references::FormulaReferences;
use crate::tokenizer::{Associativity, Token, TokenSubType, TokenType, TokenizerError};

/// Structural failure that makes a whole formula unparsable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserError {
    pub message: String,
    pub position: Option<usize>,
}

impl Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(pos) = self.position {
            write!(f, "ParserError at position {}: {}", pos, self.message)
        } else {
            write!(f, "ParserError: {}", self.message)
        }
    }
}

impl Error for ParserError {}

impl From<TokenizerError> for ParserError {
    fn from(err: TokenizerError) -> Self {
        ParserError {
            message: err.message,
            position: Some(err.pos),
        }
    }
}

type Args = SmallVec<[Node; 4]>;

/// Recursive-descent parser over a token stream. References are resolved
/// relative to `at` and collected into a [`FormulaReferences`] list the
/// resulting tree indexes into.
pub struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    position: usize,
    at: Point,
    references: FormulaReferences,
}

impl<'s> Parser<'s> {
    /// `tokens` must come from tokenizing `source`; whitespace is dropped.
    pub fn new(source: &'s str, tokens: Vec<Token>, at: Point) -> Self {
        let tokens = tokens
            .into_iter()
            .filter(|t| t.token_type != TokenType::Whitespace)
            .collect();
        Parser {
            source,
            tokens,
            position: 0,
            at,
            references: FormulaReferences::default(),
        }
    }

    pub fn parse(mut self) -> Result<(Node, FormulaReferences), ParserError> {
        if self.tokens.is_empty() {
            return Err(ParserError {
                message: "No tokens to parse".to_string(),
                position: None,
            });
        }
        let ast = self.parse_expression()?;
        if self.position < self.tokens.len() {
            return Err(self.error_here(format!(
                "Unexpected token: {}",
                self.tokens[self.position]
            )));
        }
        Ok((ast, self.references))
    }

    fn error_here(&self, message: String) -> ParserError {
        ParserError {
            message,
            position: Some(self.position),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_is(&self, token_type: TokenType, subtype: TokenSubType) -> bool {
        self.peek()
            .is_some_and(|t| t.token_type == token_type && t.subtype == subtype)
    }

    fn parse_expression(&mut self) -> Result<Node, ParserError> {
        self.parse_binary_op(0)
    }

    fn parse_binary_op(&mut self, min_precedence: u8) -> Result<Node, ParserError> {
        let mut left = self.parse_unary_op()?;

        while let Some(token) = self.peek() {
            if token.token_type != TokenType::OpInfix {
                break;
            }
            let Some((precedence, associativity)) = token.get_precedence() else {
                return Err(self.error_here(format!("Unsupported operator '{}'", token.value)));
            };
            if precedence < min_precedence {
                break;
            }
            let Some(id) = FunctionId::infix(&token.value) else {
                return Err(self.error_here(format!("Unsupported operator '{}'", token.value)));
            };
            self.position += 1;

            let next_min_precedence = if associativity == Associativity::Left {
                precedence + 1
            } else {
                precedence
            };
            let right = self.parse_binary_op(next_min_precedence)?;
            left = Node::function(id, vec![left, right]);
        }

        Ok(left)
    }

    fn parse_unary_op(&mut self) -> Result<Node, ParserError> {
        if let Some(token) = self.peek()
            && token.token_type == TokenType::OpPrefix
        {
            let negate = token.value == "-";
            self.position += 1;
            let expr = self.parse_unary_op()?;
            // Unary plus is an identity and does not survive into the tree.
            return Ok(if negate {
                Node::function(FunctionId::Negate, vec![expr])
            } else {
                expr
            });
        }
        self.parse_postfix_op()
    }

    fn parse_postfix_op(&mut self) -> Result<Node, ParserError> {
        let mut expr = self.parse_primary()?;
        while self.peek_is(TokenType::OpPostfix, TokenSubType::None) {
            self.position += 1;
            expr = Node::function(FunctionId::Percent, vec![expr]);
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Node, ParserError> {
        let Some(token) = self.peek() else {
            return Err(self.error_here("Unexpected end of tokens".to_string()));
        };
        match (token.token_type, token.subtype) {
            (TokenType::Operand, _) => {
                let token = token.clone();
                self.position += 1;
                self.parse_operand(token)
            }
            (TokenType::Func, TokenSubType::Open) => {
                let token = token.clone();
                self.position += 1;
                self.parse_function(token)
            }
            (TokenType::Paren, TokenSubType::Open) => {
                self.position += 1;
                let mut expr = self.parse_expression()?;
                if !self.peek_is(TokenType::Paren, TokenSubType::Close) {
                    return Err(self.error_here("Expected closing parenthesis".to_string()));
                }
                self.position += 1;
                expr.bracketed = true;
                Ok(expr)
            }
            (TokenType::Array, TokenSubType::Open) => {
                self.position += 1;
                self.parse_array()
            }
            _ => Err(self.error_here(format!("Unexpected token: {token}"))),
        }
    }

    fn parse_operand(&mut self, token: Token) -> Result<Node, ParserError> {
        match token.subtype {
            TokenSubType::Range => {
                let Some(reference) = Reference::parse(&token.value, self.at) else {
                    // Anything else that looks like a bare name is unknown.
                    return Ok(Node::parse_error(CellError::InvalidName, &token.value));
                };
                let idx = self.references.push(reference);
                Ok(Node::new(NodeKind::Reference(idx)))
            }
            _ => self.parse_constant(&token).map(Node::scalar),
        }
    }

    fn parse_constant(&self, token: &Token) -> Result<Scalar, ParserError> {
        match token.subtype {
            TokenSubType::Number => token
                .value
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Scalar::Number)
                .ok_or_else(|| self.error_here(format!("Invalid number: {}", token.value))),
            TokenSubType::Text => {
                let inner = token
                    .value
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .unwrap_or(&token.value);
                Ok(Scalar::text(inner.replace("\"\"", "\"")))
            }
            TokenSubType::Logical => Ok(Scalar::Bool(token.value.eq_ignore_ascii_case("TRUE"))),
            TokenSubType::Error => CellError::parse(&token.value)
                .map(Scalar::Error)
                .ok_or_else(|| self.error_here(format!("Invalid error literal: {}", token.value))),
            _ => Err(self.error_here(format!(
                "Unexpected operand subtype: {:?}",
                token.subtype
            ))),
        }
    }

    fn parse_function(&mut self, func_token: Token) -> Result<Node, ParserError> {
        let args = self.parse_function_arguments()?;
        let end = self
            .tokens
            .get(self.position.saturating_sub(1))
            .map_or(self.source.len(), |t| t.end);
        let call_text = &self.source[func_token.start..end];

        let Some(id) = FunctionId::lookup(func_token.func_name()) else {
            return Ok(Node::parse_error(CellError::InvalidName, call_text));
        };
        if !id.accepts(args.len()) {
            return Ok(Node::parse_error(CellError::InvalidFormula, call_text));
        }
        Ok(Node::function(id, args.into_vec()))
    }

    fn parse_function_arguments(&mut self) -> Result<Args, ParserError> {
        let mut args = Args::new();

        if self.peek_is(TokenType::Func, TokenSubType::Close) {
            self.position += 1;
            return Ok(args);
        }

        loop {
            if self.peek_is(TokenType::Sep, TokenSubType::Arg)
                || self.peek_is(TokenType::Func, TokenSubType::Close)
            {
                // Omitted argument.
                args.push(Node::scalar(Scalar::Blank));
            } else {
                args.push(self.parse_expression()?);
            }

            match self.peek() {
                Some(t) if t.token_type == TokenType::Sep && t.subtype == TokenSubType::Arg => {
                    self.position += 1;
                }
                Some(t) if t.token_type == TokenType::Func && t.subtype == TokenSubType::Close => {
                    self.position += 1;
                    return Ok(args);
                }
                Some(t) => {
                    return Err(self.error_here(format!(
                        "Expected ',' or ')' in function arguments, got {t}"
                    )));
                }
                None => return Err(self.error_here("Unterminated function call".to_string())),
            }
        }
    }

    /// Array literals hold constants only: numbers (optionally negated),
    /// text, logicals and errors.
    fn parse_array(&mut self) -> Result<Node, ParserError> {
        let mut rows: Vec<Vec<Scalar>> = Vec::new();
        let mut current_row = vec![self.parse_array_element()?];

        loop {
            let Some(token) = self.peek() else {
                return Err(self.error_here("Unterminated array".to_string()));
            };
            match (token.token_type, token.subtype) {
                (TokenType::Sep, TokenSubType::Arg) => {
                    self.position += 1;
                    current_row.push(self.parse_array_element()?);
                }
                (TokenType::Sep, TokenSubType::Row) => {
                    self.position += 1;
                    rows.push(std::mem::take(&mut current_row));
                    current_row.push(self.parse_array_element()?);
                }
                (TokenType::Array, TokenSubType::Close) => {
                    self.position += 1;
                    rows.push(current_row);
                    break;
                }
                _ => return Err(self.error_here(format!("Unexpected token in array: {token}"))),
            }
        }

        let array = Array::from_rows(rows)
            .ok_or_else(|| self.error_here("Array rows differ in length".to_string()))?;
        Ok(Node::new(NodeKind::Array(Rc::new(array))))
    }

    fn parse_array_element(&mut self) -> Result<Scalar, ParserError> {
        let mut negate = false;
        while let Some(t) = self.peek()
            && t.token_type == TokenType::OpPrefix
        {
            if t.value == "-" {
                negate = !negate;
            }
            self.position += 1;
        }
        let Some(token) = self.peek().cloned() else {
            return Err(self.error_here("Unexpected end of array".to_string()));
        };
        if token.token_type != TokenType::Operand || token.subtype == TokenSubType::Range {
            return Err(self.error_here(format!("Array elements must be constants, got {token}")));
        }
        self.position += 1;
        let value = self.parse_constant(&token)?;
        match value {
            Scalar::Number(n) if negate => Ok(Scalar::Number(-n)),
            _ if negate => Err(self.error_here("Only numbers can be negated in arrays".to_string())),
            other => Ok(other),
        }
    }
}
