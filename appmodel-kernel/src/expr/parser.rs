//! Recursive-descent parser for "when" clauses.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | compare
//! compare := atom ( ("==" | "!=" | "<" | "<=" | ">" | ">=" | "in" | "not" "in") atom )?
//! atom    := literal | name | "(" or ")" | "[" ( or ( "," or )* )? "]"
//! ```

use appmodel_api::Value;

use super::ast::{CmpOp, Node};
use super::lexer::{Spanned, Token, tokenize};
use super::ParseError;

/// Deepest tree the parser will build. Evaluation, printing and drop all
/// recurse over the tree, so this also bounds their stack use.
pub const MAX_DEPTH: usize = 256;

pub fn parse(source: &str) -> Result<Node, ParseError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ParseError::new("empty expression", 0));
    }

    let mut parser = Parser { tokens, pos: 0, end: source.len(), depth: 0 };
    let node = parser.parse_or()?;

    if let Some(extra) = parser.peek() {
        let message = match extra.token {
            Token::RParen => "unbalanced parentheses: unexpected ')'".to_string(),
            ref other => format!("unexpected {}", other.describe()),
        };
        return Err(ParseError::new(message, extra.pos));
    }
    Ok(node)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Offset reported for errors at end of input.
    end: usize,
    /// Depth of the node being built.
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek_token() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn offset(&self) -> usize {
        self.peek().map_or(self.end, |s| s.pos)
    }

    /// Go one level deeper, failing past [`MAX_DEPTH`].
    fn descend(&mut self, pos: usize) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::new(
                format!("expression nested deeper than {} levels", MAX_DEPTH),
                pos,
            ));
        }
        Ok(())
    }

    // Chains are left-nested, so every extra operand adds a level.
    fn parse_or(&mut self) -> Result<Node, ParseError> {
        let depth = self.depth;
        let mut left = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            self.descend(self.offset())?;
            let right = self.parse_and()?;
            left = Node::Or(Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, ParseError> {
        let depth = self.depth;
        let mut left = self.parse_unary()?;
        while self.eat(&Token::AndAnd) {
            self.descend(self.offset())?;
            let right = self.parse_unary()?;
            left = Node::And(Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Node, ParseError> {
        let pos = self.offset();
        if self.eat(&Token::Bang) {
            self.descend(pos)?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Node::Not(Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Node, ParseError> {
        let left = self.parse_atom()?;

        let op = match self.peek_token() {
            Some(Token::EqEq) => CmpOp::Eq,
            Some(Token::NotEq) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            Some(Token::In) => CmpOp::In,
            Some(Token::NotKw) => CmpOp::NotIn,
            _ => return Ok(left),
        };
        let op_pos = self.advance().map_or(self.end, |s| s.pos);

        if op == CmpOp::NotIn && !self.eat(&Token::In) {
            return Err(ParseError::new("expected 'in' after 'not'", op_pos));
        }

        let right = self.parse_atom()?;
        Ok(Node::Compare { op, left: Box::new(left), right: Box::new(right) })
    }

    fn parse_atom(&mut self) -> Result<Node, ParseError> {
        let Some(Spanned { token, pos }) = self.advance() else {
            return Err(ParseError::new("unexpected end of expression", self.end));
        };

        match token {
            Token::Ident(name) => Ok(Node::Name(name)),
            Token::Str(s) => Ok(Node::Literal(Value::String(s))),
            Token::Int(n) => Ok(Node::Literal(Value::Int(n))),
            Token::Float(x) => Ok(Node::Literal(Value::Float(x))),
            Token::True => Ok(Node::Literal(Value::Bool(true))),
            Token::False => Ok(Node::Literal(Value::Bool(false))),
            Token::Null => Ok(Node::Literal(Value::Null)),
            Token::LParen => {
                self.descend(pos)?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                if !self.eat(&Token::RParen) {
                    return Err(ParseError::new("unbalanced parentheses: missing ')'", pos));
                }
                Ok(inner)
            }
            Token::LBracket => {
                self.descend(pos)?;
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.parse_or()?);
                        if self.eat(&Token::RBracket) {
                            break;
                        }
                        if !self.eat(&Token::Comma) {
                            return Err(ParseError::new("expected ',' or ']' in list", pos));
                        }
                    }
                }
                self.depth -= 1;
                Ok(Node::List(items))
            }
            other => Err(ParseError::new(format!("unexpected {}", other.describe()), pos)),
        }
    }
}
