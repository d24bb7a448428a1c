//! Recursive-descent parser producing an untyped syntax tree.
//!
//! Precedence, loosest first:
//!
//! ```text
//! ||  or
//! &&  and
//! ==  !=  <  <=  >  >=  in  not in     (non-associative)
//! +  -
//! *  /
//! !  not  unary -
//! ```

use super::CompileError;
use super::lexer::{Spanned, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub(crate) const fn symbol(self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Ast {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Ident(String),
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    In {
        needle: Box<Node>,
        list: Vec<Node>,
        negated: bool,
    },
}

/// A syntax node with the offset of its first token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Node {
    pub ast: Ast,
    pub offset: usize,
    height: usize,
}

impl Node {
    fn new(ast: Ast, offset: usize) -> Self {
        let height = 1 + match &ast {
            Ast::Unary(_, operand) => operand.height,
            Ast::Binary(_, left, right) => left.height.max(right.height),
            Ast::In { needle, list, .. } => {
                list.iter().map(|item| item.height).fold(needle.height, usize::max)
            }
            Ast::Int(_) | Ast::Float(_) | Ast::Str(_) | Ast::Bool(_) | Ast::Ident(_) => 0,
        };
        Self { ast, offset, height }
    }

    /// Reject trees taller than [`MAX_HEIGHT`], reporting at `at`.
    fn bounded(self, at: usize) -> Result<Self, CompileError> {
        if self.height > MAX_HEIGHT {
            return Err(CompileError::new(at, "expression nested too deeply"));
        }
        Ok(self)
    }
}

/// Parser recursion bound for parentheses and unary operators.
const MAX_DEPTH: usize = 64;

/// Tree height bound. Type checking, evaluation and drop all recurse on it,
/// so operator chains count as well as explicit nesting.
const MAX_HEIGHT: usize = 256;

pub(crate) fn parse(tokens: &[Spanned]) -> Result<Node, CompileError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let node = parser.or()?;
    let next = parser.peek();
    if next.token != Token::Eof {
        return Err(CompileError::new(
            next.offset,
            format!("unexpected {} after expression", next.token.describe()),
        ));
    }
    Ok(node)
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &Spanned {
        // The token list always ends with Eof.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_second(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].token
    }

    fn advance(&mut self) -> Spanned {
        let spanned = self.peek().clone();
        if spanned.token != Token::Eof {
            self.pos += 1;
        }
        spanned
    }

    fn expect(&mut self, token: &Token) -> Result<(), CompileError> {
        let next = self.advance();
        if &next.token == token {
            Ok(())
        } else {
            Err(CompileError::new(
                next.offset,
                format!("expected {}, found {}", token.describe(), next.token.describe()),
            ))
        }
    }

    fn or(&mut self) -> Result<Node, CompileError> {
        self.chain(Self::and, |token| (*token == Token::Or).then_some(BinaryOp::Or))
    }

    fn and(&mut self) -> Result<Node, CompileError> {
        self.chain(Self::comparison, |token| (*token == Token::And).then_some(BinaryOp::And))
    }

    fn comparison(&mut self) -> Result<Node, CompileError> {
        let left = self.additive()?;
        let op = match self.peek().token {
            Token::Eq => BinaryOp::Eq,
            Token::Ne => BinaryOp::Ne,
            Token::Lt => BinaryOp::Lt,
            Token::Le => BinaryOp::Le,
            Token::Gt => BinaryOp::Gt,
            Token::Ge => BinaryOp::Ge,
            Token::In => {
                self.advance();
                return self.membership(left, false);
            }
            Token::Not if *self.peek_second() == Token::In => {
                self.advance();
                self.advance();
                return self.membership(left, true);
            }
            _ => return Ok(left),
        };
        let at = self.advance().offset;
        let right = self.additive()?;
        binary(op, left, right).bounded(at)
    }

    fn membership(&mut self, needle: Node, negated: bool) -> Result<Node, CompileError> {
        self.expect(&Token::LBracket)?;
        let mut list = Vec::new();
        while self.peek().token != Token::RBracket {
            list.push(self.additive()?);
            if self.peek().token == Token::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&Token::RBracket)?;

        let offset = needle.offset;
        Node::new(
            Ast::In {
                needle: Box::new(needle),
                list,
                negated,
            },
            offset,
        )
        .bounded(offset)
    }

    fn additive(&mut self) -> Result<Node, CompileError> {
        self.chain(Self::multiplicative, |token| match token {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> Result<Node, CompileError> {
        self.chain(Self::unary, |token| match token {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            _ => None,
        })
    }

    fn unary(&mut self) -> Result<Node, CompileError> {
        let op = match self.peek().token {
            Token::Not => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            _ => return self.primary(),
        };
        let offset = self.advance().offset;
        let operand = self.nested(Self::unary)?;
        Node::new(Ast::Unary(op, Box::new(operand)), offset).bounded(offset)
    }

    fn primary(&mut self) -> Result<Node, CompileError> {
        let Spanned { token, offset } = self.advance();
        let ast = match token {
            Token::Int(v) => Ast::Int(v),
            Token::Float(v) => Ast::Float(v),
            Token::Str(s) => Ast::Str(s),
            Token::True => Ast::Bool(true),
            Token::False => Ast::Bool(false),
            Token::Ident(name) => Ast::Ident(name),
            Token::LParen => {
                let inner = self.nested(Self::or)?;
                self.expect(&Token::RParen)?;
                return Ok(inner);
            }
            other => {
                return Err(CompileError::new(
                    offset,
                    format!("expected a value, found {}", other.describe()),
                ));
            }
        };
        Ok(Node::new(ast, offset))
    }

    /// Left-associative fold of `operand (op operand)*`.
    fn chain(
        &mut self,
        operand: fn(&mut Self) -> Result<Node, CompileError>,
        operator: fn(&Token) -> Option<BinaryOp>,
    ) -> Result<Node, CompileError> {
        let mut left = operand(self)?;
        while let Some(op) = operator(&self.peek().token) {
            let at = self.advance().offset;
            let right = operand(self)?;
            left = binary(op, left, right).bounded(at)?;
        }
        Ok(left)
    }

    fn nested(&mut self, rule: fn(&mut Self) -> Result<Node, CompileError>) -> Result<Node, CompileError> {
        if self.depth >= MAX_DEPTH {
            return Err(CompileError::new(self.peek().offset, "expression nested too deeply"));
        }
        self.depth += 1;
        let result = rule(self);
        self.depth -= 1;
        result
    }
}

fn binary(op: BinaryOp, left: Node, right: Node) -> Node {
    let offset = left.offset;
    Node::new(Ast::Binary(op, Box::new(left), Box::new(right)), offset)
}
