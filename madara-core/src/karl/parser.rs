//! Hand-written recursive-descent parser implementing the precedence
//! table of spec §4.3. Each precedence level gets its own function
//! rather than a generic table-driven climber, trading a little
//! repetition for a parser whose shape mirrors the table directly.
//!
//! This is a precedence-climbing rendition of the source's
//! shunting-yard/`precedence_insert` design: parenthesis nesting plays
//! the role of `accumulated_precedence`, and each level function plays
//! the role of one precedence band.

use super::ast::{Arena, AssignOp, BinaryOp, CompiledExpression, Node, NodeId};
use super::token::Token;
use crate::error::CompileError;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    arena: Arena,
}

pub fn parse(source: &str, tokens: Vec<Token>) -> Result<CompiledExpression, CompileError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        arena: Arena::default(),
    };
    let stmts = parser.parse_stmts(&Token::Eof)?;
    parser.expect(&Token::Eof)?;
    let root = parser.combine(stmts);
    Ok(CompiledExpression {
        source: source.to_string(),
        arena: parser.arena,
        root,
    })
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), CompileError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(CompileError::UnexpectedToken(format!("{:?}", self.peek())))
        }
    }

    fn combine(&mut self, mut stmts: Vec<NodeId>) -> Option<NodeId> {
        if stmts.len() == 1 {
            stmts.pop()
        } else if stmts.is_empty() {
            None
        } else {
            Some(self.arena.push(Node::Sequence(stmts)))
        }
    }

    /// Parses `stmt (';' stmt)*` until `terminator` (which is not
    /// consumed). `terminator` is `Eof` at the top level, `RParen` inside
    /// a parenthesized group.
    fn parse_stmts(&mut self, terminator: &Token) -> Result<Vec<NodeId>, CompileError> {
        let mut stmts = Vec::new();
        if self.peek() == terminator {
            return Ok(stmts);
        }
        stmts.push(self.parse_stmt()?);
        while self.peek() == &Token::Semicolon {
            self.advance();
            if self.peek() == terminator {
                break;
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<NodeId, CompileError> {
        if let Token::Ident(name) = self.peek().clone() {
            if name.starts_with('.') && self.peek_at(1) == &Token::LBracket {
                return self.parse_for_loop(name);
            }
        }
        self.parse_comma()
    }

    fn parse_for_loop(&mut self, var: String) -> Result<NodeId, CompileError> {
        self.advance(); // ident
        self.advance(); // '['
        let mut clauses = Vec::new();
        clauses.push(self.parse_implies()?);
        while self.peek() == &Token::Comma {
            self.advance();
            clauses.push(self.parse_implies()?);
        }
        self.expect(&Token::RParen).map_err(|_| CompileError::MalformedForLoop {
            reason: "expected ')' closing for-loop header".to_string(),
        })?;

        let (init, cond, step) = match clauses.len() {
            2 => {
                let lo = clauses[0];
                let hi = clauses[1];
                let init = self.arena.push(Node::Assign(AssignOp::Assign, var.clone(), lo));
                let var_read = self.arena.push(Node::Variable(var.clone()));
                let cond = self.arena.push(Node::Binary(BinaryOp::Less, var_read, hi));
                let step = self.arena.push(Node::PostIncrement(var.clone()));
                (init, cond, step)
            }
            3 => (clauses[0], clauses[1], clauses[2]),
            n => {
                return Err(CompileError::MalformedForLoop {
                    reason: format!("expected 2 or 3 comma-separated clauses, got {}", n),
                })
            }
        };

        let body = self.parse_stmt()?;
        Ok(self.arena.push(Node::ForLoop {
            var,
            init,
            cond,
            step,
            body,
        }))
    }

    fn parse_comma(&mut self) -> Result<NodeId, CompileError> {
        let first = self.parse_implies()?;
        if self.peek() != &Token::Comma {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.peek() == &Token::Comma {
            self.advance();
            items.push(self.parse_implies()?);
        }
        Ok(self.arena.push(Node::Sequence(items)))
    }

    fn parse_implies(&mut self) -> Result<NodeId, CompileError> {
        let left = self.parse_assign()?;
        if self.peek() == &Token::Op("=>") {
            self.advance();
            let right = self.parse_implies()?;
            return Ok(self.arena.push(Node::Implies(left, right)));
        }
        Ok(left)
    }

    fn parse_assign(&mut self) -> Result<NodeId, CompileError> {
        let left = self.parse_or()?;
        let op = match self.peek() {
            Token::Op("=") => Some(AssignOp::Assign),
            Token::Op("+=") => Some(AssignOp::AddAssign),
            Token::Op("-=") => Some(AssignOp::SubAssign),
            Token::Op("*=") => Some(AssignOp::MulAssign),
            Token::Op("/=") => Some(AssignOp::DivAssign),
            _ => None,
        };
        let Some(op) = op else { return Ok(left) };
        self.advance();
        let rhs = self.parse_assign()?;
        match self.arena.get(left).clone() {
            Node::Variable(name) => Ok(self.arena.push(Node::Assign(op, name, rhs))),
            Node::ArrayRef(name, index) => {
                Ok(self.arena.push(Node::ArrayAssign(op, name, index, rhs)))
            }
            _ => Err(CompileError::UnexpectedToken(
                "assignment target must be a variable".to_string(),
            )),
        }
    }

    fn parse_or(&mut self) -> Result<NodeId, CompileError> {
        let mut left = self.parse_and()?;
        while self.peek() == &Token::Op("||") {
            self.advance();
            let right = self.parse_and()?;
            left = self.arena.push(Node::Binary(BinaryOp::Or, left, right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<NodeId, CompileError> {
        let mut left = self.parse_equality()?;
        while self.peek() == &Token::Op("&&") {
            self.advance();
            let right = self.parse_equality()?;
            left = self.arena.push(Node::Binary(BinaryOp::And, left, right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<NodeId, CompileError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::Op("==") => BinaryOp::Equal,
                Token::Op("!=") => BinaryOp::Neq,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = self.arena.push(Node::Binary(op, left, right));
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<NodeId, CompileError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Op("<") => BinaryOp::Less,
                Token::Op("<=") => BinaryOp::Leq,
                Token::Op(">") => BinaryOp::Greater,
                Token::Op(">=") => BinaryOp::Geq,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = self.arena.push(Node::Binary(op, left, right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<NodeId, CompileError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Op("+") => BinaryOp::Add,
                Token::Op("-") => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = self.arena.push(Node::Binary(op, left, right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<NodeId, CompileError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Op("*") => BinaryOp::Mul,
                Token::Op("/") => BinaryOp::Div,
                Token::Op("%") => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = self.arena.push(Node::Binary(op, left, right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<NodeId, CompileError> {
        match self.peek().clone() {
            Token::Op("!") => {
                self.advance();
                let inner = self.parse_unary()?;
                Ok(self.arena.push(Node::UnaryNot(inner)))
            }
            Token::Op("-") => {
                self.advance();
                let inner = self.parse_unary()?;
                Ok(self.arena.push(Node::UnaryNegate(inner)))
            }
            Token::Op("++") => {
                self.advance();
                let name = self.expect_ident()?;
                Ok(self.arena.push(Node::PreIncrement(name)))
            }
            Token::Op("--") => {
                self.advance();
                let name = self.expect_ident()?;
                Ok(self.arena.push(Node::PreDecrement(name)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn expect_ident(&mut self) -> Result<String, CompileError> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => Err(CompileError::UnexpectedToken(format!("{:?}", other))),
        }
    }

    fn parse_postfix(&mut self) -> Result<NodeId, CompileError> {
        let node = self.parse_primary()?;
        match self.peek() {
            Token::Op("++") => {
                if let Node::Variable(name) = self.arena.get(node).clone() {
                    self.advance();
                    return Ok(self.arena.push(Node::PostIncrement(name)));
                }
                Ok(node)
            }
            Token::Op("--") => {
                if let Node::Variable(name) = self.arena.get(node).clone() {
                    self.advance();
                    return Ok(self.arena.push(Node::PostDecrement(name)));
                }
                Ok(node)
            }
            _ => Ok(node),
        }
    }

    fn parse_primary(&mut self) -> Result<NodeId, CompileError> {
        match self.advance() {
            Token::Number(n) => {
                let record = if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    crate::record::Record::integer(n as i64)
                } else {
                    crate::record::Record::double(n)
                };
                Ok(self.arena.push(Node::Leaf(record)))
            }
            Token::Str(s) => Ok(self.arena.push(Node::Leaf(crate::record::Record::string(s)))),
            Token::LParen => {
                let stmts = self.parse_stmts(&Token::RParen)?;
                self.expect(&Token::RParen)?;
                match self.combine(stmts) {
                    Some(id) => Ok(id),
                    None => Ok(self.arena.push(Node::Leaf(crate::record::Record::new()))),
                }
            }
            Token::SysCall(name) => {
                let args = self.parse_argument_list()?;
                Ok(self.arena.push(Node::SystemCall(name, args)))
            }
            Token::Ident(name) => {
                if self.peek() == &Token::LParen {
                    let args = self.parse_argument_list()?;
                    Ok(self.arena.push(Node::Function(name, args)))
                } else if self.peek() == &Token::LBracket {
                    self.advance();
                    let index = self.parse_comma()?;
                    self.expect(&Token::RBracket)?;
                    Ok(self.arena.push(Node::ArrayRef(name, index)))
                } else {
                    Ok(self.arena.push(Node::Variable(name)))
                }
            }
            other => Err(CompileError::UnexpectedToken(format!("{:?}", other))),
        }
    }

    fn parse_argument_list(&mut self) -> Result<Vec<NodeId>, CompileError> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() != &Token::RParen {
            args.push(self.parse_implies()?);
            while self.peek() == &Token::Comma {
                self.advance();
                args.push(self.parse_implies()?);
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }
}
