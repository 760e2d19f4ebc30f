//! A small recursive-descent frontend that turns EmberScript source text
//! into the `ast::Block` the compiler consumes.
//!
//! `ember-compiler` deliberately has no lexer/parser (spec §1, "Lexer/
//! parser frontend details beyond what the code generator consumes" is a
//! non-goal) — it only defines the `ast` boundary type. Something still
//! has to produce that type from the `.ember` files `emberc` is handed,
//! so this module plays that role for the CLI. It covers the surface
//! exercised by the spec's scenarios (arithmetic, tables, closures,
//! `pcall`, coroutines, generic/numeric `for`) rather than the full
//! grammar a production front end would need.

use ember_compiler::ast::{BinOp, Block, Expr, FunctionBody, Stat, TableField, UnOp};
use std::fmt;

#[derive(Debug)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

pub fn parse(source: &str) -> Result<Block, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut p = Parser { tokens, pos: 0 };
    let block = p.block()?;
    p.expect_eof()?;
    Ok(block)
}

// ---------------------------------------------------------------- lexer

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Number(f64),
    Str(String),
    Ident(String),
    Keyword(&'static str),
    Sym(&'static str),
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: u32,
}

const KEYWORDS: &[&str] = &[
    "nil", "true", "false", "and", "or", "not", "local", "function", "end", "if", "then",
    "elseif", "else", "while", "do", "for", "in", "repeat", "until", "return", "break",
];

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer { src: src.as_bytes(), pos: 0, line: 1 }
    }

    fn peek(&self) -> u8 {
        *self.src.get(self.pos).unwrap_or(&0)
    }

    fn peek_at(&self, off: usize) -> u8 {
        *self.src.get(self.pos + off).unwrap_or(&0)
    }

    fn bump(&mut self) -> u8 {
        let c = self.peek();
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        c
    }

    fn err(&self, msg: impl Into<String>) -> ParseError {
        ParseError { message: msg.into(), line: self.line }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia()?;
            let line = self.line;
            if self.pos >= self.src.len() {
                out.push(Token { tok: Tok::Eof, line });
                break;
            }
            let c = self.peek();
            let tok = if c.is_ascii_digit() || (c == b'.' && self.peek_at(1).is_ascii_digit()) {
                self.number()?
            } else if c == b'"' || c == b'\'' {
                self.string(c)?
            } else if c.is_ascii_alphabetic() || c == b'_' {
                self.ident_or_keyword()
            } else {
                self.symbol()?
            };
            out.push(Token { tok, line });
        }
        Ok(out)
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                }
                b'-' if self.peek_at(1) == b'-' => {
                    self.pos += 2;
                    if self.peek() == b'[' && self.peek_at(1) == b'[' {
                        self.pos += 2;
                        while self.pos < self.src.len()
                            && !(self.peek() == b']' && self.peek_at(1) == b']')
                        {
                            self.bump();
                        }
                        self.pos += 2;
                    } else {
                        while self.pos < self.src.len() && self.peek() != b'\n' {
                            self.pos += 1;
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn number(&mut self) -> Result<Tok, ParseError> {
        let start = self.pos;
        if self.peek() == b'0' && (self.peek_at(1) == b'x' || self.peek_at(1) == b'X') {
            self.pos += 2;
            while self.peek().is_ascii_hexdigit() {
                self.pos += 1;
            }
            let text = std::str::from_utf8(&self.src[start + 2..self.pos]).unwrap();
            let v = i64::from_str_radix(text, 16)
                .map_err(|_| self.err("malformed hex number"))? as f64;
            return Ok(Tok::Number(v));
        }
        while self.peek().is_ascii_digit() {
            self.pos += 1;
        }
        if self.peek() == b'.' {
            self.pos += 1;
            while self.peek().is_ascii_digit() {
                self.pos += 1;
            }
        }
        if self.peek() == b'e' || self.peek() == b'E' {
            self.pos += 1;
            if self.peek() == b'+' || self.peek() == b'-' {
                self.pos += 1;
            }
            while self.peek().is_ascii_digit() {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        text.parse::<f64>()
            .map(Tok::Number)
            .map_err(|_| self.err(format!("malformed number '{text}'")))
    }

    fn string(&mut self, quote: u8) -> Result<Tok, ParseError> {
        self.bump();
        let mut s = String::new();
        loop {
            if self.pos >= self.src.len() {
                return Err(self.err("unterminated string"));
            }
            let c = self.bump();
            if c == quote {
                break;
            }
            if c == b'\\' {
                let esc = self.bump();
                s.push(match esc {
                    b'n' => '\n',
                    b't' => '\t',
                    b'r' => '\r',
                    b'\\' => '\\',
                    b'"' => '"',
                    b'\'' => '\'',
                    other => other as char,
                });
            } else {
                s.push(c as char);
            }
        }
        Ok(Tok::Str(s))
    }

    fn ident_or_keyword(&mut self) -> Tok {
        let start = self.pos;
        while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        match KEYWORDS.iter().find(|k| **k == text) {
            Some(kw) => Tok::Keyword(kw),
            None => Tok::Ident(text.to_string()),
        }
    }

    fn symbol(&mut self) -> Result<Tok, ParseError> {
        let three = [self.peek(), self.peek_at(1), self.peek_at(2)];
        if &three == b"..." {
            self.pos += 3;
            return Ok(Tok::Sym("..."));
        }
        let two = [self.peek(), self.peek_at(1)];
        let sym2 = match &two {
            b"==" => Some("=="),
            b"~=" => Some("~="),
            b"<=" => Some("<="),
            b">=" => Some(">="),
            b".." => Some(".."),
            _ => None,
        };
        if let Some(s) = sym2 {
            self.pos += 2;
            return Ok(Tok::Sym(s));
        }
        let c = self.bump();
        let sym1: &'static str = match c {
            b'+' => "+",
            b'-' => "-",
            b'*' => "*",
            b'/' => "/",
            b'%' => "%",
            b'^' => "^",
            b'#' => "#",
            b'=' => "=",
            b'<' => "<",
            b'>' => ">",
            b'(' => "(",
            b')' => ")",
            b'{' => "{",
            b'}' => "}",
            b'[' => "[",
            b']' => "]",
            b';' => ";",
            b':' => ":",
            b',' => ",",
            b'.' => ".",
            other => return Err(self.err(format!("unexpected character '{}'", other as char))),
        };
        Ok(Tok::Sym(sym1))
    }
}

// --------------------------------------------------------------- parser

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn cur(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn err(&self, msg: impl Into<String>) -> ParseError {
        ParseError { message: msg.into(), line: self.line() }
    }

    fn advance(&mut self) -> Tok {
        let t = self.cur().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn at_sym(&self, s: &str) -> bool {
        matches!(self.cur(), Tok::Sym(x) if *x == s)
    }

    fn at_kw(&self, k: &str) -> bool {
        matches!(self.cur(), Tok::Keyword(x) if *x == k)
    }

    fn eat_sym(&mut self, s: &str) -> Result<(), ParseError> {
        if self.at_sym(s) {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected '{s}'")))
        }
    }

    fn eat_kw(&mut self, k: &str) -> Result<(), ParseError> {
        if self.at_kw(k) {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected '{k}'")))
        }
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if matches!(self.cur(), Tok::Eof) {
            Ok(())
        } else {
            Err(self.err("unexpected trailing input"))
        }
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        match self.advance() {
            Tok::Ident(name) => Ok(name),
            _ => Err(self.err("expected identifier")),
        }
    }

    fn block_end(&self) -> bool {
        matches!(self.cur(), Tok::Eof)
            || self.at_kw("end")
            || self.at_kw("else")
            || self.at_kw("elseif")
            || self.at_kw("until")
    }

    fn block(&mut self) -> Result<Block, ParseError> {
        let mut stats = Vec::new();
        while !self.block_end() {
            if self.at_sym(";") {
                self.advance();
                continue;
            }
            if self.at_kw("return") {
                stats.push(self.return_stat()?);
                break;
            }
            stats.push(self.statement()?);
        }
        Ok(stats)
    }

    fn return_stat(&mut self) -> Result<Stat, ParseError> {
        self.advance();
        let exprs = if self.block_end() || self.at_sym(";") {
            Vec::new()
        } else {
            self.expr_list()?
        };
        if self.at_sym(";") {
            self.advance();
        }
        Ok(Stat::Return(exprs))
    }

    fn statement(&mut self) -> Result<Stat, ParseError> {
        if self.at_kw("local") {
            return self.local_stat();
        }
        if self.at_kw("if") {
            return self.if_stat();
        }
        if self.at_kw("while") {
            return self.while_stat();
        }
        if self.at_kw("repeat") {
            return self.repeat_stat();
        }
        if self.at_kw("for") {
            return self.for_stat();
        }
        if self.at_kw("do") {
            self.advance();
            let body = self.block()?;
            self.eat_kw("end")?;
            return Ok(Stat::Do(body));
        }
        if self.at_kw("break") {
            self.advance();
            return Ok(Stat::Break);
        }
        if self.at_kw("function") {
            return self.function_stat();
        }
        self.expr_stat()
    }

    fn local_stat(&mut self) -> Result<Stat, ParseError> {
        self.advance();
        if self.at_kw("function") {
            self.advance();
            let name = self.ident()?;
            let body = self.function_body()?;
            return Ok(Stat::LocalFunction(name, Box::new(body)));
        }
        let mut names = vec![self.ident()?];
        while self.at_sym(",") {
            self.advance();
            names.push(self.ident()?);
        }
        let exprs = if self.at_sym("=") {
            self.advance();
            self.expr_list()?
        } else {
            Vec::new()
        };
        Ok(Stat::Local(names, exprs))
    }

    fn if_stat(&mut self) -> Result<Stat, ParseError> {
        self.advance();
        let mut arms = Vec::new();
        let cond = self.expr()?;
        self.eat_kw("then")?;
        let body = self.block()?;
        arms.push((cond, body));
        while self.at_kw("elseif") {
            self.advance();
            let cond = self.expr()?;
            self.eat_kw("then")?;
            let body = self.block()?;
            arms.push((cond, body));
        }
        let else_body = if self.at_kw("else") {
            self.advance();
            Some(self.block()?)
        } else {
            None
        };
        self.eat_kw("end")?;
        Ok(Stat::If(arms, else_body))
    }

    fn while_stat(&mut self) -> Result<Stat, ParseError> {
        self.advance();
        let cond = self.expr()?;
        self.eat_kw("do")?;
        let body = self.block()?;
        self.eat_kw("end")?;
        Ok(Stat::While(cond, body))
    }

    fn repeat_stat(&mut self) -> Result<Stat, ParseError> {
        self.advance();
        let body = self.block()?;
        self.eat_kw("until")?;
        let cond = self.expr()?;
        Ok(Stat::Repeat(body, cond))
    }

    fn for_stat(&mut self) -> Result<Stat, ParseError> {
        self.advance();
        let first = self.ident()?;
        if self.at_sym("=") {
            self.advance();
            let start = self.expr()?;
            self.eat_sym(",")?;
            let stop = self.expr()?;
            let step = if self.at_sym(",") {
                self.advance();
                Some(self.expr()?)
            } else {
                None
            };
            self.eat_kw("do")?;
            let body = self.block()?;
            self.eat_kw("end")?;
            return Ok(Stat::NumericFor { var: first, start, stop, step, body });
        }
        let mut vars = vec![first];
        while self.at_sym(",") {
            self.advance();
            vars.push(self.ident()?);
        }
        self.eat_kw("in")?;
        let exprs = self.expr_list()?;
        self.eat_kw("do")?;
        let body = self.block()?;
        self.eat_kw("end")?;
        Ok(Stat::GenericFor { vars, exprs, body })
    }

    fn function_stat(&mut self) -> Result<Stat, ParseError> {
        self.advance();
        let mut target = Expr::Ident(self.ident()?);
        let mut is_method = false;
        loop {
            if self.at_sym(".") {
                self.advance();
                let name = self.ident()?;
                target = Expr::Field(Box::new(target), name);
            } else if self.at_sym(":") {
                self.advance();
                let name = self.ident()?;
                target = Expr::Field(Box::new(target), name);
                is_method = true;
                break;
            } else {
                break;
            }
        }
        let mut body = self.function_body()?;
        if is_method {
            body.params.insert(0, "self".to_string());
        }
        Ok(Stat::FunctionDecl(target, Box::new(body)))
    }

    fn function_body(&mut self) -> Result<FunctionBody, ParseError> {
        let line = self.line();
        self.eat_sym("(")?;
        let mut params = Vec::new();
        let mut is_vararg = false;
        if !self.at_sym(")") {
            loop {
                if self.at_sym("...") {
                    self.advance();
                    is_vararg = true;
                    break;
                }
                params.push(self.ident()?);
                if self.at_sym(",") {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.eat_sym(")")?;
        let body = self.block()?;
        self.eat_kw("end")?;
        Ok(FunctionBody { params, is_vararg, body, line })
    }

    fn expr_stat(&mut self) -> Result<Stat, ParseError> {
        let first = self.suffixed_expr()?;
        if self.at_sym("=") || self.at_sym(",") {
            let mut targets = vec![first];
            while self.at_sym(",") {
                self.advance();
                targets.push(self.suffixed_expr()?);
            }
            self.eat_sym("=")?;
            let values = self.expr_list()?;
            return Ok(Stat::Assign(targets, values));
        }
        match &first {
            Expr::Call(..) | Expr::MethodCall(..) => Ok(Stat::ExprStat(first)),
            _ => Err(self.err("syntax error: expression statement must be a call")),
        }
    }

    fn expr_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut out = vec![self.expr()?];
        while self.at_sym(",") {
            self.advance();
            out.push(self.expr()?);
        }
        Ok(out)
    }

    // Precedence climbing: or < and < relational < concat (right) <
    // additive < multiplicative < unary < pow (right), matching Lua.
    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and_expr()?;
        while self.at_kw("or") {
            self.advance();
            let rhs = self.and_expr()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.rel_expr()?;
        while self.at_kw("and") {
            self.advance();
            let rhs = self.rel_expr()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn rel_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.concat_expr()?;
        loop {
            let op = match self.cur() {
                Tok::Sym("==") => BinOp::Eq,
                Tok::Sym("~=") => BinOp::Ne,
                Tok::Sym("<") => BinOp::Lt,
                Tok::Sym("<=") => BinOp::Le,
                Tok::Sym(">") => BinOp::Gt,
                Tok::Sym(">=") => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.concat_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn concat_expr(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.additive_expr()?;
        if self.at_sym("..") {
            self.advance();
            let rhs = self.concat_expr()?;
            return Ok(Expr::Binary(BinOp::Concat, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn additive_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.mul_expr()?;
        loop {
            let op = match self.cur() {
                Tok::Sym("+") => BinOp::Add,
                Tok::Sym("-") => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.mul_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn mul_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.cur() {
                Tok::Sym("*") => BinOp::Mul,
                Tok::Sym("/") => BinOp::Div,
                Tok::Sym("%") => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.unary_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<Expr, ParseError> {
        let op = match self.cur() {
            Tok::Keyword("not") => Some(UnOp::Not),
            Tok::Sym("-") => Some(UnOp::Neg),
            Tok::Sym("#") => Some(UnOp::Len),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.unary_expr()?;
            return Ok(Expr::Unary(op, Box::new(operand)));
        }
        self.pow_expr()
    }

    fn pow_expr(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.suffixed_expr()?;
        if self.at_sym("^") {
            self.advance();
            let rhs = self.unary_expr()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn suffixed_expr(&mut self) -> Result<Expr, ParseError> {
        let mut e = self.primary_expr()?;
        loop {
            if self.at_sym(".") {
                self.advance();
                let name = self.ident()?;
                e = Expr::Field(Box::new(e), name);
            } else if self.at_sym("[") {
                self.advance();
                let idx = self.expr()?;
                self.eat_sym("]")?;
                e = Expr::Index(Box::new(e), Box::new(idx));
            } else if self.at_sym("(") {
                let args = self.call_args()?;
                e = Expr::Call(Box::new(e), args);
            } else if self.at_sym(":") {
                self.advance();
                let name = self.ident()?;
                let args = self.call_args()?;
                e = Expr::MethodCall(Box::new(e), name, args);
            } else if matches!(self.cur(), Tok::Str(_)) {
                let args = vec![self.primary_expr()?];
                e = Expr::Call(Box::new(e), args);
            } else if self.at_sym("{") {
                let args = vec![self.table_expr()?];
                e = Expr::Call(Box::new(e), args);
            } else {
                break;
            }
        }
        Ok(e)
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.eat_sym("(")?;
        let args = if self.at_sym(")") {
            Vec::new()
        } else {
            self.expr_list()?
        };
        self.eat_sym(")")?;
        Ok(args)
    }

    fn primary_expr(&mut self) -> Result<Expr, ParseError> {
        match self.cur().clone() {
            Tok::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Tok::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Tok::Keyword("nil") => {
                self.advance();
                Ok(Expr::Nil)
            }
            Tok::Keyword("true") => {
                self.advance();
                Ok(Expr::True)
            }
            Tok::Keyword("false") => {
                self.advance();
                Ok(Expr::False)
            }
            Tok::Sym("...") => {
                self.advance();
                Ok(Expr::Vararg)
            }
            Tok::Keyword("function") => {
                self.advance();
                let body = self.function_body()?;
                Ok(Expr::Function(Box::new(body)))
            }
            Tok::Ident(name) => {
                self.advance();
                Ok(Expr::Ident(name))
            }
            Tok::Sym("(") => {
                self.advance();
                let inner = self.expr()?;
                self.eat_sym(")")?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            Tok::Sym("{") => self.table_expr(),
            _ => Err(self.err("unexpected token")),
        }
    }

    fn table_expr(&mut self) -> Result<Expr, ParseError> {
        self.eat_sym("{")?;
        let mut fields = Vec::new();
        while !self.at_sym("}") {
            if self.at_sym("[") {
                self.advance();
                let key = self.expr()?;
                self.eat_sym("]")?;
                self.eat_sym("=")?;
                let value = self.expr()?;
                fields.push(TableField::Indexed(key, value));
            } else if matches!(self.cur(), Tok::Ident(_)) && self.peek_is_assign() {
                let name = self.ident()?;
                self.eat_sym("=")?;
                let value = self.expr()?;
                fields.push(TableField::Named(name, value));
            } else {
                fields.push(TableField::Positional(self.expr()?));
            }
            if self.at_sym(",") || self.at_sym(";") {
                self.advance();
            } else {
                break;
            }
        }
        self.eat_sym("}")?;
        Ok(Expr::Table(fields))
    }

    fn peek_is_assign(&self) -> bool {
        matches!(self.tokens.get(self.pos + 1).map(|t| &t.tok), Some(Tok::Sym("=")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_local_assignment_and_return() {
        let block = parse("local x = 1\nreturn x + 2").unwrap();
        assert_eq!(block.len(), 2);
        assert!(matches!(&block[0], Stat::Local(names, exprs) if names == &["x"] && exprs.len() == 1));
        assert!(matches!(&block[1], Stat::Return(exprs) if exprs.len() == 1));
    }

    #[test]
    fn operator_precedence_binds_multiplicative_tighter_than_additive() {
        let block = parse("return 1 + 2 * 3").unwrap();
        match &block[0] {
            Stat::Return(exprs) => match &exprs[0] {
                Expr::Binary(BinOp::Add, lhs, rhs) => {
                    assert!(matches!(**lhs, Expr::Number(n) if n == 1.0));
                    assert!(matches!(**rhs, Expr::Binary(BinOp::Mul, _, _)));
                }
                other => panic!("expected Add at the top, got {other:?}"),
            },
            other => panic!("expected a return statement, got {other:?}"),
        }
    }

    #[test]
    fn concat_is_right_associative() {
        let block = parse(r#"return "a" .. "b" .. "c""#).unwrap();
        match &block[0] {
            Stat::Return(exprs) => match &exprs[0] {
                Expr::Binary(BinOp::Concat, lhs, rhs) => {
                    assert!(matches!(**lhs, Expr::Str(ref s) if s == "a"));
                    assert!(matches!(**rhs, Expr::Binary(BinOp::Concat, _, _)));
                }
                other => panic!("expected Concat at the top, got {other:?}"),
            },
            other => panic!("expected a return statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_if_elseif_else() {
        let block = parse("if x then y = 1 elseif z then y = 2 else y = 3 end").unwrap();
        match &block[0] {
            Stat::If(arms, else_block) => {
                assert_eq!(arms.len(), 2);
                assert!(else_block.is_some());
            }
            other => panic!("expected an if statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_numeric_and_generic_for() {
        let block = parse("for i = 1, 10, 2 do end\nfor k, v in pairs(t) do end").unwrap();
        assert!(matches!(&block[0], Stat::NumericFor { .. }));
        assert!(matches!(&block[1], Stat::GenericFor { .. }));
    }

    #[test]
    fn parses_table_constructor_with_mixed_fields() {
        let block = parse("return { 1, 2, name = \"a\", [3] = true }").unwrap();
        match &block[0] {
            Stat::Return(exprs) => match &exprs[0] {
                Expr::Table(fields) => assert_eq!(fields.len(), 4),
                other => panic!("expected a table constructor, got {other:?}"),
            },
            other => panic!("expected a return statement, got {other:?}"),
        }
    }

    #[test]
    fn desugars_method_call_with_implicit_self() {
        let block = parse("obj:greet(\"hi\")").unwrap();
        match &block[0] {
            Stat::ExprStat(Expr::MethodCall(_, name, args)) => {
                assert_eq!(name, "greet");
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected a method call statement, got {other:?}"),
        }
    }

    #[test]
    fn function_declaration_desugars_to_local_function() {
        let block = parse("local function add(a, b) return a + b end").unwrap();
        match &block[0] {
            Stat::LocalFunction(name, body) => {
                assert_eq!(name, "add");
                assert_eq!(body.params, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected a local function statement, got {other:?}"),
        }
    }

    #[test]
    fn reports_line_number_on_syntax_error() {
        let err = parse("local x =\nend").unwrap_err();
        assert_eq!(err.line, 2);
    }
}
