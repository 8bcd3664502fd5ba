//! Recursive-descent parser for AWK source, producing the `ast::Program`
//! the compiler (§4.4) and resolver (§SPEC_FULL 2) consume.
//!
//! Same `Vec<TokenWithSpan>` + cursor shape as the teacher's `parser.rs`
//! (`current`/`peek`/`advance`/`expect`), generalized to AWK's pattern-action
//! top level and its richer expression grammar (ternary, match, concat,
//! getline forms, multi-dimensional array indexing).

use crate::ast::*;
use crate::token::{Token, TokenWithSpan};

pub struct Parser {
    tokens: Vec<TokenWithSpan>,
    pos: usize,
}

pub type PResult<T> = Result<T, String>;

impl Parser {
    pub fn new(tokens: Vec<TokenWithSpan>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).map(|t| &t.token).unwrap_or(&Token::Eof)
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos + 1).map(|t| &t.token).unwrap_or(&Token::Eof)
    }

    fn loc(&self) -> (usize, usize) {
        self.tokens
            .get(self.pos)
            .map(|t| (t.line, t.column))
            .unwrap_or((0, 0))
    }

    fn advance(&mut self) -> Token {
        let t = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn at(&self, token: &Token) -> bool {
        self.current() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> PResult<()> {
        if self.current() == &expected {
            self.advance();
            Ok(())
        } else {
            let (l, c) = self.loc();
            Err(format!(
                "{}:{}: expected {:?}, found {:?}",
                l, c, expected, self.current()
            ))
        }
    }

    fn skip_newlines(&mut self) {
        while self.at(&Token::Newline) || self.at(&Token::Semi) {
            self.advance();
        }
    }

    fn skip_opt_newlines(&mut self) {
        while self.at(&Token::Newline) {
            self.advance();
        }
    }

    fn end_of_statement(&mut self) -> PResult<()> {
        if self.at(&Token::Semi) || self.at(&Token::Newline) {
            self.advance();
            Ok(())
        } else if self.at(&Token::Eof) || self.at(&Token::RBrace) {
            Ok(())
        } else {
            let (l, c) = self.loc();
            Err(format!("{}:{}: expected statement terminator, found {:?}", l, c, self.current()))
        }
    }

    // ---- top level ----

    pub fn parse(&mut self) -> PResult<Program> {
        let mut program = Program::default();
        self.skip_newlines();
        while !self.at(&Token::Eof) {
            if self.at(&Token::Function) {
                program.functions.push(self.parse_function()?);
            } else {
                program.rules.push(self.parse_rule()?);
            }
            self.skip_newlines();
        }
        Ok(program)
    }

    fn parse_function(&mut self) -> PResult<FunctionDef> {
        self.expect(Token::Function)?;
        let name = match self.advance() {
            Token::Ident(n) => n,
            other => return Err(format!("expected function name, found {:?}", other)),
        };
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if !self.at(&Token::RParen) {
            loop {
                match self.advance() {
                    Token::Ident(n) => params.push(n),
                    other => return Err(format!("expected parameter name, found {:?}", other)),
                }
                if !self.eat(&Token::Comma) {
                    break;
                }
                self.skip_opt_newlines();
            }
        }
        self.expect(Token::RParen)?;
        self.skip_opt_newlines();
        let body = self.parse_block()?;
        Ok(FunctionDef { name, params, body })
    }

    fn parse_rule(&mut self) -> PResult<Rule> {
        let pattern = if self.eat(&Token::Begin) {
            Pattern::Begin
        } else if self.eat(&Token::End) {
            Pattern::End
        } else if self.at(&Token::LBrace) {
            Pattern::Always
        } else {
            let e1 = self.parse_expr()?;
            if self.eat(&Token::Comma) {
                self.skip_opt_newlines();
                let e2 = self.parse_expr()?;
                Pattern::Range(e1, e2)
            } else {
                Pattern::Expr(e1)
            }
        };

        let action = if self.at(&Token::LBrace) {
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Rule { pattern, action })
    }

    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(Token::LBrace)?;
        self.skip_newlines();
        let mut stmts = Vec::new();
        while !self.at(&Token::RBrace) && !self.at(&Token::Eof) {
            stmts.push(self.parse_stmt()?);
            self.skip_newlines();
        }
        self.expect(Token::RBrace)?;
        Ok(stmts)
    }

    // ---- statements ----

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        match self.current().clone() {
            Token::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            Token::If => self.parse_if(),
            Token::While => self.parse_while(),
            Token::Do => self.parse_do_while(),
            Token::For => self.parse_for(),
            Token::Break => {
                self.advance();
                self.end_of_statement()?;
                Ok(Stmt::Break)
            }
            Token::Continue => {
                self.advance();
                self.end_of_statement()?;
                Ok(Stmt::Continue)
            }
            Token::Next => {
                self.advance();
                self.end_of_statement()?;
                Ok(Stmt::Next)
            }
            Token::NextFile => {
                self.advance();
                self.end_of_statement()?;
                Ok(Stmt::NextFile)
            }
            Token::Exit => {
                self.advance();
                let e = if self.starts_expr() { Some(self.parse_expr()?) } else { None };
                self.end_of_statement()?;
                Ok(Stmt::Exit(e))
            }
            Token::Return => {
                self.advance();
                let e = if self.starts_expr() { Some(self.parse_expr()?) } else { None };
                self.end_of_statement()?;
                Ok(Stmt::Return(e))
            }
            Token::Delete => self.parse_delete(),
            Token::Print => self.parse_print(false),
            Token::Printf => self.parse_print(true),
            Token::Semi => {
                self.advance();
                Ok(Stmt::Block(vec![]))
            }
            _ => {
                let e = self.parse_expr()?;
                self.end_of_statement()?;
                Ok(Stmt::Expr(e))
            }
        }
    }

    fn starts_expr(&self) -> bool {
        !matches!(
            self.current(),
            Token::Semi | Token::Newline | Token::RBrace | Token::Eof
        )
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        self.expect(Token::If)?;
        self.expect(Token::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(Token::RParen)?;
        self.skip_opt_newlines();
        let then_branch = Box::new(self.parse_stmt()?);
        let save = self.pos;
        self.skip_newlines();
        let else_branch = if self.eat(&Token::Else) {
            self.skip_opt_newlines();
            Some(Box::new(self.parse_stmt()?))
        } else {
            self.pos = save;
            None
        };
        Ok(Stmt::If { cond, then_branch, else_branch })
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        self.expect(Token::While)?;
        self.expect(Token::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(Token::RParen)?;
        self.skip_opt_newlines();
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::While { cond, body })
    }

    fn parse_do_while(&mut self) -> PResult<Stmt> {
        self.expect(Token::Do)?;
        self.skip_opt_newlines();
        let body = Box::new(self.parse_stmt()?);
        self.skip_newlines();
        self.expect(Token::While)?;
        self.expect(Token::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(Token::RParen)?;
        self.end_of_statement()?;
        Ok(Stmt::DoWhile { body, cond })
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        self.expect(Token::For)?;
        self.expect(Token::LParen)?;

        // `for (var in array)` form: lookahead for `ident in ident )`
        if let Token::Ident(var) = self.current().clone() {
            if self.peek() == &Token::In {
                self.advance(); // var
                self.advance(); // in
                let array = match self.advance() {
                    Token::Ident(n) => n,
                    other => return Err(format!("expected array name, found {:?}", other)),
                };
                self.expect(Token::RParen)?;
                self.skip_opt_newlines();
                let body = Box::new(self.parse_stmt()?);
                return Ok(Stmt::ForIn { var, array, body });
            }
        }

        let init = if self.at(&Token::Semi) {
            None
        } else {
            Some(Box::new(self.parse_simple_stmt_no_terminator()?))
        };
        self.expect(Token::Semi)?;
        let cond = if self.at(&Token::Semi) { None } else { Some(self.parse_expr()?) };
        self.expect(Token::Semi)?;
        let step = if self.at(&Token::RParen) {
            None
        } else {
            Some(Box::new(self.parse_simple_stmt_no_terminator()?))
        };
        self.expect(Token::RParen)?;
        self.skip_opt_newlines();
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::For { init, cond, step, body })
    }

    /// A single expression-statement with no trailing terminator consumed,
    /// used for the init/step clauses of a C-style `for`.
    fn parse_simple_stmt_no_terminator(&mut self) -> PResult<Stmt> {
        let e = self.parse_expr()?;
        Ok(Stmt::Expr(e))
    }

    fn parse_delete(&mut self) -> PResult<Stmt> {
        self.expect(Token::Delete)?;
        let name = match self.advance() {
            Token::Ident(n) => n,
            other => return Err(format!("expected array name after delete, found {:?}", other)),
        };
        if self.eat(&Token::LBracket) {
            let mut idx = vec![self.parse_expr()?];
            while self.eat(&Token::Comma) {
                idx.push(self.parse_expr()?);
            }
            self.expect(Token::RBracket)?;
            self.end_of_statement()?;
            Ok(Stmt::Delete(name, idx))
        } else {
            self.end_of_statement()?;
            Ok(Stmt::DeleteAll(name))
        }
    }

    fn parse_print(&mut self, is_printf: bool) -> PResult<Stmt> {
        self.advance(); // print/printf keyword
        let mut args = Vec::new();
        if self.starts_expr() && !self.at(&Token::Gt) && !self.at(&Token::Append) && !self.at(&Token::Pipe) {
            args.push(self.parse_ternary_no_in()?);
            while self.eat(&Token::Comma) {
                self.skip_opt_newlines();
                args.push(self.parse_ternary_no_in()?);
            }
        }
        let redirect = if self.eat(&Token::Gt) {
            Some(Redirect::File(self.parse_expr()?))
        } else if self.eat(&Token::Append) {
            Some(Redirect::Append(self.parse_expr()?))
        } else if self.eat(&Token::Pipe) {
            Some(Redirect::Pipe(self.parse_expr()?))
        } else {
            None
        };
        self.end_of_statement()?;
        if is_printf {
            Ok(Stmt::Printf(args, redirect))
        } else {
            Ok(Stmt::Print(args, redirect))
        }
    }

    // ---- expressions ----
    //
    // Precedence, low to high:
    //   assignment  (right-assoc: = += -= *= /= %= ^=)
    //   ternary     ?:
    //   or          ||
    //   and         &&
    //   in          expr in array
    //   match       ~ !~
    //   relational  < <= > >= != ==   (non-associative)
    //   concat      juxtaposition
    //   additive    + -
    //   multiplicative * / %
    //   unary       + - !
    //   power       ^ (right-assoc)
    //   postfix     ++ -- (post), primary

    pub fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_assignment(true)
    }

    /// Used inside `print`/`printf` argument lists, where bare `in` after a
    /// comma-less clause is rare enough that we reuse the full grammar; the
    /// `_no_in` naming documents that unparenthesized commas at the top
    /// belong to the print statement, not to `,`-joined index expressions.
    fn parse_ternary_no_in(&mut self) -> PResult<Expr> {
        self.parse_assignment(true)
    }

    fn parse_assignment(&mut self, allow_in: bool) -> PResult<Expr> {
        let lhs = self.parse_ternary(allow_in)?;
        let op_assign = match self.current() {
            Token::Assign => None,
            Token::PlusEq => Some(BinOp::Add),
            Token::MinusEq => Some(BinOp::Sub),
            Token::StarEq => Some(BinOp::Mul),
            Token::SlashEq => Some(BinOp::Div),
            Token::PercentEq => Some(BinOp::Mod),
            Token::CaretEq => Some(BinOp::Pow),
            _ => return Ok(lhs),
        };
        let is_plain_assign = self.at(&Token::Assign);
        self.advance();
        self.skip_opt_newlines();
        let rhs = self.parse_assignment(allow_in)?;
        if is_plain_assign {
            Ok(Expr::Assign(Box::new(lhs), Box::new(rhs)))
        } else {
            Ok(Expr::OpAssign(Box::new(lhs), op_assign.unwrap(), Box::new(rhs)))
        }
    }

    fn parse_ternary(&mut self, allow_in: bool) -> PResult<Expr> {
        let cond = self.parse_or(allow_in)?;
        if self.eat(&Token::Question) {
            self.skip_opt_newlines();
            let then_e = self.parse_ternary(allow_in)?;
            self.expect(Token::Colon)?;
            self.skip_opt_newlines();
            let else_e = self.parse_ternary(allow_in)?;
            Ok(Expr::Ternary(Box::new(cond), Box::new(then_e), Box::new(else_e)))
        } else {
            Ok(cond)
        }
    }

    fn parse_or(&mut self, allow_in: bool) -> PResult<Expr> {
        let mut lhs = self.parse_and(allow_in)?;
        while self.eat(&Token::OrOr) {
            self.skip_opt_newlines();
            let rhs = self.parse_and(allow_in)?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::Or, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self, allow_in: bool) -> PResult<Expr> {
        let mut lhs = self.parse_in(allow_in)?;
        while self.eat(&Token::AndAnd) {
            self.skip_opt_newlines();
            let rhs = self.parse_in(allow_in)?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::And, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_in(&mut self, allow_in: bool) -> PResult<Expr> {
        let lhs = self.parse_match(allow_in)?;
        if allow_in && self.eat(&Token::In) {
            let name = match self.advance() {
                Token::Ident(n) => n,
                other => return Err(format!("expected array name after 'in', found {:?}", other)),
            };
            Ok(Expr::In(vec![lhs], name))
        } else {
            Ok(lhs)
        }
    }

    fn parse_match(&mut self, allow_in: bool) -> PResult<Expr> {
        let mut lhs = self.parse_relational(allow_in)?;
        loop {
            let negate = match self.current() {
                Token::Match => false,
                Token::NotMatch => true,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_relational(allow_in)?;
            lhs = Expr::Match(Box::new(lhs), Box::new(rhs), negate);
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self, allow_in: bool) -> PResult<Expr> {
        let lhs = self.parse_concat(allow_in)?;
        let op = match self.current() {
            Token::Lt => BinOp::Lt,
            Token::Le => BinOp::Le,
            Token::Gt => BinOp::Gt,
            Token::Ge => BinOp::Ge,
            Token::Ne => BinOp::Ne,
            Token::Eq => BinOp::Eq,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_concat(allow_in)?;
        Ok(Expr::BinOp(Box::new(lhs), op, Box::new(rhs)))
    }

    fn parse_concat(&mut self, allow_in: bool) -> PResult<Expr> {
        let mut lhs = self.parse_additive(allow_in)?;
        while self.starts_concat_operand(allow_in) {
            let rhs = self.parse_additive(allow_in)?;
            lhs = Expr::Concat(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn starts_concat_operand(&self, allow_in: bool) -> bool {
        match self.current() {
            Token::Number(_)
            | Token::String(_)
            | Token::Ident(_)
            | Token::Dollar
            | Token::Not
            | Token::LParen
            | Token::Incr
            | Token::Decr
            | Token::Minus
            | Token::Plus => true,
            Token::In if !allow_in => false,
            _ => false,
        }
    }

    fn parse_additive(&mut self, allow_in: bool) -> PResult<Expr> {
        let mut lhs = self.parse_multiplicative(allow_in)?;
        loop {
            let op = match self.current() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative(allow_in)?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self, allow_in: bool) -> PResult<Expr> {
        let mut lhs = self.parse_unary(allow_in)?;
        loop {
            let op = match self.current() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary(allow_in)?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self, allow_in: bool) -> PResult<Expr> {
        match self.current() {
            Token::Minus => {
                self.advance();
                Ok(Expr::UnaryOp(UnaryOp::Neg, Box::new(self.parse_unary(allow_in)?)))
            }
            Token::Plus => {
                self.advance();
                Ok(Expr::UnaryOp(UnaryOp::Pos, Box::new(self.parse_unary(allow_in)?)))
            }
            Token::Not => {
                self.advance();
                Ok(Expr::UnaryOp(UnaryOp::Not, Box::new(self.parse_unary(allow_in)?)))
            }
            _ => self.parse_power(allow_in),
        }
    }

    fn parse_power(&mut self, allow_in: bool) -> PResult<Expr> {
        let lhs = self.parse_postfix(allow_in)?;
        if self.eat(&Token::Caret) {
            let rhs = self.parse_unary(allow_in)?; // right-assoc, binds tighter than unary on rhs
            Ok(Expr::BinOp(Box::new(lhs), BinOp::Pow, Box::new(rhs)))
        } else {
            Ok(lhs)
        }
    }

    fn parse_postfix(&mut self, allow_in: bool) -> PResult<Expr> {
        let mut e = self.parse_prefix(allow_in)?;
        loop {
            match self.current() {
                Token::Incr => {
                    self.advance();
                    e = Expr::PostIncr(Box::new(e));
                }
                Token::Decr => {
                    self.advance();
                    e = Expr::PostDecr(Box::new(e));
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn parse_prefix(&mut self, allow_in: bool) -> PResult<Expr> {
        match self.current().clone() {
            Token::Incr => {
                self.advance();
                Ok(Expr::PreIncr(Box::new(self.parse_prefix(allow_in)?)))
            }
            Token::Decr => {
                self.advance();
                Ok(Expr::PreDecr(Box::new(self.parse_prefix(allow_in)?)))
            }
            Token::Dollar => {
                self.advance();
                let inner = self.parse_prefix(allow_in)?;
                Ok(Expr::Field(Box::new(inner)))
            }
            _ => self.parse_primary(allow_in),
        }
    }

    fn parse_primary(&mut self, allow_in: bool) -> PResult<Expr> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::String(s) => Ok(Expr::Str(s)),
            Token::Regex(r) => Ok(Expr::Regex(r)),
            Token::LParen => {
                let e = self.parse_expr()?;
                if self.eat(&Token::Comma) {
                    // `(e1, e2, ...) in arr` multi-dimensional membership test
                    let mut items = vec![e];
                    items.push(self.parse_expr()?);
                    while self.eat(&Token::Comma) {
                        items.push(self.parse_expr()?);
                    }
                    self.expect(Token::RParen)?;
                    self.expect(Token::In)?;
                    let name = match self.advance() {
                        Token::Ident(n) => n,
                        other => return Err(format!("expected array name after 'in', found {:?}", other)),
                    };
                    Ok(Expr::In(items, name))
                } else {
                    self.expect(Token::RParen)?;
                    Ok(Expr::Grouping(Box::new(e)))
                }
            }
            Token::Getline => self.parse_getline(None),
            Token::Ident(name) => {
                if self.at(&Token::LParen) {
                    self.parse_call(name)
                } else if self.eat(&Token::LBracket) {
                    let mut idx = vec![self.parse_expr()?];
                    while self.eat(&Token::Comma) {
                        idx.push(self.parse_expr()?);
                    }
                    self.expect(Token::RBracket)?;
                    Ok(Expr::Index(name, idx))
                } else if self.at(&Token::Pipe) && self.peek() == &Token::Getline {
                    self.advance(); // |
                    self.advance(); // getline
                    self.parse_getline_var(Some(GetlineSource::Command(Box::new(Expr::Var(name)))))
                } else {
                    let _ = allow_in;
                    Ok(Expr::Var(name))
                }
            }
            other => {
                let (l, c) = self.loc();
                Err(format!("{}:{}: unexpected token in expression: {:?}", l, c, other))
            }
        }
    }

    fn parse_call(&mut self, name: String) -> PResult<Expr> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        self.skip_opt_newlines();
        if !self.at(&Token::RParen) {
            args.push(self.parse_expr()?);
            while self.eat(&Token::Comma) {
                self.skip_opt_newlines();
                args.push(self.parse_expr()?);
            }
        }
        self.skip_opt_newlines();
        self.expect(Token::RParen)?;
        Ok(Expr::Call(name, args))
    }

    /// `getline`, `getline var`, `getline < file`, `getline var < file`.
    /// `cmd | getline [var]` is handled by the caller via `parse_getline_var`.
    fn parse_getline(&mut self, _unused: Option<()>) -> PResult<Expr> {
        let target = self.parse_optional_getline_target()?;
        if self.eat(&Token::Lt) {
            let file = self.parse_concat(false)?;
            Ok(Expr::Getline { target, source: GetlineSource::File(Box::new(file)) })
        } else {
            Ok(Expr::Getline { target, source: GetlineSource::Main })
        }
    }

    fn parse_getline_var(&mut self, source: Option<GetlineSource>) -> PResult<Expr> {
        let target = self.parse_optional_getline_target()?;
        Ok(Expr::Getline { target, source: source.unwrap_or(GetlineSource::Main) })
    }

    fn parse_optional_getline_target(&mut self) -> PResult<Option<Box<Expr>>> {
        match self.current().clone() {
            Token::Ident(name) => {
                self.advance();
                if self.eat(&Token::LBracket) {
                    let mut idx = vec![self.parse_expr()?];
                    while self.eat(&Token::Comma) {
                        idx.push(self.parse_expr()?);
                    }
                    self.expect(Token::RBracket)?;
                    Ok(Some(Box::new(Expr::Index(name, idx))))
                } else {
                    Ok(Some(Box::new(Expr::Var(name))))
                }
            }
            Token::Dollar => {
                self.advance();
                let inner = self.parse_prefix(true)?;
                Ok(Some(Box::new(Expr::Field(Box::new(inner)))))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> Program {
        let mut lex = Lexer::new(src);
        let tokens = lex.tokenize();
        Parser::new(tokens).parse().expect("parse failed")
    }

    #[test]
    fn sum_program() {
        let p = parse("{ sum += $1 } END { print sum }");
        assert_eq!(p.rules.len(), 2);
        assert_eq!(p.rules[0].pattern, Pattern::Always);
        assert_eq!(p.rules[1].pattern, Pattern::End);
    }

    #[test]
    fn range_pattern() {
        let p = parse("/start/,/stop/ { print }");
        match &p.rules[0].pattern {
            Pattern::Range(_, _) => {}
            other => panic!("expected range pattern, got {:?}", other),
        }
    }

    #[test]
    fn function_def() {
        let p = parse("function f(n) { return n <= 1 ? 1 : n * f(n - 1) } BEGIN { print f(5) }");
        assert_eq!(p.functions.len(), 1);
        assert_eq!(p.functions[0].name, "f");
        assert_eq!(p.functions[0].params, vec!["n".to_string()]);
    }

    #[test]
    fn for_in_loop() {
        let p = parse("END { for (k in count) print k, count[k] }");
        match &p.rules[0].action.as_ref().unwrap()[0] {
            Stmt::ForIn { var, array, .. } => {
                assert_eq!(var, "k");
                assert_eq!(array, "count");
            }
            other => panic!("expected ForIn, got {:?}", other),
        }
    }
}
