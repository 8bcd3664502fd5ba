//! Lexer for AWK source text.
//!
//! Same char-cursor shape as the teacher's `lexer.rs` (`Vec<char>` buffer,
//! `pos`/`line`/`column`, `advance`/`peek`/`current`), generalized to AWK's
//! token set. The one AWK-specific wrinkle the teacher's lexer didn't need:
//! `/` is ambiguous between division and a regex literal, disambiguated from
//! the previous emitted token the same way real AWK lexers do.

use crate::token::{Token, TokenWithSpan};

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    last_significant: Option<Token>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            last_significant: None,
        }
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.current();
        if let Some(ch) = c {
            self.pos += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        c
    }

    fn skip_inline_whitespace_and_comments(&mut self) {
        loop {
            match self.current() {
                Some(c) if c == ' ' || c == '\t' || c == '\r' => {
                    self.advance();
                }
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    // line continuation
                    self.advance();
                    self.advance();
                }
                Some('#') => {
                    while let Some(c) = self.current() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// A `/` begins a regex literal unless the previous token could end an
    /// expression (identifier, number, string, `)`, `]`, `$`, `++`/`--`),
    /// in which case it's division.
    fn regex_allowed_here(&self) -> bool {
        !matches!(
            self.last_significant,
            Some(
                Token::Ident(_)
                    | Token::Number(_)
                    | Token::String(_)
                    | Token::RParen
                    | Token::RBracket
                    | Token::Incr
                    | Token::Decr
                    | Token::Dollar
            )
        )
    }

    pub fn tokenize(&mut self) -> Vec<TokenWithSpan> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token();
            let is_eof = tok.token == Token::Eof;
            let prev_was_newline = out
                .last()
                .map(|t: &TokenWithSpan| t.token == Token::Newline)
                .unwrap_or(false);
            if tok.token != Token::Newline || !prev_was_newline {
                self.last_significant = Some(tok.token.clone());
                out.push(tok);
            }
            if is_eof {
                break;
            }
        }
        out
    }

    fn next_token(&mut self) -> TokenWithSpan {
        self.skip_inline_whitespace_and_comments();
        let line = self.line;
        let column = self.column;
        let tok = self.scan_one();
        TokenWithSpan { token: tok, line, column }
    }

    fn scan_one(&mut self) -> Token {
        let c = match self.current() {
            None => return Token::Eof,
            Some(c) => c,
        };

        if c == '\n' {
            self.advance();
            return Token::Newline;
        }

        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
            return self.scan_number();
        }

        if c == '_' || c.is_alphabetic() {
            return self.scan_ident_or_keyword();
        }

        if c == '"' {
            return self.scan_string();
        }

        if c == '/' && self.regex_allowed_here() {
            return self.scan_regex();
        }

        self.advance();
        match c {
            '$' => Token::Dollar,
            '+' => {
                if self.current() == Some('+') {
                    self.advance();
                    Token::Incr
                } else if self.current() == Some('=') {
                    self.advance();
                    Token::PlusEq
                } else {
                    Token::Plus
                }
            }
            '-' => {
                if self.current() == Some('-') {
                    self.advance();
                    Token::Decr
                } else if self.current() == Some('=') {
                    self.advance();
                    Token::MinusEq
                } else {
                    Token::Minus
                }
            }
            '*' => {
                if self.current() == Some('=') {
                    self.advance();
                    Token::StarEq
                } else {
                    Token::Star
                }
            }
            '/' => {
                if self.current() == Some('=') {
                    self.advance();
                    Token::SlashEq
                } else {
                    Token::Slash
                }
            }
            '%' => {
                if self.current() == Some('=') {
                    self.advance();
                    Token::PercentEq
                } else {
                    Token::Percent
                }
            }
            '^' => {
                if self.current() == Some('=') {
                    self.advance();
                    Token::CaretEq
                } else {
                    Token::Caret
                }
            }
            '=' => {
                if self.current() == Some('=') {
                    self.advance();
                    Token::Eq
                } else {
                    Token::Assign
                }
            }
            '!' => {
                if self.current() == Some('=') {
                    self.advance();
                    Token::Ne
                } else if self.current() == Some('~') {
                    self.advance();
                    Token::NotMatch
                } else {
                    Token::Not
                }
            }
            '<' => {
                if self.current() == Some('=') {
                    self.advance();
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.current() == Some('=') {
                    self.advance();
                    Token::Ge
                } else if self.current() == Some('>') {
                    self.advance();
                    Token::Append
                } else {
                    Token::Gt
                }
            }
            '~' => Token::Match,
            '&' => {
                if self.current() == Some('&') {
                    self.advance();
                    Token::AndAnd
                } else {
                    Token::Not // unsupported bitwise-and; treat defensively
                }
            }
            '|' => {
                if self.current() == Some('|') {
                    self.advance();
                    Token::OrOr
                } else {
                    Token::Pipe
                }
            }
            '(' => Token::LParen,
            ')' => Token::RParen,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ';' => Token::Semi,
            ',' => Token::Comma,
            '?' => Token::Question,
            ':' => Token::Colon,
            other => {
                // Unknown byte: surface it as a single-char ident so the
                // parser produces a location-anchored error instead of the
                // lexer silently swallowing input.
                Token::Ident(other.to_string())
            }
        }
    }

    fn scan_number(&mut self) -> Token {
        let start = self.pos;
        while self.current().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.current() == Some('.') {
            self.advance();
            while self.current().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.current(), Some('e') | Some('E')) {
            let save = self.pos;
            self.advance();
            if matches!(self.current(), Some('+') | Some('-')) {
                self.advance();
            }
            if self.current().is_some_and(|c| c.is_ascii_digit()) {
                while self.current().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            } else {
                self.pos = save;
            }
        }
        let text: String = self.input[start..self.pos].iter().collect();
        Token::Number(text.parse().unwrap_or(0.0))
    }

    fn scan_ident_or_keyword(&mut self) -> Token {
        let start = self.pos;
        while self.current().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let text: String = self.input[start..self.pos].iter().collect();
        match text.as_str() {
            "BEGIN" => Token::Begin,
            "END" => Token::End,
            "function" | "func" => Token::Function,
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "for" => Token::For,
            "do" => Token::Do,
            "break" => Token::Break,
            "continue" => Token::Continue,
            "next" => Token::Next,
            "nextfile" => Token::NextFile,
            "exit" => Token::Exit,
            "return" => Token::Return,
            "delete" => Token::Delete,
            "in" => Token::In,
            "getline" => Token::Getline,
            "print" => Token::Print,
            "printf" => Token::Printf,
            _ => Token::Ident(text),
        }
    }

    fn scan_string(&mut self) -> Token {
        self.advance(); // opening quote
        let mut s = String::new();
        while let Some(c) = self.current() {
            if c == '"' {
                self.advance();
                break;
            }
            if c == '\\' {
                self.advance();
                match self.current() {
                    Some('n') => {
                        s.push('\n');
                        self.advance();
                    }
                    Some('t') => {
                        s.push('\t');
                        self.advance();
                    }
                    Some('r') => {
                        s.push('\r');
                        self.advance();
                    }
                    Some('\\') => {
                        s.push('\\');
                        self.advance();
                    }
                    Some('"') => {
                        s.push('"');
                        self.advance();
                    }
                    Some('/') => {
                        s.push('/');
                        self.advance();
                    }
                    Some(other) => {
                        s.push(other);
                        self.advance();
                    }
                    None => break,
                }
            } else {
                s.push(c);
                self.advance();
            }
        }
        Token::String(s)
    }

    fn scan_regex(&mut self) -> Token {
        self.advance(); // opening slash
        let mut s = String::new();
        let mut in_bracket = false;
        while let Some(c) = self.current() {
            if c == '\\' {
                s.push(c);
                self.advance();
                if let Some(next) = self.current() {
                    s.push(next);
                    self.advance();
                }
                continue;
            }
            if c == '[' {
                in_bracket = true;
            } else if c == ']' {
                in_bracket = false;
            } else if c == '/' && !in_bracket {
                self.advance();
                break;
            }
            if c == '\n' {
                break;
            }
            s.push(c);
            self.advance();
        }
        Token::Regex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_vs_regex() {
        let mut lex = Lexer::new("a / b");
        let toks = lex.tokenize();
        assert_eq!(toks[1].token, Token::Slash);

        let mut lex2 = Lexer::new("/foo/");
        let toks2 = lex2.tokenize();
        assert_eq!(toks2[0].token, Token::Regex("foo".to_string()));
    }

    #[test]
    fn field_and_assign() {
        let mut lex = Lexer::new("$2 = \"X\"");
        let toks: Vec<Token> = lex.tokenize().into_iter().map(|t| t.token).collect();
        assert_eq!(
            toks,
            vec![
                Token::Dollar,
                Token::Number(2.0),
                Token::Assign,
                Token::String("X".to_string()),
                Token::Eof
            ]
        );
    }
}
