use std::collections::HashMap;
use std::sync::OnceLock;

use crate::context::RAW_STRING_TIER;
use crate::error::Diagnostic;
use crate::reader::{Reader, SENTINEL};
use crate::token::{Kind, Position, Token};

const KEYWORDS: &[(&str, Kind)] = &[
    ("if", Kind::If),
    ("then", Kind::Then),
    ("else", Kind::Else),
    ("while", Kind::While),
    ("do", Kind::Do),
    ("for", Kind::For),
    ("until", Kind::Until),
    ("repeat", Kind::Repeat),
    ("with", Kind::With),
    ("switch", Kind::Switch),
    ("case", Kind::Case),
    ("default", Kind::Default),
    ("return", Kind::Return),
    ("exit", Kind::Exit),
    ("break", Kind::Break),
    ("continue", Kind::Continue),
    ("var", Kind::Var),
    ("globalvar", Kind::GlobalVar),
    ("struct", Kind::Struct),
    ("enum", Kind::Enum),
    ("and", Kind::LogicalAnd),
    ("or", Kind::LogicalOr),
    ("xor", Kind::LogicalXor),
    ("not", Kind::Bang),
    ("mod", Kind::Percent),
    ("div", Kind::IntDiv),
    ("begin", Kind::LBrace),
    ("end", Kind::RBrace),
];

// Two-character operators win over their one-character prefix.
const DOUBLE_OPERATORS: &[(char, char, Kind)] = &[
    ('=', '=', Kind::Equal),
    ('!', '=', Kind::NotEqual),
    ('<', '>', Kind::NotEqual),
    ('<', '=', Kind::LessEqual),
    ('>', '=', Kind::GreaterEqual),
    ('<', '<', Kind::ShiftLeft),
    ('>', '>', Kind::ShiftRight),
    ('&', '&', Kind::LogicalAnd),
    ('|', '|', Kind::LogicalOr),
    ('^', '^', Kind::LogicalXor),
    ('+', '=', Kind::PlusAssign),
    ('-', '=', Kind::MinusAssign),
    ('*', '=', Kind::StarAssign),
    ('/', '=', Kind::SlashAssign),
    ('%', '=', Kind::PercentAssign),
    ('|', '=', Kind::OrAssign),
    ('&', '=', Kind::AndAssign),
    ('^', '=', Kind::XorAssign),
    ('+', '+', Kind::Increment),
    ('-', '-', Kind::Decrement),
    (':', '=', Kind::Assign),
];

const SINGLE_OPERATORS: &[(char, Kind)] = &[
    ('+', Kind::Plus),
    ('-', Kind::Minus),
    ('*', Kind::Star),
    ('/', Kind::Slash),
    ('%', Kind::Percent),
    ('=', Kind::Assign),
    ('<', Kind::Less),
    ('>', Kind::Greater),
    ('&', Kind::BitAnd),
    ('|', Kind::BitOr),
    ('^', Kind::BitXor),
    ('~', Kind::BitNot),
    ('!', Kind::Bang),
    ('?', Kind::Question),
    (':', Kind::Colon),
    ('.', Kind::Dot),
    (',', Kind::Comma),
    (';', Kind::Semicolon),
    ('(', Kind::LParen),
    (')', Kind::RParen),
    ('{', Kind::LBrace),
    ('}', Kind::RBrace),
    (']', Kind::RBracket),
];

fn keywords() -> &'static HashMap<&'static str, Kind> {
    static TABLE: OnceLock<HashMap<&'static str, Kind>> = OnceLock::new();
    TABLE.get_or_init(|| KEYWORDS.iter().copied().collect())
}

pub fn keyword(ident: &str) -> Option<Kind> {
    keywords().get(ident).copied()
}

/// Tokenizes `source` for the given language version tier.
pub fn tokenize(source: &str, tier: u32) -> Result<Vec<Token>, Diagnostic> {
    Lexer::new(source, tier).tokenize()
}

pub struct Lexer {
    reader: Reader,
    tier: u32,
}

impl Lexer {
    pub fn new(source: &str, tier: u32) -> Self {
        Self {
            reader: Reader::new(source),
            tier,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();

        loop {
            self.skip_trivia();
            if self.reader.is_eof() {
                break;
            }

            let ch = self.reader.at();
            let next = self.reader.peek(1);
            let token = match ch {
                '$' if next.is_ascii_hexdigit() => self.read_hex(1),
                '0' if matches!(next, 'x' | 'X') && self.reader.peek(2).is_ascii_hexdigit() => {
                    self.read_hex(2)
                }
                c if c.is_ascii_digit() => self.read_decimal(),
                '.' if next.is_ascii_digit() => self.read_decimal(),
                '"' => self.read_escaped_string('"'),
                '\'' if self.tier < RAW_STRING_TIER => self.read_escaped_string('\''),
                '@' if matches!(next, '"' | '\'') => self.read_raw_string(next),
                c if c.is_ascii_alphabetic() || c == '_' => self.read_identifier(),
                _ => self.read_operator()?,
            };
            tokens.push(token);
        }

        tokens.push(Token {
            kind: Kind::EOF,
            value: String::new(),
            position: self.reader.position(),
        });

        Ok(tokens)
    }

    fn skip_trivia(&mut self) {
        loop {
            let ch = self.reader.at();
            if self.reader.is_eof() {
                return;
            }

            if ch.is_whitespace() {
                self.reader.advance(1);
            } else if ch == '/' && self.reader.peek(1) == '/' {
                self.skip_line();
            } else if ch == '/' && self.reader.peek(1) == '*' {
                self.reader.advance(2);
                while !self.reader.is_eof()
                    && !(self.reader.at() == '*' && self.reader.peek(1) == '/')
                {
                    self.reader.advance(1);
                }
                self.reader.advance(2);
            } else if ch == '#' && self.reader.is_line_start() {
                self.skip_line();
            } else {
                return;
            }
        }
    }

    fn skip_line(&mut self) {
        while !self.reader.is_eof() && self.reader.at() != '\n' {
            self.reader.advance(1);
        }
    }

    fn create_token(&self, kind: Kind, value: String, position: Position) -> Token {
        Token {
            kind,
            value,
            position,
        }
    }

    fn take_while(&mut self, value: &mut String, mut accept: impl FnMut(char) -> bool) {
        while !self.reader.is_eof() && accept(self.reader.at()) {
            value.push(self.reader.at());
            self.reader.advance(1);
        }
    }

    fn read_hex(&mut self, prefix_len: usize) -> Token {
        let position = self.reader.position();
        let mut value = String::new();
        for _ in 0..prefix_len {
            value.push(self.reader.at());
            self.reader.advance(1);
        }
        self.take_while(&mut value, |c| c.is_ascii_hexdigit());
        self.create_token(Kind::Number, value, position)
    }

    fn read_decimal(&mut self) -> Token {
        let position = self.reader.position();
        let mut value = String::new();
        let mut seen_dot = false;
        self.take_while(&mut value, |c| {
            if c == '.' && !seen_dot {
                seen_dot = true;
                true
            } else {
                c.is_ascii_digit()
            }
        });
        self.create_token(Kind::Number, value, position)
    }

    fn read_identifier(&mut self) -> Token {
        let position = self.reader.position();
        let mut ident = String::new();
        self.take_while(&mut ident, |c| c.is_ascii_alphanumeric() || c == '_');
        let kind = keyword(&ident).unwrap_or(Kind::Identifier);
        self.create_token(kind, ident, position)
    }

    /// An unterminated literal stops at the source's final line terminator.
    fn at_literal_end(&self) -> bool {
        self.reader.is_eof()
            || (self.reader.at() == '\n' && self.reader.index() + 1 == self.reader.len())
    }

    fn read_raw_string(&mut self, quote: char) -> Token {
        let position = self.reader.position();
        self.reader.advance(2);
        let mut value = String::new();
        while !self.at_literal_end() {
            let ch = self.reader.at();
            self.reader.advance(1);
            if ch == quote {
                break;
            }
            value.push(ch);
        }
        self.create_token(Kind::RawString, value, position)
    }

    fn read_escaped_string(&mut self, quote: char) -> Token {
        let position = self.reader.position();
        self.reader.advance(1);
        let mut value = String::new();
        while !self.at_literal_end() {
            let ch = self.reader.at();
            self.reader.advance(1);
            if ch == quote {
                break;
            }
            if ch == '\\' {
                self.read_escape(&mut value);
            } else {
                value.push(ch);
            }
        }
        self.create_token(Kind::String, value, position)
    }

    fn read_escape(&mut self, value: &mut String) {
        let ch = self.reader.at();
        if ch == SENTINEL && self.reader.is_eof() {
            return;
        }
        self.reader.advance(1);

        match ch {
            'n' => value.push('\n'),
            'r' => value.push('\r'),
            't' => value.push('\t'),
            'a' => value.push('\u{07}'),
            'v' => value.push('\u{0B}'),
            'f' => value.push('\u{0C}'),
            'b' => value.push('\u{08}'),
            '\n' => {}
            'u' => self.push_code_point(value, 'u', 16, 4),
            'x' => self.push_code_point(value, 'x', 16, 2),
            '0'..='7' => {
                let mut code = ch.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.reader.at().to_digit(8) {
                        Some(digit) => {
                            code = code * 8 + digit;
                            self.reader.advance(1);
                        }
                        None => break,
                    }
                }
                value.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            other => value.push(other),
        }
    }

    fn push_code_point(&mut self, value: &mut String, escape: char, radix: u32, max_digits: usize) {
        let mut code = 0;
        let mut digits = 0;
        while digits < max_digits {
            match self.reader.at().to_digit(radix) {
                Some(digit) => {
                    code = code * radix + digit;
                    digits += 1;
                    self.reader.advance(1);
                }
                None => break,
            }
        }
        if digits == 0 {
            value.push(escape);
        } else {
            value.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
        }
    }

    fn read_operator(&mut self) -> Result<Token, Diagnostic> {
        let position = self.reader.position();
        let ch = self.reader.at();
        let next = self.reader.peek(1);

        if ch == '[' {
            let kind = match next {
                '?' => Kind::MapIndex,
                // `[@"` opens an array literal whose first element is a raw string.
                '@' if matches!(self.reader.peek(2), '"' | '\'') => Kind::LBracket,
                '@' => Kind::ArrayRefIndex,
                '#' => Kind::GridIndex,
                '|' => Kind::ListIndex,
                _ => Kind::LBracket,
            };
            let len = if kind == Kind::LBracket { 1 } else { 2 };
            return Ok(self.operator_token(kind, len, position));
        }

        if let Some((_, _, kind)) = DOUBLE_OPERATORS
            .iter()
            .find(|(first, second, _)| *first == ch && *second == next)
        {
            return Ok(self.operator_token(*kind, 2, position));
        }

        if let Some((_, kind)) = SINGLE_OPERATORS.iter().find(|(c, _)| *c == ch) {
            return Ok(self.operator_token(*kind, 1, position));
        }

        Err(Diagnostic::lexical(
            format!("Unrecognized character {:?}", ch),
            position,
        ))
    }

    fn operator_token(&mut self, kind: Kind, len: usize, position: Position) -> Token {
        let value: String = (0..len).map(|i| self.reader.peek(i)).collect();
        self.reader.advance(len);
        self.create_token(kind, value, position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;

    fn kinds(source: &str) -> Vec<Kind> {
        tokenize(source, 2).unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn single(source: &str, tier: u32) -> Token {
        let tokens = tokenize(source, tier).unwrap();
        assert_eq!(tokens.len(), 2, "expected one token in {:?}: {:?}", source, tokens);
        tokens.into_iter().next().unwrap()
    }

    #[test]
    fn ends_with_exactly_one_eof() {
        for source in ["", "   ", "a b c", "// only a comment", "\"open", "/* open", "#define x"] {
            let tokens = tokenize(source, 2).unwrap();
            let eofs = tokens.iter().filter(|t| t.kind == Kind::EOF).count();
            assert_eq!(eofs, 1, "source {:?}", source);
            assert_eq!(tokens.last().map(|t| t.kind), Some(Kind::EOF));
        }
    }

    #[test]
    fn numeric_literals_keep_their_text() {
        for source in ["123", "0x1F", "$1F", ".5", "3.25"] {
            let token = single(source, 2);
            assert_eq!(token.kind, Kind::Number);
            assert_eq!(token.value, source);
        }
    }

    #[test]
    fn decimal_allows_a_single_dot() {
        let tokens = tokenize("1.2.3", 2).unwrap();
        assert_eq!(tokens[0].value, "1.2");
        assert_eq!(tokens[1].value, ".3");
    }

    #[test]
    fn positions_are_one_based() {
        let tokens = tokenize("a\nb", 2).unwrap();
        assert_eq!(tokens[1].position.line, 2);
        assert_eq!(tokens[1].position.column, 1);
        assert_eq!(tokens[1].position.index, 2);
    }

    #[test]
    fn escaped_string_decodes() {
        let token = single(r#""\n\t\\""#, 2);
        assert_eq!(token.kind, Kind::String);
        assert_eq!(token.value, "\n\t\\");
    }

    #[test]
    fn numeric_escapes() {
        assert_eq!(single(r#""\u41\x42\103""#, 2).value, "ABC");
        assert_eq!(single(r#""\u00e9""#, 2).value, "\u{e9}");
        assert_eq!(single(r#""\0""#, 2).value, "\0");
        // Octal stops after three digits.
        assert_eq!(single(r#""\1018""#, 2).value, "A8");
        assert_eq!(single(r#""\q\x""#, 2).value, "qx");
    }

    #[test]
    fn line_continuation_emits_nothing() {
        assert_eq!(single("\"ab\\\ncd\"", 2).value, "abcd");
    }

    #[test]
    fn raw_string_is_verbatim() {
        let token = single(r#"@"a\nb""#, 2);
        assert_eq!(token.kind, Kind::RawString);
        assert_eq!(token.value, "a\\nb");
        assert_eq!(token.value.chars().count(), 4);
        assert_eq!(single(r#"@'it"s'"#, 2).value, "it\"s");
    }

    #[test]
    fn single_quotes_depend_on_tier() {
        assert_eq!(single("'hi'", 1).kind, Kind::String);
        let err = tokenize("'hi'", 2).unwrap_err();
        assert_eq!(err.stage, Stage::Lexical);
    }

    #[test]
    fn unterminated_string_stops_at_final_terminator() {
        let token = single("\"abc", 2);
        assert_eq!(token.kind, Kind::String);
        assert_eq!(token.value, "abc");
        let token = single("\"abc\\", 2);
        assert_eq!(token.value, "abc");
    }

    #[test]
    fn legacy_not_equal() {
        assert_eq!(kinds("<> !="), vec![Kind::NotEqual, Kind::NotEqual, Kind::EOF]);
    }

    #[test]
    fn keyword_aliases() {
        assert_eq!(
            kinds("begin end and or xor not mod div"),
            vec![
                Kind::LBrace,
                Kind::RBrace,
                Kind::LogicalAnd,
                Kind::LogicalOr,
                Kind::LogicalXor,
                Kind::Bang,
                Kind::Percent,
                Kind::IntDiv,
                Kind::EOF,
            ]
        );
    }

    #[test]
    fn compound_operators_win() {
        assert_eq!(
            kinds("a := b += 1; c++ << 2 >= d"),
            vec![
                Kind::Identifier,
                Kind::Assign,
                Kind::Identifier,
                Kind::PlusAssign,
                Kind::Number,
                Kind::Semicolon,
                Kind::Identifier,
                Kind::Increment,
                Kind::ShiftLeft,
                Kind::Number,
                Kind::GreaterEqual,
                Kind::Identifier,
                Kind::EOF,
            ]
        );
    }

    #[test]
    fn index_sigils() {
        assert_eq!(
            kinds("a[ b[? c[@ d[# e[|"),
            vec![
                Kind::Identifier,
                Kind::LBracket,
                Kind::Identifier,
                Kind::MapIndex,
                Kind::Identifier,
                Kind::ArrayRefIndex,
                Kind::Identifier,
                Kind::GridIndex,
                Kind::Identifier,
                Kind::ListIndex,
                Kind::EOF,
            ]
        );
    }

    #[test]
    fn raw_string_after_bracket_is_not_a_sigil() {
        assert_eq!(
            kinds("x = [@\"a\", 1];"),
            vec![
                Kind::Identifier,
                Kind::Assign,
                Kind::LBracket,
                Kind::RawString,
                Kind::Comma,
                Kind::Number,
                Kind::RBracket,
                Kind::Semicolon,
                Kind::EOF,
            ]
        );
        assert_eq!(kinds("a[@ i]")[1], Kind::ArrayRefIndex);
    }

    #[test]
    fn comments_and_directives_are_skipped() {
        let source = "#region setup\n  #macro X 1\na /* b */ // c\n/* unterminated";
        assert_eq!(kinds(source), vec![Kind::Identifier, Kind::EOF]);
    }

    #[test]
    fn hash_mid_line_is_an_error() {
        let err = tokenize("a # b", 2).unwrap_err();
        assert_eq!(err.stage, Stage::Lexical);
        assert_eq!(err.position.column, 3);
    }

    #[test]
    fn unknown_character_reports_position() {
        let err = tokenize("x = 1;\n  `", 2).unwrap_err();
        assert_eq!(err.stage, Stage::Lexical);
        assert!(err.message.contains('`'));
        assert_eq!((err.position.line, err.position.column), (2, 3));
    }
}
