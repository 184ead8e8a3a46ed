use crate::ast::{
    Accessor, AssignOp, AstKind, BinaryOp, Case, Declaration, EnumMember, LogicalOp, Node, Number,
    Resolution, Script, Step, UnaryOp,
};
use crate::error::Diagnostic;
use crate::token::{Kind, Position, Token};

/// Deepest statement or expression nesting the parser accepts.
pub const MAX_NESTING: usize = 128;

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    loop_depth: usize,
    breakable_depth: usize,
    nesting: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            loop_depth: 0,
            breakable_depth: 0,
            nesting: 0,
        }
    }

    fn at(&self) -> &Token {
        // The lexer always terminates the stream with EOF, and `next_token`
        // never steps past it.
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn next_token(&mut self) -> Token {
        let token = self.at().clone();
        if token.kind != Kind::EOF {
            self.current += 1;
        }
        token
    }

    fn is_eof(&self) -> bool {
        self.at().kind == Kind::EOF
    }

    fn check(&self, kind: Kind) -> bool {
        self.at().kind == kind
    }

    fn skip(&mut self, kind: Kind) -> bool {
        if self.check(kind) {
            self.next_token();
            true
        } else {
            false
        }
    }

    fn eat(&mut self, expecting: Kind) -> Result<Token, Diagnostic> {
        if !self.check(expecting) {
            return Err(Diagnostic::from_token(
                self.at(),
                format!("Expecting {:?} but got {}", expecting, describe(self.at())),
            ));
        }
        Ok(self.next_token())
    }

    fn unexpected(&self, context: &str) -> Diagnostic {
        Diagnostic::from_token(
            self.at(),
            format!("Unexpected {} {}", describe(self.at()), context),
        )
    }

    fn eat_identifier(&mut self) -> Result<Token, Diagnostic> {
        if !self.check(Kind::Identifier) {
            return Err(Diagnostic::from_token(
                self.at(),
                format!("Expecting identifier but got {}", describe(self.at())),
            ));
        }
        Ok(self.next_token())
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, Diagnostic>,
    ) -> Result<T, Diagnostic> {
        if self.nesting >= MAX_NESTING {
            return Err(Diagnostic::from_token(
                self.at(),
                format!("Code is nested more than {} levels deep", MAX_NESTING),
            ));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    pub fn parse(&mut self) -> Result<Script, Diagnostic> {
        let mut program = Script { body: Vec::new() };

        while !self.is_eof() {
            let statement = self.parse_statement()?;
            program.body.push(statement);
        }

        Ok(program)
    }

    fn parse_statement(&mut self) -> Result<Node, Diagnostic> {
        self.nested(Self::parse_nested_statement)
    }

    fn parse_nested_statement(&mut self) -> Result<Node, Diagnostic> {
        let position = self.at().position;

        let kind = match self.at().kind {
            Kind::Semicolon => {
                self.next_token();
                AstKind::Block(Vec::new())
            }
            Kind::LBrace => return self.parse_block(),
            Kind::If => {
                self.eat(Kind::If)?;
                let condition = self.parse_expression()?;
                self.skip(Kind::Then);
                let then = self.parse_statement()?;
                let otherwise = if self.skip(Kind::Else) {
                    Some(Box::new(self.parse_statement()?))
                } else {
                    None
                };
                AstKind::If {
                    condition: Box::new(condition),
                    then: Box::new(then),
                    otherwise,
                }
            }
            Kind::While => {
                self.eat(Kind::While)?;
                let condition = self.parse_expression()?;
                self.skip(Kind::Do);
                let body = self.parse_loop_body()?;
                AstKind::While {
                    condition: Box::new(condition),
                    body: Box::new(body),
                }
            }
            Kind::Do => {
                self.eat(Kind::Do)?;
                let body = self.parse_loop_body()?;
                self.eat(Kind::Until)?;
                let condition = self.parse_expression()?;
                self.skip(Kind::Semicolon);
                AstKind::DoUntil {
                    body: Box::new(body),
                    condition: Box::new(condition),
                }
            }
            Kind::Repeat => {
                self.eat(Kind::Repeat)?;
                let count = self.parse_expression()?;
                let body = self.parse_loop_body()?;
                AstKind::Repeat {
                    count: Box::new(count),
                    body: Box::new(body),
                }
            }
            Kind::For => return self.parse_for(),
            Kind::Switch => return self.parse_switch(),
            Kind::With => {
                self.eat(Kind::With)?;
                let targets = if self.skip(Kind::LParen) {
                    let mut targets = vec![self.parse_expression()?];
                    while self.skip(Kind::Comma) {
                        targets.push(self.parse_expression()?);
                    }
                    self.eat(Kind::RParen)?;
                    targets
                } else {
                    vec![self.parse_expression()?]
                };
                let body = self.parse_loop_body()?;
                AstKind::With {
                    targets,
                    body: Box::new(body),
                }
            }
            Kind::Var => {
                let declarations = self.parse_var()?;
                self.skip(Kind::Semicolon);
                declarations
            }
            Kind::GlobalVar => {
                self.eat(Kind::GlobalVar)?;
                let mut names = vec![self.eat_identifier()?.value];
                while self.skip(Kind::Comma) {
                    names.push(self.eat_identifier()?.value);
                }
                self.skip(Kind::Semicolon);
                AstKind::GlobalVar(names)
            }
            Kind::Enum => return self.parse_enum(),
            Kind::Return => {
                self.eat(Kind::Return)?;
                let value = match self.at().kind {
                    Kind::Semicolon | Kind::RBrace | Kind::EOF => None,
                    _ => Some(Box::new(self.parse_expression()?)),
                };
                self.skip(Kind::Semicolon);
                AstKind::Return(value)
            }
            Kind::Exit => {
                self.eat(Kind::Exit)?;
                self.skip(Kind::Semicolon);
                AstKind::Exit
            }
            Kind::Break => {
                if self.breakable_depth == 0 {
                    return Err(Diagnostic::from_token(
                        self.at(),
                        "break used outside of a loop, switch or with",
                    ));
                }
                self.eat(Kind::Break)?;
                self.skip(Kind::Semicolon);
                AstKind::Break
            }
            Kind::Continue => {
                if self.loop_depth == 0 {
                    return Err(Diagnostic::from_token(
                        self.at(),
                        "continue used outside of a loop or with",
                    ));
                }
                self.eat(Kind::Continue)?;
                self.skip(Kind::Semicolon);
                AstKind::Continue
            }
            Kind::Struct => {
                return Err(Diagnostic::from_token(
                    self.at(),
                    "'struct' is a reserved word",
                ))
            }
            _ => {
                let statement = self.parse_simple_statement()?;
                self.skip(Kind::Semicolon);
                return Ok(statement);
            }
        };

        Ok(Node::new(kind, position))
    }

    fn parse_block(&mut self) -> Result<Node, Diagnostic> {
        let position = self.eat(Kind::LBrace)?.position;
        let mut statements = Vec::new();

        while !self.is_eof() && !self.check(Kind::RBrace) {
            statements.push(self.parse_statement()?);
        }

        self.eat(Kind::RBrace)?;
        Ok(Node::new(AstKind::Block(statements), position))
    }

    /// Body of a loop or `with`, where both `break` and `continue` are legal.
    fn parse_loop_body(&mut self) -> Result<Node, Diagnostic> {
        self.breakable_depth += 1;
        self.loop_depth += 1;
        let body = self.parse_statement();
        self.breakable_depth -= 1;
        self.loop_depth -= 1;
        body
    }

    /// Assignment, call or increment: the statements that may appear on their
    /// own and in `for` clauses.
    fn parse_simple_statement(&mut self) -> Result<Node, Diagnostic> {
        let position = self.at().position;
        let target = self.parse_unary_expression()?;

        if self.at().kind.is_assignment() {
            if !target.is_assignable() {
                return Err(Diagnostic::from_token(self.at(), "Invalid assignment target"));
            }
            let operator = match self.next_token().kind {
                Kind::PlusAssign => AssignOp::Add,
                Kind::MinusAssign => AssignOp::Subtract,
                Kind::StarAssign => AssignOp::Multiply,
                Kind::SlashAssign => AssignOp::Divide,
                Kind::PercentAssign => AssignOp::Modulo,
                Kind::OrAssign => AssignOp::BitOr,
                Kind::AndAssign => AssignOp::BitAnd,
                Kind::XorAssign => AssignOp::BitXor,
                _ => AssignOp::Assign,
            };
            let value = self.parse_expression()?;
            return Ok(Node::new(
                AstKind::Assignment {
                    target: Box::new(target),
                    operator,
                    value: Box::new(value),
                },
                position,
            ));
        }

        match target.kind {
            AstKind::FunctionCall { .. } | AstKind::Update { .. } => Ok(Node::new(
                AstKind::Expression(Box::new(target)),
                position,
            )),
            _ => Err(self.unexpected("after expression; expecting assignment or call")),
        }
    }

    fn parse_var(&mut self) -> Result<AstKind, Diagnostic> {
        self.eat(Kind::Var)?;
        let mut declarations = Vec::new();

        loop {
            let name = self.eat_identifier()?;
            let value = if self.skip(Kind::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            declarations.push(Declaration {
                name: name.value,
                value,
                position: name.position,
            });
            if !self.skip(Kind::Comma) {
                break;
            }
        }

        Ok(AstKind::Var(declarations))
    }

    fn parse_for(&mut self) -> Result<Node, Diagnostic> {
        let position = self.eat(Kind::For)?.position;
        self.eat(Kind::LParen)?;

        let mut init = Vec::new();
        while !self.check(Kind::Semicolon) {
            if self.check(Kind::Var) {
                let var_position = self.at().position;
                init.push(Node::new(self.parse_var()?, var_position));
            } else {
                init.push(self.parse_simple_statement()?);
            }
            if !self.skip(Kind::Comma) {
                break;
            }
        }
        self.eat(Kind::Semicolon)?;

        let condition = if self.check(Kind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        self.eat(Kind::Semicolon)?;

        let mut step = Vec::new();
        while !self.check(Kind::RParen) {
            step.push(self.parse_simple_statement()?);
            if !self.skip(Kind::Comma) {
                break;
            }
        }
        self.eat(Kind::RParen)?;

        let body = self.parse_loop_body()?;
        Ok(Node::new(
            AstKind::For {
                init,
                condition,
                step,
                body: Box::new(body),
            },
            position,
        ))
    }

    fn parse_switch(&mut self) -> Result<Node, Diagnostic> {
        let position = self.eat(Kind::Switch)?.position;
        let subject = self.parse_expression()?;
        self.eat(Kind::LBrace)?;

        let mut cases = Vec::new();
        self.breakable_depth += 1;
        while !self.is_eof() && !self.check(Kind::RBrace) {
            let case_position = self.at().position;
            let label = match self.at().kind {
                Kind::Case => {
                    self.next_token();
                    Some(self.parse_expression()?)
                }
                Kind::Default => {
                    self.next_token();
                    None
                }
                _ => return Err(self.unexpected("in switch; expecting case or default")),
            };
            self.eat(Kind::Colon)?;

            let mut body = Vec::new();
            while !matches!(
                self.at().kind,
                Kind::Case | Kind::Default | Kind::RBrace | Kind::EOF
            ) {
                body.push(self.parse_statement()?);
            }
            cases.push(Case {
                label,
                body,
                position: case_position,
            });
        }
        self.breakable_depth -= 1;
        self.eat(Kind::RBrace)?;

        Ok(Node::new(
            AstKind::Switch {
                subject: Box::new(subject),
                cases,
            },
            position,
        ))
    }

    fn parse_enum(&mut self) -> Result<Node, Diagnostic> {
        let position = self.eat(Kind::Enum)?.position;
        let name = self.eat_identifier()?.value;
        self.eat(Kind::LBrace)?;

        let mut members = Vec::new();
        while !self.check(Kind::RBrace) {
            let member = self.eat_identifier()?;
            let value = if self.skip(Kind::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            members.push(EnumMember {
                name: member.value,
                value,
                position: member.position,
            });
            if !self.skip(Kind::Comma) {
                break;
            }
        }
        self.eat(Kind::RBrace)?;
        self.skip(Kind::Semicolon);

        Ok(Node::new(AstKind::Enum { name, members }, position))
    }

    pub fn parse_expression(&mut self) -> Result<Node, Diagnostic> {
        self.nested(Self::parse_conditional_expression)
    }

    fn parse_conditional_expression(&mut self) -> Result<Node, Diagnostic> {
        let condition = self.parse_logical_or_expression()?;

        if self.check(Kind::Question) {
            let position = self.next_token().position;
            let then = self.parse_expression()?;
            self.eat(Kind::Colon)?;
            let otherwise = self.parse_expression()?;
            return Ok(Node::new(
                AstKind::Conditional {
                    condition: Box::new(condition),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                },
                position,
            ));
        }

        Ok(condition)
    }

    fn parse_logical_or_expression(&mut self) -> Result<Node, Diagnostic> {
        let mut left = self.parse_logical_xor_expression()?;
        while self.check(Kind::LogicalOr) {
            let position = self.next_token().position;
            let right = self.parse_logical_xor_expression()?;
            left = logical(LogicalOp::Or, left, right, position);
        }
        Ok(left)
    }

    fn parse_logical_xor_expression(&mut self) -> Result<Node, Diagnostic> {
        let mut left = self.parse_logical_and_expression()?;
        while self.check(Kind::LogicalXor) {
            let position = self.next_token().position;
            let right = self.parse_logical_and_expression()?;
            left = logical(LogicalOp::Xor, left, right, position);
        }
        Ok(left)
    }

    fn parse_logical_and_expression(&mut self) -> Result<Node, Diagnostic> {
        let mut left = self.parse_bitwise_or_expression()?;
        while self.check(Kind::LogicalAnd) {
            let position = self.next_token().position;
            let right = self.parse_bitwise_or_expression()?;
            left = logical(LogicalOp::And, left, right, position);
        }
        Ok(left)
    }

    fn parse_bitwise_or_expression(&mut self) -> Result<Node, Diagnostic> {
        let mut left = self.parse_bitwise_xor_expression()?;
        while self.check(Kind::BitOr) {
            let position = self.next_token().position;
            let right = self.parse_bitwise_xor_expression()?;
            left = binary(BinaryOp::BitOr, left, right, position);
        }
        Ok(left)
    }

    fn parse_bitwise_xor_expression(&mut self) -> Result<Node, Diagnostic> {
        let mut left = self.parse_bitwise_and_expression()?;
        while self.check(Kind::BitXor) {
            let position = self.next_token().position;
            let right = self.parse_bitwise_and_expression()?;
            left = binary(BinaryOp::BitXor, left, right, position);
        }
        Ok(left)
    }

    fn parse_bitwise_and_expression(&mut self) -> Result<Node, Diagnostic> {
        let mut left = self.parse_equality_expression()?;
        while self.check(Kind::BitAnd) {
            let position = self.next_token().position;
            let right = self.parse_equality_expression()?;
            left = binary(BinaryOp::BitAnd, left, right, position);
        }
        Ok(left)
    }

    /// Inside an expression a single `=` compares.
    fn parse_equality_expression(&mut self) -> Result<Node, Diagnostic> {
        let mut left = self.parse_relational_expression()?;
        loop {
            let operator = match self.at().kind {
                Kind::Equal | Kind::Assign => BinaryOp::Equal,
                Kind::NotEqual => BinaryOp::NotEqual,
                _ => break,
            };
            let position = self.next_token().position;
            let right = self.parse_relational_expression()?;
            left = binary(operator, left, right, position);
        }
        Ok(left)
    }

    fn parse_relational_expression(&mut self) -> Result<Node, Diagnostic> {
        let mut left = self.parse_shift_expression()?;
        loop {
            let operator = match self.at().kind {
                Kind::Less => BinaryOp::Less,
                Kind::LessEqual => BinaryOp::LessEqual,
                Kind::Greater => BinaryOp::Greater,
                Kind::GreaterEqual => BinaryOp::GreaterEqual,
                _ => break,
            };
            let position = self.next_token().position;
            let right = self.parse_shift_expression()?;
            left = binary(operator, left, right, position);
        }
        Ok(left)
    }

    fn parse_shift_expression(&mut self) -> Result<Node, Diagnostic> {
        let mut left = self.parse_additive_expression()?;
        loop {
            let operator = match self.at().kind {
                Kind::ShiftLeft => BinaryOp::ShiftLeft,
                Kind::ShiftRight => BinaryOp::ShiftRight,
                _ => break,
            };
            let position = self.next_token().position;
            let right = self.parse_additive_expression()?;
            left = binary(operator, left, right, position);
        }
        Ok(left)
    }

    fn parse_additive_expression(&mut self) -> Result<Node, Diagnostic> {
        let mut left = self.parse_multiplicative_expression()?;
        loop {
            let operator = match self.at().kind {
                Kind::Plus => BinaryOp::Add,
                Kind::Minus => BinaryOp::Subtract,
                _ => break,
            };
            let position = self.next_token().position;
            let right = self.parse_multiplicative_expression()?;
            left = binary(operator, left, right, position);
        }
        Ok(left)
    }

    fn parse_multiplicative_expression(&mut self) -> Result<Node, Diagnostic> {
        let mut left = self.parse_unary_expression()?;
        loop {
            let operator = match self.at().kind {
                Kind::Star => BinaryOp::Multiply,
                Kind::Slash => BinaryOp::Divide,
                Kind::Percent => BinaryOp::Modulo,
                Kind::IntDiv => BinaryOp::IntDivide,
                _ => break,
            };
            let position = self.next_token().position;
            let right = self.parse_unary_expression()?;
            left = binary(operator, left, right, position);
        }
        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> Result<Node, Diagnostic> {
        let position = self.at().position;
        let operator = match self.at().kind {
            Kind::Bang => UnaryOp::Not,
            Kind::Minus => UnaryOp::Negate,
            Kind::BitNot => UnaryOp::BitNot,
            Kind::Plus => {
                self.next_token();
                return self.nested(Self::parse_unary_expression);
            }
            Kind::Increment | Kind::Decrement => {
                let step = step_for(self.next_token().kind);
                let target = self.parse_postfix_expression()?;
                if !target.is_assignable() {
                    return Err(Diagnostic::syntax(
                        "Invalid increment/decrement target",
                        target.position,
                    ));
                }
                return Ok(Node::new(
                    AstKind::Update {
                        target: Box::new(target),
                        step,
                        prefix: true,
                    },
                    position,
                ));
            }
            _ => return self.parse_postfix_expression(),
        };

        self.next_token();
        let operand = self.nested(Self::parse_unary_expression)?;
        Ok(Node::new(
            AstKind::UnaryExpression {
                operator,
                operand: Box::new(operand),
            },
            position,
        ))
    }

    fn parse_postfix_expression(&mut self) -> Result<Node, Diagnostic> {
        let mut expr = self.parse_primary_expression()?;

        loop {
            let kind = self.at().kind;
            match kind {
                Kind::LParen => {
                    let position = self.next_token().position;
                    let mut arguments = Vec::new();
                    while !self.check(Kind::RParen) {
                        if !arguments.is_empty() {
                            self.eat(Kind::Comma)?;
                        }
                        arguments.push(self.parse_expression()?);
                    }
                    self.eat(Kind::RParen)?;
                    expr = Node::new(
                        AstKind::FunctionCall {
                            callee: Box::new(expr),
                            arguments,
                        },
                        position,
                    );
                }
                k if k.is_index_open() => {
                    let open = self.next_token();
                    let accessor = accessor_for(open.kind);
                    let mut indices = vec![self.parse_expression()?];
                    while self.skip(Kind::Comma) {
                        indices.push(self.parse_expression()?);
                    }
                    let valid = match accessor {
                        Accessor::Grid => indices.len() == 2,
                        Accessor::Map | Accessor::List => indices.len() == 1,
                        Accessor::Array | Accessor::ArrayRef => indices.len() <= 2,
                    };
                    if !valid {
                        return Err(Diagnostic::from_token(
                            &open,
                            format!(
                                "Wrong number of indices ({}) for {:?} accessor",
                                indices.len(),
                                accessor
                            ),
                        ));
                    }
                    self.eat(Kind::RBracket)?;
                    expr = Node::new(
                        AstKind::Index {
                            target: Box::new(expr),
                            accessor,
                            indices,
                        },
                        open.position,
                    );
                }
                Kind::Dot => {
                    let position = self.next_token().position;
                    let field = self.eat_identifier()?.value;
                    expr = Node::new(
                        AstKind::Member {
                            target: Box::new(expr),
                            field,
                        },
                        position,
                    );
                }
                Kind::Increment | Kind::Decrement => {
                    if !expr.is_assignable() {
                        return Err(Diagnostic::from_token(
                            self.at(),
                            "Invalid increment/decrement target",
                        ));
                    }
                    let token = self.next_token();
                    let position = expr.position;
                    return Ok(Node::new(
                        AstKind::Update {
                            target: Box::new(expr),
                            step: step_for(token.kind),
                            prefix: false,
                        },
                        position,
                    ));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary_expression(&mut self) -> Result<Node, Diagnostic> {
        let position = self.at().position;

        match self.at().kind {
            Kind::Number => {
                let token = self.next_token();
                let value = parse_number(&token)?;
                Ok(Node::new(AstKind::NumericLiteral(value), position))
            }
            Kind::String | Kind::RawString => {
                let token = self.next_token();
                Ok(Node::new(
                    AstKind::StringLiteral {
                        value: token.value,
                        verbatim: token.kind == Kind::RawString,
                    },
                    position,
                ))
            }
            Kind::Identifier => {
                let token = self.next_token();
                Ok(Node::new(
                    AstKind::Identifier {
                        name: token.value,
                        resolution: Resolution::Unresolved,
                    },
                    position,
                ))
            }
            Kind::LParen => {
                self.eat(Kind::LParen)?;
                let expr = self.parse_expression()?;
                self.eat(Kind::RParen)?;
                Ok(expr)
            }
            Kind::LBrace => {
                self.eat(Kind::LBrace)?;
                let mut fields = Vec::new();
                while !self.check(Kind::RBrace) {
                    let key = match self.at().kind {
                        Kind::Identifier | Kind::String => self.next_token().value,
                        _ => return Err(self.unexpected("in struct literal; expecting a key")),
                    };
                    self.eat(Kind::Colon)?;
                    fields.push((key, self.parse_expression()?));
                    if !self.skip(Kind::Comma) {
                        break;
                    }
                }
                self.eat(Kind::RBrace)?;
                Ok(Node::new(AstKind::StructLiteral(fields), position))
            }
            Kind::LBracket => {
                self.eat(Kind::LBracket)?;
                let mut elements = Vec::new();
                while !self.check(Kind::RBracket) {
                    elements.push(self.parse_expression()?);
                    if !self.skip(Kind::Comma) {
                        break;
                    }
                }
                self.eat(Kind::RBracket)?;
                Ok(Node::new(AstKind::ArrayLiteral(elements), position))
            }
            _ => Err(self.unexpected("found during parsing")),
        }
    }

    #[cfg(test)]
    fn remaining(&self) -> usize {
        self.tokens[self.current..]
            .iter()
            .filter(|t| t.kind != Kind::EOF)
            .count()
    }
}

fn describe(token: &Token) -> String {
    if token.kind == Kind::EOF {
        "end of file".to_string()
    } else {
        format!("{:?}", token.value)
    }
}

fn binary(operator: BinaryOp, lhs: Node, rhs: Node, position: Position) -> Node {
    Node::new(
        AstKind::BinaryExpression {
            operator,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        position,
    )
}

fn logical(operator: LogicalOp, lhs: Node, rhs: Node, position: Position) -> Node {
    Node::new(
        AstKind::LogicalExpression {
            operator,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        position,
    )
}

fn step_for(kind: Kind) -> Step {
    if kind == Kind::Decrement {
        Step::Decrement
    } else {
        Step::Increment
    }
}

fn accessor_for(kind: Kind) -> Accessor {
    match kind {
        Kind::MapIndex => Accessor::Map,
        Kind::ArrayRefIndex => Accessor::ArrayRef,
        Kind::GridIndex => Accessor::Grid,
        Kind::ListIndex => Accessor::List,
        _ => Accessor::Array,
    }
}

/// Converts a Number token's text. Hex literals are integers and wrap at 64
/// bits; decimal integers too large for `i64` become reals.
fn parse_number(token: &Token) -> Result<Number, Diagnostic> {
    let text = token.value.as_str();
    let hex = text
        .strip_prefix('$')
        .or_else(|| text.strip_prefix("0x"))
        .or_else(|| text.strip_prefix("0X"));

    if let Some(digits) = hex {
        return u64::from_str_radix(digits, 16)
            .map(|value| Number::Int(value as i64))
            .map_err(|_| Diagnostic::from_token(token, format!("Hex literal {} out of range", text)));
    }

    if !text.contains('.') {
        if let Ok(value) = text.parse::<i64>() {
            return Ok(Number::Int(value));
        }
    }

    text.parse::<f64>()
        .map(Number::Real)
        .map_err(|_| Diagnostic::from_token(token, format!("Malformed number {}", text)))
}
