use std::collections::{BTreeMap, HashMap, HashSet};

use crate::ast::{AstKind, Case, Declaration, EnumMember, Node, Number, Resolution, Script};
use crate::context::{Feature, ResolutionContext};
use crate::error::Diagnostic;
use crate::evaluator::Evaluator;
use crate::token::Position;
use crate::types::{intrinsic, MAX_ARGUMENTS};

/// Tags every identifier in a parsed script with what it refers to.
pub struct Resolver<'a> {
    context: &'a ResolutionContext,
    locals: HashSet<String>,
    globals: HashSet<String>,
    enums: HashMap<String, BTreeMap<String, i64>>,
}

pub fn resolve(script: Script, context: &ResolutionContext) -> Result<Script, Diagnostic> {
    Resolver::new(context).resolve(script)
}

impl<'a> Resolver<'a> {
    pub fn new(context: &'a ResolutionContext) -> Self {
        Self {
            context,
            locals: HashSet::new(),
            globals: HashSet::new(),
            enums: context.enums.clone(),
        }
    }

    pub fn resolve(mut self, script: Script) -> Result<Script, Diagnostic> {
        // Enums may be referenced above their declaration.
        for node in &script.body {
            if let AstKind::Enum { name, members } = &node.kind {
                self.declare_enum(name, members)?;
            }
        }

        let body = script
            .body
            .into_iter()
            .map(|node| self.resolve_statement(node))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Script { body })
    }

    fn declare_enum(&mut self, name: &str, members: &[EnumMember]) -> Result<(), Diagnostic> {
        let mut evaluator = Evaluator::new(&self.enums);
        let mut folded = BTreeMap::new();
        let mut next = 0i64;

        for member in members {
            let value = match &member.value {
                Some(expr) => evaluator.eval(expr).ok_or_else(|| {
                    Diagnostic::resolution(
                        format!("Value of {}.{} must be a constant integer", name, member.name),
                        expr.position,
                    )
                })?,
                None => next,
            };
            next = value.wrapping_add(1);
            evaluator.variables.insert(member.name.clone(), value);
            folded.insert(member.name.clone(), value);
        }

        self.enums.insert(name.to_string(), folded);
        Ok(())
    }

    fn resolve_block(&mut self, nodes: Vec<Node>) -> Result<Vec<Node>, Diagnostic> {
        nodes
            .into_iter()
            .map(|node| self.resolve_statement(node))
            .collect()
    }

    fn resolve_boxed(&mut self, node: Box<Node>) -> Result<Box<Node>, Diagnostic> {
        Ok(Box::new(self.resolve_statement(*node)?))
    }

    fn resolve_statement(&mut self, node: Node) -> Result<Node, Diagnostic> {
        let position = node.position;

        let kind = match node.kind {
            AstKind::Assignment {
                target,
                operator,
                value,
            } => {
                // The value is evaluated before the store, so resolve it first.
                let value = self.resolve_expression(*value)?;
                let target = self.resolve_target(*target)?;
                AstKind::Assignment {
                    target: Box::new(target),
                    operator,
                    value: Box::new(value),
                }
            }
            AstKind::Block(nodes) => AstKind::Block(self.resolve_block(nodes)?),
            AstKind::If {
                condition,
                then,
                otherwise,
            } => AstKind::If {
                condition: Box::new(self.resolve_expression(*condition)?),
                then: self.resolve_boxed(then)?,
                otherwise: otherwise.map(|n| self.resolve_boxed(n)).transpose()?,
            },
            AstKind::While { condition, body } => AstKind::While {
                condition: Box::new(self.resolve_expression(*condition)?),
                body: self.resolve_boxed(body)?,
            },
            AstKind::DoUntil { body, condition } => {
                let body = self.resolve_boxed(body)?;
                AstKind::DoUntil {
                    body,
                    condition: Box::new(self.resolve_expression(*condition)?),
                }
            }
            AstKind::Repeat { count, body } => AstKind::Repeat {
                count: Box::new(self.resolve_expression(*count)?),
                body: self.resolve_boxed(body)?,
            },
            AstKind::For {
                init,
                condition,
                step,
                body,
            } => {
                let init = self.resolve_block(init)?;
                let condition = condition
                    .map(|c| self.resolve_expression(*c).map(Box::new))
                    .transpose()?;
                let step = self.resolve_block(step)?;
                AstKind::For {
                    init,
                    condition,
                    step,
                    body: self.resolve_boxed(body)?,
                }
            }
            AstKind::Switch { subject, cases } => {
                let subject = Box::new(self.resolve_expression(*subject)?);
                let cases = cases
                    .into_iter()
                    .map(|case| {
                        Ok(Case {
                            label: case.label.map(|l| self.resolve_expression(l)).transpose()?,
                            body: self.resolve_block(case.body)?,
                            position: case.position,
                        })
                    })
                    .collect::<Result<Vec<_>, Diagnostic>>()?;
                AstKind::Switch { subject, cases }
            }
            AstKind::With { targets, body } => AstKind::With {
                targets: self.resolve_expressions(targets)?,
                body: self.resolve_boxed(body)?,
            },
            AstKind::Var(declarations) => {
                let mut resolved = Vec::with_capacity(declarations.len());
                for declaration in declarations {
                    let value = declaration
                        .value
                        .map(|v| self.resolve_expression(v))
                        .transpose()?;
                    self.declare_local(&declaration.name, declaration.position)?;
                    resolved.push(Declaration { value, ..declaration });
                }
                AstKind::Var(resolved)
            }
            AstKind::GlobalVar(names) => {
                for name in &names {
                    if intrinsic(name).is_some() || self.context.builtin_functions.contains(name) {
                        return Err(Diagnostic::resolution(
                            format!("Cannot declare {} as a global variable", name),
                            position,
                        ));
                    }
                    self.globals.insert(name.clone());
                }
                AstKind::GlobalVar(names)
            }
            AstKind::Enum { name, members } => {
                self.declare_enum(&name, &members)?;
                let values = &self.enums[&name];
                let members = members
                    .into_iter()
                    .map(|member| EnumMember {
                        value: Some(Node::new(
                            AstKind::NumericLiteral(Number::Int(values[&member.name])),
                            member.position,
                        )),
                        ..member
                    })
                    .collect();
                AstKind::Enum { name, members }
            }
            AstKind::Return(value) => AstKind::Return(
                value
                    .map(|v| self.resolve_expression(*v).map(Box::new))
                    .transpose()?,
            ),
            AstKind::Expression(expr) => {
                AstKind::Expression(Box::new(self.resolve_expression(*expr)?))
            }
            kind @ (AstKind::Exit | AstKind::Break | AstKind::Continue) => kind,
            // Only reachable for expressions used in statement position
            // (`for` clauses go through `Assignment`/`Expression`).
            kind => return self.resolve_expression(Node::new(kind, position)),
        };

        Ok(Node::new(kind, position))
    }

    fn declare_local(&mut self, name: &str, position: Position) -> Result<(), Diagnostic> {
        if intrinsic(name).is_some() || self.context.builtin_functions.contains(name) {
            return Err(Diagnostic::resolution(
                format!("Cannot declare {} as a local variable", name),
                position,
            ));
        }
        self.locals.insert(name.to_string());
        Ok(())
    }

    fn resolve_expressions(&mut self, nodes: Vec<Node>) -> Result<Vec<Node>, Diagnostic> {
        nodes
            .into_iter()
            .map(|node| self.resolve_expression(node))
            .collect()
    }

    /// Resolves an assignment or `++`/`--` target and checks it can be stored to.
    fn resolve_target(&mut self, node: Node) -> Result<Node, Diagnostic> {
        let target = self.resolve_expression(node)?;

        let refused = match &target.kind {
            AstKind::NumericLiteral(_) => Some("an enum member".to_string()),
            AstKind::Identifier { name, resolution } => match resolution {
                Resolution::BuiltinFunction => Some(format!("builtin function {}", name)),
                Resolution::UserSymbol(_) => Some(format!("asset {}", name)),
                Resolution::Intrinsic(_) => Some(format!("constant {}", name)),
                _ => None,
            },
            _ => None,
        };

        match refused {
            Some(what) => Err(Diagnostic::resolution(
                format!("Cannot assign to {}", what),
                target.position,
            )),
            None => Ok(target),
        }
    }

    fn resolve_name(&self, name: &str) -> Resolution {
        if self.locals.contains(name) {
            return Resolution::Local;
        }
        if let Some(value) = intrinsic(name) {
            return Resolution::Intrinsic(value);
        }
        if name == "argument" {
            return Resolution::ArgumentArray;
        }
        if let Some(n) = name
            .strip_prefix("argument")
            .filter(|digits| !digits.starts_with('0') || digits.len() == 1)
            .and_then(|digits| digits.parse::<u8>().ok())
            .filter(|&n| n < MAX_ARGUMENTS)
        {
            return Resolution::Argument(n);
        }
        if self.globals.contains(name) {
            return Resolution::Global;
        }
        if self.context.builtin_functions.contains(name) {
            return Resolution::BuiltinFunction;
        }
        if self.context.builtin_variables.contains(name) {
            return Resolution::BuiltinVariable;
        }
        if let Some(symbol) = self.context.user_symbols.get(name) {
            return Resolution::UserSymbol(symbol.reference);
        }
        Resolution::Dynamic
    }

    fn feature(&self, feature: Feature, position: Position) -> Result<(), Diagnostic> {
        if self.context.supports(feature) {
            return Ok(());
        }
        Err(Diagnostic::resolution(
            format!(
                "{} are not available before version tier {} (target is tier {})",
                feature.name(),
                feature.min_tier(),
                self.context.version_tier
            ),
            position,
        ))
    }

    fn resolve_expression(&mut self, node: Node) -> Result<Node, Diagnostic> {
        let position = node.position;

        let kind = match node.kind {
            kind @ AstKind::NumericLiteral(_) => kind,
            AstKind::StringLiteral { value, verbatim } => {
                if verbatim {
                    self.feature(Feature::RawStrings, position)?;
                }
                AstKind::StringLiteral { value, verbatim }
            }
            AstKind::Identifier { name, .. } => {
                let resolution = self.resolve_name(&name);
                AstKind::Identifier { name, resolution }
            }
            AstKind::Member { target, field } => return self.resolve_member(*target, field, position),
            AstKind::BinaryExpression { operator, lhs, rhs } => AstKind::BinaryExpression {
                operator,
                lhs: Box::new(self.resolve_expression(*lhs)?),
                rhs: Box::new(self.resolve_expression(*rhs)?),
            },
            AstKind::LogicalExpression { operator, lhs, rhs } => AstKind::LogicalExpression {
                operator,
                lhs: Box::new(self.resolve_expression(*lhs)?),
                rhs: Box::new(self.resolve_expression(*rhs)?),
            },
            AstKind::UnaryExpression { operator, operand } => AstKind::UnaryExpression {
                operator,
                operand: Box::new(self.resolve_expression(*operand)?),
            },
            AstKind::Conditional {
                condition,
                then,
                otherwise,
            } => AstKind::Conditional {
                condition: Box::new(self.resolve_expression(*condition)?),
                then: Box::new(self.resolve_expression(*then)?),
                otherwise: Box::new(self.resolve_expression(*otherwise)?),
            },
            AstKind::FunctionCall { callee, arguments } => AstKind::FunctionCall {
                callee: Box::new(self.resolve_expression(*callee)?),
                arguments: self.resolve_expressions(arguments)?,
            },
            AstKind::Index {
                target,
                accessor,
                indices,
            } => AstKind::Index {
                target: Box::new(self.resolve_expression(*target)?),
                accessor,
                indices: self.resolve_expressions(indices)?,
            },
            AstKind::Update {
                target,
                step,
                prefix,
            } => AstKind::Update {
                target: Box::new(self.resolve_target(*target)?),
                step,
                prefix,
            },
            AstKind::StructLiteral(fields) => {
                self.feature(Feature::StructLiterals, position)?;
                let fields = fields
                    .into_iter()
                    .map(|(key, value)| Ok((key, self.resolve_expression(value)?)))
                    .collect::<Result<Vec<_>, Diagnostic>>()?;
                AstKind::StructLiteral(fields)
            }
            AstKind::ArrayLiteral(elements) => {
                self.feature(Feature::ArrayLiterals, position)?;
                AstKind::ArrayLiteral(self.resolve_expressions(elements)?)
            }
            other => {
                return Err(Diagnostic::codegen(
                    format!("Statement {:?} used as an expression", other),
                    position,
                ))
            }
        };

        Ok(Node::new(kind, position))
    }

    /// `global.x`, `self.x` and `Enum.Member` are rewritten here; any other
    /// member access stays a runtime field lookup.
    fn resolve_member(
        &mut self,
        target: Node,
        field: String,
        position: Position,
    ) -> Result<Node, Diagnostic> {
        if let AstKind::Identifier { name, .. } = &target.kind {
            if !self.locals.contains(name) {
                match name.as_str() {
                    "global" => {
                        return Ok(Node::new(
                            AstKind::Identifier {
                                name: field,
                                resolution: Resolution::Global,
                            },
                            position,
                        ))
                    }
                    "self" => {
                        let resolution = if self.context.builtin_variables.contains(&field) {
                            Resolution::BuiltinVariable
                        } else {
                            Resolution::Dynamic
                        };
                        return Ok(Node::new(
                            AstKind::Identifier {
                                name: field,
                                resolution,
                            },
                            position,
                        ));
                    }
                    _ => {}
                }

                if let Some(members) = self.enums.get(name) {
                    let value = members.get(&field).copied().ok_or_else(|| {
                        Diagnostic::resolution(
                            format!("Enum {} has no member {}", name, field),
                            position,
                        )
                    })?;
                    return Ok(Node::new(AstKind::NumericLiteral(Number::Int(value)), position));
                }
            }
        }

        Ok(Node::new(
            AstKind::Member {
                target: Box::new(self.resolve_expression(target)?),
                field,
            },
            position,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SymbolKind;
    use crate::error::Stage;
    use crate::lexer::tokenize;
    use crate::parser::Parser;

    fn context(tier: u32) -> ResolutionContext {
        ResolutionContext::new(tier)
            .with_functions(["show_message", "instance_create"])
            .with_variables(["x", "y"])
            .with_symbol("scr_move", SymbolKind::Script, 12)
            .with_symbol("obj_player", SymbolKind::Object, 3)
            .with_enum("Weapon", [("Sword", 0), ("Bow", 4)])
    }

    fn run(source: &str, tier: u32) -> Result<Script, Diagnostic> {
        let script = Parser::new(tokenize(source, tier)?).parse()?;
        resolve(script, &context(tier))
    }

    /// Resolution of the value assigned in statement `index`.
    fn assigned(script: &Script, index: usize) -> &AstKind {
        match &script.body[index].kind {
            AstKind::Assignment { value, .. } => &value.kind,
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    fn resolution_of(kind: &AstKind) -> Resolution {
        match kind {
            AstKind::Identifier { resolution, .. } => *resolution,
            other => panic!("expected identifier, got {:?}", other),
        }
    }

    #[test]
    fn classifies_names() {
        let script = run(
            "a = show_message; a = x; a = scr_move; a = obj_player; a = mystery; \
             a = noone; a = argument3; a = argument; a = argument16;",
            2,
        )
        .unwrap();
        let got: Vec<_> = (0..9).map(|i| resolution_of(assigned(&script, i))).collect();
        assert_eq!(
            got,
            [
                Resolution::BuiltinFunction,
                Resolution::BuiltinVariable,
                Resolution::UserSymbol(12),
                Resolution::UserSymbol(3),
                Resolution::Dynamic,
                Resolution::Intrinsic(-4),
                Resolution::Argument(3),
                Resolution::ArgumentArray,
                Resolution::Dynamic,
            ]
        );
    }

    #[test]
    fn locals_are_visible_after_declaration() {
        let script = run("a = n; var n = 1; a = n;", 2).unwrap();
        assert_eq!(resolution_of(assigned(&script, 0)), Resolution::Dynamic);
        assert_eq!(resolution_of(assigned(&script, 2)), Resolution::Local);
    }

    #[test]
    fn globalvar_and_global_prefix() {
        let script = run("globalvar score; a = score; a = global.lives; a = self.x;", 2).unwrap();
        assert_eq!(resolution_of(assigned(&script, 1)), Resolution::Global);
        let AstKind::Identifier { name, resolution } = assigned(&script, 2) else {
            panic!("global.lives should become an identifier");
        };
        assert_eq!((name.as_str(), *resolution), ("lives", Resolution::Global));
        assert_eq!(resolution_of(assigned(&script, 3)), Resolution::BuiltinVariable);
    }

    #[test]
    fn enums_fold_and_hoist() {
        let script = run(
            "a = State.Run; a = Weapon.Bow; enum State { Idle, Walk = 5, Run, Jump = Run * 2 }",
            2,
        )
        .unwrap();
        assert_eq!(assigned(&script, 0), &AstKind::NumericLiteral(Number::Int(6)));
        assert_eq!(assigned(&script, 1), &AstKind::NumericLiteral(Number::Int(4)));
        let AstKind::Enum { members, .. } = &script.body[2].kind else {
            panic!("expected enum");
        };
        let jump = members[3].value.as_ref().unwrap();
        assert_eq!(jump.kind, AstKind::NumericLiteral(Number::Int(12)));
    }

    #[test]
    fn enum_errors() {
        let err = run("enum E { A = x }", 2).unwrap_err();
        assert_eq!(err.stage, Stage::Resolution);
        let err = run("a = Weapon.Axe;", 2).unwrap_err();
        assert!(err.message.contains("no member Axe"));
    }

    #[test]
    fn tier_gated_features() {
        for source in ["a = @\"raw\";", "a = { b: 1 };", "a = [1, 2];"] {
            let err = run(source, 1).unwrap_err();
            assert_eq!(err.stage, Stage::Resolution, "{}", source);
            assert_eq!(err.position.column, 5, "{}", source);
            assert!(run(source, 2).is_ok(), "{}", source);
        }
    }

    #[test]
    fn refuses_read_only_targets() {
        for source in [
            "show_message = 1;",
            "scr_move += 1;",
            "true = 0;",
            "Weapon.Bow = 2;",
            "noone++;",
            "var self = 1;",
        ] {
            let err = run(source, 2).unwrap_err();
            assert_eq!(err.stage, Stage::Resolution, "{}", source);
        }
        assert!(run("x = 1; argument0 = 2; a.b = 3;", 2).is_ok());
    }

    #[test]
    fn member_access_on_instances_stays() {
        let script = run("a = obj_player.hp;", 2).unwrap();
        let AstKind::Member { target, field } = assigned(&script, 0) else {
            panic!("expected member");
        };
        assert_eq!(field, "hp");
        assert_eq!(resolution_of(&target.kind), Resolution::UserSymbol(3));
    }
}
