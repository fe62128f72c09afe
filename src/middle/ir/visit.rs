use super::{
    Block, Body, CatchClause, Expression, ExpressionKind, ForeignCode, Literal, Statement,
    StatementKind,
};

/// Read-only traversal over method bodies. Override a `visit_*` method to
/// intercept a node and call the matching `walk_*` function to keep descending.
pub trait Visitor: Sized {
    fn visit_body(&mut self, body: &Body) {
        walk_body(self, body)
    }

    fn visit_block(&mut self, block: &Block) {
        walk_block(self, block)
    }

    fn visit_statement(&mut self, statement: &Statement) {
        walk_statement(self, statement)
    }

    fn visit_catch_clause(&mut self, clause: &CatchClause) {
        walk_catch_clause(self, clause)
    }

    fn visit_expression(&mut self, expression: &Expression) {
        walk_expression(self, expression)
    }

    fn visit_foreign_code(&mut self, _code: &ForeignCode) {}

    fn visit_literal(&mut self, _literal: &Literal) {}
}

pub fn walk_body(visitor: &mut impl Visitor, body: &Body) {
    visitor.visit_block(&body.block);
}

pub fn walk_block(visitor: &mut impl Visitor, block: &Block) {
    for statement in block.statements.iter() {
        visitor.visit_statement(statement);
    }
}

pub fn walk_statement(visitor: &mut impl Visitor, statement: &Statement) {
    match &statement.kind {
        StatementKind::Expression(expression) | StatementKind::Throw(expression) => {
            visitor.visit_expression(expression)
        }
        StatementKind::Declaration { initializer, .. } => {
            if let Some(initializer) = initializer {
                visitor.visit_expression(initializer);
            }
        }
        StatementKind::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expression(value);
            }
        }
        StatementKind::If {
            condition,
            then_block,
            else_block,
        } => {
            visitor.visit_expression(condition);
            visitor.visit_block(then_block);

            if let Some(else_block) = else_block {
                visitor.visit_block(else_block);
            }
        }
        StatementKind::While { condition, body } => {
            visitor.visit_expression(condition);
            visitor.visit_block(body);
        }
        StatementKind::Block(block) => visitor.visit_block(block),
        StatementKind::Try { body, catches } => {
            visitor.visit_block(body);

            for clause in catches.iter() {
                visitor.visit_catch_clause(clause);
            }
        }
    }
}

pub fn walk_catch_clause(visitor: &mut impl Visitor, clause: &CatchClause) {
    visitor.visit_block(&clause.body);
}

pub fn walk_expression(visitor: &mut impl Visitor, expression: &Expression) {
    match &expression.kind {
        ExpressionKind::Literal(literal) => visitor.visit_literal(literal),
        ExpressionKind::This | ExpressionKind::Local(_) | ExpressionKind::ClassLiteral(_) => {}
        ExpressionKind::Field { instance, .. } => {
            if let Some(instance) = instance {
                visitor.visit_expression(instance);
            }
        }
        ExpressionKind::Call {
            instance,
            arguments,
            ..
        } => {
            if let Some(instance) = instance {
                visitor.visit_expression(instance);
            }

            for argument in arguments.iter() {
                visitor.visit_expression(argument);
            }
        }
        ExpressionKind::New { arguments, .. } | ExpressionKind::Sequence(arguments) => {
            for argument in arguments.iter() {
                visitor.visit_expression(argument);
            }
        }
        ExpressionKind::Assign { target, value, .. } => {
            visitor.visit_expression(target);
            visitor.visit_expression(value);
        }
        ExpressionKind::Binary { lhs, rhs, .. } => {
            visitor.visit_expression(lhs);
            visitor.visit_expression(rhs);
        }
        ExpressionKind::Unary { operand, .. }
        | ExpressionKind::Cast { operand, .. }
        | ExpressionKind::InstanceOf { operand, .. }
        | ExpressionKind::CastFailure { operand } => visitor.visit_expression(operand),
        ExpressionKind::Conditional {
            condition,
            then_value,
            else_value,
        } => {
            visitor.visit_expression(condition);
            visitor.visit_expression(then_value);
            visitor.visit_expression(else_value);
        }
        ExpressionKind::Foreign(code) => visitor.visit_foreign_code(code),
        ExpressionKind::NullReceiver {
            instance,
            arguments,
        } => {
            visitor.visit_expression(instance);

            for argument in arguments.iter() {
                visitor.visit_expression(argument);
            }
        }
    }
}
