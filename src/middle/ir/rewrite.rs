//! Mutating traversal over a method body.
//!
//! Callbacks never mutate the tree they are looking at. They see each node
//! after its children have been rewritten and record what should happen to it
//! in an edit context; the driver applies the edits once the callback returns.
//! That keeps the traversal free of the aliasing problems of editing a tree
//! while walking it, and lets a callback ask for a statement to be inserted
//! before the statement currently being rewritten.

use super::{
    Block, Expression, ExpressionKind, Local, LocalId, LocalKind, MethodId, Program, Span,
    Statement, StatementKind, Type,
};
use crate::error::OptimizerResult;

/// Where an expression sits relative to its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// The value is consumed
    Value,
    /// Only the side effects matter: expression statements and all but the
    /// last element of a sequence
    Discarded,
    /// The left-hand side of an assignment
    AssignTarget,
}

#[derive(Debug, Default)]
pub struct ExpressionEdits {
    replacement: Option<Expression>,
    before: Vec<Statement>,
}

impl ExpressionEdits {
    pub fn replace(&mut self, expression: Expression) {
        self.replacement = Some(expression);
    }

    /// Inserts a statement before the statement enclosing the expression
    pub fn insert_before(&mut self, statement: Statement) {
        self.before.push(statement);
    }
}

#[derive(Debug, Default)]
pub struct StatementEdits {
    replacement: Option<Vec<Statement>>,
    before: Vec<Statement>,
}

impl StatementEdits {
    pub fn replace(&mut self, statement: Statement) {
        self.replacement = Some(vec![statement]);
    }

    pub fn replace_with(&mut self, statements: Vec<Statement>) {
        self.replacement = Some(statements);
    }

    pub fn remove(&mut self) {
        self.replacement = Some(Vec::new());
    }

    pub fn insert_before(&mut self, statement: Statement) {
        self.before.push(statement);
    }
}

/// What a callback may touch besides its edit context
pub struct RewriteContext<'a> {
    pub program: &'a mut Program,
    pub method: MethodId,
    new_locals: &'a mut Vec<LocalId>,
}

impl RewriteContext<'_> {
    /// Allocates a compiler temporary in the method being rewritten. The
    /// caller is responsible for declaring it.
    pub fn new_temporary(&mut self, ty: Type, span: Span) -> LocalId {
        let name = format!("$t{}", self.program.locals.len());
        let local = self.program.locals.push(Local {
            name,
            ty,
            kind: LocalKind::Temporary,
            enclosing_method: self.method,
            span,
            pruned: false,
        });

        self.new_locals.push(local);
        local
    }
}

pub trait Rewriter {
    fn rewrite_expression(
        &mut self,
        _cx: &mut RewriteContext<'_>,
        _expression: &Expression,
        _position: Position,
        _edits: &mut ExpressionEdits,
    ) -> OptimizerResult<()> {
        Ok(())
    }

    fn rewrite_statement(
        &mut self,
        _cx: &mut RewriteContext<'_>,
        _statement: &Statement,
        _edits: &mut StatementEdits,
    ) -> OptimizerResult<()> {
        Ok(())
    }
}

/// Runs `rewriter` over the body of `method`, returning whether any edit was
/// applied. Methods without a body are left alone.
pub fn rewrite_method(
    program: &mut Program,
    method: MethodId,
    rewriter: &mut impl Rewriter,
) -> OptimizerResult<bool> {
    let Some(mut body) = program.methods[method].body.take() else {
        return Ok(false);
    };

    let mut new_locals = Vec::new();
    let mut driver = Driver {
        program: &mut *program,
        method,
        new_locals: &mut new_locals,
        rewriter,
        changed: false,
    };

    let result = driver.rewrite_block(&mut body.block);
    let changed = driver.changed;

    body.locals.extend(new_locals);
    program.methods[method].body = Some(body);

    result.map(|()| changed)
}

struct Driver<'a, R> {
    program: &'a mut Program,
    method: MethodId,
    new_locals: &'a mut Vec<LocalId>,
    rewriter: &'a mut R,
    changed: bool,
}

impl<R: Rewriter> Driver<'_, R> {
    fn rewrite_block(&mut self, block: &mut Block) -> OptimizerResult<()> {
        let statements = std::mem::take(&mut block.statements);
        let mut rewritten = Vec::with_capacity(statements.len());

        for mut statement in statements {
            let mut before = Vec::new();
            self.rewrite_statement_children(&mut statement, &mut before)?;

            let mut edits = StatementEdits::default();
            let mut cx = RewriteContext {
                program: &mut *self.program,
                method: self.method,
                new_locals: &mut *self.new_locals,
            };
            self.rewriter
                .rewrite_statement(&mut cx, &statement, &mut edits)?;

            if !edits.before.is_empty() || edits.replacement.is_some() {
                self.changed = true;
            }

            rewritten.extend(before);
            rewritten.extend(edits.before);

            match edits.replacement {
                Some(replacement) => rewritten.extend(replacement),
                None => rewritten.push(statement),
            }
        }

        block.statements = rewritten;
        Ok(())
    }

    fn rewrite_statement_children(
        &mut self,
        statement: &mut Statement,
        before: &mut Vec<Statement>,
    ) -> OptimizerResult<()> {
        match &mut statement.kind {
            StatementKind::Expression(expression) => {
                self.rewrite_expression(expression, Position::Discarded, before)
            }
            StatementKind::Throw(expression) => {
                self.rewrite_expression(expression, Position::Value, before)
            }
            StatementKind::Declaration { initializer, .. } => match initializer {
                Some(initializer) => self.rewrite_expression(initializer, Position::Value, before),
                None => Ok(()),
            },
            StatementKind::Return(value) => match value {
                Some(value) => self.rewrite_expression(value, Position::Value, before),
                None => Ok(()),
            },
            StatementKind::If {
                condition,
                then_block,
                else_block,
            } => {
                self.rewrite_expression(condition, Position::Value, before)?;
                self.rewrite_block(then_block)?;

                match else_block {
                    Some(else_block) => self.rewrite_block(else_block),
                    None => Ok(()),
                }
            }
            StatementKind::While { condition, body } => {
                self.rewrite_expression(condition, Position::Value, before)?;
                self.rewrite_block(body)
            }
            StatementKind::Block(block) => self.rewrite_block(block),
            StatementKind::Try { body, catches } => {
                self.rewrite_block(body)?;

                for clause in catches.iter_mut() {
                    self.rewrite_block(&mut clause.body)?;
                }

                Ok(())
            }
        }
    }

    fn rewrite_expression(
        &mut self,
        expression: &mut Expression,
        position: Position,
        before: &mut Vec<Statement>,
    ) -> OptimizerResult<()> {
        self.rewrite_children(expression, position, before)?;

        let mut edits = ExpressionEdits::default();
        let mut cx = RewriteContext {
            program: &mut *self.program,
            method: self.method,
            new_locals: &mut *self.new_locals,
        };
        self.rewriter
            .rewrite_expression(&mut cx, expression, position, &mut edits)?;

        if !edits.before.is_empty() {
            self.changed = true;
            before.extend(edits.before);
        }

        if let Some(replacement) = edits.replacement {
            self.changed = true;
            *expression = replacement;
        }

        Ok(())
    }

    fn rewrite_children(
        &mut self,
        expression: &mut Expression,
        position: Position,
        before: &mut Vec<Statement>,
    ) -> OptimizerResult<()> {
        match &mut expression.kind {
            ExpressionKind::Literal(_)
            | ExpressionKind::This
            | ExpressionKind::Local(_)
            | ExpressionKind::ClassLiteral(_)
            | ExpressionKind::Foreign(_) => {}
            ExpressionKind::Field { instance, .. } => {
                if let Some(instance) = instance {
                    self.rewrite_expression(instance, Position::Value, before)?;
                }
            }
            ExpressionKind::Call {
                instance,
                arguments,
                ..
            } => {
                if let Some(instance) = instance {
                    self.rewrite_expression(instance, Position::Value, before)?;
                }

                for argument in arguments.iter_mut() {
                    self.rewrite_expression(argument, Position::Value, before)?;
                }
            }
            ExpressionKind::New { arguments, .. } => {
                for argument in arguments.iter_mut() {
                    self.rewrite_expression(argument, Position::Value, before)?;
                }
            }
            ExpressionKind::Sequence(expressions) => {
                let last = expressions.len().saturating_sub(1);

                for (i, element) in expressions.iter_mut().enumerate() {
                    let position = if i == last {
                        position
                    } else {
                        Position::Discarded
                    };

                    self.rewrite_expression(element, position, before)?;
                }
            }
            ExpressionKind::Assign { target, value, .. } => {
                self.rewrite_expression(target, Position::AssignTarget, before)?;
                self.rewrite_expression(value, Position::Value, before)?;
            }
            ExpressionKind::Binary { lhs, rhs, .. } => {
                self.rewrite_expression(lhs, Position::Value, before)?;
                self.rewrite_expression(rhs, Position::Value, before)?;
            }
            ExpressionKind::Unary { operand, .. }
            | ExpressionKind::Cast { operand, .. }
            | ExpressionKind::InstanceOf { operand, .. }
            | ExpressionKind::CastFailure { operand } => {
                self.rewrite_expression(operand, Position::Value, before)?;
            }
            ExpressionKind::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                self.rewrite_expression(condition, Position::Value, before)?;
                self.rewrite_expression(then_value, position, before)?;
                self.rewrite_expression(else_value, position, before)?;
            }
            ExpressionKind::NullReceiver {
                instance,
                arguments,
            } => {
                self.rewrite_expression(instance, Position::Value, before)?;

                for argument in arguments.iter_mut() {
                    self.rewrite_expression(argument, Position::Value, before)?;
                }
            }
        }

        Ok(())
    }
}
