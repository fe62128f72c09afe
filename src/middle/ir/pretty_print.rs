use std::fmt::Write;

use colored::Colorize;
use itertools::Itertools;

use super::{
    Block, DeclaredTypeKind, Dispatch, Expression, ExpressionKind, Literal, MethodId, MethodKind,
    Program, SpecialCategory, Statement, StatementKind, TypeId, UnaryOperator,
};

const INDENT: &str = "    ";

pub fn pretty_print_program(program: &Program) {
    print!("{}", program_to_string(program));
}

/// The dump of [`pretty_print_program`] without colors
pub fn program_to_plain_string(program: &Program) -> String {
    let colored = program_to_string(program);
    String::from_utf8_lossy(&strip_ansi_escapes::strip(colored)).into_owned()
}

pub fn program_to_string(program: &Program) -> String {
    let mut printer = Printer {
        program,
        out: String::new(),
        depth: 0,
    };

    for &ty in program.type_order.iter() {
        printer.print_type(ty);
    }

    printer.out
}

struct Printer<'p> {
    program: &'p Program,
    out: String,
    depth: usize,
}

impl Printer<'_> {
    fn line(&mut self, text: impl std::fmt::Display) {
        let _ = writeln!(self.out, "{}{text}", INDENT.repeat(self.depth));
    }

    fn type_name(&self, ty: TypeId) -> String {
        self.program.types[ty].name.blue().to_string()
    }

    fn print_type(&mut self, ty: TypeId) {
        let program = self.program;
        let declared = &program.types[ty];
        let mut header = String::new();

        if declared.is_abstract && declared.kind == DeclaredTypeKind::Class {
            header.push_str(&format!("{} ", "abstract".magenta()));
        }
        if declared.is_final {
            header.push_str(&format!("{} ", "final".magenta()));
        }

        header.push_str(&format!(
            "{} {}",
            declared.kind.to_string().magenta(),
            self.type_name(ty)
        ));

        if let Some(superclass) = declared.superclass {
            if superclass != program.well_known.object {
                header.push_str(&format!(" {} {}", "extends".magenta(), self.type_name(superclass)));
            }
        }

        if !declared.interfaces.is_empty() {
            let keyword = if declared.is_interface() { "extends" } else { "implements" };
            header.push_str(&format!(
                " {} {}",
                keyword.magenta(),
                declared
                    .interfaces
                    .iter()
                    .map(|&interface| self.type_name(interface))
                    .join(", ")
            ));
        }

        if declared.category != SpecialCategory::Ordinary {
            header.push_str(&format!(" [{}]", declared.category.to_string().yellow()));
        }

        header.push_str(" {");
        self.line(header);
        self.depth += 1;

        for &field in declared.fields.iter() {
            let field = &program.fields[field];
            let mut text = String::new();

            if field.is_static {
                text.push_str(&format!("{} ", "static".magenta()));
            }
            if field.is_volatile {
                text.push_str(&format!("{} ", "volatile".magenta()));
            }

            text.push_str(&format!(
                "{}: {}",
                field.name,
                program.type_name(field.ty).blue()
            ));

            if let Some(initializer) = &field.initializer {
                text.push_str(&format!(" = {}", literal(initializer)));
            }

            text.push(';');
            self.line(text);
        }

        for &method in declared.methods.iter() {
            self.print_method(method);
        }

        self.depth -= 1;
        self.line("}");
    }

    fn print_method(&mut self, method: MethodId) {
        let program = self.program;
        let declared = &program.methods[method];

        // Initializer slots are always present; only show them when they do
        // something
        if declared.is_initializer()
            && declared
                .body
                .as_ref()
                .is_none_or(|body| body.block.is_empty())
        {
            return;
        }

        let mut header = String::new();

        let modifiers = [
            (declared.kind == MethodKind::Static, "static"),
            (declared.is_abstract, "abstract"),
            (declared.is_foreign, "foreign"),
            (declared.is_exported, "export"),
            (program.entry_methods.contains(&method), "entry"),
        ];
        for (_, modifier) in modifiers.iter().filter(|(set, _)| *set) {
            header.push_str(&format!("{} ", modifier.magenta()));
        }

        let params = declared
            .params
            .iter()
            .map(|&param| {
                let local = &program.locals[param];
                format!("{}: {}", local.name, program.type_name(local.ty).blue())
            })
            .join(", ");

        header.push_str(&format!(
            "{} {}({params}) -> {}",
            "fn".magenta(),
            declared.name.cyan(),
            program.type_name(declared.return_type).blue()
        ));

        match &declared.body {
            Some(body) => {
                header.push_str(" {");
                self.line(header);
                self.print_statements(&body.block);
                self.line("}");
            }
            None => {
                header.push(';');
                self.line(header);
            }
        }
    }

    fn print_statements(&mut self, block: &Block) {
        self.depth += 1;
        for statement in block.statements.iter() {
            self.print_statement(statement);
        }
        self.depth -= 1;
    }

    fn print_statement(&mut self, statement: &Statement) {
        let program = self.program;

        match &statement.kind {
            StatementKind::Expression(expression) => {
                let text = format!("{};", self.expression(expression));
                self.line(text);
            }
            StatementKind::Declaration { local, initializer } => {
                let declared = &program.locals[*local];
                let mut text = format!(
                    "{} {}: {}",
                    "let".magenta(),
                    declared.name,
                    program.type_name(declared.ty).blue()
                );

                if let Some(initializer) = initializer {
                    text.push_str(&format!(" = {}", self.expression(initializer)));
                }

                text.push(';');
                self.line(text);
            }
            StatementKind::Return(value) => {
                let text = match value {
                    Some(value) => format!("{} {};", "return".magenta(), self.expression(value)),
                    None => format!("{};", "return".magenta()),
                };
                self.line(text);
            }
            StatementKind::If {
                condition,
                then_block,
                else_block,
            } => {
                let text = format!("{} {} {{", "if".magenta(), self.expression(condition));
                self.line(text);
                self.print_statements(then_block);

                if let Some(else_block) = else_block {
                    self.line(format!("}} {} {{", "else".magenta()));
                    self.print_statements(else_block);
                }

                self.line("}");
            }
            StatementKind::While { condition, body } => {
                let text = format!("{} {} {{", "while".magenta(), self.expression(condition));
                self.line(text);
                self.print_statements(body);
                self.line("}");
            }
            StatementKind::Block(block) => {
                self.line("{");
                self.print_statements(block);
                self.line("}");
            }
            StatementKind::Throw(value) => {
                let text = format!("{} {};", "throw".magenta(), self.expression(value));
                self.line(text);
            }
            StatementKind::Try { body, catches } => {
                self.line(format!("{} {{", "try".magenta()));
                self.print_statements(body);

                for clause in catches.iter() {
                    let types = clause
                        .exception_types
                        .iter()
                        .map(|&ty| self.type_name(ty))
                        .join(" | ");
                    self.line(format!(
                        "}} {} ({types} {}) {{",
                        "catch".magenta(),
                        program.locals[clause.binding].name
                    ));
                    self.print_statements(&clause.body);
                }

                self.line("}");
            }
        }
    }

    fn arguments(&self, arguments: &[Expression]) -> String {
        arguments
            .iter()
            .map(|argument| self.expression(argument))
            .join(", ")
    }

    fn expression(&self, expression: &Expression) -> String {
        let program = self.program;

        match &expression.kind {
            ExpressionKind::Literal(value) => literal(value),
            ExpressionKind::This => "this".magenta().to_string(),
            ExpressionKind::Local(local) => program.locals[*local].name.clone(),
            ExpressionKind::Field { instance, field } => {
                let declared = &program.fields[*field];
                match instance {
                    Some(instance) => format!("{}.{}", self.expression(instance), declared.name),
                    None => format!("{}.{}", self.type_name(declared.enclosing_type), declared.name),
                }
            }
            ExpressionKind::Call {
                instance,
                method,
                arguments,
                dispatch,
            } => {
                let declared = &program.methods[*method];
                let name = declared.name.cyan();
                let arguments = self.arguments(arguments);

                match (instance, dispatch) {
                    (Some(instance), Dispatch::Virtual) => {
                        format!("{}.{name}({arguments})", self.expression(instance))
                    }
                    (Some(instance), Dispatch::Static) => format!(
                        "{}.{}::{name}({arguments})",
                        self.expression(instance),
                        self.type_name(declared.enclosing_type)
                    ),
                    (None, _) => format!(
                        "{}.{name}({arguments})",
                        self.type_name(declared.enclosing_type)
                    ),
                }
            }
            ExpressionKind::New {
                class, arguments, ..
            } => format!(
                "{} {}({})",
                "new".magenta(),
                self.type_name(*class),
                self.arguments(arguments)
            ),
            ExpressionKind::Assign {
                operator,
                target,
                value,
            } => {
                let operator = match operator {
                    Some(operator) => format!("{}=", operator.symbol()),
                    None => "=".to_string(),
                };
                format!(
                    "{} {} {}",
                    self.expression(target),
                    operator.white(),
                    self.expression(value)
                )
            }
            ExpressionKind::Binary { operator, lhs, rhs } => format!(
                "({} {} {})",
                self.expression(lhs),
                operator.symbol().white(),
                self.expression(rhs)
            ),
            ExpressionKind::Unary { operator, operand } => {
                let symbol = match operator {
                    UnaryOperator::Not => "!",
                    UnaryOperator::Negate => "-",
                };
                format!("{}{}", symbol.white(), self.expression(operand))
            }
            ExpressionKind::Conditional {
                condition,
                then_value,
                else_value,
            } => format!(
                "({} ? {} : {})",
                self.expression(condition),
                self.expression(then_value),
                self.expression(else_value)
            ),
            ExpressionKind::Cast {
                target,
                checked,
                operand,
            } => {
                let target = if *checked {
                    self.type_name(*target)
                } else {
                    format!("{} {}", "unchecked".magenta(), self.type_name(*target))
                };
                format!("({target}) {}", self.expression(operand))
            }
            ExpressionKind::InstanceOf { test, operand } => format!(
                "({} {} {})",
                self.expression(operand),
                "instanceof".magenta(),
                self.type_name(*test)
            ),
            ExpressionKind::ClassLiteral(ty) => {
                format!("{}.{}", self.type_name(*ty), "class".magenta())
            }
            ExpressionKind::Sequence(expressions) => format!("({})", self.arguments(expressions)),
            ExpressionKind::Foreign(code) => {
                format!("{} {}", "foreign".magenta(), format!("{:?}", code.code).green())
            }
            ExpressionKind::CastFailure { operand } => format!(
                "{}({})",
                "cast_failure".red(),
                self.expression(operand)
            ),
            ExpressionKind::NullReceiver {
                instance,
                arguments,
            } => {
                let mut operands = vec![self.expression(instance)];
                operands.extend(arguments.iter().map(|argument| self.expression(argument)));
                format!("{}({})", "null_receiver".red(), operands.join(", "))
            }
        }
    }
}

fn literal(value: &Literal) -> String {
    match value {
        Literal::Null => "null".magenta().to_string(),
        Literal::Bool(value) => value.to_string().purple().to_string(),
        Literal::Int(value) => value.to_string().purple().to_string(),
        Literal::String(value) => format!("{value:?}").green().to_string(),
    }
}
