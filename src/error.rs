use colored::Colorize;
use thiserror::Error;

pub type OptimizerResult<T> = Result<T, InternalCompilerError>;

/// An invariant of the program model was violated. These are bugs in the
/// optimizer or in whatever built the program, never user errors, so they
/// abort the whole run.
#[derive(Debug, Clone, Error)]
#[error("internal compiler error: {message}")]
pub struct InternalCompilerError {
    pub message: String,
    /// Description of the offending node
    pub node: String,
    /// `file:line:column` of the offending node
    pub location: String,
    /// What the optimizer was doing, innermost first
    pub context: Vec<String>,
    /// Where in the optimizer the error was raised
    #[cfg(feature = "error-backtrace")]
    pub raised_at: String,
}

impl InternalCompilerError {
    pub fn new(
        message: impl Into<String>,
        node: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            node: node.into(),
            location: location.into(),
            context: Vec::new(),
            #[cfg(feature = "error-backtrace")]
            raised_at: String::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Renders a colored multi-line diagnostic
    pub fn report(&self) -> String {
        let mut report = format!(
            "{}: {}\n  {} {} {}",
            "internal compiler error".red().bold(),
            self.message,
            "-->".blue(),
            self.location,
            format!("({})", self.node).white()
        );

        for context in self.context.iter() {
            report.push_str(&format!("\n  {} {}", "note:".cyan(), context));
        }

        #[cfg(feature = "error-backtrace")]
        if !self.raised_at.is_empty() {
            report = format!("{}: {}\n{}", "backtrace".blue(), self.raised_at, report);
        }

        report
    }
}

/// Adds a line to the context trail of an error as it propagates
pub trait ResultExt<T> {
    fn context_with(self, context: impl FnOnce() -> String) -> OptimizerResult<T>;
}

impl<T> ResultExt<T> for OptimizerResult<T> {
    fn context_with(self, context: impl FnOnce() -> String) -> OptimizerResult<T> {
        self.map_err(|error| error.with_context(context()))
    }
}

/// Builds an [`InternalCompilerError`] for a node, recording where it was
/// raised when the `error-backtrace` feature is on.
macro_rules! ice {
    ($node:expr, $location:expr, $($message:tt)+) => {{
        #[allow(unused_mut)]
        let mut error =
            $crate::error::InternalCompilerError::new(format!($($message)+), $node, $location);

        #[cfg(feature = "error-backtrace")]
        {
            error.raised_at = format!(
                "{} (at {}:{}:{})",
                module_path!(),
                file!(),
                line!(),
                column!()
            );
        }

        error
    }};
}

pub(crate) use ice;
