use std::path::PathBuf;
use thiserror::Error;

/// Source text is not valid template syntax.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("line {line}: unterminated {delimiter}")]
    Unterminated { line: usize, delimiter: &'static str },
    #[error("line {line}: unknown tag '{name}'")]
    UnknownTag { line: usize, name: String },
    #[error("line {line}: unexpected '{tag}'")]
    UnexpectedTag { line: usize, tag: String },
    #[error("line {line}: tag '{tag}' was never closed")]
    Unclosed { line: usize, tag: String },
    #[error("line {line}: invalid syntax in '{tag}': {message}")]
    Syntax {
        line: usize,
        tag: String,
        message: String,
    },
}

/// Failure while evaluating a compiled template.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("undefined filter: {0}")]
    UndefinedFilter(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("include name must be a string, got {0}")]
    InvalidInclude(String),
    #[error("failed to read template {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to compile {}: {source}", path.display())]
    Partial {
        path: PathBuf,
        #[source]
        source: CompileError,
    },
    #[error("include depth exceeded {0} while rendering {path}", path = .1.display())]
    IncludeDepth(usize, PathBuf),
}

/// Either phase of a full loader run.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Render(#[from] RenderError),
}
