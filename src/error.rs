// The closed set of ways a run can fail, one variant per exit code in
// the interface table. `main` is the only caller of `exit_code`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("cli misuse: {0}")]
    Cli(String),

    #[error("could not open input stream: {0}")]
    InputOpen(String),

    #[error("could not open output stream: {0}")]
    OutputOpen(String),

    #[error("malformed xml: {0}")]
    MalformedXml(String),

    #[error("unexpected xml structure: {0}")]
    UnexpectedStructure(String),

    #[error("semantic error: {0}")]
    Semantic(String),

    #[error("type error: {0}")]
    TypeError(String),

    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("missing frame: {0}")]
    MissingFrame(String),

    #[error("missing value: {0}")]
    MissingValue(String),

    #[error("bad operand value: {0}")]
    BadOperandValue(String),

    #[error("bad string operation: {0}")]
    BadStringOp(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Cli(_) => 10,
            Error::InputOpen(_) => 11,
            Error::OutputOpen(_) => 12,
            Error::MalformedXml(_) => 31,
            Error::UnexpectedStructure(_) => 32,
            Error::Semantic(_) => 52,
            Error::TypeError(_) => 53,
            Error::UndefinedVariable(_) => 54,
            Error::MissingFrame(_) => 55,
            Error::MissingValue(_) => 56,
            Error::BadOperandValue(_) => 57,
            Error::BadStringOp(_) => 58,
            Error::Internal(_) => 99,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
