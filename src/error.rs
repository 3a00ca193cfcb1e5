use thiserror::Error;

#[derive(Debug, Error)]
pub enum HaloError {
    #[error("Invalid halo geometry: {0}")]
    InvalidGeometry(String),

    #[error("Protocol violation: {op} called in phase {actual}, expected {expected}")]
    ProtocolViolation {
        op: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Too many arrays: {given} passed, capacity declared at setup is {max}")]
    TooManyArrays { given: usize, max: usize },

    #[error("Pattern already set up")]
    AlreadySetUp,

    #[error("Pattern not set up")]
    NotSetUp,

    #[error("Communication fault: {0}")]
    Comm(String),
}

pub type Result<T> = std::result::Result<T, HaloError>;
