use thiserror::Error;

/// Result type local to aqlflow-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("memory limit exceeded for tag '{tag}': requested {requested} bytes, limit {limit}, used {used}")]
    BudgetExceeded {
        tag: &'static str,
        requested: usize,
        limit: usize,
        used: usize,
    },
}

impl From<Error> for aqlflow_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::BudgetExceeded {
                tag,
                requested,
                limit,
                used,
            } => aqlflow_core::Error::ResourceExhausted {
                tag,
                requested,
                limit,
                used,
            },
        }
    }
}
