use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed checkpoint: {0}")]
    Format(String),

    #[error("particles {a} and {b} are coincident; cell cannot be subdivided further")]
    CoincidentParticles { a: usize, b: usize },

    #[error("aggregated mass {node} does not match the sum {children} over children")]
    MassMismatch { node: f64, children: f64 },
}

pub type Result<T> = std::result::Result<T, Error>;
