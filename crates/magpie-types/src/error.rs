//! Shared error types for the Magpie system.

use thiserror::Error;

/// Errors from the graph store client.
#[derive(Error, Debug)]
pub enum GraphError {
    /// The HTTP request itself failed (connection refused, timeout, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The store answered with a non-success HTTP status.
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, as far as it could be read.
        message: String,
    },

    /// The store executed the request but reported a query error.
    #[error("Query error {code}: {message}")]
    Query {
        /// Store-side error code.
        code: String,
        /// Store-side error message.
        message: String,
    },

    /// The response body could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A result row did not have the expected shape.
    #[error("Row decode error: {0}")]
    Decode(String),
}

/// Alias for Result with GraphError.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors from the embedding and text-generation services.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The HTTP request itself failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The service answered with a non-success HTTP status.
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, as far as it could be read.
        message: String,
    },

    /// The response body could not be parsed or was empty.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Alias for Result with ServiceError.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Top-level error type for memory engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A graph store call failed.
    #[error("Graph store error: {0}")]
    Graph(#[from] GraphError),

    /// An embedding or generation call failed.
    #[error("Model service error: {0}")]
    Service(#[from] ServiceError),

    /// The requested fragment does not exist.
    #[error("Fragment not found: {0}")]
    FragmentNotFound(String),

    /// The requested session does not exist or is no longer active.
    #[error("Session not found or inactive: {0}")]
    SessionNotFound(String),

    /// Invalid caller input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Alias for Result with EngineError.
pub type EngineResult<T> = Result<T, EngineError>;
