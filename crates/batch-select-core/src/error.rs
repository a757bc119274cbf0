//! Error types for batch loading.

use std::fmt;

/// The primary error type for all batch-select operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (open, disconnect)
    Connection(ConnectionError),
    /// Query execution errors, including malformed refinements
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Relationship resolution errors
    Relationship(RelationshipError),
    /// Configuration errors
    Config(ConfigError),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to open the store
    Connect,
    /// Connection lost during operation
    Disconnected,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table, column or relation not found
    NotFound,
    /// Store is busy or locked
    Busy,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

/// Failure to turn a `(table, field)` pair into a batchable relationship.
#[derive(Debug, Clone)]
pub struct RelationshipError {
    pub kind: RelationshipErrorKind,
    /// Table of the owning entity
    pub table: String,
    /// Field name as requested by the caller
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipErrorKind {
    /// No declared relationship matches the field, even after suffix stripping
    UnknownRelationship,
    /// The field is a single-valued reference, not a to-many collection
    NotBatchable,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Build an `UnknownRelationship` error.
    pub fn unknown_relationship(table: &str, field: &str) -> Self {
        Error::Relationship(RelationshipError {
            kind: RelationshipErrorKind::UnknownRelationship,
            table: table.to_string(),
            field: field.to_string(),
            message: format!("'{table}' has no relationship named '{field}'"),
        })
    }

    /// Build a `NotBatchable` error.
    pub fn not_batchable(table: &str, field: &str, detail: &str) -> Self {
        Error::Relationship(RelationshipError {
            kind: RelationshipErrorKind::NotBatchable,
            table: table.to_string(),
            field: field.to_string(),
            message: format!("'{table}.{field}' cannot be batch loaded: {detail}"),
        })
    }

    /// Build a `NotFound` query error for a refinement that names something absent.
    pub fn not_found(message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            kind: QueryErrorKind::NotFound,
            sql: None,
            message: message.into(),
            source: None,
        })
    }

    /// Build a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }

    /// Kind of relationship failure, if this is one.
    pub fn relationship_kind(&self) -> Option<RelationshipErrorKind> {
        match self {
            Error::Relationship(e) => Some(e.kind),
            _ => None,
        }
    }

    pub fn is_unknown_relationship(&self) -> bool {
        self.relationship_kind() == Some(RelationshipErrorKind::UnknownRelationship)
    }

    pub fn is_not_batchable(&self) -> bool {
        self.relationship_kind() == Some(RelationshipErrorKind::NotBatchable)
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Relationship(e) => write!(f, "{}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for RelationshipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            RelationshipErrorKind::UnknownRelationship => "Unknown relationship",
            RelationshipErrorKind::NotBatchable => "Relationship not batchable",
        };
        write!(f, "{label}: {}", self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl From<RelationshipError> for Error {
    fn from(err: RelationshipError) -> Self {
        Error::Relationship(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Config(ConfigError {
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

/// Result type alias for batch-select operations.
pub type Result<T> = std::result::Result<T, Error>;
