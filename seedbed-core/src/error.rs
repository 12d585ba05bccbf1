use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed configuration. Never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The liveness probe did not succeed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Admin seeding failed; wraps the underlying cause.
    #[error("Seed failed: {0}")]
    Seed(#[source] Box<Error>),

    /// Releasing the pool failed or timed out.
    #[error("Shutdown error: {0}")]
    Shutdown(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap any error as the cause of a failed seed run.
    #[must_use]
    pub fn seed(cause: Self) -> Self {
        match cause {
            already @ Self::Seed(_) => already,
            other => Self::Seed(Box::new(other)),
        }
    }

    /// The innermost cause of a seed failure, or `self` for other variants.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Seed(inner) => inner.root_cause(),
            other => other,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound("Resource not found".to_string()),
            sqlx::Error::PoolTimedOut => {
                Self::Connection("Timed out waiting for a database connection".to_string())
            }
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().unwrap_or_default();
                match code.as_ref() {
                    // PostgreSQL unique_violation
                    "23505" => {
                        if db_err.message().contains("email") {
                            Self::AlreadyExists("Email already registered".to_string())
                        } else {
                            Self::AlreadyExists("Resource already exists".to_string())
                        }
                    }
                    // PostgreSQL check_violation
                    "23514" => Self::InvalidInput("Constraint check failed".to_string()),
                    // PostgreSQL not_null_violation
                    "23502" => Self::InvalidInput("Required field is missing".to_string()),
                    _ => Self::Database(err),
                }
            }
            _ => Self::Database(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
