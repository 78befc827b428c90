use thiserror::Error;

/// Error type for export, import and store operations.
#[derive(Debug, Error)]
pub enum BookingsHelperError {
    #[error("connection error: {0}")]
    ConnectionError(String),
    #[error("schema error: {0}")]
    SchemaError(String),
    #[error("query error: {0}")]
    QueryError(String),
    #[error("transaction error: {0}")]
    TransactionError(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("none found: {0}")]
    NoneFound(String),
    #[error("no rules found: {0}")]
    NoRulesFound(String),
    #[error("malformed document: {0}")]
    MalformedDocument(String),
    #[error("size exceeded: {0}")]
    SizeExceeded(String),
    #[error("create failed: {0}")]
    CreateFailed(String),
    #[error("container error: {0}")]
    ContainerError(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("io error: {0}")]
    Io(String),
}

impl BookingsHelperError {
    pub fn connection<T: Into<String>>(msg: T) -> Self {
        BookingsHelperError::ConnectionError(msg.into())
    }

    pub fn schema<T: Into<String>>(msg: T) -> Self {
        BookingsHelperError::SchemaError(msg.into())
    }

    pub fn query<T: Into<String>>(msg: T) -> Self {
        BookingsHelperError::QueryError(msg.into())
    }

    pub fn transaction<T: Into<String>>(msg: T) -> Self {
        BookingsHelperError::TransactionError(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        BookingsHelperError::NotFound(msg.into())
    }

    pub fn none_found<T: Into<String>>(msg: T) -> Self {
        BookingsHelperError::NoneFound(msg.into())
    }

    pub fn no_rules<T: Into<String>>(msg: T) -> Self {
        BookingsHelperError::NoRulesFound(msg.into())
    }

    pub fn malformed<T: Into<String>>(msg: T) -> Self {
        BookingsHelperError::MalformedDocument(msg.into())
    }

    pub fn size_exceeded<T: Into<String>>(msg: T) -> Self {
        BookingsHelperError::SizeExceeded(msg.into())
    }

    pub fn create_failed<T: Into<String>>(msg: T) -> Self {
        BookingsHelperError::CreateFailed(msg.into())
    }

    pub fn container<T: Into<String>>(msg: T) -> Self {
        BookingsHelperError::ContainerError(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        BookingsHelperError::InvalidInput(msg.into())
    }

    pub fn io<T: Into<String>>(msg: T) -> Self {
        BookingsHelperError::Io(msg.into())
    }

    /// Same error kind with `note` appended to the message.
    pub fn annotate(self, note: &str) -> Self {
        use BookingsHelperError::*;
        let join = |msg: String| format!("{msg} {note}");
        match self {
            ConnectionError(msg) => ConnectionError(join(msg)),
            SchemaError(msg) => SchemaError(join(msg)),
            QueryError(msg) => QueryError(join(msg)),
            TransactionError(msg) => TransactionError(join(msg)),
            NotFound(msg) => NotFound(join(msg)),
            NoneFound(msg) => NoneFound(join(msg)),
            NoRulesFound(msg) => NoRulesFound(join(msg)),
            MalformedDocument(msg) => MalformedDocument(join(msg)),
            SizeExceeded(msg) => SizeExceeded(join(msg)),
            CreateFailed(msg) => CreateFailed(join(msg)),
            ContainerError(msg) => ContainerError(join(msg)),
            InvalidInput(msg) => InvalidInput(join(msg)),
            Io(msg) => Io(join(msg)),
        }
    }

    /// The message without the category prefix, suitable for a user-facing notice.
    pub fn message(&self) -> &str {
        match self {
            BookingsHelperError::ConnectionError(msg)
            | BookingsHelperError::SchemaError(msg)
            | BookingsHelperError::QueryError(msg)
            | BookingsHelperError::TransactionError(msg)
            | BookingsHelperError::NotFound(msg)
            | BookingsHelperError::NoneFound(msg)
            | BookingsHelperError::NoRulesFound(msg)
            | BookingsHelperError::MalformedDocument(msg)
            | BookingsHelperError::SizeExceeded(msg)
            | BookingsHelperError::CreateFailed(msg)
            | BookingsHelperError::ContainerError(msg)
            | BookingsHelperError::InvalidInput(msg)
            | BookingsHelperError::Io(msg) => msg,
        }
    }
}
