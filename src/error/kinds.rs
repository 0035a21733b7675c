use std::{fmt, io};

/// Crate-wide `Result` type using [`CursordError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, CursordError>;

/// Top-level error type for cursord operations.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum CursordError {
    /// Cursor lifecycle errors.
    Cursor(CursorError),

    /// Authentication and authorization errors.
    Auth(AuthError),

    /// Query parsing, binding and execution errors.
    Query(QueryError),

    /// Storage catalog errors.
    Catalog(CatalogError),

    /// Graph definition errors.
    Graph(GraphError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// Snapshot (de)serialization errors.
    Serialization(serde_json::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Cursor-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    /// Unknown, expired or deleted cursor id.
    NotFound(String),

    /// Another request currently holds the cursor.
    Conflict(String),

    /// A batch was requested from an exhausted producer.
    Exhausted,

    /// Requested batch size is not usable.
    InvalidBatchSize(u64),
}

/// Authentication and authorization errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No credentials or credentials rejected.
    Unauthenticated,

    /// The identity may not read a referenced collection.
    ReadDenied {
        user: String,
        database: String,
        collection: String,
    },

    /// The identity may not write to a collection.
    WriteDenied {
        user: String,
        database: String,
        collection: String,
    },

    /// A continuation or delete was issued by someone other than the owner.
    NotOwner { user: String, cursor: String },

    /// Operation requires administrative rights.
    AdminRequired(String),

    /// User does not exist.
    UnknownUser(String),

    /// User already exists.
    DuplicateUser(String),

    /// Grant level string is not one of `rw`, `ro`, `none`.
    InvalidGrant(String),
}

/// Query errors, all surfaced as query execution failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Query text could not be parsed.
    Syntax { message: String, position: usize },

    /// A declared bind parameter has no value.
    MissingBindParameter(String),

    /// A bind value was supplied that the query does not use.
    UndeclaredBindParameter(String),

    /// A bind value has the wrong type for its use.
    InvalidBindParameter(String),

    /// An expression refers to a variable that is not in scope.
    UnknownVariable(String),

    /// A loop variable is declared twice.
    VariableRedeclared(String),

    /// The query reads from a collection that does not exist.
    CollectionNotFound(String),
}

/// Catalog (storage) errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Database does not exist.
    DatabaseNotFound(String),

    /// Collection does not exist.
    CollectionNotFound(String),

    /// Collection already exists.
    DuplicateCollection(String),

    /// A document with the same key already exists.
    DuplicateKey { collection: String, key: String },

    /// The value is not a storable document.
    InvalidDocument(String),

    /// Collection or database name is not acceptable.
    InvalidName(String),
}

/// Graph definition errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Graph does not exist.
    NotFound(String),

    /// Graph already exists.
    Duplicate(String),

    /// Edge definition is not part of the graph.
    EdgeDefinitionNotFound(String),

    /// Vertex collection is not an orphan of the graph.
    VertexCollectionNotFound(String),

    /// Vertex collection is already used by the graph.
    VertexCollectionInUse(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

impl CursordError {
    /// HTTP status code reported for this error.
    pub fn http_code(&self) -> u16 {
        match self {
            CursordError::Cursor(CursorError::NotFound(_)) => 404,
            CursordError::Cursor(CursorError::Conflict(_)) => 409,
            CursordError::Cursor(CursorError::Exhausted) => 400,
            CursordError::Cursor(CursorError::InvalidBatchSize(_)) => 400,
            CursordError::Auth(AuthError::Unauthenticated) => 401,
            CursordError::Auth(AuthError::UnknownUser(_)) => 404,
            CursordError::Auth(AuthError::DuplicateUser(_)) => 409,
            CursordError::Auth(AuthError::InvalidGrant(_)) => 400,
            CursordError::Auth(_) => 403,
            CursordError::Query(QueryError::CollectionNotFound(_)) => 404,
            CursordError::Query(_) => 400,
            CursordError::Catalog(CatalogError::DatabaseNotFound(_))
            | CursordError::Catalog(CatalogError::CollectionNotFound(_)) => 404,
            CursordError::Catalog(CatalogError::DuplicateCollection(_))
            | CursordError::Catalog(CatalogError::DuplicateKey { .. }) => 409,
            CursordError::Catalog(_) => 400,
            CursordError::Graph(GraphError::Duplicate(_)) => 409,
            CursordError::Graph(_) => 404,
            CursordError::Config(_)
            | CursordError::Io(_)
            | CursordError::Serialization(_)
            | CursordError::Generic(_) => 500,
        }
    }

    /// Stable numeric error code reported as `errorNum`.
    pub fn error_num(&self) -> u32 {
        match self {
            CursordError::Cursor(CursorError::NotFound(_)) => 1600,
            CursordError::Cursor(CursorError::Conflict(_)) => 1200,
            CursordError::Cursor(CursorError::Exhausted) => 1600,
            CursordError::Cursor(CursorError::InvalidBatchSize(_)) => 10,
            CursordError::Auth(AuthError::Unauthenticated) => 401,
            CursordError::Auth(AuthError::UnknownUser(_)) => 1703,
            CursordError::Auth(AuthError::DuplicateUser(_)) => 1702,
            CursordError::Auth(AuthError::InvalidGrant(_)) => 10,
            CursordError::Auth(_) => 11,
            CursordError::Query(QueryError::Syntax { .. }) => 1501,
            CursordError::Query(QueryError::VariableRedeclared(_)) => 1511,
            CursordError::Query(QueryError::UnknownVariable(_)) => 1512,
            CursordError::Query(QueryError::MissingBindParameter(_)) => 1551,
            CursordError::Query(QueryError::UndeclaredBindParameter(_)) => 1552,
            CursordError::Query(QueryError::InvalidBindParameter(_)) => 1553,
            CursordError::Query(QueryError::CollectionNotFound(_)) => 1203,
            CursordError::Catalog(CatalogError::DatabaseNotFound(_)) => 1228,
            CursordError::Catalog(CatalogError::CollectionNotFound(_)) => 1203,
            CursordError::Catalog(CatalogError::DuplicateCollection(_)) => 1207,
            CursordError::Catalog(CatalogError::DuplicateKey { .. }) => 1210,
            CursordError::Catalog(CatalogError::InvalidDocument(_)) => 1227,
            CursordError::Catalog(CatalogError::InvalidName(_)) => 1208,
            CursordError::Graph(GraphError::NotFound(_)) => 1924,
            CursordError::Graph(GraphError::Duplicate(_)) => 1925,
            CursordError::Graph(GraphError::EdgeDefinitionNotFound(_)) => 1930,
            CursordError::Graph(GraphError::VertexCollectionNotFound(_)) => 1926,
            CursordError::Graph(GraphError::VertexCollectionInUse(_)) => 1938,
            CursordError::Config(_)
            | CursordError::Io(_)
            | CursordError::Serialization(_)
            | CursordError::Generic(_) => 4,
        }
    }

    /// True for errors that reject a request for lack of rights.
    pub fn is_authorization_denied(&self) -> bool {
        matches!(
            self,
            CursordError::Auth(
                AuthError::ReadDenied { .. }
                    | AuthError::WriteDenied { .. }
                    | AuthError::NotOwner { .. }
                    | AuthError::AdminRequired(_)
            )
        )
    }

    /// True for unknown, expired or deleted cursors.
    pub fn is_cursor_not_found(&self) -> bool {
        matches!(self, CursordError::Cursor(CursorError::NotFound(_)))
    }

    /// True when another request holds the cursor.
    pub fn is_cursor_conflict(&self) -> bool {
        matches!(self, CursordError::Cursor(CursorError::Conflict(_)))
    }

    /// True for errors raised while parsing, binding or running a query.
    pub fn is_query_error(&self) -> bool {
        matches!(self, CursordError::Query(_))
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for CursordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursordError::Cursor(e) => write!(f, "{e}"),
            CursordError::Auth(e) => write!(f, "{e}"),
            CursordError::Query(e) => write!(f, "Query error: {e}"),
            CursordError::Catalog(e) => write!(f, "{e}"),
            CursordError::Graph(e) => write!(f, "Graph error: {e}"),
            CursordError::Config(e) => write!(f, "Configuration error: {e}"),
            CursordError::Io(e) => write!(f, "I/O error: {e}"),
            CursordError::Serialization(e) => write!(f, "Serialization error: {e}"),
            CursordError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorError::NotFound(id) => write!(f, "cursor not found: {id}"),
            CursorError::Conflict(id) => {
                write!(f, "cursor {id} is in use by another request")
            }
            CursorError::Exhausted => write!(f, "cursor is exhausted"),
            CursorError::InvalidBatchSize(size) => {
                write!(f, "invalid batch size: {size}")
            }
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Unauthenticated => write!(f, "not authorized to execute this request"),
            AuthError::ReadDenied {
                user,
                database,
                collection,
            } => write!(
                f,
                "forbidden: user '{user}' may not read collection '{database}/{collection}'"
            ),
            AuthError::WriteDenied {
                user,
                database,
                collection,
            } => write!(
                f,
                "forbidden: user '{user}' may not write collection '{database}/{collection}'"
            ),
            AuthError::NotOwner { user, cursor } => {
                write!(f, "forbidden: cursor {cursor} is not owned by user '{user}'")
            }
            AuthError::AdminRequired(user) => {
                write!(f, "forbidden: user '{user}' lacks administrative rights")
            }
            AuthError::UnknownUser(user) => write!(f, "user not found: {user}"),
            AuthError::DuplicateUser(user) => write!(f, "duplicate user: {user}"),
            AuthError::InvalidGrant(level) => write!(f, "invalid grant level: {level}"),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Syntax { message, position } => {
                write!(f, "syntax error at position {position}: {message}")
            }
            QueryError::MissingBindParameter(name) => {
                write!(f, "no value specified for declared bind parameter '{name}'")
            }
            QueryError::UndeclaredBindParameter(name) => {
                write!(f, "bind parameter '{name}' was not declared in the query")
            }
            QueryError::InvalidBindParameter(name) => {
                write!(f, "bind parameter '{name}' has an invalid value or type")
            }
            QueryError::UnknownVariable(name) => write!(f, "variable '{name}' is not defined"),
            QueryError::VariableRedeclared(name) => {
                write!(f, "variable '{name}' is assigned multiple times")
            }
            QueryError::CollectionNotFound(name) => {
                write!(f, "collection or view not found: {name}")
            }
        }
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::DatabaseNotFound(name) => write!(f, "database not found: {name}"),
            CatalogError::CollectionNotFound(name) => {
                write!(f, "collection or view not found: {name}")
            }
            CatalogError::DuplicateCollection(name) => write!(f, "duplicate name: {name}"),
            CatalogError::DuplicateKey { collection, key } => {
                write!(f, "unique constraint violated: {collection}/{key}")
            }
            CatalogError::InvalidDocument(msg) => write!(f, "invalid document: {msg}"),
            CatalogError::InvalidName(name) => write!(f, "illegal name: {name}"),
        }
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::NotFound(name) => write!(f, "graph '{name}' not found"),
            GraphError::Duplicate(name) => write!(f, "graph '{name}' already exists"),
            GraphError::EdgeDefinitionNotFound(name) => {
                write!(f, "edge collection '{name}' not used in graph")
            }
            GraphError::VertexCollectionNotFound(name) => {
                write!(f, "vertex collection '{name}' is not an orphan of the graph")
            }
            GraphError::VertexCollectionInUse(name) => {
                write!(f, "collection '{name}' is already used by the graph")
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for CursordError {}
impl std::error::Error for CursorError {}
impl std::error::Error for AuthError {}
impl std::error::Error for QueryError {}
impl std::error::Error for CatalogError {}
impl std::error::Error for GraphError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to CursordError ========================= */

impl From<io::Error> for CursordError {
    fn from(err: io::Error) -> Self {
        CursordError::Io(err)
    }
}

impl From<serde_json::Error> for CursordError {
    fn from(err: serde_json::Error) -> Self {
        CursordError::Serialization(err)
    }
}

impl From<CursorError> for CursordError {
    fn from(err: CursorError) -> Self {
        CursordError::Cursor(err)
    }
}

impl From<AuthError> for CursordError {
    fn from(err: AuthError) -> Self {
        CursordError::Auth(err)
    }
}

impl From<QueryError> for CursordError {
    fn from(err: QueryError) -> Self {
        CursordError::Query(err)
    }
}

impl From<CatalogError> for CursordError {
    fn from(err: CatalogError) -> Self {
        CursordError::Catalog(err)
    }
}

impl From<GraphError> for CursordError {
    fn from(err: GraphError) -> Self {
        CursordError::Graph(err)
    }
}

impl From<ConfigError> for CursordError {
    fn from(err: ConfigError) -> Self {
        CursordError::Config(err)
    }
}

impl From<String> for CursordError {
    fn from(msg: String) -> Self {
        CursordError::Generic(msg)
    }
}

impl From<&str> for CursordError {
    fn from(msg: &str) -> Self {
        CursordError::Generic(msg.to_owned())
    }
}
