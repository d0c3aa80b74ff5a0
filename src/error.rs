use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeftError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("auth error: {0}")]
    Auth(String),

    #[error("tool {tool_name} failed: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("search error: {0}")]
    Search(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("document error: {0}")]
    Document(String),

    #[error("history error: {0}")]
    History(String),

    #[error("no configured provider serves model {model}")]
    NoProviderForModel { model: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type WeftResult<T> = Result<T, WeftError>;
