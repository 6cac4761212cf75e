use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The caller handed over a request that can never succeed.
    InvalidRequest(String),
    /// An error occurred in the LLM provider.
    LlmProvider {
        provider: String,
        details: String,
        retryable: bool,
    },
    /// The RAG backend could not be reached or answered with an error.
    Backend { url: String, details: String },
    /// A response body did not have the expected shape.
    MalformedResponse(String),
    /// An error occurred while rendering a template.
    TemplateRendering(String),
    /// Writing the evaluation report failed.
    Report(String),
    /// A generic system or unknown error.
    System(String),
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::LlmProvider {
                retryable: true,
                ..
            }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidRequest(msg) => write!(f, "Invalid request: {msg}"),
            Error::LlmProvider {
                provider, details, ..
            } => {
                write!(f, "LLM error ({provider}): {details}")
            }
            Error::Backend { url, details } => write!(f, "Backend error ({url}): {details}"),
            Error::MalformedResponse(msg) => write!(f, "Malformed response: {msg}"),
            Error::TemplateRendering(msg) => write!(f, "Template error: {msg}"),
            Error::Report(msg) => write!(f, "Report error: {msg}"),
            Error::System(msg) => write!(f, "System error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
