use std::fmt;
use std::io;

pub use stencil_parser::ParseError;

pub type Result<I, E = Error> = std::result::Result<I, E>;

/// stencil error type
///
/// Parse errors keep their own line/file annotation; the remaining variants
/// cover template loading, inheritance resolution and render-time failures.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The template source could not be parsed.
    Parse(ParseError),

    /// A template file could not be resolved or read.
    Load {
        path: String,
        source: Option<io::Error>,
    },

    /// An `extends` chain visited the same file twice.
    CircularExtends(String),

    /// Invalid engine configuration.
    Options(String),

    /// A filter rejected its input or arguments.
    Filter { name: String, msg: String },

    /// Generic render-time failure.
    Render(String),

    /// Formatting error while writing output.
    Fmt(fmt::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Parse(err) => Some(err),
            Error::Load {
                source: Some(err), ..
            } => Some(err),
            Error::Fmt(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(err) => err.fmt(f),
            Error::Load { path, .. } => write!(f, "unable to load template {path}"),
            Error::CircularExtends(path) => {
                write!(f, "circular extends chain involving {path}")
            }
            Error::Options(msg) => write!(f, "invalid options: {msg}"),
            Error::Filter { name, msg } => {
                write!(f, "error applying filter \"{name}\": {msg}")
            }
            Error::Render(msg) => write!(f, "render error: {msg}"),
            Error::Fmt(err) => err.fmt(f),
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Parse(err)
    }
}

impl From<fmt::Error> for Error {
    fn from(err: fmt::Error) -> Self {
        Error::Fmt(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }

    #[test]
    fn test_display() {
        let err = Error::Filter {
            name: "replace".into(),
            msg: "bad pattern".into(),
        };
        assert_eq!(
            err.to_string(),
            "error applying filter \"replace\": bad pattern"
        );
    }
}
