use briscola::WireError;

/// The username is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("user already registered")]
pub struct DuplicateUser;

/// Credentials that cannot enter the registry: empty name or password, or
/// one of them over its length limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("malformed credentials (name or password empty or too long)")]
pub struct InvalidCredentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RemoveError {
    #[error("no user with this username")]
    UnknownUser,
    #[error("wrong password")]
    WrongPassword,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("users file line {0} is not newline-terminated")]
    UnterminatedLine(usize),
    #[error("users file line {0}: {1}")]
    BadCredentials(usize, #[source] InvalidCredentials),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure that aborts a running match.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("transcript: {0}")]
    Transcript(#[source] std::io::Error),
}

/// Failure that aborts a session worker.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Match(#[from] MatchError),
}
