use std::fmt;

/// The only error this crate's `run()` can return -- a rate-limit
/// exhaustion, which is the sole fatal condition in the state machine
/// (distilled spec §7: everything else is folded into state transitions).
#[derive(Debug)]
pub enum Error {
    RateLimitExhausted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::RateLimitExhausted => write!(f, "state machine exhausted its rate limit, giving up"),
        }
    }
}

impl std::error::Error for Error {}
