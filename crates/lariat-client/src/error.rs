// Error taxonomy for RPC calls. Every failure a caller can see is one of
// these kinds; hook failures are swallowed and never surface here.
use lariat_bus::BusError;
use lariat_wire::ResponseError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("request payload could not be encoded: {0}")]
    MalformedRequest(#[source] lariat_wire::Error),
    #[error("response payload could not be decoded: {0}")]
    MalformedResponse(#[source] lariat_wire::Error),
    #[error("bus failure: {0}")]
    Internal(#[source] BusError),
    #[error("request timed out")]
    RequestTimedOut,
    #[error("no response from servers")]
    NoResponse,
    #[error("no servers available (received {claims} responses)")]
    Unavailable { claims: u32 },
    #[error("{message}")]
    Server { code: String, message: String },
    #[error("request canceled")]
    Canceled,
}

impl Error {
    /// Stable code string for the error kind; server-reported errors keep
    /// the code the server sent.
    pub fn code(&self) -> &str {
        match self {
            Error::MalformedRequest(_) => "malformed_request",
            Error::MalformedResponse(_) => "malformed_response",
            Error::Internal(_) => "internal",
            Error::RequestTimedOut => "deadline_exceeded",
            Error::NoResponse | Error::Unavailable { .. } => "unavailable",
            Error::Server { code, .. } => code,
            Error::Canceled => "canceled",
        }
    }

    pub(crate) fn from_response(error: ResponseError) -> Self {
        Error::Server {
            code: error.code,
            message: error.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::RequestTimedOut.code(), "deadline_exceeded");
        assert_eq!(Error::NoResponse.code(), "unavailable");
        assert_eq!(Error::Unavailable { claims: 3 }.code(), "unavailable");
        assert_eq!(Error::Canceled.code(), "canceled");
    }

    #[test]
    fn unavailable_message_carries_claim_count() {
        let message = Error::Unavailable { claims: 2 }.to_string();
        assert_eq!(message, "no servers available (received 2 responses)");
    }

    #[test]
    fn server_errors_keep_their_code() {
        let err = Error::from_response(ResponseError {
            code: "quota_exceeded".into(),
            message: "over budget".into(),
        });
        assert_eq!(err.code(), "quota_exceeded");
        assert_eq!(err.to_string(), "over budget");
    }
}
