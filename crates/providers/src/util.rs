use sa_domain::error::Error;

/// Map a `reqwest` transport error onto our shared error taxonomy.
///
/// Timeouts get their own variant so callers (the agent loop) can tell
/// "the provider was unreachable" apart from "the provider replied with
/// an error body", which `ModelTransport` covers via the HTTP status path.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}
