//! Classification of raw transport failures into [`ErrorKind`]s.
//!
//! The host transport reports failures as nested error chains
//! (`reqwest::Error` → connector error → `std::io::Error`). The mapper walks
//! the whole `source()` chain and picks exactly one kind, falling back to
//! [`ErrorKind::Unknown`] rather than dropping anything.

use crate::error::BoxError;
use crate::{Error, ErrorKind, Method};
use std::error::Error as StdError;
use std::io;

/// Upper bound for messages copied out of transport errors.
pub(crate) const MAX_ERROR_MESSAGE_LEN: usize = 1024;

const DNS_MARKERS: &[&str] = &[
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "nodename nor servname",
    "no such host",
    "temporary failure in name resolution",
    "network is unreachable",
    "host is unreachable",
    "no route to host",
];

const TLS_MARKERS: &[&str] = &[
    "certificate",
    "handshake",
    "tls",
    "ssl",
];

/// Truncates a message, adding "... (truncated)" if needed.
pub(crate) fn truncate_message(mut msg: String) -> String {
    if msg.len() > MAX_ERROR_MESSAGE_LEN {
        let mut cut = MAX_ERROR_MESSAGE_LEN;
        while !msg.is_char_boundary(cut) {
            cut -= 1;
        }
        msg.truncate(cut);
        msg.push_str("... (truncated)");
    }
    msg
}

/// Drops `for url (...)` segments so hosts and paths never look like markers.
fn strip_url(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(start) = rest.find("for url (") {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find(')') {
            Some(end) => rest = &tail[end + 1..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn chain<'a>(
    error: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(error), |&e| e.source())
}

/// Classifies a failure into exactly one [`ErrorKind`].
///
/// # Examples
///
/// ```
/// use callwire::{mapper, ErrorKind};
/// use std::io;
///
/// let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
/// assert_eq!(mapper::classify(&refused), ErrorKind::ConnectionRefused);
/// ```
pub fn classify(error: &(dyn StdError + 'static)) -> ErrorKind {
    // Already classified somewhere deeper in the pipeline.
    if let Some(known) = chain(error).find_map(|e| e.downcast_ref::<Error>()) {
        return known.kind();
    }

    let transport = chain(error).find_map(|e| e.downcast_ref::<reqwest::Error>());
    if let Some(e) = transport {
        if e.is_timeout() {
            return if e.is_connect() {
                ErrorKind::ConnectionTimeout
            } else {
                ErrorKind::ReadTimeout
            };
        }
    }

    for io_error in chain(error).filter_map(|e| e.downcast_ref::<io::Error>()) {
        match io_error.kind() {
            io::ErrorKind::ConnectionRefused => return ErrorKind::ConnectionRefused,
            io::ErrorKind::TimedOut => return ErrorKind::ConnectionTimeout,
            io::ErrorKind::Interrupted => return ErrorKind::Interrupted,
            io::ErrorKind::AddrNotAvailable | io::ErrorKind::NotConnected => {
                return ErrorKind::NetworkUnavailable
            }
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                return ErrorKind::Io
            }
            _ => {}
        }
    }

    // reqwest's own message only restates the URL.
    let text = chain(error)
        .filter(|e| !e.is::<reqwest::Error>())
        .map(|e| strip_url(&e.to_string()).to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(": ");
    if DNS_MARKERS.iter().any(|m| text.contains(m)) {
        return ErrorKind::NetworkUnavailable;
    }
    let during_connect = transport.map_or(true, |e| e.is_connect());
    if during_connect && TLS_MARKERS.iter().any(|m| text.contains(m)) {
        return ErrorKind::SslHandshakeFailed;
    }

    if let Some(e) = transport {
        if e.is_builder() {
            return ErrorKind::RequestBuild;
        }
        if e.is_redirect() {
            return ErrorKind::HttpProtocol;
        }
        if e.is_decode() || e.is_body() {
            return ErrorKind::ResponseParsing;
        }
        if e.is_connect() {
            return ErrorKind::NetworkUnavailable;
        }
        if e.is_request() {
            return ErrorKind::Io;
        }
    }

    for e in chain(error) {
        if e.is::<io::Error>() {
            return ErrorKind::Io;
        }
        if e.is::<url::ParseError>() || e.is::<http::Error>() {
            return ErrorKind::RequestBuild;
        }
        if e.is::<serde_json::Error>() {
            return ErrorKind::ResponseParsing;
        }
    }

    ErrorKind::Unknown
}

/// Converts a raw failure into an [`Error`] carrying the classified kind, the
/// original cause and the method/URL of the request that produced it.
///
/// An error that is already an [`Error`] is returned as is, with the request
/// location filled in if it was missing.
pub fn map_error(cause: impl Into<BoxError>, method: Method, url: &str) -> Error {
    let cause: BoxError = cause.into();
    let cause = match cause.downcast::<Error>() {
        Ok(known) => {
            return if known.url().is_some() {
                *known
            } else {
                (*known).with_request(method, url)
            }
        }
        Err(other) => other,
    };

    let kind = classify(cause.as_ref());
    let message = chain(cause.as_ref())
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(": ");

    tracing::debug!(
        kind = %kind,
        method = %method,
        url = %url,
        error = %message,
        "Mapped transport failure"
    );

    Error::new(kind, truncate_message(message))
        .with_request(method, url)
        .with_source(cause)
}
