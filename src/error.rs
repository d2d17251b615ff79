//! Engine-level error types shared by signing, transport, and refresh paths.

// self
use crate::{_prelude::*, auth::TokenBundleBuilderError};

/// Engine-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical engine error exposed by public APIs.
///
/// Only [`Error::Config`] ever reaches `Callback::unsent`; transport failures are folded into
/// a synthetic `-1` result before delivery.
#[derive(Debug, ThisError)]
pub enum Error {
	/// The request could not be constructed.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// The exchange failed before an HTTP response was produced.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The refresh-token round trip failed.
	#[error(transparent)]
	Refresh(#[from] RefreshError),
}

/// Construction-time failures; never retried.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// The descriptor names a verb the engine does not send.
	#[error("The HTTP verb {verb} is not supported.")]
	UnsupportedVerb {
		/// Verb as supplied by the caller.
		verb: String,
	},
	/// The request URL could not be assembled.
	#[error("Request URL `{url}` is invalid.")]
	InvalidUrl {
		/// URL text that failed to parse.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A caller-supplied header cannot be sent on the wire.
	#[error("Header `{name}` has an invalid name or value.")]
	InvalidHeader {
		/// Header name as supplied by the caller.
		name: String,
	},
	/// Session credentials are missing a mandatory value.
	#[error("Session is missing the {field}.")]
	MissingCredential {
		/// Name of the missing credential field.
		field: &'static str,
	},
	/// Session settings could not be deserialized.
	#[error("Session settings are malformed.")]
	InvalidSettings {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// No tokio runtime was supplied or ambient when building the dispatcher.
	#[error("No tokio runtime is available to run dispatch chains.")]
	MissingRuntime,
	/// No transport was supplied and the default transport feature is disabled.
	#[error("No HTTP transport is configured.")]
	MissingTransport,
	/// Token bundle builder validation failed.
	#[error("Unable to build token bundle.")]
	TokenBuild(#[from] TokenBundleBuilderError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures raised while a request is in flight; delivered as a `-1` result.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while executing the request: {source}")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while executing the request: {0}")]
	Io(#[from] std::io::Error),
	/// A redirect status arrived without a `Location` header.
	#[error("Redirect response with status {status} has no Location header.")]
	MissingLocation {
		/// Redirect status code.
		status: u16,
	},
	/// The `Location` header could not be resolved into a URL.
	#[error("Redirect target `{location}` is invalid.")]
	InvalidLocation {
		/// Raw `Location` header value.
		location: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The transport panicked while executing the request.
	#[error("Transport panicked while executing the request.")]
	Panicked,
	/// The chain ended without a terminal delivery (the worker task was torn down).
	#[error("Dispatch chain ended without delivering a result.")]
	Interrupted,
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Failures of the refresh-token round trip.
#[derive(Debug, ThisError)]
pub enum RefreshError {
	/// The session holds no refresh token.
	#[error("Session has no usable refresh token.")]
	MissingRefreshToken,
	/// The refresh endpoint answered with a non-success status.
	#[error("Refresh endpoint answered with status {status}.")]
	Rejected {
		/// Status code of the refresh response (`-1` for transport failures).
		status: i32,
		/// Response body, lossily decoded.
		body: String,
	},
	/// The refresh endpoint responded with JSON that does not describe a token.
	#[error("Refresh endpoint returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The refresh response parsed but could not be turned into a token bundle.
	#[error("Refresh endpoint returned an unusable token.")]
	InvalidToken(#[from] TokenBundleBuilderError),
	/// The refresh round trip panicked before installing a bundle.
	#[error("Refresh round trip panicked.")]
	Panicked,
	/// The refresh request never left the client.
	#[error("Refresh request could not be sent.")]
	Unsent {
		/// Construction failure reported by the inner chain.
		#[source]
		source: Box<Error>,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn config_error_converts_into_engine_error_with_source() {
		let parse_err = Url::parse("http://[::1").expect_err("Fixture URL must be invalid.");
		let config = ConfigError::InvalidUrl { url: "http://[::1".into(), source: parse_err };
		let err: Error = config.into();

		assert!(matches!(err, Error::Config(ConfigError::InvalidUrl { .. })));
		assert!(err.to_string().contains("http://[::1"));
		assert!(StdError::source(&err).is_some());
	}

	#[test]
	fn transport_messages_carry_the_cause() {
		let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset");
		let err: Error = TransportError::Io(io).into();

		assert!(err.to_string().contains("peer reset"));
	}

	#[test]
	fn refresh_rejection_reports_status() {
		let err: Error = RefreshError::Rejected { status: 400, body: "{}".into() }.into();

		assert_eq!(err.to_string(), "Refresh endpoint answered with status 400.");
	}
}
