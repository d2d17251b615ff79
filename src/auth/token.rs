//! Immutable token bundles, their builder, and the refresh endpoint's response shape.

// self
use crate::{
	_prelude::*,
	auth::{MacAlgorithm, Secret, UnknownMacAlgorithm},
};

/// Errors produced by [`TokenBundleBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TokenBundleBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no MAC key was provided.
	#[error("MAC key is required.")]
	MissingMacKey,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when an expiry cannot be represented as a timestamp.
	#[error("Expiry {delta} after {issued_at} is out of range.")]
	ExpiryOutOfRange {
		/// Issued-at instant the lifetime was added to.
		issued_at: OffsetDateTime,
		/// Lifetime that overflowed.
		delta: Duration,
	},
	/// Issued when the MAC algorithm identifier is unknown.
	#[error(transparent)]
	MacAlgorithm(#[from] UnknownMacAlgorithm),
}

/// Access/refresh token pair as held by a session.
///
/// Bundles are never mutated in place; a refresh produces a new bundle that replaces the old
/// one wholesale, so readers always observe a consistent token, MAC key, and expiry.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenBundle {
	/// Access token; used as the MAC `id`.
	pub access_token: Secret,
	/// Key used to compute MAC signatures for the access token.
	pub mac_key: Secret,
	/// Keyed-hash algorithm paired with `mac_key`.
	pub mac_algorithm: MacAlgorithm,
	/// Instant after which the access token is no longer valid.
	pub expires_at: OffsetDateTime,
	/// Refresh token, if the server issued one.
	pub refresh_token: Option<Secret>,
	/// Instant after which the refresh token is no longer valid; `None` means no expiry.
	pub refresh_expires_at: Option<OffsetDateTime>,
}
impl TokenBundle {
	/// Returns a builder for constructing bundles.
	pub fn builder() -> TokenBundleBuilder {
		TokenBundleBuilder::default()
	}

	/// Returns `true` if the access token is still valid at `instant`.
	pub fn is_access_valid_at(&self, instant: OffsetDateTime) -> bool {
		!self.access_token.is_empty() && instant < self.expires_at
	}

	/// Returns `true` if a refresh token exists and is still valid at `instant`.
	pub fn is_refresh_valid_at(&self, instant: OffsetDateTime) -> bool {
		match (&self.refresh_token, self.refresh_expires_at) {
			(Some(token), Some(expiry)) => !token.is_empty() && instant < expiry,
			(Some(token), None) => !token.is_empty(),
			(None, _) => false,
		}
	}
}
impl Debug for TokenBundle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenBundle")
			.field("access_token", &"<redacted>")
			.field("mac_key", &"<redacted>")
			.field("mac_algorithm", &self.mac_algorithm)
			.field("expires_at", &self.expires_at)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_expires_at", &self.refresh_expires_at)
			.finish()
	}
}

/// Builder for [`TokenBundle`].
#[derive(Clone, Debug, Default)]
pub struct TokenBundleBuilder {
	access_token: Option<Secret>,
	mac_key: Option<Secret>,
	mac_algorithm: MacAlgorithm,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	refresh_token: Option<Secret>,
	refresh_expires_in: Option<Duration>,
}
impl TokenBundleBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(Secret::new(token));

		self
	}

	/// Provides the MAC key paired with the access token.
	pub fn mac_key(mut self, key: impl Into<String>) -> Self {
		self.mac_key = Some(Secret::new(key));

		self
	}

	/// Overrides the MAC algorithm (defaults to `hmac-sha-1`).
	pub fn mac_algorithm(mut self, algorithm: MacAlgorithm) -> Self {
		self.mac_algorithm = algorithm;

		self
	}

	/// Sets the issued-at instant used for relative expiries.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Convenience helper that stamps `issued_at` with the current clock.
	pub fn issued_now(self) -> Self {
		self.issued_at(OffsetDateTime::now_utc())
	}

	/// Sets an absolute access-token expiry.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative access-token expiry from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(Secret::new(token));

		self
	}

	/// Limits the refresh token's lifetime relative to the issued instant.
	pub fn refresh_expires_in(mut self, duration: Duration) -> Self {
		self.refresh_expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`TokenBundle`].
	pub fn build(self) -> Result<TokenBundle, TokenBundleBuilderError> {
		let access_token = self.access_token.ok_or(TokenBundleBuilderError::MissingAccessToken)?;
		let mac_key = self.mac_key.ok_or(TokenBundleBuilderError::MissingMacKey)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => offset(issued_at, delta)?,
			(None, None) => return Err(TokenBundleBuilderError::MissingExpiry),
		};
		let refresh_expires_at = match self.refresh_expires_in {
			Some(delta) => Some(offset(issued_at, delta)?),
			None => None,
		};

		Ok(TokenBundle {
			access_token,
			mac_key,
			mac_algorithm: self.mac_algorithm,
			expires_at,
			refresh_token: self.refresh_token,
			refresh_expires_at,
		})
	}
}

fn offset(
	issued_at: OffsetDateTime,
	delta: Duration,
) -> Result<OffsetDateTime, TokenBundleBuilderError> {
	issued_at
		.checked_add(delta)
		.ok_or(TokenBundleBuilderError::ExpiryOutOfRange { issued_at, delta })
}

/// JSON document returned by the refresh-token endpoint.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
	/// New access token.
	pub access_token: String,
	/// MAC key for the new access token.
	pub mac_key: String,
	/// MAC algorithm identifier; defaults to `hmac-sha-1` when omitted.
	#[serde(default)]
	pub mac_algorithm: Option<String>,
	/// Access-token lifetime in seconds.
	pub expires_in: i64,
	/// Rotated refresh token, if the server issued one.
	#[serde(default)]
	pub refresh_token: Option<String>,
}
impl TokenResponse {
	/// Converts the response into a bundle issued at `issued_at`.
	///
	/// When the server does not rotate the refresh token, `previous_refresh` is carried over.
	pub fn into_bundle(
		self,
		issued_at: OffsetDateTime,
		previous_refresh: Option<&Secret>,
	) -> Result<TokenBundle, TokenBundleBuilderError> {
		let algorithm = match self.mac_algorithm.as_deref() {
			Some(raw) => raw.parse::<MacAlgorithm>()?,
			None => MacAlgorithm::default(),
		};
		let mut builder = TokenBundle::builder()
			.access_token(self.access_token)
			.mac_key(self.mac_key)
			.mac_algorithm(algorithm)
			.issued_at(issued_at)
			.expires_in(Duration::seconds(self.expires_in));

		match (self.refresh_token, previous_refresh) {
			(Some(rotated), _) => builder = builder.refresh_token(rotated),
			(None, Some(previous)) => builder = builder.refresh_token(previous.expose()),
			(None, None) => {},
		}

		builder.build()
	}
}
impl Debug for TokenResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenResponse")
			.field("access_token", &"<redacted>")
			.field("mac_algorithm", &self.mac_algorithm)
			.field("expires_in", &self.expires_in)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}
