//! Shared credential session: API key/secret, token bundle, server clock offset, and cookies.
//!
//! A [`Session`] is shared by every chain a dispatcher runs. Its only mutable state is the
//! token bundle (swapped wholesale behind a lock, so readers see either the old or the new
//! bundle) and the server-time offset (a single atomic).

// std
use std::sync::atomic::{AtomicI64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{OAuthScheme, Secret, TokenBundle},
	cookie::{CookieStore, MemoryCookieStore},
	error::ConfigError,
	http,
};

const DEFAULT_USER_OBJECT: &str = "user";

/// Deserializable session settings.
#[derive(Clone, Deserialize)]
pub struct SessionConfig {
	/// Public API key.
	pub api_key: String,
	/// API secret used by V1 signing.
	pub api_secret: String,
	/// Application name embedded in the user agent.
	#[serde(default)]
	pub app_name: Option<String>,
	/// Schema holding user objects; the refresh endpoint lives under it.
	#[serde(default = "default_user_object")]
	pub user_object_name: String,
	/// API version embedded in the `Accept` header.
	pub api_version: u32,
	/// Signing scheme.
	#[serde(default)]
	pub scheme: OAuthScheme,
	/// Forces `https` (`Some(true)`) or `http` (`Some(false)`) regardless of the request.
	#[serde(default)]
	pub https_override: Option<bool>,
	/// Overrides the generated `User-Agent`.
	#[serde(default)]
	pub user_agent: Option<String>,
}
impl Debug for SessionConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionConfig")
			.field("api_key", &self.api_key)
			.field("api_secret", &"<redacted>")
			.field("app_name", &self.app_name)
			.field("user_object_name", &self.user_object_name)
			.field("api_version", &self.api_version)
			.field("scheme", &self.scheme)
			.field("https_override", &self.https_override)
			.finish()
	}
}

fn default_user_object() -> String {
	DEFAULT_USER_OBJECT.into()
}

/// Credentials, tokens, and clock state shared across concurrent chains.
pub struct Session {
	api_key: String,
	api_secret: Secret,
	app_name: Option<String>,
	user_object_name: String,
	api_version: u32,
	scheme: OAuthScheme,
	https_override: Option<bool>,
	user_agent: String,
	tokens: RwLock<Option<Arc<TokenBundle>>>,
	server_time_diff: AtomicI64,
	cookie_store: Arc<dyn CookieStore>,
}
impl Session {
	/// Creates a session from validated settings with an in-memory cookie jar.
	pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
		if config.api_key.trim().is_empty() {
			return Err(ConfigError::MissingCredential { field: "api key" });
		}
		if config.api_secret.trim().is_empty() {
			return Err(ConfigError::MissingCredential { field: "api secret" });
		}

		let user_agent = config
			.user_agent
			.unwrap_or_else(|| default_user_agent(config.app_name.as_deref()));

		Ok(Self {
			api_key: config.api_key,
			api_secret: Secret::new(config.api_secret),
			app_name: config.app_name,
			user_object_name: config.user_object_name,
			api_version: config.api_version,
			scheme: config.scheme,
			https_override: config.https_override,
			user_agent,
			tokens: RwLock::new(None),
			server_time_diff: AtomicI64::new(0),
			cookie_store: Arc::new(MemoryCookieStore::default()),
		})
	}

	/// Parses a JSON settings document and builds the session.
	pub fn from_json(raw: &str) -> Result<Self> {
		let mut de = serde_json::Deserializer::from_str(raw);
		let config: SessionConfig = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ConfigError::InvalidSettings { source })?;

		Ok(Self::new(config)?)
	}

	/// Replaces the cookie jar.
	pub fn with_cookie_store(mut self, store: Arc<dyn CookieStore>) -> Self {
		self.cookie_store = store;

		self
	}

	/// Seeds the session with an existing token bundle.
	pub fn with_tokens(self, bundle: TokenBundle) -> Self {
		*self.tokens.write() = Some(Arc::new(bundle));

		self
	}

	/// Public API key.
	pub fn api_key(&self) -> &str {
		&self.api_key
	}

	/// API secret used by V1 signing.
	pub fn api_secret(&self) -> &Secret {
		&self.api_secret
	}

	/// Application name, if configured.
	pub fn app_name(&self) -> Option<&str> {
		self.app_name.as_deref()
	}

	/// Schema holding user objects.
	pub fn user_object_name(&self) -> &str {
		&self.user_object_name
	}

	/// API version sent in the `Accept` header.
	pub fn api_version(&self) -> u32 {
		self.api_version
	}

	/// Signing scheme of the session.
	pub fn scheme(&self) -> OAuthScheme {
		self.scheme
	}

	/// Returns `true` for the MAC-token (V2) scheme.
	pub fn is_oauth2(&self) -> bool {
		matches!(self.scheme, OAuthScheme::V2)
	}

	/// Scheme override applied to every request URL.
	pub fn https_override(&self) -> Option<bool> {
		self.https_override
	}

	/// `User-Agent` header value.
	pub fn user_agent(&self) -> &str {
		&self.user_agent
	}

	/// Cookie jar shared by every chain.
	pub fn cookie_store(&self) -> &Arc<dyn CookieStore> {
		&self.cookie_store
	}

	/// Snapshot of the current token bundle.
	pub fn tokens(&self) -> Option<Arc<TokenBundle>> {
		self.tokens.read().clone()
	}

	/// Atomically replaces the token bundle, returning the installed snapshot.
	pub fn replace_tokens(&self, bundle: TokenBundle) -> Arc<TokenBundle> {
		let bundle = Arc::new(bundle);

		*self.tokens.write() = Some(Arc::clone(&bundle));

		bundle
	}

	/// Drops the token bundle (e.g. on logout).
	pub fn clear_tokens(&self) {
		*self.tokens.write() = None;
	}

	/// Estimated difference between the server clock and the local clock.
	pub fn server_time_diff(&self) -> Duration {
		Duration::seconds(self.server_time_diff.load(Ordering::Acquire))
	}

	/// Local clock shifted by the recorded server-time offset.
	pub fn server_now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc() + self.server_time_diff()
	}

	/// Returns `true` if the access token is valid against the server-adjusted clock.
	pub fn is_token_valid(&self) -> bool {
		self.is_token_valid_at(self.server_now())
	}

	/// Returns `true` if the access token is valid at `instant` (already server-adjusted).
	pub fn is_token_valid_at(&self, instant: OffsetDateTime) -> bool {
		self.tokens().is_some_and(|bundle| bundle.is_access_valid_at(instant))
	}

	/// Returns `true` if a refresh token is present and unexpired.
	pub fn is_refresh_token_valid(&self) -> bool {
		let now = self.server_now();

		self.tokens().is_some_and(|bundle| bundle.is_refresh_valid_at(now))
	}

	/// Records the server clock offset from a response `Date` header.
	///
	/// Returns the new offset, or `None` (leaving the offset untouched) when the header
	/// cannot be parsed.
	pub fn record_server_time_diff(&self, date_header: &str) -> Option<Duration> {
		let server_time = http::parse_http_date(date_header)?;

		Some(self.calculate_server_time_diff(server_time))
	}

	/// Sets the offset so that local time plus the offset equals `server_time`.
	pub fn calculate_server_time_diff(&self, server_time: OffsetDateTime) -> Duration {
		let diff = server_time.unix_timestamp() - OffsetDateTime::now_utc().unix_timestamp();

		self.server_time_diff.store(diff, Ordering::Release);

		Duration::seconds(diff)
	}
}
impl Debug for Session {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("api_key", &self.api_key)
			.field("scheme", &self.scheme)
			.field("api_version", &self.api_version)
			.field("tokens", &self.tokens())
			.field("server_time_diff", &self.server_time_diff())
			.finish()
	}
}

fn default_user_agent(app_name: Option<&str>) -> String {
	let base = concat!("mob-dispatch/", env!("CARGO_PKG_VERSION"));

	match app_name {
		Some(app) => format!("{base} ({app})"),
		None => base.to_owned(),
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::thread;
	// self
	use super::*;

	fn config(scheme: OAuthScheme) -> SessionConfig {
		SessionConfig {
			api_key: "key".into(),
			api_secret: "secret".into(),
			app_name: Some("demo".into()),
			user_object_name: "user".into(),
			api_version: 2,
			scheme,
			https_override: None,
			user_agent: None,
		}
	}

	fn bundle(tag: usize, expires_in: Duration) -> TokenBundle {
		TokenBundle::builder()
			.access_token(format!("access-{tag}"))
			.mac_key(format!("key-{tag}"))
			.refresh_token(format!("refresh-{tag}"))
			.issued_now()
			.expires_in(expires_in)
			.build()
			.expect("Bundle fixture should build.")
	}

	#[test]
	fn rejects_blank_credentials() {
		let mut blank = config(OAuthScheme::V1);

		blank.api_secret = " ".into();

		assert!(matches!(
			Session::new(blank),
			Err(ConfigError::MissingCredential { field: "api secret" })
		));
	}

	#[test]
	fn settings_parse_from_json_with_defaults() {
		let session = Session::from_json(
			r#"{"api_key":"k","api_secret":"s","api_version":1,"scheme":"v2"}"#,
		)
		.expect("Settings fixture should parse.");

		assert!(session.is_oauth2());
		assert_eq!(session.user_object_name(), "user");
		assert!(session.user_agent().starts_with("mob-dispatch/"));
		assert!(Session::from_json(r#"{"api_key":"k"}"#).is_err());
	}

	#[test]
	fn token_validity_respects_server_offset() {
		let session =
			Session::new(config(OAuthScheme::V2)).expect("Session fixture should build.");

		assert!(!session.is_token_valid());
		assert!(!session.is_refresh_token_valid());

		session.replace_tokens(bundle(1, Duration::minutes(10)));

		assert!(session.is_token_valid());
		assert!(session.is_refresh_token_valid());

		// Server clock is 20 minutes ahead, so the 10-minute token is already stale there.
		session.calculate_server_time_diff(OffsetDateTime::now_utc() + Duration::minutes(20));

		assert!(!session.is_token_valid());
		assert!(session.is_refresh_token_valid());
	}

	#[test]
	fn date_header_updates_offset() {
		let session =
			Session::new(config(OAuthScheme::V1)).expect("Session fixture should build.");

		assert_eq!(session.record_server_time_diff("not a date"), None);
		assert_eq!(session.server_time_diff(), Duration::ZERO);

		let diff = session
			.record_server_time_diff("Thu, 01 Jan 2015 00:00:00 GMT")
			.expect("HTTP date should parse.");

		assert!(diff.is_negative());
		assert_eq!(session.server_time_diff(), diff);
	}

	#[test]
	fn concurrent_readers_never_observe_torn_bundles() {
		let session = Arc::new(
			Session::new(config(OAuthScheme::V2))
				.expect("Session fixture should build.")
				.with_tokens(bundle(0, Duration::hours(1))),
		);
		let writer = {
			let session = Arc::clone(&session);

			thread::spawn(move || {
				for tag in 1..=2_000 {
					session.replace_tokens(bundle(tag, Duration::hours(1)));
				}
			})
		};
		let readers = (0..4)
			.map(|_| {
				let session = Arc::clone(&session);

				thread::spawn(move || {
					for _ in 0..2_000 {
						let snapshot = session.tokens().expect("Tokens are always present.");
						let access = snapshot.access_token.expose().trim_start_matches("access-");
						let key = snapshot.mac_key.expose().trim_start_matches("key-");

						assert_eq!(access, key, "Access token and MAC key must match.");
					}
				})
			})
			.collect::<Vec<_>>();

		writer.join().expect("Writer thread should finish.");

		for reader in readers {
			reader.join().expect("Reader thread should finish.");
		}
	}
}
