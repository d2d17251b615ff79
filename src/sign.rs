//! Request signing for both credential schemes.
//!
//! A [`Signer`] is a pure function of the descriptor, the target URL, and the session's
//! current state: it never touches the network and is re-run for every attempt of a chain,
//! because tokens and the server-time offset may change between attempts.

mod mac;
mod oauth1;

// self
use crate::{
	_prelude::*,
	auth::OAuthScheme,
	error::ConfigError,
	http::{self, HeaderList},
	request::{DEFAULT_CONTENT_TYPE, HttpVerb, RequestDescriptor},
	session::Session,
};

/// Header carrying the public API key under the MAC-token scheme.
pub const API_KEY_HEADER: &str = "X-StackMob-API-Key";
/// Header carrying the request signature or MAC token.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Wire-ready request built fresh for every attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedRequest {
	/// Verb sent on the wire.
	pub verb: HttpVerb,
	/// Absolute target URL.
	pub url: Url,
	/// Headers in send order.
	pub headers: HeaderList,
	/// Body, present only for `POST`/`PUT`.
	pub body: Option<String>,
}
impl SignedRequest {
	/// First value of `name` (case-insensitive).
	pub fn header(&self, name: &str) -> Option<&str> {
		http::find_header(&self.headers, name)
	}
}
impl Debug for SignedRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let headers = self
			.headers
			.iter()
			.map(|(name, value)| {
				let value = if name.eq_ignore_ascii_case(AUTHORIZATION_HEADER) {
					"<redacted>"
				} else {
					value.as_str()
				};

				(name.as_str(), value)
			})
			.collect::<Vec<_>>();

		f.debug_struct("SignedRequest")
			.field("verb", &self.verb)
			.field("url", &self.url.as_str())
			.field("headers", &headers)
			.field("body", &self.body)
			.finish()
	}
}

/// Builds [`SignedRequest`]s against a borrowed session.
#[derive(Clone, Copy, Debug)]
pub struct Signer<'a> {
	session: &'a Session,
}
impl<'a> Signer<'a> {
	/// Creates a signer reading credentials from `session`.
	pub fn new(session: &'a Session) -> Self {
		Self { session }
	}

	/// Validates `descriptor`, assembles its URL, and signs it.
	///
	/// The session's `https_override` wins over the descriptor's secure flag.
	pub fn sign_descriptor(
		&self,
		descriptor: &RequestDescriptor,
		default_host: &str,
	) -> Result<SignedRequest, ConfigError> {
		let verb = descriptor.verb()?;

		descriptor.check_headers()?;

		let https = self.session.https_override().unwrap_or(descriptor.is_secure());
		let url = descriptor.url(https, default_host)?;

		Ok(self.sign(descriptor, verb, url, descriptor.payload(verb)))
	}

	/// Signs an attempt of `descriptor` sent as `verb` to `url` with `body`.
	///
	/// Redirect hops call this directly with the new target so caller headers and the
	/// content type of the original descriptor carry over.
	pub fn sign(
		&self,
		descriptor: &RequestDescriptor,
		verb: HttpVerb,
		url: Url,
		body: Option<String>,
	) -> SignedRequest {
		let mut headers = self.base_headers(descriptor, verb);

		match self.session.scheme() {
			OAuthScheme::V1 => {
				let timestamp = self.session.server_now().unix_timestamp();
				let authorization = oauth1::authorization(
					self.session.api_key(),
					self.session.api_secret().expose(),
					verb,
					&url,
					timestamp,
					&oauth1::nonce(),
				);

				set_header(&mut headers, AUTHORIZATION_HEADER, authorization);
			},
			OAuthScheme::V2 => {
				set_header(&mut headers, API_KEY_HEADER, self.session.api_key().to_owned());

				let now = self.session.server_now();

				if let Some(bundle) =
					self.session.tokens().filter(|bundle| bundle.is_access_valid_at(now))
				{
					let timestamp = OffsetDateTime::now_utc().unix_timestamp();
					let authorization =
						mac::authorization(&bundle, verb, &url, timestamp, &mac::nonce());

					set_header(&mut headers, AUTHORIZATION_HEADER, authorization);
				}
			},
		}

		SignedRequest { verb, url, headers, body }
	}

	fn base_headers(&self, descriptor: &RequestDescriptor, verb: HttpVerb) -> HeaderList {
		let mut headers = HeaderList::new();

		if verb.carries_body() {
			let content_type = descriptor.content_type().unwrap_or(DEFAULT_CONTENT_TYPE);

			headers.push(("Content-Type".into(), content_type.into()));
		}

		headers.push((
			"Accept".into(),
			format!("application/vnd.stackmob+json; version={}", self.session.api_version()),
		));
		headers.push(("User-Agent".into(), self.session.user_agent().into()));

		let cookie = self.session.cookie_store().cookie_header();

		if !cookie.is_empty() {
			headers.push(("Cookie".into(), cookie));
		}

		for (name, value) in descriptor.headers() {
			set_header(&mut headers, name, value.clone());
		}

		headers
	}
}

/// Replaces the first header named `name` (case-insensitive) or appends a new one.
fn set_header(headers: &mut HeaderList, name: &str, value: String) {
	match headers.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(name)) {
		Some(slot) => slot.1 = value,
		None => headers.push((name.to_owned(), value)),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{auth::TokenBundle, session::SessionConfig};

	fn session(scheme: OAuthScheme) -> Session {
		Session::new(SessionConfig {
			api_key: "key".into(),
			api_secret: "secret".into(),
			app_name: None,
			user_object_name: "user".into(),
			api_version: 3,
			scheme,
			https_override: None,
			user_agent: Some("agent/1".into()),
		})
		.expect("Session fixture should build.")
	}

	fn names(request: &SignedRequest) -> Vec<&str> {
		request.headers.iter().map(|(name, _)| name.as_str()).collect()
	}

	#[test]
	fn built_in_headers_are_ordered_and_overridable() {
		let session = session(OAuthScheme::V1);

		session.cookie_store().store_cookies(&["sid=1"]);

		let descriptor = RequestDescriptor::post("user")
			.with_body("{\"a\":1}")
			.with_header("accept", "text/plain")
			.with_header("X-Extra", "yes");
		let request = Signer::new(&session)
			.sign_descriptor(&descriptor, "api.example.com")
			.expect("Descriptor should sign.");

		assert_eq!(
			names(&request),
			["Content-Type", "Accept", "User-Agent", "Cookie", "X-Extra", "Authorization"]
		);
		assert_eq!(request.header("Content-Type"), Some("application/json"));
		assert_eq!(request.header("Accept"), Some("text/plain"));
		assert_eq!(request.header("Cookie"), Some("sid=1"));
		assert_eq!(request.body.as_deref(), Some("{\"a\":1}"));
	}

	#[test]
	fn bodiless_verbs_skip_content_type_and_body() {
		let session = session(OAuthScheme::V1);
		let request = Signer::new(&session)
			.sign_descriptor(&RequestDescriptor::delete("user/1").with_body("x"), "api.example.com")
			.expect("Descriptor should sign.");

		assert_eq!(request.header("Content-Type"), None);
		assert_eq!(request.body, None);
		assert_eq!(
			request.header("Accept"),
			Some("application/vnd.stackmob+json; version=3")
		);
		assert!(
			request
				.header("Authorization")
				.is_some_and(|value| value.starts_with("OAuth oauth_consumer_key=\"key\""))
		);
	}

	#[test]
	fn https_override_wins_over_descriptor() {
		let mut config = SessionConfig {
			api_key: "key".into(),
			api_secret: "secret".into(),
			app_name: None,
			user_object_name: "user".into(),
			api_version: 0,
			scheme: OAuthScheme::V2,
			https_override: Some(false),
			user_agent: None,
		};
		let plain = Session::new(config.clone()).expect("Session fixture should build.");
		let request = Signer::new(&plain)
			.sign_descriptor(&RequestDescriptor::get("x").with_secure(true), "h.local")
			.expect("Descriptor should sign.");

		assert_eq!(request.url.scheme(), "http");

		config.https_override = None;

		let secure = Session::new(config).expect("Session fixture should build.");
		let request = Signer::new(&secure)
			.sign_descriptor(&RequestDescriptor::get("x").with_secure(true), "h.local")
			.expect("Descriptor should sign.");

		assert_eq!(request.url.scheme(), "https");
	}

	#[test]
	fn v2_sends_api_key_and_mac_only_with_a_valid_token() {
		let session = session(OAuthScheme::V2);
		let signer = Signer::new(&session);
		let descriptor = RequestDescriptor::get("user");
		let anonymous =
			signer.sign_descriptor(&descriptor, "api.example.com").expect("Descriptor should sign.");

		assert_eq!(anonymous.header(API_KEY_HEADER), Some("key"));
		assert_eq!(anonymous.header(AUTHORIZATION_HEADER), None);

		session.replace_tokens(
			TokenBundle::builder()
				.access_token("tok")
				.mac_key("mackey")
				.expires_in(Duration::hours(1))
				.build()
				.expect("Bundle fixture should build."),
		);

		let signed =
			signer.sign_descriptor(&descriptor, "api.example.com").expect("Descriptor should sign.");

		assert!(
			signed
				.header(AUTHORIZATION_HEADER)
				.is_some_and(|value| value.starts_with("MAC id=\"tok\",ts=\""))
		);
	}

	#[test]
	fn signing_twice_differs_only_in_authorization() {
		for scheme in [OAuthScheme::V1, OAuthScheme::V2] {
			let session = session(scheme).with_tokens(
				TokenBundle::builder()
					.access_token("tok")
					.mac_key("mackey")
					.expires_in(Duration::hours(1))
					.build()
					.expect("Bundle fixture should build."),
			);
			let signer = Signer::new(&session);
			let descriptor = RequestDescriptor::put("user/1").with_body("{}");
			let strip = |mut request: SignedRequest| {
				request.headers.retain(|(name, _)| name != AUTHORIZATION_HEADER);

				request
			};
			let first = signer.sign_descriptor(&descriptor, "h.local").expect("First sign.");
			let second = signer.sign_descriptor(&descriptor, "h.local").expect("Second sign.");

			assert!(first.header(AUTHORIZATION_HEADER).is_some());
			assert_eq!(strip(first), strip(second));
		}
	}

	#[test]
	fn debug_redacts_authorization() {
		let session = session(OAuthScheme::V1);
		let request = Signer::new(&session)
			.sign_descriptor(&RequestDescriptor::get("user"), "h.local")
			.expect("Descriptor should sign.");
		let rendered = format!("{request:?}");

		assert!(rendered.contains("<redacted>"));
		assert!(!rendered.contains("oauth_signature"));
	}
}
