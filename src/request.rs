//! Immutable request descriptors, HTTP verbs, and URL assembly.

// crates.io
use url::form_urlencoded;
// self
use crate::{_prelude::*, error::ConfigError};

/// Host used when a descriptor does not name one.
pub const DEFAULT_API_HOST: &str = "api.mob1.stackmob.com";
/// Content type sent for bodied verbs unless the descriptor overrides it.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Verbs the engine knows how to sign and send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `DELETE`
	Delete,
}
impl HttpVerb {
	/// Wire representation of the verb.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Delete => "DELETE",
		}
	}

	/// Returns `true` for verbs that send a request body (`POST`, `PUT`).
	pub const fn carries_body(self) -> bool {
		matches!(self, Self::Post | Self::Put)
	}
}
impl FromStr for HttpVerb {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_uppercase().as_str() {
			"GET" => Ok(Self::Get),
			"POST" => Ok(Self::Post),
			"PUT" => Ok(Self::Put),
			"DELETE" => Ok(Self::Delete),
			_ => Err(ConfigError::UnsupportedVerb { verb: s.to_owned() }),
		}
	}
}
impl Display for HttpVerb {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Caller-side description of one logical request.
///
/// The verb is kept as text so that unsupported verbs surface through `Callback::unsent`
/// instead of at construction time. Redirected and retried attempts are derived from the
/// descriptor; it is never mutated by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestDescriptor {
	method: String,
	path: String,
	params: Vec<(String, String)>,
	headers: Vec<(String, String)>,
	body: Option<String>,
	secure: bool,
	host: Option<String>,
	content_type: Option<String>,
}
impl RequestDescriptor {
	/// Creates a descriptor for an arbitrary verb and path.
	pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
		Self {
			method: method.into(),
			path: path.into(),
			params: Vec::new(),
			headers: Vec::new(),
			body: None,
			secure: false,
			host: None,
			content_type: None,
		}
	}

	/// `GET` descriptor.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(HttpVerb::Get.as_str(), path)
	}

	/// `POST` descriptor.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(HttpVerb::Post.as_str(), path)
	}

	/// `PUT` descriptor.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(HttpVerb::Put.as_str(), path)
	}

	/// `DELETE` descriptor.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(HttpVerb::Delete.as_str(), path)
	}

	/// Appends a query parameter; order is preserved.
	pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.params.push((key.into(), value.into()));

		self
	}

	/// Appends a caller header; it overrides a built-in header with the same name.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Sets the request body (sent for `POST`/`PUT` only).
	pub fn with_body(mut self, body: impl Into<String>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Requests `https` unless the session overrides the scheme.
	pub fn with_secure(mut self, secure: bool) -> Self {
		self.secure = secure;

		self
	}

	/// Targets a host other than the dispatcher's default.
	pub fn with_host(mut self, host: impl Into<String>) -> Self {
		self.host = Some(host.into());

		self
	}

	/// Overrides the `Content-Type` of bodied requests.
	pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
		self.content_type = Some(content_type.into());

		self
	}

	/// Verb text as supplied by the caller.
	pub fn method(&self) -> &str {
		&self.method
	}

	/// Request path relative to the host.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Ordered query parameters.
	pub fn params(&self) -> &[(String, String)] {
		&self.params
	}

	/// Ordered caller headers.
	pub fn headers(&self) -> &[(String, String)] {
		&self.headers
	}

	/// Request body, if any.
	pub fn body(&self) -> Option<&str> {
		self.body.as_deref()
	}

	/// Whether the descriptor asks for `https`.
	pub fn is_secure(&self) -> bool {
		self.secure
	}

	/// Explicit host, if any.
	pub fn host(&self) -> Option<&str> {
		self.host.as_deref()
	}

	/// `Content-Type` override, if any.
	pub fn content_type(&self) -> Option<&str> {
		self.content_type.as_deref()
	}

	/// Parses the verb, rejecting anything outside `GET`/`POST`/`PUT`/`DELETE`.
	pub fn verb(&self) -> Result<HttpVerb, ConfigError> {
		self.method.parse()
	}

	/// Assembles the absolute URL: the last path segment is escaped and the query string is
	/// only built for `GET`/`DELETE`.
	pub fn url(&self, https: bool, default_host: &str) -> Result<Url, ConfigError> {
		let verb = self.verb()?;
		let scheme = if https { "https" } else { "http" };
		let host = self.host.as_deref().unwrap_or(default_host);
		let mut raw = format!("{scheme}://{host}{}", escape_path(&self.path));

		if !verb.carries_body() && !self.params.is_empty() {
			raw.push('?');
			raw.push_str(&format_query(&self.params));
		}

		Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { url: raw, source })
	}

	/// Body actually sent for `verb`.
	pub fn payload(&self, verb: HttpVerb) -> Option<String> {
		if verb.carries_body() { self.body.clone() } else { None }
	}

	pub(crate) fn check_headers(&self) -> Result<(), ConfigError> {
		let valid_name = |name: &str| {
			!name.is_empty()
				&& name.bytes().all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b))
		};
		let valid_value =
			|value: &str| !value.bytes().any(|b| (b < 0x20 && b != b'\t') || b == 0x7f);

		match self.headers.iter().find(|(name, value)| !valid_name(name) || !valid_value(value)) {
			Some((name, _)) => Err(ConfigError::InvalidHeader { name: name.clone() }),
			None => Ok(()),
		}
	}
}

/// Percent-encodes `raw` for a query component (`%20` for spaces).
pub(crate) fn percent_encode(raw: &str) -> String {
	form_urlencoded::byte_serialize(raw.as_bytes()).collect::<String>().replace('+', "%20")
}

/// RFC 3986 encoding used by OAuth 1.0: only unreserved characters stay literal.
pub(crate) fn oauth_encode(raw: &str) -> String {
	percent_encode(raw).replace('*', "%2A").replace("%7E", "~")
}

pub(crate) fn format_query(params: &[(String, String)]) -> String {
	params
		.iter()
		.map(|(key, value)| format!("{}={}", percent_encode(key), percent_encode(value)))
		.collect::<Vec<_>>()
		.join("&")
}

/// Normalizes the leading slash and escapes the last path segment.
pub(crate) fn escape_path(path: &str) -> String {
	let trimmed = path.trim_start_matches('/');

	match trimmed.rsplit_once('/') {
		Some((parent, last)) => format!("/{parent}/{}", percent_encode(last)),
		None => format!("/{}", percent_encode(trimmed)),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn verbs_parse_case_insensitively_and_reject_others() {
		assert_eq!("delete".parse::<HttpVerb>().expect("DELETE should parse."), HttpVerb::Delete);
		assert!(HttpVerb::Put.carries_body());
		assert!(!HttpVerb::Get.carries_body());
		assert!(matches!(
			"PATCH".parse::<HttpVerb>(),
			Err(ConfigError::UnsupportedVerb { verb }) if verb == "PATCH"
		));
	}

	#[test]
	fn query_is_built_for_get_only() {
		let get = RequestDescriptor::get("user")
			.with_param("name", "john doe")
			.with_param("tag", "a&b");
		let url = get.url(false, DEFAULT_API_HOST).expect("GET URL should build.");

		assert_eq!(url.as_str(), "http://api.mob1.stackmob.com/user?name=john%20doe&tag=a%26b");

		let post = RequestDescriptor::post("/user").with_param("ignored", "1").with_host("h.local");
		let url = post.url(true, DEFAULT_API_HOST).expect("POST URL should build.");

		assert_eq!(url.as_str(), "https://h.local/user");
	}

	#[test]
	fn last_segment_is_escaped() {
		assert_eq!(escape_path("user/john doe"), "/user/john%20doe");
		assert_eq!(escape_path("/a/b/c?d"), "/a/b/c%3Fd");
		assert_eq!(escape_path(""), "/");
	}

	#[test]
	fn oauth_encoding_keeps_unreserved_characters() {
		assert_eq!(oauth_encode("a b*c~d-e._+"), "a%20b%2Ac~d-e._%2B");
	}

	#[test]
	fn payload_and_header_checks() {
		let descriptor = RequestDescriptor::put("thing").with_body("{}");

		assert_eq!(descriptor.payload(HttpVerb::Put).as_deref(), Some("{}"));
		assert_eq!(descriptor.payload(HttpVerb::Get), None);
		assert!(descriptor.clone().with_header("X-Ok", "fine").check_headers().is_ok());
		assert!(matches!(
			descriptor.clone().with_header("Bad Name", "v").check_headers(),
			Err(ConfigError::InvalidHeader { .. })
		));
	}

	#[test]
	fn control_bytes_in_values_are_rejected() {
		let descriptor = RequestDescriptor::get("thing");

		assert!(descriptor.clone().with_header("X-Tabbed", "a\tb").check_headers().is_ok());

		for value in ["a\u{1}b", "a\u{1f}b", "a\u{7f}b", "a\rb", "a\0b"] {
			assert!(
				matches!(
					descriptor.clone().with_header("X-Value", value).check_headers(),
					Err(ConfigError::InvalidHeader { name }) if name == "X-Value"
				),
				"{value:?} should be rejected."
			);
		}
	}

	#[test]
	fn unsupported_verb_fails_url_assembly() {
		let err = RequestDescriptor::new("PATCH", "user")
			.url(false, DEFAULT_API_HOST)
			.expect_err("PATCH should be rejected.");

		assert!(matches!(err, ConfigError::UnsupportedVerb { .. }));
	}
}
