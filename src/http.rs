//! Transport seam, raw responses, and the response-header helpers the dispatcher relies on.
//!
//! [`HttpTransport`] is the engine's only dependency on an HTTP stack. Transports execute
//! exactly one exchange per call and must never follow redirects themselves; redirect
//! handling belongs to the dispatcher so that every hop is re-signed and observed.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
#[cfg(feature = "reqwest")] use reqwest::{Method, redirect::Policy};
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::TransportError, sign::SignedRequest};
#[cfg(feature = "reqwest")] use crate::{error::ConfigError, request::HttpVerb};

/// `401 Unauthorized`.
pub const UNAUTHORIZED: u16 = 401;
/// `503 Service Unavailable`.
pub const SERVICE_UNAVAILABLE: u16 = 503;

/// Ordered header list; names keep the case they were sent or received with.
pub type HeaderList = Vec<(String, String)>;

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<RawResponse, TransportError>> + 'a + Send>>;

/// Executes one signed exchange.
///
/// Implementations must be `Send + Sync + 'static` so a dispatcher can share them across
/// concurrent chains, and must surface every HTTP status (including 3xx) as a
/// [`RawResponse`] rather than an error.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and returns the raw response.
	fn execute<'a>(&'a self, request: &'a SignedRequest) -> TransportFuture<'a>;
}

/// Status, headers, and body of one HTTP exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawResponse {
	/// Status code.
	pub status: u16,
	/// Response headers in wire order.
	pub headers: HeaderList,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl RawResponse {
	/// First value of `name` (case-insensitive).
	pub fn header(&self, name: &str) -> Option<&str> {
		find_header(&self.headers, name)
	}

	/// Every value of `name` (case-insensitive), in wire order.
	pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
		header_values(&self.headers, name)
	}

	/// Body decoded lossily as UTF-8.
	pub fn body_text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

/// Reqwest-backed transport with redirect following disabled.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a client that never follows redirects.
	pub fn new() -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().redirect(Policy::none()).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing client; it must be configured with [`Policy::none`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn execute<'a>(&'a self, request: &'a SignedRequest) -> TransportFuture<'a> {
		Box::pin(async move {
			let method = match request.verb {
				HttpVerb::Get => Method::GET,
				HttpVerb::Post => Method::POST,
				HttpVerb::Put => Method::PUT,
				HttpVerb::Delete => Method::DELETE,
			};
			let mut builder = self.0.request(method, request.url.clone());

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(body) = &request.body {
				builder = builder.body(body.clone());
			}

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.map(|(name, value)| {
					(name.as_str().to_owned(), String::from_utf8_lossy(value.as_bytes()).into_owned())
				})
				.collect();
			// A body that cannot be read is reported as an empty JSON object.
			let body = match response.bytes().await {
				Ok(bytes) => bytes.to_vec(),
				Err(_) => b"{}".to_vec(),
			};

			Ok(RawResponse { status, headers, body })
		})
	}
}

/// `301`, `302`, `303`, `307`, and `308`.
pub fn is_redirect(status: u16) -> bool {
	matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Any `2xx`.
pub fn is_success(status: u16) -> bool {
	(200..300).contains(&status)
}

/// First value of `name` in `headers` (case-insensitive).
pub fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
	headers.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_str())
}

/// Every value of `name` in `headers` (case-insensitive), in order.
pub fn header_values<'a, 'b>(
	headers: &'a [(String, String)],
	name: &'b str,
) -> impl Iterator<Item = &'a str> + use<'a, 'b> {
	headers
		.iter()
		.filter(move |(key, _)| key.eq_ignore_ascii_case(name))
		.map(|(_, value)| value.as_str())
}

/// Resolves the retry delay advertised by `Retry-After` headers.
///
/// Accepts delta-seconds or an HTTP date in the future; the last positive value wins.
pub fn parse_retry_after<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<Duration> {
	values.into_iter().filter_map(retry_after_value).last()
}

fn retry_after_value(raw: &str) -> Option<Duration> {
	let raw = raw.trim();

	if let Ok(secs) = raw.parse::<i64>() {
		return (secs > 0).then_some(Duration::seconds(secs));
	}

	let delta = parse_http_date(raw)? - OffsetDateTime::now_utc();

	delta.is_positive().then_some(delta)
}

/// Parses an RFC 2822 / RFC 7231 `Date` value.
pub fn parse_http_date(raw: &str) -> Option<OffsetDateTime> {
	let raw = raw.trim();

	OffsetDateTime::parse(raw, &Rfc2822).ok().or_else(|| {
		let numeric = raw.strip_suffix(" GMT").or_else(|| raw.strip_suffix(" UTC"))?;

		OffsetDateTime::parse(&format!("{numeric} +0000"), &Rfc2822).ok()
	})
}

/// Total object count advertised by a `Content-Range: <start>-<end>/<total|*>` header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentRangeTotal {
	/// The server reported the total.
	Known(u64),
	/// The server reported `*`.
	Unknown,
	/// The header is missing or malformed.
	Absent,
}
impl ContentRangeTotal {
	/// Sentinel reported for a `*` total.
	pub const UNKNOWN_SENTINEL: i64 = -2;
	/// Sentinel reported for a missing or malformed header.
	pub const ABSENT_SENTINEL: i64 = -1;

	/// Parses a single header value.
	pub fn parse(raw: &str) -> Self {
		let raw = raw.trim();
		let raw = raw.strip_prefix("objects").or_else(|| raw.strip_prefix("items")).unwrap_or(raw);
		let Some((range, total)) = raw.trim().split_once('/') else {
			return Self::Absent;
		};
		let Some((start, end)) = range.split_once('-') else {
			return Self::Absent;
		};

		if start.trim().parse::<u64>().is_err() || end.trim().parse::<u64>().is_err() {
			return Self::Absent;
		}

		match total.trim() {
			"*" => Self::Unknown,
			count => count.parse().map_or(Self::Absent, Self::Known),
		}
	}

	/// Legacy integer form: the count, `-2` for unknown, `-1` for absent.
	pub fn sentinel(self) -> i64 {
		match self {
			Self::Known(count) => i64::try_from(count).unwrap_or(i64::MAX),
			Self::Unknown => Self::UNKNOWN_SENTINEL,
			Self::Absent => Self::ABSENT_SENTINEL,
		}
	}
}

/// Reads the total count from response headers; the last `Content-Range` wins.
pub fn content_range_total(headers: &[(String, String)]) -> ContentRangeTotal {
	header_values(headers, "content-range")
		.last()
		.map_or(ContentRangeTotal::Absent, ContentRangeTotal::parse)
}
