//! OAuth 1.0 two-legged HMAC-SHA1 signatures (RFC 5849 with an empty token).

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{
	_prelude::*,
	auth::MacAlgorithm,
	request::{HttpVerb, oauth_encode},
};

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const VERSION: &str = "1.0";

pub(super) fn nonce() -> String {
	rand::rng().sample_iter(Alphanumeric).take(16).map(char::from).collect()
}

/// Renders the `Authorization: OAuth ...` value.
pub(super) fn authorization(
	consumer_key: &str,
	consumer_secret: &str,
	verb: HttpVerb,
	url: &Url,
	timestamp: i64,
	nonce: &str,
) -> String {
	let timestamp = timestamp.to_string();
	let oauth_params = [
		("oauth_consumer_key", consumer_key),
		("oauth_nonce", nonce),
		("oauth_signature_method", SIGNATURE_METHOD),
		("oauth_timestamp", timestamp.as_str()),
		("oauth_version", VERSION),
	];
	let base = base_string(verb, url, &oauth_params);
	let signature = signature(consumer_secret, &base);

	format!(
		"OAuth oauth_consumer_key=\"{}\", oauth_nonce=\"{}\", oauth_signature=\"{}\", \
		 oauth_signature_method=\"{SIGNATURE_METHOD}\", oauth_timestamp=\"{timestamp}\", \
		 oauth_version=\"{VERSION}\"",
		oauth_encode(consumer_key),
		oauth_encode(nonce),
		oauth_encode(&signature),
	)
}

/// `METHOD&enc(base-url)&enc(sorted params)`.
pub(super) fn base_string(verb: HttpVerb, url: &Url, oauth_params: &[(&str, &str)]) -> String {
	let mut params = oauth_params
		.iter()
		.map(|(key, value)| (oauth_encode(key), oauth_encode(value)))
		.chain(url.query_pairs().map(|(key, value)| (oauth_encode(&key), oauth_encode(&value))))
		.collect::<Vec<_>>();

	params.sort();

	let normalized =
		params.iter().map(|(key, value)| format!("{key}={value}")).collect::<Vec<_>>().join("&");

	format!("{}&{}&{}", verb.as_str(), oauth_encode(&base_url(url)), oauth_encode(&normalized))
}

fn base_url(url: &Url) -> String {
	let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
	let port = url.port().map(|port| format!(":{port}")).unwrap_or_default();

	format!("{}://{host}{port}{}", url.scheme(), url.path())
}

fn signature(consumer_secret: &str, base: &str) -> String {
	// Two-legged: the token secret half of the key is empty.
	let key = format!("{}&", oauth_encode(consumer_secret));

	STANDARD.encode(MacAlgorithm::HmacSha1.compute(key.as_bytes(), base.as_bytes()))
}
