//! MAC access-token authorization for the V2 scheme.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use rand::Rng;
// self
use crate::{_prelude::*, auth::TokenBundle, request::HttpVerb};

pub(super) fn nonce() -> String {
	format!("n{}", rand::rng().random_range(0..10_000))
}

/// Renders `MAC id="..",ts="..",nonce="..",mac=".."` for `bundle`.
pub(super) fn authorization(
	bundle: &TokenBundle,
	verb: HttpVerb,
	url: &Url,
	timestamp: i64,
	nonce: &str,
) -> String {
	let normalized = normalized_string(verb, url, timestamp, nonce);
	let mac = STANDARD.encode(
		bundle.mac_algorithm.compute(bundle.mac_key.expose().as_bytes(), normalized.as_bytes()),
	);

	format!(
		"MAC id=\"{}\",ts=\"{timestamp}\",nonce=\"{nonce}\",mac=\"{mac}\"",
		bundle.access_token.expose()
	)
}

/// `ts\nnonce\nMETHOD\nuri\nhost\nport\n\n`, where the port falls back to 443/80.
fn normalized_string(verb: HttpVerb, url: &Url, timestamp: i64, nonce: &str) -> String {
	let host = url.host_str().unwrap_or_default();
	let port = url.port().unwrap_or(if url.scheme() == "https" { 443 } else { 80 });
	let uri = match url.query() {
		Some(query) => format!("{}?{query}", url.path()),
		None => url.path().to_owned(),
	};

	format!("{timestamp}\n{nonce}\n{}\n{uri}\n{host}\n{port}\n\n", verb.as_str())
}
