//! Refresh-token round trip, sent through the dispatcher's own chain machinery.

// crates.io
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{MacAlgorithm, Secret, TokenBundle, TokenResponse},
	dispatch::{
		Dispatcher,
		chain::{Chain, OneshotCallback, RefreshMode},
	},
	error::RefreshError,
	request::RequestDescriptor,
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

impl Dispatcher {
	/// Exchanges the session's refresh token for a new bundle and installs it atomically.
	///
	/// The request runs as its own chain with refresh disabled and no rate-limit retries, so
	/// a `401` from the refresh endpoint is reported instead of triggering another refresh.
	/// It targets the dispatcher's default host.
	pub async fn refresh(&self) -> Result<Arc<TokenBundle>> {
		self.refresh_at(None).await
	}

	/// Refreshes against `host`, the host of the chain that needs the new token.
	pub(crate) async fn refresh_at(&self, host: Option<&str>) -> Result<Arc<TokenBundle>> {
		let refresh_token = self
			.session
			.tokens()
			.and_then(|bundle| bundle.refresh_token.clone())
			.filter(|token| !token.is_empty())
			.ok_or(RefreshError::MissingRefreshToken)?;
		let callback = Arc::new(OneshotCallback::new(0));
		let chain = Chain::new(
			refresh_descriptor(&self.refresh_path, &refresh_token, host),
			callback.clone(),
			RefreshMode::Disabled,
		);

		self.drive(chain).await;

		let result =
			callback.take().map_err(|e| RefreshError::Unsent { source: Box::new(e) })?;

		if !result.is_success() {
			return Err(
				RefreshError::Rejected { status: result.status, body: result.body_text() }.into()
			);
		}

		let mut de = serde_json::Deserializer::from_slice(&result.response_body);
		let response: TokenResponse = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| RefreshError::ResponseParse { source })?;
		let bundle = response
			.into_bundle(self.session.server_now(), Some(&refresh_token))
			.map_err(RefreshError::from)?;

		Ok(self.session.replace_tokens(bundle))
	}
}

fn refresh_descriptor(
	path: &str,
	refresh_token: &Secret,
	host: Option<&str>,
) -> RequestDescriptor {
	let body = form_urlencoded::Serializer::new(String::new())
		.append_pair("refresh_token", refresh_token.expose())
		.append_pair("grant_type", "refresh_token")
		.append_pair("token_type", "mac")
		.append_pair("mac_algorithm", MacAlgorithm::HmacSha1.as_str())
		.finish();

	let descriptor = RequestDescriptor::post(path)
		.with_body(body)
		.with_content_type(FORM_CONTENT_TYPE)
		.with_secure(true);

	match host {
		Some(host) => descriptor.with_host(host),
		None => descriptor,
	}
}
