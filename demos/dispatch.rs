//! Demonstrates a signed request chain against a local mock: the first hop redirects and the
//! second answers with a paginated listing.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use tokio::sync::oneshot;
// self
use mob_dispatch::{
	callback::FnCallback,
	dispatch::Dispatcher,
	request::RequestDescriptor,
	session::Session,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let moved = server
		.mock_async(|when, then| {
			when.method(GET).path("/user");
			then.status(302).header("location", "/v2/user");
		})
		.await;
	let listing = server
		.mock_async(|when, then| {
			when.method(GET).path("/v2/user").header_exists("authorization");
			then.status(200)
				.header("content-type", "application/json")
				.header("content-range", "objects 0-1/42")
				.body("[{\"username\":\"john\"},{\"username\":\"jane\"}]");
		})
		.await;
	let session = Arc::new(Session::from_json(
		r#"{"api_key":"demo-key","api_secret":"demo-secret","app_name":"demo","api_version":0}"#,
	)?);
	let dispatcher = Dispatcher::builder(session).default_host(server.address().to_string()).build()?;
	let (tx, rx) = oneshot::channel();
	let tx = parking_lot::Mutex::new(Some(tx));
	let callback = FnCallback::new(move |result| {
		if let Some(tx) = tx.lock().take() {
			let _ = tx.send(result);
		}
	})
	.with_unsent(|err| eprintln!("Request was never sent: {err}."));

	dispatcher.dispatch(RequestDescriptor::get("user").with_param("limit", "2"), Arc::new(callback));

	let result = rx.await?;

	println!(
		"{} {} -> {} ({} objects in total).",
		result.verb.as_str(),
		result.url,
		result.status,
		result.total_object_count().sentinel(),
	);

	moved.assert_async().await;
	listing.assert_async().await;

	let again = dispatcher.send(RequestDescriptor::get("user")).await?;

	println!("Blocking-style send finished with {}.", again.status);

	Ok(())
}
