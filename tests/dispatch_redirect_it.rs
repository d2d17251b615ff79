#![cfg(all(feature = "reqwest", feature = "test"))]

// crates.io
use httpmock::prelude::*;
// self
use mob_dispatch::{
	_preludet::*,
	auth::OAuthScheme,
	dispatch::Dispatcher,
	http::ReqwestTransport,
	request::{HttpVerb, RequestDescriptor},
};

fn build_observed_dispatcher(server: &MockServer) -> (Dispatcher, Arc<RecordingObserver>) {
	let observer = Arc::new(RecordingObserver::default());
	let transport = ReqwestTransport::new().expect("Failed to build reqwest transport for tests.");
	let dispatcher = Dispatcher::builder(Arc::new(test_session(OAuthScheme::V1)))
		.transport(Arc::new(transport))
		.redirect_observer(observer.clone())
		.default_host(server.address().to_string())
		.build()
		.expect("Dispatcher should build inside a tokio runtime.");

	(dispatcher, observer)
}

#[tokio::test]
async fn post_redirect_preserves_verb_and_body() {
	let server = MockServer::start_async().await;
	let (dispatcher, observer) = build_observed_dispatcher(&server);
	let old = server
		.mock_async(|when, then| {
			when.method(POST).path("/old").body("{\"a\":1}");
			then.status(302).header("location", "/new").body("moved");
		})
		.await;
	let new = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/new")
				.header("content-type", "application/json")
				.header_exists("authorization")
				.body("{\"a\":1}");
			then.status(201).body("{\"created\":true}");
		})
		.await;
	let (callback, mut rx) = ChannelCallback::new(3);

	dispatcher.dispatch(RequestDescriptor::post("old").with_body("{\"a\":1}"), callback);

	let result = next_delivery(&mut rx).await.expect_done();

	old.assert_async().await;
	new.assert_async().await;

	assert_eq!(result.status, 201);
	assert_eq!(result.verb, HttpVerb::Post);
	assert_eq!(result.url, server.url("/new"));
	assert_eq!(result.request_body.as_deref(), Some("{\"a\":1}"));

	let events = observer.events();

	assert_eq!(events.len(), 1);
	assert_eq!(events[0].0.path(), "/old");
	assert_eq!(events[0].1.path(), "/new");
	assert_eq!(dispatcher.metrics().redirects(), 1);
}

#[tokio::test]
async fn delete_redirect_keeps_verb_without_body() {
	let server = MockServer::start_async().await;
	let (dispatcher, observer) = build_observed_dispatcher(&server);
	let target = server.url("/gone");
	let old = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/item");
			then.status(307).header("location", target.as_str());
		})
		.await;
	let new = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/gone");
			then.status(200);
		})
		.await;
	let result = dispatcher
		.send(RequestDescriptor::delete("item").with_body("dropped"))
		.await
		.expect("Request should be sent.");

	old.assert_async().await;
	new.assert_async().await;

	assert_eq!(result.status, 200);
	assert_eq!(result.verb, HttpVerb::Delete);
	assert_eq!(result.request_body, None);
	assert_eq!(observer.events().len(), 1);
}

#[tokio::test]
async fn redirect_without_location_is_a_transport_failure() {
	let server = MockServer::start_async().await;
	let (dispatcher, observer) = build_observed_dispatcher(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/nowhere");
			then.status(301);
		})
		.await;
	let (callback, mut rx) = ChannelCallback::new(3);

	dispatcher.dispatch(RequestDescriptor::get("nowhere"), callback);

	let result = next_delivery(&mut rx).await.expect_done();

	mock.assert_async().await;

	assert_eq!(result.status, -1);
	assert!(result.body_text().contains("Location"));
	assert!(observer.events().is_empty());
}

#[tokio::test]
async fn chained_redirects_are_followed_hop_by_hop() {
	let transport = ScriptedTransport::new(|request, _| {
		Ok(match request.url.path() {
			"/a" => response(302, &[("Location", "/b")], ""),
			"/b" => response(303, &[("Location", "http://mirror.test.local/c")], ""),
			_ => response(200, &[], "done"),
		})
	});
	let observer = Arc::new(RecordingObserver::default());
	let dispatcher = build_scripted_dispatcher(
		Arc::new(test_session(OAuthScheme::V2)),
		transport.clone(),
		observer.clone(),
	);
	let result =
		dispatcher.send(RequestDescriptor::put("a").with_body("x")).await.expect("Request sent.");
	let requests = transport.requests();

	assert_eq!(result.status, 200);
	assert_eq!(result.url, "http://mirror.test.local/c");
	assert_eq!(requests.len(), 3);
	assert!(requests.iter().all(|request| request.verb == HttpVerb::Put));
	assert!(requests.iter().all(|request| request.body.as_deref() == Some("x")));
	assert!(requests.iter().all(|request| request.header("X-StackMob-API-Key") == Some("test-key")));
	assert_eq!(observer.events().len(), 2);
}
