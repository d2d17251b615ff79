#![cfg(all(feature = "reqwest", feature = "test"))]

// std
use std::collections::HashSet;
// crates.io
use tokio::sync::mpsc::{self, UnboundedSender};
// self
use mob_dispatch::{
	_preludet::*,
	auth::OAuthScheme,
	callback::{
		Callback, DispatchResult, FnCallback, NoopRedirectObserver, RetryBudget, RetryFuture,
	},
	error::{ConfigError, TransportError},
	request::RequestDescriptor,
};

struct PanickingRetry {
	tx: UnboundedSender<DispatchResult>,
	budget: RetryBudget,
}
impl Callback for PanickingRetry {
	fn done(&self, result: DispatchResult) {
		let _ = self.tx.send(result);
	}

	fn unsent(&self, error: Error) {
		panic!("Unexpected unsent delivery: {error}.");
	}

	fn retry(&self, _: Duration) -> RetryFuture<'_> {
		panic!("Retry hook bug.");
	}

	fn retry_budget(&self) -> &RetryBudget {
		&self.budget
	}
}

fn refused() -> TransportError {
	TransportError::Io(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"))
}

#[tokio::test]
async fn transport_errors_are_delivered_as_minus_one() {
	let transport = ScriptedTransport::new(|_, _| Err(refused()));
	let dispatcher = build_scripted_dispatcher(
		Arc::new(test_session(OAuthScheme::V1)),
		transport.clone(),
		Arc::new(NoopRedirectObserver),
	);
	let (callback, mut rx) = ChannelCallback::new(3);

	dispatcher.dispatch(RequestDescriptor::post("user").with_body("{}"), callback);

	let result = next_delivery(&mut rx).await.expect_done();

	assert_eq!(result.status, -1);
	assert!(result.response_headers.is_empty());
	assert!(result.body_text().contains("refused"));
	assert_eq!(result.request_body.as_deref(), Some("{}"));
	assert_eq!(transport.requests().len(), 1, "Transport failures are never retried.");
}

#[tokio::test]
async fn unsupported_verbs_and_bad_headers_are_unsent() {
	let transport = ScriptedTransport::new(|_, _| Ok(response(200, &[], "")));
	let dispatcher = build_scripted_dispatcher(
		Arc::new(test_session(OAuthScheme::V2)),
		transport.clone(),
		Arc::new(NoopRedirectObserver),
	);
	let (callback, mut rx) = ChannelCallback::new(3);

	dispatcher.dispatch(RequestDescriptor::new("PATCH", "user"), callback.clone());
	dispatcher.dispatch(RequestDescriptor::get("user").with_header("Bad\nName", "v"), callback);

	let first = next_delivery(&mut rx).await.expect_unsent();
	let second = next_delivery(&mut rx).await.expect_unsent();
	let errors = [first, second];

	assert!(
		errors
			.iter()
			.any(|err| matches!(err, Error::Config(ConfigError::UnsupportedVerb { verb }) if verb == "PATCH"))
	);
	assert!(errors.iter().any(|err| matches!(err, Error::Config(ConfigError::InvalidHeader { .. }))));
	assert!(transport.requests().is_empty());
	assert_eq!(dispatcher.metrics().unsent(), 2);
}

#[tokio::test]
async fn every_concurrent_chain_delivers_exactly_once() {
	let transport = ScriptedTransport::new(|request, index| {
		Ok(match index % 3 {
			0 => response(200, &[], request.url.path()),
			1 => response(404, &[], request.url.path()),
			_ => return Err(refused()),
		})
	});
	let dispatcher = build_scripted_dispatcher(
		Arc::new(test_session(OAuthScheme::V1)),
		transport,
		Arc::new(NoopRedirectObserver),
	);
	let (callback, mut rx) = ChannelCallback::new(3);
	let chains = 32;

	for idx in 0..chains {
		dispatcher.dispatch(RequestDescriptor::get(format!("item/{idx}")), callback.clone());
	}

	let mut urls = HashSet::new();

	for _ in 0..chains {
		urls.insert(next_delivery(&mut rx).await.expect_done().url);
	}

	assert_eq!(urls.len(), chains);

	// Nothing else may arrive once every chain has delivered.
	tokio::time::sleep(std::time::Duration::from_millis(100)).await;

	assert!(rx.try_recv().is_err());
	assert_eq!(dispatcher.metrics().chains(), chains as u64);
	assert_eq!(dispatcher.metrics().deliveries(), chains as u64);
}

#[tokio::test]
async fn panicking_callback_is_contained() {
	let transport = ScriptedTransport::new(|_, _| Ok(response(200, &[], "ok")));
	let dispatcher = build_scripted_dispatcher(
		Arc::new(test_session(OAuthScheme::V1)),
		transport,
		Arc::new(NoopRedirectObserver),
	);
	let calls = Arc::new(Mutex::new(0));
	let callback = {
		let calls = Arc::clone(&calls);

		FnCallback::new(move |_| {
			*calls.lock() += 1;

			panic!("Caller bug.");
		})
	};

	dispatcher.dispatch(RequestDescriptor::get("user"), Arc::new(callback));

	tokio::time::timeout(std::time::Duration::from_secs(10), async {
		while dispatcher.metrics().deliveries() == 0 {
			tokio::time::sleep(std::time::Duration::from_millis(10)).await;
		}
	})
	.await
	.expect("The chain should deliver.");
	tokio::time::sleep(std::time::Duration::from_millis(50)).await;

	assert_eq!(*calls.lock(), 1);
	assert_eq!(dispatcher.metrics().unsent(), 0);
}

#[tokio::test]
async fn panicking_transport_is_delivered_as_minus_one() {
	let transport = ScriptedTransport::new(|_, _| panic!("Transport bug."));
	let dispatcher = build_scripted_dispatcher(
		Arc::new(test_session(OAuthScheme::V1)),
		transport.clone(),
		Arc::new(NoopRedirectObserver),
	);
	let (callback, mut rx) = ChannelCallback::new(3);

	dispatcher.dispatch(RequestDescriptor::get("user"), callback);

	let result = next_delivery(&mut rx).await.expect_done();

	assert_eq!(result.status, -1);
	assert!(result.body_text().contains("panicked"));
	assert_eq!(transport.requests().len(), 1);
	assert_eq!(dispatcher.metrics().failures(), 1);
}

#[tokio::test]
async fn panicking_retry_hook_delivers_the_rate_limited_result() {
	let transport =
		ScriptedTransport::new(|_, _| Ok(response(503, &[("Retry-After", "1")], "busy")));
	let dispatcher = build_scripted_dispatcher(
		Arc::new(test_session(OAuthScheme::V1)),
		transport.clone(),
		Arc::new(NoopRedirectObserver),
	);
	let (tx, mut rx) = mpsc::unbounded_channel();
	let callback = PanickingRetry { tx, budget: RetryBudget::new(3) };

	dispatcher.dispatch(RequestDescriptor::get("busy"), Arc::new(callback));

	let result = tokio::time::timeout(std::time::Duration::from_secs(10), rx.recv())
		.await
		.expect("Timed out waiting for a delivery.")
		.expect("The chain should deliver.");

	assert_eq!(result.status, 503);
	assert_eq!(transport.requests().len(), 1);
}
