//! Integration tests for the request engine against a mock server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use conflux::prelude::*;
use conflux::{Callbacks, Client, RequestError, Validator};

/// Poll until `cond` holds; panics after ~5 seconds.
async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not met within timeout");
}

#[tokio::test]
async fn get_returns_a_parsed_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"name": "Aidan", "args": {"name": "Aidan"}})),
        )
        .mount(&server)
        .await;

    let client = Client::new().unwrap();
    let response = client
        .get(format!("{}/users/1", server.uri()))
        .header("Accept", "application/json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.is_success());
    assert!(!response.did_redirect());
    assert_eq!(response.field("args.name").unwrap(), Some(json!("Aidan")));
}

#[tokio::test]
async fn response_unmarshals_into_a_wire_object() {
    #[derive(WireObject, Clone, Default)]
    struct Echo {
        #[wire(name = "args.name")]
        name: Option<String>,
        count: i32,
        #[wire(header = "X-Request-Id")]
        request_id: Option<String>,
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/echo"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Request-Id", "req-42")
                .set_body_json(json!({"args": {"name": "Aidan"}, "count": 3})),
        )
        .mount(&server)
        .await;

    let client = Client::new().unwrap();
    let response = client
        .get(format!("{}/echo", server.uri()))
        .send()
        .await
        .unwrap();

    let echo: Echo = response.unmarshal().unwrap();
    assert_eq!(echo.name.as_deref(), Some("Aidan"));
    assert_eq!(echo.count, 3);
    assert_eq!(echo.request_id.as_deref(), Some("req-42"));
}

#[tokio::test]
async fn object_bodies_are_marshalled_with_header_fields() {
    #[derive(WireObject, Clone, Default)]
    struct Point {
        x: i64,
        y: i64,
        #[wire(header = "X-Trace")]
        trace: Option<String>,
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/points"))
        .and(header("Content-Type", "application/json"))
        .and(header("X-Trace", "t1"))
        .and(body_json(json!({"x": 1, "y": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new().unwrap();
    let point = Point {
        x: 1,
        y: 2,
        trace: Some("t1".to_string()),
    };
    let response = client
        .post(format!("{}/points", server.uri()))
        .object(&point)
        .send()
        .await
        .unwrap();
    assert_eq!(response.field("ok").unwrap(), Some(json!(true)));
}

#[tokio::test]
async fn default_headers_are_sent_with_every_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/guarded"))
        .and(header("X-Api-Key", "secret"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::builder()
        .default_header("X-Api-Key", "secret")
        .build()
        .unwrap();
    let response = client
        .get(format!("{}/guarded", server.uri()))
        .send()
        .await
        .unwrap();
    assert!(response.is_success());
}

#[tokio::test]
async fn redirects_are_followed_and_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/end"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/end"))
        .respond_with(ResponseTemplate::new(200).set_body_string("done"))
        .mount(&server)
        .await;

    let client = Client::new().unwrap();
    let response = client
        .get(format!("{}/start", server.uri()))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.did_redirect());
    assert_eq!(response.redirect_count(), 1);
    assert!(response.url().ends_with("/end"));
    assert_eq!(response.text().unwrap(), "done");
}

#[tokio::test]
async fn redirect_chains_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
        .expect(6)
        .mount(&server)
        .await;

    let client = Client::builder().max_redirects(5).build().unwrap();
    let err = client
        .get(format!("{}/loop", server.uri()))
        .send()
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::TooManyRedirects { max: 5 }));
}

#[tokio::test]
async fn unchased_redirect_statuses_count_as_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/see-other"))
        .respond_with(ResponseTemplate::new(303).insert_header("Location", "/elsewhere"))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::builder().no_redirects().build().unwrap();
    let response = client
        .get(format!("{}/see-other", server.uri()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 303);
    assert!(response.is_success());
    assert!(!response.did_redirect());
}

#[tokio::test]
async fn failure_statuses_are_classified_or_allowed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = Client::new().unwrap();
    let url = format!("{}/missing", server.uri());

    let err = client.get(&url).send().await.unwrap_err();
    assert!(matches!(err, RequestError::Unsuccessful { status: 404, .. }));

    let response = client
        .get(&url)
        .allow_failure_status()
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert!(!response.is_success());
}

#[tokio::test]
async fn retry_recovers_from_a_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .mount(&server)
        .await;

    let client = Client::new().unwrap();
    let response = client
        .get(format!("{}/flaky", server.uri()))
        .retries(2, Duration::ZERO)
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().unwrap(), "recovered");
}

#[tokio::test]
async fn retry_exhaustion_wraps_the_final_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let client = Client::new().unwrap();
    let err = client
        .get(format!("{}/broken", server.uri()))
        .retries(2, Duration::ZERO)
        .send()
        .await
        .unwrap_err();

    match err {
        RequestError::MaxRetriesReached(cause) => {
            assert!(matches!(*cause, RequestError::Unsuccessful { status: 500, .. }));
        }
        other => panic!("expected MaxRetriesReached, got {other}"),
    }
}

#[tokio::test]
async fn slow_responses_surface_as_timeouts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let client = Client::new().unwrap();
    let err = client
        .get(format!("{}/slow", server.uri()))
        .read_timeout(Duration::from_millis(100))
        .send()
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::TimedOut));
}

#[tokio::test]
async fn validators_reject_or_error_the_response() {
    struct RequireHeader(&'static str);

    impl Validator for RequireHeader {
        fn id(&self) -> &str {
            "require-header"
        }

        fn validate(
            &self,
            response: &Response,
        ) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
            Ok(response.headers().get_ignore_case(self.0).is_some())
        }
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = Client::new().unwrap();
    let err = client
        .get(format!("{}/plain", server.uri()))
        .validator(Arc::new(RequireHeader("X-Signature")))
        .send()
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::ValidatorRejected { ref id } if id == "require-header"));
}

#[tokio::test]
async fn identical_callback_requests_coalesce_into_one_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shared"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(300))
                .set_body_json(json!({"value": 1})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new().unwrap();
    let url = format!("{}/shared", server.uri());
    let delivered = Arc::new(AtomicUsize::new(0));
    let successes = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let delivered = delivered.clone();
        let successes = successes.clone();
        client
            .get(&url)
            .callback(move |outcome| {
                delivered.fetch_add(1, Ordering::SeqCst);
                if outcome.is_success() {
                    successes.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();
    }
    assert_eq!(client.in_flight(), 1);

    wait_for(|| delivered.load(Ordering::SeqCst) == 3).await;
    assert_eq!(successes.load(Ordering::SeqCst), 3);
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test]
async fn cancellation_delivers_a_cancelled_outcome_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/long"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = Client::new().unwrap();
    let cancelled = Arc::new(AtomicUsize::new(0));
    let delivered = Arc::new(AtomicUsize::new(0));

    let handle = {
        let cancelled = cancelled.clone();
        let delivered = delivered.clone();
        client
            .get(format!("{}/long", server.uri()))
            .callback(move |outcome| {
                delivered.fetch_add(1, Ordering::SeqCst);
                if matches!(outcome.error, Some(RequestError::Cancelled)) {
                    cancelled.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap()
    };

    assert!(client.cancel(&handle, false));
    assert!(handle.is_cancelled());
    assert_eq!(client.in_flight(), 0);

    wait_for(|| delivered.load(Ordering::SeqCst) == 1).await;
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);

    // The worker winding down must not deliver a second outcome.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn progress_percentages_are_monotonic_and_finish_at_one_hundred() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blob"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 256 * 1024]))
        .mount(&server)
        .await;

    let client = Client::new().unwrap();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let done = Arc::new(AtomicUsize::new(0));

    {
        let seen = seen.clone();
        let done = done.clone();
        client
            .get(format!("{}/blob", server.uri()))
            .submit(Arc::new(
                Callbacks::new(move |_| {
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .on_progress(move |percent| seen.lock().push(percent)),
            ))
            .unwrap();
    }

    wait_for(|| done.load(Ordering::SeqCst) == 1).await;
    let seen = seen.lock();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "not monotonic: {seen:?}");
    assert_eq!(seen.last(), Some(&100));
}

#[tokio::test]
async fn raw_body_uploads_report_progress() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ingest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let client = Client::new().unwrap();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let done = Arc::new(AtomicUsize::new(0));

    {
        let seen = seen.clone();
        let done = done.clone();
        client
            .post(format!("{}/ingest", server.uri()))
            .body(vec![0u8; 256 * 1024])
            .submit(Arc::new(
                Callbacks::new(move |_| {
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .on_progress(move |percent| seen.lock().push(percent)),
            ))
            .unwrap();
    }

    wait_for(|| done.load(Ordering::SeqCst) == 1).await;
    let seen = seen.lock();
    // The body goes out one buffer-sized chunk at a time, so upload
    // progress arrives incrementally rather than as a single 100.
    assert!(seen.len() >= 2, "too few progress reports: {seen:?}");
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "not monotonic: {seen:?}");
    assert_eq!(seen.last(), Some(&100));
}

#[tokio::test]
async fn tagged_subscribers_cancel_without_stopping_the_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/watched"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(300))
                .set_body_json(json!({"ok": true})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new().unwrap();
    let url = format!("{}/watched", server.uri());
    let kept = Arc::new(AtomicUsize::new(0));
    let dropped = Arc::new(AtomicUsize::new(0));

    {
        let kept = kept.clone();
        client
            .get(&url)
            .callback(move |outcome| {
                if outcome.is_success() {
                    kept.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();
    }
    {
        let dropped = dropped.clone();
        client
            .get(&url)
            .tag("secondary")
            .callback(move |outcome| {
                if matches!(outcome.error, Some(RequestError::Cancelled)) {
                    dropped.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();
    }

    // Cancelling the tagged subscriber leaves the exchange running for
    // the first one.
    assert_eq!(client.cancel_all(Some("secondary"), false), 0);
    wait_for(|| dropped.load(Ordering::SeqCst) == 1).await;
    wait_for(|| kept.load(Ordering::SeqCst) == 1).await;
    assert_eq!(client.in_flight(), 0);
}
