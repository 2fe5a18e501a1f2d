//! Failure isolation: refused connections, dropped connections, shutdown.

mod common;

use std::time::Duration;

use bytes::Bytes;
use courier::error::TransportError;
use courier::{ClientOptions, Courier, Error, HttpEngine, HttpProtocol, Interface, MethodSpec, Param};
use futures::future::join_all;
use http::{Request, Uri};
use serde_json::json;

use common::{ServerConfig, TestServer, refused_url};

fn options(protocol: HttpProtocol, max_pool_size: usize) -> ClientOptions {
    ClientOptions::builder()
        .protocol(protocol)
        .max_pool_size(max_pool_size)
        .build()
}

fn get(url: &str, path: &str) -> Request<Bytes> {
    Request::get(format!("{url}{path}")).body(Bytes::new()).unwrap()
}

#[tokio::test]
async fn refused_connection_fails_every_call() {
    let url = refused_url().await;
    let client = Courier::builder()
        .options(options(HttpProtocol::Http1, 2))
        .dispatcher(
            Interface::new("Ping").method(MethodSpec::get("ping", "/ping/{n}").param(Param::path("n"))),
            &url,
        )
        .unwrap();

    let calls: Vec<_> = (0..3)
        .map(|n| client.invoke::<String>("ping", vec![json!(n)]))
        .collect();
    for result in join_all(calls).await {
        assert!(
            matches!(result, Err(Error::Transport(TransportError::Connect(_)))),
            "unexpected {result:?}"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_connection_fails_only_the_call_in_flight() {
    let server = TestServer::with_config(ServerConfig {
        drop_first_connection: true,
        ..Default::default()
    })
    .await;
    let engine = HttpEngine::new(options(HttpProtocol::Http1, 1)).unwrap();

    let calls: Vec<_> = (0..5)
        .map(|n| engine.execute(get(&server.url(), &format!("/call/{n}"))))
        .collect();
    let mut results = join_all(calls).await.into_iter();

    let first = results.next().unwrap();
    assert!(first.unwrap_err().is_transport());
    for (n, result) in results.enumerate() {
        let response = result.unwrap();
        assert_eq!(response.body().as_ref(), format!("/call/{}", n + 1).as_bytes());
    }
    assert_eq!(server.stats().accepted(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refused_reconnect_waits_for_the_open_connection() {
    let server = TestServer::with_config(ServerConfig {
        delay: Duration::from_millis(100),
        accept_limit: Some(1),
        ..Default::default()
    })
    .await;
    let engine = HttpEngine::new(options(HttpProtocol::Http1, 2)).unwrap();

    let first = engine.execute(get(&server.url(), "/first")).await.unwrap();
    assert_eq!(first.body().as_ref(), b"/first");

    // The second request needs a new connection, which is refused.
    let (a, b) = tokio::join!(
        engine.execute(get(&server.url(), "/a")),
        engine.execute(get(&server.url(), "/b")),
    );
    assert_eq!(a.unwrap().body().as_ref(), b"/a");
    assert_eq!(b.unwrap().body().as_ref(), b"/b");

    assert_eq!(server.stats().accepted(), 1);
    let uri: Uri = server.url().parse().unwrap();
    let stats = engine.stats(&uri).unwrap();
    assert_eq!(stats.opened, 1);
    assert_eq!(stats.open, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_fails_queued_calls_and_keeps_the_one_in_flight() {
    let server = TestServer::with_config(ServerConfig {
        delay: Duration::from_millis(200),
        ..Default::default()
    })
    .await;
    let engine = HttpEngine::new(options(HttpProtocol::Http1, 1)).unwrap();

    let first = engine.execute(get(&server.url(), "/first"));
    let queued: Vec<_> = (0..2)
        .map(|n| engine.execute(get(&server.url(), &format!("/queued/{n}"))))
        .collect();
    let first = tokio::spawn(first);

    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.shutdown();

    for result in join_all(queued).await {
        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::PoolClosed))
        ));
    }
    let response = first.await.unwrap().unwrap();
    assert_eq!(response.body().as_ref(), b"/first");

    let late = engine.execute(get(&server.url(), "/late")).await;
    assert!(matches!(late, Err(Error::Transport(TransportError::PoolClosed))));
}

#[tokio::test]
async fn https_targets_are_rejected_by_the_engine() {
    let client = Courier::builder()
        .dispatcher(
            Interface::new("Secure").method(MethodSpec::get("ping", "/ping")),
            "https://localhost:8443",
        )
        .unwrap();
    let err = client.invoke::<String>("ping", Vec::new()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Transport(TransportError::UnsupportedScheme(_))
    ));
}

#[tokio::test]
async fn binding_errors_fail_the_handle() {
    let server = TestServer::start().await;
    let client = Courier::builder()
        .dispatcher(
            Interface::new("Ping").method(MethodSpec::get("ping", "/ping/{n}").param(Param::path("n"))),
            &server.url(),
        )
        .unwrap();

    let err = client.invoke::<String>("ping", Vec::new()).await.unwrap_err();
    assert!(matches!(err, Error::HandlerResolution(_)));
    let err = client
        .invoke::<String>("ping", vec![json!({"nested": true})])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HandlerResolution(_)));
    assert_eq!(server.stats().accepted(), 0);
}
