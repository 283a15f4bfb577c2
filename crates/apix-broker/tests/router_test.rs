//! Router-level tests: registration endpoints and proxying through an
//! in-memory agent connection.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use apix_broker::server::{router, HealthResponse, RegisterResponse, TunnelSummary};
use apix_broker::BrokerState;
use apix_core::config::BrokerConfig;
use apix_core::memory::{self, MemoryConnection};
use apix_core::{Connection, TunnelId};
use apix_protocol::{Frame, Headers, RequestFrame, ResponseFrame};

fn test_state() -> Arc<BrokerState> {
    Arc::new(BrokerState::new(BrokerConfig {
        request_timeout: Duration::from_secs(5),
        ..BrokerConfig::default()
    }))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("host", "broker.test:8000")
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Start a broker session for `tunnel_id` and return the agent's end
async fn connect_agent(state: &Arc<BrokerState>, tunnel_id: &str) -> MemoryConnection {
    let (broker_end, agent_end) = memory::pair();
    let session = state.session(Arc::new(broker_end));
    tokio::spawn(session.run());

    agent_end
        .send_frame(&Frame::register(tunnel_id))
        .await
        .unwrap();

    let id = TunnelId::new(tunnel_id);
    for _ in 0..200 {
        if state.registry.lookup(&id).is_some() {
            return agent_end;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("agent for {} never attached", tunnel_id);
}

async fn next_request(agent: &MemoryConnection) -> RequestFrame {
    loop {
        match apix_protocol::decode(&agent.receive().await.unwrap()).unwrap() {
            Frame::Request { payload } => return payload,
            _ => continue,
        }
    }
}

#[tokio::test]
async fn test_register_with_username() {
    let state = test_state();
    let app = router(Arc::clone(&state));

    let (status, body) = send(
        &app,
        post_json("/register", r#"{"username":"  MyApp ","ttl_seconds":60}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let registered: RegisterResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(registered.tunnel_id, "myapp");
    assert_eq!(registered.public_url, "http://broker.test:8000/myapp");
    assert_eq!(state.registry.len(), 1);
}

#[tokio::test]
async fn test_register_empty_username_is_random() {
    let app = router(test_state());
    let (status, body) = send(&app, post_json("/register", r#"{"username":"   "}"#)).await;
    assert_eq!(status, StatusCode::OK);

    let registered: RegisterResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(registered.tunnel_id.len(), 8);
}

#[tokio::test]
async fn test_random_uses_configured_public_url() {
    let state = Arc::new(BrokerState::new(BrokerConfig {
        public_url: Some("https://tunnels.example.com".to_string()),
        ..BrokerConfig::default()
    }));
    let app = router(state);

    let (status, body) = send(&app, post_json("/random", "")).await;
    assert_eq!(status, StatusCode::OK);

    let registered: RegisterResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        registered.public_url,
        format!("https://tunnels.example.com/{}", registered.tunnel_id)
    );
}

#[tokio::test]
async fn test_register_rejects_invalid_input() {
    let app = router(test_state());

    let (status, body) = send(&app, post_json("/register", r#"{"ttl_seconds":0}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(error["error"].as_str().unwrap().contains("ttl_seconds"));

    let (status, _) = send(&app, post_json("/register", r#"{"username":"health"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, post_json("/register", "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unattached_tunnel_is_502() {
    let state = test_state();
    let app = router(Arc::clone(&state));
    send(&app, post_json("/register", r#"{"username":"idle"}"#)).await;

    let (status, body) = send(&app, get("/idle/anything")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, b"tunnel not connected");
    assert!(state.pending.is_empty());

    let (status, _) = send(&app, get("/never-registered")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_root_path_is_not_found() {
    let app = router(test_state());
    let (status, _) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_proxy_round_trip_through_session() {
    let state = test_state();
    let app = router(Arc::clone(&state));
    let agent = connect_agent(&state, "demo").await;

    let agent_task = tokio::spawn(async move {
        let request = next_request(&agent).await;
        assert_eq!(request.method, "PUT");
        assert_eq!(request.path, "/items/7");
        assert_eq!(request.query.as_deref(), Some("verbose=1"));
        assert_eq!(request.headers.get("x-token"), Some("abc"));
        assert_eq!(&request.body[..], &[0u8, 159, 146, 150][..]);

        let mut headers = Headers::new();
        headers.append("content-type", "application/octet-stream");
        headers.append("x-served-by", "agent");
        let reply = ResponseFrame::new(request.id, 202, headers, request.body);
        agent
            .send_frame(&Frame::Response { payload: reply })
            .await
            .unwrap();
        agent
    });

    let request = Request::builder()
        .method("PUT")
        .uri("/demo/items/7?verbose=1")
        .header("x-token", "abc")
        .body(Body::from(vec![0u8, 159, 146, 150]))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.headers().get("x-served-by").unwrap(), "agent");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], &[0u8, 159, 146, 150][..]);

    agent_task.await.unwrap();
    assert!(state.pending.is_empty());
}

#[tokio::test]
async fn test_root_request_uses_empty_path() {
    let state = test_state();
    let app = router(Arc::clone(&state));
    let agent = connect_agent(&state, "root").await;

    for uri in ["/root", "/root/"] {
        let reply = tokio::spawn({
            let app = app.clone();
            async move { send(&app, get(uri)).await }
        });

        let request = next_request(&agent).await;
        assert_eq!(request.path, "/");
        let frame = ResponseFrame::new(request.id, 200, Headers::new(), "home");
        agent
            .send_frame(&Frame::Response { payload: frame })
            .await
            .unwrap();

        let (status, body) = reply.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"home");
    }
}

#[tokio::test]
async fn test_concurrent_requests_resolve_by_id() {
    const COUNT: usize = 8;
    let state = test_state();
    let app = router(Arc::clone(&state));
    let agent = connect_agent(&state, "busy").await;

    let mut callers = Vec::new();
    for i in 0..COUNT {
        let app = app.clone();
        callers.push(tokio::spawn(async move {
            send(&app, get(&format!("/busy/item/{}", i))).await
        }));
    }

    let mut requests = Vec::new();
    for _ in 0..COUNT {
        requests.push(next_request(&agent).await);
    }
    let mut ids: Vec<_> = requests.iter().map(|r| r.id.clone()).collect();
    ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    ids.dedup();
    assert_eq!(ids.len(), COUNT);

    // Answer in reverse arrival order, echoing the path
    for request in requests.into_iter().rev() {
        let frame = ResponseFrame::new(request.id, 200, Headers::new(), request.path.clone());
        agent
            .send_frame(&Frame::Response { payload: frame })
            .await
            .unwrap();
    }

    for (i, caller) in callers.into_iter().enumerate() {
        let (status, body) = caller.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(String::from_utf8(body).unwrap(), format!("/item/{}", i));
    }
    assert!(state.pending.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_request_is_504() {
    let state = Arc::new(BrokerState::new(BrokerConfig::default()));
    let app = router(Arc::clone(&state));
    let _agent = connect_agent(&state, "quiet").await;

    let (status, body) = send(&app, get("/quiet/slow")).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body, b"client error or timeout");
    assert!(state.pending.is_empty());
}

#[tokio::test]
async fn test_docs_page_rewritten() {
    let state = test_state();
    let app = router(Arc::clone(&state));
    let agent = connect_agent(&state, "api").await;

    let reply = tokio::spawn({
        let app = app.clone();
        async move { send(&app, get("/api/docs")).await }
    });

    let request = next_request(&agent).await;
    let mut headers = Headers::new();
    headers.append("content-type", "text/html; charset=utf-8");
    let page = r#"<script>SwaggerUIBundle({url: "/openapi.json"})</script>"#;
    let frame = ResponseFrame::new(request.id, 200, headers, page);
    agent
        .send_frame(&Frame::Response { payload: frame })
        .await
        .unwrap();

    let (status, body) = reply.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        String::from_utf8(body).unwrap(),
        r#"<script>SwaggerUIBundle({url: "/api/openapi.json"})</script>"#
    );
}

#[tokio::test]
async fn test_health_and_tunnel_listing() {
    let state = test_state();
    let app = router(Arc::clone(&state));
    send(&app, post_json("/register", r#"{"username":"alpha"}"#)).await;
    let _agent = connect_agent(&state, "beta").await;

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.tunnels, 2);
    assert_eq!(health.connected, 1);
    assert_eq!(health.pending_requests, 0);

    let (status, body) = send(&app, get("/tunnels")).await;
    assert_eq!(status, StatusCode::OK);
    let tunnels: Vec<TunnelSummary> = serde_json::from_slice(&body).unwrap();
    let names: Vec<_> = tunnels.iter().map(|t| t.tunnel_id.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
    assert!(!tunnels[0].connected);
    assert!(tunnels[1].connected);
}

#[tokio::test]
async fn test_registration_without_ttl_uses_configured_default() {
    let state = Arc::new(BrokerState::new(BrokerConfig {
        default_ttl: Duration::from_secs(30),
        ..BrokerConfig::default()
    }));
    let app = router(Arc::clone(&state));

    let (status, _) = send(&app, post_json("/random", "")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, post_json("/register", r#"{"username":"short"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &app,
        post_json("/register", r#"{"username":"long","ttl_seconds":3600}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, get("/tunnels")).await;
    let tunnels: Vec<TunnelSummary> = serde_json::from_slice(&body).unwrap();
    assert_eq!(tunnels.len(), 3);
    for tunnel in &tunnels {
        if tunnel.tunnel_id == "long" {
            assert!(tunnel.expires_in_secs > 30);
        } else {
            assert!(tunnel.expires_in_secs <= 30, "{:?}", tunnel);
        }
    }
}

#[tokio::test]
async fn test_non_utf8_header_values_round_trip() {
    let state = test_state();
    let app = router(Arc::clone(&state));
    let agent = connect_agent(&state, "legacy").await;

    let request = Request::builder()
        .uri("/legacy/page")
        .header("x-legacy", HeaderValue::from_bytes(b"caf\xe9").unwrap())
        .body(Body::empty())
        .unwrap();
    let reply = tokio::spawn({
        let app = app.clone();
        async move { app.oneshot(request).await.unwrap() }
    });

    let forwarded = next_request(&agent).await;
    assert_eq!(forwarded.headers.get("x-legacy"), Some("caf\u{e9}"));
    let mut headers = Headers::new();
    headers.append("x-legacy", forwarded.headers.get("x-legacy").unwrap());
    let frame = ResponseFrame::new(forwarded.id, 200, headers, "");
    agent
        .send_frame(&Frame::Response { payload: frame })
        .await
        .unwrap();

    let response = reply.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-legacy"].as_bytes(), b"caf\xe9");
}
