// till-client/tests/http_service.rs
// HttpOrderService against a canned local HTTP responder

use rust_decimal::Decimal;
use shared::error::ErrorCode;
use shared::order::{OrderType, StagedOrderPatch};
use till_client::{ClientConfig, ClientError, HttpOrderService, OrderService};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Captured request line, headers and body
struct Captured {
    head: String,
    body: String,
}

/// Serve exactly one request with the given status and body
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|l| {
                let (k, v) = l.split_once(':')?;
                k.eq_ignore_ascii_case("content-length")
                    .then(|| v.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let req_body = String::from_utf8_lossy(&buf[header_end..]).to_string();

        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();

        Captured {
            head,
            body: req_body,
        }
    });

    (format!("http://{}", addr), handle)
}

fn service(base_url: &str) -> HttpOrderService {
    ClientConfig::new(base_url)
        .with_token("secret")
        .with_timeout(5)
        .build_http_service()
        .unwrap()
}

#[tokio::test]
async fn test_create_staged_order() {
    let (url, server) = serve_once("200 OK", r#"{"code":0,"message":"OK","data":{"id":"so-1"}}"#).await;

    let created = service(&url)
        .create_staged_order(OrderType::Counter)
        .await
        .unwrap();
    assert_eq!(created.id, "so-1");

    let captured = server.await.unwrap();
    assert!(captured.head.starts_with("POST /api/staged-orders HTTP/1.1"));
    assert!(captured
        .head
        .to_ascii_lowercase()
        .contains("authorization: bearer secret"));
    assert_eq!(captured.body, r#"{"order_type":"COUNTER"}"#);
}

#[tokio::test]
async fn test_get_staged_order_snapshot() {
    let (url, server) = serve_once(
        "200 OK",
        r#"{"code":0,"message":"OK","data":{
            "id":"so-1","order_type":"COUNTER","items":[],
            "subtotal":500000,"discount":30000,"total":470000,"updated_at":1
        }}"#,
    )
    .await;

    let snap = service(&url).get_staged_order("so-1").await.unwrap();
    assert_eq!(snap.total, Decimal::from(470_000));
    assert!(snap.totals_consistent());

    let captured = server.await.unwrap();
    assert!(captured.head.starts_with("GET /api/staged-orders/so-1 HTTP/1.1"));
}

#[tokio::test]
async fn test_update_sends_explicit_null() {
    let (url, server) = serve_once("200 OK", r#"{"code":0,"message":"OK"}"#).await;

    let patch = StagedOrderPatch {
        promotion_code: Some(None),
        note: Some("gift".into()),
        ..Default::default()
    };
    service(&url)
        .update_staged_order("so-1", &patch)
        .await
        .unwrap();

    let captured = server.await.unwrap();
    assert!(captured.head.starts_with("PATCH /api/staged-orders/so-1 HTTP/1.1"));
    assert_eq!(captured.body, r#"{"promotion_code":null,"note":"gift"}"#);
}

#[tokio::test]
async fn test_unknown_promotion_is_not_found() {
    let (url, server) = serve_once(
        "404 Not Found",
        r#"{"code":6001,"message":"Promotion code not found"}"#,
    )
    .await;

    let err = service(&url).resolve_promotion("NOPE").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.error_code(), Some(ErrorCode::PromotionNotFound));
    assert!(!err.is_transient());

    let captured = server.await.unwrap();
    assert_eq!(captured.body, r#"{"code":"NOPE"}"#);
}

#[tokio::test]
async fn test_envelope_error_with_ok_status() {
    let (url, _server) = serve_once(
        "200 OK",
        r#"{"code":4007,"message":"Status transition is not allowed"}"#,
    )
    .await;

    let err = service(&url).get_finalized_order("o-1").await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (url, _server) = serve_once("502 Bad Gateway", "upstream down").await;

    let err = service(&url).list_staged_orders().await.unwrap_err();
    assert!(matches!(err, ClientError::Server { status: 502, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_connection_refused_is_transient() {
    // Bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = service(&format!("http://{}", addr))
        .delete_staged_order("so-1")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Http(_)));
    assert!(err.is_transient());
}
