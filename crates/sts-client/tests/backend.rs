//! Client tests against an in-process mock of the backend API.

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use sts_client::{
    ApiClient, ClientConfig, ClientError, CreateServerRequest, PortMapping, ServerType,
    StreamEvent, UploadFile,
};

#[derive(Default)]
struct MockState {
    filetree_queries: Mutex<Vec<String>>,
    uploaded_bytes: AtomicUsize,
    close_frames: AtomicUsize,
    deleted: Mutex<Vec<String>>,
}

type Shared = Arc<MockState>;

fn container(id: &str, kind: &str) -> Value {
    json!({
        "container_id": id,
        "name": format!("simple-test-server-{}-0", kind.to_lowercase()),
        "image": "image:latest",
        "created_at": 1_700_000_000_000_i64,
        "status": 1,
        "ports": {"8080": 80},
        "env": {},
        "networks": [],
        "type": kind,
    })
}

async fn list_containers() -> Json<Value> {
    Json(json!([container("a", "MQTT"), container("b", "FTP")]))
}

async fn get_container(Path(id): Path<String>) -> Response {
    if id == "missing" {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(container(&id, "WEB")).into_response()
}

async fn delete_container(State(state): State<Shared>, Path(id): Path<String>) -> StatusCode {
    state.deleted.lock().unwrap().push(id);
    StatusCode::NO_CONTENT
}

async fn server_template(Path(kind): Path<String>) -> Response {
    if kind != "MQTT" {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({
        "name": "mqtt",
        "image": "simple-test-server-custom-mqtt:latest",
        "ports": [1883, 9001],
        "env": {"MQTT_USERNAME": "user"}
    }))
    .into_response()
}

async fn create_server(Path(_kind): Path<String>, Json(body): Json<Value>) -> Response {
    if body["ports"][0]["1883"] != 1883 {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "Invalid configuration"})))
            .into_response();
    }
    (StatusCode::ACCEPTED, Json(json!({"reqId": "req-1"}))).into_response()
}

async fn progress(
    Path(_req): Path<String>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let events: Vec<Result<Event, Infallible>> = vec![
        Ok(Event::default().comment("keepalive")),
        Ok(Event::default().data(r#"{"percent":10,"message":"starting","error":false}"#)),
        Ok(Event::default().data("not json")),
        Ok(Event::default().data(r#"{"percent":50,"message":"pulling","error":false}"#)),
        Ok(Event::default().data(r#"{"percent":100,"message":"done","error":false}"#)),
        Ok(Event::default().data(r#"{"percent":100,"message":"after end","error":false}"#)),
    ];
    Sse::new(futures::stream::iter(events))
}

async fn filetree(
    State(state): State<Shared>,
    Path((_kind, _id)): Path<(String, String)>,
    Query(query): Query<std::collections::HashMap<String, String>>,
) -> Json<Value> {
    let path = query.get("path").cloned().unwrap_or_default();
    state.filetree_queries.lock().unwrap().push(path.clone());
    Json(json!({
        "entries": [
            {
                "name": "index.html",
                "path": format!("{path}index.html"),
                "type": "file",
                "size": 12,
                "modifiedAt": "2024-01-01T00:00:00Z"
            },
            {
                "name": "assets",
                "path": format!("{path}assets"),
                "type": "dir",
                "size": 0,
                "modifiedAt": "2024-01-01T00:00:00Z"
            }
        ],
        "truncated": false
    }))
}

async fn logs(
    Path((_kind, _id)): Path<(String, String)>,
    Query(query): Query<std::collections::HashMap<String, String>>,
) -> Json<Value> {
    let tail: usize = query.get("tail").and_then(|t| t.parse().ok()).unwrap_or(0);
    let lines: Vec<Value> = (0..tail.min(3))
        .map(|i| json!({"ts": "2024-01-01T00:00:00Z", "line": format!("GET /{i}")}))
        .collect();
    Json(json!({"lines": lines, "truncated": tail < 3, "container_running": true}))
}

async fn mail_messages(Path(_id): Path<String>) -> Json<Value> {
    Json(json!({"emails": [{
        "id": "m1",
        "from": {"name": "alice", "domain": "example.com"},
        "to": [{"name": "bob", "domain": "example.com"}],
        "created": "2024-01-01T00:00:00Z",
        "content": {"headers": {"Subject": ["Hello"]}, "size": 42, "body": "Hi Bob"}
    }]}))
}

async fn upload(
    State(state): State<Shared>,
    Path((kind, id)): Path<(String, String)>,
    mut multipart: Multipart,
) -> Response {
    if id == "reject" {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "file type not allowed"})))
            .into_response();
    }
    let mut name = String::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            name = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.unwrap_or_default();
            state.uploaded_bytes.fetch_add(data.len(), Ordering::SeqCst);
        }
    }
    (
        StatusCode::CREATED,
        Json(json!({"url": format!("http://localhost:8080/{kind}/{name}")})),
    )
        .into_response()
}

async fn mqtt_socket(State(state): State<Shared>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| mqtt_session(socket, state))
}

async fn mqtt_session(mut socket: WebSocket, state: Shared) {
    let frames = [
        r#"{"topic":"sensors/temp","payload":"23.5","timestamp":"t1"}"#,
        "{not json",
        r#"{"topic":"sensors/humidity","payload":"65"}"#,
    ];
    for frame in frames {
        if socket.send(Message::Text(frame.into())).await.is_err() {
            return;
        }
    }
    while let Some(Ok(message)) = socket.recv().await {
        if let Message::Close(_) = message {
            state.close_frames.fetch_add(1, Ordering::SeqCst);
        }
    }
}

async fn otel_socket(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(|mut socket| async move {
        let _ = socket
            .send(Message::Text(r#"{"resourceSpans":[]}"#.into()))
            .await;
        let _ = socket.send(Message::Close(None)).await;
    })
}

async fn spawn_backend() -> (ApiClient, Shared) {
    let state: Shared = Arc::new(MockState::default());
    let api = Router::new()
        .route("/containers", get(list_containers))
        .route("/containers/{id}", get(get_container).delete(delete_container))
        .route("/servers/progress/{req}", get(progress))
        .route("/servers/{kind}", get(server_template).post(create_server))
        .route("/protocols/{kind}/{id}/filetree", get(filetree))
        .route("/protocols/{kind}/{id}/logs", get(logs))
        .route("/protocols/{kind}/{id}/upload", post(upload))
        .route("/protocols/mail/{id}/messages", get(mail_messages))
        .route("/protocols/mqtt/{id}/messages", get(mqtt_socket))
        .route("/protocols/otel/{id}/telemetry", get(otel_socket));
    let app = Router::new().nest("/api/v1", api).with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = ClientConfig::new(&format!("http://{addr}"))
        .unwrap()
        .with_upload_chunk_size(4);
    (ApiClient::new(config).unwrap(), state)
}

#[tokio::test]
async fn lists_and_inspects_containers() {
    let (client, _) = spawn_backend().await;

    let containers = client.list_containers().await.unwrap();
    assert_eq!(containers.len(), 2);
    assert_eq!(containers[0].server_type, ServerType::Mqtt);
    assert_eq!(containers[1].server_type, ServerType::Ftp);

    let one = client.get_container("xyz").await.unwrap();
    assert_eq!(one.container_id, "xyz");
    assert_eq!(one.server_type, ServerType::Web);
}

#[tokio::test]
async fn non_success_status_is_reported_with_code() {
    let (client, _) = spawn_backend().await;
    let err = client.get_container("missing").await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn delete_container_hits_backend() {
    let (client, state) = spawn_backend().await;
    client.delete_container("abc").await.unwrap();
    assert_eq!(*state.deleted.lock().unwrap(), vec!["abc".to_string()]);
}

#[tokio::test]
async fn template_and_create_server() {
    let (client, _) = spawn_backend().await;

    let template = client.server_template(ServerType::Mqtt).await.unwrap();
    assert_eq!(template.ports, vec![1883, 9001]);

    let err = client.server_template(ServerType::Web).await.unwrap_err();
    assert_eq!(err.status(), Some(404));

    let request = CreateServerRequest {
        name: "mqtt-0".into(),
        image: template.image,
        ports: vec![PortMapping { host: 1883, container: 1883 }],
        env: template.env,
    };
    let created = client.create_server(ServerType::Mqtt, &request).await.unwrap();
    assert_eq!(created.req_id, "req-1");
}

#[tokio::test]
async fn file_tree_logs_and_mail() {
    let (client, state) = spawn_backend().await;

    let root = client.file_tree(ServerType::Web, "w1", None).await.unwrap();
    assert_eq!(root.entries.len(), 2);
    assert!(root.entries[1].is_dir());
    client.file_tree(ServerType::Web, "w1", Some("assets/")).await.unwrap();
    assert_eq!(
        *state.filetree_queries.lock().unwrap(),
        vec![String::new(), "assets/".to_string()]
    );

    let logs = client.logs(ServerType::Web, "w1", 2).await.unwrap();
    assert_eq!(logs.lines.len(), 2);
    assert!(logs.truncated);
    assert!(logs.container_running);

    let mails = client.mail_messages("m").await.unwrap();
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0].subject(), "Hello");
}

#[tokio::test]
async fn upload_reports_monotonic_progress_and_resolves_url() {
    let (client, state) = spawn_backend().await;
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    let on_progress: sts_client::ProgressFn = Arc::new(move |pct| sink.lock().unwrap().push(pct));

    let file = UploadFile::new("hello.txt", &b"hello world, hi"[..]);
    let res = client
        .upload_file("server-1", file, ServerType::Web, Some(on_progress))
        .await
        .unwrap();

    assert_eq!(res.url, "http://localhost:8080/web/hello.txt");
    assert_eq!(state.uploaded_bytes.load(Ordering::SeqCst), 15);

    let calls = calls.lock().unwrap();
    assert!(!calls.is_empty());
    assert!(calls.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(calls.last(), Some(&100));
}

#[tokio::test]
async fn upload_rejection_carries_status_and_body() {
    let (client, _) = spawn_backend().await;
    let file = UploadFile::new("evil.exe", &b"MZ"[..]);
    let err = client
        .upload_file("reject", file, ServerType::Ftp, None)
        .await
        .unwrap_err();

    match &err {
        ClientError::Status { status, body } => {
            assert_eq!(*status, 400);
            assert!(body.contains("file type not allowed"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("400"));
}

#[tokio::test]
async fn mqtt_stream_drops_malformed_frames() {
    let (client, _) = spawn_backend().await;
    let mut stream = client.mqtt_messages("broker").unwrap();

    assert_eq!(stream.next().await, Some(StreamEvent::Connected));
    let first = stream.next().await;
    let second = stream.next().await;
    match (first, second) {
        (Some(StreamEvent::Item(a)), Some(StreamEvent::Item(b))) => {
            assert_eq!(a.topic, "sensors/temp");
            assert_eq!(a.timestamp.as_deref(), Some("t1"));
            assert_eq!(b.topic, "sensors/humidity");
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn closing_stream_sends_one_close_frame() {
    let (client, state) = spawn_backend().await;
    let mut stream = client.mqtt_messages("broker").unwrap();
    assert_eq!(stream.next().await, Some(StreamEvent::Connected));

    stream.close();
    stream.close();
    assert_eq!(stream.next().await, None);
    drop(stream);

    for _ in 0..50 {
        if state.close_frames.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(state.close_frames.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn otel_stream_ends_with_disconnect() {
    let (client, _) = spawn_backend().await;
    let mut stream = client.otel_telemetry("collector").unwrap();

    assert_eq!(stream.next().await, Some(StreamEvent::Connected));
    match stream.next().await {
        Some(StreamEvent::Item(value)) => assert!(value.get("resourceSpans").is_some()),
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(stream.next().await, Some(StreamEvent::Disconnected));
}

#[tokio::test]
async fn progress_stream_stops_at_terminal_event() {
    let (client, _) = spawn_backend().await;
    let mut stream = client.watch_progress("req-1").unwrap();

    let mut percents = Vec::new();
    let mut saw_disconnect = false;
    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Connected => {}
            StreamEvent::Item(progress) => percents.push(progress.percent),
            StreamEvent::Error(err) => panic!("unexpected error: {err}"),
            StreamEvent::Disconnected => {
                saw_disconnect = true;
                break;
            }
        }
    }

    assert_eq!(percents, vec![10, 50, 100]);
    assert!(saw_disconnect);
}
