use super::*;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::Mutex};

fn endpoint_for(page: &str) -> Result<Url, EndpointError> {
    push_endpoint(&Url::parse(page).expect("page url"))
}

#[test]
fn push_endpoint_uses_next_port_on_same_host() {
    assert_eq!(
        endpoint_for("http://192.168.1.5:33000/novels").expect("endpoint").as_str(),
        "ws://192.168.1.5:33001/"
    );
    assert_eq!(
        endpoint_for("https://console.local:8443/").expect("endpoint").as_str(),
        "wss://console.local:8444/"
    );
    assert_eq!(
        endpoint_for("http://[::1]:4000/").expect("endpoint").as_str(),
        "ws://[::1]:4001/"
    );
}

#[test]
fn push_endpoint_falls_back_to_scheme_default_port() {
    assert_eq!(
        endpoint_for("http://localhost/").expect("endpoint").as_str(),
        "ws://localhost:81/"
    );
}

#[test]
fn push_endpoint_rejects_unusable_page_urls() {
    assert!(matches!(
        endpoint_for("ftp://host:21/"),
        Err(EndpointError::UnsupportedScheme(_))
    ));
    assert!(matches!(
        endpoint_for("http://host:65535/"),
        Err(EndpointError::PortOverflow(65535))
    ));
}

#[derive(Clone)]
struct EchoServerState {
    received: Arc<Mutex<Vec<String>>>,
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<EchoServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_session(socket, state))
}

async fn ws_session(mut socket: WebSocket, state: EchoServerState) {
    let _ = socket
        .send(WsMessage::Text(r#"{"echo": "ready\n"}"#.to_string()))
        .await;
    let _ = socket
        .send(WsMessage::Binary(br#"{"progressbar.init": null}"#.to_vec()))
        .await;
    while let Some(Ok(message)) = socket.recv().await {
        if let WsMessage::Text(text) = message {
            state.received.lock().await.push(text);
            let _ = socket.send(WsMessage::Close(None)).await;
            break;
        }
    }
}

async fn spawn_push_server() -> (Url, EchoServerState) {
    let state = EchoServerState {
        received: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/", get(ws_handler))
        .with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let endpoint = Url::parse(&format!("ws://{addr}/")).expect("endpoint");
    (endpoint, state)
}

#[tokio::test]
async fn tungstenite_connector_streams_text_and_sends_outbound() {
    let (endpoint, state) = spawn_push_server().await;

    let mut channel = TungsteniteConnector
        .connect(&endpoint)
        .await
        .expect("connect");

    let first = channel.inbound.next().await.expect("first frame").expect("ok");
    assert_eq!(first, r#"{"echo": "ready\n"}"#);
    let second = channel.inbound.next().await.expect("second frame").expect("ok");
    assert_eq!(second, r#"{"progressbar.init": null}"#);

    channel
        .outbound
        .send(r#"{"hello": true}"#.to_string())
        .expect("queue outbound");

    let closed = tokio::time::timeout(Duration::from_secs(5), channel.inbound.next())
        .await
        .expect("server closes");
    assert!(closed.is_none(), "close frame ends the inbound stream");
    assert_eq!(
        *state.received.lock().await,
        vec![r#"{"hello": true}"#.to_string()]
    );
}

#[tokio::test]
async fn tungstenite_connector_reports_refused_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let endpoint = Url::parse(&format!("ws://{addr}/")).expect("endpoint");
    let result = TungsteniteConnector.connect(&endpoint).await;
    assert!(matches!(result, Err(TransportError::Handshake { .. })));
}
