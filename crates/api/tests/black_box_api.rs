use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use futures::{SinkExt, StreamExt};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use stockflow_api::AppConfig;
use stockflow_auth::JwtClaims;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    ws_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        // Same router as prod, in-memory backends, ephemeral port.
        let config = AppConfig {
            jwt_secret: jwt_secret.to_string(),
            ..AppConfig::default()
        };
        let app = stockflow_api::app::build_app(&config)
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            ws_url: format!("ws://{addr}"),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn connect(&self, room: &str, client: &str) -> Socket {
        let (socket, _) = tokio_tungstenite::connect_async(format!(
            "{}/ws?roomID={room}&clientID={client}",
            self.ws_url
        ))
        .await
        .expect("websocket connect failed");
        socket
    }

    /// Block until the registry reports `expected` members in `room`.
    async fn wait_for_members(&self, client: &reqwest::Client, room: &str, expected: u64) {
        let token = mint_jwt(SECRET, "observer");
        for _ in 0..100 {
            let body: Value = client
                .get(self.url("/ws/room"))
                .bearer_auth(&token)
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            if body["data"][room].as_u64().unwrap_or(0) == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("room {room} never reached {expected} members");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, subject: &str) -> String {
    let now = Utc::now();
    let claims = JwtClaims::new(subject, now, now + ChronoDuration::minutes(10));

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

/// Next text frame as JSON, skipping control frames.
async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("frame is not JSON");
        }
    }
}

async fn assert_silent(socket: &mut Socket) {
    let waited = tokio::time::timeout(Duration::from_millis(200), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return text,
                Some(Ok(_)) => continue,
                _ => return String::new(),
            }
        }
    })
    .await;
    assert!(waited.is_err(), "unexpected frame: {waited:?}");
}

async fn post(client: &reqwest::Client, url: String, body: Value) -> (StatusCode, Value) {
    let res = client.post(url).json(&body).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap_or(Value::Null))
}

async fn get(client: &reqwest::Client, url: String) -> (StatusCode, Value) {
    let res = client.get(url).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap_or(Value::Null))
}

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();

    let (status, body) = get(&client, server.url("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["backend"], "in_memory");
}

#[tokio::test]
async fn warehouse_crud_round_trip() {
    let server = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();

    let (status, created) = post(
        &client,
        server.url("/warehouses"),
        json!({ "name": "Main", "location": "Seoul" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["data"]["id"].as_u64().unwrap();

    let (status, fetched) = get(&client, server.url(&format!("/warehouses/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["data"]["name"], "Main");

    let (_, listed) = get(&client, server.url("/warehouses")).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    let (_, filtered) = get(&client, server.url("/warehouses?location=busan")).await;
    assert!(filtered["data"].as_array().unwrap().is_empty());

    let res = client
        .delete(server.url(&format!("/warehouses/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let (status, body) = get(&client, server.url(&format!("/warehouses/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let server = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();

    let (status, body) = post(&client, server.url("/products"), json!({ "name": "", "sku": "X-1" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = post(&client, server.url("/products"), json!({ "name": "Bolt", "sku": "X-1" })).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = post(&client, server.url("/products"), json!({ "name": "Nut", "sku": "X-1" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, body) = get(&client, server.url("/products/abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");

    let (status, _) = get(&client, server.url("/products/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post(
        &client,
        server.url("/inventory"),
        json!({ "warehouse_id": 41, "product_id": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post(
        &client,
        server.url("/transactions"),
        json!({ "inventory_id": 7, "type": "IN", "quantity": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn movements_drive_quantity_and_dashboard() {
    let server = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();

    let (_, w) = post(&client, server.url("/warehouses"), json!({ "name": "Main", "location": "Seoul" })).await;
    let (_, p) = post(&client, server.url("/products"), json!({ "name": "Bolt", "sku": "B-1" })).await;
    let (status, inv) = post(
        &client,
        server.url("/inventory"),
        json!({ "warehouse_id": w["data"]["id"], "product_id": p["data"]["id"] }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(inv["data"]["quantity"], 0);
    let inventory_id = inv["data"]["id"].as_u64().unwrap();

    for (kind, qty, expected) in [("IN", 10, 10), ("OUT", 5, 5), ("ADJUST", 30, 30)] {
        let (status, body) = post(
            &client,
            server.url("/transactions"),
            json!({ "inventory_id": inventory_id, "type": kind, "quantity": qty }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{kind}");
        assert_eq!(body["data"]["inventory"]["quantity"], expected, "{kind}");
        assert_eq!(body["data"]["movement"]["type"], kind);
    }

    let (status, body) = post(
        &client,
        server.url("/transactions"),
        json!({ "inventory_id": inventory_id, "type": "OUT", "quantity": 0 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (_, row) = get(&client, server.url(&format!("/inventory/{inventory_id}"))).await;
    assert_eq!(row["data"]["quantity"], 30);

    let (_, all) = get(&client, server.url(&format!("/transactions?inventory_id={inventory_id}"))).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 3);
    let (_, outs) = get(&client, server.url("/transactions?type=out")).await;
    assert_eq!(outs["data"].as_array().unwrap().len(), 1);
    let (status, _) = get(&client, server.url("/transactions?type=SELL")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, counts) = get(&client, server.url("/dashboard/counts")).await;
    assert_eq!(
        counts["data"],
        json!({
            "warehouses": 1,
            "products": 1,
            "inventory": 1,
            "transactions": 3,
            "zero_quantity_inventory": 0,
        })
    );

    let (_, recent) = get(&client, server.url("/dashboard/transactions/recent?limit=2")).await;
    let recent = recent["data"].as_array().unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0]["type"], "ADJUST");
}

#[tokio::test]
async fn room_occupancy_requires_a_valid_token() {
    let server = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/ws/room")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(server.url("/ws/room"))
        .bearer_auth(mint_jwt("other-secret", "mallory"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(server.url("/ws/room"))
        .bearer_auth(mint_jwt(SECRET, "alice"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"], json!({}));

    let res = client
        .get(server.url("/whoami"))
        .bearer_auth(mint_jwt(SECRET, "alice"))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["subject"], "alice");
}

#[tokio::test]
async fn socket_requires_room_and_client_ids() {
    let server = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();

    let (status, body) = get(&client, server.url("/ws?roomID=R")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_connect");

    let (status, _) = get(&client, server.url("/ws?roomID=&clientID=a")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn room_members_see_joins_updates_and_leaves() {
    let server = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();

    let mut a = server.connect("R", "a").await;
    server.wait_for_members(&client, "R", 1).await;

    let mut b = server.connect("R", "b").await;
    let joined = next_json(&mut a).await;
    assert_eq!(joined["action"], "join");
    assert_eq!(joined["clientID"], "b");
    assert_eq!(joined["data"], 2);

    let update = json!({ "action": "update", "roomID": "R", "clientID": "b", "data": { "row": 3 } });
    b.send(Message::Text(update.to_string())).await.unwrap();

    let relayed = next_json(&mut a).await;
    assert_eq!(relayed, update);
    assert_silent(&mut b).await;

    b.send(Message::Text("{not json".into())).await.unwrap();
    let error = next_json(&mut b).await;
    assert_eq!(error["action"], "error");
    assert_silent(&mut a).await;

    b.close(None).await.unwrap();
    let left = next_json(&mut a).await;
    assert_eq!(left["action"], "leave");
    assert_eq!(left["data"], 1);

    a.close(None).await.unwrap();
    server.wait_for_members(&client, "R", 0).await;
}

#[tokio::test]
async fn mutations_notify_rooms_except_the_originator() {
    let server = TestServer::spawn(SECRET).await;
    let client = reqwest::Client::new();

    let mut watcher = server.connect("warehouse", "watcher").await;
    server.wait_for_members(&client, "warehouse", 1).await;

    let res = client
        .post(server.url("/warehouses"))
        .header("X-Client-ID", "editor")
        .json(&json!({ "name": "Main", "location": "Seoul" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let notice = next_json(&mut watcher).await;
    assert_eq!(notice["action"], "update");
    assert_eq!(notice["roomID"], "warehouse");
    assert_eq!(notice["clientID"], "editor");
    assert_eq!(notice["data"]["kind"], "warehouse");
    assert_eq!(notice["data"]["op"], "created");

    let res = client
        .post(server.url("/warehouses"))
        .header("X-Client-ID", "watcher")
        .json(&json!({ "name": "Annex", "location": "Busan" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_silent(&mut watcher).await;
}
