mod support;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

use support::{register_and_login, spawn_server};

#[tokio::test]
async fn register_login_and_account_errors() {
    let (addr, _shutdown) = spawn_server().await;
    let base = format!("http://{addr}");
    let client = Client::new();

    let registered = client
        .post(format!("{base}/v1/users/register"))
        .json(&json!({"name": "Alice", "email": "alice@example.com", "password": "secret"}))
        .send()
        .await
        .expect("register");
    assert_eq!(registered.status(), StatusCode::CREATED);
    let body = registered.json::<Value>().await.expect("json");
    assert_eq!(body["name"], "Alice");
    assert_eq!(body["email"], "alice@example.com");
    assert!(body.get("password").is_none());

    // 重复邮箱（大小写不同也算同一邮箱）
    let duplicate = client
        .post(format!("{base}/v1/users/register"))
        .json(&json!({"name": "Alice2", "email": "ALICE@example.com", "password": "secret"}))
        .send()
        .await
        .expect("register duplicate");
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let wrong_password = client
        .post(format!("{base}/v1/users/login"))
        .json(&json!({"email": "alice@example.com", "password": "nope"}))
        .send()
        .await
        .expect("login");
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);

    let login = client
        .post(format!("{base}/v1/users/login"))
        .json(&json!({"email": "alice@example.com", "password": "secret"}))
        .send()
        .await
        .expect("login");
    assert_eq!(login.status(), StatusCode::OK);
    let login_body = login.json::<Value>().await.expect("login json");
    assert!(login_body["token"].as_str().is_some());
    assert_eq!(login_body["user"]["email"], "alice@example.com");
}

#[tokio::test]
async fn create_chat_is_idempotent_across_order_and_duplicates() {
    let (addr, _shutdown) = spawn_server().await;
    let base = format!("http://{addr}");
    let client = Client::new();

    let (alice_id, alice_token) =
        register_and_login(&client, &base, "Alice", "alice@example.com").await;
    let (bob_id, bob_token) = register_and_login(&client, &base, "Bob", "bob@example.com").await;

    // Alice 发起，参与者列表里带重复项和她自己
    let created = client
        .post(format!("{base}/v1/chats"))
        .header("authorization", format!("Bearer {alice_token}"))
        .json(&json!({"participants": [bob_id, alice_id, bob_id]}))
        .send()
        .await
        .expect("create chat");
    assert_eq!(created.status(), StatusCode::CREATED);
    let chat = created.json::<Value>().await.expect("chat json");
    let chat_id = chat["id"].as_str().expect("chat id").to_string();
    let participants = chat["participants"].as_array().expect("participants");
    assert_eq!(participants.len(), 2);

    // Bob 用另一个顺序再发起一次，解析到同一个会话
    let existing = client
        .post(format!("{base}/v1/chats"))
        .header("authorization", format!("Bearer {bob_token}"))
        .json(&json!({"participants": [alice_id]}))
        .send()
        .await
        .expect("create chat again");
    assert_eq!(existing.status(), StatusCode::OK);
    let same_chat = existing.json::<Value>().await.expect("chat json");
    assert_eq!(same_chat["id"].as_str(), Some(chat_id.as_str()));

    // 双方的会话列表里都能看到
    for token in [&alice_token, &bob_token] {
        let listed = client
            .get(format!("{base}/v1/chats"))
            .header("authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("list chats")
            .json::<Value>()
            .await
            .expect("list json");
        let chats = listed.as_array().expect("chats array");
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0]["id"].as_str(), Some(chat_id.as_str()));
    }
}

#[tokio::test]
async fn create_chat_rejects_bad_participant_lists() {
    let (addr, _shutdown) = spawn_server().await;
    let base = format!("http://{addr}");
    let client = Client::new();

    let (alice_id, alice_token) =
        register_and_login(&client, &base, "Alice", "alice@example.com").await;

    let empty = client
        .post(format!("{base}/v1/chats"))
        .header("authorization", format!("Bearer {alice_token}"))
        .json(&json!({"participants": []}))
        .send()
        .await
        .expect("create chat");
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    // 归一化后只剩自己一个人
    let self_only = client
        .post(format!("{base}/v1/chats"))
        .header("authorization", format!("Bearer {alice_token}"))
        .json(&json!({"participants": [alice_id]}))
        .send()
        .await
        .expect("create chat");
    assert_eq!(self_only.status(), StatusCode::BAD_REQUEST);

    let unknown = client
        .post(format!("{base}/v1/chats"))
        .header("authorization", format!("Bearer {alice_token}"))
        .json(&json!({"participants": [Uuid::new_v4()]}))
        .send()
        .await
        .expect("create chat");
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_history_enforces_existence_and_membership() {
    let (addr, _shutdown) = spawn_server().await;
    let base = format!("http://{addr}");
    let client = Client::new();

    let (_alice_id, alice_token) =
        register_and_login(&client, &base, "Alice", "alice@example.com").await;
    let (bob_id, _bob_token) = register_and_login(&client, &base, "Bob", "bob@example.com").await;
    let (_carol_id, carol_token) =
        register_and_login(&client, &base, "Carol", "carol@example.com").await;

    let chat = client
        .post(format!("{base}/v1/chats"))
        .header("authorization", format!("Bearer {alice_token}"))
        .json(&json!({"participants": [bob_id]}))
        .send()
        .await
        .expect("create chat")
        .json::<Value>()
        .await
        .expect("chat json");
    let chat_id = chat["id"].as_str().expect("chat id");

    let missing = client
        .get(format!("{base}/v1/chats/{}/messages", Uuid::new_v4()))
        .header("authorization", format!("Bearer {alice_token}"))
        .send()
        .await
        .expect("history");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    // Carol 不在参与者集合里
    let forbidden = client
        .get(format!("{base}/v1/chats/{chat_id}/messages"))
        .header("authorization", format!("Bearer {carol_token}"))
        .send()
        .await
        .expect("history");
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    // 空会话：一页空消息，合法分页元数据
    let empty = client
        .get(format!("{base}/v1/chats/{chat_id}/messages"))
        .header("authorization", format!("Bearer {alice_token}"))
        .send()
        .await
        .expect("history");
    assert_eq!(empty.status(), StatusCode::OK);
    let history = empty.json::<Value>().await.expect("history json");
    assert_eq!(history["messages"].as_array().expect("messages").len(), 0);
    assert_eq!(history["currentPage"], 1);
    assert_eq!(history["totalPages"], 0);
    assert_eq!(history["totalMessages"], 0);
}

#[tokio::test]
async fn chat_endpoints_require_a_token() {
    let (addr, _shutdown) = spawn_server().await;
    let base = format!("http://{addr}");
    let client = Client::new();

    let listed = client
        .get(format!("{base}/v1/chats"))
        .send()
        .await
        .expect("list chats");
    assert_eq!(listed.status(), StatusCode::UNAUTHORIZED);

    let created = client
        .post(format!("{base}/v1/chats"))
        .json(&json!({"participants": [Uuid::new_v4()]}))
        .send()
        .await
        .expect("create chat");
    assert_eq!(created.status(), StatusCode::UNAUTHORIZED);
}
