use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use companion::{
    testing::{bearer, FakeAvatar, FakeLlm, TestApp},
    UpstreamError,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(router: &Router, method: Method, uri: &str, subject: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(subject) = subject {
        request = request.header(header::AUTHORIZATION, bearer(subject));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, body)
}

#[tokio::test]
async fn test_missing_credential_is_401_envelope() {
    let app = TestApp::new(FakeLlm::replying("hi"), FakeAvatar::default()).await;
    let router = app.router();

    let (status, body) = send(&router, Method::GET, "/memory/chats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);
    assert!(body.get("data").is_none());

    let (status, _) = send(&router, Method::GET, "/memory/chats", Some(""), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_is_public() {
    let app = TestApp::new(FakeLlm::replying("hi"), FakeAvatar::default()).await;
    let (status, body) = send(&app.router(), Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["database"], "ok");
}

#[tokio::test]
async fn test_first_auto_greeting_end_to_end() {
    let app = TestApp::new(FakeLlm::replying("Good morning, ada!"), FakeAvatar::default()).await;
    let router = app.router();

    let (status, body) = send(
        &router,
        Method::POST,
        "/memory/ask-auto-avatar",
        Some("ada"),
        Some(json!({ "sessionId": "avatar-session" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["text"], "Good morning, ada!");
    assert_eq!(body["data"]["task_id"], "task-1");
    assert!(app.llm.prompts()[0].contains("Greet the user by name"));

    app.settle().await;
    let (_, body) = send(&router, Method::GET, "/memory/chats", Some("ada"), None).await;
    let turns = body["data"].as_array().unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0]["isFromUser"], false);
    assert_eq!(turns[0]["text"], "Good morning, ada!");
}

#[tokio::test]
async fn test_background_failures_leave_response_alone() {
    let llm = FakeLlm::new(|prompt| {
        if prompt.contains("Extract new information") {
            panic!("insight extractor blew up");
        }
        if prompt.contains("return ONLY a JSON array of reminders") {
            return Err(UpstreamError::new("text generation", "quota exceeded"));
        }
        Ok("That sounds lovely.".to_owned())
    });
    let app = TestApp::new(llm, FakeAvatar::default()).await;
    let router = app.router();

    let (status, body) = send(
        &router,
        Method::POST,
        "/memory/ask-avatar",
        Some("ada"),
        Some(json!({ "message": "I saw my grandson today", "sessionId": "s-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["text"], "That sounds lovely.");

    app.settle().await;
    let (_, body) = send(&router, Method::GET, "/memory/chats", Some("ada"), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    let (_, body) = send(&router, Method::GET, "/reminders", Some("ada"), None).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_avatar_outage_is_500_without_detail() {
    let app = TestApp::new(FakeLlm::replying("Hello"), FakeAvatar::failing()).await;
    let (status, body) = send(
        &app.router(),
        Method::POST,
        "/memory/ask-avatar",
        Some("ada"),
        Some(json!({ "message": "Hi", "sessionId": "s-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "avatar service is unavailable");
}

#[tokio::test]
async fn test_one_active_connection_per_pair() {
    let app = TestApp::new(FakeLlm::replying("hi"), FakeAvatar::default()).await;
    let router = app.router();

    let (_, elder) = send(&router, Method::GET, "/auth/me", Some("elder"), None).await;
    let elderly_id = elder["data"]["id"].as_str().unwrap().to_owned();
    let uri = format!("/connections/request?elderlyId={elderly_id}");

    let (status, first) = send(&router, Method::POST, &uri, Some("carer"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = send(&router, Method::POST, &uri, Some("carer"), None).await;
    assert_eq!(first["data"]["id"], second["data"]["id"]);

    let (_, pending) = send(&router, Method::GET, "/connections/pending", Some("elder"), None).await;
    assert_eq!(pending["data"].as_array().unwrap().len(), 1);

    let connection_id = first["data"]["id"].as_str().unwrap();
    let approve = format!("/connections/approve?connectionId={connection_id}");
    let (status, _) = send(&router, Method::POST, &approve, Some("carer"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, approved) = send(&router, Method::POST, &approve, Some("elder"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["data"]["status"], "approved");

    let (_, again) = send(&router, Method::POST, &uri, Some("carer"), None).await;
    assert_eq!(again["data"]["id"], first["data"]["id"]);

    let locations = format!("/locations?userId={elderly_id}");
    let (status, _) = send(&router, Method::GET, &locations, Some("carer"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&router, Method::GET, &locations, Some("stranger"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_starting_a_new_avatar_session_stops_the_previous_one() {
    let app = TestApp::new(FakeLlm::replying("hi"), FakeAvatar::default()).await;
    let router = app.router();

    for session_id in ["s1", "s2", "s2"] {
        let (status, body) = send(
            &router,
            Method::POST,
            "/heygen/start-session",
            Some("ada"),
            Some(json!({ "sessionId": session_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["session_id"], session_id);
    }
    assert_eq!(app.avatar.stopped(), ["s1"]);

    let (status, _) = send(&router, Method::POST, "/heygen/start-session", Some("ada"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_avatar_details_preview() {
    let app = TestApp::new(FakeLlm::replying("hi"), FakeAvatar::default()).await;
    let (status, body) = send(&app.router(), Method::GET, "/heygen/avatar-details?avatarId=Anna", Some("ada"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["previewImageUrl"], "https://img.example/Anna.webp");

    let (status, _) = send(&app.router(), Method::GET, "/heygen/avatar-details?avatarId=", Some("ada"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let app = TestApp::new(FakeLlm::replying("hi"), FakeAvatar::failing()).await;
    let (status, body) = send(&app.router(), Method::GET, "/heygen/avatar-details?avatarId=Anna", Some("ada"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["previewImageUrl"].is_null());
}
