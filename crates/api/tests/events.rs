//! The live change feed at `GET /api/events`

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use common::TestApp;
use helpdesk_shared::{HelpdeskStore, UserRole};
use http_body_util::BodyExt;

async fn next_frame(body: &mut Body) -> String {
    let frame = body.frame().await.unwrap().unwrap();
    let data = frame.into_data().unwrap();
    String::from_utf8(data.to_vec()).unwrap()
}

fn events_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn anonymous_request_is_rejected_before_registering() {
    let app = TestApp::new();

    let response = app.send(events_request("/api/events")).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.state.hub.subscriber_count(), 0);
}

#[tokio::test]
async fn stream_starts_with_connected_and_relays_changes() {
    let app = TestApp::new();
    let tech = app.user("Bruno", UserRole::Technician).await;
    let token = app.token_for(&tech);

    let response = app
        .send(events_request(&format!("/api/events?token={token}")))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    assert_eq!(app.state.hub.subscriber_count(), 1);

    let mut body = response.into_body();
    let connected = next_frame(&mut body).await;
    assert!(connected.starts_with("event: connected\n"), "{connected}");
    assert!(connected.contains("subscriber_id"));

    let ticket_id = app.submit_ticket("Projector").await;
    let created = next_frame(&mut body).await;
    assert!(created.starts_with("event: ticket_created\n"), "{created}");
    assert!(created.contains(&ticket_id.to_string()));

    drop(body);
    assert_eq!(app.state.hub.subscriber_count(), 0);
}

#[tokio::test]
async fn every_subscriber_receives_each_change() {
    let app = TestApp::new();
    let admin = app.user("Ada", UserRole::Admin).await;
    let operator = app.user("Olga", UserRole::Operator).await;

    let mut bodies = Vec::new();
    for user in [&admin, &operator] {
        let request = Request::builder()
            .uri("/api/events")
            .header(header::AUTHORIZATION, format!("Bearer {}", app.token_for(user)))
            .body(Body::empty())
            .unwrap();
        let mut body = app.send(request).await.into_body();
        next_frame(&mut body).await;
        bodies.push(body);
    }
    assert_eq!(app.state.hub.subscriber_count(), 2);

    let ticket_id = app.submit_ticket("Coffee machine").await;
    for body in &mut bodies {
        let frame = next_frame(body).await;
        assert!(frame.contains(&ticket_id.to_string()));
    }
}

#[tokio::test]
async fn late_subscriber_only_sees_changes_after_joining() {
    let app = TestApp::new();
    let admin = app.user("Ada", UserRole::Admin).await;
    let operator = app.user("Olga", UserRole::Operator).await;

    let mut early = app
        .send(events_request(&format!("/api/events?token={}", app.token_for(&operator))))
        .await
        .into_body();
    next_frame(&mut early).await;

    let ticket_id = app.submit_ticket("Badge reader").await;
    let created = next_frame(&mut early).await;
    assert!(created.starts_with("event: ticket_created\n"), "{created}");

    let mut late = app
        .send(events_request(&format!("/api/events?token={}", app.token_for(&admin))))
        .await
        .into_body();
    let connected = next_frame(&mut late).await;
    assert!(connected.starts_with("event: connected\n"), "{connected}");

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/tickets/{ticket_id}"),
            Some(&app.token_for(&admin)),
            Some(serde_json::json!({ "status": "resolved" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    for body in [&mut early, &mut late] {
        let frame = next_frame(body).await;
        assert!(frame.starts_with("event: ticket_updated\n"), "{frame}");
        assert!(frame.contains(&ticket_id.to_string()));
        assert!(frame.contains(r#""status":"resolved""#), "{frame}");
    }
}

#[tokio::test]
async fn session_of_deleted_user_is_refused() {
    let app = TestApp::new();
    let gone = app.user("Gone", UserRole::Technician).await;
    let token = app.token_for(&gone);
    app.store.delete_user(gone.id).await.unwrap();

    let response = app
        .send(events_request(&format!("/api/events?token={token}")))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.state.hub.subscriber_count(), 0);
}

#[tokio::test]
async fn closing_the_hub_ends_open_streams() {
    let app = TestApp::new();
    let tech = app.user("Bruno", UserRole::Technician).await;
    let token = app.token_for(&tech);

    let mut body = app
        .send(events_request(&format!("/api/events?token={token}")))
        .await
        .into_body();
    next_frame(&mut body).await;

    assert_eq!(app.state.hub.close_all(), 1);
    assert!(body.frame().await.is_none());
}
