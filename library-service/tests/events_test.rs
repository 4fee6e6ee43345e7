//! End-to-end flows over the cards and events routes.

mod common;

use axum::http::{header, Method, StatusCode};
use common::{event_body, TestApp};
use library_service::models::permission::{CARDS_WRITE, EVENTS_WRITE};
use serde_json::json;

async fn writer(app: &TestApp) -> String {
    app.activated_user("writer@example.com", &[EVENTS_WRITE, CARDS_WRITE])
        .await
}

async fn create_card(app: &TestApp, token: &str) -> i64 {
    let res = app
        .post("/v1/cards", Some(token), json!({ "title": "Planning" }))
        .await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
    res.body["card"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn create_update_and_delete_event() {
    let app = TestApp::spawn();
    let token = writer(&app).await;
    let card_id = create_card(&app, &token).await;

    let res = app
        .post("/v1/events", Some(&token), event_body(card_id, "Kickoff"))
        .await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
    let id = res.body["event"]["id"].as_i64().unwrap();
    assert_eq!(res.body["event"]["version"], 1);
    assert_eq!(
        res.headers.get(header::LOCATION).unwrap(),
        format!("/v1/events/{}", id).as_str()
    );

    let res = app.get(&format!("/v1/events/{}", id), Some(&token)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["event"]["title"], "Kickoff");
    assert_eq!(res.headers.get(header::VARY).unwrap(), "Authorization");

    let res = app
        .patch(
            &format!("/v1/events/{}", id),
            Some(&token),
            json!({ "title": "Kickoff v2", "version": 1 }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.body["event"]["title"], "Kickoff v2");
    assert_eq!(res.body["event"]["description"], "Quarterly planning session");
    assert_eq!(res.body["event"]["version"], 2);

    let res = app.get(&format!("/v1/cards/{}", card_id), Some(&token)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["card"]["events"][0]["title"], "Kickoff v2");

    let res = app
        .request(Method::DELETE, &format!("/v1/events/{}", id), Some(&token), None)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["message"], "event successfully deleted");

    let res = app.get(&format!("/v1/events/{}", id), Some(&token)).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = app
        .request(Method::DELETE, &format!("/v1/events/{}", id), Some(&token), None)
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stale_version_is_an_edit_conflict() {
    let app = TestApp::spawn();
    let token = writer(&app).await;
    let card_id = create_card(&app, &token).await;

    let res = app
        .post("/v1/events", Some(&token), event_body(card_id, "Review"))
        .await;
    let uri = format!("/v1/events/{}", res.body["event"]["id"]);

    let first = app
        .patch(&uri, Some(&token), json!({ "title": "First", "version": 1 }))
        .await;
    assert_eq!(first.status, StatusCode::OK);

    let second = app
        .patch(&uri, Some(&token), json!({ "title": "Second", "version": 1 }))
        .await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(
        second.body["error"],
        "unable to update the record due to an edit conflict, please try again"
    );

    let res = app.get(&uri, Some(&token)).await;
    assert_eq!(res.body["event"]["title"], "First");
    assert_eq!(res.body["event"]["version"], 2);
}

#[tokio::test]
async fn card_updates_are_versioned() {
    let app = TestApp::spawn();
    let token = writer(&app).await;
    let card_id = create_card(&app, &token).await;
    let uri = format!("/v1/cards/{}", card_id);

    let res = app
        .patch(&uri, Some(&token), json!({ "title": "Renamed" }))
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.body["card"]["title"], "Renamed");
    assert_eq!(res.body["card"]["version"], 2);

    let res = app
        .patch(&uri, Some(&token), json!({ "title": "Again", "version": 1 }))
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_events_are_rejected() {
    let app = TestApp::spawn();
    let token = writer(&app).await;

    let res = app
        .post(
            "/v1/events",
            Some(&token),
            json!({
                "title": "",
                "description": "x",
                "text_blocks": [],
                "date": "2000-01-01",
                "card_id": 1,
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(res.body["error"]["title"].is_string());
    assert!(res.body["error"]["text_blocks"].is_string());
    assert_eq!(res.body["error"]["date"], "must not be in the past");

    // Card 999 does not exist.
    let res = app
        .post("/v1/events", Some(&token), event_body(999, "Orphan"))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(res.body["error"]["card_id"].is_string());

    let res = app
        .request(
            Method::POST,
            "/v1/events",
            Some(&token),
            Some(json!("not an object")),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn listing_pages_and_sorts() {
    let app = TestApp::spawn();
    let token = writer(&app).await;
    let card_id = create_card(&app, &token).await;

    for i in 1..=7 {
        let res = app
            .post(
                "/v1/events",
                Some(&token),
                event_body(card_id, &format!("Standup {}", i)),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
    }

    let res = app
        .get("/v1/events?page=2&page_size=3&sort=-id", Some(&token))
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(
        res.body["metadata"],
        json!({
            "current_page": 2,
            "page_size": 3,
            "first_page": 1,
            "last_page": 3,
            "total_records": 7,
        })
    );
    let titles: Vec<&str> = res.body["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, ["Standup 4", "Standup 3", "Standup 2"]);

    let res = app.get("/v1/events?title=nothing", Some(&token)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["metadata"], json!({}));
    assert_eq!(res.body["events"], json!([]));

    let res = app
        .get("/v1/events?page=0&sort=colour", Some(&token))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["page"], "must be greater than or equal to 1");
    assert_eq!(res.body["error"]["sort"], "invalid sort value");
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let app = TestApp::spawn();
    let token = writer(&app).await;

    for uri in ["/v1/events/0", "/v1/events/abc", "/v1/events/42", "/v1/cards/-3"] {
        let res = app.get(uri, Some(&token)).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND, "{}", uri);
    }
}
