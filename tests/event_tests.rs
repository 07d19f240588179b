mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{TestApp, cookie_value, json_body, location, set_cookie_line};

#[tokio::test]
async fn test_launch_permission_scenario() {
    let app = TestApp::spawn().await;
    let alice = app.sign_up("alice").await;
    let bob = app.sign_up("bob").await;

    let response = app.create_event(&alice, "Launch", "published").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/user/dashboard");
    assert_eq!(
        cookie_value(&response, "flash").as_deref(),
        Some("Event%20created%20successfully")
    );

    let id = app.event_id(&alice, "Launch").await;
    let response = app.get(&format!("/events/{id}"), Some(&alice)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["status"], "published");
    assert_eq!(body["data"]["published_date"], "2025-01-01T00:00");
    assert_eq!(body["data"]["is_editable"], true);

    // bob sees the published event but may not touch it
    let listing = app.dashboard(&bob, None).await;
    let events = listing["data"]["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["title"], "Launch");
    assert_eq!(events[0]["is_editable"], false);

    let denied = "/user/dashboard?error=Permission%20denied";

    let response = app.get(&format!("/events/edit/{id}"), Some(&bob)).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), denied);

    let response = app
        .post_form(
            &format!("/events/update/{id}"),
            &[
                ("title", "Hijacked"),
                ("description", "x"),
                ("start_time", "2025-01-10T10:00"),
                ("end_time", "2025-01-10T11:00"),
                ("location", "x"),
                ("status", "published"),
            ],
            Some(&bob),
        )
        .await;
    assert_eq!(location(&response), denied);

    let response = app
        .post_form(&format!("/events/delete/{id}"), &[], Some(&bob))
        .await;
    assert_eq!(location(&response), denied);

    let response = app.get(&format!("/events/{id}"), Some(&bob)).await;
    assert_eq!(json_body(response).await["data"]["title"], "Launch");

    // the owner can edit
    let response = app.get(&format!("/events/edit/{id}"), Some(&alice)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["form"]["title"], "Launch");
    assert_eq!(body["data"]["form"]["start_time"], "2025-01-10T10:00");
    assert_eq!(body["data"]["event_id"], id.as_str());
}

#[tokio::test]
async fn test_admin_may_edit_any_event() {
    let app = TestApp::spawn().await;
    let alice = app.sign_up("alice").await;
    let admin = app.sign_up_admin("root").await;

    app.create_event(&alice, "Launch", "draft").await;
    let id = app.event_id(&admin, "Launch").await;

    let response = app
        .post_form(
            &format!("/events/update/{id}"),
            &[
                ("title", "Launch"),
                ("description", "Rescheduled"),
                ("start_time", "2025-01-11T10:00"),
                ("end_time", "2025-01-11T12:00"),
                ("location", "Annex"),
                ("status", "published"),
            ],
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/user/dashboard");
    assert_eq!(
        cookie_value(&response, "flash").as_deref(),
        Some("Event%20updated%20successfully")
    );

    let response = app.get(&format!("/events/{id}"), Some(&alice)).await;
    let body = json_body(response).await;
    assert_eq!(body["data"]["description"], "Rescheduled");
    assert_eq!(body["data"]["status"], "published");
    assert_eq!(body["data"]["location"], "Annex");
}

#[tokio::test]
async fn test_visibility_rules() {
    let app = TestApp::spawn().await;
    let alice = app.sign_up("alice").await;
    let bob = app.sign_up("bob").await;
    let admin = app.sign_up_admin("root").await;

    app.create_event(&alice, "Alice draft", "draft").await;
    app.create_event(&bob, "Bob public", "published").await;
    app.create_event(&bob, "Bob draft", "draft").await;

    let titles = |body: serde_json::Value| -> Vec<String> {
        body["data"]["events"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["title"].as_str().unwrap().to_string())
            .collect()
    };

    let mut seen = titles(app.dashboard(&alice, None).await);
    seen.sort();
    assert_eq!(seen, vec!["Alice draft", "Bob public"]);

    let body = app.dashboard(&admin, None).await;
    assert_eq!(body["data"]["is_admin"], true);
    assert_eq!(titles(body).len(), 3);
}

#[tokio::test]
async fn test_dashboard_pagination() {
    let app = TestApp::spawn().await;
    let alice = app.sign_up("alice").await;

    for n in 1..=5 {
        app.clock.advance(chrono::Duration::minutes(1));
        let response = app
            .create_event(&alice, &format!("Event {n}"), "published")
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);
    }

    let first = app.dashboard(&alice, None).await;
    let events = first["data"]["events"].as_array().unwrap();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0]["title"], "Event 5");
    assert_eq!(first["data"]["has_more"], true);
    assert_eq!(first["data"]["next_page"], 2);

    let second = app.dashboard(&alice, Some("2")).await;
    let events = second["data"]["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["title"], "Event 1");
    assert_eq!(second["data"]["has_more"], false);

    for junk in ["abc", "0", "-1"] {
        let body = app.dashboard(&alice, Some(junk)).await;
        assert_eq!(body["data"]["page"], 1, "page={junk}");
    }
}

#[tokio::test]
async fn test_create_errors_redirect_with_form_data() {
    let app = TestApp::spawn().await;
    let alice = app.sign_up("alice").await;

    let response = app
        .post_form(
            "/events/create",
            &[
                ("title", "Backwards"),
                ("description", "Ends before it starts"),
                ("start_time", "2025-01-10T11:00"),
                ("end_time", "2025-01-10T10:00"),
                ("location", "Main hall"),
                ("status", "published"),
            ],
            Some(&alice),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response),
        "/events/new?error=End%20datetime%20must%20be%20after%20start%20datetime"
    );
    let form_data = cookie_value(&response, "form_data").unwrap();

    let response = app
        .get_with_cookies(
            "/events/new?error=x",
            &format!("session_token={alice}; form_data={form_data}"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        set_cookie_line(&response, "form_data")
            .unwrap()
            .contains("Max-Age=0")
    );
    let body = json_body(response).await;
    assert_eq!(body["data"]["form"]["title"], "Backwards");
    assert_eq!(body["data"]["form"]["start_time"], "2025-01-10T11:00");
    assert_eq!(body["data"]["error"], "x");

    let listing = app.dashboard(&alice, None).await;
    assert!(listing["data"]["events"].as_array().unwrap().is_empty());

    let response = app
        .post_form(
            "/events/create",
            &[("title", "Half filled"), ("status", "published")],
            Some(&alice),
        )
        .await;
    assert_eq!(
        location(&response),
        "/events/new?error=Please%20fill%20all%20required%20fields%20correctly"
    );

    let response = app
        .post_form(
            "/events/create",
            &[
                ("title", "Bad time"),
                ("description", "d"),
                ("start_time", "tomorrow"),
                ("end_time", "2025-01-10T10:00"),
                ("location", "l"),
                ("status", "draft"),
            ],
            Some(&alice),
        )
        .await;
    assert_eq!(
        location(&response),
        "/events/new?error=Invalid%20start%20datetime%20format"
    );
}

#[tokio::test]
async fn test_new_event_form_defaults_to_draft() {
    let app = TestApp::spawn().await;
    let alice = app.sign_up("alice").await;

    let response = app.get("/events/new", Some(&alice)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie_line(&response, "form_data").is_none());
    let body = json_body(response).await;
    assert_eq!(body["data"]["form"]["status"], "draft");
    assert_eq!(body["data"]["form"]["title"], "");
}

#[tokio::test]
async fn test_duplicate_title_and_delete_frees_it() {
    let app = TestApp::spawn().await;
    let alice = app.sign_up("alice").await;
    let bob = app.sign_up("bob").await;

    app.create_event(&alice, "Launch", "published").await;
    let response = app.create_event(&bob, "Launch", "published").await;
    assert_eq!(
        location(&response),
        "/events/new?error=Event%20title%20must%20be%20unique"
    );

    let id = app.event_id(&alice, "Launch").await;
    let response = app
        .post_form(&format!("/events/delete/{id}"), &[], Some(&alice))
        .await;
    assert_eq!(location(&response), "/user/dashboard");
    assert_eq!(
        cookie_value(&response, "flash").as_deref(),
        Some("Event%20deleted%20successfully")
    );

    let response = app.get(&format!("/events/{id}"), Some(&alice)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get(&format!("/events/edit/{id}"), Some(&alice)).await;
    assert_eq!(
        location(&response),
        "/user/dashboard?error=Event%20not%20found"
    );

    let response = app.create_event(&bob, "Launch", "published").await;
    assert_eq!(location(&response), "/user/dashboard");
}

#[tokio::test]
async fn test_flash_is_shown_once() {
    let app = TestApp::spawn().await;
    let alice = app.sign_up("alice").await;

    let response = app.create_event(&alice, "Launch", "published").await;
    let flash = cookie_value(&response, "flash").unwrap();

    let response = app
        .get_with_cookies(
            "/user/dashboard",
            &format!("session_token={alice}; flash={flash}"),
        )
        .await;
    assert!(
        set_cookie_line(&response, "flash")
            .unwrap()
            .contains("Max-Age=0")
    );
    let body = json_body(response).await;
    assert_eq!(body["data"]["flash"], "Event created successfully");

    let body = app.dashboard(&alice, None).await;
    assert!(body["data"]["flash"].is_null());
}

#[tokio::test]
async fn test_unknown_event_id_is_not_found() {
    let app = TestApp::spawn().await;
    let alice = app.sign_up("alice").await;

    let response = app.get("/events/not-a-uuid", Some(&alice)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .get(&format!("/events/{}", uuid::Uuid::new_v4()), Some(&alice))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "Event not found");
}

fn multipart_body(boundary: &str, fields: &[(&str, &str)], image: (&str, &[u8])) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    let (filename, bytes) = image;
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[tokio::test]
async fn test_multipart_create_stores_and_serves_image() {
    let app = TestApp::spawn().await;
    let alice = app.sign_up("alice").await;

    let boundary = "eventdeskboundary";
    let body = multipart_body(
        boundary,
        &[
            ("title", "Poster night"),
            ("description", "Bring a poster"),
            ("start_time", "2025-02-01T18:00"),
            ("end_time", "2025-02-01T21:00"),
            ("location", "Gallery"),
            ("status", "published"),
        ],
        ("../../My Poster!.png", b"not really a png"),
    );

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/events/create")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .header(header::COOKIE, format!("session_token={alice}"))
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/user/dashboard");

    let id = app.event_id(&alice, "Poster night").await;
    let response = app.get(&format!("/events/{id}"), Some(&alice)).await;
    let event = json_body(response).await;
    let image = event["data"]["image"].as_str().unwrap().to_string();
    assert!(image.starts_with("/uploads/events/"), "{image}");
    assert!(image.ends_with("_MyPoster.png"), "{image}");

    let response = app.get(&image, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = http_body_util::BodyExt::collect(response.into_body())
        .await
        .unwrap()
        .to_bytes();
    assert_eq!(&bytes[..], b"not really a png");
}
