mod common;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::StatusCode;
use serde_json::Value;

use common::{content_range, TestServer, BROKEN_USER};
use iot_message_api::database::models::{AggregatedData, Message, NewMessage};

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()
}

async fn add(server: &TestServer, client_id: &str, kind: &str, minute: u32) -> Message {
    server
        .store
        .insert(NewMessage {
            topic: format!("site/{}/{}", client_id, kind),
            payload: format!("{{\"minute\":{}}}", minute),
            client_id: client_id.to_string(),
            timestamp: Some(at(minute)),
            ..Default::default()
        })
        .await
}

/// dev-1: 5 telemetry messages (minutes 0..5), dev-2: 1 status, dev-3: 2 alerts
async fn seeded() -> Result<TestServer> {
    let server = TestServer::spawn().await?;
    for minute in 0..5 {
        add(&server, "dev-1", "telemetry", minute).await;
    }
    add(&server, "dev-2", "status", 10).await;
    add(&server, "dev-3", "alert", 20).await;
    add(&server, "dev-3", "alert", 21).await;
    Ok(server)
}

fn client_ids(items: &[Value]) -> Vec<&str> {
    items.iter().filter_map(|m| m["client_id"].as_str()).collect()
}

#[tokio::test]
async fn list_returns_only_permitted_devices_with_content_range() -> Result<()> {
    let server = seeded().await?;

    let res = server.get_as("alice", "/api/message").await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(content_range(&res), "items 0-5/6");

    let items = res.json::<Vec<Value>>().await?;
    assert_eq!(items.len(), 6);
    assert!(client_ids(&items).iter().all(|c| *c == "dev-1" || *c == "dev-2"));
    // Default sort is newest first
    assert_eq!(items[0]["client_id"], "dev-2");
    assert_eq!(items[0]["type"], "status");
    Ok(())
}

#[tokio::test]
async fn list_applies_range_sort_and_filter() -> Result<()> {
    let server = seeded().await?;

    let res = server
        .get_query_as(
            "alice",
            "/api/message",
            &[
                ("range", "[1,2]"),
                ("sort", r#"["timestamp","ASC"]"#),
                ("filter", r#"{"client_id":"dev-1"}"#),
            ],
        )
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(content_range(&res), "items 1-2/5");

    let items = res.json::<Vec<Value>>().await?;
    let payloads: Vec<&str> = items.iter().filter_map(|m| m["payload"].as_str()).collect();
    assert_eq!(payloads, vec![r#"{"minute":1}"#, r#"{"minute":2}"#]);
    Ok(())
}

#[tokio::test]
async fn list_filter_cannot_widen_the_permitted_set() -> Result<()> {
    let server = seeded().await?;

    let res = server
        .get_query_as("alice", "/api/message", &[("filter", r#"{"client_id":"dev-3"}"#)])
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(content_range(&res), "items 0--1/0");
    assert!(res.json::<Vec<Value>>().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn page_past_the_end_is_empty_with_total() -> Result<()> {
    let server = seeded().await?;

    let res = server
        .get_query_as("alice", "/api/message", &[("range", "[50,59]")])
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(content_range(&res), "items 50-49/6");
    Ok(())
}

#[tokio::test]
async fn malformed_list_parameters_are_bad_requests() -> Result<()> {
    let server = seeded().await?;

    for (key, value) in [
        ("range", "[5,1]"),
        ("range", "first"),
        ("range", "[0,9223372036854775807]"),
        ("sort", r#"["timestamp"]"#),
        ("filter", r#"{"$where":"1"}"#),
        ("filter", r#"{"client_id":{"$regex":"dev"}}"#),
        ("filter", "[1,2]"),
    ] {
        let res = server.get_query_as("alice", "/api/message", &[(key, value)]).await?;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{}={}", key, value);
        let body = res.json::<Value>().await?;
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }
    Ok(())
}

#[tokio::test]
async fn caller_without_devices_is_forbidden() -> Result<()> {
    let server = seeded().await?;

    let res = server.get_as("bob", "/api/message").await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(res.json::<Value>().await?["code"], "ACCESS_DENIED");

    // Unknown to the access service altogether
    let res = server.get_as("mallory", "/api/message/topic?topic=site").await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn access_service_failure_is_a_server_error() -> Result<()> {
    let server = seeded().await?;

    let res = server.get_as(BROKEN_USER, "/api/message").await?;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = res.json::<Value>().await?;
    assert_eq!(body["code"], "INTERNAL_SERVER_ERROR");
    assert!(!body["error"].as_str().unwrap_or_default().contains("boom"));
    Ok(())
}

#[tokio::test]
async fn get_by_id_checks_owner() -> Result<()> {
    let server = seeded().await?;
    let own = add(&server, "dev-1", "event", 30).await;
    let foreign = add(&server, "dev-3", "event", 31).await;

    let res = server.get_as("alice", &format!("/api/message/{}", own.id)).await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    assert_eq!(body["id"], own.id.as_str());
    assert_eq!(body["type"], "event");

    let res = server.get_as("alice", &format!("/api/message/{}", foreign.id)).await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = server.get_as("carol", &format!("/api/message/{}", foreign.id)).await?;
    assert_eq!(res.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn get_by_id_validates_and_reports_missing() -> Result<()> {
    let server = seeded().await?;

    let res = server.get_as("alice", "/api/message/not-an-object-id").await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = server.get_as("alice", "/api/message/ffffffffffffffffffffffff").await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.json::<Value>().await?["code"], "NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn device_listing_requires_membership() -> Result<()> {
    let server = seeded().await?;

    let res = server
        .get_query_as("alice", "/api/message/device/dev-1", &[("range", "[0,1]")])
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(content_range(&res), "items 0-1/5");
    let items = res.json::<Vec<Value>>().await?;
    assert_eq!(client_ids(&items), vec!["dev-1", "dev-1"]);

    let res = server.get_as("alice", "/api/message/device/dev-3").await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn latest_for_device_is_newest_first_and_limited() -> Result<()> {
    let server = seeded().await?;

    let res = server.get_as("alice", "/api/message/device/dev-1/latest?limit=2").await?;
    assert_eq!(res.status(), StatusCode::OK);
    let items = res.json::<Vec<Message>>().await?;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].timestamp, at(4));
    assert_eq!(items[1].timestamp, at(3));

    let res = server.get_as("alice", "/api/message/device/dev-1/latest?limit=0").await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = server.get_as("alice", "/api/message/device/dev-3/latest").await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn topic_search_is_scoped_to_permitted_devices() -> Result<()> {
    let server = seeded().await?;
    // Same topic published by a device alice does not own
    server
        .store
        .insert(NewMessage {
            topic: "site/dev-1/telemetry".into(),
            payload: "{}".into(),
            client_id: "dev-3".into(),
            timestamp: Some(at(40)),
            ..Default::default()
        })
        .await;

    let res = server
        .get_query_as("alice", "/api/message/topic", &[("topic", "site/dev-1/telemetry"), ("limit", "3")])
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let items = res.json::<Vec<Message>>().await?;
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|m| m.client_id == "dev-1"));
    assert_eq!(items[0].timestamp, at(4));

    let res = server.get_as("alice", "/api/message/topic").await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(res.json::<Value>().await?["field_errors"]["topic"].is_string());
    Ok(())
}

#[tokio::test]
async fn window_is_inclusive_and_validated() -> Result<()> {
    let server = seeded().await?;

    let res = server
        .get_query_as(
            "alice",
            "/api/message/window",
            &[("from", "2024-05-01T10:01:00Z"), ("to", "2024-05-01T10:03:00Z")],
        )
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let items = res.json::<Vec<Message>>().await?;
    let times: Vec<_> = items.iter().map(|m| m.timestamp).collect();
    assert_eq!(times, vec![at(3), at(2), at(1)]);

    let res = server
        .get_query_as(
            "alice",
            "/api/message/window",
            &[("from", "2024-05-01T10:03:00Z"), ("to", "2024-05-01T10:01:00Z")],
        )
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = server
        .get_query_as("alice", "/api/message/window", &[("from", "yesterday"), ("to", "2024-05-01T10:01:00Z")])
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn aggregations_are_grouped_for_graphing() -> Result<()> {
    let server = seeded().await?;
    for (variable, period, minute) in [("temp", "hour", 0), ("temp", "hour", 1), ("temp", "day", 0), ("hum", "hour", 0)] {
        server
            .store
            .insert_aggregation(AggregatedData {
                client_id: "dev-1".into(),
                channel: "ch1".into(),
                variable: variable.into(),
                period: period.into(),
                timestamp: at(minute),
                sum: 10.0,
                count: 2,
                min: 4.0,
                max: 6.0,
                avg: 5.0,
            })
            .await;
    }

    let res = server.get_as("alice", "/api/message/aggregations/device/dev-1").await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    assert_eq!(body["client_id"], "dev-1");
    assert_eq!(body["aggregations"]["ch1"]["temp"]["hour"].as_object().map(|o| o.len()), Some(2));
    assert_eq!(
        body["aggregations"]["ch1"]["temp"]["hour"]["2024-05-01T10:00:00Z"]["avg"],
        5.0
    );

    let res = server
        .get_as("alice", "/api/message/aggregations/device/dev-1?period=day")
        .await?;
    let body = res.json::<Value>().await?;
    let temp = body["aggregations"]["ch1"]["temp"].as_object().cloned().unwrap_or_default();
    assert_eq!(temp.keys().collect::<Vec<_>>(), vec!["day"]);
    assert!(body["aggregations"]["ch1"]["hum"].is_null());

    let res = server.get_as("alice", "/api/message/aggregations/device/dev-3").await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn list_response_exposes_content_range_to_browsers() -> Result<()> {
    let server = seeded().await?;

    let res = server
        .client
        .get(server.url("/api/message"))
        .header("Origin", "https://console.example")
        .bearer_auth(common::token_for("alice"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let exposed = res
        .headers()
        .get("access-control-expose-headers")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_lowercase();
    assert!(exposed.contains("content-range"));
    Ok(())
}

#[tokio::test]
async fn undecodable_query_parameters_are_json_errors() -> Result<()> {
    let server = seeded().await?;

    for path in [
        "/api/message/topic?topic=a&limit=abc",
        "/api/message/device/dev-1/latest?limit=-1",
        "/api/message/window?from=2024-05-01T10:00:00Z&to=2024-05-01T11:00:00Z&limit=ten",
    ] {
        let res = server.get_as("alice", path).await?;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{}", path);
        let body = res.json::<Value>().await?;
        assert_eq!(body["code"], "BAD_REQUEST", "{}", path);
        assert!(body["error"].is_string());
    }
    Ok(())
}
