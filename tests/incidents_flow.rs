mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, json_body, TestApp};
use serde_json::json;

#[tokio::test]
async fn incidents_are_created_by_staff_and_closed_once_by_admin() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, admin) = app
        .worker_with_token("root@example.com", "Root", "admin")
        .await?;
    let (_, central) = app
        .worker_with_token("marta@example.com", "Marta", "central")
        .await?;
    let (luna_id, luna) = app
        .worker_with_token("luna@example.com", "Luna", "tarotista")
        .await?;
    let (sol_id, sol) = app
        .worker_with_token("sol@example.com", "Sol", "tarotista")
        .await?;

    let payload = json!({
        "worker_id": luna_id,
        "kind": "absence",
        "incident_date": "2024-03-12",
        "notes": "No se conectó",
    });
    let response = app.post_json("/api/incidents", &payload, Some(&luna)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.post_json("/api/incidents", &payload, Some(&central)).await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await?;
    assert_eq!(body["data"]["source"], "central");
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["month"], "2024-03-01");
    let incident_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .post_json(
            "/api/incidents",
            &json!({ "worker_id": sol_id, "kind": "manual", "incident_date": "2024-03-15" }),
            Some(&admin),
        )
        .await?;
    let body = json_body(response).await?;
    assert_eq!(body["data"]["source"], "admin");

    let response = app
        .post_json(
            "/api/incidents",
            &json!({ "worker_id": sol_id, "kind": "vacation" }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Tarotistas only ever see their own incidents.
    let response = app.get("/api/incidents", Some(&sol)).await?;
    let body = json_body(response).await?;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let response = app
        .get(&format!("/api/incidents/{incident_id}"), Some(&sol))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app
        .get(&format!("/api/incidents/{incident_id}"), Some(&luna))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .get("/api/incidents?month=2024-03&status=pending", Some(&central))
        .await?;
    let body = json_body(response).await?;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let resolve = json!({ "status": "unjustified", "penalty_cents": 1500 });
    let response = app
        .post_json(
            &format!("/api/incidents/{incident_id}/resolve"),
            &resolve,
            Some(&central),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json(
            &format!("/api/incidents/{incident_id}/resolve"),
            &json!({ "status": "pending" }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            &format!("/api/incidents/{incident_id}/resolve"),
            &resolve,
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["data"]["status"], "unjustified");
    assert_eq!(body["data"]["penalty_cents"], 1500);
    assert_eq!(body["data"]["notes"], "No se conectó");

    let response = app
        .post_empty(&format!("/api/incidents/{incident_id}/cancel"), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await?;
    assert_eq!(body["error"], "incident is already unjustified");

    // The penalty reaches earnings on the next recompute, even without
    // attendance.
    let response = app
        .post_json(
            "/api/admin/earnings/recompute",
            &json!({ "month": "2024-03" }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .get("/api/panel/earnings?month=2024-03", Some(&luna))
        .await?;
    let body = json_body(response).await?;
    assert_eq!(body["data"]["penalty_cents"], 1500);
    assert_eq!(body["data"]["total_cents"], -1500);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn cancelled_incidents_carry_no_penalty() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, admin) = app
        .worker_with_token("root@example.com", "Root", "admin")
        .await?;
    let (luna_id, luna) = app
        .worker_with_token("luna@example.com", "Luna", "tarotista")
        .await?;

    let response = app
        .post_json(
            "/api/incidents",
            &json!({
                "worker_id": luna_id,
                "kind": "late",
                "incident_date": "2024-04-02",
                "penalty_cents": 500,
            }),
            Some(&admin),
        )
        .await?;
    let body = json_body(response).await?;
    let incident_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .post_json(
            &format!("/api/incidents/{incident_id}/cancel"),
            &json!({ "notes": "Error de registro" }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(body["data"]["notes"], "Error de registro");

    app.post_empty("/api/admin/earnings/recompute?month=2024-04", Some(&admin))
        .await?;
    let response = app
        .get("/api/panel/earnings?month=2024-04", Some(&luna))
        .await?;
    let body = json_body(response).await?;
    assert!(body["data"].is_null());

    app.cleanup().await?;
    Ok(())
}
