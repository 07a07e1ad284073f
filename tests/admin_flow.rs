mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, json_body, TestApp};
use diesel::connection::SimpleConnection;
use serde_json::json;
use uuid::Uuid;

const MARCH_EXPORT: &str = "fecha,tarotista,minutos,codigo,captada\n\
                            2024-03-01,Luna,10,cliente,si\n\
                            2024-03-02,Luna,20,repite,\n\
                            2024-03-02,Sol,30,free,\n\
                            2024-03-03,Nadie Conocida,5,rueda,\n\
                            no-date,Sol,5,free,\n";

#[tokio::test]
async fn worker_crud_and_credentials() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, admin) = app
        .worker_with_token("root@example.com", "Root", "admin")
        .await?;

    let payload = json!({
        "email": "Alba@Example.com",
        "password": "long-enough-pass",
        "display_name": "Alba",
        "role": "tarotista",
        "external_ref": "T-17",
        "shift_start": "09:30",
    });
    let response = app.post_json("/api/admin/workers", &payload, Some(&admin)).await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await?;
    assert_eq!(body["data"]["email"], "alba@example.com");
    assert_eq!(body["data"]["shift_start"], "09:30");
    let alba_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app.post_json("/api/admin/workers", &payload, Some(&admin)).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            "/api/admin/workers",
            &json!({ "email": "x@example.com", "password": "short", "display_name": "X", "role": "tarotista" }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .patch_json(
            &format!("/api/admin/workers/{alba_id}"),
            &json!({ "external_ref": null, "display_name": "Alba R." }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["data"]["display_name"], "Alba R.");
    assert!(body["data"]["external_ref"].is_null());
    assert_eq!(body["data"]["shift_start"], "09:30");

    let response = app
        .patch_json(
            &format!("/api/admin/workers/{alba_id}"),
            &json!({ "role": "supervisor" }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .put_json(
            &format!("/api/admin/workers/{alba_id}/credentials"),
            &json!({ "password": "another-long-pass" }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "alba@example.com", "password": "another-long-pass" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/api/admin/workers", Some(&admin)).await?;
    let body = json_body(response).await?;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn sync_csv_replaces_attendance_and_recomputes() -> Result<()> {
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
    let sol_id = app
        .insert_worker("sol@example.com", "Sol", "tarotista", None)
        .await?;

    let response = app
        .post_text("/api/admin/sync-csv", MARCH_EXPORT, Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    let report = &body["data"];
    assert_eq!(report["total_lines"], 5);
    assert_eq!(report["inserted"], 3);
    assert_eq!(report["skipped_bad"], 1);
    assert_eq!(report["skipped_no_worker"], 1);
    assert_eq!(report["unmatched_names"], json!(["Nadie Conocida"]));
    assert_eq!(report["months"], json!(["2024-03-01"]));
    assert_eq!(report["recomputed"][0]["earnings"], 2);

    let response = app
        .get("/api/panel/earnings?month=2024-03", Some(&luna))
        .await?;
    let body = json_body(response).await?;
    assert_eq!(body["data"]["minutes_total"], 30);
    assert_eq!(body["data"]["captadas"], 1);
    assert_eq!(body["data"]["base_cents"], 440);
    assert_eq!(body["data"]["total_cents"], 440);

    let response = app
        .get("/api/panel/ranking?month=2024-03", Some(&luna))
        .await?;
    let body = json_body(response).await?;
    let ranking = body["data"].as_array().unwrap();
    assert_eq!(ranking.len(), 2);
    assert_eq!(ranking[0]["worker_id"], luna_id.to_string());
    assert_eq!(ranking[0]["position"], 1);
    assert_eq!(ranking[0]["is_me"], true);
    assert_eq!(ranking[1]["worker_id"], sol_id.to_string());

    // Bonus generation pays the captadas winner and folds it into earnings.
    let response = app
        .post_empty("/api/admin/bonus/generate?month=2024-03", Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["data"]["bonuses"], 1);
    assert_eq!(body["data"]["capped"], 0);

    let response = app
        .get("/api/panel/bonuses?month=2024-03", Some(&luna))
        .await?;
    let body = json_body(response).await?;
    assert_eq!(body["data"][0]["category"], "captadas");
    assert_eq!(body["data"][0]["amount_cents"], 3000);

    let response = app
        .get("/api/panel/earnings?month=2024-03", Some(&luna))
        .await?;
    let body = json_body(response).await?;
    assert_eq!(body["data"]["bonus_cents"], 3000);
    assert_eq!(body["data"]["total_cents"], 3440);

    // A plain sync replaces rows but leaves the snapshot alone.
    let response = app
        .post_text(
            "/api/admin/sync",
            "fecha,tarotista,minutos\n2024-03-05,Sol,15\n",
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert!(body["data"].get("recomputed").is_none());

    let response = app
        .get("/api/admin/attendance?month=2024-03", Some(&admin))
        .await?;
    let body = json_body(response).await?;
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["code"], "cliente");

    let response = app
        .get("/api/panel/earnings?month=2024-03", Some(&luna))
        .await?;
    let body = json_body(response).await?;
    assert_eq!(body["data"]["total_cents"], 3440);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn sync_rejects_exports_without_required_columns() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, admin) = app
        .worker_with_token("root@example.com", "Root", "admin")
        .await?;

    let response = app
        .post_text("/api/admin/sync", "fecha,minutos\n2024-03-01,5\n", Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.post_text("/api/admin/sync", "  \n", Some(&admin)).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn mappings_route_unknown_names_to_workers() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, admin) = app
        .worker_with_token("root@example.com", "Root", "admin")
        .await?;
    let luna_id = app
        .insert_worker("luna@example.com", "Luna", "tarotista", None)
        .await?;

    let response = app
        .post_json(
            "/api/admin/mappings",
            &json!({ "source_name": "  Lúna Tarot ", "worker_id": luna_id }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await?;
    assert_eq!(body["data"]["source_key"], "luna tarot");
    let mapping_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .post_json(
            "/api/admin/mappings",
            &json!({ "source_name": "LUNA TAROT", "worker_id": luna_id }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_text(
            "/api/admin/sync",
            "fecha;tarotista;minutos\n01/03/2024;Luna Tarot;12\n",
            Some(&admin),
        )
        .await?;
    let body = json_body(response).await?;
    assert_eq!(body["data"]["matched_by_mapping"], 1);

    let response = app
        .delete(&format!("/api/admin/mappings/{mapping_id}"), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .delete(&format!("/api/admin/mappings/{mapping_id}"), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn teams_and_team_views() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, admin) = app
        .worker_with_token("root@example.com", "Root", "admin")
        .await?;
    let (marta_id, marta) = app
        .worker_with_token("marta@example.com", "Marta", "central")
        .await?;
    let luna_id = app
        .insert_worker("luna@example.com", "Luna", "tarotista", None)
        .await?;

    let response = app
        .post_json(
            "/api/admin/teams",
            &json!({ "name": "Equipo Luna", "central_id": luna_id }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            "/api/admin/teams",
            &json!({ "name": "Equipo Norte", "central_id": marta_id }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await?;
    let norte = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .post_json("/api/admin/teams", &json!({ "name": "Equipo Sur" }), Some(&admin))
        .await?;
    let body = json_body(response).await?;
    let sur = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .put_json(
            &format!("/api/admin/teams/{sur}/members/{luna_id}"),
            &json!({}),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    // Moving to another team drops the previous membership.
    let response = app
        .put_json(
            &format!("/api/admin/teams/{norte}/members/{luna_id}"),
            &json!({}),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/api/admin/teams", Some(&admin)).await?;
    let body = json_body(response).await?;
    let teams = body["data"].as_array().unwrap();
    assert_eq!(teams.len(), 2);
    assert_eq!(teams[0]["name"], "Equipo Norte");
    assert_eq!(teams[0]["members"].as_array().unwrap().len(), 1);
    assert_eq!(teams[1]["members"].as_array().unwrap().len(), 0);

    let response = app.get("/api/panel/team", Some(&marta)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["data"][0]["members"][0]["display_name"], "Luna");
    assert_eq!(body["data"][0]["members"][0]["presence"], "offline");

    let response = app
        .delete(&format!("/api/admin/teams/{norte}"), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.get("/api/panel/team", Some(&marta)).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.cleanup().await?;
    Ok(())
}

const REJECT_TRIGGER: &str = "
    CREATE OR REPLACE FUNCTION reject_blocked_attendance() RETURNS trigger AS $$
    BEGIN
        IF NEW.source_name = 'Bloqueada' THEN
            RAISE EXCEPTION 'attendance row rejected';
        END IF;
        RETURN NEW;
    END
    $$ LANGUAGE plpgsql;
    DROP TRIGGER IF EXISTS reject_blocked_attendance ON attendance_rows;
    CREATE TRIGGER reject_blocked_attendance BEFORE INSERT ON attendance_rows
        FOR EACH ROW EXECUTE FUNCTION reject_blocked_attendance();
";

const DROP_REJECT_TRIGGER: &str = "
    DROP TRIGGER IF EXISTS reject_blocked_attendance ON attendance_rows;
    DROP FUNCTION IF EXISTS reject_blocked_attendance();
";

#[tokio::test]
async fn failed_sync_keeps_previous_attendance() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, admin) = app
        .worker_with_token("root@example.com", "Root", "admin")
        .await?;
    app.insert_worker("luna@example.com", "Luna", "tarotista", None)
        .await?;
    app.insert_worker("bloqueada@example.com", "Bloqueada", "tarotista", None)
        .await?;

    let response = app
        .post_text(
            "/api/admin/sync",
            "fecha,tarotista,minutos,codigo\n\
             2024-03-01,Luna,10,cliente\n\
             2024-03-02,Luna,20,repite\n",
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    app.with_conn(|conn| Ok(conn.batch_execute(REJECT_TRIGGER)?))
        .await?;
    let response = app
        .post_text(
            "/api/admin/sync",
            "fecha,tarotista,minutos,codigo\n\
             2024-03-05,Luna,45,free\n\
             2024-03-05,Bloqueada,15,free\n",
            Some(&admin),
        )
        .await;
    app.with_conn(|conn| Ok(conn.batch_execute(DROP_REJECT_TRIGGER)?))
        .await?;
    assert_eq!(response?.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = app
        .get("/api/admin/attendance?month=2024-03", Some(&admin))
        .await?;
    let body = json_body(response).await?;
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    let mut minutes: Vec<i64> = rows
        .iter()
        .map(|row| row["minutes"].as_i64().unwrap())
        .collect();
    minutes.sort_unstable();
    assert_eq!(minutes, vec![10, 20]);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn hours_summary_and_team_ranking_follow_the_month() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, admin) = app
        .worker_with_token("root@example.com", "Root", "admin")
        .await?;
    let marta_id = app
        .insert_worker("marta@example.com", "Marta", "central", None)
        .await?;
    let (luna_id, luna) = app
        .worker_with_token("luna@example.com", "Luna", "tarotista")
        .await?;
    let sol_id = app
        .insert_worker("sol@example.com", "Sol", "tarotista", None)
        .await?;

    let response = app
        .post_text(
            "/api/admin/sync-csv",
            "fecha,tarotista,minutos,codigo,captada\n\
             2024-03-01,Luna,10,cliente,si\n\
             2024-03-02,Luna,20,repite,\n\
             2024-03-02,Sol,30,free,\n",
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // A closed 90-minute session in March and one entirely in February.
    let sessions = format!(
        "INSERT INTO presence_sessions (id, worker_id, started_at, ended_at) VALUES
            ('{}', '{luna_id}', '2024-03-04 09:00:00+00', '2024-03-04 10:30:00+00'),
            ('{}', '{luna_id}', '2024-02-10 09:00:00+00', '2024-02-10 12:00:00+00');",
        Uuid::new_v4(),
        Uuid::new_v4(),
    );
    app.with_conn(move |conn| Ok(conn.batch_execute(&sessions)?))
        .await?;

    let response = app
        .get("/api/admin/hours-summary?month=2024-03", Some(&luna))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app
        .get("/api/admin/hours-summary?month=2024-03", Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    let rows = body["data"].as_array().unwrap();
    let names: Vec<&str> = rows
        .iter()
        .map(|row| row["display_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Luna", "Marta", "Root", "Sol"]);
    assert_eq!(rows[0]["minutes_cliente"], 10);
    assert_eq!(rows[0]["minutes_repite"], 20);
    assert_eq!(rows[0]["minutes_total"], 30);
    assert_eq!(rows[0]["hours_total"], 0.5);
    assert_eq!(rows[0]["presence_minutes"], 90);
    assert_eq!(rows[0]["presence_hours"], 1.5);
    assert_eq!(rows[1]["minutes_total"], 0);
    assert_eq!(rows[3]["minutes_free"], 30);
    assert_eq!(rows[3]["presence_minutes"], 0);

    let response = app
        .post_json(
            "/api/admin/teams",
            &json!({ "name": "Equipo Norte", "central_id": marta_id }),
            Some(&admin),
        )
        .await?;
    let body = json_body(response).await?;
    let norte = body["data"]["id"].as_str().unwrap().to_string();
    let response = app
        .post_json("/api/admin/teams", &json!({ "name": "Equipo Sur" }), Some(&admin))
        .await?;
    let body = json_body(response).await?;
    let sur = body["data"]["id"].as_str().unwrap().to_string();
    let response = app
        .post_json("/api/admin/teams", &json!({ "name": "Equipo Vacío" }), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    for (team, worker) in [(&norte, luna_id), (&sur, sol_id)] {
        let response = app
            .put_json(
                &format!("/api/admin/teams/{team}/members/{worker}"),
                &json!({}),
                Some(&admin),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .get("/api/panel/team-ranking?month=2024-03", Some(&luna))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    let standings = body["data"].as_array().unwrap();
    assert_eq!(standings.len(), 3);

    // Equal minutes; the captada puts Norte ahead.
    assert_eq!(standings[0]["team_id"], norte.as_str());
    assert_eq!(standings[0]["position"], 1);
    assert_eq!(standings[0]["members"], 1);
    assert_eq!(standings[0]["minutes_total"], 30);
    assert_eq!(standings[0]["captadas"], 1);
    assert_eq!(standings[0]["pct_cliente"], 33.33);
    assert_eq!(standings[0]["pct_repite"], 66.67);
    assert_eq!(standings[1]["team_id"], sur.as_str());
    assert_eq!(standings[1]["position"], 2);
    assert_eq!(standings[1]["pct_cliente"], 0.0);
    assert_eq!(standings[2]["name"], "Equipo Vacío");
    assert_eq!(standings[2]["minutes_total"], 0);
    assert_eq!(standings[2]["members"], 0);

    app.cleanup().await?;
    Ok(())
}
