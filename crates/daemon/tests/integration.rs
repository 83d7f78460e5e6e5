use std::path::{Path, PathBuf};

use prms_backup_daemon::{build_router, AppState, OperationGateway};
use prms_backup_engine::{BackupOrchestrator, DatabaseConfig, DumpEngineConfig, SqliteConfig};
use prms_backup_storage::ArchiveStore;
use rusqlite::Connection;

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    backup_dir: PathBuf,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    fn endpoint(&self) -> String {
        format!("{}/api/backup", self.base_url)
    }

    async fn get(&self, query: &[(&str, &str)]) -> serde_json::Value {
        let resp = self
            .client
            .get(self.endpoint())
            .query(query)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }

    async fn post(&self, form: &[(&str, &str)]) -> serde_json::Value {
        let resp = self
            .client
            .post(self.endpoint())
            .form(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }
}

fn sample_database(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE barangay (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
         CREATE TABLE patient (
             id INTEGER PRIMARY KEY,
             name TEXT NOT NULL,
             barangay_id INTEGER REFERENCES barangay(id)
         );
         INSERT INTO barangay VALUES (1, 'Poblacion'), (2, 'San Isidro');
         INSERT INTO patient VALUES (1, 'Dela Cruz, Juan', 1), (2, 'Reyes; Ana', 2);",
    )
    .unwrap();
}

/// A stand-in dump engine: `sqlite3 <db> .dump` without needing sqlite3 installed.
#[cfg(unix)]
fn fake_engine(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-sqlite3");
    std::fs::write(
        &path,
        "#!/bin/sh\n\
         cat <<'SQL'\n\
         PRAGMA foreign_keys=OFF;\n\
         CREATE TABLE barangay (id INTEGER PRIMARY KEY, name TEXT NOT NULL);\n\
         INSERT INTO barangay VALUES(1,'Poblacion');\n\
         INSERT INTO barangay VALUES(2,'San Isidro');\n\
         CREATE TABLE patient (id INTEGER PRIMARY KEY, name TEXT NOT NULL, barangay_id INTEGER REFERENCES barangay(id));\n\
         INSERT INTO patient VALUES(1,'Dela Cruz, Juan',1);\n\
         INSERT INTO patient VALUES(2,'Reyes; Ana',2);\n\
         SQL\n",
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

async fn start_server(root: &Path, engine: DumpEngineConfig) -> TestServer {
    let backup_dir = root.join("backups");
    let db_path = root.join("prms.db");
    sample_database(&db_path);

    let store = ArchiveStore::new(&backup_dir);
    let orchestrator = BackupOrchestrator::new(
        store,
        DatabaseConfig::Sqlite(SqliteConfig { path: db_path }),
        engine,
    );
    let app = build_router(AppState {
        gateway: OperationGateway::new(orchestrator),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    TestServer {
        base_url: format!("http://{addr}"),
        client: reqwest::Client::new(),
        backup_dir,
        _handle: handle,
    }
}

#[tokio::test]
async fn test_healthz() {
    let tmp = tempfile::tempdir().unwrap();
    let srv = start_server(tmp.path(), DumpEngineConfig::default()).await;

    let resp = srv
        .client
        .get(format!("{}/api/v1/healthz", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_list_creates_missing_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let srv = start_server(tmp.path(), DumpEngineConfig::default()).await;
    assert!(!srv.backup_dir.exists());

    let body = srv.get(&[("action", "list")]).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Backup files retrieved successfully");
    assert_eq!(body["data"], serde_json::json!([]));
    assert!(srv.backup_dir.is_dir());
}

#[cfg(unix)]
#[tokio::test]
async fn test_create_list_download_delete_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = DumpEngineConfig {
        candidates: vec![fake_engine(tmp.path()).display().to_string()],
        ..DumpEngineConfig::default()
    };
    let srv = start_server(tmp.path(), engine).await;

    let created = srv.post(&[("action", "backup")]).await;
    assert_eq!(created["status"], "success", "{created}");
    assert_eq!(created["message"], "Backup created successfully");
    let filename = created["data"]["filename"].as_str().unwrap().to_owned();
    assert!(filename.starts_with("backup_") && filename.ends_with(".sql"));

    let listed = srv.get(&[("action", "list")]).await;
    let files = listed["data"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["filename"], filename.as_str());
    let listed_size = files[0]["size"].as_u64().unwrap();

    let resp = srv
        .client
        .get(srv.endpoint())
        .query(&[("action", "download"), ("file", filename.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "application/octet-stream"
    );
    assert_eq!(
        resp.headers()["content-disposition"].to_str().unwrap(),
        format!("attachment; filename=\"{filename}\"")
    );
    let bytes = resp.bytes().await.unwrap();
    assert_eq!(bytes.len() as u64, listed_size);
    assert_eq!(
        bytes.as_ref(),
        std::fs::read(srv.backup_dir.join(&filename)).unwrap().as_slice()
    );

    let deleted = srv.post(&[("action", "delete"), ("file", filename.as_str())]).await;
    assert_eq!(deleted["status"], "success", "{deleted}");
    assert_eq!(deleted["message"], "Backup file deleted successfully");

    let listed = srv.get(&[("action", "list")]).await;
    assert_eq!(listed["data"], serde_json::json!([]));
}

#[tokio::test]
async fn test_restore_reports_failing_statement() {
    let tmp = tempfile::tempdir().unwrap();
    let srv = start_server(tmp.path(), DumpEngineConfig::default()).await;
    std::fs::create_dir_all(&srv.backup_dir).unwrap();
    std::fs::write(
        srv.backup_dir.join("backup_2026-02-13_09-00-00.sql"),
        "INSERT INTO barangay VALUES (3, 'Mabini');\n\
         INSERT INTO patient VALUES (3, 'Garcia', 3);\n\
         INSERT INTO no_such_table VALUES (1);\n",
    )
    .unwrap();

    let body = srv
        .post(&[("action", "restore"), ("file", "backup_2026-02-13_09-00-00.sql")])
        .await;
    assert_eq!(body["status"], "error");
    assert!(
        body["message"].as_str().unwrap().contains("statement 3"),
        "{body}"
    );

    let conn = Connection::open(tmp.path().join("prms.db")).unwrap();
    let patients: i64 = conn
        .query_row("SELECT COUNT(*) FROM patient", [], |row| row.get(0))
        .unwrap();
    assert_eq!(patients, 3);
}

#[tokio::test]
async fn test_restore_success() {
    let tmp = tempfile::tempdir().unwrap();
    let srv = start_server(tmp.path(), DumpEngineConfig::default()).await;
    std::fs::create_dir_all(&srv.backup_dir).unwrap();
    std::fs::write(
        srv.backup_dir.join("backup_2026-02-13_10-00-00.sql"),
        "DELETE FROM patient;\nINSERT INTO patient VALUES (9, 'Only; one', 2);\n",
    )
    .unwrap();

    let body = srv
        .post(&[("action", "restore"), ("file", "backup_2026-02-13_10-00-00.sql")])
        .await;
    assert_eq!(body["status"], "success", "{body}");
    assert_eq!(body["message"], "Database restored successfully");
    assert!(body.get("data").is_none());

    let conn = Connection::open(tmp.path().join("prms.db")).unwrap();
    let name: String = conn
        .query_row("SELECT name FROM patient", [], |row| row.get(0))
        .unwrap();
    assert_eq!(name, "Only; one");

    let status = srv.get(&[("action", "status")]).await;
    assert_eq!(status["data"]["state"], "succeeded");
    assert_eq!(status["data"]["operation"]["kind"], "restore");
}

#[tokio::test]
async fn test_invalid_and_misrouted_actions() {
    let tmp = tempfile::tempdir().unwrap();
    let srv = start_server(tmp.path(), DumpEngineConfig::default()).await;

    let body = srv.get(&[("action", "explode")]).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Invalid action");

    let body = srv.get(&[("action", "delete"), ("file", "x.sql")]).await;
    assert_eq!(body["message"], "Invalid action");

    let body = srv.post(&[("action", "list")]).await;
    assert_eq!(body["message"], "Invalid action");

    let resp = srv.client.put(srv.endpoint()).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Method not allowed");
}

#[tokio::test]
async fn test_delete_rejects_traversal_and_missing_files() {
    let tmp = tempfile::tempdir().unwrap();
    let srv = start_server(tmp.path(), DumpEngineConfig::default()).await;
    std::fs::create_dir_all(&srv.backup_dir).unwrap();
    let outside = tmp.path().join("secret.sql");
    std::fs::write(&outside, "keep me").unwrap();

    let body = srv
        .post(&[("action", "delete"), ("file", "../secret.sql")])
        .await;
    assert_eq!(body["status"], "error");
    assert!(outside.exists());

    let body = srv
        .post(&[("action", "delete"), ("file", "backup_missing.sql")])
        .await;
    assert_eq!(body["status"], "error");
    assert_eq!(
        body["message"],
        "Backup file does not exist: backup_missing.sql"
    );

    let body = srv.post(&[("action", "delete")]).await;
    assert_eq!(body["message"], "Filename is required");
}

#[tokio::test]
async fn test_download_missing_file_is_an_envelope() {
    let tmp = tempfile::tempdir().unwrap();
    let srv = start_server(tmp.path(), DumpEngineConfig::default()).await;
    std::fs::create_dir_all(&srv.backup_dir).unwrap();

    let resp = srv
        .client
        .get(srv.endpoint())
        .query(&[("action", "download"), ("file", "backup_gone.sql")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_download_rejects_header_unsafe_names() {
    let tmp = tempfile::tempdir().unwrap();
    let srv = start_server(tmp.path(), DumpEngineConfig::default()).await;
    std::fs::create_dir_all(&srv.backup_dir).unwrap();

    for name in ["bad\"name.sql", "split\r\nX-Injected: 1.sql"] {
        let resp = srv
            .client
            .get(srv.endpoint())
            .query(&[("action", "download"), ("file", name)])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "{name:?}");
        assert!(resp.headers().get("content-disposition").is_none());
        assert!(resp.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("application/json"));
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "error", "{name:?}");
    }
}

#[tokio::test]
async fn test_size_reports_database_bytes() {
    let tmp = tempfile::tempdir().unwrap();
    let srv = start_server(tmp.path(), DumpEngineConfig::default()).await;

    let body = srv.get(&[("action", "size")]).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Database size retrieved successfully");
    let expected = std::fs::metadata(tmp.path().join("prms.db")).unwrap().len();
    assert_eq!(body["data"].as_u64(), Some(expected));
}
