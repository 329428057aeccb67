// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use garcon_core::template::{ExecConfig, ExecutionMode};
use garcon_core::ServerId;
use std::collections::HashMap as StdHashMap;

/// Probe with a scriptable process table.
struct FakeProbe {
    table: Mutex<StdHashMap<u32, String>>,
}

impl FakeProbe {
    fn with(entries: &[(u32, &str)]) -> Arc<Self> {
        Arc::new(Self {
            table: Mutex::new(
                entries.iter().map(|(pid, name)| (*pid, name.to_string())).collect(),
            ),
        })
    }
}

impl ProcessProbe for FakeProbe {
    fn is_alive(&self, pid: u32) -> bool {
        self.table.lock().contains_key(&pid)
    }

    fn process_name(&self, pid: u32) -> Option<String> {
        self.table.lock().get(&pid).cloned()
    }
}

fn native_template(executable: &str) -> Template {
    Template {
        id: "valheim".into(),
        name: "Valheim".into(),
        description: None,
        mode: ExecutionMode::Native,
        container: None,
        exec: ExecConfig {
            executable: Some(executable.to_string()),
            stop_timeout_secs: Some(1),
            ..ExecConfig::default()
        },
        ports: Vec::new(),
        required_files: Vec::new(),
    }
}

fn server_config(id: &str) -> ServerConfig {
    ServerConfig {
        id: ServerId::from_string(id),
        name: id.to_string(),
        template_id: "valheim".into(),
        source_path: "/tmp/src".into(),
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
        ports: Vec::new(),
        env: HashMap::new(),
        memory_limit: None,
        cpu_limit: None,
        update_stage: garcon_core::UpdateStage::None,
        maintenance_restart: false,
        sort_order: None,
    }
}

fn record(server_id: &str, pid: u32, name: &str, data_path: &str) -> NativeProcessRecord {
    NativeProcessRecord {
        server_id: server_id.into(),
        pid,
        process_name: name.into(),
        started_at: "2026-01-01T00:00:00.000Z".into(),
        data_path: data_path.into(),
    }
}

async fn write_records(path: &Path, records: &[NativeProcessRecord]) {
    garcon_store::fs::write_json(path, &records.to_vec()).await.unwrap();
}

#[test]
fn names_match_tolerates_comm_truncation() {
    assert!(names_match("valheim_server", "valheim_server"));
    // unix comm truncates to 15 bytes
    assert!(names_match("valheim_server.exe", "valheim_server."));
    assert!(!names_match("valheim_server", "notepad"));
}

#[test]
fn render_args_substitutes_tokens() {
    let args = vec!["-name".to_string(), "{SERVER_NAME}".to_string()];
    let env = StdHashMap::from([("SERVER_NAME".to_string(), "Alpha".to_string())]);
    assert_eq!(render_args(&args, &env), vec!["-name", "Alpha"]);
}

#[tokio::test]
async fn reconcile_re_adopts_alive_matching_process() {
    let dir = tempfile::tempdir().unwrap();
    let records_path = dir.path().join("native-processes.json");
    write_records(&records_path, &[record("s1", 4242, "valheim_server", "/srv/s1")]).await;

    let probe = FakeProbe::with(&[(4242, "valheim_server")]);
    let backend = NativeBackend::with_probe(
        records_path,
        dir.path().join("logs"),
        probe,
        CancellationToken::new(),
    );
    backend.reconcile().await.unwrap();

    let status = backend.get_process_status("s1").await.unwrap();
    assert!(status.exists);
    assert!(status.running);
    assert_eq!(status.native_id.as_deref(), Some("4242"));
}

#[tokio::test]
async fn reconcile_refuses_reused_pid() {
    let dir = tempfile::tempdir().unwrap();
    let records_path = dir.path().join("native-processes.json");
    write_records(&records_path, &[record("s1", 4242, "valheim_server", "/srv/s1")]).await;

    // Between restarts the OS handed pid 4242 to a different program.
    let probe = FakeProbe::with(&[(4242, "notepad")]);
    let backend = NativeBackend::with_probe(
        records_path.clone(),
        dir.path().join("logs"),
        probe,
        CancellationToken::new(),
    );
    backend.reconcile().await.unwrap();

    let status = backend.get_process_status("s1").await.unwrap();
    assert!(!status.exists);

    // the stale record is gone from disk too
    let persisted: Vec<NativeProcessRecord> =
        garcon_store::fs::read_json(&records_path).await.unwrap();
    assert!(persisted.is_empty());
}

#[tokio::test]
async fn reconcile_drops_dead_pid() {
    let dir = tempfile::tempdir().unwrap();
    let records_path = dir.path().join("native-processes.json");
    write_records(&records_path, &[record("s1", 4242, "valheim_server", "/srv/s1")]).await;

    let probe = FakeProbe::with(&[]);
    let backend = NativeBackend::with_probe(
        records_path,
        dir.path().join("logs"),
        probe,
        CancellationToken::new(),
    );
    backend.reconcile().await.unwrap();

    assert!(!backend.get_process_status("s1").await.unwrap().exists);
}

#[tokio::test]
async fn reconcile_with_no_record_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let backend = NativeBackend::with_probe(
        dir.path().join("native-processes.json"),
        dir.path().join("logs"),
        FakeProbe::with(&[]),
        CancellationToken::new(),
    );
    backend.reconcile().await.unwrap();
    assert!(!backend.get_process_status("anything").await.unwrap().exists);
}

#[tokio::test]
async fn start_fails_when_executable_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    tokio::fs::create_dir_all(&data).await.unwrap();

    let backend = NativeBackend::with_probe(
        dir.path().join("native-processes.json"),
        dir.path().join("logs"),
        FakeProbe::with(&[]),
        CancellationToken::new(),
    );
    let err = backend
        .start(&server_config("s1"), &native_template("missing.exe"), &data)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), garcon_core::ErrorKind::NativeProcess);
}

#[cfg(unix)]
mod unix {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    async fn write_script(data: &Path, name: &str, body: &str) {
        tokio::fs::create_dir_all(data).await.unwrap();
        let path = data.join(name);
        tokio::fs::write(&path, format!("#!/bin/sh\n{body}\n")).await.unwrap();
        let mut perms = tokio::fs::metadata(&path).await.unwrap().permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(&path, perms).await.unwrap();
    }

    /// Backend against the real process table; scripts stand in for servers.
    fn real_backend(dir: &Path) -> NativeBackend {
        NativeBackend::with_probe(
            dir.join("native-processes.json"),
            dir.join("logs"),
            Arc::new(SystemProbe::new()),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn spawns_and_stops_a_real_process() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        write_script(&data, "server.sh", "sleep 30").await;

        let backend = real_backend(dir.path());
        let config = server_config("s1");
        let template = native_template("server.sh");

        let pid = backend.start(&config, &template, &data).await.unwrap();
        assert!(pid.parse::<u32>().unwrap() > 0);
        let status = backend.get_process_status("s1").await.unwrap();
        assert!(status.running);

        // the record survives on disk for re-adoption
        let persisted: Vec<NativeProcessRecord> =
            garcon_store::fs::read_json(&dir.path().join("native-processes.json"))
                .await
                .unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].server_id, "s1");

        backend.stop("s1", &template, None).await.unwrap();
        let status = backend.get_process_status("s1").await.unwrap();
        assert!(!status.exists);
    }

    #[tokio::test]
    async fn exit_callback_fires_with_code() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        write_script(&data, "failing.sh", "exit 7").await;

        let backend = real_backend(dir.path());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _sub = backend.on_process_exit(Arc::new(move |id, code| {
            let _ = tx.send((id.to_string(), code));
        }));

        backend
            .start(&server_config("s1"), &native_template("failing.sh"), &data)
            .await
            .unwrap();

        let (id, code) =
            tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(id, "s1");
        assert_eq!(code, Some(7));
    }

    #[tokio::test]
    async fn stop_is_idempotent_when_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let backend = real_backend(dir.path());
        backend.stop("ghost", &native_template("server.sh"), None).await.unwrap();
    }

    #[tokio::test]
    async fn start_rejects_when_already_running() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        write_script(&data, "server.sh", "sleep 30").await;

        let backend = real_backend(dir.path());
        let config = server_config("s1");
        let template = native_template("server.sh");

        backend.start(&config, &template, &data).await.unwrap();
        let err = backend.start(&config, &template, &data).await.unwrap_err();
        assert_eq!(err.kind(), garcon_core::ErrorKind::Conflict);

        backend.stop("s1", &template, None).await.unwrap();
    }

    #[tokio::test]
    async fn stdio_is_captured_in_the_server_log() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        write_script(&data, "noisy.sh", "echo hello-from-server").await;

        let backend = real_backend(dir.path());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _sub = backend.on_process_exit(Arc::new(move |id, _| {
            let _ = tx.send(id.to_string());
        }));
        backend
            .start(&server_config("s1"), &native_template("noisy.sh"), &data)
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();

        let log =
            tokio::fs::read_to_string(dir.path().join("logs/s1.log")).await.unwrap();
        assert!(log.contains("hello-from-server"));
    }
}
