// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenario specs
//!
//! Drives the orchestrator through the public lifecycle operations against
//! a scriptable backend and real filesystem fixtures, checking the push
//! events, on-disk artefacts, and state transitions together.

use garcon_backend::{ExecutionBackend, FakeBackend, NativeBackend, ProcessProbe};
use garcon_backup::{filename, BackupEngine, BackupType};
use garcon_core::server::SIDECAR_FILENAME;
use garcon_core::template::{ContainerSpec, ExecConfig, ExecutionMode, PortSpec, Protocol};
use garcon_core::{
    ClientMessage, FakeClock, PushMessage, ServerConfig, ServerStatus, Template, UpdateAction,
    UpdateStage,
};
use garcon_engine::{EventBus, ImportRequest, Orchestrator, OrchestratorConfig};
use garcon_store::{fs as store, TemplateRegistry};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

// ===========================================================================
// Harness
// ===========================================================================

struct World {
    root: TempDir,
    orchestrator: Arc<Orchestrator<FakeClock>>,
    backend: FakeBackend,
    clock: FakeClock,
    events: UnboundedReceiver<PushMessage>,
}

fn minecraft() -> Template {
    Template {
        id: "minecraft".into(),
        name: "Minecraft (Java Edition)".into(),
        description: None,
        mode: ExecutionMode::Container,
        container: Some(ContainerSpec {
            image: "eclipse-temurin:21-jre".into(),
            mount_path: "/data".into(),
            working_dir: None,
            mounts: Vec::new(),
            env: HashMap::new(),
        }),
        exec: ExecConfig {
            command: Some("java -jar server.jar nogui".into()),
            ..ExecConfig::default()
        },
        ports: vec![PortSpec {
            container_port: 25565,
            protocol: Protocol::Tcp,
            description: None,
            user_facing: true,
        }],
        required_files: vec!["server.jar".into()],
    }
}

async fn world(auto_backup_on_stop: bool, max_backups: usize) -> World {
    let root = tempfile::tempdir().unwrap();
    let servers_dir = root.path().join("servers");
    let clock = FakeClock::new();
    let backend = FakeBackend::new();
    let bus = EventBus::new();

    let orchestrator = Orchestrator::new(
        OrchestratorConfig {
            servers_dir: servers_dir.clone(),
            host_servers_dir: servers_dir.clone(),
            auto_backup_on_stop,
        },
        TemplateRegistry::from_templates(vec![minecraft()]),
        Arc::new(backend.clone()),
        Arc::new(FakeBackend::new()),
        BackupEngine::new(servers_dir, root.path().join("backups"), max_backups, clock.clone()),
        bus.clone(),
        clock.clone(),
    );
    orchestrator.reconcile().await.unwrap();

    let (subscriber, events) = bus.register();
    bus.handle_message(subscriber, ClientMessage::Subscribe { server_id: None });

    World { root, orchestrator, backend, clock, events }
}

impl World {
    async fn seed_source(&self) -> String {
        let source = self.root.path().join("import-src");
        tokio::fs::create_dir_all(&source).await.unwrap();
        tokio::fs::write(source.join("server.jar"), b"jar-v1").await.unwrap();
        source.display().to_string()
    }

    async fn import(&self, name: &str) -> String {
        let source = self.seed_source().await;
        let view = self
            .orchestrator
            .import(ImportRequest {
                name: name.into(),
                template_id: "minecraft".into(),
                source_path: source,
                ports: None,
                env: HashMap::new(),
                memory_limit: None,
                cpu_limit: None,
                maintenance_restart: false,
            })
            .await
            .unwrap();
        view.id.as_str().to_string()
    }

    async fn next_event(&mut self) -> PushMessage {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("timed out waiting for push event")
            .expect("event channel closed")
    }

    async fn expect_status(&mut self, expected: ServerStatus) -> (Option<String>, UpdateStage) {
        match self.next_event().await {
            PushMessage::ServerStatus { status, started_at, update_stage, .. } => {
                assert_eq!(status, expected, "unexpected status event");
                (started_at, update_stage.unwrap_or_default())
            }
            other => panic!("expected server_status({expected}), got {other:?}"),
        }
    }

    fn data_dir(&self, id: &str) -> std::path::PathBuf {
        self.root.path().join("servers").join(id)
    }

    fn backup_dir(&self, id: &str) -> std::path::PathBuf {
        self.root.path().join("backups").join(id)
    }
}

// ===========================================================================
// Scenario 1: import + start + stop
// ===========================================================================

#[tokio::test]
async fn import_start_stop() {
    let mut w = world(true, 5).await;
    let id = w.import("Alpha").await;

    // id matches alpha-[0-9a-f]{10}
    let (stem, suffix) = id.rsplit_once('-').unwrap();
    assert_eq!(stem, "alpha");
    assert_eq!(suffix.len(), 10);
    assert!(suffix.bytes().all(|b| b.is_ascii_hexdigit()));

    match w.next_event().await {
        PushMessage::ServerUpdate { action, .. } => assert_eq!(action, UpdateAction::Created),
        other => panic!("expected server_update(created) first, got {other:?}"),
    }
    assert_eq!(w.orchestrator.get(&id).unwrap().status, ServerStatus::Stopped);

    w.orchestrator.start(&id).await.unwrap();
    w.expect_status(ServerStatus::Starting).await;
    let (started_at, _) = w.expect_status(ServerStatus::Running).await;
    assert!(started_at.is_some());

    w.orchestrator.stop(&id).await.unwrap();
    w.expect_status(ServerStatus::Stopping).await;
    w.expect_status(ServerStatus::Stopped).await;

    // one auto backup landed in the backup directory
    let names: Vec<String> = std::fs::read_dir(w.backup_dir(&id))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 1);
    assert!(names[0].ends_with("-auto.tar.gz"), "{names:?}");
}

// ===========================================================================
// Scenario 2: crash path
// ===========================================================================

#[tokio::test]
async fn crash_and_acknowledge() {
    let mut w = world(false, 5).await;
    let id = w.import("Alpha").await;
    let _created = w.next_event().await;

    w.orchestrator.start(&id).await.unwrap();
    let _starting = w.next_event().await;
    let _running = w.next_event().await;

    w.backend.emit_exit(&id, Some(137));
    w.expect_status(ServerStatus::Error).await;
    assert_eq!(w.orchestrator.get(&id).unwrap().status, ServerStatus::Error);

    // the crashed container is retained until acknowledgement
    let status = w.backend.get_process_status(&id).await.unwrap();
    assert!(status.exists && !status.running);

    w.orchestrator.acknowledge_crash(&id).await.unwrap();
    w.expect_status(ServerStatus::Stopped).await;
    assert!(!w.backend.get_process_status(&id).await.unwrap().exists);
}

// ===========================================================================
// Scenarios 3 & 4: three-phase update
// ===========================================================================

#[tokio::test]
async fn update_happy_path() {
    let mut w = world(false, 5).await;
    let id = w.import("Alpha").await;
    let _created = w.next_event().await;
    w.clock.advance(chrono::Duration::minutes(1));

    let initiated = w.orchestrator.initiate_update(&id).await.unwrap();

    // the pre-update archive exists under the sanitised timestamp name
    let expected_name =
        filename::backup_filename(&initiated.backup_timestamp, BackupType::PreUpdate);
    assert!(w.backup_dir(&id).join(&expected_name).exists());

    // sidecar carries the stage
    let sidecar: ServerConfig =
        store::read_yaml(&w.data_dir(&id).join(SIDECAR_FILENAME)).await.unwrap();
    assert_eq!(sidecar.update_stage, UpdateStage::Initiated);

    let (_, stage) = w.expect_status(ServerStatus::Updating).await;
    assert_eq!(stage, UpdateStage::Initiated);

    // operator replaces files at the source path
    tokio::fs::write(Path::new(&initiated.source_path).join("server.jar"), b"jar-v2")
        .await
        .unwrap();

    w.orchestrator.apply_update(&id).await.unwrap();
    let (_, stage) = w.expect_status(ServerStatus::Updating).await;
    assert_eq!(stage, UpdateStage::Applying);
    let (_, stage) = w.expect_status(ServerStatus::Stopped).await;
    assert_eq!(stage, UpdateStage::None);
    match w.next_event().await {
        PushMessage::ServerUpdate { action, .. } => assert_eq!(action, UpdateAction::Updated),
        other => panic!("expected server_update(updated), got {other:?}"),
    }

    let sidecar: ServerConfig =
        store::read_yaml(&w.data_dir(&id).join(SIDECAR_FILENAME)).await.unwrap();
    assert_eq!(sidecar.update_stage, UpdateStage::None);
    assert_eq!(
        tokio::fs::read(w.data_dir(&id).join("server.jar")).await.unwrap(),
        b"jar-v2"
    );
}

#[tokio::test]
async fn update_cancel_retains_backup() {
    let mut w = world(false, 5).await;
    let id = w.import("Alpha").await;
    let _created = w.next_event().await;
    w.clock.advance(chrono::Duration::minutes(1));

    let initiated = w.orchestrator.initiate_update(&id).await.unwrap();
    let _updating = w.next_event().await;

    w.orchestrator.cancel_update(&id).await.unwrap();
    let (_, stage) = w.expect_status(ServerStatus::Stopped).await;
    assert_eq!(stage, UpdateStage::None);

    let sidecar: ServerConfig =
        store::read_yaml(&w.data_dir(&id).join(SIDECAR_FILENAME)).await.unwrap();
    assert_eq!(sidecar.update_stage, UpdateStage::None);

    // the pre-update backup file is retained
    let expected_name =
        filename::backup_filename(&initiated.backup_timestamp, BackupType::PreUpdate);
    assert!(w.backup_dir(&id).join(expected_name).exists());
}

// ===========================================================================
// Scenario 5: retention cap
// ===========================================================================

#[tokio::test]
async fn retention_cap_three() {
    let w = world(false, 3).await;
    let id = w.import("Alpha").await;

    let mut timestamps = Vec::new();
    for n in 0..5 {
        let record = w
            .orchestrator
            .backups()
            .create(&id, BackupType::Manual, None)
            .await
            .unwrap();
        timestamps.push(record.timestamp);
        w.clock.advance(chrono::Duration::minutes(1));

        let listed = w.orchestrator.backups().list(&id).await.unwrap();
        if n >= 3 {
            assert_eq!(listed.len(), 3, "after backup {}", n + 1);
        }
    }

    // survivors are {T3, T4, T5}, newest first
    let listed = w.orchestrator.backups().list(&id).await.unwrap();
    let survivors: Vec<&str> = listed.iter().map(|r| r.timestamp.as_str()).collect();
    assert_eq!(
        survivors,
        vec![timestamps[4].as_str(), timestamps[3].as_str(), timestamps[2].as_str()]
    );
}

// ===========================================================================
// Scenario 6: native re-adoption with pid reuse
// ===========================================================================

struct ScriptedProbe {
    table: HashMap<u32, String>,
}

impl ProcessProbe for ScriptedProbe {
    fn is_alive(&self, pid: u32) -> bool {
        self.table.contains_key(&pid)
    }

    fn process_name(&self, pid: u32) -> Option<String> {
        self.table.get(&pid).cloned()
    }
}

#[tokio::test]
async fn native_re_adoption_refuses_reused_pid() {
    let root = tempfile::tempdir().unwrap();
    let records_path = root.path().join("native-processes.json");
    store::write_json(
        &records_path,
        &serde_json::json!([{
            "serverId": "valheim-abc123def0",
            "pid": 31337,
            "processName": "valheim_server",
            "startedAt": "2026-01-01T00:00:00.000Z",
            "dataPath": "/srv/valheim"
        }]),
    )
    .await
    .unwrap();

    // the OS reused pid 31337 for an unrelated process
    let probe = ScriptedProbe {
        table: HashMap::from([(31337u32, "notepad".to_string())]),
    };
    let backend = NativeBackend::with_probe(
        records_path.clone(),
        root.path().join("logs"),
        Arc::new(probe),
        tokio_util::sync::CancellationToken::new(),
    );
    backend.reconcile().await.unwrap();

    let status = backend.get_process_status("valheim-abc123def0").await.unwrap();
    assert!(!status.exists, "a reused pid must not be re-adopted");

    // the record is dropped from disk as well
    let persisted: serde_json::Value = store::read_json(&records_path).await.unwrap();
    assert_eq!(persisted, serde_json::json!([]));
}

// ===========================================================================
// Scenario 7: filename round-trip
// ===========================================================================

#[test]
fn backup_filename_round_trip() {
    let ts = "2026-03-14T09:26:53.589Z";
    assert_eq!(filename::sanitize_timestamp(ts), "2026-03-14T09-26-53-589Z");
    let name = filename::backup_filename(ts, BackupType::Manual);
    assert_eq!(name, "backup-2026-03-14T09-26-53-589Z-manual.tar.gz");
    assert_eq!(
        filename::parse_backup_filename(&name),
        Some((ts.to_string(), BackupType::Manual))
    );
}

// ===========================================================================
// Cross-cutting invariants
// ===========================================================================

/// P9: deleting a server preserves its backups.
#[tokio::test]
async fn delete_preserves_backups() {
    let w = world(false, 5).await;
    let id = w.import("Alpha").await;

    w.orchestrator.backups().create(&id, BackupType::Manual, None).await.unwrap();
    let before = w.orchestrator.backups().list(&id).await.unwrap();

    w.orchestrator.delete(&id).await.unwrap();
    let after = w.orchestrator.backups().list(&id).await.unwrap();
    assert_eq!(before, after);
}

/// P4: per-subscriber event order matches the transition order, and the
/// created event precedes the first status event.
#[tokio::test]
async fn event_order_follows_transitions() {
    let mut w = world(false, 5).await;
    let id = w.import("Alpha").await;

    w.orchestrator.start(&id).await.unwrap();
    w.orchestrator.stop(&id).await.unwrap();

    match w.next_event().await {
        PushMessage::ServerUpdate { action: UpdateAction::Created, .. } => {}
        other => panic!("created must precede all status events, got {other:?}"),
    }
    for expected in
        [ServerStatus::Starting, ServerStatus::Running, ServerStatus::Stopping, ServerStatus::Stopped]
    {
        w.expect_status(expected).await;
    }
}

/// Operations on distinct servers are independent.
#[tokio::test]
async fn distinct_servers_do_not_interfere() {
    let w = world(false, 5).await;
    let a = w.import("Alpha").await;
    let b = w.import("Beta").await;

    w.orchestrator.start(&a).await.unwrap();
    assert_eq!(w.orchestrator.get(&a).unwrap().status, ServerStatus::Running);
    assert_eq!(w.orchestrator.get(&b).unwrap().status, ServerStatus::Stopped);

    w.orchestrator.stop(&a).await.unwrap();
    w.orchestrator.start(&b).await.unwrap();
    assert_eq!(w.orchestrator.get(&a).unwrap().status, ServerStatus::Stopped);
    assert_eq!(w.orchestrator.get(&b).unwrap().status, ServerStatus::Running);
}
