// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

fn clear_env() {
    for name in [
        "HOST",
        "PORT",
        "DATA_DIR",
        "HOST_DATA_DIR",
        "IMPORT_DIR",
        "HOST_IMPORT_DIR",
        "DOCKER_HOST",
        "MAX_BACKUPS_PER_TYPE",
        "AUTO_BACKUP_ON_STOP",
        "LOG_LEVEL",
        "LOG_PRETTY",
    ] {
        std::env::remove_var(name);
    }
}

#[test]
#[serial]
fn defaults() {
    clear_env();
    let settings = Settings::from_env();
    assert_eq!(settings.host, "0.0.0.0");
    assert_eq!(settings.port, 3001);
    assert_eq!(settings.data_dir, PathBuf::from("./data"));
    assert_eq!(settings.host_data_dir, settings.data_dir);
    assert_eq!(settings.max_backups_per_type, 5);
    assert!(settings.auto_backup_on_stop);
    assert!(settings.docker_host.is_none());
}

#[test]
#[serial]
fn overrides() {
    clear_env();
    std::env::set_var("HOST", "127.0.0.1");
    std::env::set_var("PORT", "8080");
    std::env::set_var("DATA_DIR", "/srv/garcon");
    std::env::set_var("HOST_DATA_DIR", "/mnt/host/garcon");
    std::env::set_var("MAX_BACKUPS_PER_TYPE", "3");
    std::env::set_var("AUTO_BACKUP_ON_STOP", "false");

    let settings = Settings::from_env();
    assert_eq!(settings.host, "127.0.0.1");
    assert_eq!(settings.port, 8080);
    assert_eq!(settings.servers_dir(), PathBuf::from("/srv/garcon/servers"));
    assert_eq!(settings.host_servers_dir(), PathBuf::from("/mnt/host/garcon/servers"));
    assert_eq!(settings.max_backups_per_type, 3);
    assert!(!settings.auto_backup_on_stop);
    clear_env();
}

#[test]
#[serial]
fn config_response_omits_log_settings() {
    clear_env();
    std::env::set_var("LOG_LEVEL", "debug");
    let settings = Settings::from_env();
    let json = serde_json::to_value(&settings).unwrap();
    assert!(json.get("logLevel").is_none());
    assert_eq!(json["maxBackupsPerType"], 5);
    clear_env();
}
