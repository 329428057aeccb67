// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;
use garcon_core::template::Protocol;
use garcon_core::{PortMapping, ServerId};

fn sample_config() -> ServerConfig {
    ServerConfig {
        id: ServerId::from_string("alpha-0123456789"),
        name: "Alpha".into(),
        template_id: "minecraft".into(),
        source_path: "/tmp/src".into(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        ports: vec![
            PortMapping { host_port: 25565, container_port: 25565, protocol: Protocol::Tcp },
            PortMapping { host_port: 19132, container_port: 19132, protocol: Protocol::Udp },
        ],
        env: HashMap::from([("MEMORY".to_string(), "2G".to_string())]),
        memory_limit: None,
        cpu_limit: None,
        update_stage: garcon_core::UpdateStage::None,
        maintenance_restart: false,
        sort_order: None,
    }
}

#[test]
fn container_name_carries_prefix() {
    assert_eq!(container_name("alpha-0123456789"), "garcon-alpha-0123456789");
}

#[test]
fn port_bindings_wire_shape() {
    let bindings = port_bindings(&sample_config());
    let tcp = bindings.get("25565/tcp").unwrap().as_ref().unwrap();
    assert_eq!(tcp[0].host_port.as_deref(), Some("25565"));
    assert!(bindings.contains_key("19132/udp"));
}

#[test]
fn env_injects_home_first() {
    let env = container_env(&sample_config(), "/data");
    assert_eq!(env[0], "HOME=/data");
    assert!(env.contains(&"MEMORY=2G".to_string()));
}

#[test]
fn exact_name_postfilter_rejects_substring_hits() {
    // The daemon's name filter matches substrings; "garcon-alpha-1" also
    // returns "garcon-alpha-10".
    let names = vec!["/garcon-alpha-10".to_string()];
    assert!(!matches_exact_name(Some(&names), "garcon-alpha-1"));

    let names = vec!["/garcon-alpha-1".to_string()];
    assert!(matches_exact_name(Some(&names), "garcon-alpha-1"));

    assert!(!matches_exact_name(None, "garcon-alpha-1"));
}
