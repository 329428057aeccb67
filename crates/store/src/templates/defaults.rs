// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in template documents seeded on first boot.

use garcon_core::template::{
    ContainerSpec, ExecConfig, ExecutionMode, PortSpec, Protocol, RconConfig, RconOverlay,
    Template,
};
use std::collections::HashMap;

pub(super) fn builtin() -> Vec<Template> {
    vec![minecraft(), valheim()]
}

fn minecraft() -> Template {
    Template {
        id: "minecraft".into(),
        name: "Minecraft (Java Edition)".into(),
        description: Some("Vanilla or modded Minecraft Java server".into()),
        mode: ExecutionMode::Container,
        container: Some(ContainerSpec {
            image: "eclipse-temurin:21-jre".into(),
            mount_path: "/data".into(),
            working_dir: Some("/data".into()),
            mounts: Vec::new(),
            env: HashMap::from([("MEMORY".to_string(), "2G".to_string())]),
        }),
        exec: ExecConfig {
            command: Some("java -Xmx{MEMORY} -Xms{MEMORY} -jar server.jar nogui".into()),
            stop_command: Some("stop".into()),
            stop_timeout_secs: Some(60),
            ..ExecConfig::default()
        },
        ports: vec![PortSpec {
            container_port: 25565,
            protocol: Protocol::Tcp,
            description: Some("Game port".into()),
            user_facing: true,
        }],
        required_files: vec!["server.jar".into()],
    }
}

fn valheim() -> Template {
    Template {
        id: "valheim".into(),
        name: "Valheim Dedicated Server".into(),
        description: Some("Native Valheim dedicated server".into()),
        mode: ExecutionMode::Native,
        container: None,
        exec: ExecConfig {
            executable: Some("valheim_server.exe".into()),
            args: vec![
                "-nographics".into(),
                "-batchmode".into(),
                "-name".into(),
                "{SERVER_NAME}".into(),
            ],
            stop_timeout_secs: Some(30),
            rcon: Some(RconConfig {
                enabled: true,
                port: 25575,
                password: String::new(),
                shutdown_command: "shutdown".into(),
                settings_overlay: Some(RconOverlay {
                    file: "ServerHostSettings.json".into(),
                    port_pointer: "/Rcon/Port".into(),
                    password_pointer: "/Rcon/Password".into(),
                }),
            }),
            ..ExecConfig::default()
        },
        ports: vec![
            PortSpec {
                container_port: 2456,
                protocol: Protocol::Udp,
                description: Some("Game port".into()),
                user_facing: true,
            },
            PortSpec {
                container_port: 2457,
                protocol: Protocol::Udp,
                description: Some("Query port".into()),
                user_facing: false,
            },
        ],
        required_files: vec!["valheim_server.exe".into()],
    }
}
