// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn container_template() -> Template {
    Template {
        id: "minecraft".into(),
        name: "Minecraft (Java)".into(),
        description: None,
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

#[test]
fn yaml_round_trip_uses_camel_case() {
    let yaml = serde_yaml::to_string(&container_template()).unwrap();
    assert!(yaml.contains("mountPath: /data"), "{yaml}");
    assert!(yaml.contains("containerPort: 25565"), "{yaml}");
    assert!(yaml.contains("requiredFiles:"), "{yaml}");
    let back: Template = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(back, container_template());
}

#[test]
fn container_mode_requires_container_block() {
    let mut t = container_template();
    t.container = None;
    assert!(t.validate().is_err());
}

#[test]
fn native_mode_requires_executable() {
    let t = Template {
        id: "valheim".into(),
        name: "Valheim".into(),
        description: None,
        mode: ExecutionMode::Native,
        container: None,
        exec: ExecConfig::default(),
        ports: Vec::new(),
        required_files: Vec::new(),
    };
    assert!(t.validate().is_err());
}

#[test]
fn render_command_substitutes_every_occurrence() {
    let t = container_template();
    let env = HashMap::from([("MEMORY".to_string(), "4G".to_string())]);
    assert_eq!(
        t.render_command(&env).unwrap(),
        "java -Xmx4G -Xms4G -jar server.jar nogui"
    );
}

#[test]
fn render_command_leaves_unknown_tokens() {
    let t = container_template();
    let rendered = t.render_command(&HashMap::new()).unwrap();
    assert!(rendered.contains("{MEMORY}"));
}

#[test]
fn stop_timeout_defaults_to_thirty_seconds() {
    let t = container_template();
    assert_eq!(t.stop_timeout(), Duration::from_secs(30));
}

#[test]
fn summary_omits_exec_and_container_details() {
    let summary = container_template().summary();
    let json = serde_json::to_value(&summary).unwrap();
    assert!(json.get("exec").is_none());
    assert!(json.get("container").is_none());
    assert_eq!(json["id"], "minecraft");
}

#[test]
fn stop_timeout_honors_template_value() {
    let mut t = container_template();
    t.exec.stop_timeout_secs = Some(90);
    assert_eq!(t.stop_timeout(), Duration::from_secs(90));
}
