use super::*;

fn parse(args: &[&str]) -> anyhow::Result<AgentConfig> {
    let mut full = vec!["gateway-agent"];
    full.extend_from_slice(args);
    let config = <AgentConfig as clap::Parser>::try_parse_from(full)?;
    config.validate()?;
    Ok(config)
}

#[test]
fn minimal_args_parse_with_defaults() {
    let config = parse(&["--agent-id", "dev1"]).expect("should parse");
    assert_eq!(config.agent_id, "dev1");
    assert_eq!(config.port_min, 4096);
    assert_eq!(config.port_max, 4196);
    assert_eq!(config.launcher, LauncherKind::Child);
    assert_eq!(config.capabilities, vec!["worker".to_owned()]);
}

#[test]
fn empty_agent_id_is_rejected() {
    let err = parse(&["--agent-id", "  "]).expect_err("should reject blank id");
    assert!(err.to_string().contains("agent-id"));
}

#[test]
fn inverted_port_range_is_rejected() {
    let err = parse(&["--agent-id", "dev1", "--port-min", "9000", "--port-max", "8000"])
        .expect_err("should reject inverted range");
    assert!(err.to_string().contains("port-min"));
}

#[test]
fn zero_max_instances_is_rejected() {
    let err = parse(&["--agent-id", "dev1", "--max-instances", "0"])
        .expect_err("should reject zero instances");
    assert!(err.to_string().contains("max-instances"));
}

#[test]
fn allowed_paths_split_on_comma() {
    let config = parse(&["--agent-id", "dev1", "--allowed-paths", "/a,/b,/c"]).expect("should parse");
    assert_eq!(config.allowed_paths, vec!["/a", "/b", "/c"]);
}

#[test]
fn tmux_launcher_selectable() {
    let config = parse(&["--agent-id", "dev1", "--launcher", "tmux"]).expect("should parse");
    assert_eq!(config.launcher, LauncherKind::Tmux);
}
