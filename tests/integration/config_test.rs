//! Configuration loading and flag precedence.

use std::io::Write;

use aws_athena_mcp::cli::Cli;
use aws_athena_mcp::config::{Config, Transport};
use clap::Parser;
use tempfile::NamedTempFile;
use tokio_test::{assert_err, assert_ok};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_file_then_flags() {
    let file = write_config(
        r#"
[athena]
region = "eu-west-1"
workgroup = "analysts"
output_location = "s3://athena-results/mcp/"

[server]
transport = "sse"
port = 8080
"#,
    );

    let cli = Cli::parse_from([
        "athena-mcp",
        "--config",
        file.path().to_str().unwrap(),
        "--workgroup",
        "adhoc",
        "--port",
        "9090",
    ]);

    let mut config = assert_ok!(Config::load_from_file(&cli.config_path()));
    cli.apply_to(&mut config);
    assert_ok!(config.validate());

    assert_eq!(config.athena.region.as_deref(), Some("eu-west-1"));
    assert_eq!(config.athena.workgroup.as_deref(), Some("adhoc"));
    assert_eq!(config.server.transport(), Transport::Sse);
    assert_eq!(config.server.port(), 9090);
    assert_eq!(config.server.host(), "127.0.0.1");
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_from_file(&dir.path().join("absent.toml")).unwrap();

    assert_eq!(config, Config::default());
    assert_eq!(config.server.transport(), Transport::Stdio);
    assert_eq!(config.polling.initial_interval_ms, 250);
}

#[test]
fn test_invalid_output_location_fails_validation() {
    let file = write_config(
        r#"
[athena]
output_location = "https://example.com/results"
"#,
    );

    let config = assert_ok!(Config::load_from_file(file.path()));
    let err = assert_err!(config.validate());
    assert!(err.to_string().contains("s3"));
}

#[test]
fn test_malformed_file_names_the_path() {
    let file = write_config("[athena\nregion = ");
    let err = assert_err!(Config::load_from_file(file.path()));
    assert!(err.to_string().contains(&file.path().display().to_string()));
}
