use clap::Parser;
use serial_test::serial;
use std::fs::write;
use tempfile::NamedTempFile;

use ftp_blob_sync::cli::{Cli, Commands, SyncArgs};
use ftp_blob_sync::load_config::{load_config, parse_port, resolve_config};
use ftp_blob_sync_core::config::PublicAccess;

fn yaml_file(content: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("Creating temp config file failed");
    write(file.path(), content).expect("Writing temp config failed");
    file
}

fn sync_args(cli: Cli) -> SyncArgs {
    match cli.command {
        Commands::Sync(args) => args,
    }
}

#[test]
fn defaults_are_placeholders() {
    let config = resolve_config(&SyncArgs::default(), None).expect("defaults resolve");

    assert_eq!(config.remote.host, "ftpserver");
    assert_eq!(config.remote.port, 21);
    assert_eq!(config.remote.username, "ftpusername");
    assert_eq!(config.remote.password, "ftppassword");
    assert_eq!(config.remote.path, "/");
    assert_eq!(config.remote.connect_timeout_secs, 5);
    assert_eq!(config.sink.account_name, "storageaccountname");
    assert_eq!(config.sink.account_key, "storageaccountkey");
    assert_eq!(config.sink.container, "storagecontainer");
    assert_eq!(config.sink.endpoint, None);
    assert_eq!(config.sink.public_access, None);
}

#[test]
fn yaml_file_fills_in_settings() {
    let file = yaml_file(
        "ftp:\n  server: ftp.example.org\n  port: \":2121\"\n  username: reader\n  password: s3cret\n  path: /outgoing\n  timeout_secs: 10\nstorage:\n  account_name: exampleaccount\n  account_key: c2VjcmV0LWtleQ==\n  container: landing\n  public_access: blob\n",
    );

    let loaded = load_config(file.path()).expect("config loads");
    let config = resolve_config(&SyncArgs::default(), Some(loaded)).expect("config resolves");

    assert_eq!(config.remote.host, "ftp.example.org");
    assert_eq!(config.remote.port, 2121);
    assert_eq!(config.remote.username, "reader");
    assert_eq!(config.remote.password, "s3cret");
    assert_eq!(config.remote.path, "/outgoing");
    assert_eq!(config.remote.connect_timeout_secs, 10);
    assert_eq!(config.sink.account_name, "exampleaccount");
    assert_eq!(config.sink.container, "landing");
    assert_eq!(config.sink.public_access, Some(PublicAccess::Blob));
}

#[test]
fn flags_override_yaml_file() {
    let file = yaml_file("ftp:\n  server: from-file\n  port: 2121\nstorage:\n  container: from-file\n");
    let loaded = load_config(file.path()).unwrap();

    let args = SyncArgs {
        ftp_server: Some("from-flag".into()),
        storage_container: Some("from-flag".into()),
        ..Default::default()
    };
    let config = resolve_config(&args, Some(loaded)).unwrap();

    assert_eq!(config.remote.host, "from-flag");
    assert_eq!(config.remote.port, 2121);
    assert_eq!(config.sink.container, "from-flag");
}

#[test]
fn unknown_yaml_keys_are_rejected() {
    let file = yaml_file("ftp:\n  sever: typo.example.org\n");
    let err = load_config(file.path()).expect_err("typo should be rejected");
    assert!(err.to_string().contains("Failed to parse config YAML"));
}

#[test]
fn missing_file_is_reported() {
    let err = load_config("does/not/exist.yaml").expect_err("missing file");
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn invalid_container_name_is_rejected() {
    let args = SyncArgs {
        storage_container: Some("Has_Upper".into()),
        ..Default::default()
    };
    let err = resolve_config(&args, None).expect_err("invalid container");
    assert!(format!("{err:#}").contains("invalid container name"));
}

#[test]
fn port_accepts_leading_colon() {
    assert_eq!(parse_port("21").unwrap(), 21);
    assert_eq!(parse_port(":990").unwrap(), 990);
    assert!(parse_port("ftp").is_err());
    assert!(parse_port("70000").is_err());
}

#[test]
fn short_flags_parse() {
    let cli = Cli::try_parse_from([
        "ftp-blob-sync",
        "sync",
        "-n",
        "acct",
        "-k",
        "a2V5",
        "-c",
        "box",
        "-s",
        "ftp.local",
        "-t",
        ":2121",
        "-u",
        "me",
        "-p",
        "pw",
        "-a",
        "/in",
    ])
    .expect("arguments parse");
    let args = sync_args(cli);

    assert_eq!(args.storage_account_name.as_deref(), Some("acct"));
    assert_eq!(args.storage_account_key.as_deref(), Some("a2V5"));
    assert_eq!(args.storage_container.as_deref(), Some("box"));
    assert_eq!(args.ftp_server.as_deref(), Some("ftp.local"));
    assert_eq!(args.ftp_port.as_deref(), Some(":2121"));
    assert_eq!(args.ftp_username.as_deref(), Some("me"));
    assert_eq!(args.ftp_password.as_deref(), Some("pw"));
    assert_eq!(args.ftp_path.as_deref(), Some("/in"));
}

#[test]
#[serial]
fn environment_variables_feed_flags() {
    std::env::set_var("FTPSERVER", "ftp.from-env.example");
    std::env::set_var("STORAGE_CONTAINER", "env-container");

    let parsed = Cli::try_parse_from(["ftp-blob-sync", "sync"]);

    std::env::remove_var("FTPSERVER");
    std::env::remove_var("STORAGE_CONTAINER");

    let args = sync_args(parsed.expect("arguments parse"));
    assert_eq!(args.ftp_server.as_deref(), Some("ftp.from-env.example"));
    assert_eq!(args.storage_container.as_deref(), Some("env-container"));
}
