use assert_cmd::Command;
use predicates::prelude::*;

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*; // needed for .with()
use tracing_subscriber::{layer::Context, Layer, Registry};

const ENV_VARS: &[&str] = &[
    "STORAGE_ACCOUNT_NAME",
    "STORAGE_ACCESS_KEY",
    "STORAGE_CONTAINER",
    "STORAGE_ENDPOINT",
    "STORAGE_PUBLIC_ACCESS",
    "FTPSERVER",
    "FTPPORT",
    "FTPUSERNAME",
    "FTPPASSWORD",
    "FTPPATH",
    "FTPTIMEOUT",
];

fn clean_command() -> Command {
    let mut cmd = Command::cargo_bin("ftp-blob-sync").expect("Binary exists");
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn sync_help_lists_every_flag() {
    let mut cmd = clean_command();
    cmd.arg("sync").arg("--help");
    cmd.assert().success().stdout(
        predicate::str::contains("--storageaccountname")
            .and(predicate::str::contains("--storageaccountkey"))
            .and(predicate::str::contains("--storagecontainer"))
            .and(predicate::str::contains("--ftpserver"))
            .and(predicate::str::contains("--ftpport"))
            .and(predicate::str::contains("--ftpusername"))
            .and(predicate::str::contains("--ftppassword"))
            .and(predicate::str::contains("--ftppath"))
            .and(predicate::str::contains("--config")),
    );
}

#[test]
fn placeholder_storage_key_is_a_fatal_precondition() {
    // With no flags at all every setting falls back to its placeholder, and the
    // placeholder key is not base64: the run must stop before touching the network.
    let mut cmd = clean_command();
    cmd.arg("sync");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Error generating key to storage account"))
        .stdout(predicate::str::contains("Received").not());
}

#[test]
fn invalid_port_is_rejected() {
    let mut cmd = clean_command();
    cmd.args(["sync", "--ftpport", "twenty-one"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid FTP port"));
}

#[test]
fn unreachable_ftp_server_fails_to_start() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut cmd = clean_command();
    cmd.args([
        "sync",
        "-s",
        "127.0.0.1",
        "-t",
        &port.to_string(),
        "-k",
        "c2VjcmV0LWtleQ==",
        "--timeout",
        "1",
    ]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("cannot connect to remote source"));
}

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let msg = format!("{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use ftp_blob_sync::cli::{run, Cli, Commands, SyncArgs};

    // A missing config file makes the run fail early, after the start-up event.
    let cli = Cli {
        command: Commands::Sync(SyncArgs {
            config: Some(std::path::PathBuf::from("dummy.yaml")),
            ..Default::default()
        }),
    };

    let result = run(cli).await;
    assert!(result.is_err());

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}

#[test]
fn summary_lists_counts_then_failures() {
    use ftp_blob_sync::cli::summary_lines;
    use ftp_blob_sync_core::report::{FailureStage, ItemOutcome, SyncReport};

    let mut report = SyncReport::default();
    report.record("a.txt", ItemOutcome::Created);
    report.record_directory();
    report.record(
        "b.txt",
        ItemOutcome::failed(FailureStage::Write, "storage request failed with status 503"),
    );

    let lines = summary_lines(&report);
    assert_eq!(
        lines,
        vec![
            "Received 2 files.".to_string(),
            "2 files processed: 1 created, 0 replaced, 0 unchanged, 1 failed (1 directories skipped)"
                .to_string(),
            "  b.txt: write failed: storage request failed with status 503".to_string(),
        ]
    );
}
