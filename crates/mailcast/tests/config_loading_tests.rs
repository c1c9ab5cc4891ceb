//! Loading a config file and wiring the runtime from it.

mod common;

use tempfile::TempDir;

use common::write_config;
use mailcast::config::{load_config, TransportKind};
use mailcast::db::Database;
use mailcast::mailer;
use mailcast::{ConfigError, Dispatcher, Scheduler};

#[test]
fn test_yaml_config_drives_dispatcher_and_scheduler() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("store").join("mailcast.db");
    let path = write_config(
        dir.path(),
        "mailcast.yaml",
        &format!(
            "database_path: {}\nfrom_address: news@example.com\nscheduler:\n  job_id: nightly\n  interval_secs: 120\n",
            db_path.display()
        ),
    );

    let config = load_config(&path).unwrap();
    assert_eq!(config.transport, TransportKind::Log);

    let db = Database::open(&config.database_path().unwrap()).unwrap();
    assert!(db_path.exists());

    let dispatcher = Dispatcher::new(
        db.clone(),
        mailer::from_config(&config).unwrap(),
        config.from_address.clone(),
    );
    let scheduler = Scheduler::new(dispatcher, config.scheduler.clone());
    let job = scheduler.register().unwrap();
    assert_eq!(job.id, "nightly");
    assert_eq!(job.interval_secs, 120);
}

#[test]
fn test_json_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        dir.path(),
        "mailcast.json",
        r#"{"from_address": "news@example.com", "logging": {"level": "debug", "json": true}}"#,
    );
    let config = load_config(&path).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), "bad.yaml", "from_address: nobody\n");
    assert!(matches!(
        load_config(&path),
        Err(ConfigError::Validation { .. })
    ));
}
