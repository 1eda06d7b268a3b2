use std::io::Write;

use super::*;

#[test]
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert!(settings.database.url.is_none());
    assert_eq!(settings.database.max_connections.get(), DEFAULT_DB_MAX_CONNECTIONS);
    assert_eq!(settings.pools.size.get(), 1_000);
    assert_eq!(settings.pools.refill_interval, Duration::from_secs(1));
    assert_eq!(settings.batcher.max_batch.get(), 100);
    assert_eq!(settings.batcher.flush_interval, Duration::from_secs(1));
    assert!(settings.batcher.tables.contains("keywords"));
    assert!(settings.classifier.rules_path.is_none());
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.batcher.max_batch = Some(10);
    raw.logging.level = Some("info".to_string());

    let overrides = RunOverrides {
        batcher_max_batch: Some(25),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_run_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.batcher.max_batch.get(), 25);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    raw.apply_run_overrides(&RunOverrides {
        log_json: Some(true),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_batch_size_is_rejected() {
    let mut raw = RawSettings::default();
    raw.batcher.max_batch = Some(0);

    let err = Settings::from_raw(raw).expect_err("invalid");
    assert!(matches!(err, LoadError::Invalid { key: "batcher.max_batch", .. }));
}

#[test]
fn batcher_tables_must_be_identifiers() {
    let mut raw = RawSettings::default();
    raw.batcher.tables = Some(vec!["keywords".into(), "users; --".into()]);

    let err = Settings::from_raw(raw).expect_err("invalid");
    assert!(matches!(err, LoadError::Invalid { key: "batcher.tables", .. }));
}

#[test]
fn refill_threshold_must_be_a_fraction() {
    for value in [0.0, 1.5, f64::NAN] {
        let mut raw = RawSettings::default();
        raw.pools.refill_threshold = Some(value);
        let err = Settings::from_raw(raw).expect_err("invalid");
        assert!(matches!(err, LoadError::Invalid { key: "pools.refill_threshold", .. }));
    }
}

#[test]
fn blank_database_url_is_treated_as_missing() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".into());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn config_file_layer_is_loaded() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    writeln!(
        file,
        "[batcher]\nmax_batch = 7\ntables = [\"keywords\"]\n\n[classifier]\nrules_path = \"rules.toml\""
    )
    .expect("write");

    let args = CliArgs::parse_from([
        "pagepool",
        "--config-file",
        file.path().to_str().expect("utf-8 path"),
        "run",
        "--batcher-flush-interval-ms",
        "250",
    ]);
    let settings = load(&args).expect("settings");

    assert_eq!(settings.batcher.max_batch.get(), 7);
    assert_eq!(settings.batcher.flush_interval, Duration::from_millis(250));
    assert_eq!(
        settings.batcher.tables.iter().collect::<Vec<_>>(),
        vec!["keywords"]
    );
    assert_eq!(
        settings.classifier.rules_path.as_deref(),
        Some(std::path::Path::new("rules.toml"))
    );
}

#[test]
fn parse_detect_arguments() {
    let args = CliArgs::parse_from([
        "pagepool",
        "detect",
        "--classifier-rules",
        "/etc/pagepool/rules.toml",
        "Googlebot/2.1",
        "curl/8.0",
    ]);

    match args.command.expect("detect command") {
        Command::Detect(detect) => {
            assert_eq!(
                detect.classifier.rules_path.as_deref(),
                Some(std::path::Path::new("/etc/pagepool/rules.toml"))
            );
            assert_eq!(detect.inputs, vec!["Googlebot/2.1", "curl/8.0"]);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn default_to_run_command() {
    let args = CliArgs::parse_from(["pagepool"]);
    let command = args
        .command
        .unwrap_or(Command::Run(Box::<RunArgs>::default()));
    assert!(matches!(command, Command::Run(_)));
}
