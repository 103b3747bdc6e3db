//! Config precedence: defaults, then file, then flags

use std::io::Write;

use clap::Parser;
use rpi_detect_streamer::cli::StreamArgs;
use rpi_detect_streamer::config::{CameraSource, ConfigError};
use rpi_detect_streamer::FailurePolicy;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn args_with_file(file: &NamedTempFile, flags: &[&str]) -> StreamArgs {
    let path = file.path().to_str().unwrap();
    let argv = ["detect-stream", "--config", path]
        .into_iter()
        .chain(flags.iter().copied());
    StreamArgs::try_parse_from(argv).unwrap()
}

#[test]
fn test_file_overrides_defaults_and_flags_override_file() {
    let file = write_config(
        r#"
[camera]
width = 800
height = 600

[server]
port = 9090
ip = "10.0.0.5"

[detector]
on-error = "skip"
"#,
    );

    let config = args_with_file(&file, &["-o", "7070", "--frameWidth", "320"])
        .resolve_config()
        .unwrap();

    // Flag beats file
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.camera.width, 320);
    // File beats default
    assert_eq!(config.server.ip, "10.0.0.5");
    assert_eq!(config.camera.height, 600);
    assert_eq!(config.detector.on_error, FailurePolicy::Skip);
    // Untouched keys keep defaults
    assert_eq!(config.detector.max_results, 3);
    assert_eq!(config.camera.source, CameraSource::Device);
}

#[test]
fn test_flag_repairs_invalid_file_value() {
    let file = write_config("[server]\nmax-clients = 0\n");

    let config = args_with_file(&file, &["--maxClients", "4"])
        .resolve_config()
        .unwrap();
    assert_eq!(config.server.max_clients, Some(4));
}

#[test]
fn test_invalid_file_value_without_flag_rejected() {
    let file = write_config("[server]\nmax-clients = 0\n");

    let result = args_with_file(&file, &[]).resolve_config();
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_flag_can_break_valid_file() {
    let file = write_config("[camera]\nwidth = 640\n");

    let result = args_with_file(&file, &["--numThreads", "0"]).resolve_config();
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_missing_config_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let args =
        StreamArgs::try_parse_from(["detect-stream", "-c", path.to_str().unwrap()]).unwrap();
    assert!(matches!(args.resolve_config(), Err(ConfigError::Io(_))));
}
