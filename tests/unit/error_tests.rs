//! Unit tests for the application error enumeration.

use testrig::errors::AppError;

#[test]
fn display_prefixes_each_variant() {
    assert_eq!(AppError::Config("bad".into()).to_string(), "config: bad");
    assert_eq!(
        AppError::Resolution("missing".into()).to_string(),
        "resolution: missing"
    );
    assert_eq!(AppError::Sut("gone".into()).to_string(), "sut: gone");
    assert_eq!(
        AppError::Scheduler("stalled".into()).to_string(),
        "scheduler: stalled"
    );
    assert_eq!(AppError::Export("disk".into()).to_string(), "export: disk");
    assert_eq!(AppError::Io("denied".into()).to_string(), "io: denied");
}

#[test]
fn command_timeout_quotes_the_command_text() {
    let err = AppError::CommandTimeout("sleep 30".into());
    assert_eq!(err.to_string(), "command timeout: \"sleep 30\"");
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
    let err = AppError::from(io);
    assert!(matches!(err, AppError::Io(_)));
}

#[test]
fn toml_errors_convert_to_config() {
    let toml_err = toml::from_str::<toml::Value>("= broken").expect_err("invalid toml");
    let err = AppError::from(toml_err);
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn regex_errors_convert_to_config() {
    let regex_err = regex::Regex::new("([unclosed").expect_err("invalid regex");
    let err = AppError::from(regex_err);
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn is_a_std_error() {
    let err: Box<dyn std::error::Error> = Box::new(AppError::Config("bad".into()));
    assert!(err.to_string().starts_with("config:"));
}
