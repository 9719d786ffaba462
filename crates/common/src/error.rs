//! Failures while reading pool configuration from disk

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The file parsed but a value is unusable (bad scheme, bad header).
    #[error("invalid pool configuration: {0}")]
    Config(String),

    #[error("cannot read pool configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("pool configuration is not valid TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_base_url_is_named_in_message() {
        let err = Error::Config("base_url must use http or https".into());
        assert_eq!(
            err.to_string(),
            "invalid pool configuration: base_url must use http or https"
        );
    }

    #[test]
    fn missing_file_keeps_io_kind() {
        let err: Error =
            std::io::Error::new(std::io::ErrorKind::NotFound, "data-service.toml").into();
        match &err {
            Error::Io(io) => assert_eq!(io.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected Io, got {other:?}"),
        }
        assert!(err.to_string().ends_with("data-service.toml"), "got: {err}");
    }

    #[test]
    fn truncated_toml_converts() {
        let parse: std::result::Result<toml::Table, _> = toml::from_str("base_url = ");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Toml(_)));
        assert!(
            err.to_string().starts_with("pool configuration is not valid TOML:"),
            "got: {err}"
        );
    }
}
