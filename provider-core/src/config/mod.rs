use crate::error::ProviderError;
use config::{Config as Cfg, Environment, File};
use serde::de::DeserializeOwned;

/// Load settings from an optional file named `file_stem` (any format the
/// `config` crate recognizes) overlaid with `<ENV_PREFIX>_*` variables.
///
/// Variable names are lowercased after the prefix, so `CONSUL_HTTP_ADDR`
/// lands in the `http_addr` key.
pub fn load_layered<T: DeserializeOwned>(file_stem: &str, env_prefix: &str) -> Result<T, ProviderError> {
    dotenvy::dotenv().ok();

    let config = Cfg::builder()
        .add_source(File::with_name(file_stem).required(false))
        .add_source(Environment::with_prefix(env_prefix))
        .build()?;

    Ok(config.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serial_test::serial;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct Sample {
        address: Option<String>,
        http_token: Option<String>,
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "address = \"file:8500\"").unwrap();
        writeln!(file, "http_token = \"from-file\"").unwrap();

        std::env::set_var("PCTEST_ADDRESS", "env:8500");
        let stem = dir.path().join("sample");
        let sample: Sample = load_layered(stem.to_str().unwrap(), "PCTEST").unwrap();
        std::env::remove_var("PCTEST_ADDRESS");

        assert_eq!(sample.address.as_deref(), Some("env:8500"));
        assert_eq!(sample.http_token.as_deref(), Some("from-file"));
    }
}
