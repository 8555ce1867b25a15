//! Provider settings: built-in defaults, an optional settings file, `CONSUL_*`
//! environment variables, and finally the host-provided provider block.

use provider_core::config::load_layered;
use provider_core::utils::parse_duration;
use provider_core::{ProviderError, Result};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use validator::{Validate, ValidationError};

pub const SETTINGS_FILE: &str = "consul-provider";
pub const ENV_PREFIX: &str = "CONSUL";

#[derive(Debug, Clone, Validate)]
pub struct ProviderSettings {
    #[validate(custom(function = "validate_address"))]
    pub address: String,
    #[validate(custom(function = "validate_scheme"))]
    pub scheme: String,
    pub http_auth: Option<Secret<String>>,
    pub datacenter: Option<String>,
    pub token: Option<Secret<String>>,
    pub namespace: Option<String>,
    pub partition: Option<String>,
    pub ca_file: Option<String>,
    pub ca_path: Option<String>,
    pub ca_pem: Option<String>,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub cert_pem: Option<String>,
    pub key_pem: Option<Secret<String>>,
    pub insecure_https: bool,
    pub headers: BTreeMap<String, String>,
    pub allow_stale: bool,
    pub require_consistent: bool,
    #[validate(custom(function = "validate_duration"))]
    pub wait_time: String,
    #[validate(custom(function = "validate_duration"))]
    pub request_timeout: String,
    #[validate(range(min = 1, max = 100))]
    pub attachment_max_attempts: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8500".to_string(),
            scheme: "http".to_string(),
            http_auth: None,
            datacenter: None,
            token: None,
            namespace: None,
            partition: None,
            ca_file: None,
            ca_path: None,
            ca_pem: None,
            cert_file: None,
            key_file: None,
            cert_pem: None,
            key_pem: None,
            insecure_https: false,
            headers: BTreeMap::new(),
            allow_stale: true,
            require_consistent: false,
            wait_time: String::new(),
            request_timeout: "60s".to_string(),
            attachment_max_attempts: 5,
        }
    }
}

/// What the settings file and the environment may provide. Every value is
/// optional and textual; the `http_*` names are the fallbacks for the
/// shorter names.
#[derive(Default, Deserialize)]
pub(crate) struct SettingsLayer {
    address: Option<String>,
    http_addr: Option<String>,
    scheme: Option<String>,
    http_scheme: Option<String>,
    http_auth: Option<String>,
    datacenter: Option<String>,
    token: Option<String>,
    http_token: Option<String>,
    namespace: Option<String>,
    partition: Option<String>,
    ca_file: Option<String>,
    capath: Option<String>,
    ca_path: Option<String>,
    ca_pem: Option<String>,
    cert_file: Option<String>,
    key_file: Option<String>,
    cert_pem: Option<String>,
    key_pem: Option<String>,
    insecure_https: Option<String>,
    headers: Option<BTreeMap<String, String>>,
    allow_stale: Option<String>,
    require_consistent: Option<String>,
    wait_time: Option<String>,
    request_timeout: Option<String>,
    attachment_max_attempts: Option<String>,
}

impl ProviderSettings {
    /// Resolve the full layering and validate the result.
    pub fn load(explicit: &Map<String, Value>) -> Result<Self> {
        let layer: SettingsLayer = load_layered(SETTINGS_FILE, ENV_PREFIX)?;
        Self::from_layers(layer, explicit)
    }

    pub(crate) fn from_layers(layer: SettingsLayer, explicit: &Map<String, Value>) -> Result<Self> {
        let mut s = Self::default();
        s.apply_layer(layer)?;
        s.apply_explicit(explicit)?;
        s.normalize_address();
        s.check()?;
        Ok(s)
    }

    fn apply_layer(&mut self, l: SettingsLayer) -> Result<()> {
        set_if(&mut self.address, l.address.or(l.http_addr));
        set_if(&mut self.scheme, l.scheme.or(l.http_scheme));
        if let Some(auth) = l.http_auth {
            self.http_auth = Some(Secret::new(auth));
        }
        set_opt(&mut self.datacenter, l.datacenter);
        if let Some(token) = l.token.or(l.http_token) {
            self.token = Some(Secret::new(token));
        }
        set_opt(&mut self.namespace, l.namespace);
        set_opt(&mut self.partition, l.partition);
        set_opt(&mut self.ca_file, l.ca_file);
        set_opt(&mut self.ca_path, l.ca_path.or(l.capath));
        set_opt(&mut self.ca_pem, l.ca_pem);
        set_opt(&mut self.cert_file, l.cert_file);
        set_opt(&mut self.key_file, l.key_file);
        set_opt(&mut self.cert_pem, l.cert_pem);
        if let Some(key) = l.key_pem {
            self.key_pem = Some(Secret::new(key));
        }
        if let Some(v) = l.insecure_https {
            self.insecure_https = parse_bool("insecure_https", &v)?;
        }
        if let Some(headers) = l.headers {
            self.headers.extend(headers);
        }
        if let Some(v) = l.allow_stale {
            self.allow_stale = parse_bool("allow_stale", &v)?;
        }
        if let Some(v) = l.require_consistent {
            self.require_consistent = parse_bool("require_consistent", &v)?;
        }
        set_if(&mut self.wait_time, l.wait_time);
        set_if(&mut self.request_timeout, l.request_timeout);
        if let Some(v) = l.attachment_max_attempts {
            self.attachment_max_attempts = v.trim().parse().map_err(|_| {
                ProviderError::invalid(format!("attachment_max_attempts: {:?} is not a number", v))
            })?;
        }
        Ok(())
    }

    fn apply_explicit(&mut self, c: &Map<String, Value>) -> Result<()> {
        let text = |key: &str| {
            c.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let flag = |key: &str| c.get(key).and_then(Value::as_bool);

        set_if(&mut self.address, text("address"));
        set_if(&mut self.scheme, text("scheme"));
        if let Some(auth) = text("http_auth") {
            self.http_auth = Some(Secret::new(auth));
        }
        set_opt(&mut self.datacenter, text("datacenter"));
        if let Some(token) = text("token") {
            self.token = Some(Secret::new(token));
        }
        set_opt(&mut self.namespace, text("namespace"));
        set_opt(&mut self.partition, text("partition"));
        set_opt(&mut self.ca_file, text("ca_file"));
        set_opt(&mut self.ca_path, text("ca_path"));
        set_opt(&mut self.ca_pem, text("ca_pem"));
        set_opt(&mut self.cert_file, text("cert_file"));
        set_opt(&mut self.key_file, text("key_file"));
        set_opt(&mut self.cert_pem, text("cert_pem"));
        if let Some(key) = text("key_pem") {
            self.key_pem = Some(Secret::new(key));
        }
        if let Some(v) = flag("insecure_https") {
            self.insecure_https = v;
        }
        if let Some(headers) = c.get("headers").and_then(Value::as_object) {
            for (k, v) in headers {
                let v = v.as_str().ok_or_else(|| {
                    ProviderError::invalid(format!("headers.{}: expected a string", k))
                })?;
                self.headers.insert(k.clone(), v.to_string());
            }
        }
        if let Some(v) = flag("allow_stale") {
            self.allow_stale = v;
        }
        if let Some(v) = flag("require_consistent") {
            self.require_consistent = v;
        }
        set_if(&mut self.wait_time, text("wait_time"));
        set_if(&mut self.request_timeout, text("request_timeout"));
        if let Some(v) = c.get("attachment_max_attempts").and_then(Value::as_u64) {
            self.attachment_max_attempts = u32::try_from(v).unwrap_or(u32::MAX);
        }
        Ok(())
    }

    /// A scheme prefix on the address overrides `scheme`.
    fn normalize_address(&mut self) {
        for scheme in ["https", "http"] {
            let prefix = format!("{}://", scheme);
            if let Some(rest) = self.address.strip_prefix(&prefix) {
                self.address = rest.trim_end_matches('/').to_string();
                self.scheme = scheme.to_string();
                return;
            }
        }
    }

    fn check(&self) -> Result<()> {
        self.validate().map_err(|e| {
            ProviderError::invalid(format!("invalid provider settings: {}", e))
        })?;

        if let Some(auth) = &self.http_auth {
            let user = auth.expose_secret().split(':').next().unwrap_or("");
            if user.is_empty() {
                return Err(ProviderError::invalid(
                    "http_auth must have the form \"user[:password]\"",
                ));
            }
        }
        if self.cert_file.is_some() != self.key_file.is_some() {
            return Err(ProviderError::invalid(
                "cert_file and key_file must be set together",
            ));
        }
        if self.cert_pem.is_some() != self.key_pem.is_some() {
            return Err(ProviderError::invalid(
                "cert_pem and key_pem must be set together",
            ));
        }
        Ok(())
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.address)
    }

    pub fn wait_time(&self) -> Result<Option<Duration>> {
        if self.wait_time.is_empty() {
            return Ok(None);
        }
        parse_duration(&self.wait_time).map(Some)
    }

    pub fn request_timeout(&self) -> Result<Duration> {
        parse_duration(&self.request_timeout)
    }

    /// `http_auth` split into user and optional password.
    pub fn basic_auth(&self) -> Option<(String, Option<String>)> {
        self.http_auth.as_ref().map(|auth| {
            let auth = auth.expose_secret();
            match auth.split_once(':') {
                Some((user, password)) => (user.to_string(), Some(password.to_string())),
                None => (auth.to_string(), None),
            }
        })
    }
}

fn set_if(target: &mut String, value: Option<String>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        *target = v;
    }
}

fn set_opt(target: &mut Option<String>, value: Option<String>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        *target = Some(v);
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => Err(ProviderError::invalid(format!(
            "{}: {:?} is not a boolean",
            key, other
        ))),
    }
}

fn validate_address(address: &str) -> std::result::Result<(), ValidationError> {
    let host_port = address
        .strip_prefix("https://")
        .or_else(|| address.strip_prefix("http://"))
        .unwrap_or(address)
        .trim_end_matches('/');
    let valid = match host_port.rsplit_once(':') {
        _ if host_port.is_empty() || host_port.contains('/') => false,
        Some((host, port)) if !host.starts_with('[') || host.ends_with(']') => {
            !host.is_empty() && port.parse::<u16>().is_ok()
        }
        _ => true,
    };
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("address must be host[:port]"))
    }
}

fn validate_scheme(scheme: &str) -> std::result::Result<(), ValidationError> {
    match scheme {
        "http" | "https" => Ok(()),
        _ => Err(ValidationError::new("scheme must be http or https")),
    }
}

fn validate_duration(text: &str) -> std::result::Result<(), ValidationError> {
    if text.is_empty() || parse_duration(text).is_ok() {
        Ok(())
    } else {
        Err(ValidationError::new("invalid duration"))
    }
}
