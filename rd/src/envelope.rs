//! Request envelopes - one unit of work before transport

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parameter carrying the per-call access token
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Parameter carrying the protocol version
pub const VERSION_PARAM: &str = "v";

/// Parameter carrying the response locale
pub const LANG_PARAM: &str = "lang";

/// A single remote method call: method name plus form parameters
///
/// Parameters are key-ordered so the encoded body is stable. An envelope is
/// mutated only while it is being prepared (auth, defaults); once handed to
/// the dispatcher it is owned by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub method: String,

    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Envelope {
    /// Create an envelope with no parameters
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: BTreeMap::new(),
        }
    }

    /// Builder-style parameter setter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Set (or overwrite) a parameter
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Look up a parameter
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Attach the access token for this call
    pub fn attach_auth(mut self, access_token: &str) -> Self {
        debug!(method = %self.method, "Envelope::attach_auth: called");
        self.set(ACCESS_TOKEN_PARAM, access_token);
        self
    }

    /// Inject the shared protocol defaults (version and locale)
    pub fn apply_defaults(&mut self, defaults: &EnvelopeDefaults) {
        debug!(method = %self.method, ?defaults, "Envelope::apply_defaults: called");
        self.set(LANG_PARAM, defaults.lang.as_str());
        self.set(VERSION_PARAM, defaults.version.as_str());
    }

    /// Copy with the access token masked, for logs and reports
    pub fn redacted(&self) -> Envelope {
        let mut copy = self.clone();
        if let Some(token) = copy.params.get_mut(ACCESS_TOKEN_PARAM) {
            *token = "***".to_string();
        }
        copy
    }

    /// Full endpoint URL for this method under `base_url`
    pub fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url, self.method)
    }
}

/// Produces an envelope for a call, given the caller's access token
pub trait ToEnvelope {
    fn to_envelope(&self, access_token: &str) -> Envelope;
}

impl ToEnvelope for Envelope {
    fn to_envelope(&self, access_token: &str) -> Envelope {
        self.clone().attach_auth(access_token)
    }
}

/// Shared defaults stamped onto every envelope at submission time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeDefaults {
    pub version: String,
    pub lang: String,
}

impl EnvelopeDefaults {
    pub fn new(version: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            lang: lang.into(),
        }
    }
}

/// Parse a `key=value` pair as given on the command line
pub fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid parameter '{}', expected key=value", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_auth_sets_token() {
        let env = Envelope::new("users.get").param("user_ids", "1").attach_auth("secret");
        assert_eq!(env.get(ACCESS_TOKEN_PARAM), Some("secret"));
        assert_eq!(env.get("user_ids"), Some("1"));
    }

    #[test]
    fn test_to_envelope_leaves_original_untouched() {
        let original = Envelope::new("users.get");
        let prepared = original.to_envelope("secret");
        assert_eq!(original.get(ACCESS_TOKEN_PARAM), None);
        assert_eq!(prepared.get(ACCESS_TOKEN_PARAM), Some("secret"));
    }

    #[test]
    fn test_redacted_masks_token() {
        let env = Envelope::new("users.get").attach_auth("secret");
        let shown = env.redacted();
        assert_eq!(shown.get(ACCESS_TOKEN_PARAM), Some("***"));
        assert_eq!(env.get(ACCESS_TOKEN_PARAM), Some("secret"));
        assert_eq!(Envelope::new("m").redacted().get(ACCESS_TOKEN_PARAM), None);
    }

    #[test]
    fn test_apply_defaults_overwrites() {
        let mut env = Envelope::new("users.get").param("v", "1.0");
        env.apply_defaults(&EnvelopeDefaults::new("5.131", "en"));
        assert_eq!(env.get(VERSION_PARAM), Some("5.131"));
        assert_eq!(env.get(LANG_PARAM), Some("en"));
    }

    #[test]
    fn test_url_concatenates_method() {
        let env = Envelope::new("users.get");
        assert_eq!(env.url("https://api.vk.com/method/"), "https://api.vk.com/method/users.get");
    }

    #[test]
    fn test_params_are_key_ordered() {
        let env = Envelope::new("m").param("z", "1").param("a", "2").param("m", "3");
        let keys: Vec<_> = env.params.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "m", "z"]);
    }

    #[test]
    fn test_deserialize_without_params() {
        let env: Envelope = serde_json::from_str(r#"{"method":"status.get"}"#).unwrap();
        assert_eq!(env.method, "status.get");
        assert!(env.params.is_empty());
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("a=b").unwrap(), ("a".to_string(), "b".to_string()));
        assert_eq!(parse_param("q=x=y").unwrap(), ("q".to_string(), "x=y".to_string()));
        assert_eq!(parse_param("empty=").unwrap(), ("empty".to_string(), String::new()));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=v").is_err());
    }
}
