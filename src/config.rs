//! Configuration loading. A TOML file maps per-device tokens to the settings
//! the ingress and archive path need; everything else (bind addresses,
//! SMTP relay, serial port) belongs to the binary that wires this crate up,
//! not to the core.
use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::errors::CoreError;

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// The bearer token an ingress upload must carry to be attributed to
    /// this device.
    pub token: String,
    /// Whether this device's modem prepends an SMSC address to its PDUs.
    #[serde(default)]
    pub smsc_prefix: bool,
    /// Mailbox that receives this device's forwarded digests.
    pub receiver: String,
    /// Address the digest is sent "from".
    pub forward_to: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    device: HashMap<String, DeviceConfig>,
}

/// The loaded, indexed configuration. Built once at startup; device lookup
/// by token is a single hash map probe.
#[derive(Debug, Clone, Default)]
pub struct Config {
    by_token: HashMap<String, (i64, DeviceConfig)>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, CoreError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("reading {}: {e}", path.display())))?;
        Self::parse(&text)
    }

    pub(crate) fn parse(text: &str) -> Result<Config, CoreError> {
        let raw: RawConfig = toml::from_str(text).map_err(|e| CoreError::Config(e.to_string()))?;
        let mut by_token = HashMap::new();
        for (key, device) in raw.device {
            let id: i64 = key
                .parse()
                .map_err(|_| CoreError::Config(format!("device table key {key:?} is not an integer id")))?;
            by_token.insert(device.token.clone(), (id, device));
        }
        Ok(Config { by_token })
    }

    /// Resolve an ingress token to a device id and its settings.
    /// `ConfigMissing` in the error-handling table of the core design.
    pub fn device_for_token(&self, token: &str) -> Option<(i64, &DeviceConfig)> {
        self.by_token.get(token).map(|(id, cfg)| (*id, cfg))
    }

    /// Look up a device's settings by its store-assigned id, for the
    /// notification-flush path which only ever sees the id.
    pub fn device(&self, id: i64) -> Option<&DeviceConfig> {
        self.by_token.values().find(|(dev_id, _)| *dev_id == id).map(|(_, cfg)| cfg)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_device_table_keyed_by_integer_id() {
        let text = r#"
            [device.1]
            token = "abc123"
            smsc_prefix = true
            receiver = "ops@example.com"
            forward_to = "noreply@example.com"
        "#;
        let cfg = Config::parse(text).unwrap();
        let (id, dev) = cfg.device_for_token("abc123").unwrap();
        assert_eq!(id, 1);
        assert!(dev.smsc_prefix);
        assert_eq!(dev.receiver, "ops@example.com");
    }

    #[test]
    fn unknown_token_resolves_to_none() {
        let cfg = Config::default();
        assert!(cfg.device_for_token("nope").is_none());
    }

    #[test]
    fn smsc_prefix_defaults_to_false() {
        let text = r#"
            [device.2]
            token = "xyz"
            receiver = "a@example.com"
            forward_to = "b@example.com"
        "#;
        let cfg = Config::parse(text).unwrap();
        let (_, dev) = cfg.device_for_token("xyz").unwrap();
        assert!(!dev.smsc_prefix);
    }
}
