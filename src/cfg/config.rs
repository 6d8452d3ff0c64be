// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};

use crate::cfg::enums::{DrainPolicy, SessionKind};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Connection identity: transport endpoint plus protocol-specific
    /// login identity.
    pub identity: Identity,
    /// Heartbeat and connect-timeout knobs.
    pub timers: Timers,
    /// Defensive limits applied by the byte reader.
    pub limits: Limits,
    /// Which session kind this config drives.
    pub session: SessionKind,
    /// Implementation/runtime parameters that live outside either wire
    /// protocol.
    pub runtime: RuntimeConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Identity {
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "Port")]
    pub port: u16,
    #[serde(default, rename = "SoupBinTCP", skip_serializing_if = "Option::is_none")]
    pub soup: Option<SoupIdentity>,
    #[serde(default, rename = "FIX", skip_serializing_if = "Option::is_none")]
    pub fix: Option<FixIdentity>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SoupIdentity {
    #[serde(rename = "Username")]
    pub user: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Session", default)]
    pub session: String,
    #[serde(rename = "Sequence", default = "default_soup_sequence")]
    pub sequence: String,
}

fn default_soup_sequence() -> String {
    "0".to_string()
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FixIdentity {
    #[serde(rename = "SenderCompID")]
    pub sender_comp_id: String,
    #[serde(rename = "TargetCompID")]
    pub target_comp_id: String,
    #[serde(default, rename = "SenderSubID")]
    pub sender_sub_id: String,
    #[serde(rename = "BeginString")]
    pub begin_string: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Timers {
    #[serde(rename = "HeartbeatInterval", with = "serde_secs")]
    pub heartbeat_interval: Duration,
    #[serde(rename = "TolerateMissedHeartbeats", default)]
    pub tolerate_missed_heartbeats: u32,
    #[serde(rename = "ConnectTimeout", with = "serde_secs", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Limits {
    #[serde(rename = "MaxFrameLength", default = "default_max_frame_length")]
    pub max_frame_length: u32,
}

fn default_max_frame_length() -> u32 {
    64 * 1024
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    #[serde(rename = "GracefulShutdown", default)]
    pub graceful_shutdown: bool,
    #[serde(rename = "DrainPolicy", default)]
    pub drain_policy: DrainPolicy,
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config = serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and fills derived defaults.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(!self.identity.host.is_empty(), "Host must not be empty");
        ensure!(self.identity.port != 0, "Port must not be zero");
        ensure!(
            !self.timers.heartbeat_interval.is_zero(),
            "HeartbeatInterval must be greater than zero"
        );
        if self.timers.tolerate_missed_heartbeats == 0 {
            self.timers.tolerate_missed_heartbeats = 2;
        }
        ensure!(self.limits.max_frame_length > 0, "MaxFrameLength must be greater than zero");

        match self.session {
            SessionKind::SoupBinTcp => {
                if self.identity.soup.is_none() {
                    bail!("session kind SoupBinTCP requires an [identity.SoupBinTCP] block");
                }
            },
            SessionKind::Fix => {
                let Some(fix) = &self.identity.fix else {
                    bail!("session kind FIX requires an [identity.FIX] block");
                };
                ensure!(!fix.sender_comp_id.is_empty(), "SenderCompID must not be empty");
                ensure!(!fix.target_comp_id.is_empty(), "TargetCompID must not be empty");
                ensure!(!fix.begin_string.is_empty(), "BeginString must not be empty");
            },
        }

        Ok(())
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_yaml(session_block: &str) -> String {
        format!(
            r#"
identity:
  Host: "fix.example.com"
  Port: 9001
{session_block}
timers:
  HeartbeatInterval: 30
limits:
  MaxFrameLength: 65536
session: FIX
runtime:
  GracefulShutdown: true
  DrainPolicy: Replay
"#
        )
    }

    #[test]
    fn loads_and_normalizes_fix_config() {
        let yaml = base_yaml(
            r#"  FIX:
    SenderCompID: "CLIENT"
    TargetCompID: "EXCHANGE"
    BeginString: "FIX.4.4"
"#,
        );
        let mut cfg: Config = serde_yaml::from_str(&yaml).expect("parse");
        cfg.validate_and_normalize().expect("validate");
        assert_eq!(cfg.timers.tolerate_missed_heartbeats, 2);
        assert_eq!(cfg.timers.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn rejects_fix_session_without_fix_identity() {
        let yaml = base_yaml("");
        let mut cfg: Config = serde_yaml::from_str(&yaml).expect("parse");
        assert!(cfg.validate_and_normalize().is_err());
    }

    #[test]
    fn rejects_zero_heartbeat_interval() {
        let yaml = r#"
identity:
  Host: "soup.example.com"
  Port: 12345
  SoupBinTCP:
    Username: "user"
    Password: "pass"
timers:
  HeartbeatInterval: 0
limits: {}
session: SoupBinTCP
runtime: {}
"#;
        let mut cfg: Config = serde_yaml::from_str(yaml).expect("parse");
        assert!(cfg.validate_and_normalize().is_err());
    }
}
