use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

pub const CONFIG_PATH_ENV: &str = "OVERTIME_KIOSK_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "kiosk-settings.json";

/// Business policy for the scanner. The observed deployment admits scans
/// between 20:30 and 22:00, closes the scanner at 22:01 and caps live
/// durations at 22:00.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanPolicy {
    #[serde(with = "clock_time")]
    pub allowed_start: NaiveTime,
    #[serde(with = "clock_time")]
    pub allowed_end: NaiveTime,
    #[serde(with = "clock_time")]
    pub shutdown_at: NaiveTime,
    #[serde(with = "clock_time")]
    pub shift_end_bound: NaiveTime,
    pub dedup_window_ms: u64,
    pub shutdown_poll_interval_ms: u64,
    pub duration_refresh_interval_ms: u64,
    /// Upper bound on each remote store call.
    pub store_timeout_ms: u64,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            allowed_start: hm(20, 30),
            allowed_end: hm(22, 0),
            shutdown_at: hm(22, 1),
            shift_end_bound: hm(22, 0),
            dedup_window_ms: 1_500,
            shutdown_poll_interval_ms: 10_000,
            duration_refresh_interval_ms: 60_000,
            store_timeout_ms: 8_000,
        }
    }
}

impl ScanPolicy {
    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.dedup_window_ms as i64)
    }

    pub fn shutdown_poll_interval(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_interval_ms)
    }

    pub fn duration_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.duration_refresh_interval_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.shutdown_poll_interval_ms == 0 {
            bail!("shutdown_poll_interval_ms must be greater than zero");
        }
        if self.duration_refresh_interval_ms == 0 {
            bail!("duration_refresh_interval_ms must be greater than zero");
        }
        if self.store_timeout_ms == 0 {
            bail!("store_timeout_ms must be greater than zero");
        }
        Ok(())
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreSettings {
    Sqlite {
        path: PathBuf,
    },
    Http {
        base_url: String,
        #[serde(default)]
        api_key: Option<String>,
    },
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings::Sqlite {
            path: PathBuf::from("overtime.sqlite3"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KioskSettings {
    pub policy: ScanPolicy,
    pub store: StoreSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<KioskSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            let parsed: KioskSettings = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings in {}", path.display()))?;
            parsed
                .policy
                .validate()
                .with_context(|| format!("Invalid scan policy in {}", path.display()))?;
            parsed
        } else {
            KioskSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Resolve the settings path from an explicit flag, then the environment.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> KioskSettings {
        self.read().clone()
    }

    pub fn policy(&self) -> ScanPolicy {
        self.read().policy.clone()
    }

    pub fn update_policy(&self, policy: ScanPolicy) -> Result<()> {
        policy.validate()?;
        let mut guard = self.write();
        guard.policy = policy;
        self.persist(&guard)
    }

    fn persist(&self, data: &KioskSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, KioskSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, KioskSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Parse `"HH:MM"` or `"HH:MM:SS"`.
pub fn parse_clock_time(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .with_context(|| format!("invalid time of day '{raw}'"))
}

/// `"HH:MM"` on disk; seconds are accepted when present.
mod clock_time {
    use chrono::{NaiveTime, Timelike};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        let format = if value.second() == 0 {
            "%H:%M"
        } else {
            "%H:%M:%S"
        };
        serializer.serialize_str(&value.format(format).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_clock_time(&raw).map_err(|err| D::Error::custom(format!("{err:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("absent.json")).unwrap();
        assert_eq!(store.settings(), KioskSettings::default());
        assert_eq!(store.policy().dedup_window_ms, 1_500);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiosk.json");
        fs::write(
            &path,
            r#"{"policy": {"allowed_start": "19:45", "shutdown_at": "23:00:30"}}"#,
        )
        .unwrap();

        let policy = SettingsStore::new(path).unwrap().policy();
        assert_eq!(policy.allowed_start, hm(19, 45));
        assert_eq!(policy.shutdown_at, NaiveTime::from_hms_opt(23, 0, 30).unwrap());
        assert_eq!(policy.allowed_end, hm(22, 0));
        assert_eq!(policy.shutdown_poll_interval_ms, 10_000);
    }

    #[test]
    fn updated_policy_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiosk.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let policy = ScanPolicy {
            allowed_end: hm(21, 30),
            ..ScanPolicy::default()
        };
        store.update_policy(policy.clone()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"21:30\""));
        assert_eq!(SettingsStore::new(path).unwrap().policy(), policy);
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiosk.json");
        fs::write(&path, r#"{"policy": {"shutdown_poll_interval_ms": 0}}"#).unwrap();
        assert!(SettingsStore::new(path).is_err());
    }

    #[test]
    fn http_store_settings_parse() {
        let settings: KioskSettings = serde_json::from_str(
            r#"{"store": {"kind": "http", "base_url": "https://hr.example.com/api"}}"#,
        )
        .unwrap();
        assert_eq!(
            settings.store,
            StoreSettings::Http {
                base_url: "https://hr.example.com/api".into(),
                api_key: None,
            }
        );
    }
}
