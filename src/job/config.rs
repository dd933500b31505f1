//! Job configuration: the persistent description of what to back up and
//! how, serialized as TOML (see `Cargo.toml`'s `toml` dependency) plus
//! a sidecar `.info` file holding the two plain-decimal scheduler
//! timestamps.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BarError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveType {
    Normal,
    Continuous,
}

/// A single time-pattern trigger. `None` in any field means "any value"
/// (the `*` wildcard); `weekday_mask` is a bitmask with bit 0 = Sunday.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRule {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub weekday_mask: Option<u8>,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub enabled: bool,
    pub archive_type: ArchiveType,
}

impl ScheduleRule {
    pub fn always(archive_type: ArchiveType) -> Self {
        Self { year: None, month: None, day: None, weekday_mask: None, hour: None, minute: None, enabled: true, archive_type }
    }

    /// True when every non-wildcard field matches the given broken-down
    /// time. `weekday` is 0 = Sunday per `weekday_mask`'s bit convention.
    pub fn matches(&self, year: i32, month: u32, day: u32, weekday: u32, hour: u32, minute: u32) -> bool {
        self.enabled
            && self.year.map_or(true, |y| y == year)
            && self.month.map_or(true, |m| m == month)
            && self.day.map_or(true, |d| d == day)
            && self.weekday_mask.map_or(true, |mask| mask & (1 << weekday) != 0)
            && self.hour.map_or(true, |h| h == hour)
            && self.minute.map_or(true, |m| m == minute)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub storage_uri: String,
    pub include_list: Vec<String>,
    pub exclude_list: Vec<String>,
    pub mount_list: Vec<String>,
    pub source_list: Vec<String>,
    pub archive_part_size: u64,
    pub compression_algorithm: u8,
    pub compression_level: i32,
    pub crypt_algorithm: Option<u8>,
    pub asymmetric_public_key_path: Option<String>,
    pub schedule_rules: Vec<ScheduleRule>,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl JobConfig {
    pub fn new(name: impl Into<String>, storage_uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage_uri: storage_uri.into(),
            include_list: Vec::new(),
            exclude_list: Vec::new(),
            mount_list: Vec::new(),
            source_list: Vec::new(),
            archive_part_size: u64::MAX,
            compression_algorithm: 0,
            compression_level: 0,
            crypt_algorithm: None,
            asymmetric_public_key_path: None,
            schedule_rules: Vec::new(),
            options: HashMap::new(),
        }
    }

    pub fn get_option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn set_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.options.insert(key.into(), value.into());
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(BarError::from)?;
        toml::from_str(&text).map_err(|e| BarError::job(format!("invalid job config {}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| BarError::job(e.to_string()))?;
        fs::write(path, text).map_err(BarError::from)
    }
}

/// The `<job>.info` sidecar: one decimal integer per line — last
/// executed timestamp, then last checked timestamp — read by the
/// scheduler to resume catch-up without replaying already-run minutes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleInfo {
    pub last_executed_at: i64,
    pub last_checked_at: i64,
}

impl ScheduleInfo {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(BarError::from)?;
        let mut lines = text.lines();
        let last_executed_at = lines
            .next()
            .and_then(|l| l.trim().parse().ok())
            .ok_or_else(|| BarError::job(format!("malformed schedule info {}", path.display())))?;
        let last_checked_at = lines
            .next()
            .and_then(|l| l.trim().parse().ok())
            .ok_or_else(|| BarError::job(format!("malformed schedule info {}", path.display())))?;
        Ok(Self { last_executed_at, last_checked_at })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, format!("{}\n{}\n", self.last_executed_at, self.last_checked_at)).map_err(BarError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nightly.toml");
        let mut config = JobConfig::new("nightly", "/var/backups/nightly");
        config.include_list.push("/etc".into());
        config.schedule_rules.push(ScheduleRule::always(ArchiveType::Normal));
        config.set_option("retries", "3");
        config.save(&path).unwrap();

        let loaded = JobConfig::load(&path).unwrap();
        assert_eq!(loaded.name, "nightly");
        assert_eq!(loaded.include_list, vec!["/etc"]);
        assert_eq!(loaded.get_option("retries"), Some("3"));
    }

    #[test]
    fn schedule_rule_wildcards_match_every_minute() {
        let rule = ScheduleRule::always(ArchiveType::Normal);
        assert!(rule.matches(2026, 7, 28, 2, 3, 0));
        assert!(rule.matches(1999, 1, 1, 6, 23, 59));
    }

    #[test]
    fn schedule_rule_pins_specific_fields() {
        let mut rule = ScheduleRule::always(ArchiveType::Normal);
        rule.hour = Some(3);
        rule.minute = Some(0);
        assert!(rule.matches(2026, 7, 28, 2, 3, 0));
        assert!(!rule.matches(2026, 7, 28, 2, 4, 0));
    }

    #[test]
    fn schedule_info_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nightly.info");
        let info = ScheduleInfo { last_executed_at: 1_700_000_000, last_checked_at: 1_700_000_060 };
        info.save(&path).unwrap();
        let loaded = ScheduleInfo::load(&path).unwrap();
        assert_eq!(loaded.last_executed_at, 1_700_000_000);
        assert_eq!(loaded.last_checked_at, 1_700_000_060);
    }
}
