use std::{fmt, str::FromStr};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// タイマーの状態。Gauzy APIが正とするスナップショットをそのまま保持する。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerStatus {
    /// 経過秒数
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub last_log: Option<TimeLog>,
}

/// Gauzy APIが管理するtime log。クライアントは読み取るだけ。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeLog {
    pub id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub stopped_at: Option<DateTime<Utc>>,
    pub log_type: TimeLogType,
    pub source: TimerSource,
    #[serde(default)]
    pub task_id: Option<String>,
    pub organization_id: String,
    pub tenant_id: String,
    pub employee_id: String,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub is_billable: bool,
    #[serde(default)]
    pub is_edited: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeLogType {
    Tracked,
    Manual,
    Idle,
}

/// タイマーを操作したクライアントの種別。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerSource {
    Browser,
    BrowserExtension,
    Desktop,
    Mobile,
    #[default]
    Teams,
    Hubstaff,
    Upwork,
    Cloc,
    /// APIから未知の値が返された場合
    #[serde(other)]
    Unknown,
}

impl TimerSource {
    fn as_str(&self) -> &'static str {
        match self {
            TimerSource::Browser => "BROWSER",
            TimerSource::BrowserExtension => "BROWSER_EXTENSION",
            TimerSource::Desktop => "DESKTOP",
            TimerSource::Mobile => "MOBILE",
            TimerSource::Teams => "TEAMS",
            TimerSource::Hubstaff => "HUBSTAFF",
            TimerSource::Upwork => "UPWORK",
            TimerSource::Cloc => "CLOC",
            TimerSource::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for TimerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimerSource {
    type Err = anyhow::Error;

    /// 大文字小文字を区別せずにパースする。`-`は`_`と同じ扱いとする。
    fn from_str(s: &str) -> Result<Self> {
        let source = match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "BROWSER" => TimerSource::Browser,
            "BROWSER_EXTENSION" => TimerSource::BrowserExtension,
            "DESKTOP" => TimerSource::Desktop,
            "MOBILE" => TimerSource::Mobile,
            "TEAMS" => TimerSource::Teams,
            "HUBSTAFF" => TimerSource::Hubstaff,
            "UPWORK" => TimerSource::Upwork,
            "CLOC" => TimerSource::Cloc,
            _ => bail!("Unknown timer source: {}", s),
        };

        Ok(source)
    }
}

/// 現在のユーザー。タイマーで必要な項目のみ。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub employee: Option<Employee>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
}
