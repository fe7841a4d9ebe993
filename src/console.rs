use std::io::Write;

use anyhow::{Context, Result};
use chrono::Local;

use crate::time_log::TimerStatus;

/// Consoleにタイマーの状態を表示するためのtrait。
pub trait ConsolePresenter {
    /// タイマーの状態を表示する。
    ///
    /// # Arguments
    ///
    /// * `status` - 表示するタイマーの状態
    fn show_timer_status(&mut self, status: &TimerStatus) -> Result<()>;
}

/// タイマーの状態をMarkdownのlist形式で表示する。
pub struct ConsoleMarkdownList<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> ConsoleMarkdownList<'a, W> {
    /// 新しい`ConsoleMarkdownList`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }
}

/// 秒数を`HH:MM:SS`形式にする。
fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        seconds % 3600 / 60,
        seconds % 60
    )
}

impl<'a, W: Write> ConsolePresenter for ConsoleMarkdownList<'a, W> {
    fn show_timer_status(&mut self, status: &TimerStatus) -> Result<()> {
        let state = if status.running { "running" } else { "stopped" };
        writeln!(
            self.writer,
            "- {}: {}",
            state,
            format_duration(status.duration)
        )
        .with_context(|| format!("Failed to write timer status: {:?}", status))?;

        if let Some(log) = &status.last_log {
            let start_str = log
                .started_at
                .with_timezone(&Local)
                .format("%H:%M")
                .to_string();
            let end_str = log
                .stopped_at
                .map(|stop| stop.with_timezone(&Local).format("%H:%M").to_string())
                .unwrap_or_else(|| "now".to_string());
            writeln!(
                self.writer,
                "  - {} ~ {}: {}",
                start_str,
                end_str,
                log.task_id.as_deref().unwrap_or("-")
            )
            .with_context(|| format!("Failed to write time log: {:?}", log))?;
        }

        Ok(())
    }
}
