use anyhow::Result;
use tokio::sync::watch;

use crate::time_log::TimerStatus;

/// 最後に取得したタイマーの状態を保持する。
///
/// 更新は購読者に通知される。失敗したコマンドの結果では更新しない。
#[derive(Debug)]
pub struct StatusStore {
    sender: watch::Sender<Option<TimerStatus>>,
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusStore {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    /// 保持している状態を返す。まだ一度も取得していなければ`None`。
    pub fn get(&self) -> Option<TimerStatus> {
        self.sender.borrow().clone()
    }

    pub fn set(&self, status: TimerStatus) {
        self.sender.send_replace(Some(status));
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<TimerStatus>> {
        self.sender.subscribe()
    }

    /// コマンドの結果が成功であれば状態を更新し、結果をそのまま返す。
    pub fn track(&self, result: Result<TimerStatus>) -> Result<TimerStatus> {
        if let Ok(status) = &result {
            self.set(status.clone());
        }
        result
    }
}
