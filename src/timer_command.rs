use std::fmt;

use anyhow::{Context, Result};
use log::info;

use crate::gauzy::{
    StartTimerRequest, StopTimerRequest, SyncTimeSlotRequest, TimerRepository,
    ToggleTimerRequest, SYNC_DURATION_SECS,
};
use crate::guard::AuthContext;
use crate::time_log::{TimeLogType, TimerSource, TimerStatus};

/// 入力値のエラー。APIに問い合わせる前に検出する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn required(field: &'static str) -> Self {
        Self {
            field,
            message: format!("{} is required", field),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// タイマーを操作するコマンド。
///
/// どのコマンドも最後にタイマーの状態を取得し直して返す。状態をローカルで計算することはない。
pub struct TimerCommands<'a, R: TimerRepository + ?Sized> {
    repo: &'a R,
}

impl<'a, R: TimerRepository + ?Sized> TimerCommands<'a, R> {
    /// 新しい`TimerCommands`を返す。
    ///
    /// # Arguments
    /// * `repo` - Gauzy APIと通信するためのリポジトリ
    pub fn new(repo: &'a R) -> Self {
        Self { repo }
    }

    /// タスクのタイマーを開始する。
    ///
    /// チームが指定されていない場合は、アクティブなチームを利用する。
    ///
    /// # Arguments
    ///
    /// * `ctx` - 認証済みのコンテキスト
    /// * `task_id` - 記録対象のタスク
    /// * `organization_team_id` - 記録対象のチーム
    /// * `source` - 操作したクライアント
    pub async fn start(
        &self,
        ctx: &AuthContext,
        task_id: &str,
        organization_team_id: Option<&str>,
        source: TimerSource,
    ) -> Result<TimerStatus> {
        if task_id.trim().is_empty() {
            return Err(ValidationError::required("taskId").into());
        }

        let request = StartTimerRequest {
            tenant_id: ctx.tenant_id.clone(),
            organization_id: ctx.organization_id.clone(),
            task_id: task_id.to_string(),
            log_type: TimeLogType::Tracked,
            source,
            tags: vec![],
            organization_team_id: organization_team_id
                .map(str::to_string)
                .or_else(|| ctx.team_id.clone()),
        };
        self.repo
            .start_timer(ctx, &request)
            .await
            .with_context(|| format!("Failed to start timer for task {}", task_id))?;
        info!("Timer started for task {}", task_id);

        self.status(ctx, source).await
    }

    /// タイマーを停止する。
    ///
    /// 他のクライアントで開始されたタイマーはタスクが分からないため、`task_id`は省略できる。
    pub async fn stop(
        &self,
        ctx: &AuthContext,
        source: TimerSource,
        task_id: Option<&str>,
    ) -> Result<TimerStatus> {
        let request = StopTimerRequest {
            tenant_id: ctx.tenant_id.clone(),
            organization_id: ctx.organization_id.clone(),
            log_type: TimeLogType::Tracked,
            source,
            task_id: task_id.map(str::to_string),
            organization_team_id: ctx.team_id.clone(),
        };
        self.repo
            .stop_timer(ctx, &request)
            .await
            .context("Failed to stop timer")?;
        info!("Timer stopped");

        self.status(ctx, source).await
    }

    /// ハートビートを送信する。
    ///
    /// 経過時間に関わらず固定の5秒を送信する。実際の経過時間はAPI側で管理される。
    /// 送信中のリクエストとの重複排除は行わない。
    pub async fn sync(&self, ctx: &AuthContext, source: TimerSource) -> Result<TimerStatus> {
        let employee_id = ctx
            .user
            .employee
            .as_ref()
            .map(|employee| employee.id.clone())
            .ok_or_else(|| ValidationError::required("employeeId"))?;

        let request = SyncTimeSlotRequest {
            tenant_id: ctx.tenant_id.clone(),
            organization_id: ctx.organization_id.clone(),
            employee_id,
            duration: SYNC_DURATION_SECS,
            log_type: TimeLogType::Tracked,
            source,
        };
        self.repo
            .sync_time_slot(ctx, &request)
            .await
            .context("Failed to sync timer")?;

        self.status(ctx, source).await
    }

    /// タイマーを切り替える。
    ///
    /// 現在の状態に関わらず、切り替えの後に停止を送るため、結果は常に停止状態になる。
    pub async fn toggle(
        &self,
        ctx: &AuthContext,
        task_id: &str,
        source: TimerSource,
    ) -> Result<TimerStatus> {
        if task_id.trim().is_empty() {
            return Err(ValidationError::required("taskId").into());
        }

        let request = ToggleTimerRequest {
            tenant_id: ctx.tenant_id.clone(),
            organization_id: ctx.organization_id.clone(),
            task_id: task_id.to_string(),
            log_type: TimeLogType::Tracked,
            source,
            tags: vec![],
        };
        self.repo
            .toggle_timer(ctx, &request)
            .await
            .with_context(|| format!("Failed to toggle timer for task {}", task_id))?;

        self.stop(ctx, source, Some(task_id)).await
    }

    /// タイマーの状態を取得する。
    pub async fn status(&self, ctx: &AuthContext, source: TimerSource) -> Result<TimerStatus> {
        self.repo
            .timer_status(ctx, source)
            .await
            .context("Failed to retrieve timer status")
    }
}
