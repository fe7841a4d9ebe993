use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};

use crate::guard::AuthContext;
use crate::time_log::{TimeLog, TimeLogType, TimerSource, TimerStatus, User};

/// ハートビートで送信する固定の経過秒数。
pub const SYNC_DURATION_SECS: i64 = 5;

/// `POST /timesheet/timer/start`のリクエストボディ。
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTimerRequest {
    pub tenant_id: String,
    pub organization_id: String,
    pub task_id: String,
    pub log_type: TimeLogType,
    pub source: TimerSource,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_team_id: Option<String>,
}

/// `POST /timesheet/timer/stop`のリクエストボディ。
///
/// 別のクライアントで開始されたタイマーを止める場合は`task_id`を持たない。
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTimerRequest {
    pub tenant_id: String,
    pub organization_id: String,
    pub log_type: TimeLogType,
    pub source: TimerSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_team_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleTimerRequest {
    pub tenant_id: String,
    pub organization_id: String,
    pub task_id: String,
    pub log_type: TimeLogType,
    pub source: TimerSource,
    pub tags: Vec<String>,
}

/// `POST /timesheet/time-slot`のリクエストボディ。タスクではなく従業員に紐づく。
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTimeSlotRequest {
    pub tenant_id: String,
    pub organization_id: String,
    pub employee_id: String,
    pub duration: i64,
    pub log_type: TimeLogType,
    pub source: TimerSource,
}

/// タイマーに関するGauzy APIの操作。
///
/// テストでは`MockTimerRepository`で差し替える。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TimerRepository: Send + Sync {
    /// アクセストークンに対応するユーザーを取得する。
    async fn current_user(&self, access_token: &str, tenant_id: Option<String>) -> Result<User>;

    async fn start_timer(&self, ctx: &AuthContext, request: &StartTimerRequest)
        -> Result<TimeLog>;

    async fn stop_timer(&self, ctx: &AuthContext, request: &StopTimerRequest) -> Result<TimeLog>;

    async fn toggle_timer(
        &self,
        ctx: &AuthContext,
        request: &ToggleTimerRequest,
    ) -> Result<TimeLog>;

    /// ハートビートを送信する。レスポンスのtime slotは利用しないので捨てる。
    async fn sync_time_slot(&self, ctx: &AuthContext, request: &SyncTimeSlotRequest)
        -> Result<()>;

    async fn timer_status(&self, ctx: &AuthContext, source: TimerSource) -> Result<TimerStatus>;
}

/// Gauzy APIと通信するためのクライアント。
///
/// # Examples
///
/// ```
/// let client = GauzyClient::new("https://api.ever.team");
/// let status = client.timer_status(&ctx, TimerSource::Teams).await?;
/// ```
#[derive(Clone)]
pub struct GauzyClient {
    client: Client,
    api_url: String,
}

impl GauzyClient {
    /// 新しい`GauzyClient`を返す。
    ///
    /// # Arguments
    ///
    /// * `server_url` - Gauzy APIサーバーのURL。リクエストは`{server_url}/api`以下に送る。
    pub fn new(server_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: format!("{}/api", server_url.trim_end_matches('/')),
        }
    }

    /// 認証情報とテナント、組織のヘッダーを付与する。
    fn authorized(&self, builder: RequestBuilder, ctx: &AuthContext) -> RequestBuilder {
        builder
            .bearer_auth(&ctx.access_token)
            .header(CONTENT_TYPE, "application/json")
            .header("tenant-id", &ctx.tenant_id)
            .header("organization-id", &ctx.organization_id)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to send request to Gauzy API at {}", self.api_url))?
            .error_for_status()
            .context("Request returned an error status")?
            .json::<T>()
            .await
            .context("Failed to deserialize response")?;

        Ok(response)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        ctx: &AuthContext,
        path: &str,
        body: &B,
    ) -> Result<T> {
        debug!("POST {}{}", self.api_url, path);
        let builder = self
            .authorized(self.client.post(format!("{}{}", self.api_url, path)), ctx)
            .json(body);

        self.send_json(builder).await
    }
}

#[async_trait]
impl TimerRepository for GauzyClient {
    async fn current_user(&self, access_token: &str, tenant_id: Option<String>) -> Result<User> {
        let mut builder = self
            .client
            .get(format!("{}/user/me", self.api_url))
            .bearer_auth(access_token)
            .header(CONTENT_TYPE, "application/json")
            .query(&[("relations[]", "employee"), ("relations[]", "tenant")]);
        if let Some(tenant_id) = tenant_id {
            builder = builder.header("tenant-id", tenant_id);
        }

        let user: User = self
            .send_json(builder)
            .await
            .context("Failed to get current user")?;
        debug!("current user: {}", user.id);

        Ok(user)
    }

    async fn start_timer(
        &self,
        ctx: &AuthContext,
        request: &StartTimerRequest,
    ) -> Result<TimeLog> {
        let log: TimeLog = self
            .post(ctx, "/timesheet/timer/start", request)
            .await
            .context("Failed to start timer")?;
        info!("timer started: log {}", log.id);

        Ok(log)
    }

    async fn stop_timer(&self, ctx: &AuthContext, request: &StopTimerRequest) -> Result<TimeLog> {
        let log: TimeLog = self
            .post(ctx, "/timesheet/timer/stop", request)
            .await
            .context("Failed to stop timer")?;
        info!("timer stopped: log {}", log.id);

        Ok(log)
    }

    async fn toggle_timer(
        &self,
        ctx: &AuthContext,
        request: &ToggleTimerRequest,
    ) -> Result<TimeLog> {
        self.post(ctx, "/timesheet/timer/toggle", request)
            .await
            .context("Failed to toggle timer")
    }

    async fn sync_time_slot(
        &self,
        ctx: &AuthContext,
        request: &SyncTimeSlotRequest,
    ) -> Result<()> {
        let _: serde_json::Value = self
            .post(ctx, "/timesheet/time-slot", request)
            .await
            .context("Failed to sync time slot")?;

        Ok(())
    }

    async fn timer_status(&self, ctx: &AuthContext, source: TimerSource) -> Result<TimerStatus> {
        let builder = self
            .authorized(
                self.client
                    .get(format!("{}/timesheet/timer/status", self.api_url)),
                ctx,
            )
            .query(&[
                ("source", source.to_string()),
                ("tenantId", ctx.tenant_id.clone()),
                ("organizationId", ctx.organization_id.clone()),
            ]);

        self.send_json(builder)
            .await
            .context("Failed to get timer status")
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use once_cell::sync::Lazy;
    use serde_json::{json, Value};

    use super::{
        GauzyClient, StartTimerRequest, StopTimerRequest, SyncTimeSlotRequest, TimerRepository,
        SYNC_DURATION_SECS,
    };
    use crate::guard::AuthContext;
    use crate::time_log::{TimeLogType, TimerSource, User};

    static TIME_LOG: Lazy<Value> = Lazy::new(|| {
        json!({
            "id": "log-1",
            "startedAt": "2024-01-01T09:00:00.000Z",
            "logType": "TRACKED",
            "source": "TEAMS",
            "taskId": "task-42",
            "organizationId": "o1",
            "tenantId": "t1",
            "employeeId": "e1",
            "isRunning": true
        })
    });

    fn context() -> AuthContext {
        AuthContext {
            access_token: "abc".to_string(),
            tenant_id: "t1".to_string(),
            organization_id: "o1".to_string(),
            team_id: None,
            user: User {
                id: "u1".to_string(),
                email: None,
                tenant_id: Some("t1".to_string()),
                employee: None,
            },
        }
    }

    /// 認証ヘッダーとボディが期待通りに送られることを確認する。
    #[tokio::test]
    async fn test_start_timer() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/timesheet/timer/start")
            .match_header("authorization", "Bearer abc")
            .match_header("tenant-id", "t1")
            .match_header("organization-id", "o1")
            .match_body(Matcher::Json(json!({
                "tenantId": "t1",
                "organizationId": "o1",
                "taskId": "task-42",
                "logType": "TRACKED",
                "source": "TEAMS",
                "tags": []
            })))
            .with_status(200)
            .with_body(TIME_LOG.to_string())
            .create_async()
            .await;

        let client = GauzyClient::new(&server.url());
        let request = StartTimerRequest {
            tenant_id: "t1".to_string(),
            organization_id: "o1".to_string(),
            task_id: "task-42".to_string(),
            log_type: TimeLogType::Tracked,
            source: TimerSource::Teams,
            tags: vec![],
            organization_team_id: None,
        };
        let log = client.start_timer(&context(), &request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(log.id, "log-1");
        assert!(log.is_running);
    }

    #[tokio::test]
    async fn test_stop_timer_without_task() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/timesheet/timer/stop")
            .match_body(Matcher::Json(json!({
                "tenantId": "t1",
                "organizationId": "o1",
                "logType": "TRACKED",
                "source": "DESKTOP"
            })))
            .with_body(TIME_LOG.to_string())
            .create_async()
            .await;

        let client = GauzyClient::new(&format!("{}/", server.url()));
        let request = StopTimerRequest {
            tenant_id: "t1".to_string(),
            organization_id: "o1".to_string(),
            log_type: TimeLogType::Tracked,
            source: TimerSource::Desktop,
            task_id: None,
            organization_team_id: None,
        };

        assert!(client.stop_timer(&context(), &request).await.is_ok());
        mock.assert_async().await;
    }

    /// 重複排除は行わないので、同時に送った2回のハートビートは両方ともAPIに届く。
    #[tokio::test]
    async fn test_sync_time_slot_not_deduplicated() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/timesheet/time-slot")
            .match_body(Matcher::PartialJson(json!({
                "employeeId": "e1",
                "duration": 5
            })))
            .with_body("{}")
            .expect(2)
            .create_async()
            .await;

        let client = GauzyClient::new(&server.url());
        let ctx = context();
        let request = SyncTimeSlotRequest {
            tenant_id: "t1".to_string(),
            organization_id: "o1".to_string(),
            employee_id: "e1".to_string(),
            duration: SYNC_DURATION_SECS,
            log_type: TimeLogType::Tracked,
            source: TimerSource::Teams,
        };
        let (first, second) = tokio::join!(
            client.sync_time_slot(&ctx, &request),
            client.sync_time_slot(&ctx, &request)
        );

        assert!(first.is_ok());
        assert!(second.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_timer_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/timesheet/timer/status")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("source".into(), "TEAMS".into()),
                Matcher::UrlEncoded("tenantId".into(), "t1".into()),
                Matcher::UrlEncoded("organizationId".into(), "o1".into()),
            ]))
            .with_body(json!({ "duration": 30, "running": true, "lastLog": *TIME_LOG }).to_string())
            .create_async()
            .await;

        let client = GauzyClient::new(&server.url());
        let status = client
            .timer_status(&context(), TimerSource::Teams)
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(status.running);
        assert_eq!(status.duration, 30);
    }

    /// エラーステータスはリトライせずにそのままエラーとして返す。
    #[tokio::test]
    async fn test_timer_status_error_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/timesheet/timer/status")
            .match_query(Matcher::Any)
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let client = GauzyClient::new(&server.url());
        let result = client.timer_status(&context(), TimerSource::Teams).await;

        assert!(result.is_err());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_current_user() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/user/me")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer abc")
            .with_body(
                json!({
                    "id": "u1",
                    "tenantId": "t1",
                    "employee": { "id": "e1", "organizationId": "o1" }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = GauzyClient::new(&server.url());
        let user = client.current_user("abc", None).await.unwrap();

        mock.assert_async().await;
        assert_eq!(user.employee.unwrap().id, "e1");
    }
}
