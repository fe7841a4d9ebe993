use anyhow::Result;
use log::{error, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use warp::{
    http::StatusCode,
    reply::{self, Reply, Response},
};

use crate::gauzy::TimerRepository;
use crate::time_log::User;
use crate::timer_command::ValidationError;

pub const TOKEN_COOKIE: &str = "auth_token";
pub const TENANT_ID_COOKIE: &str = "auth_tenant_id";
pub const ORGANIZATION_ID_COOKIE: &str = "auth_organization_id";
pub const ACTIVE_TEAM_COOKIE: &str = "auth_active_team";

/// セッションを表すcookieの値。CLIではセッションファイルに保存する。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCookies {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
}

/// 認証済みのリクエストで利用するコンテキスト。
#[derive(Clone, Debug, PartialEq)]
pub struct AuthContext {
    pub access_token: String,
    pub tenant_id: String,
    pub organization_id: String,
    /// アクティブなチーム
    pub team_id: Option<String>,
    pub user: User,
}

/// cookieから取り出した認証情報。`user`が`None`なら未認証。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Guard {
    pub user: Option<User>,
    pub access_token: Option<String>,
    pub tenant_id: Option<String>,
    pub organization_id: Option<String>,
    pub team_id: Option<String>,
}

impl Guard {
    /// 認証済みであれば`AuthContext`を返す。
    ///
    /// テナントと組織はcookieを優先し、無ければユーザー情報から補う。
    pub fn context(&self) -> Option<AuthContext> {
        let user = self.user.clone()?;
        let access_token = self.access_token.clone()?;
        let tenant_id = self
            .tenant_id
            .clone()
            .or_else(|| user.tenant_id.clone())?;
        let organization_id = self.organization_id.clone().or_else(|| {
            user.employee
                .as_ref()
                .and_then(|employee| employee.organization_id.clone())
        })?;

        Some(AuthContext {
            access_token,
            tenant_id,
            organization_id,
            team_id: self.team_id.clone(),
            user,
        })
    }
}

/// cookieから認証情報を取り出し、トークンをGauzy APIで検証する。
///
/// 失敗することはなく、トークンが無い、または検証できない場合は`user`が`None`になる。
/// トークンが無い場合はAPIを呼び出さない。
///
/// # Arguments
///
/// * `repo` - 現在のユーザーを取得するためのリポジトリ
/// * `cookies` - リクエストのcookie
pub async fn authenticated_guard<R: TimerRepository + ?Sized>(
    repo: &R,
    cookies: SessionCookies,
) -> Guard {
    let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
    let mut guard = Guard {
        user: None,
        access_token: non_empty(cookies.access_token),
        tenant_id: non_empty(cookies.tenant_id),
        organization_id: non_empty(cookies.organization_id),
        team_id: non_empty(cookies.team_id),
    };

    if let Some(access_token) = guard.access_token.as_deref() {
        match repo.current_user(access_token, guard.tenant_id.clone()).await {
            Ok(user) => guard.user = Some(user),
            Err(err) => warn!("Session token rejected: {:#}", err),
        }
    }

    guard
}

/// `{ "message": message }`の形式のレスポンス。
pub fn message(status: StatusCode, message: &str) -> Response {
    reply::with_status(reply::json(&json!({ "message": message })), status).into_response()
}

/// 未認証のレスポンス。
pub fn unauthorized() -> Response {
    message(StatusCode::UNAUTHORIZED, "Unauthorized")
}

/// 入力値エラーのレスポンス。`{ "errors": { field: message } }`の形式で返す。
pub fn validation_failed(field: &str, message: &str) -> Response {
    reply::with_status(
        reply::json(&json!({ "errors": { field: message } })),
        StatusCode::BAD_REQUEST,
    )
    .into_response()
}

/// 処理結果をJSONレスポンスに変換する。
pub fn respond<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(body) => reply::json(&body).into_response(),
        Err(err) => {
            if let Some(validation) = err.downcast_ref::<ValidationError>() {
                return validation_failed(validation.field, &validation.message);
            }
            error!("Upstream request failed: {:#}", err);
            message(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
    }
}
