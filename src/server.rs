use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use log::{info, warn};
use serde::{de::DeserializeOwned, Deserialize};
use warp::{
    http::StatusCode,
    reject::{InvalidQuery, MethodNotAllowed},
    reply::Response,
    Filter, Rejection, Reply,
};

use crate::gauzy::TimerRepository;
use crate::guard::{
    self, authenticated_guard, AuthContext, SessionCookies, ACTIVE_TEAM_COOKIE,
    ORGANIZATION_ID_COOKIE, TENANT_ID_COOKIE, TOKEN_COOKIE,
};
use crate::time_log::TimerSource;
use crate::timer_command::TimerCommands;

const BODY_LIMIT: usize = 1024 * 16;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartBody {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    organization_team_id: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopBody {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToggleBody {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

/// `sync`のボディと`status`のクエリ。
#[derive(Debug, Default, Deserialize)]
struct SourceParams {
    #[serde(default)]
    source: Option<String>,
}

fn with_repo<R: TimerRepository + 'static>(
    repo: Arc<R>,
) -> impl Filter<Extract = (Arc<R>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&repo))
}

/// リクエストのcookieからセッションを取り出す。
fn session_cookies() -> impl Filter<Extract = (SessionCookies,), Error = Infallible> + Clone {
    warp::cookie::optional::<String>(TOKEN_COOKIE)
        .and(warp::cookie::optional::<String>(TENANT_ID_COOKIE))
        .and(warp::cookie::optional::<String>(ORGANIZATION_ID_COOKIE))
        .and(warp::cookie::optional::<String>(ACTIVE_TEAM_COOKIE))
        .map(
            |access_token, tenant_id, organization_id, team_id| SessionCookies {
                access_token,
                tenant_id,
                organization_id,
                team_id,
            },
        )
}

/// `/api/timer/*`のルートをまとめて返す。
///
/// ルートに一致しないリクエストなどの拒否もJSONで返す。
pub fn routes<R: TimerRepository + 'static>(
    repo: Arc<R>,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    status_route(Arc::clone(&repo))
        .or(start_route(Arc::clone(&repo)))
        .unify()
        .or(stop_route(Arc::clone(&repo)))
        .unify()
        .or(toggle_route(Arc::clone(&repo)))
        .unify()
        .or(sync_route(repo))
        .unify()
        .recover(handle_rejection)
}

/// サーバーを起動する。
pub async fn serve<R: TimerRepository + 'static>(repo: Arc<R>, addr: SocketAddr) {
    info!("Listening on http://{}", addr);
    warp::serve(routes(repo).with(warp::log("ever_timer::server")))
        .run(addr)
        .await;
}

// Filters
fn status_route<R: TimerRepository + 'static>(
    repo: Arc<R>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "timer" / "status")
        .and(warp::get())
        .and(session_cookies())
        .and(warp::query::<SourceParams>())
        .and(with_repo(repo))
        .and_then(status_handler::<R>)
}

fn start_route<R: TimerRepository + 'static>(
    repo: Arc<R>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "timer" / "start")
        .and(warp::post())
        .and(session_cookies())
        .and(warp::body::bytes())
        .and(with_repo(repo))
        .and_then(start_handler::<R>)
}

fn stop_route<R: TimerRepository + 'static>(
    repo: Arc<R>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "timer" / "stop")
        .and(warp::post())
        .and(session_cookies())
        .and(warp::body::bytes())
        .and(with_repo(repo))
        .and_then(stop_handler::<R>)
}

fn toggle_route<R: TimerRepository + 'static>(
    repo: Arc<R>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "timer" / "toggle")
        .and(warp::post())
        .and(session_cookies())
        .and(warp::body::bytes())
        .and(with_repo(repo))
        .and_then(toggle_handler::<R>)
}

fn sync_route<R: TimerRepository + 'static>(
    repo: Arc<R>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "timer" / "sync")
        .and(warp::post())
        .and(session_cookies())
        .and(warp::body::bytes())
        .and(with_repo(repo))
        .and_then(sync_handler::<R>)
}

// Handlers
/// 認証済みでなければ401のレスポンスを返す。
async fn authorize<R: TimerRepository>(
    repo: &R,
    cookies: SessionCookies,
) -> Result<AuthContext, Response> {
    authenticated_guard(repo, cookies)
        .await
        .context()
        .ok_or_else(guard::unauthorized)
}

/// 認証の後にボディをパースする。空のボディは`Default`として扱う。
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, Response> {
    if body.len() > BODY_LIMIT {
        return Err(guard::message(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Request body is too large",
        ));
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    serde_json::from_slice(body)
        .map_err(|err| guard::validation_failed("body", &format!("body is invalid: {}", err)))
}

fn parse_source(source: Option<&str>) -> Result<TimerSource, Response> {
    match source {
        None => Ok(TimerSource::default()),
        Some(source) => source
            .parse()
            .map_err(|_| guard::validation_failed("source", "source is invalid")),
    }
}

/// ルートで処理されなかった拒否をJSONのレスポンスにする。
async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let response = if err.is_not_found() {
        guard::message(StatusCode::NOT_FOUND, "Not Found")
    } else if let Some(invalid) = err.find::<InvalidQuery>() {
        guard::validation_failed("query", &invalid.to_string())
    } else if err.find::<MethodNotAllowed>().is_some() {
        guard::message(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    } else {
        warn!("Unhandled rejection: {:?}", err);
        guard::message(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    };

    Ok(response)
}

async fn status_handler<R: TimerRepository>(
    cookies: SessionCookies,
    query: SourceParams,
    repo: Arc<R>,
) -> Result<Response, Infallible> {
    let ctx = match authorize(repo.as_ref(), cookies).await {
        Ok(ctx) => ctx,
        Err(response) => return Ok(response),
    };
    let source = match parse_source(query.source.as_deref()) {
        Ok(source) => source,
        Err(response) => return Ok(response),
    };

    let result = TimerCommands::new(repo.as_ref()).status(&ctx, source).await;
    Ok(guard::respond(result))
}

async fn start_handler<R: TimerRepository>(
    cookies: SessionCookies,
    body: Bytes,
    repo: Arc<R>,
) -> Result<Response, Infallible> {
    let ctx = match authorize(repo.as_ref(), cookies).await {
        Ok(ctx) => ctx,
        Err(response) => return Ok(response),
    };
    let body: StartBody = match parse_body(&body) {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };
    let source = match parse_source(body.source.as_deref()) {
        Ok(source) => source,
        Err(response) => return Ok(response),
    };

    let result = TimerCommands::new(repo.as_ref())
        .start(
            &ctx,
            body.task_id.as_deref().unwrap_or_default(),
            body.organization_team_id.as_deref(),
            source,
        )
        .await;
    Ok(guard::respond(result))
}

async fn stop_handler<R: TimerRepository>(
    cookies: SessionCookies,
    body: Bytes,
    repo: Arc<R>,
) -> Result<Response, Infallible> {
    let ctx = match authorize(repo.as_ref(), cookies).await {
        Ok(ctx) => ctx,
        Err(response) => return Ok(response),
    };
    let body: StopBody = match parse_body(&body) {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };
    let source = match parse_source(body.source.as_deref()) {
        Ok(source) => source,
        Err(response) => return Ok(response),
    };

    let result = TimerCommands::new(repo.as_ref())
        .stop(&ctx, source, body.task_id.as_deref())
        .await;
    Ok(guard::respond(result))
}

async fn toggle_handler<R: TimerRepository>(
    cookies: SessionCookies,
    body: Bytes,
    repo: Arc<R>,
) -> Result<Response, Infallible> {
    let ctx = match authorize(repo.as_ref(), cookies).await {
        Ok(ctx) => ctx,
        Err(response) => return Ok(response),
    };
    let body: ToggleBody = match parse_body(&body) {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };
    let source = match parse_source(body.source.as_deref()) {
        Ok(source) => source,
        Err(response) => return Ok(response),
    };

    let result = TimerCommands::new(repo.as_ref())
        .toggle(&ctx, body.task_id.as_deref().unwrap_or_default(), source)
        .await;
    Ok(guard::respond(result))
}

async fn sync_handler<R: TimerRepository>(
    cookies: SessionCookies,
    body: Bytes,
    repo: Arc<R>,
) -> Result<Response, Infallible> {
    let ctx = match authorize(repo.as_ref(), cookies).await {
        Ok(ctx) => ctx,
        Err(response) => return Ok(response),
    };
    let body: SourceParams = match parse_body(&body) {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };
    let source = match parse_source(body.source.as_deref()) {
        Ok(source) => source,
        Err(response) => return Ok(response),
    };

    let result = TimerCommands::new(repo.as_ref()).sync(&ctx, source).await;
    Ok(guard::respond(result))
}
