use std::{env, net::SocketAddr, time::Duration};

use anyhow::{bail, Context, Result};

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3030";
const DEFAULT_HEARTBEAT_SECS: u64 = 5;

/// 環境変数から読み込む設定。
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Gauzy APIサーバーのURL
    pub api_server_url: String,
    pub listen_addr: SocketAddr,
    pub heartbeat_period: Duration,
}

impl Config {
    /// 環境変数から設定を読み込む。
    ///
    /// `GAUZY_API_SERVER_URL`が無い場合は`NEXT_PUBLIC_GAUZY_API_SERVER_URL`を利用し、
    /// どちらも設定されていない場合はエラーを返す。
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let api_server_url = lookup("GAUZY_API_SERVER_URL")
            .or_else(|| lookup("NEXT_PUBLIC_GAUZY_API_SERVER_URL"))
            .filter(|url| !url.trim().is_empty())
            .context("GAUZY_API_SERVER_URL must be set")?;
        if !api_server_url.starts_with("http://") && !api_server_url.starts_with("https://") {
            bail!("GAUZY_API_SERVER_URL must be an http(s) URL: {}", api_server_url);
        }

        let listen_addr = lookup("EVER_TIMER_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen_addr
            .parse()
            .with_context(|| format!("Invalid EVER_TIMER_LISTEN_ADDR: {}", listen_addr))?;

        let heartbeat_secs = match lookup("EVER_TIMER_HEARTBEAT_SECS") {
            Some(secs) => secs
                .parse::<u64>()
                .with_context(|| format!("Invalid EVER_TIMER_HEARTBEAT_SECS: {}", secs))?,
            None => DEFAULT_HEARTBEAT_SECS,
        };
        if heartbeat_secs == 0 {
            bail!("EVER_TIMER_HEARTBEAT_SECS must be greater than 0");
        }

        Ok(Self {
            api_server_url,
            listen_addr,
            heartbeat_period: Duration::from_secs(heartbeat_secs),
        })
    }
}
