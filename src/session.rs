use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::info;

use crate::guard::SessionCookies;

/// セッションファイルのデフォルトの場所を返す。
///
/// `{config_dir}/ever-timer/session.json`
pub fn default_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Failed to find config directory")?;

    Ok(config_dir.join("ever-timer").join("session.json"))
}

/// セッションファイルを読み込む。ファイルが無い場合は空のセッションを返す。
pub fn load(path: &Path) -> Result<SessionCookies> {
    if !path.exists() {
        return Ok(SessionCookies::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read session file: {}", path.display()))?;
    let cookies = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse session file: {}", path.display()))?;

    Ok(cookies)
}

/// セッションファイルを保存する。親ディレクトリが無ければ作成する。
pub fn save(path: &Path, cookies: &SessionCookies) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let content =
        serde_json::to_string_pretty(cookies).context("Failed to serialize session")?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write session file: {}", path.display()))?;
    info!("Session saved to {}", path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{load, save};
    use crate::guard::SessionCookies;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let cookies = SessionCookies {
            access_token: Some("abc".to_string()),
            tenant_id: Some("t1".to_string()),
            organization_id: Some("o1".to_string()),
            team_id: None,
        };

        save(&path, &cookies).unwrap();

        assert_eq!(load(&path).unwrap(), cookies);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();

        let cookies = load(&dir.path().join("session.json")).unwrap();

        assert_eq!(cookies, SessionCookies::default());
    }

    #[test]
    fn test_load_broken_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();

        assert!(load(&path).is_err());
    }
}
