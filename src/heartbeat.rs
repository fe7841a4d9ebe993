use std::{future::Future, sync::Arc, time::Duration};

use log::{debug, warn};
use tokio::{task::JoinSet, time};

use crate::gauzy::TimerRepository;
use crate::guard::AuthContext;
use crate::status_store::StatusStore;
use crate::time_log::TimerSource;
use crate::timer_command::TimerCommands;

/// 一定間隔でハートビートを送信する。
///
/// 前回の送信の完了は待たずに次の送信を始めるため、送信が重なることがある。
/// `shutdown`が完了するとループを抜け、送信中のリクエストの完了を待ってから送信回数を返す。
///
/// # Arguments
///
/// * `repo` - Gauzy APIと通信するためのリポジトリ
/// * `ctx` - 認証済みのコンテキスト
/// * `source` - 操作したクライアント
/// * `period` - 送信間隔
/// * `store` - 取得した状態の保存先
/// * `shutdown` - 終了の合図
pub async fn run<R, F>(
    repo: Arc<R>,
    ctx: AuthContext,
    source: TimerSource,
    period: Duration,
    store: Arc<StatusStore>,
    shutdown: F,
) -> usize
where
    R: TimerRepository + 'static,
    F: Future<Output = ()>,
{
    let ctx = Arc::new(ctx);
    let mut ticker = time::interval(period);
    let mut in_flight = JoinSet::new();
    let mut ticks = 0;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                ticks += 1;
                let repo = Arc::clone(&repo);
                let ctx = Arc::clone(&ctx);
                let store = Arc::clone(&store);
                in_flight.spawn(async move {
                    let result = TimerCommands::new(repo.as_ref()).sync(&ctx, source).await;
                    match store.track(result) {
                        Ok(status) => debug!("heartbeat: running={} duration={}", status.running, status.duration),
                        Err(err) => warn!("Heartbeat failed: {:#}", err),
                    }
                });
                while in_flight.try_join_next().is_some() {}
            }
        }
    }

    while in_flight.join_next().await.is_some() {}

    ticks
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use std::time::Duration;

    use anyhow::anyhow;

    use super::run;
    use crate::gauzy::MockTimerRepository;
    use crate::guard::AuthContext;
    use crate::status_store::StatusStore;
    use crate::time_log::{Employee, TimerSource, TimerStatus, User};

    fn context() -> AuthContext {
        AuthContext {
            access_token: "abc".to_string(),
            tenant_id: "t1".to_string(),
            organization_id: "o1".to_string(),
            team_id: None,
            user: User {
                id: "u1".to_string(),
                email: None,
                tenant_id: None,
                employee: Some(Employee {
                    id: "e1".to_string(),
                    organization_id: None,
                }),
            },
        }
    }

    /// 送信回数だけハートビートを送信し、状態を保存する。
    #[tokio::test]
    async fn test_run_syncs_every_tick() {
        let synced = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&synced);
        let mut repo = MockTimerRepository::new();
        repo.expect_sync_time_slot().returning(move |_, request| {
            assert_eq!(request.duration, 5);
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        repo.expect_timer_status().returning(|_, _| {
            Ok(TimerStatus {
                duration: 5,
                running: true,
                last_log: None,
            })
        });
        let store = Arc::new(StatusStore::new());

        let ticks = run(
            Arc::new(repo),
            context(),
            TimerSource::Teams,
            Duration::from_millis(10),
            Arc::clone(&store),
            tokio::time::sleep(Duration::from_millis(45)),
        )
        .await;

        assert!(ticks >= 2);
        assert_eq!(synced.load(Ordering::SeqCst), ticks);
        assert!(store.get().unwrap().running);
    }

    /// 失敗しても止まらず、状態は更新しない。
    #[tokio::test]
    async fn test_run_continues_after_failure() {
        let mut repo = MockTimerRepository::new();
        repo.expect_sync_time_slot()
            .returning(|_, _| Err(anyhow!("connection reset")));
        repo.expect_timer_status().never();
        let store = Arc::new(StatusStore::new());

        let ticks = run(
            Arc::new(repo),
            context(),
            TimerSource::Teams,
            Duration::from_millis(10),
            Arc::clone(&store),
            tokio::time::sleep(Duration::from_millis(35)),
        )
        .await;

        assert!(ticks >= 2);
        assert_eq!(store.get(), None);
    }
}
