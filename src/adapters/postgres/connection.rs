use crate::config::DatabaseConfig;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// データベース接続を所有するコンポーネント
///
/// 再接続の方針：
/// - プールは取得時に接続を検査する（`test_before_acquire`）。切断された接続は
///   捨てられ、次の取得で張り直される
/// - 生存確認タスクが定期的に`SELECT 1`を投げ、失敗と回復をログに残す
/// - 業務トランザクションは再実行しない。失敗は`Unavailable`として呼び出し元に返る
///
/// プールはアダプターに注入する。グローバルな接続状態は持たない。
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .test_before_acquire(true)
            .connect(&config.url)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            "connected to database"
        );

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 同梱のマイグレーションを適用する
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// 生存確認タスクを起動する
    pub fn spawn_keepalive(&self, every: Duration) -> KeepAlive {
        let handle = tokio::spawn(keepalive_loop(self.pool.clone(), every));
        KeepAlive { handle }
    }
}

/// 生存確認タスクのハンドル。破棄するとタスクも止まる
pub struct KeepAlive {
    handle: JoinHandle<()>,
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn keepalive_loop(pool: PgPool, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // 最初のtickは即座に完了する
    ticker.tick().await;

    let mut healthy = true;
    loop {
        ticker.tick().await;

        match sqlx::query("SELECT 1").execute(&pool).await {
            Ok(_) if !healthy => {
                tracing::info!("database connection recovered");
                healthy = true;
            }
            Ok(_) => tracing::debug!("database keep-alive ok"),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "database keep-alive failed, reconnecting on next acquire"
                );
                healthy = false;
            }
        }
    }
}
