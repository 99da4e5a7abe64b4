pub mod features;
pub mod server;
pub mod shared;

use features::subscriptions::{LogEventSink, SqliteSubscriptionStore, SubscriptionService};
use log::{error, info};
use server::{shutdown_signal, HttpServer};
use shared::config::{initialize_logging_system, load_environment_variables, ServerConfig};
use shared::database::initialize_database;
use shared::errors::AppResult;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// アプリケーションを起動し、シャットダウンシグナルを受けるまで実行する
///
/// # 処理内容
/// 1. 環境変数とログシステムの初期化
/// 2. サーバー設定の読み込み
/// 3. データベースの初期化
/// 4. サービスの組み立てとHTTPサーバーの起動
pub async fn run() -> AppResult<()> {
    load_environment_variables();
    initialize_logging_system();

    info!("アプリケーション初期化を開始します...");

    let config = ServerConfig::from_env().map_err(|e| {
        error!("設定の読み込みに失敗しました: {}", e.details());
        e
    })?;

    info!("データベースを初期化しています: {:?}", config.database_path);
    let db = initialize_database(&config.database_path).map_err(|e| {
        error!("データベースの初期化に失敗しました: {}", e.details());
        e
    })?;

    let service = SubscriptionService::new(
        Arc::new(SqliteSubscriptionStore::new(db)),
        Arc::new(LogEventSink),
    );

    let server = HttpServer::bind(config.address, service, config.shutdown_timeout).await?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("シャットダウンを開始します...");
        trigger.cancel();
    });

    info!("アプリケーション初期化が完了しました");

    server.run(shutdown).await
}
