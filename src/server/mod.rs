//! HTTPサーバー
//!
//! サブスクリプションAPIをHTTP/1で公開し、シャットダウン要求を受けると
//! 新規接続の受け付けを停止して処理中の接続の完了を待ちます。

pub mod response;
pub mod router;

use crate::features::subscriptions::SubscriptionService;
use crate::shared::errors::AppResult;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// サブスクリプションAPIサーバー
pub struct HttpServer {
    listener: TcpListener,
    service: SubscriptionService,
    shutdown_timeout: Duration,
}

impl HttpServer {
    /// 指定アドレスで待ち受けを開始する
    ///
    /// # 引数
    /// * `address` - 待ち受けアドレス（ポート0で自動割り当て）
    /// * `service` - リクエスト処理に使うサービス
    /// * `shutdown_timeout` - シャットダウン時に処理中の接続を待つ時間
    pub async fn bind(
        address: SocketAddr,
        service: SubscriptionService,
        shutdown_timeout: Duration,
    ) -> AppResult<Self> {
        let listener = TcpListener::bind(address).await?;
        log::info!("HTTPサーバーを開始しました: http://{}", listener.local_addr()?);

        Ok(Self {
            listener,
            service,
            shutdown_timeout,
        })
    }

    /// 実際に待ち受けているアドレス
    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// シャットダウンが要求されるまで接続を受け付ける
    ///
    /// # 処理内容
    /// 1. `shutdown` がキャンセルされるまで接続を受け付ける
    /// 2. 処理中の接続にグレースフルシャットダウンを通知
    /// 3. タイムアウトまで接続の完了を待つ
    pub async fn run(self, shutdown: CancellationToken) -> AppResult<()> {
        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let service = self.service.clone();
                        let shutdown = shutdown.clone();
                        tracker.spawn(serve_connection(stream, peer, service, shutdown));
                    }
                    Err(e) => {
                        log::error!("接続受け入れエラー: {e}");
                    }
                },
            }
        }

        log::info!("新規接続の受け付けを停止しました（処理中の接続: {}）", tracker.len());
        tracker.close();

        if tokio::time::timeout(self.shutdown_timeout, tracker.wait())
            .await
            .is_err()
        {
            log::warn!(
                "シャットダウン待機がタイムアウトしました: {}秒",
                self.shutdown_timeout.as_secs()
            );
        }

        log::info!("HTTPサーバーを停止しました");
        Ok(())
    }
}

/// TCP接続を処理する
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: SubscriptionService,
    shutdown: CancellationToken,
) {
    log::debug!("接続を受け付けました: {peer}");

    let io = TokioIo::new(stream);
    let handler = service_fn(move |req: Request<Incoming>| {
        router::handle_request(req, service.clone())
    });

    let conn = http1::Builder::new().serve_connection(io, handler);
    let mut conn = std::pin::pin!(conn);
    let cancelled = shutdown.cancelled();
    let mut cancelled = std::pin::pin!(cancelled);
    let mut draining = false;

    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    log::debug!("HTTP接続処理エラー: {peer}: {e}");
                }
                break;
            }
            _ = cancelled.as_mut(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

/// Ctrl-C または SIGTERM を待つ
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Ctrl-Cハンドラの登録に失敗: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("SIGTERMハンドラの登録に失敗: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Ctrl-Cを受信しました"),
        _ = terminate => log::info!("SIGTERMを受信しました"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::subscriptions::events::RecordingEventSink;
    use crate::features::subscriptions::SqliteSubscriptionStore;
    use crate::shared::database::open_in_memory_database;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn create_test_service() -> SubscriptionService {
        let db = open_in_memory_database().unwrap();
        SubscriptionService::new(
            Arc::new(SqliteSubscriptionStore::new(db)),
            Arc::new(RecordingEventSink::default()),
        )
    }

    #[tokio::test]
    async fn test_server_answers_and_stops_on_cancel() {
        let server = HttpServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            create_test_service(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        assert!(addr.port() > 0);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.run(shutdown.clone()));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains(r#""status":"ok""#));

        shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
