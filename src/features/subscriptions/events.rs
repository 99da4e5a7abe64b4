use super::models::SubscriptionId;
use super::month_year::MonthYear;
use crate::shared::errors::{AppError, ErrorKind};

/// サブスクリプション操作で発生するドメインイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEvent {
    Created {
        id: SubscriptionId,
        user_id: String,
        service_name: String,
    },
    Retrieved {
        id: SubscriptionId,
    },
    Listed {
        count: usize,
        total: i64,
    },
    Updated {
        id: SubscriptionId,
    },
    Deleted {
        id: SubscriptionId,
    },
    Summarized {
        start: MonthYear,
        end: MonthYear,
        total: i64,
    },
    /// 入力検証で拒否された
    Rejected {
        operation: &'static str,
        reason: String,
    },
    /// 対象が存在しなかった
    Missing {
        operation: &'static str,
        reason: String,
    },
    /// 永続化層などで失敗した
    Failed {
        operation: &'static str,
        error: String,
    },
}

impl SubscriptionEvent {
    /// 失敗した操作のエラーをイベントに変換する
    pub fn from_error(operation: &'static str, error: &AppError) -> Self {
        match error.kind() {
            ErrorKind::Validation => SubscriptionEvent::Rejected {
                operation,
                reason: error.user_message().to_string(),
            },
            ErrorKind::NotFound => SubscriptionEvent::Missing {
                operation,
                reason: error.user_message().to_string(),
            },
            _ => SubscriptionEvent::Failed {
                operation,
                error: error.details(),
            },
        }
    }
}

/// ドメインイベントの受け取り先
///
/// サービス生成時に注入する。
pub trait SubscriptionEventSink: Send + Sync {
    fn record(&self, event: &SubscriptionEvent);
}

/// `log` クレート経由で出力するイベント受け取り先
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl SubscriptionEventSink for LogEventSink {
    fn record(&self, event: &SubscriptionEvent) {
        match event {
            SubscriptionEvent::Created {
                id,
                user_id,
                service_name,
            } => log::info!(
                "サブスクリプションを作成しました: subscription_id={id}, user_id={user_id}, service_name={service_name}"
            ),
            SubscriptionEvent::Retrieved { id } => {
                log::debug!("サブスクリプションを取得しました: subscription_id={id}")
            }
            SubscriptionEvent::Listed { count, total } => {
                log::debug!("サブスクリプション一覧を取得しました: count={count}, total={total}")
            }
            SubscriptionEvent::Updated { id } => {
                log::info!("サブスクリプションを更新しました: subscription_id={id}")
            }
            SubscriptionEvent::Deleted { id } => {
                log::info!("サブスクリプションを削除しました: subscription_id={id}")
            }
            SubscriptionEvent::Summarized { start, end, total } => log::debug!(
                "サブスクリプション料金を集計しました: start_date={start}, end_date={end}, total={total}"
            ),
            SubscriptionEvent::Rejected { operation, reason } => {
                log::warn!("入力が拒否されました: operation={operation}, reason={reason}")
            }
            SubscriptionEvent::Missing { operation, reason } => {
                log::warn!("対象が見つかりません: operation={operation}, reason={reason}")
            }
            SubscriptionEvent::Failed { operation, error } => {
                log::error!("操作に失敗しました: operation={operation}, error={error}")
            }
        }
    }
}

/// 受け取ったイベントを保持するテスト用の受け取り先
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: std::sync::Mutex<Vec<SubscriptionEvent>>,
}

#[cfg(test)]
impl RecordingEventSink {
    pub fn events(&self) -> Vec<SubscriptionEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl SubscriptionEventSink for RecordingEventSink {
    fn record(&self, event: &SubscriptionEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
