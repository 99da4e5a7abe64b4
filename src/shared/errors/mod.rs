use hyper::StatusCode;
use thiserror::Error;

use crate::features::subscriptions::month_year::DateFormatError;

/// アプリケーション全体で使用される統一エラー型
#[derive(Debug, Error)]
pub enum AppError {
    /// データベース関連のエラー
    #[error("データベースエラー: {0}")]
    Database(String),

    /// バリデーション関連のエラー
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// リソースが見つからない場合のエラー
    #[error("リソースが見つかりません: {0}")]
    NotFound(String),

    /// 設定関連のエラー
    #[error("設定エラー: {0}")]
    Configuration(String),

    /// I/O関連のエラー
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    /// JSON解析エラー
    #[error("JSON解析エラー: {0}")]
    Json(#[from] serde_json::Error),

    /// その他の内部エラー（バックグラウンドタスクの異常終了など）
    #[error("内部エラー: {0}")]
    Internal(String),
}

/// エラーの種別
///
/// 呼び出し側はメッセージ文字列ではなくこの種別で分岐する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 呼び出し元の入力が不正
    Validation,
    /// 対象レコードが存在しない
    NotFound,
    /// 永続化層の障害
    Persistence,
    /// 起動設定の不備
    Configuration,
    /// その他の内部エラー
    Internal,
}

/// エラーの重要度を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorSeverity {
    /// 低重要度（ユーザー入力エラーなど）
    Low,
    /// 中重要度（入出力の一時的エラーなど）
    Medium,
    /// 高重要度（データベースエラーなど）
    High,
}

impl AppError {
    /// ユーザーに表示するためのフレンドリーなメッセージを取得
    ///
    /// データベースの生のエラーテキストは含めない。
    ///
    /// # 戻り値
    /// ユーザーに表示可能なエラーメッセージ
    pub fn user_message(&self) -> &str {
        match self {
            AppError::Database(_) => "データベース操作でエラーが発生しました",
            AppError::Validation(msg) => msg,
            AppError::NotFound(msg) => msg,
            AppError::Configuration(_) => "設定エラーが発生しました",
            AppError::Io(_) => "ファイル操作でエラーが発生しました",
            AppError::Json(_) => "データ形式の解析でエラーが発生しました",
            AppError::Internal(_) => "内部エラーが発生しました",
        }
    }

    /// エラーの詳細情報を取得
    ///
    /// # 戻り値
    /// エラーの詳細情報（ログ出力用）
    pub fn details(&self) -> String {
        format!("{self}")
    }

    /// エラーの種別を取得
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Database(_) => ErrorKind::Persistence,
            AppError::Validation(_) | AppError::Json(_) => ErrorKind::Validation,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Configuration(_) => ErrorKind::Configuration,
            AppError::Io(_) | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// エラーの重要度を取得
    ///
    /// # 戻り値
    /// エラーの重要度レベル
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AppError::Database(_) => ErrorSeverity::High,
            AppError::Validation(_) => ErrorSeverity::Low,
            AppError::NotFound(_) => ErrorSeverity::Low,
            AppError::Configuration(_) => ErrorSeverity::High,
            AppError::Io(_) => ErrorSeverity::Medium,
            AppError::Json(_) => ErrorSeverity::Low,
            AppError::Internal(_) => ErrorSeverity::High,
        }
    }

    /// HTTPステータスコードへの対応付け
    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Persistence | ErrorKind::Configuration | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 操作名をデータベースエラーに付与する
    ///
    /// # 引数
    /// * `operation` - 失敗した操作名（例: `service.subscription.create`）
    ///
    /// # 戻り値
    /// データベースエラーの場合は操作名を前置したエラー、それ以外はそのまま
    pub fn in_operation(self, operation: &str) -> Self {
        match self {
            AppError::Database(msg) => AppError::Database(format!("{operation}: {msg}")),
            other => other,
        }
    }

    /// バリデーションエラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `message` - バリデーションエラーメッセージ
    ///
    /// # 戻り値
    /// バリデーションエラー
    pub fn validation<S: Into<String>>(message: S) -> Self {
        AppError::Validation(message.into())
    }

    /// リソース未発見エラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `resource` - 見つからなかったリソース名
    ///
    /// # 戻り値
    /// リソース未発見エラー
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        AppError::NotFound(format!("{}が見つかりません", resource.into()))
    }

    /// 設定エラーを作成するヘルパー関数
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        AppError::Configuration(message.into())
    }
}

/// rusqlite::ErrorからAppErrorへの変換
impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        AppError::Database(error.to_string())
    }
}

/// 日付形式エラーはバリデーションエラーとして扱う
impl From<DateFormatError> for AppError {
    fn from(error: DateFormatError) -> Self {
        AppError::Validation(error.to_string())
    }
}

/// Result型のエイリアス（アプリケーション全体で使用）
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity() {
        assert_eq!(
            AppError::validation("テスト").severity(),
            ErrorSeverity::Low
        );
        assert_eq!(
            AppError::not_found("サブスクリプション").severity(),
            ErrorSeverity::Low
        );
        assert_eq!(
            AppError::Database("接続失敗".to_string()).severity(),
            ErrorSeverity::High
        );
        assert_eq!(
            AppError::configuration("設定ファイル不正").severity(),
            ErrorSeverity::High
        );
    }

    #[test]
    fn test_user_message_hides_database_details() {
        let validation_error = AppError::validation("金額が不正です");
        assert_eq!(validation_error.user_message(), "金額が不正です");

        let not_found_error = AppError::not_found("サブスクリプション");
        assert_eq!(
            not_found_error.user_message(),
            "サブスクリプションが見つかりません"
        );

        let db_error = AppError::Database("no such table: subscriptions".to_string());
        assert!(!db_error.user_message().contains("subscriptions"));
    }

    #[test]
    fn test_kind_and_status_code() {
        assert_eq!(AppError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(AppError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(
            AppError::Database("x".to_string()).kind(),
            ErrorKind::Persistence
        );

        assert_eq!(
            AppError::validation("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::not_found("x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Database("x".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_in_operation_only_annotates_database_errors() {
        let db_error = AppError::Database("disk I/O error".to_string())
            .in_operation("service.subscription.create");
        assert!(db_error.details().contains("service.subscription.create"));
        assert_eq!(db_error.kind(), ErrorKind::Persistence);

        let not_found = AppError::not_found("ID 1 のサブスクリプション")
            .in_operation("service.subscription.get");
        assert!(matches!(not_found, AppError::NotFound(_)));
        assert!(!not_found.details().contains("service.subscription.get"));
    }

    #[test]
    fn test_rusqlite_no_rows_converts_to_database_error() {
        let error: AppError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(error.kind(), ErrorKind::Persistence);
    }
}
