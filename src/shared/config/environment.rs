use crate::shared::errors::{AppError, AppResult};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// 待ち受けアドレスのデフォルト値
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:8080";

/// シャットダウン時に処理中リクエストを待つ秒数のデフォルト値
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// アプリケーションの実行環境を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// 開発環境
    Development,
    /// プロダクション環境
    Production,
}

impl Environment {
    /// 環境名から判定する（`production` 以外は開発環境）
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "production" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

/// 環境設定を管理する構造体
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// 実行環境
    pub environment: Environment,
    /// ログレベル
    pub log_level: String,
}

impl EnvironmentConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Self {
        Self::new(get_environment(), std::env::var("LOG_LEVEL").ok())
    }

    /// 実行環境とログレベル指定から作成する
    ///
    /// ログレベル未指定の場合、開発環境は debug、プロダクション環境は info
    pub fn new(environment: Environment, log_level: Option<String>) -> Self {
        let log_level = log_level.unwrap_or_else(|| match environment {
            Environment::Development => "debug".to_string(),
            Environment::Production => "info".to_string(),
        });

        Self {
            environment,
            log_level,
        }
    }

    /// ログレベル文字列を `LevelFilter` に変換する（不明な値は Info）
    pub fn level_filter(&self) -> log::LevelFilter {
        match self.log_level.to_lowercase().as_str() {
            "error" => log::LevelFilter::Error,
            "warn" => log::LevelFilter::Warn,
            "info" => log::LevelFilter::Info,
            "debug" => log::LevelFilter::Debug,
            "trace" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Info,
        }
    }
}

/// 現在の実行環境を判定する
///
/// # 判定ロジック
/// 1. 実行時環境変数 ENVIRONMENT を確認
/// 2. デバッグビルドの場合は Development
/// 3. リリースビルドの場合は Production
pub fn get_environment() -> Environment {
    if let Ok(env_var) = std::env::var("ENVIRONMENT") {
        let env = Environment::from_name(&env_var);
        log::debug!("環境判定: 実行時環境変数を使用 -> {env_var} -> {env:?}");
        return env;
    }

    let env = if cfg!(debug_assertions) {
        Environment::Development
    } else {
        Environment::Production
    };
    log::debug!(
        "環境判定: ビルド設定を使用 -> debug_assertions={} -> {env:?}",
        cfg!(debug_assertions)
    );
    env
}

/// 環境に応じたデータベースファイル名を取得する
///
/// # ファイル名の規則
/// - 開発環境: "dev_subscriptions.db"
/// - プロダクション環境: "subscriptions.db"
pub fn get_database_filename(env: Environment) -> &'static str {
    match env {
        Environment::Development => "dev_subscriptions.db",
        Environment::Production => "subscriptions.db",
    }
}

/// 環境に応じた.envファイルを読み込む
///
/// `ENVIRONMENT=production` の場合は `.env.production`、それ以外は `.env` を読み込む。
/// 環境固有のファイルがない場合はデフォルトの `.env` を試行する。
pub fn load_environment_variables() {
    let environment = std::env::var("ENVIRONMENT")
        .map(|name| Environment::from_name(&name))
        .unwrap_or(Environment::Development);

    let env_file = match environment {
        Environment::Production => ".env.production",
        Environment::Development => ".env",
    };

    log::info!("環境: {}, 読み込み対象: {env_file}", environment.as_str());

    match dotenv::from_filename(env_file) {
        Ok(_) => {
            log::info!("{env_file}ファイルを読み込みました");
        }
        Err(_) if env_file != ".env" => match dotenv::dotenv() {
            Ok(_) => {
                log::warn!("{env_file}が見つからないため、デフォルトの.envファイルを読み込みました");
            }
            Err(_) => {
                log::warn!("環境変数ファイルが見つかりません。直接設定された環境変数を使用します。");
            }
        },
        Err(_) => {
            log::warn!(".envファイルが見つかりません。直接設定された環境変数を使用します。");
        }
    }
}

/// ログシステムを初期化する
///
/// # 処理内容
/// 1. 環境設定を取得
/// 2. ログレベルを設定
/// 3. env_loggerを初期化
pub fn initialize_logging_system() {
    let env_config = EnvironmentConfig::from_env();

    env_logger::Builder::from_default_env()
        .filter_level(env_config.level_filter())
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .init();

    log::info!(
        "ログシステムを初期化しました: level={}, environment={}",
        env_config.log_level,
        env_config.environment.as_str()
    );
}

/// HTTPサーバーの設定
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// 待ち受けアドレス
    pub address: SocketAddr,
    /// SQLiteデータベースファイルのパス
    pub database_path: PathBuf,
    /// シャットダウン時に処理中の接続を待つ時間
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// 環境変数からサーバー設定を読み込む
    ///
    /// # 環境変数
    /// - `SERVER_ADDRESS`: 待ち受けアドレス（デフォルト: 127.0.0.1:8080）
    /// - `DATABASE_PATH`: データベースファイル（デフォルト: 環境に応じたファイル名）
    /// - `SHUTDOWN_TIMEOUT_SECS`: シャットダウン待機秒数（デフォルト: 10）
    ///
    /// # 戻り値
    /// サーバー設定、または値が不正な場合は設定エラー
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(get_environment(), |key| std::env::var(key).ok())
    }

    /// 任意の取得関数から設定を組み立てる
    pub fn from_lookup<F>(environment: Environment, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let address_text = read("SERVER_ADDRESS").unwrap_or_else(|| DEFAULT_SERVER_ADDRESS.to_string());
        let address = address_text.trim().parse::<SocketAddr>().map_err(|e| {
            AppError::configuration(format!("SERVER_ADDRESS が不正です: {address_text} ({e})"))
        })?;

        let database_path = read("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(get_database_filename(environment)));

        let shutdown_timeout = match read("SHUTDOWN_TIMEOUT_SECS") {
            Some(text) => text.trim().parse::<u64>().map_err(|e| {
                AppError::configuration(format!(
                    "SHUTDOWN_TIMEOUT_SECS が不正です: {text} ({e})"
                ))
            })?,
            None => DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        };

        Ok(Self {
            address,
            database_path,
            shutdown_timeout: Duration::from_secs(shutdown_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_get_database_filename() {
        assert_eq!(
            get_database_filename(Environment::Development),
            "dev_subscriptions.db"
        );
        assert_eq!(
            get_database_filename(Environment::Production),
            "subscriptions.db"
        );
    }

    #[test]
    fn test_environment_from_name() {
        assert_eq!(Environment::from_name("production"), Environment::Production);
        assert_eq!(Environment::from_name(" Production "), Environment::Production);
        assert_eq!(Environment::from_name("staging"), Environment::Development);
        assert_eq!(Environment::from_name(""), Environment::Development);
    }

    #[test]
    fn test_get_environment() {
        // 実際の値はビルド設定と環境変数に依存
        let env = get_environment();
        assert!(matches!(
            env,
            Environment::Development | Environment::Production
        ));
    }

    #[test]
    fn test_environment_config_log_level() {
        let dev_config = EnvironmentConfig::new(Environment::Development, None);
        assert_eq!(dev_config.log_level, "debug");
        assert_eq!(dev_config.level_filter(), log::LevelFilter::Debug);

        let prod_config = EnvironmentConfig::new(Environment::Production, None);
        assert_eq!(prod_config.level_filter(), log::LevelFilter::Info);

        let explicit = EnvironmentConfig::new(Environment::Production, Some("WARN".to_string()));
        assert_eq!(explicit.level_filter(), log::LevelFilter::Warn);

        let unknown = EnvironmentConfig::new(Environment::Development, Some("verbose".to_string()));
        assert_eq!(unknown.level_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::from_lookup(Environment::Production, lookup_from(&[])).unwrap();

        assert_eq!(config.address, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.database_path, PathBuf::from("subscriptions.db"));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));

        let dev = ServerConfig::from_lookup(Environment::Development, lookup_from(&[])).unwrap();
        assert_eq!(dev.database_path, PathBuf::from("dev_subscriptions.db"));
    }

    #[test]
    fn test_server_config_overrides() {
        let config = ServerConfig::from_lookup(
            Environment::Development,
            lookup_from(&[
                ("SERVER_ADDRESS", "0.0.0.0:9000"),
                ("DATABASE_PATH", "/var/lib/subs/data.db"),
                ("SHUTDOWN_TIMEOUT_SECS", "3"),
            ]),
        )
        .unwrap();

        assert_eq!(config.address.port(), 9000);
        assert_eq!(config.database_path, PathBuf::from("/var/lib/subs/data.db"));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_server_config_rejects_invalid_values() {
        for pairs in [
            [("SERVER_ADDRESS", "localhost")],
            [("SHUTDOWN_TIMEOUT_SECS", "-1")],
        ] {
            let result = ServerConfig::from_lookup(Environment::Development, lookup_from(&pairs));
            assert!(matches!(result, Err(AppError::Configuration(_))));
        }
    }

    #[test]
    fn test_load_environment_variables() {
        // .envファイルがなくてもパニックしない
        load_environment_variables();
    }
}
