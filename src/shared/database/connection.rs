use crate::shared::errors::{AppError, AppResult};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// 共有データベース接続ハンドル
pub type SharedConnection = Arc<Mutex<Connection>>;

/// データベース接続を初期化し、テーブルを作成する
///
/// # 引数
/// * `database_path` - SQLiteデータベースファイルのパス
///
/// # 戻り値
/// 共有データベース接続、または失敗時はエラー
///
/// # 処理内容
/// 1. 親ディレクトリの確保
/// 2. データベース接続の開設
/// 3. 接続設定の適用
/// 4. テーブルとインデックスの作成
pub fn initialize_database(database_path: &Path) -> AppResult<SharedConnection> {
    if let Some(parent) = database_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::configuration(format!("データベースディレクトリの作成に失敗: {e}"))
            })?;
            log::info!("データベースディレクトリを作成: {:?}", parent);
        }
    }

    let conn = Connection::open(database_path)?;
    configure_connection(&conn)?;
    create_tables(&conn)?;

    log::info!("データベースを初期化しました: {:?}", database_path);

    Ok(Arc::new(Mutex::new(conn)))
}

/// メモリ上のデータベースを初期化する（テスト・一時利用向け）
pub fn open_in_memory_database() -> AppResult<SharedConnection> {
    let conn = Connection::open_in_memory()?;
    configure_connection(&conn)?;
    create_tables(&conn)?;

    Ok(Arc::new(Mutex::new(conn)))
}

/// 接続単位の設定を適用する
fn configure_connection(conn: &Connection) -> AppResult<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    // ロック競合時に即座に失敗させない
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    Ok(())
}

/// データベーステーブルを作成する
///
/// 何度実行しても結果は変わらない。
///
/// # 引数
/// * `conn` - データベース接続
///
/// # 戻り値
/// 成功時はOk(())、失敗時はエラー
pub fn create_tables(conn: &Connection) -> AppResult<()> {
    create_subscriptions_table(conn)?;
    create_indexes(conn)?;

    Ok(())
}

/// サブスクリプションテーブルを作成する
fn create_subscriptions_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subscriptions (
            subscription_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            service_name TEXT NOT NULL CHECK(length(service_name) > 0),
            price INTEGER NOT NULL CHECK(price >= 0),
            start_date TEXT NOT NULL,
            end_date TEXT
        )",
        [],
    )?;

    Ok(())
}

/// インデックスを作成する
fn create_indexes(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_user_id ON subscriptions(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_service_name ON subscriptions(service_name)",
        [],
    )?;

    Ok(())
}
