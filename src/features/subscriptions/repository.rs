use super::models::{
    NewSubscription, PageRequest, Subscription, SubscriptionChanges, SubscriptionFilter,
    SubscriptionId, SubscriptionPage, SummaryQuery,
};
use super::query_builder::{self, Statement, UpdateBuilder, SUBSCRIPTION_COLUMNS};
use crate::shared::errors::{AppError, AppResult};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::sync::{Arc, Mutex, MutexGuard};

/// サブスクリプションの永続化ポート
///
/// サービス層はこのトレイト経由でのみストアにアクセスする。
pub trait SubscriptionStore: Send + Sync {
    /// 新規作成（IDはストアが採番する）
    fn insert(&self, subscription: &NewSubscription) -> AppResult<Subscription>;

    /// IDで取得する。存在しない場合は `AppError::NotFound`
    fn find_by_id(&self, id: SubscriptionId) -> AppResult<Subscription>;

    /// IDで削除し、影響行数を返す
    fn delete_by_id(&self, id: SubscriptionId) -> AppResult<usize>;

    /// 絞り込み・ページングして取得する
    fn list_filtered(
        &self,
        filter: &SubscriptionFilter,
        page: PageRequest,
    ) -> AppResult<SubscriptionPage>;

    /// 指定フィールドのみ更新する。変更なしの場合は現在のレコードを返す
    fn update_partial(
        &self,
        id: SubscriptionId,
        changes: &SubscriptionChanges,
    ) -> AppResult<Subscription>;

    /// 期間内に有効なサブスクリプションの料金合計
    fn sum_price_in_range(&self, query: &SummaryQuery) -> AppResult<i64>;
}

/// SQLiteによるストア実装
#[derive(Clone)]
pub struct SqliteSubscriptionStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteSubscriptionStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| AppError::Database(format!("データベースロックエラー: {e}")))
    }
}

impl SubscriptionStore for SqliteSubscriptionStore {
    fn insert(&self, subscription: &NewSubscription) -> AppResult<Subscription> {
        create(&*self.lock()?, subscription)
    }

    fn find_by_id(&self, id: SubscriptionId) -> AppResult<Subscription> {
        find_by_id(&*self.lock()?, id)
    }

    fn delete_by_id(&self, id: SubscriptionId) -> AppResult<usize> {
        delete(&*self.lock()?, id)
    }

    fn list_filtered(
        &self,
        filter: &SubscriptionFilter,
        page: PageRequest,
    ) -> AppResult<SubscriptionPage> {
        find_filtered(&*self.lock()?, filter, page)
    }

    fn update_partial(
        &self,
        id: SubscriptionId,
        changes: &SubscriptionChanges,
    ) -> AppResult<Subscription> {
        update(&*self.lock()?, id, changes)
    }

    fn sum_price_in_range(&self, query: &SummaryQuery) -> AppResult<i64> {
        sum_price_in_range(&*self.lock()?, query)
    }
}

/// 行をサブスクリプションに変換する（`SUBSCRIPTION_COLUMNS` の順序）
fn map_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: SubscriptionId::from(row.get::<_, i64>(0)?),
        user_id: row.get(1)?,
        service_name: row.get(2)?,
        price: row.get(3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
    })
}

fn not_found(id: SubscriptionId) -> AppError {
    AppError::not_found(format!("ID {id} のサブスクリプション"))
}

/// サブスクリプションを作成する
///
/// # 引数
/// * `conn` - データベース接続
/// * `subscription` - 検証済みの新規サブスクリプション
///
/// # 戻り値
/// 作成されたサブスクリプション、または失敗時はエラー
pub fn create(conn: &Connection, subscription: &NewSubscription) -> AppResult<Subscription> {
    conn.execute(
        "INSERT INTO subscriptions (user_id, service_name, price, start_date, end_date)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            subscription.user_id,
            subscription.service_name,
            subscription.price,
            subscription.start_date,
            subscription.end_date,
        ],
    )?;

    let id = SubscriptionId::from(conn.last_insert_rowid());
    log::debug!("サブスクリプションを挿入しました: subscription_id={id}");

    find_by_id(conn, id)
}

/// IDでサブスクリプションを取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
///
/// # 戻り値
/// サブスクリプション、または失敗時はエラー
pub fn find_by_id(conn: &Connection, id: SubscriptionId) -> AppResult<Subscription> {
    conn.query_row(
        &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE subscription_id = ?1"),
        params![id],
        map_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => not_found(id),
        _ => AppError::from(e),
    })
}

/// 絞り込み条件に一致するサブスクリプションの件数とページを取得する
///
/// 件数とページは別々のクエリで取得するため、同時書き込みがある場合は整合しないことがある。
pub fn find_filtered(
    conn: &Connection,
    filter: &SubscriptionFilter,
    page: PageRequest,
) -> AppResult<SubscriptionPage> {
    let (count_statement, page_statement) = query_builder::list_statements(filter, page);

    let total: i64 = conn.query_row(
        &count_statement.sql,
        params_from_iter(count_statement.params.iter()),
        |row| row.get(0),
    )?;

    let subscriptions = query_all(conn, &page_statement)?;

    log::debug!(
        "サブスクリプション一覧を取得しました: count={}, total={total}",
        subscriptions.len()
    );

    Ok(SubscriptionPage {
        subscriptions,
        total,
    })
}

fn query_all(conn: &Connection, statement: &Statement) -> AppResult<Vec<Subscription>> {
    let mut stmt = conn.prepare(&statement.sql)?;
    let rows = stmt.query_map(params_from_iter(statement.params.iter()), map_row)?;

    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
}

/// サブスクリプションを部分更新する
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
/// * `changes` - 更新内容（指定されたフィールドのみ変更）
///
/// # 戻り値
/// 更新後のサブスクリプション、または失敗時はエラー
pub fn update(
    conn: &Connection,
    id: SubscriptionId,
    changes: &SubscriptionChanges,
) -> AppResult<Subscription> {
    let Some(statement) = UpdateBuilder::from_changes(changes).build(id) else {
        // 変更がない場合は書き込まずに現在の値を返す
        return find_by_id(conn, id);
    };

    conn.query_row(
        &statement.sql,
        params_from_iter(statement.params.iter()),
        map_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => not_found(id),
        _ => AppError::from(e),
    })
}

/// サブスクリプションを削除する
///
/// # 戻り値
/// 削除された行数（存在しない場合は0）
pub fn delete(conn: &Connection, id: SubscriptionId) -> AppResult<usize> {
    let rows_affected = conn.execute(
        "DELETE FROM subscriptions WHERE subscription_id = ?1",
        params![id],
    )?;

    Ok(rows_affected)
}

/// 期間内に有効なサブスクリプションの料金合計を計算する
///
/// 該当がない場合は0を返す。
pub fn sum_price_in_range(conn: &Connection, query: &SummaryQuery) -> AppResult<i64> {
    let statement = query_builder::summary_statement(query);

    let total: i64 = conn.query_row(
        &statement.sql,
        params_from_iter(statement.params.iter()),
        |row| row.get(0),
    )?;

    Ok(total)
}
