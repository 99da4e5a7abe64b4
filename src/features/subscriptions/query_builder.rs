//! サブスクリプション用SQL組み立て
//!
//! 任意の組み合わせの絞り込み条件・更新フィールドから、パラメータ化されたSQLを生成します。
//! カラム名は `Column` 列挙型からのみ生成され、呼び出し元の値は必ずバインドパラメータとして渡されます。

use super::models::{
    EndDateUpdate, FieldUpdate, PageRequest, SubscriptionChanges, SubscriptionFilter,
    SubscriptionId, SummaryQuery,
};
use rusqlite::types::Value;

/// サブスクリプションテーブル名
pub const TABLE: &str = "subscriptions";

/// SELECT / RETURNING で取得するカラム（行変換の順序と一致させること）
pub const SUBSCRIPTION_COLUMNS: &str =
    "subscription_id, user_id, service_name, price, start_date, end_date";

/// サブスクリプションテーブルのカラム
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    SubscriptionId,
    UserId,
    ServiceName,
    Price,
    StartDate,
    EndDate,
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::SubscriptionId => "subscription_id",
            Column::UserId => "user_id",
            Column::ServiceName => "service_name",
            Column::Price => "price",
            Column::StartDate => "start_date",
            Column::EndDate => "end_date",
        }
    }
}

/// WHERE句の条件（カラムと値の組）
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column = ?`
    Eq(Column, Value),
    /// `column <= ?`
    AtMost(Column, Value),
    /// `(column IS NULL OR column >= ?)`
    NullOrAtLeast(Column, Value),
}

impl Predicate {
    fn render(&self, placeholder: &str) -> String {
        match self {
            Predicate::Eq(column, _) => format!("{} = {placeholder}", column.as_str()),
            Predicate::AtMost(column, _) => format!("{} <= {placeholder}", column.as_str()),
            Predicate::NullOrAtLeast(column, _) => format!(
                "({col} IS NULL OR {col} >= {placeholder})",
                col = column.as_str()
            ),
        }
    }

    fn value(&self) -> &Value {
        match self {
            Predicate::Eq(_, value)
            | Predicate::AtMost(_, value)
            | Predicate::NullOrAtLeast(_, value) => value,
        }
    }
}

/// 実行可能なSQLとバインドパラメータ
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    /// `?N` 形式のプレースホルダーを払い出しつつパラメータを追加する
    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("?{}", self.params.len())
    }
}

/// SELECT文の組み立て
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    select: String,
    predicates: Vec<Predicate>,
    order_by: Option<Column>,
    page: Option<PageRequest>,
}

impl QueryBuilder {
    /// `SELECT {projection} FROM subscriptions` から開始する
    pub fn select(projection: &str) -> Self {
        Self {
            select: format!("SELECT {projection} FROM {TABLE}"),
            predicates: Vec::new(),
            order_by: None,
            page: None,
        }
    }

    /// 条件を追加する
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// 値がある場合のみ等価条件を追加する
    pub fn and_eq_opt(self, column: Column, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.and(Predicate::Eq(column, Value::Text(value.to_string()))),
            None => self,
        }
    }

    /// 一覧の絞り込み条件をまとめて追加する
    pub fn filtered_by(self, filter: &SubscriptionFilter) -> Self {
        self.and_eq_opt(Column::UserId, filter.user_id.as_deref())
            .and_eq_opt(Column::ServiceName, filter.service_name.as_deref())
    }

    pub fn order_by(mut self, column: Column) -> Self {
        self.order_by = Some(column);
        self
    }

    pub fn paginate(mut self, page: PageRequest) -> Self {
        self.page = Some(page);
        self
    }

    pub fn build(&self) -> Statement {
        let mut statement = Statement {
            sql: self.select.clone(),
            params: Vec::with_capacity(self.predicates.len() + 2),
        };

        let mut conditions = Vec::with_capacity(self.predicates.len());
        for predicate in &self.predicates {
            let placeholder = statement.bind(predicate.value().clone());
            conditions.push(predicate.render(&placeholder));
        }

        if !conditions.is_empty() {
            statement.sql.push_str(" WHERE ");
            statement.sql.push_str(&conditions.join(" AND "));
        }

        if let Some(column) = self.order_by {
            statement.sql.push_str(" ORDER BY ");
            statement.sql.push_str(column.as_str());
        }

        if let Some(page) = self.page {
            let limit = statement.bind(Value::Integer(page.limit));
            let offset = statement.bind(Value::Integer(page.offset));
            statement.sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
        }

        statement
    }
}

/// 一覧取得用の件数クエリとページクエリを組み立てる
///
/// 両方のクエリは同じ絞り込み条件を共有する。
///
/// # 戻り値
/// (件数クエリ, ページクエリ)
pub fn list_statements(filter: &SubscriptionFilter, page: PageRequest) -> (Statement, Statement) {
    let filtered = |projection: &str| QueryBuilder::select(projection).filtered_by(filter);

    let count = filtered("COUNT(*)").build();
    let rows = filtered(SUBSCRIPTION_COLUMNS)
        .order_by(Column::SubscriptionId)
        .paginate(page)
        .build();

    (count, rows)
}

/// 期間内に有効なサブスクリプションの料金合計クエリを組み立てる
///
/// 開始月が期間終了以前で、終了月が未設定または期間開始以降のものが対象。
pub fn summary_statement(query: &SummaryQuery) -> Statement {
    QueryBuilder::select("COALESCE(SUM(price), 0)")
        .and(Predicate::AtMost(Column::StartDate, query.end.into()))
        .and(Predicate::NullOrAtLeast(Column::EndDate, query.start.into()))
        .filtered_by(&query.filter)
        .build()
}

/// UPDATE文の組み立て（指定されたフィールドのみSET句に含める）
#[derive(Debug, Clone, Default)]
pub struct UpdateBuilder {
    assignments: Vec<(Column, Value)>,
}

impl UpdateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: Column, value: Value) -> Self {
        self.assignments.push((column, value));
        self
    }

    fn set_field<T: Into<Value>>(self, column: Column, update: FieldUpdate<T>) -> Self {
        match update {
            FieldUpdate::Unchanged => self,
            FieldUpdate::SetTo(value) => self.set(column, value.into()),
        }
    }

    /// 部分更新内容からSET句を構成する
    pub fn from_changes(changes: &SubscriptionChanges) -> Self {
        let builder = Self::new()
            .set_field(Column::ServiceName, changes.service_name.clone())
            .set_field(Column::Price, changes.price.clone())
            .set_field(Column::UserId, changes.user_id.clone())
            .set_field(Column::StartDate, changes.start_date.clone());

        match changes.end_date {
            EndDateUpdate::Unchanged => builder,
            EndDateUpdate::SetTo(date) => builder.set(Column::EndDate, date.into()),
            EndDateUpdate::Cleared => builder.set(Column::EndDate, Value::Null),
        }
    }

    /// 更新後の行を返すUPDATE文を組み立てる
    ///
    /// # 戻り値
    /// 更新対象のフィールドがない場合は `None`
    pub fn build(&self, id: SubscriptionId) -> Option<Statement> {
        if self.assignments.is_empty() {
            return None;
        }

        let mut statement = Statement {
            sql: String::new(),
            params: Vec::with_capacity(self.assignments.len() + 1),
        };

        let mut sets = Vec::with_capacity(self.assignments.len());
        for (column, value) in &self.assignments {
            let placeholder = statement.bind(value.clone());
            sets.push(format!("{} = {placeholder}", column.as_str()));
        }

        let id_placeholder = statement.bind(Value::Integer(id.value()));
        statement.sql = format!(
            "UPDATE {TABLE} SET {} WHERE {} = {id_placeholder} RETURNING {SUBSCRIPTION_COLUMNS}",
            sets.join(", "),
            Column::SubscriptionId.as_str(),
        );

        Some(statement)
    }
}
