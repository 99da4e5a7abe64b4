use super::month_year::MonthYear;
use crate::shared::errors::{AppError, AppResult};
use rusqlite::types::{ToSql, ToSqlOutput};
use serde::{Deserialize, Serialize};
use std::fmt;

/// サブスクリプションID（ストアが採番する正の整数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(i64);

impl SubscriptionId {
    /// 呼び出し元から渡されたID文字列を検証して変換する
    ///
    /// # 引数
    /// * `raw` - ID文字列（パスパラメータなど）
    ///
    /// # 戻り値
    /// サブスクリプションID、または空・非数値・0以下の場合はバリデーションエラー
    pub fn parse(raw: &str) -> AppResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AppError::validation("サブスクリプションIDを指定してください"));
        }

        let value: i64 = raw
            .parse()
            .map_err(|_| AppError::validation(format!("サブスクリプションIDが不正です: {raw}")))?;

        if value <= 0 {
            return Err(AppError::validation(format!(
                "サブスクリプションIDは正の整数である必要があります: {raw}"
            )));
        }

        Ok(Self(value))
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for SubscriptionId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToSql for SubscriptionId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

/// サブスクリプションデータモデル
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Subscription {
    #[serde(rename = "subscription_id")]
    pub id: SubscriptionId,
    pub user_id: String,               // UUID形式
    pub service_name: String,          // 空文字不可
    pub price: i64,                    // 最小通貨単位、0以上
    pub start_date: MonthYear,         // MM-YYYY形式
    pub end_date: Option<MonthYear>,   // None は継続中
}

/// サブスクリプション作成用DTO（呼び出し元の未検証入力）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionDto {
    pub service_name: String,
    pub price: i64,
    pub user_id: String,
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
}

/// 検証済みの新規サブスクリプション（ストアへの挿入用）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubscription {
    pub user_id: String,
    pub service_name: String,
    pub price: i64,
    pub start_date: MonthYear,
    pub end_date: Option<MonthYear>,
}

/// サブスクリプション更新用DTO
///
/// フィールドを省略した場合は変更なし。`end_date` に空文字列を指定した場合は終了日をクリアする。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSubscriptionDto {
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl UpdateSubscriptionDto {
    /// 指定されたフィールドが一つもないか
    pub fn is_empty(&self) -> bool {
        self.service_name.is_none()
            && self.price.is_none()
            && self.user_id.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
    }
}

/// 部分更新における単一フィールドの指定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    /// 変更しない
    Unchanged,
    /// 指定値に設定する
    SetTo(T),
}

impl<T> FieldUpdate<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, FieldUpdate::Unchanged)
    }

    /// 現在値に適用した結果を返す
    pub fn apply(self, current: T) -> T {
        match self {
            FieldUpdate::Unchanged => current,
            FieldUpdate::SetTo(value) => value,
        }
    }
}

impl<T> Default for FieldUpdate<T> {
    fn default() -> Self {
        FieldUpdate::Unchanged
    }
}

impl<T> From<Option<T>> for FieldUpdate<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => FieldUpdate::SetTo(value),
            None => FieldUpdate::Unchanged,
        }
    }
}

/// 終了日の部分更新指定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndDateUpdate {
    /// 変更しない
    #[default]
    Unchanged,
    /// 指定月に設定する
    SetTo(MonthYear),
    /// 終了日を削除して継続中に戻す
    Cleared,
}

impl EndDateUpdate {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, EndDateUpdate::Unchanged)
    }

    /// 現在の終了日に適用した結果を返す
    pub fn apply(self, current: Option<MonthYear>) -> Option<MonthYear> {
        match self {
            EndDateUpdate::Unchanged => current,
            EndDateUpdate::SetTo(value) => Some(value),
            EndDateUpdate::Cleared => None,
        }
    }
}

/// 検証済みの部分更新内容
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscriptionChanges {
    pub service_name: FieldUpdate<String>,
    pub price: FieldUpdate<i64>,
    pub user_id: FieldUpdate<String>,
    pub start_date: FieldUpdate<MonthYear>,
    pub end_date: EndDateUpdate,
}

impl SubscriptionChanges {
    /// 変更対象のフィールドが一つもないか
    pub fn is_empty(&self) -> bool {
        self.service_name.is_unchanged()
            && self.price.is_unchanged()
            && self.user_id.is_unchanged()
            && self.start_date.is_unchanged()
            && self.end_date.is_unchanged()
    }

    /// 既存レコードに変更を適用した結果を返す（IDは維持）
    pub fn apply_to(&self, current: &Subscription) -> Subscription {
        Subscription {
            id: current.id,
            user_id: self.user_id.clone().apply(current.user_id.clone()),
            service_name: self.service_name.clone().apply(current.service_name.clone()),
            price: self.price.clone().apply(current.price),
            start_date: self.start_date.clone().apply(current.start_date),
            end_date: self.end_date.apply(current.end_date),
        }
    }
}

/// 一覧取得時の絞り込み条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    pub user_id: Option<String>,
    pub service_name: Option<String>,
}

impl SubscriptionFilter {
    /// 空文字列の条件は指定なしとして扱う
    pub fn new(user_id: Option<String>, service_name: Option<String>) -> Self {
        Self {
            user_id: user_id.filter(|v| !v.trim().is_empty()),
            service_name: service_name.filter(|v| !v.trim().is_empty()),
        }
    }
}

/// ページング指定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: i64,
    pub offset: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: 10,
            offset: 0,
        }
    }
}

/// 一覧取得結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionPage {
    pub subscriptions: Vec<Subscription>,
    pub total: i64,
}

/// 期間集計リクエスト（呼び出し元の未検証入力）
#[derive(Debug, Clone, Default)]
pub struct SummaryRequest {
    pub start_date: String,
    /// 未指定の場合は開始月と同じ
    pub end_date: Option<String>,
    pub user_id: Option<String>,
    pub service_name: Option<String>,
}

/// 検証済みの期間集計条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryQuery {
    pub start: MonthYear,
    pub end: MonthYear,
    pub filter: SubscriptionFilter,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Subscription {
        Subscription {
            id: SubscriptionId::from(3),
            user_id: "60601fee-2bf1-4721-ae6f-7636e79a0cba".to_string(),
            service_name: "Yandex Plus".to_string(),
            price: 400,
            start_date: MonthYear::parse("07-2025").unwrap(),
            end_date: Some(MonthYear::parse("12-2025").unwrap()),
        }
    }

    #[test]
    fn test_subscription_id_parse() {
        assert_eq!(SubscriptionId::parse("42").unwrap().value(), 42);
        assert_eq!(SubscriptionId::parse(" 7 ").unwrap().value(), 7);

        for raw in ["", "   ", "abc", "0", "-1", "1.5"] {
            assert!(
                matches!(SubscriptionId::parse(raw), Err(AppError::Validation(_))),
                "{raw:?} はバリデーションエラーになるべき"
            );
        }
    }

    #[test]
    fn test_subscription_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["subscription_id"], 3);
        assert_eq!(json["start_date"], "07-2025");
        assert_eq!(json["end_date"], "12-2025");
        assert_eq!(json["price"], 400);
    }

    #[test]
    fn test_open_ended_subscription_serializes_null_end_date() {
        let mut subscription = sample();
        subscription.end_date = None;
        let json = serde_json::to_value(subscription).unwrap();
        assert!(json["end_date"].is_null());
    }

    #[test]
    fn test_update_dto_distinguishes_missing_and_empty_end_date() {
        let missing: UpdateSubscriptionDto = serde_json::from_str(r#"{"price": 100}"#).unwrap();
        assert!(missing.end_date.is_none());

        let empty: UpdateSubscriptionDto = serde_json::from_str(r#"{"end_date": ""}"#).unwrap();
        assert_eq!(empty.end_date.as_deref(), Some(""));

        let none: UpdateSubscriptionDto = serde_json::from_str("{}").unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_changes_apply_to_keeps_unchanged_fields() {
        let current = sample();
        let changes = SubscriptionChanges {
            price: FieldUpdate::SetTo(599),
            end_date: EndDateUpdate::Cleared,
            ..Default::default()
        };

        let updated = changes.apply_to(&current);
        assert_eq!(updated.id, current.id);
        assert_eq!(updated.price, 599);
        assert_eq!(updated.service_name, current.service_name);
        assert_eq!(updated.start_date, current.start_date);
        assert!(updated.end_date.is_none());
        assert!(!changes.is_empty());
        assert!(SubscriptionChanges::default().is_empty());
    }

    #[test]
    fn test_filter_ignores_blank_values() {
        let filter = SubscriptionFilter::new(Some(String::new()), Some("Netflix".to_string()));
        assert!(filter.user_id.is_none());
        assert_eq!(filter.service_name.as_deref(), Some("Netflix"));
        assert_eq!(
            SubscriptionFilter::new(None, Some("  ".to_string())),
            SubscriptionFilter::default()
        );
    }
}
