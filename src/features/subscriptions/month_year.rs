use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// MM-YYYY形式（2桁の月と4桁の年）
static MONTH_YEAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2})-(\d{4})$").expect("MM-YYYYパターンのコンパイルに失敗"));

/// MM-YYYY形式で表せる年の範囲
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 0..=9999;

/// データベース保存形式（月初日のISO日付）
const STORAGE_FORMAT: &str = "%Y-%m-%d";

/// 月-年形式の日付解析エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateFormatError {
    /// 空文字列
    #[error("日付が入力されていません")]
    Empty,

    /// MM-YYYY形式ではない
    #[error("日付はMM-YYYY形式で入力してください: {0}")]
    Malformed(String),

    /// 月が1〜12の範囲外
    #[error("月は1から12の間で入力してください: {0}")]
    MonthOutOfRange(u32),

    /// 年が4桁で表せない
    #[error("年は0から9999の間で入力してください: {0}")]
    YearOutOfRange(i32),

    /// データベースに保存された値が解析できない
    #[error("保存された日付の形式が不正です: {0}")]
    InvalidStorage(String),
}

/// 日を持たない月単位の日付
///
/// 内部的には月初日の `NaiveDate` として保持するため、
/// 比較順序はそのまま暦順になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthYear(NaiveDate);

impl MonthYear {
    /// 月と年から作成する
    ///
    /// # 引数
    /// * `month` - 月（1〜12）
    /// * `year` - 年
    ///
    /// # 戻り値
    /// 月-年の値、または月・年が範囲外の場合はエラー
    pub fn new(month: u32, year: i32) -> Result<Self, DateFormatError> {
        if !YEAR_RANGE.contains(&year) {
            return Err(DateFormatError::YearOutOfRange(year));
        }

        NaiveDate::from_ymd_opt(year, month, 1)
            .map(Self)
            .ok_or(DateFormatError::MonthOutOfRange(month))
    }

    /// "MM-YYYY"形式の文字列を解析する
    ///
    /// # 引数
    /// * `text` - 解析対象の文字列（例: "07-2025"）
    ///
    /// # 戻り値
    /// 月-年の値、または形式不正時はエラー
    pub fn parse(text: &str) -> Result<Self, DateFormatError> {
        if text.is_empty() {
            return Err(DateFormatError::Empty);
        }

        let captures = MONTH_YEAR_PATTERN
            .captures(text)
            .ok_or_else(|| DateFormatError::Malformed(text.to_string()))?;

        // 正規表現で桁数を保証しているため数値変換は失敗しない
        let month: u32 = captures[1]
            .parse()
            .map_err(|_| DateFormatError::Malformed(text.to_string()))?;
        let year: i32 = captures[2]
            .parse()
            .map_err(|_| DateFormatError::Malformed(text.to_string()))?;

        if !(1..=12).contains(&month) {
            return Err(DateFormatError::MonthOutOfRange(month));
        }

        Self::new(month, year)
    }

    /// 任意の日付から月-年部分だけを取り出す
    pub fn from_date(date: NaiveDate) -> Result<Self, DateFormatError> {
        Self::new(date.month(), date.year())
    }

    /// "MM-YYYY"形式の文字列に変換する
    pub fn format(&self) -> String {
        format!("{:02}-{:04}", self.month(), self.year())
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    fn to_storage(self) -> String {
        self.0.format(STORAGE_FORMAT).to_string()
    }

    fn from_storage(text: &str) -> Result<Self, DateFormatError> {
        NaiveDate::parse_from_str(text, STORAGE_FORMAT)
            .ok()
            .and_then(|date| Self::from_date(date).ok())
            .ok_or_else(|| DateFormatError::InvalidStorage(text.to_string()))
    }
}

impl fmt::Display for MonthYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl FromStr for MonthYear {
    type Err = DateFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MonthYear {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.format())
    }
}

impl<'de> Deserialize<'de> for MonthYear {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(de::Error::custom)
    }
}

impl ToSql for MonthYear {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_storage()))
    }
}

impl From<MonthYear> for Value {
    fn from(date: MonthYear) -> Self {
        Value::Text(date.to_storage())
    }
}

impl FromSql for MonthYear {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Self::from_storage(text).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
