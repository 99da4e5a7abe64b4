/// サブスクリプション機能モジュール
///
/// このモジュールは、サブスクリプション管理に関連するすべての機能を提供します：
/// - サブスクリプションの作成、読み取り、部分更新、削除
/// - 絞り込み・ページング付きの一覧取得
/// - 期間内の料金合計の計算
pub mod events;
pub mod integration_tests;
pub mod models;
pub mod month_year;
pub mod query_builder;
pub mod repository;
pub mod service;

// 公開インターフェース
pub use events::{LogEventSink, SubscriptionEvent, SubscriptionEventSink};

pub use models::{
    CreateSubscriptionDto, PageRequest, Subscription, SubscriptionFilter, SubscriptionId,
    SubscriptionPage, SummaryRequest, UpdateSubscriptionDto,
};

pub use month_year::{DateFormatError, MonthYear};

pub use repository::{SqliteSubscriptionStore, SubscriptionStore};

pub use service::SubscriptionService;
