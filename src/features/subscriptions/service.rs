use super::events::{SubscriptionEvent, SubscriptionEventSink};
use super::models::{
    CreateSubscriptionDto, EndDateUpdate, FieldUpdate, NewSubscription, PageRequest,
    Subscription, SubscriptionChanges, SubscriptionFilter, SubscriptionId, SubscriptionPage,
    SummaryQuery, SummaryRequest, UpdateSubscriptionDto,
};
use super::month_year::MonthYear;
use super::repository::SubscriptionStore;
use crate::shared::errors::{AppError, AppResult};
use std::sync::Arc;

const OP_CREATE: &str = "service.subscription.create";
const OP_GET: &str = "service.subscription.get";
const OP_LIST: &str = "service.subscription.list";
const OP_UPDATE: &str = "service.subscription.update";
const OP_DELETE: &str = "service.subscription.delete";
const OP_SUMMARY: &str = "service.subscription.summary";

/// サブスクリプションのユースケースを提供するサービス
///
/// 入力を検証してからストアを呼び出し、結果をドメインイベントとして通知する。
/// 更新・削除では事前に存在確認を行うが、確認と書き込みの間はトランザクションで保護されない。
/// その間に別リクエストが削除した場合は、書き込み側が `NotFound` を返す。
#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    events: Arc<dyn SubscriptionEventSink>,
}

impl SubscriptionService {
    /// 新しいサービスを作成する
    ///
    /// # 引数
    /// * `store` - 永続化ポート
    /// * `events` - ドメインイベントの受け取り先
    pub fn new(store: Arc<dyn SubscriptionStore>, events: Arc<dyn SubscriptionEventSink>) -> Self {
        Self { store, events }
    }

    /// サブスクリプションを作成する
    ///
    /// # 引数
    /// * `dto` - サブスクリプション作成用DTO
    ///
    /// # 戻り値
    /// 作成されたサブスクリプション、または失敗時はエラー
    pub fn create(&self, dto: CreateSubscriptionDto) -> AppResult<Subscription> {
        let result = validate_create_subscription_dto(dto)
            .and_then(|new_subscription| self.store.insert(&new_subscription));

        let subscription = self.observe(OP_CREATE, result)?;
        self.events.record(&SubscriptionEvent::Created {
            id: subscription.id,
            user_id: subscription.user_id.clone(),
            service_name: subscription.service_name.clone(),
        });

        Ok(subscription)
    }

    /// IDでサブスクリプションを取得する
    pub fn get(&self, id: &str) -> AppResult<Subscription> {
        let result =
            SubscriptionId::parse(id).and_then(|id| self.store.find_by_id(id));

        let subscription = self.observe(OP_GET, result)?;
        self.events
            .record(&SubscriptionEvent::Retrieved { id: subscription.id });

        Ok(subscription)
    }

    /// サブスクリプション一覧を取得する
    ///
    /// # 引数
    /// * `filter` - 絞り込み条件
    /// * `page` - ページング指定（limit・offsetとも0以上）
    ///
    /// # 戻り値
    /// 指定ページのサブスクリプションと、条件に一致する総件数
    pub fn list(&self, filter: SubscriptionFilter, page: PageRequest) -> AppResult<SubscriptionPage> {
        let result = validate_page(page).and_then(|page| self.store.list_filtered(&filter, page));

        let page = self.observe(OP_LIST, result)?;
        self.events.record(&SubscriptionEvent::Listed {
            count: page.subscriptions.len(),
            total: page.total,
        });

        Ok(page)
    }

    /// サブスクリプションを部分更新する
    ///
    /// # 引数
    /// * `id` - サブスクリプションID
    /// * `dto` - 更新用DTO（1つ以上のフィールドが必要）
    ///
    /// # 戻り値
    /// 更新後のサブスクリプション、または失敗時はエラー
    pub fn update(&self, id: &str, dto: UpdateSubscriptionDto) -> AppResult<Subscription> {
        let result = self.update_inner(id, dto);

        let subscription = self.observe(OP_UPDATE, result)?;
        self.events
            .record(&SubscriptionEvent::Updated { id: subscription.id });

        Ok(subscription)
    }

    fn update_inner(&self, id: &str, dto: UpdateSubscriptionDto) -> AppResult<Subscription> {
        let id = SubscriptionId::parse(id)?;
        let changes = validate_update_subscription_dto(dto)?;

        // 存在確認（書き込みとは別操作）
        let existing = self.store.find_by_id(id)?;

        let merged = changes.apply_to(&existing);
        validate_period(merged.start_date, merged.end_date)?;

        self.store.update_partial(id, &changes)
    }

    /// サブスクリプションを削除する
    pub fn delete(&self, id: &str) -> AppResult<()> {
        let result = self.delete_inner(id);

        let id = self.observe(OP_DELETE, result)?;
        self.events.record(&SubscriptionEvent::Deleted { id });

        Ok(())
    }

    fn delete_inner(&self, id: &str) -> AppResult<SubscriptionId> {
        let id = SubscriptionId::parse(id)?;

        // 存在確認（書き込みとは別操作）
        self.store.find_by_id(id)?;

        if self.store.delete_by_id(id)? == 0 {
            return Err(AppError::not_found(format!("ID {id} のサブスクリプション")));
        }

        Ok(id)
    }

    /// 期間内に有効なサブスクリプションの料金合計を計算する
    ///
    /// # 引数
    /// * `request` - 集計条件（終了月を省略した場合は開始月のみ）
    ///
    /// # 戻り値
    /// 料金合計（該当なしの場合は0）
    pub fn summary(&self, request: SummaryRequest) -> AppResult<i64> {
        let query = match validate_summary_request(request) {
            Ok(query) => query,
            Err(e) => return self.observe(OP_SUMMARY, Err(e)),
        };

        let total = self.observe(OP_SUMMARY, self.store.sum_price_in_range(&query))?;
        self.events.record(&SubscriptionEvent::Summarized {
            start: query.start,
            end: query.end,
            total,
        });

        Ok(total)
    }

    /// 失敗をイベントとして通知し、データベースエラーに操作名を付与する
    fn observe<T>(&self, operation: &'static str, result: AppResult<T>) -> AppResult<T> {
        result.map_err(|e| {
            let e = e.in_operation(operation);
            self.events
                .record(&SubscriptionEvent::from_error(operation, &e));
            e
        })
    }
}

/// サブスクリプション作成DTOのバリデーション
///
/// # 戻り値
/// 検証済みの新規サブスクリプション、または失敗時はバリデーションエラー
fn validate_create_subscription_dto(dto: CreateSubscriptionDto) -> AppResult<NewSubscription> {
    let service_name = validate_service_name(dto.service_name)?;
    let price = validate_price(dto.price)?;
    let user_id = validate_user_id(dto.user_id)?;

    if dto.start_date.trim().is_empty() {
        return Err(AppError::validation("開始月を入力してください"));
    }
    let start_date = MonthYear::parse(&dto.start_date)?;

    // 空文字列の終了月は未指定として扱う
    let end_date = match dto.end_date.as_deref() {
        None | Some("") => None,
        Some(text) => Some(MonthYear::parse(text)?),
    };

    validate_period(start_date, end_date)?;

    Ok(NewSubscription {
        user_id,
        service_name,
        price,
        start_date,
        end_date,
    })
}

/// サブスクリプション更新DTOのバリデーション
///
/// `end_date` は省略で変更なし、空文字列でクリア、それ以外は月として解析する。
fn validate_update_subscription_dto(dto: UpdateSubscriptionDto) -> AppResult<SubscriptionChanges> {
    if dto.is_empty() {
        return Err(AppError::validation(
            "更新するフィールドを1つ以上指定してください",
        ));
    }

    let end_date = match dto.end_date.as_deref() {
        None => EndDateUpdate::Unchanged,
        Some("") => EndDateUpdate::Cleared,
        Some(text) => EndDateUpdate::SetTo(MonthYear::parse(text)?),
    };

    Ok(SubscriptionChanges {
        service_name: dto.service_name.map(validate_service_name).transpose()?.into(),
        price: dto.price.map(validate_price).transpose()?.into(),
        user_id: dto.user_id.map(validate_user_id).transpose()?.into(),
        start_date: FieldUpdate::from(
            dto.start_date
                .as_deref()
                .map(MonthYear::parse)
                .transpose()?,
        ),
        end_date,
    })
}

/// 期間集計リクエストのバリデーション
fn validate_summary_request(request: SummaryRequest) -> AppResult<SummaryQuery> {
    if request.start_date.trim().is_empty() {
        return Err(AppError::validation("開始月を入力してください"));
    }
    let start = MonthYear::parse(&request.start_date)?;

    let end = match request.end_date.as_deref() {
        None | Some("") => start,
        Some(text) => MonthYear::parse(text)?,
    };

    if end < start {
        return Err(AppError::validation(
            "終了月は開始月以降である必要があります",
        ));
    }

    Ok(SummaryQuery {
        start,
        end,
        filter: SubscriptionFilter::new(request.user_id, request.service_name),
    })
}

fn validate_page(page: PageRequest) -> AppResult<PageRequest> {
    if page.limit < 0 {
        return Err(AppError::validation("limitは0以上である必要があります"));
    }
    if page.offset < 0 {
        return Err(AppError::validation("offsetは0以上である必要があります"));
    }

    Ok(page)
}

fn validate_service_name(service_name: String) -> AppResult<String> {
    if service_name.trim().is_empty() {
        return Err(AppError::validation("サービス名を入力してください"));
    }

    Ok(service_name)
}

fn validate_price(price: i64) -> AppResult<i64> {
    if price < 0 {
        return Err(AppError::validation("料金は0以上である必要があります"));
    }

    Ok(price)
}

fn validate_user_id(user_id: String) -> AppResult<String> {
    if user_id.trim().is_empty() {
        return Err(AppError::validation("ユーザーIDを入力してください"));
    }

    Ok(user_id)
}

fn validate_period(start: MonthYear, end: Option<MonthYear>) -> AppResult<()> {
    match end {
        Some(end) if end < start => Err(AppError::validation(format!(
            "終了月（{end}）は開始月（{start}）以降である必要があります"
        ))),
        _ => Ok(()),
    }
}
