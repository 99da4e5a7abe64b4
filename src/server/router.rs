use super::response::{empty, error_message, error_response, json, HttpResponse};
use crate::features::subscriptions::{
    CreateSubscriptionDto, PageRequest, SubscriptionFilter, SubscriptionService, SummaryRequest,
    UpdateSubscriptionDto,
};
use crate::shared::errors::{AppError, AppResult};
use http_body_util::{BodyExt, Limited};
use hyper::body::Body;
use hyper::{Method, Request, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use uuid::Uuid;

/// サブスクリプションAPIのパス
const SUBSCRIPTIONS_PATH: &str = "/api/v1/subscriptions";

/// リクエストボディの上限サイズ
const MAX_BODY_BYTES: usize = 64 * 1024;

/// 一覧取得時のlimitのデフォルト値
const DEFAULT_LIMIT: i64 = 10;

/// ルーティング結果
#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    Health,
    Collection,
    Summary,
    Item(&'a str),
    Unknown,
}

/// パスをルートに対応付ける（末尾のスラッシュは無視）
fn resolve(path: &str) -> Route<'_> {
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    if path == "/health" {
        return Route::Health;
    }

    match path.strip_prefix(SUBSCRIPTIONS_PATH) {
        Some("") => Route::Collection,
        Some("/summary") => Route::Summary,
        Some(rest) => match rest.strip_prefix('/') {
            Some(id) if !id.is_empty() && !id.contains('/') => Route::Item(id),
            _ => Route::Unknown,
        },
        None => Route::Unknown,
    }
}

/// HTTPリクエストを処理する
///
/// サービス呼び出しはブロッキングタスクとして実行する。
pub async fn handle_request<B>(
    req: Request<B>,
    service: SubscriptionService,
) -> Result<HttpResponse, Infallible>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    log::debug!("リクエストを受信: {} {}", req.method(), req.uri());

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = parse_query(req.uri().query());

    let result = match (&method, resolve(&path)) {
        (&Method::GET, Route::Health) => Ok(health()),
        (&Method::GET, Route::Collection) => list_subscriptions(&service, &query).await,
        (&Method::POST, Route::Collection) => create_subscription(&service, req).await,
        (&Method::GET, Route::Summary) => summarize_subscriptions(&service, &query).await,
        (&Method::GET, Route::Item(id)) => get_subscription(&service, id).await,
        (&Method::PUT, Route::Item(id)) => update_subscription(&service, id, req).await,
        (&Method::DELETE, Route::Item(id)) => delete_subscription(&service, id).await,
        (_, Route::Unknown) => {
            log::debug!("未対応のパス: {method} {path}");
            Ok(error_message(StatusCode::NOT_FOUND, "指定されたパスは存在しません"))
        }
        _ => Ok(error_message(
            StatusCode::METHOD_NOT_ALLOWED,
            "許可されていないメソッドです",
        )),
    };

    Ok(result.unwrap_or_else(|e| error_response(&e)))
}

fn health() -> HttpResponse {
    #[derive(Serialize)]
    struct Health {
        status: &'static str,
        timestamp: String,
    }

    json(
        StatusCode::OK,
        &Health {
            status: "ok",
            timestamp: chrono::Utc::now().to_rfc3339(),
        },
    )
}

async fn list_subscriptions(
    service: &SubscriptionService,
    query: &HashMap<String, String>,
) -> AppResult<HttpResponse> {
    // 一覧の user_id は等価条件としてのみ使うため形式は問わない
    let filter = SubscriptionFilter::new(
        query.get("user_id").cloned(),
        query.get("service_name").cloned(),
    );

    let limit = match non_blank(query, "limit") {
        Some(text) => parse_integer("limit", text)?,
        None => DEFAULT_LIMIT,
    };
    if limit <= 0 {
        return Err(AppError::validation("limitは1以上である必要があります"));
    }
    let offset = match non_blank(query, "offset") {
        Some(text) => parse_integer("offset", text)?,
        None => 0,
    };

    let service = service.clone();
    let page = run_blocking(move || service.list(filter, PageRequest { limit, offset })).await?;

    Ok(json(StatusCode::OK, &page))
}

async fn create_subscription<B>(service: &SubscriptionService, req: Request<B>) -> AppResult<HttpResponse>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let dto: CreateSubscriptionDto = read_json(req).await?;
    if !dto.user_id.trim().is_empty() {
        validate_uuid(&dto.user_id)?;
    }

    let service = service.clone();
    let created = run_blocking(move || service.create(dto)).await?;

    Ok(json(StatusCode::CREATED, &created))
}

async fn get_subscription(service: &SubscriptionService, id: &str) -> AppResult<HttpResponse> {
    let service = service.clone();
    let id = id.to_string();
    let subscription = run_blocking(move || service.get(&id)).await?;

    Ok(json(StatusCode::OK, &subscription))
}

async fn update_subscription<B>(
    service: &SubscriptionService,
    id: &str,
    req: Request<B>,
) -> AppResult<HttpResponse>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let dto: UpdateSubscriptionDto = read_json(req).await?;
    if let Some(user_id) = dto.user_id.as_deref().filter(|v| !v.trim().is_empty()) {
        validate_uuid(user_id)?;
    }

    let service = service.clone();
    let id = id.to_string();
    let updated = run_blocking(move || service.update(&id, dto)).await?;

    Ok(json(StatusCode::OK, &updated))
}

async fn delete_subscription(service: &SubscriptionService, id: &str) -> AppResult<HttpResponse> {
    let service = service.clone();
    let id = id.to_string();
    run_blocking(move || service.delete(&id)).await?;

    Ok(empty(StatusCode::NO_CONTENT))
}

#[derive(Serialize)]
struct SummaryPeriod {
    start_date: String,
    end_date: String,
}

#[derive(Serialize)]
struct SummaryFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_name: Option<String>,
}

#[derive(Serialize)]
struct SummaryResponse {
    total_cost: i64,
    period: SummaryPeriod,
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<SummaryFilters>,
}

async fn summarize_subscriptions(
    service: &SubscriptionService,
    query: &HashMap<String, String>,
) -> AppResult<HttpResponse> {
    let start_date = non_blank(query, "start_date")
        .ok_or_else(|| AppError::validation("start_dateを指定してください"))?
        .to_string();
    let end_date = non_blank(query, "end_date").map(str::to_string);
    let user_id = optional_uuid(query, "user_id")?;
    let service_name = non_blank(query, "service_name").map(str::to_string);

    let request = SummaryRequest {
        start_date: start_date.clone(),
        end_date: end_date.clone(),
        user_id: user_id.clone(),
        service_name: service_name.clone(),
    };
    let service = service.clone();
    let total_cost = run_blocking(move || service.summary(request)).await?;

    let filters = (user_id.is_some() || service_name.is_some()).then_some(SummaryFilters {
        user_id,
        service_name,
    });

    Ok(json(
        StatusCode::OK,
        &SummaryResponse {
            total_cost,
            period: SummaryPeriod {
                end_date: end_date.unwrap_or_else(|| start_date.clone()),
                start_date,
            },
            filters,
        },
    ))
}

/// サービス呼び出しをブロッキングスレッドで実行する
async fn run_blocking<T, F>(operation: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(operation)
        .await
        .map_err(|e| AppError::Internal(format!("ブロッキングタスクの実行に失敗: {e}")))?
}

/// リクエストボディをJSONとして読み込む
async fn read_json<T, B>(req: Request<B>) -> AppResult<T>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| AppError::validation(format!("リクエストボディの読み込みに失敗: {e}")))?
        .to_bytes();

    Ok(serde_json::from_slice(&bytes)?)
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn non_blank<'a>(query: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    query
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn parse_integer(name: &str, text: &str) -> AppResult<i64> {
    text.parse()
        .map_err(|_| AppError::validation(format!("{name}は整数である必要があります: {text}")))
}

fn optional_uuid(query: &HashMap<String, String>, key: &str) -> AppResult<Option<String>> {
    match non_blank(query, key) {
        Some(value) => {
            validate_uuid(value)?;
            Ok(Some(value.to_string()))
        }
        None => Ok(None),
    }
}

fn validate_uuid(value: &str) -> AppResult<()> {
    Uuid::parse_str(value.trim())
        .map(|_| ())
        .map_err(|_| AppError::validation(format!("user_idはUUID形式である必要があります: {value}")))
}
