use crate::shared::errors::{AppError, ErrorSeverity};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;

/// ルーターが返すレスポンス型
pub type HttpResponse = Response<Full<Bytes>>;

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// JSONレスポンスを作成する
///
/// シリアライズに失敗した場合は500を返す。
pub fn json<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => with_status(status, Full::new(Bytes::from(bytes)), true),
        Err(e) => {
            log::error!("レスポンスのシリアライズに失敗: {e}");
            with_status(
                StatusCode::INTERNAL_SERVER_ERROR,
                Full::new(Bytes::from_static(br#"{"error":"internal error"}"#)),
                true,
            )
        }
    }
}

/// ボディなしのレスポンスを作成する
pub fn empty(status: StatusCode) -> HttpResponse {
    with_status(status, Full::new(Bytes::new()), false)
}

/// エラーをJSONレスポンスに変換する
///
/// 重要度に応じたレベルでログを出力し、利用者向けメッセージのみを返す。
pub fn error_response(error: &AppError) -> HttpResponse {
    match error.severity() {
        ErrorSeverity::High => log::error!("リクエスト処理エラー: {}", error.details()),
        ErrorSeverity::Medium => log::warn!("リクエスト処理エラー: {}", error.details()),
        ErrorSeverity::Low => log::debug!("リクエストを拒否しました: {}", error.details()),
    }

    json(
        error.status_code(),
        &ErrorBody {
            error: error.user_message(),
        },
    )
}

/// 任意のステータスとメッセージでエラーレスポンスを作成する（ルーティング失敗など）
pub fn error_message(status: StatusCode, message: &str) -> HttpResponse {
    json(status, &ErrorBody { error: message })
}

fn with_status(status: StatusCode, body: Full<Bytes>, is_json: bool) -> HttpResponse {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    if is_json {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: HttpResponse) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_response_hides_database_details() {
        let response = error_response(&AppError::Database(
            "service.subscription.get: no such table: subscriptions".to_string(),
        ));

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "データベース操作でエラーが発生しました");
    }

    #[tokio::test]
    async fn test_error_response_uses_status_by_kind() {
        let response = error_response(&AppError::not_found("ID 3 のサブスクリプション"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let body = body_json(response).await;
        assert_eq!(body["error"], "ID 3 のサブスクリプションが見つかりません");
    }

    #[test]
    fn test_empty_response_has_no_content_type() {
        let response = empty(StatusCode::NO_CONTENT);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(CONTENT_TYPE).is_none());
    }
}
