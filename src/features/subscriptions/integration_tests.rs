//! サブスクリプション機能統合テスト
//!
//! 実際のSQLiteデータベースとサービス層を組み合わせて、エンドツーエンドの動作を検証します。

#[cfg(test)]
mod integration_tests {
    use crate::features::subscriptions::events::{RecordingEventSink, SubscriptionEvent};
    use crate::features::subscriptions::models::{
        CreateSubscriptionDto, PageRequest, SubscriptionFilter, SummaryRequest,
        UpdateSubscriptionDto,
    };
    use crate::features::subscriptions::month_year::MonthYear;
    use crate::features::subscriptions::repository::SqliteSubscriptionStore;
    use crate::features::subscriptions::service::SubscriptionService;
    use crate::shared::database::{initialize_database, open_in_memory_database};
    use crate::shared::errors::ErrorKind;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    const USER_A: &str = "60601fee-2bf1-4721-ae6f-7636e79a0cba";
    const USER_B: &str = "9a4e1c7b-3f55-4a2e-8b6d-0c1d2e3f4a5b";

    /// テスト用のサービスをメモリデータベース上に作成
    fn create_test_service() -> (SubscriptionService, Arc<RecordingEventSink>) {
        let db = open_in_memory_database().expect("テスト用データベースの作成に失敗");
        let events = Arc::new(RecordingEventSink::default());
        let service = SubscriptionService::new(
            Arc::new(SqliteSubscriptionStore::new(db)),
            events.clone(),
        );
        (service, events)
    }

    fn dto(
        user_id: &str,
        service_name: &str,
        price: i64,
        start: &str,
        end: Option<&str>,
    ) -> CreateSubscriptionDto {
        CreateSubscriptionDto {
            service_name: service_name.to_string(),
            price,
            user_id: user_id.to_string(),
            start_date: start.to_string(),
            end_date: end.map(str::to_string),
        }
    }

    fn summary(start: &str, end: Option<&str>) -> SummaryRequest {
        SummaryRequest {
            start_date: start.to_string(),
            end_date: end.map(str::to_string),
            ..Default::default()
        }
    }

    /// 統合テスト: 作成から削除までの一連の流れ
    #[test]
    fn test_complete_subscription_lifecycle() {
        let (service, events) = create_test_service();

        // 1. 作成して取得
        let created = service
            .create(dto(USER_A, "Yandex Plus", 400, "07-2025", None))
            .expect("作成に失敗");
        let id = created.id.to_string();
        assert_eq!(service.get(&id).expect("取得に失敗"), created);

        // 2. 部分更新（価格のみ）
        let updated = service
            .update(
                &id,
                UpdateSubscriptionDto {
                    price: Some(450),
                    end_date: Some("12-2025".to_string()),
                    ..Default::default()
                },
            )
            .expect("更新に失敗");
        assert_eq!(updated.price, 450);
        assert_eq!(updated.service_name, "Yandex Plus");
        assert_eq!(updated.end_date, Some(MonthYear::new(12, 2025).unwrap()));

        // 3. 終了月を省略した更新では終了月が維持される
        let renamed = service
            .update(
                &id,
                UpdateSubscriptionDto {
                    service_name: Some("Yandex Plus Multi".to_string()),
                    ..Default::default()
                },
            )
            .expect("更新に失敗");
        assert_eq!(renamed.end_date, updated.end_date);

        // 4. 空文字列で終了月をクリア
        let cleared = service
            .update(
                &id,
                UpdateSubscriptionDto {
                    end_date: Some(String::new()),
                    ..Default::default()
                },
            )
            .expect("更新に失敗");
        assert!(cleared.end_date.is_none());
        assert_eq!(service.get(&id).unwrap(), cleared);

        // 5. 削除後は取得できない
        service.delete(&id).expect("削除に失敗");
        assert_eq!(service.get(&id).unwrap_err().kind(), ErrorKind::NotFound);

        let recorded = events.events();
        assert!(matches!(recorded[0], SubscriptionEvent::Created { .. }));
        assert!(recorded
            .iter()
            .any(|e| matches!(e, SubscriptionEvent::Deleted { .. })));
        assert!(matches!(
            recorded.last(),
            Some(SubscriptionEvent::Missing { .. })
        ));
    }

    #[test]
    fn test_list_total_is_independent_of_paging() {
        let (service, _) = create_test_service();
        for i in 0..7 {
            service
                .create(dto(USER_A, "Netflix", 100 + i, "01-2025", None))
                .unwrap();
        }
        service
            .create(dto(USER_B, "Netflix", 999, "01-2025", None))
            .unwrap();

        let filter = SubscriptionFilter::new(Some(USER_A.to_string()), None);
        for (limit, offset) in [(3, 0), (3, 6), (10, 0), (1, 100), (0, 0)] {
            let page = service
                .list(filter.clone(), PageRequest { limit, offset })
                .unwrap();
            assert!(page.subscriptions.len() as i64 <= limit);
            assert_eq!(page.total, 7);
            assert!(page.subscriptions.iter().all(|s| s.user_id == USER_A));
        }

        let everything = service
            .list(SubscriptionFilter::default(), PageRequest::default())
            .unwrap();
        assert_eq!(everything.total, 8);
        assert_eq!(everything.subscriptions.len(), 8);
    }

    #[test]
    fn test_summary_over_month_ranges() {
        let (service, _) = create_test_service();
        service
            .create(dto(USER_A, "Netflix", 500, "01-2025", None))
            .unwrap();

        assert_eq!(service.summary(summary("01-2025", Some("01-2025"))).unwrap(), 500);
        assert_eq!(service.summary(summary("01-2025", None)).unwrap(), 500);
        assert_eq!(service.summary(summary("12-2024", None)).unwrap(), 0);

        // 期間開始より前に終了したものは除外
        service
            .create(dto(USER_B, "Spotify", 300, "01-2024", Some("12-2024")))
            .unwrap();
        assert_eq!(
            service.summary(summary("01-2025", Some("06-2025"))).unwrap(),
            500
        );
        // 終了月と期間開始が同じ月なら含む
        assert_eq!(
            service.summary(summary("12-2024", Some("01-2025"))).unwrap(),
            800
        );

        let by_service = SummaryRequest {
            service_name: Some("Spotify".to_string()),
            ..summary("01-2024", Some("12-2025"))
        };
        assert_eq!(service.summary(by_service).unwrap(), 300);
    }

    #[test]
    fn test_data_survives_reopening_file_database() {
        let temp_dir = TempDir::new().expect("一時ディレクトリの作成に失敗");
        let database_path = temp_dir.path().join("subscriptions.db");

        let created = {
            let db = initialize_database(&database_path).unwrap();
            let service = SubscriptionService::new(
                Arc::new(SqliteSubscriptionStore::new(db)),
                Arc::new(RecordingEventSink::default()),
            );
            service
                .create(dto(USER_A, "Kinopoisk", 299, "03-2025", Some("09-2025")))
                .unwrap()
        };

        let db = initialize_database(&database_path).unwrap();
        let service = SubscriptionService::new(
            Arc::new(SqliteSubscriptionStore::new(db)),
            Arc::new(RecordingEventSink::default()),
        );
        assert_eq!(service.get(&created.id.to_string()).unwrap(), created);
    }

    /// 同一IDへの削除と更新を並行実行しても、消えたレコードへの更新が成功扱いで復活しないこと
    #[test]
    fn test_concurrent_delete_and_update() {
        for _ in 0..20 {
            let (service, _) = create_test_service();
            let created = service
                .create(dto(USER_A, "Netflix", 500, "01-2025", None))
                .unwrap();
            let id = created.id.to_string();

            let deleter = {
                let service = service.clone();
                let id = id.clone();
                thread::spawn(move || service.delete(&id))
            };
            let updater = {
                let service = service.clone();
                let id = id.clone();
                thread::spawn(move || {
                    service.update(
                        &id,
                        UpdateSubscriptionDto {
                            price: Some(600),
                            ..Default::default()
                        },
                    )
                })
            };

            let deleted = deleter.join().unwrap();
            let updated = updater.join().unwrap();

            assert!(deleted.is_ok());
            if let Err(e) = updated {
                assert_eq!(e.kind(), ErrorKind::NotFound);
            }
            assert_eq!(service.get(&id).unwrap_err().kind(), ErrorKind::NotFound);

            // 削除済みのIDへの更新は必ず NotFound
            let late = service.update(
                &id,
                UpdateSubscriptionDto {
                    price: Some(700),
                    ..Default::default()
                },
            );
            assert_eq!(late.unwrap_err().kind(), ErrorKind::NotFound);
        }
    }
}
