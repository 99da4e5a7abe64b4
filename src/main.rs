#[tokio::main]
async fn main() {
    if let Err(e) = subscription_manager_lib::run().await {
        log::error!("アプリケーションが異常終了しました: {}", e.details());
        eprintln!("{e}");
        std::process::exit(1);
    }
}
