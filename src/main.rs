use std::sync::Arc;
use three_way_match::{
    api, create_pool, db::ensure_schema, AppConfig, DocumentStore, MemoryDocumentStore,
    PgDocumentStore, VerificationService,
};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置: 默认值 → matcher.toml → 环境变量
    let config = AppConfig::load()?;
    let tolerances = config.tolerances()?;
    info!("Starting server with config: {:?}", config);

    // 有数据库地址时使用 PostgreSQL, 否则使用内存单据库
    let store: Arc<dyn DocumentStore> = match config.database_url() {
        Some(url) => {
            let pool = create_pool(url, config.store_timeout()).await?;
            ensure_schema(&pool).await?;
            info!("Database pool created");
            Arc::new(PgDocumentStore::new(pool))
        }
        None => {
            warn!("No database url configured, documents are kept in memory only");
            Arc::new(MemoryDocumentStore::new())
        }
    };

    let service = Arc::new(
        VerificationService::new(store, tolerances)
            .with_store_timeout(config.store_timeout())
            .with_batch_concurrency(config.store.batch_concurrency),
    );
    let app = api::router(service);

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/verify                          - three-way match");
    info!("  POST /api/verify/batch                    - batch three-way match");
    info!("  GET  /api/verification-results            - history, newest first");
    info!("  GET  /api/verification-results/export     - history as CSV");
    info!("  GET|POST /api/invoices, /api/purchase-orders, /api/goods-receipts");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
