//! 活动日志管道主入口
//! 组合根：显式构造并注入 ActivityLogService，不使用全局单例

use budgetbrain_activity::{
    config::AppConfig,
    db,
    repository::ActivityLogRepository,
    services::activity_log_service::{ActivityAction, ActivityLogService},
    telemetry,
};
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("--version") => {
            println!("budgetbrain-activity {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some("--help") => {
            print_help();
            return Ok(());
        }
        Some("--status") | Some("--flush") | None => {}
        Some(other) => {
            eprintln!("未知参数: {}", other);
            print_help();
            std::process::exit(1);
        }
    }

    // 加载 .env 文件（开发环境）
    // 生产环境应该直接设置环境变量，不依赖 .env 文件
    if let Ok(profile) = std::env::var("BB_ENV") {
        dotenv::from_filename(format!(".env.{}", profile)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::dotenv().ok();
    }

    // 1. 加载配置
    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // 2. 初始化日志与指标
    telemetry::init_telemetry(&config);
    telemetry::init_metrics();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "BudgetBrain activity pipeline starting..."
    );

    // 3. 数据库连接池 + 迁移
    let db_pool = db::create_pool(&config.database).await?;
    db::run_migrations(&db_pool).await?;

    if let db::HealthStatus::Unhealthy(reason) = db::health_check(&db_pool).await {
        tracing::warn!(reason = %reason, "Database health check failed at startup");
    }

    tracing::info!("Database initialized");

    // 4. 构建服务实例（组合根注入）
    let activity_service = ActivityLogService::new(
        ActivityLogRepository::new(db_pool.clone()),
        &config.activity_log,
    );

    // ===== 运维子命令 =====
    match command {
        Some("--status") => {
            let status = activity_service.get_buffer_status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            return Ok(());
        }
        Some("--flush") => {
            let drained = activity_service.force_flush().await;
            let status = activity_service.get_buffer_status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            if !drained {
                anyhow::bail!("Flush did not fully succeed, entries remain buffered");
            }
            return Ok(());
        }
        _ => {}
    }

    activity_service
        .log_system_action(ActivityAction::SystemStartup, Some("Activity pipeline started"))
        .await;
    db::record_pool_metrics(&db_pool);

    // 5. 等待停机信号
    shutdown_signal().await;

    // 6. 停机前排空缓冲
    activity_service
        .log_system_action(ActivityAction::SystemShutdown, Some("Activity pipeline stopping"))
        .await;

    if activity_service.force_flush().await {
        tracing::info!("Buffer drained, shutdown complete");
    } else {
        tracing::warn!("Buffer could not be fully drained, entries remain for next start");
    }

    Ok(())
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, starting graceful shutdown");
        },
    }
}

/// 打印帮助信息
fn print_help() {
    println!("budgetbrain-activity {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: budgetbrain-activity [选项]");
    println!();
    println!("选项:");
    println!("  --status      打印缓冲区状态并退出");
    println!("  --flush       强制刷写缓冲区后退出");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!();
    println!("环境变量:");
    println!("  所有配置通过环境变量完成（前缀 BB_）");
    println!("  可用选项请参考 .env.example");
}
