use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use crawler::{app::Application, shutdown::wait_for_shutdown_signal};
use crawler_core::{init_logging, AppConfig};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// 多平台社交媒体爬虫任务调度系统
#[derive(Debug, Parser)]
#[command(name = "crawler", version, about)]
struct Cli {
    /// 配置文件路径，未指定时依次尝试 config/crawler.toml 与 crawler.toml
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long, value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// 日志格式，覆盖配置文件
    #[arg(long, value_name = "FORMAT", value_parser = ["json", "pretty"])]
    log_format: Option<String>,

    /// 不启动HTTP API
    #[arg(long)]
    no_api: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("加载配置文件失败: {path}"),
        None => "加载配置失败".to_string(),
    })?;
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.observability.log_format = format;
    }
    if cli.no_api {
        config.api.enabled = false;
    }

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;

    info!("启动爬虫任务调度系统 v{}", env!("CARGO_PKG_VERSION"));

    // recorder 必须在创建指标句柄之前安装
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_bind_address
            .parse()
            .context("无效的指标绑定地址")?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("安装Prometheus导出器失败")?;
        info!("Prometheus指标监听于 {}", addr);
    }

    let app = Application::new(config).await?;
    let summary = app.run(wait_for_shutdown_signal()).await?;

    info!(
        in_flight = summary.in_flight,
        aborted = summary.aborted,
        abandoned = summary.abandoned,
        "爬虫任务调度系统已退出"
    );
    Ok(())
}
