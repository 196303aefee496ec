//! 主应用程序入口
//!
//! 加载配置，组装基础设施与应用服务，启动 Axum Web API 服务。

use std::sync::Arc;

use anyhow::Context;
use config::AppConfig;
use infrastructure::{Infrastructure, InfrastructureConfig};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, StreamSettings};

fn init_tracing(config: &AppConfig) {
    // RUST_LOG 优先于配置文件中的过滤规则
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.filter));

    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "无法监听停止信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到停止信号，开始关闭服务");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("加载配置失败")?;
    init_tracing(&config);

    let infra = Infrastructure::build(InfrastructureConfig {
        push_timeout: config.push_timeout(),
    });
    let chat_service = Arc::new(infra.chat_service());

    let state = AppState::new(
        chat_service,
        StreamSettings {
            sink_capacity: config.stream.sink_capacity,
            keep_alive: config.keep_alive(),
        },
    );
    let streams_shutdown = state.shutdown_token();
    let app = router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法监听 {}", addr))?;
    tracing::info!("聊天室服务器启动在 http://{}", addr);

    let (stopping_tx, stopping_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                // 结束所有 JoinRoom 长连接，让优雅关闭能够完成
                streams_shutdown.cancel();
                let _ = stopping_tx.send(());
            })
            .await
    });

    // 连接在超时内仍未全部结束时强制退出
    tokio::select! {
        result = &mut server => {
            result.context("服务任务异常退出")??;
            return Ok(());
        }
        _ = stopping_rx => {}
    }

    match tokio::time::timeout(config.shutdown_timeout(), &mut server).await {
        Ok(result) => {
            result.context("服务任务异常退出")??;
            tracing::info!("服务已关闭");
            Ok(())
        }
        Err(_) => {
            server.abort();
            anyhow::bail!(
                "服务未能在 {} 秒内关闭",
                config.shutdown_timeout().as_secs()
            )
        }
    }
}
