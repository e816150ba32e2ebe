//! Flux Notify CLI
//!
//! 接收 Flux 事件并转发到配置的目标 (Slack, Mattermost, MS Teams, ...)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flux_notify::{server, AppState, DispatcherBuilder, EnvConfig, Event, Settings};
use std::io::Read;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "flux-notify")]
#[command(about = "Flux Notify - 把 Flux 事件转发到聊天和监控系统")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动 HTTP 服务
    Serve {
        /// 监听地址 (默认读取 LISTEN_ADDRESS)
        #[arg(long)]
        listen: Option<String>,
        /// Dry-run 模式（只打印不发送）
        #[arg(long)]
        dry_run: bool,
    },
    /// 渲染事件并输出每个目标的消息（不发送）
    Render {
        /// 事件 JSON 文件，省略时读取 stdin
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 控制日志级别，例如: RUST_LOG=debug flux-notify serve
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("flux_notify=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let config = EnvConfig::new();
    let settings = Settings::from_config(&config).context("invalid configuration")?;

    match cli.command {
        Commands::Serve { listen, dry_run } => {
            let dispatcher = DispatcherBuilder::new(&config)
                .dry_run(dry_run)
                .build_with(&settings)
                .context("invalid destination configuration")?;

            if dispatcher.destination_count() == 0 {
                warn!("No destinations configured, events will be dropped");
            }

            let address = listen.unwrap_or_else(|| settings.listen_address.clone());
            let listener = tokio::net::TcpListener::bind(&address)
                .await
                .with_context(|| format!("could not listen on {}", address))?;

            server::serve(listener, AppState::new(dispatcher), shutdown_signal()).await?;
            info!("Server stopped");
        }
        Commands::Render { file } => {
            let dispatcher = DispatcherBuilder::new(&config)
                .dry_run(true)
                .build_with(&settings)
                .context("invalid destination configuration")?;

            let body = match file {
                Some(path) => std::fs::read(&path)
                    .with_context(|| format!("could not read {}", path.display()))?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };

            let event = Event::from_slice(&body)?;
            let rendered = dispatcher.render(&event);
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
