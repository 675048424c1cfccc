//cargo run --package zoning --bin zoning_mcp_server
use rmcp::{ServerHandler, ServiceExt, service::QuitReason, transport::stdio};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use zoning::{ZoneCommand, mcp::ZoneMcpServer};

/// Filter used when neither `ZONING_LOG` nor `RUST_LOG` is set.
const DEFAULT_FILTER: &str = "zoning=info,zoning_mcp_server=info,rmcp=warn";

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    init_logging();

    // No OCR providers are registered here, so wand selections carry empty text.
    let server = ZoneMcpServer::new();
    announce(&server);

    let service = server.serve(stdio()).await.inspect_err(|e| {
        error!("Zoning MCP server failed to start: {:?}", e);
    })?;
    info!("Listening for MCP requests on stdio");

    let reason = tokio::select! {
        result = service.waiting() => Some(result?),
        _ = tokio::signal::ctrl_c() => None,
    };
    match reason {
        Some(QuitReason::Closed) => info!("Client closed the connection"),
        Some(QuitReason::Cancelled) => warn!("Server task was cancelled"),
        None => info!("Received Ctrl+C, stopping"),
    }

    Ok(())
}

/// Logs go to stderr: stdout carries the MCP protocol.
fn init_logging() {
    let filter = EnvFilter::try_from_env("ZONING_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn announce(server: &ZoneMcpServer) {
    let info = server.get_info();
    info!(
        "Map zoning MCP server v{} (protocol {:?})",
        env!("CARGO_PKG_VERSION"),
        info.protocol_version
    );
    info!("Manager commands: {}", ZoneCommand::command_names().join(", "));
}
