/// hubflow server entry point
///
/// Reads configuration from the environment and serves:
/// - Workflow management at /workflows/*
/// - Execution history at /executions/* and the schedule at /scheduled
/// - Webhook triggers at /webhook/{node_id}
/// - Health check at /health

use hubflow::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::default();
    start_server(config).await
}
