/// Static UI metadata: the plugin palette for the node editor and the
/// command-palette entries. Neither is consulted during execution.

use crate::api::AppState;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};

pub fn create_catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/available-plugins", get(available_plugins))
        .route("/commands", get(commands))
}

/// GET /available-plugins
async fn available_plugins() -> Json<Value> {
    Json(json!({
        "plugins": [
            {
                "name": "ai-agent",
                "displayName": "AI Agent",
                "icon": "🤖",
                "actions": [
                    {
                        "id": "ask",
                        "name": "Ask AI",
                        "endpoint": "/chat",
                        "method": "POST",
                        "parameters": { "messages": "array" }
                    }
                ]
            },
            {
                "name": "whatsapp",
                "displayName": "WhatsApp",
                "icon": "💬",
                "actions": [
                    {
                        "id": "send",
                        "name": "Send Message",
                        "endpoint": "/send",
                        "method": "POST",
                        "parameters": { "to": "string", "body": "string" }
                    },
                    {
                        "id": "get-messages",
                        "name": "Get Messages",
                        "endpoint": "/messages",
                        "method": "GET",
                        "parameters": {
                            "phone_number": "string (optional)",
                            "limit": "number (optional)"
                        }
                    }
                ]
            },
            {
                "name": "jira",
                "displayName": "Jira",
                "icon": "🏷️",
                "actions": [
                    {
                        "id": "get-issues",
                        "name": "Get Issues",
                        "endpoint": "/issues",
                        "method": "GET",
                        "parameters": {}
                    }
                ]
            }
        ]
    }))
}

/// GET /commands
async fn commands() -> Json<Value> {
    Json(json!({
        "commands": [
            {
                "id": "create-workflow",
                "label": "Workflow: Create New Workflow",
                "description": "Create a new workflow",
                "category": "Workflow",
                "icon": "⚙️",
                "action": "navigate",
                "target": "/workflow-engine"
            },
            {
                "id": "list-workflows",
                "label": "Workflow: List All Workflows",
                "description": "View all workflows",
                "category": "Workflow",
                "icon": "📋",
                "endpoint": "/workflows",
                "method": "GET"
            }
        ]
    }))
}
