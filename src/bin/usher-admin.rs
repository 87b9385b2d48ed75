#!/usr/bin/env cargo
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashSet;
use std::net::SocketAddr;

use usher::api::paths;

#[derive(Parser)]
#[command(name = "usher-admin")]
#[command(about = "Usher semaphore fleet administration tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check health of semaphore peers
    Health {
        /// Peers to check (e.g., "127.0.0.1:8460,127.0.0.2:8460")
        #[arg(long)]
        nodes: String,
    },
    /// Show semaphore state across peers
    Status {
        /// Peers to query (e.g., "127.0.0.1:8460,127.0.0.2:8460")
        #[arg(long)]
        nodes: String,
        /// Restrict to one semaphore id
        #[arg(long)]
        semaphore: Option<String>,
    },
    /// Start seeking a slot on one peer
    Acquire {
        /// Peer HTTP address (e.g., "127.0.0.1:8460")
        #[arg(long)]
        node: String,
        /// Semaphore id
        #[arg(long)]
        semaphore: String,
        /// Resource count when creating the semaphore
        #[arg(long)]
        resources: Option<u32>,
    },
    /// Release a slot on one peer
    Release {
        /// Peer HTTP address
        #[arg(long)]
        node: String,
        /// Semaphore id
        #[arg(long)]
        semaphore: String,
    },
    /// Change the resource count of a semaphore on one peer
    Resize {
        /// Peer HTTP address
        #[arg(long)]
        node: String,
        /// Semaphore id
        #[arg(long)]
        semaphore: String,
        /// New resource count
        #[arg(long)]
        resources: u32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Health { nodes } => {
            check_fleet_health(&nodes).await?;
        }
        Commands::Status { nodes, semaphore } => {
            show_status(&nodes, semaphore.as_deref()).await?;
        }
        Commands::Acquire {
            node,
            semaphore,
            resources,
        } => {
            acquire(&node, &semaphore, resources).await?;
        }
        Commands::Release { node, semaphore } => {
            release(&node, &semaphore).await?;
        }
        Commands::Resize {
            node,
            semaphore,
            resources,
        } => {
            resize(&node, &semaphore, resources).await?;
        }
    }

    Ok(())
}

async fn check_fleet_health(nodes: &str) -> Result<(), Box<dyn std::error::Error>> {
    let node_addrs = parse_topology(nodes)?;
    let client = Client::new();

    println!("🏥 Checking fleet health...");

    for node in &node_addrs {
        let health_url = format!("http://{}{}", node, paths::base::HEALTH);
        match client.get(&health_url).send().await {
            Ok(response) if response.status().is_success() => {
                println!("✅ Peer {} is healthy", node);
            }
            Ok(response) => {
                println!("❌ Peer {}: HTTP {}", node, response.status());
            }
            Err(e) => {
                println!("❌ Peer {}: unreachable ({})", node, e);
            }
        }
    }

    Ok(())
}

async fn show_status(nodes: &str, semaphore: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let node_addrs = parse_topology(nodes)?;
    let client = Client::new();

    println!("🔍 Querying semaphore state...");

    let mut holders = 0usize;
    let mut resources = 0u64;

    for node in &node_addrs {
        let url = match semaphore {
            Some(id) => format!("http://{}{}", node, paths::status_path(id)),
            None => format!("http://{}{}", node, paths::semaphores::LIST),
        };
        match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let body: Value = response.json().await?;
                let statuses: Vec<&Value> = match &body {
                    Value::Array(items) => items.iter().collect(),
                    single => vec![single],
                };
                if statuses.is_empty() {
                    println!("   Peer {}: no hosted semaphores", node);
                }
                for status in statuses {
                    print_status(node, status);
                    if status.get("is_acquired").and_then(Value::as_bool) == Some(true) {
                        holders += 1;
                    }
                    if let Some(r) = status.get("resources").and_then(Value::as_u64) {
                        resources = resources.max(r);
                    }
                }
            }
            Ok(response) => {
                println!("⚠️  Peer {}: HTTP {}", node, response.status());
            }
            Err(e) => {
                println!("❌ Peer {}: unreachable ({})", node, e);
            }
        }
    }

    if let Some(id) = semaphore {
        println!(
            "📊 '{}': {} of {} slots held across {} peers",
            id,
            holders,
            resources,
            node_addrs.len()
        );
        if holders as u64 > resources {
            println!("⚠️  More holders than slots; views have not converged yet");
        }
    }

    Ok(())
}

fn print_status(node: &SocketAddr, status: &Value) {
    let id = status
        .get("semaphore_id")
        .and_then(Value::as_str)
        .unwrap_or("?");
    let acquired = status
        .get("is_acquired")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let marker = if acquired { "🟢 holding" } else { "⚪ waiting" };
    println!(
        "   Peer {}: '{}' {} (peers: {}, consumed: {}/{})",
        node,
        id,
        marker,
        status.get("peers").and_then(Value::as_u64).unwrap_or(0),
        status.get("consumed").and_then(Value::as_u64).unwrap_or(0),
        status.get("resources").and_then(Value::as_u64).unwrap_or(0),
    );
}

async fn acquire(
    node: &str,
    semaphore: &str,
    resources: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::new();
    let mut url = format!("http://{}{}", node, paths::acquire_path(semaphore));
    if let Some(resources) = resources {
        url = format!("{}?resources={}", url, resources);
    }

    let response = client.post(&url).send().await?;
    if response.status().is_success() {
        let status: Value = response.json().await?;
        println!("🚀 Peer {} is now seeking '{}'", node, semaphore);
        if status.get("is_acquired").and_then(Value::as_bool) == Some(true) {
            println!("✅ Admitted immediately");
        } else {
            println!("⏳ Waiting for a slot");
        }
    } else {
        println!("❌ Acquire failed: HTTP {}", response.status());
    }

    Ok(())
}

async fn release(node: &str, semaphore: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::new();
    let url = format!("http://{}{}", node, paths::release_path(semaphore));

    let response = client.post(&url).send().await?;
    if response.status().is_success() {
        println!("✅ Peer {} released '{}'", node, semaphore);
    } else {
        println!("❌ Release failed: HTTP {}", response.status());
    }

    Ok(())
}

async fn resize(
    node: &str,
    semaphore: &str,
    resources: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::new();
    let url = format!("http://{}{}", node, paths::resources_path(semaphore));

    let response = client
        .put(&url)
        .json(&serde_json::json!({ "resources": resources }))
        .send()
        .await?;
    if response.status().is_success() {
        println!("✅ '{}' on {} resized to {} slots", semaphore, node, resources);
        println!("   Other peers keep their own resource counts; resize them too");
    } else {
        println!("❌ Resize failed: HTTP {}", response.status());
    }

    Ok(())
}

fn parse_topology(topology: &str) -> Result<HashSet<SocketAddr>, Box<dyn std::error::Error>> {
    topology
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<SocketAddr>()
                .map_err(|e| format!("Invalid address '{}': {}", s, e).into())
        })
        .collect()
}
