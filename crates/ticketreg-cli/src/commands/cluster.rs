use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use ticketreg_cache::{ClusterClient, FailureMode};
use ticketreg_registry::CacheTicketRegistry;

use crate::cli::OutputFormat;
use crate::output::{print_field, print_json};

const PING_KEY: &str = "ticketreg:ping";

#[derive(Serialize)]
struct Placement<'a> {
    cache_key: String,
    nodes: Vec<&'a str>,
}

pub fn locate(
    registry: &CacheTicketRegistry,
    client: &ClusterClient,
    ticket_id: &str,
    format: OutputFormat,
) -> Result<()> {
    let cache_key = registry.cache_key(ticket_id);
    let mut nodes = client.locate(&cache_key);
    if client.failure_mode() != FailureMode::Redistribute {
        nodes.truncate(1);
    }
    let placement = Placement { cache_key, nodes };

    match format {
        OutputFormat::Json => print_json(&placement)?,
        OutputFormat::Text => {
            print_field("Cache key", &placement.cache_key);
            for (i, node) in placement.nodes.iter().enumerate() {
                let role = if i == 0 { "primary" } else { "fallback" };
                println!("  {} {node} ({role})", format!("{}.", i + 1).dimmed());
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct NodeStatus {
    address: String,
    reachable: bool,
    latency_ms: u128,
    error: Option<String>,
}

pub async fn ping(client: &ClusterClient, timeout: Duration, format: OutputFormat) -> Result<()> {
    let mut statuses = Vec::with_capacity(client.nodes().len());
    for node in client.nodes() {
        let started = std::time::Instant::now();
        let result = tokio::time::timeout(timeout, node.get(PING_KEY)).await;
        let error = match result {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("timed out after {timeout:?}")),
        };
        statuses.push(NodeStatus {
            address: node.address().to_string(),
            reachable: error.is_none(),
            latency_ms: started.elapsed().as_millis(),
            error,
        });
    }

    match format {
        OutputFormat::Json => print_json(&statuses)?,
        OutputFormat::Text => {
            for status in &statuses {
                match &status.error {
                    None => println!(
                        "{} {} ({}ms)",
                        "✓".green(),
                        status.address,
                        status.latency_ms
                    ),
                    Some(e) => println!("{} {}: {e}", "✗".red(), status.address),
                }
            }
        }
    }

    let down = statuses.iter().filter(|s| !s.reachable).count();
    if down > 0 {
        anyhow::bail!("{down} of {} cache nodes unreachable", statuses.len());
    }
    Ok(())
}
