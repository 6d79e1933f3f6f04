//! Webhook dispatcher
//!
//! A lookup that cannot be answered yet may leave a callback URL behind.
//! Once the identity cluster of the looked-up profile is complete, every
//! pending callback receives a JSON POST:
//!
//! ```json
//! {"url": "http://example.com/foo", "related": ["..."], "incomplete": true}
//! ```
//!
//! (`incomplete` is omitted unless set.) A callback answered with HTTP 200
//! is deleted. Any other outcome leaves it in place; the `fired` timestamp
//! then suppresses re-firing for `minutesToLock`, after which it is retried,
//! with no retry ceiling.

use crate::context::CrawlContext;
use crate::graph::{queries, GraphNode, NodePatch};
use crate::profile::Profile;
use crate::storage::StorageError;
use crate::url::validate_url;
use crate::Result;
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Body POSTed to a callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload<'a> {
    pub url: &'a str,
    pub related: &'a [String],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub incomplete: bool,
}

/// Outcome of one firing pass for a URL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FireReport {
    /// Callbacks claimed by this pass
    pub claimed: usize,
    /// Callbacks acknowledged with HTTP 200 and removed
    pub delivered: usize,
}

/// Stores a callback for `profile` and fires it if the cluster is already
/// complete
///
/// Registering the same callback twice is not an error.
pub async fn register(ctx: &CrawlContext, profile: &Profile, hook: &str) -> Result<()> {
    let hook = validate_url(hook)?;

    let inserted = ctx
        .storage()
        .insert_webhook(hook.as_str(), profile.url(), ctx.now());
    match inserted {
        Ok(()) => debug!("Registered webhook {} for {}", hook, profile.url()),
        Err(StorageError::Conflict(_)) => {
            debug!("Webhook {} already registered for {}", hook, profile.url())
        }
        Err(e) => return Err(e.into()),
    }

    ctx.graph().update_node(
        profile.node().id,
        NodePatch {
            has_webhooks: Some(true),
            ..Default::default()
        },
    )?;

    if profile.is_graph_complete(ctx)? {
        info!("Completed while registering, firing webhooks for {}", profile.url());
        fire(ctx, profile.node()).await?;
    }

    Ok(())
}

/// Fires every callback of `node` that is not inside its re-fire lock
///
/// Clears the node's webhook marker once no callback is left.
pub async fn fire(ctx: &CrawlContext, node: &GraphNode) -> Result<FireReport> {
    let now = ctx.now();
    let cutoff = now - ctx.config.timings.lock();

    let hooks = ctx.storage().claim_webhooks(&node.url, now, cutoff)?;
    let mut report = FireReport {
        claimed: hooks.len(),
        ..Default::default()
    };

    if !hooks.is_empty() {
        info!("Firing {} hook(s) for {}", hooks.len(), node.url);

        let related = {
            let graph = ctx.graph();
            queries::get_related(&*graph, node, ctx.max_hops())?
        };
        let payload = WebhookPayload {
            url: &node.url,
            related: &related.urls,
            incomplete: related.incomplete,
        };

        for hook in hooks {
            if deliver(ctx, &hook, &payload).await {
                ctx.storage().delete_webhook(&hook, &node.url)?;
                report.delivered += 1;
            }
        }
    }

    let remaining = ctx.storage().count_webhooks(&node.url)?;
    if remaining == 0 {
        ctx.graph().update_node(
            node.id,
            NodePatch {
                has_webhooks: Some(false),
                ..Default::default()
            },
        )?;
    }

    Ok(report)
}

async fn deliver(ctx: &CrawlContext, hook: &str, payload: &WebhookPayload<'_>) -> bool {
    match ctx.http_client.post(hook).json(payload).send().await {
        Ok(response) if response.status().as_u16() == 200 => {
            info!("Successfully fired hook {}", hook);
            true
        }
        Ok(response) => {
            warn!(
                "Failed to fire hook {}: got response code {}",
                hook,
                response.status().as_u16()
            );
            false
        }
        Err(e) => {
            warn!("Failed to fire hook {}: {}", hook, e);
            false
        }
    }
}

/// Fires the callbacks of `node` and of every node whose identity cluster
/// contains it, for each of those clusters that is now complete
pub async fn check_ready(ctx: &CrawlContext, node: &GraphNode) -> Result<()> {
    let ready = {
        let graph = ctx.graph();
        queries::webhook_ancestors(&*graph, node, ctx.max_hops())?
    };

    for ancestor in ready {
        if let Err(e) = fire(ctx, &ancestor).await {
            error!("Error while firing webhooks for {}: {}", ancestor.url, e);
        }
    }

    Ok(())
}

/// Re-fires callbacks whose last attempt is older than the re-fire lock
///
/// Only clusters that are complete are fired. Returns the number of URLs
/// fired.
pub async fn retry_due(ctx: &CrawlContext) -> Result<usize> {
    let cutoff = ctx.now() - ctx.config.timings.lock();
    let urls = ctx.storage().webhook_urls_due(cutoff)?;

    let mut fired = 0;
    for url in urls {
        let node = {
            let graph = ctx.graph();
            match graph.find_node_by_url(&url)? {
                Some(node) if queries::is_graph_complete(&*graph, &node, ctx.max_hops())? => {
                    Some(node)
                }
                _ => None,
            }
        };

        if let Some(node) = node {
            debug!("Retrying webhooks for {}", url);
            fire(ctx, &node).await?;
            fired += 1;
        }
    }

    Ok(fired)
}
