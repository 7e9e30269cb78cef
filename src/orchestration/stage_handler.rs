//! # Stage Handlers
//!
//! One handler per automated pipeline stage, resolved through a closed
//! lookup table. Handlers call external collaborators exclusively through
//! the retry executor and memoize expensive idempotent results in the stage
//! cache under `(fingerprint, produced stage)`, so a crash between
//! "external call succeeded" and "transition persisted" replays from cache
//! instead of re-invoking the service.

use crate::cache::{CacheKey, StageCache};
use crate::config::SchedulingConfig;
use crate::constants::dependencies;
use crate::error::{PipelineError, Result};
use crate::models::{ContentItem, PerformanceSnapshot};
use crate::resilience::{CancellationFlag, RetryExecutor, RetryPolicy};
use crate::services::{Collaborators, PublishRequest};
use crate::state_machine::states::Stage;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Shared execution context handed to every stage handler invocation
pub struct HandlerContext {
    pub cache: Arc<StageCache>,
    pub executor: Arc<RetryExecutor>,
    pub policy: RetryPolicy,
    pub deadline: Duration,
    pub collaborators: Collaborators,
    pub scheduling: SchedulingConfig,
}

/// A stage's automated work: mutate the working copy's outputs; the state
/// machine applies the transition afterwards
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// The stage this handler executes
    fn stage(&self) -> Stage;

    /// Health-monitor dependencies this handler calls; used to pause
    /// dispatch while one of them is down
    fn dependencies(&self) -> Vec<String>;

    async fn execute(
        &self,
        item: &mut ContentItem,
        ctx: &HandlerContext,
        cancel: &CancellationFlag,
    ) -> Result<()>;
}

/// Closed per-stage dispatch table
pub struct StageHandlerRegistry {
    handlers: HashMap<Stage, Arc<dyn StageHandler>>,
}

impl StageHandlerRegistry {
    /// The standard pipeline: blueprint generation, scheduling, publishing,
    /// analytics. `BlueprintGenerated` deliberately has no handler; it is
    /// the human approval gate.
    pub fn standard(collaborators: &Collaborators) -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
        };
        registry.register(Arc::new(GenerateBlueprintHandler));
        registry.register(Arc::new(ScheduleHandler));
        registry.register(Arc::new(PublishHandler::new(collaborators)));
        registry.register(Arc::new(AnalyzeHandler::new(collaborators)));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn StageHandler>) {
        self.handlers.insert(handler.stage(), handler);
    }

    pub fn for_stage(&self, stage: Stage) -> Option<Arc<dyn StageHandler>> {
        self.handlers.get(&stage).cloned()
    }
}

/// `Discovered`: generate the content blueprint
pub struct GenerateBlueprintHandler;

#[async_trait]
impl StageHandler for GenerateBlueprintHandler {
    fn stage(&self) -> Stage {
        Stage::Discovered
    }

    fn dependencies(&self) -> Vec<String> {
        vec![dependencies::CONTENT_PROVIDER.to_string()]
    }

    async fn execute(
        &self,
        item: &mut ContentItem,
        ctx: &HandlerContext,
        cancel: &CancellationFlag,
    ) -> Result<()> {
        let key = CacheKey::new(&item.fingerprint, Stage::BlueprintGenerated);
        if let Some(cached) = ctx.cache.get(&key) {
            debug!(item_id = %item.item_id, "blueprint served from cache");
            item.outputs.blueprint = cached["blueprint"].as_str().map(String::from);
            return Ok(());
        }

        let provider = ctx.collaborators.content_provider.clone();
        let topic = item.topic.clone();
        let blueprint = ctx
            .executor
            .execute(
                dependencies::CONTENT_PROVIDER,
                &ctx.policy,
                ctx.deadline,
                cancel,
                move |_| {
                    let provider = provider.clone();
                    let topic = topic.clone();
                    async move { provider.generate_blueprint(&topic).await }
                },
            )
            .await?;

        ctx.cache.put(
            key,
            serde_json::json!({ "blueprint": blueprint }),
            None,
        );
        item.outputs.blueprint = Some(blueprint);
        Ok(())
    }
}

/// `Approved`: render media, generate the caption, choose the publish time
pub struct ScheduleHandler;

#[async_trait]
impl StageHandler for ScheduleHandler {
    fn stage(&self) -> Stage {
        Stage::Approved
    }

    fn dependencies(&self) -> Vec<String> {
        vec![
            dependencies::RENDERER.to_string(),
            dependencies::CONTENT_PROVIDER.to_string(),
        ]
    }

    async fn execute(
        &self,
        item: &mut ContentItem,
        ctx: &HandlerContext,
        cancel: &CancellationFlag,
    ) -> Result<()> {
        let blueprint = item
            .outputs
            .blueprint
            .clone()
            .ok_or_else(|| PipelineError::permanent("cannot schedule without a blueprint"))?;

        let key = CacheKey::new(&item.fingerprint, Stage::Scheduled);
        if let Some(cached) = ctx.cache.get(&key) {
            debug!(item_id = %item.item_id, "render and caption served from cache");
            item.outputs.media_ref = cached["media_ref"].as_str().map(String::from);
            item.outputs.caption = cached["caption"].as_str().map(String::from);
            item.outputs.hashtags = cached["hashtags"]
                .as_array()
                .map(|tags| {
                    tags.iter()
                        .filter_map(|tag| tag.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
        } else {
            let renderer = ctx.collaborators.renderer.clone();
            let script = blueprint.clone();
            let media_ref = ctx
                .executor
                .execute(
                    dependencies::RENDERER,
                    &ctx.policy,
                    ctx.deadline,
                    cancel,
                    move |_| {
                        let renderer = renderer.clone();
                        let script = script.clone();
                        async move { renderer.render(&script).await }
                    },
                )
                .await?;

            let provider = ctx.collaborators.content_provider.clone();
            let summary = blueprint.clone();
            let caption = ctx
                .executor
                .execute(
                    dependencies::CONTENT_PROVIDER,
                    &ctx.policy,
                    ctx.deadline,
                    cancel,
                    move |_| {
                        let provider = provider.clone();
                        let summary = summary.clone();
                        async move { provider.generate_caption(&summary).await }
                    },
                )
                .await?;

            ctx.cache.put(
                key,
                serde_json::json!({
                    "media_ref": media_ref,
                    "caption": caption.text,
                    "hashtags": caption.hashtags,
                }),
                None,
            );
            item.outputs.media_ref = Some(media_ref);
            item.outputs.caption = Some(caption.text);
            item.outputs.hashtags = caption.hashtags;
        }

        // The publish time is recomputed on every run; a replayed stale
        // timestamp would schedule into the past
        let scheduled_at = Utc::now() + ctx.scheduling.publish_offset();
        item.outputs.scheduled_at = Some(scheduled_at);
        info!(
            item_id = %item.item_id,
            scheduled_at = %scheduled_at,
            "item scheduled for publication"
        );
        Ok(())
    }
}

/// `Scheduled`: publish to every configured platform at the chosen time
pub struct PublishHandler {
    platform_names: Vec<String>,
}

impl PublishHandler {
    pub fn new(collaborators: &Collaborators) -> Self {
        Self {
            platform_names: collaborators
                .publishers
                .iter()
                .map(|publisher| publisher.name().to_string())
                .collect(),
        }
    }
}

#[async_trait]
impl StageHandler for PublishHandler {
    fn stage(&self) -> Stage {
        Stage::Scheduled
    }

    fn dependencies(&self) -> Vec<String> {
        self.platform_names
            .iter()
            .map(|name| dependencies::platform(name))
            .collect()
    }

    async fn execute(
        &self,
        item: &mut ContentItem,
        ctx: &HandlerContext,
        cancel: &CancellationFlag,
    ) -> Result<()> {
        let blueprint = item
            .outputs
            .blueprint
            .clone()
            .ok_or_else(|| PipelineError::permanent("cannot publish without a blueprint"))?;

        let key = CacheKey::new(&item.fingerprint, Stage::Published);
        if let Some(cached) = ctx.cache.get(&key) {
            if let Some(post_ids) = cached.as_object() {
                for (platform, post_id) in post_ids {
                    if let Some(post_id) = post_id.as_str() {
                        item.outputs
                            .platform_post_ids
                            .insert(platform.clone(), post_id.to_string());
                    }
                }
            }
        }

        let request = PublishRequest {
            blueprint,
            caption: item.outputs.caption.clone(),
            hashtags: item.outputs.hashtags.clone(),
            media_ref: item.outputs.media_ref.clone(),
            scheduled_at: item.outputs.scheduled_at,
        };

        for publisher in &ctx.collaborators.publishers {
            // Idempotency: a platform that already has a post id (from cache
            // or a prior partial run) is not published again
            if item.outputs.platform_post_ids.contains_key(publisher.name()) {
                continue;
            }

            let dependency = dependencies::platform(publisher.name());
            let publisher = publisher.clone();
            let request = request.clone();
            let post_id = ctx
                .executor
                .execute(&dependency, &ctx.policy, ctx.deadline, cancel, move |_| {
                    let publisher = publisher.clone();
                    let request = request.clone();
                    async move { publisher.publish(&request).await }
                })
                .await?;

            info!(
                item_id = %item.item_id,
                platform = publisher_name_of(&dependency),
                post_id = %post_id,
                "🚀 published"
            );
            item.outputs
                .platform_post_ids
                .insert(publisher_name_of(&dependency).to_string(), post_id);

            // Persist partial progress in the cache before the next platform
            ctx.cache.put(
                key.clone(),
                serde_json::to_value(&item.outputs.platform_post_ids)
                    .unwrap_or(serde_json::Value::Null),
                None,
            );
        }

        Ok(())
    }
}

fn publisher_name_of(dependency: &str) -> &str {
    dependency
        .strip_prefix(dependencies::PLATFORM_PREFIX)
        .unwrap_or(dependency)
}

/// `Published`: pull performance numbers from every platform
pub struct AnalyzeHandler {
    platform_names: Vec<String>,
}

impl AnalyzeHandler {
    pub fn new(collaborators: &Collaborators) -> Self {
        Self {
            platform_names: collaborators
                .publishers
                .iter()
                .map(|publisher| publisher.name().to_string())
                .collect(),
        }
    }
}

#[async_trait]
impl StageHandler for AnalyzeHandler {
    fn stage(&self) -> Stage {
        Stage::Published
    }

    fn dependencies(&self) -> Vec<String> {
        self.platform_names
            .iter()
            .map(|name| dependencies::platform(name))
            .collect()
    }

    async fn execute(
        &self,
        item: &mut ContentItem,
        ctx: &HandlerContext,
        cancel: &CancellationFlag,
    ) -> Result<()> {
        let mut total = PerformanceSnapshot::default();

        for publisher in &ctx.collaborators.publishers {
            let Some(post_id) = item.outputs.platform_post_ids.get(publisher.name()).cloned()
            else {
                continue;
            };

            let dependency = dependencies::platform(publisher.name());
            let publisher = publisher.clone();
            let snapshot = ctx
                .executor
                .execute(&dependency, &ctx.policy, ctx.deadline, cancel, move |_| {
                    let publisher = publisher.clone();
                    let post_id = post_id.clone();
                    async move { publisher.fetch_metrics(&post_id).await }
                })
                .await?;

            total.views += snapshot.views;
            total.likes += snapshot.likes;
            total.comments += snapshot.comments;
        }

        total.collected_at = Some(Utc::now());
        debug!(
            item_id = %item.item_id,
            views = total.views,
            likes = total.likes,
            "performance snapshot collected"
        );
        item.outputs.performance = Some(total);
        Ok(())
    }
}
