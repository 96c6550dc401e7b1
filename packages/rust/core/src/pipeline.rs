//! End-to-end pipeline: topic → keywords → research → draft → pack → log → publish.
//!
//! A [`PipelineRun`] carries the state of one invocation explicitly; the
//! [`Orchestrator`] advances it and nothing else holds pipeline state.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use writerpack_shared::{
    AppConfig, AudienceSegment, KeywordSource, PackMetadata, ParseQuality, ResearchBriefing,
    ResearchPolicy, Result, Role, StructureDirective, Topic, WriterPack, WriterPackError,
};

use crate::capabilities::{
    DraftModel, PackLog, PublishSink, PublishedDraft, ResearchModel, SiteSearch, TextGenerator,
    TrendCache, TrendSource,
};
use crate::clock::Clock;
use crate::links::{LinkSettings, LinkSuggester, LinkSuggestions};
use crate::research::Researcher;
use crate::retry::{RetryPolicy, with_retry};
use crate::trends::{KeywordResolver, ResolvedKeywords, TrendSummarizer};
use crate::writer::{AudienceProfile, Draft, Writer, audience_profile};

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Where one pipeline invocation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    CollectingContext,
    Researching,
    Drafting,
    Assembled,
    Logged,
    Publishing,
    Terminal,
    Errored,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CollectingContext => "collecting-context",
            Self::Researching => "researching",
            Self::Drafting => "drafting",
            Self::Assembled => "assembled",
            Self::Logged => "logged",
            Self::Publishing => "publishing",
            Self::Terminal => "terminal",
            Self::Errored => "errored",
        }
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, CollectingContext)
                | (CollectingContext, Researching)
                | (Researching, Drafting)
                | (Researching, Errored)
                | (Drafting, Assembled)
                | (Drafting, Errored)
                | (Assembled, Logged)
                | (Logged, Publishing)
                | (Logged, Terminal)
                | (Publishing, Terminal)
        )
    }

    pub fn is_final(self) -> bool {
        matches!(self, Self::Terminal | Self::Errored)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened when the pack was handed to the log sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOutcome {
    Written,
    Failed(String),
}

/// Result of the optional publish step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The caller did not confirm publishing.
    Skipped,
    Published(PublishedDraft),
    /// The CMS rejected or never answered; the pack is unaffected.
    Failed(String),
}

/// One pipeline invocation.
#[derive(Debug)]
pub struct PipelineRun {
    state: PipelineState,
    history: Vec<PipelineState>,
    pack: Option<WriterPack>,
    log_outcome: Option<SinkOutcome>,
    publish_outcome: Option<PublishOutcome>,
    failed_stage: Option<PipelineState>,
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRun {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            history: vec![PipelineState::Idle],
            pack: None,
            log_outcome: None,
            publish_outcome: None,
            failed_stage: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state visited, in order, starting with `Idle`.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// The assembled pack. Present from `Assembled` onward.
    pub fn pack(&self) -> Option<&WriterPack> {
        self.pack.as_ref()
    }

    pub fn log_outcome(&self) -> Option<&SinkOutcome> {
        self.log_outcome.as_ref()
    }

    pub fn publish_outcome(&self) -> Option<&PublishOutcome> {
        self.publish_outcome.as_ref()
    }

    /// The stage that failed, if the run is `Errored`.
    pub fn failed_stage(&self) -> Option<PipelineState> {
        self.failed_stage
    }

    pub fn advance(&mut self, next: PipelineState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(WriterPackError::validation(format!(
                "illegal pipeline transition {} -> {}",
                self.state, next
            )));
        }
        info!(from = %self.state, to = %next, "pipeline transition");
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Close a logged run that will not be published.
    pub fn finish(&mut self) -> Result<()> {
        match self.state {
            PipelineState::Logged => self.advance(PipelineState::Terminal),
            PipelineState::Terminal => Ok(()),
            other => Err(WriterPackError::validation(format!(
                "cannot finish a run in state {other}"
            ))),
        }
    }

    /// Move to `Errored` and tag `err` with the failing stage.
    fn fail(&mut self, err: WriterPackError) -> WriterPackError {
        let stage = self.state;
        self.failed_stage = Some(stage);
        if let Err(e) = self.advance(PipelineState::Errored) {
            warn!(error = %e, "could not record pipeline failure");
        }
        err.at_stage(stage.as_str())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Inputs for one invocation.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub topic: Topic,
    pub audience: AudienceSegment,
    pub directive: StructureDirective,
    pub guiding_questions: Vec<String>,
}

/// Caller's publish decision.
#[derive(Debug, Clone, Copy)]
pub struct PublishRequest {
    pub confirmed: bool,
    pub role: Role,
}

/// Every external collaborator the pipeline needs.
pub struct Capabilities {
    pub text: Arc<dyn TextGenerator>,
    pub research: Arc<dyn ResearchModel>,
    pub draft: Arc<dyn DraftModel>,
    pub search: Arc<dyn SiteSearch>,
    pub trend_source: Arc<dyn TrendSource>,
    pub cache: Arc<dyn TrendCache>,
    pub log: Arc<dyn PackLog>,
    pub publisher: Option<Arc<dyn PublishSink>>,
    pub clock: Arc<dyn Clock>,
}

/// Policy knobs, usually derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub research_policy: ResearchPolicy,
    pub created_by: String,
    pub authorized_roles: Vec<Role>,
    pub platforms: Vec<String>,
    pub fallback_keywords: Vec<String>,
    pub max_trend_keywords: usize,
    pub lookback_days: u32,
    pub links: LinkSettings,
    pub generation_retry: RetryPolicy,
    pub publish_retry: RetryPolicy,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let generation_retry = RetryPolicy::generation(&config.retry);
        Self {
            research_policy: config.pipeline.research_policy,
            created_by: config.defaults.created_by.clone(),
            authorized_roles: config.publish.authorized_roles.clone(),
            platforms: config.trends.platforms.clone(),
            fallback_keywords: config.trends.fallback_keywords.clone(),
            max_trend_keywords: config.trends.max_keywords,
            lookback_days: config.trends.lookback_days,
            links: LinkSettings {
                site_domain: config.search.site_domain.clone(),
                query_count: config.search.query_count,
                results_per_query: config.search.results_per_query,
                generation_retry,
                search_retry: RetryPolicy::search(&config.retry),
            },
            generation_retry,
            publish_retry: RetryPolicy::publish(&config.retry),
        }
    }
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self::from_config(config)
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a stage falls back instead of failing.
    fn degraded(&self, stage: &str, reason: &str);
    /// Called once the pack is logged.
    fn done(&self, pack: &WriterPack);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn degraded(&self, _stage: &str, _reason: &str) {}
    fn done(&self, _pack: &WriterPack) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Sequences the stages of one invocation and owns the fallback policy.
pub struct Orchestrator {
    keywords: KeywordResolver,
    researcher: Researcher,
    links: Arc<LinkSuggester>,
    writer: Writer,
    log: Arc<dyn PackLog>,
    publisher: Option<Arc<dyn PublishSink>>,
    clock: Arc<dyn Clock>,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(caps: Capabilities, settings: PipelineSettings) -> Self {
        let summarizer = TrendSummarizer::new(
            caps.text.clone(),
            caps.cache.clone(),
            settings.generation_retry,
            settings.max_trend_keywords,
            settings.lookback_days,
        );
        let keywords = KeywordResolver::new(
            caps.cache,
            caps.trend_source,
            summarizer,
            settings.platforms.clone(),
            settings.fallback_keywords.clone(),
        );
        Self {
            keywords,
            researcher: Researcher::new(caps.research, settings.generation_retry),
            links: Arc::new(LinkSuggester::new(
                caps.text,
                caps.search,
                settings.links.clone(),
            )),
            writer: Writer::new(caps.draft, settings.generation_retry),
            log: caps.log,
            publisher: caps.publisher,
            clock: caps.clock,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the pipeline through `Logged`.
    ///
    /// 1. Collect context: resolve keywords; link suggestion runs alongside
    /// 2. Research (policy decides what a failure means)
    /// 3. Draft
    /// 4. Assemble the pack
    /// 5. Hand it to the log sink
    ///
    /// On a research (abort policy) or draft failure the error names the
    /// failing stage and no pack exists.
    #[instrument(skip_all, fields(topic = %request.topic, audience = %request.audience))]
    pub async fn run(
        &self,
        request: &PipelineRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineRun> {
        let start = Instant::now();
        let mut run = PipelineRun::new();
        let policy = self.settings.research_policy;
        info!(directive = %request.directive, policy = %policy, "starting pipeline");

        // --- Collecting context ---
        run.advance(PipelineState::CollectingContext)?;
        progress.phase("Collecting trend keywords");

        let links_task = {
            let links = Arc::clone(&self.links);
            let topic = request.topic.clone();
            tokio::spawn(async move { links.suggest(&topic).await })
        };

        let day = self.clock.today();
        let resolved = self.keywords.resolve(day).await;
        if resolved.source == KeywordSource::Fallback {
            progress.degraded("keywords", "trend data unavailable, using fallback keywords");
        }

        // --- Researching ---
        run.advance(PipelineState::Researching)?;
        progress.phase("Researching topic");

        let (briefing, research_failed) = match self
            .researcher
            .research(&request.topic, request.audience, &request.guiding_questions)
            .await
        {
            Ok(briefing) => (briefing, false),
            Err(e) => match policy {
                ResearchPolicy::ProceedDegraded => {
                    warn!(error = %e, "research unavailable, drafting without a briefing");
                    progress.degraded("research", &e.to_string());
                    (
                        ResearchBriefing::unavailable(request.topic.clone(), request.audience),
                        true,
                    )
                }
                ResearchPolicy::Abort => {
                    links_task.abort();
                    return Err(run.fail(e));
                }
            },
        };

        // --- Drafting ---
        run.advance(PipelineState::Drafting)?;
        progress.phase("Drafting article");

        let profile = audience_profile(request.audience);
        let keywords_used = select_keywords(&resolved, profile);
        let draft = match self
            .writer
            .write(&briefing, &keywords_used, request.audience, request.directive)
            .await
        {
            Ok(draft) => draft,
            Err(e) => {
                links_task.abort();
                return Err(run.fail(e));
            }
        };

        let links = match links_task.await {
            Ok(links) => links,
            Err(e) => {
                warn!(error = %e, "link suggestion task did not complete");
                LinkSuggestions::unavailable()
            }
        };
        if links.degraded {
            progress.degraded("links", "some internal link searches failed");
        }

        // --- Assembled ---
        let pack = self.assemble(
            request,
            PackParts {
                resolved: &resolved,
                keywords_used,
                briefing,
                research_failed,
                links,
                draft,
            },
        );
        run.advance(PipelineState::Assembled)?;
        run.pack = Some(pack);

        // --- Logged ---
        progress.phase("Logging pack");
        let outcome = match run.pack.as_ref() {
            Some(pack) => match self.log.append(pack).await {
                Ok(()) => SinkOutcome::Written,
                Err(e) => {
                    warn!(error = %e, "failed to log pack");
                    progress.degraded("log", &e.to_string());
                    SinkOutcome::Failed(e.to_string())
                }
            },
            None => SinkOutcome::Failed("no pack to log".into()),
        };
        run.log_outcome = Some(outcome);
        run.advance(PipelineState::Logged)?;

        if let Some(pack) = run.pack.as_ref() {
            progress.done(pack);
            info!(
                pack_id = %pack.metadata.pack_id,
                structure = %pack.structure_used,
                degraded = pack.metadata.degraded,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "pipeline complete"
            );
        }
        Ok(run)
    }

    /// Optionally publish a logged pack as a CMS draft.
    ///
    /// Without confirmation the run simply ends. An unauthorized role is an
    /// error and leaves the run in `Logged`. A CMS failure is reported in
    /// the outcome; the pack and its log entry are untouched either way.
    #[instrument(skip_all, fields(role = %request.role, confirmed = request.confirmed))]
    pub async fn publish(
        &self,
        run: &mut PipelineRun,
        request: PublishRequest,
    ) -> Result<PublishOutcome> {
        if run.state() != PipelineState::Logged {
            return Err(WriterPackError::validation(format!(
                "only a logged pack can be published (run is {})",
                run.state()
            )));
        }

        if !request.confirmed {
            run.publish_outcome = Some(PublishOutcome::Skipped);
            run.advance(PipelineState::Terminal)?;
            return Ok(PublishOutcome::Skipped);
        }

        if !self.settings.authorized_roles.contains(&request.role) {
            return Err(WriterPackError::Unauthorized {
                role: request.role.to_string(),
                action: "publish".into(),
            });
        }

        let publisher = self
            .publisher
            .as_ref()
            .ok_or_else(|| WriterPackError::config("no publish target is configured"))?;

        run.advance(PipelineState::Publishing)?;

        let outcome = {
            let pack = run
                .pack
                .as_ref()
                .ok_or_else(|| WriterPackError::validation("run has no pack"))?;
            let title = pack.title.as_str();
            let body = pack.article_body.as_str();
            match with_retry(&self.settings.publish_retry, "publish", move || {
                publisher.create_draft(title, body)
            })
            .await
            {
                Ok(draft) => {
                    info!(post_id = draft.id, "draft created");
                    PublishOutcome::Published(draft)
                }
                Err(e) => {
                    let err = WriterPackError::Publish(e.to_string());
                    warn!(error = %err, "publish failed");
                    PublishOutcome::Failed(err.to_string())
                }
            }
        };

        run.publish_outcome = Some(outcome.clone());
        run.advance(PipelineState::Terminal)?;
        Ok(outcome)
    }

    fn assemble(&self, request: &PipelineRequest, parts: PackParts<'_>) -> WriterPack {
        let PackParts {
            resolved,
            keywords_used,
            briefing,
            research_failed,
            links,
            draft,
        } = parts;

        let research_degraded = research_failed || briefing.quality == ParseQuality::Degraded;
        let metadata = PackMetadata {
            pack_id: Uuid::now_v7(),
            tone: draft.tone,
            keyword_source: resolved.source,
            research_policy: self.settings.research_policy,
            research_quality: briefing.quality,
            draft_quality: draft.quality,
            research_degraded,
            keywords_degraded: resolved.degraded,
            links_degraded: links.degraded,
            social_degraded: draft.social_degraded,
            structure_inferred: draft.structure_inferred,
            degraded: research_degraded
                || resolved.degraded
                || links.degraded
                || draft.social_degraded
                || draft.structure_inferred,
        };

        let Draft {
            title,
            article_body,
            structure_used,
            social_posts,
            writing_reminders,
            final_checklist,
            ..
        } = draft;

        WriterPack {
            topic: request.topic.clone(),
            audience: request.audience,
            structure_used,
            title,
            article_body,
            keywords_used,
            briefing_sources: briefing.sources,
            dropped_sources: briefing.dropped_sources,
            internal_links: links.suggestions,
            social_posts,
            writing_reminders,
            final_checklist,
            created_at: self.clock.now(),
            created_by: self.settings.created_by.clone(),
            metadata,
        }
    }
}

/// Stage outputs combined into a pack.
struct PackParts<'a> {
    resolved: &'a ResolvedKeywords,
    keywords_used: Vec<String>,
    briefing: ResearchBriefing,
    research_failed: bool,
    links: LinkSuggestions,
    draft: Draft,
}

/// Trend keywords are capped per audience; the fallback list goes whole.
fn select_keywords(resolved: &ResolvedKeywords, profile: &AudienceProfile) -> Vec<String> {
    match resolved.source {
        KeywordSource::Fallback => resolved.keywords.clone(),
        _ => resolved
            .keywords
            .iter()
            .take(profile.max_keywords)
            .cloned()
            .collect(),
    }
}
