use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{Instrument, debug, error, info, warn};

use common::logger::{TraceId, annotate_ticker, child_span, root_span};
use engine::sentiment::TickerSentiment;
use engine::{
    Abstention, AttentionAggregator, CorpusFrequency, SentimentScore, SentimentScorer,
    SignalEngine, TextUnit, TickerExtractor, Verdict,
};
use market::{HttpChartProvider, MarketDataCache, MarketDataProvider};

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::metrics::RunCounters;
use crate::report::RunReport;

/// What one ingest pass did to the aggregator.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub units_seen: usize,
    pub units_skipped: usize,
    pub mentions_accepted: usize,
    pub tickers: BTreeSet<String>,
    pub sentiment: BTreeMap<String, TickerSentiment>,
}

#[derive(Default)]
struct ChunkOutcome {
    mentions: usize,
    scores: Vec<SentimentScore>,
}

/// Wires every component together behind one configuration.
///
/// Owns its own aggregator and cache; two pipelines in one process share
/// nothing but the read-only built-in lexicon.
pub struct Pipeline<P> {
    cfg: AppConfig,
    extractor: Arc<TickerExtractor>,
    scorer: Arc<SentimentScorer>,
    attention: Arc<AttentionAggregator>,
    cache: Arc<MarketDataCache<P>>,
    engine: Arc<SignalEngine<P>>,
    counters: RunCounters,
}

impl Pipeline<HttpChartProvider> {
    /// Pipeline backed by the HTTP chart provider at `cfg.provider_url`.
    pub fn with_http_provider(cfg: AppConfig) -> Result<Self, PipelineError> {
        let provider = HttpChartProvider::new(cfg.provider_url.clone())?;
        Self::new(cfg, Arc::new(provider))
    }
}

impl<P: MarketDataProvider + 'static> Pipeline<P> {
    pub fn new(cfg: AppConfig, provider: Arc<P>) -> Result<Self, PipelineError> {
        cfg.validate()?;

        let lexicon = cfg.sentiment.load_lexicon()?;
        let extractor = TickerExtractor::new(cfg.tickers.clone())?;
        let scorer = SentimentScorer::new(lexicon, cfg.sentiment.clone())?;
        let attention = Arc::new(AttentionAggregator::new(&cfg.attention)?);
        let cache = Arc::new(MarketDataCache::new(
            provider,
            cfg.features.clone(),
            cfg.cache.clone(),
        ));
        let engine = SignalEngine::new(cfg.signal.clone(), attention.clone(), cache.clone())?;

        info!(
            component = "pipeline",
            window_hours = cfg.attention.window_hours,
            min_mentions = cfg.signal.min_mentions,
            workers = cfg.worker_count(),
            "pipeline ready"
        );

        Ok(Self {
            cfg,
            extractor: Arc::new(extractor),
            scorer: Arc::new(scorer),
            attention,
            cache,
            engine: Arc::new(engine),
            counters: RunCounters::default(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    pub fn attention(&self) -> &Arc<AttentionAggregator> {
        &self.attention
    }

    pub fn cache(&self) -> &Arc<MarketDataCache<P>> {
        &self.cache
    }

    /// Extracts, scores and records every well-formed unit.
    ///
    /// Malformed units are skipped with a warning. Extraction and scoring are
    /// pure and run on blocking workers; only the aggregator is shared, and
    /// it serialises appends per ticker.
    pub async fn ingest(&self, units: Vec<TextUnit>) -> IngestSummary {
        let mut summary = IngestSummary {
            units_seen: units.len(),
            ..Default::default()
        };

        let max_body = self.cfg.tickers.max_body_bytes;
        let valid: Vec<TextUnit> = units
            .into_iter()
            .filter(|u| match u.validate(max_body) {
                Ok(()) => true,
                Err(e) => {
                    warn!(component = "ingest", error = %e, "skipping malformed text unit");
                    summary.units_skipped += 1;
                    false
                }
            })
            .collect();

        let corpus = Arc::new(CorpusFrequency::from_texts(valid.iter().map(|u| u.body.as_str())));

        let chunk_size = valid.len().div_ceil(self.cfg.worker_count()).max(1);
        let mut chunks: Vec<Vec<TextUnit>> = Vec::new();
        let mut rest = valid.into_iter().peekable();
        while rest.peek().is_some() {
            chunks.push(rest.by_ref().take(chunk_size).collect());
        }

        let handles = chunks.into_iter().map(|chunk| {
            let extractor = self.extractor.clone();
            let scorer = self.scorer.clone();
            let attention = self.attention.clone();
            let corpus = corpus.clone();
            tokio::task::spawn_blocking(move || {
                process_chunk(&chunk, &extractor, &scorer, &attention, &corpus)
            })
        });

        let mut scores: BTreeMap<String, Vec<SentimentScore>> = BTreeMap::new();
        for joined in join_all(handles).await {
            match joined {
                Ok(outcome) => {
                    summary.mentions_accepted += outcome.mentions;
                    for score in outcome.scores {
                        summary.tickers.insert(score.ticker.clone());
                        scores.entry(score.ticker.clone()).or_default().push(score);
                    }
                }
                Err(e) => {
                    error!(
                        component = "ingest",
                        error = %e,
                        "scoring worker failed; its units are dropped"
                    );
                }
            }
        }

        summary.sentiment = scores
            .iter()
            .filter_map(|(ticker, s)| Some((ticker.clone(), self.scorer.aggregate(ticker, s)?)))
            .collect();

        RunCounters::add(&self.counters.units_seen, summary.units_seen);
        RunCounters::add(&self.counters.units_malformed, summary.units_skipped);
        RunCounters::add(&self.counters.mentions_accepted, summary.mentions_accepted);

        debug!(
            component = "ingest",
            units = summary.units_seen,
            skipped = summary.units_skipped,
            mentions = summary.mentions_accepted,
            tickers = summary.tickers.len(),
            "batch ingested"
        );
        summary
    }

    /// Computes every ticker concurrently. One ticker failing, even by
    /// panicking, only affects that ticker's entry.
    pub async fn evaluate(
        &self,
        tickers: impl IntoIterator<Item = String>,
        as_of: DateTime<Utc>,
    ) -> BTreeMap<String, Verdict> {
        let tasks: Vec<_> = tickers
            .into_iter()
            .map(|ticker| {
                let engine = self.engine.clone();
                let t = ticker.clone();
                let span = child_span("score_ticker");
                let handle = tokio::spawn(
                    async move {
                        annotate_ticker(&t);
                        engine.compute(&t, as_of).await
                    }
                    .instrument(span),
                );
                (ticker, handle)
            })
            .collect();

        let mut outcomes = BTreeMap::new();
        for (ticker, handle) in tasks {
            let verdict = match handle.await {
                Ok(v) => v,
                Err(e) => {
                    error!(component = "evaluate", %ticker, error = %e, "ticker scoring failed");
                    Verdict::Abstained(Abstention::Failed {
                        reason: e.to_string(),
                    })
                }
            };
            self.count(&verdict);
            outcomes.insert(ticker, verdict);
        }
        outcomes
    }

    /// Ingests `units` and evaluates, as of `as_of`, every ticker with
    /// mentions in the current window plus every ticker accepted from `units`.
    pub async fn run(&self, units: Vec<TextUnit>, as_of: DateTime<Utc>) -> RunReport {
        let trace_id = TraceId::default();
        let span = root_span("signal_batch", &trace_id);

        async move {
            RunCounters::add(&self.counters.runs, 1);
            let summary = self.ingest(units).await;

            let pruned = self.attention.prune(as_of);
            if pruned > 0 {
                debug!(component = "pipeline", pruned, "dropped idle tickers");
            }
            // Tickers accepted in this batch stay candidates even when every
            // mention fell outside the window, so the report never drops them.
            let mut candidates: BTreeSet<String> = self.attention.tickers().into_iter().collect();
            candidates.extend(summary.tickers.iter().cloned());
            let outcomes = self.evaluate(candidates, as_of).await;

            let report = RunReport {
                trace_id: trace_id.to_string(),
                as_of,
                units_seen: summary.units_seen,
                units_skipped: summary.units_skipped,
                mentions_accepted: summary.mentions_accepted,
                sentiment: summary.sentiment,
                outcomes,
            };
            info!(
                component = "pipeline",
                tickers = report.outcomes.len(),
                signals = report.ranked_signals().len(),
                provider_calls = self.cache.provider_calls(),
                "run complete"
            );
            report
        }
        .instrument(span)
        .await
    }

    fn count(&self, verdict: &Verdict) {
        let c = &self.counters;
        let counter = match verdict {
            Verdict::Emitted(_) => &c.signals_emitted,
            Verdict::Abstained(a) if a.is_insufficient_evidence() => {
                &c.abstained_insufficient_evidence
            }
            Verdict::Abstained(Abstention::ProviderUnavailable { .. }) => {
                &c.abstained_provider_unavailable
            }
            Verdict::Abstained(_) => &c.ticker_failures,
        };
        RunCounters::add(counter, 1);
    }
}

/// One sentiment score and one attention event per (unit, ticker) pair.
///
/// Repeated mentions of a ticker inside one unit do not inflate its velocity.
fn process_chunk(
    units: &[TextUnit],
    extractor: &TickerExtractor,
    scorer: &SentimentScorer,
    attention: &AttentionAggregator,
    corpus: &CorpusFrequency,
) -> ChunkOutcome {
    let mut out = ChunkOutcome::default();
    for unit in units {
        let mentions = extractor.extract_with_corpus(&unit.body, corpus);
        if mentions.is_empty() {
            continue;
        }
        out.mentions += mentions.len();

        let distinct: BTreeSet<&str> = mentions.iter().map(|m| m.ticker.as_str()).collect();
        let engagement = unit.engagement_weight();
        for ticker in distinct {
            let score = scorer.score_for(&unit.id, ticker, &unit.body);
            attention.record(ticker, unit.created_at, engagement, score.polarity);
            out.scores.push(score);
        }
    }
    out
}
