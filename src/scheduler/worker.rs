//! Worker loop
//!
//! A worker claims the oldest queued job and drives its strategy until a
//! terminal outcome, a requeue, or cancellation:
//!
//! ```text
//!   ┌─▶ cancelled? ─▶ stop condition? ─▶ acquire proxy ─▶ execute
//!   │                                                        │
//!   │   done ──────────────────────────────────────▶ completed
//!   │   failed (transient, budget left) ─ backoff ───┐
//!   │   failed ────────────────────────────────────▶ failed
//!   └── continue ─ wait for resume_at ◀──────────────┘
//! ```
//!
//! The strategy runs on its own task so a panicking backend becomes a job
//! failure instead of taking the worker down.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;

use super::cancel::CancelFlag;
use super::engine::{Claimed, Engine};
use super::state::Transition;
use crate::metrics;
use crate::models::{
    ErrorDescriptor, EventPayload, FailureKind, Job, StrategyConfig, StrategyKind,
};
use crate::proxy::{Acquired, ProxyEndpoint};
use crate::strategy::{JobRuntime, Outcome, StrategyContext};
use crate::utils::error::StrategyError;

/// Run one worker until the engine shuts down
pub(crate) async fn run(engine: Engine, worker_id: usize) {
    let mut shutdown = engine.shutdown_signal();
    tracing::debug!(worker_id, "Worker started");

    loop {
        let notified = engine.inner.work_available.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if engine.is_stopping() {
            break;
        }

        if let Some(claimed) = engine.claim_next() {
            run_job(&engine, worker_id, claimed).await;
            continue;
        }

        tokio::select! {
            _ = &mut notified => {}
            _ = shutdown.changed() => {}
        }
    }

    tracing::debug!(worker_id, "Worker stopped");
}

async fn run_job(engine: &Engine, worker_id: usize, claimed: Claimed) {
    let Claimed {
        job,
        cancel,
        resume,
        event,
    } = claimed;
    let id = job.id;

    engine.announce(&job, &event).await;
    tracing::info!(worker_id, job_id = %id, strategy = %job.spec.strategy.kind(), "Job started");

    let task = tokio::spawn(execute(engine.clone(), job, cancel, resume));
    let (transition, runtime) = match task.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(worker_id, job_id = %id, error = %e, "Strategy task crashed");
            let error = StrategyError::Crashed(e.to_string());
            (
                Transition::Fail(ErrorDescriptor::new(error.kind(), error.to_string())),
                None,
            )
        }
    };

    engine.finish(id, transition, runtime).await;
}

/// Drive one job to its next resting point
async fn execute(
    engine: Engine,
    job: Job,
    cancel: CancelFlag,
    resume: Option<JobRuntime>,
) -> (Transition, Option<JobRuntime>) {
    let inner = &engine.inner;
    let mut shutdown = engine.shutdown_signal();

    let mut runtime = resume.unwrap_or_default();
    let resolved = runtime.strategy.take();
    let mut ctx = StrategyContext::new(
        job.id,
        &job.spec,
        runtime,
        cancel.clone(),
        inner.services.clone(),
    );

    let config = match resolved {
        Some(config) => config,
        None => match resolve(&engine, &job, &mut ctx).await {
            Ok(config) => config,
            Err(transition) => return (transition, None),
        },
    };
    engine.record_resolution(job.id, config.kind()).await;

    ctx.kind = config.effective_kind();
    ctx.timeout = inner.config.engine.fetch_timeout(ctx.kind);

    let strategy = match inner.dispatcher.build(&config) {
        Ok(strategy) => strategy,
        Err(e) => return (Transition::Fail(describe(&ctx, &e, 1)), None),
    };

    let retry = &inner.config.retry;
    let mut failures: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return (Transition::Cancel, None);
        }

        if let Some(reason) = ctx.progress.stop_reason(Instant::now()) {
            tracing::info!(job_id = %job.id, reason = %reason, "Iteration finished");
            let progress = std::mem::take(&mut ctx.progress);
            return match progress.finish(reason) {
                Ok(payload) => (Transition::Complete(payload), None),
                Err(e) => (Transition::Fail(describe(&ctx, &e, 1)), None),
            };
        }

        match acquire_proxy(&engine) {
            Some(proxy) => ctx.set_proxy(proxy),
            None => return (Transition::Fail(no_proxy(&ctx, failures + 1)), None),
        }
        ctx.attempt = failures + 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return (Transition::Cancel, None),
            outcome = strategy.execute(&mut ctx) => outcome,
        };

        match outcome {
            Outcome::Done(payload) => return (Transition::Complete(payload), None),
            Outcome::Failed(e) if e.is_cancelled() => return (Transition::Cancel, None),
            Outcome::Failed(e) if e.is_retryable() && failures < retry.max_retries => {
                failures += 1;
                let delay = retry.delay_for(failures);
                tracing::warn!(
                    job_id = %job.id,
                    attempt = failures,
                    delay_ms = delay.as_millis() as u64,
                    proxy = ctx.proxy_label().as_deref().unwrap_or("direct"),
                    error = %e,
                    "Transient failure, retrying"
                );
                metrics::record_job_retry();
                ctx.publish(EventPayload::Retrying {
                    attempt: failures,
                    delay_ms: delay.as_millis() as u64,
                    error: e.to_string(),
                })
                .await;

                let wake = Instant::now() + delay;
                let wake = ctx.progress.deadline().map_or(wake, |deadline| wake.min(deadline));
                if !cancel.sleep_until(wake).await {
                    return (Transition::Cancel, None);
                }
            }
            Outcome::Failed(e) => {
                return (Transition::Fail(describe(&ctx, &e, failures + 1)), None);
            }
            Outcome::Continue(continuation) => {
                failures = 0;
                ctx.publish(EventPayload::Progress {
                    data: continuation.progress,
                })
                .await;

                let mut interrupted = *shutdown.borrow();
                if let (false, Some(resume_at)) = (interrupted, continuation.resume_at) {
                    tokio::select! {
                        woke = cancel.sleep_until(resume_at) => {
                            if !woke {
                                return (Transition::Cancel, None);
                            }
                        }
                        _ = shutdown_signalled(&mut shutdown) => interrupted = true,
                    }
                }

                if interrupted {
                    tracing::info!(job_id = %job.id, "Requeueing job for shutdown");
                    return (Transition::Requeue, Some(ctx.into_runtime(Some(config))));
                }
            }
        }
    }
}

/// Concrete strategy configuration for a job, probing when it asks for `auto`
async fn resolve(
    engine: &Engine,
    job: &Job,
    ctx: &mut StrategyContext,
) -> Result<StrategyConfig, Transition> {
    if !matches!(job.spec.strategy, StrategyConfig::Auto) {
        return Ok(job.spec.strategy.clone());
    }

    match acquire_proxy(engine) {
        Some(proxy) => ctx.set_proxy(proxy),
        None => return Err(Transition::Fail(no_proxy(ctx, 1))),
    }
    ctx.timeout = engine.inner.config.engine.fetch_timeout(StrategyKind::Static);

    match engine.inner.dispatcher.resolve_auto(ctx).await {
        Ok(kind) => {
            tracing::info!(job_id = %job.id, strategy = %kind, "Resolved auto strategy");
            Ok(StrategyConfig::default_for(kind))
        }
        Err(e) if e.is_cancelled() => Err(Transition::Cancel),
        Err(e) => Err(Transition::Fail(describe(ctx, &e, 1))),
    }
}

/// `Some(None)` means connect directly; `None` means every proxy is banned
fn acquire_proxy(engine: &Engine) -> Option<Option<Arc<ProxyEndpoint>>> {
    match engine.inner.services.pool.acquire() {
        Acquired::Endpoint(endpoint) => Some(Some(endpoint)),
        Acquired::Direct => Some(None),
        Acquired::Exhausted => None,
    }
}

fn no_proxy(ctx: &StrategyContext, attempt: u32) -> ErrorDescriptor {
    tracing::warn!(job_id = %ctx.job_id, "Every proxy is banned");
    ErrorDescriptor::new(FailureKind::TransientInfra, "no proxy available")
        .with_url(ctx.primary_url().map(str::to_string))
        .with_attempt(attempt)
}

fn describe(ctx: &StrategyContext, error: &StrategyError, attempt: u32) -> ErrorDescriptor {
    ErrorDescriptor::new(error.kind(), error.to_string())
        .with_proxy(ctx.proxy_label())
        .with_url(ctx.last_url().map(str::to_string))
        .with_attempt(attempt)
}

async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stopping| *stopping).await.is_err() {
        std::future::pending::<()>().await;
    }
}
