use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use siphon::config::Config;
use siphon::metrics;
use siphon::models::{Job, JobState};
use siphon::notifications::{BroadcastSink, FanoutSink, LogSink};
use siphon::scheduler::Engine;
use siphon::storage::{Credentials, StaticCredentialStore};

use super::load_jobs;

pub async fn run(
    config: Config,
    jobs: PathBuf,
    credentials: Option<PathBuf>,
    output: Option<PathBuf>,
    print_events: bool,
    print_metrics: bool,
) -> Result<()> {
    if let Err(e) = metrics::init_metrics() {
        tracing::warn!("Metrics initialization failed: {}", e);
    }

    let specs = load_jobs(&jobs)?;

    let broadcast = Arc::new(BroadcastSink::default());
    let sink = FanoutSink::new()
        .with(Arc::new(LogSink))
        .with(broadcast.clone());
    let mut builder = Engine::builder(config).sink(Arc::new(sink));
    if let Some(path) = credentials {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read credentials file: {}", path.display()))?;
        let credentials: Credentials = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse credentials file: {}", path.display()))?;
        builder = builder.credentials(Arc::new(StaticCredentialStore::with_default(credentials)));
    }
    let engine = builder.build()?;

    let printer = print_events.then(|| {
        let mut events = broadcast.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => eprintln!("{line}"),
                        Err(e) => tracing::warn!("Failed to encode event: {}", e),
                    },
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event printer lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    });

    engine.start();

    let mut ids = Vec::with_capacity(specs.len());
    for (index, spec) in specs.into_iter().enumerate() {
        match engine.submit(spec).await {
            Ok(id) => ids.push(id),
            Err(e) => eprintln!("Job #{index} rejected: {e}"),
        }
    }

    let waiter = {
        let engine = engine.clone();
        let ids = ids.clone();
        async move {
            futures::future::join_all(ids.into_iter().map(|id| engine.wait_for(id))).await
        }
    };

    let results = tokio::select! {
        results = waiter => results,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, cancelling outstanding jobs");
            for id in &ids {
                let _ = engine.cancel(*id).await;
            }
            futures::future::join_all(ids.iter().map(|id| engine.wait_for(*id))).await
        }
    };
    engine.shutdown().await;

    // Dropping every sender closes the channel once the printer drains it
    drop(engine);
    drop(broadcast);
    if let Some(printer) = printer {
        if tokio::time::timeout(Duration::from_secs(1), printer).await.is_err() {
            tracing::warn!("Event printer did not drain in time");
        }
    }

    let finished: Vec<Job> = results.into_iter().filter_map(|r| r.ok()).collect();
    let json = serde_json::to_string_pretty(&finished)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write results: {}", path.display()))?;
            println!("Results written to {}", path.display());
        }
        None => println!("{json}"),
    }

    let count = |state: JobState| finished.iter().filter(|j| j.state == state).count();
    eprintln!(
        "Completed: {}  Failed: {}  Cancelled: {}",
        count(JobState::Completed),
        count(JobState::Failed),
        count(JobState::Cancelled)
    );

    if print_metrics {
        match metrics::encode_metrics() {
            Ok(text) => eprintln!("{text}"),
            Err(e) => tracing::warn!("Failed to encode metrics: {}", e),
        }
    }

    Ok(())
}

pub fn validate(jobs: PathBuf) -> Result<()> {
    let specs = load_jobs(&jobs)?;
    let mut invalid = 0;

    for (index, spec) in specs.iter().enumerate() {
        match spec.validate() {
            Ok(()) => println!(
                "#{index} ok      {} ({})",
                spec.primary_url().unwrap_or("-"),
                spec.strategy.kind()
            ),
            Err(e) => {
                invalid += 1;
                println!("#{index} invalid {e}");
            }
        }
    }

    if invalid > 0 {
        anyhow::bail!("{invalid} of {} job specs are invalid", specs.len());
    }
    Ok(())
}
