//! taskscope-demo - walks the canonical structured-concurrency scenarios.
//!
//! Interleaved launch ordering, fan-out with `join_all`, failure propagation
//! behind an isolating boundary, and timeout as a scheduled cancel.

use std::sync::Arc;
use std::time::Duration;

use taskscope::iosim::{FailingIo, HeavyIo, SimulatedIo};
use taskscope::{join_all, Scheduler, Scope, ScopeConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskscope=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let scheduler = Scheduler::current();

    launch_ordering(&scheduler).await?;
    fan_out(&scheduler).await?;
    contained_failure(&scheduler).await?;
    timeout(&scheduler).await?;

    Ok(())
}

/// Two tasks interleave: the second finishes while the first is suspended.
async fn launch_ordering(scheduler: &Scheduler) -> anyhow::Result<()> {
    info!("--- launch ordering ---");
    let scope = Scope::new(ScopeConfig::new("ordering"), scheduler);

    scope.schedule("first", async {
        info!("1");
        tokio::time::sleep(Duration::from_millis(100)).await;
        info!("2");
        Ok(())
    })?;
    scope.schedule("second", async {
        info!("3");
        Ok(())
    })?;

    scope.join().await?;
    Ok(())
}

/// Fan ten simulated I/O calls out and collect results in scheduling order.
async fn fan_out(scheduler: &Scheduler) -> anyhow::Result<()> {
    info!("--- fan out ---");
    let scope = Scope::new(ScopeConfig::new("fan-out"), scheduler);
    let repo = Arc::new(SimulatedIo::new(Duration::from_millis(50)));

    let mut handles = Vec::new();
    for i in 1..=10 {
        let repo = Arc::clone(&repo);
        handles.push(scope.schedule(format!("io-{i}"), async move { repo.process(i).await })?);
    }

    let results = join_all(handles).await?;
    info!(?results, "all simulated I/O calls finished");
    scope.join().await?;
    Ok(())
}

/// A failing task cancels its siblings, but an isolating boundary keeps the
/// failure away from the parent scope.
async fn contained_failure(scheduler: &Scheduler) -> anyhow::Result<()> {
    info!("--- contained failure ---");
    let parent = Scope::new(ScopeConfig::new("parent"), scheduler);

    let healthy = parent.schedule("healthy", async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok("parent work finished")
    })?;

    let boundary = parent.child(
        ScopeConfig::new("boundary")
            .isolating()
            .with_failure_handler(|err| info!(%err, "boundary absorbed a failure")),
    )?;
    boundary.schedule("casualty", async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(())
    })?;
    let doomed = boundary.schedule("doomed", {
        let repo = FailingIo;
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            repo.process(13).await
        }
    })?;

    if let Err(err) = doomed.join().await {
        info!(%err, "awaited task reported its failure");
    }

    parent.join().await?;
    info!(result = healthy.state().is_terminal(), "parent joined cleanly");
    info!(snapshot = %serde_json::to_string_pretty(&parent.snapshot())?, "final tree");
    Ok(())
}

/// Timeout is just a scheduled cancel of the scope.
async fn timeout(scheduler: &Scheduler) -> anyhow::Result<()> {
    info!("--- timeout ---");
    let scope = Scope::new(ScopeConfig::new("deadline"), scheduler);

    let slow = scope.schedule("slow", async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    })?;
    scope.cancel_after(Duration::from_millis(100));

    scope.join().await?;
    info!(state = ?slow.state(), "slow task after deadline");
    Ok(())
}
