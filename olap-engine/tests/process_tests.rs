//! Process registration and execution

mod helpers;

use async_trait::async_trait;
use helpers::*;
use olap_common::events::OlapEvent;
use olap_common::{EntityKind, Error};
use olap_engine::{CancellationToken, Process, Server};
use std::time::{Duration, Instant};

/// Writes Cost = 1 for every leaf region and month
struct LoadCosts;

#[async_trait]
impl Process for LoadCosts {
    fn name(&self) -> &str {
        "load_costs"
    }

    async fn run(&self, server: &Server, cancel: CancellationToken) -> anyhow::Result<()> {
        for region in ["North", "South"] {
            for month in ["Jan", "Feb", "Mar", "Apr"] {
                server.put(&cancel, 1.0, "Sales", &[region, month, "Cost"]).await?;
            }
        }
        Ok(())
    }
}

struct Sleeper;

#[async_trait]
impl Process for Sleeper {
    fn name(&self) -> &str {
        "sleeper"
    }

    async fn run(&self, _server: &Server, _cancel: CancellationToken) -> anyhow::Result<()> {
        // Ignores its token on purpose
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

struct Failing;

#[async_trait]
impl Process for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    async fn run(&self, _server: &Server, _cancel: CancellationToken) -> anyhow::Result<()> {
        anyhow::bail!("source file missing")
    }
}

/// Fails with an engine error from a write to a consolidated cell
struct BadWrite;

#[async_trait]
impl Process for BadWrite {
    fn name(&self) -> &str {
        "bad_write"
    }

    async fn run(&self, server: &Server, cancel: CancellationToken) -> anyhow::Result<()> {
        server.put(&cancel, 1.0, "Sales", &["World", "Jan", "Cost"]).await?;
        Ok(())
    }
}

/// Stops early through an engine call made with an already cancelled token
struct SelfCancelling;

#[async_trait]
impl Process for SelfCancelling {
    fn name(&self) -> &str {
        "self_cancelling"
    }

    async fn run(&self, server: &Server, _cancel: CancellationToken) -> anyhow::Result<()> {
        let stop = CancellationToken::new();
        stop.cancel();
        server.get(&stop, "Sales", &["North", "Jan", "Cost"]).await?;
        Ok(())
    }
}

#[tokio::test]
async fn test_process_writes_cells() {
    let server = sales_server().await;
    server.add_process(LoadCosts).unwrap();

    let cancel = token();
    server.execute_process("load_costs", &cancel).await.unwrap();

    assert_eq!(
        server.get(&cancel, "Sales", &["World", "Year", "Cost"]).await.unwrap(),
        1.0 * 4.0 + 2.0 * 4.0
    );
}

#[tokio::test]
async fn test_registry_errors() {
    let server = sales_server().await;
    server.add_process(LoadCosts).unwrap();
    server.add_process(Failing).unwrap();

    let err = server.add_process(LoadCosts).unwrap_err();
    assert!(err.is_already_exists(EntityKind::Process));

    let err = server.execute_process("missing", &token()).await.unwrap_err();
    assert!(err.is_not_found(EntityKind::Process));

    assert_eq!(server.processes().names(), vec!["failing", "load_costs"]);
}

#[tokio::test]
async fn test_cancellation_stops_waiting_promptly() {
    let server = sales_server().await;
    server.add_process(Sleeper).unwrap();

    let cancel = token();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = server.execute_process("sleeper", &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_already_cancelled_token_skips_run() {
    let server = sales_server().await;
    server.add_process(LoadCosts).unwrap();
    let mut events = server.subscribe();

    let cancel = token();
    cancel.cancel();
    let err = server.execute_process("load_costs", &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(events.try_recv().is_err());
    assert!(server
        .get_cell("Sales", &["North", "Jan", "Cost"])
        .await
        .unwrap_err()
        .is_not_found(EntityKind::Cell));
}

#[tokio::test]
async fn test_body_failures_map_to_process_error() {
    let server = sales_server().await;
    server.add_process(Failing).unwrap();
    server.add_process(BadWrite).unwrap();

    match server.execute_process("failing", &token()).await.unwrap_err() {
        Error::Process { name, message } => {
            assert_eq!(name, "failing");
            assert!(message.contains("source file missing"), "{}", message);
        }
        other => panic!("expected Process error, got {:?}", other),
    }

    match server.execute_process("bad_write", &token()).await.unwrap_err() {
        Error::Process { name, message } => {
            assert_eq!(name, "bad_write");
            assert!(message.contains("consolidated"), "{}", message);
        }
        other => panic!("expected Process error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_engine_cancellation_inside_body_is_cancelled() {
    let server = sales_server().await;
    server.add_process(SelfCancelling).unwrap();

    let err = server.execute_process("self_cancelling", &token()).await.unwrap_err();
    assert!(err.is_cancelled(), "{:?}", err);
}

#[tokio::test]
async fn test_start_and_finish_events() {
    let server = sales_server().await;
    server.add_process(Failing).unwrap();
    let mut events = server.subscribe();

    let _ = server.execute_process("failing", &token()).await;

    let started = events.recv().await.unwrap();
    let finished = events.recv().await.unwrap();
    match (started, finished) {
        (
            OlapEvent::ProcessStarted { name, run_id, .. },
            OlapEvent::ProcessFinished {
                name: finished_name,
                run_id: finished_id,
                success,
                ..
            },
        ) => {
            assert_eq!(name, "failing");
            assert_eq!(finished_name, "failing");
            assert_eq!(run_id, finished_id);
            assert!(!success);
        }
        other => panic!("unexpected events {:?}", other),
    }
}
