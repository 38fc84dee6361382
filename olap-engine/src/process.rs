//! Named processes
//!
//! A process is an opaque unit of batch logic run against the server. The
//! runner only maps names to processes; execution and cancellation live in
//! `Server::execute_process`.

use crate::server::Server;
use async_trait::async_trait;
use olap_common::{EntityKind, Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Process: Send + Sync {
    /// Registry key
    fn name(&self) -> &str;

    /// Run to completion
    ///
    /// `cancel` fires when the caller cancels; the server stops waiting at
    /// that point regardless of whether the body notices.
    async fn run(&self, server: &Server, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// Name -> process registry
#[derive(Default)]
pub struct ProcessRunner {
    processes: RwLock<HashMap<String, Arc<dyn Process>>>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with `AlreadyExists(Process)` when the name is taken
    pub fn add(&self, process: Arc<dyn Process>) -> Result<()> {
        let mut processes = self
            .processes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let name = process.name().to_string();
        if processes.contains_key(&name) {
            return Err(Error::already_exists(EntityKind::Process, name));
        }
        processes.insert(name, process);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Process>> {
        let processes = self
            .processes
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        processes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(EntityKind::Process, name))
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let processes = self
            .processes
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = processes.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Map a process body's failure onto the engine taxonomy
///
/// A body that failed because an engine call it made was cancelled reports
/// `Cancelled`; anything else becomes `Error::Process`.
pub(crate) fn process_error(name: &str, err: anyhow::Error) -> Error {
    match err.downcast::<Error>() {
        Ok(Error::Cancelled) => Error::Cancelled,
        Ok(other) => Error::Process {
            name: name.to_string(),
            message: other.to_string(),
        },
        Err(err) => Error::Process {
            name: name.to_string(),
            message: format!("{:#}", err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(&'static str);

    #[async_trait]
    impl Process for Noop {
        fn name(&self) -> &str {
            self.0
        }

        async fn run(&self, _server: &Server, _cancel: CancellationToken) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let runner = ProcessRunner::new();
        runner.add(Arc::new(Noop("load"))).unwrap();
        let err = runner.add(Arc::new(Noop("load"))).unwrap_err();
        assert!(err.is_already_exists(EntityKind::Process));
    }

    #[test]
    fn test_unknown_name() {
        let runner = ProcessRunner::new();
        let err = runner.get("missing").err().unwrap();
        assert!(err.is_not_found(EntityKind::Process));
    }

    #[test]
    fn test_names_sorted() {
        let runner = ProcessRunner::new();
        runner.add(Arc::new(Noop("b"))).unwrap();
        runner.add(Arc::new(Noop("a"))).unwrap();
        assert_eq!(runner.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_cancelled_engine_error_maps_to_cancelled() {
        let err = process_error("p", anyhow::Error::new(Error::Cancelled));
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_other_failures_wrap_with_name() {
        let err = process_error("p", anyhow::anyhow!("bad input"));
        match err {
            Error::Process { name, message } => {
                assert_eq!(name, "p");
                assert_eq!(message, "bad input");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
