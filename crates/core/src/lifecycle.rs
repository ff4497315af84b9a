//! Start/stop supervision for long-running components.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{component} failed to start: {reason}")]
    StartFailed { component: String, reason: String },
}

/// A component with a managed background lifecycle.
///
/// `stop` must be safe to call while work is in flight and must be a no-op
/// when the component is not running.
#[async_trait]
pub trait Managed: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> Result<(), LifecycleError>;

    async fn stop(&self);
}

/// Starts components in registration order and stops them in reverse.
#[derive(Default)]
pub struct Lifecycle {
    components: Vec<Arc<dyn Managed>>,
    started: Mutex<Vec<Arc<dyn Managed>>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, component: Arc<dyn Managed>) {
        self.components.push(component);
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Starts every component. On failure, the components already started
    /// are stopped again before the error is returned.
    pub async fn start_all(&self) -> Result<(), LifecycleError> {
        let mut started = self.started.lock().await;
        for component in &self.components {
            if let Err(e) = component.start().await {
                error!(component = component.name(), error = %e, "Startup failed");
                while let Some(running) = started.pop() {
                    running.stop().await;
                }
                return Err(e);
            }
            info!(component = component.name(), "Started");
            started.push(Arc::clone(component));
        }
        Ok(())
    }

    pub async fn stop_all(&self) {
        let mut started = self.started.lock().await;
        while let Some(component) = started.pop() {
            component.stop().await;
            info!(component = component.name(), "Stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct TestComponent {
        name: String,
        fail: bool,
        log: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl Managed for TestComponent {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(&self) -> Result<(), LifecycleError> {
            if self.fail {
                return Err(LifecycleError::StartFailed {
                    component: self.name.clone(),
                    reason: "boom".to_string(),
                });
            }
            self.log.lock().unwrap().push(format!("start {}", self.name));
            Ok(())
        }

        async fn stop(&self) {
            self.log.lock().unwrap().push(format!("stop {}", self.name));
        }
    }

    fn component(name: &str, fail: bool, log: &Arc<StdMutex<Vec<String>>>) -> Arc<dyn Managed> {
        Arc::new(TestComponent {
            name: name.to_string(),
            fail,
            log: Arc::clone(log),
        })
    }

    #[tokio::test]
    async fn test_stops_in_reverse_order() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let mut lifecycle = Lifecycle::new();
        lifecycle.register(component("a", false, &log));
        lifecycle.register(component("b", false, &log));

        lifecycle.start_all().await.unwrap();
        lifecycle.stop_all().await;
        lifecycle.stop_all().await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["start a", "start b", "stop b", "stop a"]
        );
    }

    #[tokio::test]
    async fn test_failed_start_unwinds() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let mut lifecycle = Lifecycle::new();
        lifecycle.register(component("a", false, &log));
        lifecycle.register(component("b", true, &log));
        lifecycle.register(component("c", false, &log));

        assert!(lifecycle.start_all().await.is_err());
        assert_eq!(*log.lock().unwrap(), vec!["start a", "stop a"]);
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let mut lifecycle = Lifecycle::new();
        lifecycle.register(component("a", false, &log));

        tokio_test::block_on(lifecycle.stop_all());
        assert_eq!(lifecycle.len(), 1);
        assert!(log.lock().unwrap().is_empty());
    }
}
