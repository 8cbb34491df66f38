//! Startup and teardown of the webhook subsystem.

use std::fmt;
use std::sync::Arc;

use super::retry::with_timeout_retry;
use super::{LifecycleState, StartupCancel};
use crate::config::WebhookSettings;
use crate::server::{BoundReceiver, WebhookReceiver};
use crate::storage::EventStore;
use crate::subscription::{SubscriptionHandle, SubscriptionProvider, TriggerKind, DEFAULT_TRIGGERS};
use crate::tunnel::{TunnelHandle, TunnelProvider};
use crate::utilities::errors::{LifecycleError, SubscriptionError, TunnelError};

/// One compensating action of shutdown, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeardownStep {
    DeleteSubscription,
    CloseTunnel,
    CloseReceiver,
    CloseStore,
    DeleteStore,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DeleteSubscription => "delete subscription",
            Self::CloseTunnel => "close tunnel",
            Self::CloseReceiver => "close webhook receiver",
            Self::CloseStore => "close event store",
            Self::DeleteStore => "delete event store",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    /// The resource was never acquired.
    Skipped,
    Failed(String),
}

/// What shutdown did, step by step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub steps: Vec<(TeardownStep, StepOutcome)>,
}

impl ShutdownReport {
    pub fn outcome(&self, step: TeardownStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    /// Whether no step failed.
    pub fn is_clean(&self) -> bool {
        self.steps
            .iter()
            .all(|(_, outcome)| !matches!(outcome, StepOutcome::Failed(_)))
    }

    fn record(&mut self, step: TeardownStep, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Done => log::info!("Shutdown: {} done", step),
            StepOutcome::Skipped => log::debug!("Shutdown: {} skipped", step),
            StepOutcome::Failed(reason) => log::error!("Shutdown: {} failed: {}", step, reason),
        }
        self.steps.push((step, outcome));
    }
}

/// Owns every resource of the webhook subsystem.
pub struct LifecycleCoordinator {
    settings: WebhookSettings,
    store: Arc<EventStore>,
    tunnels: Arc<dyn TunnelProvider>,
    subscriptions: Arc<dyn SubscriptionProvider>,
    triggers: Vec<TriggerKind>,
    cancel: StartupCancel,
    state: LifecycleState,
    receiver: Option<BoundReceiver>,
    tunnel: Option<TunnelHandle>,
    subscription: Option<SubscriptionHandle>,
}

impl LifecycleCoordinator {
    pub fn new(
        settings: WebhookSettings,
        store: Arc<EventStore>,
        tunnels: Arc<dyn TunnelProvider>,
        subscriptions: Arc<dyn SubscriptionProvider>,
    ) -> Self {
        Self {
            settings,
            store,
            tunnels,
            subscriptions,
            triggers: DEFAULT_TRIGGERS.to_vec(),
            cancel: StartupCancel::new(),
            state: LifecycleState::Idle,
            receiver: None,
            tunnel: None,
            subscription: None,
        }
    }

    /// Handle that stops [`start`](Self::start) after its current step.
    /// Cancel before taking the coordinator for shutdown, then let the
    /// startup task finish.
    pub fn cancel_handle(&self) -> StartupCancel {
        self.cancel.clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn receiver_port(&self) -> Option<u16> {
        self.receiver.as_ref().map(BoundReceiver::port)
    }

    pub fn tunnel(&self) -> Option<&TunnelHandle> {
        self.tunnel.as_ref()
    }

    pub fn subscription(&self) -> Option<&SubscriptionHandle> {
        self.subscription.as_ref()
    }

    /// Bring the subsystem up as far as configuration and the remote
    /// services allow. Returns the state reached.
    ///
    /// Only a receiver bind failure is an error; a missing credential, an
    /// unavailable tunnel or subscription, or a cancellation leaves the
    /// coordinator at the last state it reached.
    pub async fn start(&mut self) -> Result<LifecycleState, LifecycleError> {
        if self.state != LifecycleState::Idle {
            return Err(LifecycleError::AlreadyStarted(self.state.to_string()));
        }

        let receiver = WebhookReceiver::bind(Arc::clone(&self.store)).await?;
        let port = receiver.port();
        self.receiver = Some(receiver);
        self.state = LifecycleState::ReceiverBound;

        if self.stop_requested() {
            return Ok(self.state);
        }
        if !self.settings.is_complete() {
            log::warn!(
                "Webhook subsystem inert, missing: {}",
                self.settings.missing_parts().join(", ")
            );
            return Ok(self.state);
        }

        let tunnels = Arc::clone(&self.tunnels);
        let opened = with_timeout_retry(
            "Tunnel negotiation",
            self.settings.tunnel_timeout,
            &self.cancel,
            || tunnels.open(port),
            TunnelError::Timeout,
        )
        .await;
        let tunnel = match opened {
            Ok(tunnel) => tunnel,
            Err(e) => {
                log::error!("Webhook subsystem inert, tunnel unavailable: {}", e);
                return Ok(self.state);
            }
        };
        let public_url = tunnel.public_url.clone();
        self.tunnel = Some(tunnel);
        self.state = LifecycleState::TunnelOpen;
        if self.stop_requested() {
            return Ok(self.state);
        }

        let subscriptions = Arc::clone(&self.subscriptions);
        let triggers = self.triggers.clone();
        let created = with_timeout_retry(
            "Webhook subscription",
            self.settings.subscription_timeout,
            &self.cancel,
            || subscriptions.create(&public_url, &triggers),
            SubscriptionError::Timeout,
        )
        .await;
        match created {
            Ok(subscription) => {
                log::info!(
                    "Webhook subscription {} active for {}",
                    subscription.subscription_id,
                    public_url
                );
                self.subscription = Some(subscription);
                self.state = LifecycleState::SubscriptionActive;
            }
            Err(e) => {
                log::error!("Webhook subscription failed, tunnel left unused: {}", e);
            }
        }
        Ok(self.state)
    }

    fn stop_requested(&self) -> bool {
        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            log::info!("Webhook startup cancelled at {}", self.state);
        }
        cancelled
    }

    /// Release every resource in reverse order of acquisition.
    ///
    /// Each step runs once whatever the outcome of the previous ones. A
    /// second call does nothing and returns an empty report.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        if self.state == LifecycleState::Terminated {
            return report;
        }
        log::info!("Shutting down webhook subsystem (state: {})", self.state);
        self.state = LifecycleState::ShuttingDown;

        let outcome = match self.subscription.take() {
            None => StepOutcome::Skipped,
            Some(subscription) => {
                let timeout = self.settings.subscription_timeout;
                match tokio::time::timeout(timeout, self.subscriptions.delete(&subscription)).await {
                    Ok(Ok(())) => StepOutcome::Done,
                    Ok(Err(e)) => StepOutcome::Failed(e.to_string()),
                    Err(_) => StepOutcome::Failed(
                        SubscriptionError::Timeout(timeout.as_secs()).to_string(),
                    ),
                }
            }
        };
        report.record(TeardownStep::DeleteSubscription, outcome);

        let outcome = match self.tunnel.take() {
            None => StepOutcome::Skipped,
            Some(tunnel) => match self.tunnels.close(&tunnel).await {
                Ok(()) => StepOutcome::Done,
                Err(e) => StepOutcome::Failed(e.to_string()),
            },
        };
        report.record(TeardownStep::CloseTunnel, outcome);

        let outcome = match self.receiver.take() {
            None => StepOutcome::Skipped,
            Some(mut receiver) => match receiver.close().await {
                Ok(()) => StepOutcome::Done,
                Err(e) => StepOutcome::Failed(e.to_string()),
            },
        };
        report.record(TeardownStep::CloseReceiver, outcome);

        let outcome = match self.store.close() {
            Ok(()) => StepOutcome::Done,
            Err(e) => StepOutcome::Failed(e.to_string()),
        };
        report.record(TeardownStep::CloseStore, outcome);

        let outcome = match self.store.destroy() {
            Ok(()) => StepOutcome::Done,
            Err(e) => StepOutcome::Failed(e.to_string()),
        };
        report.record(TeardownStep::DeleteStore, outcome);

        self.state = LifecycleState::Terminated;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    use crate::capabilities::CapabilityRegistry;
    use crate::config::{ConfigGroup, MapEnvironment, PlatformCredentials};
    use crate::mcp::dispatcher::ToolDispatcher;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct FakeTunnel {
        journal: Journal,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl TunnelProvider for FakeTunnel {
        async fn open(&self, local_port: u16) -> Result<TunnelHandle, TunnelError> {
            self.journal.lock().push("tunnel.open".to_string());
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(TunnelError::Unavailable("no endpoint".to_string()));
            }
            Ok(TunnelHandle {
                public_url: "https://fake.tunnel".to_string(),
                local_port,
            })
        }

        async fn close(&self, _handle: &TunnelHandle) -> Result<(), TunnelError> {
            self.journal.lock().push("tunnel.close".to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSubscriptions {
        journal: Journal,
        fail_create: bool,
        fail_delete: bool,
        stalls_left: AtomicU32,
        create_delay: Duration,
    }

    #[async_trait]
    impl SubscriptionProvider for FakeSubscriptions {
        async fn create(
            &self,
            public_url: &str,
            triggers: &[TriggerKind],
        ) -> Result<SubscriptionHandle, SubscriptionError> {
            self.journal
                .lock()
                .push(format!("subscription.create {} {}", public_url, triggers.len()));
            if self
                .stalls_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if !self.create_delay.is_zero() {
                tokio::time::sleep(self.create_delay).await;
            }
            if self.fail_create {
                return Err(SubscriptionError::Status {
                    status: 500,
                    body: "down".to_string(),
                });
            }
            Ok(SubscriptionHandle {
                subscription_id: "WH1".to_string(),
            })
        }

        async fn delete(&self, handle: &SubscriptionHandle) -> Result<(), SubscriptionError> {
            self.journal
                .lock()
                .push(format!("subscription.delete {}", handle.subscription_id));
            if self.fail_delete {
                return Err(SubscriptionError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(())
        }
    }

    fn complete_settings() -> WebhookSettings {
        WebhookSettings {
            tunnel_token: Some("tok".to_string()),
            credentials: Some(PlatformCredentials {
                project_id: "P1".to_string(),
                key_id: "kid".to_string(),
                key_secret: "secret".to_string(),
            }),
            app_id: Some("APP1".to_string()),
            region: "us".to_string(),
            tunnel_cli: "ngrok".to_string(),
            tunnel_timeout: Duration::from_secs(2),
            subscription_timeout: Duration::from_millis(200),
        }
    }

    struct Harness {
        _dir: TempDir,
        store_path: std::path::PathBuf,
        journal: Journal,
        coordinator: LifecycleCoordinator,
    }

    fn harness(
        settings: WebhookSettings,
        tunnel_failures: u32,
        subscriptions: FakeSubscriptions,
    ) -> Harness {
        let dir = TempDir::new().unwrap();
        let store_path = dir.path().join("webhooks.db");
        let store = Arc::new(EventStore::open(&store_path).unwrap());
        let journal = Arc::clone(&subscriptions.journal);
        let tunnel = FakeTunnel {
            journal: Arc::clone(&journal),
            failures_left: AtomicU32::new(tunnel_failures),
        };
        let coordinator =
            LifecycleCoordinator::new(settings, store, Arc::new(tunnel), Arc::new(subscriptions));
        Harness {
            _dir: dir,
            store_path,
            journal,
            coordinator,
        }
    }

    const TEARDOWN_ORDER: [TeardownStep; 5] = [
        TeardownStep::DeleteSubscription,
        TeardownStep::CloseTunnel,
        TeardownStep::CloseReceiver,
        TeardownStep::CloseStore,
        TeardownStep::DeleteStore,
    ];

    #[tokio::test]
    async fn test_full_startup_and_reverse_teardown() {
        let mut h = harness(complete_settings(), 0, FakeSubscriptions::default());

        let state = h.coordinator.start().await.unwrap();
        assert_eq!(state, LifecycleState::SubscriptionActive);
        assert_eq!(h.coordinator.subscription().unwrap().subscription_id, "WH1");
        assert_eq!(
            h.coordinator.tunnel().unwrap().local_port,
            h.coordinator.receiver_port().unwrap()
        );

        let report = h.coordinator.shutdown().await;
        let steps: Vec<_> = report.steps.iter().map(|(s, _)| *s).collect();
        assert_eq!(steps, TEARDOWN_ORDER);
        assert!(report.is_clean());
        assert_eq!(
            h.journal.lock().clone(),
            vec![
                "tunnel.open",
                "subscription.create https://fake.tunnel 2",
                "subscription.delete WH1",
                "tunnel.close",
            ]
        );
        assert!(!h.store_path.exists());
        assert_eq!(h.coordinator.state(), LifecycleState::Terminated);
    }

    #[tokio::test]
    async fn test_failed_delete_does_not_stop_teardown() {
        let subscriptions = FakeSubscriptions {
            fail_delete: true,
            ..Default::default()
        };
        let mut h = harness(complete_settings(), 0, subscriptions);
        h.coordinator.start().await.unwrap();

        let report = h.coordinator.shutdown().await;
        assert!(matches!(
            report.outcome(TeardownStep::DeleteSubscription),
            Some(StepOutcome::Failed(_))
        ));
        for step in &TEARDOWN_ORDER[1..] {
            assert_eq!(report.outcome(*step), Some(&StepOutcome::Done), "{}", step);
        }
        assert_eq!(h.journal.lock().last().map(String::as_str), Some("tunnel.close"));
        assert!(!h.store_path.exists());
    }

    #[tokio::test]
    async fn test_missing_tunnel_credential_stalls_at_receiver_bound() {
        let env = MapEnvironment::new()
            .with_group(ConfigGroup::Conversation)
            .with_group(ConfigGroup::WebhookTarget)
            .with_group(ConfigGroup::Voice);
        let mut settings = WebhookSettings::from_env(&env);
        settings.tunnel_timeout = Duration::from_secs(1);
        let mut h = harness(settings, 0, FakeSubscriptions::default());

        assert_eq!(
            h.coordinator.start().await.unwrap(),
            LifecycleState::ReceiverBound
        );
        assert!(h.coordinator.receiver_port().is_some());
        assert!(h.journal.lock().is_empty());

        let registry = CapabilityRegistry::with_builtin();
        let mut dispatcher = ToolDispatcher::new();
        let table = registry.register(&Vec::<String>::new(), &env, &mut dispatcher);
        assert!(table.get("send-text-message").unwrap().is_enabled());
        assert!(table.get("tts-callout").unwrap().is_enabled());
        assert!(!table.get("get-message-events").unwrap().is_enabled());

        let report = h.coordinator.shutdown().await;
        assert_eq!(
            report.outcome(TeardownStep::DeleteSubscription),
            Some(&StepOutcome::Skipped)
        );
        assert_eq!(
            report.outcome(TeardownStep::CloseTunnel),
            Some(&StepOutcome::Skipped)
        );
        assert_eq!(
            report.outcome(TeardownStep::CloseReceiver),
            Some(&StepOutcome::Done)
        );
        assert!(!h.store_path.exists());
    }

    #[tokio::test]
    async fn test_tunnel_retried_once() {
        let mut h = harness(complete_settings(), 1, FakeSubscriptions::default());
        assert_eq!(
            h.coordinator.start().await.unwrap(),
            LifecycleState::SubscriptionActive
        );
        let opens = h
            .journal
            .lock()
            .iter()
            .filter(|e| *e == "tunnel.open")
            .count();
        assert_eq!(opens, 2);
        h.coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_tunnel_unavailable_stays_receiver_bound() {
        let mut h = harness(complete_settings(), 2, FakeSubscriptions::default());
        assert_eq!(
            h.coordinator.start().await.unwrap(),
            LifecycleState::ReceiverBound
        );
        assert!(h.coordinator.tunnel().is_none());
        h.coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_subscription_failure_stays_tunnel_open() {
        let subscriptions = FakeSubscriptions {
            fail_create: true,
            ..Default::default()
        };
        let mut h = harness(complete_settings(), 0, subscriptions);
        assert_eq!(
            h.coordinator.start().await.unwrap(),
            LifecycleState::TunnelOpen
        );

        let report = h.coordinator.shutdown().await;
        assert_eq!(
            report.outcome(TeardownStep::DeleteSubscription),
            Some(&StepOutcome::Skipped)
        );
        assert_eq!(
            report.outcome(TeardownStep::CloseTunnel),
            Some(&StepOutcome::Done)
        );
    }

    #[tokio::test]
    async fn test_hung_subscription_is_retried() {
        let subscriptions = FakeSubscriptions {
            stalls_left: AtomicU32::new(1),
            ..Default::default()
        };
        let mut h = harness(complete_settings(), 0, subscriptions);
        assert_eq!(
            h.coordinator.start().await.unwrap(),
            LifecycleState::SubscriptionActive
        );
        let creates = h
            .journal
            .lock()
            .iter()
            .filter(|e| e.starts_with("subscription.create"))
            .count();
        assert_eq!(creates, 2);
        h.coordinator.shutdown().await;
    }

    async fn wait_for_create(journal: &Journal) {
        while !journal
            .lock()
            .iter()
            .any(|e| e.starts_with("subscription.create"))
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_cancel_during_create_keeps_subscription_for_teardown() {
        let subscriptions = FakeSubscriptions {
            create_delay: Duration::from_millis(100),
            ..Default::default()
        };
        let h = harness(complete_settings(), 0, subscriptions);
        let journal = Arc::clone(&h.journal);
        let cancel = h.coordinator.cancel_handle();
        let coordinator = Arc::new(tokio::sync::Mutex::new(h.coordinator));

        let startup = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.lock().await.start().await })
        };
        wait_for_create(&journal).await;
        cancel.cancel();

        let state = startup.await.unwrap().unwrap();
        assert_eq!(state, LifecycleState::SubscriptionActive);

        let report = coordinator.lock().await.shutdown().await;
        assert_eq!(
            report.outcome(TeardownStep::DeleteSubscription),
            Some(&StepOutcome::Done)
        );
        assert!(journal
            .lock()
            .contains(&"subscription.delete WH1".to_string()));
        assert!(!h.store_path.exists());
    }

    #[tokio::test]
    async fn test_cancel_during_hung_create_skips_retry() {
        let subscriptions = FakeSubscriptions {
            stalls_left: AtomicU32::new(2),
            ..Default::default()
        };
        let h = harness(complete_settings(), 0, subscriptions);
        let journal = Arc::clone(&h.journal);
        let cancel = h.coordinator.cancel_handle();
        let coordinator = Arc::new(tokio::sync::Mutex::new(h.coordinator));

        let startup = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.lock().await.start().await })
        };
        wait_for_create(&journal).await;
        cancel.cancel();

        let state = startup.await.unwrap().unwrap();
        assert_eq!(state, LifecycleState::TunnelOpen);
        let creates = journal
            .lock()
            .iter()
            .filter(|e| e.starts_with("subscription.create"))
            .count();
        assert_eq!(creates, 1);

        let report = coordinator.lock().await.shutdown().await;
        assert_eq!(
            report.outcome(TeardownStep::CloseTunnel),
            Some(&StepOutcome::Done)
        );
    }

    #[tokio::test]
    async fn test_cancel_before_start_stops_after_bind() {
        let mut h = harness(complete_settings(), 0, FakeSubscriptions::default());
        h.coordinator.cancel_handle().cancel();

        assert_eq!(
            h.coordinator.start().await.unwrap(),
            LifecycleState::ReceiverBound
        );
        assert!(h.journal.lock().is_empty());

        let report = h.coordinator.shutdown().await;
        assert_eq!(
            report.outcome(TeardownStep::CloseReceiver),
            Some(&StepOutcome::Done)
        );
    }

    #[tokio::test]
    async fn test_start_twice_and_shutdown_twice() {
        let mut h = harness(complete_settings(), 0, FakeSubscriptions::default());
        h.coordinator.start().await.unwrap();
        assert!(matches!(
            h.coordinator.start().await,
            Err(LifecycleError::AlreadyStarted(_))
        ));

        assert_eq!(h.coordinator.shutdown().await.steps.len(), 5);
        assert!(h.coordinator.shutdown().await.steps.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let mut h = harness(complete_settings(), 0, FakeSubscriptions::default());
        let report = h.coordinator.shutdown().await;
        assert_eq!(
            report.outcome(TeardownStep::CloseReceiver),
            Some(&StepOutcome::Skipped)
        );
        assert!(report.is_clean());
        assert!(!h.store_path.exists());
    }
}
