//! Device push-token registration tied to the session lifecycle.
//!
//! ```text
//! Unregistered -> Registering -> Registered -> Unregistering -> Unregistered
//! ```
//!
//! Registration failures never reach the caller: the coordinator logs them and
//! falls back to `Unregistered`. Both backend calls are bounded by timeouts so
//! a slow backend cannot hold up login or logout.
//!
//! The device is paired with at most one session. Every session start and
//! teardown bumps a generation counter; a registration that finishes after its
//! generation was superseded undoes its own pairing instead of recording it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use crate::backend::BackendApi;
use crate::defaults::SessionConfig;
use crate::error::OrderKitError;

/// Registration state of this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushState {
    /// No device token is registered with the backend.
    Unregistered,
    /// Registration is in flight.
    Registering,
    /// The backend holds `device_token` for the current session.
    Registered {
        /// Platform push token.
        device_token: String,
    },
    /// Unregistration is in flight.
    Unregistering,
}

/// Platform push service.
#[async_trait]
pub trait PushPlatform: Send + Sync {
    /// Current device push token, requesting permission if needed.
    async fn device_token(&self) -> Result<String, OrderKitError>;
}

#[derive(Debug)]
struct Pairing {
    state: PushState,
    /// Session token the current registration belongs to.
    session_token: Option<String>,
    generation: u64,
}

/// Drives [`PushState`] in response to session events.
pub struct PushRegistrationCoordinator {
    platform: Arc<dyn PushPlatform>,
    backend: Arc<dyn BackendApi>,
    register_timeout: Duration,
    unregister_timeout: Duration,
    pairing: Mutex<Pairing>,
}

impl std::fmt::Debug for PushRegistrationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushRegistrationCoordinator")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl PushRegistrationCoordinator {
    /// Creates a coordinator in the `Unregistered` state.
    #[must_use]
    pub fn new(
        platform: Arc<dyn PushPlatform>,
        backend: Arc<dyn BackendApi>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            platform,
            backend,
            register_timeout: config.push_register_timeout,
            unregister_timeout: config.push_unregister_timeout,
            pairing: Mutex::new(Pairing {
                state: PushState::Unregistered,
                session_token: None,
                generation: 0,
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PushState {
        self.lock().state.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Pairing> {
        self.pairing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers this device for the session authenticated by `token`.
    ///
    /// A device still paired with an earlier session is unregistered from it
    /// first. Re-announcing the already paired session and a registration
    /// already in flight are no-ops. Returns the resulting state.
    pub async fn on_session_established(&self, token: &str) -> PushState {
        let (generation, previous) = {
            let mut guard = self.lock();
            let pairing = &mut *guard;
            let previous = match &pairing.state {
                PushState::Registering => {
                    log::debug!("push registration already in flight");
                    return pairing.state.clone();
                }
                PushState::Registered { .. }
                    if pairing.session_token.as_deref() == Some(token) =>
                {
                    log::debug!("push already registered for this session");
                    return pairing.state.clone();
                }
                PushState::Registered { .. } => pairing.session_token.take(),
                PushState::Unregistered | PushState::Unregistering => None,
            };
            pairing.generation += 1;
            pairing.state = PushState::Registering;
            pairing.session_token = Some(token.to_string());
            (pairing.generation, previous)
        };

        if let Some(previous) = previous {
            log::info!("re-pairing push token with a new session");
            self.unregister(&previous).await;
        }

        let registration = async {
            let device_token = self.platform.device_token().await?;
            self.backend
                .register_push_token(token, &device_token)
                .await?;
            Ok::<_, OrderKitError>(device_token)
        };
        let registered = match timeout(self.register_timeout, registration).await {
            Ok(Ok(device_token)) => Some(device_token),
            Ok(Err(err)) => {
                log::warn!("push registration failed: {err}");
                None
            }
            Err(_) => {
                log::warn!(
                    "push registration timed out after {:?}",
                    self.register_timeout
                );
                None
            }
        };

        let superseded = {
            let mut pairing = self.lock();
            if pairing.generation == generation {
                if let Some(device_token) = registered {
                    log::info!("push token registered");
                    pairing.state = PushState::Registered { device_token };
                } else {
                    pairing.session_token = None;
                    pairing.state = PushState::Unregistered;
                }
                return pairing.state.clone();
            }
            registered.is_some()
        };

        if superseded {
            log::info!("session ended during push registration, undoing it");
            self.unregister(token).await;
        }
        self.state()
    }

    /// Unregisters this device as the session ends.
    ///
    /// From `Registered` the backend is asked to drop the token; a
    /// registration still in flight is cancelled and undoes itself once it
    /// completes. Ends `Unregistered` whatever the backend answers, unless a
    /// new session started meanwhile. Without a `token` the token of the
    /// paired session is used.
    pub async fn on_session_teardown(&self, token: Option<&str>) -> PushState {
        let (generation, paired_token) = {
            let mut guard = self.lock();
            let pairing = &mut *guard;
            match pairing.state {
                PushState::Registered { .. } => {}
                PushState::Registering => {
                    log::info!("push registration cancelled by session teardown");
                    pairing.generation += 1;
                    pairing.state = PushState::Unregistered;
                    pairing.session_token = None;
                    return PushState::Unregistered;
                }
                PushState::Unregistered | PushState::Unregistering => {
                    log::debug!("push unregistration skipped in state {:?}", pairing.state);
                    return pairing.state.clone();
                }
            }
            pairing.generation += 1;
            pairing.state = PushState::Unregistering;
            (pairing.generation, pairing.session_token.take())
        };

        match token.or(paired_token.as_deref()) {
            Some(token) => self.unregister(token).await,
            None => log::warn!("no session token to unregister push token with"),
        }

        let mut pairing = self.lock();
        if pairing.generation == generation {
            pairing.state = PushState::Unregistered;
        }
        pairing.state.clone()
    }

    /// Re-registers after the platform rotated the device token.
    ///
    /// Only acts from `Registered`. On failure the previously registered token
    /// stays recorded.
    pub async fn on_device_token_refreshed(
        &self,
        token: &str,
        device_token: String,
    ) -> PushState {
        let generation = {
            let pairing = self.lock();
            match &pairing.state {
                PushState::Registered {
                    device_token: current,
                } if *current != device_token => pairing.generation,
                other => return other.clone(),
            }
        };

        match timeout(
            self.register_timeout,
            self.backend.register_push_token(token, &device_token),
        )
        .await
        {
            Ok(Ok(())) => {
                log::info!("rotated push token registered");
                let mut pairing = self.lock();
                // A teardown or new session that ran meanwhile wins.
                if pairing.generation == generation {
                    pairing.state = PushState::Registered { device_token };
                }
                pairing.state.clone()
            }
            Ok(Err(err)) => {
                log::warn!("rotated push token registration failed: {err}");
                self.state()
            }
            Err(_) => {
                log::warn!("rotated push token registration timed out");
                self.state()
            }
        }
    }

    /// Best-effort, time-bounded removal of the device token for `token`.
    async fn unregister(&self, token: &str) {
        match timeout(
            self.unregister_timeout,
            self.backend.unregister_push_token(token),
        )
        .await
        {
            Ok(Ok(())) => log::info!("push token unregistered"),
            Ok(Err(err)) => log::warn!("push unregistration failed: {err}"),
            Err(_) => log::warn!(
                "push unregistration timed out after {:?}",
                self.unregister_timeout
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{network_error, MockBackend, MockPushPlatform};

    fn coordinator(
        platform: Arc<MockPushPlatform>,
        backend: Arc<MockBackend>,
    ) -> PushRegistrationCoordinator {
        let config = SessionConfig {
            push_register_timeout: Duration::from_millis(200),
            push_unregister_timeout: Duration::from_millis(50),
            ..SessionConfig::default()
        };
        PushRegistrationCoordinator::new(platform, backend, &config)
    }

    #[tokio::test]
    async fn test_registration_success() {
        let backend = Arc::new(MockBackend::default());
        let push = coordinator(Arc::new(MockPushPlatform::default()), Arc::clone(&backend));

        let state = push.on_session_established("token-1").await;
        assert_eq!(
            state,
            PushState::Registered {
                device_token: "device-1".to_string()
            }
        );
        assert_eq!(
            backend.calls(),
            vec![("update-fcm-token", "token-1/device-1".to_string())]
        );

        // Already registered: no second call.
        push.on_session_established("token-1").await;
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_registration_failure_ends_unregistered() {
        let backend = Arc::new(MockBackend::default());
        MockBackend::script(&backend.register_push, vec![Err(network_error())]);
        let push = coordinator(Arc::new(MockPushPlatform::default()), backend);

        assert_eq!(
            push.on_session_established("token-1").await,
            PushState::Unregistered
        );
    }

    #[tokio::test]
    async fn test_missing_device_token_ends_unregistered() {
        let platform = Arc::new(MockPushPlatform::default());
        *platform.device_token.lock().unwrap() = Err("permission denied".to_string());
        let backend = Arc::new(MockBackend::default());
        let push = coordinator(platform, Arc::clone(&backend));

        assert_eq!(
            push.on_session_established("token-1").await,
            PushState::Unregistered
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_teardown_timeout_still_ends_unregistered() {
        let backend = Arc::new(MockBackend::default());
        *backend.unregister_delay.lock().unwrap() = Some(Duration::from_secs(5));
        let push = coordinator(Arc::new(MockPushPlatform::default()), Arc::clone(&backend));
        push.on_session_established("token-1").await;

        let state = push.on_session_teardown(Some("token-1")).await;
        assert_eq!(state, PushState::Unregistered);
        assert_eq!(push.state(), PushState::Unregistered);
        assert_eq!(backend.endpoints(), vec!["update-fcm-token", "remove-fcm-token"]);
    }

    #[tokio::test]
    async fn test_teardown_failure_ends_unregistered() {
        let backend = Arc::new(MockBackend::default());
        MockBackend::script(&backend.unregister_push, vec![Err(network_error())]);
        let push = coordinator(Arc::new(MockPushPlatform::default()), backend);
        push.on_session_established("token-1").await;

        assert_eq!(
            push.on_session_teardown(Some("token-1")).await,
            PushState::Unregistered
        );
    }

    #[tokio::test]
    async fn test_teardown_when_unregistered_is_noop() {
        let backend = Arc::new(MockBackend::default());
        let push = coordinator(Arc::new(MockPushPlatform::default()), Arc::clone(&backend));
        assert_eq!(
            push.on_session_teardown(Some("token-1")).await,
            PushState::Unregistered
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_device_token_rotation() {
        let backend = Arc::new(MockBackend::default());
        let push = coordinator(Arc::new(MockPushPlatform::default()), Arc::clone(&backend));

        // Ignored while unregistered.
        push.on_device_token_refreshed("token-1", "device-2".to_string())
            .await;
        assert!(backend.calls().is_empty());

        push.on_session_established("token-1").await;
        let state = push
            .on_device_token_refreshed("token-1", "device-2".to_string())
            .await;
        assert_eq!(
            state,
            PushState::Registered {
                device_token: "device-2".to_string()
            }
        );

        MockBackend::script(&backend.register_push, vec![Err(network_error())]);
        let state = push
            .on_device_token_refreshed("token-1", "device-3".to_string())
            .await;
        assert_eq!(
            state,
            PushState::Registered {
                device_token: "device-2".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_teardown_during_registration_leaves_device_unpaired() {
        let platform = Arc::new(MockPushPlatform::default());
        *platform.delay.lock().unwrap() = Some(Duration::from_millis(100));
        let backend = Arc::new(MockBackend::default());
        let push = coordinator(platform, Arc::clone(&backend));

        let (registered, torn_down) = tokio::join!(
            push.on_session_established("token-1"),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                push.on_session_teardown(Some("token-1")).await
            }
        );

        assert_eq!(torn_down, PushState::Unregistered);
        assert_eq!(registered, PushState::Unregistered);
        assert_eq!(push.state(), PushState::Unregistered);
        assert_eq!(
            backend.calls(),
            vec![
                ("update-fcm-token", "token-1/device-1".to_string()),
                ("remove-fcm-token", "token-1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_new_session_re_pairs_device() {
        let backend = Arc::new(MockBackend::default());
        let push = coordinator(Arc::new(MockPushPlatform::default()), Arc::clone(&backend));
        push.on_session_established("token-1").await;

        let state = push.on_session_established("token-2").await;
        assert_eq!(
            state,
            PushState::Registered {
                device_token: "device-1".to_string()
            }
        );
        assert_eq!(
            backend.calls(),
            vec![
                ("update-fcm-token", "token-1/device-1".to_string()),
                ("remove-fcm-token", "token-1".to_string()),
                ("update-fcm-token", "token-2/device-1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_teardown_without_token_uses_paired_session() {
        let backend = Arc::new(MockBackend::default());
        let push = coordinator(Arc::new(MockPushPlatform::default()), Arc::clone(&backend));
        push.on_session_established("token-1").await;

        assert_eq!(push.on_session_teardown(None).await, PushState::Unregistered);
        assert_eq!(
            backend.calls().last(),
            Some(&("remove-fcm-token", "token-1".to_string()))
        );
    }
}
