//! Single-flight credential refresh
//!
//! When a call fails with 401 it asks the coordinator for a fresh credential.
//! Exactly one caller per wave becomes the leader and runs the refresh; every
//! caller that fails while the refresh is in flight is parked in a FIFO queue
//! with a oneshot channel and its request. When the refresh settles:
//!
//! - success: the credential is saved, the queue is drained in order (each
//!   waiter gets its request back together with the new credential), then the
//!   leader resumes. A waiter is only resumed once the one before it has
//!   released its `DispatchTurn`, so replays start in queue order even on a
//!   multi-thread runtime
//! - failure: the store is cleared, the sink is notified once, and every
//!   waiter plus the leader is rejected with `RefreshFailed`
//!
//! The state flag, the queue and the store writes all happen under one tokio
//! Mutex, so nobody can slip into the queue after the drain started and nobody
//! can observe `Idle` while a refresh is running. The refresh itself runs in a
//! spawned task: the lock is not held across the network call, and a leader
//! that goes away cannot strand the waiters.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use credential_store::{Credential, CredentialStore};
use notify_sink::{NotificationSink, Severity};
use tokio::sync::{Mutex, MutexGuard, oneshot};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::telemetry;

/// Notice shown when the refresh fails and the user has to sign in again.
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired, please sign in again";

/// How long the drain waits for a resumed call to start its replay before
/// moving on to the next one.
pub const DISPATCH_TURN_TIMEOUT: Duration = Duration::from_secs(1);

/// Exchanges a refresh token for a new credential.
pub trait Refresher: Send + Sync {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Credential>> + Send + 'a>>;
}

/// Whether a refresh is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// A suspended call handed back with the credential to replay it with.
#[derive(Debug)]
pub struct Resumed<R> {
    pub request: R,
    pub credential: Credential,
    /// Release once the replay has been started; dropping it also releases.
    pub turn: DispatchTurn,
}

impl<R> Resumed<R> {
    /// Split into request and credential, releasing the turn.
    pub fn into_parts(self) -> (R, Credential) {
        self.turn.release();
        (self.request, self.credential)
    }
}

/// Ordering token for a resumed call. The next queued call is not resumed
/// until this one is released or dropped.
#[derive(Debug)]
pub struct DispatchTurn(Option<oneshot::Sender<()>>);

impl DispatchTurn {
    fn free() -> Self {
        Self(None)
    }

    pub fn release(mut self) {
        if let Some(started) = self.0.take() {
            let _ = started.send(());
        }
    }
}

struct PendingCall<R> {
    request: R,
    resume: oneshot::Sender<Result<Resumed<R>>>,
}

struct Inner<R> {
    state: RefreshState,
    pending: VecDeque<PendingCall<R>>,
}

enum Admission<R> {
    /// A refresh already completed since the caller's attempt
    Resume(Resumed<R>),
    /// Parked behind the running refresh
    Wait(oneshot::Receiver<Result<Resumed<R>>>),
    /// This caller runs the refresh
    Lead { request: R, refresh_token: String },
}

/// Owns the refresh state machine and the suspended-call queue.
///
/// `R` is whatever the caller needs back to replay its call; the pipeline
/// uses `PreparedRequest`.
pub struct RefreshCoordinator<R> {
    inner: Mutex<Inner<R>>,
    store: Arc<CredentialStore>,
    refresher: Arc<dyn Refresher>,
    sink: Arc<dyn NotificationSink>,
}

impl<R: Send + 'static> RefreshCoordinator<R> {
    pub fn new(
        store: Arc<CredentialStore>,
        refresher: Arc<dyn Refresher>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RefreshState::Idle,
                pending: VecDeque::new(),
            }),
            store,
            refresher,
            sink,
        }
    }

    /// Current credential, read inside the critical section so it never
    /// interleaves with a save or clear performed while settling a refresh.
    pub async fn credential(&self) -> Option<Credential> {
        let _inner = self.inner.lock().await;
        self.store.get().await
    }

    pub async fn state(&self) -> RefreshState {
        self.inner.lock().await.state
    }

    pub async fn is_refreshing(&self) -> bool {
        self.state().await == RefreshState::Refreshing
    }

    /// Number of calls parked behind the running refresh.
    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    /// Get a credential to replay `request` with after it failed with 401.
    ///
    /// `stale_access` is the access token the failed attempt carried. If the
    /// stored token already differs, a refresh finished in the meantime and
    /// the call resumes immediately without starting another one.
    ///
    /// Returns `Unauthorized` if there is no stored credential to refresh
    /// with, and `RefreshFailed` if the refresh this call waited on failed.
    pub async fn request_refresh(
        self: &Arc<Self>,
        stale_access: &str,
        request: R,
    ) -> Result<Resumed<R>> {
        let admission = {
            let mut inner = self.inner.lock().await;
            match inner.state {
                RefreshState::Refreshing => {
                    let (resume, resumed) = oneshot::channel();
                    inner.pending.push_back(PendingCall { request, resume });
                    let depth = inner.pending.len();
                    telemetry::set_pending(depth);
                    debug!(pending = depth, "refresh in flight, call suspended");
                    Admission::Wait(resumed)
                }
                RefreshState::Idle => match self.store.get().await {
                    None => {
                        return Err(Error::Unauthorized("no stored credential".into()));
                    }
                    Some(current) if current.access != stale_access => {
                        debug!("credential refreshed since the attempt, resuming without refresh");
                        Admission::Resume(Resumed {
                            request,
                            credential: current,
                            turn: DispatchTurn::free(),
                        })
                    }
                    Some(current) => {
                        inner.state = RefreshState::Refreshing;
                        info!("authorization failed, starting credential refresh");
                        Admission::Lead {
                            request,
                            refresh_token: current.refresh,
                        }
                    }
                },
            }
        };

        match admission {
            Admission::Resume(resumed) => Ok(resumed),
            Admission::Wait(resumed) => resumed.await.unwrap_or_else(|_| {
                Err(Error::RefreshFailed(
                    "refresh ended without resolving this call".into(),
                ))
            }),
            Admission::Lead {
                request,
                refresh_token,
            } => {
                let this = Arc::clone(self);
                let credential = match tokio::spawn(async move { this.run(refresh_token).await }).await {
                    Ok(outcome) => outcome?,
                    Err(e) => {
                        warn!(error = %e, "refresh task did not complete");
                        let inner = self.inner.lock().await;
                        let reason = Error::RefreshFailed(format!("refresh task aborted: {e}"));
                        if inner.state == RefreshState::Refreshing {
                            self.settle(inner, Err(reason)).await?
                        } else {
                            return Err(reason);
                        }
                    }
                };
                Ok(Resumed {
                    request,
                    credential,
                    turn: DispatchTurn::free(),
                })
            }
        }
    }

    async fn run(&self, refresh_token: String) -> Result<Credential> {
        let outcome = match self.refresher.refresh(&refresh_token).await {
            Ok(credential) if credential.is_usable() => Ok(credential),
            Ok(_) => Err(Error::RefreshFailed(
                "refresh returned no usable credential".into(),
            )),
            Err(e) => Err(e),
        };
        let inner = self.inner.lock().await;
        self.settle(inner, outcome).await
    }

    /// Apply the refresh outcome to the store and the queue, then go Idle.
    async fn settle(
        &self,
        mut inner: MutexGuard<'_, Inner<R>>,
        outcome: Result<Credential>,
    ) -> Result<Credential> {
        let pending = std::mem::take(&mut inner.pending);
        let waiting = pending.len();

        let result = match outcome {
            Ok(credential) => {
                if let Err(e) = self.store.save(&credential).await {
                    warn!(error = %e, "failed to persist refreshed credential");
                }
                telemetry::record_refresh("success");
                info!(resumed = waiting, "credential refresh succeeded");
                for call in pending {
                    let (turn, started) = oneshot::channel();
                    let resumed = Resumed {
                        request: call.request,
                        credential: credential.clone(),
                        turn: DispatchTurn(Some(turn)),
                    };
                    if call.resume.send(Ok(resumed)).is_err() {
                        debug!("suspended call went away before resumption");
                        continue;
                    }
                    // Err on the receiver means the turn was dropped, which also counts
                    if tokio::time::timeout(DISPATCH_TURN_TIMEOUT, started)
                        .await
                        .is_err()
                    {
                        warn!("resumed call did not start its replay in time, resuming the next one");
                    }
                }
                Ok(credential)
            }
            Err(e) => {
                let reason = match e {
                    Error::RefreshFailed(reason) => reason,
                    other => other.to_string(),
                };
                if let Err(clear_err) = self.store.clear().await {
                    warn!(error = %clear_err, "failed to clear credential after refresh failure");
                }
                telemetry::record_refresh("failure");
                warn!(error = %reason, rejected = waiting, "credential refresh failed");
                self.sink
                    .notify(SESSION_EXPIRED_MESSAGE, Severity::Error, None);
                for call in pending {
                    let _ = call.resume.send(Err(Error::RefreshFailed(reason.clone())));
                }
                Err(Error::RefreshFailed(reason))
            }
        };

        inner.state = RefreshState::Idle;
        telemetry::set_pending(0);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify_sink::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Refresher that blocks until released and then returns a fixed outcome.
    struct GatedRefresher {
        gate: Notify,
        gated: bool,
        outcome: Result<Credential>,
        calls: AtomicUsize,
    }

    impl GatedRefresher {
        fn new(outcome: Result<Credential>, gated: bool) -> Arc<Self> {
            Arc::new(Self {
                gate: Notify::new(),
                gated,
                outcome,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Refresher for GatedRefresher {
        fn refresh<'a>(
            &'a self,
            _refresh_token: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Credential>> + Send + 'a>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.gated {
                    self.gate.notified().await;
                }
                self.outcome.clone()
            })
        }
    }

    async fn setup(
        refresher: Arc<GatedRefresher>,
    ) -> (
        Arc<RefreshCoordinator<String>>,
        Arc<CredentialStore>,
        Arc<MemorySink>,
    ) {
        let store = Arc::new(CredentialStore::in_memory());
        store.save(&Credential::new("a1", "r1")).await.unwrap();
        let sink = Arc::new(MemorySink::new());
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            refresher,
            sink.clone(),
        ));
        (coordinator, store, sink)
    }

    async fn wait_for_pending(coordinator: &RefreshCoordinator<String>, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while coordinator.pending_len().await < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("calls never queued");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failures_share_one_refresh() {
        let refresher = GatedRefresher::new(Ok(Credential::new("a2", "r2")), true);
        let (coordinator, store, sink) = setup(refresher.clone()).await;

        let mut handles = vec![];
        for i in 0..6 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .request_refresh("a1", format!("call-{i}"))
                    .await
                    .map(Resumed::into_parts)
            }));
        }

        wait_for_pending(&coordinator, 5).await;
        assert!(coordinator.is_refreshing().await);
        refresher.gate.notify_one();

        let mut requests = vec![];
        for h in handles {
            let (request, credential) = h.await.unwrap().unwrap();
            assert_eq!(credential, Credential::new("a2", "r2"));
            requests.push(request);
        }
        requests.sort();
        assert_eq!(requests.len(), 6);
        requests.dedup();
        assert_eq!(requests.len(), 6, "every call gets its own request back");

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get().await, Some(Credential::new("a2", "r2")));
        assert_eq!(coordinator.state().await, RefreshState::Idle);
        assert_eq!(coordinator.pending_len().await, 0);
        assert!(sink.notices().is_empty());
    }

    #[tokio::test]
    async fn failure_rejects_every_waiter_and_clears_store() {
        let refresher = GatedRefresher::new(
            Err(Error::RefreshFailed("refresh token revoked".into())),
            true,
        );
        let (coordinator, store, sink) = setup(refresher.clone()).await;

        let mut handles = vec![];
        for i in 0..4 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator.request_refresh("a1", format!("call-{i}")).await
            }));
        }
        wait_for_pending(&coordinator, 3).await;
        refresher.gate.notify_one();

        for h in handles {
            let err = h.await.unwrap().unwrap_err();
            assert_eq!(err, Error::RefreshFailed("refresh token revoked".into()));
        }
        assert!(store.get().await.is_none());
        assert_eq!(sink.count(Severity::Error), 1);
        assert_eq!(sink.notices()[0].message, SESSION_EXPIRED_MESSAGE);
        assert_eq!(coordinator.state().await, RefreshState::Idle);
    }

    #[tokio::test]
    async fn unusable_credential_is_a_failure() {
        let refresher = GatedRefresher::new(Ok(Credential::new("", "r2")), false);
        let (coordinator, store, sink) = setup(refresher).await;

        let err = coordinator
            .request_refresh("a1", "call".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RefreshFailed(_)), "got: {err:?}");
        assert!(store.get().await.is_none());
        assert_eq!(sink.count(Severity::Error), 1);
    }

    #[tokio::test]
    async fn stale_attempt_resumes_without_refreshing() {
        let refresher = GatedRefresher::new(Ok(Credential::new("a3", "r3")), false);
        let (coordinator, store, _sink) = setup(refresher.clone()).await;
        store.save(&Credential::new("a2", "r2")).await.unwrap();

        let resumed = coordinator
            .request_refresh("a1", "late".to_string())
            .await
            .unwrap();
        assert_eq!(resumed.credential.access, "a2");
        assert_eq!(resumed.request, "late");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_store_is_unauthorized_without_refresh() {
        let refresher = GatedRefresher::new(Ok(Credential::new("a2", "r2")), false);
        let (coordinator, store, sink) = setup(refresher.clone()).await;
        store.clear().await.unwrap();

        let err = coordinator
            .request_refresh("a1", "call".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)), "got: {err:?}");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
        assert!(sink.notices().is_empty());
    }

    #[tokio::test]
    async fn later_wave_refreshes_again() {
        let refresher = GatedRefresher::new(Ok(Credential::new("a2", "r2")), false);
        let (coordinator, _store, _sink) = setup(refresher.clone()).await;

        coordinator
            .request_refresh("a1", "first".to_string())
            .await
            .unwrap();
        // The new token expired too: a fresh wave starts a fresh refresh
        coordinator
            .request_refresh("a2", "second".to_string())
            .await
            .unwrap();
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropped_leader_does_not_strand_waiters() {
        let refresher = GatedRefresher::new(Ok(Credential::new("a2", "r2")), true);
        let (coordinator, store, _sink) = setup(refresher.clone()).await;

        let leader = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .request_refresh("a1", "leader".to_string())
                    .await
            })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            while !coordinator.is_refreshing().await {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .request_refresh("a1", "waiter".to_string())
                    .await
                    .map(Resumed::into_parts)
            })
        };
        wait_for_pending(&coordinator, 1).await;

        leader.abort();
        refresher.gate.notify_one();

        let (_, credential) = waiter.await.unwrap().unwrap();
        assert_eq!(credential.access, "a2");
        assert_eq!(store.get().await.unwrap().access, "a2");
        assert_eq!(coordinator.state().await, RefreshState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn waiters_resume_in_queue_order_on_multi_thread_runtime() {
        for _ in 0..25 {
            let refresher = GatedRefresher::new(Ok(Credential::new("a2", "r2")), true);
            let (coordinator, _store, _sink) = setup(refresher.clone()).await;
            let started = Arc::new(std::sync::Mutex::new(Vec::new()));

            let leader = {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    coordinator
                        .request_refresh("a1", "leader".to_string())
                        .await
                        .map(Resumed::into_parts)
                })
            };
            tokio::time::timeout(Duration::from_secs(5), async {
                while !coordinator.is_refreshing().await {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
            .await
            .unwrap();

            let mut waiters = vec![];
            for (i, name) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
                let task_coordinator = coordinator.clone();
                let started = started.clone();
                waiters.push(tokio::spawn(async move {
                    let resumed = task_coordinator
                        .request_refresh("a1", name.to_string())
                        .await
                        .unwrap();
                    started.lock().unwrap().push(resumed.request.clone());
                    resumed.turn.release();
                }));
                wait_for_pending(&coordinator, i + 1).await;
            }

            refresher.gate.notify_one();
            leader.await.unwrap().unwrap();
            for w in waiters {
                w.await.unwrap();
            }
            assert_eq!(*started.lock().unwrap(), vec!["a", "b", "c", "d", "e"]);
        }
    }

    #[tokio::test]
    async fn dropped_turn_does_not_stall_the_drain() {
        let refresher = GatedRefresher::new(Ok(Credential::new("a2", "r2")), true);
        let (coordinator, _store, _sink) = setup(refresher.clone()).await;

        let mut handles = vec![];
        for i in 0..3 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                // Dropping the whole resumption without releasing
                coordinator
                    .request_refresh("a1", format!("call-{i}"))
                    .await
                    .map(|resumed| resumed.credential)
            }));
        }
        wait_for_pending(&coordinator, 2).await;
        refresher.gate.notify_one();

        let all = tokio::time::timeout(DISPATCH_TURN_TIMEOUT / 2, async {
            for h in handles {
                assert_eq!(h.await.unwrap().unwrap().access, "a2");
            }
        })
        .await;
        assert!(all.is_ok(), "drain waited on dropped turns");
    }
}
