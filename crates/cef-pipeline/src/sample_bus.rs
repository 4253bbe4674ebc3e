//! 샘플 버스 — 번역 결과를 관찰자에게 배포하는 구독 레지스트리
//!
//! 구독자는 식별자([`SubscriberId`])와 콜백의 쌍으로 등록됩니다.
//! [`SampleBus::publish`]는 구독자 목록의 스냅샷을 떠서 락을 놓은 뒤 콜백을
//! 호출하므로, 콜백 안에서 구독/해지를 해도 진행 중인 발행에 영향을 주지 않습니다.
//!
//! 비동기 소비자는 [`SampleBus::subscribe_channel`]로 bounded 채널을 받을 수 있습니다.
//! 채널이 가득 차면 해당 구독자에게만 샘플이 버려지고, 수신 측이 닫히면
//! 다음 발행 때 구독이 자동 해지됩니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use metrics::counter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};
use uuid::Uuid;

use syslog2cef_core::event::Sample;
use syslog2cef_core::metrics as m;

/// 구독자 콜백
pub type SampleCallback = Arc<dyn Fn(&Sample) + Send + Sync>;

type Registry = RwLock<HashMap<SubscriberId, SampleCallback>>;

/// 구독자 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 샘플 발행/구독 버스
///
/// `Clone`은 같은 레지스트리를 공유합니다.
#[derive(Clone, Default)]
pub struct SampleBus {
    subscribers: Arc<Registry>,
}

impl SampleBus {
    /// 빈 버스를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 콜백을 등록하고 식별자를 반환합니다.
    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&Sample) + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        self.insert(id, Arc::new(callback));
        id
    }

    /// 구독을 해지합니다. 등록되어 있었으면 `true`를 반환합니다.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .is_some();
        if removed {
            debug!(%id, "sample subscriber removed");
        }
        removed
    }

    /// 현재 구독자 수
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// 모든 구독자에게 샘플을 전달하고, 전달한 구독자 수를 반환합니다.
    pub fn publish(&self, sample: &Sample) -> usize {
        let snapshot: Vec<SampleCallback> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();

        for callback in &snapshot {
            callback(sample);
        }

        counter!(m::SAMPLES_PUBLISHED_TOTAL).increment(1);
        snapshot.len()
    }

    /// bounded 채널 구독자를 등록합니다.
    pub fn subscribe_channel(&self, capacity: usize) -> (SubscriberId, mpsc::Receiver<Sample>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = SubscriberId::new();
        let registry: Weak<Registry> = Arc::downgrade(&self.subscribers);

        let callback = move |sample: &Sample| match tx.try_send(sample.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                trace!(%id, "subscriber channel full, dropping sample");
            }
            Err(TrySendError::Closed(_)) => {
                // publish는 락 밖에서 콜백을 호출하므로 여기서 쓰기 락을 잡아도 안전함
                if let Some(registry) = registry.upgrade() {
                    registry
                        .write()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&id);
                    debug!(%id, "subscriber channel closed, unsubscribed");
                }
            }
        };

        self.insert(id, Arc::new(callback));
        (id, rx)
    }

    fn insert(&self, id: SubscriberId, callback: SampleCallback) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, callback);
        debug!(%id, "sample subscriber added");
    }
}

impl fmt::Debug for SampleBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
