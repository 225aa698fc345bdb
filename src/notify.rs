//! 알림 구독 관리
//!
//! 알림 종류별로 구독자는 하나만 허용

use std::fmt;
use std::sync::Arc;

use crate::session::SessionId;
use crate::{Error, Result};

/// 누락 이미지 알림: (resource_id, session_id)
pub type MissingImageFn = dyn Fn(&[u8], SessionId) + Send + Sync;

/// 청크 상태 변경 알림: (session_id)
pub type ChunkStatusFn = dyn Fn(SessionId) + Send + Sync;

/// 단일 구독자 슬롯
pub struct Subscription<F: ?Sized> {
    callback: Option<Arc<F>>,
}

impl<F: ?Sized> Subscription<F> {
    pub fn new() -> Self {
        Self { callback: None }
    }

    /// 구독. 이미 구독자가 있으면 NoResources
    pub fn subscribe(&mut self, callback: Arc<F>) -> Result<()> {
        if self.callback.is_some() {
            return Err(Error::NoResources);
        }
        self.callback = Some(callback);
        Ok(())
    }

    pub fn unsubscribe(&mut self) {
        self.callback = None;
    }

    /// 호출용 핸들 복제 (락 밖에서 호출하기 위함)
    pub fn get(&self) -> Option<Arc<F>> {
        self.callback.clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.callback.is_some()
    }
}

impl<F: ?Sized> Default for Subscription<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> fmt::Debug for Subscription<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

/// 두 종류 알림 구독자 묶음
#[derive(Debug, Default)]
pub struct Subscribers {
    pub missing_image: Subscription<MissingImageFn>,
    pub chunk_status: Subscription<ChunkStatusFn>,
}
