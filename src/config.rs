//! 스트리머 설정

use std::time::Duration;

use crate::{Error, Result, DEFAULT_MAX_CHUNKS};

/// 이미지 스트리머 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 청크 슬롯 수 (동시에 대기 가능한 청크 최대 개수)
    pub max_chunks: usize,

    /// 청크 간 타임아웃 기본값 (밀리초)
    pub inter_chunk_timeout_ms: u64,

    /// 이미지 요청 재전송 주기 기본값 (밀리초)
    pub requesting_period_ms: u64,

    /// 청크를 하나 처리할 때마다 상태 변경 알림
    /// false면 세션 종료 시 한 번만 알림
    pub notify_each_chunk: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_chunks: DEFAULT_MAX_CHUNKS,
            inter_chunk_timeout_ms: 5000, // 5초
            requesting_period_ms: 1000,   // 1초마다 재요청
            notify_each_chunk: false,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inter_chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.inter_chunk_timeout_ms)
    }

    pub fn requesting_period(&self) -> Duration {
        Duration::from_millis(self.requesting_period_ms)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.max_chunks == 0 {
            return Err(Error::InvalidArgument("max_chunks는 0일 수 없음".into()));
        }
        if self.inter_chunk_timeout_ms == 0 {
            return Err(Error::InvalidArgument(
                "inter_chunk_timeout_ms는 0일 수 없음".into(),
            ));
        }
        if self.requesting_period_ms == 0 {
            return Err(Error::InvalidArgument(
                "requesting_period_ms는 0일 수 없음".into(),
            ));
        }
        Ok(())
    }

    /// 저사양 기기용 설정
    pub fn low_spec() -> Self {
        Self {
            max_chunks: 2,
            inter_chunk_timeout_ms: 10000, // 느린 플래시 고려
            requesting_period_ms: 2000,
            notify_each_chunk: false,
        }
    }

    /// 고성능 기기용 설정
    pub fn high_performance() -> Self {
        Self {
            max_chunks: 32,
            inter_chunk_timeout_ms: 3000,
            requesting_period_ms: 500,
            notify_each_chunk: true, // 슬롯을 빨리 회수하도록
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::low_spec().validate().is_ok());
        assert!(Config::high_performance().validate().is_ok());
    }

    #[test]
    fn test_zero_slots_rejected() {
        let config = Config {
            max_chunks: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.inter_chunk_timeout(), Duration::from_secs(5));
        assert_eq!(config.requesting_period(), Duration::from_secs(1));
    }
}
