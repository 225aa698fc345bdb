//! 데이터 캐시 일관성
//!
//! 청크 버퍼는 복사되지 않으므로 enqueue 시점에 캐시 라인 정렬을 검사하고
//! 플러시해야 함. 캐시가 없는 시스템에서는 `NoCache` 사용

use thiserror::Error;

/// 캐시 플러시 에러
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// 캐시가 비활성화 상태 (무시 가능)
    #[error("캐시 비활성화")]
    Disabled,

    /// 시스템에 캐시 없음 (무시 가능)
    #[error("캐시 미지원")]
    NotSupported,

    #[error("캐시 플러시 실패: {0}")]
    Failed(String),
}

impl CacheError {
    /// 청크 수락에 지장 없는 에러인지
    pub fn is_benign(&self) -> bool {
        matches!(self, CacheError::Disabled | CacheError::NotSupported)
    }
}

/// 데이터 캐시 인터페이스
pub trait DataCache: Send + Sync {
    /// 캐시 라인 크기 (0이면 캐시 없음)
    fn line_size(&self) -> usize;

    /// 버퍼 영역을 라인 단위로 플러시
    fn flush(&self, data: &[u8]) -> std::result::Result<(), CacheError>;
}

/// 캐시가 없는 시스템
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl DataCache for NoCache {
    fn line_size(&self) -> usize {
        0
    }

    fn flush(&self, _data: &[u8]) -> std::result::Result<(), CacheError> {
        Err(CacheError::NotSupported)
    }
}

/// 고정 라인 크기 캐시 (정렬 검사만 수행, 플러시는 no-op)
#[derive(Debug, Clone, Copy)]
pub struct FixedLineCache {
    line_size: usize,
}

impl FixedLineCache {
    pub fn new(line_size: usize) -> Self {
        Self { line_size }
    }
}

impl DataCache for FixedLineCache {
    fn line_size(&self) -> usize {
        self.line_size
    }

    fn flush(&self, _data: &[u8]) -> std::result::Result<(), CacheError> {
        Ok(())
    }
}

/// 주소가 캐시 라인에 정렬되어 있는지
pub fn is_line_aligned(data: &[u8], line_size: usize) -> bool {
    if line_size == 0 {
        return true;
    }
    (data.as_ptr() as usize) % line_size == 0
}
