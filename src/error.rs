//! 에러 타입 정의

use thiserror::Error;

/// 이미지 스트리밍 에러 타입
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("유효하지 않은 인자: {0}")]
    InvalidArgument(String),

    /// 세션이 없거나, 세션 ID가 다르거나, 마지막 청크가 이미 기록됨
    #[error("잘못된 세션 상태")]
    IncorrectState,

    /// 빈 슬롯 없음, 출력 버퍼 부족, 또는 이미 진행 중인 스트림
    #[error("사용 중 (나중에 다시 시도)")]
    Busy,

    #[error("리소스 없음: 이미 구독 중")]
    NoResources,

    #[error("청크 간 타임아웃")]
    Timeout,

    #[error("싱크 IO 실패: {0}")]
    IoFailure(String),

    #[error("지원하지 않는 동작: 싱크가 seek를 지원하지 않음")]
    Unsupported,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoFailure(err.to_string())
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
