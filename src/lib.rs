//! # imgstream
//!
//! 펌웨어 업데이트용 청크 기반 이미지 스트리밍 (요청자측 엔진)
//!
//! ## 핵심 특징
//! - **도착 순서 기록**: 청크 ID나 오프셋과 무관하게 도착 번호 순으로 싱크에 기록
//! - **재요청**: 첫 응답 전까지 누락 이미지 알림을 주기적으로 재전송
//! - **타임아웃**: 청크 간 간격이 길어지면 세션 종료
//! - **백프레셔**: 고정 크기 슬롯 풀, 가득 차면 Busy
//! - **무복사**: 청크 버퍼는 `Bytes` 참조만 보관
//!
//! ## 사용 예
//! ```no_run
//! use std::sync::Arc;
//! use imgstream::{Config, MemorySink, Streamer};
//!
//! let streamer = Arc::new(Streamer::new(Config::default())?);
//!
//! let provider = streamer.clone();
//! streamer.subscribe_missing_image(move |resource_id, session_id| {
//!     // 프로바이더에게 resource_id 전송 요청, 도착한 청크는 provider.chunk_enqueue(...)로
//!     let _ = (resource_id, session_id, &provider);
//! })?;
//!
//! let mut sink = MemorySink::new();
//! let stats = streamer.stream_default(b"app.bin", &mut sink)?;
//! println!("{}", stats.summary());
//! # Ok::<(), imgstream::Error>(())
//! ```

pub mod cache;
pub mod chunk;
pub mod config;
pub mod error;
pub mod notify;
pub mod session;
pub mod sink;
pub mod stats;
pub mod streamer;

pub use cache::{CacheError, DataCache, FixedLineCache, NoCache};
pub use chunk::{ArrivalNumber, ChunkId, ChunkInfo, ChunkStatus};
pub use config::Config;
pub use error::{Error, Result};
pub use notify::{ChunkStatusFn, MissingImageFn};
pub use session::{SessionId, Stage};
pub use sink::{FileSink, MemorySink, StreamSink};
pub use stats::StreamStats;
pub use streamer::Streamer;

/// 기본 청크 슬롯 수
pub const DEFAULT_MAX_CHUNKS: usize = 8;
