//! 스트리밍 통계
//!
//! 세션마다 하나씩 생성되어, 성공적으로 끝나면 `stream`의 결과로 반환됨

use std::time::{Duration, Instant};

use crate::session::SessionId;

/// 세션 통계
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// 세션 ID
    pub session_id: SessionId,

    /// 시작 시간
    pub start_time: Instant,

    /// 종료 시간 (진행 중이면 None)
    pub end_time: Option<Instant>,

    /// 수락된 청크 수
    pub chunks_enqueued: u64,

    /// 싱크로 넘긴 청크 수
    pub chunks_processed: u64,

    /// 종료 시 거부된 청크 수
    pub chunks_refused: u64,

    /// 싱크에 기록한 바이트
    pub bytes_written: u64,

    /// seek 횟수
    pub seeks: u64,

    /// 누락 이미지 요청 횟수
    pub missing_image_requests: u64,

    /// 슬롯 부족으로 거부된 enqueue 횟수
    pub busy_rejections: u64,
}

impl StreamStats {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            start_time: Instant::now(),
            end_time: None,
            chunks_enqueued: 0,
            chunks_processed: 0,
            chunks_refused: 0,
            bytes_written: 0,
            seeks: 0,
            missing_image_requests: 0,
            busy_rejections: 0,
        }
    }

    /// 청크 처리 기록
    pub fn record_write(&mut self, size: usize) {
        self.chunks_processed += 1;
        self.bytes_written += size as u64;
    }

    /// 종료 시각 기록
    pub fn finish(&mut self) {
        self.end_time.get_or_insert_with(Instant::now);
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        match self.end_time {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.bytes_written as f64 / elapsed
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Session: {} | Elapsed: {:.2}s | Chunks: {}/{} | Refused: {} | Bytes: {} | Throughput: {:.2} KB/s | Seeks: {} | Requests: {} | Busy: {}",
            self.session_id,
            self.elapsed().as_secs_f64(),
            self.chunks_processed,
            self.chunks_enqueued,
            self.chunks_refused,
            self.bytes_written,
            self.throughput() / 1024.0,
            self.seeks,
            self.missing_image_requests,
            self.busy_rejections,
        )
    }
}

impl Default for StreamStats {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_finish() {
        let mut stats = StreamStats::new(5);
        stats.record_write(100);
        stats.record_write(50);
        stats.finish();

        assert_eq!(stats.chunks_processed, 2);
        assert_eq!(stats.bytes_written, 150);

        // 종료 후에는 경과 시간이 고정됨
        let elapsed = stats.elapsed();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(stats.elapsed(), elapsed);
        assert!(stats.summary().starts_with("Session: 5"));
    }
}
