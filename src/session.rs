//! 스트리밍 세션 상태
//!
//! 한 번에 하나의 세션만 활성. 단계는 앞으로만 진행:
//! Idle -> PendingFirstResponse -> InProgress -> Closing -> Idle

use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::chunk::ArrivalNumber;
use crate::stats::StreamStats;
use crate::Error;

/// 세션 ID (0은 사용하지 않음)
pub type SessionId = u32;

/// 세션 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Idle,
    PendingFirstResponse,
    InProgress,
    Closing,
}

/// 다음 세션 ID. 0은 건너뜀
pub fn next_session_id(last: SessionId) -> SessionId {
    match last.wrapping_add(1) {
        0 => 1,
        id => id,
    }
}

/// 진행 중인 세션
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,

    /// 요청 대상 리소스 ID
    pub resource_id: Bytes,

    pub inter_chunk_timeout: Duration,
    pub requesting_period: Duration,

    stage: Stage,

    /// 마지막 이미지 요청 시각 (None이면 아직 요청 전)
    pub last_request: Option<Instant>,

    /// 마지막 청크 수신 시각
    pub last_response: Instant,

    /// 마지막으로 부여한 도착 번호
    pub last_arrival: ArrivalNumber,

    /// 마지막으로 싱크에 넘긴 도착 번호
    pub last_processed: ArrivalNumber,

    /// 싱크 쓰기 커서
    pub write_cursor: u64,

    /// 마지막 청크의 도착 번호 (한 번 기록되면 변경 불가)
    last_chunk_arrival: Option<ArrivalNumber>,

    /// 종료 에러 (None이면 성공)
    completion_error: Option<Error>,

    pub stats: StreamStats,
}

impl Session {
    pub fn new(
        id: SessionId,
        resource_id: Bytes,
        inter_chunk_timeout: Duration,
        requesting_period: Duration,
        now: Instant,
    ) -> Self {
        Self {
            id,
            resource_id,
            inter_chunk_timeout,
            requesting_period,
            stage: Stage::PendingFirstResponse,
            last_request: None,
            // 시작 직후 타임아웃 방지
            last_response: now,
            last_arrival: 0,
            last_processed: 0,
            write_cursor: 0,
            last_chunk_arrival: None,
            completion_error: None,
            stats: StreamStats::new(id),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(next >= self.stage, "stage {:?} -> {:?}", self.stage, next);
        if next > self.stage {
            self.stage = next;
        }
    }

    /// 새 청크를 받을 수 있는 상태인지
    pub fn accepts_chunks(&self) -> bool {
        matches!(self.stage, Stage::PendingFirstResponse | Stage::InProgress)
            && self.last_chunk_arrival.is_none()
    }

    /// 프로바이더 응답 기록. 첫 응답이면 InProgress로 전환
    pub fn touch(&mut self, now: Instant) {
        self.last_response = now;
        if self.stage == Stage::PendingFirstResponse {
            self.advance(Stage::InProgress);
        }
    }

    /// 다음 도착 번호 부여
    pub fn assign_arrival(&mut self, is_last: bool) -> ArrivalNumber {
        self.last_arrival += 1;
        if is_last && self.last_chunk_arrival.is_none() {
            self.last_chunk_arrival = Some(self.last_arrival);
        }
        self.last_arrival
    }

    /// 다음에 부여될 도착 번호 (부여하지는 않음)
    pub fn next_arrival(&self) -> ArrivalNumber {
        self.last_arrival + 1
    }

    /// 다음으로 처리할 도착 번호
    pub fn next_to_process(&self) -> ArrivalNumber {
        self.last_processed + 1
    }

    /// 청크 처리 완료. 마지막 청크였으면 Closing으로 전환하고 true
    pub fn mark_processed(&mut self, arrival_number: ArrivalNumber) -> bool {
        self.last_processed = arrival_number;
        if self.last_chunk_arrival == Some(arrival_number) {
            self.advance(Stage::Closing);
            return true;
        }
        false
    }

    /// 오프셋이 쓰기 커서와 불연속인지
    pub fn needs_seek(&self, offset: u64) -> bool {
        self.write_cursor != offset
    }

    /// 에러와 함께 종료 단계로 전환. 먼저 기록된 에러가 유지됨
    pub fn fail(&mut self, error: Error) {
        if self.completion_error.is_none() {
            self.completion_error = Some(error);
        }
        self.advance(Stage::Closing);
    }

    /// 종료 결과 꺼내기
    pub fn take_completion(&mut self) -> Result<(), Error> {
        match self.completion_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// 이미지 요청 알림을 보낼 시점인지
    pub fn request_due(&self, now: Instant) -> bool {
        if self.stage != Stage::PendingFirstResponse {
            return false;
        }
        match self.last_request {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= self.requesting_period,
        }
    }

    /// 청크 간 타임아웃 경과 여부
    pub fn timed_out(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_response) >= self.inter_chunk_timeout
    }

    /// 다음 깨어날 때까지의 대기 시간
    ///
    /// min(타임아웃까지 남은 시간, 다음 이미지 요청까지 남은 시간)
    /// 표현할 수 없을 만큼 먼 시각은 기한 없음(`Duration::MAX`)으로 취급
    pub fn next_wait(&self, now: Instant) -> Duration {
        let timeout_left = remaining(self.last_response, self.inter_chunk_timeout, now);

        if self.stage != Stage::PendingFirstResponse {
            return timeout_left;
        }

        let request_left = match self.last_request {
            Some(at) => remaining(at, self.requesting_period, now),
            None => Duration::ZERO,
        };
        timeout_left.min(request_left)
    }
}

/// `since + period` 까지 남은 시간. 오버플로면 Duration::MAX
fn remaining(since: Instant, period: Duration, now: Instant) -> Duration {
    since
        .checked_add(period)
        .map_or(Duration::MAX, |deadline| deadline.saturating_duration_since(now))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(now: Instant) -> Session {
        Session::new(
            1,
            Bytes::from_static(b"app.bin"),
            Duration::from_millis(500),
            Duration::from_millis(100),
            now,
        )
    }

    #[test]
    fn test_session_id_skips_zero() {
        assert_eq!(next_session_id(0), 1);
        assert_eq!(next_session_id(41), 42);
        assert_eq!(next_session_id(u32::MAX), 1);
    }

    #[test]
    fn test_first_response_moves_to_in_progress() {
        let now = Instant::now();
        let mut s = session(now);
        assert_eq!(s.stage(), Stage::PendingFirstResponse);

        s.touch(now);
        assert_eq!(s.stage(), Stage::InProgress);
        assert_eq!(s.assign_arrival(false), 1);
        assert_eq!(s.assign_arrival(false), 2);
    }

    #[test]
    fn test_last_chunk_is_immutable() {
        let now = Instant::now();
        let mut s = session(now);
        s.touch(now);

        s.assign_arrival(false);
        s.assign_arrival(true);
        assert_eq!(s.last_chunk_arrival, Some(2));
        assert_eq!(s.next_arrival(), 3);
        assert!(!s.accepts_chunks());

        // 1번 처리로는 종료되지 않음
        assert!(!s.mark_processed(1));
        assert_eq!(s.stage(), Stage::InProgress);
        assert!(s.mark_processed(2));
        assert_eq!(s.stage(), Stage::Closing);
    }

    #[test]
    fn test_request_schedule() {
        let now = Instant::now();
        let mut s = session(now);

        assert!(s.request_due(now));
        assert_eq!(s.next_wait(now), Duration::ZERO);

        s.last_request = Some(now);
        assert!(!s.request_due(now + Duration::from_millis(50)));
        assert!(s.request_due(now + Duration::from_millis(100)));
        assert_eq!(
            s.next_wait(now + Duration::from_millis(30)),
            Duration::from_millis(70)
        );

        // InProgress에서는 요청하지 않음
        s.touch(now);
        assert!(!s.request_due(now + Duration::from_secs(1)));
        assert_eq!(s.next_wait(now), Duration::from_millis(500));
    }

    #[test]
    fn test_timeout() {
        let now = Instant::now();
        let s = session(now);
        assert!(!s.timed_out(now + Duration::from_millis(499)));
        assert!(s.timed_out(now + Duration::from_millis(500)));
        assert_eq!(s.next_wait(now + Duration::from_secs(2)), Duration::ZERO);
    }

    #[test]
    fn test_unbounded_durations_do_not_overflow() {
        let now = Instant::now();
        let mut s = Session::new(
            1,
            Bytes::from_static(b"app.bin"),
            Duration::MAX,
            Duration::MAX,
            now,
        );

        s.last_request = Some(now);
        assert_eq!(s.next_wait(now), Duration::MAX);
        assert!(!s.request_due(now + Duration::from_secs(3600)));
        assert!(!s.timed_out(now + Duration::from_secs(3600)));

        s.touch(now);
        assert_eq!(s.next_wait(now), Duration::MAX);
    }

    #[test]
    fn test_first_error_wins() {
        let now = Instant::now();
        let mut s = session(now);
        s.fail(Error::IoFailure("write".into()));
        s.fail(Error::Timeout);

        assert_eq!(s.stage(), Stage::Closing);
        assert_eq!(s.take_completion(), Err(Error::IoFailure("write".into())));
    }
}
