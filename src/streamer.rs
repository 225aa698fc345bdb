//! 이미지 스트리머 (요청자측)
//!
//! - 프로바이더가 임의 순서로 넘겨주는 청크를 도착 순서대로 싱크에 기록
//! - 첫 응답 전까지 누락 이미지 알림을 주기적으로 재전송
//! - 청크 간 타임아웃 시 세션 종료
//! - 슬롯 풀이 가득 차면 Busy로 백프레셔
//!
//! 공유 상태는 하나의 락으로 보호하되, 싱크 IO와 알림 콜백 호출 동안에는
//! 락을 풀어 `chunk_enqueue`가 느린 기록 작업 뒤에서 막히지 않게 함

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::cache::{is_line_aligned, DataCache, NoCache};
use crate::chunk::{ArrivalNumber, ChunkId, ChunkInfo, SlotStatus, SlotTable};
use crate::notify::Subscribers;
use crate::session::{next_session_id, Session, SessionId, Stage};
use crate::sink::StreamSink;
use crate::stats::StreamStats;
use crate::{Config, Error, Result};

/// 싱크로 넘길 청크 작업 (락 밖에서 실행)
struct WriteJob {
    index: usize,
    arrival_number: ArrivalNumber,
    offset: u64,
    data: Bytes,
    seek: bool,
}

/// 락으로 보호되는 공유 상태
struct Shared {
    session: Option<Session>,
    slots: SlotTable,
    subscribers: Subscribers,
    last_session_id: SessionId,
}

impl Shared {
    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(Error::IncorrectState)
    }

    fn session_mut(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or(Error::IncorrectState)
    }

    /// 세션 ID가 일치하는 활성 세션
    fn active_session(&mut self, session_id: SessionId) -> Result<&mut Session> {
        match self.session.as_mut() {
            Some(session) if session.id == session_id => Ok(session),
            _ => Err(Error::IncorrectState),
        }
    }

    /// 다음 순서의 청크가 도착해 있으면 작업 생성
    fn next_job(&self) -> Option<WriteJob> {
        let session = self.session.as_ref()?;
        if session.stage() != Stage::InProgress {
            return None;
        }

        let index = self.slots.find_pending(session.next_to_process())?;
        let slot = self.slots.get(index)?;

        Some(WriteJob {
            index,
            arrival_number: slot.arrival_number,
            offset: slot.offset,
            data: slot.data.clone(),
            seek: session.needs_seek(slot.offset),
        })
    }

    /// 작업 결과 반영. 세션이 종료 단계로 넘어가면 true
    fn complete_job(&mut self, job: &WriteJob, outcome: Result<()>) -> Result<bool> {
        let session = self.session.as_mut().ok_or(Error::IncorrectState)?;

        match outcome {
            Ok(()) => {
                if job.seek {
                    session.stats.seeks += 1;
                }
                session.write_cursor = job.offset + job.data.len() as u64;
                session.stats.record_write(job.data.len());
                self.slots.set_status(job.index, SlotStatus::ProcessedSuccess);
                Ok(session.mark_processed(job.arrival_number))
            }
            Err(err) => {
                warn!(
                    "싱크 처리 실패: session={}, arrival={}, offset={}: {}",
                    session.id, job.arrival_number, job.offset, err
                );
                session.stats.chunks_refused += 1;
                session.fail(err);
                self.slots.set_status(job.index, SlotStatus::ProcessedFail);
                Ok(true)
            }
        }
    }
}

/// 이미지 스트리머
///
/// 스레드 간 공유는 `Arc<Streamer>`로. `stream`을 호출한 스레드가 워커 루프를
/// 실행하고, 다른 스레드(또는 알림 콜백)가 `chunk_enqueue`로 청크를 넘김
pub struct Streamer {
    config: Config,
    state: Mutex<Shared>,
    cache: Arc<dyn DataCache>,

    /// 워커 루프 깨우기 신호 (용량 1 세마포어)
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Streamer {
    /// 캐시 없는 시스템용 스트리머 생성
    pub fn new(config: Config) -> Result<Self> {
        Self::with_cache(config, Arc::new(NoCache))
    }

    /// 캐시 일관성 처리를 지정해 생성
    pub fn with_cache(config: Config, cache: Arc<dyn DataCache>) -> Result<Self> {
        config.validate()?;

        let (wake_tx, wake_rx) = bounded(1);
        Ok(Self {
            state: Mutex::new(Shared {
                session: None,
                slots: SlotTable::new(config.max_chunks),
                subscribers: Subscribers::default(),
                last_session_id: 0,
            }),
            config,
            cache,
            wake_tx,
            wake_rx,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 슬롯 용량
    pub fn capacity(&self) -> usize {
        self.config.max_chunks
    }

    /// 현재 세션 단계
    pub fn stage(&self) -> Stage {
        self.state
            .lock()
            .session
            .as_ref()
            .map_or(Stage::Idle, Session::stage)
    }

    pub fn is_idle(&self) -> bool {
        self.stage() == Stage::Idle
    }

    /// 활성 세션 ID
    pub fn active_session(&self) -> Option<SessionId> {
        self.state.lock().session.as_ref().map(|s| s.id)
    }

    /// 설정의 기본 타이밍으로 스트리밍
    pub fn stream_default<S: StreamSink + ?Sized>(
        &self,
        resource_id: &[u8],
        sink: &mut S,
    ) -> Result<StreamStats> {
        self.stream(
            resource_id,
            sink,
            self.config.inter_chunk_timeout(),
            self.config.requesting_period(),
        )
    }

    /// 이미지 스트리밍 (블로킹)
    ///
    /// 세션을 만들고 완료될 때까지 워커 루프를 실행. 성공 시 세션 통계 반환,
    /// 실패 시 종료 에러(Timeout, IoFailure, Unsupported) 반환
    pub fn stream<S: StreamSink + ?Sized>(
        &self,
        resource_id: &[u8],
        sink: &mut S,
        inter_chunk_timeout: Duration,
        requesting_period: Duration,
    ) -> Result<StreamStats> {
        if resource_id.is_empty() {
            return Err(Error::InvalidArgument("빈 리소스 ID".into()));
        }
        if !sink.is_writable() {
            return Err(Error::InvalidArgument("쓰기 불가능한 싱크".into()));
        }

        let session_id = {
            let mut shared = self.state.lock();
            if shared.session.is_some() {
                warn!("스트림 거부: 이미 진행 중인 세션 있음");
                return Err(Error::Busy);
            }

            // 이전 세션에서 남은 깨우기 신호 제거
            while self.wake_rx.try_recv().is_ok() {}

            let id = next_session_id(shared.last_session_id);
            shared.last_session_id = id;
            shared.slots.reset();
            shared.session = Some(Session::new(
                id,
                Bytes::copy_from_slice(resource_id),
                inter_chunk_timeout,
                requesting_period,
                Instant::now(),
            ));
            id
        };

        info!(
            "이미지 스트림 시작: session={}, resource={}, timeout={:?}, period={:?}",
            session_id,
            String::from_utf8_lossy(resource_id),
            inter_chunk_timeout,
            requesting_period
        );

        self.run(sink)
    }

    /// 워커 루프
    fn run<S: StreamSink + ?Sized>(&self, sink: &mut S) -> Result<StreamStats> {
        let mut wait = Duration::ZERO;

        loop {
            // 대기 중 깨우기 신호가 오면 바로 진행, 타임아웃이어도 진행
            let _ = self.wake_rx.recv_timeout(wait);

            let mut shared = self.state.lock();
            let now = Instant::now();
            let mut processed = false;

            // 순서가 된 청크를 싱크로
            if let Some(job) = shared.next_job() {
                let outcome = MutexGuard::unlocked(&mut shared, || Self::apply(sink, &job));
                let closing = shared.complete_job(&job, outcome)?;

                if !closing && self.config.notify_each_chunk {
                    Self::notify_chunk_status(&mut shared);
                }
                processed = true;
            }

            if shared.session()?.stage() == Stage::Closing {
                return self.finish(shared);
            }

            if shared.session()?.request_due(now) {
                Self::notify_missing_image(&mut shared, now);
            }

            let Shared { session, slots, .. } = &mut *shared;
            let session = session.as_mut().ok_or(Error::IncorrectState)?;
            if session.timed_out(now) {
                warn!(
                    "청크 간 타임아웃: session={}, 처리={}/{}, 대기 청크={}",
                    session.id,
                    session.last_processed,
                    session.last_arrival,
                    slots.pending_count()
                );
                session.fail(Error::Timeout);
                return self.finish(shared);
            }

            // 청크를 처리했으면 다음 청크를 기다리지 않고 바로 확인
            wait = if processed {
                Duration::ZERO
            } else {
                session.next_wait(now)
            };
        }
    }

    /// 싱크 seek/write 실행 (락 밖)
    fn apply<S: StreamSink + ?Sized>(sink: &mut S, job: &WriteJob) -> Result<()> {
        if job.seek {
            if !sink.is_seekable() {
                return Err(Error::Unsupported);
            }
            debug!("싱크 seek: offset={}", job.offset);
            sink.seek(job.offset).map_err(|err| match err {
                // seek 가능하다던 싱크가 거부한 경우
                Error::Unsupported => err,
                other => into_io_failure(other),
            })?;
        }

        if !job.data.is_empty() {
            sink.write(&job.data).map_err(into_io_failure)?;
        }
        Ok(())
    }

    /// 종료 단계 처리: 남은 청크 거부, 최종 알림, Idle로 복귀
    fn finish(&self, mut shared: MutexGuard<'_, Shared>) -> Result<StreamStats> {
        let refused = shared.slots.fail_pending();
        shared.session_mut()?.stats.chunks_refused += refused as u64;

        // 알림 동안에도 Closing 단계 유지 -> 구독자가 최종 상태 조회 가능
        Self::notify_chunk_status(&mut shared);

        let mut session = shared.session.take().ok_or(Error::IncorrectState)?;
        shared.slots.reset();
        drop(shared);

        session.stats.finish();
        match session.take_completion() {
            Ok(()) => {
                info!("이미지 스트림 완료: {}", session.stats.summary());
                Ok(session.stats)
            }
            Err(err) => {
                warn!(
                    "이미지 스트림 실패: session={}, {}: {}",
                    session.id,
                    err,
                    session.stats.summary()
                );
                Err(err)
            }
        }
    }

    fn notify_chunk_status(shared: &mut MutexGuard<'_, Shared>) {
        let Some(session_id) = shared.session.as_ref().map(|s| s.id) else {
            return;
        };

        if let Some(notify) = shared.subscribers.chunk_status.get() {
            MutexGuard::unlocked(shared, || notify(session_id));
        }
    }

    fn notify_missing_image(shared: &mut MutexGuard<'_, Shared>, now: Instant) {
        let notify = shared.subscribers.missing_image.get();
        let Some(session) = shared.session.as_mut() else {
            return;
        };

        session.last_request = Some(now);
        let session_id = session.id;
        let resource_id = session.resource_id.clone();

        if let Some(notify) = notify {
            session.stats.missing_image_requests += 1;
            debug!("누락 이미지 요청: session={}", session_id);
            MutexGuard::unlocked(shared, || notify(&resource_id, session_id));
        }
    }

    /// 청크 전달
    ///
    /// `data`는 복사되지 않고 슬롯이 참조만 보관. 비어 있으면 데이터 없이
    /// 오프셋 이동(또는 종료 표시)만 함. 빈 슬롯이 없으면 Busy: 호출자가
    /// 상태 조회로 슬롯을 비운 뒤 다시 시도해야 함
    pub fn chunk_enqueue(
        &self,
        session_id: SessionId,
        chunk_id: ChunkId,
        offset: u64,
        data: Bytes,
        is_last: bool,
    ) -> Result<()> {
        if !data.is_empty() {
            let line_size = self.cache.line_size();
            if !is_line_aligned(&data, line_size) {
                return Err(Error::InvalidArgument(format!(
                    "캐시 라인({} bytes)에 정렬되지 않은 버퍼",
                    line_size
                )));
            }
            if let Err(err) = self.cache.flush(&data) {
                if !err.is_benign() {
                    return Err(Error::IoFailure(err.to_string()));
                }
            }
        }

        {
            let mut shared = self.state.lock();
            let Shared { session, slots, .. } = &mut *shared;

            let session = match session.as_mut() {
                Some(session) if session.id == session_id => session,
                _ => return Err(Error::IncorrectState),
            };
            if !session.accepts_chunks() {
                // 종료 중이거나 마지막 청크가 이미 들어옴
                return Err(Error::IncorrectState);
            }

            session.touch(Instant::now());

            // 빈 슬롯이 없으면 도착 번호를 소비하지 않고 Busy
            if slots
                .allocate(chunk_id, offset, data, session.next_arrival())
                .is_none()
            {
                session.stats.busy_rejections += 1;
                debug!("슬롯 부족: session={}, chunk_id={}", session_id, chunk_id);
                return Err(Error::Busy);
            }

            let arrival_number = session.assign_arrival(is_last);
            session.stats.chunks_enqueued += 1;

            if is_last {
                debug!("마지막 청크 수신: session={}, arrival={}", session_id, arrival_number);
            }
        }

        // 이미 신호가 대기 중이면 무시
        let _ = self.wake_tx.try_send(());
        Ok(())
    }

    /// 청크 상태 조회
    ///
    /// 도착 순서대로 `out`에 채우고 개수 반환. 처리가 끝난(Pending이 아닌)
    /// 슬롯은 보고와 함께 해제됨. `out`이 부족하면 아무것도 바꾸지 않고 Busy
    pub fn chunk_status_req(&self, session_id: SessionId, out: &mut [ChunkInfo]) -> Result<usize> {
        let mut shared = self.state.lock();
        shared.active_session(session_id)?;
        shared.slots.drain_status(out)
    }

    /// 청크 상태 변경 알림 구독 (하나만 허용)
    pub fn subscribe_chunk_status<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(SessionId) + Send + Sync + 'static,
    {
        self.state
            .lock()
            .subscribers
            .chunk_status
            .subscribe(Arc::new(callback))
    }

    pub fn unsubscribe_chunk_status(&self) {
        self.state.lock().subscribers.chunk_status.unsubscribe();
    }

    /// 누락 이미지 알림 구독 (하나만 허용)
    pub fn subscribe_missing_image<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&[u8], SessionId) + Send + Sync + 'static,
    {
        self.state
            .lock()
            .subscribers
            .missing_image
            .subscribe(Arc::new(callback))
    }

    pub fn unsubscribe_missing_image(&self) {
        self.state.lock().subscribers.missing_image.unsubscribe();
    }
}

/// 싱크 에러는 모두 IO 실패로 취급
fn into_io_failure(err: Error) -> Error {
    match err {
        Error::IoFailure(_) => err,
        other => Error::IoFailure(other.to_string()),
    }
}
