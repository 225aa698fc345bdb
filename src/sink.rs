//! 스트림 싱크
//!
//! 이미지가 최종적으로 기록되는 저장소. 쓰기 커서는 세션이 관리하고
//! 싱크는 write/seek만 제공

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Error, Result};

/// 스트림 싱크 인터페이스
pub trait StreamSink {
    /// 현재 위치에 데이터 기록
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// 쓰기 위치 이동. 지원하지 않는 싱크는 Unsupported
    fn seek(&mut self, _offset: u64) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// 쓰기 가능 여부 (false면 스트림 시작 자체가 거부됨)
    fn is_writable(&self) -> bool {
        true
    }

    /// seek 지원 여부
    fn is_seekable(&self) -> bool {
        false
    }
}

impl<S: StreamSink + ?Sized> StreamSink for &mut S {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        (**self).seek(offset)
    }

    fn is_writable(&self) -> bool {
        (**self).is_writable()
    }

    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }
}

/// 메모리 싱크
///
/// 버퍼는 공유되므로 스트림 진행 중에도 `snapshot()`으로 내용 확인 가능
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
    position: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 현재 기록된 내용 복사본
    pub fn snapshot(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }
}

impl StreamSink for MemorySink {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut buffer = self.buffer.lock();
        let end = self.position + data.len();
        if buffer.len() < end {
            buffer.resize(end, 0);
        }
        buffer[self.position..end].copy_from_slice(data);
        self.position = end;
        Ok(())
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.position = usize::try_from(offset)
            .map_err(|_| Error::InvalidArgument(format!("오프셋 범위 초과: {}", offset)))?;
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// 파일 싱크
#[derive(Debug)]
pub struct FileSink {
    file: File,
}

impl FileSink {
    /// 파일 생성 (기존 내용은 삭제)
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self { file })
    }

    /// 기록 내용을 저장 장치에 반영
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

impl StreamSink for FileSink {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data)?;
        Ok(())
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        true
    }
}
