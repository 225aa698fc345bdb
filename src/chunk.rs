//! 청크 슬롯 테이블
//!
//! - ChunkSlot: 도착한 청크 하나의 메타데이터 (버퍼는 복사하지 않고 참조만 보관)
//! - SlotTable: 고정 크기 슬롯 풀. 가득 차면 백프레셔(Busy)의 근거가 됨
//!
//! 모든 연산은 작은 고정 용량에 대한 선형 탐색

use bytes::Bytes;

use crate::{Error, Result};

/// 청크 ID (프로바이더가 부여, 해석하지 않음)
pub type ChunkId = u32;

/// 도착 번호 (요청자가 enqueue 시점에 부여, 1부터 증가)
pub type ArrivalNumber = u32;

/// 슬롯 처리 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotStatus {
    #[default]
    Empty,
    Pending,
    ProcessedSuccess,
    ProcessedFail,
}

/// 외부에 보고되는 청크 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkStatus {
    #[default]
    Pending,
    Processed,
    Refused,
}

impl From<SlotStatus> for ChunkStatus {
    fn from(status: SlotStatus) -> Self {
        match status {
            SlotStatus::Pending => ChunkStatus::Pending,
            SlotStatus::ProcessedSuccess => ChunkStatus::Processed,
            // Empty 슬롯은 보고 대상이 아님
            SlotStatus::ProcessedFail | SlotStatus::Empty => ChunkStatus::Refused,
        }
    }
}

/// 청크 상태 보고 항목
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkInfo {
    pub chunk_id: ChunkId,
    pub status: ChunkStatus,
}

/// 청크 슬롯
#[derive(Debug, Clone, Default)]
pub struct ChunkSlot {
    /// 처리 상태
    pub status: SlotStatus,

    /// 청크 ID
    pub chunk_id: ChunkId,

    /// 대상 이미지 내 오프셋 (바이트)
    pub offset: u64,

    /// 청크 데이터 (비어 있으면 seek/종료 마커)
    pub data: Bytes,

    /// 도착 번호
    pub arrival_number: ArrivalNumber,
}

impl ChunkSlot {
    pub fn is_empty(&self) -> bool {
        self.status == SlotStatus::Empty
    }

    /// 슬롯 비우기 (버퍼 참조 해제)
    fn clear(&mut self) {
        self.status = SlotStatus::Empty;
        self.data = Bytes::new();
    }
}

/// 고정 용량 슬롯 풀
#[derive(Debug)]
pub struct SlotTable {
    slots: Vec<ChunkSlot>,
}

impl SlotTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![ChunkSlot::default(); capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 모든 슬롯을 Empty로 초기화
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(ChunkSlot::clear);
    }

    /// 첫 번째 빈 슬롯에 청크 기록. 빈 슬롯이 없으면 None
    pub fn allocate(
        &mut self,
        chunk_id: ChunkId,
        offset: u64,
        data: Bytes,
        arrival_number: ArrivalNumber,
    ) -> Option<&ChunkSlot> {
        let slot = self.slots.iter_mut().find(|s| s.is_empty())?;

        slot.status = SlotStatus::Pending;
        slot.chunk_id = chunk_id;
        slot.offset = offset;
        slot.data = data;
        slot.arrival_number = arrival_number;
        Some(slot)
    }

    /// 주어진 도착 번호의 Pending 슬롯 인덱스
    pub fn find_pending(&self, arrival_number: ArrivalNumber) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.status == SlotStatus::Pending && s.arrival_number == arrival_number)
    }

    pub fn get(&self, index: usize) -> Option<&ChunkSlot> {
        self.slots.get(index)
    }

    /// 슬롯 상태 변경
    pub fn set_status(&mut self, index: usize, status: SlotStatus) {
        if let Some(slot) = self.slots.get_mut(index) {
            if status == SlotStatus::Empty {
                slot.clear();
            } else {
                slot.status = status;
            }
        }
    }

    /// 비어 있지 않은 슬롯 수
    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_empty()).count()
    }

    /// Pending 슬롯 수
    pub fn pending_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.status == SlotStatus::Pending)
            .count()
    }

    /// 남아 있는 Pending 슬롯을 모두 실패 처리. 실패 처리한 개수 반환
    pub fn fail_pending(&mut self) -> usize {
        let mut count = 0;
        for slot in self
            .slots
            .iter_mut()
            .filter(|s| s.status == SlotStatus::Pending)
        {
            slot.status = SlotStatus::ProcessedFail;
            count += 1;
        }
        count
    }

    /// 비어 있지 않은 슬롯 인덱스 (도착 번호 오름차순)
    fn occupied_in_arrival_order(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_empty())
            .map(|(i, _)| i)
            .collect();
        indices.sort_by_key(|&i| self.slots[i].arrival_number);
        indices
    }

    /// 상태 보고 후 처리 완료된 슬롯 해제
    ///
    /// 출력 버퍼가 점유 슬롯 수보다 작으면 아무것도 건드리지 않고 Busy
    pub fn drain_status(&mut self, out: &mut [ChunkInfo]) -> Result<usize> {
        if self.occupied_count() > out.len() {
            return Err(Error::Busy);
        }

        let indices = self.occupied_in_arrival_order();
        for (entry, &index) in out.iter_mut().zip(indices.iter()) {
            let slot = &mut self.slots[index];
            *entry = ChunkInfo {
                chunk_id: slot.chunk_id,
                status: slot.status.into(),
            };

            if slot.status != SlotStatus::Pending {
                slot.clear();
            }
        }

        Ok(indices.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> Bytes {
        Bytes::from(vec![0xAB; len])
    }

    fn info(chunk_id: ChunkId, status: ChunkStatus) -> ChunkInfo {
        ChunkInfo { chunk_id, status }
    }

    #[test]
    fn test_allocate_until_full() {
        let mut table = SlotTable::new(2);

        assert!(table.allocate(10, 0, payload(4), 1).is_some());
        assert!(table.allocate(11, 4, payload(4), 2).is_some());
        assert!(table.allocate(12, 8, payload(4), 3).is_none());

        // 기존 슬롯은 그대로
        assert_eq!(table.occupied_count(), 2);
        assert_eq!(table.find_pending(1), Some(0));
        assert_eq!(table.find_pending(2), Some(1));
    }

    #[test]
    fn test_find_pending_ignores_processed() {
        let mut table = SlotTable::new(4);
        table.allocate(1, 0, payload(1), 1);
        table.set_status(0, SlotStatus::ProcessedSuccess);

        assert_eq!(table.find_pending(1), None);
        assert_eq!(table.pending_count(), 0);
        assert_eq!(table.occupied_count(), 1);
    }

    #[test]
    fn test_drain_in_arrival_order() {
        let mut table = SlotTable::new(4);
        table.allocate(7, 0, payload(1), 1);
        table.allocate(8, 1, payload(1), 2);
        table.allocate(9, 2, payload(1), 3);

        // 슬롯 0을 비우고 도착 번호 4를 앞 슬롯에 배치
        table.set_status(0, SlotStatus::Empty);
        table.allocate(6, 3, payload(1), 4);
        table.set_status(1, SlotStatus::ProcessedSuccess);
        table.set_status(2, SlotStatus::ProcessedFail);

        let mut out = [ChunkInfo::default(); 4];
        let count = table.drain_status(&mut out).unwrap();

        assert_eq!(count, 3);
        assert_eq!(
            &out[..count],
            &[
                info(8, ChunkStatus::Processed),
                info(9, ChunkStatus::Refused),
                info(6, ChunkStatus::Pending),
            ]
        );

        // Pending 슬롯만 남음
        assert_eq!(table.occupied_count(), 1);
        assert_eq!(table.pending_count(), 1);
    }

    #[test]
    fn test_drain_undersized_buffer_is_side_effect_free() {
        let mut table = SlotTable::new(3);
        table.allocate(1, 0, payload(1), 1);
        table.allocate(2, 1, payload(1), 2);
        table.set_status(0, SlotStatus::ProcessedSuccess);

        let mut out = [ChunkInfo::default(); 1];
        assert_eq!(table.drain_status(&mut out), Err(Error::Busy));

        assert_eq!(table.occupied_count(), 2);
        assert_eq!(table.get(0).unwrap().status, SlotStatus::ProcessedSuccess);
        assert_eq!(out[0], ChunkInfo::default());
    }

    #[test]
    fn test_fail_pending_and_reset() {
        let mut table = SlotTable::new(3);
        table.allocate(1, 0, payload(1), 1);
        table.allocate(2, 1, payload(1), 2);
        table.set_status(0, SlotStatus::ProcessedSuccess);

        assert_eq!(table.fail_pending(), 1);
        assert_eq!(table.get(1).unwrap().status, SlotStatus::ProcessedFail);

        table.reset();
        assert_eq!(table.occupied_count(), 0);
        assert!(table.get(0).unwrap().data.is_empty());
    }
}
