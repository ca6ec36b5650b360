//! 전송 통계
//!
//! 수신 태스크, 송신 경로, 틱 루프가 동시에 갱신하므로 전부 원자적 카운터.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// 타입별로 따로 세는 데이터 타입 수 상한
///
/// 데이터 타입 문자열은 상대가 정하므로, 넘치는 타입은 [`OTHER_TYPES`] 하나로 합친다.
pub const MAX_TRACKED_TYPES: usize = 64;

/// 상한을 넘은 데이터 타입을 합산하는 키
pub const OTHER_TYPES: &str = "<other>";

/// 링크 통계 카운터
#[derive(Debug, Default)]
pub struct LinkStats {
    datagrams_received: AtomicU64,
    decode_failures: AtomicU64,
    packets_queued: AtomicU64,
    queue_drops: AtomicU64,
    datagrams_sent: AtomicU64,
    bytes_sent: AtomicU64,
    send_failures: AtomicU64,
    sends_rejected: AtomicU64,
    packets_dispatched: AtomicU64,
    packets_unrouted: AtomicU64,
    sink_failures: AtomicU64,

    /// 데이터 타입별 수신 수
    received_by_type: DashMap<String, u64>,
}

impl LinkStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 데이터그램 수신 기록
    pub fn record_datagram(&self) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
    }

    /// 디코딩 실패 기록
    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// 큐 삽입 결과 기록
    pub fn record_enqueue(&self, queued: bool) {
        if queued {
            self.packets_queued.fetch_add(1, Ordering::Relaxed);
        } else {
            self.queue_drops.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 데이터 타입별 수신 기록
    pub fn record_type(&self, data_type: &str) {
        if let Some(mut count) = self.received_by_type.get_mut(data_type) {
            *count += 1;
            return;
        }
        // 경합 시 상한을 살짝 넘을 수 있지만 무한히 커지지는 않는다
        let key = if self.received_by_type.len() < MAX_TRACKED_TYPES {
            data_type
        } else {
            OTHER_TYPES
        };
        *self.received_by_type.entry(key.to_string()).or_insert(0) += 1;
    }

    /// 송신 성공 기록
    pub fn record_sent(&self, bytes: usize) {
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// 송신 실패 기록 (소켓 에러)
    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// 송신 거부 기록 (전제조건 위반)
    pub fn record_send_rejected(&self) {
        self.sends_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// 디스패치 결과 기록
    pub fn record_dispatch(&self, routed: bool, sink_failures: usize) {
        self.packets_dispatched.fetch_add(1, Ordering::Relaxed);
        if !routed {
            self.packets_unrouted.fetch_add(1, Ordering::Relaxed);
        }
        self.sink_failures
            .fetch_add(sink_failures as u64, Ordering::Relaxed);
    }

    /// 현재 값 스냅샷
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            packets_queued: self.packets_queued.load(Ordering::Relaxed),
            queue_drops: self.queue_drops.load(Ordering::Relaxed),
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            sends_rejected: self.sends_rejected.load(Ordering::Relaxed),
            packets_dispatched: self.packets_dispatched.load(Ordering::Relaxed),
            packets_unrouted: self.packets_unrouted.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            received_by_type: self
                .received_by_type
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        }
    }
}

/// 통계 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub datagrams_received: u64,
    pub decode_failures: u64,
    pub packets_queued: u64,
    pub queue_drops: u64,
    pub datagrams_sent: u64,
    pub bytes_sent: u64,
    pub send_failures: u64,
    pub sends_rejected: u64,
    pub packets_dispatched: u64,
    pub packets_unrouted: u64,
    pub sink_failures: u64,
    pub received_by_type: BTreeMap<String, u64>,
}

impl StatsSnapshot {
    /// 디코딩 실패율
    pub fn decode_failure_rate(&self) -> f64 {
        if self.datagrams_received == 0 {
            return 0.0;
        }
        self.decode_failures as f64 / self.datagrams_received as f64
    }

    /// 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "rx={} (bad={}, dropped={}), tx={} ({} bytes, failed={}, rejected={}), dispatched={} (unrouted={}, sink_failures={})",
            self.datagrams_received,
            self.decode_failures,
            self.queue_drops,
            self.datagrams_sent,
            self.bytes_sent,
            self.send_failures,
            self.sends_rejected,
            self.packets_dispatched,
            self.packets_unrouted,
            self.sink_failures,
        )
    }
}
