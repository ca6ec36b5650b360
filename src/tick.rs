//! 틱 루프
//!
//! 호스트의 업데이트 주기마다 한 번: 링크 상태 변경 전달 → 수신 큐 비우기 → 디스패치.
//! 싱크는 항상 이 루프 안에서만 호출된다.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::codec::TypedPacket;
use crate::queue::InboundQueue;
use crate::registry::{Dispatch, Registry};
use crate::stats::LinkStats;
use crate::transport::LinkState;

/// 한 틱의 처리 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// 싱크까지 전달된 패킷 수
    pub dispatched: usize,

    /// 핸들러가 없던 패킷 수
    pub unrouted: usize,

    /// 실패한 싱크 호출 수
    pub sink_failures: usize,

    /// 이번 틱에 링크 상태 변경을 전달했는지
    pub link_changed: bool,

    /// 틱 이후 큐에 남은 패킷 수 (틱당 제한이 있을 때만 0이 아님)
    pub remaining: usize,
}

impl TickReport {
    /// 큐에서 꺼낸 패킷 수
    pub fn drained(&self) -> usize {
        self.dispatched + self.unrouted
    }
}

/// 틱 루프
pub struct TickLoop {
    queue: InboundQueue<TypedPacket>,
    registry: Registry,
    link_rx: Option<watch::Receiver<LinkState>>,
    max_per_tick: usize,
    stats: Arc<LinkStats>,
    ticks: u64,
}

impl TickLoop {
    pub fn new(queue: InboundQueue<TypedPacket>, registry: Registry) -> Self {
        Self {
            queue,
            registry,
            link_rx: None,
            max_per_tick: 0,
            stats: Arc::new(LinkStats::new()),
            ticks: 0,
        }
    }

    /// 링크 상태 구독 연결
    ///
    /// 현재 상태는 바로 소스들에 전달된다.
    pub fn with_link(mut self, mut link_rx: watch::Receiver<LinkState>) -> Self {
        let state = *link_rx.borrow_and_update();
        self.registry.apply_link_state(state);
        self.link_rx = Some(link_rx);
        self
    }

    /// 틱당 최대 디스패치 수 (0 = 제한 없음)
    pub fn with_max_per_tick(mut self, max_per_tick: usize) -> Self {
        self.max_per_tick = max_per_tick;
        self
    }

    /// 통계 카운터 공유
    pub fn with_stats(mut self, stats: Arc<LinkStats>) -> Self {
        self.stats = stats;
        self
    }

    /// 한 틱 실행
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport {
            link_changed: self.apply_link_change(),
            ..TickReport::default()
        };

        for packet in self.queue.drain_up_to(self.max_per_tick) {
            let result = self.registry.dispatch(&packet.data_type, &packet.payload);
            self.stats
                .record_dispatch(result.is_routed(), result.failures());

            match result {
                Dispatch::Unrouted => report.unrouted += 1,
                Dispatch::Delivered { failed, .. } => {
                    report.dispatched += 1;
                    report.sink_failures += failed;
                }
            }
        }

        if self.max_per_tick != 0 {
            report.remaining = self.queue.len();
        }
        self.ticks += 1;

        if report.drained() > 0 {
            debug!(
                "틱 {}: dispatched={}, unrouted={}, failures={}",
                self.ticks, report.dispatched, report.unrouted, report.sink_failures
            );
        }
        report
    }

    fn apply_link_change(&mut self) -> bool {
        let Some(link_rx) = self.link_rx.as_mut() else {
            return false;
        };
        // 송신측이 사라진 경우도 변경 없음으로 본다
        if !matches!(link_rx.has_changed(), Ok(true)) {
            return false;
        }

        let state = *link_rx.borrow_and_update();
        self.registry.apply_link_state(state);
        true
    }

    /// 주기적으로 틱 실행
    ///
    /// `shutdown`이 완료되면 멈추고 실행한 틱 수를 돌려준다.
    pub async fn run<F>(&mut self, period: Duration, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("틱 루프 시작: period={:?}", period);
        let mut ticks = 0u64;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.tick();
                    ticks += 1;
                }
            }
        }
        info!("틱 루프 종료: {} ticks", ticks);
        ticks
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// 대기 중인 패킷 수
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// 지금까지 실행한 틱 수
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn stats(&self) -> &Arc<LinkStats> {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use bytes::Bytes;
    use rand::Rng;

    use super::*;
    use crate::queue::InboundProducer;
    use crate::registry::tests::{RecordingOutbound, RecordingSink};
    use crate::registry::DataSource;
    use crate::source::SourceHandle;

    fn tick_loop() -> (InboundProducer<TypedPacket>, TickLoop) {
        let (producer, queue) = InboundQueue::unbounded();
        let registry = Registry::new(Arc::new(RecordingOutbound::default()));
        (producer, TickLoop::new(queue, registry))
    }

    fn packet(data_type: &str, payload: &'static [u8]) -> TypedPacket {
        TypedPacket::new(data_type, Bytes::from_static(payload))
    }

    #[test]
    fn test_tick_drains_in_order() {
        let (producer, mut tick) = tick_loop();
        let sink = RecordingSink::new(&["SensorData", "UIEvent"]);
        tick.registry_mut().add_sink(sink.clone());

        producer.push(packet("SensorData", b"1")).unwrap();
        producer.push(packet("UIEvent", b"2")).unwrap();
        producer.push(packet("SensorData", b"3")).unwrap();

        let report = tick.tick();
        assert_eq!(report.dispatched, 3);
        assert_eq!(tick.pending(), 0);

        let calls = sink.calls.lock();
        let payloads: Vec<Vec<u8>> = calls.iter().map(|(_, p)| p.clone()).collect();
        assert_eq!(payloads, vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]);
    }

    #[test]
    fn test_unrouted_and_failing_sinks() {
        let (producer, mut tick) = tick_loop();
        let failing = RecordingSink::failing(&["ObjectUpdate"]);
        let healthy = RecordingSink::new(&["ObjectUpdate"]);
        tick.registry_mut().add_sink(failing);
        tick.registry_mut().add_sink(healthy.clone());

        producer.push(packet("Unknown", b"x")).unwrap();
        producer.push(packet("ObjectUpdate", b"{}")).unwrap();

        let report = tick.tick();
        assert_eq!(report.unrouted, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.sink_failures, 1);
        assert_eq!(healthy.calls.lock().len(), 1);

        let stats = tick.stats().snapshot();
        assert_eq!(stats.packets_unrouted, 1);
        assert_eq!(stats.sink_failures, 1);
    }

    #[test]
    fn test_max_per_tick_keeps_leftovers() {
        let (producer, mut tick) = tick_loop();
        tick = tick.with_max_per_tick(2);
        let sink = RecordingSink::new(&["SensorData"]);
        tick.registry_mut().add_sink(sink.clone());

        for _ in 0..5 {
            producer.push(packet("SensorData", b"{}")).unwrap();
        }

        assert_eq!(tick.tick().remaining, 3);
        assert_eq!(tick.tick().remaining, 1);
        let last = tick.tick();
        assert_eq!(last.dispatched, 1);
        assert_eq!(last.remaining, 0);
        assert_eq!(sink.calls.lock().len(), 5);
    }

    #[test]
    fn test_link_change_reaches_sources() {
        let (_producer, queue) = InboundQueue::unbounded();
        let mut registry = Registry::new(Arc::new(RecordingOutbound::default()));
        let source = Arc::new(SourceHandle::new("SensorData"));
        registry.add_source(source.clone()).unwrap();

        let (link_tx, link_rx) = watch::channel(LinkState::default());
        let mut tick = TickLoop::new(queue, registry).with_link(link_rx);

        assert!(!tick.tick().link_changed);
        assert!(!source.is_enabled());

        link_tx.send_replace(LinkState {
            initialized: true,
            has_remote: true,
        });
        assert!(tick.tick().link_changed);
        assert!(source.is_enabled());

        // 송신측이 사라져도 틱은 계속 돈다
        drop(link_tx);
        assert!(!tick.tick().link_changed);
        assert!(source.is_enabled());
    }

    #[test]
    fn test_concurrent_producers_drained_over_ticks() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 2_000;

        let (producer, mut tick) = tick_loop();
        let sink = RecordingSink::new(&["SensorData"]);
        tick.registry_mut().add_sink(sink.clone());

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|_| {
                let producer = producer.clone();
                thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    for _ in 0..PER_PRODUCER {
                        producer.push(packet("SensorData", b"{}")).unwrap();
                        if rng.gen_ratio(1, 100) {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let mut drained = 0;
        while handles.iter().any(|handle| !handle.is_finished()) {
            drained += tick.tick().drained();
        }
        for handle in handles {
            handle.join().unwrap();
        }
        drained += tick.tick().drained();

        assert_eq!(drained, PRODUCERS * PER_PRODUCER);
        assert_eq!(sink.calls.lock().len(), PRODUCERS * PER_PRODUCER);
        assert_eq!(tick.pending(), 0);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let (producer, mut tick) = tick_loop();
        let sink = RecordingSink::new(&["SensorData"]);
        tick.registry_mut().add_sink(sink.clone());
        producer.push(packet("SensorData", b"{}")).unwrap();

        let ticks = tick
            .run(
                Duration::from_millis(5),
                tokio::time::sleep(Duration::from_millis(60)),
            )
            .await;

        assert!(ticks > 0);
        assert_eq!(tick.ticks(), ticks);
        assert_eq!(sink.calls.lock().len(), 1);
    }
}
