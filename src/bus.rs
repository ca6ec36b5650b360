//! 데이터 버스
//!
//! 전송 계층, 수신 큐, 레지스트리, 틱 루프를 한데 묶는다.
//!
//! ```no_run
//! use std::sync::Arc;
//! use phonelink::{Config, DataBus, DataSink, DataSource, SourceHandle};
//!
//! # async fn example() -> phonelink::Result<()> {
//! let sensor = Arc::new(SourceHandle::new("SensorData"));
//! let sources: Vec<Arc<dyn DataSource>> = vec![sensor.clone()];
//! let sinks: Vec<Arc<dyn DataSink>> = Vec::new();
//!
//! let mut bus = DataBus::new(Config::phone(), sources, sinks)?;
//! bus.connect("192.168.0.10", 9981).await?;
//! bus.tick();
//! sensor.emit(br#"{"magneticHeading":90.0}"#);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::codec::TypedCodec;
use crate::registry::{DataSink, DataSource, Registry};
use crate::stats::{LinkStats, StatsSnapshot};
use crate::tick::{TickLoop, TickReport};
use crate::transport::{LinkState, Outbound, Transport};
use crate::{Config, Result};

/// 데이터 버스
pub struct DataBus {
    config: Config,
    transport: Arc<Transport<TypedCodec>>,
    tick: TickLoop,
}

impl DataBus {
    /// 소스/싱크 집합으로 버스 구성 (아직 바인드하지 않음)
    pub fn new<S, K>(config: Config, sources: S, sinks: K) -> Result<Self>
    where
        S: IntoIterator<Item = Arc<dyn DataSource>>,
        K: IntoIterator<Item = Arc<dyn DataSink>>,
    {
        let stats = Arc::new(LinkStats::new());
        let (transport, queue) = Transport::with_queue(TypedCodec, config.clone());
        let transport = Arc::new(transport.with_stats(stats.clone()));

        let outbound: Arc<dyn Outbound> = transport.clone();
        let registry = Registry::build(outbound, sources, sinks)?;

        let tick = TickLoop::new(queue, registry)
            .with_link(transport.subscribe_link())
            .with_max_per_tick(config.max_dispatch_per_tick)
            .with_stats(stats);

        Ok(Self {
            config,
            transport,
            tick,
        })
    }

    /// 설정된 로컬 포트로 수신 시작 (원격 미설정)
    pub async fn listen(&self) -> Result<SocketAddr> {
        self.transport.initialize_local(self.config.local_port).await
    }

    /// 원격 엔드포인트와 함께 시작
    pub async fn connect(&self, remote_address: &str, remote_port: u16) -> Result<SocketAddr> {
        self.transport
            .initialize_with_remote(remote_address, remote_port, self.config.local_port)
            .await
    }

    pub fn set_remote_endpoint(&self, address: &str, port: u16) -> Result<()> {
        self.transport.set_remote_endpoint(address, port)
    }

    /// 직접 송신 (소스를 거치지 않음)
    pub fn send(&self, data_type: &str, payload: &[u8]) -> Result<usize> {
        self.transport.send(data_type, payload)
    }

    pub fn add_source(&mut self, source: Arc<dyn DataSource>) -> Result<bool> {
        self.tick.registry_mut().add_source(source)
    }

    pub fn add_sink(&mut self, sink: Arc<dyn DataSink>) -> bool {
        self.tick.registry_mut().add_sink(sink)
    }

    /// 한 틱 실행
    pub fn tick(&mut self) -> TickReport {
        self.tick.tick()
    }

    /// 설정된 주기로 틱 루프 실행
    pub async fn run<F>(&mut self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let period = self.config.tick_interval();
        self.tick.run(period, shutdown).await
    }

    /// 수신 정지 후 소켓 해제
    pub async fn shutdown(&mut self) {
        self.transport.shutdown().await;
        // 비활성화를 소스에 바로 반영
        self.tick.tick();
        info!("데이터 버스 종료: {}", self.stats().summary());
    }

    pub fn link_state(&self) -> LinkState {
        self.transport.link_state()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.transport.stats().snapshot()
    }

    pub fn transport(&self) -> &Arc<Transport<TypedCodec>> {
        &self.transport
    }

    pub fn registry(&self) -> &Registry {
        self.tick.registry()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
