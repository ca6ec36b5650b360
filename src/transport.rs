//! UDP 전송 계층
//!
//! - 소켓과 링크 상태(초기화 여부, 원격 엔드포인트)를 단독 소유
//! - 전용 태스크에서 수신 → 디코딩 → 수신 큐
//! - 송신은 논블로킹 단발 (ACK, 재시도 없음)

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::net::UdpSocket;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec::{self, FrameCodec, TaggedCodec, TaggedFrame, TypedCodec};
use crate::queue::{InboundProducer, InboundQueue};
use crate::stats::LinkStats;
use crate::{Config, Error, Result, SendPrecondition};

/// 링크 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkState {
    /// 로컬 소켓 바인드 완료
    pub initialized: bool,

    /// 원격 엔드포인트 설정됨
    pub has_remote: bool,
}

impl LinkState {
    /// 송신 가능 여부
    pub fn is_connected(&self) -> bool {
        self.initialized && self.has_remote
    }
}

/// 송신 경로
///
/// 데이터 소스가 내보낸 패킷을 실제로 보내는 쪽. 레지스트리는 이 trait만 안다.
pub trait Outbound: Send + Sync {
    fn send_packet(&self, data_type: &str, payload: &[u8], allow_empty: bool) -> Result<usize>;
}

/// 주소 문자열 + 포트 파싱
pub fn parse_endpoint(address: &str, port: u16) -> Result<SocketAddr> {
    address
        .trim()
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, port))
        .map_err(|_| Error::AddressParse {
            address: address.to_string(),
        })
}

/// 소켓과 엔드포인트
#[derive(Default)]
struct Endpoints {
    socket: Option<Arc<UdpSocket>>,
    local: Option<SocketAddr>,
    remote: Option<SocketAddr>,
    state: LinkState,
}

/// 수신 태스크 핸들
struct ReceiveTask {
    running: Arc<AtomicBool>,
    stop: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// UDP 전송 계층
pub struct Transport<C: FrameCodec> {
    config: Config,
    codec: Arc<C>,
    producer: InboundProducer<C::Frame>,
    endpoints: RwLock<Endpoints>,
    receive_task: Mutex<Option<ReceiveTask>>,
    link_tx: watch::Sender<LinkState>,
    stats: Arc<LinkStats>,
}

impl<C: FrameCodec> Transport<C> {
    /// 새 전송 계층 생성
    pub fn new(codec: C, config: Config, producer: InboundProducer<C::Frame>) -> Self {
        let (link_tx, _) = watch::channel(LinkState::default());
        Self {
            config,
            codec: Arc::new(codec),
            producer,
            endpoints: RwLock::new(Endpoints::default()),
            receive_task: Mutex::new(None),
            link_tx,
            stats: Arc::new(LinkStats::new()),
        }
    }

    /// 수신 큐와 함께 생성
    pub fn with_queue(codec: C, config: Config) -> (Self, InboundQueue<C::Frame>) {
        let (producer, queue) = InboundQueue::with_capacity(config.inbound_queue_capacity);
        (Self::new(codec, config, producer), queue)
    }

    /// 통계 카운터 공유
    pub fn with_stats(mut self, stats: Arc<LinkStats>) -> Self {
        self.stats = stats;
        self
    }

    /// 로컬 포트만 바인드 (원격 엔드포인트 초기화)
    pub async fn initialize_local(&self, local_port: u16) -> Result<SocketAddr> {
        self.stop_receive().await;
        self.bind_and_start(local_port, None).await
    }

    /// 원격 엔드포인트와 함께 초기화
    ///
    /// 주소 파싱과 바인드 둘 다 성공해야 초기화 상태가 된다.
    pub async fn initialize_with_remote(
        &self,
        remote_address: &str,
        remote_port: u16,
        local_port: u16,
    ) -> Result<SocketAddr> {
        self.stop_receive().await;

        let remote = match parse_endpoint(remote_address, remote_port) {
            Ok(remote) => remote,
            Err(e) => {
                error!("네트워크 초기화 실패: {}", e);
                self.fail_initialize();
                return Err(e);
            }
        };

        self.bind_and_start(local_port, Some(remote)).await
    }

    async fn bind_and_start(
        &self,
        local_port: u16,
        remote: Option<SocketAddr>,
    ) -> Result<SocketAddr> {
        let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, local_port)).await {
            Ok(socket) => Arc::new(socket),
            Err(source) => {
                error!("네트워크 초기화 실패: port={}: {}", local_port, source);
                self.fail_initialize();
                return Err(Error::Bind {
                    port: local_port,
                    source,
                });
            }
        };

        // 리액터가 쓰기 가능을 한 번 관측해야 try_send_to가 WouldBlock 없이 나간다
        if let Err(source) = socket.writable().await {
            error!("네트워크 초기화 실패: port={}: {}", local_port, source);
            self.fail_initialize();
            return Err(Error::Io(source));
        }

        let local = socket
            .local_addr()
            .unwrap_or_else(|_| SocketAddr::from((Ipv4Addr::UNSPECIFIED, local_port)));

        *self.receive_task.lock() = Some(self.spawn_receive(socket.clone()));

        let state = {
            let mut endpoints = self.endpoints.write();
            endpoints.socket = Some(socket);
            endpoints.local = Some(local);
            endpoints.remote = remote;
            endpoints.state = LinkState {
                initialized: true,
                has_remote: remote.is_some(),
            };
            endpoints.state
        };
        self.notify(state);

        match remote {
            Some(remote) => info!("네트워크 초기화: local={}, remote={}", local, remote),
            None => info!("네트워크 초기화: local={}, remote=미설정", local),
        }

        Ok(local)
    }

    fn fail_initialize(&self) {
        let state = {
            let mut endpoints = self.endpoints.write();
            *endpoints = Endpoints::default();
            endpoints.state
        };
        self.notify(state);
    }

    /// 원격 엔드포인트 변경 (재바인드 없음)
    ///
    /// 주소가 잘못되면 기존 원격 설정은 그대로 둔다. 상태 알림은 항상 발생.
    pub fn set_remote_endpoint(&self, address: &str, port: u16) -> Result<()> {
        let parsed = parse_endpoint(address, port);

        let state = {
            let mut endpoints = self.endpoints.write();
            if let Ok(remote) = parsed {
                endpoints.remote = Some(remote);
                endpoints.state.has_remote = true;
            }
            endpoints.state
        };
        self.notify(state);

        match parsed {
            Ok(remote) => {
                info!("원격 엔드포인트 설정: {}", remote);
                Ok(())
            }
            Err(e) => {
                error!("원격 엔드포인트 설정 실패: {}", e);
                Err(e)
            }
        }
    }

    /// 수신 루프 정지 후 소켓 해제
    pub async fn shutdown(&self) {
        self.stop_receive().await;

        let state = {
            let mut endpoints = self.endpoints.write();
            endpoints.local = None;
            endpoints.state.initialized = false;
            endpoints.state
        };
        self.notify(state);
        info!("네트워크 종료");
    }

    async fn stop_receive(&self) {
        let task = self.receive_task.lock().take();
        if let Some(task) = task {
            task.running.store(false, Ordering::SeqCst);
            task.stop.notify_one();
            if let Err(e) = task.handle.await {
                warn!("수신 태스크 종료 에러: {}", e);
            }
        }
        // 태스크가 끝난 뒤에만 소켓을 놓는다
        self.endpoints.write().socket = None;
    }

    fn spawn_receive(&self, socket: Arc<UdpSocket>) -> ReceiveTask {
        let running = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(Notify::new());

        let handle = tokio::spawn(receive_loop(
            socket,
            self.codec.clone(),
            self.producer.clone(),
            self.stats.clone(),
            running.clone(),
            stop.clone(),
            self.config.recv_buffer_size,
        ));

        ReceiveTask {
            running,
            stop,
            handle,
        }
    }

    fn notify(&self, state: LinkState) {
        self.link_tx.send_replace(state);
        info!("링크 상태 변경: connected={}", state.is_connected());
    }

    /// 송신 준비 확인
    fn ready(&self) -> std::result::Result<(Arc<UdpSocket>, SocketAddr), SendPrecondition> {
        let endpoints = self.endpoints.read();
        let socket = match (&endpoints.socket, endpoints.state.initialized) {
            (Some(socket), true) => socket.clone(),
            _ => return Err(SendPrecondition::NotInitialized),
        };
        match (endpoints.remote, endpoints.state.has_remote) {
            (Some(remote), true) => Ok((socket, remote)),
            _ => Err(SendPrecondition::NoRemoteEndpoint),
        }
    }

    /// 송신 전제조건(초기화, 원격 엔드포인트)만 확인
    pub fn check_ready(&self) -> Result<()> {
        self.ready()
            .map(|_| ())
            .map_err(|reason| self.reject(reason))
    }

    fn reject(&self, reason: SendPrecondition) -> Error {
        warn!("송신 불가: {}", reason);
        self.stats.record_send_rejected();
        Error::SendPrecondition(reason)
    }

    fn send_datagram(&self, socket: &UdpSocket, remote: SocketAddr, frame: &[u8]) -> Result<usize> {
        match socket.try_send_to(frame, remote) {
            Ok(sent) => {
                self.stats.record_sent(sent);
                Ok(sent)
            }
            Err(e) => {
                warn!("송신 실패: {}: {}", remote, e);
                self.stats.record_send_failure();
                Err(Error::Io(e))
            }
        }
    }

    /// 현재 링크 상태
    pub fn link_state(&self) -> LinkState {
        self.endpoints.read().state
    }

    /// 송신 가능 여부
    pub fn is_connected(&self) -> bool {
        self.link_state().is_connected()
    }

    /// 링크 상태 변경 구독
    pub fn subscribe_link(&self) -> watch::Receiver<LinkState> {
        self.link_tx.subscribe()
    }

    /// 바인드된 로컬 주소
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoints.read().local
    }

    /// 원격 주소
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.endpoints.read().remote
    }

    /// 통계
    pub fn stats(&self) -> &Arc<LinkStats> {
        &self.stats
    }

    /// 수신 루프 실행 여부
    pub fn is_receiving(&self) -> bool {
        self.receive_task
            .lock()
            .as_ref()
            .map(|task| task.running.load(Ordering::SeqCst) && !task.handle.is_finished())
            .unwrap_or(false)
    }
}

impl Transport<TypedCodec> {
    /// 타입 패킷 송신
    ///
    /// 전제조건(초기화, 원격 엔드포인트, 데이터 타입, 페이로드)을 순서대로 확인한다.
    pub fn send(&self, data_type: &str, payload: &[u8]) -> Result<usize> {
        self.send_checked(data_type, payload, false)
    }

    fn send_checked(&self, data_type: &str, payload: &[u8], allow_empty: bool) -> Result<usize> {
        let (socket, remote) = self.ready().map_err(|reason| self.reject(reason))?;

        if data_type.is_empty() {
            return Err(self.reject(SendPrecondition::EmptyDataType));
        }
        if payload.is_empty() && !allow_empty {
            return Err(self.reject(SendPrecondition::EmptyPayload));
        }

        let frame = codec::encode(data_type, payload)?;
        self.send_datagram(&socket, remote, &frame)
    }
}

impl Outbound for Transport<TypedCodec> {
    fn send_packet(&self, data_type: &str, payload: &[u8], allow_empty: bool) -> Result<usize> {
        self.send_checked(data_type, payload, allow_empty)
    }
}

impl Transport<TaggedCodec> {
    /// 태그 프레임 송신
    pub fn send_tagged(&self, frame: &TaggedFrame) -> Result<usize> {
        let (socket, remote) = self.ready().map_err(|reason| self.reject(reason))?;
        self.send_datagram(&socket, remote, &frame.encode())
    }

    /// `TXT|` 메시지 송신
    pub fn send_text(&self, text: &str) -> Result<usize> {
        self.send_tagged(&TaggedFrame::Text(text.to_string()))
    }
}

impl<C: FrameCodec> Drop for Transport<C> {
    fn drop(&mut self) {
        if let Some(task) = self.receive_task.get_mut().take() {
            task.running.store(false, Ordering::SeqCst);
            task.stop.notify_one();
            task.handle.abort();
        }
    }
}

/// 수신 에러 백오프
///
/// 같은 에러가 연달아 나면 대기 시간을 두 배씩 늘린다. 로그는 처음과 100번마다.
#[derive(Debug, Default)]
struct RecvErrorBackoff {
    consecutive: u32,
}

impl RecvErrorBackoff {
    const INITIAL: Duration = Duration::from_millis(1);
    const MAX: Duration = Duration::from_millis(100);
    const LOG_EVERY: u32 = 100;

    /// 에러 기록 후 (대기 시간, 로그 여부)
    fn on_error(&mut self) -> (Duration, bool) {
        self.consecutive = self.consecutive.saturating_add(1);
        let shift = (self.consecutive - 1).min(16);
        let delay = Self::INITIAL.saturating_mul(1 << shift).min(Self::MAX);
        let log = self.consecutive == 1 || self.consecutive % Self::LOG_EVERY == 0;
        (delay, log)
    }

    fn reset(&mut self) {
        self.consecutive = 0;
    }
}

/// 수신 루프
///
/// 한 번에 하나의 수신만 대기한다. 잘못된 데이터그램은 버리고 계속 진행.
/// 버퍼는 설정값보다 1바이트 크게 잡아 잘린 데이터그램을 구분한다.
async fn receive_loop<C: FrameCodec>(
    socket: Arc<UdpSocket>,
    codec: Arc<C>,
    producer: InboundProducer<C::Frame>,
    stats: Arc<LinkStats>,
    running: Arc<AtomicBool>,
    stop: Arc<Notify>,
    buf_size: usize,
) {
    let limit = buf_size.max(1);
    let mut buf = vec![0u8; limit + 1];
    let mut backoff = RecvErrorBackoff::default();

    while running.load(Ordering::SeqCst) {
        tokio::select! {
            _ = stop.notified() => break,
            result = socket.recv_from(&mut buf) => {
                if result.is_ok() {
                    backoff.reset();
                }
                match result {
                    Ok((0, _)) => {
                        stats.record_datagram();
                    }
                    Ok((len, from)) if len > limit => {
                        stats.record_datagram();
                        stats.record_decode_failure();
                        warn!("데이터그램 드롭: from={}, 수신 버퍼({} bytes) 초과", from, limit);
                    }
                    Ok((len, from)) => {
                        stats.record_datagram();

                        let frame = match codec.decode_frame(&buf[..len]) {
                            Ok(frame) => frame,
                            Err(e) => {
                                stats.record_decode_failure();
                                warn!("데이터그램 드롭: from={}, {}", from, e);
                                continue;
                            }
                        };

                        if let Some(data_type) = codec.data_type(&frame) {
                            stats.record_type(data_type);
                        }

                        match producer.push(frame) {
                            Ok(queued) => stats.record_enqueue(queued),
                            Err(_) => {
                                debug!("수신 큐가 닫힘, 수신 루프 정지");
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        let (delay, log) = backoff.on_error();
                        if log {
                            warn!("수신 에러 (연속 {}회): {}", backoff.consecutive, e);
                        }
                        tokio::select! {
                            _ = stop.notified() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }
    }

    debug!("수신 루프 종료");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::codec::TypedPacket;

    async fn wait_for<T>(queue: &InboundQueue<T>, count: usize) -> Vec<T> {
        let mut items = Vec::new();
        for _ in 0..400 {
            items.extend(queue.drain());
            if items.len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        items
    }

    fn typed() -> (Transport<TypedCodec>, InboundQueue<TypedPacket>) {
        Transport::with_queue(TypedCodec, Config::default())
    }

    #[tokio::test]
    async fn test_send_before_initialize_is_noop() {
        let (transport, _queue) = typed();
        let link_rx = transport.subscribe_link();

        let result = transport.send("Ping", &[0x01]);
        assert!(matches!(
            result,
            Err(Error::SendPrecondition(SendPrecondition::NotInitialized))
        ));
        assert_eq!(transport.link_state(), LinkState::default());
        assert!(!link_rx.has_changed().unwrap());
        assert_eq!(transport.stats().snapshot().sends_rejected, 1);
    }

    #[tokio::test]
    async fn test_send_ping_end_to_end() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_port = peer.local_addr().unwrap().port();

        let (transport, _queue) = typed();
        let local = transport
            .initialize_with_remote("127.0.0.1", peer_port, 0)
            .await
            .unwrap();
        assert!(transport.is_connected());

        let sent = transport.send("Ping", &[0x01]).unwrap();
        let expected = codec::encode("Ping", &[0x01]).unwrap();
        assert_eq!(sent, expected.len());

        let mut buf = [0u8; 64];
        let (len, from) = tokio::time::timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], expected.as_ref());
        assert_eq!(from.port(), local.port());

        // 데이터그램은 정확히 하나
        let extra =
            tokio::time::timeout(Duration::from_millis(50), peer.recv_from(&mut buf)).await;
        assert!(extra.is_err());

        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_send_preconditions_in_order() {
        let (transport, _queue) = typed();
        transport.initialize_local(0).await.unwrap();

        assert!(matches!(
            transport.send("Ping", &[1]),
            Err(Error::SendPrecondition(SendPrecondition::NoRemoteEndpoint))
        ));

        transport.set_remote_endpoint("127.0.0.1", 9).unwrap();
        assert!(matches!(
            transport.send("", &[1]),
            Err(Error::SendPrecondition(SendPrecondition::EmptyDataType))
        ));
        assert!(matches!(
            transport.send("Ping", &[]),
            Err(Error::SendPrecondition(SendPrecondition::EmptyPayload))
        ));

        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_receive_decodes_and_drops_malformed() {
        let (transport, queue) = typed();
        let local = transport.initialize_local(0).await.unwrap();
        let target = SocketAddr::from((Ipv4Addr::LOCALHOST, local.port()));

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        peer.send_to(&[0x01, 0x02], target).await.unwrap();
        peer.send_to(&[0xFF, 0xFF, 0xFF, 0xFF, 0x00], target)
            .await
            .unwrap();
        peer.send_to(&codec::encode("SensorData", b"{}").unwrap(), target)
            .await
            .unwrap();

        let packets = wait_for(&queue, 1).await;
        assert_eq!(
            packets,
            vec![TypedPacket::new("SensorData", Bytes::from_static(b"{}"))]
        );
        assert!(transport.is_receiving());

        let stats = transport.stats().snapshot();
        assert_eq!(stats.decode_failures, 2);
        assert_eq!(stats.received_by_type["SensorData"], 1);

        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_set_remote_invalid_keeps_prior() {
        let (transport, _queue) = typed();
        transport
            .initialize_with_remote("127.0.0.1", 9000, 0)
            .await
            .unwrap();
        let mut link_rx = transport.subscribe_link();

        let result = transport.set_remote_endpoint("not-an-ip", 9000);
        assert!(matches!(result, Err(Error::AddressParse { .. })));
        assert!(transport.link_state().has_remote);
        assert_eq!(
            transport.remote_addr(),
            Some(SocketAddr::from((Ipv4Addr::LOCALHOST, 9000)))
        );
        // 실패해도 알림은 발생
        assert!(link_rx.has_changed().unwrap());
        assert!(link_rx.borrow_and_update().is_connected());

        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_initialize_with_bad_address() {
        let (transport, _queue) = typed();
        let result = transport.initialize_with_remote("999.1.1.1", 9000, 0).await;
        assert!(matches!(result, Err(Error::AddressParse { .. })));
        assert_eq!(transport.link_state(), LinkState::default());
        assert!(transport.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_bind_conflict_leaves_uninitialized() {
        let blocker = std::net::UdpSocket::bind("0.0.0.0:0").unwrap();
        let port = blocker.local_addr().unwrap().port();

        let (transport, _queue) = typed();
        let result = transport.initialize_local(port).await;
        assert!(matches!(result, Err(Error::Bind { port: p, .. }) if p == port));
        assert!(!transport.link_state().initialized);
        assert!(!transport.is_receiving());
    }

    #[tokio::test]
    async fn test_bind_conflict_with_remote_reverts_link() {
        let blocker = std::net::UdpSocket::bind("0.0.0.0:0").unwrap();
        let port = blocker.local_addr().unwrap().port();

        let (transport, _queue) = typed();
        transport
            .initialize_with_remote("127.0.0.1", 9000, 0)
            .await
            .unwrap();
        assert!(transport.is_connected());
        let mut link_rx = transport.subscribe_link();

        // 주소는 맞지만 바인드 실패: 원격 설정까지 전부 되돌린다
        let result = transport.initialize_with_remote("127.0.0.1", 9000, port).await;
        assert!(matches!(result, Err(Error::Bind { port: p, .. }) if p == port));

        let state = transport.link_state();
        assert!(!state.initialized);
        assert!(!state.has_remote);
        assert!(transport.remote_addr().is_none());
        assert!(transport.local_addr().is_none());
        assert!(!transport.is_receiving());

        assert!(link_rx.has_changed().unwrap());
        assert_eq!(*link_rx.borrow_and_update(), LinkState::default());

        assert!(matches!(
            transport.send("Ping", &[0x01]),
            Err(Error::SendPrecondition(SendPrecondition::NotInitialized))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_send_immediately_after_initialize() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_port = peer.local_addr().unwrap().port();

        // 바인드 직후 바로 송신해도 WouldBlock이 나면 안 된다
        for _ in 0..20 {
            let (transport, _queue) = typed();
            transport
                .initialize_with_remote("127.0.0.1", peer_port, 0)
                .await
                .unwrap();
            assert_eq!(transport.send("Ping", &[0x01]).unwrap(), 9);
            transport.shutdown().await;
        }

        let mut buf = [0u8; 64];
        for _ in 0..20 {
            let (len, _) = tokio::time::timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(&buf[..len], codec::encode("Ping", &[0x01]).unwrap().as_ref());
        }
    }

    #[tokio::test]
    async fn test_oversized_datagram_dropped() {
        let config = Config {
            recv_buffer_size: 16,
            ..Config::default()
        };
        let (transport, queue) = Transport::with_queue(TypedCodec, config);
        let local = transport.initialize_local(0).await.unwrap();
        let target = SocketAddr::from((Ipv4Addr::LOCALHOST, local.port()));

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        // 4 + 4 + 32 bytes: 버퍼를 넘어 잘리면 안 되고 버려져야 한다
        peer.send_to(&codec::encode("Ping", &[7; 32]).unwrap(), target)
            .await
            .unwrap();
        // 정확히 16 bytes는 통과
        let fits = codec::encode("Ping", &[7; 8]).unwrap();
        assert_eq!(fits.len(), 16);
        peer.send_to(&fits, target).await.unwrap();

        let packets = wait_for(&queue, 1).await;
        assert_eq!(
            packets,
            vec![TypedPacket::new("Ping", Bytes::from_static(&[7; 8]))]
        );

        let stats = transport.stats().snapshot();
        assert_eq!(stats.datagrams_received, 2);
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.received_by_type["Ping"], 1);

        transport.shutdown().await;
    }

    #[test]
    fn test_recv_error_backoff() {
        let mut backoff = RecvErrorBackoff::default();

        let (delay, log) = backoff.on_error();
        assert_eq!(delay, Duration::from_millis(1));
        assert!(log);

        let (delay, log) = backoff.on_error();
        assert_eq!(delay, Duration::from_millis(2));
        assert!(!log);

        for _ in 2..99 {
            backoff.on_error();
        }
        let (delay, log) = backoff.on_error();
        assert_eq!(backoff.consecutive, 100);
        assert_eq!(delay, RecvErrorBackoff::MAX);
        assert!(log);

        backoff.reset();
        assert_eq!(backoff.on_error(), (Duration::from_millis(1), true));
    }

    #[tokio::test]
    async fn test_shutdown_releases_port() {
        let (transport, _queue) = typed();
        let local = transport.initialize_local(0).await.unwrap();

        transport.shutdown().await;
        assert!(!transport.link_state().initialized);
        assert!(!transport.is_receiving());

        // 같은 포트로 다시 바인드 가능
        let again = transport.initialize_local(local.port()).await.unwrap();
        assert_eq!(again.port(), local.port());
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_reinitialize_clears_remote() {
        let (transport, _queue) = typed();
        transport
            .initialize_with_remote("127.0.0.1", 9000, 0)
            .await
            .unwrap();
        assert!(transport.is_connected());

        transport.initialize_local(0).await.unwrap();
        assert!(!transport.link_state().has_remote);
        assert!(transport.remote_addr().is_none());
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_tagged_transport_round_trip() {
        let (receiver, queue) = Transport::with_queue(TaggedCodec, Config::default());
        let local = receiver.initialize_local(0).await.unwrap();

        let (sender, _unused) = Transport::with_queue(TaggedCodec, Config::default());
        sender
            .initialize_with_remote("127.0.0.1", local.port(), 0)
            .await
            .unwrap();
        sender.send_text("hello").unwrap();

        let frames = wait_for(&queue, 1).await;
        assert_eq!(frames, vec![TaggedFrame::Text("hello".into())]);

        sender.shutdown().await;
        receiver.shutdown().await;
    }
}
