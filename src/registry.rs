//! 디스패치 레지스트리
//!
//! - 수신: 데이터 타입 → 싱크 목록 라우팅
//! - 송신: 데이터 소스가 내보낸 패킷을 전송 계층으로 중계
//!
//! 명시적으로 넘겨받은 소스/싱크로만 구성된다.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::transport::{LinkState, Outbound};
use crate::{Error, Result};

/// 데이터 싱크 (수신 핸들러)
///
/// 틱 루프에서만 동기적으로 호출된다.
pub trait DataSink: Send + Sync {
    /// 처리하는 데이터 타입 목록
    fn supported_data_types(&self) -> Vec<String>;

    /// 패킷 처리
    fn handle(&self, data_type: &str, payload: &[u8]) -> Result<()>;
}

/// 데이터 소스 (송신 생산자)
pub trait DataSource: Send + Sync {
    /// 고유 데이터 타입
    fn data_type(&self) -> &str;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);

    /// 등록 시 송신 핸들을 받는다
    fn attach(&self, emitter: Emitter);

    /// 빈 페이로드 송신 허용 여부
    fn allows_empty_payload(&self) -> bool {
        false
    }

    /// 링크 상태 변경 알림 (기본: 연결되면 활성화)
    fn on_link_changed(&self, state: LinkState) {
        self.set_enabled(state.is_connected());
    }
}

/// 소스용 송신 핸들
#[derive(Clone)]
pub struct Emitter {
    outbound: Arc<dyn Outbound>,
    allow_empty: bool,
}

impl Emitter {
    pub fn new(outbound: Arc<dyn Outbound>, allow_empty: bool) -> Self {
        Self {
            outbound,
            allow_empty,
        }
    }

    /// (데이터 타입, 페이로드) 송신
    ///
    /// 실패는 전송 계층에서 이미 로그를 남기므로 여기서는 결과만 돌려준다.
    pub fn emit(&self, data_type: &str, payload: &[u8]) -> Result<usize> {
        self.outbound
            .send_packet(data_type, payload, self.allow_empty)
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("allow_empty", &self.allow_empty)
            .finish_non_exhaustive()
    }
}

/// 디스패치 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// 등록된 싱크 없음
    Unrouted,

    /// 싱크 호출 완료
    Delivered { handled: usize, failed: usize },
}

impl Dispatch {
    pub fn is_routed(&self) -> bool {
        matches!(self, Dispatch::Delivered { .. })
    }

    pub fn failures(&self) -> usize {
        match self {
            Dispatch::Unrouted => 0,
            Dispatch::Delivered { failed, .. } => *failed,
        }
    }
}

/// 디스패치 레지스트리
pub struct Registry {
    outbound: Arc<dyn Outbound>,
    sources: Vec<Arc<dyn DataSource>>,
    sinks: Vec<Arc<dyn DataSink>>,
    handlers_by_type: HashMap<String, Vec<Arc<dyn DataSink>>>,
    link: LinkState,
}

impl Registry {
    /// 빈 레지스트리 생성
    pub fn new(outbound: Arc<dyn Outbound>) -> Self {
        Self {
            outbound,
            sources: Vec::new(),
            sinks: Vec::new(),
            handlers_by_type: HashMap::new(),
            link: LinkState::default(),
        }
    }

    /// 고정된 소스/싱크 집합으로 구성
    pub fn build<S, K>(outbound: Arc<dyn Outbound>, sources: S, sinks: K) -> Result<Self>
    where
        S: IntoIterator<Item = Arc<dyn DataSource>>,
        K: IntoIterator<Item = Arc<dyn DataSink>>,
    {
        let mut registry = Self::new(outbound);
        for sink in sinks {
            registry.add_sink(sink);
        }
        for source in sources {
            registry.add_source(source)?;
        }
        info!(
            "레지스트리 초기화: sources={}, sinks={}, types={}",
            registry.sources.len(),
            registry.sinks.len(),
            registry.handlers_by_type.len()
        );
        Ok(registry)
    }

    /// 싱크 추가
    ///
    /// 같은 인스턴스는 한 번만 등록된다. 새로 등록됐으면 true.
    pub fn add_sink(&mut self, sink: Arc<dyn DataSink>) -> bool {
        if self.sinks.iter().any(|existing| Arc::ptr_eq(existing, &sink)) {
            debug!("이미 등록된 싱크 무시");
            return false;
        }

        for data_type in sink.supported_data_types() {
            let handlers = self.handlers_by_type.entry(data_type).or_default();
            if !handlers.iter().any(|existing| Arc::ptr_eq(existing, &sink)) {
                handlers.push(sink.clone());
            }
        }
        self.sinks.push(sink);
        true
    }

    /// 소스 추가
    ///
    /// 같은 인스턴스는 무시(Ok(false)), 다른 인스턴스가 같은 데이터 타입을 쓰면 에러.
    pub fn add_source(&mut self, source: Arc<dyn DataSource>) -> Result<bool> {
        if self.sources.iter().any(|existing| Arc::ptr_eq(existing, &source)) {
            debug!("이미 등록된 소스 무시: {}", source.data_type());
            return Ok(false);
        }
        if self
            .sources
            .iter()
            .any(|existing| existing.data_type() == source.data_type())
        {
            return Err(Error::DuplicateDataType {
                data_type: source.data_type().to_string(),
            });
        }

        source.attach(Emitter::new(
            self.outbound.clone(),
            source.allows_empty_payload(),
        ));
        source.on_link_changed(self.link);
        debug!("소스 등록: {}", source.data_type());

        self.sources.push(source);
        Ok(true)
    }

    /// 링크 상태를 모든 소스에 전달
    pub fn apply_link_state(&mut self, state: LinkState) {
        self.link = state;
        for source in &self.sources {
            source.on_link_changed(state);
        }
        debug!(
            "링크 상태 전달: connected={}, sources={}",
            state.is_connected(),
            self.sources.len()
        );
    }

    /// 패킷을 싱크들에 전달
    ///
    /// 등록 순서대로 호출하며 한 싱크의 실패(에러 또는 패닉)가 나머지를 막지 않는다.
    pub fn dispatch(&self, data_type: &str, payload: &[u8]) -> Dispatch {
        let Some(handlers) = self.handlers_by_type.get(data_type) else {
            warn!("핸들러 없음: data_type={}", data_type);
            return Dispatch::Unrouted;
        };

        let mut failed = 0;
        for sink in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| sink.handle(data_type, payload))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed += 1;
                    error!("데이터 처리 에러: data_type={}: {}", data_type, e);
                }
                Err(_) => {
                    failed += 1;
                    error!("데이터 처리 중 패닉: data_type={}", data_type);
                }
            }
        }

        Dispatch::Delivered {
            handled: handlers.len() - failed,
            failed,
        }
    }

    /// 데이터 타입에 등록된 싱크 수
    pub fn handler_count(&self, data_type: &str) -> usize {
        self.handlers_by_type
            .get(data_type)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn sources(&self) -> &[Arc<dyn DataSource>] {
        &self.sources
    }

    pub fn sinks(&self) -> &[Arc<dyn DataSink>] {
        &self.sinks
    }

    /// 마지막으로 전달된 링크 상태
    pub fn link_state(&self) -> LinkState {
        self.link
    }
}
