//! 기본 데이터 소스 구현
//!
//! 타이머, 입력, 상태 변화 등 어디서든 `emit`을 호출하면 된다.
//! 비활성 상태이거나 레지스트리에 붙기 전에는 아무것도 보내지 않는다.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::registry::{DataSource, Emitter};
use crate::Result;

/// 기본 데이터 소스
#[derive(Debug)]
pub struct SourceHandle {
    data_type: String,
    enabled: AtomicBool,
    allow_empty: bool,
    emitter: RwLock<Option<Emitter>>,
}

impl SourceHandle {
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            enabled: AtomicBool::new(false),
            allow_empty: false,
            emitter: RwLock::new(None),
        }
    }

    /// 빈 페이로드 송신 허용
    pub fn allowing_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    /// 페이로드 송신
    ///
    /// 실제로 송신됐으면 true.
    pub fn emit(&self, payload: &[u8]) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let emitter = self.emitter.read().clone();
        match emitter {
            Some(emitter) => emitter.emit(&self.data_type, payload).is_ok(),
            None => {
                debug!("등록 전 소스 송신 무시: {}", self.data_type);
                false
            }
        }
    }

    /// JSON 페이로드 송신
    pub fn emit_json<T: Serialize>(&self, value: &T) -> Result<bool> {
        if !self.is_enabled() {
            return Ok(false);
        }
        let payload = serde_json::to_vec(value)?;
        Ok(self.emit(&payload))
    }

    /// 레지스트리에 붙었는지
    pub fn is_attached(&self) -> bool {
        self.emitter.read().is_some()
    }
}

impl DataSource for SourceHandle {
    fn data_type(&self) -> &str {
        &self.data_type
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    fn attach(&self, emitter: Emitter) {
        *self.emitter.write() = Some(emitter);
    }

    fn allows_empty_payload(&self) -> bool {
        self.allow_empty
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::payload::Vec3;
    use crate::registry::tests::RecordingOutbound;

    #[test]
    fn test_emit_requires_attach_and_enable() {
        let source = SourceHandle::new("SensorData");
        source.set_enabled(true);
        assert!(!source.is_attached());
        assert!(!source.emit(b"x"));

        let outbound = Arc::new(RecordingOutbound::default());
        source.attach(Emitter::new(outbound.clone(), false));
        assert!(source.emit(b"x"));

        source.set_enabled(false);
        assert!(!source.emit(b"y"));
        assert_eq!(outbound.sent.lock().len(), 1);
    }

    #[test]
    fn test_empty_payload_needs_opt_in() {
        let outbound = Arc::new(RecordingOutbound::default());

        let strict = SourceHandle::new("Ping");
        strict.attach(Emitter::new(outbound.clone(), strict.allows_empty_payload()));
        strict.set_enabled(true);
        assert!(!strict.emit(b""));

        let lenient = SourceHandle::new("Ping").allowing_empty();
        lenient.attach(Emitter::new(outbound.clone(), lenient.allows_empty_payload()));
        lenient.set_enabled(true);
        assert!(lenient.emit(b""));
    }

    #[test]
    fn test_emit_json() {
        let outbound = Arc::new(RecordingOutbound::default());
        let source = SourceHandle::new("Position");
        source.attach(Emitter::new(outbound.clone(), false));

        assert!(!source.emit_json(&Vec3::new(1.0, 2.0, 3.0)).unwrap());
        source.set_enabled(true);
        assert!(source.emit_json(&Vec3::new(1.0, 2.0, 3.0)).unwrap());

        let sent = outbound.sent.lock();
        assert_eq!(sent[0].1, br#"{"x":1.0,"y":2.0,"z":3.0}"#.to_vec());
    }
}
