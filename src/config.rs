//! 링크 설정

use std::time::Duration;

use crate::{DEFAULT_IMAGE_CHUNK_SIZE, DEFAULT_LOCAL_PORT, MAX_DATAGRAM_SIZE};

/// phonelink 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 로컬 바인드 포트
    pub local_port: u16,

    /// 수신 버퍼 크기 (데이터그램 최대 크기)
    pub recv_buffer_size: usize,

    /// 수신 큐 용량
    /// None이면 무제한, Some(n)이면 가득 찼을 때 새 패킷을 버림
    pub inbound_queue_capacity: Option<usize>,

    /// 틱당 최대 디스패치 수 (0이면 큐를 끝까지 비움)
    pub max_dispatch_per_tick: usize,

    /// 틱 주기 (밀리초), 자체 업데이트 루프가 없는 호스트용
    pub tick_interval_ms: u64,

    /// 이미지 청크 크기 (바이트)
    pub image_chunk_size: usize,

    /// 정체된 청크 전송 폐기 타임아웃 (밀리초)
    /// None이면 누락 청크를 무한히 기다림
    pub stall_timeout_ms: Option<u64>,

    /// 사이드 채널 IMG| 프레임이 청크 헤더를 포함하는지 여부
    pub chunked_images: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_port: DEFAULT_LOCAL_PORT,
            recv_buffer_size: MAX_DATAGRAM_SIZE,
            inbound_queue_capacity: None,
            max_dispatch_per_tick: 0,
            tick_interval_ms: 16, // ~60Hz
            image_chunk_size: DEFAULT_IMAGE_CHUNK_SIZE,
            stall_timeout_ms: None,
            chunked_images: true,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 헤드셋(수신측)용 설정
    pub fn headset() -> Self {
        Self {
            tick_interval_ms: 11, // 90Hz 디스플레이
            ..Self::default()
        }
    }

    /// 폰(송신측)용 설정
    pub fn phone() -> Self {
        Self {
            local_port: 0, // 임시 포트
            tick_interval_ms: 33,
            ..Self::default()
        }
    }

    /// 저사양 기기용 설정
    pub fn constrained() -> Self {
        Self {
            recv_buffer_size: 16 * 1024,
            inbound_queue_capacity: Some(1024),
            max_dispatch_per_tick: 256,
            tick_interval_ms: 33,
            image_chunk_size: 1024,
            stall_timeout_ms: Some(5000),
            ..Self::default()
        }
    }

    /// 틱 주기
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// 정체 타임아웃
    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_ms.map(Duration::from_millis)
    }
}
