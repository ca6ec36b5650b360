//! 에러 타입 정의

use thiserror::Error;

/// 송신 전제조건 위반 사유
///
/// 송신은 이 경우 아무것도 하지 않고 사유만 돌려준다 (재시도 없음).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPrecondition {
    #[error("네트워크가 초기화되지 않음")]
    NotInitialized,

    #[error("원격 엔드포인트가 설정되지 않음")]
    NoRemoteEndpoint,

    #[error("데이터 타입이 비어 있음")]
    EmptyDataType,

    #[error("페이로드가 비어 있음")]
    EmptyPayload,
}

/// phonelink 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("바인드 실패: port={port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("유효하지 않은 주소: {address}")]
    AddressParse { address: String },

    #[error("인코딩 에러: {0}")]
    Encoding(&'static str),

    #[error("잘못된 패킷: {reason} (len={len})")]
    MalformedPacket { reason: &'static str, len: usize },

    #[error("잘못된 청크: {reason} (len={len})")]
    MalformedChunk { reason: &'static str, len: usize },

    #[error("알 수 없는 태그: {tag:?}")]
    UnknownTag { tag: [u8; 4] },

    #[error("송신 불가: {0}")]
    SendPrecondition(#[from] SendPrecondition),

    #[error("이미 등록된 데이터 타입: {data_type}")]
    DuplicateDataType { data_type: String },

    #[error("유효하지 않은 청크 크기: chunk_size={chunk_size}, payload_len={payload_len}")]
    InvalidChunkSize { chunk_size: usize, payload_len: usize },

    #[error("페이로드 직렬화 에러: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("핸들러 에러: {0}")]
    Handler(String),

    #[error("수신 큐 종료")]
    QueueClosed,

    #[error("일부 조각 송신 실패: {failed}/{total}")]
    IncompleteSend { failed: usize, total: usize },
}

impl Error {
    /// 데이터그램 단위 에러 여부 (드롭 + 로그로 끝나는 에러)
    pub fn is_per_datagram(&self) -> bool {
        matches!(
            self,
            Error::MalformedPacket { .. } | Error::MalformedChunk { .. } | Error::UnknownTag { .. }
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
