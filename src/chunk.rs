//! 청크 분할과 재조립
//!
//! 데이터그램 하나에 담기지 않는 페이로드(이미지 등)를 조각으로 나눠 보낸다.
//! 조각 데이터그램: `i32_le(청크 인덱스) ++ i32_le(총 청크 수) ++ 조각 데이터`
//!
//! 재조립기 하나는 한 번에 하나의 전송만 처리한다.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::{Error, Result};

/// 청크 헤더 크기 (인덱스 4 + 총 개수 4)
pub const CHUNK_HEADER_SIZE: usize = 8;

/// 청크 인덱스
pub type ChunkIndex = u32;

/// 청크 헤더
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// 전송 내 인덱스
    pub index: ChunkIndex,

    /// 전송의 총 청크 수
    pub total: u32,
}

impl ChunkHeader {
    /// 데이터그램 앞 8바이트에서 헤더 파싱
    pub fn parse(datagram: &[u8]) -> Result<Self> {
        if datagram.len() < CHUNK_HEADER_SIZE {
            return Err(Error::MalformedChunk {
                reason: "헤더보다 짧음",
                len: datagram.len(),
            });
        }

        let index = i32::from_le_bytes([datagram[0], datagram[1], datagram[2], datagram[3]]);
        let total = i32::from_le_bytes([datagram[4], datagram[5], datagram[6], datagram[7]]);

        if index < 0 {
            return Err(Error::MalformedChunk {
                reason: "음수 청크 인덱스",
                len: datagram.len(),
            });
        }
        if total <= 0 {
            return Err(Error::MalformedChunk {
                reason: "총 청크 수가 0 이하",
                len: datagram.len(),
            });
        }

        Ok(Self {
            index: index as ChunkIndex,
            total: total as u32,
        })
    }
}

/// 청크 (조각 데이터그램 하나)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub header: ChunkHeader,
    pub data: Bytes,
}

impl Chunk {
    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(CHUNK_HEADER_SIZE + self.data.len());
        buf.put_i32_le(self.header.index as i32);
        buf.put_i32_le(self.header.total as i32);
        buf.put_slice(&self.data);
        buf.freeze()
    }

    /// 바이트에서 역직렬화
    pub fn from_bytes(datagram: &[u8]) -> Result<Self> {
        let header = ChunkHeader::parse(datagram)?;
        Ok(Self {
            header,
            data: Bytes::copy_from_slice(&datagram[CHUNK_HEADER_SIZE..]),
        })
    }
}

/// 청크 분할기 (송신측)
pub struct ChunkSplitter {
    chunk_size: usize,
}

impl ChunkSplitter {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    /// 페이로드를 청크들로 분할
    ///
    /// 빈 페이로드는 빈 청크 하나가 된다.
    pub fn split(&self, payload: &[u8]) -> Result<Vec<Chunk>> {
        let invalid = || Error::InvalidChunkSize {
            chunk_size: self.chunk_size,
            payload_len: payload.len(),
        };

        if self.chunk_size == 0 {
            return Err(invalid());
        }

        let total = payload.len().div_ceil(self.chunk_size).max(1);
        if total > i32::MAX as usize {
            return Err(invalid());
        }

        if payload.is_empty() {
            return Ok(vec![Chunk {
                header: ChunkHeader { index: 0, total: 1 },
                data: Bytes::new(),
            }]);
        }

        Ok(payload
            .chunks(self.chunk_size)
            .enumerate()
            .map(|(idx, data)| Chunk {
                header: ChunkHeader {
                    index: idx as ChunkIndex,
                    total: total as u32,
                },
                data: Bytes::copy_from_slice(data),
            })
            .collect())
    }

    /// 페이로드를 조각 데이터그램들로 분할
    pub fn split_datagrams(&self, payload: &[u8]) -> Result<Vec<Bytes>> {
        Ok(self.split(payload)?.iter().map(Chunk::to_bytes).collect())
    }
}

/// 페이로드를 조각 데이터그램들로 분할
pub fn split_payload(payload: &[u8], chunk_size: usize) -> Result<Vec<Bytes>> {
    ChunkSplitter::new(chunk_size).split_datagrams(payload)
}

/// 완료 콜백
pub type CompletionCallback = Box<dyn FnMut(Bytes) + Send>;

/// 청크 재조립기 (수신측)
pub struct ChunkReassembler {
    /// 첫 청크가 정한 총 청크 수 (None = 전송 대기 중)
    expected: Option<u32>,

    /// 수신된 조각 (인덱스 -> 데이터)
    received: HashMap<ChunkIndex, Bytes>,

    /// 첫 조각 수신 시각
    started_at: Option<Instant>,

    /// 정체 타임아웃 (None이면 무한 대기)
    stall_timeout: Option<Duration>,

    on_complete: Option<CompletionCallback>,

    completed: u64,
}

impl Default for ChunkReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkReassembler {
    pub fn new() -> Self {
        Self {
            expected: None,
            received: HashMap::new(),
            started_at: None,
            stall_timeout: None,
            on_complete: None,
            completed: 0,
        }
    }

    /// 정체 타임아웃 설정
    ///
    /// 다음 조각이 도착했을 때 진행 중인 전송이 타임아웃보다 오래됐으면 버린다.
    pub fn with_stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// 완료 콜백 등록
    pub fn on_complete<F>(&mut self, callback: F)
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
    }

    /// 조각 데이터그램 수신
    ///
    /// 전송이 완료되면 조립된 페이로드를 콜백에 넘기고 돌려준다.
    pub fn receive(&mut self, datagram: &[u8]) -> Result<Option<Bytes>> {
        let chunk = Chunk::from_bytes(datagram)?;
        self.insert(chunk)
    }

    /// 파싱된 청크 삽입
    pub fn insert(&mut self, chunk: Chunk) -> Result<Option<Bytes>> {
        self.expire_stalled();

        // 첫 청크가 총 개수를 정한다
        let expected = *self.expected.get_or_insert(chunk.header.total);
        if chunk.header.total != expected {
            debug!(
                "청크 총 개수 불일치 무시: expected={}, got={}",
                expected, chunk.header.total
            );
        }

        if chunk.header.index >= expected {
            if self.received.is_empty() {
                self.reset();
            }
            return Err(Error::MalformedChunk {
                reason: "청크 인덱스가 총 개수를 넘음",
                len: CHUNK_HEADER_SIZE + chunk.data.len(),
            });
        }

        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
        self.received.insert(chunk.header.index, chunk.data);

        if self.received.len() < expected as usize {
            return Ok(None);
        }

        let assembled = self.assemble(expected);
        self.reset();
        self.completed += 1;

        debug!("청크 전송 완료: {} chunks, {} bytes", expected, assembled.len());

        if let Some(callback) = self.on_complete.as_mut() {
            callback(assembled.clone());
        }
        Ok(Some(assembled))
    }

    fn assemble(&mut self, expected: u32) -> Bytes {
        let total_len: usize = self.received.values().map(Bytes::len).sum();
        let mut buf = BytesMut::with_capacity(total_len);
        for index in 0..expected {
            if let Some(data) = self.received.remove(&index) {
                buf.put_slice(&data);
            }
        }
        buf.freeze()
    }

    fn expire_stalled(&mut self) {
        let (Some(timeout), Some(started_at)) = (self.stall_timeout, self.started_at) else {
            return;
        };
        if started_at.elapsed() > timeout {
            warn!(
                "정체된 청크 전송 폐기: {}/{} 수신",
                self.received.len(),
                self.expected.unwrap_or(0)
            );
            self.reset();
        }
    }

    /// 진행 중인 전송 폐기
    pub fn reset(&mut self) {
        self.expected = None;
        self.received.clear();
        self.started_at = None;
    }

    /// 대기 중인 전송의 예상 청크 수
    pub fn expected(&self) -> Option<u32> {
        self.expected
    }

    /// 현재 전송에서 받은 서로 다른 청크 수
    pub fn received_count(&self) -> usize {
        self.received.len()
    }

    /// 누락된 청크 인덱스
    ///
    /// 상대가 보낸 total만큼 커질 수 있으므로 지연 이터레이터로 돌려준다.
    pub fn missing(&self) -> impl Iterator<Item = ChunkIndex> + '_ {
        (0..self.expected.unwrap_or(0)).filter(move |index| !self.received.contains_key(index))
    }

    /// 진행 중인 전송이 없는지
    pub fn is_idle(&self) -> bool {
        self.expected.is_none()
    }

    /// 완료된 전송 수
    pub fn completed_transfers(&self) -> u64 {
        self.completed
    }
}
