//! 와이어 코덱
//!
//! - 타입 패킷: `i32_le(타입 길이) ++ utf8(데이터 타입) ++ 페이로드`
//! - 태그 프레임 (사이드 채널): `ascii(4바이트 태그) ++ 내용`
//!
//! 한 프레임 = 한 데이터그램. 페이로드 길이 필드는 없음 (데이터그램의 나머지).

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// 타입 길이 프리픽스 크기
pub const TYPE_LEN_PREFIX: usize = 4;

/// 사이드 채널 태그 크기
pub const TAG_LEN: usize = 4;

/// 이미지 태그
pub const IMAGE_TAG: &[u8; TAG_LEN] = b"IMG|";

/// 텍스트 태그
pub const TEXT_TAG: &[u8; TAG_LEN] = b"TXT|";

/// 데이터그램 디코더
///
/// 전송 계층의 수신 루프는 이 trait만 알고 있다.
pub trait FrameCodec: Send + Sync + 'static {
    /// 디코딩된 프레임
    type Frame: Send + 'static;

    /// 데이터그램 하나를 프레임으로 디코딩
    fn decode_frame(&self, datagram: &[u8]) -> Result<Self::Frame>;

    /// 통계용 데이터 타입 (타입이 없는 프레임은 None)
    fn data_type<'a>(&self, _frame: &'a Self::Frame) -> Option<&'a str> {
        None
    }
}

/// 타입 패킷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedPacket {
    /// 데이터 타입 (예: "SensorData")
    pub data_type: String,

    /// 불투명 페이로드
    pub payload: Bytes,
}

impl TypedPacket {
    pub fn new(data_type: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            data_type: data_type.into(),
            payload: payload.into(),
        }
    }

    /// 프레임으로 인코딩
    pub fn encode(&self) -> Result<Bytes> {
        encode(&self.data_type, &self.payload)
    }
}

/// 타입 패킷 인코딩
pub fn encode(data_type: &str, payload: &[u8]) -> Result<Bytes> {
    if data_type.is_empty() {
        return Err(Error::Encoding("데이터 타입이 비어 있음"));
    }

    let type_bytes = data_type.as_bytes();
    let type_len = i32::try_from(type_bytes.len())
        .map_err(|_| Error::Encoding("데이터 타입이 너무 김"))?;

    let mut buf = BytesMut::with_capacity(TYPE_LEN_PREFIX + type_bytes.len() + payload.len());
    buf.put_i32_le(type_len);
    buf.put_slice(type_bytes);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// 타입 패킷 디코딩
///
/// 잘못된 프레임은 `MalformedPacket`을 돌려줄 뿐 패닉하지 않는다.
pub fn decode(frame: &[u8]) -> Result<TypedPacket> {
    if frame.len() < TYPE_LEN_PREFIX {
        return Err(Error::MalformedPacket {
            reason: "길이 프리픽스를 읽을 수 없음",
            len: frame.len(),
        });
    }

    let type_len = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
    let rest = &frame[TYPE_LEN_PREFIX..];

    let type_len = match usize::try_from(type_len) {
        Ok(n) if n <= rest.len() => n,
        _ => {
            return Err(Error::MalformedPacket {
                reason: "데이터 타입 길이가 범위를 벗어남",
                len: frame.len(),
            })
        }
    };

    let data_type = String::from_utf8_lossy(&rest[..type_len]).into_owned();
    let payload = Bytes::copy_from_slice(&rest[type_len..]);

    Ok(TypedPacket { data_type, payload })
}

/// 타입 패킷 코덱
#[derive(Debug, Clone, Copy, Default)]
pub struct TypedCodec;

impl FrameCodec for TypedCodec {
    type Frame = TypedPacket;

    fn decode_frame(&self, datagram: &[u8]) -> Result<TypedPacket> {
        decode(datagram)
    }

    fn data_type<'a>(&self, frame: &'a TypedPacket) -> Option<&'a str> {
        Some(&frame.data_type)
    }
}

/// 사이드 채널 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaggedFrame {
    /// `TXT|` 텍스트 메시지
    Text(String),

    /// `IMG|` 이미지 데이터 (청크 또는 전체)
    Image(Bytes),
}

impl TaggedFrame {
    pub fn tag(&self) -> &'static [u8; TAG_LEN] {
        match self {
            TaggedFrame::Text(_) => TEXT_TAG,
            TaggedFrame::Image(_) => IMAGE_TAG,
        }
    }

    /// 프레임으로 인코딩
    pub fn encode(&self) -> Bytes {
        match self {
            TaggedFrame::Text(text) => encode_tagged(TEXT_TAG, text.as_bytes()),
            TaggedFrame::Image(data) => encode_tagged(IMAGE_TAG, data),
        }
    }
}

/// 태그 프레임 인코딩
pub fn encode_tagged(tag: &[u8; TAG_LEN], content: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(TAG_LEN + content.len());
    buf.put_slice(tag);
    buf.put_slice(content);
    buf.freeze()
}

/// 태그 프레임 디코딩
pub fn decode_tagged(datagram: &[u8]) -> Result<TaggedFrame> {
    if datagram.len() < TAG_LEN {
        return Err(Error::MalformedPacket {
            reason: "태그를 읽을 수 없음",
            len: datagram.len(),
        });
    }

    let (tag, content) = datagram.split_at(TAG_LEN);
    match tag {
        t if t == IMAGE_TAG => Ok(TaggedFrame::Image(Bytes::copy_from_slice(content))),
        t if t == TEXT_TAG => Ok(TaggedFrame::Text(
            String::from_utf8_lossy(content).into_owned(),
        )),
        _ => Err(Error::UnknownTag {
            tag: [tag[0], tag[1], tag[2], tag[3]],
        }),
    }
}

/// 태그 프레임 코덱
#[derive(Debug, Clone, Copy, Default)]
pub struct TaggedCodec;

impl FrameCodec for TaggedCodec {
    type Frame = TaggedFrame;

    fn decode_frame(&self, datagram: &[u8]) -> Result<TaggedFrame> {
        decode_tagged(datagram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = encode("Ping", &[0x01]).unwrap();
        assert_eq!(frame.as_ref(), &[4, 0, 0, 0, b'P', b'i', b'n', b'g', 0x01]);
    }

    #[test]
    fn test_round_trip() {
        let payload: Vec<u8> = (0..=255).collect();
        let frame = encode("SensorData", &payload).unwrap();
        let packet = decode(&frame).unwrap();

        assert_eq!(packet.data_type, "SensorData");
        assert_eq!(packet.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn test_round_trip_multibyte_type() {
        let packet = TypedPacket::new("센서데이터", vec![9u8, 8, 7]);
        let decoded = decode(&packet.encode().unwrap()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_encode_empty_type_rejected() {
        assert!(matches!(encode("", b"x"), Err(Error::Encoding(_))));
    }

    #[test]
    fn test_decode_short_frame() {
        for len in 0..TYPE_LEN_PREFIX {
            let frame = vec![0u8; len];
            assert!(matches!(decode(&frame), Err(Error::MalformedPacket { .. })));
        }
    }

    #[test]
    fn test_decode_bad_type_length() {
        // 음수 길이
        let mut frame = (-1i32).to_le_bytes().to_vec();
        frame.extend_from_slice(b"abc");
        assert!(matches!(decode(&frame), Err(Error::MalformedPacket { .. })));

        // 남은 길이 초과
        let mut frame = 10i32.to_le_bytes().to_vec();
        frame.extend_from_slice(b"abc");
        assert!(matches!(decode(&frame), Err(Error::MalformedPacket { .. })));
    }

    #[test]
    fn test_decode_type_only() {
        let mut frame = 3i32.to_le_bytes().to_vec();
        frame.extend_from_slice(b"abc");

        let packet = decode(&frame).unwrap();
        assert_eq!(packet.data_type, "abc");
        assert!(packet.payload.is_empty());
    }

    #[test]
    fn test_tagged_frames() {
        let text = TaggedFrame::Text("ButtonPressed|Align".into());
        assert_eq!(&text.encode()[..4], b"TXT|");
        assert_eq!(decode_tagged(&text.encode()).unwrap(), text);

        let image = TaggedFrame::Image(Bytes::from_static(&[1, 2, 3]));
        assert_eq!(image.encode().as_ref(), b"IMG|\x01\x02\x03");
        assert_eq!(TaggedCodec.decode_frame(&image.encode()).unwrap(), image);
    }

    #[test]
    fn test_tagged_errors() {
        assert!(matches!(
            decode_tagged(b"IMG"),
            Err(Error::MalformedPacket { .. })
        ));
        assert!(matches!(
            decode_tagged(b"BIN|data"),
            Err(Error::UnknownTag { tag }) if &tag == b"BIN|"
        ));
    }
}
