//! 폰 앱이 주고받는 페이로드 모델
//!
//! 전송 계층은 페이로드를 들여다보지 않는다. 이 모듈은 생산자/소비자 양쪽이
//! 쓰는 JSON 텍스트 형식만 정의한다 (필드 이름은 폰 앱과 동일).

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::registry::DataSink;
use crate::{Error, Result};

/// 데이터 타입 이름
pub mod data_types {
    pub const SENSOR_DATA: &str = "SensorData";
    pub const UI_EVENT: &str = "UIEvent";
    pub const SCREEN_GESTURE: &str = "ScreenGesture";
    pub const AR_CAMERA_DATA: &str = "ARCameraData";
    pub const OBJECT_UPDATE: &str = "ObjectUpdate";
    pub const SCENE_DATA: &str = "SceneData";
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// 쿼터니언 (x, y, z, w)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

/// 센서 데이터 (가속도, 자이로, 나침반)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SensorData {
    pub acceleration: Vec3,
    pub gyroscope: Vec3,
    pub gravity: Vec3,
    pub device_attitude: Quat,
    pub magnetic_heading: f32,
    pub true_heading: f32,
    pub heading_accuracy: f32,
}

/// UI 이벤트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UiEventType {
    ButtonClick,
    SliderChange,
    ToggleChange,
    InputFieldChange,
    SuperButtonClick,
    SuperButtonHold,
    SuperButtonDrag,
    SuperButtonRelease,
}

impl UiEventType {
    pub const ALL: [UiEventType; 8] = [
        UiEventType::ButtonClick,
        UiEventType::SliderChange,
        UiEventType::ToggleChange,
        UiEventType::InputFieldChange,
        UiEventType::SuperButtonClick,
        UiEventType::SuperButtonHold,
        UiEventType::SuperButtonDrag,
        UiEventType::SuperButtonRelease,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UiEventType::ButtonClick => "ButtonClick",
            UiEventType::SliderChange => "SliderChange",
            UiEventType::ToggleChange => "ToggleChange",
            UiEventType::InputFieldChange => "InputFieldChange",
            UiEventType::SuperButtonClick => "SuperButtonClick",
            UiEventType::SuperButtonHold => "SuperButtonHold",
            UiEventType::SuperButtonDrag => "SuperButtonDrag",
            UiEventType::SuperButtonRelease => "SuperButtonRelease",
        }
    }

    /// 이름으로 찾기 (알 수 없는 이름은 None)
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for UiEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// UI 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiEventData {
    pub event_type: UiEventType,
    pub element_id: String,
    #[serde(default)]
    pub value: String,
}

impl UiEventData {
    pub fn new(event_type: UiEventType, element_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            event_type,
            element_id: element_id.into(),
            value: value.into(),
        }
    }

    /// 이벤트 이름을 검증하며 생성
    pub fn from_name(event_type: &str, element_id: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let event_type = UiEventType::parse(event_type)
            .ok_or_else(|| Error::Handler(format!("유효하지 않은 UI 이벤트 타입: {}", event_type)))?;
        Ok(Self::new(event_type, element_id, value))
    }
}

/// 핀치 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinchPhase {
    PinchStart,
    PinchUpdate,
    PinchEnd,
}

/// 화면 핀치 제스처
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinchEventData {
    #[serde(rename = "type")]
    pub phase: PinchPhase,
    pub touch1: Vec2,
    pub touch2: Vec2,
    #[serde(default)]
    pub value: String,
}

impl PinchEventData {
    /// 두 터치 사이 거리
    pub fn distance(&self) -> f32 {
        let dx = self.touch1.x - self.touch2.x;
        let dy = self.touch1.y - self.touch2.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// AR 카메라 포즈
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArCameraData {
    pub position: Vec3,
    pub rotation: Quat,
}

/// 오브젝트 변환 갱신
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectUpdateData {
    pub id: String,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

/// 씬 오브젝트
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SceneObject {
    pub id: String,
    pub name: String,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub collider_type: String,
    pub collider_data: Vec3,
}

/// 씬 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneData {
    pub objects: Vec<SceneObject>,
}

/// JSON 페이로드 인코딩
pub fn to_payload<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// JSON 페이로드 디코딩
pub fn from_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(payload)?)
}

/// JSON 페이로드를 디코딩해 콜백에 넘기는 싱크
pub struct JsonSink<T, F> {
    data_types: Vec<String>,
    callback: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> JsonSink<T, F>
where
    T: DeserializeOwned,
    F: Fn(&str, T) -> Result<()> + Send + Sync,
{
    pub fn new(data_type: impl Into<String>, callback: F) -> Self {
        Self {
            data_types: vec![data_type.into()],
            callback,
            _marker: PhantomData,
        }
    }

    /// 같은 모델을 쓰는 데이터 타입 추가
    pub fn also(mut self, data_type: impl Into<String>) -> Self {
        self.data_types.push(data_type.into());
        self
    }
}

impl<T, F> DataSink for JsonSink<T, F>
where
    T: DeserializeOwned,
    F: Fn(&str, T) -> Result<()> + Send + Sync,
{
    fn supported_data_types(&self) -> Vec<String> {
        self.data_types.clone()
    }

    fn handle(&self, data_type: &str, payload: &[u8]) -> Result<()> {
        let value = from_payload::<T>(payload)?;
        (self.callback)(data_type, value)
    }
}
