//! 패킷 타임스탬프
//!
//! 패킷 생성 시각을 HH:MM:SS 형식으로 기록합니다. 와이어에서 읽은 값이
//! 범위를 벗어나면 파싱 실패로 처리하며, 절대 값을 잘라 맞추지 않습니다.

use std::fmt;

use chrono::{Local, Timelike};
use serde::{Deserialize, Serialize};

use super::error::ProtocolError;

/// 패킷 발신 시각
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeStamp {
    /// 시 (0~23)
    pub hours: u8,
    /// 분 (0~59)
    pub minutes: u8,
    /// 초 (0~59)
    pub seconds: u8,
}

impl TimeStamp {
    /// 현재 시스템 시각의 타임스탬프를 생성합니다.
    pub fn now() -> Self {
        let t = Local::now();
        Self {
            hours: t.hour() as u8,
            minutes: t.minute() as u8,
            seconds: t.second() as u8,
        }
    }

    /// `HH:MM:SS` 문자열을 타임스탬프로 해석합니다.
    ///
    /// 세그먼트 수, 숫자 형식, 필드 범위(시 0~23, 분/초 0~59)를 모두
    /// 검사합니다.
    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 {
            return Err(ProtocolError::MalformedTimestamp(format!(
                "`{}`: HH:MM:SS 형식이 아닙니다",
                s
            )));
        }

        let hours = Self::parse_field(parts[0], s)?;
        let minutes = Self::parse_field(parts[1], s)?;
        let seconds = Self::parse_field(parts[2], s)?;

        if hours > 23 {
            return Err(ProtocolError::MalformedTimestamp(format!(
                "`{}`: 시 필드가 범위를 벗어났습니다 (0~23)",
                s
            )));
        }
        if minutes > 59 || seconds > 59 {
            return Err(ProtocolError::MalformedTimestamp(format!(
                "`{}`: 분/초 필드가 범위를 벗어났습니다 (0~59)",
                s
            )));
        }

        Ok(Self {
            hours,
            minutes,
            seconds,
        })
    }

    fn parse_field(field: &str, source: &str) -> Result<u8, ProtocolError> {
        field.parse::<u8>().map_err(|_| {
            ProtocolError::MalformedTimestamp(format!(
                "`{}`: 숫자가 아닌 필드 `{}`",
                source, field
            ))
        })
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds
        )
    }
}
