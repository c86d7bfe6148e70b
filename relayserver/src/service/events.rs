//! 서버 이벤트 정의
//!
//! 레지스트리 변동과 에러를 외부 표시 계층(CLI/UI)에 전달하기 위한
//! 이벤트 타입을 정의합니다. 이벤트는 tokio broadcast 채널로 배포됩니다.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 클라이언트 퇴출 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictReason {
    /// 자발적 퇴장 (접속 해제 프레임)
    Leave,
    /// 운영자 강퇴
    Kick,
    /// 생존 확인 실패
    Timeout,
    /// 서버 종료
    Shutdown,
}

impl fmt::Display for EvictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EvictReason::Leave => "퇴장",
            EvictReason::Kick => "강퇴",
            EvictReason::Timeout => "시간 초과",
            EvictReason::Shutdown => "서버 종료",
        };
        write!(f, "{}", label)
    }
}

/// 표시 계층으로 전달되는 서버 이벤트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerEvent {
    /// 클라이언트 입장
    Join {
        id: Uuid,
        name: String,
        addr: String,
        port: u16,
    },
    /// 클라이언트 퇴장 (자발적 퇴장 또는 서버 종료)
    Leave { id: Uuid, name: String },
    /// 운영자 강퇴
    Kick { id: Uuid, name: String },
    /// 생존 확인 실패로 퇴출
    Timeout { id: Uuid, name: String },
    /// 표시할 가치가 있는 에러
    Error { detail: String },
}
