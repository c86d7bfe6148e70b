//! 공통 에러 처리 시스템
//!
//! 릴레이 서버에서 발생하는 모든 에러를 체계적으로 관리합니다.
//! 프로토콜 수준의 에러는 `shared::protocol::ProtocolError`로 분류되며,
//! 이 모듈은 서버 운영 과정의 에러를 다룹니다.

use std::error::Error as StdError;
use std::fmt;

use tracing::{error, info, warn};
use uuid::Uuid;

/// 릴레이 서버 에러 타입
#[derive(Debug, Clone)]
pub enum RelayServerError {
    /// 연결 관련 에러
    Connection {
        client_id: Option<Uuid>,
        addr: Option<String>,
        message: String,
    },

    /// 전송 관련 에러 (재시도 이전 단계)
    Delivery {
        client_id: Uuid,
        addr: String,
        message: String,
    },

    /// 재시도 예산을 모두 소진하여 클라이언트가 응답 불능으로 판정됨
    ClientTimedOut {
        client_id: Uuid,
        addr: String,
        attempts: u32,
    },

    /// 운영자 명령이 지정한 사용자를 찾지 못함
    UnknownUser { name: String },

    /// 귓속말 대상을 찾지 못함
    UnknownDestination { name: String },

    /// 설정 관련 에러
    Configuration { key: String, message: String },

    /// 내부 시스템 에러
    Internal { component: String, message: String },
}

impl fmt::Display for RelayServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayServerError::Connection {
                client_id,
                addr,
                message,
            } => {
                write!(f, "연결 에러")?;
                if let Some(id) = client_id {
                    write!(f, " [클라이언트 {}]", id)?;
                }
                if let Some(address) = addr {
                    write!(f, " [{}]", address)?;
                }
                write!(f, ": {}", message)
            }
            RelayServerError::Delivery {
                client_id,
                addr,
                message,
            } => {
                write!(
                    f,
                    "전송 에러 [클라이언트 {}] [{}]: {}",
                    client_id, addr, message
                )
            }
            RelayServerError::ClientTimedOut {
                client_id,
                addr,
                attempts,
            } => {
                write!(
                    f,
                    "클라이언트 응답 없음 [클라이언트 {}] [{}]: {}회 전송 실패",
                    client_id, addr, attempts
                )
            }
            RelayServerError::UnknownUser { name } => {
                write!(f, "알 수 없는 사용자: `{}`", name)
            }
            RelayServerError::UnknownDestination { name } => {
                write!(f, "알 수 없는 귓속말 대상: `{}`", name)
            }
            RelayServerError::Configuration { key, message } => {
                write!(f, "설정 에러 [키: {}]: {}", key, message)
            }
            RelayServerError::Internal { component, message } => {
                write!(f, "내부 에러 [컴포넌트: {}]: {}", component, message)
            }
        }
    }
}

impl StdError for RelayServerError {}

impl RelayServerError {
    /// 연결 에러 생성 헬퍼
    pub fn connection_error(
        client_id: Option<Uuid>,
        addr: Option<String>,
        message: &str,
    ) -> Self {
        RelayServerError::Connection {
            client_id,
            addr,
            message: message.to_string(),
        }
    }

    /// 전송 에러 생성 헬퍼
    pub fn delivery_error(client_id: Uuid, addr: &str, message: &str) -> Self {
        RelayServerError::Delivery {
            client_id,
            addr: addr.to_string(),
            message: message.to_string(),
        }
    }

    /// 타임아웃 판정 여부
    pub fn is_timeout(&self) -> bool {
        matches!(self, RelayServerError::ClientTimedOut { .. })
    }
}

/// 에러 심각도 레벨
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorSeverity {
    /// 정보성 - 정상 동작 중 발생하는 예상 가능한 상황
    Info,
    /// 경고 - 주의가 필요하지만 서비스는 계속 가능
    Warning,
    /// 에러 - 기능에 영향을 주지만 복구 가능
    Error,
    /// 치명적 - 서비스 중단이 필요한 심각한 문제
    Critical,
}

/// 중앙 에러 처리기
///
/// 심각도에 따라 적절한 로그 레벨로 에러를 기록합니다.
pub struct ErrorHandler;

impl ErrorHandler {
    /// 에러를 심각도에 맞게 기록합니다.
    pub fn handle_error(
        err: RelayServerError,
        severity: ErrorSeverity,
        service: &str,
        operation: &str,
    ) {
        match severity {
            ErrorSeverity::Info => {
                info!("[{}::{}] {}", service, operation, err);
            }
            ErrorSeverity::Warning => {
                warn!("[{}::{}] {}", service, operation, err);
            }
            ErrorSeverity::Error => {
                error!("[{}::{}] {}", service, operation, err);
            }
            ErrorSeverity::Critical => {
                error!("🚨 [{}::{}] 치명적 에러: {}", service, operation, err);
            }
        }
    }
}
