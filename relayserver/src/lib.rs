//! 채팅 릴레이 서버 라이브러리
//!
//! 이름을 가진 클라이언트들의 TCP 접속을 받아 메시지를 중계하는 단일
//! 서버 프로세스입니다.
//!
//! # 주요 기능
//!
//! - **실시간 멤버 관리**: 동시성 안전 레지스트리로 접속 상태 추적
//! - **메시지 중계**: 전체 방송과 대상 지정 귓속말
//! - **생존 확인**: 주기적 핑과 예산 기반 시간 초과 퇴출
//! - **재시도 전송**: 역방향 연결 전송 실패 시 백오프 재시도
//! - **운영 연산**: 방송 제출, 강퇴, 멤버 조회, 종료
//! - **이벤트 스트림**: 입장/퇴장/강퇴/시간 초과/에러 이벤트 배포
//!
//! # 아키텍처
//!
//! ```text
//! Relay Server
//! ├── Service Layer (비즈니스 로직)
//! │   ├── ClientRegistry (레지스트리)
//! │   ├── DeliveryService (전송)
//! │   ├── LivenessService (생존 확인)
//! │   └── RelayServer (제어 루프)
//! ├── Handler Layer (프레임 처리)
//! │   ├── ConnectionHandler (접속/해제)
//! │   └── MessageHandler (메시지/귓속말)
//! ├── Tool Layer (유틸리티)
//! │   └── Error (에러 처리)
//! └── Config (환경 설정)
//! ```
//!
//! 와이어 프로토콜은 `shared` 크레이트에 정의되어 있습니다.
//!
//! # 모듈 구조
//!
//! - **config**: 환경변수 기반 서버 설정
//! - **service**: 레지스트리, 전송, 생존 확인, 제어 루프
//! - **handler**: 수신 프레임 종류별 처리
//! - **tool**: 공통 에러 처리
//! - **tests**: 기능별 테스트 모듈

/// 환경 설정 관리
///
/// 서버 실행에 필요한 환경변수 및 설정을 관리합니다.
pub mod config;

/// 비즈니스 로직 서비스 레이어
///
/// 레지스트리, 전송, 생존 확인, 제어 루프 서비스를 포함합니다.
pub mod service;

/// 수신 프레임 처리 핸들러 레이어
pub mod handler;

/// 공통 유틸리티 도구들
pub mod tool;

/// 기능별 테스트 모듈
pub mod tests;

/// 릴레이 서버 최상위 타입
pub use service::RelayServer;

/// 서비스 레이어 주요 타입들
pub use service::{
    ClientRecord, ClientRegistry, DeliveryService, EvictReason, LivenessService, MemberInfo,
    ServerEvent,
};

/// 환경 설정 타입들
pub use config::{validate_config, RelayServerConfig};

/// 에러 타입들
pub use tool::{ErrorHandler, ErrorSeverity, RelayServerError};
