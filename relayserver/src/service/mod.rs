//! 릴레이 서버 서비스 레이어
//!
//! 비즈니스 로직과 핵심 기능을 담당하는 서비스들을 정의합니다.
//!
//! # 서비스 구조
//!
//! ```text
//! Service Layer
//! ├── ClientRegistry (클라이언트 레지스트리)
//! │   ├── 기록 추가/제거/조회
//! │   ├── 시점 고정 스냅샷
//! │   ├── 이름 탐색
//! │   └── 통합 실패 카운터
//! ├── DeliveryService (전송)
//! │   ├── 역방향 연결 전송
//! │   ├── 백오프 재시도
//! │   ├── 브로드캐스트 팬아웃
//! │   └── 단일 퇴출 경로
//! ├── LivenessService (생존 확인)
//! │   ├── 주기적 핑 방송
//! │   ├── 미응답 스캔
//! │   └── 시간 초과 퇴출
//! └── RelayServer (제어 루프)
//!     ├── 수락 루프와 프레임 분배
//!     ├── 운영 연산 (방송/강퇴/조회/종료)
//!     └── 이벤트 채널
//! ```

pub mod delivery_service;
pub mod events;
pub mod liveness_service;
pub mod registry_service;
pub mod relay_service;

pub use delivery_service::{DeliveryService, DeliveryStats};
pub use events::{EvictReason, ServerEvent};
pub use liveness_service::{LivenessService, LivenessStats};
pub use registry_service::{ClientRecord, ClientRegistry, MemberInfo, RegistryStats};
pub use relay_service::RelayServer;
