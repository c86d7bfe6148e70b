//! 릴레이 서버 공통 유틸리티 모듈
//!
//! 에러 처리 등 서비스/핸들러 계층이 함께 쓰는 도구를 제공합니다.

pub mod error;

pub use error::{ErrorHandler, ErrorSeverity, RelayServerError};
