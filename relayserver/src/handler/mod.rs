//! 릴레이 서버 핸들러 레이어
//!
//! 수신 프레임의 종류별 처리(접속, 접속 해제, 메시지, 귓속말)를
//! 담당합니다.

pub mod connection_handler;
pub mod message_handler;

pub use connection_handler::ConnectionHandler;
pub use message_handler::MessageHandler;
