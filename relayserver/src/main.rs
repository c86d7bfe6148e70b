//! 릴레이 서버 - 채팅 중계의 4가지 핵심 기능
//!
//! 1. 접속 관리 (Connect / Disconnect)
//! 2. 메시지 중계 (Broadcast / Whisper)
//! 3. 생존 확인 (Ping / Timeout)
//! 4. 운영 연산 (Say / Kick / List / Quit)

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use relayserver::config::{validate_config, RelayServerConfig};
use relayserver::RelayServer;

/// 릴레이 서버 메인 진입점
///
/// 환경 설정은 .env 파일에서 로드됩니다.
///
/// 환경변수:
/// - relay_host: 릴레이 서버 호스트 (기본값: "127.0.0.1")
/// - relay_port: 릴레이 서버 포트 (기본값: "8080")
/// - relay_name: 서버 표시 이름 (기본값: "relay")
/// - relay_max_clients: 최대 동시 접속 수 (기본값: "1000")
/// - relay_max_send_attempts: 전송 재시도 예산 (기본값: "5")
/// - relay_retry_backoff_secs: 재시도 백오프 (기본값: "1")
/// - relay_ping_interval_secs: 핑 주기 (기본값: "2")
/// - relay_max_frame_size: 최대 프레임 크기 (기본값: "1024")
#[tokio::main]
async fn main() -> Result<()> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // 환경 설정 로드
    let config = RelayServerConfig::from_env()?;

    // 설정 검증
    validate_config(&config)?;

    info!("=== 릴레이 서버 설정 ===");
    info!("바인드 주소: {}", config.bind_address());
    info!("서버 이름: {}", config.name);
    info!("핑 주기: {}초", config.ping_interval_secs);
    info!("전송 재시도 예산: {}회", config.max_send_attempts);
    info!("========================");

    // 릴레이 서버 시작
    let server = Arc::new(RelayServer::new(config));

    let server_ref = Arc::clone(&server);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server_ref.start().await {
            error!("릴레이 서버 실행 오류: {}", e);
            std::process::exit(1);
        }
    });

    // 종료 시그널 대기
    tokio::signal::ctrl_c().await?;
    info!("종료 시그널 수신, 서버를 중지합니다...");

    server.shutdown().await;
    server_handle.abort();

    Ok(())
}
