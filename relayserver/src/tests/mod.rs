//! 릴레이 서버 테스트 모듈
//!
//! 각 기능별로 분리된 테스트 파일들을 관리합니다.

pub mod test_delivery;

// 테스트 유틸리티
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::config::RelayServerConfig;
use crate::service::delivery_service::DeliveryService;
use crate::service::events::ServerEvent;
use crate::service::registry_service::{ClientRecord, ClientRegistry};

/// 테스트용 설정 (대기 시간 없는 빠른 재시도)
pub fn create_test_config() -> RelayServerConfig {
    RelayServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        name: "relay".to_string(),
        max_clients: 100,
        max_send_attempts: 3,
        retry_backoff_secs: 0,
        ping_interval_secs: 1,
        max_frame_size: 1024,
    }
}

/// 테스트용 레지스트리 생성
pub fn create_test_registry() -> Arc<ClientRegistry> {
    Arc::new(ClientRegistry::new())
}

/// 테스트용 이벤트 채널 생성
pub fn create_test_event_channel() -> broadcast::Sender<ServerEvent> {
    let (tx, _) = broadcast::channel(100);
    tx
}

/// 테스트용 전송 서비스 생성
pub fn create_test_delivery(
    registry: Arc<ClientRegistry>,
    event_tx: broadcast::Sender<ServerEvent>,
) -> Arc<DeliveryService> {
    Arc::new(DeliveryService::new(registry, event_tx, &create_test_config()))
}

/// 테스트용 클라이언트 기록 생성
pub fn create_test_record(name: &str, port: u16) -> ClientRecord {
    ClientRecord::new(Uuid::new_v4(), name, "127.0.0.1", port)
}

/// 아무도 수신하지 않는 포트 번호를 얻습니다.
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("테스트 리스너 바인드 실패");
    let port = listener
        .local_addr()
        .expect("테스트 리스너 주소 조회 실패")
        .port();
    drop(listener);
    port
}

/// 수신한 프레임을 모두 기록하는 역방향 리스너를 시작합니다.
///
/// 반환값은 (포트, 수신 프레임 버퍼)입니다.
pub async fn spawn_capture_listener() -> (u16, Arc<Mutex<Vec<Vec<u8>>>>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("캡처 리스너 바인드 실패");
    let port = listener
        .local_addr()
        .expect("캡처 리스너 주소 조회 실패")
        .port();

    let captured: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let captured_ref = Arc::clone(&captured);

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };

            let captured_ref = Arc::clone(&captured_ref);
            tokio::spawn(async move {
                let mut frame = Vec::new();
                if stream.read_to_end(&mut frame).await.is_ok() && !frame.is_empty() {
                    captured_ref.lock().await.push(frame);
                }
            });
        }
    });

    (port, captured)
}
