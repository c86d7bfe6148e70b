//! 전송 서비스
//!
//! 클라이언트의 역방향 접속 주소로 아웃바운드 연결을 열어 프레임을
//! 전달합니다. 전송 실패 시 고정 백오프 후 재시도하며, 연속 실패가
//! 예산을 초과한 클라이언트는 응답 불능으로 판정하여 퇴출합니다.
//!
//! 퇴출은 사유(퇴장/강퇴/시간 초과/서버 종료)와 무관하게 이 모듈의
//! 단일 경로(`evict`)를 거칩니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use shared::protocol::{Packet, ServerCode};

use crate::config::RelayServerConfig;
use crate::service::events::{EvictReason, ServerEvent};
use crate::service::registry_service::{ClientRecord, ClientRegistry};
use crate::tool::{ErrorHandler, ErrorSeverity, RelayServerError};

/// 전송 통계
#[derive(Debug, Default, Serialize)]
pub struct DeliveryStats {
    /// 성공한 전송 수
    pub total_sends: AtomicU64,
    /// 실패한 전송 시도 수 (재시도 포함)
    pub failed_attempts: AtomicU64,
    /// 재시도 예산 소진으로 판정된 타임아웃 수
    pub timeouts: AtomicU64,
}

/// 전송 서비스
///
/// 내부 상태가 모두 공유 핸들이므로 복제가 저렴하며, 위임 전송 태스크는
/// 복제본을 가져갑니다.
#[derive(Clone)]
pub struct DeliveryService {
    registry: Arc<ClientRegistry>,
    event_tx: broadcast::Sender<ServerEvent>,
    server_host: String,
    server_port: u16,
    max_send_attempts: u32,
    retry_backoff: Duration,
    stats: Arc<DeliveryStats>,
}

impl DeliveryService {
    /// 새로운 전송 서비스 생성
    pub fn new(
        registry: Arc<ClientRegistry>,
        event_tx: broadcast::Sender<ServerEvent>,
        config: &RelayServerConfig,
    ) -> Self {
        Self {
            registry,
            event_tx,
            server_host: config.host.clone(),
            server_port: config.port,
            max_send_attempts: config.max_send_attempts,
            retry_backoff: Duration::from_secs(config.retry_backoff_secs),
            stats: Arc::new(DeliveryStats::default()),
        }
    }

    /// 단일 클라이언트에게 프레임을 전송합니다.
    ///
    /// 실패하면 실패 카운터를 올리고 백오프 후 재시도합니다. 연속 실패가
    /// `max_send_attempts`회에 도달하면 `ClientTimedOut`을 반환하여
    /// 호출자가 퇴출을 진행하게 합니다. 성공하면 카운터를 초기화합니다.
    pub async fn send_to_client(
        &self,
        record: &ClientRecord,
        payload: &[u8],
    ) -> Result<(), RelayServerError> {
        let endpoint = record.endpoint();

        for attempt in 1..=self.max_send_attempts {
            match Self::try_send(&endpoint, payload).await {
                Ok(()) => {
                    // 전송 성공은 암묵적 생존 신호이므로 카운터를 초기화
                    self.registry.reset_failures(&record.id);
                    self.stats.total_sends.fetch_add(1, Ordering::Relaxed);
                    if attempt > 1 {
                        debug!(
                            "클라이언트 {} 전송 성공 ({}번째 시도)",
                            record.name, attempt
                        );
                    }
                    return Ok(());
                }
                Err(e) => {
                    self.stats.failed_attempts.fetch_add(1, Ordering::Relaxed);
                    self.registry.record_failure(&record.id);
                    warn!(
                        "클라이언트 {}@{} 전송 실패 ({}/{}): {}",
                        record.name, endpoint, attempt, self.max_send_attempts, e
                    );

                    if attempt < self.max_send_attempts {
                        sleep(self.retry_backoff).await;
                    }
                }
            }
        }

        self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
        Err(RelayServerError::ClientTimedOut {
            client_id: record.id,
            addr: endpoint,
            attempts: self.max_send_attempts,
        })
    }

    /// 아웃바운드 연결을 열고 프레임을 기록합니다.
    async fn try_send(endpoint: &str, payload: &[u8]) -> anyhow::Result<()> {
        let mut stream = TcpStream::connect(endpoint).await?;
        stream.write_all(payload).await?;
        stream.flush().await?;
        Ok(())
    }

    /// 전송을 별도 태스크로 위임합니다 (완료를 기다리지 않음).
    ///
    /// 전송이 타임아웃으로 끝나면 해당 클라이언트를 퇴출합니다.
    pub fn send_detached(&self, record: ClientRecord, payload: Vec<u8>) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(err) = service.send_to_client(&record, &payload).await {
                let timed_out = err.is_timeout();
                ErrorHandler::handle_error(
                    err,
                    ErrorSeverity::Warning,
                    "DeliveryService",
                    "send_detached",
                );
                if timed_out {
                    service.evict(&record, EvictReason::Timeout).await;
                }
            }
        });
    }

    /// 레지스트리 스냅샷의 모든 클라이언트에게 프레임을 전달합니다.
    ///
    /// 각 대상은 독립된 태스크로 전송되므로, 응답 없는 클라이언트가 다른
    /// 클라이언트의 전달을 지연시키지 않습니다. 반환값은 전송을 시작한
    /// 대상 수입니다.
    pub async fn broadcast(&self, payload: &[u8]) -> usize {
        let targets = self.registry.snapshot();
        let count = targets.len();

        for record in targets {
            self.send_detached(record, payload.to_vec());
        }

        debug!("브로드캐스트 시작: {}명 대상", count);
        count
    }

    /// 클라이언트를 레지스트리에서 퇴출합니다.
    ///
    /// 모든 퇴출 사유가 공유하는 단일 경로입니다. 이미 제거된 기록이면
    /// 아무 일도 하지 않습니다(퇴출 경합 방지). 진행 중인 전송은 취소하지
    /// 않으며, 제거된 대상을 향한 전송은 실패하든 성공하든 그대로
    /// 폐기됩니다.
    pub async fn evict(&self, record: &ClientRecord, reason: EvictReason) -> bool {
        if self.registry.remove(&record.id).is_none() {
            return false;
        }

        match reason {
            EvictReason::Timeout => {
                self.registry.record_timeout_eviction();
                warn!(
                    "⏱ 클라이언트 {}@{} 응답 없음, 연결 해제",
                    record.name,
                    record.endpoint()
                );
            }
            _ => {
                info!(
                    "클라이언트 {}@{} 연결 해제 ({})",
                    record.name,
                    record.endpoint(),
                    reason
                );
            }
        }

        let event = match reason {
            EvictReason::Leave | EvictReason::Shutdown => ServerEvent::Leave {
                id: record.id,
                name: record.name.clone(),
            },
            EvictReason::Kick => ServerEvent::Kick {
                id: record.id,
                name: record.name.clone(),
            },
            EvictReason::Timeout => ServerEvent::Timeout {
                id: record.id,
                name: record.name.clone(),
            },
        };
        let _ = self.event_tx.send(event);

        // 서버 종료 시에는 개별 공지를 별도로 보내므로 방송을 생략
        if reason != EvictReason::Shutdown {
            let body = format!("{}님이 나갔습니다 ({})", record.name, reason);
            if let Ok(notice) =
                Packet::server_notice(ServerCode::Success, &body, &self.server_host, self.server_port)
            {
                self.broadcast(&notice.encode()).await;
            }
        }

        true
    }

    /// 성공한 전송 수
    pub fn total_sends(&self) -> u64 {
        self.stats.total_sends.load(Ordering::Relaxed)
    }

    /// 실패한 전송 시도 수
    pub fn failed_attempts(&self) -> u64 {
        self.stats.failed_attempts.load(Ordering::Relaxed)
    }

    /// 타임아웃 판정 수
    pub fn timeouts(&self) -> u64 {
        self.stats.timeouts.load(Ordering::Relaxed)
    }
}
