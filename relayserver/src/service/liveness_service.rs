//! 생존 확인 서비스
//!
//! 주기적으로 핑 프레임을 방송하고, 한 주기 동안 아무 프레임도 보내지
//! 않은 클라이언트의 미응답 카운터를 올립니다. 카운터가 예산에 도달한
//! 클라이언트는 시간 초과로 퇴출됩니다.
//!
//! 전송 실패 기반 판정과 핑 기반 판정은 레코드의 통합 카운터 하나를
//! 공유합니다. 핑 전달 자체가 재시도 예산을 소진하면 스캔을 기다리지
//! 않고 즉시 퇴출합니다.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use shared::protocol::Packet;

use crate::config::RelayServerConfig;
use crate::service::delivery_service::DeliveryService;
use crate::service::events::EvictReason;
use crate::service::registry_service::ClientRegistry;

/// 생존 확인 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LivenessStats {
    /// 수행한 주기 수
    pub total_cycles: u64,
    /// 시간 초과로 퇴출한 수
    pub timeout_evictions: u64,
    /// 마지막 주기 시각 (Unix timestamp)
    pub last_cycle_timestamp: Option<i64>,
    /// 마지막 주기 기준 접속 수
    pub active_clients: u32,
}

/// 생존 확인 서비스
pub struct LivenessService {
    registry: Arc<ClientRegistry>,
    delivery: Arc<DeliveryService>,
    server_name: String,
    server_host: String,
    server_port: u16,
    ping_interval_secs: u64,
    max_send_attempts: u32,
    is_running: Arc<Mutex<bool>>,
    probe_handle: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<Mutex<LivenessStats>>,
}

impl LivenessService {
    /// 새로운 생존 확인 서비스 생성
    pub fn new(
        registry: Arc<ClientRegistry>,
        delivery: Arc<DeliveryService>,
        config: &RelayServerConfig,
    ) -> Self {
        Self {
            registry,
            delivery,
            server_name: config.name.clone(),
            server_host: config.host.clone(),
            server_port: config.port,
            ping_interval_secs: config.ping_interval_secs,
            max_send_attempts: config.max_send_attempts,
            is_running: Arc::new(Mutex::new(false)),
            probe_handle: Mutex::new(None),
            stats: Arc::new(Mutex::new(LivenessStats::default())),
        }
    }

    /// 생존 확인 루프를 시작합니다.
    pub async fn start(&self) -> anyhow::Result<()> {
        let mut is_running = self.is_running.lock().await;

        if *is_running {
            warn!("생존 확인 루프가 이미 실행 중입니다");
            return Ok(());
        }

        *is_running = true;
        drop(is_running);

        info!(
            "🔄 생존 확인 루프 시작 ({}초 주기, 예산 {}회)",
            self.ping_interval_secs, self.max_send_attempts
        );

        let registry = Arc::clone(&self.registry);
        let delivery = Arc::clone(&self.delivery);
        let is_running_ref = Arc::clone(&self.is_running);
        let stats_ref = Arc::clone(&self.stats);
        let server_name = self.server_name.clone();
        let server_host = self.server_host.clone();
        let server_port = self.server_port;
        let interval_secs = self.ping_interval_secs;
        let max_attempts = self.max_send_attempts;

        let handle = tokio::spawn(async move {
            loop {
                if !*is_running_ref.lock().await {
                    break;
                }

                let evicted = Self::probe_cycle(
                    &registry,
                    &delivery,
                    &server_name,
                    &server_host,
                    server_port,
                    interval_secs,
                    max_attempts,
                )
                .await;

                if let Ok(mut stats) = stats_ref.try_lock() {
                    stats.total_cycles += 1;
                    stats.timeout_evictions += evicted as u64;
                    stats.last_cycle_timestamp = Some(chrono::Utc::now().timestamp());
                    stats.active_clients = registry.len() as u32;
                }
            }

            debug!("생존 확인 루프 종료");
        });

        *self.probe_handle.lock().await = Some(handle);
        Ok(())
    }

    /// 생존 확인 루프를 중지합니다.
    pub async fn stop(&self) -> anyhow::Result<()> {
        let mut is_running = self.is_running.lock().await;

        if !*is_running {
            return Ok(());
        }

        *is_running = false;
        drop(is_running);

        if let Some(handle) = self.probe_handle.lock().await.take() {
            handle.abort();
        }

        info!("생존 확인 루프 중지 완료");
        Ok(())
    }

    /// 실행 중 여부
    pub async fn is_running(&self) -> bool {
        *self.is_running.lock().await
    }

    /// 통계 스냅샷
    pub async fn get_stats(&self) -> LivenessStats {
        self.stats.lock().await.clone()
    }

    /// 한 주기를 즉시 수행합니다 (대기 시간 없음). 수동 점검용.
    pub async fn probe_now(&self) -> usize {
        Self::probe_cycle(
            &self.registry,
            &self.delivery,
            &self.server_name,
            &self.server_host,
            self.server_port,
            0,
            self.max_send_attempts,
        )
        .await
    }

    /// 생존 확인 한 주기: 핑 방송 → 주기 대기 → 미응답 스캔.
    ///
    /// 핑 전송은 완료를 추적하며, 예산을 소진한 대상은 즉시 퇴출합니다.
    /// 스캔 단계에서는 주기 시작 이후 수신 프레임이 관측된 클라이언트의
    /// 카운터를 초기화하고, 그렇지 않은 클라이언트의 카운터를 올립니다.
    async fn probe_cycle(
        registry: &Arc<ClientRegistry>,
        delivery: &Arc<DeliveryService>,
        server_name: &str,
        server_host: &str,
        server_port: u16,
        interval_secs: u64,
        max_attempts: u32,
    ) -> usize {
        let cycle_start = chrono::Utc::now().timestamp();

        let ping = match Packet::ping(server_name, server_host, server_port) {
            Ok(packet) => packet.encode(),
            Err(e) => {
                error!("핑 패킷 생성 실패: {}", e);
                return 0;
            }
        };

        // 1. 핑 방송 (전송 완료 추적)
        let mut handles = Vec::new();
        for record in registry.snapshot() {
            let delivery = Arc::clone(delivery);
            let payload = ping.clone();
            handles.push(tokio::spawn(async move {
                match delivery.send_to_client(&record, &payload).await {
                    Ok(()) => 0,
                    Err(err) if err.is_timeout() => {
                        if delivery.evict(&record, EvictReason::Timeout).await {
                            1
                        } else {
                            0
                        }
                    }
                    Err(_) => 0,
                }
            }));
        }

        let mut evicted = 0;
        for handle in handles {
            evicted += handle.await.unwrap_or(0);
        }

        // 2. 주기 대기
        if interval_secs > 0 {
            sleep(Duration::from_secs(interval_secs)).await;
        }

        // 3. 미응답 스캔
        for record in registry.snapshot() {
            if record.last_seen >= cycle_start {
                registry.reset_failures(&record.id);
                continue;
            }

            if let Some(count) = registry.record_failure(&record.id) {
                if count >= max_attempts {
                    if delivery.evict(&record, EvictReason::Timeout).await {
                        evicted += 1;
                    }
                }
            }
        }

        if evicted > 0 {
            warn!("생존 확인 주기 완료: {}명 퇴출", evicted);
        }

        evicted
    }
}
