//! 접속 처리 핸들러
//!
//! 접속(C)과 접속 해제(D) 프레임을 처리합니다. 접속 검증에 실패한
//! 클라이언트는 등록되지 않으며, 프레임은 그대로 폐기됩니다.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared::protocol::{ConnectionPacket, Packet, PacketHeader, ServerCode};

use crate::config::RelayServerConfig;
use crate::service::delivery_service::DeliveryService;
use crate::service::events::{EvictReason, ServerEvent};
use crate::service::registry_service::{ClientRecord, ClientRegistry};
use crate::tool::{ErrorHandler, ErrorSeverity, RelayServerError};

/// 접속 핸들러
pub struct ConnectionHandler {
    registry: Arc<ClientRegistry>,
    delivery: Arc<DeliveryService>,
    event_tx: broadcast::Sender<ServerEvent>,
    server_host: String,
    server_port: u16,
    max_clients: usize,
}

impl ConnectionHandler {
    /// 새로운 접속 핸들러 생성
    pub fn new(
        registry: Arc<ClientRegistry>,
        delivery: Arc<DeliveryService>,
        event_tx: broadcast::Sender<ServerEvent>,
        config: &RelayServerConfig,
    ) -> Self {
        Self {
            registry,
            delivery,
            event_tx,
            server_host: config.host.clone(),
            server_port: config.port,
            max_clients: config.max_clients,
        }
    }

    /// 접속 프레임을 처리합니다.
    ///
    /// 검증 통과 시: ID 할당 → 레지스트리 등록 → 할당 ID를 담은 확인
    /// 공지 전송 → 입장 공지 방송. 확인 공지 전송에 실패하면 등록을
    /// 되돌립니다.
    pub async fn handle_connect(&self, packet: Packet) {
        let (addr, port) = {
            let (a, p) = packet.from();
            (a.to_string(), p)
        };

        let conn = match ConnectionPacket::from_packet(packet) {
            Ok(conn) => conn,
            Err(e) => {
                warn!("접속 패킷 검증 실패 ({}:{}): {}", addr, port, e);
                let _ = self.event_tx.send(ServerEvent::Error {
                    detail: e.to_string(),
                });
                return;
            }
        };

        if self.registry.len() >= self.max_clients {
            warn!(
                "최대 접속 수 초과로 접속 거부: {}/{}",
                self.registry.len(),
                self.max_clients
            );
            self.notify_rejection(&conn, &addr, port, "서버가 가득 찼습니다");
            return;
        }

        if self.registry.find_by_name(conn.user_name()).is_some() {
            warn!("이미 사용 중인 이름으로 접속 거부: {}", conn.user_name());
            self.notify_rejection(&conn, &addr, port, "이미 사용 중인 이름입니다");
            return;
        }

        // 서버가 ID를 할당하고, 역방향 접속 주소는 패킷 발신자 필드에서 기록
        let assigned_id = Uuid::new_v4();
        let record = ClientRecord::new(assigned_id, conn.user_name(), &addr, port);
        self.registry.insert(record.clone());

        // 할당된 ID를 담은 접속 확인 공지
        let ack = match Packet::server_notice(
            ServerCode::Success,
            &assigned_id.to_string(),
            &self.server_host,
            self.server_port,
        ) {
            Ok(ack) => ack,
            Err(e) => {
                warn!("접속 확인 공지 생성 실패: {}", e);
                self.registry.remove(&assigned_id);
                return;
            }
        };

        if let Err(e) = self.delivery.send_to_client(&record, &ack.encode()).await {
            let err = RelayServerError::connection_error(
                Some(assigned_id),
                Some(record.endpoint()),
                &format!("접속 확인 공지 전송 실패: {}", e),
            );
            ErrorHandler::handle_error(
                err,
                ErrorSeverity::Error,
                "ConnectionHandler",
                "send_ack",
            );
            self.registry.remove(&assigned_id);
            return;
        }

        info!(
            "✅ 사용자 {}@{} 접속 완료 (ID {})",
            conn.user_name(),
            record.endpoint(),
            assigned_id
        );

        let _ = self.event_tx.send(ServerEvent::Join {
            id: assigned_id,
            name: conn.user_name().to_string(),
            addr: addr.clone(),
            port,
        });

        // 입장 공지 방송
        let body = format!("{}님이 입장했습니다", conn.user_name());
        if let Ok(notice) =
            Packet::server_notice(ServerCode::Success, &body, &self.server_host, self.server_port)
        {
            self.delivery.broadcast(&notice.encode()).await;
        }
    }

    /// 접속 해제 프레임을 처리합니다.
    pub async fn handle_disconnect(&self, packet: Packet) {
        let conn = match ConnectionPacket::from_packet(packet) {
            Ok(conn) => conn,
            Err(e) => {
                warn!("접속 해제 패킷 검증 실패: {}", e);
                let _ = self.event_tx.send(ServerEvent::Error {
                    detail: e.to_string(),
                });
                return;
            }
        };

        if conn.kind() != PacketHeader::Disconnect {
            debug!("접속 해제 경로에 잘못된 헤더: {:?}", conn.kind());
            return;
        }

        match self.registry.get(&conn.user_id()) {
            Some(record) => {
                self.delivery.evict(&record, EvictReason::Leave).await;
            }
            None => {
                debug!("등록되지 않은 클라이언트의 접속 해제 통보: {}", conn.user_id());
            }
        }
    }

    /// 접속 거부를 요청자에게 통보합니다.
    fn notify_rejection(&self, conn: &ConnectionPacket, addr: &str, port: u16, reason: &str) {
        if let Ok(notice) = Packet::server_notice(
            ServerCode::PermissionError,
            reason,
            &self.server_host,
            self.server_port,
        ) {
            // 아직 등록되지 않았으므로 임시 레코드로 역방향 전송만 시도
            let record = ClientRecord::new(conn.user_id(), conn.user_name(), addr, port);
            self.delivery.send_detached(record, notice.encode());
        }
    }
}
