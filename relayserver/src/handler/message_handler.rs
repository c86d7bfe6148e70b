//! 메시지 처리 핸들러
//!
//! 메시지(M)와 귓속말(W) 프레임을 라우팅합니다. 대상이 비어 있으면
//! 전체 방송, 대상이 있으면 해당 클라이언트에게만 전달합니다.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use shared::protocol::{MessagePacket, Packet, ServerCode};

use crate::config::RelayServerConfig;
use crate::service::delivery_service::DeliveryService;
use crate::service::events::ServerEvent;
use crate::service::registry_service::ClientRegistry;
use crate::tool::{ErrorHandler, ErrorSeverity, RelayServerError};

/// 메시지 핸들러
pub struct MessageHandler {
    registry: Arc<ClientRegistry>,
    delivery: Arc<DeliveryService>,
    event_tx: broadcast::Sender<ServerEvent>,
    server_host: String,
    server_port: u16,
}

impl MessageHandler {
    /// 새로운 메시지 핸들러 생성
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
        }
    }

    /// 메시지/귓속말 프레임을 처리합니다.
    pub async fn handle(&self, packet: Packet) {
        // 원본 프레임을 그대로 중계
        let frame = packet.encode();

        let msg = match MessagePacket::from_packet(packet) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("메시지 패킷 검증 실패: {}", e);
                let _ = self.event_tx.send(ServerEvent::Error {
                    detail: e.to_string(),
                });
                return;
            }
        };

        // 발신 프레임은 생존 신호로 기록
        self.registry.touch(&msg.source_id());

        match msg.destination() {
            None => {
                info!("[메시지] {}: {}", msg.source_name(), msg.body());
                self.delivery.broadcast(&frame).await;
            }
            Some(dest) => match self.registry.find_by_name(dest) {
                Some(target) => {
                    debug!("[귓속말] {} → {}", msg.source_name(), dest);
                    self.delivery.send_detached(target, frame);
                }
                None => self.report_unknown_destination(&msg, dest),
            },
        }
    }

    /// 귓속말 대상이 없음을 발신자에게만 보고합니다. 다른 클라이언트에게는
    /// 방송하지 않습니다.
    fn report_unknown_destination(&self, msg: &MessagePacket, dest: &str) {
        let err = RelayServerError::UnknownDestination {
            name: dest.to_string(),
        };
        ErrorHandler::handle_error(err, ErrorSeverity::Warning, "MessageHandler", "whisper");

        let sender = match self.registry.get(&msg.source_id()) {
            Some(sender) => sender,
            None => {
                debug!("귓속말 발신자가 등록되어 있지 않음: {}", msg.source_id());
                return;
            }
        };

        if let Ok(notice) = Packet::server_notice(
            ServerCode::PermissionError,
            &format!("알 수 없는 귓속말 대상: {}", dest),
            &self.server_host,
            self.server_port,
        ) {
            self.delivery.send_detached(sender, notice.encode());
        }
    }
}
