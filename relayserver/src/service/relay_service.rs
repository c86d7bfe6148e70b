//! 릴레이 제어 서비스
//!
//! 수락 루프를 소유하고, 수신 프레임을 핸들러로 분배하며, 외부 표시
//! 계층이 사용하는 운영 연산(방송 제출, 강퇴, 멤버 조회, 종료)을
//! 제공합니다.
//!
//! 상태는 `Stopped → Running → Stopped`로만 전이하며 재시작은 없습니다.
//! 수신 프레임의 디코딩 실패는 해당 연결만 닫고 서버는 계속 동작합니다.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared::protocol::{MessagePacket, Packet, PacketHeader, ServerCode};

use crate::config::RelayServerConfig;
use crate::handler::{ConnectionHandler, MessageHandler};
use crate::service::delivery_service::DeliveryService;
use crate::service::events::{EvictReason, ServerEvent};
use crate::service::liveness_service::LivenessService;
use crate::service::registry_service::{ClientRegistry, MemberInfo};
use crate::tool::RelayServerError;

/// 이벤트 채널 용량
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// 릴레이 서버
///
/// 레지스트리, 전송, 생존 확인 서비스와 핸들러들을 소유하는 최상위
/// 구조체입니다.
pub struct RelayServer {
    config: RelayServerConfig,
    server_id: Uuid,
    registry: Arc<ClientRegistry>,
    delivery: Arc<DeliveryService>,
    liveness: Arc<LivenessService>,
    connection_handler: Arc<ConnectionHandler>,
    message_handler: Arc<MessageHandler>,
    event_tx: broadcast::Sender<ServerEvent>,
    is_running: Arc<Mutex<bool>>,
    local_addr: Arc<Mutex<Option<SocketAddr>>>,
}

impl RelayServer {
    /// 새로운 릴레이 서버 생성
    pub fn new(config: RelayServerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let registry = Arc::new(ClientRegistry::new());
        let delivery = Arc::new(DeliveryService::new(
            Arc::clone(&registry),
            event_tx.clone(),
            &config,
        ));
        let liveness = Arc::new(LivenessService::new(
            Arc::clone(&registry),
            Arc::clone(&delivery),
            &config,
        ));
        let connection_handler = Arc::new(ConnectionHandler::new(
            Arc::clone(&registry),
            Arc::clone(&delivery),
            event_tx.clone(),
            &config,
        ));
        let message_handler = Arc::new(MessageHandler::new(
            Arc::clone(&registry),
            Arc::clone(&delivery),
            event_tx.clone(),
            &config,
        ));

        Self {
            config,
            server_id: Uuid::new_v4(),
            registry,
            delivery,
            liveness,
            connection_handler,
            message_handler,
            event_tx,
            is_running: Arc::new(Mutex::new(false)),
            local_addr: Arc::new(Mutex::new(None)),
        }
    }

    /// 서버를 시작하고 수락 루프를 실행합니다.
    ///
    /// 바인드 실패는 유일한 치명적 에러 클래스로, 호출자에게 전파되어
    /// 프로세스를 종료시킵니다.
    pub async fn start(&self) -> Result<()> {
        let bind_addr = self.config.bind_address();
        info!("🚀 릴레이 서버 시작 중... ({})", bind_addr);

        let listener = TcpListener::bind(&bind_addr)
            .await
            .context("수락 소켓 바인드 실패")?;
        let local = listener.local_addr().context("로컬 주소 조회 실패")?;
        *self.local_addr.lock().await = Some(local);

        *self.is_running.lock().await = true;
        self.liveness.start().await?;

        info!("✅ 릴레이 서버가 {}에서 실행 중입니다", local);

        // 수락 루프: 연결마다 짧은 태스크 하나 (프레임 읽기 → 분배)
        while *self.is_running.lock().await {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("새 연결 수락: {}", addr);

                    let connection_handler = Arc::clone(&self.connection_handler);
                    let message_handler = Arc::clone(&self.message_handler);
                    let registry = Arc::clone(&self.registry);
                    let event_tx = self.event_tx.clone();
                    let max_frame_size = self.config.max_frame_size;

                    tokio::spawn(async move {
                        Self::handle_inbound(
                            stream,
                            connection_handler,
                            message_handler,
                            registry,
                            event_tx,
                            max_frame_size,
                        )
                        .await;
                    });
                }
                Err(e) => {
                    error!("연결 수락 실패: {}", e);
                }
            }
        }

        Ok(())
    }

    /// 수신 연결 하나를 처리합니다: 프레임 한 개 읽기 → 디코딩 → 분배.
    async fn handle_inbound(
        mut stream: TcpStream,
        connection_handler: Arc<ConnectionHandler>,
        message_handler: Arc<MessageHandler>,
        registry: Arc<ClientRegistry>,
        event_tx: broadcast::Sender<ServerEvent>,
        max_frame_size: usize,
    ) {
        let packet = match Self::read_one_frame(&mut stream, max_frame_size).await {
            Ok(packet) => packet,
            Err(e) => {
                // 잘못된 프레임은 폐기하고 연결만 닫는다
                warn!("프레임 디코딩 실패, 연결을 닫습니다: {}", e);
                let _ = event_tx.send(ServerEvent::Error {
                    detail: e.to_string(),
                });
                return;
            }
        };

        match packet.header() {
            PacketHeader::Connect => connection_handler.handle_connect(packet).await,
            PacketHeader::Disconnect => connection_handler.handle_disconnect(packet).await,
            PacketHeader::Message | PacketHeader::Whisper => {
                message_handler.handle(packet).await
            }
            PacketHeader::Ping => {
                // 클라이언트의 핑 응답: 내용은 사용자 ID이며 생존 신호로 기록
                match Uuid::parse_str(packet.content()) {
                    Ok(id) => registry.touch(&id),
                    Err(_) => debug!("핑 응답의 사용자 ID 해석 실패: {}", packet.content()),
                }
            }
            PacketHeader::ServerNotice => {
                debug!("클라이언트가 보낸 서버 공지 프레임 무시");
            }
        }
    }

    /// 연결에서 프레임 한 개를 읽어 디코딩합니다.
    async fn read_one_frame(stream: &mut TcpStream, max_frame_size: usize) -> Result<Packet> {
        use tokio::io::AsyncReadExt;

        let peer = stream.peer_addr().context("원격 주소 조회 실패")?;
        let mut buf = vec![0u8; max_frame_size];
        let n = stream.read(&mut buf).await.context("프레임 읽기 실패")?;
        if n == 0 {
            anyhow::bail!("프레임을 받기 전에 연결이 종료되었습니다");
        }

        Ok(Packet::decode(&buf[..n], &peer.ip().to_string(), peer.port())?)
    }

    /// 운영자 방송: 서버 이름으로 된 메시지를 전체에 전달합니다.
    pub async fn submit_broadcast(&self, text: &str) -> usize {
        let msg = match MessagePacket::new(
            PacketHeader::Message,
            self.server_id,
            &self.config.name,
            None,
            text,
            &self.config.host,
            self.config.port,
        ) {
            Ok(msg) => msg,
            Err(e) => {
                error!("방송 메시지 생성 실패: {}", e);
                return 0;
            }
        };

        info!("[방송] {}: {}", self.config.name, text);
        self.delivery.broadcast(&msg.packet().encode()).await
    }

    /// 운영자 강퇴: 이름으로 찾은 클라이언트를 퇴출합니다.
    pub async fn kick(&self, name: &str) -> Result<(), RelayServerError> {
        let record = match self.registry.find_by_name(name) {
            Some(record) => record,
            None => {
                return Err(RelayServerError::UnknownUser {
                    name: name.to_string(),
                })
            }
        };

        // 강퇴 통보 후 퇴출. 통보 전송은 완료를 기다리지 않는다.
        if let Ok(notice) = Packet::server_notice(
            ServerCode::PermissionError,
            "운영자에 의해 강퇴되었습니다",
            &self.config.host,
            self.config.port,
        ) {
            self.delivery.send_detached(record.clone(), notice.encode());
        }

        self.delivery.evict(&record, EvictReason::Kick).await;
        Ok(())
    }

    /// 현재 멤버 목록
    pub fn list_members(&self) -> Vec<MemberInfo> {
        self.registry.members()
    }

    /// 서버 종료: 모든 클라이언트에게 종료 공지를 보내고 퇴출합니다.
    pub async fn shutdown(&self) {
        info!("🛑 릴레이 서버 종료 중...");

        *self.is_running.lock().await = false;

        if let Err(e) = self.liveness.stop().await {
            error!("생존 확인 루프 중지 실패: {}", e);
        }

        // 레지스트리를 먼저 비운 뒤, 복사해 둔 기록으로 종료 공지를 보낸다.
        // 공지 전송이 타임아웃하더라도 이미 제거된 대상이므로 추가 퇴출은
        // 일어나지 않는다.
        let members = self.registry.snapshot();
        for record in &members {
            self.delivery.evict(record, EvictReason::Shutdown).await;
        }

        if let Ok(notice) = Packet::server_notice(
            ServerCode::Shutdown,
            "서버가 종료됩니다",
            &self.config.host,
            self.config.port,
        ) {
            let payload = notice.encode();
            for record in &members {
                self.delivery.send_detached(record.clone(), payload.clone());
            }
        }

        info!("✅ 릴레이 서버가 성공적으로 중지되었습니다");
    }

    /// 이벤트 스트림 구독
    pub fn subscribe_events(&self) -> broadcast::Receiver<ServerEvent> {
        self.event_tx.subscribe()
    }

    /// 실행 중 여부
    pub async fn is_running(&self) -> bool {
        *self.is_running.lock().await
    }

    /// 바인드된 실제 주소 (시작 전에는 None)
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// 클라이언트 레지스트리 접근자
    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    /// 전송 서비스 접근자
    pub fn delivery(&self) -> Arc<DeliveryService> {
        Arc::clone(&self.delivery)
    }

    /// 생존 확인 서비스 접근자
    pub fn liveness(&self) -> Arc<LivenessService> {
        Arc::clone(&self.liveness)
    }
}
