//! 패킷 인코딩/디코딩
//!
//! 프레임 바이트 배열과 패킷 구조체 간 변환을 담당합니다.
//! 접속 패킷(C/D)과 메시지 패킷(M/W)은 내용 세그먼트를 추가로 해석하는
//! 특수화 타입으로 제공됩니다.

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;
use uuid::Uuid;

use super::error::ProtocolError;
use super::timestamp::TimeStamp;
use super::{
    PacketHeader, ServerCode, FRAME_TERMINATOR, MAX_FRAME_SIZE, META_SIZE, MIN_FRAME_SIZE,
    SEPARATOR,
};

/// 와이어 패킷
///
/// 디코딩에 성공한 패킷은 불변이며, 모든 필드가 검증된 상태입니다.
#[derive(Debug, Clone)]
pub struct Packet {
    id: Uuid,
    header: PacketHeader,
    timestamp: TimeStamp,
    addr: String,
    port: u16,
    content: String,
}

impl Packet {
    /// 새 패킷을 생성합니다. 인코딩 크기가 최대 프레임 크기를 넘으면
    /// 실패합니다.
    pub fn new(
        header: PacketHeader,
        content: &str,
        addr: &str,
        port: u16,
    ) -> Result<Self, ProtocolError> {
        Self::new_with_limit(header, content, addr, port, MAX_FRAME_SIZE)
    }

    /// 최대 프레임 크기를 지정하여 패킷을 생성합니다.
    pub fn new_with_limit(
        header: PacketHeader,
        content: &str,
        addr: &str,
        port: u16,
        max_frame_size: usize,
    ) -> Result<Self, ProtocolError> {
        let encoded_size = META_SIZE + content.len() + FRAME_TERMINATOR.len();
        if encoded_size > max_frame_size {
            return Err(ProtocolError::ContentTooLarge(format!(
                "{}바이트 (최대 {}바이트)",
                encoded_size, max_frame_size
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            header,
            timestamp: TimeStamp::now(),
            addr: addr.to_string(),
            port,
            content: content.to_string(),
        })
    }

    /// 서버 공지 패킷을 생성합니다. 내용은 `<코드>\<본문>` 형식입니다.
    pub fn server_notice(
        code: ServerCode,
        body: &str,
        addr: &str,
        port: u16,
    ) -> Result<Self, ProtocolError> {
        let content = format!("{}{}{}", code.as_byte() as char, SEPARATOR as char, body);
        Self::new(PacketHeader::ServerNotice, &content, addr, port)
    }

    /// 생존 확인 핑 패킷을 생성합니다. 내용은 서버 이름입니다.
    pub fn ping(server_name: &str, addr: &str, port: u16) -> Result<Self, ProtocolError> {
        Self::new(PacketHeader::Ping, server_name, addr, port)
    }

    /// 수신 바이트를 패킷으로 디코딩합니다.
    ///
    /// 프레임 오프셋: `[0]`=구분자, `[1]`=헤더, `[3..11]`=타임스탬프,
    /// `[12..]`=내용, 마지막 2바이트=CRLF.
    pub fn decode(bytes: &[u8], addr: &str, port: u16) -> Result<Self, ProtocolError> {
        let n = bytes.len();
        if n < MIN_FRAME_SIZE {
            return Err(ProtocolError::TruncatedFrame(format!(
                "{}바이트 수신 (최소 {}바이트 필요)",
                n, MIN_FRAME_SIZE
            )));
        }
        if &bytes[n - FRAME_TERMINATOR.len()..] != FRAME_TERMINATOR {
            return Err(ProtocolError::TruncatedFrame(
                "프레임 종결자(CRLF)가 없습니다".to_string(),
            ));
        }

        let header =
            PacketHeader::from_byte(bytes[1]).ok_or(ProtocolError::UnknownHeader(bytes[1]))?;

        let time_region = std::str::from_utf8(&bytes[3..11]).map_err(|_| {
            ProtocolError::MalformedTimestamp("타임스탬프 영역이 UTF-8이 아닙니다".to_string())
        })?;
        let timestamp = TimeStamp::parse(time_region)?;

        let content = String::from_utf8_lossy(&bytes[META_SIZE..n - FRAME_TERMINATOR.len()])
            .into_owned();

        Ok(Self {
            id: Uuid::new_v4(),
            header,
            timestamp,
            addr: addr.to_string(),
            port,
            content,
        })
    }

    /// 패킷을 와이어 프레임으로 인코딩합니다.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame =
            Vec::with_capacity(META_SIZE + self.content.len() + FRAME_TERMINATOR.len());
        frame.push(SEPARATOR);
        frame.push(self.header.as_byte());
        frame.push(SEPARATOR);
        frame.extend_from_slice(self.timestamp.to_string().as_bytes());
        frame.push(SEPARATOR);
        frame.extend_from_slice(self.content.as_bytes());
        frame.extend_from_slice(FRAME_TERMINATOR);
        frame
    }

    /// 패킷 상관 ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn header(&self) -> PacketHeader {
        self.header
    }

    pub fn timestamp(&self) -> TimeStamp {
        self.timestamp
    }

    /// 발신자 주소와 포트
    pub fn from(&self) -> (&str, u16) {
        (&self.addr, self.port)
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// 서버 공지 패킷의 상태 코드. 공지가 아니거나 코드가 없으면 None.
    pub fn server_code(&self) -> Option<ServerCode> {
        if self.header != PacketHeader::ServerNotice {
            return None;
        }
        self.content.bytes().next().and_then(ServerCode::from_byte)
    }

    /// 서버 공지 패킷의 본문 (코드 세그먼트 이후)
    pub fn notice_body(&self) -> Option<&str> {
        if self.header != PacketHeader::ServerNotice {
            return None;
        }
        self.content
            .splitn(2, SEPARATOR as char)
            .nth(1)
            .or(Some(""))
    }

    /// 패킷을 스트림에 기록합니다.
    pub async fn write_to_stream<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        writer
            .write_all(&self.encode())
            .await
            .context("프레임 기록 실패")?;
        writer.flush().await.context("프레임 플러시 실패")?;
        Ok(())
    }

    /// 리더에서 프레임 한 개를 읽어 디코딩합니다.
    ///
    /// 발신자 주소 정보는 호출자가 연결에서 추출하여 전달합니다.
    pub async fn read_from<R: AsyncRead + Unpin>(
        reader: &mut R,
        addr: &str,
        port: u16,
    ) -> Result<Packet> {
        let mut buf = vec![0u8; MAX_FRAME_SIZE];
        let n = reader.read(&mut buf).await.context("프레임 읽기 실패")?;
        if n == 0 {
            bail!("프레임을 받기 전에 연결이 종료되었습니다");
        }
        debug!("{}:{}에서 {}바이트 프레임 수신", addr, port, n);
        Ok(Packet::decode(&buf[..n], addr, port)?)
    }

    /// TCP 스트림에서 프레임 한 개를 읽습니다. 발신자 주소는 연결의
    /// 원격 주소에서 가져옵니다.
    pub async fn read_from_stream(stream: &mut TcpStream) -> Result<Packet> {
        let peer = stream.peer_addr().context("원격 주소 조회 실패")?;
        Self::read_from(stream, &peer.ip().to_string(), peer.port()).await
    }
}

/// 접속/접속 해제 패킷
///
/// 내용은 `<사용자 ID>\<사용자 이름>` 형식이며, C/D 헤더에서만 만들어집니다.
#[derive(Debug, Clone)]
pub struct ConnectionPacket {
    packet: Packet,
    user_id: Uuid,
    user_name: String,
}

impl ConnectionPacket {
    /// 접속 패킷을 생성합니다.
    pub fn new(
        header: PacketHeader,
        user_id: Uuid,
        user_name: &str,
        addr: &str,
        port: u16,
    ) -> Result<Self, ProtocolError> {
        if !header.is_connection_kind() {
            return Err(ProtocolError::InvalidHeader(header.as_byte() as char));
        }
        super::validate_username(user_name)?;

        let content = format!("{}{}{}", user_id, SEPARATOR as char, user_name);
        let packet = Packet::new(header, &content, addr, port)?;

        Ok(Self {
            packet,
            user_id,
            user_name: user_name.to_string(),
        })
    }

    /// 디코딩된 패킷을 접속 패킷으로 해석합니다.
    pub fn from_packet(packet: Packet) -> Result<Self, ProtocolError> {
        if !packet.header().is_connection_kind() {
            return Err(ProtocolError::InvalidHeader(packet.header().as_byte() as char));
        }

        let mut parts = packet.content().splitn(2, SEPARATOR as char);
        let id_segment = parts.next().unwrap_or("");
        let name_segment = parts.next().unwrap_or("");

        let user_id = Uuid::parse_str(id_segment).map_err(|_| {
            ProtocolError::InvalidUserId(format!("`{}`은(는) UUID가 아닙니다", id_segment))
        })?;
        super::validate_username(name_segment)?;
        let user_name = name_segment.to_string();

        Ok(Self {
            packet,
            user_id,
            user_name,
        })
    }

    /// 접속(C)인지 해제(D)인지 반환합니다.
    pub fn kind(&self) -> PacketHeader {
        self.packet.header()
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }
}

/// 메시지/귓속말 패킷
///
/// 내용은 `<발신 ID>\<발신 이름>\<대상 이름>\<본문>` 형식입니다.
/// 대상 이름이 비어 있으면 전체 방송입니다.
#[derive(Debug, Clone)]
pub struct MessagePacket {
    packet: Packet,
    source_id: Uuid,
    source_name: String,
    destination: Option<String>,
    body: String,
}

impl MessagePacket {
    /// 메시지 패킷을 생성합니다.
    pub fn new(
        header: PacketHeader,
        source_id: Uuid,
        source_name: &str,
        destination: Option<&str>,
        body: &str,
        addr: &str,
        port: u16,
    ) -> Result<Self, ProtocolError> {
        if !header.is_message_kind() {
            return Err(ProtocolError::InvalidHeader(header.as_byte() as char));
        }
        super::validate_username(source_name)?;
        if let Some(dest) = destination {
            super::validate_username(dest)?;
        }

        let sep = SEPARATOR as char;
        let content = format!(
            "{}{}{}{}{}{}{}",
            source_id,
            sep,
            source_name,
            sep,
            destination.unwrap_or(""),
            sep,
            body
        );
        let packet = Packet::new(header, &content, addr, port)?;

        Ok(Self {
            packet,
            source_id,
            source_name: source_name.to_string(),
            destination: destination.map(str::to_string),
            body: body.to_string(),
        })
    }

    /// 디코딩된 패킷을 메시지 패킷으로 해석합니다.
    pub fn from_packet(packet: Packet) -> Result<Self, ProtocolError> {
        if !packet.header().is_message_kind() {
            return Err(ProtocolError::InvalidHeader(packet.header().as_byte() as char));
        }

        let mut parts = packet.content().splitn(4, SEPARATOR as char);
        let id_segment = parts.next().unwrap_or("");
        let name_segment = parts.next().unwrap_or("");
        let dest_segment = parts.next().unwrap_or("");
        let body_segment = parts.next().unwrap_or("");

        let source_id = Uuid::parse_str(id_segment).map_err(|_| {
            ProtocolError::InvalidUserId(format!("`{}`은(는) UUID가 아닙니다", id_segment))
        })?;
        super::validate_username(name_segment)?;

        let destination = if dest_segment.is_empty() {
            None
        } else {
            super::validate_username(dest_segment)?;
            Some(dest_segment.to_string())
        };

        Ok(Self {
            source_id,
            source_name: name_segment.to_string(),
            destination,
            body: body_segment.to_string(),
            packet,
        })
    }

    pub fn source_id(&self) -> Uuid {
        self.source_id
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// 대상 이름. None이면 전체 방송입니다.
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// 전체 방송 여부
    pub fn is_broadcast(&self) -> bool {
        self.destination.is_none()
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_ADDR: &str = "127.0.0.1";
    const TEST_PORT: u16 = 9000;

    #[test]
    fn test_encode_decode_round_trip() {
        let headers = [
            PacketHeader::Connect,
            PacketHeader::Disconnect,
            PacketHeader::Message,
            PacketHeader::Whisper,
            PacketHeader::ServerNotice,
            PacketHeader::Ping,
        ];

        for header in headers {
            let packet =
                Packet::new(header, "round trip content", TEST_ADDR, TEST_PORT).unwrap();
            let bytes = packet.encode();
            let decoded = Packet::decode(&bytes, TEST_ADDR, TEST_PORT)
                .expect("인코딩된 프레임은 디코딩되어야 함");

            assert_eq!(decoded.header(), packet.header(), "헤더가 왕복 일치해야 함");
            assert_eq!(
                decoded.timestamp(),
                packet.timestamp(),
                "타임스탬프가 왕복 일치해야 함"
            );
            assert_eq!(decoded.content(), packet.content(), "내용이 왕복 일치해야 함");
        }
    }

    #[test]
    fn test_frame_layout() {
        let packet = Packet::new(PacketHeader::Message, "hi", TEST_ADDR, TEST_PORT).unwrap();
        let bytes = packet.encode();

        assert_eq!(bytes[0], SEPARATOR);
        assert_eq!(bytes[1], b'M');
        assert_eq!(bytes[2], SEPARATOR);
        assert_eq!(bytes[11], SEPARATOR);
        assert_eq!(&bytes[12..14], b"hi");
        assert_eq!(&bytes[bytes.len() - 2..], b"\r\n");
        assert_eq!(bytes.len(), META_SIZE + 2 + FRAME_TERMINATOR.len());
    }

    #[test]
    fn test_content_too_large() {
        let oversized = "x".repeat(MAX_FRAME_SIZE);
        let result = Packet::new(PacketHeader::Message, &oversized, TEST_ADDR, TEST_PORT);
        assert!(
            matches!(result, Err(ProtocolError::ContentTooLarge(_))),
            "최대 크기를 넘는 내용은 거부되어야 함"
        );

        let exact_fit = "x".repeat(MAX_FRAME_SIZE - MIN_FRAME_SIZE);
        assert!(
            Packet::new(PacketHeader::Message, &exact_fit, TEST_ADDR, TEST_PORT).is_ok(),
            "경계 크기는 허용되어야 함"
        );
    }

    #[test]
    fn test_custom_frame_limit() {
        let content = "x".repeat(100);
        assert!(Packet::new_with_limit(
            PacketHeader::Message,
            &content,
            TEST_ADDR,
            TEST_PORT,
            64
        )
        .is_err());
        assert!(Packet::new_with_limit(
            PacketHeader::Message,
            &content,
            TEST_ADDR,
            TEST_PORT,
            256
        )
        .is_ok());
    }

    #[test]
    fn test_decode_truncated_frame() {
        let result = Packet::decode(b"\\M\\12:0", TEST_ADDR, TEST_PORT);
        assert!(matches!(result, Err(ProtocolError::TruncatedFrame(_))));

        // 길이는 충분하지만 종결자가 없는 경우
        let result = Packet::decode(b"\\M\\12:00:00\\hello!", TEST_ADDR, TEST_PORT);
        assert!(matches!(result, Err(ProtocolError::TruncatedFrame(_))));
    }

    #[test]
    fn test_decode_unknown_header() {
        let result = Packet::decode(b"\\X\\12:00:00\\hello\r\n", TEST_ADDR, TEST_PORT);
        assert!(matches!(result, Err(ProtocolError::UnknownHeader(b'X'))));
    }

    #[test]
    fn test_decode_malformed_timestamp() {
        let result = Packet::decode(b"\\M\\34:15:22\\hello\r\n", TEST_ADDR, TEST_PORT);
        assert!(
            matches!(result, Err(ProtocolError::MalformedTimestamp(_))),
            "범위를 벗어난 시 필드는 거부되어야 함"
        );

        let result = Packet::decode(b"\\M\\abcdefgh\\hello\r\n", TEST_ADDR, TEST_PORT);
        assert!(matches!(result, Err(ProtocolError::MalformedTimestamp(_))));
    }

    #[test]
    fn test_connection_packet_round_trip() {
        let user_id = Uuid::new_v4();
        let conn =
            ConnectionPacket::new(PacketHeader::Connect, user_id, "joncena", TEST_ADDR, TEST_PORT)
                .unwrap();

        let bytes = conn.packet().encode();
        let decoded = Packet::decode(&bytes, TEST_ADDR, TEST_PORT).unwrap();
        let parsed = ConnectionPacket::from_packet(decoded).expect("접속 패킷으로 해석되어야 함");

        assert_eq!(parsed.kind(), PacketHeader::Connect);
        assert_eq!(parsed.user_id(), user_id, "사용자 ID가 일치해야 함");
        assert_eq!(parsed.user_name(), "joncena", "사용자 이름이 일치해야 함");
    }

    #[test]
    fn test_connection_packet_rejects_wrong_header() {
        let packet = Packet::new(PacketHeader::Message, "whatever", TEST_ADDR, TEST_PORT).unwrap();
        let result = ConnectionPacket::from_packet(packet);
        assert!(matches!(result, Err(ProtocolError::InvalidHeader(_))));

        let result = ConnectionPacket::new(
            PacketHeader::Ping,
            Uuid::new_v4(),
            "joncena",
            TEST_ADDR,
            TEST_PORT,
        );
        assert!(matches!(result, Err(ProtocolError::InvalidHeader(_))));
    }

    #[test]
    fn test_connection_packet_rejects_bad_id() {
        let packet = Packet::new(
            PacketHeader::Connect,
            "not-a-uuid\\joncena",
            TEST_ADDR,
            TEST_PORT,
        )
        .unwrap();
        let result = ConnectionPacket::from_packet(packet);
        assert!(matches!(result, Err(ProtocolError::InvalidUserId(_))));
    }

    #[test]
    fn test_connection_packet_rejects_bad_username() {
        let content = format!("{}\\-jon-connor18", Uuid::new_v4());
        let packet = Packet::new(PacketHeader::Connect, &content, TEST_ADDR, TEST_PORT).unwrap();
        let result = ConnectionPacket::from_packet(packet);
        assert!(matches!(result, Err(ProtocolError::InvalidUsername(_))));
    }

    #[test]
    fn test_message_packet_broadcast() {
        let source_id = Uuid::new_v4();
        let msg = MessagePacket::new(
            PacketHeader::Message,
            source_id,
            "joncena",
            None,
            "hi everyone",
            TEST_ADDR,
            TEST_PORT,
        )
        .unwrap();

        let bytes = msg.packet().encode();
        let decoded = Packet::decode(&bytes, TEST_ADDR, TEST_PORT).unwrap();
        let parsed = MessagePacket::from_packet(decoded).unwrap();

        assert!(parsed.is_broadcast(), "대상이 비어 있으면 전체 방송이어야 함");
        assert_eq!(parsed.source_id(), source_id);
        assert_eq!(parsed.source_name(), "joncena");
        assert_eq!(parsed.body(), "hi everyone");
    }

    #[test]
    fn test_message_packet_whisper() {
        let msg = MessagePacket::new(
            PacketHeader::Whisper,
            Uuid::new_v4(),
            "joncena",
            Some("Springwater64"),
            "secret",
            TEST_ADDR,
            TEST_PORT,
        )
        .unwrap();

        let bytes = msg.packet().encode();
        let decoded = Packet::decode(&bytes, TEST_ADDR, TEST_PORT).unwrap();
        let parsed = MessagePacket::from_packet(decoded).unwrap();

        assert!(!parsed.is_broadcast());
        assert_eq!(parsed.destination(), Some("Springwater64"), "대상이 일치해야 함");
        assert_eq!(parsed.body(), "secret");
    }

    #[test]
    fn test_message_packet_rejects_bad_destination() {
        let content = format!("{}\\joncena\\bad name\\hello", Uuid::new_v4());
        let packet = Packet::new(PacketHeader::Whisper, &content, TEST_ADDR, TEST_PORT).unwrap();
        let result = MessagePacket::from_packet(packet);
        assert!(matches!(result, Err(ProtocolError::InvalidUsername(_))));
    }

    #[test]
    fn test_message_body_preserves_separators() {
        let content = format!("{}\\joncena\\\\a\\b\\c", Uuid::new_v4());
        let packet = Packet::new(PacketHeader::Message, &content, TEST_ADDR, TEST_PORT).unwrap();
        let parsed = MessagePacket::from_packet(packet).unwrap();
        assert_eq!(parsed.body(), "a\\b\\c", "본문 내부의 구분자는 보존되어야 함");
    }

    #[test]
    fn test_server_notice_code() {
        let notice =
            Packet::server_notice(ServerCode::Shutdown, "서버가 종료됩니다", TEST_ADDR, TEST_PORT)
                .unwrap();
        let bytes = notice.encode();
        let decoded = Packet::decode(&bytes, TEST_ADDR, TEST_PORT).unwrap();

        assert_eq!(decoded.server_code(), Some(ServerCode::Shutdown));
        assert_eq!(decoded.notice_body(), Some("서버가 종료됩니다"));

        let ping = Packet::ping("relay", TEST_ADDR, TEST_PORT).unwrap();
        assert_eq!(ping.server_code(), None, "공지가 아닌 패킷에는 코드가 없음");
    }

    #[tokio::test]
    async fn test_write_to_stream() {
        let packet = Packet::new(PacketHeader::Message, "stream", TEST_ADDR, TEST_PORT).unwrap();
        let expected = packet.encode();

        let mut mock = tokio_test::io::Builder::new().write(&expected).build();
        packet
            .write_to_stream(&mut mock)
            .await
            .expect("모의 스트림 기록은 성공해야 함");
    }

    #[tokio::test]
    async fn test_read_from_reader() {
        let packet = Packet::new(PacketHeader::Ping, "relay", TEST_ADDR, TEST_PORT).unwrap();
        let frame = packet.encode();

        let mut mock = tokio_test::io::Builder::new().read(&frame).build();
        let decoded = Packet::read_from(&mut mock, TEST_ADDR, TEST_PORT)
            .await
            .expect("모의 스트림에서 읽기는 성공해야 함");

        assert_eq!(decoded.header(), PacketHeader::Ping);
        assert_eq!(decoded.content(), "relay");
        assert_eq!(decoded.from(), (TEST_ADDR, TEST_PORT));
    }
}
