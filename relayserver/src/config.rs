//! 릴레이 서버 환경 설정 모듈
//!
//! .env 파일에서 환경변수를 로드하고 관리합니다.

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

use shared::protocol::MIN_FRAME_SIZE;

/// 릴레이 서버 설정 구조체
#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    /// 릴레이 서버 호스트 주소
    pub host: String,
    /// 릴레이 서버 포트 번호
    pub port: u16,
    /// 공지와 핑에 표시되는 서버 이름
    pub name: String,
    /// 최대 동시 접속 클라이언트 수
    pub max_clients: usize,
    /// 클라이언트당 최대 연속 전송 실패 허용 횟수
    pub max_send_attempts: u32,
    /// 전송 실패 후 재시도 대기 시간 (초)
    pub retry_backoff_secs: u64,
    /// 생존 확인 핑 주기 (초)
    pub ping_interval_secs: u64,
    /// 최대 프레임 크기 (바이트)
    pub max_frame_size: usize,
}

impl RelayServerConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// 로드 순서:
    /// 1. 상위 디렉토리의 .env 파일
    /// 2. 현재 디렉토리의 .env 파일
    /// 3. 시스템 환경변수
    /// 4. 기본값
    pub fn from_env() -> Result<Self> {
        // .env 파일 로드 시도
        Self::load_env_file();

        // 환경변수에서 값 읽기 (기본값 포함)
        let config = Self {
            host: std::env::var("relay_host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("relay_port")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            name: std::env::var("relay_name").unwrap_or_else(|_| "relay".to_string()),
            max_clients: std::env::var("relay_max_clients")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            max_send_attempts: std::env::var("relay_max_send_attempts")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            retry_backoff_secs: std::env::var("relay_retry_backoff_secs")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),
            ping_interval_secs: std::env::var("relay_ping_interval_secs")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .unwrap_or(2),
            max_frame_size: std::env::var("relay_max_frame_size")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()
                .unwrap_or(1024),
        };

        info!("릴레이 서버 설정 로드 완료: {:?}", config);
        Ok(config)
    }

    /// 릴레이 서버 바인딩 주소를 반환합니다.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// .env 파일을 로드합니다.
    fn load_env_file() {
        // 여러 위치에서 .env 파일 찾기
        let env_paths = vec![
            "../.env", // 상위 디렉토리
            ".env",    // 현재 디렉토리
        ];

        let mut loaded = false;
        for path in env_paths {
            if Path::new(path).exists() && dotenv::from_filename(path).is_ok() {
                info!(".env 파일 로드 성공: {}", path);
                loaded = true;
                break;
            }
        }

        if !loaded {
            warn!(".env 파일을 찾을 수 없습니다. 기본값과 시스템 환경변수를 사용합니다.");
        }
    }
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            name: "relay".to_string(),
            max_clients: 1000,
            max_send_attempts: 5,
            retry_backoff_secs: 1,
            ping_interval_secs: 2,
            max_frame_size: 1024,
        }
    }
}

/// 설정 검증 유틸리티
pub fn validate_config(config: &RelayServerConfig) -> Result<()> {
    if config.host.is_empty() {
        anyhow::bail!("릴레이 호스트 주소가 비어있습니다");
    }

    if config.name.is_empty() {
        anyhow::bail!("릴레이 서버 이름이 비어있습니다");
    }

    if config.max_clients == 0 {
        anyhow::bail!("최대 접속 수는 1 이상이어야 합니다");
    }

    if config.max_send_attempts == 0 {
        anyhow::bail!("최대 전송 시도 횟수는 1 이상이어야 합니다");
    }

    if config.ping_interval_secs == 0 {
        anyhow::bail!("핑 주기는 1초 이상이어야 합니다");
    }

    if config.max_frame_size < MIN_FRAME_SIZE {
        anyhow::bail!(
            "최대 프레임 크기가 너무 작습니다: {}바이트 (최소 {}바이트)",
            config.max_frame_size,
            MIN_FRAME_SIZE
        );
    }

    Ok(())
}
