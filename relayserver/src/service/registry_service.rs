//! 클라이언트 레지스트리 서비스
//!
//! 접속 중인 클라이언트 기록을 동시성 안전하게 관리합니다.
//! 레지스트리는 서버에서 유일한 공유 가변 구조이며, 모든 접근은
//! 이 모듈의 연산을 통해서만 이루어집니다. 호출자는 네트워크 I/O를
//! 시작하기 전에 필요한 레코드를 복사해 가야 하며, 잠금을 쥔 채로
//! 전송을 수행하지 않습니다.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 개별 클라이언트 기록
///
/// 역방향 접속 주소(`addr:port`)는 접속 패킷의 발신자 필드에서 기록되며,
/// 서버가 이 주소로 아웃바운드 연결을 열어 프레임을 전달합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRecord {
    /// 서버가 할당한 고유 ID
    pub id: Uuid,
    /// 표시 이름
    pub name: String,
    /// 역방향 접속 주소
    pub addr: String,
    /// 역방향 접속 포트
    pub port: u16,
    /// 연속 전송 실패 / 생존 확인 미응답 카운터 (통합 카운터)
    pub fail_count: u32,
    /// 접속 시각 (Unix timestamp)
    pub connected_at: i64,
    /// 마지막 수신 프레임 시각 (Unix timestamp)
    pub last_seen: i64,
}

impl ClientRecord {
    pub fn new(id: Uuid, name: &str, addr: &str, port: u16) -> Self {
        let now = chrono::Utc::now().timestamp();

        Self {
            id,
            name: name.to_string(),
            addr: addr.to_string(),
            port,
            fail_count: 0,
            connected_at: now,
            last_seen: now,
        }
    }

    /// 역방향 접속 엔드포인트 (`addr:port`)
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

/// 멤버 목록 조회 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberInfo {
    pub name: String,
    pub addr: String,
    pub port: u16,
}

/// 레지스트리 통계
#[derive(Debug, Default, Serialize)]
pub struct RegistryStats {
    /// 누적 입장 수
    pub total_joins: AtomicU64,
    /// 누적 퇴장 수 (사유 무관)
    pub total_leaves: AtomicU64,
    /// 생존 확인 실패로 퇴출된 수
    pub timeout_evictions: AtomicU64,
}

/// 클라이언트 레지스트리
///
/// ID에서 클라이언트 기록으로의 동시성 안전 매핑입니다. 읽기는 동시에
/// 진행될 수 있고, 쓰기(insert/remove)는 해당 샤드에 대해 배타적입니다.
pub struct ClientRegistry {
    clients: DashMap<Uuid, ClientRecord>,
    stats: RegistryStats,
}

impl ClientRegistry {
    /// 새로운 레지스트리 생성
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            stats: RegistryStats::default(),
        }
    }

    /// 클라이언트 기록을 추가합니다. 같은 ID가 이미 있으면 교체됩니다.
    pub fn insert(&self, record: ClientRecord) {
        self.clients.insert(record.id, record);
        self.stats.total_joins.fetch_add(1, Ordering::Relaxed);
    }

    /// 클라이언트 기록을 제거하고 반환합니다.
    pub fn remove(&self, id: &Uuid) -> Option<ClientRecord> {
        let removed = self.clients.remove(id).map(|(_, record)| record);
        if removed.is_some() {
            self.stats.total_leaves.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// ID로 기록을 조회합니다. 잠금을 넘기지 않도록 복사본을 반환합니다.
    pub fn get(&self, id: &Uuid) -> Option<ClientRecord> {
        self.clients.get(id).map(|entry| entry.value().clone())
    }

    /// 현재 접속 수
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// 시점 고정 스냅샷
    ///
    /// 반환된 복사본은 레지스트리가 동시에 변해도 안전하게 순회할 수
    /// 있습니다.
    pub fn snapshot(&self) -> Vec<ClientRecord> {
        self.clients.iter().map(|entry| entry.value().clone()).collect()
    }

    /// 이름으로 기록을 찾습니다. 접속 수가 작으므로 스냅샷 선형 탐색으로
    /// 충분합니다.
    pub fn find_by_name(&self, name: &str) -> Option<ClientRecord> {
        self.snapshot().into_iter().find(|record| record.name == name)
    }

    /// 멤버 목록을 반환합니다.
    pub fn members(&self) -> Vec<MemberInfo> {
        self.snapshot()
            .into_iter()
            .map(|record| MemberInfo {
                name: record.name,
                addr: record.addr,
                port: record.port,
            })
            .collect()
    }

    /// 수신 프레임 관측을 기록합니다. 생존 신호이므로 실패 카운터도
    /// 초기화됩니다.
    pub fn touch(&self, id: &Uuid) {
        if let Some(mut entry) = self.clients.get_mut(id) {
            entry.last_seen = chrono::Utc::now().timestamp();
            entry.fail_count = 0;
        }
    }

    /// 전송 실패 또는 생존 확인 미응답을 기록하고, 갱신된 카운터 값을
    /// 반환합니다. 기록이 이미 제거되었으면 None을 반환합니다.
    pub fn record_failure(&self, id: &Uuid) -> Option<u32> {
        self.clients.get_mut(id).map(|mut entry| {
            entry.fail_count += 1;
            entry.fail_count
        })
    }

    /// 실패 카운터를 초기화합니다.
    pub fn reset_failures(&self, id: &Uuid) {
        if let Some(mut entry) = self.clients.get_mut(id) {
            entry.fail_count = 0;
        }
    }

    /// 생존 확인 실패 퇴출을 통계에 기록합니다.
    pub fn record_timeout_eviction(&self) {
        self.stats.timeout_evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// 누적 입장 수
    pub fn total_joins(&self) -> u64 {
        self.stats.total_joins.load(Ordering::Relaxed)
    }

    /// 누적 퇴장 수
    pub fn total_leaves(&self) -> u64 {
        self.stats.total_leaves.load(Ordering::Relaxed)
    }

    /// 생존 확인 실패 퇴출 수
    pub fn timeout_evictions(&self) -> u64 {
        self.stats.timeout_evictions.load(Ordering::Relaxed)
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
