//! 전송 서비스 테스트
//!
//! 재시도 예산, 타임아웃 판정, 카운터 초기화, 브로드캐스트 팬아웃 테스트

use tokio::time::{sleep, timeout, Duration};

use shared::protocol::{Packet, PacketHeader};

use crate::service::events::ServerEvent;
use crate::tests::{
    create_test_delivery, create_test_event_channel, create_test_record, create_test_registry,
    spawn_capture_listener, unused_port,
};

/// 도달 불가 대상은 예산만큼 재시도 후 타임아웃으로 보고되어야 함
#[tokio::test]
async fn test_unreachable_target_times_out() {
    let registry = create_test_registry();
    let event_tx = create_test_event_channel();
    let delivery = create_test_delivery(registry.clone(), event_tx);

    let dead_port = unused_port().await;
    let record = create_test_record("joncena", dead_port);
    registry.insert(record.clone());

    let result = delivery.send_to_client(&record, b"payload").await;
    let err = result.expect_err("도달 불가 대상 전송은 실패해야 함");
    assert!(err.is_timeout(), "재시도 예산 소진은 타임아웃으로 판정되어야 함");

    // 시도 횟수는 정확히 예산과 같아야 함 (테스트 설정: 3회)
    assert_eq!(delivery.failed_attempts(), 3, "전송 시도는 정확히 예산만큼이어야 함");
    assert_eq!(delivery.timeouts(), 1);

    let record = registry.get(&record.id).expect("Test assertion failed");
    assert_eq!(record.fail_count, 3, "실패 카운터가 시도 횟수와 일치해야 함");
}

/// 전송 성공은 실패 카운터를 초기화해야 함
#[tokio::test]
async fn test_success_resets_counter() {
    let registry = create_test_registry();
    let event_tx = create_test_event_channel();
    let delivery = create_test_delivery(registry.clone(), event_tx);

    let (port, captured) = spawn_capture_listener().await;
    let record = create_test_record("joncena", port);
    registry.insert(record.clone());

    // 이전 실패가 쌓여 있는 상태에서 성공하면 0으로 돌아가야 한다
    registry.record_failure(&record.id);
    registry.record_failure(&record.id);

    delivery
        .send_to_client(&record, b"hello frame")
        .await
        .expect("수신 중인 대상 전송은 성공해야 함");

    let updated = registry.get(&record.id).expect("Test assertion failed");
    assert_eq!(updated.fail_count, 0, "성공 후 실패 카운터는 0이어야 함");
    assert_eq!(delivery.total_sends(), 1);

    // 수신 측에 페이로드가 도착했는지 확인
    timeout(Duration::from_secs(2), async {
        loop {
            if !captured.lock().await.is_empty() {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("페이로드가 수신되어야 함");

    assert_eq!(captured.lock().await[0], b"hello frame".to_vec());
}

/// 브로드캐스트는 스냅샷의 모든 대상에게 독립적으로 전송되어야 함
#[tokio::test]
async fn test_broadcast_fanout() {
    let registry = create_test_registry();
    let event_tx = create_test_event_channel();
    let delivery = create_test_delivery(registry.clone(), event_tx);

    let (port_a, captured_a) = spawn_capture_listener().await;
    let (port_b, captured_b) = spawn_capture_listener().await;
    registry.insert(create_test_record("alphauser", port_a));
    registry.insert(create_test_record("bravouser", port_b));

    let frame = Packet::new(PacketHeader::ServerNotice, "0\\notice", "127.0.0.1", 0)
        .expect("Test assertion failed")
        .encode();

    let count = delivery.broadcast(&frame).await;
    assert_eq!(count, 2, "브로드캐스트 대상 수가 접속 수와 일치해야 함");

    timeout(Duration::from_secs(2), async {
        loop {
            if !captured_a.lock().await.is_empty() && !captured_b.lock().await.is_empty() {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("두 대상 모두 프레임을 수신해야 함");

    assert_eq!(captured_a.lock().await[0], frame);
    assert_eq!(captured_b.lock().await[0], frame);
}

/// 위임 전송의 타임아웃은 해당 클라이언트를 퇴출시켜야 함
#[tokio::test]
async fn test_detached_timeout_evicts() {
    let registry = create_test_registry();
    let event_tx = create_test_event_channel();
    let mut event_rx = event_tx.subscribe();
    let delivery = create_test_delivery(registry.clone(), event_tx);

    let dead_port = unused_port().await;
    let record = create_test_record("joncena", dead_port);
    registry.insert(record.clone());

    delivery.send_detached(record.clone(), b"payload".to_vec());

    // 퇴출 완료 대기
    timeout(Duration::from_secs(5), async {
        loop {
            if registry.get(&record.id).is_none() {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("타임아웃 후 기록이 제거되어야 함");

    let event = timeout(Duration::from_secs(2), event_rx.recv())
        .await
        .expect("이벤트가 도착해야 함")
        .expect("이벤트 수신은 성공해야 함");
    assert!(
        matches!(event, ServerEvent::Timeout { ref name, .. } if name == "joncena"),
        "시간 초과 이벤트가 발생해야 함: {:?}",
        event
    );

    assert_eq!(registry.timeout_evictions(), 1);
}

/// 퇴출된 대상에게는 이후 전송이 시도되지 않아야 함
#[tokio::test]
async fn test_no_delivery_after_eviction() {
    let registry = create_test_registry();
    let event_tx = create_test_event_channel();
    let delivery = create_test_delivery(registry.clone(), event_tx);

    let (port, captured) = spawn_capture_listener().await;
    let record = create_test_record("joncena", port);
    registry.insert(record.clone());

    delivery.evict(&record, crate::service::events::EvictReason::Kick).await;
    assert!(registry.is_empty());

    let count = delivery.broadcast(b"after eviction").await;
    assert_eq!(count, 0, "퇴출 후 브로드캐스트 대상은 없어야 함");

    sleep(Duration::from_millis(100)).await;
    assert!(
        captured.lock().await.is_empty(),
        "퇴출된 대상은 프레임을 받지 않아야 함"
    );
}
