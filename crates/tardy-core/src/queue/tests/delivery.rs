use super::*;
use crate::envelope::Envelope;

#[test]
fn poll_on_empty_queue_returns_none() {
    let f = fixture();
    assert!(f.queue.poll().unwrap().is_none());
    assert_eq!(f.queue.stats(), QueueStats::default());
}

#[test]
fn pushed_message_is_delivered_once() {
    let f = fixture();
    f.queue.push(&Job::Start { id: 1 }).unwrap();

    let delivery = expect_delivery(&f.queue);
    assert_eq!(delivery.message, Job::Start { id: 1 });
    assert_eq!(delivery.ack.delivery_count(), 1);

    // Hidden while in flight
    assert!(f.queue.poll().unwrap().is_none());
    assert_eq!(
        f.queue.stats(),
        QueueStats {
            ready: 0,
            delayed: 0,
            in_flight: 1
        }
    );
}

#[test]
fn delayed_message_is_invisible_until_due() {
    let f = fixture();
    f.queue
        .push_delayed(&Job::Start { id: 1 }, Duration::from_secs(5))
        .unwrap();

    assert!(f.queue.poll().unwrap().is_none());
    assert_eq!(f.queue.stats().delayed, 1);

    f.clock.advance(Duration::from_millis(4_999));
    assert!(f.queue.poll().unwrap().is_none());

    f.clock.advance(Duration::from_millis(1));
    let delivery = expect_delivery(&f.queue);
    assert_eq!(delivery.message, Job::Start { id: 1 });
}

#[test]
fn same_delivery_time_delivers_in_push_order() {
    let f = fixture();
    for id in 0..5 {
        f.queue.push(&Job::Start { id }).unwrap();
    }

    for id in 0..5 {
        assert_eq!(expect_delivery(&f.queue).message, Job::Start { id });
    }
    assert!(f.queue.poll().unwrap().is_none());
}

#[test]
fn earlier_delivery_time_wins_over_push_order() {
    let f = fixture();
    f.queue
        .push_delayed(&Job::Start { id: 1 }, Duration::from_secs(10))
        .unwrap();
    f.queue
        .push_delayed(&Job::Start { id: 2 }, Duration::from_secs(3))
        .unwrap();
    f.queue.push(&Job::Cancel { id: 3 }).unwrap();

    f.clock.advance(Duration::from_secs(10));
    let order: Vec<Job> = (0..3).map(|_| expect_delivery(&f.queue).message).collect();
    assert_eq!(
        order,
        vec![
            Job::Cancel { id: 3 },
            Job::Start { id: 2 },
            Job::Start { id: 1 },
        ]
    );
}

#[test]
fn poll_with_hands_message_and_ack_to_callback() {
    let f = fixture();
    assert!(!f.queue.poll_with(|_, _| panic!("nothing is due")).unwrap());

    f.queue.push(&Job::Cancel { id: 7 }).unwrap();
    let mut seen = None;
    let ran = f
        .queue
        .poll_with(|message, ack| {
            seen = Some(message);
            ack.ack().unwrap();
        })
        .unwrap();

    assert!(ran);
    assert_eq!(seen, Some(Job::Cancel { id: 7 }));
    assert_eq!(f.queue.stats(), QueueStats::default());
}

#[test]
fn undecodable_payload_still_counts_as_delivered() {
    let storage = Arc::new(FlakyStorage::default());
    let envelope = Envelope {
        id: Envelope::new_id(),
        kind: "unknown".to_string(),
        payload: serde_json::json!({"type": "reboot"}),
        deliver_at: 0,
        enqueued_at: 0,
        seq: 0,
        delivery_count: 0,
        ack_deadline: None,
    };
    storage
        .put_envelope(&envelope.key().encode(), &envelope)
        .unwrap();
    let f = fixture_with_storage(storage);

    let err = f.queue.poll().unwrap_err();
    assert!(
        matches!(err, QueueError::Decode { id, .. } if id == envelope.id),
        "expected Decode, got {err:?}"
    );
    assert_eq!(f.queue.stats().in_flight, 1);

    f.clock.advance(ACK_TIMEOUT);
    assert_eq!(f.queue.redelivery_check().unwrap(), 1);
    let stored = f
        .storage
        .get_envelope(&envelope.key().encode())
        .unwrap()
        .unwrap();
    assert_eq!(stored.delivery_count, 1);
    assert_eq!(stored.ack_deadline, None);
}

#[test]
fn corrupt_head_does_not_block_later_messages() {
    let f = fixture();
    f.queue.push(&Job::Start { id: 1 }).unwrap();
    f.queue.push(&Job::Start { id: 2 }).unwrap();
    f.corrupt(&f.stored_keys()[0]);

    assert_eq!(expect_delivery(&f.queue).message, Job::Start { id: 2 });
    assert!(f.queue.poll().unwrap().is_none());
    assert_eq!(
        f.queue.stats(),
        QueueStats {
            ready: 0,
            delayed: 0,
            in_flight: 1
        }
    );
    // The unreadable bytes stay in storage.
    assert_eq!(f.stored_keys().len(), 2);
}

#[test]
fn missing_head_does_not_hide_later_messages() {
    let f = fixture();
    f.queue.push(&Job::Start { id: 1 }).unwrap();
    f.queue.push(&Job::Start { id: 2 }).unwrap();
    f.storage.delete_envelope(&f.stored_keys()[0]).unwrap();

    assert_eq!(expect_delivery(&f.queue).message, Job::Start { id: 2 });
    assert_eq!(f.queue.stats().ready, 0);
}

#[test]
fn exhausted_delivery_count_is_dropped_instead_of_redelivered() {
    let f = fixture();
    f.queue.push(&Job::Start { id: 1 }).unwrap();
    f.queue.push(&Job::Start { id: 2 }).unwrap();
    let key = f.stored_keys().remove(0);
    let mut worn = f.storage.get_envelope(&key).unwrap().unwrap();
    worn.delivery_count = u32::MAX;
    f.storage.put_envelope(&key, &worn).unwrap();

    let delivery = expect_delivery(&f.queue);
    assert_eq!(delivery.message, Job::Start { id: 2 });
    assert_eq!(delivery.ack.delivery_count(), 1);
    assert!(f.queue.poll().unwrap().is_none());

    let stored = f.storage.get_envelope(&key).unwrap().unwrap();
    assert_eq!(stored.delivery_count, u32::MAX);
    assert_eq!(stored.ack_deadline, None);
}

#[test]
fn failed_push_leaves_queue_unchanged() {
    let f = fixture();
    f.storage.fail_writes(true);
    assert!(matches!(
        f.queue.push(&Job::Start { id: 1 }),
        Err(QueueError::Storage(_))
    ));
    assert_eq!(f.queue.stats(), QueueStats::default());
    assert!(f.storage.list_envelopes().unwrap().is_empty());

    f.storage.fail_writes(false);
    f.queue.push(&Job::Start { id: 2 }).unwrap();
    let stored = f.storage.list_envelopes().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].1.as_ref().unwrap().seq, 0);
}

#[test]
fn failed_poll_leaves_message_ready() {
    let f = fixture();
    f.queue.push(&Job::Start { id: 1 }).unwrap();

    f.storage.fail_writes(true);
    assert!(f.queue.poll().is_err());
    assert_eq!(f.queue.stats().ready, 1);
    assert_eq!(f.queue.stats().in_flight, 0);

    f.storage.fail_writes(false);
    let delivery = expect_delivery(&f.queue);
    assert_eq!(delivery.ack.delivery_count(), 1);
}

#[test]
fn delivery_persists_count_and_deadline() {
    let f = fixture();
    f.queue.push(&Job::Start { id: 1 }).unwrap();
    let delivery = expect_delivery(&f.queue);

    let stored = f
        .storage
        .get_envelope(&delivery.ack.token().key.encode())
        .unwrap()
        .unwrap();
    assert_eq!(stored.delivery_count, 1);
    assert_eq!(
        stored.ack_deadline,
        Some(START_NS + ACK_TIMEOUT.as_nanos() as u64)
    );
    assert_eq!(stored.kind, "start");
}

#[test]
fn push_poll_and_ack_are_counted() {
    let harness = MetricTestHarness::new();
    let f = fixture_with_metrics(&harness);

    f.queue.push(&Job::Start { id: 1 }).unwrap();
    f.queue.push(&Job::Start { id: 2 }).unwrap();
    expect_delivery(&f.queue).ack.ack().unwrap();

    harness.assert_counter("tardy.queue.pushed", "jobs", 2);
    harness.assert_counter("tardy.queue.delivered", "jobs", 1);
    harness.assert_counter("tardy.queue.acked", "jobs", 1);
    harness.assert_gauge("tardy.queue.ready", "jobs", 1);
    harness.assert_gauge("tardy.queue.in_flight", "jobs", 0);
}
