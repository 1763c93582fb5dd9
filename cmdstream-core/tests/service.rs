use cmdstream_core::{
    command::{Pause, Ping, RequestStatus, Resume},
    config::CoreConfig,
    CommandAck, CommandBuilder, CommandEnvelope, CommandError, CommandId, CommandPayload,
    PeerConnection, StreamingService,
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::task::JoinHandle;

/// Spawns a fake peer that answers every command with whatever `respond` returns.
/// Returning `None` leaves the command unanswered.
fn spawn_peer<F>(mut connection: PeerConnection, respond: F) -> JoinHandle<()>
where
    F: Fn(&CommandEnvelope) -> Option<CommandAck> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(envelope) = connection.next_command().await {
            if let Some(ack) = respond(&envelope) {
                connection.handle_ack(ack);
            }
        }
    })
}

#[tokio::test]
async fn send_and_wait_returns_the_peer_ack_unchanged() {
    let service = StreamingService::default();
    let _peer = spawn_peer(service.attach("worker-1"), |envelope| {
        Some(CommandAck::ok(envelope.command_id().clone(), "ok"))
    });

    let envelope = CommandBuilder::with_id("c1").with_payload(Pause);
    let ack = service
        .send_and_wait("worker-1", envelope, Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(
        ack,
        CommandAck {
            command_id: CommandId::from("c1"),
            success: true,
            message: "ok".to_string(),
            error: None,
        }
    );
    assert!(service.registry().is_empty());
}

#[tokio::test]
async fn peer_rejection_is_returned_not_raised() {
    let service = StreamingService::default();
    let _peer = spawn_peer(service.attach("worker-1"), |envelope| {
        Some(CommandAck::rejected(
            envelope.command_id().clone(),
            "INVALID_STATE",
            "already paused",
        ))
    });

    let envelope = CommandBuilder::with_id("c2").with_payload(Pause);
    let ack = service
        .send_and_wait("worker-1", envelope, Duration::from_secs(2))
        .await
        .unwrap();

    assert!(!ack.success);
    assert_eq!(ack.error.as_deref(), Some("INVALID_STATE"));
    assert_eq!(ack.message, "already paused");
}

#[tokio::test]
async fn unanswered_command_times_out_and_leaves_no_entry() {
    let service = StreamingService::default();
    let _peer = spawn_peer(service.attach("worker-1"), |_| None);

    let timeout = Duration::from_millis(150);
    let started = Instant::now();
    let err = service
        .send_and_wait(
            "worker-1",
            CommandBuilder::with_id("x").with_payload(RequestStatus),
            timeout,
        )
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(
        err,
        CommandError::Timeout {
            command_id: CommandId::from("x"),
            timeout,
        }
    );
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_secs(1));
    assert!(!service.registry().contains(&CommandId::from("x")));
}

#[tokio::test]
async fn late_ack_is_dropped_without_touching_other_waiters() {
    let service = StreamingService::default();
    let mut connection = service.attach("worker-1");

    let waiter = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .send_and_wait(
                    "worker-1",
                    CommandBuilder::with_id("late").with_payload(Pause),
                    Duration::from_millis(100),
                )
                .await
        })
    };
    let first = connection.next_command().await.unwrap();
    assert!(matches!(
        waiter.await.unwrap(),
        Err(CommandError::Timeout { .. })
    ));

    // A second command is pending while the stale ack shows up.
    let other = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .send_and_wait(
                    "worker-1",
                    CommandBuilder::with_id("other").with_payload(Resume),
                    Duration::from_secs(2),
                )
                .await
        })
    };
    let second = connection.next_command().await.unwrap();

    assert!(!connection.handle_ack(CommandAck::ok(first.command_id().clone(), "too late")));
    assert!(service.registry().contains(second.command_id()));

    assert!(connection.handle_ack(CommandAck::ok(second.command_id().clone(), "resumed")));
    let ack = other.await.unwrap().unwrap();
    assert_eq!(ack.command_id, CommandId::from("other"));
    assert_eq!(ack.message, "resumed");
}

#[tokio::test]
async fn disconnected_peer_fails_fast() {
    let service = StreamingService::default();

    let started = Instant::now();
    let err = service
        .send_and_wait(
            "ghost",
            CommandBuilder::create().with_payload(Pause),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

    assert_eq!(err, CommandError::not_connected("ghost"));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(service.registry().is_empty());
}

#[tokio::test]
async fn fire_and_forget_to_absent_peer_returns_false() {
    let service = StreamingService::default();
    let sent = service
        .send("ghost", CommandBuilder::create().with_payload(Ping { nonce: 1 }))
        .await;
    assert!(!sent);
}

#[tokio::test]
async fn fire_and_forget_reaches_an_attached_peer() {
    let service = StreamingService::default();
    let mut connection = service.attach("worker-1");

    let envelope = CommandBuilder::with_id("f1").with_payload(Ping { nonce: 3 });
    assert!(service.send("worker-1", envelope.clone()).await);

    assert_eq!(connection.next_command().await, Some(envelope));
    assert!(service.registry().is_empty());
}

#[tokio::test]
async fn concurrent_waiters_each_get_their_own_ack() {
    let service = StreamingService::default();
    let mut connection = service.attach("worker-1");

    // Collect both commands, then answer them in reverse order.
    let peer = tokio::spawn(async move {
        let first = connection.next_command().await.unwrap();
        let second = connection.next_command().await.unwrap();
        for envelope in [second, first] {
            let message = format!("done {}", envelope.command_id());
            connection.handle_ack(CommandAck::ok(envelope.command_id().clone(), message));
        }
        connection
    });

    let timeout = Duration::from_secs(2);
    let (a, b) = tokio::join!(
        service.send_and_wait(
            "worker-1",
            CommandBuilder::with_id("a").with_payload(Pause),
            timeout
        ),
        service.send_and_wait(
            "worker-1",
            CommandBuilder::with_id("b").with_payload(Resume),
            timeout
        ),
    );

    assert_eq!(a.unwrap().message, "done a");
    assert_eq!(b.unwrap().message, "done b");
    let _connection = peer.await.unwrap();
}

#[tokio::test]
async fn detaching_fails_pending_waiters_fast() {
    let service = StreamingService::default();
    let mut connection = service.attach("worker-1");

    let waiter = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .send_and_wait(
                    "worker-1",
                    CommandBuilder::create().with_payload(Pause),
                    Duration::from_secs(10),
                )
                .await
        })
    };
    connection.next_command().await.unwrap();

    let started = Instant::now();
    drop(connection);
    let err = waiter.await.unwrap().unwrap_err();

    assert_eq!(err, CommandError::not_connected("worker-1"));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!service.is_attached("worker-1"));
    assert!(service.registry().is_empty());
}

#[tokio::test]
async fn reattach_replaces_the_previous_stream() {
    let service = StreamingService::default();
    let mut old = service.attach("worker-1");
    let mut new = service.attach("worker-1");
    assert_ne!(old.connection_id(), new.connection_id());

    // The old queue is closed and dropping the old connection keeps the new one.
    assert_eq!(old.next_command().await, None);
    drop(old);
    assert!(service.is_attached("worker-1"));

    let envelope = CommandBuilder::with_id("r1").with_payload(Pause);
    assert!(service.send("worker-1", envelope.clone()).await);
    assert_eq!(new.next_command().await, Some(envelope));

    let peers = service.peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].connection_id, new.connection_id());
}

#[tokio::test]
async fn heartbeat_updates_last_seen() {
    let service = StreamingService::default();
    let connection = service.attach("worker-1");
    let before = service.peers()[0].last_seen;

    tokio::time::sleep(Duration::from_millis(20)).await;
    connection.heartbeat();

    let peers = service.peers();
    let info = &peers[0];
    assert!(info.last_seen > before);
    assert_eq!(info.connected_at, before);
    assert_eq!(info.client_id, "worker-1");
}

#[tokio::test]
async fn payload_survives_the_queue() {
    let service = StreamingService::default();
    let mut connection = service.attach("worker-1");

    let envelope = CommandBuilder::create().with_payload(CommandPayload::Resync {
        scope: Some("orders".to_string()),
    });
    service.send("worker-1", envelope).await;

    let received = connection.next_command().await.unwrap();
    assert_eq!(
        received.payload(),
        &CommandPayload::Resync {
            scope: Some("orders".to_string())
        }
    );
}

#[tokio::test]
async fn full_peer_queue_fails_fast_instead_of_blocking() {
    let service = StreamingService::new(Arc::new(CoreConfig {
        peer_channel_buffer: 1,
        ..CoreConfig::default()
    }));
    // Attached but never reading.
    let _connection = service.attach("worker-1");

    assert!(service.send("worker-1", CommandBuilder::create().with_payload(Pause)).await);
    assert!(!service.send("worker-1", CommandBuilder::create().with_payload(Pause)).await);

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        service.send_and_wait(
            "worker-1",
            CommandBuilder::with_id("blocked").with_payload(Resume),
            Duration::from_millis(100),
        ),
    )
    .await
    .expect("send_and_wait must not block on a full queue");

    assert!(matches!(outcome, Err(CommandError::Transport(_))));
    assert!(!service.registry().contains(&CommandId::from("blocked")));
}

#[tokio::test]
async fn sweep_spares_a_waiter_inside_its_timeout() {
    let service = StreamingService::default();
    let mut connection = service.attach("worker-1");

    let waiter = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .send_and_wait(
                    "worker-1",
                    CommandBuilder::with_id("long").with_payload(Pause),
                    Duration::from_secs(5),
                )
                .await
        })
    };
    let envelope = connection.next_command().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(service.registry().sweep_stale(Duration::from_millis(50)), 0);
    assert!(connection.handle_ack(CommandAck::ok(envelope.command_id().clone(), "paused")));

    let ack = waiter.await.unwrap().unwrap();
    assert_eq!(ack.message, "paused");
}
