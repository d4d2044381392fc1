//! Scenario 7: a host going offline purges every media unit pinned to it
//! without any further backend round-trip beyond the single `purge_host`
//! call, and still raises `MEDIA_DISCONNECTED` for each affected media so
//! clients can react.

use crate::fixtures::{sdp, Harness, HOST_A};
use conflux_core::event::{Event, EventKind};
use conflux_core::types::{HostId, MediaProfile, MediaSessionType, UserType};

#[tokio::test]
async fn host_offline_purges_media_without_backend_round_trip() {
    let h = Harness::new();
    let (room_id, user) = h.controller.join(None, UserType::Sfu, "alice".to_string()).await;

    // Published with MediaProfile::Audio, which the harness pins to HOST_A.
    h.controller
        .publish(
            user,
            MediaSessionType::Webrtc,
            MediaProfile::Audio,
            Some(sdp::audio_only_offer()),
            serde_json::Value::Null,
            "alice-mic".to_string(),
        )
        .await
        .unwrap();
    let media_id = h.controller.get_user_medias(user).await[0];

    let mut disconnected = h.events.subscribe(EventKind::MediaDisconnected, &room_id.to_string());

    let host_a = HostId::from(HOST_A);
    let before = h.adapter.call_log().len();
    h.controller.handle_host_offline(&host_a).await;

    let event = disconnected.recv().await.expect("MEDIA_DISCONNECTED fires for the purged unit");
    match event {
        Event::MediaDisconnected { media_id: disconnected_media, .. } => {
            assert_eq!(disconnected_media, media_id);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Exactly the one `purge_host` call, nothing else touched the backend.
    let calls = h.adapter.call_log()[before..].to_vec();
    assert_eq!(calls, vec!["purge_host".to_string()]);

    assert!(h.controller.get_user_medias(user).await.is_empty());
}

#[tokio::test]
async fn shutdown_purges_every_registered_host() {
    let h = Harness::new();
    let (room_id, alice) = h.controller.join(None, UserType::Sfu, "alice".to_string()).await;
    h.controller
        .publish(
            alice,
            MediaSessionType::Webrtc,
            MediaProfile::Audio,
            Some(sdp::audio_only_offer()),
            serde_json::Value::Null,
            "alice-mic".to_string(),
        )
        .await
        .unwrap();

    let (_, bob) = h.controller.join(Some(room_id), UserType::Sfu, "bob".to_string()).await;
    h.controller
        .publish(
            bob,
            MediaSessionType::Webrtc,
            MediaProfile::Main,
            Some(sdp::audio_video_offer()),
            serde_json::Value::Null,
            "bob-cam".to_string(),
        )
        .await
        .unwrap();

    assert!(!h.controller.get_user_medias(alice).await.is_empty());
    assert!(!h.controller.get_user_medias(bob).await.is_empty());

    h.controller.shutdown().await;

    assert!(h.controller.get_user_medias(alice).await.is_empty());
    assert!(h.controller.get_user_medias(bob).await.is_empty());
}
