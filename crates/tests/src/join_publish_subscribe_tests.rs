//! Scenario 1: join → publish → subscribe, same host, single
//! `connect` call, no transposer involved.

use crate::fixtures::{sdp, Harness};
use conflux_core::event::EventKind;
use conflux_core::types::{MediaProfile, MediaSessionType, UserType};

#[tokio::test]
async fn join_publish_subscribe_same_host_single_connect() {
    let h = Harness::new();

    let (room_id, user_a) = h.controller.join(None, UserType::Sfu, "alice".to_string()).await;
    let mut media_connected = h.events.subscribe(EventKind::MediaConnected, &room_id.to_string());

    let (session_a, answer_a) = h
        .controller
        .publish(
            user_a,
            MediaSessionType::Webrtc,
            MediaProfile::Main,
            Some(sdp::audio_video_offer()),
            serde_json::Value::Null,
            "alice-cam".to_string(),
        )
        .await
        .expect("publish succeeds");
    assert!(!answer_a.is_empty());
    media_connected.recv().await.expect("MEDIA_CONNECTED fired for publish");

    let (room_id_b, user_b) = h.controller.join(Some(room_id), UserType::Sfu, "bob".to_string()).await;
    assert_eq!(room_id_b, room_id);

    let media_a = h
        .controller
        .get_user_medias(user_a)
        .await
        .first()
        .copied()
        .expect("alice has a published media unit");

    let (session_b, answer_b) = h
        .controller
        .subscribe(
            user_b,
            session_a,
            MediaSessionType::Webrtc,
            MediaProfile::Main,
            serde_json::Value::Null,
            "bob-sub".to_string(),
        )
        .await
        .expect("subscribe succeeds");
    assert!(!answer_b.is_empty());
    assert_ne!(session_a, session_b);

    let media_b = h
        .controller
        .get_user_medias(user_b)
        .await
        .first()
        .copied()
        .expect("bob has a subscribed media unit");
    assert_ne!(media_a, media_b);

    // Same host on both sides (profile Main always resolves to HOST_B in the
    // harness) ⇒ exactly one adapter `connect` call, no transposer plumbing.
    let log = h.adapter.call_log();
    assert_eq!(log.iter().filter(|c| *c == "connect").count(), 1);
    assert!(!log.iter().any(|c| c == "generate_offer"));
}
