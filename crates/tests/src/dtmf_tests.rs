//! Scenario 3: DTMF digit aggregation reaching the floor/layout/
//! subtitle commands through a live `Controller`, not just the aggregator
//! in isolation (that's covered crate-locally in `conflux-core::dtmf`).

use std::time::Duration;

use crate::fixtures::{sdp, Harness};
use conflux_core::event::EventKind;
use conflux_core::types::{MediaProfile, MediaSessionType, UserType};

#[tokio::test]
async fn star_three_toggles_subtitle_on_flush() {
    let h = Harness::new();
    let (_, user) = h.controller.join(None, UserType::Sfu, "alice".to_string()).await;
    let (_, _) = h
        .controller
        .publish(
            user,
            MediaSessionType::Webrtc,
            MediaProfile::Main,
            Some(sdp::audio_video_offer()),
            serde_json::Value::Null,
            "alice-cam".to_string(),
        )
        .await
        .unwrap();
    let media_id = h.controller.get_user_medias(user).await[0];

    assert_eq!(h.controller.is_subtitle_enabled(media_id).await, Some(false));

    // Reaches the configured code length (2) immediately — no need to wait
    // out the aggregator's timer.
    h.controller.dtmf(media_id, '*').await.unwrap();
    h.controller.dtmf(media_id, '3').await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(h.controller.is_subtitle_enabled(media_id).await, Some(true));
}

#[tokio::test]
async fn star_three_star_flushes_then_starts_a_new_command() {
    let h = Harness::new();
    let (room_id, user) = h.controller.join(None, UserType::Sfu, "alice".to_string()).await;
    let (_, _) = h
        .controller
        .publish(
            user,
            MediaSessionType::Webrtc,
            MediaProfile::Main,
            Some(sdp::audio_video_offer()),
            serde_json::Value::Null,
            "alice-cam".to_string(),
        )
        .await
        .unwrap();
    let media_id = h.controller.get_user_medias(user).await[0];
    let mut floor_changed = h.events.subscribe(EventKind::ConferenceFloorChanged, &room_id.to_string());

    h.controller.dtmf(media_id, '*').await.unwrap();
    h.controller.dtmf(media_id, '3').await.unwrap(); // flushes: toggle subtitle
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.controller.is_subtitle_enabled(media_id).await, Some(true));

    // A lone `*` doesn't reach the code length; it must wait out the 50ms
    // aggregator timeout configured by the harness, then is interpreted
    // standalone as `setVideoFloor`.
    h.controller.dtmf(media_id, '*').await.unwrap();
    let info = floor_changed.recv().await.expect("setVideoFloor reaches the room");
    assert!(info.floor.is_some());

    // Still exactly one subtitle toggle — the second command never reached
    // the subtitle branch.
    assert_eq!(h.controller.is_subtitle_enabled(media_id).await, Some(true));
}

#[tokio::test]
async fn hash_digits_set_layout_type() {
    let h = Harness::new();
    let (_, user) = h.controller.join(None, UserType::Sfu, "alice".to_string()).await;
    let (_, _) = h
        .controller
        .publish(
            user,
            MediaSessionType::Webrtc,
            MediaProfile::Main,
            Some(sdp::audio_video_offer()),
            serde_json::Value::Null,
            "alice-cam".to_string(),
        )
        .await
        .unwrap();
    let media_id = h.controller.get_user_medias(user).await[0];

    let before = h.adapter.call_log().len();
    h.controller.dtmf(media_id, '#').await.unwrap();
    h.controller.dtmf(media_id, '1').await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let log = h.adapter.call_log();
    assert!(log[before..].iter().any(|c| c == "set_layout_type"));
}
