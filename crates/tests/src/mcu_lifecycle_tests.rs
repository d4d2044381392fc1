//! Scenario 5: first MCU user publishing spins up the room's
//! mixer and wires existing SFU sessions into it; the last MCU user leaving
//! tears the mixer down again while SFU users remain untouched.

use crate::fixtures::{sdp, Harness};
use conflux_core::types::{MediaProfile, MediaSessionType, UserType};

#[tokio::test]
async fn mcu_mixer_created_on_first_mcu_user_and_removed_when_last_leaves() {
    let h = Harness::new();

    let (room_id, sfu_user) = h.controller.join(None, UserType::Sfu, "sfu-participant".to_string()).await;
    h.controller
        .publish(
            sfu_user,
            MediaSessionType::Webrtc,
            MediaProfile::Main,
            Some(sdp::audio_video_offer()),
            serde_json::Value::Null,
            "sfu-cam".to_string(),
        )
        .await
        .unwrap();

    assert_eq!(h.controller.get_users(room_id).await.len(), 1);

    let (_, mcu_user) = h.controller.join(Some(room_id), UserType::Mcu, "mcu-participant".to_string()).await;
    h.controller
        .publish_and_subscribe(
            mcu_user,
            MediaSessionType::Webrtc,
            MediaProfile::Main,
            Some(sdp::audio_video_offer()),
            serde_json::Value::Null,
            "mcu-cam".to_string(),
        )
        .await
        .unwrap();

    // The MCU user plus the controller's synthetic mixer-owning user.
    assert_eq!(h.controller.get_users(room_id).await.len(), 3);

    // The mixer connected the existing SFU session into itself — at least
    // one more `connect` happened beyond the two publishes' own negotiation.
    let log_before_leave = h.adapter.call_log();
    assert!(log_before_leave.iter().any(|c| c == "connect"));

    h.controller.leave(mcu_user, room_id).await.unwrap();

    // Mixer and its synthetic owner are gone; the SFU participant remains.
    let remaining = h.controller.get_users(room_id).await;
    assert_eq!(remaining, vec![sfu_user]);
    assert!(!h.controller.get_user_medias(sfu_user).await.is_empty());
}
