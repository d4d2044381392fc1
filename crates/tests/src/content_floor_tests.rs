//! Scenario 4: disconnecting the current content floor's media
//! auto-releases it, restoring the MRU history.

use crate::fixtures::{sdp, Harness};
use conflux_core::event::EventKind;
use conflux_core::types::{MediaProfile, MediaSessionType, UserType};

/// The content section is the third m-line in `audio_video_content_offer`,
/// and the sim adapter mints one unit per offered m-line in order, so the
/// third media id registered for the session is the content unit.
async fn find_content_media(h: &Harness, user: conflux_core::types::UserId) -> conflux_core::types::MediaId {
    h.controller.get_user_medias(user).await[2]
}

#[tokio::test]
async fn disconnecting_current_content_floor_auto_releases_it() {
    let h = Harness::new();
    let (room_id, user) = h.controller.join(None, UserType::Sfu, "alice".to_string()).await;
    let (session_id, _) = h
        .controller
        .publish(
            user,
            MediaSessionType::Webrtc,
            MediaProfile::Main,
            Some(sdp::audio_video_content_offer()),
            serde_json::Value::Null,
            "alice-share".to_string(),
        )
        .await
        .unwrap();

    let content_media = find_content_media(&h, user).await;

    let mut floor_changed = h.events.subscribe(EventKind::ContentFloorChanged, &room_id.to_string());

    h.controller.set_content_floor(room_id, content_media).await.unwrap();
    let set = floor_changed.recv().await.unwrap();
    assert_eq!(set.floor, Some(content_media));
    assert!(set.previous_floor.is_empty());

    // Unpublishing the whole session tears down every one of its media
    // units, including the content one — that disconnection must
    // auto-release the floor it currently holds.
    h.controller.unpublish(session_id).await.unwrap();

    let released = floor_changed.recv().await.unwrap();
    assert_eq!(released.floor, None);
    assert_eq!(released.previous_floor, vec![content_media]);
}
