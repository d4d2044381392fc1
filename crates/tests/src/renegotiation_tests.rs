//! Scenario 6: renegotiating in a content m-line after an
//! audio+video session is already up only touches the content adapter call;
//! audio/video elements are re-answered in place, and the returned answer
//! carries all three kinds.

use crate::fixtures::{sdp, Harness};
use conflux_core::types::{MediaProfile, MediaSessionType, UserType};

#[tokio::test]
async fn adding_content_renegotiates_only_the_new_kind() {
    let h = Harness::new();
    let (_, user) = h.controller.join(None, UserType::Sfu, "alice".to_string()).await;

    let (session_id, initial_answer) = h
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
    assert_eq!(initial_answer.matches("m=video").count(), 1);
    assert!(!initial_answer.contains("a=content:slides"));

    let before = h.adapter.call_log().len();
    let answer = h
        .controller
        .renegotiate(session_id, sdp::audio_video_content_offer())
        .await
        .unwrap();

    assert!(answer.contains("m=audio"));
    assert_eq!(answer.matches("m=video").count(), 2, "main video plus content");
    assert!(answer.contains("a=content:slides"));

    let log = h.adapter.call_log();
    let calls = &log[before..];
    assert_eq!(calls.iter().filter(|c| *c == "negotiate").count(), 1, "only content is newly negotiated");
    assert_eq!(
        calls.iter().filter(|c| *c == "process_answer").count(),
        2,
        "existing audio and video elements are re-answered, not recreated"
    );
    assert!(!calls.iter().any(|c| c == "create_media_element"));

    // Session now carries three media units: audio, video, content.
    assert_eq!(h.controller.get_user_medias(user).await.len(), 3);
}
