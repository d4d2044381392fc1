//! Scenario 2: cross-host connect creates exactly one transposer
//! pair per (source, sink-host), reused by later sinks on that same host.

use crate::fixtures::{sdp, Harness};
use conflux_core::types::{MediaProfile, MediaSessionType, UserType};

#[tokio::test]
async fn first_cross_host_connect_creates_transposer_pair() {
    let h = Harness::new();

    let (room_id, publisher) = h.controller.join(None, UserType::Sfu, "publisher".to_string()).await;
    let (source_session, _) = h
        .controller
        .publish(
            publisher,
            MediaSessionType::Webrtc,
            MediaProfile::Audio,
            Some(sdp::audio_only_offer()),
            serde_json::Value::Null,
            "publisher-mic".to_string(),
        )
        .await
        .expect("publish on host A succeeds");

    let (_, subscriber) = h.controller.join(Some(room_id), UserType::Sfu, "subscriber-1".to_string()).await;

    let before = h.adapter.call_log().len();
    h.controller
        .subscribe(
            subscriber,
            source_session,
            MediaSessionType::Webrtc,
            MediaProfile::Main,
            serde_json::Value::Null,
            "subscriber-1-sub".to_string(),
        )
        .await
        .expect("cross-host subscribe succeeds");

    let log = h.adapter.call_log();
    let first_connect_calls = &log[before..];

    assert_eq!(
        first_connect_calls.iter().filter(|c| *c == "create_media_element").count(),
        2,
        "transposer pair: one RTP element per host"
    );
    assert_eq!(first_connect_calls.iter().filter(|c| *c == "generate_offer").count(), 1);
    assert_eq!(first_connect_calls.iter().filter(|c| *c == "process_offer").count(), 1);
    assert_eq!(first_connect_calls.iter().filter(|c| *c == "process_answer").count(), 1);
    assert_eq!(
        first_connect_calls.iter().filter(|c| *c == "connect").count(),
        2,
        "src→sourceTransposer and sinkTransposer→sink"
    );
}

#[tokio::test]
async fn second_sink_on_same_remote_host_reuses_transposer() {
    let h = Harness::new();

    let (room_id, publisher) = h.controller.join(None, UserType::Sfu, "publisher".to_string()).await;
    let (source_session, _) = h
        .controller
        .publish(
            publisher,
            MediaSessionType::Webrtc,
            MediaProfile::Audio,
            Some(sdp::audio_only_offer()),
            serde_json::Value::Null,
            "publisher-mic".to_string(),
        )
        .await
        .expect("publish on host A succeeds");

    let (_, sub1) = h.controller.join(Some(room_id), UserType::Sfu, "subscriber-1".to_string()).await;
    h.controller
        .subscribe(sub1, source_session, MediaSessionType::Webrtc, MediaProfile::Main, serde_json::Value::Null, "sub1".to_string())
        .await
        .expect("first cross-host subscribe succeeds");

    let (_, sub2) = h.controller.join(Some(room_id), UserType::Sfu, "subscriber-2".to_string()).await;
    let before = h.adapter.call_log().len();
    h.controller
        .subscribe(sub2, source_session, MediaSessionType::Webrtc, MediaProfile::Main, serde_json::Value::Null, "sub2".to_string())
        .await
        .expect("second cross-host subscribe succeeds");

    let log = h.adapter.call_log();
    let second_calls = &log[before..];

    // Transposer pair already exists for (source host, sink host): only the
    // sink-side connect happens, no new elements or renegotiation.
    assert!(!second_calls.iter().any(|c| c == "create_media_element"));
    assert!(!second_calls.iter().any(|c| c == "generate_offer"));
    assert!(!second_calls.iter().any(|c| c == "process_offer"));
    assert_eq!(second_calls.iter().filter(|c| *c == "connect").count(), 1);
}
