//! Synthetic SDP offers, built by hand in the same shape `conflux-core`'s own
//! parser tests use, since `conflux-sim-adapter`'s answer templates aren't
//! public outside that crate.

const HEADER: &str = "v=0\r\n\
o=- 1 1 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n";

/// A single `sendrecv` audio m-line, Opus only.
pub fn audio_only_offer() -> String {
    format!(
        "{HEADER}\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
c=IN IP4 127.0.0.1\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=sendrecv\r\n"
    )
}

/// Audio plus a `sendrecv` video m-line (VP8 and H264 offered).
pub fn audio_video_offer() -> String {
    format!(
        "{HEADER}\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
c=IN IP4 127.0.0.1\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=sendrecv\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96 125\r\n\
c=IN IP4 127.0.0.1\r\n\
a=rtpmap:96 VP8/90000\r\n\
a=rtpmap:125 H264/90000\r\n\
a=sendrecv\r\n"
    )
}

/// `audio_video_offer` plus a third m-line tagged `a=content:slides`, the way
/// a client adds a screenshare track to an already-published session.
pub fn audio_video_content_offer() -> String {
    format!(
        "{}\
m=video 9 UDP/TLS/RTP/SAVPF 97\r\n\
c=IN IP4 127.0.0.1\r\n\
a=content:slides\r\n\
a=rtpmap:97 VP8/90000\r\n\
a=sendrecv\r\n",
        audio_video_offer()
    )
}
