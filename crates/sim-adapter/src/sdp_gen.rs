//! Fabricates plausible SDP text without depending on the `sdp` crate's
//! write-side builder API: a real media-server driver would hand back
//! whatever its pipeline negotiated, so a fixed-codec string template
//! (opus/VP8/H264) stands in here. Parsing of *offered* SDP reuses
//! [`conflux_core::sdp`]'s already-exercised read-side helpers rather than
//! duplicating an SDP parser.

use conflux_core::error::OrchestratorResult;
use conflux_core::sdp as core_sdp;
use conflux_core::types::{MediaDirection, MediaTypes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Audio,
    Video,
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl Direction {
    /// The answerer's direction mirrors the offered direction.
    pub fn mirror(self) -> Self {
        match self {
            Direction::SendOnly => Direction::RecvOnly,
            Direction::RecvOnly => Direction::SendOnly,
            other => other,
        }
    }

    fn attr(self) -> &'static str {
        match self {
            Direction::SendRecv => "sendrecv",
            Direction::SendOnly => "sendonly",
            Direction::RecvOnly => "recvonly",
            Direction::Inactive => "inactive",
        }
    }

    fn to_media_direction(self) -> MediaDirection {
        match self {
            Direction::SendRecv => MediaDirection::SendRecv,
            Direction::SendOnly => MediaDirection::SendOnly,
            Direction::RecvOnly => MediaDirection::RecvOnly,
            Direction::Inactive => MediaDirection::Inactive,
        }
    }
}

fn parse_direction(sdp_text: &str) -> Direction {
    if sdp_text.contains("a=sendonly") {
        Direction::SendOnly
    } else if sdp_text.contains("a=recvonly") {
        Direction::RecvOnly
    } else if sdp_text.contains("a=inactive") {
        Direction::Inactive
    } else {
        // RFC 8866: absence of a direction attribute defaults to sendrecv.
        Direction::SendRecv
    }
}

pub struct OfferedPartial {
    pub kind: Kind,
    pub direction: Direction,
    pub sdp: String,
}

/// Splits an offer into its media sections and classifies each by kind and
/// offered direction, so the adapter can mint one element per section.
pub fn offered_kinds(sdp_text: &str) -> OrchestratorResult<Vec<OfferedPartial>> {
    let partials = core_sdp::get_partial_descriptions(sdp_text)?;
    Ok(partials
        .into_iter()
        .filter_map(|p| {
            let kind = match (p.media_type.as_str(), p.is_content) {
                ("audio", _) => Kind::Audio,
                ("video", true) => Kind::Content,
                ("video", false) => Kind::Video,
                _ => return None,
            };
            let direction = parse_direction(&p.sdp);
            Some(OfferedPartial { kind, direction, sdp: p.sdp })
        })
        .collect())
}

/// Fabricates a single-media-section SDP string for `kind` at `ip:port`.
/// Payload types are fixed: audio opus/48000/2 on 111; video VP8 on 96 and
/// H264 on 125; content (a `video` section flagged `a=content:slides`) VP8
/// on 97.
pub fn build_answer(ip: &str, port: u16, kind: Kind, direction: Direction) -> String {
    let dir = direction.attr();
    let media_line = match kind {
        Kind::Audio => format!(
            "m=audio {port} UDP/TLS/RTP/SAVPF 111\r\nc=IN IP4 {ip}\r\na=rtpmap:111 opus/48000/2\r\na={dir}\r\n"
        ),
        Kind::Video => format!(
            "m=video {port} UDP/TLS/RTP/SAVPF 96 125\r\nc=IN IP4 {ip}\r\na=rtpmap:96 VP8/90000\r\na=rtpmap:125 H264/90000\r\na={dir}\r\n"
        ),
        Kind::Content => format!(
            "m=video {port} UDP/TLS/RTP/SAVPF 97\r\nc=IN IP4 {ip}\r\na=content:slides\r\na=rtpmap:97 VP8/90000\r\na={dir}\r\n"
        ),
    };
    format!("v=0\r\no=- 1 1 IN IP4 {ip}\r\ns=-\r\nt=0 0\r\n{media_line}")
}

pub fn media_types_for(kind: Kind, direction: Direction) -> MediaTypes {
    let md = direction.to_media_direction();
    match kind {
        Kind::Audio => MediaTypes { audio: md, ..Default::default() },
        Kind::Video => MediaTypes { video: md, ..Default::default() },
        Kind::Content => MediaTypes { content: md, ..Default::default() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_offer_sections() {
        let offer = "v=0\r\n\
o=- 1 1 IN IP4 127.0.0.1\r\n\
s=-\r\nt=0 0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\nc=IN IP4 127.0.0.1\r\na=rtpmap:111 opus/48000/2\r\na=sendrecv\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\nc=IN IP4 127.0.0.1\r\na=rtpmap:96 VP8/90000\r\na=sendonly\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 97\r\nc=IN IP4 127.0.0.1\r\na=content:slides\r\na=rtpmap:97 VP8/90000\r\na=sendrecv\r\n";
        let partials = offered_kinds(offer).unwrap();
        assert_eq!(partials.len(), 3);
        assert_eq!(partials[0].kind, Kind::Audio);
        assert_eq!(partials[1].kind, Kind::Video);
        assert_eq!(partials[1].direction, Direction::SendOnly);
        assert_eq!(partials[2].kind, Kind::Content);
    }

    #[test]
    fn mirrors_direction_for_answer() {
        assert_eq!(Direction::SendOnly.mirror(), Direction::RecvOnly);
        assert_eq!(Direction::RecvOnly.mirror(), Direction::SendOnly);
        assert_eq!(Direction::SendRecv.mirror(), Direction::SendRecv);
    }

    #[test]
    fn builds_answer_with_fixed_codecs() {
        let answer = build_answer("10.0.0.5", 20000, Kind::Video, Direction::SendRecv);
        assert!(answer.contains("m=video 20000"));
        assert!(answer.contains("VP8"));
        assert!(answer.contains("10.0.0.5"));
    }
}
