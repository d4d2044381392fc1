//! Pure functions over SDP text. No orchestrator state lives
//! here; everything takes and returns SDP strings (or plain predicates) so
//! it can be unit tested in isolation from sessions, units or adapters.

use sdp::description::common::{Address, ConnectionInformation};
use sdp::description::media::MediaDescription;
use sdp::description::session::SessionDescription;
use std::io::BufReader;

use crate::error::{OrchestratorError, OrchestratorResult};

const ATTR_CONTENT: &str = "content";
const CONTENT_LABEL: &str = "slides";

fn parse(sdp_text: &str) -> OrchestratorResult<SessionDescription> {
    let mut reader = BufReader::new(sdp_text.as_bytes());
    SessionDescription::unmarshal(&mut reader)
        .map_err(|e| OrchestratorError::MediaInvalidType(format!("unparsable SDP: {e}")))
}

fn is_content_media(media: &MediaDescription) -> bool {
    media
        .attribute(ATTR_CONTENT)
        .and_then(|v| v.as_deref())
        .map(|v| v == CONTENT_LABEL)
        .unwrap_or(false)
}

fn is_inactive(media: &MediaDescription) -> bool {
    media.media_name.port.value == 0
        || media.attribute("inactive").is_some()
        || media.media_name.formats.is_empty()
}

/// One partial description: the shared session header plus a single media
/// section, already marshalled to a standalone valid SDP string.
#[derive(Debug, Clone)]
pub struct PartialDescription {
    pub media_type: String,
    pub is_content: bool,
    pub sdp: String,
}

/// Splits a multi-m-line offer into one partial per media section, each
/// carrying the shared session header.
pub fn get_partial_descriptions(sdp_text: &str) -> OrchestratorResult<Vec<PartialDescription>> {
    let session = parse(sdp_text)?;
    let mut out = Vec::with_capacity(session.media_descriptions.len());
    for media in &session.media_descriptions {
        let mut partial = session.clone();
        partial.media_descriptions = vec![media.clone()];
        out.push(PartialDescription {
            media_type: media.media_name.media.clone(),
            is_content: is_content_media(media),
            sdp: partial.marshal(),
        });
    }
    Ok(out)
}

fn find_partial(sdp_text: &str, want: &str) -> OrchestratorResult<Option<String>> {
    let partials = get_partial_descriptions(sdp_text)?;
    Ok(partials
        .into_iter()
        .find(|p| match want {
            "audio" => p.media_type == "audio",
            "content" => p.is_content,
            "video" => p.media_type == "video" && !p.is_content,
            _ => false,
        })
        .map(|p| p.sdp))
}

pub fn get_audio_sdp(sdp_text: &str) -> OrchestratorResult<Option<String>> {
    find_partial(sdp_text, "audio")
}

pub fn get_video_sdp(sdp_text: &str) -> OrchestratorResult<Option<String>> {
    find_partial(sdp_text, "video")
}

pub fn get_content_sdp(sdp_text: &str) -> OrchestratorResult<Option<String>> {
    find_partial(sdp_text, "content")
}

/// Retains only payload types of `codec` in video m-lines, dropping orphan
/// `rtpmap`/`fmtp`/`rtcp-fb` lines for the removed payload types.
pub fn filter_by_video_codec(sdp_text: &str, codec: &str) -> OrchestratorResult<String> {
    let mut session = parse(sdp_text)?;
    let codec_lower = codec.to_ascii_lowercase();

    for media in &mut session.media_descriptions {
        if media.media_name.media != "video" {
            continue;
        }

        let mut keep_pts: Vec<String> = Vec::new();
        for attr in &media.attributes {
            if attr.key == "rtpmap" {
                if let Some(value) = &attr.value {
                    let mut parts = value.splitn(2, ' ');
                    let pt = parts.next().unwrap_or_default();
                    let desc = parts.next().unwrap_or_default();
                    if desc.to_ascii_lowercase().starts_with(&codec_lower) {
                        keep_pts.push(pt.to_string());
                    }
                }
            }
        }

        media.media_name.formats.retain(|f| keep_pts.contains(f));
        media.attributes.retain(|attr| match attr.key.as_str() {
            "rtpmap" | "fmtp" | "rtcp-fb" => attr
                .value
                .as_ref()
                .and_then(|v| v.split_whitespace().next())
                .map(|pt| keep_pts.contains(&pt.to_string()))
                .unwrap_or(false),
            _ => true,
        });
    }

    Ok(session.marshal())
}

/// Substitutes every `c=IN IP4 ...` connection address with `ip`, at both the
/// session level and every media level. "Non-pure" because it mutates
/// addresses it finds rather than asserting a single canonical one exists.
pub fn non_pure_replace_server_ipv4(sdp_text: &str, ip: &str) -> OrchestratorResult<String> {
    let mut session = parse(sdp_text)?;

    let replace = |ci: &mut Option<ConnectionInformation>| {
        if let Some(conn) = ci {
            conn.address = Some(Address {
                address: ip.to_string(),
                ttl: None,
                range: None,
            });
        }
    };

    replace(&mut session.connection_information);
    for media in &mut session.media_descriptions {
        replace(&mut media.connection_information);
    }

    Ok(session.marshal())
}

/// Codecs actually present in a negotiated descriptor, split by kind. Used
/// after negotiation to narrow a session's media spec to a compatible subset.
#[derive(Debug, Clone, Default)]
pub struct ChosenCodecs {
    pub audio: Vec<String>,
    pub video: Vec<String>,
}

pub fn update_spec_with_chosen_codecs(sdp_text: &str) -> OrchestratorResult<ChosenCodecs> {
    let session = parse(sdp_text)?;
    let mut chosen = ChosenCodecs::default();

    for media in &session.media_descriptions {
        if is_inactive(media) {
            continue;
        }
        let bucket = match media.media_name.media.as_str() {
            "audio" => &mut chosen.audio,
            "video" => &mut chosen.video,
            _ => continue,
        };
        for attr in &media.attributes {
            if attr.key == "rtpmap" {
                if let Some(value) = &attr.value {
                    if let Some(name) = value.splitn(2, ' ').nth(1) {
                        let codec = name.split('/').next().unwrap_or(name).to_string();
                        if !bucket.contains(&codec) {
                            bucket.push(codec);
                        }
                    }
                }
            }
        }
    }

    Ok(chosen)
}

pub fn has_available_audio_codec(sdp_text: &str) -> bool {
    parse(sdp_text)
        .map(|s| {
            s.media_descriptions
                .iter()
                .any(|m| m.media_name.media == "audio" && !is_inactive(m))
        })
        .unwrap_or(false)
}

pub fn has_available_video_codec(sdp_text: &str) -> bool {
    parse(sdp_text)
        .map(|s| {
            s.media_descriptions
                .iter()
                .any(|m| m.media_name.media == "video" && !is_inactive(m))
        })
        .unwrap_or(false)
}

/// The session-level prelude (version/origin/session name/time/etc, no `m=`
/// lines), used to reassemble a multi-media answer under a single shared
/// header.
pub fn session_description_header(sdp_text: &str) -> OrchestratorResult<String> {
    let mut session = parse(sdp_text)?;
    session.media_descriptions.clear();
    Ok(session.marshal())
}

/// The per-media bodies only, with the shared header stripped, one string
/// per `m=` section in original order.
pub fn remove_session_description(sdp_text: &str) -> OrchestratorResult<Vec<String>> {
    let partials = get_partial_descriptions(sdp_text)?;
    let header = session_description_header(sdp_text)?;
    Ok(partials
        .into_iter()
        .map(|p| p.sdp.trim_start_matches(header.as_str()).trim_start().to_string())
        .collect())
}

/// Reassembles partial answers into one SDP: audio first, then the rest in
/// original offer order, sharing a single header taken from the first
/// non-audio unit or, failing that, the first unit.
pub fn reassemble_answer(parts: &[(String, String)]) -> OrchestratorResult<String> {
    if parts.is_empty() {
        return Err(OrchestratorError::MediaNoAvailableCodec(
            "no negotiated media to reassemble".to_string(),
        ));
    }

    let header_source = parts
        .iter()
        .find(|(kind, _)| kind != "audio")
        .or_else(|| parts.first())
        .map(|(_, sdp)| sdp.clone())
        .expect("parts checked non-empty above");
    let header = session_description_header(&header_source)?;

    let mut ordered: Vec<&(String, String)> = Vec::with_capacity(parts.len());
    if let Some(audio) = parts.iter().find(|(kind, _)| kind == "audio") {
        ordered.push(audio);
    }
    for part in parts {
        if part.0 != "audio" {
            ordered.push(part);
        }
    }

    let mut body = String::new();
    for (_, sdp) in ordered {
        let session = parse(sdp)?;
        for media in &session.media_descriptions {
            let mut single = session.clone();
            single.media_descriptions = vec![media.clone()];
            let marshalled = single.marshal();
            if let Some(stripped) = marshalled.strip_prefix(header.as_str()) {
                body.push_str(stripped.trim_start());
            } else {
                body.push_str(&marshalled);
            }
        }
    }

    Ok(format!("{header}{body}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = "v=0\r\n\
o=- 123 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
c=IN IP4 127.0.0.1\r\n\
a=rtpmap:111 opus/48000/2\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96 125\r\n\
c=IN IP4 127.0.0.1\r\n\
a=rtpmap:96 VP8/90000\r\n\
a=rtpmap:125 H264/90000\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 97\r\n\
c=IN IP4 127.0.0.1\r\n\
a=content:slides\r\n\
a=rtpmap:97 VP8/90000\r\n";

    #[test]
    fn splits_partials_by_kind() {
        let partials = get_partial_descriptions(OFFER).unwrap();
        assert_eq!(partials.len(), 3);
        assert!(partials[2].is_content);
    }

    #[test]
    fn finds_audio_video_content() {
        assert!(get_audio_sdp(OFFER).unwrap().is_some());
        assert!(get_video_sdp(OFFER).unwrap().is_some());
        assert!(get_content_sdp(OFFER).unwrap().is_some());
    }

    #[test]
    fn filters_to_single_codec() {
        let filtered = filter_by_video_codec(OFFER, "H264").unwrap();
        assert!(filtered.contains("H264"));
        assert!(!filtered.contains("VP8"));
    }

    #[test]
    fn replaces_connection_ip() {
        let replaced = non_pure_replace_server_ipv4(OFFER, "10.0.0.9").unwrap();
        assert!(replaced.contains("10.0.0.9"));
        assert!(!replaced.contains("127.0.0.1"));
    }

    #[test]
    fn detects_available_codecs() {
        assert!(has_available_audio_codec(OFFER));
        assert!(has_available_video_codec(OFFER));
    }
}
