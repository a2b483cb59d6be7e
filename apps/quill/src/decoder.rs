//! Stream Frame Decoder — turns an arbitrarily-chunked byte stream into
//! typed content frames.
//!
//! Wire format: newline-delimited lines. Lines carrying content start with
//! the literal prefix `data: `; everything else is ignored. The payload is
//! either the token `[DONE]` (a continuation marker — NOT an authoritative
//! end-of-stream; transport closure is), empty (paragraph break), or a JSON
//! object with optional `text` and/or `artifact` members. A payload that
//! fails JSON parsing is emitted verbatim as text — malformed payloads never
//! throw. Only an invalid byte stream itself (bad UTF-8 in a completed line)
//! is fatal.

use serde::Deserialize;

use crate::errors::DraftError;
use crate::slot::Artifact;

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_TOKEN: &str = "[DONE]";

/// One decoded unit from a streaming generation response.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Artifact(Artifact),
    ParagraphBreak,
    /// The `[DONE]` token. Callers ignore it; see module docs.
    Continuation,
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    text: Option<String>,
    artifact: Option<Artifact>,
}

/// Incremental line decoder. A chunk may end mid-line or even mid-UTF-8
/// sequence, so undecoded bytes carry over between feeds; call `flush` at
/// stream end for a trailing unterminated line.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    carry: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes every complete line in `carry + chunk`, retaining the last
    /// (possibly partial) segment for the next feed.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, DraftError> {
        self.carry.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.carry.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.carry.drain(..=pos).collect();
            decode_line(&line[..line.len() - 1], &mut frames)?;
        }
        Ok(frames)
    }

    /// Decodes any trailing unterminated line. Must be called at stream end.
    pub fn flush(&mut self) -> Result<Vec<Frame>, DraftError> {
        let mut frames = Vec::new();
        if !self.carry.is_empty() {
            let line = std::mem::take(&mut self.carry);
            decode_line(&line, &mut frames)?;
        }
        Ok(frames)
    }
}

fn decode_line(raw: &[u8], out: &mut Vec<Frame>) -> Result<(), DraftError> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = std::str::from_utf8(raw)
        .map_err(|e| DraftError::Decode(format!("invalid UTF-8 in stream: {e}")))?;

    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(()); // non-prefixed lines are ignored
    };

    if payload == DONE_TOKEN {
        out.push(Frame::Continuation);
        return Ok(());
    }
    if payload.is_empty() {
        out.push(Frame::ParagraphBreak);
        return Ok(());
    }

    match serde_json::from_str::<StreamPayload>(payload) {
        Ok(decoded) => {
            if let Some(text) = decoded.text {
                out.push(Frame::Text(text));
            }
            if let Some(artifact) = decoded.artifact {
                out.push(Frame::Artifact(artifact));
            }
        }
        // Malformed payload: emit the raw payload verbatim, never throw.
        Err(_) => out.push(Frame::Text(payload.to_string())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Renders a frame sequence the way a preview pane would: text appended
    /// as-is, paragraph breaks as a blank line, everything else dropped.
    fn render(frames: &[Frame]) -> String {
        let mut out = String::new();
        for frame in frames {
            match frame {
                Frame::Text(t) => out.push_str(t),
                Frame::ParagraphBreak => out.push_str("\n\n"),
                Frame::Artifact(_) | Frame::Continuation => {}
            }
        }
        out
    }

    fn decode_all(chunks: &[&[u8]]) -> Vec<Frame> {
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for chunk in chunks {
            frames.extend(decoder.feed(chunk).unwrap());
        }
        frames.extend(decoder.flush().unwrap());
        frames
    }

    #[test]
    fn test_partial_payload_held_until_line_completes() {
        let mut decoder = FrameDecoder::new();
        let first = decoder.feed(b"data: {\"text\":\"Hel").unwrap();
        assert!(first.is_empty(), "no frame before the newline arrives");

        let second = decoder.feed(b"lo\"}\n").unwrap();
        assert_eq!(second, vec![Frame::Text("Hello".to_string())]);
    }

    #[test]
    fn test_empty_payload_is_paragraph_break() {
        let frames = decode_all(&[b"data: \n"]);
        assert_eq!(frames, vec![Frame::ParagraphBreak]);
    }

    #[test]
    fn test_done_token_is_continuation_not_end() {
        let frames = decode_all(&[b"data: [DONE]\ndata: {\"text\":\"after\"}\n"]);
        assert_eq!(
            frames,
            vec![Frame::Continuation, Frame::Text("after".to_string())],
            "frames after [DONE] still decode"
        );
    }

    #[test]
    fn test_malformed_payload_emitted_verbatim() {
        let frames = decode_all(&[b"data: {not json at all\n"]);
        assert_eq!(frames, vec![Frame::Text("{not json at all".to_string())]);
    }

    #[test]
    fn test_wrong_member_type_falls_back_to_verbatim() {
        let frames = decode_all(&[b"data: {\"text\": 42}\n"]);
        assert_eq!(frames, vec![Frame::Text("{\"text\": 42}".to_string())]);
    }

    #[test]
    fn test_object_without_known_members_yields_nothing() {
        let frames = decode_all(&[b"data: {\"usage\": {\"tokens\": 9}}\n"]);
        assert!(frames.is_empty(), "no result is not an error");
    }

    #[test]
    fn test_non_prefixed_lines_ignored() {
        let frames = decode_all(&[b"event: ping\n: comment\ndata: {\"text\":\"x\"}\n"]);
        assert_eq!(frames, vec![Frame::Text("x".to_string())]);
    }

    #[test]
    fn test_artifact_frame() {
        let frames = decode_all(&[
            b"data: {\"artifact\":{\"id\":\"a1\",\"kind\":\"pdf\",\"path\":\"out/cv.pdf\",\"created_at\":\"2026-03-01T10:00:00Z\"}}\n",
        ]);
        match &frames[..] {
            [Frame::Artifact(a)] => {
                assert_eq!(a.id, "a1");
                assert_eq!(a.kind, "pdf");
                assert_eq!(a.path, "out/cv.pdf");
            }
            other => panic!("expected one artifact frame, got {other:?}"),
        }
    }

    #[test]
    fn test_text_and_artifact_in_one_payload() {
        let frames = decode_all(&[
            b"data: {\"text\":\"see attachment\",\"artifact\":{\"id\":\"a2\",\"kind\":\"docx\",\"path\":\"out/letter.docx\",\"created_at\":\"2026-03-01T10:00:00Z\"}}\n",
        ]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], Frame::Text("see attachment".to_string()));
        assert!(matches!(frames[1], Frame::Artifact(_)));
    }

    #[test]
    fn test_crlf_line_endings_tolerated() {
        let frames = decode_all(&[b"data: {\"text\":\"hi\"}\r\n"]);
        assert_eq!(frames, vec![Frame::Text("hi".to_string())]);
    }

    #[test]
    fn test_flush_decodes_trailing_unterminated_line() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"data: {\"text\":\"tail\"}").unwrap().is_empty());
        assert_eq!(
            decoder.flush().unwrap(),
            vec![Frame::Text("tail".to_string())]
        );
        assert!(decoder.flush().unwrap().is_empty(), "flush is idempotent");
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        // "é" is two bytes; split it between feeds
        let line = "data: {\"text\":\"café\"}\n".as_bytes();
        let split = line.len() - 4; // inside the multi-byte sequence
        let frames = decode_all(&[&line[..split], &line[split..]]);
        assert_eq!(frames, vec![Frame::Text("café".to_string())]);
    }

    #[test]
    fn test_invalid_utf8_is_fatal() {
        let mut decoder = FrameDecoder::new();
        let result = decoder.feed(b"data: \xff\xfe\n");
        assert!(matches!(result, Err(DraftError::Decode(_))));
    }

    #[test]
    fn test_chunk_boundaries_do_not_change_output() {
        let stream = b"event: start\n\
            data: {\"text\":\"Dear hiring manager,\"}\n\
            data: \n\
            data: {\"text\":\"I am writing to\"}\n\
            data: {\"text\":\" apply.\"}\n\
            data: [DONE]\n";

        let reference = render(&decode_all(&[stream.as_slice()]));
        assert_eq!(
            reference,
            "Dear hiring manager,\n\nI am writing to apply."
        );

        // Every two-way split of the stream
        for i in 0..=stream.len() {
            let frames = decode_all(&[&stream[..i], &stream[i..]]);
            assert_eq!(render(&frames), reference, "split at byte {i}");
        }

        // Byte-at-a-time
        let single: Vec<&[u8]> = stream.chunks(1).collect();
        assert_eq!(render(&decode_all(&single)), reference);
    }
}
