//! Unit tests for MLLP framing.

use std::io::{self, Cursor, Read};
use std::thread;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use rstest::rstest;

use super::*;

const MESSAGE: &str = "MSH|^~\\&|LAB|NORTH|gnuhealth|gnuhealth|20240301||QBP^Q22^QBP_Q21|1|P|2.5\r";

fn reader(bytes: Vec<u8>) -> FrameReader<Cursor<Vec<u8>>> {
    FrameReader::new(Cursor::new(bytes), DEFAULT_MAX_FRAME_BYTES)
}

fn concat(parts: &[&[u8]]) -> Vec<u8> {
    parts.iter().flat_map(|part| part.iter().copied()).collect()
}

/// Reader that hands out one byte per call, interrupting the first read.
struct Trickle {
    bytes: Vec<u8>,
    position: usize,
    interrupted: bool,
    pause: Duration,
}

impl Trickle {
    fn new(bytes: Vec<u8>) -> Self {
        Self::paced(bytes, Duration::ZERO)
    }

    fn paced(bytes: Vec<u8>, pause: Duration) -> Self {
        Self {
            bytes,
            position: 0,
            interrupted: false,
            pause,
        }
    }
}

impl Read for Trickle {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        if !self.interrupted {
            self.interrupted = true;
            return Err(io::Error::from(io::ErrorKind::Interrupted));
        }
        let Some(byte) = self.bytes.get(self.position) else {
            return Ok(0);
        };
        let Some(slot) = buffer.first_mut() else {
            return Ok(0);
        };
        thread::sleep(self.pause);
        *slot = *byte;
        self.position += 1;
        Ok(1)
    }
}

#[test]
fn framing_wraps_the_text() {
    let frame = encode_frame(MESSAGE);
    assert_eq!(frame.first(), Some(&START_BLOCK));
    assert!(frame.ends_with(&[END_BLOCK, TRAILER]));
    assert_eq!(decode_frame(&frame).expect("frame decodes"), MESSAGE);
}

proptest! {
    #[test]
    fn any_text_without_block_markers_survives_framing(text in "[^\\x0B\\x1C]*") {
        let frame = encode_frame(&text);
        prop_assert_eq!(decode_frame(&frame).expect("frame decodes"), text.as_str());
    }

    #[test]
    fn streamed_frames_arrive_in_order(texts in prop::collection::vec("[^\\x0B\\x1C]{1,64}", 0..8)) {
        let bytes: Vec<u8> = texts.iter().flat_map(|text| encode_frame(text)).collect();
        let mut frames = reader(bytes);
        for text in &texts {
            prop_assert_eq!(frames.next_frame().expect("frame"), Some(text.clone()));
        }
        prop_assert_eq!(frames.next_frame().expect("eof"), None);
    }
}

#[rstest]
#[case(b"MSH|".to_vec(), FrameError::NotFramed)]
#[case(vec![START_BLOCK, b'A', END_BLOCK], FrameError::Truncated { received: 2 })]
#[case(vec![START_BLOCK, b'A', END_BLOCK, b'\n'], FrameError::MissingTrailer)]
#[case(vec![START_BLOCK, b'A', START_BLOCK, END_BLOCK, TRAILER], FrameError::UnexpectedStartBlock { discarded: 1 })]
#[case(vec![START_BLOCK, 0xFF, END_BLOCK, TRAILER], FrameError::NotUtf8 { valid_up_to: 0 })]
fn decode_rejects_malformed_frames(#[case] bytes: Vec<u8>, #[case] expected: FrameError) {
    let error = decode_frame(&bytes).expect_err("frame must be rejected");
    assert_eq!(error.to_string(), expected.to_string());
}

#[test]
fn reads_consecutive_frames_from_one_buffer() {
    let bytes = concat(&[&encode_frame("first"), b"\r\n", &encode_frame("second")]);
    let mut frames = reader(bytes);
    assert_eq!(frames.next_frame().expect("first"), Some("first".to_owned()));
    assert_eq!(frames.next_frame().expect("second"), Some("second".to_owned()));
    assert_eq!(frames.next_frame().expect("eof"), None);
}

#[test]
fn reassembles_frames_split_across_reads() {
    let mut frames = FrameReader::new(
        Trickle::new(encode_frame(MESSAGE)),
        DEFAULT_MAX_FRAME_BYTES,
    );
    assert_eq!(frames.next_frame().expect("frame"), Some(MESSAGE.to_owned()));
    assert_eq!(frames.next_frame().expect("eof"), None);
}

#[test]
fn skips_garbage_before_the_start_block() {
    let bytes = concat(&[b"noise", &encode_frame("payload")]);
    let mut frames = reader(bytes);
    assert_eq!(frames.next_frame().expect("frame"), Some("payload".to_owned()));
}

#[test]
fn garbage_without_a_frame_is_not_framed() {
    let mut frames = reader(b"GET / HTTP/1.1\r\n\r\n".to_vec());
    let error = frames.next_frame().expect_err("no frame present");
    assert!(matches!(error, FrameError::NotFramed));
    assert!(!error.is_recoverable());
}

#[test]
fn eof_inside_a_frame_is_truncated() {
    let mut frames = reader(vec![START_BLOCK, b'M', b'S', b'H']);
    let error = frames.next_frame().expect_err("frame is incomplete");
    assert!(matches!(error, FrameError::Truncated { received: 3 }));
}

#[test]
fn oversized_frames_are_skipped() {
    let bytes = concat(&[&encode_frame("0123456789"), &encode_frame("ok")]);
    let mut frames = FrameReader::new(Cursor::new(bytes), 4);
    let error = frames.next_frame().expect_err("frame too large");
    assert!(matches!(error, FrameError::Oversized { limit: 4 }));
    assert_eq!(frames.next_frame().expect("resynchronised"), Some("ok".to_owned()));
    assert_eq!(frames.next_frame().expect("eof"), None);
}

#[test]
fn frame_of_exactly_the_limit_is_accepted() {
    let mut frames = FrameReader::new(Cursor::new(encode_frame("abcd")), 4);
    assert_eq!(frames.next_frame().expect("frame"), Some("abcd".to_owned()));
}

#[test]
fn stray_start_block_resynchronises() {
    let bytes = concat(&[&[START_BLOCK], b"lost", &encode_frame("kept")]);
    let mut frames = reader(bytes);
    let error = frames.next_frame().expect_err("frame was never closed");
    assert!(matches!(error, FrameError::UnexpectedStartBlock { discarded: 4 }));
    assert_eq!(frames.next_frame().expect("next frame"), Some("kept".to_owned()));
}

#[test]
fn missing_trailer_resynchronises() {
    let bytes = concat(&[&[START_BLOCK], b"half", &[END_BLOCK], &encode_frame("whole")]);
    let mut frames = reader(bytes);
    let error = frames.next_frame().expect_err("trailer missing");
    assert!(matches!(error, FrameError::MissingTrailer));
    assert_eq!(frames.next_frame().expect("next frame"), Some("whole".to_owned()));
}

#[test]
fn non_utf8_bodies_are_recoverable() {
    let bytes = concat(&[
        &[START_BLOCK, b'A', 0xC3, 0x28, END_BLOCK, TRAILER],
        &encode_frame("fine"),
    ]);
    let mut frames = reader(bytes);
    let error = frames.next_frame().expect_err("invalid UTF-8");
    assert!(matches!(error, FrameError::NotUtf8 { valid_up_to: 1 }));
    assert!(error.is_recoverable());
    assert_eq!(frames.next_frame().expect("next frame"), Some("fine".to_owned()));
}

#[test]
fn write_frame_wraps_the_reply() {
    let mut sink = Vec::new();
    write_frame(&mut sink, "MSA|AA|1\r").expect("write succeeds");
    assert_eq!(sink, encode_frame("MSA|AA|1\r"));
}

#[test]
fn slow_frames_time_out_even_when_bytes_keep_arriving() {
    let paced = Trickle::paced(encode_frame(MESSAGE), Duration::from_millis(10));
    let mut frames = FrameReader::new(paced, DEFAULT_MAX_FRAME_BYTES)
        .with_frame_timeout(Some(Duration::from_millis(100)));
    let started = Instant::now();

    let error = frames.next_frame().expect_err("frame is too slow");

    assert!(matches!(error, FrameError::TimedOut), "{error:?}");
    assert!(!error.is_recoverable());
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn frames_within_the_timeout_are_read() {
    let mut frames = FrameReader::new(Trickle::new(encode_frame(MESSAGE)), DEFAULT_MAX_FRAME_BYTES)
        .with_frame_timeout(Some(Duration::from_secs(5)));
    assert_eq!(frames.next_frame().expect("frame"), Some(MESSAGE.to_owned()));
    assert_eq!(frames.next_frame().expect("eof"), None);
}
