#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;

use extend_core::protocol::Frame;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    while !buf.is_empty() {
        match Frame::read_from(&mut buf) {
            Ok(Some(frame)) => {
                let _ = frame.is_begin_frame();
                let _ = frame.is_end_frame();
                let _ = frame.is_null_frame();
                let _ = frame.wire_size();
                let _ = frame.as_nullable_data();
                let _ = frame.as_nullable_long();
                let _ = frame.as_string();
            }
            Ok(None) | Err(_) => break,
        }
    }
});
