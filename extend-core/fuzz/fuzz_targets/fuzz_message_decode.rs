#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;

use extend_core::protocol::{Inbound, MessageCodec, Request};
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let mut codec = MessageCodec::new();
    let mut buf = BytesMut::from(data);

    loop {
        match codec.decode(&mut buf) {
            Ok(Some(msg)) => {
                let _ = msg.message_type();
                let _ = msg.correlation_id();
                let _ = msg.channel_id();
                let _ = msg.wire_size();
                let _ = Inbound::decode(&msg);
                let _ = Request::decode(&msg);
            }
            Ok(None) => break,
            Err(_) => break,
        }
    }
});
