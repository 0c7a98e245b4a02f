#![no_main]
use libfuzzer_sys::fuzz_target;

use rudpchannel::{new_channel, Channel, ChannelConfig, Packet};

fuzz_target!(|data: &[u8]| {
    if let Ok(packet) = Packet::from_bytes(data) {
        assert_eq!(&packet.to_bytes()[..], data);

        let mut channel: Box<dyn Channel<()> + Send> = new_channel(packet.channel_kind(), ChannelConfig::default());
        channel.queue_incoming((), packet);
        channel.get_pending_incoming().for_each(drop);
    }
});
