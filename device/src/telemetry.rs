//! Telemetry byte stream on its own RTT up channel.

use rtt_target::UpChannel;
use tpdrive_engine::hal::TelemetrySink;

pub struct RttTelemetry {
    channel: UpChannel,
}

impl RttTelemetry {
    pub fn new(channel: UpChannel) -> Self {
        Self { channel }
    }
}

impl TelemetrySink for RttTelemetry {
    #[inline]
    fn report_byte(&mut self, value: u8) {
        // NoBlockSkip: a full buffer drops the sample instead of stalling the cadence.
        self.channel.write(&[value]);
    }
}
