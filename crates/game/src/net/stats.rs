use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_acked: u64,
    pub rtt_ms: f32,
    pub rtt_variance: f32,
}

impl Default for ChannelStats {
    fn default() -> Self {
        Self {
            packets_sent: 0,
            packets_received: 0,
            packets_dropped: 0,
            bytes_sent: 0,
            bytes_received: 0,
            messages_acked: 0,
            rtt_ms: 100.0,
            rtt_variance: 50.0,
        }
    }
}

impl ChannelStats {
    pub fn record_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.packets_received += 1;
        self.bytes_received += bytes as u64;
    }

    pub fn update_rtt(&mut self, sample: Duration) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        let rtt = sample.as_secs_f32() * 1000.0;
        let diff = (rtt - self.rtt_ms).abs();
        self.rtt_variance = (1.0 - BETA) * self.rtt_variance + BETA * diff;
        self.rtt_ms = (1.0 - ALPHA) * self.rtt_ms + ALPHA * rtt;
    }
}
