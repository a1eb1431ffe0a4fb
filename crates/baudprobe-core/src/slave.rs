//! Slave responder
//!
//! Passive counterpart of the master: scans for a HELLO, then stays locked,
//! accounting DATA frames and answering control frames until the link goes
//! quiet for longer than the idle timeout.

use std::time::Instant;

use crate::config::SlaveConfig;
use crate::link::{apply_switch, LinkIo, LinkSession, LinkState, SlaveScanner};
use crate::protocol::{
    read_baud_payload, DecodedFrame, Frame, FrameType, ProtocolError, Transport,
};

/// Responder owning one transport and its session
pub struct SlaveResponder<T: Transport> {
    io: LinkIo<T>,
    config: SlaveConfig,
    session: LinkSession,
    scanner: SlaveScanner,
    last_report: Instant,
}

impl<T: Transport> SlaveResponder<T> {
    /// Create a responder, validating the configuration
    pub fn new(transport: T, config: SlaveConfig) -> Result<Self, ProtocolError> {
        config.validate()?;
        let scanner = SlaveScanner::new(config.baud_list.clone(), config.scan_dwell());
        Ok(Self {
            io: LinkIo::new(transport),
            config,
            session: LinkSession::new(),
            scanner,
            last_report: Instant::now(),
        })
    }

    pub fn session(&self) -> &LinkSession {
        &self.session
    }

    pub fn state(&self) -> LinkState {
        self.session.state()
    }

    pub fn transport(&self) -> &T {
        self.io.transport()
    }

    /// One iteration of the control loop; returns within roughly one read timeout
    pub fn poll(&mut self) -> Result<(), ProtocolError> {
        match self.session.state() {
            LinkState::Scanning => self.poll_scanning(),
            LinkState::Locked => self.poll_locked(),
        }
    }

    /// Poll until `stop` returns true. Transport faults are logged and retried.
    pub fn run_until(&mut self, mut stop: impl FnMut() -> bool) {
        while !stop() {
            if let Err(e) = self.poll() {
                tracing::warn!("slave loop error: {}", e);
                std::thread::sleep(self.config.timing.slave_read());
            }
        }
    }

    /// Serve forever
    pub fn run(&mut self) {
        self.run_until(|| false)
    }

    fn poll_scanning(&mut self) -> Result<(), ProtocolError> {
        let read_timeout = self.config.timing.slave_read();
        if let Some(baud) = self.scanner.tick(&mut self.io, read_timeout)? {
            let now = Instant::now();
            self.session.lock(baud, now);
            self.last_report = now;
        }
        Ok(())
    }

    fn poll_locked(&mut self) -> Result<(), ProtocolError> {
        let read = self.io.fill(self.config.timing.slave_read());

        while let Some(frame) = self.io.next_frame() {
            self.handle_frame(frame, Instant::now());
            if !self.session.is_locked() {
                break;
            }
        }

        let now = Instant::now();
        self.maybe_report(now);
        self.check_idle(now);
        read.map(|_| ())
    }

    /// Dispatch one received frame while locked
    fn handle_frame(&mut self, frame: DecodedFrame, now: Instant) {
        self.session.touch(now);

        if !frame.crc_valid {
            self.session.stats_mut().on_bad();
            return;
        }

        match frame.kind() {
            Some(FrameType::Data) => {
                self.session
                    .stats_mut()
                    .on_data(frame.sequence, frame.payload.len());
            }
            Some(FrameType::Hello) => {
                let baud = self.io.baud();
                self.send(&Frame::hello_ack(baud));
            }
            Some(FrameType::SetBaud) => self.handle_set_baud(&frame.payload),
            Some(FrameType::StatsReq) => {
                let report = self.session.stats_mut().snapshot_and_reset_window();
                self.send(&Frame::stats_rsp(&report));
            }
            _ => tracing::trace!(frame_type = frame.frame_type, "ignoring frame"),
        }
    }

    fn handle_set_baud(&mut self, payload: &[u8]) {
        let baud = match read_baud_payload(FrameType::SetBaud, payload) {
            Ok(0) => {
                tracing::warn!("ignoring SETBAUD to 0");
                return;
            }
            Ok(baud) => baud,
            Err(e) => {
                tracing::warn!("ignoring SETBAUD: {}", e);
                return;
            }
        };

        match apply_switch(&mut self.io, baud, &self.config.timing) {
            Ok(()) => self.session.set_baud(baud),
            Err(e) => tracing::warn!(baud, "switch failed: {}", e),
        }
    }

    /// Drop the session if the link has been silent too long
    fn check_idle(&mut self, now: Instant) -> bool {
        if !self.session.is_idle(now, self.config.idle_timeout()) {
            return false;
        }
        tracing::info!(
            silence_ms = self.session.silence(now).as_millis() as u64,
            "idle timeout, back to scanning"
        );
        self.session.revert_to_scanning();
        self.io.reset_parser();
        self.scanner.restart();
        true
    }

    fn maybe_report(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_report) < self.config.timing.report_interval() {
            return;
        }
        self.last_report = now;

        let stats = self.session.stats();
        let (w, t) = (stats.window(), stats.total());
        tracing::info!(
            "RX win_ok={} win_miss={} win_bad={} win_dup={} loss_win={:.3}% | total_ok={} total_miss={} total_bad={} total_dup={} loss_total={:.3}%",
            w.ok,
            w.missed,
            w.bad,
            w.dup,
            w.loss_pct(),
            t.ok,
            t.missed,
            t.bad,
            t.dup,
            t.loss_pct()
        );
    }

    fn send(&mut self, frame: &Frame) {
        if let Err(e) = self.io.send(frame) {
            tracing::warn!(frame = frame.frame_type().name(), "write failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timing;
    use crate::protocol::{StatsReport, StreamParser};
    use crate::sim::{SimLink, SimPort};
    use std::time::Duration;

    fn config() -> SlaveConfig {
        SlaveConfig {
            port: "sim".into(),
            baud_list: vec![115_200, 230_400],
            scan_dwell_ms: 20,
            idle_timeout_ms: 200,
            timing: Timing::fast(),
        }
    }

    fn locked_slave() -> (SlaveResponder<SimPort>, SimPort) {
        let (a, b) = SimLink::pair(115_200);
        let mut slave = SlaveResponder::new(a, config()).unwrap();
        slave.session.lock(115_200, Instant::now());
        (slave, b)
    }

    fn valid(frame: &Frame) -> DecodedFrame {
        let mut parser = StreamParser::new();
        parser.feed(&frame.to_bytes());
        parser.try_take_frame().unwrap()
    }

    fn data(seq: u32) -> DecodedFrame {
        valid(&Frame::new(FrameType::Data, seq, vec![0xAB; 8]).unwrap())
    }

    fn replies(peer: &mut SimPort) -> Vec<DecodedFrame> {
        let mut parser = StreamParser::new();
        parser.feed(&peer.read(65_536, Duration::from_millis(5)).unwrap());
        parser.drain_frames()
    }

    #[test]
    fn test_data_and_bad_frames_counted() {
        let (mut slave, _peer) = locked_slave();
        let now = Instant::now();
        for seq in [0, 1, 2, 5, 6, 4] {
            slave.handle_frame(data(seq), now);
        }
        let mut bad = data(7);
        bad.crc_valid = false;
        slave.handle_frame(bad, now);

        let total = *slave.session().stats().total();
        assert_eq!(total.ok, 6);
        assert_eq!(total.missed, 2);
        assert_eq!(total.dup, 1);
        assert_eq!(total.bad, 1);
        // A bad frame is never dispatched, so the baseline is unchanged.
        assert_eq!(slave.session().stats().expected_sequence(), Some(7));
    }

    #[test]
    fn test_hello_answered_while_locked() {
        let (mut slave, mut peer) = locked_slave();
        slave.handle_frame(valid(&Frame::hello()), Instant::now());

        let frames = replies(&mut peer);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is(FrameType::HelloAck));
        assert_eq!(
            read_baud_payload(FrameType::HelloAck, &frames[0].payload).unwrap(),
            115_200
        );
    }

    #[test]
    fn test_stats_request_resets_window_only() {
        let (mut slave, mut peer) = locked_slave();
        let now = Instant::now();
        slave.handle_frame(data(0), now);
        slave.handle_frame(data(2), now);
        slave.handle_frame(valid(&Frame::stats_req()), now);

        let frames = replies(&mut peer);
        let report = StatsReport::from_payload(&frames[0].payload).unwrap();
        assert_eq!(report.window.ok, 2);
        assert_eq!(report.window.missed, 1);
        assert_eq!(report.total.ok, 2);

        let stats = slave.session().stats();
        assert_eq!(stats.window().ok, 0);
        assert_eq!(stats.window().missed, 0);
        assert_eq!(stats.total().ok, 2);

        slave.handle_frame(data(3), now);
        let stats = slave.session().stats();
        assert_eq!(stats.window().ok, 1);
        assert_eq!(stats.total().ok, 3);
        assert_eq!(stats.total().missed, 1);
    }

    #[test]
    fn test_set_baud_acks_at_old_rate_then_switches() {
        let (mut slave, mut peer) = locked_slave();
        slave.handle_frame(valid(&Frame::set_baud(460_800)), Instant::now());

        assert_eq!(slave.transport().baud_rate(), 460_800);
        assert_eq!(slave.session().current_baud(), Some(460_800));

        // The peer is still at the old rate, where the ack was sent.
        let frames = replies(&mut peer);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is(FrameType::SetBaudAck));
        assert_eq!(
            read_baud_payload(FrameType::SetBaudAck, &frames[0].payload).unwrap(),
            460_800
        );
    }

    #[test]
    fn test_malformed_set_baud_ignored() {
        let (mut slave, mut peer) = locked_slave();
        let frame = Frame::new(FrameType::SetBaud, 0, vec![1, 2]).unwrap();
        slave.handle_frame(valid(&frame), Instant::now());
        assert_eq!(slave.transport().baud_rate(), 115_200);
        assert!(replies(&mut peer).is_empty());
    }

    #[test]
    fn test_unknown_type_ignored() {
        let (mut slave, mut peer) = locked_slave();
        let mut frame = valid(&Frame::stats_req());
        frame.frame_type = 0x7E;
        slave.handle_frame(frame, Instant::now());
        assert!(replies(&mut peer).is_empty());
        assert_eq!(slave.session().stats().total().bad, 0);
    }

    #[test]
    fn test_idle_timeout_reverts_to_scanning() {
        let (mut slave, _peer) = locked_slave();
        let start = Instant::now();
        slave.handle_frame(data(10), start);
        slave.handle_frame(data(12), start);

        assert!(!slave.check_idle(start + Duration::from_millis(100)));
        assert_eq!(slave.state(), LinkState::Locked);

        assert!(slave.check_idle(start + Duration::from_millis(300)));
        assert_eq!(slave.state(), LinkState::Scanning);
        let stats = slave.session().stats();
        assert_eq!(stats.expected_sequence(), None);
        assert_eq!(stats.total().ok, 0);
        assert_eq!(stats.total().missed, 0);
    }

    #[test]
    fn test_scanning_locks_on_hello() {
        let (a, mut peer) = SimLink::pair(9600);
        let config = SlaveConfig {
            scan_dwell_ms: 5000,
            ..config()
        };
        let mut slave = SlaveResponder::new(a, config).unwrap();

        // First tick moves to the first candidate.
        slave.poll().unwrap();
        assert_eq!(slave.transport().baud_rate(), 115_200);
        assert_eq!(slave.state(), LinkState::Scanning);

        peer.set_baud_rate(115_200).unwrap();
        peer.send_frame(&Frame::hello()).unwrap();
        slave.poll().unwrap();

        assert_eq!(slave.state(), LinkState::Locked);
        assert_eq!(slave.session().current_baud(), Some(115_200));
        let frames = replies(&mut peer);
        assert!(frames[0].is(FrameType::HelloAck));
    }
}
