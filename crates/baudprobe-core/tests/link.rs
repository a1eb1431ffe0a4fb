use baudprobe_core::config::{MasterConfig, SlaveConfig, Timing};
use baudprobe_core::link::SwitchFailure;
use baudprobe_core::master::MasterOrchestrator;
use baudprobe_core::protocol::{
    read_baud_payload, Frame, FrameType, ProtocolError, SequenceStats, StreamParser, Transport,
};
use baudprobe_core::report::{CandidateOutcome, TestReport};
use baudprobe_core::sim::{SimFaults, SimLink};
use baudprobe_core::slave::SlaveResponder;
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// In-process stand-in for the slave: answers the master's frames as they are
/// written, with configurable misbehavior per baud.
struct ScriptedPeer {
    baud: u32,
    parser: StreamParser,
    inbox: VecDeque<u8>,
    stats: SequenceStats,
    /// SETBAUD to these bauds is never acknowledged
    silent: Vec<u32>,
    /// SETBAUD to these bauds is acknowledged with a different value
    misreport: Vec<u32>,
    /// Once switched to one of these, HELLO is no longer answered
    deaf: Vec<u32>,
    /// STATS_REQ at these bauds is never answered
    mute_stats: Vec<u32>,
    set_baud_requests: Vec<u32>,
}

impl ScriptedPeer {
    fn new(baud: u32) -> Self {
        Self {
            baud,
            parser: StreamParser::new(),
            inbox: VecDeque::new(),
            stats: SequenceStats::new(),
            silent: vec![],
            misreport: vec![],
            deaf: vec![],
            mute_stats: vec![],
            set_baud_requests: vec![],
        }
    }

    fn reply(&mut self, frame: Frame) {
        self.inbox.extend(frame.to_bytes());
    }
}

impl Transport for ScriptedPeer {
    fn baud_rate(&self) -> u32 {
        self.baud
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), ProtocolError> {
        self.baud = baud;
        self.inbox.clear();
        Ok(())
    }

    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>, ProtocolError> {
        if self.inbox.is_empty() {
            thread::sleep(timeout.min(Duration::from_millis(1)));
            return Ok(Vec::new());
        }
        let n = max_bytes.min(self.inbox.len());
        Ok(self.inbox.drain(..n).collect())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.parser.feed(data);
        while let Some(frame) = self.parser.try_take_frame() {
            assert!(frame.crc_valid);
            match frame.kind() {
                Some(FrameType::Hello) if !self.deaf.contains(&self.baud) => {
                    self.reply(Frame::hello_ack(self.baud))
                }
                Some(FrameType::SetBaud) => {
                    let baud = read_baud_payload(FrameType::SetBaud, &frame.payload)?;
                    self.set_baud_requests.push(baud);
                    if self.misreport.contains(&baud) {
                        self.reply(Frame::set_baud_ack(baud + 1));
                    } else if !self.silent.contains(&baud) {
                        self.reply(Frame::set_baud_ack(baud));
                    }
                }
                Some(FrameType::Data) => self.stats.on_data(frame.sequence, frame.payload.len()),
                Some(FrameType::StatsReq) if !self.mute_stats.contains(&self.baud) => {
                    let report = self.stats.snapshot_and_reset_window();
                    self.reply(Frame::stats_rsp(&report));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }
}

fn master_config(bauds: &[u32]) -> MasterConfig {
    MasterConfig {
        port: "sim".into(),
        baud_list: bauds.to_vec(),
        payload_bytes: 32,
        num_packets: 100,
        loss_threshold: 0.1,
        timing: Timing::fast(),
    }
}

fn slave_config(bauds: &[u32]) -> SlaveConfig {
    SlaveConfig {
        port: "sim".into(),
        baud_list: bauds.to_vec(),
        scan_dwell_ms: 20,
        idle_timeout_ms: 2000,
        timing: Timing::fast(),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("baudprobe_core=debug")
        .with_test_writer()
        .try_init();
}

/// Run master and slave against each other over a simulated link
fn run_pair(master: MasterConfig, slave: SlaveConfig, faults: SimFaults) -> TestReport {
    init_tracing();
    let (master_port, slave_port) = SimLink::pair_with_faults(master.baud_list[0], faults);
    let stop = Arc::new(AtomicBool::new(false));

    let responder = {
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut slave = SlaveResponder::new(slave_port, slave).unwrap();
            slave.run_until(|| stop.load(Ordering::Relaxed));
        })
    };

    let report = MasterOrchestrator::new(master_port, master)
        .unwrap()
        .run();
    stop.store(true, Ordering::Relaxed);
    responder.join().unwrap();
    report.unwrap()
}

#[test]
fn test_clean_link_selects_last_candidate() {
    let bauds = [115_200, 230_400, 460_800];
    let report = run_pair(master_config(&bauds), slave_config(&bauds), SimFaults::default());

    assert_eq!(report.candidates.len(), 3);
    for (i, candidate) in report.candidates.iter().enumerate() {
        assert_eq!(candidate.baud, bauds[i]);
        match &candidate.outcome {
            CandidateOutcome::Measured { tx_frames, stats } => {
                assert_eq!(*tx_frames, 100);
                assert_eq!(stats.window.ok, 100);
                assert_eq!(stats.window.missed, 0);
                assert_eq!(stats.window.bytes, 3200);
                assert_eq!(stats.total.ok, 100 * (i as u64 + 1));
                assert_eq!(stats.total_loss, 0.0);
            }
            other => panic!("baud {} not measured: {:?}", bauds[i], other),
        }
    }
    let best = report.best.expect("a stable baud");
    assert_eq!(best.baud, 460_800);
    assert_eq!(best.loss_pct, 0.0);
}

#[test]
fn test_degraded_link_stops_at_clean_ceiling() {
    let bauds = [115_200, 230_400, 460_800];
    let faults = SimFaults {
        corrupt_rate: 0.02,
        clean_up_to: 230_400,
        seed: 42,
        ..Default::default()
    };
    let report = run_pair(master_config(&bauds), slave_config(&bauds), faults);

    assert_eq!(report.candidates[0].outcome.loss_pct(), Some(0.0));
    assert_eq!(report.candidates[1].outcome.loss_pct(), Some(0.0));
    let last = report.candidates[2].outcome.loss_pct();
    assert!(last.map_or(true, |loss| loss > 0.1), "{:?}", last);
    assert_eq!(report.best.map(|b| b.baud), Some(230_400));
}

#[test]
fn test_handshake_finds_slave_at_later_candidate() {
    let report = run_pair(
        master_config(&[9600, 19_200]),
        slave_config(&[19_200]),
        SimFaults::default(),
    );
    assert_eq!(report.locked_baud, 19_200);
    assert_eq!(report.best.map(|b| b.baud), Some(19_200));
}

#[test]
fn test_handshake_without_peer_is_fatal() {
    let (port, _silent) = SimLink::pair(9600);
    let mut config = master_config(&[9600, 19_200]);
    config.timing.hello_dwell_ms = 30;

    let mut master = MasterOrchestrator::new(port, config).unwrap();
    match master.run() {
        Err(ProtocolError::HandshakeFailed(bauds)) => assert_eq!(bauds, vec![9600, 19_200]),
        other => panic!("expected handshake failure, got {:?}", other.map(|r| r.best)),
    }
}

#[test]
fn test_missing_setbaud_ack_skips_candidate() {
    let mut peer = ScriptedPeer::new(9600);
    peer.silent = vec![19_200];
    let mut master =
        MasterOrchestrator::new(peer, master_config(&[9600, 19_200, 38_400])).unwrap();

    let started = Instant::now();
    let report = master.run().unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));

    assert!(matches!(
        report.candidates[0].outcome,
        CandidateOutcome::Measured { .. }
    ));
    assert_eq!(
        report.candidates[1].outcome,
        CandidateOutcome::SwitchFailed {
            reason: SwitchFailure::Timeout.to_string()
        }
    );
    assert!(matches!(
        report.candidates[2].outcome,
        CandidateOutcome::Measured { .. }
    ));
    assert_eq!(report.best.map(|b| b.baud), Some(38_400));

    // The skipped candidate does not consume sequence numbers.
    assert_eq!(master.next_sequence(), 200);
    let peer = master.into_transport();
    assert_eq!(peer.set_baud_requests, vec![9600, 19_200, 38_400]);
    assert_eq!(peer.stats.total().missed, 0);
}

#[test]
fn test_stats_timeout_counts_as_total_loss() {
    let mut peer = ScriptedPeer::new(9600);
    peer.mute_stats = vec![19_200];
    let mut master = MasterOrchestrator::new(peer, master_config(&[9600, 19_200])).unwrap();

    let started = Instant::now();
    let report = master.run().unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));

    assert_eq!(report.candidates[0].outcome.loss_pct(), Some(0.0));
    assert_eq!(
        report.candidates[1].outcome,
        CandidateOutcome::StatsTimeout { tx_frames: 100 }
    );
    assert_eq!(report.candidates[1].outcome.loss_pct(), Some(100.0));

    // The earlier qualifying candidate stays selected.
    let best = report.best.expect("a stable baud");
    assert_eq!(best.baud, 9600);
    assert_eq!(best.loss_pct, 0.0);
}

#[test]
fn test_peer_that_never_acks_yields_no_result() {
    let mut peer = ScriptedPeer::new(9600);
    peer.silent = vec![9600, 19_200];
    let mut master = MasterOrchestrator::new(peer, master_config(&[9600, 19_200])).unwrap();

    let report = master.run().unwrap();
    assert!(report.best.is_none());
    assert!(report
        .candidates
        .iter()
        .all(|c| c.outcome.loss_pct().is_none()));
    assert!(report.summary().starts_with("No baud"));
}

#[test]
fn test_mismatched_ack_and_missing_confirmation() {
    let mut peer = ScriptedPeer::new(9600);
    peer.misreport = vec![19_200];
    peer.deaf = vec![38_400];
    let mut master =
        MasterOrchestrator::new(peer, master_config(&[9600, 19_200, 38_400])).unwrap();

    assert_eq!(master.handshake().unwrap(), 9600);
    assert_eq!(master.switch_to(9600), Ok(()));
    assert_eq!(
        master.switch_to(19_200),
        Err(SwitchFailure::Mismatch {
            requested: 19_200,
            acknowledged: 19_201
        })
    );
    assert_eq!(master.switch_to(38_400), Err(SwitchFailure::NoConfirmation));
}

#[test]
fn test_last_qualifying_candidate_wins_even_if_slower() {
    let peer = ScriptedPeer::new(38_400);
    let mut master = MasterOrchestrator::new(peer, master_config(&[38_400, 9600])).unwrap();

    let report = master.run().unwrap();
    assert_eq!(report.best.map(|b| b.baud), Some(9600));
}

#[test]
fn test_slave_rescans_after_idle_timeout() {
    let bauds = [115_200, 230_400];
    let (master_port, slave_port) = SimLink::pair(115_200);
    let stop = Arc::new(AtomicBool::new(false));

    let responder = {
        let stop = Arc::clone(&stop);
        let mut config = slave_config(&bauds);
        config.idle_timeout_ms = 150;
        thread::spawn(move || {
            let mut slave = SlaveResponder::new(slave_port, config).unwrap();
            slave.run_until(|| stop.load(Ordering::Relaxed));
        })
    };

    let mut master = MasterOrchestrator::new(master_port, master_config(&bauds)).unwrap();
    assert_eq!(master.handshake().unwrap(), 115_200);

    // Go quiet long enough for the slave to drop the lock and resume scanning.
    thread::sleep(Duration::from_millis(400));
    assert_eq!(master.handshake().unwrap(), 115_200);
    assert_eq!(master.switch_to(230_400), Ok(()));

    stop.store(true, Ordering::Relaxed);
    responder.join().unwrap();
}
