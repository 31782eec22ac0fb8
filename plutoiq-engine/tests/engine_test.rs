use std::thread::{self, JoinHandle};
use std::time::Duration;

use plutoiq_engine::{Engine, IqSource, SimContext};
use plutoiq_messages::{Command, Event, Hertz, SourceConfig, TunerGain};

// Test helpers to reduce boilerplate

fn sim_config() -> SourceConfig {
    SourceConfig {
        endpoint: "sim:".into(),
        sample_rate: Hertz::mhz(2),
        frequency: Hertz::mhz(100),
        gain: TunerGain::Auto,
        block_length: 8192,
        agc_mode: false,
    }
}

fn setup_engine(
    config: SourceConfig,
) -> (
    flume::Sender<Command>,
    flume::Receiver<Event>,
    JoinHandle<anyhow::Result<()>>,
) {
    let _ = env_logger::builder().is_test(true).try_init();
    let (cmd_tx, cmd_rx) = flume::unbounded::<Command>();
    let (event_tx, event_rx) = flume::unbounded::<Event>();

    let handle = thread::spawn(move || {
        let engine = Engine::new(cmd_rx, event_tx, config);
        engine.run()
    });

    (cmd_tx, event_rx, handle)
}

fn teardown_engine(cmd_tx: flume::Sender<Command>, handle: JoinHandle<anyhow::Result<()>>) {
    cmd_tx.send(Command::Stop).unwrap();
    let result = handle.join().expect("Engine thread should not panic");
    assert!(result.is_ok(), "Engine should stop cleanly: {:?}", result);
}

fn next_snapshot(event_rx: &flume::Receiver<Event>) -> plutoiq_messages::SourceState {
    loop {
        match event_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(Event::StateSnapshot(state)) => return state,
            Ok(Event::Samples(_)) => continue,
            Ok(Event::Error(e)) => panic!("Unexpected error event: {}", e),
            Err(e) => panic!("Failed to receive StateSnapshot: {:?}", e),
        }
    }
}

#[test]
fn test_engine_construction() {
    let (cmd_tx, cmd_rx) = flume::unbounded::<Command>();
    let (event_tx, event_rx) = flume::unbounded::<Event>();

    // Construct engine - should not open the device yet
    let _engine = Engine::new(cmd_rx, event_tx, sim_config());

    drop(cmd_tx);
    drop(event_rx);
}

#[test]
fn test_engine_sends_state_snapshot() {
    let (cmd_tx, event_rx, handle) = setup_engine(sim_config());

    let first_event = event_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("Should receive StateSnapshot");

    match first_event {
        Event::StateSnapshot(state) => {
            assert_eq!(state.sample_rate, Hertz::mhz(2));
            assert_eq!(state.frequency, Hertz::mhz(100));
            assert_eq!(state.block_length, 8192);
            assert_eq!(state.gain_control_mode, "slow_attack");
        }
        other => panic!("First event should be StateSnapshot, got {:?}", other),
    }

    teardown_engine(cmd_tx, handle);
}

#[test]
fn test_engine_sends_sample_blocks() {
    let (cmd_tx, event_rx, handle) = setup_engine(sim_config());
    next_snapshot(&event_rx);

    for _ in 0..5 {
        match event_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(Event::Samples(block)) => {
                assert_eq!(block.len(), 8192);
                // Quarter-rate tone from the simulator
                assert!((block[0].norm() - 1.0).abs() < 1e-6);
            }
            Ok(other) => panic!("Expected Samples, got {:?}", other),
            Err(e) => panic!("Failed to receive Samples: {:?}", e),
        }
    }

    teardown_engine(cmd_tx, handle);
}

#[test]
fn test_engine_reconfigure_restarts_stream() {
    let (cmd_tx, event_rx, handle) = setup_engine(sim_config());
    next_snapshot(&event_rx);

    let mut config = sim_config();
    config.frequency = Hertz::mhz(433);
    config.block_length = 4096;
    cmd_tx.send(Command::Reconfigure(config)).unwrap();

    let state = next_snapshot(&event_rx);
    assert_eq!(state.frequency, Hertz::mhz(433));
    assert_eq!(state.block_length, 4096);

    loop {
        match event_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(Event::Samples(block)) if block.len() == 4096 => break,
            Ok(Event::Samples(_)) => continue,
            Ok(other) => panic!("Expected Samples, got {:?}", other),
            Err(e) => panic!("Failed to receive Samples: {:?}", e),
        }
    }

    teardown_engine(cmd_tx, handle);
}

#[test]
fn test_engine_reports_open_failure() {
    let mut config = sim_config();
    config.endpoint = "tcp:nowhere".into();
    let (_cmd_tx, event_rx, handle) = setup_engine(config);

    match event_rx.recv_timeout(Duration::from_secs(2)) {
        Ok(Event::Error(msg)) => assert!(msg.contains("tcp:nowhere"), "{}", msg),
        other => panic!("Expected Error event, got {:?}", other),
    }

    let result = handle.join().expect("Engine thread should not panic");
    assert!(result.is_err());
}

#[test]
fn test_engine_stops_when_commands_disconnect() {
    let (cmd_tx, event_rx, handle) = setup_engine(sim_config());
    next_snapshot(&event_rx);

    drop(cmd_tx);
    let result = handle.join();
    assert!(result.is_ok(), "Engine thread should not panic");
}

#[test]
fn test_engine_reports_stream_failure() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (cmd_tx, cmd_rx) = flume::unbounded::<Command>();
    let (event_tx, event_rx) = flume::unbounded::<Event>();

    let handle = thread::spawn(move || {
        let engine = Engine::with_connector(cmd_rx, event_tx, sim_config(), |config| {
            let ctx = SimContext::new().unpaced().fail_refill_after(3);
            let mut source = IqSource::with_context(Box::new(ctx));
            source.configure(config)?;
            Ok(source)
        });
        engine.run()
    });

    next_snapshot(&event_rx);
    let mut blocks = 0;
    loop {
        match event_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(Event::Samples(block)) => {
                assert_eq!(block.len(), 8192);
                blocks += 1;
            }
            Ok(Event::Error(msg)) => {
                assert_eq!(msg, "iio_buffer_refill failed");
                break;
            }
            Ok(other) => panic!("Expected Samples or Error, got {:?}", other),
            Err(e) => panic!("Stream failure was not reported: {:?}", e),
        }
    }
    assert_eq!(blocks, 3);

    // The engine ends on its own, without a Stop command.
    let result = handle.join().expect("Engine thread should not panic");
    let err = result.expect_err("Engine should return the stream failure");
    assert_eq!(err.to_string(), "iio_buffer_refill failed");
    drop(cmd_tx);
}
