//! AD9361 I/Q sample source.
//!
//! [`IqSource`] drives the radio through a libiio-style [`IioContext`]: it
//! configures port, bandwidth, rate, LO and gain, then refills a streaming
//! buffer and normalizes the raw 12-bit pairs into `Complex<f32>`.
//! [`Engine`] runs a source on its own thread and publishes blocks over flume.

pub mod context;
pub mod convert;
pub mod endpoint;
mod error;
mod graph;
#[cfg(feature = "libiio")]
mod iio;
pub mod sim;
mod sinks;
mod source;
mod sources;

pub use context::IioContext;
pub use endpoint::Endpoint;
pub use error::{Errno, Error};
pub use sim::{SimContext, SimProbe};
pub use sinks::SampleSink;
pub use source::{DEVICE_NAME, IqSource};
pub use sources::PlutoSource;

use anyhow::{Result, anyhow};
use flume::{Receiver, Sender};
use log::{debug, error, warn};
use plutoiq_messages::{Command, Event, SourceConfig};
use rustradio::graph::GraphRunner;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often the engine checks the graph while no command arrives.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Opens and configures a source for a given configuration.
type Connector = Box<dyn FnMut(&SourceConfig) -> Result<IqSource, Error> + Send>;

/// How one streaming run ended.
enum RunEnd {
    Stopped,
    Restart,
    Failed(Error),
}

/// The streaming engine.
/// Owns the device source and processes commands from the caller.
pub struct Engine {
    cmd_rx: Receiver<Command>,
    event_tx: Sender<Event>,
    current_config: SourceConfig,
    connect: Connector,
}

impl Engine {
    /// Create a new Engine that opens `source_config.endpoint` on every start.
    pub fn new(
        cmd_rx: Receiver<Command>,
        event_tx: Sender<Event>,
        source_config: SourceConfig,
    ) -> Self {
        Self::with_connector(cmd_rx, event_tx, source_config, IqSource::connect)
    }

    /// Create an Engine that obtains its source from `connect`, e.g. one
    /// wrapping a [`SimContext`] with injected faults.
    pub fn with_connector<F>(
        cmd_rx: Receiver<Command>,
        event_tx: Sender<Event>,
        source_config: SourceConfig,
        connect: F,
    ) -> Self
    where
        F: FnMut(&SourceConfig) -> Result<IqSource, Error> + Send + 'static,
    {
        debug!("Constructing a new engine");
        Self {
            cmd_rx,
            event_tx,
            current_config: source_config,
            connect: Box::new(connect),
        }
    }

    /// Run the engine (blocking).
    ///
    /// Restarts the stream on every reconfigure. Returns `Ok` after
    /// `Command::Stop` or once the caller hangs up. An open, configure or
    /// streaming failure is published as `Event::Error` and returned.
    pub fn run(mut self) -> Result<()> {
        loop {
            match self.stream()? {
                RunEnd::Stopped => return Ok(()),
                RunEnd::Restart => debug!("Restarting stream with {:?}", self.current_config),
                RunEnd::Failed(e) => {
                    let _ = self.event_tx.send(Event::Error(e.to_string()));
                    return Err(e.into());
                }
            }
        }
    }

    fn stream(&mut self) -> Result<RunEnd> {
        let source = match (self.connect)(&self.current_config) {
            Ok(source) => source,
            Err(e) => {
                error!("Cannot start {}: {}", self.current_config.endpoint, e);
                return Ok(RunEnd::Failed(e));
            }
        };

        self.event_tx.send(Event::StateSnapshot(source.state()))?;

        let (fault_tx, fault_rx) = flume::bounded(1);
        let mut graph = graph::build_graph(source, self.event_tx.clone(), fault_tx);
        let cancel_token = graph.cancel_token();
        let graph_handle = thread::spawn(move || graph.run());

        let end = self.supervise(&fault_rx, &graph_handle);

        // The source block stays in the graph after a failure, so the graph
        // only returns once cancelled.
        cancel_token.cancel();
        match graph_handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Streaming graph ended with an error: {}", e),
            Err(_) => return Err(anyhow!("streaming graph thread panicked")),
        }
        Ok(end)
    }

    fn supervise(
        &mut self,
        fault_rx: &Receiver<Error>,
        graph_handle: &JoinHandle<rustradio::Result<()>>,
    ) -> RunEnd {
        loop {
            if let Ok(e) = fault_rx.try_recv() {
                return RunEnd::Failed(e);
            }

            let msg = self.cmd_rx.recv_timeout(POLL_INTERVAL);
            debug!("Engine received message: {:?}", msg);

            match msg {
                Ok(Command::Stop) | Err(flume::RecvTimeoutError::Disconnected) => {
                    return RunEnd::Stopped;
                }
                Ok(Command::Reconfigure(new_config)) => {
                    self.current_config = new_config;
                    return RunEnd::Restart;
                }
                // The sink ends the graph once nobody receives events.
                Err(flume::RecvTimeoutError::Timeout) if graph_handle.is_finished() => {
                    return fault_rx.try_recv().map_or(RunEnd::Stopped, RunEnd::Failed);
                }
                Err(flume::RecvTimeoutError::Timeout) => {}
            }
        }
    }
}
