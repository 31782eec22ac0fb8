use flume::Sender;
use rustradio::graph::{Graph, GraphRunner};

use plutoiq_messages::Event;

use crate::sinks::SampleSink;
use crate::sources::PlutoSource;
use crate::{Error, IqSource};

/// Build the streaming graph for a configured source.
/// Creates a device source → sample sink pipeline. A stream failure is sent
/// once on `fault_tx`; the graph itself keeps running until cancelled.
pub fn build_graph(source: IqSource, event_tx: Sender<Event>, fault_tx: Sender<Error>) -> Graph {
    let block_length = source.block_length();

    let (pluto_source, prev) = PlutoSource::new(source, fault_tx);
    let sample_sink = SampleSink::new(prev, event_tx, block_length);

    let mut graph = Graph::new();
    graph.add(Box::new(pluto_source));
    graph.add(Box::new(sample_sink));

    graph
}
