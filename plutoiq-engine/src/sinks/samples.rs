use flume::Sender;
use rustradio::block::{Block, BlockRet};
use rustradio::stream::ReadStream;
use rustradio::{Complex, Error, rustradio_macros};

use plutoiq_messages::Event;

/// A sink block that regroups the sample stream into fixed-size blocks and
/// sends each one via flume channel.
#[derive(rustradio_macros::Block)]
#[rustradio(new)]
pub struct SampleSink {
    #[rustradio(in)]
    src: ReadStream<Complex>,
    event_tx: Sender<Event>,
    block_length: usize,
    #[rustradio(default)]
    pending: Vec<Complex>,
}

impl Block for SampleSink {
    fn work(&mut self) -> Result<BlockRet<'_>, Error> {
        if self.src.eof() {
            return Ok(BlockRet::EOF);
        }

        let (input, _tags) = self.src.read_buf()?;
        if input.is_empty() {
            return Ok(BlockRet::Pending);
        }

        let n = input.len().min(self.block_length - self.pending.len());
        self.pending.extend(input.iter().take(n).copied());
        input.consume(n);

        if self.pending.len() == self.block_length {
            let block =
                std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_length));
            // Block the pipeline to provide backpressure if the caller is behind
            if self.event_tx.send(Event::Samples(block)).is_err() {
                return Ok(BlockRet::EOF);
            }
        }

        Ok(BlockRet::Again)
    }
}
