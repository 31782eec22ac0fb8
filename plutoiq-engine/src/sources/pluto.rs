use flume::Sender;
use log::error;
use rustradio::block::{Block, BlockRet};
use rustradio::stream::WriteStream;
use rustradio::{Complex, Error, rustradio_macros};

use crate::{Error as SourceError, IqSource};

/// A source block that streams I/Q samples from a configured [`IqSource`].
///
/// Each refill yields one block; it is copied into the output stream as
/// space allows, so the stream buffer need not hold a whole block. The first
/// failed refill is sent on `fault_tx` and ends the block.
#[derive(rustradio_macros::Block)]
#[rustradio(new)]
pub struct PlutoSource {
    #[rustradio(out)]
    dst: WriteStream<Complex>,
    source: IqSource,
    fault_tx: Sender<SourceError>,
    #[rustradio(default)]
    block: Vec<Complex>,
    #[rustradio(default)]
    offset: usize,
}

impl Block for PlutoSource {
    fn work(&mut self) -> Result<BlockRet<'_>, Error> {
        if self.offset >= self.block.len() {
            // Blocks until the hardware delivers.
            if let Err(e) = self.source.get_samples(&mut self.block) {
                error!("I/Q stream from {} stopped: {}", self.source.endpoint(), e);
                let _ = self.fault_tx.try_send(e);
                return Ok(BlockRet::EOF);
            }
            self.offset = 0;
        }

        let mut o = self.dst.write_buf()?;
        let n = o.len().min(self.block.len() - self.offset);
        if n == 0 {
            return Ok(BlockRet::Pending);
        }
        o.slice()[..n].copy_from_slice(&self.block[self.offset..self.offset + n]);
        o.produce(n, &[]);
        self.offset += n;

        Ok(BlockRet::Again)
    }
}
