//! The relay: prefix filter, streaming aggregator, throttled display updates, and the
//! dispatcher that runs one cycle per inbound message.

mod aggregator;
mod dispatcher;
mod display;
mod filter;
#[cfg(test)]
mod testing;

pub use aggregator::{
    AggregatorSettings, ChunkStep, StreamAggregator, EMPTY_RESPONSE_MESSAGE, STREAM_ERROR_MESSAGE,
};
pub use dispatcher::{
    relay_stream, CycleOutcome, Dispatcher, RelaySettings, CONNECT_ERROR_MESSAGE,
    PLACEHOLDER_MESSAGE,
};
pub use display::{DisplayHandle, DisplayUpdater};
pub use filter::{strip_prefix, usage_hint};
