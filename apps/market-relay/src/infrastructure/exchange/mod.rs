//! Exchange Adapters
//!
//! Streaming clients for crypto exchange market data:
//!
//! - **Binance**: combined streams, topics in the URL
//! - **HitBTC**: JSON-RPC, one subscribe request per topic
//!
//! Both run through the same [`ExchangeConnector`]; what differs lives behind
//! [`ExchangeProtocol`].

pub mod binance;
pub mod codec;
pub mod connector;
pub mod feed_state;
pub mod hitbtc;
pub mod protocol;
pub mod reconnect;
pub mod transport;

pub use binance::{BINANCE_STREAM_URL, BinanceProtocol};
pub use codec::{CodecError, InboundMessage, ProtocolError};
pub use connector::{ConnectorConfig, ConnectorError, ExchangeConnector};
pub use feed_state::{FeedSnapshot, FeedState};
pub use hitbtc::{HITBTC_STREAM_URL, HitBtcProtocol};
pub use protocol::{ExchangeProtocol, SubscriptionAction};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use transport::TungsteniteDialer;
