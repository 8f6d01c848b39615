//! Exchange Protocol
//!
//! Everything a connector needs to know about one exchange's wire protocol:
//! where to connect, how topics are spelled and requested, how frames decode
//! and which field mapping applies to each event type.

use std::fmt::Debug;

use super::codec::{CodecError, InboundMessage};
use crate::domain::instrument::{Currency, SymbolResolver, SymbolTable};
use crate::domain::mapping::FieldMapping;
use crate::domain::streaming::Exchange;
use crate::domain::topic::{Topic, TopicBuilder, TopicError, TopicFormat, TopicSet};

/// Direction of a runtime subscription change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionAction {
    /// Start streaming a topic.
    Subscribe,
    /// Stop streaming a topic.
    Unsubscribe,
}

/// Wire protocol of one exchange.
pub trait ExchangeProtocol: Send + Sync + Debug {
    /// Exchange identity.
    fn exchange(&self) -> Exchange;

    /// Streaming endpoint used when none is configured.
    fn default_url(&self) -> &'static str;

    /// Topic syntax.
    fn topic_format(&self) -> TopicFormat;

    /// Exchange-specific symbol overrides.
    fn symbols(&self) -> &SymbolTable;

    /// URL to dial for `topics`.
    fn endpoint(&self, base_url: &str, topics: &TopicSet) -> String;

    /// Text frames to send right after the transport opens.
    fn subscribe_requests(&self, topics: &TopicSet) -> Vec<String>;

    /// Text frame that changes `topic` on an open transport.
    fn live_request(&self, topic: &Topic, action: SubscriptionAction) -> String;

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the frame is not a message this protocol knows.
    fn decode(&self, text: &str) -> Result<InboundMessage, CodecError>;

    /// Mapping for an event type, if the event type is relayed.
    fn mapping(&self, event_type: &str) -> Option<&'static FieldMapping>;

    /// Topic set for every product/base pair and every event.
    ///
    /// # Errors
    ///
    /// Returns `TopicError::UnknownCurrency` if a currency has no symbol.
    fn build_topics(
        &self,
        products: &[Currency],
        bases: &[Currency],
        events: &[String],
    ) -> Result<TopicSet, TopicError> {
        let format = self.topic_format();
        let builder = TopicBuilder::new(SymbolResolver::new(self.symbols()), format);

        events.iter().try_fold(TopicSet::empty(format.joiner), |set, event| {
            Ok(set.merge(builder.build(products, bases, event)?))
        })
    }
}
