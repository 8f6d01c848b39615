//! Subscription Topics
//!
//! Builds the set of subscription keys an exchange connector requests from
//! the configured product and base currency lists.
//!
//! For every product (outer loop) and base (inner loop) with
//! `base != product`, the product and base wire symbols are concatenated and
//! the event suffix is appended according to the exchange's [`TopicFormat`].
//! The builder is pure: identical inputs always produce identical, identically
//! ordered topic sets.

use std::fmt;

use super::instrument::{Currency, Instrument, SymbolResolver};

// =============================================================================
// Topic Format
// =============================================================================

/// Letter case of wire symbols inside a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolCase {
    /// `ethbtc`
    Lower,
    /// `ETHBTC`
    Upper,
}

/// Exchange-specific topic syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicFormat {
    /// Case applied to the concatenated pair symbol.
    pub case: SymbolCase,
    /// Separator placed between pair symbol and event name. `None` means the
    /// event is not part of the key.
    pub event_separator: Option<char>,
    /// Separator used when all topics are joined into one request.
    pub joiner: &'static str,
}

impl TopicFormat {
    /// Create a topic format.
    #[must_use]
    pub const fn new(case: SymbolCase, event_separator: Option<char>, joiner: &'static str) -> Self {
        Self {
            case,
            event_separator,
            joiner,
        }
    }

    fn pair_symbol(&self, product: &str, base: &str) -> String {
        let joined = format!("{product}{base}");
        match self.case {
            SymbolCase::Lower => joined.to_lowercase(),
            SymbolCase::Upper => joined.to_uppercase(),
        }
    }

    fn key(&self, pair_symbol: &str, event: &str) -> String {
        match self.event_separator {
            Some(separator) if !event.is_empty() => format!("{pair_symbol}{separator}{event}"),
            _ => pair_symbol.to_string(),
        }
    }
}

// =============================================================================
// Topic
// =============================================================================

/// One subscription key together with what it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    instrument: Instrument,
    pair_symbol: String,
    event: String,
    key: String,
}

impl Topic {
    /// Instrument this topic streams.
    #[must_use]
    pub const fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Concatenated wire symbol of the pair (e.g. `ethbtc`).
    #[must_use]
    pub fn pair_symbol(&self) -> &str {
        &self.pair_symbol
    }

    /// Requested event name.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Exchange subscription key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

// =============================================================================
// Topic Set
// =============================================================================

/// Ordered collection of topics for one exchange. Topics themselves never
/// change; the set grows and shrinks with runtime subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    topics: Vec<Topic>,
    joiner: &'static str,
}

impl TopicSet {
    /// Empty set joined with `joiner`.
    #[must_use]
    pub const fn empty(joiner: &'static str) -> Self {
        Self {
            topics: Vec::new(),
            joiner,
        }
    }

    /// Number of topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Whether no topic was built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Iterate topics in build order.
    pub fn iter(&self) -> impl Iterator<Item = &Topic> {
        self.topics.iter()
    }

    /// Subscription keys in build order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.topics.iter().map(Topic::key).collect()
    }

    /// All keys joined into a single subscription request.
    #[must_use]
    pub fn join(&self) -> String {
        self.keys().join(self.joiner)
    }

    /// Append the topics of `other`, keeping order and skipping topics already
    /// present for the same event.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        for topic in other.topics {
            self.insert(topic);
        }
        self
    }

    /// Whether a topic with the same key and event is present.
    #[must_use]
    pub fn contains(&self, topic: &Topic) -> bool {
        self.topics.iter().any(|t| t.key == topic.key && t.event == topic.event)
    }

    /// Append `topic` unless already present. Returns whether it was added.
    pub fn insert(&mut self, topic: Topic) -> bool {
        if self.contains(&topic) {
            return false;
        }
        self.topics.push(topic);
        true
    }

    /// Remove the topic with the same key and event. Returns whether one was
    /// present.
    pub fn remove(&mut self, topic: &Topic) -> bool {
        let before = self.topics.len();
        self.topics
            .retain(|t| !(t.key == topic.key && t.event == topic.event));
        self.topics.len() != before
    }

    /// Find the instrument whose pair symbol matches, ignoring case.
    #[must_use]
    pub fn instrument_for_symbol(&self, symbol: &str) -> Option<&Instrument> {
        self.topics
            .iter()
            .find(|t| t.pair_symbol.eq_ignore_ascii_case(symbol))
            .map(Topic::instrument)
    }
}

impl<'a> IntoIterator for &'a TopicSet {
    type Item = &'a Topic;
    type IntoIter = std::slice::Iter<'a, Topic>;

    fn into_iter(self) -> Self::IntoIter {
        self.topics.iter()
    }
}

// =============================================================================
// Topic Builder
// =============================================================================

/// Computes topic sets from configured currencies.
#[derive(Debug, Clone, Copy)]
pub struct TopicBuilder<'a> {
    resolver: SymbolResolver<'a>,
    format: TopicFormat,
}

impl<'a> TopicBuilder<'a> {
    /// Create a builder for one exchange.
    #[must_use]
    pub const fn new(resolver: SymbolResolver<'a>, format: TopicFormat) -> Self {
        Self { resolver, format }
    }

    /// Build the topic set for `event` over every product/base pair.
    ///
    /// # Errors
    ///
    /// Returns `TopicError::UnknownCurrency` if a currency that takes part in
    /// a non-self pair has no wire symbol in either table.
    pub fn build(
        &self,
        products: &[Currency],
        bases: &[Currency],
        event: &str,
    ) -> Result<TopicSet, TopicError> {
        let mut topics = Vec::with_capacity(products.len() * bases.len());

        for product in products {
            for base in bases {
                let instrument = Instrument::new(product.clone(), base.clone());
                if instrument.is_self_pair() {
                    continue;
                }

                let product_symbol = self.symbol(product)?;
                let base_symbol = self.symbol(base)?;
                let pair_symbol = self.format.pair_symbol(product_symbol, base_symbol);
                let key = self.format.key(&pair_symbol, event);

                topics.push(Topic {
                    instrument,
                    pair_symbol,
                    event: event.to_string(),
                    key,
                });
            }
        }

        Ok(TopicSet {
            topics,
            joiner: self.format.joiner,
        })
    }

    fn symbol(&self, currency: &Currency) -> Result<&'a str, TopicError> {
        self.resolver
            .resolve(currency)
            .ok_or_else(|| TopicError::UnknownCurrency(currency.clone()))
    }
}

/// Topic construction errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    /// Currency has no wire symbol for this exchange.
    #[error("no wire symbol for currency {0}")]
    UnknownCurrency(Currency),
}
