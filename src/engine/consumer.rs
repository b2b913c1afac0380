//! Block consumer contract and the registry of named factories.
//!
//! The pipeline only sees `dyn BlockConsumer`: it feeds bytes in order and collects the
//! finalized [`ConsumerValue`], never branching on the concrete kind.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::{ConsumerResult, ConsumerValue};

use super::format::FormatSniffer;
use super::hashing::{Blake3Consumer, Crc32Consumer, DigestConsumer};

/// Per-stream accumulator (running hash, detector state). Fed blocks strictly in sequence order.
pub trait BlockConsumer: Send {
    fn consume(&mut self, block: &[u8]);

    /// Called once after the last block.
    fn finish(self: Box<Self>) -> ConsumerValue;
}

/// Creates one [`BlockConsumer`] per stream attempt.
pub trait BlockConsumerFactory: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn create(&self) -> Box<dyn BlockConsumer>;
}

/// Wraps a factory's instance so it reports a [`ConsumerResult`] under the factory's name.
pub struct NamedConsumer {
    pub name: String,
    pub inner: Box<dyn BlockConsumer>,
}

impl NamedConsumer {
    pub fn from_factory(factory: &dyn BlockConsumerFactory) -> Self {
        Self {
            name: factory.name().to_string(),
            inner: factory.create(),
        }
    }

    pub fn finish(self) -> ConsumerResult {
        ConsumerResult {
            name: self.name,
            value: self.inner.finish(),
        }
    }
}

/// Factory built from a constructor function. Covers every built-in consumer.
pub struct FnFactory {
    name: &'static str,
    description: &'static str,
    make: fn() -> Box<dyn BlockConsumer>,
}

impl FnFactory {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        make: fn() -> Box<dyn BlockConsumer>,
    ) -> Self {
        Self {
            name,
            description,
            make,
        }
    }
}

impl BlockConsumerFactory for FnFactory {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn create(&self) -> Box<dyn BlockConsumer> {
        (self.make)()
    }
}

/// Configured consumer names that match no registered factory.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid block consumer(s): {}", .0.join(", "))]
pub struct InvalidConsumers(pub Vec<String>);

/// Factories enabled for this run, in registration order.
pub type ConsumerSet = Arc<[Arc<dyn BlockConsumerFactory>]>;

#[derive(Clone, Default)]
pub struct ConsumerRegistry {
    factories: Vec<Arc<dyn BlockConsumerFactory>>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every consumer shipped with the crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FnFactory::new(
            "CRC32",
            "CRC-32 (IEEE)",
            Crc32Consumer::boxed,
        )));
        registry.register(Arc::new(FnFactory::new(
            "MD5",
            "MD5 (legacy, dedup only)",
            DigestConsumer::<md5::Md5>::boxed,
        )));
        registry.register(Arc::new(FnFactory::new(
            "SHA1",
            "SHA-1",
            DigestConsumer::<sha1::Sha1>::boxed,
        )));
        registry.register(Arc::new(FnFactory::new(
            "SHA256",
            "SHA-256",
            DigestConsumer::<sha2::Sha256>::boxed,
        )));
        registry.register(Arc::new(FnFactory::new(
            "SHA512",
            "SHA-512",
            DigestConsumer::<sha2::Sha512>::boxed,
        )));
        registry.register(Arc::new(FnFactory::new(
            "BLAKE3",
            "BLAKE3 (fast, 256-bit)",
            Blake3Consumer::boxed,
        )));
        registry.register(Arc::new(FnFactory::new(
            "FORMAT",
            "Container format sniffer (magic numbers)",
            FormatSniffer::boxed,
        )));
        registry
    }

    pub fn register(&mut self, factory: Arc<dyn BlockConsumerFactory>) {
        self.factories.push(factory);
    }

    pub fn factories(&self) -> &[Arc<dyn BlockConsumerFactory>] {
        &self.factories
    }

    /// Enable the factories named in `allow` (case-insensitive exact match), keeping
    /// registration order. Decided once per run. Any name without a factory fails the whole
    /// selection so startup aborts before a single file is read.
    pub fn select<S: AsRef<str>>(&self, allow: &[S]) -> Result<ConsumerSet, InvalidConsumers> {
        let invalid: Vec<String> = allow
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| {
                !self
                    .factories
                    .iter()
                    .any(|f| f.name().eq_ignore_ascii_case(name))
            })
            .map(str::to_string)
            .collect();
        if !invalid.is_empty() {
            return Err(InvalidConsumers(invalid));
        }
        Ok(self
            .factories
            .iter()
            .filter(|f| allow.iter().any(|a| f.name().eq_ignore_ascii_case(a.as_ref())))
            .cloned()
            .collect())
    }
}

impl fmt::Display for ConsumerRegistry {
    /// One `NAME - description` line per factory.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for factory in &self.factories {
            writeln!(f, "{:<14} - {}", factory.name(), factory.description())?;
        }
        Ok(())
    }
}
