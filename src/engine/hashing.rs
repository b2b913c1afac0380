//! Hash calculators plugged into the pipeline as block consumers.

use sha2::Digest;

use crate::ConsumerValue;

use super::consumer::BlockConsumer;

/// Any RustCrypto [`Digest`] (MD5, SHA-1, SHA-2) as a block consumer.
pub struct DigestConsumer<D>(D);

impl<D: Digest + Send + 'static> DigestConsumer<D> {
    pub fn boxed() -> Box<dyn BlockConsumer> {
        Box::new(Self(D::new()))
    }
}

impl<D: Digest + Send> BlockConsumer for DigestConsumer<D> {
    fn consume(&mut self, block: &[u8]) {
        Digest::update(&mut self.0, block);
    }

    fn finish(self: Box<Self>) -> ConsumerValue {
        ConsumerValue::Digest(self.0.finalize().to_vec())
    }
}

/// CRC-32 (IEEE). Digest bytes are big-endian so the hex matches the usual `CBF43926` form.
pub struct Crc32Consumer(crc32fast::Hasher);

impl Crc32Consumer {
    pub fn boxed() -> Box<dyn BlockConsumer> {
        Box::new(Self(crc32fast::Hasher::new()))
    }
}

impl BlockConsumer for Crc32Consumer {
    fn consume(&mut self, block: &[u8]) {
        self.0.update(block);
    }

    fn finish(self: Box<Self>) -> ConsumerValue {
        ConsumerValue::Digest(self.0.finalize().to_be_bytes().to_vec())
    }
}

pub struct Blake3Consumer(blake3::Hasher);

impl Blake3Consumer {
    pub fn boxed() -> Box<dyn BlockConsumer> {
        Box::new(Self(blake3::Hasher::new()))
    }
}

impl BlockConsumer for Blake3Consumer {
    fn consume(&mut self, block: &[u8]) {
        self.0.update(block);
    }

    fn finish(self: Box<Self>) -> ConsumerValue {
        ConsumerValue::Digest(self.0.finalize().as_bytes().to_vec())
    }
}
