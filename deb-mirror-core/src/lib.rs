#![doc = "deb-mirror-core: core logic library for deb-mirror."]

//! This crate contains the parsing, resolution and synchronisation pipeline for mirroring
//! a Debian-style package repository into an object store.
//! Transport-specific store clients live in the CLI crate; everything here works against
//! the [`store::ObjectStore`] and [`origin::Origin`] traits.
//!
//! # Pipeline
//! raw lines → [`parser`] → records → [`resolver`] → candidates → [`checker`] →
//! [`transfer`] queue, orchestrated by [`synchronise`].

pub mod checker;
pub mod config;
pub mod decode;
pub mod error;
pub mod origin;
pub mod parser;
pub mod record;
pub mod resolver;
pub mod store;
pub mod synchronise;
pub mod transfer;

/// A boxed, sendable stream of body chunks shared by origin fetches and store writes.
pub type ByteStream = std::pin::Pin<
    Box<dyn futures::Stream<Item = std::io::Result<bytes::Bytes>> + Send + 'static>,
>;
