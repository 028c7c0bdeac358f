//! Sofa Client Library
//!
//! HTTP client for CouchDB-style document databases: documents, attachments
//! and `_all_docs` queries over a pluggable [`HttpAgent`].
//!
//! Entities are not synchronized internally. Mutating operations take
//! `&mut self`; share an entity across tasks only behind your own lock.

mod agent;
mod attachment;
mod client;
mod database;
mod document;

#[cfg(test)]
mod testing;

pub use agent::{HttpAgent, ReqwestAgent};
pub use attachment::{AttachmentContent, AttachmentData, DocumentAttachment};
pub use client::{Body, Client};
pub use database::Database;
pub use document::Document;
pub use sofa_core::{
    util, ClientConfig, DocumentLister, Error, Headers, HttpVersion, Method, Query, QueryParams,
    RawResponse, Request, Response, Result,
};
