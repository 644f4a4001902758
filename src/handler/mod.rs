//! Request handlers.
//!
//! A [`Handler`] receives a fully parsed [`Request`] and a [`ResponseWriter`]
//! bound to the client connection, and must drive the writer through one
//! complete response. It holds no reference to the server that calls it.

pub mod proxy;
mod responses;
pub mod router;

use thiserror::Error;
use futures::future::BoxFuture;

use crate::http::request::Request;
use crate::http::response::{ResponseWriter, WriterError};

pub use router::Router;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error("I/O error in handler: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Handler: Send + Sync + 'static {
    fn call<'a, 'w>(
        &'a self,
        writer: &'a mut ResponseWriter<'w>,
        req: &'a Request,
    ) -> BoxFuture<'a, Result<(), HandlerError>>
    where
        'w: 'a;
}
