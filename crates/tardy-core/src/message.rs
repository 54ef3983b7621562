use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A unit of work carried by the queue.
///
/// The queue treats messages as opaque data: it serializes them into an
/// envelope on push and deserializes them on poll. Only handlers interpret
/// their fields. `kind` is the discriminant the worker routes on, usually one
/// per variant of a `#[serde(tag = "type")]` enum.
pub trait Message: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    fn kind(&self) -> &'static str;
}
