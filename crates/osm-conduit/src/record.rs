//! The record bound shared by pipes and the sort engine.

use serde::{Serialize, de::DeserializeOwned};

/// An opaque payload flowing through pipes.
///
/// Records are serializable so a sort stage can spill them, and owned so they
/// can cross task boundaries.
pub trait Record: Serialize + DeserializeOwned + Send + 'static {}

impl<T> Record for T where T: Serialize + DeserializeOwned + Send + 'static {}
