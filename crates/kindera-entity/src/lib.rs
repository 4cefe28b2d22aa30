// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entity catalogue and resolver for the Kindera assistant core.
//!
//! The catalogue is the closed set of business entities (students, classes,
//! fees, ...) with the field schemas used to validate tool parameters; the
//! resolver maps natural-language nouns onto catalogue descriptors.

pub mod catalog;
pub mod resolver;

pub use catalog::{lookup, EntityDescriptor, Field, CATALOG, CATALOG_VERSION};
pub use resolver::{resolve, EntityMatch};
