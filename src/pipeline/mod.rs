// SPDX-License-Identifier: MIT

//! Pipeline stages
//!
//! Each submodule is one stage of the document pipeline: change detection,
//! source-tree introspection, the two agent workflows (summaries, graph
//! schema), text ingestion, CSV validation and the vector upload.

pub mod changes;
pub mod ingest;
pub mod schema;
pub mod structure;
pub mod summaries;
pub mod upload;
pub mod validate;
