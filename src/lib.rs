// SPDX-License-Identifier: MIT

//! vectorpipe: a document pipeline that summarizes a source tree with LLM
//! agent workflows, proposes a graph schema for it, and ingests scraped
//! text into a vector index.
//!
//! The core is the [workflow] engine: a validated directed graph of named
//! steps with straight and conditional edges, executed sequentially over an
//! accumulating state. The [pipeline] stages build their workflows on top of
//! it and handle the artifacts around them.

pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod util;
pub mod workflow;

pub use error::PipelineError;
