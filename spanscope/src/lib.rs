//! # spanscope - Span Trees from Sampled Call Stacks
//!
//! spanscope reconstructs an approximate, properly nested tree of timed spans
//! from periodically sampled call stacks, without instrumenting the sampled
//! code. Consecutive stacks of one execution context are diffed to infer
//! which frames were entered and left between two samples.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────┐        ┌──────────────────────┐
//! │   Live Sampler       │        │ Profile Reconstructor│
//! │ (StackProbe, ticks)  │        │  (.cpuprofile JSON)  │
//! └──────────┬───────────┘        └──────────┬───────────┘
//!            │ (context, raw stack, time)    │ Sample per tick
//!            └──────────────┬────────────────┘
//!                           ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Engine                           │
//! │                                                         │
//! │  ┌────────────┐   ┌────────────┐   ┌───────────────┐    │
//! │  │   Frame    │──▶│   Stack    │──▶│ Context Table │    │
//! │  │   Filter   │   │   Differ   │   │ (per context) │    │
//! │  └────────────┘   └────────────┘   └───────┬───────┘    │
//! │                                            │ closed     │
//! │                                            ▼ spans      │
//! │                                    ┌───────────────┐    │
//! │                                    │ Span Emitter  │    │
//! │                                    └───────┬───────┘    │
//! └────────────────────────────────────────────┼────────────┘
//!                                              ▼
//!                          SpanSink (collector, channel, Chrome trace)
//! ```
//!
//! ## Module Structure
//!
//! ### Core Pipeline Modules
//!
//! - [`filter`]: Ordered regex exclusion of runtime/library frames
//! - [`differ`]: Common-prefix stack diff producing START/END events
//! - [`context`]: Per-context last stack and open spans (arena + index)
//! - [`emitter`]: Hands closed spans to a [`emitter::SpanSink`]
//! - [`engine`]: Owns one pipeline instance
//!
//! ### Inputs
//!
//! - [`sampler`]: Fixed-interval live sampling on a worker thread
//! - [`probe`]: Execution-context identity and stacks ([`probe::TaskRegistry`])
//! - [`annotate`]: Wraps host handlers in named frames
//! - [`profile`]: Loads and expands call-graph profiles
//!
//! ### Output and Support Modules
//!
//! - [`export`]: Chrome Trace Event Format for Perfetto and `chrome://tracing`
//! - [`analysis`]: Per-frame count, total and self time
//! - [`cli`]: Command-line argument parsing
//! - [`domain`]: Core domain types, configuration and errors
//! - [`span`]: The span record itself
//!
//! ## Fidelity
//!
//! Sampling only sees what was on the stack at each tick. Calls shorter than
//! the interval may be missed, and span boundaries are accurate to one
//! interval. Two consecutive calls to the same function at the same depth,
//! with no sample in between where it was absent, merge into one span.
//!
//! ## Typical Usage
//!
//! ```bash
//! # Summarize a profile recorded by a JS engine or any .cpuprofile producer
//! spanscope app.cpuprofile
//!
//! # Export spans for a timeline viewer
//! spanscope app.cpuprofile --export trace.json
//! ```

// Expose modules for testing
pub mod analysis;
pub mod annotate;
pub mod cli;
pub mod context;
pub mod differ;
pub mod domain;
pub mod emitter;
pub mod engine;
pub mod export;
pub mod filter;
pub mod probe;
pub mod profile;
pub mod sampler;
pub mod span;
